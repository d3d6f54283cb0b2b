//! Upload boundary: turns delimited-text or spreadsheet bytes into a [`Table`].
//!
//! Everything that goes wrong here surfaces as [`ReportError::Unreadable`]; the
//! pipeline never receives a half-parsed table.

use std::{
    fs,
    io::{Cursor, Read},
    path::Path,
};

use calamine::{Data, DataType, Reader, open_workbook_auto_from_rs};
use encoding_rs::{Encoding, UTF_8};
use log::debug;

use crate::{
    data::{Value, parse_naive_datetime},
    dataset::{Row, Table},
    error::ReportError,
    io_utils,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadFormat {
    Delimited { delimiter: u8 },
    Spreadsheet,
}

#[derive(Debug, Clone)]
pub struct IngestOptions {
    pub delimiter: Option<u8>,
    pub encoding: &'static Encoding,
    /// Worksheet name or 0-based index; the first sheet when unset.
    pub sheet: Option<String>,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            delimiter: None,
            encoding: UTF_8,
            sheet: None,
        }
    }
}

impl UploadFormat {
    pub fn for_path(path: &Path, delimiter: Option<u8>) -> Self {
        if io_utils::is_spreadsheet(path) {
            UploadFormat::Spreadsheet
        } else {
            UploadFormat::Delimited {
                delimiter: io_utils::resolve_input_delimiter(path, delimiter),
            }
        }
    }
}

/// Reads an upload from disk (or stdin for `-`) and parses it by extension.
pub fn load_table(path: &Path, options: &IngestOptions) -> Result<Table, ReportError> {
    let bytes = if io_utils::is_dash(path) {
        let mut buffer = Vec::new();
        std::io::stdin()
            .lock()
            .read_to_end(&mut buffer)
            .map_err(|err| ReportError::unreadable(format!("reading stdin: {err}")))?;
        buffer
    } else {
        fs::read(path)
            .map_err(|err| ReportError::unreadable(format!("opening {path:?}: {err}")))?
    };
    let format = UploadFormat::for_path(path, options.delimiter);
    debug!("Reading {path:?} as {format:?}");
    read_upload(&bytes, format, options)
}

pub fn read_upload(
    bytes: &[u8],
    format: UploadFormat,
    options: &IngestOptions,
) -> Result<Table, ReportError> {
    match format {
        UploadFormat::Delimited { delimiter } => {
            read_delimited(bytes, delimiter, options.encoding)
        }
        UploadFormat::Spreadsheet => read_spreadsheet(bytes, options.sheet.as_deref()),
    }
}

pub fn read_delimited<R: Read>(
    source: R,
    delimiter: u8,
    encoding: &'static Encoding,
) -> Result<Table, ReportError> {
    let mut reader = io_utils::open_csv_reader(source, delimiter);
    let headers = io_utils::reader_headers(&mut reader, encoding)
        .map_err(|err| ReportError::unreadable(format!("reading header row: {err}")))?;
    let mut rows = Vec::new();
    for (row_idx, record) in reader.byte_records().enumerate() {
        let record = record
            .map_err(|err| ReportError::unreadable(format!("row {}: {err}", row_idx + 2)))?;
        let decoded = io_utils::decode_record(&record, encoding)
            .map_err(|err| ReportError::unreadable(format!("row {}: {err}", row_idx + 2)))?;
        rows.push(
            decoded
                .into_iter()
                .map(|cell| (!cell.is_empty()).then_some(Value::String(cell)))
                .collect(),
        );
    }
    Ok(Table::new(headers, rows))
}

pub fn read_spreadsheet(bytes: &[u8], sheet: Option<&str>) -> Result<Table, ReportError> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes))
        .map_err(|err| ReportError::unreadable(format!("opening workbook: {err}")))?;
    let range = match sheet {
        Some(selector) => match selector.parse::<usize>() {
            Ok(idx) => workbook
                .worksheet_range_at(idx)
                .ok_or_else(|| ReportError::unreadable(format!("no sheet at index {idx}")))?,
            Err(_) => workbook.worksheet_range(selector),
        },
        None => workbook
            .worksheet_range_at(0)
            .ok_or_else(|| ReportError::unreadable("workbook has no worksheets"))?,
    }
    .map_err(|err| ReportError::unreadable(format!("reading worksheet: {err}")))?;

    let mut grid = range.rows();
    let Some(header_row) = grid.next() else {
        return Ok(Table::default());
    };
    let headers = header_row
        .iter()
        .enumerate()
        .map(|(idx, cell)| {
            let name = cell.as_string().unwrap_or_else(|| cell.to_string());
            let name = name.trim();
            if name.is_empty() {
                format!("column_{}", idx + 1)
            } else {
                name.to_string()
            }
        })
        .collect::<Vec<_>>();

    let rows = grid
        .map(|cells| {
            let mut row: Row = cells.iter().map(spreadsheet_value).collect();
            row.resize(headers.len(), None);
            row
        })
        .filter(|row| row.iter().any(Option::is_some))
        .collect();
    Ok(Table::new(headers, rows))
}

fn spreadsheet_value(cell: &Data) -> Option<Value> {
    match cell {
        Data::Empty | Data::Error(_) => None,
        Data::String(s) if s.is_empty() => None,
        Data::String(s) => Some(Value::String(s.clone())),
        Data::Int(i) => Some(Value::Integer(*i)),
        Data::Float(f) => Some(Value::Float(*f)),
        Data::Bool(b) => Some(Value::String(b.to_string())),
        Data::DateTime(_) => cell.as_datetime().map(Value::DateTime),
        Data::DateTimeIso(s) => Some(
            parse_naive_datetime(s)
                .map(Value::DateTime)
                .unwrap_or_else(|_| Value::String(s.clone())),
        ),
        other => Some(Value::String(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delimited_upload_keeps_headers_and_marks_blanks_missing() {
        let data = "sku,asin,price,quantity\nA-1,B00X,5.0,\nA-2,B00Y,,10\n";
        let table = read_delimited(data.as_bytes(), b',', UTF_8).unwrap();
        assert_eq!(table.headers, vec!["sku", "asin", "price", "quantity"]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.rows[0][3], None);
        assert_eq!(table.rows[1][2], None);
        assert_eq!(table.rows[1][3], Some(Value::String("10".into())));
    }

    #[test]
    fn ragged_rows_are_unreadable() {
        let data = "sku,qty\nA,1,extra\n";
        let err = read_delimited(data.as_bytes(), b',', UTF_8).unwrap_err();
        assert!(matches!(err, ReportError::Unreadable { .. }));
    }

    #[test]
    fn garbage_workbook_bytes_are_unreadable() {
        let err = read_spreadsheet(b"definitely not a workbook", None).unwrap_err();
        assert!(matches!(err, ReportError::Unreadable { .. }));
    }

    #[test]
    fn workbook_cells_map_to_values() {
        assert_eq!(spreadsheet_value(&Data::Int(7)), Some(Value::Integer(7)));
        assert_eq!(spreadsheet_value(&Data::Float(2.5)), Some(Value::Float(2.5)));
        assert_eq!(spreadsheet_value(&Data::String(String::new())), None);
        assert_eq!(spreadsheet_value(&Data::Empty), None);
        assert_eq!(
            spreadsheet_value(&Data::Bool(true)),
            Some(Value::String("true".into()))
        );
        let iso = spreadsheet_value(&Data::DateTimeIso("2024-01-05T08:30:00".into()));
        assert_eq!(
            iso.and_then(|v| v.as_datetime()).map(|dt| dt.to_string()),
            Some("2024-01-05 08:30:00".to_string())
        );
    }

    #[test]
    fn header_only_upload_yields_empty_table() {
        let table = read_delimited("sku,qty\n".as_bytes(), b',', UTF_8).unwrap();
        assert_eq!(table.headers.len(), 2);
        assert!(table.is_empty());
    }
}
