//! In-memory table owned by one pipeline invocation.

use crate::data::Value;

pub type Row = Vec<Option<Value>>;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Row>,
}

impl Table {
    pub fn new(headers: Vec<String>, rows: Vec<Row>) -> Self {
        Self { headers, rows }
    }

    /// Builds a table from raw string cells; empty strings become missing.
    pub fn from_strings(headers: &[&str], rows: &[Vec<&str>]) -> Self {
        let headers = headers.iter().map(|h| h.to_string()).collect::<Vec<_>>();
        let rows = rows
            .iter()
            .map(|row| {
                row.iter()
                    .map(|cell| (!cell.is_empty()).then(|| Value::String(cell.to_string())))
                    .collect()
            })
            .collect();
        Self { headers, rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    /// Cells of one column in row order; `None` when the column is absent.
    pub fn column<'a>(&'a self, name: &str) -> Option<impl Iterator<Item = Option<&'a Value>> + use<'a>> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(move |row| row.get(idx).and_then(|v| v.as_ref())))
    }

    /// Keeps only the named columns, in the given order.
    pub fn project(&self, columns: &[&str]) -> Table {
        let indices = columns
            .iter()
            .filter_map(|name| self.column_index(name))
            .collect::<Vec<_>>();
        let headers = indices.iter().map(|&idx| self.headers[idx].clone()).collect();
        let rows = self
            .rows
            .iter()
            .map(|row| {
                indices
                    .iter()
                    .map(|&idx| row.get(idx).cloned().flatten())
                    .collect()
            })
            .collect();
        Table { headers, rows }
    }
}
