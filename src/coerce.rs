//! Type coercion stage.
//!
//! Converts declared columns to their semantic type. Cells that cannot be
//! converted are anomalies; what happens to them is chosen by a
//! [`CoercionPolicy`]. With the default policy coercion is total: bad dates
//! become missing, bad numbers become zero, and every row survives.

use std::collections::BTreeMap;

use clap::ValueEnum;
use log::warn;
use serde::{Deserialize, Serialize};

use crate::{
    data::{Value, float_to_integer, parse_float, parse_integer, parse_naive_datetime},
    dataset::Table,
    error::ReportError,
    schema::{ColumnType, ReportSchema},
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[value(rename_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum CoercionPolicy {
    /// Replace the cell with the type default (missing date, zero number).
    #[default]
    DefaultValue,
    /// Drop every row holding an unconvertible cell.
    DropRow,
    /// Abort the render on the first unconvertible cell.
    FailFast,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CoercionReport {
    /// Unconvertible cells per column.
    pub anomalies: BTreeMap<String, usize>,
    pub dropped_rows: usize,
}

impl CoercionReport {
    pub fn total_anomalies(&self) -> usize {
        self.anomalies.values().sum()
    }

    pub fn is_clean(&self) -> bool {
        self.anomalies.is_empty()
    }
}

struct Converted {
    value: Option<Value>,
    anomaly: bool,
}

impl Converted {
    fn ok(value: Option<Value>) -> Self {
        Self {
            value,
            anomaly: false,
        }
    }

    fn anomaly(value: Option<Value>) -> Self {
        Self {
            value,
            anomaly: true,
        }
    }
}

fn convert(cell: Option<Value>, datatype: ColumnType) -> Converted {
    match datatype {
        ColumnType::String => Converted::ok(cell),
        ColumnType::DateTime => match cell {
            None => Converted::ok(None),
            Some(Value::DateTime(dt)) => Converted::ok(Some(Value::DateTime(dt))),
            Some(Value::String(raw)) => match parse_naive_datetime(&raw) {
                Ok(dt) => Converted::ok(Some(Value::DateTime(dt))),
                Err(_) => Converted::anomaly(None),
            },
            Some(_) => Converted::anomaly(None),
        },
        ColumnType::Integer => {
            let zero = Some(Value::Integer(0));
            match cell {
                None => Converted::ok(zero),
                Some(Value::Integer(i)) => Converted::ok(Some(Value::Integer(i))),
                Some(Value::Float(f)) => match float_to_integer(f) {
                    Some(i) => Converted::ok(Some(Value::Integer(i))),
                    None => Converted::anomaly(zero),
                },
                Some(Value::String(raw)) => match parse_integer(&raw) {
                    Some(i) => Converted::ok(Some(Value::Integer(i))),
                    None => Converted::anomaly(zero),
                },
                Some(Value::DateTime(_)) => Converted::anomaly(zero),
            }
        }
        ColumnType::Float => {
            let zero = Some(Value::Float(0.0));
            match cell {
                None => Converted::ok(zero),
                Some(Value::Float(f)) if f.is_finite() => Converted::ok(Some(Value::Float(f))),
                Some(Value::Integer(i)) => Converted::ok(Some(Value::Float(i as f64))),
                Some(Value::String(raw)) => match parse_float(&raw) {
                    Some(f) => Converted::ok(Some(Value::Float(f))),
                    None => Converted::anomaly(zero),
                },
                Some(_) => Converted::anomaly(zero),
            }
        }
    }
}

/// Coerces every declared column present in `table`. Undeclared columns pass
/// through untouched. Re-running on an already coerced table changes nothing.
pub fn coerce(
    mut table: Table,
    schema: &ReportSchema,
    policy: CoercionPolicy,
) -> Result<(Table, CoercionReport), ReportError> {
    let targets = table
        .headers
        .iter()
        .enumerate()
        .filter_map(|(idx, header)| {
            schema
                .columns
                .iter()
                .find(|spec| schema.header_rule.normalize(&spec.name) == *header)
                .filter(|spec| spec.datatype != ColumnType::String)
                .map(|spec| (idx, spec.datatype))
        })
        .collect::<Vec<_>>();

    let mut report = CoercionReport::default();
    if targets.is_empty() {
        return Ok((table, report));
    }

    let mut keep = vec![true; table.rows.len()];
    for (row_idx, row) in table.rows.iter_mut().enumerate() {
        for &(col_idx, datatype) in &targets {
            let Some(slot) = row.get_mut(col_idx) else {
                continue;
            };
            let original = slot.take();
            let shown = original.as_ref().map(Value::as_display);
            let converted = convert(original, datatype);
            *slot = converted.value;
            if !converted.anomaly {
                continue;
            }
            let column = &table.headers[col_idx];
            *report.anomalies.entry(column.clone()).or_insert(0) += 1;
            match policy {
                CoercionPolicy::DefaultValue => {}
                CoercionPolicy::DropRow => keep[row_idx] = false,
                CoercionPolicy::FailFast => {
                    return Err(ReportError::CoercionFailed {
                        column: column.clone(),
                        row: row_idx + 2,
                        value: shown.unwrap_or_default(),
                        target: datatype.to_string(),
                    });
                }
            }
        }
    }

    if policy == CoercionPolicy::DropRow {
        let before = table.rows.len();
        let mut flags = keep.into_iter();
        table.rows.retain(|_| flags.next().unwrap_or(true));
        report.dropped_rows = before - table.rows.len();
    }
    for (column, count) in &report.anomalies {
        warn!("{count} value(s) in column '{column}' could not be converted");
    }
    Ok((table, report))
}
