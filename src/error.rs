//! Error taxonomy for the report pipeline.
//!
//! Every variant is terminal for the current render. An empty filter result is
//! not an error; it is reported through
//! [`ReportStatus::NoMatchingRecords`](crate::report::ReportStatus).

use thiserror::Error;

use crate::report::ReportKind;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReportError {
    /// Required columns are absent from the uploaded table.
    #[error("Missing columns: {}", columns.join(", "))]
    MissingColumns {
        report: ReportKind,
        columns: Vec<String>,
    },
    /// The table holds no rows once loaded and coerced.
    #[error("No data found in the uploaded {report} report")]
    NoData { report: ReportKind },
    /// The upload could not be read as a table at all.
    #[error("Error processing file: {reason}")]
    Unreadable { reason: String },
    /// The selection names a column the report does not offer as a filter.
    #[error("The {report} report cannot be filtered by '{column}'")]
    UnsupportedFilter { report: ReportKind, column: String },
    /// A cell could not be coerced and the fail-fast policy is active.
    #[error("Column '{column}' row {row}: cannot convert '{value}' to {target}")]
    CoercionFailed {
        column: String,
        row: usize,
        value: String,
        target: String,
    },
}

impl ReportError {
    pub fn unreadable(reason: impl Into<String>) -> Self {
        ReportError::Unreadable {
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_columns_message_lists_names_verbatim() {
        let err = ReportError::MissingColumns {
            report: ReportKind::Order,
            columns: vec!["sku".to_string(), "item-price".to_string()],
        };
        assert_eq!(err.to_string(), "Missing columns: sku, item-price");
    }
}
