//! Report schemas and the schema validator.
//!
//! A [`ReportSchema`] lists the columns a report understands, the semantic type
//! each one is coerced to, and whether it must be present. Column names can be
//! compared raw or after trimming and lower-casing, depending on the
//! [`HeaderRule`] of the report.

use std::fmt;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::dataset::Table;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    String,
    Integer,
    Float,
    DateTime,
}

impl ColumnType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnType::String => "string",
            ColumnType::Integer => "integer",
            ColumnType::Float => "float",
            ColumnType::DateTime => "datetime",
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, ColumnType::Integer | ColumnType::Float)
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum HeaderRule {
    /// Compare header names byte-for-byte.
    #[default]
    Exact,
    /// Trim surrounding whitespace and lower-case every header.
    TrimLowercase,
}

impl HeaderRule {
    pub fn normalize(&self, name: &str) -> String {
        match self {
            HeaderRule::Exact => name.to_string(),
            HeaderRule::TrimLowercase => name.trim().to_lowercase(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ColumnSpec {
    pub name: String,
    #[serde(default = "ColumnSpec::default_datatype")]
    pub datatype: ColumnType,
    #[serde(default = "ColumnSpec::default_required")]
    pub required: bool,
}

impl ColumnSpec {
    pub fn required(name: &str, datatype: ColumnType) -> Self {
        Self {
            name: name.to_string(),
            datatype,
            required: true,
        }
    }

    pub fn optional(name: &str, datatype: ColumnType) -> Self {
        Self {
            name: name.to_string(),
            datatype,
            required: false,
        }
    }

    const fn default_datatype() -> ColumnType {
        ColumnType::String
    }

    const fn default_required() -> bool {
        true
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReportSchema {
    #[serde(default)]
    pub header_rule: HeaderRule,
    /// Drop every column the schema does not declare before coercion.
    #[serde(default)]
    pub project: bool,
    pub columns: Vec<ColumnSpec>,
}

impl ReportSchema {
    pub fn column(&self, name: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Declared type of a table column, matched under the header rule.
    pub fn declared_type(&self, column: &str) -> Option<ColumnType> {
        let wanted = self.header_rule.normalize(column);
        self.columns
            .iter()
            .find(|c| self.header_rule.normalize(&c.name) == wanted)
            .map(|c| c.datatype)
    }

    pub fn required_names(&self) -> impl Iterator<Item = &str> {
        self.columns
            .iter()
            .filter(|c| c.required)
            .map(|c| c.name.as_str())
    }

    /// Rewrites the table's headers according to the header rule.
    pub fn normalize_headers(&self, table: &mut Table) {
        if self.header_rule == HeaderRule::Exact {
            return;
        }
        for header in &mut table.headers {
            *header = self.header_rule.normalize(header);
        }
    }

    /// Returns the required column names that are absent from `headers`, in
    /// schema order. An empty result means the table satisfies the schema.
    pub fn missing_columns(&self, headers: &[String]) -> Vec<String> {
        let present = headers
            .iter()
            .map(|h| self.header_rule.normalize(h))
            .collect::<Vec<_>>();
        self.required_names()
            .filter(|name| {
                let wanted = self.header_rule.normalize(name);
                !present.iter().any(|h| *h == wanted)
            })
            .map(str::to_string)
            .collect()
    }

    /// Validator entry point: `Ok` when every required column is present.
    pub fn validate(&self, table: &Table) -> Result<(), Vec<String>> {
        let missing = self.missing_columns(&table.headers);
        if missing.is_empty() {
            return Ok(());
        }
        let candidates = table.headers.iter().map(String::as_str).collect::<Vec<_>>();
        for name in &missing {
            let close = similar::get_close_matches(name.as_str(), &candidates, 1, 0.8);
            if let Some(suggestion) = close.first() {
                warn!("Column '{name}' not found; did you mean '{suggestion}'?");
            }
        }
        Err(missing)
    }
}
