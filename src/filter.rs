use std::collections::{BTreeMap, BTreeSet, HashSet};

use anyhow::{Result, anyhow};
use chrono::NaiveDate;
use log::debug;
use serde::Serialize;

use crate::{dataset::Table, data::Value};

/// User-chosen subset criteria for one render. Anything left unset, including
/// an empty value set, selects every observed value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterSelection {
    /// Allowed values per categorical column.
    pub categories: BTreeMap<String, BTreeSet<String>>,
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl FilterSelection {
    pub fn with_values<I, S>(mut self, column: &str, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.categories
            .entry(column.to_string())
            .or_default()
            .extend(values.into_iter().map(Into::into));
        self
    }

    pub fn between(mut self, start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        self.start = start;
        self.end = end;
        self
    }

    /// Fills unset bounds from the observed bounds of the table.
    pub fn resolve_interval(
        &self,
        observed: Option<(NaiveDate, NaiveDate)>,
    ) -> Option<(NaiveDate, NaiveDate)> {
        match (self.start, self.end, observed) {
            (Some(start), Some(end), _) => Some((start, end)),
            (start, end, Some((min, max))) => Some((start.unwrap_or(min), end.unwrap_or(max))),
            (Some(start), None, None) => Some((start, NaiveDate::MAX)),
            (None, Some(end), None) => Some((NaiveDate::MIN, end)),
            (None, None, None) => None,
        }
    }
}

/// Parses `column=value` arguments; repeated columns accumulate into one set.
pub fn parse_filters(filters: &[String]) -> Result<FilterSelection> {
    let mut selection = FilterSelection::default();
    for filter in filters {
        let (column, value) = parse_filter(filter)?;
        selection = selection.with_values(&column, [value]);
    }
    Ok(selection)
}

fn parse_filter(filter: &str) -> Result<(String, String)> {
    let trimmed = filter.trim();
    if trimmed.is_empty() {
        return Err(anyhow!("Empty filter expression"));
    }
    let Some((left, right)) = trimmed.split_once('=') else {
        return Err(anyhow!(
            "Failed to parse filter expression '{trimmed}', expected column=value"
        ));
    };
    let column = left.trim();
    if column.is_empty() {
        return Err(anyhow!("Filter expression '{trimmed}' is missing a column"));
    }
    Ok((column.to_string(), unquote(right.trim()).to_string()))
}

fn unquote(value: &str) -> &str {
    if value.len() >= 2 {
        let bytes = value.as_bytes();
        if (bytes[0] == b'"' && bytes[value.len() - 1] == b'"')
            || (bytes[0] == b'\'' && bytes[value.len() - 1] == b'\'')
        {
            return &value[1..value.len() - 1];
        }
    }
    value
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryOptions {
    pub column: String,
    pub values: Vec<String>,
}

/// What a presentation layer needs to pre-populate its selectors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FilterOptions {
    pub categories: Vec<CategoryOptions>,
    pub date_column: Option<String>,
    pub date_bounds: Option<(NaiveDate, NaiveDate)>,
}

impl FilterOptions {
    pub fn collect(table: &Table, categorical: &[String], date_column: Option<&str>) -> Self {
        let categories = categorical
            .iter()
            .filter(|column| table.has_column(column))
            .map(|column| CategoryOptions {
                column: column.clone(),
                values: distinct_values(table, column),
            })
            .collect();
        let date_column = date_column.filter(|c| table.has_column(c));
        Self {
            categories,
            date_column: date_column.map(str::to_string),
            date_bounds: date_column.and_then(|c| date_bounds(table, c)),
        }
    }
}

/// Distinct non-missing values of a column in first-observed order.
pub fn distinct_values(table: &Table, column: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut values = Vec::new();
    if let Some(cells) = table.column(column) {
        for value in cells.flatten() {
            let key = value.as_display();
            if seen.insert(key.clone()) {
                values.push(key);
            }
        }
    }
    values
}

/// Minimum and maximum observed calendar dates of a date-time column.
pub fn date_bounds(table: &Table, column: &str) -> Option<(NaiveDate, NaiveDate)> {
    table
        .column(column)?
        .flatten()
        .filter_map(Value::as_date)
        .fold(None, |acc, date| match acc {
            None => Some((date, date)),
            Some((min, max)) => Some((min.min(date), max.max(date))),
        })
}

enum Condition {
    Member { index: usize, allowed: HashSet<String> },
    Within { index: usize, start: NaiveDate, end: NaiveDate },
}

impl Condition {
    fn matches(&self, row: &[Option<Value>]) -> bool {
        match self {
            Condition::Member { index, allowed } => row
                .get(*index)
                .and_then(|v| v.as_ref())
                .is_some_and(|v| allowed.contains(&v.as_display())),
            Condition::Within { index, start, end } => row
                .get(*index)
                .and_then(|v| v.as_ref())
                .and_then(Value::as_date)
                .is_some_and(|date| *start <= date && date <= *end),
        }
    }
}

/// The filter engine. Returns the retained rows, in order, as a new table.
///
/// A dimension whose selection covers everything observed in `table` is
/// skipped, so rows with a missing value in that column survive. Dates are
/// compared by calendar day, inclusive on both ends.
pub fn apply(table: &Table, selection: &FilterSelection, date_column: Option<&str>) -> Table {
    let conditions = plan_conditions(table, selection, date_column);
    if conditions.is_empty() {
        return table.clone();
    }
    let rows = table
        .rows
        .iter()
        .filter(|row| conditions.iter().all(|condition| condition.matches(row)))
        .cloned()
        .collect();
    Table::new(table.headers.clone(), rows)
}

fn plan_conditions(
    table: &Table,
    selection: &FilterSelection,
    date_column: Option<&str>,
) -> Vec<Condition> {
    let mut conditions = Vec::new();
    for (column, allowed) in &selection.categories {
        let Some(index) = table.column_index(column) else {
            debug!("Skipping filter on absent column '{column}'");
            continue;
        };
        if allowed.is_empty() {
            debug!("Empty selection on '{column}' selects every observed value");
            continue;
        }
        let observed = distinct_values(table, column);
        if observed.iter().all(|value| allowed.contains(value)) {
            debug!("Filter on '{column}' selects every observed value");
            continue;
        }
        conditions.push(Condition::Member {
            index,
            allowed: allowed.iter().cloned().collect(),
        });
    }

    if let Some(column) = date_column
        && let Some(index) = table.column_index(column)
    {
        let observed = date_bounds(table, column);
        if let Some((start, end)) = selection.resolve_interval(observed) {
            let covers_all = observed.is_some_and(|(min, max)| start <= min && max <= end);
            if covers_all {
                debug!("Date interval {start}..={end} covers every observed '{column}'");
            } else {
                conditions.push(Condition::Within { index, start, end });
            }
        }
    }
    conditions
}
