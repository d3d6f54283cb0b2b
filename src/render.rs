//! Presentation of report bundles as aligned text or JSON.

use std::fmt::Write as _;

use anyhow::{Context, Result};
use clap::ValueEnum;
use itertools::Itertools;

use crate::{
    aggregate::{AggregateResult, MetricValue, RankEntry},
    filter::FilterOptions,
    report::{ReportBundle, ReportStatus},
    table::{Align, render_table},
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

pub const NO_MATCHES_MESSAGE: &str = "No records found matching the selected filters.";

/// Groups the digits of an integer in threes: `1234567` → `1,234,567`.
pub fn group_thousands(value: i64) -> String {
    let digits = value.unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if value < 0 {
        grouped.push('-');
    }
    for (idx, ch) in digits.chars().enumerate() {
        if idx > 0 && (digits.len() - idx) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    grouped
}

/// Two decimals with grouped thousands.
pub fn format_amount(value: f64) -> String {
    let rounded = format!("{:.2}", value.abs());
    let (whole, fraction) = rounded.split_once('.').unwrap_or((rounded.as_str(), "00"));
    let whole = whole
        .parse::<i64>()
        .map(group_thousands)
        .unwrap_or_else(|_| whole.to_string());
    let sign = if value < 0.0 && rounded != "0.00" { "-" } else { "" };
    format!("{sign}{whole}.{fraction}")
}

pub fn format_metric(value: &MetricValue) -> String {
    match value {
        MetricValue::Count(count) => group_thousands(i64::try_from(*count).unwrap_or(i64::MAX)),
        MetricValue::Integer(value) => group_thousands(*value),
        MetricValue::Amount(amount) => format_amount(*amount),
    }
}

fn entry_rows(entries: &[RankEntry]) -> Vec<Vec<String>> {
    entries
        .iter()
        .map(|entry| vec![entry.value.clone(), format_metric(&MetricValue::Count(entry.count))])
        .collect()
}

pub fn render_text(bundle: &ReportBundle) -> String {
    let mut output = String::new();
    let _ = writeln!(output, "{}", bundle.title);
    let mut summary = format!(
        "{} of {} row(s) matched",
        group_thousands(bundle.rows_matched as i64),
        group_thousands(bundle.rows_loaded as i64)
    );
    if let Some((start, end)) = bundle.date_range {
        let _ = write!(summary, ", {start} to {end}");
    }
    let _ = writeln!(output, "{summary}");
    if bundle.status == ReportStatus::NoMatchingRecords {
        let _ = writeln!(output, "{NO_MATCHES_MESSAGE}");
    }

    let scalars = bundle
        .sections
        .iter()
        .filter_map(|section| match &section.result {
            AggregateResult::Scalar(value) => Some(vec![section.label.clone(), format_metric(value)]),
            _ => None,
        })
        .collect::<Vec<_>>();
    if !scalars.is_empty() {
        output.push('\n');
        output.push_str(&render_table(
            &["Metric".to_string(), "Value".to_string()],
            &scalars,
            &[Align::Left, Align::Right],
        ));
    }

    for section in &bundle.sections {
        let rows = match &section.result {
            AggregateResult::Scalar(_) => continue,
            AggregateResult::Series(points) => points
                .iter()
                .map(|p| vec![p.date.to_string(), format_metric(&MetricValue::Count(p.count))])
                .collect::<Vec<_>>(),
            AggregateResult::Ranking(entries) | AggregateResult::Distribution(entries) => {
                entry_rows(entries)
            }
        };
        let _ = writeln!(output, "\n{}", section.label);
        if rows.is_empty() {
            let _ = writeln!(output, "(no data)");
            continue;
        }
        output.push_str(&render_table(&section.headers, &rows, &[Align::Left, Align::Right]));
    }

    if !bundle.omitted.is_empty() {
        let _ = writeln!(
            output,
            "\nNot available (columns missing from upload): {}",
            bundle.omitted.iter().join(", ")
        );
    }
    if !bundle.coercion.is_clean() {
        let _ = writeln!(
            output,
            "\nUnconvertible values: {}",
            bundle
                .coercion
                .anomalies
                .iter()
                .map(|(column, count)| format!("{column} ({count})"))
                .join(", ")
        );
    }
    if bundle.coercion.dropped_rows > 0 {
        let _ = writeln!(output, "Rows dropped: {}", bundle.coercion.dropped_rows);
    }
    output
}

pub fn render_json<T: serde::Serialize>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value).context("Serializing output as JSON")
}

pub fn render_filter_options(options: &FilterOptions) -> String {
    let mut output = String::new();
    for category in &options.categories {
        let rows = category
            .values
            .iter()
            .map(|value| vec![value.clone()])
            .collect::<Vec<_>>();
        output.push_str(&render_table(&[category.column.clone()], &rows, &[]));
        output.push('\n');
    }
    match (&options.date_column, options.date_bounds) {
        (Some(column), Some((start, end))) => {
            let _ = writeln!(output, "{column}: {start} to {end}");
        }
        (Some(column), None) => {
            let _ = writeln!(output, "{column}: no valid dates");
        }
        _ => {}
    }
    if output.is_empty() {
        output.push_str("This report has no filters.\n");
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thousands_are_grouped() {
        assert_eq!(group_thousands(0), "0");
        assert_eq!(group_thousands(999), "999");
        assert_eq!(group_thousands(1_000), "1,000");
        assert_eq!(group_thousands(-1_234_567), "-1,234,567");
    }

    #[test]
    fn amounts_carry_two_decimals() {
        assert_eq!(format_amount(60.0), "60.00");
        assert_eq!(format_amount(1234.5), "1,234.50");
        assert_eq!(format_amount(-0.001), "0.00");
        assert_eq!(format_amount(-12.5), "-12.50");
    }

    #[test]
    fn metrics_format_by_kind() {
        assert_eq!(format_metric(&MetricValue::Count(12_000)), "12,000");
        assert_eq!(format_metric(&MetricValue::Integer(10)), "10");
        assert_eq!(format_metric(&MetricValue::Amount(20.0)), "20.00");
    }
}
