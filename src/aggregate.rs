//! The aggregation set.
//!
//! Each [`Aggregation`] reads a (filtered) table and produces one
//! [`AggregateResult`]. Aggregations are plain data so report definitions can be
//! stored as YAML. An aggregation whose source column is absent yields `None`
//! and the metric is simply not shown.
//!
//! Ranking ties are broken by first appearance in the table: the tally keeps
//! insertion order and the sort by count is stable. Reordering the input rows
//! may therefore reorder tied entries.

use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::{
    data::Value,
    dataset::Table,
    schema::{ColumnType, ReportSchema},
};

pub const DEFAULT_TOP_N: usize = 10;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum NumericTest {
    Zero,
    Positive,
}

impl NumericTest {
    fn holds(&self, value: f64) -> bool {
        match self {
            NumericTest::Zero => value == 0.0,
            NumericTest::Positive => value > 0.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Bucket {
    pub name: String,
    pub test: NumericTest,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Aggregation {
    RowCount {
        label: String,
    },
    Sum {
        label: String,
        column: String,
    },
    /// Sum over rows of `left * right`.
    SumProduct {
        label: String,
        left: String,
        right: String,
    },
    Mean {
        label: String,
        column: String,
    },
    CountEquals {
        label: String,
        column: String,
        value: String,
    },
    CountWhere {
        label: String,
        column: String,
        test: NumericTest,
    },
    DailyCounts {
        label: String,
        column: String,
        #[serde(default = "default_count_label")]
        count_label: String,
    },
    TopValues {
        label: String,
        column: String,
        #[serde(default = "default_key_label")]
        key_label: String,
        #[serde(default = "default_count_label")]
        count_label: String,
        #[serde(default = "default_limit")]
        limit: usize,
    },
    Distribution {
        label: String,
        column: String,
        buckets: Vec<Bucket>,
    },
}

fn default_key_label() -> String {
    "Value".to_string()
}

fn default_count_label() -> String {
    "Count".to_string()
}

const fn default_limit() -> usize {
    DEFAULT_TOP_N
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
#[serde(untagged)]
pub enum MetricValue {
    Count(u64),
    Integer(i64),
    Amount(f64),
}

impl MetricValue {
    pub fn as_f64(&self) -> f64 {
        match self {
            MetricValue::Count(c) => *c as f64,
            MetricValue::Integer(i) => *i as f64,
            MetricValue::Amount(a) => *a,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SeriesPoint {
    pub date: NaiveDate,
    pub count: u64,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RankEntry {
    pub value: String,
    pub count: u64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", content = "data", rename_all = "kebab-case")]
pub enum AggregateResult {
    Scalar(MetricValue),
    Series(Vec<SeriesPoint>),
    Ranking(Vec<RankEntry>),
    Distribution(Vec<RankEntry>),
}

impl Aggregation {
    pub fn label(&self) -> &str {
        match self {
            Aggregation::RowCount { label }
            | Aggregation::Sum { label, .. }
            | Aggregation::SumProduct { label, .. }
            | Aggregation::Mean { label, .. }
            | Aggregation::CountEquals { label, .. }
            | Aggregation::CountWhere { label, .. }
            | Aggregation::DailyCounts { label, .. }
            | Aggregation::TopValues { label, .. }
            | Aggregation::Distribution { label, .. } => label,
        }
    }

    /// Columns that must exist in the table for this aggregation to be shown.
    pub fn source_columns(&self) -> Vec<&str> {
        match self {
            Aggregation::RowCount { .. } => Vec::new(),
            Aggregation::SumProduct { left, right, .. } => vec![left.as_str(), right.as_str()],
            Aggregation::Sum { column, .. }
            | Aggregation::Mean { column, .. }
            | Aggregation::CountEquals { column, .. }
            | Aggregation::CountWhere { column, .. }
            | Aggregation::DailyCounts { column, .. }
            | Aggregation::TopValues { column, .. }
            | Aggregation::Distribution { column, .. } => vec![column.as_str()],
        }
    }

    pub fn evaluate(&self, table: &Table) -> Option<AggregateResult> {
        self.evaluate_declared(table, None)
    }

    /// Like [`Aggregation::evaluate`], but scalar result types follow the
    /// declared column types of `schema`, so an empty table still yields an
    /// amount for a float column.
    pub fn evaluate_declared(
        &self,
        table: &Table,
        schema: Option<&ReportSchema>,
    ) -> Option<AggregateResult> {
        let result = match self {
            Aggregation::RowCount { .. } => {
                AggregateResult::Scalar(MetricValue::Count(table.len() as u64))
            }
            Aggregation::Sum { column, .. } => {
                let declared = schema.and_then(|s| s.declared_type(column));
                AggregateResult::Scalar(sum(table, column, declared)?)
            }
            Aggregation::SumProduct { left, right, .. } => {
                AggregateResult::Scalar(MetricValue::Amount(sum_product(table, left, right)?))
            }
            Aggregation::Mean { column, .. } => {
                AggregateResult::Scalar(MetricValue::Amount(mean(table, column)?))
            }
            Aggregation::CountEquals { column, value, .. } => {
                let count = table
                    .column(column)?
                    .flatten()
                    .filter(|cell| cell.as_display() == *value)
                    .count();
                AggregateResult::Scalar(MetricValue::Count(count as u64))
            }
            Aggregation::CountWhere { column, test, .. } => {
                AggregateResult::Scalar(MetricValue::Count(count_where(table, column, *test)?))
            }
            Aggregation::DailyCounts { column, .. } => {
                AggregateResult::Series(daily_counts(table, column)?)
            }
            Aggregation::TopValues { column, limit, .. } => {
                let mut tally = FrequencyTally::default();
                for cell in table.column(column)?.flatten() {
                    tally.ingest(cell);
                }
                AggregateResult::Ranking(tally.ranked(*limit))
            }
            Aggregation::Distribution {
                column, buckets, ..
            } => {
                let slices = buckets
                    .iter()
                    .map(|bucket| {
                        count_where(table, column, bucket.test).map(|count| RankEntry {
                            value: bucket.name.clone(),
                            count,
                        })
                    })
                    .collect::<Option<Vec<_>>>()?;
                AggregateResult::Distribution(slices)
            }
        };
        Some(result)
    }
}

/// Integer columns sum to an integer, float columns to an amount. Without a
/// declared type the cells decide: any float makes the sum an amount.
fn sum(table: &Table, column: &str, declared: Option<ColumnType>) -> Option<MetricValue> {
    let mut integer_total: i64 = 0;
    let mut float_total = 0.0;
    let mut saw_float = false;
    for cell in table.column(column)?.flatten() {
        match cell {
            Value::Integer(i) => {
                integer_total = integer_total.saturating_add(*i);
                float_total += *i as f64;
            }
            Value::Float(f) => {
                saw_float = true;
                float_total += f;
            }
            _ => {}
        }
    }
    let amount = match declared {
        Some(ColumnType::Float) => true,
        Some(ColumnType::Integer) => false,
        _ => saw_float,
    };
    Some(if amount {
        MetricValue::Amount(float_total)
    } else {
        MetricValue::Integer(integer_total)
    })
}

fn sum_product(table: &Table, left: &str, right: &str) -> Option<f64> {
    let left_idx = table.column_index(left)?;
    let right_idx = table.column_index(right)?;
    let total = table
        .rows
        .iter()
        .filter_map(|row| {
            let a = row.get(left_idx)?.as_ref()?.as_f64()?;
            let b = row.get(right_idx)?.as_ref()?.as_f64()?;
            Some(a * b)
        })
        .sum();
    Some(total)
}

fn mean(table: &Table, column: &str) -> Option<f64> {
    let (total, count) = table
        .column(column)?
        .flatten()
        .filter_map(Value::as_f64)
        .fold((0.0, 0usize), |(total, count), value| (total + value, count + 1));
    Some(if count == 0 { 0.0 } else { total / count as f64 })
}

fn count_where(table: &Table, column: &str, test: NumericTest) -> Option<u64> {
    let count = table
        .column(column)?
        .flatten()
        .filter_map(Value::as_f64)
        .filter(|value| test.holds(*value))
        .count();
    Some(count as u64)
}

/// One point per observed calendar day, chronologically. Days without rows
/// and rows without a date are left out.
fn daily_counts(table: &Table, column: &str) -> Option<Vec<SeriesPoint>> {
    let mut days: BTreeMap<NaiveDate, u64> = BTreeMap::new();
    for date in table.column(column)?.flatten().filter_map(Value::as_date) {
        *days.entry(date).or_insert(0) += 1;
    }
    Some(
        days.into_iter()
            .map(|(date, count)| SeriesPoint { date, count })
            .collect(),
    )
}

/// Value counts that remember the order in which values first appeared.
#[derive(Debug, Default)]
pub struct FrequencyTally {
    positions: HashMap<String, usize>,
    counts: Vec<(String, u64)>,
}

impl FrequencyTally {
    pub fn ingest(&mut self, value: &Value) {
        let key = value.as_display();
        match self.positions.get(&key) {
            Some(&idx) => self.counts[idx].1 += 1,
            None => {
                self.positions.insert(key.clone(), self.counts.len());
                self.counts.push((key, 1));
            }
        }
    }

    /// Entries by descending count, ties in first-seen order, capped at `top`
    /// (0 keeps everything).
    pub fn ranked(&self, top: usize) -> Vec<RankEntry> {
        let mut items = self.counts.clone();
        items.sort_by(|a, b| b.1.cmp(&a.1));
        if top > 0 && items.len() > top {
            items.truncate(top);
        }
        items
            .into_iter()
            .map(|(value, count)| RankEntry { value, count })
            .collect()
    }
}
