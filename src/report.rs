//! Report definitions and the generic report pipeline.
//!
//! Every report type is the same composition: validate → coerce → filter →
//! aggregate. What differs between them lives in a [`ReportDefinition`]: the
//! schema, the filter dimensions, and the aggregation catalog. Built-in
//! definitions cover the order, return, and inventory exports; custom ones can
//! be loaded from YAML.
//!
//! A [`Pipeline`] holds no state between calls. [`Pipeline::prepare`] runs once
//! per upload, [`Pipeline::evaluate`] once per filter change.

use std::{fmt, fs::File, io::BufReader, path::Path};

use anyhow::{Context, Result, ensure};
use chrono::NaiveDate;
use clap::ValueEnum;
use heck::ToSnakeCase;
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::{
    aggregate::{AggregateResult, Aggregation, Bucket, DEFAULT_TOP_N, MetricValue, NumericTest},
    coerce::{self, CoercionPolicy, CoercionReport},
    dataset::Table,
    error::ReportError,
    filter::{self, FilterOptions, FilterSelection},
    schema::{ColumnSpec, ColumnType, HeaderRule, ReportSchema},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ReportKind {
    Order,
    Return,
    Inventory,
}

impl ReportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportKind::Order => "order",
            ReportKind::Return => "return",
            ReportKind::Inventory => "inventory",
        }
    }
}

impl fmt::Display for ReportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReportDefinition {
    pub kind: ReportKind,
    pub title: String,
    pub schema: ReportSchema,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub categorical_filters: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_filter: Option<String>,
    pub aggregations: Vec<Aggregation>,
}

fn top(label: &str, column: &str, key_label: &str, count_label: &str) -> Aggregation {
    Aggregation::TopValues {
        label: label.to_string(),
        column: column.to_string(),
        key_label: key_label.to_string(),
        count_label: count_label.to_string(),
        limit: DEFAULT_TOP_N,
    }
}

impl ReportDefinition {
    pub fn builtin(kind: ReportKind) -> Self {
        match kind {
            ReportKind::Order => Self::order(),
            ReportKind::Return => Self::returns(),
            ReportKind::Inventory => Self::inventory(),
        }
    }

    fn order() -> Self {
        use ColumnType::*;
        Self {
            kind: ReportKind::Order,
            title: "Order Report".to_string(),
            schema: ReportSchema {
                header_rule: HeaderRule::Exact,
                project: false,
                columns: vec![
                    ColumnSpec::required("purchase-date", DateTime),
                    ColumnSpec::required("order-status", String),
                    ColumnSpec::required("fulfillment-channel", String),
                    ColumnSpec::required("item-price", Float),
                    ColumnSpec::required("ship-city", String),
                    ColumnSpec::required("sku", String),
                    ColumnSpec::required("product-name", String),
                    ColumnSpec::optional("last-updated-date", DateTime),
                ],
            },
            categorical_filters: vec!["order-status".into(), "fulfillment-channel".into()],
            date_filter: Some("purchase-date".into()),
            aggregations: vec![
                Aggregation::RowCount {
                    label: "Total Orders".into(),
                },
                Aggregation::Sum {
                    label: "Total Revenue".into(),
                    column: "item-price".into(),
                },
                Aggregation::CountEquals {
                    label: "Cancelled Orders".into(),
                    column: "order-status".into(),
                    value: "Cancelled".into(),
                },
                Aggregation::DailyCounts {
                    label: "Orders Over Time".into(),
                    column: "purchase-date".into(),
                    count_label: "Orders".into(),
                },
                top("Top Shipping Cities", "ship-city", "City", "Orders"),
                top(
                    "Most Repeatedly Purchased Products",
                    "product-name",
                    "Product Name",
                    "Purchase Count",
                ),
                top("Top Selling SKUs", "sku", "SKU", "Order Count"),
            ],
        }
    }

    fn returns() -> Self {
        use ColumnType::*;
        Self {
            kind: ReportKind::Return,
            title: "Return Report".to_string(),
            schema: ReportSchema {
                header_rule: HeaderRule::TrimLowercase,
                project: false,
                columns: vec![
                    ColumnSpec::optional("order date", DateTime),
                    ColumnSpec::optional("return request date", DateTime),
                    ColumnSpec::optional("return delivery date", DateTime),
                    ColumnSpec::optional("safet claim creation time", DateTime),
                    ColumnSpec::optional("refunded amount", Float),
                    ColumnSpec::optional("order amount", Float),
                    ColumnSpec::optional("return request status", String),
                    ColumnSpec::optional("return reason", String),
                    ColumnSpec::optional("merchant sku", String),
                    ColumnSpec::optional("item name", String),
                ],
            },
            categorical_filters: vec!["return request status".into(), "return reason".into()],
            date_filter: Some("order date".into()),
            aggregations: vec![
                Aggregation::RowCount {
                    label: "Total Return Requests".into(),
                },
                Aggregation::Sum {
                    label: "Total Refunded Amount".into(),
                    column: "refunded amount".into(),
                },
                Aggregation::Sum {
                    label: "Total Order Amount".into(),
                    column: "order amount".into(),
                },
                Aggregation::DailyCounts {
                    label: "Return Requests Over Time".into(),
                    column: "return request date".into(),
                    count_label: "Returns".into(),
                },
                top("Top Return Reasons", "return reason", "Return Reason", "Count"),
                top("Top Returned SKUs", "merchant sku", "SKU", "Return Count"),
                top(
                    "Most Frequently Returned Products",
                    "item name",
                    "Product Name",
                    "Return Count",
                ),
            ],
        }
    }

    fn inventory() -> Self {
        use ColumnType::*;
        Self {
            kind: ReportKind::Inventory,
            title: "Inventory Report".to_string(),
            schema: ReportSchema {
                header_rule: HeaderRule::Exact,
                project: true,
                columns: vec![
                    ColumnSpec::required("sku", String),
                    ColumnSpec::required("asin", String),
                    ColumnSpec::required("price", Float),
                    ColumnSpec::required("quantity", Integer),
                ],
            },
            categorical_filters: Vec::new(),
            date_filter: None,
            aggregations: vec![
                Aggregation::Sum {
                    label: "Total Inventory".into(),
                    column: "quantity".into(),
                },
                Aggregation::SumProduct {
                    label: "Total Value".into(),
                    left: "price".into(),
                    right: "quantity".into(),
                },
                Aggregation::Mean {
                    label: "Avg. Price".into(),
                    column: "price".into(),
                },
                Aggregation::CountWhere {
                    label: "Zero Stock SKUs".into(),
                    column: "quantity".into(),
                    test: NumericTest::Zero,
                },
                Aggregation::CountWhere {
                    label: "Available SKUs".into(),
                    column: "quantity".into(),
                    test: NumericTest::Positive,
                },
                Aggregation::Distribution {
                    label: "Stock Distribution".into(),
                    column: "quantity".into(),
                    buckets: vec![
                        Bucket {
                            name: "Zero Stock".into(),
                            test: NumericTest::Zero,
                        },
                        Bucket {
                            name: "With Stock".into(),
                            test: NumericTest::Positive,
                        },
                    ],
                },
            ],
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Opening definition file {path:?}"))?;
        let reader = BufReader::new(file);
        let definition: ReportDefinition =
            serde_yaml::from_reader(reader).context("Parsing report definition YAML")?;
        definition.ensure_consistent()?;
        Ok(definition)
    }

    pub fn to_yaml_string(&self) -> Result<String> {
        serde_yaml::to_string(self).context("Serializing report definition to YAML")
    }

    /// Filter dimensions must be declared columns of the schema.
    pub fn ensure_consistent(&self) -> Result<()> {
        for column in self.categorical_filters.iter().chain(self.date_filter.iter()) {
            ensure!(
                self.schema.column(column).is_some(),
                "Filter column '{column}' is not declared in the {} schema",
                self.kind
            );
        }
        if let Some(column) = &self.date_filter {
            let datatype = self.schema.column(column).map(|c| c.datatype);
            ensure!(
                datatype == Some(ColumnType::DateTime),
                "Date filter column '{column}' must be declared as datetime"
            );
        }
        for aggregation in &self.aggregations {
            if let Aggregation::TopValues { label, limit, .. } = aggregation {
                ensure!(
                    (1..=DEFAULT_TOP_N).contains(limit),
                    "'{label}' limit must be between 1 and {DEFAULT_TOP_N}, got {limit}"
                );
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReportStatus {
    Complete,
    NoMatchingRecords,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Section {
    pub key: String,
    pub label: String,
    /// Column headings for tabular results; empty for scalars.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub headers: Vec<String>,
    pub result: AggregateResult,
}

/// Everything one render produces. Plain values only, no styling.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportBundle {
    pub report: ReportKind,
    pub title: String,
    pub status: ReportStatus,
    pub rows_loaded: usize,
    pub rows_matched: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_range: Option<(NaiveDate, NaiveDate)>,
    pub sections: Vec<Section>,
    /// Labels of aggregations whose source columns are absent.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub omitted: Vec<String>,
    pub coercion: CoercionReport,
}

impl ReportBundle {
    pub fn section(&self, label: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.label == label)
    }

    pub fn metric(&self, label: &str) -> Option<MetricValue> {
        match self.section(label)?.result {
            AggregateResult::Scalar(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_empty_result(&self) -> bool {
        self.status == ReportStatus::NoMatchingRecords
    }
}

/// A validated, coerced upload, ready to be filtered any number of times.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedReport {
    table: Table,
    coercion: CoercionReport,
}

impl PreparedReport {
    pub fn table(&self) -> &Table {
        &self.table
    }

    pub fn coercion(&self) -> &CoercionReport {
        &self.coercion
    }

    pub fn into_table(self) -> Table {
        self.table
    }
}

#[derive(Debug, Clone)]
pub struct Pipeline {
    definition: ReportDefinition,
    policy: CoercionPolicy,
}

impl Pipeline {
    pub fn new(definition: ReportDefinition, policy: CoercionPolicy) -> Self {
        Self { definition, policy }
    }

    pub fn builtin(kind: ReportKind) -> Self {
        Self::new(ReportDefinition::builtin(kind), CoercionPolicy::default())
    }

    pub fn definition(&self) -> &ReportDefinition {
        &self.definition
    }

    pub fn kind(&self) -> ReportKind {
        self.definition.kind
    }

    fn normalized(&self, name: &str) -> String {
        self.definition.schema.header_rule.normalize(name)
    }

    /// Validate, project, and coerce an uploaded table.
    pub fn prepare(&self, mut table: Table) -> Result<PreparedReport, ReportError> {
        let schema = &self.definition.schema;
        schema.normalize_headers(&mut table);
        schema
            .validate(&table)
            .map_err(|columns| ReportError::MissingColumns {
                report: self.kind(),
                columns,
            })?;
        if schema.project {
            let declared = schema
                .columns
                .iter()
                .map(|c| self.normalized(&c.name))
                .collect::<Vec<_>>();
            let declared = declared.iter().map(String::as_str).collect::<Vec<_>>();
            table = table.project(&declared);
        }
        let (table, coercion) = coerce::coerce(table, schema, self.policy)?;
        if table.is_empty() {
            return Err(ReportError::NoData {
                report: self.kind(),
            });
        }
        info!(
            "Loaded {} {} row(s) across {} column(s)",
            table.len(),
            self.kind(),
            table.headers.len()
        );
        Ok(PreparedReport { table, coercion })
    }

    pub fn filter_options(&self, prepared: &PreparedReport) -> FilterOptions {
        let categorical = self
            .definition
            .categorical_filters
            .iter()
            .map(|c| self.normalized(c))
            .collect::<Vec<_>>();
        let date_column = self.definition.date_filter.as_deref().map(|c| self.normalized(c));
        FilterOptions::collect(&prepared.table, &categorical, date_column.as_deref())
    }

    /// Filter the prepared table and compute every applicable aggregation.
    pub fn evaluate(
        &self,
        prepared: &PreparedReport,
        selection: &FilterSelection,
    ) -> Result<ReportBundle, ReportError> {
        let selection = self.normalize_selection(selection)?;
        let date_column = self.definition.date_filter.as_deref().map(|c| self.normalized(c));
        let date_column = date_column.as_deref();
        debug!("Resolved selection for {} report: {selection:?}", self.kind());

        let filtered = filter::apply(&prepared.table, &selection, date_column);
        let status = if filtered.is_empty() {
            info!("No records found matching the selected filters");
            ReportStatus::NoMatchingRecords
        } else {
            ReportStatus::Complete
        };
        let date_range = date_column
            .filter(|column| prepared.table.has_column(column))
            .and_then(|column| {
                selection.resolve_interval(filter::date_bounds(&prepared.table, column))
            });

        let mut sections = Vec::new();
        let mut omitted = Vec::new();
        for aggregation in &self.definition.aggregations {
            match aggregation.evaluate_declared(&filtered, Some(&self.definition.schema)) {
                Some(result) => sections.push(Section {
                    key: aggregation.label().to_snake_case(),
                    label: aggregation.label().to_string(),
                    headers: section_headers(aggregation),
                    result,
                }),
                None => {
                    debug!(
                        "Omitting '{}': source column(s) {:?} absent",
                        aggregation.label(),
                        aggregation.source_columns()
                    );
                    omitted.push(aggregation.label().to_string());
                }
            }
        }

        info!(
            "{} of {} {} row(s) matched the selection",
            filtered.len(),
            prepared.table.len(),
            self.kind()
        );
        Ok(ReportBundle {
            report: self.kind(),
            title: self.definition.title.clone(),
            status,
            rows_loaded: prepared.table.len(),
            rows_matched: filtered.len(),
            date_range,
            sections,
            omitted,
            coercion: prepared.coercion.clone(),
        })
    }

    /// Convenience for one-shot callers: prepare then evaluate.
    pub fn run(&self, table: Table, selection: &FilterSelection) -> Result<ReportBundle, ReportError> {
        let prepared = self.prepare(table)?;
        self.evaluate(&prepared, selection)
    }

    fn normalize_selection(&self, selection: &FilterSelection) -> Result<FilterSelection, ReportError> {
        let allowed = self
            .definition
            .categorical_filters
            .iter()
            .map(|c| self.normalized(c))
            .collect::<Vec<_>>();
        let mut normalized = FilterSelection::default().between(selection.start, selection.end);
        for (column, values) in &selection.categories {
            let key = self.normalized(column);
            if !allowed.contains(&key) {
                return Err(ReportError::UnsupportedFilter {
                    report: self.kind(),
                    column: column.clone(),
                });
            }
            normalized = normalized.with_values(&key, values.iter().cloned());
        }
        if self.definition.date_filter.is_none()
            && (selection.start.is_some() || selection.end.is_some())
        {
            return Err(ReportError::UnsupportedFilter {
                report: self.kind(),
                column: "date range".to_string(),
            });
        }
        Ok(normalized)
    }
}

fn section_headers(aggregation: &Aggregation) -> Vec<String> {
    match aggregation {
        Aggregation::DailyCounts { count_label, .. } => {
            vec!["Date".to_string(), count_label.clone()]
        }
        Aggregation::TopValues {
            key_label,
            count_label,
            ..
        } => vec![key_label.clone(), count_label.clone()],
        Aggregation::Distribution { .. } => vec!["Category".to_string(), "Count".to_string()],
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_definitions_are_consistent() {
        for kind in [ReportKind::Order, ReportKind::Return, ReportKind::Inventory] {
            let definition = ReportDefinition::builtin(kind);
            assert_eq!(definition.kind, kind);
            definition.ensure_consistent().unwrap();
        }
    }

    #[test]
    fn definitions_survive_yaml() {
        let definition = ReportDefinition::builtin(ReportKind::Return);
        let yaml = definition.to_yaml_string().unwrap();
        let parsed: ReportDefinition = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed, definition);
    }

    #[test]
    fn date_filter_must_be_datetime() {
        let mut definition = ReportDefinition::builtin(ReportKind::Order);
        definition.date_filter = Some("sku".into());
        assert!(definition.ensure_consistent().is_err());
    }

    #[test]
    fn top_values_limit_is_bounded() {
        for (limit, ok) in [(0, false), (1, true), (DEFAULT_TOP_N, true), (DEFAULT_TOP_N + 1, false)] {
            let mut definition = ReportDefinition::builtin(ReportKind::Order);
            for aggregation in &mut definition.aggregations {
                if let Aggregation::TopValues { limit: current, .. } = aggregation {
                    *current = limit;
                }
            }
            assert_eq!(definition.ensure_consistent().is_ok(), ok, "limit {limit}");
        }
    }

    #[test]
    fn unknown_filter_columns_are_rejected() {
        let pipeline = Pipeline::builtin(ReportKind::Inventory);
        let table = Table::from_strings(
            &["sku", "asin", "price", "quantity"],
            &[vec!["A", "B0", "1.0", "2"]],
        );
        let prepared = pipeline.prepare(table).unwrap();
        let by_sku = FilterSelection::default().with_values("sku", ["A"]);
        assert!(matches!(
            pipeline.evaluate(&prepared, &by_sku),
            Err(ReportError::UnsupportedFilter { .. })
        ));
        let by_date = FilterSelection::default().between(NaiveDate::from_ymd_opt(2024, 1, 1), None);
        assert!(matches!(
            pipeline.evaluate(&prepared, &by_date),
            Err(ReportError::UnsupportedFilter { .. })
        ));
    }

    #[test]
    fn inventory_projection_drops_undeclared_columns() {
        let pipeline = Pipeline::builtin(ReportKind::Inventory);
        let table = Table::from_strings(
            &["quantity", "note", "sku", "asin", "price"],
            &[vec!["2", "fragile", "A", "B0", "1.5"]],
        );
        let prepared = pipeline.prepare(table).unwrap();
        assert_eq!(prepared.table().headers, vec!["sku", "asin", "price", "quantity"]);
    }

    #[test]
    fn section_keys_are_snake_case() {
        let pipeline = Pipeline::builtin(ReportKind::Inventory);
        let table = Table::from_strings(
            &["sku", "asin", "price", "quantity"],
            &[vec!["A", "B0", "1.0", "2"]],
        );
        let bundle = pipeline.run(table, &FilterSelection::default()).unwrap();
        let keys = bundle.sections.iter().map(|s| s.key.as_str()).collect::<Vec<_>>();
        assert!(keys.contains(&"avg_price"));
        assert!(keys.contains(&"total_inventory"));
    }
}
