use marketplace_reports::{
    aggregate::{AggregateResult, Aggregation, DEFAULT_TOP_N, FrequencyTally},
    coerce::{CoercionPolicy, coerce},
    data::Value,
    dataset::Table,
    filter::{self, FilterSelection},
    report::{ReportDefinition, ReportKind},
    schema::{ColumnSpec, ColumnType, HeaderRule, ReportSchema},
};
use proptest::prelude::*;

const STATUSES: &[&str] = &["Shipped", "Cancelled", "Pending", ""];

fn order_schema() -> ReportSchema {
    ReportSchema {
        header_rule: HeaderRule::Exact,
        project: false,
        columns: vec![
            ColumnSpec::required("order-status", ColumnType::String),
            ColumnSpec::required("purchase-date", ColumnType::DateTime),
            ColumnSpec::required("item-price", ColumnType::Float),
        ],
    }
}

fn row_strategy() -> impl Strategy<Value = (usize, Option<u32>, String)> {
    (
        0..STATUSES.len(),
        proptest::option::of(1u32..=28),
        prop_oneof![
            "[0-9]{1,4}(\\.[0-9]{1,2})?",
            Just(String::new()),
            Just("n/a".to_string()),
        ],
    )
}

fn build_table(rows: &[(usize, Option<u32>, String)]) -> Table {
    let cells = rows
        .iter()
        .map(|(status, day, price)| {
            let date = day.map(|d| format!("2024-03-{d:02}")).unwrap_or_default();
            vec![STATUSES[*status].to_string(), date, price.clone()]
        })
        .collect::<Vec<_>>();
    let borrowed = cells
        .iter()
        .map(|row| row.iter().map(String::as_str).collect::<Vec<_>>())
        .collect::<Vec<_>>();
    Table::from_strings(&["order-status", "purchase-date", "item-price"], &borrowed)
}

fn coerced(rows: &[(usize, Option<u32>, String)]) -> Table {
    coerce(build_table(rows), &order_schema(), CoercionPolicy::DefaultValue)
        .unwrap()
        .0
}

proptest! {
    #[test]
    fn validation_passes_iff_required_columns_present(
        mask in proptest::collection::vec(any::<bool>(), 4)
    ) {
        let definition = ReportDefinition::builtin(ReportKind::Inventory);
        let names = ["sku", "asin", "price", "quantity"];
        let headers = names
            .iter()
            .zip(&mask)
            .filter(|(_, keep)| **keep)
            .map(|(name, _)| *name)
            .chain(["extra"])
            .collect::<Vec<_>>();
        let table = Table::from_strings(&headers, &[]);
        let result = definition.schema.validate(&table);
        if mask.iter().all(|keep| *keep) {
            prop_assert!(result.is_ok());
        } else {
            let missing = result.unwrap_err();
            let expected = names
                .iter()
                .zip(&mask)
                .filter(|(_, keep)| !**keep)
                .map(|(name, _)| name.to_string())
                .collect::<Vec<_>>();
            prop_assert_eq!(missing, expected);
        }
    }

    #[test]
    fn coercion_is_idempotent(rows in proptest::collection::vec(row_strategy(), 0..30)) {
        let once = coerced(&rows);
        let (twice, report) =
            coerce(once.clone(), &order_schema(), CoercionPolicy::DefaultValue).unwrap();
        prop_assert_eq!(&once, &twice);
        prop_assert!(report.is_clean());
        prop_assert_eq!(once.len(), rows.len());
    }

    #[test]
    fn filtering_yields_an_ordered_subset(
        rows in proptest::collection::vec(row_strategy(), 0..30),
        allowed in proptest::collection::btree_set(0..3usize, 0..3),
        start in 1u32..=28,
        span in 0u32..10,
    ) {
        let table = coerced(&rows);
        let end = (start + span).min(28);
        let selection = FilterSelection::default()
            .with_values("order-status", allowed.iter().map(|i| STATUSES[*i]))
            .between(
                chrono::NaiveDate::from_ymd_opt(2024, 3, start),
                chrono::NaiveDate::from_ymd_opt(2024, 3, end),
            );
        let filtered = filter::apply(&table, &selection, Some("purchase-date"));
        prop_assert!(filtered.len() <= table.len());
        let mut remaining = table.rows.iter();
        for row in &filtered.rows {
            prop_assert!(remaining.any(|candidate| candidate == row));
        }
    }

    #[test]
    fn full_selection_is_identity(rows in proptest::collection::vec(row_strategy(), 0..30)) {
        let table = coerced(&rows);
        let observed = filter::distinct_values(&table, "order-status");
        let bounds = filter::date_bounds(&table, "purchase-date");
        let selection = FilterSelection::default()
            .with_values("order-status", observed)
            .between(bounds.map(|b| b.0), bounds.map(|b| b.1));
        prop_assert_eq!(filter::apply(&table, &selection, Some("purchase-date")), table);
    }

    #[test]
    fn rankings_are_capped_and_descending(
        values in proptest::collection::vec("[a-e]{1,2}", 0..80)
    ) {
        let mut tally = FrequencyTally::default();
        for value in &values {
            tally.ingest(&Value::String(value.clone()));
        }
        let ranked = tally.ranked(DEFAULT_TOP_N);
        prop_assert!(ranked.len() <= DEFAULT_TOP_N);
        prop_assert!(ranked.windows(2).all(|w| w[0].count >= w[1].count));
        let total = ranked.iter().map(|e| e.count).sum::<u64>();
        prop_assert!(total as usize <= values.len());
    }

    #[test]
    fn row_count_matches_table_length(rows in proptest::collection::vec(row_strategy(), 0..30)) {
        let table = coerced(&rows);
        let count = Aggregation::RowCount { label: "Rows".into() }.evaluate(&table);
        match count {
            Some(AggregateResult::Scalar(value)) => {
                prop_assert_eq!(value.as_f64() as usize, table.len());
            }
            other => prop_assert!(false, "unexpected result {:?}", other),
        }
    }
}
