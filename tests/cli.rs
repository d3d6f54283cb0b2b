mod common;

use std::fs;

use assert_cmd::Command;
use common::{INVENTORY_CSV, ORDER_CSV, RETURN_CSV, TestWorkspace};
use predicates::prelude::*;
use predicates::str::contains;

fn bin() -> Command {
    let mut cmd = Command::cargo_bin("marketplace-reports").expect("binary exists");
    cmd.env("RUST_LOG", "off");
    cmd
}

#[test]
fn order_report_prints_metrics_table() {
    let workspace = TestWorkspace::new();
    let input = workspace.write("orders.csv", ORDER_CSV);
    bin()
        .args(["order", "-i", input.to_str().unwrap()])
        .assert()
        .success()
        .stdout(contains("Order Report"))
        .stdout(contains("3 of 3 row(s) matched, 2024-01-01 to 2024-01-02"))
        .stdout(contains("Total Revenue"))
        .stdout(contains("60.00"))
        .stdout(contains("Top Shipping Cities"));
}

#[test]
fn order_report_json_uses_snake_case_keys() {
    let workspace = TestWorkspace::new();
    let input = workspace.write("orders.csv", ORDER_CSV);
    let output = bin()
        .args([
            "order",
            "-i",
            input.to_str().unwrap(),
            "--filter",
            "order-status=Cancelled",
            "--format",
            "json",
        ])
        .output()
        .expect("run binary");
    assert!(output.status.success());
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).expect("parse json");
    assert_eq!(json["report"], "order");
    assert_eq!(json["status"], "complete");
    assert_eq!(json["rows_matched"], 1);
    let sections = json["sections"].as_array().expect("sections array");
    let revenue = sections
        .iter()
        .find(|s| s["key"] == "total_revenue")
        .expect("revenue section");
    assert_eq!(revenue["result"]["type"], "scalar");
    assert_eq!(revenue["result"]["data"], 20.0);
}

#[test]
fn no_matching_rows_is_not_an_error() {
    let workspace = TestWorkspace::new();
    let input = workspace.write("orders.csv", ORDER_CSV);
    bin()
        .args([
            "order",
            "-i",
            input.to_str().unwrap(),
            "--from",
            "2025-01-01",
        ])
        .assert()
        .success()
        .stdout(contains("No records found matching the selected filters."))
        .stdout(contains("0 of 3 row(s) matched"));
}

#[test]
fn missing_columns_fail_with_names() {
    let workspace = TestWorkspace::new();
    let input = workspace.write("orders.csv", "purchase-date,sku\n2024-01-01,A\n");
    bin()
        .args(["order", "-i", input.to_str().unwrap()])
        .assert()
        .failure()
        .stderr(contains("Missing columns: order-status, fulfillment-channel"));
}

#[test]
fn unsupported_filter_column_is_rejected() {
    let workspace = TestWorkspace::new();
    let input = workspace.write("orders.csv", ORDER_CSV);
    bin()
        .args(["order", "-i", input.to_str().unwrap(), "--filter", "sku=SKU-1"])
        .assert()
        .failure()
        .stderr(contains("cannot be filtered by 'sku'"));
}

#[test]
fn return_report_notes_missing_refunds() {
    let workspace = TestWorkspace::new();
    let input = workspace.write("returns.tsv", &RETURN_CSV.replace(',', "\t"));
    bin()
        .args(["return", "-i", input.to_str().unwrap()])
        .assert()
        .success()
        .stdout(contains("Total Return Requests"))
        .stdout(contains("Not available (columns missing from upload): Total Refunded Amount"));
}

#[test]
fn inventory_export_writes_projected_csv() {
    let workspace = TestWorkspace::new();
    let input = workspace.write("inventory.csv", INVENTORY_CSV);
    let export = workspace.path().join("clean.csv");
    bin()
        .args([
            "inventory",
            "-i",
            input.to_str().unwrap(),
            "--export",
            export.to_str().unwrap(),
        ])
        .assert()
        .success()
        .stdout(contains("Total Value"))
        .stdout(contains("20.00"));
    let exported = fs::read_to_string(&export).expect("read export");
    assert_eq!(
        exported,
        "sku,asin,price,quantity\nSKU-1,B000001,5,0\nSKU-2,B000002,2,10\n"
    );
}

#[test]
fn inventory_export_to_stdout_moves_report_to_stderr() {
    let workspace = TestWorkspace::new();
    let input = workspace.write("inventory.csv", INVENTORY_CSV);
    bin()
        .args(["inventory", "-i", input.to_str().unwrap(), "--export", "-"])
        .assert()
        .success()
        .stdout("sku,asin,price,quantity\nSKU-1,B000001,5,0\nSKU-2,B000002,2,10\n")
        .stderr(contains("Inventory Report"))
        .stderr(contains("Total Value"));
}

#[test]
fn stdin_upload_is_read_as_csv() {
    bin()
        .args(["inventory", "-i", "-"])
        .write_stdin(INVENTORY_CSV)
        .assert()
        .success()
        .stdout(contains("Inventory Report"));
}

#[test]
fn filters_command_lists_values_and_dates() {
    let workspace = TestWorkspace::new();
    let input = workspace.write("orders.csv", ORDER_CSV);
    bin()
        .args(["filters", "--kind", "order", "-i", input.to_str().unwrap()])
        .assert()
        .success()
        .stdout(contains("Cancelled"))
        .stdout(contains("Merchant"))
        .stdout(contains("purchase-date: 2024-01-01 to 2024-01-02"));
}

#[test]
fn definition_round_trips_through_custom_override() {
    let workspace = TestWorkspace::new();
    let definition = workspace.path().join("inventory.yml");
    bin()
        .args(["definition", "--kind", "inventory", "-o", definition.to_str().unwrap()])
        .assert()
        .success();
    let yaml = fs::read_to_string(&definition).expect("read definition");
    assert!(yaml.contains("kind: sum-product"));
    let customized = yaml.replace("Total Value", "Stock Value");
    fs::write(&definition, customized).expect("write definition");

    let input = workspace.write("inventory.csv", INVENTORY_CSV);
    bin()
        .args([
            "inventory",
            "-i",
            input.to_str().unwrap(),
            "--definition",
            definition.to_str().unwrap(),
        ])
        .assert()
        .success()
        .stdout(contains("Stock Value"))
        .stdout(contains("Total Value").not());
}

#[test]
fn definition_kind_must_match_subcommand() {
    let workspace = TestWorkspace::new();
    let definition = workspace.path().join("order.yml");
    bin()
        .args(["definition", "--kind", "order", "-o", definition.to_str().unwrap()])
        .assert()
        .success();
    let input = workspace.write("inventory.csv", INVENTORY_CSV);
    bin()
        .args([
            "inventory",
            "-i",
            input.to_str().unwrap(),
            "--definition",
            definition.to_str().unwrap(),
        ])
        .assert()
        .failure()
        .stderr(contains("is for the order report, not inventory"));
}
