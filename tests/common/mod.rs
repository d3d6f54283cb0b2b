#![allow(dead_code)]

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use marketplace_reports::{
    dataset::Table,
    ingest::{self, IngestOptions, UploadFormat},
};
use tempfile::{TempDir, tempdir};

pub const ORDER_CSV: &str = "\
purchase-date,order-status,fulfillment-channel,item-price,ship-city,sku,product-name
2024-01-01T10:00:00+00:00,Shipped,Amazon,10,Pune,SKU-1,Mug
2024-01-02T12:30:00+00:00,Cancelled,Merchant,20,Delhi,SKU-2,Lamp
2024-01-02T18:00:00+00:00,Shipped,Amazon,30,Pune,SKU-1,Mug
";

pub const INVENTORY_CSV: &str = "\
sku,asin,price,quantity,warehouse
SKU-1,B000001,5.0,0,North
SKU-2,B000002,2.0,10,South
";

/// Padded, mixed-case headers and no refunded amount column.
pub const RETURN_CSV: &str = "\
 Order Date ,Return Request Date,Return Request Status,Return Reason,Merchant SKU,Item Name,Order Amount
2024-02-01,2024-02-05,Approved,Damaged,SKU-1,Mug,10
2024-02-02,2024-02-05,Rejected,Wrong size,SKU-2,Lamp,20
2024-02-03,2024-02-06,Approved,Damaged,SKU-1,Mug,10
";

/// Parses CSV text the way an uploaded `.csv` file is parsed.
pub fn csv_table(contents: &str) -> Table {
    ingest::read_upload(
        contents.as_bytes(),
        UploadFormat::Delimited { delimiter: b',' },
        &IngestOptions::default(),
    )
    .expect("parse csv fixture")
}

/// Scratch directory helper that cleans up files automatically on drop.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    /// Creates a fresh scratch directory for the current test case.
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

    /// Returns the root path for all files owned by this workspace.
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Writes `contents` into a file under the workspace and returns the path.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        let mut file = File::create(&path).expect("create temp file");
        file.write_all(contents.as_bytes())
            .expect("write temp file contents");
        path
    }

    /// Writes raw bytes into a file under the workspace and returns the path.
    pub fn write_bytes(&self, name: &str, contents: &[u8]) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        std::fs::write(&path, contents).expect("write temp file bytes");
        path
    }
}

/// Two-sheet workbook: a `Notes` sheet first, then `Stock` holding the
/// inventory rows with padded headers, an unnamed column, a blank row and
/// a date-formatted column.
pub fn inventory_workbook() -> Vec<u8> {
    use rust_xlsxwriter::{ExcelDateTime, Format, Workbook};

    let mut workbook = Workbook::new();
    let date_format = Format::new().set_num_format("yyyy-mm-dd");

    let notes = workbook.add_worksheet();
    notes.set_name("Notes").expect("name notes sheet");
    notes
        .write_string(0, 0, "Exported from the seller portal")
        .expect("write note");

    let stock = workbook.add_worksheet();
    stock.set_name("Stock").expect("name stock sheet");
    for (col, header) in [" sku ", "asin", "price ", "  quantity"].iter().enumerate() {
        stock
            .write_string(0, col as u16, *header)
            .expect("write header");
    }
    stock.write_string(0, 5, "received").expect("write header");

    let received = [
        ExcelDateTime::from_ymd(2024, 1, 5).expect("date"),
        ExcelDateTime::from_ymd(2024, 1, 7).expect("date"),
    ];
    let data = [
        (1, "SKU-1", "B000001", 5.0, 0.0, "North"),
        (3, "SKU-2", "B000002", 2.0, 10.0, "South"),
    ];
    for ((row, sku, asin, price, quantity, warehouse), date) in data.into_iter().zip(&received) {
        stock.write_string(row, 0, sku).expect("write sku");
        stock.write_string(row, 1, asin).expect("write asin");
        stock.write_number(row, 2, price).expect("write price");
        stock.write_number(row, 3, quantity).expect("write quantity");
        stock.write_string(row, 4, warehouse).expect("write warehouse");
        stock
            .write_datetime_with_format(row, 5, date, &date_format)
            .expect("write date");
    }

    workbook.save_to_buffer().expect("serialize workbook")
}
