use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};

use crate::{coerce::CoercionPolicy, data::parse_naive_date, render::OutputFormat, report::ReportKind};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Summarize marketplace order, return, and inventory exports",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Summarize an order report: revenue, cancellations, daily orders, and top cities, products, and SKUs
    Order(ReportArgs),
    /// Summarize a return report: refunds, daily returns, and top reasons, SKUs, and products
    Return(ReportArgs),
    /// Summarize an inventory export: stock totals, value, and stock distribution
    Inventory(InventoryArgs),
    /// List the filter values and date range offered by an upload
    Filters(FiltersArgs),
    /// Print a report definition as YAML, ready to be customized
    Definition(DefinitionArgs),
}

#[derive(Debug, Args)]
pub struct SourceArgs {
    /// Uploaded report (CSV, TSV, or spreadsheet); `-` reads CSV from stdin
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// CSV delimiter character (supports ',', 'tab', ';', '|')
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Character encoding of the input file (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
    /// Worksheet to read from a spreadsheet upload (defaults to the first)
    #[arg(long)]
    pub sheet: Option<String>,
    /// YAML report definition overriding the built-in one
    #[arg(long)]
    pub definition: Option<PathBuf>,
    /// What to do with values that cannot be converted to their column type
    #[arg(long, value_enum, default_value_t = CoercionPolicy::DefaultValue)]
    pub coercion: CoercionPolicy,
}

#[derive(Debug, Args)]
pub struct ReportArgs {
    #[command(flatten)]
    pub source: SourceArgs,
    /// Keep only rows whose column holds this value; repeat to allow several values
    #[arg(long = "filter", action = clap::ArgAction::Append)]
    pub filters: Vec<String>,
    /// First calendar day to include (defaults to the earliest date present)
    #[arg(long, value_parser = parse_date)]
    pub from: Option<NaiveDate>,
    /// Last calendar day to include (defaults to the latest date present)
    #[arg(long, value_parser = parse_date)]
    pub to: Option<NaiveDate>,
    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    pub format: OutputFormat,
}

#[derive(Debug, Args)]
pub struct InventoryArgs {
    #[command(flatten)]
    pub report: ReportArgs,
    /// Also write the cleaned inventory table as CSV (`-` for stdout)
    #[arg(long)]
    pub export: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct FiltersArgs {
    /// Report type of the upload
    #[arg(short = 'k', long, value_enum)]
    pub kind: ReportKind,
    #[command(flatten)]
    pub source: SourceArgs,
    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    pub format: OutputFormat,
}

#[derive(Debug, Args)]
pub struct DefinitionArgs {
    /// Report type whose built-in definition to print
    #[arg(short = 'k', long, value_enum)]
    pub kind: ReportKind,
    /// Destination file (stdout if omitted)
    #[arg(short = 'o', long)]
    pub output: Option<PathBuf>,
}

pub fn parse_delimiter(value: &str) -> Result<u8, String> {
    match value {
        "tab" | "\t" => Ok(b'\t'),
        "comma" | "," => Ok(b','),
        "|" | "pipe" => Ok(b'|'),
        ";" | "semicolon" => Ok(b';'),
        other => {
            let mut chars = other.chars();
            let first = chars
                .next()
                .ok_or_else(|| "Delimiter cannot be empty".to_string())?;
            if chars.next().is_some() {
                return Err("Delimiter must be a single character".to_string());
            }
            if !first.is_ascii() {
                return Err("Delimiter must be ASCII".to_string());
            }
            Ok(first as u8)
        }
    }
}

pub fn parse_date(value: &str) -> Result<NaiveDate, String> {
    parse_naive_date(value.trim()).map_err(|err| format!("Invalid date '{value}': {err}"))
}
