pub mod aggregate;
pub mod cli;
pub mod coerce;
pub mod data;
pub mod dataset;
pub mod error;
pub mod filter;
pub mod ingest;
pub mod io_utils;
pub mod render;
pub mod report;
pub mod schema;
pub mod table;

use std::{env, fs, path::Path, sync::OnceLock};

use anyhow::{Context, Result, ensure};
use clap::Parser;
use log::{LevelFilter, debug, info};

use crate::{
    cli::{Cli, Commands, SourceArgs},
    ingest::IngestOptions,
    render::OutputFormat,
    report::{Pipeline, PreparedReport, ReportDefinition, ReportKind},
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("marketplace_reports", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    match cli.command {
        Commands::Order(args) => handle_report(ReportKind::Order, &args, None),
        Commands::Return(args) => handle_report(ReportKind::Return, &args, None),
        Commands::Inventory(args) => {
            handle_report(ReportKind::Inventory, &args.report, args.export.as_deref())
        }
        Commands::Filters(args) => handle_filters(&args),
        Commands::Definition(args) => handle_definition(&args),
    }
}

fn load_pipeline(kind: ReportKind, source: &SourceArgs) -> Result<Pipeline> {
    let definition = match &source.definition {
        Some(path) => {
            let definition = ReportDefinition::load(path)
                .with_context(|| format!("Loading report definition from {path:?}"))?;
            ensure!(
                definition.kind == kind,
                "Definition {path:?} is for the {} report, not {kind}",
                definition.kind
            );
            definition
        }
        None => ReportDefinition::builtin(kind),
    };
    Ok(Pipeline::new(definition, source.coercion))
}

fn prepare(kind: ReportKind, source: &SourceArgs) -> Result<(Pipeline, PreparedReport)> {
    let pipeline = load_pipeline(kind, source)?;
    let options = IngestOptions {
        delimiter: source.delimiter,
        encoding: io_utils::resolve_encoding(source.input_encoding.as_deref())?,
        sheet: source.sheet.clone(),
    };
    match source.delimiter {
        Some(delimiter) => info!(
            "Loading {kind} report from '{}' with delimiter '{}'",
            source.input.display(),
            printable_delimiter(delimiter)
        ),
        None => info!("Loading {kind} report from '{}'", source.input.display()),
    }
    let table = ingest::load_table(&source.input, &options)?;
    debug!("Upload headers: {:?}", table.headers);
    let prepared = pipeline.prepare(table)?;
    Ok((pipeline, prepared))
}

fn handle_report(kind: ReportKind, args: &cli::ReportArgs, export: Option<&Path>) -> Result<()> {
    let (pipeline, prepared) = prepare(kind, &args.source)?;
    let selection = filter::parse_filters(&args.filters)?.between(args.from, args.to);
    let bundle = pipeline.evaluate(&prepared, &selection)?;

    if let Some(path) = export {
        let mut writer = io_utils::open_csv_writer(Some(path))?;
        io_utils::write_table(&mut writer, prepared.table())
            .with_context(|| format!("Exporting {kind} table to {path:?}"))?;
        info!(
            "Exported {} cleaned row(s) to {path:?}",
            prepared.table().len()
        );
    }

    let rendered = match args.format {
        OutputFormat::Table => render::render_text(&bundle),
        OutputFormat::Json => format!("{}\n", render::render_json(&bundle)?),
    };
    // Stdout belongs to the CSV export when it is streamed there.
    if export.is_some_and(io_utils::is_dash) {
        eprint!("{rendered}");
    } else {
        print!("{rendered}");
    }
    Ok(())
}

fn handle_filters(args: &cli::FiltersArgs) -> Result<()> {
    let (pipeline, prepared) = prepare(args.kind, &args.source)?;
    let options = pipeline.filter_options(&prepared);
    match args.format {
        OutputFormat::Table => print!("{}", render::render_filter_options(&options)),
        OutputFormat::Json => println!("{}", render::render_json(&options)?),
    }
    Ok(())
}

fn handle_definition(args: &cli::DefinitionArgs) -> Result<()> {
    let yaml = ReportDefinition::builtin(args.kind).to_yaml_string()?;
    match &args.output {
        Some(path) if !io_utils::is_dash(path) => {
            fs::write(path, yaml).with_context(|| format!("Writing definition to {path:?}"))?;
            info!("Wrote {} report definition to {path:?}", args.kind);
        }
        _ => print!("{yaml}"),
    }
    Ok(())
}

pub(crate) fn printable_delimiter(delimiter: u8) -> String {
    match delimiter {
        b',' => ",".to_string(),
        b'\t' => "\\t".to_string(),
        other => (other as char).to_string(),
    }
}
