use anyhow::Context;
use anyhow::Result;
use clap::error::ErrorKind;
use clap::CommandFactory;
use clap::Parser;
use sheet_transfer::cli::Cli;
use sheet_transfer::cli::Command;
use sheet_transfer::cli::ExtractArgs;
use sheet_transfer::cli::InitConfigArgs;
use sheet_transfer::cli::InspectArgs;
use sheet_transfer::cli::TransferArgs;
use sheet_transfer::transfer::export;
use sheet_transfer::transfer::MappedRow;
use sheet_transfer::transfer::SourceRecord;
use sheet_transfer::Config;
use sheet_transfer::SheetTransferError;
use sheet_transfer::Transfer;
use sheet_transfer::XlsxSpreadsheet;
use std::path::Path;
use std::path::PathBuf;
use std::process;

fn main() {
    let cli = Cli::parse();
    init_logging(&cli);
    process::exit(run(&cli));
}

fn init_logging(cli: &Cli) {
    env_logger::Builder::new()
        .filter_level(cli.log_level())
        .parse_env("RUST_LOG")
        .format_timestamp(None)
        .format_target(false)
        .init();
}

fn run(cli: &Cli) -> i32 {
    let result = match &cli.command {
        Command::Extract(args) => handle_extract(cli, args),
        Command::Inspect(args) => handle_inspect(cli, args),
        Command::Transfer(args) => handle_transfer(cli, args),
        Command::InitConfig(args) => handle_init_config(args),
    };
    match result {
        Ok(()) => 0,
        Err(error) => report_error(&error),
    }
}

fn report_error(error: &anyhow::Error) -> i32 {
    eprintln!("Error: {error:#}");
    match error.downcast_ref::<SheetTransferError>() {
        Some(cause) => {
            if let Some(suggestion) = cause.suggestion() {
                eprintln!("Suggestion: {suggestion}");
            }
            cause.exit_code()
        }
        None => 1,
    }
}

fn load_config(cli: &Cli) -> Result<Config> {
    Ok(Config::load_with_defaults(cli.config.as_deref()).map_err(SheetTransferError::from)?)
}

/// Exits with a usage error when a workbook path is neither given nor configured.
fn require_path(path: Option<PathBuf>, flag: &str, key: &str) -> PathBuf {
    match path {
        Some(path) => path,
        None => Cli::command()
            .error(
                ErrorKind::MissingRequiredArgument,
                format!("no workbook given: pass {flag} or set `{key}` under [defaults] in the config file"),
            )
            .exit(),
    }
}

fn handle_extract(cli: &Cli, args: &ExtractArgs) -> Result<()> {
    let mut config = load_config(cli)?;
    let source_path = require_path(args.source.apply(&mut config), "--source", "source_path");
    let transfer = Transfer::new(config.schema())?;
    let range = args.range.range().map_err(SheetTransferError::from)?;

    let mut source = XlsxSpreadsheet::open(&source_path)?;
    let extraction = transfer.extract(&mut source, &range)?;
    print_records(&extraction.records);
    println!(
        "{} record(s) in {range}; {} row(s) scanned, {} without a date, {} outside the range",
        extraction.records.len(),
        extraction.scanned_rows,
        extraction.dropped_rows,
        extraction.filtered_rows
    );

    if let Some(path) = &args.xlsx {
        export::save(path, &export::records_workbook(&extraction.records)?)?;
    }
    if let Some(path) = &args.csv {
        export::save(path, &export::records_csv(&extraction.records)?)?;
    }
    Ok(())
}

fn handle_inspect(cli: &Cli, args: &InspectArgs) -> Result<()> {
    let mut config = load_config(cli)?;
    let destination_path = require_path(args.destination.apply(&mut config), "--destination", "destination_path");
    let transfer = Transfer::new(config.schema())?;

    let mut destination = XlsxSpreadsheet::open(&destination_path)?;
    let table = transfer.load_destination(&mut destination)?;
    let rows = table.mapped_rows();
    let skip = rows.len().saturating_sub(args.limit);
    print_rows(&rows[skip..]);
    println!(
        "'{}': {} data row(s), next free row is {}",
        table.sheet_name(),
        rows.len(),
        table.append_cursor() + 1
    );

    if let Some(path) = &args.plain {
        export::save(path, &export::plain_workbook(&rows, export::PLAIN_SHEET_NAME)?)?;
    }
    if let Some(path) = &args.csv {
        export::save(path, &export::csv(&rows)?)?;
    }
    Ok(())
}

fn handle_transfer(cli: &Cli, args: &TransferArgs) -> Result<()> {
    let mut config = load_config(cli)?;
    let source_path = require_path(args.source.apply(&mut config), "--source", "source_path");
    let destination_path = require_path(args.destination.apply(&mut config), "--destination", "destination_path");
    let transfer = Transfer::new(config.schema())?;
    let range = args.range.range().map_err(SheetTransferError::from)?;

    let mut source = XlsxSpreadsheet::open(&source_path)?;
    let mut destination = XlsxSpreadsheet::open(&destination_path)?;
    let report = transfer.run(&mut source, &mut destination, &range)?;
    if report.appended.is_empty() {
        println!("No records in {range}; '{}' is unchanged", report.table.sheet_name());
    } else {
        println!(
            "{} record(s) in {range} appended to '{}' at rows {}-{}",
            report.extraction.records.len(),
            report.table.sheet_name(),
            report.appended.start + 1,
            report.appended.end
        );
    }

    if args.dry_run {
        print_records(&report.extraction.records);
        println!("Dry run: nothing was written");
        return Ok(());
    }

    let target = args.output.clone().unwrap_or_else(|| destination_path.clone());
    warn_on_extension_change(&destination_path, &target);
    let bytes = report.table.write_in_place(&mut destination)?;
    drop(destination);
    export::save(&target, &bytes).with_context(|| format!("Updated workbook was not saved to '{}'", target.display()))?;

    let rows = report.table.mapped_rows();
    if let Some(path) = &args.plain {
        export::save(path, &export::plain_workbook(&rows, export::PLAIN_SHEET_NAME)?)?;
    }
    if let Some(path) = &args.csv {
        export::save(path, &export::csv(&rows)?)?;
    }
    Ok(())
}

fn handle_init_config(args: &InitConfigArgs) -> Result<()> {
    if args.path.exists() && !args.force {
        anyhow::bail!("'{}' already exists, use --force to replace it", args.path.display());
    }
    Config::default().save_to_file(&args.path).map_err(SheetTransferError::from)?;
    println!("Generated configuration file: {}", args.path.display());
    println!("\nTo use this configuration:");
    println!("  sheet-transfer --config {} transfer ...", args.path.display());
    Ok(())
}

/// Excel refuses to open macro content under an `.xlsx` name and vice versa.
fn warn_on_extension_change(input: &Path, output: &Path) {
    let extension = |path: &Path| path.extension().map(|ext| ext.to_string_lossy().to_lowercase());
    if extension(input) != extension(output) {
        log::warn!(
            "'{}' keeps the package type of '{}'; Excel may refuse a different extension",
            output.display(),
            input.display()
        );
    }
}

fn print_records(records: &[SourceRecord]) {
    for record in records {
        println!("{:>6}  {}  {:>14}  {}", record.row + 1, record.date, record.revenue.to_string(), record.client);
    }
}

fn print_rows(rows: &[MappedRow]) {
    for row in rows {
        println!(
            "{:>6}  {:<10}  {:>14}  {}",
            row.row + 1,
            row.date.to_string(),
            row.revenue.to_string(),
            row.client
        );
    }
}
