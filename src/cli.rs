use crate::config::Config;
use crate::transfer::schema::parse_bound;
use crate::transfer::DateRange;
use crate::transfer::TransferError;
use chrono::NaiveDate;
use clap::ArgAction;
use clap::Args;
use clap::Parser;
use clap::Subcommand;
use log::LevelFilter;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "sheet-transfer")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Copy dated exchange operations from one workbook into another")]
#[command(
    long_about = "Reads the date, client and revenue columns of the source sheet, keeps the rows \
                  inside the requested date range, and appends them after the last filled row \
                  of the destination sheet. The destination workbook keeps its macros, other \
                  sheets and formatting."
)]
#[command(after_help = "EXAMPLES:\n  \
    sheet-transfer extract --source \"Operações de câmbio BRA.xlsm\" --start 2024-01-01 --end 2024-01-31\n  \
    sheet-transfer inspect --destination \"01. Operações.xlsm\"\n  \
    sheet-transfer transfer --source origem.xlsm --destination destino.xlsm --start 01/01/2024 --in-place\n  \
    sheet-transfer transfer --source origem.xlsm --destination destino.xlsm --output atualizado.xlsm --csv dados.csv\n  \
    sheet-transfer init-config")]
#[command(arg_required_else_help = true)]
pub struct Cli {
    /// Path to TOML configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output level (-v, -vv)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only print warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Show (and optionally export) the records the source would contribute
    Extract(ExtractArgs),
    /// Show the mapped columns of the destination sheet and the next free row
    Inspect(InspectArgs),
    /// Append the source records to the destination workbook
    Transfer(TransferArgs),
    /// Write a configuration file with the default layout
    InitConfig(InitConfigArgs),
}

#[derive(Args, Debug, Default)]
pub struct SourceArgs {
    /// Source workbook (.xlsx/.xlsm)
    #[arg(short, long)]
    pub source: Option<PathBuf>,

    /// Sheet to read records from
    #[arg(long)]
    pub source_sheet: Option<String>,

    /// Number of header rows above the source data
    #[arg(long)]
    pub source_header_rows: Option<usize>,
}

#[derive(Args, Debug, Default)]
pub struct DestinationArgs {
    /// Destination workbook (.xlsx/.xlsm)
    #[arg(short, long)]
    pub destination: Option<PathBuf>,

    /// Sheet to append records to
    #[arg(long)]
    pub destination_sheet: Option<String>,

    /// Number of header rows above the destination data
    #[arg(long)]
    pub destination_header_rows: Option<usize>,
}

#[derive(Args, Debug, Default)]
pub struct RangeArgs {
    /// First date to include (YYYY-MM-DD or DD/MM/YYYY)
    #[arg(long, value_parser = parse_bound)]
    pub start: Option<NaiveDate>,

    /// Last date to include (YYYY-MM-DD or DD/MM/YYYY)
    #[arg(long, value_parser = parse_bound)]
    pub end: Option<NaiveDate>,
}

impl RangeArgs {
    pub fn range(&self) -> Result<DateRange, TransferError> {
        DateRange::new(self.start, self.end)
    }
}

#[derive(Args, Debug)]
pub struct ExtractArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    #[command(flatten)]
    pub range: RangeArgs,

    /// Save the records as a new workbook
    #[arg(long)]
    pub xlsx: Option<PathBuf>,

    /// Save the records as CSV
    #[arg(long)]
    pub csv: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct InspectArgs {
    #[command(flatten)]
    pub destination: DestinationArgs,

    /// Number of trailing rows to print
    #[arg(short, long, default_value_t = 10)]
    pub limit: usize,

    /// Save the mapped columns as a new workbook
    #[arg(long)]
    pub plain: Option<PathBuf>,

    /// Save the mapped columns as CSV
    #[arg(long)]
    pub csv: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct TransferArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    #[command(flatten)]
    pub destination: DestinationArgs,

    #[command(flatten)]
    pub range: RangeArgs,

    /// Write the updated workbook to this file
    #[arg(short, long, required_unless_present_any = ["in_place", "dry_run"])]
    pub output: Option<PathBuf>,

    /// Overwrite the destination workbook
    #[arg(long, conflicts_with = "output")]
    pub in_place: bool,

    /// Also save the mapped columns as a new plain workbook
    #[arg(long)]
    pub plain: Option<PathBuf>,

    /// Also save the mapped columns as CSV
    #[arg(long)]
    pub csv: Option<PathBuf>,

    /// Show what would be appended without writing anything
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Args, Debug)]
pub struct InitConfigArgs {
    /// Where to write the configuration
    #[arg(default_value = "sheet-transfer.toml")]
    pub path: PathBuf,

    /// Replace an existing file
    #[arg(short, long)]
    pub force: bool,
}

impl Cli {
    pub fn log_level(&self) -> LevelFilter {
        if self.quiet {
            return LevelFilter::Warn;
        }
        match self.verbose {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    }
}

impl SourceArgs {
    /// Applies sheet overrides to `config` and resolves the workbook path.
    pub fn apply(&self, config: &mut Config) -> Option<PathBuf> {
        if let Some(sheet) = &self.source_sheet {
            config.source.sheet = sheet.to_owned();
        }
        if let Some(header_rows) = self.source_header_rows {
            config.source.header_rows = header_rows;
        }
        self.source.clone().or_else(|| config.defaults.source_path.clone())
    }
}

impl DestinationArgs {
    /// Applies sheet overrides to `config` and resolves the workbook path.
    pub fn apply(&self, config: &mut Config) -> Option<PathBuf> {
        if let Some(sheet) = &self.destination_sheet {
            config.destination.sheet = sheet.to_owned();
        }
        if let Some(header_rows) = self.destination_header_rows {
            config.destination.header_rows = header_rows;
        }
        self.destination.clone().or_else(|| config.defaults.destination_path.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn transfer_requires_an_output_mode() {
        let parsed = Cli::try_parse_from(["sheet-transfer", "transfer", "-s", "a.xlsm", "-d", "b.xlsm"]);
        assert!(parsed.is_err());

        let parsed = Cli::try_parse_from(["sheet-transfer", "transfer", "-s", "a.xlsm", "-d", "b.xlsm", "--dry-run"]);
        assert!(parsed.is_ok());

        let parsed = Cli::try_parse_from(["sheet-transfer", "transfer", "--in-place", "--output", "c.xlsm"]);
        assert!(parsed.is_err());
    }

    #[test]
    fn parses_range_and_verbosity() {
        let cli = Cli::try_parse_from([
            "sheet-transfer", "-vv", "extract", "--source", "a.xlsm", "--start", "01/01/2024", "--end", "2024-01-31",
        ])
        .unwrap();
        assert_eq!(cli.log_level(), LevelFilter::Trace);
        let Command::Extract(args) = cli.command else {
            panic!("expected extract");
        };
        let range = args.range.range().unwrap();
        assert_eq!(range.start, NaiveDate::from_ymd_opt(2024, 1, 1));
        assert_eq!(range.end, NaiveDate::from_ymd_opt(2024, 1, 31));

        assert!(Cli::try_parse_from(["sheet-transfer", "extract", "--start", "yesterday"]).is_err());
    }

    #[test]
    fn overrides_take_precedence_over_config() {
        let mut config = Config::default();
        config.defaults.source_path = Some(PathBuf::from("default.xlsm"));
        let args = SourceArgs {
            source: None,
            source_sheet: Some("Outra".to_owned()),
            source_header_rows: Some(3),
        };
        assert_eq!(args.apply(&mut config), Some(PathBuf::from("default.xlsm")));
        assert_eq!(config.source.sheet, "Outra");
        assert_eq!(config.source.header_rows, 3);
    }
}
