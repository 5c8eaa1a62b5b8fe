use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::Datelike;
use clap::{command, Args, Parser, Subcommand};
use enum_dispatch::enum_dispatch;
use log::{debug, info};
use polars::frame::DataFrame;
use serde::{Deserialize, Serialize};
use spinners::{Spinner, Spinners};
use strum_macros::EnumString;
use vel::{
    config::Config,
    formatters::{CSVFormatter, JSONFormatter, OutputFormatter, OutputGenerator},
    ingest::load_cost_ratios,
    load_aliases,
    resolve::{deduplicate, resolve, CaseSensitivity},
    Analysis,
};

use crate::display::{
    display_aliases, display_decomposition, display_diagnostics, display_price_index,
    display_regression, display_resolution,
};
use crate::error::VelCliResult;

const DEFAULT_PROGRESS_SPINNER: Spinners = Spinners::Dots;
const COMPLETE_PROGRESS_STRING: &str = "✔";
const RUNNING_TAIL_STRING: &str = "...";

/// Defines the formats tables can be written in.
#[derive(Clone, Debug, Deserialize, Serialize, EnumString, PartialEq, Eq)]
#[strum(ascii_case_insensitive)]
pub enum OutputFormat {
    Csv,
    Json,
}

impl From<&OutputFormat> for OutputFormatter {
    fn from(value: &OutputFormat) -> Self {
        match value {
            OutputFormat::Csv => OutputFormatter::Csv(CSVFormatter),
            OutputFormat::Json => OutputFormatter::Json(JSONFormatter { pretty: true }),
        }
    }
}

fn write_output<T, U>(
    output_generator: T,
    mut data: DataFrame,
    output_file: Option<U>,
) -> VelCliResult<()>
where
    T: OutputGenerator,
    U: AsRef<Path>,
{
    if let Some(output_file) = output_file {
        let mut f = File::create(output_file).context("Failed to write output")?;
        output_generator.save(&mut f, &mut data)?;
    } else {
        let mut stdout_lock = std::io::stdout().lock();
        output_generator.save(&mut stdout_lock, &mut data)?;
    };
    Ok(())
}

fn start_spinner(quiet: bool, message: &str) -> Option<Spinner> {
    (!quiet).then(|| {
        Spinner::with_timer(
            DEFAULT_PROGRESS_SPINNER,
            message.to_string() + RUNNING_TAIL_STRING,
        )
    })
}

fn stop_spinner(sp: Option<Spinner>) {
    if let Some(mut s) = sp {
        s.stop_with_symbol(COMPLETE_PROGRESS_STRING);
    }
}

fn case_sensitivity(case_insensitive: bool) -> CaseSensitivity {
    if case_insensitive {
        CaseSensitivity::Insensitive
    } else {
        CaseSensitivity::Sensitive
    }
}

/// Trait that defines what to run when a given subcommand is invoked.
#[enum_dispatch]
pub trait RunCommand {
    async fn run(&self, config: Config) -> VelCliResult<()>;
}

/// The `run` command performs the whole analysis on a cost-effectiveness dataset.
#[derive(Args, Debug)]
pub struct RunAnalysisCommand {
    #[arg(help = "Cost-effectiveness CSV with 'Publication Year', 'Target Population' and a \
                  'US$/QALY' column")]
    input: PathBuf,
    #[arg(
        long,
        help = "Year spending is deflated to. Defaults to the current calendar year."
    )]
    current_year: Option<i32>,
    #[arg(short = 'o', long, help = "Directory to write the report tables and summaries to")]
    output_dir: Option<PathBuf>,
    #[arg(long, help = "Match country aliases case-insensitively")]
    case_insensitive: bool,
    #[arg(from_global)]
    quiet: bool,
}

impl RunCommand for RunAnalysisCommand {
    async fn run(&self, config: Config) -> VelCliResult<()> {
        info!("Running `run` subcommand");
        let current_year = self
            .current_year
            .unwrap_or_else(|| chrono::Local::now().year());
        let raw_ratios = load_cost_ratios(&self.input).context("loading cost ratios")?;

        let sp = start_spinner(self.quiet, "Downloading reference data");
        let analysis = Analysis::new_with_config(config)
            .await?
            .with_case_sensitivity(case_sensitivity(self.case_insensitive));
        stop_spinner(sp);

        let report = analysis.run(&raw_ratios, current_year)?;
        debug!("{:#?}", report.aggregated);
        display_diagnostics(&report.diagnostics());
        display_regression(&report.regression, current_year);
        display_decomposition(&report.decomposition);

        if let Some(output_dir) = &self.output_dir {
            report.write_to_dir(output_dir)?;
            println!("\nReport written to {}", output_dir.display());
        }
        Ok(())
    }
}

/// The `resolve` command deduplicates a cost-effectiveness dataset and assigns each record a
/// single country, without valuing anything.
#[derive(Args, Debug)]
pub struct ResolveCommand {
    #[arg(help = "Cost-effectiveness CSV")]
    input: PathBuf,
    #[arg(long, help = "Output the resolved records as well as the summary")]
    show: bool,
    #[arg(
        short = 'f',
        long,
        value_name = "csv|json",
        default_value = "csv",
        help = "Output format for resolved records"
    )]
    output_format: OutputFormat,
    #[arg(short = 'o', long, help = "Output file to place resolved records")]
    output_file: Option<PathBuf>,
    #[arg(long, help = "Match country aliases case-insensitively")]
    case_insensitive: bool,
    #[arg(from_global)]
    quiet: bool,
}

impl RunCommand for ResolveCommand {
    async fn run(&self, config: Config) -> VelCliResult<()> {
        info!("Running `resolve` subcommand");
        let raw_ratios = load_cost_ratios(&self.input).context("loading cost ratios")?;
        let sp = start_spinner(self.quiet, "Building alias table");
        let aliases = load_aliases(&config).await?;
        stop_spinner(sp);

        let ratios = deduplicate(&raw_ratios)?;
        let resolution = resolve(
            &ratios,
            &aliases,
            case_sensitivity(self.case_insensitive),
        )?;
        display_resolution(&resolution.summary);
        if self.show || self.output_file.is_some() {
            let formatter: OutputFormatter = (&self.output_format).into();
            write_output(formatter, resolution.resolved, self.output_file.as_deref())?;
        }
        Ok(())
    }
}

/// The `aliases` command lists the alias table used to resolve population labels.
#[derive(Args, Debug)]
pub struct AliasesCommand {
    #[arg(short = 'c', long, help = "Only list aliases of this ISO 3166-1 alpha-2 code")]
    code: Option<String>,
    #[arg(from_global)]
    quiet: bool,
}

impl RunCommand for AliasesCommand {
    async fn run(&self, config: Config) -> VelCliResult<()> {
        info!("Running `aliases` subcommand");
        let sp = start_spinner(self.quiet, "Building alias table");
        let aliases = load_aliases(&config).await?;
        stop_spinner(sp);
        display_aliases(&aliases, self.code.as_deref())?;
        Ok(())
    }
}

/// The `cpi` command lists the yearly price index used for currency conversion.
#[derive(Args, Debug)]
pub struct CpiCommand {
    #[arg(long, help = "First year to list")]
    from: Option<i32>,
    #[arg(long, help = "Last year to list")]
    to: Option<i32>,
    #[arg(from_global)]
    quiet: bool,
}

impl RunCommand for CpiCommand {
    async fn run(&self, config: Config) -> VelCliResult<()> {
        info!("Running `cpi` subcommand");
        let sp = start_spinner(self.quiet, "Downloading price index");
        let price_index = vel::fetch::fetch_price_index(&config).await?;
        stop_spinner(sp);
        display_price_index(&price_index, self.from, self.to);
        Ok(())
    }
}

/// The entrypoint for the CLI.
#[derive(Parser, Debug)]
#[command(version, about="Estimates the value of an empirical life from published cost-effectiveness ratios", long_about = None, name="vel")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
    #[arg(
        short = 'q',
        long = "quiet",
        help = "\
            Do not print progress bar to stdout. Results and logs (when `RUST_LOG`\n\
            is set) will still be printed.",
        global = true
    )]
    quiet: bool,
    #[arg(
        long,
        global = true,
        help = "Config file to use instead of <config dir>/vel/config.toml"
    )]
    pub config: Option<PathBuf>,
}

/// Commands contains the list of subcommands avaliable for use in the CLI.
/// Each command should implmement the RunCommand trait and specify the list
/// of required args for that command.
#[derive(Subcommand, Debug)]
#[enum_dispatch(RunCommand)]
pub enum Commands {
    /// Value every resolvable cost ratio and regress it on health spending
    Run(RunAnalysisCommand),
    /// Assign a single country to each cost ratio record
    Resolve(ResolveCommand),
    /// List country aliases
    Aliases(AliasesCommand),
    /// List the yearly price index
    Cpi(CpiCommand),
}
