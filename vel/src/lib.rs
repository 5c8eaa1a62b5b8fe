use std::fs::File;
use std::path::Path;

use anyhow::{Context, Result};
use log::{debug, info};
use polars::frame::DataFrame;
use serde::{Deserialize, Serialize};

use crate::analysis::{CovarianceDecomposition, Regression};
use crate::config::Config;
use crate::currency::PriceIndex;
use crate::formatters::{CSVFormatter, OutputGenerator};
use crate::reference::AliasTable;
use crate::resolve::{CaseSensitivity, Resolution, ResolutionSummary};
use crate::vel::VelSummary;

// Re-exports
pub use column_names as COL;

// Modules
pub mod analysis;
pub mod column_names;
pub mod config;
pub mod currency;
pub mod error;
pub mod fetch;
pub mod formatters;
pub mod indicators;
pub mod ingest;
pub mod reference;
pub mod resolve;
pub mod vel;

/// The reference inputs every analysis run needs: aliases to resolve labels against, the yearly
/// price index, and health expenditure by (year, country).
#[derive(Clone, Debug)]
pub struct Analysis {
    pub aliases: AliasTable,
    pub price_index: PriceIndex,
    pub expenditure: DataFrame,
    pub case_sensitivity: CaseSensitivity,
    pub config: Config,
}

impl Analysis {
    /// Setup the Analysis object with default configuration
    pub async fn new() -> Result<Self> {
        Self::new_with_config(Config::default()).await
    }

    /// Setup the Analysis object with custom configuration, reading local inputs where the
    /// config names them and fetching everything else.
    pub async fn new_with_config(config: Config) -> Result<Self> {
        debug!("config: {config:?}");
        let countries = load_countries(&config)
            .await
            .context("loading canonical countries")?;
        let aliases = aliases_from_countries(&config, &countries).context("building alias table")?;
        let (price_index, expenditure) = futures::try_join!(
            fetch::fetch_price_index(&config),
            fetch::fetch_expenditure(&config, &countries)
        )
        .context("fetching price index and expenditure")?;
        Ok(Self::from_parts(aliases, price_index, expenditure, config))
    }

    /// Setup the Analysis object from inputs already in memory
    pub fn from_parts(
        aliases: AliasTable,
        price_index: PriceIndex,
        expenditure: DataFrame,
        config: Config,
    ) -> Self {
        Self {
            aliases,
            price_index,
            expenditure,
            case_sensitivity: CaseSensitivity::default(),
            config,
        }
    }

    pub fn with_case_sensitivity(mut self, case_sensitivity: CaseSensitivity) -> Self {
        self.case_sensitivity = case_sensitivity;
        self
    }

    /// Deduplicates raw cost ratios and resolves each to a single country
    pub fn resolve(&self, raw_ratios: &DataFrame) -> Result<Resolution> {
        let ratios = resolve::deduplicate(raw_ratios).context("deduplicating cost ratios")?;
        resolve::resolve(&ratios, &self.aliases, self.case_sensitivity)
            .context("resolving countries")
    }

    /// Runs every stage on the raw cost ratios. `current_year` is the year spending is deflated
    /// to, normally the year of the run.
    pub fn run(&self, raw_ratios: &DataFrame, current_year: i32) -> Result<Report> {
        let resolution = self.resolve(raw_ratios)?;
        let (vel_records, vel_summary) = vel::compute_vel(&resolution.resolved, &self.price_index)
            .context("computing VEL")?;
        let aggregated = vel::aggregate(&vel_records).context("aggregating VEL")?;
        let joined = indicators::join_expenditure(
            &aggregated,
            &self.expenditure,
            &self.price_index,
            current_year,
        )
        .context("joining expenditure")?;
        let regression = analysis::regress(&joined).context("regressing VEL on spending")?;
        let decomposition = analysis::covariance_decomposition(&self.expenditure)
            .context("decomposing spending covariance")?;
        info!("Analysis complete for run year {current_year}");
        Ok(Report {
            resolution: resolution.summary,
            vel: vel_summary,
            aggregated,
            joined,
            regression,
            decomposition,
        })
    }
}

/// Canonical countries from the configured file, or the World Bank when unset.
pub async fn load_countries(config: &Config) -> Result<DataFrame> {
    Ok(match &config.countries_path {
        Some(path) => ingest::load_countries(path)?,
        None => fetch::fetch_countries(config).await?,
    })
}

/// Canonical countries combined with the configured (or bundled) alias overrides.
pub async fn load_aliases(config: &Config) -> Result<AliasTable> {
    let countries = load_countries(config).await?;
    aliases_from_countries(config, &countries)
}

fn aliases_from_countries(config: &Config, countries: &DataFrame) -> Result<AliasTable> {
    let overrides = match &config.alias_path {
        Some(path) => ingest::load_alias_overrides(path)?,
        None => ingest::default_alias_overrides()?,
    };
    Ok(reference::build_alias_table(countries, &overrides)?)
}

/// Attrition counts across the stages of one run.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostics {
    pub resolution: ResolutionSummary,
    pub vel: VelSummary,
}

/// Everything one analysis run produces.
#[derive(Clone, Debug)]
pub struct Report {
    pub resolution: ResolutionSummary,
    pub vel: VelSummary,
    /// One row per (year, country_code) with the lag-adjusted year
    pub aggregated: DataFrame,
    /// `aggregated` left-joined to expenditure
    pub joined: DataFrame,
    pub regression: Regression,
    pub decomposition: CovarianceDecomposition,
}

impl Report {
    pub fn diagnostics(&self) -> Diagnostics {
        Diagnostics {
            resolution: self.resolution.clone(),
            vel: self.vel.clone(),
        }
    }

    /// Writes the tables as CSV and the summaries as JSON into `dir`, creating it if needed.
    pub fn write_to_dir(&self, dir: &Path) -> Result<()> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("creating output directory {}", dir.display()))?;
        for (name, table) in [
            ("aggregated_vel.csv", &self.aggregated),
            ("joined.csv", &self.joined),
        ] {
            let path = dir.join(name);
            let mut file =
                File::create(&path).with_context(|| format!("creating {}", path.display()))?;
            CSVFormatter.save(&mut file, &mut table.clone())?;
        }
        write_json(&dir.join("regression.json"), &self.regression)?;
        write_json(
            &dir.join("covariance_decomposition.json"),
            &self.decomposition,
        )?;
        write_json(&dir.join("diagnostics.json"), &self.diagnostics())?;
        info!("Wrote report to {}", dir.display());
        Ok(())
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    serde_json::to_writer_pretty(file, value)
        .with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}
