use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{VelError, VelResult};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Base URL of the World Bank v2 API (countries and expenditure indicators)
    pub world_bank_base_url: String,
    /// Base URL of the FRED graph CSV endpoint
    pub fred_base_url: String,
    /// Monthly price index series
    pub cpi_series_id: String,
    /// First observation date requested for the price index, `YYYY-MM-DD`
    pub cpi_start_date: String,
    pub public_indicator: String,
    pub private_indicator: String,
    pub non_profit_indicator: String,
    /// Inclusive range of indicator years to request
    pub indicator_start_year: i32,
    pub indicator_end_year: i32,
    /// Alias override CSV. The bundled table is used when unset.
    pub alias_path: Option<PathBuf>,
    /// Canonical country CSV. Fetched from the World Bank when unset.
    pub countries_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            world_bank_base_url: "https://api.worldbank.org/v2".into(),
            fred_base_url: "https://fred.stlouisfed.org/graph/fredgraph.csv".into(),
            cpi_series_id: "CPIAUCSL".into(),
            cpi_start_date: "2000-01-01".into(),
            public_indicator: "SH.XPD.GHED.PC.CD".into(),
            private_indicator: "SH.XPD.PVTD.PC.CD".into(),
            non_profit_indicator: "SH.XPD.EHEX.PC.CD".into(),
            indicator_start_year: 2000,
            indicator_end_year: 2022,
            alias_path: None,
            countries_path: None,
        }
    }
}

impl Config {
    pub fn from_toml(contents: &str) -> VelResult<Self> {
        let config: Config = toml::from_str(contents)
            .map_err(|e| VelError::Configuration(format!("Invalid TOML in config file: {e}")))?;
        if config.indicator_start_year > config.indicator_end_year {
            return Err(VelError::Configuration(format!(
                "indicator_start_year ({}) is after indicator_end_year ({})",
                config.indicator_start_year, config.indicator_end_year
            )));
        }
        Ok(config)
    }
}
