//! Loading of the caller-supplied CSV inputs: the cost-effectiveness dataset, the alias override
//! table and (optionally) the canonical country list.
//!
//! Every file is read with all columns typed as strings. Numeric interpretation happens in the
//! stage that owns it, so that a malformed cell drops one record rather than the whole file.

use std::io::Cursor;
use std::path::Path;

use log::{debug, info, warn};
use polars::prelude::*;

use crate::error::{VelError, VelResult};
use crate::COL;

/// The alias overrides bundled with the crate, used when no override file is configured.
const DEFAULT_ALIAS_OVERRIDES: &str = include_str!("../data/country_aliases.csv");

/// Parse CSV bytes into a `DataFrame` where every column is a `String` column.
pub fn read_csv_as_strings(bytes: Vec<u8>) -> VelResult<DataFrame> {
    Ok(CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(0))
        .into_reader_with_file_handle(Cursor::new(bytes))
        .finish()?)
}

fn read_file(path: &Path) -> VelResult<Vec<u8>> {
    info!("Reading {}", path.display());
    std::fs::read(path)
        .map_err(|e| VelError::Configuration(format!("Failed to read '{}': {e}", path.display())))
}

/// Fail with a `ConfigurationError` naming the first required column that `df` lacks.
pub fn require_columns(df: &DataFrame, columns: &[&str], table: &str) -> VelResult<()> {
    let present = df.get_column_names();
    for column in columns {
        if !present.iter().any(|name| name == column) {
            return Err(VelError::Configuration(format!(
                "{table} is missing required column '{column}' (found: {present:?})"
            )));
        }
    }
    Ok(())
}

/// Alias overrides from a CSV with columns (`fuzzy_country`, `country_code`).
pub fn load_alias_overrides<P: AsRef<Path>>(path: P) -> VelResult<DataFrame> {
    let df = read_csv_as_strings(read_file(path.as_ref())?)?;
    require_columns(&df, &[COL::ALIAS_TEXT, COL::COUNTRY_CODE], "alias override table")?;
    Ok(df)
}

/// The bundled alias overrides.
pub fn default_alias_overrides() -> VelResult<DataFrame> {
    let df = read_csv_as_strings(DEFAULT_ALIAS_OVERRIDES.as_bytes().to_vec())?;
    require_columns(&df, &[COL::ALIAS_TEXT, COL::COUNTRY_CODE], "alias override table")?;
    Ok(df)
}

/// Canonical country list from a CSV with columns (`country_name`, `iso2_code`).
pub fn load_countries<P: AsRef<Path>>(path: P) -> VelResult<DataFrame> {
    let df = read_csv_as_strings(read_file(path.as_ref())?)?;
    require_columns(&df, &[COL::COUNTRY_NAME, COL::COUNTRY_ISO2], "canonical country list")?;
    Ok(df)
}

/// Load the cost-effectiveness dataset and project it onto the raw cost ratio schema
/// (`year`, `population_label`, `ratio_text`).
pub fn load_cost_ratios<P: AsRef<Path>>(path: P) -> VelResult<DataFrame> {
    cost_ratios_from_bytes(read_file(path.as_ref())?)
}

pub fn cost_ratios_from_bytes(bytes: Vec<u8>) -> VelResult<DataFrame> {
    let df = read_csv_as_strings(bytes)?;
    require_columns(
        &df,
        &[COL::SOURCE_PUBLICATION_YEAR, COL::SOURCE_TARGET_POPULATION],
        "cost-effectiveness dataset",
    )?;
    let ratio_column = df
        .get_column_names()
        .into_iter()
        .find(|name| name.starts_with(COL::SOURCE_RATIO_PREFIX))
        .map(|name| name.to_string())
        .ok_or_else(|| {
            VelError::Configuration(format!(
                "cost-effectiveness dataset has no column starting with '{}'",
                COL::SOURCE_RATIO_PREFIX
            ))
        })?;
    debug!("Using '{ratio_column}' as the cost ratio column");

    let ratios = df
        .lazy()
        .select([
            col(COL::SOURCE_PUBLICATION_YEAR)
                .str()
                .strip_chars(lit(NULL))
                .cast(DataType::Int32)
                .alias(COL::YEAR),
            col(COL::SOURCE_TARGET_POPULATION).alias(COL::POPULATION_LABEL),
            col(&ratio_column).alias(COL::RATIO_TEXT),
        ])
        .collect()?;

    let missing_years = ratios.column(COL::YEAR)?.null_count();
    if missing_years > 0 {
        warn!("{missing_years} cost ratio record(s) have no usable publication year");
    }
    info!("Loaded cost ratios with shape: {:?}", ratios.shape());
    Ok(ratios)
}
