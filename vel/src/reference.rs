//! Construction of the canonical alias table: every name variant that identifies a country in a
//! free-text population label, mapped to the country's ISO 3166-1 alpha-2 code.

use itertools::izip;
use log::{debug, info};
use polars::prelude::*;

use crate::error::{VelError, VelResult};
use crate::ingest::require_columns;
use crate::COL;

/// Canonical names left out of the base list. Taiwan is reported under China's code by the
/// expenditure indicator source, so its name is mapped to "CN" through the override table instead.
pub const EXCLUDED_CANONICAL_NAMES: [&str; 1] = ["Taiwan"];

/// The unified set of (`fuzzy_country`, `country_code`) pairs. Immutable once built.
#[derive(Clone, Debug, PartialEq)]
pub struct AliasTable(pub DataFrame);

impl AliasTable {
    pub fn len(&self) -> usize {
        self.0.height()
    }

    pub fn is_empty(&self) -> bool {
        self.0.height() == 0
    }

    /// Iterate over the (alias, code) pairs in table order.
    pub fn pairs(&self) -> VelResult<Vec<(String, String)>> {
        Ok(izip!(
            self.0.column(COL::ALIAS_TEXT)?.str()?,
            self.0.column(COL::COUNTRY_CODE)?.str()?
        )
        .filter_map(|(alias, code)| Some((alias?.to_string(), code?.to_string())))
        .collect())
    }

    /// Aliases registered for a given country code.
    pub fn aliases_for(&self, country_code: &str) -> VelResult<Vec<String>> {
        Ok(self
            .pairs()?
            .into_iter()
            .filter(|(_, code)| code == country_code)
            .map(|(alias, _)| alias)
            .collect())
    }
}

fn is_iso2(code: &str) -> bool {
    code.len() == 2 && code.chars().all(|c| c.is_ascii_uppercase())
}

/// Overrides are authored by hand, so every row is checked before it is trusted.
fn validate_overrides(overrides: &DataFrame) -> VelResult<()> {
    for (row, (alias, code)) in izip!(
        overrides.column(COL::ALIAS_TEXT)?.str()?,
        overrides.column(COL::COUNTRY_CODE)?.str()?
    )
    .enumerate()
    {
        let alias = alias.unwrap_or_default();
        let code = code.unwrap_or_default();
        if alias.trim().is_empty() {
            return Err(VelError::Configuration(format!(
                "alias override row {row} has an empty alias (code '{code}')"
            )));
        }
        if !is_iso2(code) {
            return Err(VelError::Configuration(format!(
                "alias override row {row} ('{alias}') has invalid country code '{code}'"
            )));
        }
    }
    Ok(())
}

/// Merge the canonical country list (`country_name`, `iso2_code`) with the manual overrides
/// (`fuzzy_country`, `country_code`) into a single `AliasTable`.
pub fn build_alias_table(countries: &DataFrame, overrides: &DataFrame) -> VelResult<AliasTable> {
    require_columns(
        countries,
        &[COL::COUNTRY_NAME, COL::COUNTRY_ISO2],
        "canonical country list",
    )?;
    require_columns(
        overrides,
        &[COL::ALIAS_TEXT, COL::COUNTRY_CODE],
        "alias override table",
    )?;
    validate_overrides(overrides)?;

    let keep_canonical = EXCLUDED_CANONICAL_NAMES.iter().fold(
        col(COL::COUNTRY_NAME)
            .is_not_null()
            .and(col(COL::COUNTRY_ISO2).is_not_null())
            .and(col(COL::COUNTRY_NAME).str().len_chars().gt(lit(0))),
        |expr, name| expr.and(col(COL::COUNTRY_NAME).neq(lit(*name))),
    );
    let base = countries
        .clone()
        .lazy()
        .filter(keep_canonical)
        .select([
            col(COL::COUNTRY_NAME)
                .cast(DataType::String)
                .alias(COL::ALIAS_TEXT),
            col(COL::COUNTRY_ISO2)
                .cast(DataType::String)
                .alias(COL::COUNTRY_CODE),
        ]);
    let manual = overrides.clone().lazy().select([
        col(COL::ALIAS_TEXT).cast(DataType::String),
        col(COL::COUNTRY_CODE).cast(DataType::String),
    ]);

    let table = concat([base, manual], UnionArgs::default())?
        .unique_stable(None, UniqueKeepStrategy::First)
        .collect()?;
    debug!("Alias table: {table:?}");

    if table.height() == 0 {
        return Err(VelError::Configuration(
            "alias table is empty: no canonical names or overrides were supplied".into(),
        ));
    }
    info!(
        "Built alias table with {} aliases from {} canonical names and {} overrides",
        table.height(),
        countries.height(),
        overrides.height()
    );
    Ok(AliasTable(table))
}
