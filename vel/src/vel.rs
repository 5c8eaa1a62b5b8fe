//! Conversion of resolved cost-effectiveness ratios into a value of an empirical life (VEL) and
//! aggregation to one statistic per (country, year).

use itertools::izip;
use log::{debug, info};
use polars::prelude::*;
use serde::{Deserialize, Serialize};

use crate::currency::PriceIndex;
use crate::error::{VelError, VelResult};
use crate::ingest::require_columns;
use crate::COL;

/// Ratio values that carry no dollar amount. They yield an absent VEL, never a parse error.
pub const SENTINELS: [&str; 4] = ["Cost-Saving", "Dominated", "", "\u{A0}"];

/// Constant lifespan, in years, used to monetize a QALY ratio into a life value.
pub const LIFESPAN: f64 = 70.0;

/// Dollar year of the published cost ratios.
pub const RATIO_PRICE_YEAR: i32 = 2018;

/// Dollar year all values are expressed in.
pub const BASE_PRICE_YEAR: i32 = 2010;

/// Years subtracted from the publication year after aggregation, so that a study is compared
/// with the expenditure reported when it was carried out.
pub const LAG: i32 = 2;

/// Parse a published ratio. `Ok(None)` for the sentinels (and whitespace-only cells); an error
/// for anything that is not a finite, strictly positive number.
pub fn parse_ratio(text: &str) -> VelResult<Option<f64>> {
    if SENTINELS.contains(&text) || text.trim().is_empty() {
        return Ok(None);
    }
    let value: f64 = text.trim().parse().map_err(|e| VelError::Parse {
        text: text.to_string(),
        reason: format!("{e}"),
    })?;
    if !value.is_finite() {
        return Err(VelError::Parse {
            text: text.to_string(),
            reason: "not a finite number".into(),
        });
    }
    if value <= 0.0 {
        return Err(VelError::Parse {
            text: text.to_string(),
            reason: "cost ratios must be positive".into(),
        });
    }
    Ok(Some(value))
}

/// Counts of how resolved ratios turned into VEL records.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VelSummary {
    /// Records with a usable VEL
    pub valued: usize,
    /// Records carrying a sentinel instead of a number
    pub sentinel: usize,
    /// Records dropped because their ratio could not be parsed
    pub parse_errors: usize,
}

/// VEL records (`year`, `country_code`, `vel`) for every resolved ratio with a present value.
///
/// `vel = ratio * index[2010] / index[2018] * 70`, i.e. the ratio in constant 2010 dollars
/// times a 70 year lifespan. A missing price index year is fatal; an
/// unparseable ratio only drops its own record.
pub fn compute_vel(
    resolved: &DataFrame,
    price_index: &PriceIndex,
) -> VelResult<(DataFrame, VelSummary)> {
    require_columns(
        resolved,
        &[COL::YEAR, COL::COUNTRY_CODE, COL::RATIO_TEXT],
        "resolved ratio table",
    )?;
    let factor = price_index.convert(1.0, BASE_PRICE_YEAR, RATIO_PRICE_YEAR)? * LIFESPAN;
    debug!("VEL factor per unit of cost ratio: {factor}");

    let mut summary = VelSummary::default();
    let vel: Vec<Option<f64>> = resolved
        .column(COL::RATIO_TEXT)?
        .str()?
        .into_iter()
        .map(|text| match parse_ratio(text.unwrap_or_default()) {
            Ok(Some(value)) => {
                summary.valued += 1;
                Some(value * factor)
            }
            Ok(None) => {
                summary.sentinel += 1;
                None
            }
            Err(e) => {
                debug!("Dropping record: {e}");
                summary.parse_errors += 1;
                None
            }
        })
        .collect();

    let mut valued = resolved.clone();
    valued.with_column(Series::new(COL::VEL, vel))?;
    let records = valued
        .lazy()
        .filter(
            col(COL::VEL)
                .is_not_null()
                .and(col(COL::COUNTRY_CODE).is_not_null()),
        )
        .select([col(COL::YEAR), col(COL::COUNTRY_CODE), col(COL::VEL)])
        .collect()?;
    info!(
        "Valued {} record(s); {} sentinel(s) and {} unparseable ratio(s) dropped",
        summary.valued, summary.sentinel, summary.parse_errors
    );
    Ok((records, summary))
}

/// One row per (`year`, `country_code`) with `mean_log_vel`, the mean of ln(vel) over the
/// group. The year is shifted back by `LAG` once the groups are formed.
pub fn aggregate(vel_records: &DataFrame) -> VelResult<DataFrame> {
    require_columns(
        vel_records,
        &[COL::YEAR, COL::COUNTRY_CODE, COL::VEL],
        "VEL record table",
    )?;
    let log_vel: Vec<Option<f64>> = vel_records
        .column(COL::VEL)?
        .f64()?
        .into_iter()
        .map(|vel| vel.filter(|v| *v > 0.0).map(f64::ln))
        .collect();

    let mut logged = vel_records.clone();
    logged.with_column(Series::new(COL::LOG_VEL, log_vel))?;
    let aggregated = logged
        .lazy()
        .filter(col(COL::LOG_VEL).is_not_null())
        .group_by([col(COL::YEAR), col(COL::COUNTRY_CODE)])
        .agg([col(COL::LOG_VEL).mean().alias(COL::MEAN_LOG_VEL)])
        .with_column(col(COL::YEAR) - lit(LAG).cast(DataType::Int32))
        .sort(
            [COL::COUNTRY_CODE, COL::YEAR],
            SortMultipleOptions::default(),
        )
        .collect()?;
    info!("Aggregated VEL with shape: {:?}", aggregated.shape());
    Ok(aggregated)
}

/// Iterate over (year, country_code, mean_log_vel) rows of an aggregated table.
pub fn aggregated_rows(aggregated: &DataFrame) -> VelResult<Vec<(i32, String, f64)>> {
    Ok(izip!(
        aggregated.column(COL::YEAR)?.i32()?,
        aggregated.column(COL::COUNTRY_CODE)?.str()?,
        aggregated.column(COL::MEAN_LOG_VEL)?.f64()?
    )
    .filter_map(|(year, code, value)| Some((year?, code?.to_string(), value?)))
    .collect())
}
