//! Join of the aggregated VEL table onto per-capita health expenditure indicators.

use log::{debug, info, warn};
use polars::prelude::*;
use strum_macros::{Display, EnumIter};

use crate::currency::PriceIndex;
use crate::error::VelResult;
use crate::ingest::require_columns;
use crate::vel::BASE_PRICE_YEAR;
use crate::COL;

/// The three additive components of per-capita health expenditure.
#[derive(Clone, Copy, Debug, Display, EnumIter, PartialEq, Eq)]
pub enum Sector {
    #[strum(serialize = "public")]
    Public,
    #[strum(serialize = "private")]
    Private,
    #[strum(serialize = "non_profit")]
    NonProfit,
}

impl Sector {
    /// Column holding this sector's expenditure.
    pub fn column(&self) -> &'static str {
        match self {
            Sector::Public => COL::PUBLIC,
            Sector::Private => COL::PRIVATE,
            Sector::NonProfit => COL::NON_PROFIT,
        }
    }
}

const EXPENDITURE_COLUMNS: [&str; 5] = [
    COL::YEAR,
    COL::COUNTRY_CODE,
    COL::PUBLIC,
    COL::PRIVATE,
    COL::NON_PROFIT,
];

/// Project an expenditure table onto its canonical column types so that it joins on exact
/// (`year`, `country_code`) keys.
pub fn normalize_expenditure(expenditure: &DataFrame) -> VelResult<LazyFrame> {
    require_columns(expenditure, &EXPENDITURE_COLUMNS, "expenditure table")?;
    Ok(expenditure.clone().lazy().select([
        col(COL::YEAR).cast(DataType::Int32),
        col(COL::COUNTRY_CODE).cast(DataType::String),
        col(COL::PUBLIC).cast(DataType::Float64),
        col(COL::PRIVATE).cast(DataType::Float64),
        col(COL::NON_PROFIT).cast(DataType::Float64),
    ]))
}

/// Left-join the lag-adjusted VEL table onto expenditure by exact (`year`, `country_code`).
///
/// `total_spending` is present only when all three sectors are, and
/// `log_total_spending = ln(total * index[2010] / index[current_year])`. Spending is thus
/// deflated relative to the year the analysis runs in, not to the fixed 2018 dollar year used
/// for the VEL, which makes the result depend on `current_year`.
pub fn join_expenditure(
    aggregated: &DataFrame,
    expenditure: &DataFrame,
    price_index: &PriceIndex,
    current_year: i32,
) -> VelResult<DataFrame> {
    require_columns(
        aggregated,
        &[COL::YEAR, COL::COUNTRY_CODE, COL::MEAN_LOG_VEL],
        "aggregated VEL table",
    )?;
    let factor = price_index.convert(1.0, BASE_PRICE_YEAR, current_year)?;
    debug!("Spending deflator for {current_year}: {factor}");

    let mut joined = aggregated
        .clone()
        .lazy()
        .select([
            col(COL::YEAR).cast(DataType::Int32),
            col(COL::COUNTRY_CODE).cast(DataType::String),
            col(COL::MEAN_LOG_VEL),
        ])
        .join(
            normalize_expenditure(expenditure)?,
            [col(COL::YEAR), col(COL::COUNTRY_CODE)],
            [col(COL::YEAR), col(COL::COUNTRY_CODE)],
            JoinArgs::new(JoinType::Left),
        )
        .with_column(
            (col(COL::PUBLIC) + col(COL::PRIVATE) + col(COL::NON_PROFIT))
                .alias(COL::TOTAL_SPENDING),
        )
        .collect()?;

    let log_total: Vec<Option<f64>> = joined
        .column(COL::TOTAL_SPENDING)?
        .f64()?
        .into_iter()
        .map(|total| {
            total
                .map(|t| t * factor)
                .filter(|t| *t > 0.0)
                .map(f64::ln)
        })
        .collect();
    joined.with_column(Series::new(COL::LOG_TOTAL_SPENDING, log_total))?;

    let complete = joined.column(COL::LOG_TOTAL_SPENDING)?.len()
        - joined.column(COL::LOG_TOTAL_SPENDING)?.null_count();
    if complete == 0 && joined.height() > 0 {
        warn!("No VEL row found complete expenditure data");
    }
    info!(
        "Joined {} VEL row(s) to expenditure; {complete} with complete spending",
        joined.height()
    );
    Ok(joined)
}
