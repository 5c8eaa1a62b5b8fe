//! Conversion of nominal dollar amounts between years using a yearly price index.

use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate};
use itertools::izip;
use log::{debug, info};
use polars::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{VelError, VelResult};
use crate::COL;

/// One price index value per calendar year: the arithmetic mean of that year's monthly
/// observations. Only years covered by the fetched observations are present.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PriceIndex {
    by_year: BTreeMap<i32, f64>,
}

impl PriceIndex {
    /// Build from already-yearly values.
    pub fn from_yearly<I: IntoIterator<Item = (i32, f64)>>(values: I) -> Self {
        Self {
            by_year: values.into_iter().collect(),
        }
    }

    /// Build from monthly (date, value) observations by averaging within each calendar year.
    pub fn from_monthly<I>(observations: I) -> VelResult<Self>
    where
        I: IntoIterator<Item = (NaiveDate, f64)>,
    {
        let (years, values): (Vec<i32>, Vec<f64>) = observations
            .into_iter()
            .map(|(date, value)| (date.year(), value))
            .unzip();
        let yearly = DataFrame::new(vec![
            Series::new(COL::YEAR, years),
            Series::new(COL::PRICE_INDEX, values),
        ])?
        .lazy()
        .group_by([col(COL::YEAR)])
        .agg([col(COL::PRICE_INDEX).mean()])
        .collect()?;
        Ok(Self {
            by_year: izip!(
                yearly.column(COL::YEAR)?.i32()?,
                yearly.column(COL::PRICE_INDEX)?.f64()?
            )
            .filter_map(|(year, value)| Some((year?, value?)))
            .collect(),
        })
    }

    /// Build from a table with a `date` column (`YYYY-MM-DD` strings) and a `price_index` column
    /// of strings. Observations whose value is not a number are skipped, as the upstream series
    /// marks missing months with "."; an unparseable date means the payload itself is malformed.
    pub fn from_observations(df: &DataFrame) -> VelResult<Self> {
        let mut observations = Vec::with_capacity(df.height());
        let mut skipped = 0usize;
        for (date, value) in izip!(
            df.column(COL::DATE)?.str()?,
            df.column(COL::PRICE_INDEX)?.str()?
        ) {
            let date = date.unwrap_or_default();
            let date = NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d").map_err(|e| {
                VelError::Fetch(format!("Malformed price index date '{date}': {e}"))
            })?;
            match value.and_then(|v| v.trim().parse::<f64>().ok()) {
                Some(value) if value.is_finite() => observations.push((date, value)),
                _ => skipped += 1,
            }
        }
        if skipped > 0 {
            debug!("Skipped {skipped} price index observation(s) without a value");
        }
        let index = Self::from_monthly(observations)?;
        if index.is_empty() {
            return Err(VelError::Fetch(
                "Price index series contained no observations".into(),
            ));
        }
        info!(
            "Price index covers {:?}..={:?}",
            index.first_year(),
            index.last_year()
        );
        Ok(index)
    }

    pub fn is_empty(&self) -> bool {
        self.by_year.is_empty()
    }

    pub fn first_year(&self) -> Option<i32> {
        self.by_year.keys().next().copied()
    }

    pub fn last_year(&self) -> Option<i32> {
        self.by_year.keys().next_back().copied()
    }

    pub fn get(&self, year: i32) -> VelResult<f64> {
        self.by_year
            .get(&year)
            .copied()
            .ok_or(VelError::Lookup { year })
    }

    pub fn iter(&self) -> impl Iterator<Item = (i32, f64)> + '_ {
        self.by_year.iter().map(|(year, value)| (*year, *value))
    }

    /// Express `amount` dollars of `from_year` in dollars of `to_year`:
    /// `amount * index[from_year] / index[to_year]`. There is no extrapolation, so both years
    /// must be covered by the index.
    pub fn convert(&self, amount: f64, from_year: i32, to_year: i32) -> VelResult<f64> {
        let from = self.get(from_year)?;
        let to = self.get(to_year)?;
        Ok(amount * from / to)
    }
}

#[cfg(test)]
mod tests {
    use polars::df;

    use super::*;

    fn index() -> PriceIndex {
        PriceIndex::from_yearly([(2010, 100.0), (2018, 130.0)])
    }

    #[test]
    fn identity_conversion_should_return_input() -> anyhow::Result<()> {
        let index = index();
        for year in [2010, 2018] {
            assert_eq!(index.convert(42.5, year, year)?, 42.5);
        }
        Ok(())
    }

    #[test]
    fn conversion_should_scale_by_index_ratio() -> anyhow::Result<()> {
        let index = index();
        let converted = index.convert(130.0, 2018, 2010)?;
        assert!((converted - 169.0).abs() < 1e-9);
        assert!((index.convert(1.0, 2010, 2018)? - 100.0 / 130.0).abs() < 1e-12);
        Ok(())
    }

    #[test]
    fn uncovered_year_should_be_a_lookup_error() {
        let index = index();
        assert!(matches!(
            index.convert(1.0, 2018, 2009),
            Err(VelError::Lookup { year: 2009 })
        ));
        assert!(matches!(
            index.convert(1.0, 2030, 2010),
            Err(VelError::Lookup { year: 2030 })
        ));
    }

    #[test]
    fn monthly_values_should_average_per_year() -> anyhow::Result<()> {
        let date = |y, m| NaiveDate::from_ymd_opt(y, m, 1).unwrap();
        let index = PriceIndex::from_monthly([
            (date(2019, 1), 250.0),
            (date(2020, 2), 262.0),
            (date(2019, 2), 252.0),
            (date(2020, 1), 258.0),
            (date(2019, 3), 254.0),
        ])?;
        assert_eq!(index.iter().collect::<Vec<_>>(), vec![(2019, 252.0), (2020, 260.0)]);
        assert_eq!(index.first_year(), Some(2019));
        assert_eq!(index.last_year(), Some(2020));
        Ok(())
    }

    #[test]
    fn no_monthly_values_should_give_an_empty_index() -> anyhow::Result<()> {
        assert!(PriceIndex::from_monthly(Vec::new())?.is_empty());
        Ok(())
    }

    #[test]
    fn observations_should_skip_missing_values() -> anyhow::Result<()> {
        let df = df!(
            COL::DATE => &["2010-01-01", "2010-02-01", "2010-03-01", "2011-01-01"],
            COL::PRICE_INDEX => &[Some("100.0"), Some("."), Some("102.0"), None]
        )?;
        let index = PriceIndex::from_observations(&df)?;
        assert_eq!(index.iter().collect::<Vec<_>>(), vec![(2010, 101.0)]);
        Ok(())
    }

    #[test]
    fn malformed_dates_should_be_a_fetch_error() {
        let df = df!(
            COL::DATE => &["January 2010"],
            COL::PRICE_INDEX => &["100.0"]
        )
        .unwrap();
        assert!(matches!(
            PriceIndex::from_observations(&df),
            Err(VelError::Fetch(_))
        ));
    }

    #[test]
    fn empty_series_should_be_a_fetch_error() {
        let df = df!(
            COL::DATE => &["2010-01-01"],
            COL::PRICE_INDEX => &["."]
        )
        .unwrap();
        assert!(matches!(
            PriceIndex::from_observations(&df),
            Err(VelError::Fetch(_))
        ));
    }
}
