//! Thin retrieval adapters for the external collaborators: the World Bank v2 API (canonical
//! country list and health expenditure indicators) and the FRED graph CSV endpoint (monthly
//! price index). Every failure here is a fatal `FetchError`.

use futures::future::join_all;
use log::{debug, info};
use polars::prelude::*;
use serde::Deserialize;
use strum::IntoEnumIterator;

use crate::config::Config;
use crate::currency::PriceIndex;
use crate::error::{VelError, VelResult};
use crate::indicators::Sector;
use crate::ingest::{read_csv_as_strings, require_columns};
use crate::COL;

/// Rows requested per page from the World Bank API.
const WORLD_BANK_PAGE_SIZE: u32 = 20_000;

/// Region name the World Bank gives to aggregates (income groups, regions, ...).
const AGGREGATES_REGION: &str = "Aggregates";

#[derive(Debug, Deserialize)]
struct PageMeta {
    page: u32,
    pages: u32,
}

#[derive(Debug, Deserialize)]
struct IdValue {
    id: String,
    value: String,
}

#[derive(Debug, Deserialize)]
struct IndicatorRow {
    country: IdValue,
    date: String,
    value: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CountryRow {
    iso2_code: String,
    name: String,
    region: IdValue,
}

/// The World Bank wraps every payload as `[meta, rows]`; errors come back as `[{"message": ..}]`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WorldBankPage<T> {
    Data(PageMeta, Option<Vec<T>>),
    Error(Vec<serde_json::Value>),
}

async fn get_text(client: &reqwest::Client, url: &str) -> VelResult<String> {
    info!("Fetching {url}");
    let text = client
        .get(url)
        .send()
        .await?
        .error_for_status()?
        .text()
        .await?;
    if text.trim().is_empty() {
        return Err(VelError::Fetch(format!("Empty response from {url}")));
    }
    Ok(text)
}

/// Fetch every page of a World Bank endpoint. `url` must not carry a `page` parameter.
async fn get_world_bank_rows<T: serde::de::DeserializeOwned>(
    client: &reqwest::Client,
    url: &str,
) -> VelResult<Vec<T>> {
    let mut rows = vec![];
    let mut page = 1;
    loop {
        let page_url = format!("{url}&per_page={WORLD_BANK_PAGE_SIZE}&page={page}");
        let text = get_text(client, &page_url).await?;
        let parsed: WorldBankPage<T> = serde_json::from_str(&text)
            .map_err(|e| VelError::Fetch(format!("Malformed response from {page_url}: {e}")))?;
        match parsed {
            WorldBankPage::Data(meta, data) => {
                rows.extend(data.unwrap_or_default());
                debug!("Fetched page {} of {}", meta.page, meta.pages);
                if meta.page >= meta.pages {
                    break;
                }
                page += 1;
            }
            WorldBankPage::Error(messages) => {
                return Err(VelError::Fetch(format!(
                    "World Bank API returned an error for {page_url}: {messages:?}"
                )))
            }
        }
    }
    Ok(rows)
}

/// Canonical country list (`country_name`, `iso2_code`) with aggregates removed.
pub async fn fetch_countries(config: &Config) -> VelResult<DataFrame> {
    let client = reqwest::Client::new();
    let url = format!("{}/country?format=json", config.world_bank_base_url);
    let rows: Vec<CountryRow> = get_world_bank_rows(&client, &url).await?;
    let (names, codes): (Vec<String>, Vec<String>) = rows
        .into_iter()
        .filter(|row| row.region.value != AGGREGATES_REGION && !row.iso2_code.is_empty())
        .map(|row| (row.name, row.iso2_code))
        .unzip();
    if names.is_empty() {
        return Err(VelError::Fetch("World Bank returned no countries".into()));
    }
    let df = DataFrame::new(vec![
        Series::new(COL::COUNTRY_NAME, names),
        Series::new(COL::COUNTRY_ISO2, codes),
    ])?;
    info!("Fetched canonical country list with shape: {:?}", df.shape());
    Ok(df)
}

/// One World Bank indicator as (`year`, `country_code`, `<value_column>`). Rows without a value
/// are kept, so the caller can tell "reported as missing" from "not reported".
pub async fn fetch_indicator(
    config: &Config,
    indicator: &str,
    value_column: &str,
) -> VelResult<DataFrame> {
    let client = reqwest::Client::new();
    let url = format!(
        "{}/country/all/indicator/{indicator}?format=json&date={}:{}",
        config.world_bank_base_url, config.indicator_start_year, config.indicator_end_year
    );
    let rows: Vec<IndicatorRow> = get_world_bank_rows(&client, &url).await?;
    if rows.is_empty() {
        return Err(VelError::Fetch(format!(
            "World Bank returned no observations for {indicator}"
        )));
    }
    let mut years = Vec::with_capacity(rows.len());
    let mut codes = Vec::with_capacity(rows.len());
    let mut values = Vec::with_capacity(rows.len());
    for row in rows {
        let year: i32 = row.date.trim().parse().map_err(|e| {
            VelError::Fetch(format!("Malformed year '{}' for {indicator}: {e}", row.date))
        })?;
        years.push(year);
        codes.push(row.country.id);
        values.push(row.value);
    }
    Ok(DataFrame::new(vec![
        Series::new(COL::YEAR, years),
        Series::new(COL::COUNTRY_CODE, codes),
        Series::new(value_column, values),
    ])?)
}

fn indicator_code(config: &Config, sector: Sector) -> &str {
    match sector {
        Sector::Public => &config.public_indicator,
        Sector::Private => &config.private_indicator,
        Sector::NonProfit => &config.non_profit_indicator,
    }
}

/// Expenditure records (`year`, `country_code`, `public`, `private`, `non_profit`) for every
/// (year, country) reported by at least one of the three indicators. The indicator endpoint also
/// reports aggregates (regions, income groups, the world); only rows whose code is an
/// `iso2_code` of `countries` are kept.
pub async fn fetch_expenditure(config: &Config, countries: &DataFrame) -> VelResult<DataFrame> {
    require_columns(countries, &[COL::COUNTRY_ISO2], "canonical country list")?;
    let country_codes = countries
        .clone()
        .lazy()
        .select([col(COL::COUNTRY_ISO2)
            .cast(DataType::String)
            .alias(COL::COUNTRY_CODE)]);
    let sectors: Vec<Sector> = Sector::iter().collect();
    let tables = join_all(
        sectors
            .iter()
            .map(|sector| fetch_indicator(config, indicator_code(config, *sector), sector.column())),
    )
    .await
    .into_iter()
    .collect::<VelResult<Vec<DataFrame>>>()?;

    let keys = concat(
        tables
            .iter()
            .map(|df| df.clone().lazy().select([col(COL::YEAR), col(COL::COUNTRY_CODE)]))
            .collect::<Vec<_>>(),
        UnionArgs::default(),
    )?
    .unique_stable(None, UniqueKeepStrategy::First);

    let expenditure = tables
        .into_iter()
        .fold(keys, |acc, table| {
            acc.join(
                table.lazy(),
                [col(COL::YEAR), col(COL::COUNTRY_CODE)],
                [col(COL::YEAR), col(COL::COUNTRY_CODE)],
                JoinArgs::new(JoinType::Left),
            )
        })
        .join(
            country_codes,
            [col(COL::COUNTRY_CODE)],
            [col(COL::COUNTRY_CODE)],
            JoinArgs::new(JoinType::Semi),
        )
        .collect()?;
    info!("Fetched expenditure with shape: {:?}", expenditure.shape());
    Ok(expenditure)
}

/// Monthly price index observations, averaged to one value per calendar year.
pub async fn fetch_price_index(config: &Config) -> VelResult<PriceIndex> {
    let client = reqwest::Client::new();
    let url = format!(
        "{}?id={}&cosd={}",
        config.fred_base_url, config.cpi_series_id, config.cpi_start_date
    );
    let text = get_text(&client, &url).await?;
    let mut observations = read_csv_as_strings(text.into_bytes())
        .map_err(|e| VelError::Fetch(format!("Malformed price index CSV from {url}: {e}")))?;
    if observations.width() != 2 {
        return Err(VelError::Fetch(format!(
            "Expected a date and a value column from {url}, got {:?}",
            observations.get_column_names()
        )));
    }
    observations.set_column_names(&[COL::DATE, COL::PRICE_INDEX])?;
    PriceIndex::from_observations(&observations)
}

#[cfg(test)]
mod tests {
    use httpmock::prelude::*;

    use super::*;

    fn config(server: &MockServer) -> Config {
        Config {
            world_bank_base_url: server.base_url(),
            fred_base_url: server.url("/fredgraph.csv"),
            indicator_start_year: 2015,
            indicator_end_year: 2016,
            ..Config::default()
        }
    }

    fn indicator_body(rows: &[(&str, &str, Option<f64>)]) -> String {
        let rows: Vec<serde_json::Value> = rows
            .iter()
            .map(|(code, year, value)| {
                serde_json::json!({
                    "indicator": {"id": "X", "value": "Indicator"},
                    "country": {"id": code, "value": code},
                    "countryiso3code": "",
                    "date": year,
                    "value": value,
                    "unit": "",
                    "obs_status": "",
                    "decimal": 0
                })
            })
            .collect();
        serde_json::json!([
            {"page": 1, "pages": 1, "per_page": 20000, "total": rows.len()},
            rows
        ])
        .to_string()
    }

    #[tokio::test]
    async fn test_fetching_countries_without_aggregates() -> anyhow::Result<()> {
        let server = MockServer::start_async().await;
        let body = serde_json::json!([
            {"page": 1, "pages": 1, "per_page": "20000", "total": 3},
            [
                {"id": "KEN", "iso2Code": "KE", "name": "Kenya",
                 "region": {"id": "SSF", "iso2code": "ZG", "value": "Sub-Saharan Africa "}},
                {"id": "WLD", "iso2Code": "1W", "name": "World",
                 "region": {"id": "NA", "iso2code": "NA", "value": "Aggregates"}},
                {"id": "GHA", "iso2Code": "GH", "name": "Ghana",
                 "region": {"id": "SSF", "iso2code": "ZG", "value": "Sub-Saharan Africa "}}
            ]
        ]);
        let mock = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/country")
                    .query_param("format", "json");
                then.status(200).body(body.to_string());
            })
            .await;
        let countries = fetch_countries(&config(&server)).await?;
        mock.assert_async().await;
        assert_eq!(countries.shape(), (2, 2));
        let codes: Vec<Option<&str>> =
            countries.column(COL::COUNTRY_ISO2)?.str()?.into_iter().collect();
        assert_eq!(codes, vec![Some("KE"), Some("GH")]);
        Ok(())
    }

    #[tokio::test]
    async fn test_fetching_expenditure_combines_sectors() -> anyhow::Result<()> {
        let server = MockServer::start_async().await;
        let config = config(&server);
        let bodies = [
            (
                config.public_indicator.clone(),
                indicator_body(&[
                    ("KE", "2016", Some(30.0)),
                    ("GH", "2016", Some(20.0)),
                    ("1W", "2016", Some(600.0)),
                ]),
            ),
            (
                config.private_indicator.clone(),
                indicator_body(&[("KE", "2016", Some(15.0)), ("GH", "2016", None)]),
            ),
            (
                config.non_profit_indicator.clone(),
                indicator_body(&[("KE", "2016", Some(5.0)), ("IN", "2015", Some(1.0))]),
            ),
        ];
        for (indicator, body) in bodies {
            server
                .mock_async(|when, then| {
                    when.method(GET)
                        .path(format!("/country/all/indicator/{indicator}"))
                        .query_param("date", "2015:2016");
                    then.status(200).body(body);
                })
                .await;
        }

        let countries = df!(
            COL::COUNTRY_NAME => &["Kenya", "Ghana", "India"],
            COL::COUNTRY_ISO2 => &["KE", "GH", "IN"]
        )?;
        let expenditure = fetch_expenditure(&config, &countries).await?;
        // The "1W" (World) aggregate is not a country
        assert_eq!(expenditure.shape(), (3, 5));
        let codes: Vec<Option<&str>> =
            expenditure.column(COL::COUNTRY_CODE)?.str()?.into_iter().collect();
        assert!(!codes.contains(&Some("1W")));
        let ke = expenditure
            .clone()
            .lazy()
            .filter(col(COL::COUNTRY_CODE).eq(lit("KE")))
            .collect()?;
        assert_eq!(ke.column(COL::YEAR)?.i32()?.get(0), Some(2016));
        assert_eq!(ke.column(COL::PUBLIC)?.f64()?.get(0), Some(30.0));
        assert_eq!(ke.column(COL::PRIVATE)?.f64()?.get(0), Some(15.0));
        assert_eq!(ke.column(COL::NON_PROFIT)?.f64()?.get(0), Some(5.0));

        let india = expenditure
            .lazy()
            .filter(col(COL::COUNTRY_CODE).eq(lit("IN")))
            .collect()?;
        assert_eq!(india.column(COL::PUBLIC)?.null_count(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_world_bank_error_payload_is_a_fetch_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/country/all/indicator/BAD.CODE");
                then.status(200).body(
                    r#"[{"message":[{"id":"120","key":"Invalid value","value":"The provided parameter value is not valid"}]}]"#,
                );
            })
            .await;
        let result = fetch_indicator(&config(&server), "BAD.CODE", COL::PUBLIC).await;
        assert!(matches!(result, Err(VelError::Fetch(_))));
    }

    #[tokio::test]
    async fn test_fetching_price_index() -> anyhow::Result<()> {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/fredgraph.csv")
                    .query_param("id", "CPIAUCSL")
                    .query_param("cosd", "2000-01-01");
                then.status(200).body(
                    "observation_date,CPIAUCSL\n\
                     2010-01-01,217.5\n\
                     2010-02-01,218.5\n\
                     2011-01-01,.\n\
                     2011-02-01,222.0\n",
                );
            })
            .await;
        let index = fetch_price_index(&config(&server)).await?;
        assert_eq!(index.iter().collect::<Vec<_>>(), vec![(2010, 218.0), (2011, 222.0)]);
        Ok(())
    }

    #[tokio::test]
    async fn test_unreachable_price_index_is_a_fetch_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/fredgraph.csv");
                then.status(503);
            })
            .await;
        let result = fetch_price_index(&config(&server)).await;
        assert!(matches!(result, Err(VelError::Fetch(_))));
    }
}
