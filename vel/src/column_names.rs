//! This module stores the column names of every table that flows through the pipeline. Stages
//! refer to columns only through these constants so that the tables produced by one stage can be
//! consumed by the next without renaming.

// Canonical country list
pub const COUNTRY_NAME: &str = "country_name";
pub const COUNTRY_ISO2: &str = "iso2_code";

// Alias table
pub const ALIAS_TEXT: &str = "fuzzy_country";
pub const COUNTRY_CODE: &str = "country_code";

// Cost-effectiveness dataset as published
pub const SOURCE_PUBLICATION_YEAR: &str = "Publication Year";
pub const SOURCE_TARGET_POPULATION: &str = "Target Population";
/// The ratio column header carries a currency-year suffix, so it is located by prefix.
pub const SOURCE_RATIO_PREFIX: &str = "US$/QALY";

// Cost ratios after ingest
pub const YEAR: &str = "year";
pub const POPULATION_LABEL: &str = "population_label";
pub const RATIO_TEXT: &str = "ratio_text";
pub const RATIO_ID: &str = "ratio_id";

// Resolution
pub const DISTINCT_CODES: &str = "distinct_codes";

// VEL
pub const VEL: &str = "vel";
pub const LOG_VEL: &str = "log_vel";
pub const MEAN_LOG_VEL: &str = "mean_log_vel";

// Expenditure indicators
pub const PUBLIC: &str = "public";
pub const PRIVATE: &str = "private";
pub const NON_PROFIT: &str = "non_profit";
pub const TOTAL_SPENDING: &str = "total_spending";
pub const LOG_TOTAL_SPENDING: &str = "log_total_spending";

// Price index
pub const DATE: &str = "date";
pub const PRICE_INDEX: &str = "price_index";
