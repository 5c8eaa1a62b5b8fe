//! Types and functions to assign a single country to each free-text population label.
//!
//! Resolution is an explicit join-then-group-and-filter over immutable tables:
//!
//! 1. `deduplicate` collapses exact duplicate ratio records and attaches a `ratio_id`.
//! 2. `match_candidates` joins every record against every alias whose text occurs in the label
//!    as a whole word, producing one candidate row per matching alias.
//! 3. `resolve` keeps a record only when its candidates name exactly one distinct country.
//!
//! Labels matching no alias, or aliases of several countries, are routine attrition rather than
//! errors: they are counted in the `ResolutionSummary` and otherwise dropped.

use log::{debug, info};
use polars::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{VelError, VelResult};
use crate::ingest::require_columns;
use crate::reference::AliasTable;
use crate::COL;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
pub enum CaseSensitivity {
    Insensitive,
    #[default]
    Sensitive,
}

/// Search in a column for a string literal (i.e. not a regex!) occurring as a whole word, i.e.
/// delimited by word boundaries on both sides.
fn filter_whole_word(column: &str, value: &str, case_sensitivity: &CaseSensitivity) -> Expr {
    let regex = match case_sensitivity {
        CaseSensitivity::Insensitive => format!(r"(?i)\b{}\b", regex::escape(value)),
        CaseSensitivity::Sensitive => format!(r"\b{}\b", regex::escape(value)),
    };
    col(column).str().contains(lit(regex), false)
}

/// Counts of how the deduplicated records were resolved.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionSummary {
    /// Deduplicated ratio records considered
    pub records: usize,
    /// Records assigned exactly one country
    pub matched: usize,
    /// Records whose aliases named two or more distinct countries
    pub ambiguous: usize,
    /// Records matching no alias at all
    pub unmatched: usize,
}

/// The resolved ratio records together with the attrition counts.
#[derive(Clone, Debug)]
pub struct Resolution {
    pub resolved: DataFrame,
    pub summary: ResolutionSummary,
}

/// Collapse exact duplicates of (`year`, `population_label`, `ratio_text`) and attach a
/// `ratio_id` in first-occurrence order. Records without a year are dropped and a missing
/// `ratio_text` is read as the empty string. Applying this twice gives the same table.
pub fn deduplicate(raw: &DataFrame) -> VelResult<DataFrame> {
    require_columns(
        raw,
        &[COL::YEAR, COL::POPULATION_LABEL, COL::RATIO_TEXT],
        "cost ratio table",
    )?;
    let deduplicated = raw
        .clone()
        .lazy()
        .select([
            col(COL::YEAR).cast(DataType::Int32),
            col(COL::POPULATION_LABEL).cast(DataType::String),
            col(COL::RATIO_TEXT)
                .cast(DataType::String)
                .fill_null(lit("")),
        ])
        .filter(col(COL::YEAR).is_not_null())
        .unique_stable(
            Some(vec![
                COL::YEAR.to_string(),
                COL::POPULATION_LABEL.to_string(),
                COL::RATIO_TEXT.to_string(),
            ]),
            UniqueKeepStrategy::First,
        )
        .with_row_index(COL::RATIO_ID, None)
        .collect()?;
    info!(
        "Deduplicated {} cost ratio record(s) into {}",
        raw.height(),
        deduplicated.height()
    );
    Ok(deduplicated)
}

/// One (`ratio_id`, `country_code`, `fuzzy_country`) row per alias found as a whole word in a
/// record's population label. A record may produce any number of rows.
pub fn match_candidates(
    ratios: &DataFrame,
    aliases: &AliasTable,
    case_sensitivity: CaseSensitivity,
) -> VelResult<DataFrame> {
    let pairs = aliases.pairs()?;
    if pairs.is_empty() {
        return Err(VelError::Configuration("alias table is empty".into()));
    }
    let per_alias: Vec<LazyFrame> = pairs
        .iter()
        .map(|(alias, code)| {
            ratios
                .clone()
                .lazy()
                .filter(filter_whole_word(
                    COL::POPULATION_LABEL,
                    alias,
                    &case_sensitivity,
                ))
                .with_columns([
                    lit(code.as_str()).alias(COL::COUNTRY_CODE),
                    lit(alias.as_str()).alias(COL::ALIAS_TEXT),
                ])
                .select([
                    col(COL::RATIO_ID),
                    col(COL::COUNTRY_CODE),
                    col(COL::ALIAS_TEXT),
                ])
        })
        .collect();
    let candidates = concat(per_alias, UnionArgs::default())?
        .sort([COL::RATIO_ID], SortMultipleOptions::default().with_maintain_order(true))
        .collect()?;
    debug!("Match candidates with shape: {:?}", candidates.shape());
    Ok(candidates)
}

/// Keep the records whose candidates contain exactly one distinct country code and attach that
/// code. Two aliases naming the same country are not ambiguous.
pub fn resolve_candidates(ratios: &DataFrame, candidates: &DataFrame) -> VelResult<Resolution> {
    let per_record = candidates
        .clone()
        .lazy()
        .group_by([col(COL::RATIO_ID)])
        .agg([
            col(COL::COUNTRY_CODE)
                .n_unique()
                .alias(COL::DISTINCT_CODES),
            col(COL::COUNTRY_CODE).first(),
        ])
        .collect()?;

    let matched = per_record
        .column(COL::DISTINCT_CODES)?
        .cast(&DataType::UInt32)?
        .u32()?
        .into_iter()
        .filter(|n| *n == Some(1))
        .count();
    let with_candidates = per_record.height();

    let unambiguous = per_record
        .lazy()
        .filter(col(COL::DISTINCT_CODES).eq(lit(1)))
        .select([col(COL::RATIO_ID), col(COL::COUNTRY_CODE)]);
    let resolved = ratios
        .clone()
        .lazy()
        .join(
            unambiguous,
            [col(COL::RATIO_ID)],
            [col(COL::RATIO_ID)],
            JoinArgs::new(JoinType::Inner),
        )
        .sort([COL::RATIO_ID], SortMultipleOptions::default())
        .collect()?;

    let summary = ResolutionSummary {
        records: ratios.height(),
        matched,
        ambiguous: with_candidates - matched,
        unmatched: ratios.height().saturating_sub(with_candidates),
    };
    info!(
        "Resolved {} of {} record(s) to a single country ({} ambiguous, {} unmatched)",
        summary.matched, summary.records, summary.ambiguous, summary.unmatched
    );
    Ok(Resolution { resolved, summary })
}

/// Match and resolve deduplicated ratio records against the alias table.
pub fn resolve(
    ratios: &DataFrame,
    aliases: &AliasTable,
    case_sensitivity: CaseSensitivity,
) -> VelResult<Resolution> {
    let candidates = match_candidates(ratios, aliases, case_sensitivity)?;
    resolve_candidates(ratios, &candidates)
}
