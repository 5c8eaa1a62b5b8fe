use comfy_table::{presets::NOTHING, *};
use itertools::Itertools;
use strum::IntoEnumIterator;
use vel::{
    analysis::{CovarianceDecomposition, Regression, CONFIDENCE_LEVEL},
    currency::PriceIndex,
    indicators::Sector,
    reference::AliasTable,
    resolve::ResolutionSummary,
    Diagnostics,
};

fn new_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(NOTHING)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_style(comfy_table::TableComponent::BottomBorder, '─')
        .set_style(comfy_table::TableComponent::MiddleHeaderIntersections, '─')
        .set_style(comfy_table::TableComponent::HeaderLines, '─')
        .set_style(comfy_table::TableComponent::BottomBorderIntersections, '─')
        .set_style(comfy_table::TableComponent::TopBorder, '─')
        .set_style(comfy_table::TableComponent::TopBorderIntersections, '─');
    table
}

fn bold(text: &str) -> Cell {
    Cell::new(text).add_attribute(Attribute::Bold)
}

fn right_align_first_column(table: &mut Table) {
    if let Some(column) = table.column_mut(0) {
        column.set_cell_alignment(CellAlignment::Right);
    }
}

fn resolution_rows(table: &mut Table, summary: &ResolutionSummary) {
    table
        .add_row(vec![bold("Records"), summary.records.into()])
        .add_row(vec![bold("Matched"), summary.matched.into()])
        .add_row(vec![bold("Ambiguous"), summary.ambiguous.into()])
        .add_row(vec![bold("Unmatched"), summary.unmatched.into()]);
}

pub fn display_resolution(summary: &ResolutionSummary) {
    let mut table = new_table();
    resolution_rows(&mut table, summary);
    right_align_first_column(&mut table);
    println!("\n{}", table);
}

pub fn display_diagnostics(diagnostics: &Diagnostics) {
    let mut table = new_table();
    resolution_rows(&mut table, &diagnostics.resolution);
    table
        .add_row(vec![bold("Valued"), diagnostics.vel.valued.into()])
        .add_row(vec![bold("Sentinel ratios"), diagnostics.vel.sentinel.into()])
        .add_row(vec![
            bold("Unparseable ratios"),
            diagnostics.vel.parse_errors.into(),
        ]);
    right_align_first_column(&mut table);
    println!("\n{}", table);
}

pub fn display_regression(regression: &Regression, current_year: i32) {
    let mut table = new_table();
    table
        .add_row(vec![bold("Observations"), regression.n.into()])
        .add_row(vec![
            bold("Intercept"),
            format!("{:.4}", regression.intercept).into(),
        ])
        .add_row(vec![
            bold("Elasticity"),
            format!("{:.4}", regression.slope).into(),
        ])
        .add_row(vec![
            bold("Standard error"),
            format!("{:.4}", regression.slope_std_error).into(),
        ])
        .add_row(vec![
            bold(&format!("{:.0}% CI", CONFIDENCE_LEVEL * 100.0)),
            format!("[{:.4}, {:.4}]", regression.ci_lower, regression.ci_upper).into(),
        ])
        .add_row(vec![
            bold("Spending deflated to"),
            current_year.into(),
        ]);
    right_align_first_column(&mut table);
    println!("\nlog(VEL) regressed on log(total health spending per capita):");
    println!("{}", table);
}

pub fn display_decomposition(decomposition: &CovarianceDecomposition) {
    let mut table = new_table();
    let sectors = Sector::iter().collect_vec();
    table.set_header(
        std::iter::once(bold(""))
            .chain(sectors.iter().map(|sector| bold(&sector.to_string())))
            .collect_vec(),
    );
    for (sector, row) in sectors.iter().zip(decomposition.normalized.iter()) {
        table.add_row(
            std::iter::once(bold(&sector.to_string()))
                .chain(row.iter().map(|value| Cell::new(format!("{value:.4}"))))
                .collect_vec(),
        );
    }
    right_align_first_column(&mut table);
    println!(
        "\nShare of the variance of total spending (n = {}):",
        decomposition.n
    );
    println!("{}", table);
}

pub fn display_aliases(aliases: &AliasTable, code: Option<&str>) -> anyhow::Result<()> {
    let mut table = new_table();
    table.set_header(vec![bold("Alias"), bold("ISO 3166-1 alpha-2")]);
    let pairs = aliases
        .pairs()?
        .into_iter()
        .filter(|(_, c)| code.map_or(true, |code| c.eq_ignore_ascii_case(code)))
        .sorted_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
    for (alias, code) in pairs {
        table.add_row(vec![alias, code]);
    }
    println!("\n{}", table);
    Ok(())
}

pub fn display_price_index(price_index: &PriceIndex, from: Option<i32>, to: Option<i32>) {
    let mut table = new_table();
    table.set_header(vec![bold("Year"), bold("Index")]);
    for (year, value) in price_index
        .iter()
        .filter(|(year, _)| from.map_or(true, |from| *year >= from))
        .filter(|(year, _)| to.map_or(true, |to| *year <= to))
    {
        table.add_row(vec![year.to_string(), format!("{value:.3}")]);
    }
    println!("\n{}", table);
}
