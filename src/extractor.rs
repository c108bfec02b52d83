// Extractor - markup -> ordered raw (name, code) pairs
// First <table> only, first row is treated as the header

use crate::record::RawPair;
use scraper::{ElementRef, Html, Selector};
use std::sync::OnceLock;
use tracing::{debug, warn};

struct Selectors {
    table: Selector,
    row: Selector,
    cell: Selector,
}

fn selectors() -> Option<&'static Selectors> {
    static SELECTORS: OnceLock<Option<Selectors>> = OnceLock::new();
    SELECTORS
        .get_or_init(|| {
            Some(Selectors {
                table: Selector::parse("table").ok()?,
                row: Selector::parse("tr").ok()?,
                cell: Selector::parse("td").ok()?,
            })
        })
        .as_ref()
}

/// Extract candidate pairs from the first table in `markup`.
///
/// Rows after the header with fewer than two data cells are skipped.
/// No table, or a table with only a header, yields an empty vec.
pub fn extract(markup: &str) -> Vec<RawPair> {
    let Some(sel) = selectors() else {
        warn!("table selectors failed to parse");
        return Vec::new();
    };
    let document = Html::parse_document(markup);

    let Some(table) = document.select(&sel.table).next() else {
        debug!("no table found in markup");
        return Vec::new();
    };

    let pairs: Vec<RawPair> = table
        .select(&sel.row)
        .skip(1)
        .filter_map(|row| {
            let mut cells = row.select(&sel.cell);
            let name = cells.next()?;
            let code = cells.next()?;
            Some(RawPair::new(cell_text(name), cell_text(code)))
        })
        .collect();

    debug!(rows = pairs.len(), "extracted table rows");
    pairs
}

fn cell_text(cell: ElementRef<'_>) -> String {
    cell.text().collect::<String>().trim().to_string()
}
