//! Data behind the dashboard widgets: table rows, the outcome pie chart and
//! the map marker. Pure functions over records; no store access.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::{Record, ID_FIELD};

/// Rows per table page.
pub const DEFAULT_PAGE_SIZE: usize = 10;

/// Fields never shown in the table: the identifier and the unnamed index
/// column carried over from the CSV import.
pub const HIDDEN_FIELDS: [&str; 2] = [ID_FIELD, ""];

/// Label for records without an outcome type.
pub const UNKNOWN_OUTCOME: &str = "Unknown";

/// Strip hidden fields from every record.
pub fn table_rows<I: IntoIterator<Item = Record>>(records: I) -> Vec<Record> {
    records
        .into_iter()
        .map(|mut rec| {
            for field in HIDDEN_FIELDS {
                rec.remove(field);
            }
            rec
        })
        .collect()
}

/// One page of table rows.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Page {
    pub rows: Vec<Record>,
    pub page: usize,
    pub page_size: usize,
    pub total: usize,
    pub page_count: usize,
}

/// Slice `rows` into the zero-based `page`. A zero page size falls back to
/// the default; pages past the end are empty.
pub fn paginate(rows: &[Record], page: usize, page_size: usize) -> Page {
    let page_size = if page_size == 0 {
        DEFAULT_PAGE_SIZE
    } else {
        page_size
    };
    let total = rows.len();
    let page_count = total.div_ceil(page_size);
    let start = page.saturating_mul(page_size).min(total);
    let end = start.saturating_add(page_size).min(total);
    Page {
        rows: rows[start..end].to_vec(),
        page,
        page_size,
        total,
        page_count,
    }
}

/// One pie slice.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct OutcomeSlice {
    pub outcome_type: String,
    pub count: usize,
}

/// Count rows per `outcome_type`, largest first, ties by name.
pub fn outcome_breakdown(rows: &[Record]) -> Vec<OutcomeSlice> {
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for row in rows {
        let outcome = row
            .str_field("outcome_type")
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(UNKNOWN_OUTCOME);
        *counts.entry(outcome.to_string()).or_default() += 1;
    }
    let mut slices: Vec<OutcomeSlice> = counts
        .into_iter()
        .map(|(outcome_type, count)| OutcomeSlice {
            outcome_type,
            count,
        })
        .collect();
    slices.sort_by(|a, b| {
        b.count
            .cmp(&a.count)
            .then_with(|| a.outcome_type.cmp(&b.outcome_type))
    });
    slices
}

/// Map marker for one animal: position, breed for the tooltip, name for the
/// popup.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MapMarker {
    pub latitude: f64,
    pub longitude: f64,
    pub breed: Option<String>,
    pub name: Option<String>,
}

/// Marker for the selected row of the current page, or its first row when
/// nothing (or an out-of-range row) is selected.
pub fn map_marker(page_rows: &[Record], selected: Option<usize>) -> Option<MapMarker> {
    let row = selected
        .and_then(|idx| page_rows.get(idx))
        .or_else(|| page_rows.first())?;
    Some(MapMarker {
        latitude: row.number_field("location_lat")?,
        longitude: row.number_field("location_long")?,
        breed: row.str_field("breed").map(str::to_string),
        name: row.str_field("name").map(str::to_string),
    })
}
