// ── Derived meter views ──
//
// Pure functions over a meter snapshot and the filter/pagination state.
// Nothing here is cached; callers recompute on every read.

use std::sync::Arc;

use serde::Serialize;

use crate::model::Meter;

/// Page size the dashboard starts with.
pub const DEFAULT_PAGE_SIZE: usize = 12;

/// Search, filter and pagination state. Pure UI state with no relation to
/// anything on the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ViewState {
    pub search: String,
    pub active_only: bool,
    /// 1-based page index.
    pub page: usize,
    pub page_size: usize,
}

impl Default for ViewState {
    fn default() -> Self {
        Self {
            search: String::new(),
            active_only: false,
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl ViewState {
    /// Change the search text. Always returns to the first page. The text
    /// is matched as given, surrounding whitespace included.
    pub fn set_search(&mut self, search: impl Into<String>) {
        self.search = search.into();
        self.page = 1;
    }

    /// Flip the active-only filter. The page index is kept as is.
    pub fn toggle_active_only(&mut self) {
        self.active_only = !self.active_only;
    }

    /// The page index is kept as is.
    pub fn set_active_only(&mut self, active_only: bool) {
        self.active_only = active_only;
    }

    /// Set the 1-based page index. Page 0 is treated as page 1.
    pub fn set_page(&mut self, page: usize) {
        self.page = page.max(1);
    }

    /// Set the page size (at least 1). The page index is kept as is.
    pub fn set_page_size(&mut self, page_size: usize) {
        self.page_size = page_size.max(1);
    }
}

/// Whether a meter passes the search text (case-insensitive on name and
/// identity, plain substring on the number).
fn matches_search(meter: &Meter, needle_lower: &str) -> bool {
    meter
        .name
        .as_deref()
        .is_some_and(|n| n.to_lowercase().contains(needle_lower))
        || meter
            .number
            .is_some_and(|n| n.to_string().contains(needle_lower))
        || meter.mac.as_str().to_lowercase().contains(needle_lower)
}

/// Named meters, then the active-only filter, then the search text.
pub fn filtered_meters(meters: &[Arc<Meter>], view: &ViewState) -> Vec<Arc<Meter>> {
    let needle = view.search.to_lowercase();

    meters
        .iter()
        .filter(|m| m.is_named())
        .filter(|m| !view.active_only || m.is_online())
        .filter(|m| needle.is_empty() || matches_search(m, &needle))
        .cloned()
        .collect()
}

/// `ceil(count / page_size)`; zero when there is nothing to show.
pub fn total_pages(count: usize, page_size: usize) -> usize {
    count.div_ceil(page_size.max(1))
}

/// Slice out one 1-based page. A page past the end is empty, never
/// clamped back into range.
pub fn paginate<T: Clone>(items: &[T], page: usize, page_size: usize) -> Vec<T> {
    let page_size = page_size.max(1);
    let start = page.max(1).saturating_sub(1).saturating_mul(page_size);
    items.iter().skip(start).take(page_size).cloned().collect()
}

/// Meters reporting `online`, named or not.
pub fn active_meters(meters: &[Arc<Meter>]) -> Vec<Arc<Meter>> {
    meters.iter().filter(|m| m.is_online()).cloned().collect()
}

/// Meters not reporting `online`, named or not.
pub fn inactive_meters(meters: &[Arc<Meter>]) -> Vec<Arc<Meter>> {
    meters.iter().filter(|m| !m.is_online()).cloned().collect()
}

/// One rendered page plus the counts a pager needs.
#[derive(Debug, Clone, Serialize)]
pub struct MeterView {
    pub items: Vec<Arc<Meter>>,
    pub page: usize,
    pub page_size: usize,
    pub total_pages: usize,
    pub filtered_count: usize,
    pub total_count: usize,
}

impl MeterView {
    pub fn build(meters: &[Arc<Meter>], view: &ViewState) -> Self {
        let filtered = filtered_meters(meters, view);
        Self {
            items: paginate(&filtered, view.page, view.page_size),
            page: view.page,
            page_size: view.page_size,
            total_pages: total_pages(filtered.len(), view.page_size),
            filtered_count: filtered.len(),
            total_count: meters.len(),
        }
    }
}
