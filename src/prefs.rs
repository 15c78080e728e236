// src/prefs.rs
//
// The small set of preferences the cache core consumes (spec section 6).
// Everything here is read, never written, by the cache: the owning
// application is responsible for persisting and editing these.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SizeDisplayMode {
    Sum,
    Max,
    Min,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TitleSeriesSorting {
    /// Sort on the series name, ignoring the title.
    SeriesName,
    /// A leading series number sorts first ("1: Foo").
    Leading,
    /// A trailing series number sorts last ("Foo, 1").
    Trailing,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Preferences {
    /// When set, date sort keys are derived from the same formatted string
    /// shown in the UI rather than the canonical ISO value.
    pub sort_dates_using_visible_fields: bool,
    /// `strftime`-style format string applied to date fields when
    /// `sort_dates_using_visible_fields` is set.
    pub gui_date_display_format: Option<String>,
    pub book_size_display_mode: SizeDisplayMode,
    pub mark_new_books: bool,
    pub maximum_resort_levels: usize,
    pub title_series_sorting: TitleSeriesSorting,
    /// Tristate boolean sort keys (True/False/None -> 1/2/3) vs. a simple
    /// True/else split.
    pub bools_are_tristate: bool,
}

impl Default for Preferences {
    fn default() -> Self {
        Preferences {
            sort_dates_using_visible_fields: false,
            gui_date_display_format: None,
            book_size_display_mode: SizeDisplayMode::Sum,
            mark_new_books: false,
            maximum_resort_levels: 5,
            title_series_sorting: TitleSeriesSorting::SeriesName,
            bools_are_tristate: true,
        }
    }
}
