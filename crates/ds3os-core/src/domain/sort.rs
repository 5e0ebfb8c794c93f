//! Display filtering and ordering of the server list.
//!
//! # Sort modes
//!
//! Clicking a column header cycles through three orders:
//!
//! ```text
//! Smart  ──►  Ascending  ──►  Descending  ──►  Smart ...
//! ```
//!
//! *Smart* ignores the column and groups servers the way most players want
//! to see them:
//!
//! 1. The official server.
//! 2. Manual imports (servers the user added on purpose).
//! 3. Within each of those groups, open servers before password-protected ones.
//! 4. Finally by player count, busiest first.

use std::cmp::Ordering;

use super::server::ServerEntry;

/// Column the list can be sorted by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortColumn {
    Name,
    PlayerCount,
    Description,
}

impl SortColumn {
    /// Header text without a direction marker.
    pub fn title(self) -> &'static str {
        match self {
            SortColumn::Name => "Server Name",
            SortColumn::PlayerCount => "Player Count",
            SortColumn::Description => "Description",
        }
    }
}

/// Active sort order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Smart,
    Ascending,
    Descending,
}

impl SortOrder {
    fn next(self) -> Self {
        match self {
            SortOrder::Smart => SortOrder::Ascending,
            SortOrder::Ascending => SortOrder::Descending,
            SortOrder::Descending => SortOrder::Smart,
        }
    }
}

/// Comparator for server entries according to the active sort mode.
#[derive(Debug, Clone)]
pub struct ServerSorter {
    column: SortColumn,
    order: SortOrder,
    official_hostname: Option<String>,
}

impl Default for ServerSorter {
    fn default() -> Self {
        Self {
            column: SortColumn::PlayerCount,
            order: SortOrder::Smart,
            official_hostname: None,
        }
    }
}

impl ServerSorter {
    /// Creates a smart sorter that pins `official_hostname` to the top.
    pub fn new(official_hostname: Option<String>) -> Self {
        Self {
            official_hostname,
            ..Self::default()
        }
    }

    pub fn column(&self) -> SortColumn {
        self.column
    }

    pub fn order(&self) -> SortOrder {
        self.order
    }

    pub fn official_hostname(&self) -> Option<&str> {
        self.official_hostname.as_deref()
    }

    /// Handles a click on a column header.
    ///
    /// Clicking a different column switches to it; every click advances the
    /// order one step.
    pub fn cycle(&mut self, column: SortColumn) {
        self.column = column;
        self.order = self.order.next();
    }

    /// Header text for `column`, with `↑` / `↓` when it is the active column.
    pub fn header_label(&self, column: SortColumn) -> String {
        if column != self.column {
            return column.title().to_string();
        }
        match self.order {
            SortOrder::Smart => column.title().to_string(),
            SortOrder::Ascending => format!("↑ {}", column.title()),
            SortOrder::Descending => format!("↓ {}", column.title()),
        }
    }

    /// Compares two entries under the active mode.
    pub fn compare(&self, a: &ServerEntry, b: &ServerEntry) -> Ordering {
        match self.order {
            SortOrder::Smart => self.compare_smart(a, b),
            SortOrder::Ascending => self.compare_column(a, b),
            SortOrder::Descending => self.compare_column(a, b).reverse(),
        }
    }

    fn compare_smart(&self, a: &ServerEntry, b: &ServerEntry) -> Ordering {
        let is_official = |e: &ServerEntry| self.official_hostname.as_deref() == Some(e.hostname.as_str());

        // `true` sorts first in every key, hence the reversed bool comparisons.
        is_official(b)
            .cmp(&is_official(a))
            .then_with(|| b.manually_imported().cmp(&a.manually_imported()))
            .then_with(|| a.password_required.cmp(&b.password_required))
            .then_with(|| b.player_count.cmp(&a.player_count))
    }

    fn compare_column(&self, a: &ServerEntry, b: &ServerEntry) -> Ordering {
        match self.column {
            SortColumn::Name => caseless(&a.display_name).cmp(&caseless(&b.display_name)),
            SortColumn::PlayerCount => a.player_count.cmp(&b.player_count),
            SortColumn::Description => caseless(&a.description).cmp(&caseless(&b.description)),
        }
    }
}

fn caseless(s: &str) -> String {
    s.to_lowercase()
}

/// User-configurable visibility rules for the server list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerFilter {
    /// Free text matched against name and description.
    pub search: String,
    /// Hide password-protected directory servers (ignored while searching).
    pub hide_passworded: bool,
    /// Hide directory servers with fewer players (ignored while searching).
    pub minimum_players: u32,
}

impl ServerFilter {
    /// Returns `true` if `entry` should be shown.
    ///
    /// Manual imports are always shown.
    pub fn matches(&self, entry: &ServerEntry) -> bool {
        if entry.manually_imported() {
            return true;
        }

        let search = self.search.trim().to_lowercase();
        if !search.is_empty() {
            return entry.display_name.to_lowercase().contains(&search)
                || entry.description.to_lowercase().contains(&search);
        }

        if entry.password_required && self.hide_passworded {
            return false;
        }
        entry.player_count >= self.minimum_players
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
