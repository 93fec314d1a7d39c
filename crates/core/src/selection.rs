//! Selection store and the two sync directions between it and the UI.
//!
//! UI → store: `apply_selection` takes the row indices currently selected in
//! the variable table and overwrites one aggregation column of one scenario.
//!
//! store → UI: `derive_selected_indices` rebuilds the index list for the
//! table whenever the scenario or aggregation selector changes.
//!
//! Invariant: every row list in the store is index-aligned with the catalog
//! (`rows[i].variable_id == catalog[i].id`).

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::catalog::Catalog;
use crate::scenario::{AggregationKind, ScenarioId};

/// Per-variable aggregation flags for one scenario.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionRow {
    pub variable_id: String,
    pub hourly: bool,
    pub daily: bool,
    pub monthly: bool,
}

impl SelectionRow {
    /// A row with every flag cleared.
    pub fn new(variable_id: impl Into<String>) -> Self {
        Self {
            variable_id: variable_id.into(),
            hourly: false,
            daily: false,
            monthly: false,
        }
    }

    pub fn get(&self, aggregation: AggregationKind) -> bool {
        match aggregation {
            AggregationKind::Hourly => self.hourly,
            AggregationKind::Daily => self.daily,
            AggregationKind::Monthly => self.monthly,
        }
    }

    pub fn set(&mut self, aggregation: AggregationKind, value: bool) {
        match aggregation {
            AggregationKind::Hourly => self.hourly = value,
            AggregationKind::Daily => self.daily = value,
            AggregationKind::Monthly => self.monthly = value,
        }
    }

    /// Exported cell text: "X" when set, empty otherwise.
    pub fn flag(&self, aggregation: AggregationKind) -> &'static str {
        if self.get(aggregation) {
            "X"
        } else {
            ""
        }
    }

    pub fn any(&self) -> bool {
        self.hourly || self.daily || self.monthly
    }
}

/// Result of `SelectionStore::apply_selection`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionUpdate {
    /// Rows after the update, for immediate redisplay.
    pub rows: Vec<SelectionRow>,
    /// False when the scenario was unknown and the update went to a
    /// transient copy instead of the store.
    pub stored: bool,
}

/// Scenario → row list, in scenario display order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionStore {
    /// All-false rows aligned with the catalog; template for new scenarios and
    /// for the unknown-scenario fallback.
    blank: Vec<SelectionRow>,
    scenarios: Vec<(ScenarioId, Vec<SelectionRow>)>,
}

impl SelectionStore {
    /// Create a store with every flag cleared for each scenario.
    /// Duplicate scenario names are kept once.
    pub fn new(catalog: &Catalog, scenarios: impl IntoIterator<Item = ScenarioId>) -> Self {
        let blank: Vec<SelectionRow> = catalog.ids().map(SelectionRow::new).collect();
        let mut store = Self {
            blank,
            scenarios: Vec::new(),
        };
        for scenario in scenarios {
            if !store.contains(&scenario) {
                let rows = store.blank.clone();
                store.scenarios.push((scenario, rows));
            }
        }
        store
    }

    pub fn contains(&self, scenario: &ScenarioId) -> bool {
        self.rows(scenario).is_some()
    }

    /// Scenario names in display order.
    pub fn scenarios(&self) -> impl Iterator<Item = &ScenarioId> + '_ {
        self.scenarios.iter().map(|(id, _)| id)
    }

    /// (scenario, rows) pairs in display order.
    pub fn iter(&self) -> impl Iterator<Item = (&ScenarioId, &[SelectionRow])> + '_ {
        self.scenarios.iter().map(|(id, rows)| (id, rows.as_slice()))
    }

    pub fn rows(&self, scenario: &ScenarioId) -> Option<&[SelectionRow]> {
        self.scenarios
            .iter()
            .find(|(id, _)| id == scenario)
            .map(|(_, rows)| rows.as_slice())
    }

    fn rows_mut(&mut self, scenario: &ScenarioId) -> Option<&mut Vec<SelectionRow>> {
        self.scenarios
            .iter_mut()
            .find(|(id, _)| id == scenario)
            .map(|(_, rows)| rows)
    }

    /// Number of catalog rows each scenario carries.
    pub fn row_count(&self) -> usize {
        self.blank.len()
    }

    /// True if any flag of any aggregation is set for the scenario.
    pub fn has_selections(&self, scenario: &ScenarioId) -> bool {
        self.rows(scenario)
            .map(|rows| rows.iter().any(SelectionRow::any))
            .unwrap_or(false)
    }

    /// Overwrite one aggregation column of one scenario from the UI's
    /// selected row indices.
    ///
    /// Rows whose index is in `selected` get the flag set, every other row
    /// gets it cleared. Indices past the end of the catalog are ignored.
    /// Other aggregation columns are left as they were.
    ///
    /// An unknown scenario leaves the store untouched: the update is applied
    /// to a fresh blank copy, which is returned with `stored == false`.
    pub fn apply_selection(
        &mut self,
        scenario: &ScenarioId,
        aggregation: AggregationKind,
        selected: &BTreeSet<usize>,
    ) -> SelectionUpdate {
        let (mut rows, stored) = match self.rows(scenario) {
            Some(rows) => (rows.to_vec(), true),
            None => {
                log::warn!(
                    "Selection for unknown scenario '{}' applied to a transient copy",
                    scenario
                );
                (self.blank.clone(), false)
            }
        };

        for (idx, row) in rows.iter_mut().enumerate() {
            row.set(aggregation, selected.contains(&idx));
        }

        if stored {
            if let Some(slot) = self.rows_mut(scenario) {
                *slot = rows.clone();
            }
        }

        SelectionUpdate { rows, stored }
    }

    /// Ascending row indices whose `aggregation` flag is set for `scenario`.
    /// Empty for an unknown scenario.
    pub fn derive_selected_indices(&self, scenario: &ScenarioId, aggregation: AggregationKind) -> Vec<usize> {
        self.rows(scenario)
            .map(|rows| {
                rows.iter()
                    .enumerate()
                    .filter(|(_, row)| row.get(aggregation))
                    .map(|(idx, _)| idx)
                    .collect()
            })
            .unwrap_or_default()
    }
}
