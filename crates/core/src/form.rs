// Per-session form state and its event handlers.
//
// Each handler mutates the state and returns only what the UI has to redraw.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::scenario::{AggregationKind, ScenarioId};
use crate::selection::{SelectionRow, SelectionStore};

/// User input coming from the form widgets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormEvent {
    /// The variable table's selected row indices changed.
    SelectRows {
        scenario: ScenarioId,
        aggregation: AggregationKind,
        indices: Vec<usize>,
    },
    ScenarioChanged(ScenarioId),
    AggregationChanged(AggregationKind),
    EmailChanged(String),
}

/// The parts of the UI an event changed. `None` fields are left as displayed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormPatch {
    /// New selected row indices for the variable table.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_indices: Option<Vec<usize>>,
    /// New contents for the read-only selection table.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selection_rows: Option<Vec<SelectionRow>>,
    /// Present after a row selection; false if it was not kept.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stored: Option<bool>,
}

impl FormPatch {
    pub fn is_empty(&self) -> bool {
        self.selected_indices.is_none() && self.selection_rows.is_none() && self.stored.is_none()
    }
}

/// Full snapshot of what the form shows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormView {
    pub scenario: ScenarioId,
    pub aggregation: AggregationKind,
    pub selected_indices: Vec<usize>,
    pub selection_rows: Vec<SelectionRow>,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormError {
    /// The scenario selector was set to a name outside the configured set.
    UnknownScenario(String),
}

impl fmt::Display for FormError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownScenario(name) => write!(f, "unknown scenario: {name}"),
        }
    }
}

impl std::error::Error for FormError {}

/// Selection store plus the current selector and input values of one session.
#[derive(Debug, Clone)]
pub struct FormState {
    store: SelectionStore,
    scenario: ScenarioId,
    aggregation: AggregationKind,
    email: String,
}

impl FormState {
    /// Start a session on `scenario` (falls back to the store's first
    /// scenario if it is not in the store) with the default aggregation.
    pub fn new(store: SelectionStore, scenario: ScenarioId) -> Self {
        let scenario = if store.contains(&scenario) {
            scenario
        } else {
            store.scenarios().next().cloned().unwrap_or(scenario)
        };
        Self {
            store,
            scenario,
            aggregation: AggregationKind::default(),
            email: String::new(),
        }
    }

    pub fn store(&self) -> &SelectionStore {
        &self.store
    }

    pub fn scenario(&self) -> &ScenarioId {
        &self.scenario
    }

    pub fn aggregation(&self) -> AggregationKind {
        self.aggregation
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn handle(&mut self, event: FormEvent) -> Result<FormPatch, FormError> {
        match event {
            FormEvent::SelectRows { scenario, aggregation, indices } => {
                let selected: BTreeSet<usize> = indices.into_iter().collect();
                let update = self.store.apply_selection(&scenario, aggregation, &selected);
                Ok(FormPatch {
                    selection_rows: Some(update.rows),
                    stored: Some(update.stored),
                    ..FormPatch::default()
                })
            }
            FormEvent::ScenarioChanged(scenario) => {
                let rows = self
                    .store
                    .rows(&scenario)
                    .ok_or_else(|| FormError::UnknownScenario(scenario.to_string()))?
                    .to_vec();
                let indices = self.store.derive_selected_indices(&scenario, self.aggregation);
                self.scenario = scenario;
                Ok(FormPatch {
                    selected_indices: Some(indices),
                    selection_rows: Some(rows),
                    ..FormPatch::default()
                })
            }
            FormEvent::AggregationChanged(aggregation) => {
                self.aggregation = aggregation;
                Ok(FormPatch {
                    selected_indices: Some(self.store.derive_selected_indices(&self.scenario, aggregation)),
                    ..FormPatch::default()
                })
            }
            FormEvent::EmailChanged(email) => {
                self.email = email;
                Ok(FormPatch::default())
            }
        }
    }

    pub fn view(&self) -> FormView {
        FormView {
            scenario: self.scenario.clone(),
            aggregation: self.aggregation,
            selected_indices: self.store.derive_selected_indices(&self.scenario, self.aggregation),
            selection_rows: self.store.rows(&self.scenario).map(<[SelectionRow]>::to_vec).unwrap_or_default(),
            email: self.email.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Catalog, VariableDescriptor};
    use crate::scenario::DEFAULT_SCENARIO;

    fn form() -> FormState {
        let catalog = Catalog::new(vec![
            VariableDescriptor::new("T2", "2-meter temperature", "2", "K"),
            VariableDescriptor::new("PCPT", "Total precipitation", "2", "mm"),
            VariableDescriptor::new("SNOW", "Snow water equivalent", "2", "kg m-2"),
        ]);
        FormState::new(SelectionStore::new(&catalog, ScenarioId::known()), ScenarioId::new(DEFAULT_SCENARIO))
    }

    fn select(form: &mut FormState, scenario: &str, aggregation: AggregationKind, indices: &[usize]) -> FormPatch {
        form.handle(FormEvent::SelectRows {
            scenario: ScenarioId::new(scenario),
            aggregation,
            indices: indices.to_vec(),
        })
        .unwrap()
    }

    #[test]
    fn test_initial_view() {
        let form = form();
        let view = form.view();
        assert_eq!(view.scenario.as_str(), DEFAULT_SCENARIO);
        assert_eq!(view.aggregation, AggregationKind::Daily);
        assert!(view.selected_indices.is_empty());
        assert_eq!(view.selection_rows.len(), 3);
        assert!(view.email.is_empty());
    }

    #[test]
    fn test_select_rows_patch_carries_rows() {
        let mut form = form();
        let patch = select(&mut form, "ERA-Interim", AggregationKind::Daily, &[0, 2]);

        assert_eq!(patch.stored, Some(true));
        assert!(patch.selected_indices.is_none());
        let rows = patch.selection_rows.unwrap();
        assert!(rows[0].daily && !rows[1].daily && rows[2].daily);
    }

    #[test]
    fn test_aggregation_switch_redisplays_saved_indices() {
        let mut form = form();
        form.handle(FormEvent::ScenarioChanged(ScenarioId::new("ERA-Interim"))).unwrap();
        select(&mut form, "ERA-Interim", AggregationKind::Daily, &[0, 2]);

        let hourly = form.handle(FormEvent::AggregationChanged(AggregationKind::Hourly)).unwrap();
        assert_eq!(hourly.selected_indices, Some(vec![]));

        let daily = form.handle(FormEvent::AggregationChanged(AggregationKind::Daily)).unwrap();
        assert_eq!(daily.selected_indices, Some(vec![0, 2]));
    }

    #[test]
    fn test_scenario_switch_does_not_leak_selection() {
        let mut form = form();
        select(&mut form, "ERA-Interim", AggregationKind::Daily, &[0, 2]);
        select(&mut form, "GFDL-CM3 RCP85", AggregationKind::Monthly, &[1]);

        // scenario first, then aggregation
        let patch = form.handle(FormEvent::ScenarioChanged(ScenarioId::new("GFDL-CM3 RCP85"))).unwrap();
        assert_eq!(patch.selected_indices, Some(vec![]));
        let patch = form.handle(FormEvent::AggregationChanged(AggregationKind::Monthly)).unwrap();
        assert_eq!(patch.selected_indices, Some(vec![1]));

        // aggregation first, then scenario
        form.handle(FormEvent::AggregationChanged(AggregationKind::Daily)).unwrap();
        let patch = form.handle(FormEvent::ScenarioChanged(ScenarioId::new("ERA-Interim"))).unwrap();
        assert_eq!(patch.selected_indices, Some(vec![0, 2]));
        let rows = patch.selection_rows.unwrap();
        assert!(rows.iter().all(|r| !r.monthly));
    }

    #[test]
    fn test_unknown_scenario_selector_is_rejected() {
        let mut form = form();
        let err = form.handle(FormEvent::ScenarioChanged(ScenarioId::new("nope"))).unwrap_err();
        assert_eq!(err, FormError::UnknownScenario("nope".to_string()));
        assert_eq!(form.scenario().as_str(), DEFAULT_SCENARIO);
    }

    #[test]
    fn test_unknown_scenario_selection_not_stored() {
        let mut form = form();
        let patch = select(&mut form, "nope", AggregationKind::Daily, &[1]);
        assert_eq!(patch.stored, Some(false));
        assert!(form.store().iter().all(|(_, rows)| rows.iter().all(|r| !r.any())));
    }

    #[test]
    fn test_email_changed() {
        let mut form = form();
        let patch = form.handle(FormEvent::EmailChanged("a@b.org".to_string())).unwrap();
        assert!(patch.is_empty());
        assert_eq!(form.email(), "a@b.org");
    }

    #[test]
    fn test_new_falls_back_to_first_scenario() {
        let catalog = Catalog::new(vec![VariableDescriptor::new("T2", "", "", "")]);
        let store = SelectionStore::new(&catalog, ScenarioId::known());
        let form = FormState::new(store, ScenarioId::new("missing"));
        assert_eq!(form.scenario().as_str(), "ERA-Interim");
    }
}
