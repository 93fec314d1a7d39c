// Core types for the WRF variable selector
//
// No I/O here: the catalog is handed in by wrfsel-io, the store is exported
// by wrfsel-notify.

pub mod catalog;
pub mod form;
pub mod scenario;
pub mod selection;

pub use catalog::{Catalog, VariableDescriptor};
pub use form::{FormError, FormEvent, FormPatch, FormState, FormView};
pub use scenario::{AggregationKind, ParseAggregationError, ScenarioId, DEFAULT_SCENARIO, KNOWN_SCENARIOS};
pub use selection::{SelectionRow, SelectionStore, SelectionUpdate};
