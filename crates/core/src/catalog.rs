use serde::{Deserialize, Serialize};

/// One row of the variable catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableDescriptor {
    /// Unique key (e.g. "T2").
    pub id: String,
    /// Human-readable name.
    pub description: String,
    pub dimensions: String,
    pub units: String,
}

impl VariableDescriptor {
    pub fn new(id: &str, description: &str, dimensions: &str, units: &str) -> Self {
        Self {
            id: id.to_string(),
            description: description.to_string(),
            dimensions: dimensions.to_string(),
            units: units.to_string(),
        }
    }
}

/// Ordered, immutable list of variables. Row indices in the UI are indices
/// into this list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    variables: Vec<VariableDescriptor>,
}

impl Catalog {
    pub fn new(variables: Vec<VariableDescriptor>) -> Self {
        Self { variables }
    }

    pub fn variables(&self) -> &[VariableDescriptor] {
        &self.variables
    }

    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&VariableDescriptor> {
        self.variables.get(index)
    }

    /// Variable ids in catalog order.
    pub fn ids(&self) -> impl Iterator<Item = &str> + '_ {
        self.variables.iter().map(|v| v.id.as_str())
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        self.variables.iter().position(|v| v.id == id)
    }
}
