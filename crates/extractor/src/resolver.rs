//! Table-driven layout resolver

use std::collections::HashMap;

use contracts::{ContractError, FieldLayout, FormatType, LayoutResolver};
use parking_lot::RwLock;

/// `LayoutResolver` backed by a url -> layout table
///
/// Ignores the schema bytes; conversion is the default copy. Stands in for the
/// external schema parser in tests and demos.
#[derive(Debug, Default)]
pub struct StaticLayoutResolver {
    fields: RwLock<HashMap<String, FieldLayout>>,
}

impl StaticLayoutResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with_field(self, url: impl Into<String>, layout: FieldLayout) -> Self {
        self.insert(url, layout);
        self
    }

    pub fn insert(&self, url: impl Into<String>, layout: FieldLayout) {
        self.fields.write().insert(url.into(), layout);
    }

    /// Load a `{ "url": FieldLayout }` JSON table
    pub fn from_json(content: &str) -> Result<Self, ContractError> {
        let fields: HashMap<String, FieldLayout> = serde_json::from_str(content).map_err(|e| {
            ContractError::ConfigParse {
                message: format!("layout table: {e}"),
                source: Some(Box::new(e)),
            }
        })?;
        Ok(Self {
            fields: RwLock::new(fields),
        })
    }

    pub fn len(&self) -> usize {
        self.fields.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl LayoutResolver for StaticLayoutResolver {
    fn resolve_layout(
        &self,
        _topic: &str,
        url: &str,
        _schema: &[u8],
        _format_type: FormatType,
    ) -> Option<FieldLayout> {
        self.fields.read().get(url).copied()
    }
}
