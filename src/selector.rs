//! The model catalog and the user's current choice.

use crate::error::{Error, Result};
use crate::types::{KnownModel, Model};

/// A fixed, ordered catalog of models and the one currently selected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSelector {
    catalog: Vec<Model>,
    current: usize,
}

impl ModelSelector {
    /// Creates a selector over `catalog`, selecting its first entry.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the catalog is empty.
    pub fn new(catalog: Vec<Model>) -> Result<Self> {
        if catalog.is_empty() {
            return Err(Error::validation(
                "model catalog must not be empty",
                Some("models".to_string()),
            ));
        }
        let mut deduped: Vec<Model> = Vec::with_capacity(catalog.len());
        for model in catalog {
            if !deduped.contains(&model) {
                deduped.push(model);
            }
        }
        Ok(Self {
            catalog: deduped,
            current: 0,
        })
    }

    /// Parses a comma-separated catalog such as `llama3-8b-8192,gemma2-9b-it`.
    pub fn from_list(list: &str) -> Result<Self> {
        let catalog = list
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(|name| name.parse::<Model>().unwrap_or_else(|e| match e {}))
            .collect();
        Self::new(catalog)
    }

    /// The catalog, in display order.
    pub fn list_models(&self) -> &[Model] {
        &self.catalog
    }

    /// The currently selected model.
    pub fn select_current(&self) -> &Model {
        &self.catalog[self.current]
    }

    /// Selects the catalog entry named `name`.
    ///
    /// # Errors
    ///
    /// Returns a validation error if `name` is not in the catalog; the selection is unchanged.
    pub fn select(&mut self, name: &str) -> Result<&Model> {
        let Some(index) = self.catalog.iter().position(|m| m.as_str() == name) else {
            return Err(Error::validation(
                format!(
                    "{name} is not in the model catalog ({})",
                    self.catalog
                        .iter()
                        .map(Model::as_str)
                        .collect::<Vec<_>>()
                        .join(", ")
                ),
                Some("model".to_string()),
            ));
        };
        self.current = index;
        Ok(&self.catalog[index])
    }
}

impl Default for ModelSelector {
    fn default() -> Self {
        Self {
            catalog: KnownModel::ALL.into_iter().map(Model::Known).collect(),
            current: 0,
        }
    }
}
