pub mod dispatch;

use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::config::ModelsConfig;
use crate::error::RelayError;
use crate::protocol::ModelSlot;

/// The resolved upstream model for a request.
#[derive(Debug, Clone)]
pub struct ResolvedModel {
    pub slot: ModelSlot,
    pub model: Arc<str>,
    /// `true` when the requested slot was absent or unmapped.
    pub fell_back: bool,
}

/// Immutable slot-to-upstream-model table built once at startup.
#[derive(Debug, Clone)]
pub struct ModelMap {
    models: FxHashMap<ModelSlot, Arc<str>>,
    default_slot: ModelSlot,
    default_model: Arc<str>,
}

impl ModelMap {
    /// Build the table from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Config`] when the default slot has no mapping.
    pub fn new(config: &ModelsConfig) -> Result<Self, RelayError> {
        let models: FxHashMap<ModelSlot, Arc<str>> = config
            .slots
            .iter()
            .map(|(slot, model)| (*slot, Arc::from(model.trim())))
            .collect();
        let default_model = models.get(&config.default).cloned().ok_or_else(|| {
            RelayError::Config(format!(
                "default slot '{}' has no upstream model",
                config.default
            ))
        })?;

        Ok(Self {
            models,
            default_slot: config.default,
            default_model,
        })
    }

    /// Resolve a selector to an upstream model id. Never fails.
    #[must_use]
    pub fn resolve(&self, selector: Option<ModelSlot>) -> ResolvedModel {
        if let Some(slot) = selector {
            if let Some(model) = self.models.get(&slot) {
                return ResolvedModel {
                    slot,
                    model: Arc::clone(model),
                    fell_back: false,
                };
            }
        }
        ResolvedModel {
            slot: self.default_slot,
            model: Arc::clone(&self.default_model),
            fell_back: true,
        }
    }

    #[must_use]
    pub fn default_slot(&self) -> ModelSlot {
        self.default_slot
    }

    /// Mapped slots in declaration order of [`ModelSlot::ALL`].
    pub fn entries(&self) -> impl Iterator<Item = (ModelSlot, &str)> + '_ {
        ModelSlot::ALL
            .into_iter()
            .filter_map(|slot| self.models.get(&slot).map(|model| (slot, model.as_ref())))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.models.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    fn make_map(default: ModelSlot, slots: &[(ModelSlot, &str)]) -> Result<ModelMap, RelayError> {
        ModelMap::new(&ModelsConfig {
            default,
            slots: slots
                .iter()
                .map(|(slot, model)| (*slot, (*model).to_string()))
                .collect::<BTreeMap<_, _>>(),
        })
    }

    #[test]
    fn test_resolve_mapped_slot() {
        let map = make_map(
            ModelSlot::Claude,
            &[(ModelSlot::Claude, "llama3.1"), (ModelSlot::Gpt, "mistral")],
        )
        .unwrap();
        let resolved = map.resolve(Some(ModelSlot::Gpt));
        assert_eq!(resolved.slot, ModelSlot::Gpt);
        assert_eq!(&*resolved.model, "mistral");
        assert!(!resolved.fell_back);
    }

    #[test]
    fn test_unmapped_slot_falls_back() {
        let map = make_map(
            ModelSlot::Claude,
            &[(ModelSlot::Claude, "llama3.1"), (ModelSlot::Gemini, "llama3")],
        )
        .unwrap();
        let resolved = map.resolve(Some(ModelSlot::Gpt));
        assert_eq!(resolved.slot, ModelSlot::Claude);
        assert_eq!(&*resolved.model, "llama3.1");
        assert!(resolved.fell_back);
    }

    #[test]
    fn test_absent_selector_uses_default() {
        let map = make_map(ModelSlot::Gemini, &[(ModelSlot::Gemini, "llama3")]).unwrap();
        let resolved = map.resolve(None);
        assert_eq!(resolved.slot, ModelSlot::Gemini);
        assert!(resolved.fell_back);
    }

    #[test]
    fn test_missing_default_is_config_error() {
        let err = make_map(ModelSlot::Gpt, &[(ModelSlot::Claude, "llama3.1")]).unwrap_err();
        assert!(matches!(err, RelayError::Config(_)));
    }

    #[test]
    fn test_entries_follow_slot_order() {
        let map = make_map(
            ModelSlot::Claude,
            &[(ModelSlot::Gemini, "g"), (ModelSlot::Claude, "c")],
        )
        .unwrap();
        let entries: Vec<_> = map.entries().collect();
        assert_eq!(entries, vec![(ModelSlot::Claude, "c"), (ModelSlot::Gemini, "g")]);
        assert_eq!(map.len(), 2);
    }
}
