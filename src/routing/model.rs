use std::collections::HashSet;

use crate::config::ModelsConfig;

/// Maps any requested model onto the configured allow-set.
#[derive(Debug, Clone)]
pub struct ModelNormalizer {
    allowed: HashSet<String>,
    fallback: String,
}

impl ModelNormalizer {
    /// Build a normalizer. The fallback is always a member of the allow-set,
    /// even if the configuration forgot to list it.
    #[must_use]
    pub fn new(config: &ModelsConfig) -> Self {
        let fallback = config.fallback.trim().to_string();
        let mut allowed: HashSet<String> = config
            .allowed
            .iter()
            .map(|model| model.trim().to_string())
            .filter(|model| !model.is_empty())
            .collect();
        allowed.insert(fallback.clone());
        Self { allowed, fallback }
    }

    /// Total: returns the trimmed request when allowed, the fallback otherwise.
    #[must_use]
    pub fn normalize<'a>(&'a self, requested: Option<&str>) -> &'a str {
        requested
            .map(str::trim)
            .and_then(|model| self.allowed.get(model))
            .map_or(self.fallback.as_str(), String::as_str)
    }

    #[must_use]
    pub fn is_allowed(&self, model: &str) -> bool {
        self.allowed.contains(model)
    }

    #[must_use]
    pub fn fallback(&self) -> &str {
        &self.fallback
    }

    /// Allowed models in sorted order.
    #[must_use]
    pub fn allowed_sorted(&self) -> Vec<&str> {
        let mut models: Vec<&str> = self.allowed.iter().map(String::as_str).collect();
        models.sort_unstable();
        models
    }
}
