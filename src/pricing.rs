use std::collections::HashMap;
use std::path::{Path, PathBuf};

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::types::TokenUsage;

const BUNDLED_PRICING: &str = include_str!("../data/pricing.json");

static BUNDLED: OnceCell<PricingTable> = OnceCell::new();

#[derive(Debug, Error)]
pub enum PricingError {
    #[error("reading pricing file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing pricing data: {0}")]
    Parse(#[from] serde_json::Error),
}

/// USD per million tokens. Missing rates count as zero.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, Default, PartialEq)]
pub struct Pricing {
    #[serde(default)]
    pub input_per_million: f64,
    #[serde(default)]
    pub output_per_million: f64,
    #[serde(default)]
    pub cache_create_per_million: f64,
    #[serde(default)]
    pub cache_read_per_million: f64,
}

impl Pricing {
    pub fn cost(&self, usage: &TokenUsage) -> f64 {
        (usage.input_tokens as f64 * self.input_per_million
            + usage.output_tokens as f64 * self.output_per_million
            + usage.cache_creation_tokens as f64 * self.cache_create_per_million
            + usage.cache_read_tokens as f64 * self.cache_read_per_million)
            / 1_000_000_f64
    }
}

#[derive(Debug, Clone, Default)]
pub struct PricingTable {
    models: HashMap<String, Pricing>,
}

impl PricingTable {
    /// The static table shipped with the binary.
    pub fn bundled() -> &'static PricingTable {
        BUNDLED.get_or_init(|| {
            PricingTable::from_json(BUNDLED_PRICING).unwrap_or_else(|err| {
                warn!(error = %err, "bundled pricing is unreadable; every token cost will be zero");
                PricingTable::default()
            })
        })
    }

    pub fn from_json(raw: &str) -> Result<Self, PricingError> {
        let models: HashMap<String, Pricing> = serde_json::from_str(raw)?;
        Ok(PricingTable { models })
    }

    pub fn from_file(path: &Path) -> Result<Self, PricingError> {
        let raw = std::fs::read_to_string(path).map_err(|source| PricingError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&raw)
    }

    /// Rates from `overrides` replace same-named models in `self`.
    pub fn with_overrides(mut self, overrides: PricingTable) -> Self {
        self.models.extend(overrides.models);
        self
    }

    pub fn insert(&mut self, model: impl Into<String>, pricing: Pricing) {
        self.models.insert(model.into(), pricing);
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Exact model match first, then a match with the provider prefix removed.
    pub fn find(&self, model: &str) -> Option<&Pricing> {
        self.models
            .get(model)
            .or_else(|| self.models.get(&normalize_model_for_pricing(model)))
    }
}

fn normalize_model_for_pricing(model: &str) -> String {
    let mut m = model.to_lowercase();
    for prefix in ["anthropic/", "openrouter/", "bedrock/"] {
        if let Some(rest) = m.strip_prefix(prefix) {
            m = rest.to_string();
        }
    }
    m
}
