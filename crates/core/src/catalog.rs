//! Response catalogs
//!
//! A catalog maps response keys to their variants. Catalog files are YAML
//! documents with a top-level `responses` key:
//!
//! ```yaml
//! responses:
//!   utter_greet:
//!     - text: "Hello {name}!"
//!     - text: "Hi there"
//!       channel: facebook
//! ```

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::registry::ResourceLoader;
use crate::tracker::DEFAULT_CHANNEL;
use crate::{Error, Result};

/// Top-level key expected in every catalog file
pub const RESPONSES_KEY: &str = "responses";

/// One response variant. Fields other than `text` and `channel` are passed
/// through untouched (buttons, images, custom payloads).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseVariant {
    #[serde(default)]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ResponseVariant {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    /// Channel this variant targets, unset meaning the collector channel
    pub fn channel(&self) -> &str {
        self.channel.as_deref().unwrap_or(DEFAULT_CHANNEL)
    }
}

/// Response key → variants
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseCatalog {
    responses: HashMap<String, Vec<ResponseVariant>>,
}

impl ResponseCatalog {
    pub fn new(responses: HashMap<String, Vec<ResponseVariant>>) -> Self {
        Self { responses }
    }

    /// Parse a catalog document, requiring the `responses` key
    pub fn from_yaml_str(content: &str) -> std::result::Result<Self, String> {
        let mut doc: HashMap<String, serde_yaml::Value> =
            serde_yaml::from_str(content).map_err(|e| e.to_string())?;
        let responses = doc
            .remove(RESPONSES_KEY)
            .ok_or_else(|| format!("missing the `{}` key", RESPONSES_KEY))?;
        let responses = serde_yaml::from_value(responses).map_err(|e| e.to_string())?;
        Ok(Self { responses })
    }

    pub fn get(&self, key: &str) -> Option<&[ResponseVariant]> {
        self.responses.get(key).map(Vec::as_slice)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.responses.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.responses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.responses.is_empty()
    }

    /// Merge catalogs in order; a later catalog replaces an earlier one's key
    pub fn pooled<'a>(parts: impl IntoIterator<Item = &'a ResponseCatalog>) -> Self {
        let mut responses = HashMap::new();
        for part in parts {
            for (key, variants) in &part.responses {
                responses.insert(key.clone(), variants.clone());
            }
        }
        Self { responses }
    }
}

/// Loads response catalogs from YAML files
#[derive(Debug, Clone, Copy, Default)]
pub struct CatalogLoader;

impl ResourceLoader for CatalogLoader {
    type Resource = ResponseCatalog;

    fn kind(&self) -> &'static str {
        "responses"
    }

    fn load(&self, name: &str, path: &Path) -> Result<ResponseCatalog> {
        let source = path.display().to_string();
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::source_unreadable(name, &source, e))?;
        ResponseCatalog::from_yaml_str(&content)
            .map_err(|message| Error::source_unreadable(name, &source, message))
    }

    fn supports_pooling(&self) -> bool {
        true
    }

    fn pool(&self, parts: &[&ResponseCatalog]) -> Option<ResponseCatalog> {
        Some(ResponseCatalog::pooled(parts.iter().copied()))
    }
}
