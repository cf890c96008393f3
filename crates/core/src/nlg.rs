//! Response generation
//!
//! Ties the pieces together for one request: select a group, fetch that
//! group's catalog, narrow to the requesting channel, pick one variant at
//! random and fill its placeholders.

use std::sync::Arc;

use rand::seq::SliceRandom;
use rand::Rng;

use crate::catalog::{CatalogLoader, ResponseCatalog, ResponseVariant};
use crate::filter::filter_responses;
use crate::registry::ResourceRegistry;
use crate::selector::{GroupSelector, Selection};
use crate::template;
use crate::tracker::NlgRequest;
use crate::Result;

/// Registry of response catalogs keyed by group
pub type CatalogRegistry = ResourceRegistry<CatalogLoader>;

/// A generated response and the group that produced it
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedResponse {
    pub response: ResponseVariant,
    pub selection: Selection,
    /// Whether the configured default response was used
    pub used_default_response: bool,
}

/// Serves response-generation requests
pub struct ResponseGenerator {
    registry: Arc<CatalogRegistry>,
    selector: GroupSelector,
    default_response: ResponseVariant,
}

impl ResponseGenerator {
    pub fn new(
        registry: Arc<CatalogRegistry>,
        selector: GroupSelector,
        default_response: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            selector,
            default_response: ResponseVariant::text(default_response),
        }
    }

    pub fn registry(&self) -> &Arc<CatalogRegistry> {
        &self.registry
    }

    pub fn selector(&self) -> &GroupSelector {
        &self.selector
    }

    pub fn default_response(&self) -> &ResponseVariant {
        &self.default_response
    }

    /// Generate a response for the request
    pub fn generate(&self, request: &NlgRequest) -> Result<GeneratedResponse> {
        self.generate_with_rng(request, &mut rand::thread_rng())
    }

    /// Generate a response, drawing the variant from `rng`
    pub fn generate_with_rng<R: Rng + ?Sized>(
        &self,
        request: &NlgRequest,
        rng: &mut R,
    ) -> Result<GeneratedResponse> {
        let key = request.response_key()?;
        let arguments = request.arguments()?;
        let channel = request.channel_name();

        let selection = self.selector.select(request);
        let catalog = self.catalog_for(&selection.group);
        let variants = filter_responses(&catalog, key, channel);

        let Some(variant) = variants.choose(rng) else {
            tracing::debug!(response = key, group = %selection.group, "Using default response");
            return Ok(GeneratedResponse {
                response: self.default_response.clone(),
                selection,
                used_default_response: true,
            });
        };

        let mut response = variant.clone();
        response.text = template::fill(&response.text, arguments);

        Ok(GeneratedResponse {
            response,
            selection,
            used_default_response: false,
        })
    }

    fn catalog_for(&self, group: &str) -> Arc<ResponseCatalog> {
        if let Ok(catalog) = self.registry.get(group) {
            return catalog;
        }

        let default_group = self.selector.default_group();
        tracing::warn!(group, default = default_group, "Group not loaded, using the default");
        self.registry
            .get(default_group)
            .unwrap_or_else(|_| Arc::new(ResponseCatalog::default()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{SourceSpec, POOLED_GROUP};
    use crate::selector::{ExtractionConfig, ExtractionMethod, SelectionSource};
    use crate::Error;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use serde_json::json;
    use tempfile::TempDir;

    const ABC: &str = r#"
responses:
  utter_greet:
    - text: "abc hello {name}"
  utter_bye:
    - text: "abc bye"
    - text: "abc ciao"
"#;

    const XYZ: &str = r#"
responses:
  utter_greet:
    - text: "xyz hello {name}"
  utter_only_xyz:
    - text: "xyz only"
"#;

    fn generator(dir: &TempDir, method: ExtractionMethod) -> ResponseGenerator {
        let abc = dir.path().join("abc.yml");
        let xyz = dir.path().join("xyz.yml");
        std::fs::write(&abc, ABC).unwrap();
        std::fs::write(&xyz, XYZ).unwrap();

        let registry = ResourceRegistry::new(
            CatalogLoader,
            vec![SourceSpec::new("abc", abc), SourceSpec::new("xyz", xyz)],
            method.pooling(),
        )
        .unwrap();
        assert!(registry.refresh());

        let selector = GroupSelector::new(ExtractionConfig {
            method,
            history_depth: 1,
            separator: None,
            target_name: Some("language".to_string()),
            allowed_group_names: vec!["abc".to_string(), "xyz".to_string()],
            default_group_name: "xyz".to_string(),
        })
        .unwrap();

        ResponseGenerator::new(Arc::new(registry), selector, "Sorry, I did not get that")
    }

    fn request(language: &str, key: &str) -> NlgRequest {
        serde_json::from_value(json!({
            "tracker": {"slots": {"language": language}},
            "response": key,
            "arguments": {"name": "Ada"}
        }))
        .unwrap()
    }

    #[test]
    fn test_generate_fills_selected_group() {
        let dir = TempDir::new().unwrap();
        let generator = generator(&dir, ExtractionMethod::Slot);

        let generated = generator.generate(&request("abc", "utter_greet")).unwrap();
        assert_eq!(generated.response.text, "abc hello Ada");
        assert_eq!(generated.selection.group, "abc");
        assert!(!generated.used_default_response);
    }

    #[test]
    fn test_unknown_group_uses_default_group() {
        let dir = TempDir::new().unwrap();
        let generator = generator(&dir, ExtractionMethod::Slot);

        let generated = generator.generate(&request("fr", "utter_greet")).unwrap();
        assert_eq!(generated.response.text, "xyz hello Ada");
        assert_eq!(generated.selection.source, SelectionSource::Default);
    }

    #[test]
    fn test_missing_key_uses_default_response() {
        let dir = TempDir::new().unwrap();
        let generator = generator(&dir, ExtractionMethod::Slot);

        let generated = generator.generate(&request("abc", "utter_only_xyz")).unwrap();
        assert_eq!(generated.response.text, "Sorry, I did not get that");
        assert!(generated.used_default_response);
    }

    #[test]
    fn test_pooled_sees_every_group() {
        let dir = TempDir::new().unwrap();
        let generator = generator(&dir, ExtractionMethod::Pooled);

        let generated = generator.generate(&request("abc", "utter_only_xyz")).unwrap();
        assert_eq!(generated.response.text, "xyz only");
        assert_eq!(generated.selection.group, POOLED_GROUP);

        // later source wins on shared keys
        let generated = generator.generate(&request("abc", "utter_greet")).unwrap();
        assert_eq!(generated.response.text, "xyz hello Ada");
    }

    #[test]
    fn test_variant_choice_uses_rng() {
        let dir = TempDir::new().unwrap();
        let generator = generator(&dir, ExtractionMethod::Slot);
        let mut rng = StdRng::seed_from_u64(7);

        let mut seen = std::collections::HashSet::new();
        for _ in 0..64 {
            let generated = generator
                .generate_with_rng(&request("abc", "utter_bye"), &mut rng)
                .unwrap();
            seen.insert(generated.response.text);
        }
        assert_eq!(seen.len(), 2);
    }

    #[test]
    fn test_restart_returns_empty_text() {
        let dir = TempDir::new().unwrap();
        let generator = generator(&dir, ExtractionMethod::Slot);

        let generated = generator.generate(&request("abc", "utter_restart")).unwrap();
        assert_eq!(generated.response, ResponseVariant::text(""));
    }

    #[test]
    fn test_malformed_requests() {
        let dir = TempDir::new().unwrap();
        let generator = generator(&dir, ExtractionMethod::Slot);

        let no_arguments: NlgRequest =
            serde_json::from_value(json!({"response": "utter_greet"})).unwrap();
        assert!(matches!(
            generator.generate(&no_arguments),
            Err(Error::MalformedRequest(_))
        ));

        let no_key: NlgRequest = serde_json::from_value(json!({"arguments": {}})).unwrap();
        assert!(matches!(generator.generate(&no_key), Err(Error::MalformedRequest(_))));
    }

    #[test]
    fn test_template_key_is_accepted() {
        let dir = TempDir::new().unwrap();
        let generator = generator(&dir, ExtractionMethod::Slot);

        let request: NlgRequest = serde_json::from_value(json!({
            "tracker": {"slots": {"language": "abc"}},
            "template": "utter_greet",
            "arguments": {"name": "Grace"}
        }))
        .unwrap();
        assert_eq!(generator.generate(&request).unwrap().response.text, "abc hello Grace");
    }
}
