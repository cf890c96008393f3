//! Example-overlap intent model
//!
//! Model files are YAML documents listing example utterances per intent:
//!
//! ```yaml
//! intents:
//!   greet:
//!     - hello
//!     - good morning
//!   goodbye:
//!     - bye
//! ```

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::Path;

use serde::Deserialize;
use unicode_segmentation::UnicodeSegmentation;

use super::{IntentClassifier, IntentPrediction, Parse};
use crate::registry::ResourceLoader;
use crate::{Error, Result};

/// Intent reported when no example matches at all
pub const UNKNOWN_INTENT: &str = "unknown";

const MAX_RANKING: usize = 10;

#[derive(Debug, Deserialize)]
struct ModelFile {
    intents: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone)]
struct IntentExamples {
    name: String,
    /// Lower-cased
    examples: Vec<String>,
}

/// Scores intents by how closely the message matches their examples
#[derive(Debug, Clone)]
pub struct ExampleOverlapModel {
    intents: Vec<IntentExamples>,
}

impl ExampleOverlapModel {
    pub fn new(intents: BTreeMap<String, Vec<String>>) -> Self {
        let intents = intents
            .into_iter()
            .map(|(name, examples)| IntentExamples {
                name,
                examples: examples.iter().map(|e| e.to_lowercase()).collect(),
            })
            .collect();
        Self { intents }
    }

    pub fn from_yaml_str(content: &str) -> std::result::Result<Self, String> {
        let file: ModelFile = serde_yaml::from_str(content).map_err(|e| e.to_string())?;
        if file.intents.is_empty() {
            return Err("model defines no intents".to_string());
        }
        Ok(Self::new(file.intents))
    }

    /// Match score of `text` (lower-cased) against one intent's examples
    ///
    /// Exact match scores 1.0, containment 0.9, and otherwise the share of
    /// example words present in the text, scaled by 0.8.
    fn score(text: &str, intent: &IntentExamples) -> f64 {
        let text_words: HashSet<&str> = text.unicode_words().collect();
        let mut score: f64 = 0.0;

        for example in &intent.examples {
            if text == example {
                return 1.0;
            }

            if text.contains(example.as_str()) {
                score = score.max(0.9);
            }

            let example_words: HashSet<&str> = example.unicode_words().collect();
            let overlap = example_words.intersection(&text_words).count();
            if overlap > 0 {
                let overlap_score = overlap as f64 / example_words.len().max(1) as f64;
                score = score.max(overlap_score * 0.8);
            }
        }

        score
    }
}

impl IntentClassifier for ExampleOverlapModel {
    fn predict(&self, text: &str) -> Parse {
        let text_lower = text.trim().to_lowercase();

        let mut ranking: Vec<IntentPrediction> = self
            .intents
            .iter()
            .map(|intent| IntentPrediction {
                name: intent.name.clone(),
                confidence: Self::score(&text_lower, intent),
            })
            .filter(|prediction| prediction.confidence > 0.0)
            .collect();

        // Stable sort keeps name order among equal scores
        ranking.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        ranking.truncate(MAX_RANKING);

        let intent = ranking.first().cloned().unwrap_or(IntentPrediction {
            name: UNKNOWN_INTENT.to_string(),
            confidence: 0.0,
        });

        Parse {
            text: text.to_string(),
            intent,
            entities: Vec::new(),
            intent_ranking: ranking,
        }
    }

    fn labels(&self) -> BTreeSet<String> {
        self.intents.iter().map(|i| i.name.clone()).collect()
    }
}

/// Loads example-overlap models from YAML files
#[derive(Debug, Clone, Copy, Default)]
pub struct ModelLoader;

impl ResourceLoader for ModelLoader {
    type Resource = ExampleOverlapModel;

    fn kind(&self) -> &'static str {
        "model"
    }

    fn load(&self, name: &str, path: &Path) -> Result<ExampleOverlapModel> {
        let source = path.display().to_string();
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::source_unreadable(name, &source, e))?;
        ExampleOverlapModel::from_yaml_str(&content)
            .map_err(|message| Error::source_unreadable(name, &source, message))
    }
}
