//! Language understanding with per-group models
//!
//! One classifier is loaded per group. A chooser decides which group a
//! message belongs to, the chosen model parses it, and the choice is reported
//! back as an extra entity so the dialogue manager can route on it.
//!
//! ```text
//! message ──► bypass? ──yes──► default group, confidence 1.0
//!                │no
//!                ▼
//!            GroupChooser ──► (label, confidence)
//!                │
//!                ▼
//!      IntentClassifier[label].predict ──► Parse + group entity
//! ```

mod chooser;
mod model;
mod runner;

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::tracker::EntityValue;

pub use chooser::KeywordChooser;
pub use model::{ExampleOverlapModel, ModelLoader};
pub use runner::{Choice, ChoiceSource, ModelRegistry, NluRunner};

/// Intent with its score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentPrediction {
    pub name: String,
    pub confidence: f64,
}

/// Parse result returned to the dialogue manager
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parse {
    pub text: String,
    pub intent: IntentPrediction,
    #[serde(default)]
    pub entities: Vec<EntityValue>,
    #[serde(default)]
    pub intent_ranking: Vec<IntentPrediction>,
}

/// Intent classification interface
///
/// Implementations:
/// - `ExampleOverlapModel` - scores intents against example utterances
///
/// # Example
///
/// ```ignore
/// let model = ExampleOverlapModel::from_yaml_str(content)?;
/// let parse = model.predict("hello there");
/// assert_eq!(parse.intent.name, "greet");
/// ```
pub trait IntentClassifier: Send + Sync + 'static {
    /// Classify one message
    fn predict(&self, text: &str) -> Parse;

    /// Every intent this model can produce
    fn labels(&self) -> BTreeSet<String>;
}

/// Decides which group's model handles a message
///
/// Returns `(label, confidence)`; the label should name a configured group.
pub trait GroupChooser: Send + Sync + 'static {
    fn choose(&self, text: &str) -> (String, f64);
}

impl<F> GroupChooser for F
where
    F: Fn(&str) -> (String, f64) + Send + Sync + 'static,
{
    fn choose(&self, text: &str) -> (String, f64) {
        self(text)
    }
}
