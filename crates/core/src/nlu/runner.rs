//! Per-group NLU dispatch

use std::collections::BTreeSet;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use regex::Regex;
use serde_json::Value;

use super::{GroupChooser, IntentClassifier, ModelLoader, Parse};
use crate::registry::{RefreshReport, ResourceLoader, ResourceRegistry};
use crate::tracker::EntityValue;
use crate::{Error, Result};

/// Registry of intent models keyed by group
pub type ModelRegistry = ResourceRegistry<ModelLoader>;

/// Intent labels known to the loaded models and the bypass pattern built from them
#[derive(Debug, Default)]
struct LabelIndex {
    labels: BTreeSet<String>,
    bypass: Option<Regex>,
}

/// How the group of a message was chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChoiceSource {
    /// The chooser returned a loaded group
    Chooser,
    /// The message named an intent directly
    Bypass,
    /// The chooser returned a group with no loaded model
    Fallback,
}

/// Chosen group for one message
#[derive(Debug, Clone, PartialEq)]
pub struct Choice {
    pub group: String,
    pub confidence: f64,
    pub source: ChoiceSource,
}

impl Choice {
    /// Whether the default group was imposed rather than picked by the chooser
    pub fn is_default(&self) -> bool {
        self.source != ChoiceSource::Chooser
    }
}

/// Routes each message to the model of the chosen group
pub struct NluRunner<L: ResourceLoader = ModelLoader>
where
    L::Resource: IntentClassifier,
{
    registry: Arc<ResourceRegistry<L>>,
    chooser: Box<dyn GroupChooser>,
    entity_name: String,
    default_group: String,
    index: RwLock<LabelIndex>,
    refresh_lock: Mutex<()>,
}

impl<L: ResourceLoader> NluRunner<L>
where
    L::Resource: IntentClassifier,
{
    pub fn new(
        registry: Arc<ResourceRegistry<L>>,
        chooser: Box<dyn GroupChooser>,
        entity_name: impl Into<String>,
        default_group: impl Into<String>,
    ) -> Result<Self> {
        let default_group = default_group.into();
        if !registry.source_names().contains(&default_group) {
            return Err(Error::Configuration(format!(
                "default model group `{}` is not one of {:?}",
                default_group,
                registry.source_names()
            )));
        }

        let runner = Self {
            registry,
            chooser,
            entity_name: entity_name.into(),
            default_group,
            index: RwLock::new(LabelIndex::default()),
            refresh_lock: Mutex::new(()),
        };
        runner.rebuild_labels();
        Ok(runner)
    }

    pub fn registry(&self) -> &Arc<ResourceRegistry<L>> {
        &self.registry
    }

    pub fn default_group(&self) -> &str {
        &self.default_group
    }

    /// Union of the intent labels of every loaded model
    pub fn labels(&self) -> BTreeSet<String> {
        self.index.read().labels.clone()
    }

    /// Refresh the models; the label index is rebuilt when any model changed
    pub fn refresh(&self) -> RefreshReport {
        // Held across the reload and the rebuild so overlapping cycles cannot
        // publish an index built from an older snapshot
        let _guard = self.refresh_lock.lock();
        let report = self.registry.refresh_report();
        if report.any_changed() {
            self.rebuild_labels();
        }
        report
    }

    fn rebuild_labels(&self) {
        let labels: BTreeSet<String> = self
            .registry
            .loaded()
            .iter()
            .flat_map(|(_, model)| model.labels())
            .collect();

        let bypass = if labels.is_empty() {
            None
        } else {
            let alternatives: Vec<String> = labels.iter().map(|l| regex::escape(l)).collect();
            match Regex::new(&format!("^/(?:{})", alternatives.join("|"))) {
                Ok(regex) => Some(regex),
                Err(e) => {
                    tracing::error!(error = %e, "Failed to build the chooser bypass pattern");
                    None
                },
            }
        };

        tracing::debug!(labels = labels.len(), "Rebuilt NLU label index");
        *self.index.write() = LabelIndex { labels, bypass };
    }

    /// Whether the message names an intent directly (`/greet`) and skips the chooser
    pub fn bypasses_chooser(&self, text: &str) -> bool {
        self.index
            .read()
            .bypass
            .as_ref()
            .map_or(false, |regex| regex.is_match(text.trim()))
    }

    /// Group and confidence for a message
    pub fn choose(&self, text: &str) -> Choice {
        if self.bypasses_chooser(text) {
            return Choice {
                group: self.default_group.clone(),
                confidence: 1.0,
                source: ChoiceSource::Bypass,
            };
        }

        let (label, confidence) = self.chooser.choose(text);
        if self.registry.contains(&label) {
            Choice {
                group: label,
                confidence,
                source: ChoiceSource::Chooser,
            }
        } else {
            tracing::warn!(
                label = %label,
                default = %self.default_group,
                "Chooser returned an unknown group, using the default"
            );
            Choice {
                group: self.default_group.clone(),
                confidence,
                source: ChoiceSource::Fallback,
            }
        }
    }

    /// Parse a message with the chosen group's model
    pub fn parse(&self, text: &str) -> Result<Parse> {
        self.parse_with_choice(text).map(|(parse, _)| parse)
    }

    /// Parse a message, also returning how its group was chosen
    pub fn parse_with_choice(&self, text: &str) -> Result<(Parse, Choice)> {
        let choice = self.choose(text);
        let model = self.registry.get(&choice.group)?;

        let mut parse = model.predict(text);
        parse.entities.push(EntityValue {
            entity: self.entity_name.clone(),
            value: Value::String(choice.group.clone()),
            start: Some(0),
            end: Some(0),
            confidence: Some(choice.confidence),
        });

        Ok((parse, choice))
    }
}
