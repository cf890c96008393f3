//! Group selection
//!
//! Decides, per request, which configured group (language, persona, ...)
//! serves the turn. Guesses are extracted most recent first over a short
//! window; the freshest allowed guess wins outright, otherwise the window is
//! scored with a recency weight and the configured default is the last resort.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::registry::POOLED_GROUP;
use crate::tracker::{NlgRequest, UserTurn};
use crate::{Error, Result};

/// Where a group guess comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMethod {
    /// A named tracker slot, no history
    Slot,
    /// A named entity in the most recent user turns
    Entity,
    /// Last segment of the pending response key and the most recent actions
    Suffix,
    /// Last segment of the intent names of the most recent user turns
    LastIntentSuffix,
    /// Always the merged view of every group
    Pooled,
}

impl ExtractionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractionMethod::Slot => "slot",
            ExtractionMethod::Entity => "entity",
            ExtractionMethod::Suffix => "suffix",
            ExtractionMethod::LastIntentSuffix => "last_intent_suffix",
            ExtractionMethod::Pooled => "pooled",
        }
    }

    pub fn requires_separator(&self) -> bool {
        matches!(
            self,
            ExtractionMethod::Suffix | ExtractionMethod::LastIntentSuffix
        )
    }

    pub fn requires_name(&self) -> bool {
        matches!(self, ExtractionMethod::Slot | ExtractionMethod::Entity)
    }

    pub fn uses_history(&self) -> bool {
        matches!(
            self,
            ExtractionMethod::Entity | ExtractionMethod::Suffix | ExtractionMethod::LastIntentSuffix
        )
    }

    pub fn pooling(&self) -> bool {
        matches!(self, ExtractionMethod::Pooled)
    }
}

impl std::fmt::Display for ExtractionMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Selection parameters, fixed at startup
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionConfig {
    pub method: ExtractionMethod,
    /// Number of guesses examined by history methods
    pub history_depth: usize,
    pub separator: Option<String>,
    /// Slot or entity name
    pub target_name: Option<String>,
    pub allowed_group_names: Vec<String>,
    pub default_group_name: String,
}

/// How a group was arrived at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionSource {
    Pooled,
    /// The most recent guess was allowed
    Latest,
    /// Won the recency-weighted vote
    History,
    Default,
}

/// Outcome of `GroupSelector::select`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub group: String,
    pub source: SelectionSource,
}

impl Selection {
    pub fn is_default(&self) -> bool {
        self.source == SelectionSource::Default
    }
}

/// Picks the group governing a request
#[derive(Debug, Clone)]
pub struct GroupSelector {
    config: ExtractionConfig,
    allowed: HashSet<String>,
}

impl GroupSelector {
    pub fn new(config: ExtractionConfig) -> Result<Self> {
        if config.history_depth == 0 {
            return Err(Error::Configuration(
                "history depth must be at least 1".to_string(),
            ));
        }

        if config.method.requires_separator()
            && config.separator.as_deref().map_or(true, str::is_empty)
        {
            return Err(Error::Configuration(format!(
                "method `{}` requires a separator",
                config.method
            )));
        }

        if config.method.requires_name()
            && config.target_name.as_deref().map_or(true, str::is_empty)
        {
            return Err(Error::Configuration(format!(
                "method `{}` requires a slot or entity name",
                config.method
            )));
        }

        if !config
            .allowed_group_names
            .iter()
            .any(|name| name == &config.default_group_name)
        {
            return Err(Error::Configuration(format!(
                "default group `{}` is not one of {:?}",
                config.default_group_name, config.allowed_group_names
            )));
        }

        let allowed = config.allowed_group_names.iter().cloned().collect();
        Ok(Self { config, allowed })
    }

    pub fn default_group(&self) -> &str {
        &self.config.default_group_name
    }

    /// Group name for this request
    pub fn select_group(&self, request: &NlgRequest) -> String {
        self.select(request).group
    }

    /// Group name for this request, with how it was chosen
    pub fn select(&self, request: &NlgRequest) -> Selection {
        if self.config.method.pooling() {
            return Selection {
                group: POOLED_GROUP.to_string(),
                source: SelectionSource::Pooled,
            };
        }

        let guesses = self.normalize(self.extract_guesses(request));
        let selection = rank_guesses(&guesses, &self.config.default_group_name);

        if selection.is_default() {
            tracing::warn!(
                method = %self.config.method,
                default = %selection.group,
                "Could not find a response group, using the default"
            );
        } else {
            tracing::debug!(group = %selection.group, source = ?selection.source, "Selected group");
        }

        selection
    }

    /// Raw guesses, most recent first. History methods always yield
    /// `history_depth` positions; missing guesses are `None`.
    pub fn extract_guesses(&self, request: &NlgRequest) -> Vec<Option<String>> {
        let tracker = &request.tracker;
        let depth = self.config.history_depth;
        let name = self.config.target_name.as_deref().unwrap_or_default();
        let separator = self.config.separator.as_deref().unwrap_or_default();

        let guesses: Vec<Option<String>> = match self.config.method {
            ExtractionMethod::Pooled => return vec![Some(POOLED_GROUP.to_string())],
            ExtractionMethod::Slot => return vec![tracker.slot(name)],
            ExtractionMethod::Entity => tracker
                .user_turns()
                .iter()
                .take(depth)
                .map(|turn| turn.entity(name))
                .collect(),
            ExtractionMethod::LastIntentSuffix => tracker
                .user_turns()
                .iter()
                .take(depth)
                .map(|turn: &UserTurn<'_>| turn.intent.and_then(|i| last_segment(i, separator)))
                .collect(),
            ExtractionMethod::Suffix => {
                let pending = request.response_key().ok();
                std::iter::once(pending)
                    .chain(tracker.action_names())
                    .take(depth)
                    .map(|action| action.and_then(|a| last_segment(a, separator)))
                    .collect()
            },
        };

        pad(guesses, depth)
    }

    /// Lower-case every guess and drop the ones that are not configured groups
    pub fn normalize(&self, guesses: Vec<Option<String>>) -> Vec<Option<String>> {
        guesses
            .into_iter()
            .map(|guess| {
                let guess = guess?.to_lowercase();
                if self.allowed.contains(&guess) {
                    Some(guess)
                } else {
                    tracing::debug!(group = %guess, "Illegal response group");
                    None
                }
            })
            .collect()
    }
}

fn last_segment(value: &str, separator: &str) -> Option<String> {
    value
        .rsplit(separator)
        .next()
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
}

fn pad(mut guesses: Vec<Option<String>>, depth: usize) -> Vec<Option<String>> {
    guesses.resize(depth, None);
    guesses
}

/// Choose among normalized guesses, most recent first.
///
/// Position 0 wins when present; otherwise the recency vote decides, and the
/// default is returned when every guess is `None`.
pub fn rank_guesses(guesses: &[Option<String>], default_group: &str) -> Selection {
    if let Some(Some(latest)) = guesses.first() {
        return Selection {
            group: latest.clone(),
            source: SelectionSource::Latest,
        };
    }

    match history_fallback(guesses) {
        Some(group) => Selection {
            group,
            source: SelectionSource::History,
        },
        None => Selection {
            group: default_group.to_string(),
            source: SelectionSource::Default,
        },
    }
}

/// Recency-weighted vote over a window of guesses.
///
/// A guess at position `p` of a window of `n` contributes `n - p`, which is
/// `1 - p/n` scaled by `n`. Equal scores go to the value seen first.
pub fn history_fallback(guesses: &[Option<String>]) -> Option<String> {
    let n = guesses.len();
    let mut scores: Vec<(&str, usize)> = Vec::new();

    for (position, guess) in guesses.iter().enumerate() {
        let Some(guess) = guess.as_deref() else {
            continue;
        };
        let weight = n - position;
        match scores.iter_mut().find(|(value, _)| *value == guess) {
            Some((_, score)) => *score += weight,
            None => scores.push((guess, weight)),
        }
    }

    let mut best: Option<(&str, usize)> = None;
    for (value, score) in scores {
        if best.map_or(true, |(_, top)| score > top) {
            best = Some((value, score));
        }
    }
    best.map(|(value, _)| value.to_string())
}
