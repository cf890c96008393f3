//! Keyword-based group chooser

use std::collections::{BTreeMap, HashSet};

use unicode_segmentation::UnicodeSegmentation;

use super::GroupChooser;
use crate::{Error, Result};

/// Picks the label whose keywords appear most often in the message.
///
/// A multi-word keyword counts when all of its words are present. With no
/// keyword hit the default label is returned with confidence 0.
#[derive(Debug, Clone)]
pub struct KeywordChooser {
    /// Label → lower-cased keywords, in label order
    labels: Vec<(String, Vec<String>)>,
    default_label: String,
}

impl KeywordChooser {
    pub fn new(labels: BTreeMap<String, Vec<String>>, default_label: impl Into<String>) -> Result<Self> {
        let default_label = default_label.into();
        if default_label.is_empty() {
            return Err(Error::Configuration(
                "chooser default label must not be empty".to_string(),
            ));
        }

        let labels = labels
            .into_iter()
            .map(|(label, keywords)| {
                let keywords = keywords
                    .iter()
                    .map(|k| k.trim().to_lowercase())
                    .filter(|k| !k.is_empty())
                    .collect();
                (label, keywords)
            })
            .collect();

        Ok(Self {
            labels,
            default_label,
        })
    }
}

impl GroupChooser for KeywordChooser {
    fn choose(&self, text: &str) -> (String, f64) {
        let text_lower = text.to_lowercase();
        let words: HashSet<&str> = text_lower.unicode_words().collect();

        let mut total = 0usize;
        let mut best: Option<(&str, usize)> = None;
        for (label, keywords) in &self.labels {
            let hits = keywords
                .iter()
                .filter(|keyword| keyword.unicode_words().all(|w| words.contains(w)))
                .count();
            total += hits;
            if hits > 0 && best.map_or(true, |(_, top)| hits > top) {
                best = Some((label, hits));
            }
        }

        match best {
            Some((label, hits)) => (label.to_string(), hits as f64 / total as f64),
            None => (self.default_label.clone(), 0.0),
        }
    }
}
