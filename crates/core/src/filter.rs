//! Channel-aware response filtering

use crate::catalog::{ResponseCatalog, ResponseVariant};
use crate::tracker::DEFAULT_CHANNEL;

/// Response key that resets the conversation; answered with empty text
pub const RESTART_KEY: &str = "utter_restart";

/// Variants of `key` eligible for `channel`.
///
/// Variants targeting the requested channel are preferred; when there are
/// none, the collector-channel variants are used instead. An unknown key
/// yields an empty list and the caller falls back to its default response.
pub fn filter_responses(catalog: &ResponseCatalog, key: &str, channel: &str) -> Vec<ResponseVariant> {
    if key == RESTART_KEY {
        tracing::debug!("Restart session");
        return vec![ResponseVariant::text("")];
    }

    let Some(variants) = catalog.get(key) else {
        tracing::warn!(response = key, channel, "Could not find response");
        return Vec::new();
    };

    for wanted in [channel, DEFAULT_CHANNEL] {
        let matching: Vec<ResponseVariant> = variants
            .iter()
            .filter(|variant| variant.channel() == wanted)
            .cloned()
            .collect();
        if !matching.is_empty() {
            return matching;
        }
    }

    tracing::debug!(response = key, channel, "No variant for channel");
    Vec::new()
}
