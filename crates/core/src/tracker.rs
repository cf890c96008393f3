//! Dialogue-turn request types
//!
//! Mirrors the subset of the dialogue-manager payload that group selection and
//! response filtering read. Unknown fields are ignored so that newer payloads
//! keep deserializing.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{Error, Result};

/// Channel assumed when a request or a response variant names none
pub const DEFAULT_CHANNEL: &str = "collector";

/// Intent as reported by the NLU layer
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct IntentInfo {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub confidence: Option<f64>,
}

/// A single extracted entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityValue {
    pub entity: String,
    #[serde(default)]
    pub value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

/// Parse result attached to a user message
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ParseData {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub intent: Option<IntentInfo>,
    #[serde(default)]
    pub entities: Vec<EntityValue>,
}

/// One tracker event. Only user and action events matter here.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TrackerEvent {
    User {
        #[serde(default)]
        text: Option<String>,
        /// Some producers put the intent next to `parse_data` instead of inside it
        #[serde(default)]
        intent: Option<IntentInfo>,
        #[serde(default)]
        parse_data: Option<ParseData>,
    },
    Action {
        #[serde(default)]
        name: Option<String>,
    },
    #[serde(other)]
    Other,
}

/// Borrowed view over a user turn
#[derive(Debug, Clone, Copy)]
pub struct UserTurn<'a> {
    pub intent: Option<&'a str>,
    pub entities: &'a [EntityValue],
}

impl<'a> UserTurn<'a> {
    fn from_parse_data(data: &'a ParseData) -> Self {
        Self {
            intent: data.intent.as_ref().and_then(|i| i.name.as_deref()),
            entities: &data.entities,
        }
    }

    /// First value of the named entity in this turn
    pub fn entity(&self, name: &str) -> Option<String> {
        self.entities
            .iter()
            .find(|e| e.entity == name)
            .and_then(|e| value_as_group(&e.value))
    }
}

/// Conversation state sent along with every request
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Tracker {
    #[serde(default)]
    pub sender_id: Option<String>,
    #[serde(default)]
    pub slots: HashMap<String, Value>,
    #[serde(default)]
    pub latest_message: Option<ParseData>,
    /// Oldest first
    #[serde(default)]
    pub events: Vec<TrackerEvent>,
}

impl Tracker {
    /// Slot value rendered as a group guess
    pub fn slot(&self, name: &str) -> Option<String> {
        self.slots.get(name).and_then(value_as_group)
    }

    /// User turns, most recent first.
    ///
    /// Falls back to `latest_message` when the event log carries no user turn.
    pub fn user_turns(&self) -> Vec<UserTurn<'_>> {
        let turns: Vec<UserTurn<'_>> = self
            .events
            .iter()
            .rev()
            .filter_map(|event| match event {
                TrackerEvent::User {
                    intent, parse_data, ..
                } => {
                    let entities = parse_data
                        .as_ref()
                        .map(|p| p.entities.as_slice())
                        .unwrap_or(&[]);
                    let intent = parse_data
                        .as_ref()
                        .and_then(|p| p.intent.as_ref())
                        .or(intent.as_ref())
                        .and_then(|i| i.name.as_deref());
                    Some(UserTurn { intent, entities })
                },
                _ => None,
            })
            .collect();

        if turns.is_empty() {
            self.latest_message
                .iter()
                .map(UserTurn::from_parse_data)
                .collect()
        } else {
            turns
        }
    }

    /// Names of executed actions, most recent first
    pub fn action_names(&self) -> impl Iterator<Item = Option<&str>> + '_ {
        self.events.iter().rev().filter_map(|event| match event {
            TrackerEvent::Action { name } => Some(name.as_deref()),
            _ => None,
        })
    }
}

/// Requesting channel
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChannelInfo {
    #[serde(default)]
    pub name: Option<String>,
}

/// Incoming response-generation request
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NlgRequest {
    #[serde(default)]
    pub tracker: Tracker,
    #[serde(default)]
    pub response: Option<String>,
    /// Older producers send the key under `template`
    #[serde(default)]
    pub template: Option<String>,
    #[serde(default)]
    pub channel: Option<ChannelInfo>,
    #[serde(default)]
    pub arguments: Option<Map<String, Value>>,
}

impl NlgRequest {
    /// Response key, preferring `response` over `template`
    pub fn response_key(&self) -> Result<&str> {
        self.response
            .as_deref()
            .or(self.template.as_deref())
            .ok_or_else(|| Error::MalformedRequest("missing `response` or `template`".to_string()))
    }

    /// Requesting channel name, defaulting to the collector channel
    pub fn channel_name(&self) -> &str {
        self.channel
            .as_ref()
            .and_then(|c| c.name.as_deref())
            .unwrap_or(DEFAULT_CHANNEL)
    }

    pub fn arguments(&self) -> Result<&Map<String, Value>> {
        self.arguments
            .as_ref()
            .ok_or_else(|| Error::MalformedRequest("missing `arguments`".to_string()))
    }
}

/// Render a JSON value as a group guess. Empty strings and non-scalars yield `None`.
pub fn value_as_group(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
