//! Core types for the dialog switch
//!
//! This crate provides the group-selection and hot-reload machinery:
//! - Request and tracker types read from the dialogue manager
//! - Response catalogs, channel filtering and placeholder filling
//! - `ResourceRegistry`: named resources kept fresh from disk
//! - `GroupSelector`: per-request group choice with a recency-weighted fallback
//! - Per-group NLU dispatch
//! - Error types

pub mod catalog;
pub mod error;
pub mod filter;
pub mod nlg;
pub mod nlu;
pub mod registry;
pub mod selector;
pub mod template;
pub mod tracker;

pub use catalog::{CatalogLoader, ResponseCatalog, ResponseVariant};
pub use error::{Error, Result};
pub use filter::{filter_responses, RESTART_KEY};
pub use nlg::{CatalogRegistry, GeneratedResponse, ResponseGenerator};
pub use registry::{
    RefreshReport, ResourceEntry, ResourceLoader, ResourceRegistry, SourceSpec, POOLED_GROUP,
};
pub use selector::{
    history_fallback, rank_guesses, ExtractionConfig, ExtractionMethod, GroupSelector, Selection,
    SelectionSource,
};
pub use tracker::{NlgRequest, Tracker, TrackerEvent, DEFAULT_CHANNEL};

// NLU re-exports
pub use nlu::{
    Choice, ChoiceSource, ExampleOverlapModel, GroupChooser, IntentClassifier, IntentPrediction,
    KeywordChooser, ModelLoader, ModelRegistry, NluRunner, Parse,
};
