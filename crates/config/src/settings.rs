//! Main settings module

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};

use config::{Config, Environment, File};
use serde::{Deserialize, Deserializer, Serialize};

use dialog_switch_core::{ExtractionConfig, ExtractionMethod, SourceSpec, POOLED_GROUP};

use crate::ConfigError;

/// Environment variable listing the configuration files, comma-separated
pub const CONFIG_PATHS_VAR: &str = "DIALOG_SWITCH_CONFIG";

/// Prefix of environment overrides (`DIALOG_SWITCH__SERVER__PORT=9000`)
pub const ENV_PREFIX: &str = "DIALOG_SWITCH";

const DEFAULT_CONFIG_PATH: &str = "config/default.yaml";

/// Runtime environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeEnvironment {
    #[default]
    Development,
    Staging,
    Production,
}

impl RuntimeEnvironment {
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }
}

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub environment: RuntimeEnvironment,

    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Response generation role
    #[serde(default)]
    pub nlg: Option<NlgConfig>,

    /// Language understanding role
    #[serde(default)]
    pub nlu: Option<NluConfig>,
}

impl Settings {
    /// Validate settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.nlg.is_none() && self.nlu.is_none() {
            return Err(ConfigError::MissingField("nlg or nlu".to_string()));
        }

        self.validate_server()?;

        if let Some(nlg) = &self.nlg {
            nlg.validate()?;
        }
        if let Some(nlu) = &self.nlu {
            nlu.validate()?;
        }

        Ok(())
    }

    fn validate_server(&self) -> Result<(), ConfigError> {
        let server = &self.server;

        if server.port == 0 {
            return Err(ConfigError::InvalidValue {
                field: "server.port".to_string(),
                message: "Port cannot be 0".to_string(),
            });
        }

        if self.environment.is_production() && server.cors_enabled && server.cors_origins.is_empty()
        {
            tracing::warn!(
                "CORS is enabled in production but no origins are configured. \
                 This may block legitimate requests."
            );
        }

        Ok(())
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP server host
    #[serde(default = "default_host")]
    pub host: String,

    /// HTTP server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Enable CORS
    #[serde(default = "default_true")]
    pub cors_enabled: bool,

    /// CORS allowed origins
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_true() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_enabled: default_true(),
            // Empty by default; permissive only outside production
            cors_origins: Vec::new(),
        }
    }
}

/// Observability configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default)]
    pub log_json: bool,

    /// Expose Prometheus metrics at `/metrics`
    #[serde(default = "default_true")]
    pub metrics_enabled: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_json: false,
            metrics_enabled: true,
        }
    }
}

/// One configured source.
///
/// Accepts `{name, path}` maps with case-insensitive keys (`filename` is an
/// alias of `path`) or `[name, path]` pairs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceEntry {
    pub name: String,
    pub path: PathBuf,
}

impl SourceEntry {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawSourceEntry {
    Pair(String, String),
    Map(HashMap<String, String>),
}

impl<'de> Deserialize<'de> for SourceEntry {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        use serde::de::Error;

        match RawSourceEntry::deserialize(deserializer)? {
            RawSourceEntry::Pair(name, path) => Ok(SourceEntry::new(name, path)),
            RawSourceEntry::Map(map) => {
                let mut map: HashMap<String, String> = map
                    .into_iter()
                    .map(|(key, value)| (key.to_lowercase(), value))
                    .collect();
                let name = map
                    .remove("name")
                    .ok_or_else(|| D::Error::custom("source entry is missing `name`"))?;
                let path = map
                    .remove("path")
                    .or_else(|| map.remove("filename"))
                    .ok_or_else(|| D::Error::custom("source entry is missing `path`"))?;
                Ok(SourceEntry::new(name, path))
            },
        }
    }
}

fn default_refresh_interval() -> u64 {
    10
}

/// How the NLG group is extracted from a request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionSettings {
    pub method: ExtractionMethod,

    /// Slot or entity name
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub separator: Option<String>,

    /// Number of past turns examined
    #[serde(default = "default_history")]
    pub history: usize,
}

fn default_history() -> usize {
    1
}

/// NLG fallbacks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NlgDefaults {
    /// Required when more than one source is configured
    #[serde(default)]
    pub group: Option<String>,

    /// Text sent when no variant matches
    #[serde(default = "default_response")]
    pub response: String,
}

fn default_response() -> String {
    "Sorry, I did not understand that.".to_string()
}

impl Default for NlgDefaults {
    fn default() -> Self {
        Self {
            group: None,
            response: default_response(),
        }
    }
}

/// Response generation role
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NlgConfig {
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_secs: u64,

    pub extraction: ExtractionSettings,

    pub sources: Vec<SourceEntry>,

    #[serde(default)]
    pub defaults: NlgDefaults,
}

impl NlgConfig {
    /// Default group: the only source, or the configured one
    pub fn default_group(&self) -> Option<&str> {
        default_group(&self.sources, self.defaults.group.as_deref())
    }

    pub fn source_specs(&self) -> Vec<SourceSpec> {
        source_specs(&self.sources)
    }

    pub fn pooling_enabled(&self) -> bool {
        self.extraction.method.pooling()
    }

    /// Selector configuration for the core crate
    pub fn extraction_config(&self) -> Result<ExtractionConfig, ConfigError> {
        let default_group = self
            .default_group()
            .ok_or_else(|| ConfigError::MissingField("nlg.defaults.group".to_string()))?;

        Ok(ExtractionConfig {
            method: self.extraction.method,
            history_depth: self.extraction.history,
            separator: self.extraction.separator.clone(),
            target_name: self.extraction.name.clone(),
            allowed_group_names: self.sources.iter().map(|s| s.name.clone()).collect(),
            default_group_name: default_group.to_string(),
        })
    }

    fn validate(&self) -> Result<(), ConfigError> {
        validate_refresh_interval("nlg", self.refresh_interval_secs)?;
        validate_sources("nlg", &self.sources)?;

        // Guesses are lower-cased before they are matched against source names
        if let Some(source) = self.sources.iter().find(|s| s.name != s.name.to_lowercase()) {
            return Err(ConfigError::InvalidValue {
                field: "nlg.sources".to_string(),
                message: format!("Group name `{}` must be lower case", source.name),
            });
        }

        let extraction = &self.extraction;
        if extraction.history == 0 {
            return Err(ConfigError::InvalidValue {
                field: "nlg.extraction.history".to_string(),
                message: "Must be at least 1".to_string(),
            });
        }

        if extraction.method.requires_separator()
            && extraction.separator.as_deref().map_or(true, str::is_empty)
        {
            return Err(ConfigError::MissingField(format!(
                "nlg.extraction.separator (required by `{}`)",
                extraction.method
            )));
        }

        if extraction.method.requires_name()
            && extraction.name.as_deref().map_or(true, str::is_empty)
        {
            return Err(ConfigError::MissingField(format!(
                "nlg.extraction.name (required by `{}`)",
                extraction.method
            )));
        }

        validate_default_group(
            "nlg.defaults.group",
            &self.sources,
            self.defaults.group.as_deref(),
        )
    }
}

/// Keyword chooser settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChooserConfig {
    /// Group label → keywords
    #[serde(default)]
    pub labels: BTreeMap<String, Vec<String>>,

    /// Label used when no keyword matches; defaults to the default group
    #[serde(default)]
    pub default_label: Option<String>,
}

/// Language understanding role
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NluConfig {
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_secs: u64,

    /// Entity carrying the chosen group in parse results
    pub entity_name: String,

    pub sources: Vec<SourceEntry>,

    /// Required when more than one source is configured
    #[serde(default)]
    pub default_group: Option<String>,

    #[serde(default)]
    pub chooser: ChooserConfig,
}

impl NluConfig {
    pub fn default_group(&self) -> Option<&str> {
        default_group(&self.sources, self.default_group.as_deref())
    }

    pub fn source_specs(&self) -> Vec<SourceSpec> {
        source_specs(&self.sources)
    }

    /// Chooser fallback label
    pub fn chooser_default_label(&self) -> Option<&str> {
        self.chooser
            .default_label
            .as_deref()
            .or_else(|| self.default_group())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        validate_refresh_interval("nlu", self.refresh_interval_secs)?;
        validate_sources("nlu", &self.sources)?;

        if self.entity_name.trim().is_empty() {
            return Err(ConfigError::MissingField("nlu.entity_name".to_string()));
        }

        validate_default_group("nlu.default_group", &self.sources, self.default_group.as_deref())?;

        let names: HashSet<&str> = self.sources.iter().map(|s| s.name.as_str()).collect();
        for label in self.chooser.labels.keys() {
            if !names.contains(label.as_str()) {
                tracing::warn!(label = %label, "Chooser label does not name an NLU source");
            }
        }

        Ok(())
    }
}

fn default_group<'a>(sources: &'a [SourceEntry], configured: Option<&'a str>) -> Option<&'a str> {
    match sources {
        [only] => Some(only.name.as_str()),
        _ => configured,
    }
}

fn source_specs(sources: &[SourceEntry]) -> Vec<SourceSpec> {
    sources
        .iter()
        .map(|s| SourceSpec::new(s.name.clone(), s.path.clone()))
        .collect()
}

fn validate_refresh_interval(role: &str, secs: u64) -> Result<(), ConfigError> {
    if secs == 0 {
        return Err(ConfigError::InvalidValue {
            field: format!("{}.refresh_interval_secs", role),
            message: "Refresh interval must be at least 1 second".to_string(),
        });
    }
    Ok(())
}

fn validate_sources(role: &str, sources: &[SourceEntry]) -> Result<(), ConfigError> {
    if sources.is_empty() {
        return Err(ConfigError::MissingField(format!("{}.sources", role)));
    }

    let mut seen = HashSet::new();
    for source in sources {
        if source.name.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: format!("{}.sources", role),
                message: "Source name cannot be empty".to_string(),
            });
        }
        if source.name == POOLED_GROUP {
            return Err(ConfigError::InvalidValue {
                field: format!("{}.sources", role),
                message: format!("`{}` is reserved", POOLED_GROUP),
            });
        }
        if !seen.insert(source.name.as_str()) {
            return Err(ConfigError::DuplicateSource {
                role: role.to_string(),
                name: source.name.clone(),
            });
        }
    }

    Ok(())
}

fn validate_default_group(
    field: &str,
    sources: &[SourceEntry],
    configured: Option<&str>,
) -> Result<(), ConfigError> {
    let Some(group) = default_group(sources, configured) else {
        return Err(ConfigError::MissingField(field.to_string()));
    };

    if !sources.iter().any(|s| s.name == group) {
        return Err(ConfigError::InvalidValue {
            field: field.to_string(),
            message: format!("`{}` is not one of the configured sources", group),
        });
    }

    Ok(())
}

/// Configuration files named by `DIALOG_SWITCH_CONFIG`, or the default file
pub fn config_paths_from_env() -> Result<Vec<PathBuf>, ConfigError> {
    match std::env::var(CONFIG_PATHS_VAR) {
        Ok(value) if !value.trim().is_empty() => Ok(value
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(PathBuf::from)
            .collect()),
        Ok(_) | Err(std::env::VarError::NotPresent) => Ok(vec![PathBuf::from(DEFAULT_CONFIG_PATH)]),
        Err(e) => Err(ConfigError::Environment(format!("{}: {}", CONFIG_PATHS_VAR, e))),
    }
}

/// Load settings from one or more role documents plus environment overrides.
///
/// Roles are merged from whichever document defines them; documents that set
/// `server.host` or `server.port` must agree on them.
pub fn load_settings(paths: &[PathBuf]) -> Result<Settings, ConfigError> {
    if paths.is_empty() {
        return Err(ConfigError::MissingField("configuration file".to_string()));
    }

    for path in paths {
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }
    }

    check_network_agreement(paths)?;

    let mut builder = Config::builder();
    for path in paths {
        builder = builder.add_source(File::from(path.as_path()));
    }

    // Load from environment variables
    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .separator("__")
            .try_parsing(true),
    );

    let config = builder.build()?;
    let settings: Settings = config.try_deserialize()?;

    settings.validate()?;

    tracing::debug!(
        files = paths.len(),
        nlg = settings.nlg.is_some(),
        nlu = settings.nlu.is_some(),
        "Loaded settings"
    );

    Ok(settings)
}

fn check_network_agreement(paths: &[PathBuf]) -> Result<(), ConfigError> {
    let mut host: Option<(String, &Path)> = None;
    let mut port: Option<(u16, &Path)> = None;

    for path in paths {
        let document = Config::builder()
            .add_source(File::from(path.as_path()))
            .build()?;

        if let Ok(value) = document.get::<String>("server.host") {
            match &host {
                Some((first, first_path)) if *first != value => {
                    return Err(ConfigError::NetworkMismatch {
                        field: "server.host".to_string(),
                        first: format!("{} ({})", first, first_path.display()),
                        second: format!("{} ({})", value, path.display()),
                    });
                },
                Some(_) => {},
                None => host = Some((value, path.as_path())),
            }
        }

        if let Ok(value) = document.get::<u16>("server.port") {
            match &port {
                Some((first, first_path)) if *first != value => {
                    return Err(ConfigError::NetworkMismatch {
                        field: "server.port".to_string(),
                        first: format!("{} ({})", first, first_path.display()),
                        second: format!("{} ({})", value, path.display()),
                    });
                },
                Some(_) => {},
                None => port = Some((value, path.as_path())),
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const NLG_DOC: &str = r#"
server:
  host: 127.0.0.1
  port: 5056
nlg:
  refresh_interval_secs: 5
  extraction:
    method: last_intent_suffix
    separator: "_"
    history: 3
  sources:
    - name: abc
      path: responses/abc.yml
    - NAME: xyz
      FILENAME: responses/xyz.yml
    - [ijk, responses/ijk.yml]
  defaults:
    group: xyz
    response: "Pardon?"
"#;

    const NLU_DOC: &str = r#"
server:
  host: 127.0.0.1
  port: 5056
nlu:
  entity_name: language
  sources:
    - name: eng
      path: models/eng.yml
  chooser:
    labels:
      eng: [hello, thanks]
"#;

    fn write(dir: &TempDir, file: &str, content: &str) -> PathBuf {
        let path = dir.path().join(file);
        std::fs::write(&path, content).unwrap();
        path
    }

    fn nlg(method: ExtractionMethod) -> NlgConfig {
        NlgConfig {
            refresh_interval_secs: 10,
            extraction: ExtractionSettings {
                method,
                name: None,
                separator: None,
                history: 1,
            },
            sources: vec![
                SourceEntry::new("abc", "abc.yml"),
                SourceEntry::new("xyz", "xyz.yml"),
            ],
            defaults: NlgDefaults {
                group: Some("xyz".to_string()),
                ..Default::default()
            },
        }
    }

    fn settings_with(nlg: NlgConfig) -> Settings {
        Settings {
            nlg: Some(nlg),
            ..Default::default()
        }
    }

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.server.port, 8080);
        assert!(settings.observability.metrics_enabled);
        assert!(settings.nlg.is_none());
    }

    #[test]
    fn test_load_single_document() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "nlg.yaml", NLG_DOC);

        let settings = load_settings(&[path]).unwrap();
        assert_eq!(settings.server.host, "127.0.0.1");
        assert_eq!(settings.server.port, 5056);

        let nlg = settings.nlg.unwrap();
        assert_eq!(nlg.refresh_interval_secs, 5);
        assert_eq!(nlg.extraction.method, ExtractionMethod::LastIntentSuffix);
        assert_eq!(nlg.defaults.response, "Pardon?");
        assert_eq!(
            nlg.sources,
            vec![
                SourceEntry::new("abc", "responses/abc.yml"),
                SourceEntry::new("xyz", "responses/xyz.yml"),
                SourceEntry::new("ijk", "responses/ijk.yml"),
            ]
        );

        let extraction = nlg.extraction_config().unwrap();
        assert_eq!(extraction.history_depth, 3);
        assert_eq!(extraction.default_group_name, "xyz");
        assert_eq!(extraction.allowed_group_names, vec!["abc", "xyz", "ijk"]);
    }

    #[test]
    fn test_load_merges_role_documents() {
        let dir = TempDir::new().unwrap();
        let nlg = write(&dir, "nlg.yaml", NLG_DOC);
        let nlu = write(&dir, "nlu.yaml", NLU_DOC);

        let settings = load_settings(&[nlg, nlu]).unwrap();
        assert!(settings.nlg.is_some());

        let nlu = settings.nlu.unwrap();
        assert_eq!(nlu.default_group(), Some("eng"));
        assert_eq!(nlu.chooser_default_label(), Some("eng"));
        assert_eq!(nlu.chooser.labels["eng"], vec!["hello", "thanks"]);
    }

    #[test]
    fn test_network_mismatch() {
        let dir = TempDir::new().unwrap();
        let nlg = write(&dir, "nlg.yaml", NLG_DOC);
        let nlu = write(&dir, "nlu.yaml", &NLU_DOC.replace("5056", "5057"));

        let err = load_settings(&[nlg, nlu]).unwrap_err();
        assert!(matches!(err, ConfigError::NetworkMismatch { ref field, .. } if field == "server.port"));
    }

    #[test]
    fn test_missing_file() {
        let err = load_settings(&[PathBuf::from("/nonexistent/dialog.yaml")]).unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound(_)));
    }

    #[test]
    fn test_malformed_document() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "bad.yaml", "nlg:\n  extraction:\n    method: telepathy\n  sources: []\n");
        assert!(matches!(load_settings(&[path]), Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_requires_a_role() {
        assert!(matches!(
            Settings::default().validate(),
            Err(ConfigError::MissingField(_))
        ));
    }

    #[test]
    fn test_single_source_is_default_group() {
        let mut config = nlg(ExtractionMethod::Pooled);
        config.sources.truncate(1);
        config.defaults.group = None;
        assert_eq!(config.default_group(), Some("abc"));
        assert!(settings_with(config).validate().is_ok());
    }

    #[test]
    fn test_default_group_must_be_a_source() {
        let mut config = nlg(ExtractionMethod::Pooled);
        config.defaults.group = Some("ijk".to_string());
        assert!(matches!(
            settings_with(config.clone()).validate(),
            Err(ConfigError::InvalidValue { .. })
        ));

        config.defaults.group = None;
        assert!(matches!(
            settings_with(config).validate(),
            Err(ConfigError::MissingField(_))
        ));
    }

    #[test]
    fn test_duplicate_sources() {
        let mut config = nlg(ExtractionMethod::Pooled);
        config.sources.push(SourceEntry::new("abc", "other.yml"));
        assert!(matches!(
            settings_with(config).validate(),
            Err(ConfigError::DuplicateSource { .. })
        ));
    }

    #[test]
    fn test_method_requirements() {
        assert!(settings_with(nlg(ExtractionMethod::Suffix)).validate().is_err());
        assert!(settings_with(nlg(ExtractionMethod::Slot)).validate().is_err());

        let mut suffix = nlg(ExtractionMethod::Suffix);
        suffix.extraction.separator = Some("_".to_string());
        assert!(settings_with(suffix).validate().is_ok());

        let mut slot = nlg(ExtractionMethod::Slot);
        slot.extraction.name = Some("language".to_string());
        assert!(settings_with(slot.clone()).validate().is_ok());

        slot.extraction.history = 0;
        assert!(settings_with(slot.clone()).validate().is_err());

        slot.extraction.history = 1;
        slot.refresh_interval_secs = 0;
        assert!(settings_with(slot).validate().is_err());
    }

    #[test]
    fn test_server_validation() {
        let mut settings = settings_with(nlg(ExtractionMethod::Pooled));
        settings.server.port = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_nlg_group_names_lower_case() {
        let mut config = nlg(ExtractionMethod::Pooled);
        config.sources.push(SourceEntry::new("ENG", "eng.yml"));
        let err = settings_with(config).validate().unwrap_err();
        assert!(err.to_string().contains("ENG"));
    }

    #[test]
    fn test_reserved_source_name() {
        let mut config = nlg(ExtractionMethod::Pooled);
        config.sources.push(SourceEntry::new(POOLED_GROUP, "pooled.yml"));
        assert!(settings_with(config).validate().is_err());
    }
}
