//! Application State
//!
//! Shared state across all handlers and refresh tasks.

use std::sync::Arc;
use std::time::Duration;

use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;

use dialog_switch_config::{NlgConfig, NluConfig, Settings};
use dialog_switch_core::{
    CatalogLoader, GroupSelector, KeywordChooser, ModelLoader, NluRunner, RefreshReport,
    ResourceRegistry, ResponseGenerator,
};

use crate::metrics::record_refresh;
use crate::ServerError;

/// Served roles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Nlg,
    Nlu,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Nlg => "nlg",
            Role::Nlu => "nlu",
        }
    }
}

/// Result of one refresh cycle for a role
#[derive(Debug, Clone, Serialize)]
pub struct RoleRefresh {
    pub role: Role,
    pub changed: Vec<String>,
    pub failed: Vec<String>,
}

impl RoleRefresh {
    fn from_report(role: Role, report: RefreshReport) -> Self {
        Self {
            role,
            changed: report.changed,
            failed: report.failed.iter().map(ToString::to_string).collect(),
        }
    }
}

/// Application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Settings>,
    /// Present when the `nlg` role is configured
    pub nlg: Option<Arc<ResponseGenerator>>,
    /// Present when the `nlu` role is configured
    pub nlu: Option<Arc<NluRunner>>,
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    /// Build registries and selectors for every configured role.
    ///
    /// Nothing is loaded yet; call `initial_load` before serving.
    pub fn from_settings(config: Settings) -> Result<Self, ServerError> {
        let nlg = config.nlg.as_ref().map(build_nlg).transpose()?;
        let nlu = config.nlu.as_ref().map(build_nlu).transpose()?;

        Ok(Self {
            config: Arc::new(config),
            nlg: nlg.map(Arc::new),
            nlu: nlu.map(Arc::new),
            metrics: None,
        })
    }

    pub fn with_metrics(mut self, metrics: Option<PrometheusHandle>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Configured roles
    pub fn roles(&self) -> Vec<Role> {
        let mut roles = Vec::new();
        if self.nlg.is_some() {
            roles.push(Role::Nlg);
        }
        if self.nlu.is_some() {
            roles.push(Role::Nlu);
        }
        roles
    }

    /// Refresh interval of a role
    pub fn refresh_interval(&self, role: Role) -> Option<Duration> {
        let secs = match role {
            Role::Nlg => self.config.nlg.as_ref()?.refresh_interval_secs,
            Role::Nlu => self.config.nlu.as_ref()?.refresh_interval_secs,
        };
        Some(Duration::from_secs(secs))
    }

    /// Run one refresh cycle for a role. Blocks on file I/O.
    pub fn refresh_role(&self, role: Role) -> Option<RoleRefresh> {
        let report = match role {
            Role::Nlg => self.nlg.as_ref()?.registry().refresh_report(),
            Role::Nlu => self.nlu.as_ref()?.refresh(),
        };

        let outcome = if !report.is_clean() {
            "failed"
        } else if report.any_changed() {
            "changed"
        } else {
            "unchanged"
        };
        record_refresh(role.as_str(), outcome);

        if report.any_changed() {
            tracing::info!(role = role.as_str(), changed = ?report.changed, "Refreshed resources");
        }

        Some(RoleRefresh::from_report(role, report))
    }

    /// Refresh every configured role. Blocks on file I/O.
    pub fn refresh_all(&self) -> Vec<RoleRefresh> {
        self.roles()
            .into_iter()
            .filter_map(|role| self.refresh_role(role))
            .collect()
    }

    /// First load of every source. Any failure is fatal.
    pub fn initial_load(&self) -> Result<(), ServerError> {
        for refresh in self.refresh_all() {
            if !refresh.failed.is_empty() {
                return Err(ServerError::Configuration(format!(
                    "initial {} load failed: {}",
                    refresh.role.as_str(),
                    refresh.failed.join("; ")
                )));
            }
            tracing::info!(
                role = refresh.role.as_str(),
                sources = refresh.changed.len(),
                "Initial load complete"
            );
        }
        Ok(())
    }
}

fn build_nlg(config: &NlgConfig) -> Result<ResponseGenerator, ServerError> {
    let registry = ResourceRegistry::new(
        CatalogLoader,
        config.source_specs(),
        config.pooling_enabled(),
    )?;
    let selector = GroupSelector::new(config.extraction_config()?)?;

    tracing::info!(
        method = %config.extraction.method,
        sources = config.sources.len(),
        default_group = selector.default_group(),
        "Configured NLG role"
    );

    Ok(ResponseGenerator::new(
        Arc::new(registry),
        selector,
        config.defaults.response.clone(),
    ))
}

fn build_nlu(config: &NluConfig) -> Result<NluRunner, ServerError> {
    let default_group = config
        .default_group()
        .ok_or_else(|| ServerError::Configuration("nlu.default_group is required".to_string()))?;
    let default_label = config.chooser_default_label().unwrap_or(default_group);

    let registry = ResourceRegistry::new(ModelLoader, config.source_specs(), false)?;
    let chooser = KeywordChooser::new(config.chooser.labels.clone(), default_label)?;

    tracing::info!(
        sources = config.sources.len(),
        default_group,
        "Configured NLU role"
    );

    Ok(NluRunner::new(
        Arc::new(registry),
        Box::new(chooser),
        config.entity_name.clone(),
        default_group,
    )?)
}
