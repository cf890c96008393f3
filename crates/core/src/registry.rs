//! Hot-reloaded resource registry
//!
//! Owns the mapping from group name to loaded resource (response catalog or
//! classifier) and keeps it in sync with the source files on disk.
//!
//! Staleness is decided from file modification times only. Each source whose
//! mtime is strictly newer than the last one seen is reloaded and swapped in as
//! a single `Arc` replacement, so readers never see a partially updated
//! resource. A source that fails to load keeps serving its previous data.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use parking_lot::{Mutex, RwLock};

use crate::{Error, Result};

/// Group name under which the pooled overlay is stored
pub const POOLED_GROUP: &str = "_pooled_";

/// Turns a source file into a loaded resource
pub trait ResourceLoader: Send + Sync + 'static {
    type Resource: Send + Sync + 'static;

    /// Short label for log lines ("responses", "model")
    fn kind(&self) -> &'static str;

    /// Load one source. Failures must be reported as `Error::SourceUnreadable`.
    fn load(&self, name: &str, path: &Path) -> Result<Self::Resource>;

    /// Whether `pool` produces a merged view
    fn supports_pooling(&self) -> bool {
        false
    }

    /// Merge all loaded resources, in source order, into one
    fn pool(&self, _parts: &[&Self::Resource]) -> Option<Self::Resource> {
        None
    }
}

/// A configured source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSpec {
    pub name: String,
    pub path: PathBuf,
}

impl SourceSpec {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }
}

/// Staleness metadata for one source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceEntry {
    pub name: String,
    pub source_path: PathBuf,
    /// `None` until the first successful load
    pub last_known_modified: Option<SystemTime>,
}

impl ResourceEntry {
    fn is_stale(&self, modified: SystemTime) -> bool {
        self.last_known_modified.map_or(true, |known| modified > known)
    }
}

/// Outcome of one refresh cycle
#[derive(Debug, Default)]
pub struct RefreshReport {
    /// Sources reloaded in this cycle, in configuration order
    pub changed: Vec<String>,
    /// Sources that could not be checked or loaded
    pub failed: Vec<Error>,
}

impl RefreshReport {
    pub fn any_changed(&self) -> bool {
        !self.changed.is_empty()
    }

    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Named resources kept fresh from disk
pub struct ResourceRegistry<L: ResourceLoader> {
    loader: L,
    pooling: bool,
    /// Source names in configuration order
    order: Vec<String>,
    /// Held for a whole refresh cycle, serializing overlapping refreshes
    entries: Mutex<Vec<ResourceEntry>>,
    resources: RwLock<HashMap<String, Arc<L::Resource>>>,
}

impl<L: ResourceLoader> ResourceRegistry<L> {
    /// Configure the registry. Nothing is loaded until the first `refresh`.
    pub fn new(loader: L, sources: Vec<SourceSpec>, pooling: bool) -> Result<Self> {
        if sources.is_empty() {
            return Err(Error::Configuration(format!(
                "no {} sources configured",
                loader.kind()
            )));
        }

        if pooling && !loader.supports_pooling() {
            return Err(Error::Configuration(format!(
                "pooling is not supported for {} sources",
                loader.kind()
            )));
        }

        let mut seen = HashSet::new();
        for source in &sources {
            if source.name == POOLED_GROUP {
                return Err(Error::Configuration(format!(
                    "source name `{}` is reserved",
                    POOLED_GROUP
                )));
            }
            if !seen.insert(source.name.as_str()) {
                return Err(Error::Configuration(format!(
                    "duplicate source name `{}`",
                    source.name
                )));
            }
            if !source.path.exists() {
                return Err(Error::Configuration(format!(
                    "source `{}` not found: {}",
                    source.name,
                    source.path.display()
                )));
            }
        }

        let order = sources.iter().map(|s| s.name.clone()).collect();
        let entries = sources
            .into_iter()
            .map(|source| ResourceEntry {
                name: source.name,
                source_path: source.path,
                last_known_modified: None,
            })
            .collect();

        Ok(Self {
            loader,
            pooling,
            order,
            entries: Mutex::new(entries),
            resources: RwLock::new(HashMap::new()),
        })
    }

    /// Reload every stale source. Returns whether anything changed.
    pub fn refresh(&self) -> bool {
        self.refresh_report().any_changed()
    }

    /// Reload every stale source and report what happened
    pub fn refresh_report(&self) -> RefreshReport {
        let mut entries = self.entries.lock();
        let mut report = RefreshReport::default();
        let kind = self.loader.kind();

        for entry in entries.iter_mut() {
            let modified = match modified_time(&entry.source_path) {
                Ok(modified) => modified,
                Err(e) => {
                    let err = Error::source_unreadable(
                        &entry.name,
                        entry.source_path.display().to_string(),
                        e,
                    );
                    tracing::warn!(source = %entry.name, error = %err, "Keeping stale {}", kind);
                    report.failed.push(err);
                    continue;
                },
            };

            if !entry.is_stale(modified) {
                continue;
            }

            if entry.last_known_modified.is_none() {
                tracing::info!(
                    source = %entry.name,
                    path = %entry.source_path.display(),
                    "First-time loading {}",
                    kind
                );
            } else {
                tracing::info!(
                    source = %entry.name,
                    path = %entry.source_path.display(),
                    "{} changed, loading new data",
                    kind
                );
            }

            match self.loader.load(&entry.name, &entry.source_path) {
                Ok(resource) => {
                    self.resources
                        .write()
                        .insert(entry.name.clone(), Arc::new(resource));
                    entry.last_known_modified = Some(modified);
                    report.changed.push(entry.name.clone());
                },
                Err(err) => {
                    tracing::error!(source = %entry.name, error = %err, "Failed to load {}", kind);
                    report.failed.push(err);
                },
            }
        }

        if self.pooling && report.any_changed() {
            self.rebuild_pool(&entries);
        }

        report
    }

    fn rebuild_pool(&self, entries: &[ResourceEntry]) {
        let parts: Vec<Arc<L::Resource>> = {
            let resources = self.resources.read();
            entries
                .iter()
                .filter_map(|entry| resources.get(&entry.name).cloned())
                .collect()
        };
        let refs: Vec<&L::Resource> = parts.iter().map(Arc::as_ref).collect();

        if let Some(pooled) = self.loader.pool(&refs) {
            self.resources
                .write()
                .insert(POOLED_GROUP.to_string(), Arc::new(pooled));
            tracing::debug!(parts = refs.len(), "Rebuilt pooled {}", self.loader.kind());
        }
    }

    /// Current resource for a group
    pub fn get(&self, group: &str) -> Result<Arc<L::Resource>> {
        self.resources
            .read()
            .get(group)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("{} group `{}`", self.loader.kind(), group)))
    }

    pub fn contains(&self, group: &str) -> bool {
        self.resources.read().contains_key(group)
    }

    /// Loaded sources in configuration order, excluding the pooled overlay
    pub fn loaded(&self) -> Vec<(String, Arc<L::Resource>)> {
        let resources = self.resources.read();
        self.order
            .iter()
            .filter_map(|name| {
                resources
                    .get(name)
                    .map(|resource| (name.clone(), Arc::clone(resource)))
            })
            .collect()
    }

    /// Configured source names in configuration order
    pub fn source_names(&self) -> Vec<String> {
        self.order.clone()
    }

    /// Snapshot of staleness metadata
    pub fn entries(&self) -> Vec<ResourceEntry> {
        self.entries.lock().clone()
    }
}

fn modified_time(path: &Path) -> std::io::Result<SystemTime> {
    std::fs::symlink_metadata(path)?.modified()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::CatalogLoader;
    use std::fs::File;
    use std::time::Duration;
    use tempfile::TempDir;

    fn write_catalog(dir: &TempDir, file: &str, key: &str, text: &str) -> PathBuf {
        let path = dir.path().join(file);
        let content = format!("responses:\n  {}:\n    - text: \"{}\"\n", key, text);
        std::fs::write(&path, content).unwrap();
        path
    }

    fn set_mtime(path: &Path, time: SystemTime) {
        File::options()
            .write(true)
            .open(path)
            .unwrap()
            .set_modified(time)
            .unwrap();
    }

    fn bump_mtime(path: &Path) {
        let current = std::fs::symlink_metadata(path).unwrap().modified().unwrap();
        set_mtime(path, current + Duration::from_secs(10));
    }

    fn two_sources(dir: &TempDir) -> Vec<SourceSpec> {
        vec![
            SourceSpec::new("abc", write_catalog(dir, "abc.yml", "utter_hi", "abc hi")),
            SourceSpec::new("xyz", write_catalog(dir, "xyz.yml", "utter_hi", "xyz hi")),
        ]
    }

    #[test]
    fn test_configure_rejects_duplicates() {
        let dir = TempDir::new().unwrap();
        let path = write_catalog(&dir, "abc.yml", "utter_hi", "hi");
        let sources = vec![SourceSpec::new("abc", &path), SourceSpec::new("abc", &path)];
        let err = ResourceRegistry::new(CatalogLoader, sources, false).err().unwrap();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_configure_rejects_missing_path() {
        let dir = TempDir::new().unwrap();
        let sources = vec![SourceSpec::new("abc", dir.path().join("nope.yml"))];
        let err = ResourceRegistry::new(CatalogLoader, sources, false).err().unwrap();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_configure_rejects_reserved_name() {
        let dir = TempDir::new().unwrap();
        let path = write_catalog(&dir, "abc.yml", "utter_hi", "hi");
        let sources = vec![SourceSpec::new(POOLED_GROUP, path)];
        assert!(ResourceRegistry::new(CatalogLoader, sources, true).is_err());
    }

    #[test]
    fn test_nothing_loaded_before_refresh() {
        let dir = TempDir::new().unwrap();
        let registry = ResourceRegistry::new(CatalogLoader, two_sources(&dir), false).unwrap();
        assert!(registry.entries().iter().all(|e| e.last_known_modified.is_none()));
        assert!(matches!(registry.get("abc"), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_first_refresh_loads_everything() {
        let dir = TempDir::new().unwrap();
        let registry = ResourceRegistry::new(CatalogLoader, two_sources(&dir), false).unwrap();

        let report = registry.refresh_report();
        assert_eq!(report.changed, vec!["abc".to_string(), "xyz".to_string()]);
        assert!(report.is_clean());

        let abc = registry.get("abc").unwrap();
        assert_eq!(abc.get("utter_hi").unwrap()[0].text, "abc hi");
        for entry in registry.entries() {
            let on_disk = std::fs::symlink_metadata(&entry.source_path)
                .unwrap()
                .modified()
                .unwrap();
            assert_eq!(entry.last_known_modified, Some(on_disk));
        }
        assert!(!registry.contains(POOLED_GROUP));
    }

    #[test]
    fn test_refresh_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let registry = ResourceRegistry::new(CatalogLoader, two_sources(&dir), false).unwrap();
        assert!(registry.refresh());

        let entries = registry.entries();
        let abc = registry.get("abc").unwrap();

        assert!(!registry.refresh());
        assert_eq!(registry.entries(), entries);
        assert!(Arc::ptr_eq(&abc, &registry.get("abc").unwrap()));
    }

    #[test]
    fn test_refresh_picks_up_newer_file() {
        let dir = TempDir::new().unwrap();
        let registry = ResourceRegistry::new(CatalogLoader, two_sources(&dir), false).unwrap();
        registry.refresh();
        let xyz_before = registry.get("xyz").unwrap();

        let path = write_catalog(&dir, "abc.yml", "utter_hi", "abc updated");
        bump_mtime(&path);

        let report = registry.refresh_report();
        assert_eq!(report.changed, vec!["abc".to_string()]);
        assert_eq!(
            registry.get("abc").unwrap().get("utter_hi").unwrap()[0].text,
            "abc updated"
        );
        assert!(Arc::ptr_eq(&xyz_before, &registry.get("xyz").unwrap()));
    }

    #[test]
    fn test_older_mtime_is_not_reloaded() {
        let dir = TempDir::new().unwrap();
        let registry = ResourceRegistry::new(CatalogLoader, two_sources(&dir), false).unwrap();
        registry.refresh();
        let before = registry.entries();

        let path = write_catalog(&dir, "abc.yml", "utter_hi", "rolled back");
        let old = before[0].last_known_modified.unwrap() - Duration::from_secs(3600);
        set_mtime(&path, old);

        assert!(!registry.refresh());
        assert_eq!(registry.entries(), before);
        assert_eq!(
            registry.get("abc").unwrap().get("utter_hi").unwrap()[0].text,
            "abc hi"
        );
    }

    #[test]
    fn test_broken_source_keeps_stale_data() {
        let dir = TempDir::new().unwrap();
        let registry = ResourceRegistry::new(CatalogLoader, two_sources(&dir), false).unwrap();
        registry.refresh();
        let before = registry.entries();

        let abc = dir.path().join("abc.yml");
        std::fs::write(&abc, "not_responses: {}\n").unwrap();
        bump_mtime(&abc);
        let xyz = write_catalog(&dir, "xyz.yml", "utter_hi", "xyz updated");
        bump_mtime(&xyz);

        let report = registry.refresh_report();
        assert_eq!(report.changed, vec!["xyz".to_string()]);
        assert_eq!(report.failed.len(), 1);
        assert!(matches!(report.failed[0], Error::SourceUnreadable { ref name, .. } if name == "abc"));

        assert_eq!(
            registry.get("abc").unwrap().get("utter_hi").unwrap()[0].text,
            "abc hi"
        );
        assert_eq!(registry.entries()[0], before[0]);
        assert_eq!(
            registry.get("xyz").unwrap().get("utter_hi").unwrap()[0].text,
            "xyz updated"
        );
    }

    #[test]
    fn test_deleted_source_is_not_fatal() {
        let dir = TempDir::new().unwrap();
        let registry = ResourceRegistry::new(CatalogLoader, two_sources(&dir), false).unwrap();
        registry.refresh();

        std::fs::remove_file(dir.path().join("abc.yml")).unwrap();
        let report = registry.refresh_report();
        assert!(!report.any_changed());
        assert_eq!(report.failed.len(), 1);
        assert!(registry.get("abc").is_ok());
    }

    #[test]
    fn test_pooled_overlay_follows_source_order() {
        let dir = TempDir::new().unwrap();
        let sources = vec![
            SourceSpec::new("abc", write_catalog(&dir, "abc.yml", "utter_hi", "abc hi")),
            SourceSpec::new("xyz", write_catalog(&dir, "xyz.yml", "utter_hi", "xyz hi")),
        ];
        let registry = ResourceRegistry::new(CatalogLoader, sources, true).unwrap();
        registry.refresh();

        let pooled = registry.get(POOLED_GROUP).unwrap();
        assert_eq!(pooled.get("utter_hi").unwrap()[0].text, "xyz hi");

        let path = dir.path().join("abc.yml");
        std::fs::write(
            &path,
            "responses:\n  utter_hi:\n    - text: \"abc again\"\n  utter_bye:\n    - text: \"bye\"\n",
        )
        .unwrap();
        bump_mtime(&path);
        assert!(registry.refresh());

        let pooled = registry.get(POOLED_GROUP).unwrap();
        assert_eq!(pooled.len(), 2);
        assert_eq!(pooled.get("utter_hi").unwrap()[0].text, "xyz hi");
        assert_eq!(pooled.get("utter_bye").unwrap()[0].text, "bye");
    }

    #[test]
    fn test_loaded_in_source_order() {
        let dir = TempDir::new().unwrap();
        let registry = ResourceRegistry::new(CatalogLoader, two_sources(&dir), true).unwrap();
        registry.refresh();
        let names: Vec<String> = registry.loaded().into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["abc".to_string(), "xyz".to_string()]);
        assert_eq!(registry.source_names(), names);
    }

    #[test]
    fn test_readers_see_whole_catalogs_during_refresh() {
        let dir = TempDir::new().unwrap();
        let registry =
            Arc::new(ResourceRegistry::new(CatalogLoader, two_sources(&dir), false).unwrap());
        registry.refresh();
        let path = dir.path().join("abc.yml");

        let reader = {
            let registry = Arc::clone(&registry);
            std::thread::spawn(move || {
                for _ in 0..500 {
                    let catalog = registry.get("abc").unwrap();
                    assert_eq!(catalog.get("utter_hi").unwrap().len(), 1);
                }
            })
        };

        for i in 0..20 {
            write_catalog(&dir, "abc.yml", "utter_hi", &format!("abc {}", i));
            bump_mtime(&path);
            registry.refresh();
        }
        reader.join().unwrap();
    }
}
