//! Bundle persistence collaborators

use super::models::Bundle;
use crate::error::{ContextError, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Storage for individual bundles, used best-effort by the registry
#[async_trait]
pub trait BundleStore: Send + Sync {
    async fn save(&self, bundle: &Bundle) -> Result<()>;

    async fn delete(&self, id: &str) -> Result<()>;

    async fn load_all(&self) -> Result<Vec<Bundle>>;
}

/// Process-local store
#[derive(Default)]
pub struct InMemoryBundleStore {
    bundles: DashMap<String, Bundle>,
}

impl InMemoryBundleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.bundles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bundles.is_empty()
    }
}

#[async_trait]
impl BundleStore for InMemoryBundleStore {
    async fn save(&self, bundle: &Bundle) -> Result<()> {
        self.bundles.insert(bundle.id.clone(), bundle.clone());
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.bundles.remove(id);
        Ok(())
    }

    async fn load_all(&self) -> Result<Vec<Bundle>> {
        let mut bundles: Vec<Bundle> = self.bundles.iter().map(|e| e.value().clone()).collect();
        bundles.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(bundles)
    }
}

/// One `<id>.json` file per bundle in a directory
pub struct JsonDirectoryStore {
    dir: PathBuf,
}

impl JsonDirectoryStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: &str) -> Result<PathBuf> {
        let valid = !id.is_empty()
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
            && !id.starts_with('.');
        if !valid {
            return Err(ContextError::InvalidBundle(format!(
                "bundle id '{id}' cannot be used as a file name"
            )));
        }
        Ok(self.dir.join(format!("{id}.json")))
    }
}

#[async_trait]
impl BundleStore for JsonDirectoryStore {
    async fn save(&self, bundle: &Bundle) -> Result<()> {
        let path = self.path_for(&bundle.id)?;
        tokio::fs::create_dir_all(&self.dir).await?;
        let json = serde_json::to_string_pretty(bundle)?;
        tokio::fs::write(&path, json).await?;
        debug!("Stored bundle {} at {}", bundle.id, path.display());
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let path = self.path_for(id)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn load_all(&self) -> Result<Vec<Bundle>> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut bundles = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let content = match tokio::fs::read_to_string(&path).await {
                Ok(content) => content,
                Err(e) => {
                    warn!("Cannot read stored bundle {}: {}", path.display(), e);
                    continue;
                }
            };
            match serde_json::from_str::<Bundle>(&content) {
                Ok(bundle) => bundles.push(bundle),
                Err(e) => warn!("Ignoring malformed bundle {}: {}", path.display(), e),
            }
        }

        bundles.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(bundles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_in_memory_store() {
        let store = InMemoryBundleStore::new();
        store.save(&Bundle::new("b", "B")).await.unwrap();
        store.save(&Bundle::new("a", "A")).await.unwrap();

        let ids: Vec<String> = store.load_all().await.unwrap().into_iter().map(|b| b.id).collect();
        assert_eq!(ids, vec!["a", "b"]);

        store.delete("a").await.unwrap();
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_json_directory_store() {
        let dir = TempDir::new().unwrap();
        let store = JsonDirectoryStore::new(dir.path().join("bundles"));

        assert!(store.load_all().await.unwrap().is_empty());

        store
            .save(&Bundle::new("perf-audit", "Perf").with_tools(["code_search"]))
            .await
            .unwrap();
        std::fs::write(dir.path().join("bundles/broken.json"), "{not json").unwrap();

        let loaded = store.load_all().await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].tools, vec!["code_search"]);

        store.delete("perf-audit").await.unwrap();
        store.delete("perf-audit").await.unwrap();
        assert!(store.load_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rejects_path_like_ids() {
        let dir = TempDir::new().unwrap();
        let store = JsonDirectoryStore::new(dir.path());
        let err = store.save(&Bundle::new("../escape", "X")).await.unwrap_err();
        assert!(matches!(err, ContextError::InvalidBundle(_)));
    }
}
