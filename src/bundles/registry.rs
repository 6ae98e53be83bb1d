//! Bundle registry: in-memory bundle set plus the tools they reference
//!
//! The registry is read-mostly. Every mutation rewrites the JSON bundle
//! document and updates the store before returning; persistence failures
//! are logged and never fail the mutation.

use super::defaults::default_bundles;
use super::models::{Bundle, BundleConfigFile, BundleUpdate, NewBundle};
use super::store::BundleStore;
use crate::error::{ContextError, Result};
use crate::tools::{Tool, ToolRegistry};
use chrono::Utc;
use indexmap::IndexMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Version written into the bundle document
pub const DOCUMENT_VERSION: &str = "1.0.0";

pub struct BundleRegistry {
    bundles: RwLock<IndexMap<String, Bundle>>,
    tools: ToolRegistry,
    store: Arc<dyn BundleStore>,
    config_file: Option<PathBuf>,
}

impl BundleRegistry {
    pub fn new(tools: ToolRegistry, store: Arc<dyn BundleStore>) -> Self {
        Self {
            bundles: RwLock::new(IndexMap::new()),
            tools,
            store,
            config_file: None,
        }
    }

    /// Persist the full bundle document to `path` after every mutation
    pub fn with_config_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_file = Some(path.into());
        self
    }

    // a panicked writer cannot leave a half-applied bundle; recover the data
    fn read(&self) -> RwLockReadGuard<'_, IndexMap<String, Bundle>> {
        self.bundles.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, IndexMap<String, Bundle>> {
        self.bundles.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Load defaults, then the bundle document, then the store; later
    /// sources override earlier ones by id
    pub async fn initialize(&self, load_defaults: bool) -> Result<()> {
        let mut loaded: Vec<Bundle> = Vec::new();

        if load_defaults {
            loaded.extend(default_bundles());
        }

        if let Some(path) = &self.config_file {
            match read_document(path).await {
                Ok(Some(document)) => {
                    debug!("Loaded {} bundles from {}", document.bundles.len(), path.display());
                    loaded.extend(document.bundles);
                }
                Ok(None) => {}
                Err(e) => warn!("Ignoring bundle document {}: {}", path.display(), e),
            }
        }

        match self.store.load_all().await {
            Ok(stored) => loaded.extend(stored),
            Err(e) => warn!("Failed to load bundles from store: {}", e),
        }

        let mut bundles = self.write();
        for bundle in loaded {
            if let Some(tool) = bundle.tools.iter().find(|t| !self.tools.contains(t)) {
                debug!("Bundle {} references unknown tool {}", bundle.id, tool);
            }
            bundles.insert(bundle.id.clone(), bundle);
        }

        info!(
            "Bundle registry initialized with {} bundles and {} tools",
            bundles.len(),
            self.tools.len()
        );
        Ok(())
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn tool(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name)
    }

    pub fn get_bundle(&self, id: &str) -> Option<Bundle> {
        self.read().get(id).cloned()
    }

    pub fn list_bundles(&self) -> Vec<Bundle> {
        self.read().values().cloned().collect()
    }

    pub fn active_bundles(&self) -> Vec<Bundle> {
        self.read().values().filter(|b| b.is_active).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Insert a bundle as-is, replacing any with the same id, without
    /// persisting
    pub fn register(&self, bundle: Bundle) {
        self.write().insert(bundle.id.clone(), bundle);
    }

    pub async fn create_bundle(&self, new: NewBundle) -> Result<Bundle> {
        if new.name.trim().is_empty() {
            return Err(ContextError::InvalidBundle("name must not be empty".to_string()));
        }

        let id = match &new.id {
            Some(id) if !id.trim().is_empty() => id.trim().to_string(),
            _ => generate_id(&new.name),
        };
        let bundle = new.into_bundle(id);

        if let Some(tool) = bundle.duplicate_tool() {
            return Err(ContextError::InvalidBundle(format!(
                "tool '{tool}' listed twice in bundle '{}'",
                bundle.id
            )));
        }

        {
            let mut bundles = self.write();
            if bundles.contains_key(&bundle.id) {
                return Err(ContextError::InvalidBundle(format!(
                    "bundle '{}' already exists",
                    bundle.id
                )));
            }
            bundles.insert(bundle.id.clone(), bundle.clone());
        }

        info!("Created bundle {}", bundle.id);
        self.persist_document().await;
        if let Err(e) = self.store.save(&bundle).await {
            warn!("Failed to store bundle {}: {}", bundle.id, e);
        }

        Ok(bundle)
    }

    pub async fn update_bundle(&self, id: &str, update: BundleUpdate) -> Result<Bundle> {
        let updated = {
            let mut bundles = self.write();
            let bundle = bundles
                .get_mut(id)
                .ok_or_else(|| ContextError::BundleNotFound(id.to_string()))?;

            let mut candidate = bundle.clone();
            update.apply(&mut candidate);
            if let Some(tool) = candidate.duplicate_tool() {
                return Err(ContextError::InvalidBundle(format!(
                    "tool '{tool}' listed twice in bundle '{id}'"
                )));
            }
            *bundle = candidate.clone();
            candidate
        };

        info!("Updated bundle {}", id);
        self.persist_document().await;
        if let Err(e) = self.store.save(&updated).await {
            warn!("Failed to store bundle {}: {}", id, e);
        }

        Ok(updated)
    }

    pub async fn delete_bundle(&self, id: &str) -> Result<()> {
        let removed = self.write().shift_remove(id);
        if removed.is_none() {
            return Err(ContextError::BundleNotFound(id.to_string()));
        }

        info!("Deleted bundle {}", id);
        self.persist_document().await;
        if let Err(e) = self.store.delete(id).await {
            warn!("Failed to remove bundle {} from store: {}", id, e);
        }

        Ok(())
    }

    /// Full bundle document
    pub fn export(&self) -> BundleConfigFile {
        BundleConfigFile {
            bundles: self.list_bundles(),
            last_updated: Utc::now(),
            version: DOCUMENT_VERSION.to_string(),
        }
    }

    async fn persist_document(&self) {
        let Some(path) = &self.config_file else {
            return;
        };
        if let Err(e) = write_document(path, &self.export()).await {
            warn!("Failed to write bundle document {}: {}", path.display(), e);
        }
    }
}

fn generate_id(name: &str) -> String {
    let slug: String = name
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-");
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}-{}", if slug.is_empty() { "bundle" } else { &slug }, &suffix[..8])
}

async fn read_document(path: &Path) -> Result<Option<BundleConfigFile>> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    Ok(Some(serde_json::from_str(&content)?))
}

async fn write_document(path: &Path, document: &BundleConfigFile) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    let json = serde_json::to_string_pretty(document)?;
    tokio::fs::write(path, json).await?;
    Ok(())
}
