//! Label artifact cache: purchased labels keyed by request fingerprint.
//!
//! The only state shared across concurrent purchase calls. An entry is
//! inserted whole after a successful purchase, so readers see either the
//! complete artifact or nothing. Purchases are serialized per fingerprint
//! through `purchase_guard`, so overlapping runs never buy the same label twice.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::{debug, info};

use crate::error::CacheError;
use crate::labels::fingerprint::Fingerprint;
use crate::labels::types::LabelArtifact;

/// On-disk format.
#[derive(Debug, Default, Serialize, Deserialize)]
struct CacheFile {
    artifacts: Vec<LabelArtifact>,
}

/// In-memory label cache, optionally persisted as JSON.
#[derive(Debug, Default)]
pub struct LabelCache {
    entries: RwLock<HashMap<Fingerprint, LabelArtifact>>,
    in_flight: Mutex<HashMap<Fingerprint, Arc<Mutex<()>>>>,
}

impl LabelCache {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn get(&self, fingerprint: &Fingerprint) -> Option<LabelArtifact> {
        self.entries.read().await.get(fingerprint).cloned()
    }

    /// Insert or replace the artifact stored under its own fingerprint.
    pub async fn insert(&self, artifact: LabelArtifact) {
        debug!(
            fingerprint = artifact.fingerprint.short(),
            row_id = %artifact.row_id,
            "Label cached"
        );
        self.entries
            .write()
            .await
            .insert(artifact.fingerprint.clone(), artifact);
    }

    /// Exclusive right to purchase `fingerprint`. Hold it across the cache
    /// re-check, the purchase and the insert.
    pub async fn purchase_guard(&self, fingerprint: &Fingerprint) -> OwnedMutexGuard<()> {
        let slot = self
            .in_flight
            .lock()
            .await
            .entry(fingerprint.clone())
            .or_default()
            .clone();
        slot.lock_owned().await
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// All cached artifacts, ordered by row id.
    pub async fn artifacts(&self) -> Vec<LabelArtifact> {
        let mut all: Vec<LabelArtifact> = self.entries.read().await.values().cloned().collect();
        all.sort_by(|a, b| a.row_id.cmp(&b.row_id).then_with(|| a.fingerprint.cmp(&b.fingerprint)));
        all
    }

    /// Load a cache file. A missing file yields an empty cache.
    pub async fn load(path: &Path) -> Result<Arc<Self>, CacheError> {
        let cache = Self::default();
        match tokio::fs::read(path).await {
            Ok(bytes) => {
                let file: CacheFile = serde_json::from_slice(&bytes)?;
                let mut entries = cache.entries.write().await;
                for artifact in file.artifacts {
                    entries.insert(artifact.fingerprint.clone(), artifact);
                }
                info!(path = %path.display(), entries = entries.len(), "Loaded label cache");
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No label cache on disk");
            }
            Err(e) => return Err(e.into()),
        }
        Ok(Arc::new(cache))
    }

    /// Write the cache to `path` atomically (temp file + rename).
    pub async fn save(&self, path: &Path) -> Result<(), CacheError> {
        let file = CacheFile {
            artifacts: self.artifacts().await,
        };
        let json = serde_json::to_vec_pretty(&file)?;

        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        tokio::fs::write(&tmp, &json).await?;
        tokio::fs::rename(&tmp, path).await?;

        info!(path = %path.display(), entries = file.artifacts.len(), "Saved label cache");
        Ok(())
    }
}
