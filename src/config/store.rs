use arc_swap::ArcSwap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::info;

use super::PipelineConfig;
use crate::error::{DecodeError, Result};

/// Configuration store backed by a JSON file
///
/// Reads go through `ArcSwap` and never block.
#[derive(Clone)]
pub struct ConfigStore {
    path: PathBuf,
    cache: Arc<ArcSwap<PipelineConfig>>,
    change_tx: broadcast::Sender<ConfigChange>,
}

/// Configuration change event
#[derive(Debug, Clone)]
pub struct ConfigChange {
    pub path: PathBuf,
}

impl ConfigStore {
    /// Open a configuration file, writing defaults if it does not exist
    pub async fn open(path: &Path) -> Result<Self> {
        let config = match tokio::fs::read_to_string(path).await {
            Ok(json) => {
                let config: PipelineConfig =
                    serde_json::from_str(&json).map_err(|e| DecodeError::Config(e.to_string()))?;
                config.validate()?;
                info!("Loaded pipeline configuration from {}", path.display());
                config
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let config = PipelineConfig::default();
                Self::write_file(path, &config).await?;
                info!("Created default pipeline configuration at {}", path.display());
                config
            }
            Err(e) => return Err(e.into()),
        };

        let (change_tx, _) = broadcast::channel(16);
        Ok(Self {
            path: path.to_path_buf(),
            cache: Arc::new(ArcSwap::from_pointee(config)),
            change_tx,
        })
    }

    async fn write_file(path: &Path, config: &PipelineConfig) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let json = serde_json::to_string_pretty(config)?;
        tokio::fs::write(path, json).await?;
        Ok(())
    }

    /// Get current configuration
    pub fn get(&self) -> Arc<PipelineConfig> {
        self.cache.load_full()
    }

    /// Validate, persist and publish a new configuration
    pub async fn set(&self, config: PipelineConfig) -> Result<()> {
        config.validate()?;
        Self::write_file(&self.path, &config).await?;
        self.cache.store(Arc::new(config));

        let _ = self.change_tx.send(ConfigChange {
            path: self.path.clone(),
        });
        Ok(())
    }

    /// Read-modify-write; the last writer wins
    pub async fn update<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut PipelineConfig),
    {
        let mut config = (*self.cache.load_full()).clone();
        f(&mut config);
        self.set(config).await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConfigChange> {
        self.change_tx.subscribe()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
