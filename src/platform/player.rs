//! Player script retrieval boundary and the per-version artifact cache

use crate::error::SliceError;
use crate::js::assembler::{AssemblyOptions, GeneratedScript};
use crate::js::extraction::{default_targets, ExtractionReport, ExtractionTarget, TIMESTAMP_VAR_NAME};
use crate::js::slice_player;
use crate::utils::cache::{new_async_cache, AsyncCache};
use crate::utils::url::{player_script_url, player_version_from_text};
use crate::Result;
use async_trait::async_trait;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Supplies player scripts; fetching over the network is up to the
/// implementor
#[async_trait]
pub trait PlayerSource: Send + Sync {
    /// Id of the player currently served
    async fn current_version(&self) -> Result<String>;

    /// Script text for a player id
    async fn fetch_script(&self, version: &str) -> Result<String>;
}

/// Extraction and caching configuration
#[derive(Debug, Clone)]
pub struct PlayerConfig {
    pub cache_ttl: Duration,
    pub assembly: AssemblyOptions,
    pub targets: Vec<ExtractionTarget>,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(24 * 60 * 60),
            assembly: AssemblyOptions::default(),
            targets: default_targets(),
        }
    }
}

impl PlayerConfig {
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    pub fn with_assembly(mut self, assembly: AssemblyOptions) -> Self {
        self.assembly = assembly;
        self
    }

    pub fn with_targets(mut self, targets: Vec<ExtractionTarget>) -> Self {
        self.targets = targets;
        self
    }
}

/// Everything derived from one player version
#[derive(Debug, Clone, Serialize)]
pub struct PlayerData {
    pub version: String,
    pub script_url: String,
    /// `0` when the timestamp could not be extracted
    pub signature_timestamp: u64,
    pub script: GeneratedScript,
    pub report: ExtractionReport,
}

/// Parse, analyze and assemble one player script
pub fn extract_player(version: &str, source: &str, config: &PlayerConfig) -> Result<PlayerData> {
    info!("Extracting player {} ({} bytes)", version, source.len());
    let (script, report) = slice_player(source, config.targets.clone(), &config.assembly)?;

    let signature_timestamp = script
        .raw_value(TIMESTAMP_VAR_NAME)
        .and_then(|raw| raw.trim().parse::<u64>().ok())
        .unwrap_or_else(|| {
            warn!("No signature timestamp for player {}", version);
            0
        });

    Ok(PlayerData {
        version: version.to_string(),
        script_url: player_script_url(version),
        signature_timestamp,
        script,
        report,
    })
}

/// Generated scripts keyed by player version, each expiring after the
/// configured TTL
#[derive(Clone)]
pub struct PlayerCache {
    cache: AsyncCache<String, Arc<PlayerData>>,
    config: Arc<PlayerConfig>,
}

impl PlayerCache {
    pub fn new(config: PlayerConfig) -> Self {
        Self {
            cache: new_async_cache(config.cache_ttl),
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &PlayerConfig {
        &self.config
    }

    pub async fn get(&self, version: &str) -> Option<Arc<PlayerData>> {
        self.cache.get(version).await
    }

    /// Cached data for the current player, extracting it on a miss.
    ///
    /// Concurrent misses for the same version may each run the extraction.
    pub async fn get_or_extract<S>(&self, source: &S) -> Result<Arc<PlayerData>>
    where
        S: PlayerSource + ?Sized,
    {
        let version = source.current_version().await?;
        if let Some(data) = self.cache.get(&version).await {
            debug!("Player {} served from cache", version);
            return Ok(data);
        }

        let text = source.fetch_script(&version).await?;
        let config = Arc::clone(&self.config);
        let task_version = version.clone();
        let data = tokio::task::spawn_blocking(move || {
            extract_player(&task_version, &text, &config)
        })
        .await
        .map_err(|e| SliceError::Generic(format!("Extraction task failed: {}", e)))??;

        let data = Arc::new(data);
        self.cache.insert(version, Arc::clone(&data)).await;
        Ok(data)
    }

    pub async fn invalidate(&self, version: &str) {
        self.cache.invalidate(version).await;
    }

    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
    }
}

/// Player script saved on disk
#[derive(Debug, Clone)]
pub struct FilePlayerSource {
    path: PathBuf,
    version: Option<String>,
}

impl FilePlayerSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            version: None,
        }
    }

    /// Use an explicit player id instead of one derived from the path
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }
}

#[async_trait]
impl PlayerSource for FilePlayerSource {
    async fn current_version(&self) -> Result<String> {
        if let Some(version) = &self.version {
            return Ok(version.clone());
        }
        let path = self.path.to_string_lossy();
        if let Some(version) = player_version_from_text(&path)? {
            return Ok(version);
        }
        self.path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .ok_or_else(|| {
                SliceError::PlayerFetch(format!("Cannot derive a version from {}", path))
            })
    }

    async fn fetch_script(&self, version: &str) -> Result<String> {
        debug!("Reading player {} from {}", version, self.path.display());
        tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            SliceError::PlayerFetch(format!("{}: {}", self.path.display(), e))
        })
    }
}
