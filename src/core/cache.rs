use crate::config::{LinkerConfig, Target};
use crate::core::models::ModuleArtifact;
use crate::infrastructure::file_system::{file_exists, read_file, write_file};
use crate::utils::{LinkerError, Logger, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Bumped whenever the persisted layout or the emitted code changes shape
pub const CACHE_VERSION: u32 = 5;

/// Options that shape emitted code; a cache written under other settings is unusable
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeSettings {
    pub minify: bool,
    pub apply_transforms: bool,
    pub target: Option<Target>,
}

impl CodeSettings {
    pub fn from_config(config: &LinkerConfig) -> Self {
        Self {
            minify: config.minify,
            apply_transforms: config.apply_transforms,
            target: config.target,
        }
    }
}

#[derive(Serialize)]
struct CacheFileRef<'a> {
    version: u32,
    settings: &'a CodeSettings,
    artifacts: Vec<&'a ModuleArtifact>,
}

#[derive(Deserialize)]
struct CacheFile {
    settings: CodeSettings,
    artifacts: Vec<ModuleArtifact>,
}

/// Artifacts of the previous link, keyed by module path
#[derive(Debug, Clone, Default)]
pub struct LinkerCache {
    settings: CodeSettings,
    entries: BTreeMap<PathBuf, ModuleArtifact>,
}

impl LinkerCache {
    pub fn new(settings: CodeSettings) -> Self {
        Self {
            settings,
            entries: BTreeMap::new(),
        }
    }

    pub fn settings(&self) -> &CodeSettings {
        &self.settings
    }

    pub fn compute_content_hash(content: &[u8]) -> String {
        blake3::hash(content).to_hex().to_string()
    }

    /// Load a persisted cache; anything unusable yields an empty cache
    pub fn load(path: &Path, settings: CodeSettings) -> Self {
        if !file_exists(path) {
            Logger::debug(&format!("No cache at {}, linking cold", path.display()));
            return Self::new(settings);
        }

        let loaded = read_file(path).and_then(|content| Self::parse(&content, &settings));
        match loaded {
            Ok(cache) => {
                Logger::debug(&format!("Loaded {} cached modules", cache.len()));
                cache
            }
            Err(err) => {
                Logger::warn(&format!("Discarding cache {}: {}", path.display(), err));
                Self::new(settings)
            }
        }
    }

    pub fn parse(content: &str, settings: &CodeSettings) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(content)
            .map_err(|e| LinkerError::CacheFormat(format!("unreadable cache: {}", e)))?;

        let version = value.get("version").and_then(|version| version.as_u64());
        if version != Some(CACHE_VERSION as u64) {
            return Err(LinkerError::CacheFormat(format!(
                "version {:?} does not match {}",
                version, CACHE_VERSION
            )));
        }

        let file: CacheFile = serde_json::from_value(value)
            .map_err(|e| LinkerError::CacheFormat(format!("malformed cache: {}", e)))?;
        if &file.settings != settings {
            return Err(LinkerError::CacheFormat(format!(
                "written with {:?}, linking with {:?}",
                file.settings, settings
            )));
        }

        Ok(Self {
            settings: file.settings,
            entries: file
                .artifacts
                .into_iter()
                .map(|artifact| (artifact.module.file.clone(), artifact))
                .collect(),
        })
    }

    pub fn to_json(&self) -> Result<String> {
        let file = CacheFileRef {
            version: CACHE_VERSION,
            settings: &self.settings,
            artifacts: self.entries.values().collect(),
        };
        Ok(serde_json::to_string(&file)?)
    }

    pub fn store(&self, path: &Path) -> Result<()> {
        write_file(path, &self.to_json()?)?;
        Logger::debug(&format!("Stored {} modules in {}", self.len(), path.display()));
        Ok(())
    }

    pub fn get(&self, file: &Path) -> Option<&ModuleArtifact> {
        self.entries.get(file)
    }

    /// Replace the whole content with the artifacts of the current link
    pub fn replace(&mut self, artifacts: impl IntoIterator<Item = ModuleArtifact>) {
        self.entries = artifacts
            .into_iter()
            .map(|artifact| (artifact.module.file.clone(), artifact))
            .collect();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
