use crate::infrastructure::processors::syntax::ModuleSyntax;
use crate::utils::{LinkerError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};

/// Handle into the module arena of a `ModuleGraph`
pub type ModuleIdx = usize;

/// Length of the hash prefix used as a sparse id
pub const SPARSE_ID_LENGTH: usize = 10;

/// Runtime id of a module inside an assembled bundle
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ModuleId {
    /// Array index in a dense bundle
    Dense(usize),
    /// Content-hash prefix in a sparse bundle
    Sparse(String),
}

impl ModuleId {
    /// JavaScript literal for this id
    pub fn to_js(&self) -> String {
        match self {
            ModuleId::Dense(index) => index.to_string(),
            ModuleId::Sparse(key) => format!("\"{}\"", key),
        }
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModuleId::Dense(index) => write!(f, "{}", index),
            ModuleId::Sparse(key) => write!(f, "{}", key),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleKind {
    Js,
    Json,
    Css,
    /// Exported as text, parsed by the runtime
    Json5,
    /// Exported as text, parsed by the runtime
    Yaml,
}

impl ModuleKind {
    pub fn from_path(path: &Path) -> Result<Self> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("js") | Some("mjs") | Some("cjs") => Ok(ModuleKind::Js),
            Some("json") => Ok(ModuleKind::Json),
            Some("css") => Ok(ModuleKind::Css),
            Some("json5") => Ok(ModuleKind::Json5),
            Some("yaml") | Some("yml") => Ok(ModuleKind::Yaml),
            _ => Err(LinkerError::UnsupportedModule(path.to_path_buf())),
        }
    }
}

/// One input file, identified by its absolute path
#[derive(Debug, Clone)]
pub struct ModuleInfo {
    pub file: PathBuf,
    pub base: PathBuf,
    pub base_path: String,
    pub canonical: Option<String>,
    /// Unassigned until the module's bundle is partitioned
    pub id: Option<ModuleId>,
    pub hash: String,
    pub changed: bool,
    pub kind: ModuleKind,
    pub source: String,
    /// Present only when the module was parsed during this run
    pub syntax: Option<ModuleSyntax>,
    pub dependency_paths: BTreeMap<String, PathBuf>,
    pub dependencies: BTreeMap<String, ModuleIdx>,
    pub externals: BTreeSet<String>,
    pub shims: BTreeSet<String>,
}

impl ModuleInfo {
    /// Name used in logs and bundle comments
    pub fn name(&self) -> &str {
        self.canonical.as_deref().unwrap_or(&self.base_path)
    }
}

/// Persisted snapshot of a `ModuleInfo` with its dependency ids resolved
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleRecord {
    pub file: PathBuf,
    pub base: PathBuf,
    pub base_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub canonical: Option<String>,
    pub id: ModuleId,
    pub hash: String,
    #[serde(rename = "type")]
    pub kind: ModuleKind,
    pub dependency_map: BTreeMap<String, ModuleId>,
    pub dependency_paths: BTreeMap<String, PathBuf>,
    pub externals: BTreeSet<String>,
    #[serde(default)]
    pub shims: BTreeSet<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleCode {
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub map: Option<String>,
    pub min_source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_map: Option<String>,
}

/// The cacheable unit: a module and both of its code variants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleArtifact {
    pub module: ModuleRecord,
    pub code: ModuleCode,
}

/// Output of a `CodeMinifier`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MinifiedCode {
    pub code: String,
    pub map: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssemblyKind {
    /// `[...]` module table indexed by position
    Dense,
    /// `{"<hash>": ...}` module table keyed by content hash
    Sparse,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreludeKind {
    Main,
    Plugin,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkStats {
    pub transformed: usize,
    pub reused: usize,
}
