use crate::utils::{LinkerError, Logger, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE_NAME: &str = "soku-linker.config.json";

/// Node builtin modules, delegated to the host `require` when `builtins` is on
pub const NODE_BUILTINS: &[&str] = &[
    "assert", "assert/strict", "async_hooks", "buffer", "child_process", "cluster",
    "console", "constants", "crypto", "dgram", "diagnostics_channel", "dns",
    "dns/promises", "domain", "events", "fs", "fs/promises", "http", "http2", "https",
    "inspector", "module", "net", "os", "path", "path/posix", "path/win32",
    "perf_hooks", "process", "punycode", "querystring", "readline", "repl", "stream",
    "stream/consumers", "stream/promises", "stream/web", "string_decoder", "sys",
    "timers", "timers/promises", "tls", "trace_events", "tty", "url", "util",
    "util/types", "v8", "vm", "wasi", "worker_threads", "zlib",
];

/// Language level the upstream compiler targeted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Target {
    #[serde(rename = "ES2015")]
    Es2015,
    #[serde(rename = "ES2017")]
    Es2017,
    #[serde(rename = "ES2020")]
    Es2020,
    #[serde(rename = "ES2022")]
    Es2022,
}

impl std::str::FromStr for Target {
    type Err = LinkerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_uppercase().as_str() {
            "ES2015" => Ok(Target::Es2015),
            "ES2017" => Ok(Target::Es2017),
            "ES2020" => Ok(Target::Es2020),
            "ES2022" => Ok(Target::Es2022),
            other => Err(LinkerError::config(format!("unknown target '{}'", other))),
        }
    }
}

/// Linker options (soku-linker.config.json)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LinkerConfig {
    /// Entry files; the first one roots the main bundle, the rest are plugins
    pub entries: Vec<PathBuf>,
    /// Search roots for bare specifiers, primary first
    pub bases: Vec<PathBuf>,
    /// Paths that are never turned into modules
    pub excludes: Vec<PathBuf>,
    /// Bare names delegated to the host `require`
    pub externals: Vec<String>,
    /// Regex patterns delegated to the host `require`
    pub external_patterns: Vec<String>,
    /// Also delegate Node builtin modules
    pub builtins: bool,
    /// Persisted cache file
    pub cache: Option<PathBuf>,
    pub target: Option<Target>,
    pub minify: bool,
    /// Content-addressed ids everywhere (independently built extension)
    pub plugin: bool,
    /// Canonical names exported from secondary bases
    pub exports: Vec<String>,
    /// Names satisfied with an empty module at runtime
    pub shims: Vec<String>,
    /// Path suffix -> replacement source
    pub overrides: BTreeMap<String, String>,
    pub detect_cycles: bool,
    pub apply_transforms: bool,
    /// Run the transform/minify batch on the rayon pool
    pub parallel: bool,
    /// Magic name resolving to the entry module at runtime
    pub entry_alias: String,
}

impl Default for LinkerConfig {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            bases: Vec::new(),
            excludes: Vec::new(),
            externals: Vec::new(),
            external_patterns: Vec::new(),
            builtins: false,
            cache: None,
            target: None,
            minify: true,
            plugin: false,
            exports: Vec::new(),
            shims: Vec::new(),
            overrides: BTreeMap::new(),
            detect_cycles: false,
            apply_transforms: true,
            parallel: false,
            entry_alias: "bokehjs".to_string(),
        }
    }
}

impl LinkerConfig {
    pub fn new(entries: Vec<PathBuf>, bases: Vec<PathBuf>) -> Self {
        Self {
            entries,
            bases,
            ..Self::default()
        }
    }

    /// Load configuration from `path`, resolving relative paths against its directory
    pub fn load(path: &Path) -> Result<Self> {
        Logger::debug(&format!("Loading config from {}", path.display()));

        let content = std::fs::read_to_string(path)?;
        let mut config: LinkerConfig = serde_json::from_str(&content).map_err(|e| {
            LinkerError::config(format!("Failed to parse {}: {}", path.display(), e))
        })?;

        let root = path.parent().unwrap_or_else(|| Path::new("."));
        config.rebase(root);
        Ok(config)
    }

    /// Search for `soku-linker.config.json` in `root`
    pub fn load_from_dir(root: &Path) -> Result<Option<Self>> {
        let config_path = root.join(CONFIG_FILE_NAME);
        if !config_path.exists() {
            Logger::debug(&format!("No {} found, using defaults", CONFIG_FILE_NAME));
            return Ok(None);
        }
        Self::load(&config_path).map(Some)
    }

    fn rebase(&mut self, root: &Path) {
        let join = |p: &PathBuf| if p.is_absolute() { p.clone() } else { root.join(p) };
        self.entries = self.entries.iter().map(join).collect();
        self.bases = self.bases.iter().map(join).collect();
        self.excludes = self.excludes.iter().map(join).collect();
        self.cache = self.cache.as_ref().map(join);
    }
}
