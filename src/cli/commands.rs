use crate::config::{LinkerConfig, CONFIG_FILE_NAME};
use crate::core::bundle::Bundle;
use crate::core::linker::Linker;
use crate::utils::Logger;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "soku-linker")]
#[command(about = "Soku Linker - incremental module linker for compiled JavaScript")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Link entries into bundles
    Link {
        /// Config file (defaults to ./soku-linker.config.json when present)
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Entry file; the first is the main bundle, the rest are plugins
        #[arg(short, long = "entry")]
        entries: Vec<PathBuf>,
        /// Base directory for bare specifiers, primary first
        #[arg(short, long = "base")]
        bases: Vec<PathBuf>,
        /// Persisted cache file
        #[arg(long)]
        cache: Option<PathBuf>,
        /// Output directory
        #[arg(short, long, default_value = "dist")]
        outdir: PathBuf,
        /// Disable minification
        #[arg(long)]
        no_minify: bool,
        /// Content-addressed ids for an independently built extension
        #[arg(long)]
        plugin: bool,
        /// Report circular dependencies
        #[arg(long)]
        detect_cycles: bool,
    },
    /// Show linker information
    Info,
}

/// Options of the `link` command layered over the config file
pub struct LinkArgs {
    pub config: Option<PathBuf>,
    pub entries: Vec<PathBuf>,
    pub bases: Vec<PathBuf>,
    pub cache: Option<PathBuf>,
    pub outdir: PathBuf,
    pub no_minify: bool,
    pub plugin: bool,
    pub detect_cycles: bool,
}

impl LinkArgs {
    /// Build the effective configuration; flags override file values
    pub fn into_config(self) -> Result<(LinkerConfig, PathBuf)> {
        let mut config = match &self.config {
            Some(path) => LinkerConfig::load(path)
                .with_context(|| format!("Failed to load {}", path.display()))?,
            None => LinkerConfig::load_from_dir(Path::new("."))?.unwrap_or_default(),
        };

        if !self.entries.is_empty() {
            config.entries = self.entries;
        }
        if !self.bases.is_empty() {
            config.bases = self.bases;
        }
        if self.cache.is_some() {
            config.cache = self.cache;
        }
        if self.no_minify {
            config.minify = false;
        }
        config.plugin |= self.plugin;
        config.detect_cycles |= self.detect_cycles;

        Ok((config, self.outdir))
    }
}

pub struct CliHandler;

impl CliHandler {
    pub fn new() -> Self {
        Self
    }

    pub async fn run(&self) -> Result<()> {
        Logger::init();

        let cli = Cli::parse();

        match cli.command {
            Commands::Link {
                config,
                entries,
                bases,
                cache,
                outdir,
                no_minify,
                plugin,
                detect_cycles,
            } => {
                let args = LinkArgs {
                    config,
                    entries,
                    bases,
                    cache,
                    outdir,
                    no_minify,
                    plugin,
                    detect_cycles,
                };
                self.handle_link_command(args).await
            }
            Commands::Info => self.handle_info_command().await,
        }
    }

    async fn handle_link_command(&self, args: LinkArgs) -> Result<()> {
        let (config, outdir) = args.into_config()?;

        // The link is synchronous; keep it off the async workers
        let written = tokio::task::spawn_blocking(move || link_and_write(config, &outdir))
            .await
            .context("Link task failed")??;

        for path in written {
            Logger::info(&format!("📝 Wrote {}", path.display()));
        }
        Ok(())
    }

    async fn handle_info_command(&self) -> Result<()> {
        tracing::info!("🔗 Soku Linker v{}", env!("CARGO_PKG_VERSION"));
        tracing::info!("══════════════════════════════════════");
        tracing::info!("📄 Config file: {}", CONFIG_FILE_NAME);
        tracing::info!("");
        tracing::info!("🏗️  Pipeline:");
        tracing::info!("  • Resolve require() graphs from compiled CommonJS");
        tracing::info!("  • Content-hash cache, only changed modules are recompiled");
        tracing::info!("  • Dense main bundles, content-addressed plugin bundles");
        tracing::info!("  • oxc minification with source maps");
        Ok(())
    }
}

impl Default for CliHandler {
    fn default() -> Self {
        Self::new()
    }
}

/// Link once, write `<entry>.js` (and `<entry>.min.js`) per bundle, then persist the cache
pub fn link_and_write(config: LinkerConfig, outdir: &Path) -> Result<Vec<PathBuf>> {
    let minify = config.minify;
    let mut linker = Linker::new(config)?;
    linker.load_cache();

    let output = linker.link()?;
    if !output.status {
        Logger::warn("Linked with circular dependencies");
    }

    let mut written = Vec::new();
    for bundle in &output.bundles {
        let name = bundle_name(bundle);

        let path = outdir.join(format!("{}.js", name));
        bundle.assemble(false)?.write(&path)?;
        written.push(path);

        if minify {
            let path = outdir.join(format!("{}.min.js", name));
            bundle.assemble(true)?.write(&path)?;
            written.push(path);
        }
    }

    linker.store_cache()?;
    Ok(written)
}

fn bundle_name(bundle: &Bundle) -> String {
    bundle
        .entry
        .file
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "bundle".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_flags_override_config() {
        let args = LinkArgs {
            config: None,
            entries: vec![PathBuf::from("/src/main.js")],
            bases: vec![PathBuf::from("/src")],
            cache: Some(PathBuf::from("/tmp/cache.json")),
            outdir: PathBuf::from("out"),
            no_minify: true,
            plugin: true,
            detect_cycles: false,
        };
        let (config, outdir) = args.into_config().unwrap();
        assert_eq!(config.entries, vec![PathBuf::from("/src/main.js")]);
        assert!(!config.minify);
        assert!(config.plugin);
        assert_eq!(outdir, PathBuf::from("out"));
    }

    #[test]
    fn test_link_and_write() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("src");
        fs::create_dir_all(&src).unwrap();
        fs::write(src.join("main.js"), "const a = require(\"./a\");\nexports.x = a.y;\n").unwrap();
        fs::write(src.join("a.js"), "exports.y = 1;\n").unwrap();

        let mut config = LinkerConfig::new(vec![src.join("main.js")], vec![src.clone()]);
        config.minify = false;
        config.cache = Some(dir.path().join("cache.json"));

        let outdir = dir.path().join("dist");
        let written = link_and_write(config, &outdir).unwrap();

        assert_eq!(written, vec![outdir.join("main.js")]);
        assert!(outdir.join("main.js.map").exists());
        assert!(dir.path().join("cache.json").exists());
    }
}
