use std::time::Instant;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

pub struct Logger;

impl Logger {
    /// Install the fmt subscriber; `RUST_LOG` overrides the default filter
    pub fn init() {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("soku_linker=info"));

        // A second init (tests, embedding) is not an error
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .try_init();
    }

    pub fn link_start(entries: usize, bases: usize) {
        info!("🔗 Soku Linker");
        info!("═══════════════════════════════════════");
        info!("📁 Entries: {}", entries);
        info!("📚 Base paths: {}", bases);
    }

    pub fn discovered(modules: usize, changed: usize) {
        info!("📦 Discovered {} modules ({} changed)", modules, changed);
    }

    pub fn bundle_partition(name: &str, modules: usize) {
        info!("🧩 Bundle {}: {} modules", name, modules);
    }

    pub fn compiling_module(name: &str, reason: &str) {
        debug!("⚡ Compiling: {} ({})", name, reason);
    }

    pub fn reusing_module(name: &str) {
        debug!("♻️  Reusing cached: {}", name);
    }

    pub fn link_complete(bundles: usize, transformed: usize, reused: usize, link_time: std::time::Duration) {
        info!("");
        info!("📊 Link Statistics:");
        info!("  • Bundles: {}", bundles);
        info!("  • Modules transformed: {}", transformed);
        info!("  • Modules reused from cache: {}", reused);
        info!("  • Link time: {:.2?}", link_time);
        info!("✅ Link completed successfully!");
    }

    pub fn info(msg: &str) {
        info!("{}", msg);
    }

    pub fn debug(msg: &str) {
        debug!("{}", msg);
    }

    pub fn error(msg: &str) {
        error!("❌ {}", msg);
    }

    pub fn warn(msg: &str) {
        warn!("⚠️  {}", msg);
    }
}

pub struct Timer {
    start: Instant,
    name: String,
}

impl Timer {
    pub fn start(name: &str) -> Self {
        debug!("⏱️  Starting: {}", name);
        Self {
            start: Instant::now(),
            name: name.to_string(),
        }
    }

    pub fn elapsed(&self) -> std::time::Duration {
        self.start.elapsed()
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        debug!("⏱️  Completed: {} in {:.2?}", self.name, self.elapsed());
    }
}
