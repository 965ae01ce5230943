// Soku Linker - incremental module linker and bundler for compiled JavaScript

pub mod cli;
pub mod config;
pub mod core;
pub mod infrastructure;
pub mod utils;

pub use config::{LinkerConfig, Target};
pub use crate::core::bundle::{Artifact, Bundle};
pub use crate::core::cache::LinkerCache;
pub use crate::core::linker::{LinkOutput, Linker};
pub use crate::core::models::{ModuleArtifact, ModuleId, ModuleKind};
pub use utils::{LinkerError, Result};
