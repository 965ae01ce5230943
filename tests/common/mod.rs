#![allow(dead_code)]

use soku_linker::{Bundle, LinkerConfig, ModuleArtifact};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::{tempdir, TempDir};

/// A compiled source tree in a temporary directory
pub struct Fixture {
    dir: TempDir,
}

impl Fixture {
    pub fn new(files: &[(&str, &str)]) -> Self {
        let fixture = Self { dir: tempdir().unwrap() };
        for (name, content) in files {
            fixture.write(name, content);
        }
        fixture
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    pub fn write(&self, name: &str, content: &str) {
        let path = self.path(name);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    /// Entries relative to the root, which is also the only base; no minification
    pub fn config(&self, entries: &[&str]) -> LinkerConfig {
        let mut config = LinkerConfig::new(
            entries.iter().map(|entry| self.path(entry)).collect(),
            vec![self.root().to_path_buf()],
        );
        config.minify = false;
        config
    }
}

pub fn base_paths(bundle: &Bundle) -> Vec<String> {
    bundle
        .artifacts
        .iter()
        .map(|artifact| artifact.module.base_path.clone())
        .collect()
}

pub fn artifact<'b>(bundle: &'b Bundle, base_path: &str) -> &'b ModuleArtifact {
    bundle
        .artifacts
        .iter()
        .find(|artifact| artifact.module.base_path == base_path)
        .unwrap_or_else(|| panic!("{} is not in the bundle", base_path))
}
