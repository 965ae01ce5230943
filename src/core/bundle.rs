use crate::config::NODE_BUILTINS;
use crate::core::models::{AssemblyKind, ModuleArtifact, ModuleId, ModuleRecord, PreludeKind};
use crate::infrastructure::file_system::{with_suffix, write_file};
use crate::infrastructure::prelude::{postlude, prelude};
use crate::utils::source_maps::{external_comment, newlines, MapStitcher};
use crate::utils::{LinkerError, Result};
use std::collections::BTreeMap;
use std::path::Path;

/// Modules of one entry, ready to be assembled
#[derive(Debug, Clone)]
pub struct Bundle {
    pub entry: ModuleRecord,
    /// In id order for dense bundles
    pub artifacts: Vec<ModuleArtifact>,
    /// Expose every Node builtin through the host `require`
    pub builtins: bool,
    pub assembly: AssemblyKind,
    pub prelude: PreludeKind,
    pub entry_alias: String,
}

impl Bundle {
    /// Canonical name -> id for every module that has one
    pub fn aliases(&self) -> BTreeMap<String, ModuleId> {
        self.artifacts
            .iter()
            .filter_map(|artifact| {
                artifact
                    .module
                    .canonical
                    .as_ref()
                    .map(|canonical| (canonical.clone(), artifact.module.id.clone()))
            })
            .collect()
    }

    /// Delegated names map to `true`, shims to `false`
    pub fn externals(&self) -> BTreeMap<String, bool> {
        let mut externals = BTreeMap::new();
        if self.builtins {
            for builtin in NODE_BUILTINS {
                externals.insert(builtin.to_string(), true);
            }
        }
        for artifact in &self.artifacts {
            for shim in &artifact.module.shims {
                externals.insert(shim.clone(), false);
            }
        }
        for artifact in &self.artifacts {
            for external in &artifact.module.externals {
                externals.insert(external.clone(), true);
            }
        }
        externals
    }

    /// Stitch the module table into one script; only the full variant carries a map
    pub fn assemble(&self, minified: bool) -> Result<Artifact> {
        let (open, close) = match self.assembly {
            AssemblyKind::Dense => ("[", "]"),
            AssemblyKind::Sparse => ("{", "}"),
        };

        let mut source = prelude(self.prelude, &self.entry_alias);
        source.push('(');
        source.push_str(open);
        source.push('\n');

        let mut line = newlines(&source);
        let mut stitcher = if minified { None } else { Some(MapStitcher::new(None)) };

        for (position, artifact) in self.artifacts.iter().enumerate() {
            let module = &artifact.module;
            if self.assembly == AssemblyKind::Dense && module.id != ModuleId::Dense(position) {
                return Err(LinkerError::config(format!(
                    "module {} has id {} out of order in a dense bundle",
                    module.base_path, module.id
                )));
            }

            let code = if minified { &artifact.code.min_source } else { &artifact.code.source };

            if self.assembly == AssemblyKind::Sparse {
                source.push_str(&module.id.to_js());
                source.push_str(": ");
            }

            if let (Some(stitcher), Some(map)) = (stitcher.as_mut(), artifact.code.map.as_ref()) {
                stitcher.add_module(map, line, Some(&format!("@@/{}", module.base_path)))?;
            }

            source.push_str(code);
            source.push_str(",\n");
            line += newlines(code) + 1;
        }

        let aliases = self.aliases();
        source.push_str(&format!(
            "{}, {}, {}, {});",
            close,
            self.entry.id.to_js(),
            serde_json::to_string(&aliases)?,
            serde_json::to_string(&self.externals())?,
        ));
        source.push_str(postlude());

        let source_map = match stitcher {
            Some(stitcher) => Some(stitcher.finish()?),
            None => None,
        };

        Ok(Artifact {
            source,
            source_map,
            aliases,
        })
    }
}

/// An assembled bundle
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    pub source: String,
    pub source_map: Option<serde_json::Value>,
    pub aliases: BTreeMap<String, ModuleId>,
}

impl Artifact {
    /// Source with a `sourceMappingURL` comment when a map exists
    pub fn full_source(&self, map_name: &str) -> String {
        match self.source_map {
            Some(_) => format!("{}{}\n", self.source, external_comment(map_name)),
            None => self.source.clone(),
        }
    }

    /// Write `<name>.js` and, when there is a map, `<name>.js.map` beside it
    pub fn write(&self, path: &Path) -> Result<()> {
        let map_path = with_suffix(path, ".map");
        let map_name = map_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        write_file(path, &self.full_source(&map_name))?;
        if let Some(map) = &self.source_map {
            write_file(&map_path, &serde_json::to_string(map)?)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::{ModuleCode, ModuleKind};
    use crate::utils::source_maps::line_map;
    use sourcemap::SourceMap;
    use std::collections::BTreeSet;
    use std::path::PathBuf;
    use tempfile::tempdir;

    fn artifact(base_path: &str, id: ModuleId, body: &str) -> ModuleArtifact {
        let source = format!("/* {} */\nfunction _(require, module, exports, __esModule, __esExport) {{\n{}\n}}", base_path, body);
        ModuleArtifact {
            module: ModuleRecord {
                file: PathBuf::from("/build").join(base_path),
                base: PathBuf::from("/build"),
                base_path: base_path.to_string(),
                canonical: Some(base_path.trim_end_matches(".js").to_string()),
                id,
                hash: "0123456789abcdef".to_string(),
                kind: ModuleKind::Js,
                dependency_map: BTreeMap::new(),
                dependency_paths: BTreeMap::new(),
                externals: BTreeSet::new(),
                shims: BTreeSet::new(),
            },
            code: ModuleCode {
                map: Some(line_map(base_path, body, 2).unwrap()),
                min_source: format!("function _(e,t,n){{{}}}", body),
                source,
                min_map: None,
            },
        }
    }

    fn bundle(artifacts: Vec<ModuleArtifact>, assembly: AssemblyKind) -> Bundle {
        Bundle {
            entry: artifacts[0].module.clone(),
            artifacts,
            builtins: false,
            assembly,
            prelude: PreludeKind::Main,
            entry_alias: "bokehjs".to_string(),
        }
    }

    #[test]
    fn test_dense_assembly_shape() {
        let mut glyph = artifact("models/glyph.js", ModuleId::Dense(1), "exports.g = 1;");
        glyph.module.externals.insert("fs".to_string());
        glyph.module.shims.insert("canvas".to_string());
        let bundle = bundle(
            vec![artifact("main.js", ModuleId::Dense(0), "require(1);"), glyph],
            AssemblyKind::Dense,
        );

        let out = bundle.assemble(false).unwrap();
        assert!(out.source.contains("})([\n/* main.js */"));
        assert!(out.source.contains("\n},\n/* models/glyph.js */"));
        assert!(out.source.ends_with(
            "], 0, {\"main\":0,\"models/glyph\":1}, {\"canvas\":false,\"fs\":true});\n})\n"
        ));
        assert_eq!(out.aliases.get("models/glyph"), Some(&ModuleId::Dense(1)));
    }

    #[test]
    fn test_map_points_into_modules() {
        let bundle = bundle(
            vec![
                artifact("main.js", ModuleId::Dense(0), "a();"),
                artifact("lib.js", ModuleId::Dense(1), "b();\nc();"),
            ],
            AssemblyKind::Dense,
        );
        let out = bundle.assemble(false).unwrap();
        let json = serde_json::to_string(out.source_map.as_ref().unwrap()).unwrap();
        let map = SourceMap::from_slice(json.as_bytes()).unwrap();

        let line = out.source.lines().position(|l| l == "c();").unwrap() as u32;
        let token = map.lookup_token(line, 0).unwrap();
        assert_eq!(token.get_source(), Some("@@/lib.js"));
        assert_eq!(token.get_src_line(), 1);
    }

    #[test]
    fn test_sparse_assembly_keys_modules() {
        let mut b = bundle(
            vec![
                artifact("plugin.js", ModuleId::Sparse("aaaaaaaaaa".into()), "x();"),
                artifact("util.js", ModuleId::Sparse("bbbbbbbbbb".into()), "y();"),
            ],
            AssemblyKind::Sparse,
        );
        b.prelude = PreludeKind::Plugin;

        let out = b.assemble(true).unwrap();
        assert!(out.source.contains("({\n\"aaaaaaaaaa\": function _(e,t,n){x();},\n"));
        assert!(out.source.contains("}, \"aaaaaaaaaa\", {"));
        assert!(out.source.contains("register_plugin"));
        assert!(out.source_map.is_none());
    }

    #[test]
    fn test_dense_ids_must_follow_order() {
        let bundle = bundle(
            vec![artifact("main.js", ModuleId::Dense(1), "a();")],
            AssemblyKind::Dense,
        );
        assert!(bundle.assemble(false).is_err());
    }

    #[test]
    fn test_builtins_flag_exposes_node_builtins() {
        let mut b = bundle(vec![artifact("main.js", ModuleId::Dense(0), "a();")], AssemblyKind::Dense);
        b.builtins = true;
        let externals = b.externals();
        assert_eq!(externals.get("fs"), Some(&true));
        assert_eq!(externals.get("path"), Some(&true));
    }

    #[test]
    fn test_write_outputs_source_and_map() {
        let dir = tempdir().unwrap();
        let bundle = bundle(vec![artifact("main.js", ModuleId::Dense(0), "a();")], AssemblyKind::Dense);
        let out = bundle.assemble(false).unwrap();

        let path = dir.path().join("bokeh.js");
        out.write(&path).unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.ends_with("//# sourceMappingURL=bokeh.js.map\n"));
        let map: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(dir.path().join("bokeh.js.map")).unwrap()).unwrap();
        assert_eq!(map["sources"][0], "@@/main.js");
    }
}
