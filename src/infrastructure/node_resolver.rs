use crate::config::{LinkerConfig, Target, NODE_BUILTINS};
use crate::infrastructure::file_system::{directory_exists, file_exists, normalize, read_file, with_suffix};
use crate::utils::{LinkerError, Logger, Result};
use regex::Regex;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// The subset of package.json the linker reads
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PackageJson {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub main: Option<String>,
    #[serde(default)]
    pub module: Option<String>,
    #[serde(default)]
    pub exports: Option<serde_json::Value>,
    #[serde(default, rename = "type")]
    pub module_type: Option<String>,
}

/// How a dependency specifier is satisfied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DependencyKind {
    /// Resolved to a file and bundled
    Internal,
    /// Delegated to the host `require` at runtime
    External,
    /// Satisfied with an empty exports object at runtime
    Shim,
}

pub type ExcludedPredicate = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Decides which specifiers are never resolved to files
#[derive(Clone, Default)]
pub struct ExternalPolicy {
    names: HashSet<String>,
    patterns: Vec<Regex>,
    shims: HashSet<String>,
    excluded: Option<ExcludedPredicate>,
}

impl ExternalPolicy {
    pub fn from_config(config: &LinkerConfig) -> Result<Self> {
        let mut names: HashSet<String> = config.externals.iter().cloned().collect();

        if config.builtins {
            names.extend(NODE_BUILTINS.iter().map(|name| name.to_string()));
        }

        let patterns = config
            .external_patterns
            .iter()
            .map(|pattern| Regex::new(pattern))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(Self {
            names,
            patterns,
            shims: config.shims.iter().cloned().collect(),
            excluded: None,
        })
    }

    pub fn with_excluded(mut self, predicate: ExcludedPredicate) -> Self {
        self.excluded = Some(predicate);
        self
    }

    pub fn is_external(&self, dep: &str) -> bool {
        self.names.contains(dep)
            || self.patterns.iter().any(|re| re.is_match(dep))
            || self.excluded.as_ref().is_some_and(|excluded| excluded(dep))
    }

    pub fn is_shimmed(&self, dep: &str) -> bool {
        self.shims.contains(dep)
    }

    pub fn classify(&self, dep: &str) -> DependencyKind {
        if self.is_shimmed(dep) {
            DependencyKind::Shim
        } else if self.is_external(dep) {
            DependencyKind::External
        } else {
            DependencyKind::Internal
        }
    }
}

impl std::fmt::Debug for ExternalPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExternalPolicy")
            .field("names", &self.names.len())
            .field("patterns", &self.patterns)
            .field("shims", &self.shims)
            .field("excluded", &self.excluded.is_some())
            .finish()
    }
}

/// Where a module file sits relative to the configured bases
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaseLocation {
    pub base: PathBuf,
    pub base_path: String,
    pub canonical: Option<String>,
    /// Written as an ES module rather than CommonJS
    pub esm: bool,
}

/// Resolves require specifiers to module files
pub struct ModuleResolver {
    bases: Vec<PathBuf>,
    target: Option<Target>,
    exports: HashSet<String>,
    /// Cache of package.json files, keyed by package directory
    package_cache: HashMap<PathBuf, PackageJson>,
}

impl ModuleResolver {
    pub fn new(bases: Vec<PathBuf>, target: Option<Target>, exports: HashSet<String>) -> Self {
        Self {
            bases,
            target,
            exports,
            package_cache: HashMap::new(),
        }
    }

    pub fn bases(&self) -> &[PathBuf] {
        &self.bases
    }

    /// Resolve `dep` as required from `importer`
    pub fn resolve(&mut self, dep: &str, importer: &Path) -> Result<PathBuf> {
        if dep.starts_with('.') {
            self.resolve_relative(dep, importer)
        } else {
            self.resolve_bare(dep, importer)
        }
    }

    fn resolve_relative(&mut self, dep: &str, importer: &Path) -> Result<PathBuf> {
        let dir = importer.parent().unwrap_or_else(|| Path::new("/"));
        let path = normalize(&dir.join(dep));

        if file_exists(&path) {
            return Ok(path);
        }

        let js_file = with_suffix(&path, ".js");
        let json_file = with_suffix(&path, ".json");
        let has_js_file = file_exists(&js_file);
        let has_json_file = file_exists(&json_file);

        if directory_exists(&path) {
            if let Some(pkg_file) = self.resolve_package(&path)? {
                if !has_js_file && !has_json_file {
                    return Ok(pkg_file);
                }
                let file = if has_js_file { &js_file } else { &json_file };
                return Err(LinkerError::resolution(
                    dep,
                    importer,
                    format!("ambiguous, both {} and {} exist", file.display(), pkg_file.display()),
                ));
            }
        }

        if has_js_file {
            Ok(js_file)
        } else if has_json_file {
            Ok(json_file)
        } else {
            Err(LinkerError::resolution(dep, importer, "no such file or directory".to_string()))
        }
    }

    fn resolve_bare(&mut self, dep: &str, importer: &Path) -> Result<PathBuf> {
        for base in self.bases.clone() {
            let path = normalize(&base.join(dep));
            if let Some(file) = self.resolve_file_or_directory(&path)? {
                return Ok(file);
            }

            let (pkg_name, subpath) = parse_package_specifier(dep);
            if let Some(subpath) = subpath {
                let pkg_dir = base.join(&pkg_name);
                if directory_exists(&pkg_dir) {
                    if let Some(file) = self.resolve_export_map(&pkg_dir, &subpath)? {
                        return Ok(file);
                    }
                }
            }

            if importer.starts_with(&base) {
                // Node resolution order: nearest node_modules first
                let mut current = importer.parent();
                while let Some(dir) = current {
                    if dir == base {
                        break;
                    }
                    let candidate = dir.join("node_modules").join(dep);
                    if let Some(file) = self.resolve_file_or_directory(&candidate)? {
                        return Ok(file);
                    }
                    current = dir.parent();
                }
            }
        }

        Err(LinkerError::resolution(
            dep,
            importer,
            "not found in any base path or node_modules".to_string(),
        ))
    }

    fn resolve_file_or_directory(&mut self, path: &Path) -> Result<Option<PathBuf>> {
        if file_exists(path) {
            return Ok(Some(path.to_path_buf()));
        }
        for ext in [".js", ".json"] {
            let file = with_suffix(path, ext);
            if file_exists(&file) {
                return Ok(Some(file));
            }
        }
        if directory_exists(path) {
            return self.resolve_package(path);
        }
        Ok(None)
    }

    /// Resolve a package directory to its entry file
    pub fn resolve_package(&mut self, dir: &Path) -> Result<Option<PathBuf>> {
        let pkg = self.get_package(dir)?;

        let index = match (&pkg.module, &pkg.main) {
            (Some(module), _) if self.target.is_some() => module.clone(),
            (_, Some(main)) => main.clone(),
            _ => "index.js".to_string(),
        };

        let path = normalize(&dir.join(index));
        if file_exists(&path) {
            return Ok(Some(path));
        }
        for ext in [".js", ".json"] {
            let file = with_suffix(&path, ext);
            if file_exists(&file) {
                return Ok(Some(file));
            }
        }
        if directory_exists(&path) {
            let index = path.join("index.js");
            if file_exists(&index) {
                return Ok(Some(index));
            }
        }
        Ok(None)
    }

    fn resolve_export_map(&mut self, dir: &Path, subpath: &str) -> Result<Option<PathBuf>> {
        let pkg = self.get_package(dir)?;
        let Some(exports) = pkg.exports.as_ref().and_then(|exports| exports.as_object()) else {
            return Ok(None);
        };
        let wanted = normalize(&dir.join(subpath));

        for (key, val) in exports {
            let Some(val) = val.as_str() else {
                continue;
            };
            if normalize(&dir.join(key)) != wanted {
                continue;
            }
            let target = normalize(&dir.join(val));
            if file_exists(&target) {
                return Ok(Some(target));
            }
            let js_file = with_suffix(&target, ".js");
            if file_exists(&js_file) {
                return Ok(Some(js_file));
            }
        }
        Ok(None)
    }

    /// Read and cache package.json; a missing manifest is empty, a malformed one is an error
    pub fn get_package(&mut self, dir: &Path) -> Result<PackageJson> {
        if let Some(cached) = self.package_cache.get(dir) {
            return Ok(cached.clone());
        }

        let pkg_path = dir.join("package.json");
        let package = if file_exists(&pkg_path) {
            let content = read_file(&pkg_path)?;
            serde_json::from_str(&content).map_err(|err| {
                Logger::warn(&format!("Malformed {}: {}", pkg_path.display(), err));
                LinkerError::config(format!("malformed {}: {}", pkg_path.display(), err))
            })?
        } else {
            PackageJson::default()
        };

        self.package_cache.insert(dir.to_path_buf(), package.clone());
        Ok(package)
    }

    /// Find the base containing `file`, its base-relative path and canonical name
    pub fn locate(&mut self, file: &Path, is_js: bool) -> Result<BaseLocation> {
        let (primary, secondary) = match self.bases.split_first() {
            Some((primary, secondary)) => (primary.clone(), secondary.to_vec()),
            None => {
                return Err(LinkerError::config(format!(
                    "{} is not under any of base paths",
                    file.display()
                )))
            }
        };

        if let Ok(relative) = file.strip_prefix(&primary) {
            let base_path = to_slash(relative);
            let canonical = canonicalize(&base_path);
            return Ok(BaseLocation {
                base: primary,
                base_path,
                canonical: Some(canonical),
                esm: true,
            });
        }

        for base in secondary {
            let Ok(relative) = file.strip_prefix(&base) else {
                continue;
            };
            let base_path = to_slash(relative);

            let mut esm = false;
            let canonical = if is_js {
                let name = match self.find_package(&base, file)? {
                    Some((dir, pkg)) => {
                        esm = pkg.module_type.as_deref() == Some("module") || pkg.module.is_some();
                        let entries = [pkg.module.as_deref(), pkg.main.as_deref(), Some("index.js")];
                        let is_entry = entries.into_iter().flatten().any(|entry| {
                            let path = normalize(&dir.join(entry));
                            path == file || with_suffix(&path, ".js") == file
                        });
                        if is_entry {
                            pkg.name
                                .clone()
                                .or_else(|| dir.file_name().map(|name| name.to_string_lossy().into_owned()))
                                .unwrap_or_else(|| canonicalize(&base_path))
                        } else {
                            canonicalize(&base_path)
                        }
                    }
                    None => canonicalize(&base_path),
                };
                self.exports.contains(&name).then_some(name)
            } else {
                None
            };

            return Ok(BaseLocation {
                base,
                base_path,
                canonical,
                esm,
            });
        }

        Err(LinkerError::config(format!(
            "{} is not under any of base paths",
            file.display()
        )))
    }

    /// Nearest directory between `file` and `base` holding a package.json
    fn find_package(&mut self, base: &Path, file: &Path) -> Result<Option<(PathBuf, PackageJson)>> {
        let mut current = file.parent();
        while let Some(dir) = current {
            if dir == base || !dir.starts_with(base) {
                break;
            }
            if file_exists(&dir.join("package.json")) {
                let pkg = self.get_package(dir)?;
                return Ok(Some((dir.to_path_buf(), pkg)));
            }
            current = dir.parent();
        }
        Ok(None)
    }
}

pub fn to_slash(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

/// `models/glyph.js` -> `models/glyph`
pub fn canonicalize(base_path: &str) -> String {
    base_path
        .strip_suffix(".js")
        .unwrap_or(base_path)
        .replace('\\', "/")
}

/// Parse package specifier into package name and subpath
pub fn parse_package_specifier(specifier: &str) -> (String, Option<String>) {
    // Handle scoped packages like @babel/core
    if let Some(scoped) = specifier.strip_prefix('@') {
        if let Some(slash_pos) = scoped.find('/') {
            let after_scope = &scoped[slash_pos + 1..];
            if let Some(pos) = after_scope.find('/') {
                let name_len = 1 + slash_pos + 1 + pos;
                return (
                    specifier[..name_len].to_string(),
                    Some(specifier[name_len + 1..].to_string()),
                );
            }
        }
        return (specifier.to_string(), None);
    }

    match specifier.find('/') {
        Some(slash_pos) => (
            specifier[..slash_pos].to_string(),
            Some(specifier[slash_pos + 1..].to_string()),
        ),
        None => (specifier.to_string(), None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn touch(path: &Path, content: &str) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    #[test]
    fn test_parse_package_specifier() {
        assert_eq!(parse_package_specifier("lodash"), ("lodash".to_string(), None));
        assert_eq!(
            parse_package_specifier("lodash/fp/map"),
            ("lodash".to_string(), Some("fp/map".to_string()))
        );
        assert_eq!(parse_package_specifier("@babel/core"), ("@babel/core".to_string(), None));
        assert_eq!(
            parse_package_specifier("@babel/core/lib/index"),
            ("@babel/core".to_string(), Some("lib/index".to_string()))
        );
    }

    #[test]
    fn test_canonicalize() {
        assert_eq!(canonicalize("models/glyph.js"), "models/glyph");
        assert_eq!(canonicalize("data.json"), "data.json");
    }

    #[test]
    fn test_relative_prefers_exact_then_extension() {
        let dir = tempdir().unwrap();
        let root = dir.path().to_path_buf();
        touch(&root.join("main.js"), "");
        touch(&root.join("util.js"), "");
        touch(&root.join("data.json"), "{}");
        touch(&root.join("lib/index.js"), "");

        let mut resolver = ModuleResolver::new(vec![root.clone()], None, HashSet::new());
        let importer = root.join("main.js");
        assert_eq!(resolver.resolve("./util", &importer).unwrap(), root.join("util.js"));
        assert_eq!(resolver.resolve("./util.js", &importer).unwrap(), root.join("util.js"));
        assert_eq!(resolver.resolve("./data", &importer).unwrap(), root.join("data.json"));
        assert_eq!(resolver.resolve("./lib", &importer).unwrap(), root.join("lib/index.js"));
    }

    #[test]
    fn test_relative_ambiguity_names_both_candidates() {
        let dir = tempdir().unwrap();
        let root = dir.path().to_path_buf();
        touch(&root.join("main.js"), "");
        touch(&root.join("foo.js"), "");
        touch(&root.join("foo/index.js"), "");

        let mut resolver = ModuleResolver::new(vec![root.clone()], None, HashSet::new());
        let err = resolver.resolve("./foo", &root.join("main.js")).unwrap_err();
        let text = err.to_string();
        assert!(matches!(err, LinkerError::Resolution { .. }));
        assert!(text.contains(&root.join("foo.js").display().to_string()), "{}", text);
        assert!(text.contains(&root.join("foo/index.js").display().to_string()), "{}", text);
    }

    #[test]
    fn test_bare_uses_package_main_and_module() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("lib");
        let modules = dir.path().join("node_modules");
        touch(&root.join("main.js"), "");
        touch(&modules.join("pkg/package.json"), r#"{"main": "dist/cjs", "module": "dist/esm.js"}"#);
        touch(&modules.join("pkg/dist/cjs.js"), "");
        touch(&modules.join("pkg/dist/esm.js"), "");

        let importer = root.join("main.js");
        let mut resolver = ModuleResolver::new(vec![root.clone(), modules.clone()], None, HashSet::new());
        assert_eq!(resolver.resolve("pkg", &importer).unwrap(), modules.join("pkg/dist/cjs.js"));

        let mut resolver =
            ModuleResolver::new(vec![root, modules.clone()], Some(Target::Es2020), HashSet::new());
        assert_eq!(resolver.resolve("pkg", &importer).unwrap(), modules.join("pkg/dist/esm.js"));
    }

    #[test]
    fn test_bare_searches_bases_in_order() {
        let dir = tempdir().unwrap();
        let first = dir.path().join("first");
        let second = dir.path().join("second");
        touch(&first.join("main.js"), "");
        touch(&first.join("core/util.js"), "");
        touch(&second.join("core/util.js"), "");

        let mut resolver = ModuleResolver::new(vec![first.clone(), second], None, HashSet::new());
        assert_eq!(
            resolver.resolve("core/util", &first.join("main.js")).unwrap(),
            first.join("core/util.js")
        );
    }

    #[test]
    fn test_bare_walks_ancestor_node_modules() {
        let dir = tempdir().unwrap();
        let base = dir.path().to_path_buf();
        touch(&base.join("app/src/deep/main.js"), "");
        touch(&base.join("app/node_modules/near/index.js"), "");
        touch(&base.join("app/src/node_modules/nearest/package.json"), r#"{"main": "lib.js"}"#);
        touch(&base.join("app/src/node_modules/nearest/lib.js"), "");

        let importer = base.join("app/src/deep/main.js");
        let mut resolver = ModuleResolver::new(vec![base.clone()], None, HashSet::new());
        assert_eq!(
            resolver.resolve("near", &importer).unwrap(),
            base.join("app/node_modules/near/index.js")
        );
        assert_eq!(
            resolver.resolve("nearest", &importer).unwrap(),
            base.join("app/src/node_modules/nearest/lib.js")
        );
    }

    #[test]
    fn test_bare_miss_names_specifier_and_importer() {
        let dir = tempdir().unwrap();
        let root = dir.path().to_path_buf();
        touch(&root.join("main.js"), "");

        let importer = root.join("main.js");
        let mut resolver = ModuleResolver::new(vec![root], None, HashSet::new());
        let err = resolver.resolve("nowhere", &importer).unwrap_err();
        let text = err.to_string();
        assert!(text.contains("'nowhere'"));
        assert!(text.contains(&importer.display().to_string()));
    }

    #[test]
    fn test_export_map_subpath() {
        let dir = tempdir().unwrap();
        let base = dir.path().to_path_buf();
        touch(&base.join("main.js"), "");
        touch(&base.join("pkg/package.json"), r#"{"exports": {"./feature": "./lib/feature.js"}}"#);
        touch(&base.join("pkg/lib/feature.js"), "");

        let mut resolver = ModuleResolver::new(vec![base.clone()], None, HashSet::new());
        assert_eq!(
            resolver.resolve("pkg/feature", &base.join("main.js")).unwrap(),
            base.join("pkg/lib/feature.js")
        );
    }

    #[test]
    fn test_locate_primary_and_secondary_bases() {
        let dir = tempdir().unwrap();
        let lib = dir.path().join("lib");
        let modules = dir.path().join("node_modules");
        touch(&lib.join("models/glyph.js"), "");
        touch(&modules.join("tslib/package.json"), r#"{"name": "tslib", "module": "tslib.es6.js"}"#);
        touch(&modules.join("tslib/tslib.es6.js"), "");
        touch(&modules.join("other/x.js"), "");

        let exports: HashSet<String> = ["tslib".to_string()].into_iter().collect();
        let mut resolver = ModuleResolver::new(vec![lib.clone(), modules.clone()], None, exports);

        let primary = resolver.locate(&lib.join("models/glyph.js"), true).unwrap();
        assert_eq!(primary.base_path, "models/glyph.js");
        assert_eq!(primary.canonical.as_deref(), Some("models/glyph"));
        assert!(primary.esm);

        let exported = resolver.locate(&modules.join("tslib/tslib.es6.js"), true).unwrap();
        assert_eq!(exported.base, modules);
        assert_eq!(exported.canonical.as_deref(), Some("tslib"));
        assert!(exported.esm);

        let internal = resolver.locate(&modules.join("other/x.js"), true).unwrap();
        assert_eq!(internal.canonical, None);
        assert!(!internal.esm);

        assert!(resolver.locate(&dir.path().join("elsewhere.js"), true).is_err());
    }

    #[test]
    fn test_malformed_package_json_is_an_error() {
        let dir = tempdir().unwrap();
        let root = dir.path().to_path_buf();
        touch(&root.join("main.js"), "");
        touch(&root.join("pkg/package.json"), "{ \"main\": ");
        touch(&root.join("pkg/index.js"), "");

        let mut resolver = ModuleResolver::new(vec![root.clone()], None, HashSet::new());
        let err = resolver.resolve("./pkg", &root.join("main.js")).unwrap_err();
        assert!(matches!(err, LinkerError::Configuration(_)));
        assert!(err.to_string().contains("package.json"), "{}", err);
    }

    #[test]
    fn test_external_policy() {
        let config = LinkerConfig {
            externals: vec!["jquery".to_string()],
            external_patterns: vec!["^@host/".to_string()],
            shims: vec!["fs".to_string()],
            builtins: true,
            ..LinkerConfig::default()
        };
        let policy = ExternalPolicy::from_config(&config)
            .unwrap()
            .with_excluded(Arc::new(|dep: &str| dep.ends_with(".wasm")));

        assert_eq!(policy.classify("jquery"), DependencyKind::External);
        assert_eq!(policy.classify("@host/api"), DependencyKind::External);
        assert_eq!(policy.classify("path"), DependencyKind::External);
        assert_eq!(policy.classify("module.wasm"), DependencyKind::External);
        assert_eq!(policy.classify("fs"), DependencyKind::Shim);
        assert_eq!(policy.classify("./local"), DependencyKind::Internal);
    }
}
