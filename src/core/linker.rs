use crate::config::LinkerConfig;
use crate::core::bundle::Bundle;
use crate::core::cache::{CodeSettings, LinkerCache};
use crate::core::graph::{Discovery, ModuleGraph};
use crate::core::interfaces::CodeMinifier;
use crate::core::models::{
    AssemblyKind, LinkStats, ModuleArtifact, ModuleCode, ModuleId, ModuleIdx, ModuleInfo, ModuleKind,
    ModuleRecord, PreludeKind, SPARSE_ID_LENGTH,
};
use crate::infrastructure::file_system::{absolute, directory_exists, file_exists};
use crate::infrastructure::node_resolver::{ExcludedPredicate, ExternalPolicy, ModuleResolver};
use crate::infrastructure::processors::minifier::OxcMinifier;
use crate::infrastructure::processors::syntax::parse_module;
use crate::infrastructure::processors::transforms::{transform, TransformContext};
use crate::utils::{LinkerError, Logger, Result, Timer};
use rayon::prelude::*;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

/// Result of one `link()` pass
#[derive(Debug)]
pub struct LinkOutput {
    /// Main bundle first, then one per plugin entry
    pub bundles: Vec<Bundle>,
    /// False when cycle detection reported problems
    pub status: bool,
    pub stats: LinkStats,
}

/// Modules of one bundle with its layout
struct Partition {
    entry: ModuleIdx,
    modules: Vec<ModuleIdx>,
    assembly: AssemblyKind,
    prelude: PreludeKind,
}

/// Per-module decision taken before the transform batch
struct Job {
    idx: ModuleIdx,
    dependency_ids: BTreeMap<String, ModuleId>,
    reason: Option<&'static str>,
}

pub struct Linker {
    config: LinkerConfig,
    entries: Vec<PathBuf>,
    excludes: Vec<PathBuf>,
    resolver: ModuleResolver,
    policy: ExternalPolicy,
    cache: LinkerCache,
    minifier: Box<dyn CodeMinifier>,
}

impl Linker {
    /// Validate the configuration eagerly; entries and bases must exist
    pub fn new(config: LinkerConfig) -> Result<Self> {
        if config.entries.is_empty() {
            return Err(LinkerError::config("at least one entry is required".to_string()));
        }
        if config.bases.is_empty() {
            return Err(LinkerError::config("at least one base directory is required".to_string()));
        }

        let entries: Vec<PathBuf> = config.entries.iter().map(|entry| absolute(entry)).collect();
        for entry in &entries {
            if !file_exists(entry) {
                return Err(LinkerError::config(format!("entry {} does not exist", entry.display())));
            }
        }

        let bases: Vec<PathBuf> = config.bases.iter().map(|base| absolute(base)).collect();
        for base in &bases {
            if !directory_exists(base) {
                return Err(LinkerError::config(format!(
                    "base directory {} does not exist",
                    base.display()
                )));
            }
        }

        let excludes = config.excludes.iter().map(|exclude| absolute(exclude)).collect();
        let policy = ExternalPolicy::from_config(&config)?;
        let resolver = ModuleResolver::new(bases, config.target, config.exports.iter().cloned().collect());
        let cache = LinkerCache::new(CodeSettings::from_config(&config));

        Ok(Self {
            config,
            entries,
            excludes,
            resolver,
            policy,
            cache,
            minifier: Box::new(OxcMinifier::new()),
        })
    }

    /// Treat specifiers matching `predicate` as externals
    pub fn with_excluded(mut self, predicate: ExcludedPredicate) -> Self {
        self.policy = self.policy.with_excluded(predicate);
        self
    }

    pub fn with_minifier(mut self, minifier: Box<dyn CodeMinifier>) -> Self {
        self.minifier = minifier;
        self
    }

    pub fn config(&self) -> &LinkerConfig {
        &self.config
    }

    pub fn cache(&self) -> &LinkerCache {
        &self.cache
    }

    /// Load the configured cache file; a missing, stale or differently configured cache means a cold link
    pub fn load_cache(&mut self) {
        if let Some(path) = &self.config.cache {
            self.cache = LinkerCache::load(path, CodeSettings::from_config(&self.config));
        }
    }

    pub fn store_cache(&self) -> Result<()> {
        match &self.config.cache {
            Some(path) => self.cache.store(path),
            None => Ok(()),
        }
    }

    /// Resolve, partition, assign ids, reuse or compile every module, then replace the cache
    pub fn link(&mut self) -> Result<LinkOutput> {
        let timer = Timer::start("link");
        Logger::link_start(self.entries.len(), self.resolver.bases().len());

        let mut graph = {
            let mut discovery = Discovery {
                resolver: &mut self.resolver,
                policy: &self.policy,
                cache: &self.cache,
                excludes: &self.excludes,
                overrides: &self.config.overrides,
                transpile: self.config.target.is_some(),
            };
            ModuleGraph::build(&self.entries, &mut discovery)?
        };
        Logger::discovered(graph.len(), graph.changed_count());

        let mut status = true;
        if self.config.detect_cycles {
            for cycle in graph.detect_cycles() {
                let names: Vec<&str> = cycle.iter().map(|idx| graph.get(*idx).name()).collect();
                Logger::warn(&format!("Circular dependency: {}", names.join(" -> ")));
                status = false;
            }
        }

        let partitions = self.partition(&graph)?;
        assign_ids(&mut graph, &partitions);

        let jobs: Vec<Job> = partitions
            .iter()
            .flat_map(|partition| partition.modules.iter())
            .map(|&idx| self.plan(&graph, idx))
            .collect();

        let compile = |job: &Job| -> Result<Option<ModuleCode>> {
            match job.reason {
                Some(reason) => self.compile(graph.get(job.idx), &job.dependency_ids, reason).map(Some),
                None => Ok(None),
            }
        };
        let compiled: Vec<Option<ModuleCode>> = if self.config.parallel {
            jobs.par_iter().map(compile).collect::<Result<_>>()?
        } else {
            jobs.iter().map(compile).collect::<Result<_>>()?
        };

        let mut stats = LinkStats::default();
        let mut artifacts: BTreeMap<ModuleIdx, ModuleArtifact> = BTreeMap::new();
        for (job, code) in jobs.into_iter().zip(compiled) {
            let module = graph.get(job.idx);
            let code = match code {
                Some(code) => {
                    stats.transformed += 1;
                    code
                }
                None => {
                    stats.reused += 1;
                    Logger::reusing_module(module.name());
                    self.cached_code(&module.file)?
                }
            };
            let record = record(module, job.dependency_ids)?;
            artifacts.insert(job.idx, ModuleArtifact { module: record, code });
        }

        let mut bundles = Vec::with_capacity(partitions.len());
        for partition in &partitions {
            let entry = artifacts
                .get(&partition.entry)
                .map(|artifact| artifact.module.clone())
                .ok_or_else(|| LinkerError::config("bundle entry was not linked".to_string()))?;
            let bundle_artifacts: Vec<ModuleArtifact> = partition
                .modules
                .iter()
                .filter_map(|idx| artifacts.get(idx).cloned())
                .collect();

            Logger::bundle_partition(&entry.base_path, bundle_artifacts.len());
            bundles.push(Bundle {
                entry,
                artifacts: bundle_artifacts,
                builtins: self.config.builtins,
                assembly: partition.assembly,
                prelude: partition.prelude,
                entry_alias: self.config.entry_alias.clone(),
            });
        }

        self.cache.replace(artifacts.into_values());

        Logger::link_complete(bundles.len(), stats.transformed, stats.reused, timer.elapsed());
        Ok(LinkOutput {
            bundles,
            status,
            stats,
        })
    }

    /// Main bundle excludes plugin directories; each plugin excludes what earlier bundles claimed
    fn partition(&self, graph: &ModuleGraph) -> Result<Vec<Partition>> {
        let lookup = |entry: &Path| {
            graph
                .lookup(entry)
                .ok_or_else(|| LinkerError::config(format!("entry {} is excluded", entry.display())))
        };

        let main_entry = lookup(&self.entries[0])?;
        let plugin_dirs: Vec<&Path> = self.entries[1..].iter().filter_map(|entry| entry.parent()).collect();

        let main_modules = graph.reachable(main_entry, |idx, module| {
            idx != main_entry && plugin_dirs.iter().any(|dir| module.file.starts_with(dir))
        });

        let (assembly, prelude) = if self.config.plugin {
            (AssemblyKind::Sparse, PreludeKind::Plugin)
        } else {
            (AssemblyKind::Dense, PreludeKind::Main)
        };

        let mut claimed: HashSet<ModuleIdx> = main_modules.iter().copied().collect();
        let mut partitions = vec![Partition {
            entry: main_entry,
            modules: main_modules,
            assembly,
            prelude,
        }];

        for entry in &self.entries[1..] {
            let plugin_entry = lookup(entry)?;
            let modules = graph.reachable(plugin_entry, |idx, _| claimed.contains(&idx));
            claimed.extend(modules.iter().copied());
            partitions.push(Partition {
                entry: plugin_entry,
                modules,
                assembly: AssemblyKind::Sparse,
                prelude: PreludeKind::Plugin,
            });
        }

        Ok(partitions)
    }

    /// Decide whether a module must be compiled again
    fn plan(&self, graph: &ModuleGraph, idx: ModuleIdx) -> Job {
        let module = graph.get(idx);
        let dependency_ids: BTreeMap<String, ModuleId> = module
            .dependencies
            .iter()
            .filter_map(|(name, dep)| graph.get(*dep).id.clone().map(|id| (name.clone(), id)))
            .collect();

        let reason = if module.changed {
            Some("changed")
        } else {
            match self.cache.get(&module.file) {
                None => Some("not cached"),
                Some(cached) if cached.module.dependency_map != dependency_ids => Some("dependency ids changed"),
                Some(_) => None,
            }
        };

        Job {
            idx,
            dependency_ids,
            reason,
        }
    }

    fn compile(
        &self,
        module: &ModuleInfo,
        dependency_ids: &BTreeMap<String, ModuleId>,
        reason: &str,
    ) -> Result<ModuleCode> {
        Logger::compiling_module(module.name(), reason);

        let parsed;
        let syntax = match (&module.syntax, module.kind) {
            (Some(syntax), _) => Some(syntax),
            (None, ModuleKind::Js) => {
                parsed = parse_module(&module.file, &module.source)?;
                Some(&parsed)
            }
            (None, _) => None,
        };

        let ctx = TransformContext {
            file: &module.file,
            base_path: &module.base_path,
            source: &module.source,
            syntax,
            dependency_ids,
        };
        let transformed = transform(module.kind, self.config.apply_transforms, &ctx)?;

        let (min_source, min_map) = if self.config.minify {
            let minified = self.minifier.minify(&module.file, &transformed.source)?;
            (minified.code, minified.map)
        } else {
            (transformed.source.clone(), Some(transformed.map.clone()))
        };

        Ok(ModuleCode {
            source: transformed.source,
            map: Some(transformed.map),
            min_source,
            min_map,
        })
    }

    fn cached_code(&self, file: &Path) -> Result<ModuleCode> {
        self.cache
            .get(file)
            .map(|cached| cached.code.clone())
            .ok_or_else(|| LinkerError::CacheFormat(format!("no cached code for {}", file.display())))
    }
}

/// Dense ids follow partition order; sparse ids are hash prefixes, unique across the link
fn assign_ids(graph: &mut ModuleGraph, partitions: &[Partition]) {
    let mut used: HashSet<String> = HashSet::new();

    for partition in partitions {
        for (position, &idx) in partition.modules.iter().enumerate() {
            let id = match partition.assembly {
                AssemblyKind::Dense => ModuleId::Dense(position),
                AssemblyKind::Sparse => ModuleId::Sparse(sparse_id(&graph.get(idx).hash, &mut used)),
            };
            graph.get_mut(idx).id = Some(id);
        }
    }
}

/// Shortest unused prefix of at least `SPARSE_ID_LENGTH` chars, suffixed when the hash itself repeats
fn sparse_id(hash: &str, used: &mut HashSet<String>) -> String {
    let mut length = SPARSE_ID_LENGTH.min(hash.len());
    loop {
        let candidate = &hash[..length];
        if !used.contains(candidate) {
            used.insert(candidate.to_string());
            return candidate.to_string();
        }
        if length == hash.len() {
            break;
        }
        length += 1;
    }

    let mut counter = 1;
    loop {
        let candidate = format!("{}-{}", hash, counter);
        if used.insert(candidate.clone()) {
            return candidate;
        }
        counter += 1;
    }
}

fn record(module: &ModuleInfo, dependency_map: BTreeMap<String, ModuleId>) -> Result<ModuleRecord> {
    let id = module
        .id
        .clone()
        .ok_or_else(|| LinkerError::config(format!("module {} has no id", module.base_path)))?;

    Ok(ModuleRecord {
        file: module.file.clone(),
        base: module.base.clone(),
        base_path: module.base_path.clone(),
        canonical: module.canonical.clone(),
        id,
        hash: module.hash.clone(),
        kind: module.kind,
        dependency_map,
        dependency_paths: module.dependency_paths.clone(),
        externals: module.externals.clone(),
        shims: module.shims.clone(),
    })
}
