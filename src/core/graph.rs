use crate::core::cache::LinkerCache;
use crate::core::models::{ModuleIdx, ModuleInfo, ModuleKind};
use crate::infrastructure::file_system::read_file;
use crate::infrastructure::node_resolver::{to_slash, DependencyKind, ExternalPolicy, ModuleResolver};
use crate::infrastructure::processors::esm::to_commonjs;
use crate::infrastructure::processors::syntax::parse_module;
use crate::utils::{Logger, Result};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};

/// Everything module discovery reads from the linker
pub struct Discovery<'a> {
    pub resolver: &'a mut ModuleResolver,
    pub policy: &'a ExternalPolicy,
    pub cache: &'a LinkerCache,
    pub excludes: &'a [PathBuf],
    /// Path suffix -> replacement source
    pub overrides: &'a BTreeMap<String, String>,
    /// Rewrite ES modules to CommonJS (a transpile target is configured)
    pub transpile: bool,
}

impl Discovery<'_> {
    pub fn is_excluded(&self, file: &Path) -> bool {
        self.excludes.iter().any(|excluded| file.starts_with(excluded))
    }

    fn read_source(&self, file: &Path) -> Result<String> {
        let slashed = to_slash(file);
        for (suffix, replacement) in self.overrides {
            if slashed.ends_with(suffix.as_str()) {
                Logger::debug(&format!("Overriding source of {}", slashed));
                return Ok(replacement.clone());
            }
        }
        read_file(file)
    }

    /// Create the module for `file`, reusing cached dependency data when its hash matches
    pub fn new_module(&mut self, file: &Path) -> Result<ModuleInfo> {
        let kind = ModuleKind::from_path(file)?;
        let mut source = self.read_source(file)?;
        let hash = LinkerCache::compute_content_hash(source.as_bytes());
        let location = self.resolver.locate(file, kind == ModuleKind::Js)?;

        if self.transpile && location.esm && kind == ModuleKind::Js {
            if let Some(converted) = to_commonjs(file, &source)? {
                Logger::debug(&format!("Rewrote ES module {} to CommonJS", location.base_path));
                source = converted;
            }
        }

        let mut module = ModuleInfo {
            file: file.to_path_buf(),
            base: location.base,
            base_path: location.base_path,
            canonical: location.canonical,
            id: None,
            hash,
            changed: true,
            kind,
            source,
            syntax: None,
            dependency_paths: BTreeMap::new(),
            dependencies: BTreeMap::new(),
            externals: BTreeSet::new(),
            shims: BTreeSet::new(),
        };

        if let Some(cached) = self.cache.get(file).filter(|cached| cached.module.hash == module.hash) {
            module.changed = false;
            module.dependency_paths = cached.module.dependency_paths.clone();
            module.externals = cached.module.externals.clone();
            module.shims = cached.module.shims.clone();
            return Ok(module);
        }

        if kind == ModuleKind::Js {
            let syntax = parse_module(file, &module.source)?;
            for dep in syntax.dependencies() {
                match self.policy.classify(&dep) {
                    DependencyKind::External => {
                        module.externals.insert(dep);
                    }
                    DependencyKind::Shim => {
                        module.shims.insert(dep);
                    }
                    DependencyKind::Internal => {
                        let path = self.resolver.resolve(&dep, file)?;
                        module.dependency_paths.insert(dep, path);
                    }
                }
            }
            module.syntax = Some(syntax);
        }

        Ok(module)
    }
}

/// Arena of modules keyed by absolute path
#[derive(Debug, Default)]
pub struct ModuleGraph {
    modules: Vec<ModuleInfo>,
    index: HashMap<PathBuf, ModuleIdx>,
}

impl ModuleGraph {
    /// Discover every module reachable from `entries`, then wire dependency edges
    pub fn build(entries: &[PathBuf], discovery: &mut Discovery<'_>) -> Result<Self> {
        let mut graph = Self::default();
        let mut pending: VecDeque<PathBuf> = entries.iter().cloned().collect();

        while let Some(file) = pending.pop_front() {
            if graph.index.contains_key(&file) || discovery.is_excluded(&file) {
                continue;
            }

            let module = discovery.new_module(&file)?;
            for path in module.dependency_paths.values().rev() {
                if !graph.index.contains_key(path) {
                    pending.push_front(path.clone());
                }
            }
            graph.insert(module);
        }

        graph.wire();
        Ok(graph)
    }

    fn insert(&mut self, module: ModuleInfo) -> ModuleIdx {
        let idx = self.modules.len();
        self.index.insert(module.file.clone(), idx);
        self.modules.push(module);
        idx
    }

    /// Paths without a module (excluded) stay unwired
    fn wire(&mut self) {
        for idx in 0..self.modules.len() {
            let dependencies: BTreeMap<String, ModuleIdx> = self.modules[idx]
                .dependency_paths
                .iter()
                .filter_map(|(name, path)| self.index.get(path).map(|dep| (name.clone(), *dep)))
                .collect();
            self.modules[idx].dependencies = dependencies;
        }
    }

    pub fn lookup(&self, file: &Path) -> Option<ModuleIdx> {
        self.index.get(file).copied()
    }

    pub fn get(&self, idx: ModuleIdx) -> &ModuleInfo {
        &self.modules[idx]
    }

    pub fn get_mut(&mut self, idx: ModuleIdx) -> &mut ModuleInfo {
        &mut self.modules[idx]
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    pub fn changed_count(&self) -> usize {
        self.modules.iter().filter(|module| module.changed).count()
    }

    /// Depth-first pre-order from `root`, not descending into excluded modules
    pub fn reachable<F>(&self, root: ModuleIdx, is_excluded: F) -> Vec<ModuleIdx>
    where
        F: Fn(ModuleIdx, &ModuleInfo) -> bool,
    {
        let mut visited = HashSet::new();
        let mut order = Vec::new();
        let mut pending = VecDeque::from([root]);

        while let Some(idx) = pending.pop_front() {
            let module = &self.modules[idx];
            if visited.contains(&idx) || is_excluded(idx, module) {
                continue;
            }
            visited.insert(idx);
            order.push(idx);

            for dep in module.dependencies.values().rev() {
                if !visited.contains(dep) {
                    pending.push_front(*dep);
                }
            }
        }

        order
    }

    /// Strongly connected components among canonical modules that form a cycle
    pub fn detect_cycles(&self) -> Vec<Vec<ModuleIdx>> {
        let mut tarjan = Tarjan {
            graph: self,
            next_index: 0,
            indices: HashMap::new(),
            lowlinks: HashMap::new(),
            stack: Vec::new(),
            on_stack: HashSet::new(),
            cycles: Vec::new(),
        };

        for idx in 0..self.modules.len() {
            if self.modules[idx].canonical.is_some() && !tarjan.indices.contains_key(&idx) {
                tarjan.visit(idx);
            }
        }

        tarjan.cycles
    }
}

struct Tarjan<'g> {
    graph: &'g ModuleGraph,
    next_index: usize,
    indices: HashMap<ModuleIdx, usize>,
    lowlinks: HashMap<ModuleIdx, usize>,
    stack: Vec<ModuleIdx>,
    on_stack: HashSet<ModuleIdx>,
    cycles: Vec<Vec<ModuleIdx>>,
}

impl Tarjan<'_> {
    fn visit(&mut self, idx: ModuleIdx) {
        self.indices.insert(idx, self.next_index);
        self.lowlinks.insert(idx, self.next_index);
        self.next_index += 1;
        self.stack.push(idx);
        self.on_stack.insert(idx);

        let graph = self.graph;
        let module = graph.get(idx);
        for &dep in module.dependencies.values() {
            if graph.get(dep).canonical.is_none() {
                continue;
            }
            if !self.indices.contains_key(&dep) {
                self.visit(dep);
                let low = self.lowlinks[&idx].min(self.lowlinks[&dep]);
                self.lowlinks.insert(idx, low);
            } else if self.on_stack.contains(&dep) {
                let low = self.lowlinks[&idx].min(self.indices[&dep]);
                self.lowlinks.insert(idx, low);
            }
        }

        if self.lowlinks[&idx] == self.indices[&idx] {
            let mut component = Vec::new();
            while let Some(member) = self.stack.pop() {
                self.on_stack.remove(&member);
                component.push(member);
                if member == idx {
                    break;
                }
            }

            let self_loop = module.dependencies.values().any(|dep| *dep == idx);
            if component.len() > 1 || self_loop {
                component.reverse();
                self.cycles.push(component);
            }
        }
    }
}
