mod common;

use common::{artifact, Fixture};
use soku_linker::core::cache::CodeSettings;
use soku_linker::{Linker, LinkerCache};

fn tree() -> Fixture {
    Fixture::new(&[
        ("main.js", "require(\"./a\");\nrequire(\"./b\");\n"),
        ("a.js", "const leaf = require(\"./leaf\");\nexports.a = leaf.value;\n"),
        ("b.js", "exports.b = \"sibling\";\n"),
        ("leaf.js", "exports.value = 1;\n"),
    ])
}

#[test]
fn test_warm_link_is_idempotent() {
    let fixture = tree();
    let mut linker = Linker::new(fixture.config(&["main.js"])).unwrap();

    let cold = linker.link().unwrap();
    assert_eq!(cold.stats.transformed, 4);
    assert_eq!(cold.stats.reused, 0);

    let warm = linker.link().unwrap();
    assert_eq!(warm.stats.transformed, 0);
    assert_eq!(warm.stats.reused, 4);

    let first = cold.bundles[0].assemble(false).unwrap();
    let second = warm.bundles[0].assemble(false).unwrap();
    assert_eq!(first, second);
    assert_eq!(cold.bundles[0].assemble(true).unwrap(), warm.bundles[0].assemble(true).unwrap());
}

#[test]
fn test_persisted_cache_survives_a_new_linker() {
    let fixture = tree();
    let mut config = fixture.config(&["main.js"]);
    config.cache = Some(fixture.path(".cache/linker.json"));

    let mut linker = Linker::new(config.clone()).unwrap();
    let cold = linker.link().unwrap();
    linker.store_cache().unwrap();

    let mut linker = Linker::new(config).unwrap();
    linker.load_cache();
    assert_eq!(linker.cache().len(), 4);

    let warm = linker.link().unwrap();
    assert_eq!(warm.stats.transformed, 0);
    assert_eq!(
        cold.bundles[0].assemble(false).unwrap().source,
        warm.bundles[0].assemble(false).unwrap().source
    );
}

#[test]
fn test_leaf_change_in_dense_bundle_recompiles_only_the_leaf() {
    let fixture = tree();
    let mut linker = Linker::new(fixture.config(&["main.js"])).unwrap();
    let cold = linker.link().unwrap();
    let old_hash = artifact(&cold.bundles[0], "leaf.js").module.hash.clone();

    fixture.write("leaf.js", "exports.value = 2;\n");
    let warm = linker.link().unwrap();

    assert_eq!(warm.stats.transformed, 1);
    let leaf = artifact(&warm.bundles[0], "leaf.js");
    assert_ne!(leaf.module.hash, old_hash);
    assert!(leaf.code.source.contains("exports.value = 2;"));
}

#[test]
fn test_leaf_change_in_sparse_bundle_recompiles_ancestors_with_new_ids() {
    let fixture = tree();
    let mut config = fixture.config(&["main.js"]);
    config.plugin = true;

    let mut linker = Linker::new(config).unwrap();
    let cold = linker.link().unwrap();
    let old_a = artifact(&cold.bundles[0], "a.js").clone();
    let old_b = artifact(&cold.bundles[0], "b.js").clone();
    let old_main = artifact(&cold.bundles[0], "main.js").clone();

    fixture.write("leaf.js", "exports.value = 2;\n");
    let warm = linker.link().unwrap();

    // leaf (new content) and a (new id for ./leaf)
    assert_eq!(warm.stats.transformed, 2);
    assert_eq!(warm.stats.reused, 2);

    let a = artifact(&warm.bundles[0], "a.js");
    assert_ne!(a.module.dependency_map, old_a.module.dependency_map);
    assert_ne!(a.code.source, old_a.code.source);
    assert_eq!(a.module.id, old_a.module.id);

    assert_eq!(artifact(&warm.bundles[0], "b.js").code, old_b.code);
    assert_eq!(artifact(&warm.bundles[0], "main.js").code, old_main.code);
}

#[test]
fn test_stale_cache_version_forces_a_cold_link() {
    let fixture = tree();
    let cache_path = fixture.path("linker-cache.json");
    let mut config = fixture.config(&["main.js"]);
    config.cache = Some(cache_path.clone());

    let mut linker = Linker::new(config.clone()).unwrap();
    linker.link().unwrap();
    linker.store_cache().unwrap();

    let mut stored: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&cache_path).unwrap()).unwrap();
    stored["version"] = serde_json::json!(0);
    std::fs::write(&cache_path, stored.to_string()).unwrap();
    assert!(LinkerCache::load(&cache_path, CodeSettings::from_config(&config)).is_empty());

    let mut linker = Linker::new(config).unwrap();
    linker.load_cache();
    let relinked = linker.link().unwrap();
    assert_eq!(relinked.stats.transformed, 4);
}

#[test]
fn test_changed_code_settings_force_a_cold_link() {
    let fixture = Fixture::new(&[
        ("main.js", "const helperWithLongName = require(\"./a\");\nexports.x = helperWithLongName.a;\n"),
        ("a.js", "exports.a = 1;\n"),
    ]);
    let cache_path = fixture.path("linker-cache.json");
    let mut config = fixture.config(&["main.js"]);
    config.cache = Some(cache_path.clone());

    let mut linker = Linker::new(config.clone()).unwrap();
    let plain = linker.link().unwrap();
    assert!(artifact(&plain.bundles[0], "main.js").code.min_source.contains("helperWithLongName"));
    linker.store_cache().unwrap();

    config.minify = true;
    let mut linker = Linker::new(config.clone()).unwrap();
    linker.load_cache();
    assert!(linker.cache().is_empty());

    let minified = linker.link().unwrap();
    assert_eq!(minified.stats.transformed, 2);
    assert_eq!(minified.stats.reused, 0);
    assert!(!artifact(&minified.bundles[0], "main.js").code.min_source.contains("helperWithLongName"));
    assert!(!minified.bundles[0].assemble(true).unwrap().source.contains("helperWithLongName"));
    linker.store_cache().unwrap();

    let mut linker = Linker::new(config).unwrap();
    linker.load_cache();
    assert_eq!(linker.cache().len(), 2);
    assert_eq!(linker.link().unwrap().stats.reused, 2);
}

#[test]
fn test_new_dependency_is_discovered_on_relink() {
    let fixture = tree();
    let mut linker = Linker::new(fixture.config(&["main.js"])).unwrap();
    linker.link().unwrap();

    fixture.write("b.js", "require(\"./c\");\nexports.b = \"sibling\";\n");
    fixture.write("c.js", "exports.c = 3;\n");
    let output = linker.link().unwrap();

    assert_eq!(output.bundles[0].artifacts.len(), 5);
    assert_eq!(output.stats.transformed, 2);
    assert!(artifact(&output.bundles[0], "b.js").code.source.contains("require(4 /* ./c */)"));
}
