// Runtime loader templates prepended to assembled bundles.
//
// A bundle is `<prelude>(<modules>, <entry>, <aliases>, <externals>);\n})\n`, so each
// template ends with the loader function expression that the module table is applied to.

use crate::core::models::PreludeKind;

const ENTRY_ALIAS_PLACEHOLDER: &str = "__ENTRY_ALIAS__";

const MAIN_PRELUDE: &str = r#"(function(root, factory) {
  const bokeh = factory();
  if (typeof root.Bokeh === "undefined" || root.Bokeh.register_plugin == null) {
    root.Bokeh = bokeh;
  }
})(this, function() {
  const parent_require = typeof require === "function" ? require : null;
  return (function(modules, entry, aliases, externals) {
    if (aliases == null) aliases = {};
    if (externals == null) externals = {};
    const cache = {};

    function normalize(name) {
      if (typeof name === "number")
        return name;
      if (name === __ENTRY_ALIAS__)
        return entry;
      const alias = aliases[name];
      if (alias != null)
        return alias;
      const index = aliases[name.replace(/\/$/, "") + "/index"];
      if (index != null)
        return index;
      return name;
    }

    function not_found(name) {
      const error = new Error("Cannot find module '" + name + "'");
      error.code = "MODULE_NOT_FOUND";
      return error;
    }

    function require(name) {
      const id = normalize(name);
      const cached = cache[id];
      if (cached != null)
        return cached.exports;

      const factory = modules[id];
      if (factory == null) {
        if (Object.prototype.hasOwnProperty.call(externals, id)) {
          if (externals[id] === false)
            return {};
          if (parent_require != null)
            return parent_require(id);
        }
        throw not_found(name);
      }

      const module = {id: id, exports: {}, loaded: false};
      cache[id] = module;

      function __esModule() {
        Object.defineProperty(module.exports, "__esModule", {value: true});
      }
      function __esExport(name, value) {
        Object.defineProperty(module.exports, name, {enumerable: true, get: function() { return value; }});
      }

      factory.call(module.exports, require, module, module.exports, __esModule, __esExport);
      module.loaded = true;
      return module.exports;
    }

    const main = require(entry);
    main.require = require;

    main.register_plugin = function(plugin_modules, plugin_entry, plugin_aliases, plugin_externals) {
      for (const id in plugin_modules)
        modules[id] = plugin_modules[id];
      for (const name in plugin_aliases)
        aliases[name] = plugin_aliases[name];
      for (const name in plugin_externals)
        externals[name] = plugin_externals[name];

      const plugin = require(plugin_entry);
      for (const name of Object.keys(plugin))
        main[name] = plugin[name];
      return plugin;
    };

    return main;
  })"#;

const PLUGIN_PRELUDE: &str = r#"(function(root, factory) {
  factory(root.Bokeh);
})(this, function(Bokeh) {
  return (function(modules, entry, aliases, externals) {
    if (Bokeh == null || Bokeh.register_plugin == null)
      throw new Error("Cannot find Bokeh. You have to load it prior to loading plugins.");
    return Bokeh.register_plugin(modules, entry, aliases, externals);
  })"#;

/// Loader template for a bundle
pub fn prelude(kind: PreludeKind, entry_alias: &str) -> String {
    match kind {
        PreludeKind::Main => {
            let alias = serde_json::Value::String(entry_alias.to_string()).to_string();
            MAIN_PRELUDE.replace(ENTRY_ALIAS_PLACEHOLDER, &alias)
        }
        PreludeKind::Plugin => PLUGIN_PRELUDE.to_string(),
    }
}

/// Closing text after the module table and its arguments
pub fn postlude() -> &'static str {
    "\n})\n"
}
