// ES module -> CommonJS rewriting for ESM files linked under a transpile target.
//
// Every statement is replaced in place and keeps its line, so the line map of the
// rewritten text still points at the original file.

use crate::infrastructure::processors::transforms::{apply_edits, Edit};
use crate::utils::{LinkerError, Logger, Result};
use oxc_allocator::Allocator;
use oxc_ast::ast::{
    BindingPatternKind, Declaration, ExportAllDeclaration, ExportDefaultDeclaration,
    ExportDefaultDeclarationKind, ExportNamedDeclaration, ImportDeclaration, ImportDeclarationSpecifier,
    Statement, StringLiteral,
};
use oxc_parser::Parser;
use oxc_span::{GetSpan, SourceType, Span};
use std::path::Path;

const ES_MODULE_MARKER: &str = r#"Object.defineProperty(exports, "__esModule", { value: true });"#;

/// Rewrite `import` and `export` into `require` and `exports`.
///
/// Returns `None` when the source has no module syntax or does not parse as a module;
/// the CommonJS parse that follows reports real syntax errors.
pub fn to_commonjs(file: &Path, source: &str) -> Result<Option<String>> {
    let allocator = Allocator::default();
    let ret = Parser::new(&allocator, source, SourceType::mjs()).parse();
    if !ret.errors.is_empty() {
        Logger::debug(&format!("{} does not parse as an ES module", file.display()));
        return Ok(None);
    }

    let mut rewriter = Rewriter {
        file,
        source,
        edits: Vec::new(),
        exports: Vec::new(),
        imports: 0,
    };
    let mut module_syntax = false;
    for statement in &ret.program.body {
        module_syntax |= rewriter.statement(statement)?;
    }
    if !module_syntax {
        return Ok(None);
    }

    let mut prologue = ES_MODULE_MARKER.to_string();
    if !rewriter.exports.is_empty() {
        // getters keep exported bindings live
        let getters: Vec<String> = rewriter
            .exports
            .iter()
            .map(|(name, local)| format!("{}: {{ enumerable: true, get: () => {} }}", quote(name), local))
            .collect();
        prologue.push_str(&format!(" Object.defineProperties(exports, {{ {} }});", getters.join(", ")));
    }
    prologue.push(' ');
    rewriter.edits.insert(0, Edit::insert(0, prologue));

    let mut output = String::with_capacity(source.len() + 256);
    apply_edits(source, &rewriter.edits, &mut output);
    Ok(Some(output))
}

struct Rewriter<'s> {
    file: &'s Path,
    source: &'s str,
    edits: Vec<Edit>,
    /// Exported name -> local binding
    exports: Vec<(String, String)>,
    imports: usize,
}

impl Rewriter<'_> {
    /// Queue the edits for one top level statement; false when it is not module syntax
    fn statement(&mut self, statement: &Statement<'_>) -> Result<bool> {
        match statement {
            Statement::ImportDeclaration(decl) => self.import(decl),
            Statement::ExportNamedDeclaration(decl) => self.export_named(decl)?,
            Statement::ExportDefaultDeclaration(decl) => self.export_default(decl),
            Statement::ExportAllDeclaration(decl) => self.export_all(decl),
            _ => return Ok(false),
        }
        Ok(true)
    }

    fn replace(&mut self, span: Span, text: impl Into<String>) {
        self.edits.push(Edit::replace(self.source, span, text));
    }

    /// `const __import_N = require("<spec>");`
    fn require_binding(&mut self, source: &StringLiteral<'_>) -> (String, String) {
        let binding = format!("__import_{}", self.imports);
        self.imports += 1;
        let statement = format!("const {} = require({});", binding, quote(source.value.as_str()));
        (binding, statement)
    }

    fn import(&mut self, decl: &ImportDeclaration<'_>) {
        if decl.import_kind.is_type() {
            self.replace(decl.span, "");
            return;
        }

        let specifiers = match &decl.specifiers {
            Some(specifiers) if !specifiers.is_empty() => specifiers,
            _ => {
                let text = format!("require({});", quote(decl.source.value.as_str()));
                self.replace(decl.span, text);
                return;
            }
        };

        let (binding, mut text) = self.require_binding(&decl.source);
        let mut locals = Vec::with_capacity(specifiers.len());
        for specifier in specifiers {
            match specifier {
                ImportDeclarationSpecifier::ImportDefaultSpecifier(s) => {
                    locals.push(format!("{} = {}", s.local.name, default_of(&binding)));
                }
                ImportDeclarationSpecifier::ImportNamespaceSpecifier(s) => {
                    locals.push(format!("{} = {}", s.local.name, binding));
                }
                ImportDeclarationSpecifier::ImportSpecifier(s) => {
                    if s.import_kind.is_type() {
                        continue;
                    }
                    let imported = s.imported.name();
                    let value = if imported.as_str() == "default" {
                        default_of(&binding)
                    } else {
                        member(&binding, imported.as_str())
                    };
                    locals.push(format!("{} = {}", s.local.name, value));
                }
            }
        }
        if !locals.is_empty() {
            text.push_str(&format!(" const {};", locals.join(", ")));
        }
        self.replace(decl.span, text);
    }

    fn export_named(&mut self, decl: &ExportNamedDeclaration<'_>) -> Result<()> {
        if decl.export_kind.is_type() {
            self.replace(decl.span, "");
            return Ok(());
        }

        if let Some(declaration) = &decl.declaration {
            match declaration {
                Declaration::VariableDeclaration(variables) => {
                    for declarator in &variables.declarations {
                        let BindingPatternKind::BindingIdentifier(ident) = &declarator.id.kind else {
                            return Err(LinkerError::transform(
                                self.file,
                                "destructuring exports are not supported".to_string(),
                            ));
                        };
                        self.exports.push((ident.name.to_string(), ident.name.to_string()));
                    }
                }
                Declaration::FunctionDeclaration(function) => {
                    if let Some(id) = &function.id {
                        self.exports.push((id.name.to_string(), id.name.to_string()));
                    }
                }
                Declaration::ClassDeclaration(class) => {
                    if let Some(id) = &class.id {
                        self.exports.push((id.name.to_string(), id.name.to_string()));
                    }
                }
                _ => {}
            }
            self.replace(Span::new(decl.span.start, declaration.span().start), "");
            return Ok(());
        }

        match &decl.source {
            Some(source) => {
                let (binding, mut text) = self.require_binding(source);
                for specifier in decl.specifiers.iter().filter(|s| !s.export_kind.is_type()) {
                    text.push_str(&format!(
                        " Object.defineProperty(exports, {}, {{ enumerable: true, get: () => {} }});",
                        quote(specifier.exported.name().as_str()),
                        member(&binding, specifier.local.name().as_str()),
                    ));
                }
                self.replace(decl.span, text);
            }
            None => {
                for specifier in decl.specifiers.iter().filter(|s| !s.export_kind.is_type()) {
                    self.exports
                        .push((specifier.exported.name().to_string(), specifier.local.name().to_string()));
                }
                self.replace(decl.span, "");
            }
        }
        Ok(())
    }

    fn export_default(&mut self, decl: &ExportDefaultDeclaration<'_>) {
        let prefix = Span::new(decl.span.start, decl.declaration.span().start);
        let named = match &decl.declaration {
            ExportDefaultDeclarationKind::FunctionDeclaration(function) => function.id.as_ref().map(|id| id.name),
            ExportDefaultDeclarationKind::ClassDeclaration(class) => class.id.as_ref().map(|id| id.name),
            ExportDefaultDeclarationKind::TSInterfaceDeclaration(_) => {
                self.replace(decl.span, "");
                return;
            }
            _ => None,
        };

        match named {
            Some(name) => {
                self.exports.push(("default".to_string(), name.to_string()));
                self.replace(prefix, "");
            }
            None => {
                self.replace(prefix, "exports.default = ");
                let is_declaration = matches!(
                    &decl.declaration,
                    ExportDefaultDeclarationKind::FunctionDeclaration(_)
                        | ExportDefaultDeclarationKind::ClassDeclaration(_)
                );
                if is_declaration {
                    self.edits.push(Edit::insert(decl.span.end as usize, ";"));
                }
            }
        }
    }

    fn export_all(&mut self, decl: &ExportAllDeclaration<'_>) {
        if decl.export_kind.is_type() {
            self.replace(decl.span, "");
            return;
        }

        let (binding, mut text) = self.require_binding(&decl.source);
        match &decl.exported {
            Some(exported) => text.push_str(&format!(
                " Object.defineProperty(exports, {}, {{ enumerable: true, get: () => {} }});",
                quote(exported.name().as_str()),
                binding,
            )),
            None => text.push_str(&format!(
                " Object.keys({b}).forEach((name) => {{ if (name !== \"default\" && !Object.prototype.hasOwnProperty.call(exports, name)) Object.defineProperty(exports, name, {{ enumerable: true, get: () => {b}[name] }}); }});",
                b = binding,
            )),
        }
        self.replace(decl.span, text);
    }
}

fn quote(text: &str) -> String {
    serde_json::to_string(text).unwrap_or_else(|_| format!("\"{}\"", text))
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_alphabetic() || c == '_' || c == '$')
        && chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$')
}

fn member(object: &str, name: &str) -> String {
    if is_identifier(name) {
        format!("{}.{}", object, name)
    } else {
        format!("{}[{}]", object, quote(name))
    }
}

/// Default import of a module that may be CommonJS
fn default_of(binding: &str) -> String {
    format!("{b} && {b}.__esModule ? {b}.default : {b}", b = binding)
}
