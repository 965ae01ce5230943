// Module transform pipelines: pure `Document -> Document` steps composed per module kind

use crate::core::models::{ModuleId, ModuleKind};
use crate::infrastructure::processors::syntax::ModuleSyntax;
use crate::utils::source_maps::{line_map, newlines};
use crate::utils::{LinkerError, Result};
use oxc_span::Span;
use std::collections::BTreeMap;
use std::path::Path;

/// Parameters of the module being transformed
pub struct TransformContext<'a> {
    pub file: &'a Path,
    pub base_path: &'a str,
    pub source: &'a str,
    /// Required by the JS steps
    pub syntax: Option<&'a ModuleSyntax>,
    pub dependency_ids: &'a BTreeMap<String, ModuleId>,
}

/// A text replacement over the original source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edit {
    pub start: u32,
    pub end: u32,
    pub text: String,
}

impl Edit {
    /// Replace `span`, padding with newlines so later lines keep their numbers
    pub(crate) fn replace(source: &str, span: Span, text: impl Into<String>) -> Self {
        let mut text = text.into();
        let removed = newlines(&source[span.start as usize..span.end as usize]);
        for _ in newlines(&text)..removed {
            text.push('\n');
        }
        Self {
            start: span.start,
            end: span.end,
            text,
        }
    }

    pub(crate) fn insert(at: usize, text: impl Into<String>) -> Self {
        Self {
            start: at as u32,
            end: at as u32,
            text: text.into(),
        }
    }
}

/// The source of a module as seen by the steps: edits plus the wrapper around it
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Document {
    pub head: String,
    pub edits: Vec<Edit>,
    pub tail: String,
}

impl Document {
    fn with_edits(mut self, edits: impl IntoIterator<Item = Edit>) -> Self {
        self.edits.extend(edits);
        self
    }
}

pub type Step = fn(Document, &TransformContext<'_>) -> Result<Document>;

/// Result of printing a transformed document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformedModule {
    pub source: String,
    pub map: String,
}

/// Ordered steps for a module kind
pub fn pipeline(kind: ModuleKind, apply_transforms: bool) -> Vec<Step> {
    let mut steps: Vec<Step> = Vec::new();
    match kind {
        ModuleKind::Js => {
            if apply_transforms {
                steps.push(remove_use_strict);
                steps.push(fix_esmodule);
                steps.push(remove_void0);
                steps.push(fix_esexports);
            }
            steps.push(rewrite_deps);
        }
        ModuleKind::Json => steps.push(export_json),
        ModuleKind::Css | ModuleKind::Json5 | ModuleKind::Yaml => steps.push(export_text),
    }
    steps.push(wrap_in_function);
    steps
}

/// Run the pipeline of `kind` and print the result with its line map
pub fn transform(kind: ModuleKind, apply_transforms: bool, ctx: &TransformContext<'_>) -> Result<TransformedModule> {
    let document = pipeline(kind, apply_transforms)
        .into_iter()
        .try_fold(Document::default(), |document, step| step(document, ctx))?;
    print(&document, ctx)
}

/// Apply `edits` to `source` in position order; an edit overlapping an earlier one is dropped
pub(crate) fn apply_edits(source: &str, edits: &[Edit], output: &mut String) {
    let mut edits: Vec<&Edit> = edits.iter().collect();
    edits.sort_by_key(|edit| edit.start);

    let mut cursor = 0usize;
    for edit in edits {
        let (start, end) = (edit.start as usize, edit.end as usize);
        if start < cursor {
            continue;
        }
        output.push_str(&source[cursor..start]);
        output.push_str(&edit.text);
        cursor = end;
    }
    output.push_str(&source[cursor..]);
}

pub fn print(document: &Document, ctx: &TransformContext<'_>) -> Result<TransformedModule> {
    let source = ctx.source;
    let mut output = String::with_capacity(document.head.len() + source.len() + document.tail.len());
    output.push_str(&document.head);
    apply_edits(source, &document.edits, &mut output);
    output.push_str(&document.tail);

    let map = line_map(ctx.base_path, source, newlines(&document.head))?;
    Ok(TransformedModule { source: output, map })
}

fn syntax<'c>(ctx: &'c TransformContext<'_>) -> Result<&'c ModuleSyntax> {
    ctx.syntax
        .ok_or_else(|| LinkerError::transform(ctx.file, "module was not parsed".to_string()))
}

fn comment_safe(text: &str) -> String {
    text.replace("*/", "*\\/")
}

pub fn remove_use_strict(document: Document, ctx: &TransformContext<'_>) -> Result<Document> {
    let syntax = syntax(ctx)?;
    let edits = syntax
        .use_strict
        .iter()
        .map(|span| Edit::replace(ctx.source, *span, ""));
    Ok(document.with_edits(edits))
}

pub fn fix_esmodule(document: Document, ctx: &TransformContext<'_>) -> Result<Document> {
    let syntax = syntax(ctx)?;
    let edits = syntax
        .es_module_marker
        .map(|span| Edit::replace(ctx.source, span, "__esModule();"));
    Ok(document.with_edits(edits))
}

pub fn remove_void0(document: Document, ctx: &TransformContext<'_>) -> Result<Document> {
    let syntax = syntax(ctx)?;
    let edits = syntax
        .void0_exports
        .map(|span| Edit::replace(ctx.source, span, ""));
    Ok(document.with_edits(edits))
}

/// Getter re-exports become `__esExport("name", value);`
///
/// Only the text around the value is replaced, so requires inside it are still rewritten.
pub fn fix_esexports(document: Document, ctx: &TransformContext<'_>) -> Result<Document> {
    let syntax = syntax(ctx)?;
    let mut edits = Vec::with_capacity(syntax.es_exports.len() * 2);
    for export in &syntax.es_exports {
        let name = &ctx.source[export.name.start as usize..export.name.end as usize];
        edits.push(Edit::replace(
            ctx.source,
            Span::new(export.statement.start, export.value.start),
            format!("__esExport({}, ", name),
        ));
        edits.push(Edit::replace(
            ctx.source,
            Span::new(export.value.end, export.statement.end),
            ");",
        ));
    }
    Ok(document.with_edits(edits))
}

/// `require("./b")` -> `require(3 /* ./b */)`
pub fn rewrite_deps(document: Document, ctx: &TransformContext<'_>) -> Result<Document> {
    let syntax = syntax(ctx)?;
    let edits = syntax.requires.iter().filter_map(|call| {
        ctx.dependency_ids.get(&call.specifier).map(|id| {
            Edit::replace(
                ctx.source,
                call.span,
                format!("{} /* {} */", id.to_js(), comment_safe(&call.specifier)),
            )
        })
    });
    Ok(document.with_edits(edits.collect::<Vec<_>>()))
}

pub fn export_json(document: Document, ctx: &TransformContext<'_>) -> Result<Document> {
    serde_json::from_str::<serde_json::Value>(ctx.source)
        .map_err(|e| LinkerError::transform(ctx.file, format!("invalid JSON module: {}", e)))?;

    let end = ctx.source.trim_end().len();
    Ok(document.with_edits([Edit::insert(0, "module.exports = "), Edit::insert(end, ";")]))
}

/// The whole file as a string literal
pub fn export_text(document: Document, ctx: &TransformContext<'_>) -> Result<Document> {
    let literal = serde_json::to_string(ctx.source)?;
    let whole = Span::new(0, ctx.source.len() as u32);
    Ok(document.with_edits([Edit::replace(ctx.source, whole, format!("module.exports = {};", literal))]))
}

pub fn wrap_in_function(mut document: Document, ctx: &TransformContext<'_>) -> Result<Document> {
    document.head = format!(
        "/* {} */\nfunction _(require, module, exports, __esModule, __esExport) {{\n",
        comment_safe(ctx.base_path)
    );
    document.tail = if ctx.source.ends_with('\n') { "}" } else { "\n}" }.to_string();
    Ok(document)
}
