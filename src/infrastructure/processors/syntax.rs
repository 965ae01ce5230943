use crate::utils::{ErrorContext, LinkerError, Result};
use oxc_allocator::Allocator;
use oxc_ast::ast::{
    Argument, AssignmentTarget, CallExpression, Expression, ObjectPropertyKind, PropertyKey, Statement,
    UnaryOperator,
};
use oxc_ast_visit::{walk, Visit};
use oxc_diagnostics::OxcDiagnostic;
use oxc_parser::Parser;
use oxc_span::{GetSpan, SourceType, Span};
use std::path::Path;

/// A `require("<literal>")` call site
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequireCall {
    pub specifier: String,
    /// Span of the string literal argument, quotes included
    pub span: Span,
}

/// `Object.defineProperty(exports, "name", { get: function () { return value; } })`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EsExport {
    pub statement: Span,
    pub name: Span,
    pub value: Span,
}

/// Owned summary of a parsed module, everything the transform steps look at
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuleSyntax {
    pub use_strict: Vec<Span>,
    pub requires: Vec<RequireCall>,
    pub es_module_marker: Option<Span>,
    pub void0_exports: Option<Span>,
    pub es_exports: Vec<EsExport>,
}

impl ModuleSyntax {
    /// Distinct required specifiers, in source order
    pub fn dependencies(&self) -> Vec<String> {
        let mut deps: Vec<String> = Vec::new();
        for call in &self.requires {
            if !deps.contains(&call.specifier) {
                deps.push(call.specifier.clone());
            }
        }
        deps
    }
}

/// Byte offset of the primary label of a parser diagnostic
pub(crate) fn diagnostic_offset(diagnostic: &OxcDiagnostic) -> usize {
    diagnostic
        .labels
        .as_ref()
        .and_then(|labels| labels.first())
        .map(|label| label.offset())
        .unwrap_or(0)
}

/// Parse compiled CommonJS and collect its syntax summary
pub fn parse_module(file: &Path, source: &str) -> Result<ModuleSyntax> {
    let allocator = Allocator::default();
    let ret = Parser::new(&allocator, source, SourceType::cjs()).parse();

    if let Some(error) = ret.errors.first() {
        let (line, column) = ErrorContext::locate(source, diagnostic_offset(error));
        return Err(LinkerError::transform(
            file,
            format!("{} at line {}, column {}", error, line, column),
        ));
    }

    let program = ret.program;
    let mut syntax = ModuleSyntax {
        use_strict: program
            .directives
            .iter()
            .filter(|directive| directive.expression.value.as_str() == "use strict")
            .map(|directive| directive.span)
            .collect(),
        ..ModuleSyntax::default()
    };

    for statement in &program.body {
        let Statement::ExpressionStatement(stmt) = statement else {
            continue;
        };
        let expr = &stmt.expression;

        if syntax.es_module_marker.is_none() && is_es_module_marker(expr) {
            syntax.es_module_marker = Some(stmt.span);
        } else if syntax.void0_exports.is_none() && is_void0_exports(expr) {
            syntax.void0_exports = Some(stmt.span);
        } else if let Some((name, value)) = es_export(expr) {
            syntax.es_exports.push(EsExport {
                statement: stmt.span,
                name,
                value,
            });
        }
    }

    let mut collector = RequireCollector::default();
    collector.visit_program(&program);
    syntax.requires = collector.requires;

    Ok(syntax)
}

#[derive(Default)]
struct RequireCollector {
    requires: Vec<RequireCall>,
}

impl<'a> Visit<'a> for RequireCollector {
    fn visit_call_expression(&mut self, it: &CallExpression<'a>) {
        if let Some(call) = require_call(it) {
            self.requires.push(call);
        }
        walk::walk_call_expression(self, it);
    }
}

fn require_call(call: &CallExpression<'_>) -> Option<RequireCall> {
    let Expression::Identifier(callee) = &call.callee else {
        return None;
    };
    if callee.name.as_str() != "require" || call.arguments.len() != 1 {
        return None;
    }
    match &call.arguments[0] {
        Argument::StringLiteral(literal) if !literal.value.is_empty() => Some(RequireCall {
            specifier: literal.value.to_string(),
            span: literal.span,
        }),
        _ => None,
    }
}

fn is_identifier(expr: &Expression<'_>, name: &str) -> bool {
    matches!(expr, Expression::Identifier(ident) if ident.name.as_str() == name)
}

/// `Object.defineProperty(...)` with three arguments
fn define_property<'b, 'a>(expr: &'b Expression<'a>) -> Option<&'b CallExpression<'a>> {
    let Expression::CallExpression(call) = expr else {
        return None;
    };
    let Expression::StaticMemberExpression(callee) = &call.callee else {
        return None;
    };
    if !is_identifier(&callee.object, "Object")
        || callee.property.name.as_str() != "defineProperty"
        || call.arguments.len() != 3
    {
        return None;
    }
    Some(call)
}

fn is_es_module_marker(expr: &Expression<'_>) -> bool {
    let Expression::CallExpression(call) = expr else {
        return false;
    };
    call.arguments.len() == 3
        && matches!(&call.arguments[1], Argument::StringLiteral(name) if name.value.as_str() == "__esModule")
}

/// `exports.a = exports.b = void 0;`
fn is_void0_exports(expr: &Expression<'_>) -> bool {
    let mut expr = expr;
    while let Expression::AssignmentExpression(assign) = expr {
        match &assign.left {
            AssignmentTarget::StaticMemberExpression(member) if is_identifier(&member.object, "exports") => {
                expr = &assign.right;
            }
            _ => return false,
        }
    }
    matches!(expr, Expression::UnaryExpression(unary) if unary.operator == UnaryOperator::Void)
}

fn es_export(expr: &Expression<'_>) -> Option<(Span, Span)> {
    let call = define_property(expr)?;

    let Argument::Identifier(target) = &call.arguments[0] else {
        return None;
    };
    let Argument::StringLiteral(name) = &call.arguments[1] else {
        return None;
    };
    let Argument::ObjectExpression(config) = &call.arguments[2] else {
        return None;
    };
    if target.name.as_str() != "exports" {
        return None;
    }

    for property in &config.properties {
        let ObjectPropertyKind::ObjectProperty(property) = property else {
            continue;
        };
        let PropertyKey::StaticIdentifier(key) = &property.key else {
            continue;
        };
        if key.name.as_str() != "get" {
            continue;
        }
        let Expression::FunctionExpression(getter) = &property.value else {
            continue;
        };
        let body = getter.body.as_ref()?;
        if body.statements.len() != 1 {
            continue;
        }
        if let Statement::ReturnStatement(ret) = &body.statements[0] {
            if let Some(value) = &ret.argument {
                return Some((name.span, value.span()));
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> ModuleSyntax {
        parse_module(Path::new("test.js"), source).unwrap()
    }

    fn text(source: &str, span: Span) -> &str {
        &source[span.start as usize..span.end as usize]
    }

    #[test]
    fn test_collects_require_literals() {
        let source = r#"
const a = require("./a");
function f() { return require('b').x; }
require(dynamic);
require("./a");
require("");
"#;
        let syntax = parse(source);
        assert_eq!(syntax.requires.len(), 3);
        assert_eq!(syntax.dependencies(), vec!["./a".to_string(), "b".to_string()]);
        assert_eq!(text(source, syntax.requires[1].span), "'b'");
    }

    #[test]
    fn test_collects_tsc_preamble() {
        let source = r#""use strict";
Object.defineProperty(exports, "__esModule", { value: true });
exports.b = exports.a = void 0;
Object.defineProperty(exports, "Glyph", { enumerable: true, get: function () { return glyph_1.Glyph; } });
"#;
        let syntax = parse(source);
        assert_eq!(syntax.use_strict.len(), 1);
        assert!(text(source, syntax.es_module_marker.unwrap()).contains("__esModule"));
        assert_eq!(text(source, syntax.void0_exports.unwrap()), "exports.b = exports.a = void 0;");
        assert_eq!(syntax.es_exports.len(), 1);
        assert_eq!(text(source, syntax.es_exports[0].name), "\"Glyph\"");
        assert_eq!(text(source, syntax.es_exports[0].value), "glyph_1.Glyph");
    }

    #[test]
    fn test_plain_assignment_is_not_void0() {
        let syntax = parse("exports.a = 1;\nmodule.exports = void 0;\n");
        assert_eq!(syntax.void0_exports, None);
    }

    #[test]
    fn test_syntax_error_is_transform_error() {
        let err = parse_module(Path::new("broken.js"), "let = ;").unwrap_err();
        assert!(matches!(err, LinkerError::Transform { .. }));
        assert!(err.to_string().contains("broken.js"));
    }
}
