use crate::core::interfaces::CodeMinifier;
use crate::core::models::MinifiedCode;
use crate::infrastructure::processors::syntax::diagnostic_offset;
use crate::utils::source_maps::{newlines, offset_map};
use crate::utils::{LinkerError, Result};
use once_cell::sync::Lazy;
use oxc_allocator::Allocator;
use oxc_ast::ast::Program;
use oxc_codegen::{Codegen, CodegenOptions};
use oxc_minifier::{CompressOptions, MangleOptions, Minifier, MinifierOptions};
use oxc_parser::Parser;
use oxc_span::{SourceType, Span};
use regex::Regex;
use std::path::{Path, PathBuf};

/// Comments kept in minified output
static LICENSE_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^!|copyright|license|\(c\)").unwrap());

/// JavaScript minification using oxc
pub struct OxcMinifier {
    mangle: bool,
    compress: bool,
}

impl OxcMinifier {
    pub fn new() -> Self {
        Self {
            mangle: true,
            compress: true,
        }
    }

    fn options(&self) -> MinifierOptions {
        MinifierOptions {
            mangle: self.mangle.then(MangleOptions::default),
            compress: self.compress.then(CompressOptions::default),
        }
    }

    /// Minify code; the map's generated positions refer to the returned text
    pub fn minify(&self, source_code: &str, file: &Path) -> Result<MinifiedCode> {
        let allocator = Allocator::default();
        let parse_result = Parser::new(&allocator, source_code, SourceType::cjs()).parse();

        if let Some(error) = parse_result.errors.first() {
            return Err(LinkerError::minify_at(
                file,
                source_code,
                diagnostic_offset(error),
                error.to_string(),
            ));
        }

        let mut program = parse_result.program;
        let header = license_header(&program, source_code);

        let minified = Minifier::new(self.options()).minify(&allocator, &mut program);

        let codegen = Codegen::new()
            .with_options(CodegenOptions {
                source_map_path: Some(PathBuf::from(file.file_name().unwrap_or(file.as_os_str()))),
                ..CodegenOptions::minify()
            })
            .with_scoping(minified.scoping)
            .build(&program);

        let map = codegen.map.map(|map| map.to_json_string());
        if header.is_empty() {
            return Ok(MinifiedCode {
                code: codegen.code,
                map,
            });
        }

        let map = match map {
            Some(map) => Some(offset_map(&map, newlines(&header))?),
            None => None,
        };
        Ok(MinifiedCode {
            code: header + &codegen.code,
            map,
        })
    }
}

impl Default for OxcMinifier {
    fn default() -> Self {
        Self::new()
    }
}

impl CodeMinifier for OxcMinifier {
    fn minify(&self, file: &Path, source: &str) -> Result<MinifiedCode> {
        OxcMinifier::minify(self, source, file)
    }
}

/// Retained comments, one per line, followed by a newline
fn license_header(program: &Program<'_>, source: &str) -> String {
    let mut header = String::new();
    for comment in program.comments.iter() {
        let text = comment_text(source, comment.span);
        if LICENSE_REGEX.is_match(comment_body(&text)) {
            header.push_str(&text);
            header.push('\n');
        }
    }
    header
}

/// Comment text with its delimiters
fn comment_text(source: &str, span: Span) -> String {
    let (start, end) = (span.start as usize, span.end as usize);
    let text = &source[start..end];
    if text.starts_with("//") || text.starts_with("/*") {
        return text.to_string();
    }
    match source.get(start.saturating_sub(2)..start) {
        Some("//") => format!("//{}", text),
        _ => format!("/*{}*/", text),
    }
}

fn comment_body(text: &str) -> &str {
    if let Some(line) = text.strip_prefix("//") {
        line
    } else {
        let body = text.strip_prefix("/*").unwrap_or(text);
        body.strip_suffix("*/").unwrap_or(body)
    }
}
