use std::path::PathBuf;
use thiserror::Error;

/// Location of a failure inside a module file
#[derive(Debug, Clone, Default)]
pub struct ErrorContext {
    pub file_path: Option<PathBuf>,
    pub line: Option<usize>,
    pub column: Option<usize>,
    pub code_snippet: Option<String>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, path: PathBuf) -> Self {
        self.file_path = Some(path);
        self
    }

    pub fn with_location(mut self, line: usize, column: usize) -> Self {
        self.line = Some(line);
        self.column = Some(column);
        self
    }

    pub fn with_snippet(mut self, snippet: String) -> Self {
        self.code_snippet = Some(snippet);
        self
    }

    /// Compute a 1-based line/column pair from a byte offset into `source`
    pub fn locate(source: &str, offset: usize) -> (usize, usize) {
        let offset = offset.min(source.len());
        let before = &source[..offset];
        let line = before.matches('\n').count() + 1;
        let line_start = before.rfind('\n').map(|i| i + 1).unwrap_or(0);
        let column = before[line_start..].chars().count() + 1;
        (line, column)
    }
}

#[derive(Error, Debug)]
pub enum LinkerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("can't resolve '{specifier}' from '{}': {message}", importer.display())]
    Resolution {
        specifier: String,
        importer: PathBuf,
        message: String,
    },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Cache format error: {0}")]
    CacheFormat(String),

    #[error("Transform error in {}: {message}", file.display())]
    Transform { file: PathBuf, message: String },

    #[error("Minify error in {}:{line}:{column}: {message}", file.display())]
    Minify {
        file: PathBuf,
        line: usize,
        column: usize,
        message: String,
        context: Option<ErrorContext>,
    },

    #[error("unsupported extension of {}", .0.display())]
    UnsupportedModule(PathBuf),
}

impl LinkerError {
    pub fn resolution(specifier: &str, importer: &std::path::Path, message: String) -> Self {
        Self::Resolution {
            specifier: specifier.to_string(),
            importer: importer.to_path_buf(),
            message,
        }
    }

    pub fn config(message: String) -> Self {
        Self::Configuration(message)
    }

    pub fn transform(file: &std::path::Path, message: String) -> Self {
        Self::Transform {
            file: file.to_path_buf(),
            message,
        }
    }

    /// Create a minify error pointing at a byte offset of the generated code
    pub fn minify_at(file: &std::path::Path, source: &str, offset: usize, message: String) -> Self {
        let (line, column) = ErrorContext::locate(source, offset);
        let snippet = source.lines().nth(line - 1).unwrap_or_default().to_string();
        let context = ErrorContext::new()
            .with_file(file.to_path_buf())
            .with_location(line, column)
            .with_snippet(snippet);

        Self::Minify {
            file: file.to_path_buf(),
            line,
            column,
            message,
            context: Some(context),
        }
    }

    /// Format error with enhanced context display
    pub fn format_detailed(&self) -> String {
        match self {
            LinkerError::Minify {
                message,
                context: Some(ctx),
                ..
            } => self.format_error_with_context("Minify Error", message, ctx),
            _ => format!("❌ {}", self),
        }
    }

    fn format_error_with_context(&self, error_type: &str, message: &str, ctx: &ErrorContext) -> String {
        let mut output = format!("❌ {}: {}", error_type, message);

        if let Some(ref file_path) = ctx.file_path {
            output.push_str(&format!("\n📁 File: {}", file_path.display()));
        }

        if let (Some(line), Some(column)) = (ctx.line, ctx.column) {
            output.push_str(&format!("\n📍 Location: line {}, column {}", line, column));
        }

        if let Some(ref snippet) = ctx.code_snippet {
            output.push_str(&format!("\n📝 Code:\n→ {:3} │ {}", ctx.line.unwrap_or(0), snippet));
            if let Some(column) = ctx.column {
                output.push_str(&format!("\n      │ {}^", " ".repeat(column.saturating_sub(1))));
            }
        }

        output
    }
}

pub type Result<T> = std::result::Result<T, LinkerError>;

impl From<regex::Error> for LinkerError {
    fn from(err: regex::Error) -> Self {
        LinkerError::config(format!("invalid external pattern: {}", err))
    }
}
