use crate::core::models::MinifiedCode;
use crate::utils::Result;
use std::path::Path;

/// Produces the minified variant of one wrapped module
pub trait CodeMinifier: Send + Sync {
    /// `file` names the module in errors and in the emitted map
    fn minify(&self, file: &Path, source: &str) -> Result<MinifiedCode>;
}
