// Processors module
pub mod esm;
pub mod minifier;
pub mod syntax;
pub mod transforms;

pub use esm::*;
pub use minifier::*;
pub use syntax::*;
pub use transforms::*;
