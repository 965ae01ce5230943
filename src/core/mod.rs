// Core domain layer
pub mod bundle;
pub mod cache;
pub mod graph;
pub mod interfaces;
pub mod linker;
pub mod models;

pub use bundle::*;
pub use cache::*;
pub use graph::*;
pub use interfaces::*;
pub use linker::*;
pub use models::*;
