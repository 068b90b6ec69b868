#[macro_use]
pub mod macros;

pub mod ast;
pub mod caller;
pub mod class;
pub mod config;
pub mod diagnostics;
pub mod env;
pub mod error;
pub mod inline_cache;
pub mod promise;
pub mod sharing;
pub mod signature;
pub mod value;

// Re-export commonly used items for convenience
pub use tracing;

// Alias for error types
pub type Error = crate::error::Error;
pub type Result<T> = crate::error::Result<T>;
