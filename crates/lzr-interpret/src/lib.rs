//! Lazy R-style interpreter
//!
//! Evaluates `lzr-core` expression trees: argument matching and frame
//! construction, promise forcing with optional eager evaluation at the call
//! site, and S3/S4 method dispatch with per-call-site caches.

pub mod error;

pub mod dispatch;
pub mod engine;
pub mod intrinsics;

pub use engine::{EngineStats, Interpreter, InterpreterOptions, InterruptHandle};
