pub use lzr_core::error::{Condition, ConditionKind, Error};

/// Create a language-level condition
pub fn condition(kind: ConditionKind, message: impl Into<String>) -> Error {
    Error::condition(kind, message)
}

pub fn missing_argument(name: &str) -> Error {
    condition(
        ConditionKind::MissingArgument,
        format!("argument \"{}\" is missing, with no default", name),
    )
}

pub fn object_not_found(name: &str) -> Error {
    condition(
        ConditionKind::ObjectNotFound,
        format!("object '{}' not found", name),
    )
}

pub fn invalid_argument(message: impl Into<String>) -> Error {
    condition(ConditionKind::InvalidArgument, message)
}

// Convenience macros for raising conditions

/// Macro to return early with a language-level condition
#[macro_export]
macro_rules! condition_bail {
    ($kind:ident, $($arg:tt)*) => {
        return Err($crate::error::Error::condition(
            $crate::error::ConditionKind::$kind,
            format!($($arg)*),
        )
        .into())
    };
}

/// Macro to ensure a condition is true, or return a language-level condition
#[macro_export]
macro_rules! condition_ensure {
    ($cond:expr, $kind:ident, $($arg:tt)*) => {
        if !($cond) {
            $crate::condition_bail!($kind, $($arg)*);
        }
    };
}
