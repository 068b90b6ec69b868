//! Environment-variable helpers for engine configuration.

pub fn env_true(key: &str) -> Option<bool> {
    std::env::var(key).ok().map(|val| {
        let trimmed = val.trim();
        !trimmed.is_empty() && !matches!(trimmed, "0" | "false" | "FALSE" | "False")
    })
}

pub fn bool_from_env(key: &str, default: bool) -> bool {
    env_true(key).unwrap_or(default)
}

pub fn usize_from_env(key: &str) -> Option<usize> {
    std::env::var(key)
        .ok()
        .and_then(|val| val.trim().parse::<usize>().ok())
}
