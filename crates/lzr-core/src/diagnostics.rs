use std::fmt::{Display, Formatter};
use std::sync::{Arc, Mutex};

/// Built-in templates supported by the diagnostic manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DiagnosticTemplate {
    #[default]
    Pretty,
    Plain,
}

impl DiagnosticTemplate {
    fn render(&self, diagnostic: &Diagnostic, context: &str) -> Vec<String> {
        match self {
            DiagnosticTemplate::Pretty => render_pretty(diagnostic, context),
            DiagnosticTemplate::Plain => render_plain(diagnostic, context),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticLevel {
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub level: DiagnosticLevel,
    pub message: String,
    /// Rendered call the diagnostic was raised from, e.g. `a * b`.
    pub call: Option<String>,
    pub source_context: Option<String>,
    pub code: Option<String>,
}

impl Diagnostic {
    fn new(level: DiagnosticLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            call: None,
            source_context: None,
            code: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(DiagnosticLevel::Error, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(DiagnosticLevel::Warning, message)
    }

    pub fn with_call(mut self, call: impl Into<String>) -> Self {
        self.call = Some(call.into());
        self
    }

    pub fn with_source_context(mut self, context: impl Into<String>) -> Self {
        self.source_context = Some(context.into());
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }
}

impl Display for Diagnostic {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match (&self.level, &self.call) {
            (DiagnosticLevel::Warning, Some(call)) => {
                write!(f, "Warning in {} : {}", call, self.message)?
            }
            (_, Some(call)) => write!(f, "In {} : {}", call, self.message)?,
            (_, None) => write!(f, "{}", self.message)?,
        }

        if let Some(code) = &self.code {
            write!(f, " [{}]", code)?;
        }

        Ok(())
    }
}

/// Collects diagnostics for one interpreter context.
#[derive(Debug, Clone, Default)]
pub struct DiagnosticManager {
    diagnostics: Arc<Mutex<Vec<Diagnostic>>>,
}

impl DiagnosticManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_diagnostic(&self, diagnostic: Diagnostic) {
        if let Ok(mut diagnostics) = self.diagnostics.lock() {
            diagnostics.push(diagnostic);
        }
    }

    pub fn get_diagnostics(&self) -> Vec<Diagnostic> {
        self.diagnostics
            .lock()
            .map(|d| d.clone())
            .unwrap_or_default()
    }

    pub fn warnings(&self) -> Vec<Diagnostic> {
        self.get_diagnostics()
            .into_iter()
            .filter(|diag| diag.level == DiagnosticLevel::Warning)
            .collect()
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .lock()
            .map(|d| d.iter().any(|diag| diag.level == DiagnosticLevel::Error))
            .unwrap_or(false)
    }

    pub fn clear(&self) {
        if let Ok(mut diagnostics) = self.diagnostics.lock() {
            diagnostics.clear();
        }
    }

    /// Render every collected diagnostic to lines. The fallback context is used
    /// when a diagnostic does not specify a source context.
    pub fn render(&self, fallback_context: &str, template: DiagnosticTemplate) -> Vec<String> {
        self.get_diagnostics()
            .iter()
            .flat_map(|diagnostic| {
                let context = diagnostic
                    .source_context
                    .as_deref()
                    .unwrap_or(fallback_context);
                template.render(diagnostic, context)
            })
            .collect()
    }
}

fn render_pretty(diagnostic: &Diagnostic, context: &str) -> Vec<String> {
    let prefix = match diagnostic.level {
        DiagnosticLevel::Error => "❌",
        DiagnosticLevel::Warning => "⚠️ ",
    };

    let header = match diagnostic.code.as_ref() {
        Some(code) => format!("{} [{}] {} ({})", prefix, context, diagnostic.message, code),
        None => format!("{} [{}] {}", prefix, context, diagnostic.message),
    };

    let mut lines = vec![header];
    if let Some(call) = &diagnostic.call {
        lines.push(format!("   in {}", call));
    }
    lines
}

fn render_plain(diagnostic: &Diagnostic, context: &str) -> Vec<String> {
    let level = match diagnostic.level {
        DiagnosticLevel::Error => "ERROR",
        DiagnosticLevel::Warning => "WARNING",
    };

    let header = match diagnostic.code.as_ref() {
        Some(code) => format!("[{}] {}: {} ({})", context, level, diagnostic.message, code),
        None => format!("[{}] {}: {}", context, level, diagnostic.message),
    };

    let mut lines = vec![header];
    if let Some(call) = &diagnostic.call {
        lines.push(format!("   in {}", call));
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn plain_template_uses_the_fallback_context() {
        let manager = DiagnosticManager::new();
        manager.add_diagnostic(Diagnostic::warning("careful").with_call("a + b"));
        manager.add_diagnostic(
            Diagnostic::error("boom")
                .with_code("lzr::user")
                .with_source_context("script"),
        );

        assert_eq!(
            manager.render("lzr", DiagnosticTemplate::Plain),
            vec![
                "[lzr] WARNING: careful".to_string(),
                "   in a + b".to_string(),
                "[script] ERROR: boom (lzr::user)".to_string(),
            ]
        );
        assert!(manager.has_errors());

        manager.clear();
        assert!(manager.render("lzr", DiagnosticTemplate::Pretty).is_empty());
    }
}
