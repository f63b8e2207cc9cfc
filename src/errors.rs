//! Diagnostic formatting for the command line
//!
//! - ANSI colors with TTY auto-detection
//! - Edit distance for "did you mean?" hints on unbound names
//! - One rendering per error family (compile, evaluation)

use crate::codegen::{CompileError, CpsError, WrapError};
use crate::eval::EvalError;

/// ANSI color codes for terminal output
#[derive(Debug, Clone, Default)]
pub struct Colors {
    pub enabled: bool,
}

impl Colors {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    fn code(&self, code: &'static str) -> &'static str {
        if self.enabled {
            code
        } else {
            ""
        }
    }

    pub fn red(&self) -> &'static str {
        self.code("\x1b[31m")
    }

    pub fn cyan(&self) -> &'static str {
        self.code("\x1b[36m")
    }

    pub fn bold(&self) -> &'static str {
        self.code("\x1b[1m")
    }

    pub fn reset(&self) -> &'static str {
        self.code("\x1b[0m")
    }
}

/// Configuration for error display
#[derive(Debug, Clone, Default)]
pub struct ErrorConfig {
    pub colors: Colors,
    /// Input file the error came from
    pub filename: Option<String>,
}

impl ErrorConfig {
    pub fn new(use_color: bool) -> Self {
        Self {
            colors: Colors::new(use_color),
            filename: None,
        }
    }

    pub fn with_filename(mut self, name: impl Into<String>) -> Self {
        self.filename = Some(name.into());
        self
    }
}

// ============================================================================
// "Did you mean?" suggestions
// ============================================================================

/// Levenshtein edit distance, single-row formulation
pub fn levenshtein_distance(a: &str, b: &str) -> usize {
    let b: Vec<char> = b.chars().collect();
    let mut row: Vec<usize> = (0..=b.len()).collect();

    for (i, ca) in a.chars().enumerate() {
        let mut diagonal = row[0];
        row[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitute = diagonal + usize::from(ca != *cb);
            diagonal = row[j + 1];
            row[j + 1] = substitute.min(row[j] + 1).min(diagonal + 1);
        }
    }

    row[b.len()]
}

/// Up to 3 candidates within `max_distance` of `name`, closest first
pub fn find_similar<'a>(
    name: &str,
    candidates: impl IntoIterator<Item = &'a str>,
    max_distance: usize,
) -> Vec<String> {
    let mut scored: Vec<(usize, &str)> = candidates
        .into_iter()
        .map(|c| (levenshtein_distance(name, c), c))
        .filter(|(d, _)| *d > 0 && *d <= max_distance)
        .collect();
    scored.sort();
    scored.dedup();
    scored.into_iter().take(3).map(|(_, c)| c.to_string()).collect()
}

pub fn format_suggestions(suggestions: &[String], colors: &Colors) -> String {
    let bold: Vec<String> = suggestions
        .iter()
        .map(|s| format!("{}{}{}", colors.bold(), s, colors.reset()))
        .collect();
    match bold.as_slice() {
        [] => String::new(),
        [one] => format!("\n\nDid you mean {}?", one),
        many => format!("\n\nDid you mean one of: {}?", many.join(", ")),
    }
}

/// `-- KIND ------------...`
pub fn format_header(kind: &str, colors: &Colors) -> String {
    let dashes = "-".repeat(60usize.saturating_sub(kind.len() + 4));
    format!("{}-- {} {}{}", colors.cyan(), kind, dashes, colors.reset())
}

// ============================================================================
// Error rendering
// ============================================================================

fn render(kind: &str, message: &str, hint: &str, config: &ErrorConfig) -> String {
    let colors = &config.colors;
    let mut out = format_header(kind, colors);
    if let Some(file) = &config.filename {
        out.push_str(&format!("\n{}{}{}", colors.bold(), file, colors.reset()));
    }
    out.push_str(&format!("\n\n{}{}", message, hint));
    out
}

pub fn format_compile_error(err: &CompileError, config: &ErrorConfig) -> String {
    let message = match err {
        CompileError::Cps(CpsError::UnsupportedSyntax(kind)) => format!(
            "I cannot transform {}{}{} nodes into continuation-passing style.",
            config.colors.red(),
            kind,
            config.colors.reset()
        ),
        CompileError::Wrap(WrapError::MalformedContinuationPrimitive(detail)) => {
            format!("This continuation marker is malformed: {}", detail)
        }
        other => other.to_string(),
    };
    render("COMPILE ERROR", &message, "", config)
}

/// Render an evaluation error; `globals` feeds name suggestions
pub fn format_eval_error<'a>(
    err: &EvalError,
    globals: impl IntoIterator<Item = &'a str>,
    config: &ErrorConfig,
) -> String {
    let colors = &config.colors;
    match err {
        EvalError::UnboundVariable(name) => {
            let suggestions = find_similar(name, globals, 2);
            let message = format!(
                "I cannot find a variable named {}{}{}.",
                colors.red(),
                name,
                colors.reset()
            );
            render(
                "UNBOUND VARIABLE",
                &message,
                &format_suggestions(&suggestions, colors),
                config,
            )
        }
        EvalError::InvalidConditioning => render(
            "INVALID CONDITIONING",
            &err.to_string(),
            "\n\nWrap the program in Enumerate or ParticleFilter to condition on observations.",
            config,
        ),
        other => render("RUNTIME ERROR", &other.to_string(), "", config),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levenshtein() {
        assert_eq!(levenshtein_distance("flip", "flip"), 0);
        assert_eq!(levenshtein_distance("flip", "flap"), 1);
        assert_eq!(levenshtein_distance("plus", "pls"), 1);
        assert_eq!(levenshtein_distance("", "abc"), 3);
        assert_eq!(levenshtein_distance("abc", ""), 3);
        assert_eq!(levenshtein_distance("kitten", "sitting"), 3);
    }

    #[test]
    fn test_find_similar_orders_by_distance() {
        let suggestions = find_similar("plsu", ["plus", "minus", "times", "pluss"], 2);
        assert_eq!(suggestions[0], "plus");
        assert!(!suggestions.contains(&"times".to_string()));
    }

    #[test]
    fn test_find_similar_excludes_identical() {
        assert!(find_similar("flip", ["flip"], 2).is_empty());
    }

    #[test]
    fn test_format_suggestions() {
        let colors = Colors::new(false);
        assert!(format_suggestions(&[], &colors).is_empty());
        assert!(format_suggestions(&["plus".to_string()], &colors).contains("Did you mean plus?"));
        let many = format_suggestions(&["a".to_string(), "b".to_string()], &colors);
        assert!(many.contains("one of: a, b"));
    }

    #[test]
    fn test_unbound_variable_suggests_global() {
        let config = ErrorConfig::new(false).with_filename("model.json");
        let out = format_eval_error(
            &EvalError::UnboundVariable("fllip".to_string()),
            ["flip", "factor"],
            &config,
        );
        assert!(out.starts_with("-- UNBOUND VARIABLE"));
        assert!(out.contains("model.json"));
        assert!(out.contains("Did you mean flip?"));
    }

    #[test]
    fn test_compile_error_names_node_kind() {
        let err = CompileError::Cps(CpsError::UnsupportedSyntax("IfStatement"));
        let out = format_compile_error(&err, &ErrorConfig::default());
        assert!(out.contains("IfStatement"));
        assert!(out.starts_with("-- COMPILE ERROR"));
    }
}
