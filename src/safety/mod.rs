//! Safety Checker
//! Syntactic vetting of action/condition snippets before they are executed.
//!
//! This is a text heuristic, not a sandbox. It catches accidental misuse by
//! people writing FSM actions (imports, dunder attribute access, calls to a
//! small deny-list of builtins). It does not stop obfuscated input such as a
//! banned name assembled by string concatenation. The interpreter in
//! [`crate::script`] has no file, process or import capability regardless.

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;


/// Builtins that may never be called from a snippet
pub const DISALLOWED_FUNCTIONS: &[&str] = &[
    "open",
    "eval",
    "exec",
    "exit",
    "quit",
    "input",
    "compile",
    "breakpoint",
    "__import__",
];

const IMPORT_MARKERS: &[&str] = &["import ", "from "];

static DUNDER_ATTRIBUTE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\.(__[a-zA-Z_]+)").expect("dunder pattern is valid"));

static DISALLOWED_CALLS: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    DISALLOWED_FUNCTIONS
        .iter()
        .map(|func| {
            let pattern = format!(r"\b{}\s*\(", regex::escape(func));
            (*func, Regex::new(&pattern).expect("call pattern is valid"))
        })
        .collect()
});

/// Why a snippet was rejected
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SafetyViolation {
    #[error("Imports are not allowed in FSM actions/conditions.")]
    Import,
    /// Holds the full attribute name, underscores included
    #[error("Access to the attribute '{0}' is restricted.")]
    DunderAttribute(String),
    #[error("Calling the function '{0}' is not allowed for security reasons.")]
    DisallowedCall(&'static str),
}

pub type SafetyResult = Result<(), SafetyViolation>;

/// Check a snippet before execution. `Ok(())` means no rule fired.
///
/// Rules run in a fixed order (imports, dunder attributes, deny-listed calls)
/// and the first violation is reported. Calls are matched as whole words, so
/// `reopen(x)` passes while `open(x)` does not.
pub fn check_code_safety(code: &str) -> SafetyResult {
    if IMPORT_MARKERS.iter().any(|marker| code.contains(marker)) {
        return Err(SafetyViolation::Import);
    }

    if let Some(captures) = DUNDER_ATTRIBUTE.captures(code) {
        return Err(SafetyViolation::DunderAttribute(captures[1].to_string()));
    }

    if let Some((func, _)) = DISALLOWED_CALLS.iter().find(|(_, re)| re.is_match(code)) {
        return Err(SafetyViolation::DisallowedCall(*func));
    }

    Ok(())
}

/// Convenience wrapper returning `true` when the snippet passes every rule
pub fn is_code_safe(code: &str) -> bool {
    check_code_safety(code).is_ok()
}
