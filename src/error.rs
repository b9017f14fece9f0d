//! Error and linting utilities shared by every error type in this crate.

use std::error::Error;

use colored::Colorize;

/// A one-based `(line, column)` position into a source file, used to anchor
/// diagnostics at the point the scanner had reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SourcePos {
    pub line: usize,
    pub col: usize,
}

impl std::fmt::Display for SourcePos {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Ln {}, Col {}", self.line, self.col)
    }
}

/// Trait implemented by every error surfaced across this crate. Every
/// error attaches a [`Lint`] for coloured, position-aware reporting —
/// here always a single scanner position, since Brainfuck source carries
/// no identifiers to span.
pub trait ToolchainError: Error {
    /// Returns the lint attached to this error, if any.
    fn lint(&self) -> Option<Lint> {
        None
    }

    /// Returns a fancy print-ready description of the error.
    fn description(&self) -> String {
        let mut out = String::new();

        let lint = self.lint();
        let gravity = lint.as_ref().map_or(LintGravity::Error, |l| l.gravity);

        match gravity {
            LintGravity::Error => out.push_str(&"Error:".color(gravity.associated_color()).bold().to_string()),
            LintGravity::Warning => out.push_str(&"Warning:".color(gravity.associated_color()).bold().to_string()),
        }

        if let Some(pos) = lint.and_then(|l| l.pos) {
            out.push_str(&format!(" at {pos}\n"));
        } else {
            out.push('\n');
        }

        out.push_str(&format!(" → {}\n", self.to_string().underline().bold()));

        out
    }
}

/// A lint anchoring an error (or warning) to a position in the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Lint {
    gravity: LintGravity,
    pos: Option<SourcePos>,
}

impl Lint {
    /// Creates an error-gravity lint anchored at `pos`.
    pub fn error_at(pos: SourcePos) -> Lint {
        Lint { gravity: LintGravity::Error, pos: Some(pos) }
    }

    /// Creates an error-gravity lint with no specific position.
    pub fn error() -> Lint {
        Lint { gravity: LintGravity::Error, pos: None }
    }

    /// Creates a warning-gravity lint anchored at `pos`.
    pub fn warning_at(pos: SourcePos) -> Lint {
        Lint { gravity: LintGravity::Warning, pos: Some(pos) }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum LintGravity {
    #[default]
    Error,
    Warning,
}

impl LintGravity {
    fn associated_color(&self) -> colored::Color {
        match self {
            LintGravity::Error => colored::Color::Red,
            LintGravity::Warning => colored::Color::Yellow,
        }
    }
}
