use std::{fmt, rc::Rc};

use thiserror::Error;

/// Position of a token or node within a source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourcePos {
    pub line: usize,
    pub column: usize,
    pub offset: usize,
    pub file: Option<Rc<str>>,
}

impl SourcePos {
    pub fn new(line: usize, column: usize, offset: usize) -> Self {
        Self {
            line,
            column,
            offset,
            file: None,
        }
    }

    pub fn with_file(mut self, file: Option<Rc<str>>) -> Self {
        self.file = file;
        self
    }
}

impl Default for SourcePos {
    fn default() -> Self {
        Self::new(1, 1, 0)
    }
}

impl fmt::Display for SourcePos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.file {
            Some(file) => write!(f, "{file}:{}:{}", self.line, self.column),
            None => write!(f, "{}:{}", self.line, self.column),
        }
    }
}

/// Classification of a diagnostic event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
    Lexer,
    Parser,
    Binding,
    Type,
    Runtime,
}

impl DiagnosticKind {
    pub fn label(self) -> &'static str {
        match self {
            DiagnosticKind::Lexer => "LexError",
            DiagnosticKind::Parser => "ParseError",
            DiagnosticKind::Binding => "BindingError",
            DiagnosticKind::Type => "TypeError",
            DiagnosticKind::Runtime => "RuntimeError",
        }
    }
}

/// Rich diagnostic information surfaced to end users.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub message: String,
    pub pos: Option<SourcePos>,
    pub notes: Vec<String>,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            pos: None,
            notes: Vec::new(),
        }
    }

    pub fn lexer(message: impl Into<String>) -> Self {
        Self::new(DiagnosticKind::Lexer, message)
    }

    pub fn parser(message: impl Into<String>) -> Self {
        Self::new(DiagnosticKind::Parser, message)
    }

    pub fn binding(message: impl Into<String>) -> Self {
        Self::new(DiagnosticKind::Binding, message)
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        Self::new(DiagnosticKind::Type, message)
    }

    pub fn runtime(message: impl Into<String>) -> Self {
        Self::new(DiagnosticKind::Runtime, message)
    }

    pub fn with_pos(mut self, pos: SourcePos) -> Self {
        self.pos = Some(pos);
        self
    }

    /// Attaches a position only when the diagnostic has none yet.
    pub fn or_pos(mut self, pos: &SourcePos) -> Self {
        if self.pos.is_none() {
            self.pos = Some(pos.clone());
        }
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind.label(), self.message)?;
        if let Some(pos) = &self.pos {
            write!(f, " at {pos}")?;
        }
        if !self.notes.is_empty() {
            writeln!(f)?;
            for note in &self.notes {
                writeln!(f, "  note: {note}")?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for Diagnostic {}

/// Unified error type for the Rill toolchain.
#[derive(Debug, Error)]
pub enum RillError {
    #[error("{0}")]
    Diagnostic(#[from] Diagnostic),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RillError {
    /// The diagnostic carried by this error, if it came from the language core.
    pub fn diagnostic(&self) -> Option<&Diagnostic> {
        match self {
            RillError::Diagnostic(diag) => Some(diag),
            RillError::Io(_) => None,
        }
    }

    pub fn kind(&self) -> Option<DiagnosticKind> {
        self.diagnostic().map(|diag| diag.kind)
    }

    pub(crate) fn with_note(self, note: impl Into<String>) -> Self {
        match self {
            RillError::Diagnostic(diag) => RillError::Diagnostic(diag.with_note(note)),
            other => other,
        }
    }

    pub(crate) fn or_pos(self, pos: &SourcePos) -> Self {
        match self {
            RillError::Diagnostic(diag) => RillError::Diagnostic(diag.or_pos(pos)),
            other => other,
        }
    }
}

pub type Result<T> = std::result::Result<T, RillError>;
