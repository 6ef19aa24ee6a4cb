// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Error types, diagnostics, and reporting for the assembler.
//!
//! Every fallible phase returns a tagged error; nothing unwinds. A
//! [`Diagnostic`] pairs an [`AsmError`] with the source position and line
//! context needed to render `file:line:col` messages with a caret. The first
//! failure aborts the whole compilation and is reported verbatim.

use std::fmt;

use crate::core::token::Token;
use crate::report::{caret_line, highlight_line};

/// Categories of assembler errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AsmErrorKind {
    Cli,
    /// Character-level tokenization failure.
    Lexer,
    /// Token-to-statement grouping failure.
    Statement,
    /// Stage-2 compilation failure (dispatch, directives, fix-up).
    Compile,
    /// Code emitter failure (labels, finalize).
    Emitter,
    /// Registry misuse (duplicate or missing processor name).
    Registry,
    /// A fixed ceiling was exceeded.
    Limit,
    Io,
    /// Module serialization failure.
    Codec,
    /// Invariant violation; a bug, not a user error.
    Internal,
}

/// An assembler error with a kind and message.
#[derive(Debug, Clone)]
pub struct AsmError {
    kind: AsmErrorKind,
    message: String,
}

impl AsmError {
    pub fn new(kind: AsmErrorKind, msg: impl Into<String>) -> Self {
        Self {
            kind,
            message: msg.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn kind(&self) -> AsmErrorKind {
        self.kind
    }
}

impl fmt::Display for AsmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AsmError {}

/// Severity level for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
}

/// A diagnostic message with location and source context.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    line: u32,
    column: Option<usize>,
    code: String,
    severity: Severity,
    error: AsmError,
    file: Option<String>,
    source: Option<String>,
}

impl Diagnostic {
    pub fn new(line: u32, severity: Severity, error: AsmError) -> Self {
        Self {
            line,
            column: None,
            code: default_diagnostic_code(error.kind()).to_string(),
            severity,
            error,
            file: None,
            source: None,
        }
    }

    /// Diagnostic anchored at a token, carrying its position and source line.
    pub fn at_token(token: &Token, error: AsmError) -> Self {
        Self::new(token.start.line, Severity::Error, error)
            .with_column(Some(token.start.column as usize))
            .with_file(Some(token.file.to_string()))
            .with_source(Some(token.line_text.to_string()))
    }

    pub fn with_column(mut self, column: Option<usize>) -> Self {
        self.column = column;
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = code.into();
        self
    }

    pub fn with_file(mut self, file: Option<String>) -> Self {
        self.file = file;
        self
    }

    pub fn with_source(mut self, source: Option<String>) -> Self {
        self.source = source;
        self
    }

    pub fn format(&self) -> String {
        let sev = match self.severity {
            Severity::Warning => "WARNING",
            Severity::Error => "ERROR",
        };
        format!(
            "{}: {} [{}] - {}",
            self.line,
            sev,
            self.code,
            self.error.message()
        )
    }

    /// Render the full diagnostic: header, source line with caret, message.
    pub fn format_with_context(&self, lines: Option<&[String]>, use_color: bool) -> String {
        let sev = match self.severity {
            Severity::Warning => "WARNING",
            Severity::Error => "ERROR",
        };
        let position = match self.column {
            Some(col) => format!("{}:{col}", self.line),
            None => format!("{}", self.line),
        };
        let header = match &self.file {
            Some(file) => format!("{file}:{position}: {sev} [{}]", self.code),
            None => format!("{position}: {sev} [{}]", self.code),
        };

        let mut out = String::new();
        out.push_str(&header);
        out.push('\n');
        for line in build_context_lines(
            self.line,
            self.column,
            lines,
            self.source.as_deref(),
            use_color,
        ) {
            out.push_str(&line);
            out.push('\n');
        }
        out.push_str(&format!("{sev}: {}", self.error.message()));
        out
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn line(&self) -> u32 {
        self.line
    }

    pub fn column(&self) -> Option<usize> {
        self.column
    }

    pub fn file(&self) -> Option<&str> {
        self.file.as_deref()
    }

    pub fn message(&self) -> &str {
        self.error.message()
    }

    pub fn error(&self) -> &AsmError {
        &self.error
    }
}

/// Error from a failed assembly run: the first (and only) diagnostic plus the
/// source lines needed to render it.
#[derive(Debug)]
pub struct AsmRunError {
    diagnostic: Diagnostic,
    source_lines: Vec<String>,
}

impl AsmRunError {
    pub fn new(diagnostic: Diagnostic, source_lines: Vec<String>) -> Self {
        Self {
            diagnostic,
            source_lines,
        }
    }

    pub fn diagnostic(&self) -> &Diagnostic {
        &self.diagnostic
    }

    pub fn source_lines(&self) -> &[String] {
        &self.source_lines
    }

    pub fn render(&self, use_color: bool) -> String {
        self.diagnostic
            .format_with_context(Some(&self.source_lines), use_color)
    }
}

impl fmt::Display for AsmRunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.diagnostic.error())
    }
}

impl std::error::Error for AsmRunError {}

/// Build context lines for error display.
pub fn build_context_lines(
    line_num: u32,
    column: Option<usize>,
    lines: Option<&[String]>,
    source_override: Option<&str>,
    use_color: bool,
) -> Vec<String> {
    let mut out = Vec::new();
    if line_num == 0 {
        return out;
    }
    let line_idx = (line_num - 1) as usize;

    let line = match source_override {
        Some(source) => source,
        None => match lines {
            Some(lines) if line_idx < lines.len() => lines[line_idx].as_str(),
            _ => {
                out.push(format!("{line_num:>5} | <source unavailable>"));
                return out;
            }
        },
    };

    out.push(format!(
        "{line_num:>5} | {}",
        highlight_line(line, column, use_color)
    ));
    if !use_color {
        if let Some(caret) = caret_line(line, column) {
            out.push(format!("{:>5} | {caret}", ""));
        }
    }
    out
}

fn default_diagnostic_code(kind: AsmErrorKind) -> &'static str {
    match kind {
        AsmErrorKind::Cli => "asm001",
        AsmErrorKind::Lexer => "asm101",
        AsmErrorKind::Statement => "asm102",
        AsmErrorKind::Compile => "asm201",
        AsmErrorKind::Emitter => "asm202",
        AsmErrorKind::Registry => "asm301",
        AsmErrorKind::Limit => "asm401",
        AsmErrorKind::Io => "asm501",
        AsmErrorKind::Codec => "asm601",
        AsmErrorKind::Internal => "asm901",
    }
}
