// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Assembler pipeline: source text in, bytecode container out.
//!
//! `assemble` runs the batch pipeline once: tokenize, group into statements,
//! then compile the statement stream into the prototype tree with the
//! default instruction set. Compilation is single-threaded and
//! deterministic; the only early exit is the first error.

pub mod cli;
mod compiler;
mod emitter;
mod processors;
mod registry;
#[cfg(test)]
mod tests;

pub use compiler::{Compiler, ScopeContext, ROOT_PROTOTYPE_NAME};
pub use emitter::{CodeEmitter, EmitError, Label};
pub use processors::{default_processors, default_registry};
pub use registry::{Processor, ProcessorKind, RegistryError, StatementRegistry};

use crate::core::error::{AsmError, AsmErrorKind, AsmRunError, Diagnostic, Severity};
use crate::core::lexer;
use crate::core::statement::{self, StatementCursor};
use crate::vm::bytecode::Bytecode;
use crate::vm::module::encode_module;

/// Assemble one input into a bytecode container.
pub fn assemble(input_name: &str, source: &str) -> Result<Bytecode, AsmRunError> {
    let lex = lexer::tokenize(input_name, source)
        .map_err(|diag| AsmRunError::new(diag, source_lines(source)))?;

    let statements = statement::group(&lex.tokens)
        .map_err(|diag| AsmRunError::new(diag, lex.lines.clone()))?;

    let registry = default_registry().map_err(|err| {
        AsmRunError::new(
            internal_diagnostic(input_name, err.to_string()),
            lex.lines.clone(),
        )
    })?;

    let compiler = Compiler::new(&registry, input_name);
    compiler
        .compile(&mut StatementCursor::new(&statements))
        .map_err(|diag| AsmRunError::new(diag, lex.lines.clone()))
}

/// Assemble one input straight to serialized module bytes.
pub fn assemble_to_module(input_name: &str, source: &str) -> Result<Vec<u8>, AsmRunError> {
    let bytecode = assemble(input_name, source)?;
    encode_module(&bytecode).map_err(|err| {
        AsmRunError::new(
            Diagnostic::new(
                0,
                Severity::Error,
                AsmError::new(AsmErrorKind::Codec, err.to_string()),
            )
            .with_file(Some(input_name.to_string())),
            source_lines(source),
        )
    })
}

fn internal_diagnostic(input_name: &str, message: String) -> Diagnostic {
    Diagnostic::new(
        0,
        Severity::Error,
        AsmError::new(AsmErrorKind::Internal, message),
    )
    .with_file(Some(input_name.to_string()))
}

fn source_lines(source: &str) -> Vec<String> {
    source.lines().map(str::to_string).collect()
}
