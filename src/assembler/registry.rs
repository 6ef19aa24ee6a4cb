// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Statement compiler registry: mnemonic-to-encoder dispatch.
//!
//! The registry decouples the Stage-2 parser from the instruction set. Each
//! entry maps one exact mnemonic (condition suffix included, so `add` and
//! `add.eq` are separate entries) to a [`Processor`] describing its operand
//! shape and condition code. Instruction sets compose through registration
//! and unregistration; the default set lives in [`super::processors`].

use std::collections::HashMap;
use std::fmt;

use crate::assembler::compiler::ScopeContext;
use crate::assembler::emitter::{EmitError, Label};
use crate::core::error::{AsmError, AsmErrorKind, Diagnostic};
use crate::core::statement::{Statement, TokenCursor};
use crate::core::token::{Token, TokenKind};
use crate::vm::isa::{Cond, Opcode};

/// Operand shape of one statement processor. The opcode is part of the
/// descriptor; the one-label and load shapes pick theirs during encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessorKind {
    /// `nop`, `ret`
    NoOperand(Opcode),
    /// `b =label`, emitted as a deferred jump.
    OneLabel,
    /// `mov $ra, $rb`
    TwoRegister(Opcode),
    /// `add $ra, $rb, $rc`
    ThreeRegister(Opcode),
    /// Polymorphic `ldr`: the second operand's token kind selects an inline
    /// immediate load, a constant-pool load, or a prototype-reference load.
    Load,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Processor {
    pub cond: Cond,
    pub kind: ProcessorKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    AlreadyExists { name: String },
    NotFound { name: String },
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyExists { name } => {
                write!(f, "Statement processor '{name}' already registered")
            }
            Self::NotFound { name } => write!(f, "Statement processor '{name}' not registered"),
        }
    }
}

impl std::error::Error for RegistryError {}

/// Name-keyed processor table. Fixed before Stage-2 parsing begins.
#[derive(Debug, Default)]
pub struct StatementRegistry {
    processors: HashMap<String, Processor>,
}

impl StatementRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: &str, processor: Processor) -> Result<(), RegistryError> {
        if self.processors.contains_key(name) {
            return Err(RegistryError::AlreadyExists {
                name: name.to_string(),
            });
        }
        self.processors.insert(name.to_string(), processor);
        Ok(())
    }

    pub fn unregister(&mut self, name: &str) -> Result<Processor, RegistryError> {
        self.processors
            .remove(name)
            .ok_or_else(|| RegistryError::NotFound {
                name: name.to_string(),
            })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.processors.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.processors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processors.is_empty()
    }

    /// Dispatch one instruction statement through its processor, emitting
    /// into the scope's emitter.
    pub fn compile(&self, ctx: &mut ScopeContext<'_>, statement: &Statement) -> Result<(), Diagnostic> {
        let mut cursor = statement.cursor();
        let mnemonic_token = cursor.next()?;
        let name = match &mnemonic_token.kind {
            TokenKind::Identifier(name) => name,
            other => {
                return Err(Diagnostic::at_token(
                    mnemonic_token,
                    AsmError::new(
                        AsmErrorKind::Internal,
                        format!("Statement dispatch on {} token", other.name()),
                    ),
                ));
            }
        };

        let processor = self.processors.get(name.as_str()).ok_or_else(|| {
            Diagnostic::at_token(
                mnemonic_token,
                AsmError::new(
                    AsmErrorKind::Compile,
                    format!("Unknown instruction '{name}'"),
                ),
            )
        })?;

        let cond = processor.cond;
        match processor.kind {
            ProcessorKind::NoOperand(op) => {
                emit_checked(ctx, mnemonic_token, |ctx| ctx.emitter_mut().emit_no_arg(op, cond))?;
            }
            ProcessorKind::OneLabel => {
                let label = read_label(ctx, &mut cursor)?;
                emit_checked(ctx, mnemonic_token, |ctx| {
                    ctx.emitter_mut().emit_jump(cond, label)
                })?;
            }
            ProcessorKind::TwoRegister(op) => {
                let a = read_register(&mut cursor)?;
                let b = read_register(&mut cursor)?;
                emit_checked(ctx, mnemonic_token, |ctx| {
                    ctx.emitter_mut().emit_u16x2(op, cond, a, b)
                })?;
            }
            ProcessorKind::ThreeRegister(op) => {
                let a = read_register(&mut cursor)?;
                let b = read_register(&mut cursor)?;
                let c = read_register(&mut cursor)?;
                emit_checked(ctx, mnemonic_token, |ctx| {
                    ctx.emitter_mut().emit_u16x3(op, cond, a, b, c)
                })?;
            }
            ProcessorKind::Load => compile_load(ctx, cond, mnemonic_token, &mut cursor)?,
        }

        reject_junk(&mut cursor)
    }
}

// `ldr $rd, <source>`: the source token kind selects the encoding.
fn compile_load(
    ctx: &mut ScopeContext<'_>,
    cond: Cond,
    mnemonic_token: &Token,
    cursor: &mut TokenCursor<'_>,
) -> Result<(), Diagnostic> {
    let reg = read_register(cursor)?;
    let source = cursor.next()?;
    match &source.kind {
        // Inline the integer into the instruction when it fits; otherwise go
        // through the constant pool.
        TokenKind::Immediate(value) => {
            if let Ok(inline) = i32::try_from(*value) {
                emit_checked(ctx, mnemonic_token, |ctx| {
                    ctx.emitter_mut()
                        .emit_u16_s32(Opcode::LoadInteger, cond, reg, inline)
                })
            } else {
                let index = ctx.add_integer_constant(*value, source)?;
                emit_checked(ctx, mnemonic_token, |ctx| {
                    ctx.emitter_mut()
                        .emit_u16_u32(Opcode::LoadConstant, cond, reg, index)
                })
            }
        }
        TokenKind::Str(text) => {
            let index = ctx.add_string_constant(text.clone(), source)?;
            emit_checked(ctx, mnemonic_token, |ctx| {
                ctx.emitter_mut()
                    .emit_u16_u32(Opcode::LoadConstant, cond, reg, index)
            })
        }
        // A label-shaped operand names a prototype, not a jump target. The
        // target may not be compiled yet; emit the pending placeholder with
        // the scope-local temporary id and let fix-up rewrite it.
        TokenKind::LabelRef(name) => {
            let temp_id = ctx.prototype_temp_id(name, source)?;
            emit_checked(ctx, mnemonic_token, |ctx| {
                ctx.emitter_mut()
                    .emit_u16_u32(Opcode::LoadPrototypePending, cond, reg, temp_id)
            })
        }
        other => Err(Diagnostic::at_token(
            source,
            AsmError::new(
                AsmErrorKind::Compile,
                format!("ldr: Unknown second operand ({})", other.name()),
            ),
        )),
    }
}

fn read_register(cursor: &mut TokenCursor<'_>) -> Result<u16, Diagnostic> {
    let token = cursor.next()?;
    match token.kind {
        TokenKind::Register(id) => Ok(id),
        ref other => Err(Diagnostic::at_token(
            token,
            AsmError::new(
                AsmErrorKind::Compile,
                format!("Expected 'register', got {}", other.name()),
            ),
        )),
    }
}

fn read_label(
    ctx: &mut ScopeContext<'_>,
    cursor: &mut TokenCursor<'_>,
) -> Result<Label, Diagnostic> {
    let token = cursor.next()?;
    match &token.kind {
        TokenKind::LabelRef(name) => Ok(ctx.get_or_create_label(name, token)),
        other => Err(Diagnostic::at_token(
            token,
            AsmError::new(
                AsmErrorKind::Compile,
                format!("Expected 'label reference', got {}", other.name()),
            ),
        )),
    }
}

fn reject_junk(cursor: &mut TokenCursor<'_>) -> Result<(), Diagnostic> {
    if cursor.is_exhausted() {
        return Ok(());
    }
    let token = cursor.next()?;
    Err(Diagnostic::at_token(
        token,
        AsmError::new(AsmErrorKind::Compile, "Unexpected extra operand"),
    ))
}

fn emit_checked(
    ctx: &mut ScopeContext<'_>,
    anchor: &Token,
    emit: impl FnOnce(&mut ScopeContext<'_>) -> Result<(), EmitError>,
) -> Result<(), Diagnostic> {
    emit(ctx).map_err(|err| emit_error_to_diagnostic(err, anchor))
}

pub(crate) fn emit_error_to_diagnostic(err: EmitError, anchor: &Token) -> Diagnostic {
    let kind = match &err {
        EmitError::CodeLimitExceeded => AsmErrorKind::Limit,
        EmitError::AlreadyFinalized | EmitError::ForeignLabel => AsmErrorKind::Internal,
        EmitError::LabelRedefined | EmitError::UndefinedLabel { .. } => AsmErrorKind::Emitter,
    };
    let anchor = match &err {
        EmitError::UndefinedLabel { origin } => origin,
        _ => anchor,
    };
    Diagnostic::at_token(anchor, AsmError::new(kind, err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn processor() -> Processor {
        Processor {
            cond: Cond::Always,
            kind: ProcessorKind::NoOperand(Opcode::Nop),
        }
    }

    #[test]
    fn duplicate_registration_fails() {
        let mut registry = StatementRegistry::new();
        registry.register("nop", processor()).expect("register");
        assert_eq!(
            registry.register("nop", processor()),
            Err(RegistryError::AlreadyExists {
                name: "nop".to_string()
            })
        );
    }

    #[test]
    fn register_unregister_register_cycle_succeeds() {
        let mut registry = StatementRegistry::new();
        registry.register("nop", processor()).expect("register");
        registry.unregister("nop").expect("unregister");
        registry
            .register("nop", processor())
            .expect("re-register after unregister");
    }

    #[test]
    fn unregister_of_unknown_name_fails() {
        let mut registry = StatementRegistry::new();
        assert_eq!(
            registry.unregister("frob"),
            Err(RegistryError::NotFound {
                name: "frob".to_string()
            })
        );
    }
}
