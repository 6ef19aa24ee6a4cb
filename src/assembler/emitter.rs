// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Per-scope instruction accumulator with two-phase encoding.
//!
//! Fixed instructions are encoded immediately. Jumps depend on a label
//! location that may not exist yet, so they are recorded as pending entries
//! capturing the emission-time instruction pointer and resolved in a second
//! pass at [`CodeEmitter::finalize`]. Dropping an unfinalized emitter simply
//! discards its pending entries.
//!
//! Jump encoding uses two opcodes instead of a signed delta: a strictly
//! greater target selects `JUMP_FORWARD` with magnitude `target − origin`,
//! anything else selects `JUMP_BACKWARD` with magnitude `origin − target`.
//! A zero-distance jump (target == origin) is therefore a backward jump of
//! magnitude zero.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::core::token::Token;
use crate::vm::isa::{
    encode_no_arg, encode_u16_s32, encode_u16_u32, encode_u16x2, encode_u16x3, Cond,
    InstructionPointer, InstructionWord, Opcode,
};
use crate::vm::limits::MAX_CODE;

static NEXT_EMITTER_SERIAL: AtomicU32 = AtomicU32::new(1);

/// Copyable handle to a label slot inside one emitter. Handles from one
/// emitter are rejected by every other emitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Label {
    owner: u32,
    index: u32,
}

#[derive(Debug)]
struct LabelSlot {
    defined: bool,
    location: InstructionPointer,
    usage_count: u32,
    /// Token the label was first created for; anchors undefined-label errors.
    origin: Token,
}

#[derive(Debug)]
enum Pending {
    Fixed(InstructionWord),
    Jump {
        origin: InstructionPointer,
        cond: Cond,
        label_index: u32,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum EmitError {
    /// Operation on a finalized emitter, or finalize reentry. A bug in the
    /// caller, not a user error.
    AlreadyFinalized,
    /// Per-prototype code ceiling hit.
    CodeLimitExceeded,
    /// The label handle belongs to a different emitter.
    ForeignLabel,
    LabelRedefined,
    /// A jump target was never defined; `origin` is the referencing token.
    UndefinedLabel { origin: Token },
}

impl fmt::Display for EmitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyFinalized => write!(f, "Code emitter already finalized"),
            Self::CodeLimitExceeded => {
                write!(f, "Too many instructions generated (limit {MAX_CODE})")
            }
            Self::ForeignLabel => write!(f, "Label belongs to a different code emitter"),
            Self::LabelRedefined => write!(f, "Label already defined"),
            Self::UndefinedLabel { .. } => write!(f, "Use of undefined label"),
        }
    }
}

impl std::error::Error for EmitError {}

/// Accumulates one scope's instructions. `Building` until [`finalize`]
/// succeeds or fails, `Finalized` afterwards; finalize is single-shot.
///
/// [`finalize`]: CodeEmitter::finalize
#[derive(Debug)]
pub struct CodeEmitter {
    serial: u32,
    finalized: bool,
    labels: Vec<LabelSlot>,
    pending: Vec<Pending>,
    ip: InstructionPointer,
}

impl CodeEmitter {
    pub fn new() -> Self {
        Self {
            serial: NEXT_EMITTER_SERIAL.fetch_add(1, Ordering::Relaxed),
            finalized: false,
            labels: Vec::new(),
            pending: Vec::new(),
            ip: 0,
        }
    }

    /// Current instruction pointer: the index the next emit will occupy.
    pub fn ip(&self) -> InstructionPointer {
        self.ip
    }

    /// Allocate an undefined label, recording the token it was created for.
    pub fn new_label(&mut self, origin: &Token) -> Label {
        self.labels.push(LabelSlot {
            defined: false,
            location: 0,
            usage_count: 0,
            origin: origin.clone(),
        });
        Label {
            owner: self.serial,
            index: (self.labels.len() - 1) as u32,
        }
    }

    /// Mark a label defined at the current instruction pointer. The
    /// transition is one-way; redefinition fails.
    pub fn define_label(&mut self, label: Label) -> Result<(), EmitError> {
        let ip = self.ip;
        let slot = self.slot_mut(label)?;
        if slot.defined {
            return Err(EmitError::LabelRedefined);
        }
        slot.defined = true;
        slot.location = ip;
        Ok(())
    }

    pub fn label_usage_count(&self, label: Label) -> Result<u32, EmitError> {
        if label.owner != self.serial {
            return Err(EmitError::ForeignLabel);
        }
        Ok(self.labels[label.index as usize].usage_count)
    }

    pub fn emit_no_arg(&mut self, op: Opcode, cond: Cond) -> Result<(), EmitError> {
        self.emit(Pending::Fixed(encode_no_arg(op, cond)))
    }

    pub fn emit_u16x2(&mut self, op: Opcode, cond: Cond, a: u16, b: u16) -> Result<(), EmitError> {
        self.emit(Pending::Fixed(encode_u16x2(op, cond, a, b)))
    }

    pub fn emit_u16x3(
        &mut self,
        op: Opcode,
        cond: Cond,
        a: u16,
        b: u16,
        c: u16,
    ) -> Result<(), EmitError> {
        self.emit(Pending::Fixed(encode_u16x3(op, cond, a, b, c)))
    }

    pub fn emit_u16_u32(&mut self, op: Opcode, cond: Cond, a: u16, b: u32) -> Result<(), EmitError> {
        self.emit(Pending::Fixed(encode_u16_u32(op, cond, a, b)))
    }

    pub fn emit_u16_s32(&mut self, op: Opcode, cond: Cond, a: u16, b: i32) -> Result<(), EmitError> {
        self.emit(Pending::Fixed(encode_u16_s32(op, cond, a, b)))
    }

    /// Append a deferred jump to `target`, capturing the emission-time
    /// instruction pointer. The opcode and magnitude are chosen at finalize.
    pub fn emit_jump(&mut self, cond: Cond, target: Label) -> Result<(), EmitError> {
        let origin = self.ip;
        let slot = self.slot_mut(target)?;
        slot.usage_count += 1;
        self.emit(Pending::Jump {
            origin,
            cond,
            label_index: target.index,
        })
    }

    /// Resolve every pending entry and return the finalized instruction
    /// words, in emission order. Single-shot; must run after the scope's
    /// statements are fully consumed, so every label that will ever be
    /// defined already is.
    pub fn finalize(&mut self) -> Result<Vec<InstructionWord>, EmitError> {
        if self.finalized {
            return Err(EmitError::AlreadyFinalized);
        }
        self.finalized = true;

        let mut instructions = Vec::with_capacity(self.pending.len());
        for entry in &self.pending {
            instructions.push(match entry {
                Pending::Fixed(word) => *word,
                Pending::Jump {
                    origin,
                    cond,
                    label_index,
                } => {
                    let slot = &self.labels[*label_index as usize];
                    if !slot.defined {
                        return Err(EmitError::UndefinedLabel {
                            origin: slot.origin.clone(),
                        });
                    }
                    let target = slot.location;
                    let (op, magnitude) = if target > *origin {
                        (Opcode::JumpForward, target - origin)
                    } else {
                        (Opcode::JumpBackward, origin - target)
                    };
                    encode_u16_u32(op, *cond, 0, magnitude)
                }
            });
        }
        Ok(instructions)
    }

    fn emit(&mut self, entry: Pending) -> Result<(), EmitError> {
        if self.finalized {
            return Err(EmitError::AlreadyFinalized);
        }
        if self.ip >= MAX_CODE {
            return Err(EmitError::CodeLimitExceeded);
        }
        self.pending.push(entry);
        self.ip += 1;
        Ok(())
    }

    fn slot_mut(&mut self, label: Label) -> Result<&mut LabelSlot, EmitError> {
        if label.owner != self.serial {
            return Err(EmitError::ForeignLabel);
        }
        Ok(&mut self.labels[label.index as usize])
    }

    #[cfg(test)]
    pub(crate) fn force_ip_for_tests(&mut self, ip: InstructionPointer) {
        self.ip = ip;
    }
}

impl Default for CodeEmitter {
    fn default() -> Self {
        Self::new()
    }
}
