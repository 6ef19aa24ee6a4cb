// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! The default instruction set, built as a plain value and installed into a
//! fresh registry per compilation. Each base mnemonic registers eight
//! variants: unsuffixed plus one per condition suffix, with `.al` equal to
//! the unsuffixed form.

use crate::assembler::registry::{Processor, ProcessorKind, RegistryError, StatementRegistry};
use crate::vm::isa::{Cond, Opcode, CONDITIONS};

fn base_set() -> [(&'static str, ProcessorKind); 12] {
    [
        // Pseudo instruction: encodes as LOAD_INTEGER, LOAD_CONSTANT, or a
        // prototype load depending on its second operand.
        ("ldr", ProcessorKind::Load),
        ("nop", ProcessorKind::NoOperand(Opcode::Nop)),
        ("ret", ProcessorKind::NoOperand(Opcode::Ret)),
        ("b", ProcessorKind::OneLabel),
        ("mov", ProcessorKind::TwoRegister(Opcode::Mov)),
        ("cmp", ProcessorKind::TwoRegister(Opcode::Cmp)),
        ("add", ProcessorKind::ThreeRegister(Opcode::Add)),
        ("sub", ProcessorKind::ThreeRegister(Opcode::Sub)),
        ("mul", ProcessorKind::ThreeRegister(Opcode::Mul)),
        ("div", ProcessorKind::ThreeRegister(Opcode::Div)),
        ("mod", ProcessorKind::ThreeRegister(Opcode::Mod)),
        ("pow", ProcessorKind::ThreeRegister(Opcode::Pow)),
    ]
}

/// The default processor table as an explicit value: every base mnemonic
/// times every condition variant.
pub fn default_processors() -> Vec<(String, Processor)> {
    let mut out = Vec::new();
    for (name, kind) in base_set() {
        out.push((
            name.to_string(),
            Processor {
                cond: Cond::Always,
                kind,
            },
        ));
        for cond in CONDITIONS {
            out.push((format!("{name}.{}", cond.suffix()), Processor { cond, kind }));
        }
    }
    out
}

/// A fresh registry with the default set installed.
pub fn default_registry() -> Result<StatementRegistry, RegistryError> {
    let mut registry = StatementRegistry::new();
    for (name, processor) in default_processors() {
        registry.register(&name, processor)?;
    }
    Ok(registry)
}
