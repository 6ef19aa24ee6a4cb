// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Stage-2 parser: compiles the statement stream into the prototype tree.
//!
//! Each scope gets a fresh emitter plus two scope-local tables (label name →
//! label handle, prototype name → registry entry). All recursive scopes
//! drain one shared forward-only statement cursor: a nested
//! `.start_prototype` consumes statements from the same stream as its
//! parent, and the cursor is threaded explicitly through every call.
//!
//! Two forward-reference mechanisms resolve at different times. Labels are
//! scope-local and resolve inside the emitter's finalize. Prototype
//! references may name a scope that has not been scanned yet, so they go
//! through a dense temporary id and a fix-up pass that runs once the whole
//! scope, every nested child included, has been walked.

use std::collections::HashMap;

use crate::assembler::emitter::{CodeEmitter, EmitError, Label};
use crate::assembler::registry::{emit_error_to_diagnostic, StatementRegistry};
use crate::core::error::{AsmError, AsmErrorKind, Diagnostic, Severity};
use crate::core::statement::{Statement, StatementCursor, StatementKind};
use crate::core::token::{SourcePos, Token, TokenKind};
use crate::vm::bytecode::{Bytecode, ConstantPool, Prototype};
use crate::vm::isa::{
    cond_bits, encode_u16_u32, field_a, field_b_u32, opcode_bits, Cond, Opcode,
};
use crate::vm::limits::MAX_PROTOTYPES;

/// Name recorded for the entry scope.
pub const ROOT_PROTOTYPE_NAME: &str = "main";

/// Scope-local forward-reference record for one prototype name. Its index in
/// the entry vector is the temporary id carried by pending load
/// instructions; no re-hash happens at resolution time.
#[derive(Debug)]
struct ProtoEntry {
    name: String,
    first_ref: Token,
    resolved: Option<u32>,
}

/// The per-scope compilation state handed to statement processors: the
/// scope's emitter, its label and prototype tables, and the shared constant
/// pool.
#[derive(Debug)]
pub struct ScopeContext<'a> {
    emitter: CodeEmitter,
    labels: HashMap<String, Label>,
    proto_ids: HashMap<String, u32>,
    proto_entries: Vec<ProtoEntry>,
    constants: &'a mut ConstantPool,
}

impl<'a> ScopeContext<'a> {
    fn new(constants: &'a mut ConstantPool) -> Self {
        Self {
            emitter: CodeEmitter::new(),
            labels: HashMap::new(),
            proto_ids: HashMap::new(),
            proto_entries: Vec::new(),
            constants,
        }
    }

    pub fn emitter_mut(&mut self) -> &mut CodeEmitter {
        &mut self.emitter
    }

    /// Label handle for `name`, creating an undefined label on first use.
    pub fn get_or_create_label(&mut self, name: &str, token: &Token) -> Label {
        if let Some(label) = self.labels.get(name) {
            return *label;
        }
        let label = self.emitter.new_label(token);
        self.labels.insert(name.to_string(), label);
        label
    }

    /// Dense temporary id for a prototype name, creating the registry entry
    /// on first reference.
    pub fn prototype_temp_id(&mut self, name: &str, token: &Token) -> Result<u32, Diagnostic> {
        if let Some(id) = self.proto_ids.get(name) {
            return Ok(*id);
        }
        if self.proto_entries.len() as u64 >= u64::from(MAX_PROTOTYPES) {
            return Err(Diagnostic::at_token(
                token,
                AsmError::new(
                    AsmErrorKind::Limit,
                    format!("Too many prototypes referenced (limit {MAX_PROTOTYPES})"),
                ),
            ));
        }
        let id = self.proto_entries.len() as u32;
        self.proto_entries.push(ProtoEntry {
            name: name.to_string(),
            first_ref: token.clone(),
            resolved: None,
        });
        self.proto_ids.insert(name.to_string(), id);
        Ok(id)
    }

    pub fn add_integer_constant(&mut self, value: i64, anchor: &Token) -> Result<u32, Diagnostic> {
        self.constants
            .add_integer(value)
            .map_err(|err| Diagnostic::at_token(anchor, AsmError::new(AsmErrorKind::Limit, err.to_string())))
    }

    pub fn add_string_constant(
        &mut self,
        value: String,
        anchor: &Token,
    ) -> Result<u32, Diagnostic> {
        self.constants
            .add_string(value)
            .map_err(|err| Diagnostic::at_token(anchor, AsmError::new(AsmErrorKind::Limit, err.to_string())))
    }
}

/// Drives the statement stream into a resolved [`Bytecode`].
pub struct Compiler<'a> {
    registry: &'a StatementRegistry,
    input_name: String,
}

impl<'a> Compiler<'a> {
    pub fn new(registry: &'a StatementRegistry, input_name: &str) -> Self {
        Self {
            registry,
            input_name: input_name.to_string(),
        }
    }

    /// Compile the whole stream. The first failure in any scope unwinds the
    /// entire compilation; no partial bytecode is produced.
    pub fn compile(&self, cursor: &mut StatementCursor<'_>) -> Result<Bytecode, Diagnostic> {
        let mut constants = ConstantPool::new();
        let root = self.compile_scope(
            cursor,
            &mut constants,
            ROOT_PROTOTYPE_NAME,
            SourcePos::default(),
            None,
        )?;
        Ok(Bytecode {
            root,
            constants: constants.into_constants(),
        })
    }

    // One recursive scope. `opened_at` is the `.start_prototype` token for
    // nested scopes and `None` for the EOF-safe root.
    fn compile_scope(
        &self,
        cursor: &mut StatementCursor<'_>,
        constants: &mut ConstantPool,
        name: &str,
        defined_at: SourcePos,
        opened_at: Option<&Token>,
    ) -> Result<Prototype, Diagnostic> {
        let mut ctx = ScopeContext::new(constants);
        let mut proto = Prototype::new(self.input_name.clone(), name, defined_at);

        loop {
            let statement = match cursor.next() {
                Some(statement) => statement,
                None => match opened_at {
                    None => break,
                    Some(directive) => {
                        return Err(Diagnostic::at_token(
                            directive,
                            AsmError::new(
                                AsmErrorKind::Compile,
                                format!("Unexpected end of input: prototype '{name}' is missing '.end_prototype'"),
                            ),
                        ));
                    }
                },
            };

            match statement.kind {
                StatementKind::Comment => continue,
                StatementKind::Instruction => self.registry.compile(&mut ctx, statement)?,
                StatementKind::LabelDeclare => define_label(&mut ctx, statement.leading())?,
                StatementKind::AssemblerDirective => {
                    if self.directive(&mut ctx, cursor, &mut proto, statement)? {
                        break;
                    }
                }
            }
        }

        let mut instructions = ctx.emitter.finalize().map_err(|err| match err {
            EmitError::UndefinedLabel { origin } => Diagnostic::at_token(
                &origin,
                AsmError::new(AsmErrorKind::Emitter, "Use of undefined label"),
            ),
            other => self.internal_error(other.to_string()),
        })?;

        self.fix_prototype_loads(&ctx, &mut instructions)?;
        proto.instructions = instructions;
        Ok(proto)
    }

    // Handle one directive statement. Returns true when the scope ends.
    fn directive(
        &self,
        ctx: &mut ScopeContext<'_>,
        cursor: &mut StatementCursor<'_>,
        proto: &mut Prototype,
        statement: &Statement,
    ) -> Result<bool, Diagnostic> {
        let leading = statement.leading();
        let directive = match &leading.kind {
            TokenKind::DirectiveName(name) => name.as_str(),
            other => {
                return Err(self.internal_error(format!(
                    "Directive dispatch on {} token",
                    other.name()
                )));
            }
        };

        match directive {
            "start_prototype" => {
                let mut tokens = statement.cursor();
                tokens.next()?;
                let (name_token, proto_name) = tokens.next_identifier()?;
                if !tokens.is_exhausted() {
                    return Err(Diagnostic::at_token(
                        tokens.next()?,
                        AsmError::new(AsmErrorKind::Compile, "Unexpected extra operand"),
                    ));
                }

                let temp_id = ctx.prototype_temp_id(proto_name, name_token)?;
                if ctx.proto_entries[temp_id as usize].resolved.is_some() {
                    return Err(Diagnostic::at_token(
                        name_token,
                        AsmError::new(
                            AsmErrorKind::Compile,
                            format!("Double prototype definition: '{proto_name}'"),
                        ),
                    ));
                }

                let child = self.compile_scope(
                    cursor,
                    ctx.constants,
                    proto_name,
                    name_token.start,
                    Some(leading),
                )?;
                proto.children.push(child);
                ctx.proto_entries[temp_id as usize].resolved =
                    Some((proto.children.len() - 1) as u32);
                Ok(false)
            }
            "end_prototype" => {
                let mut tokens = statement.cursor();
                tokens.next()?;
                if !tokens.is_exhausted() {
                    return Err(Diagnostic::at_token(
                        tokens.next()?,
                        AsmError::new(AsmErrorKind::Compile, "Unexpected extra operand"),
                    ));
                }
                Ok(true)
            }
            other => Err(Diagnostic::at_token(
                leading,
                AsmError::new(
                    AsmErrorKind::Compile,
                    format!("Unknown directive '.{other}'"),
                ),
            )),
        }
    }

    // Rewrite every pending prototype load in place: placeholder opcode →
    // real load opcode, temporary id → resolved child index.
    fn fix_prototype_loads(
        &self,
        ctx: &ScopeContext<'_>,
        instructions: &mut [u64],
    ) -> Result<(), Diagnostic> {
        for word in instructions.iter_mut() {
            if opcode_bits(*word) != Opcode::LoadPrototypePending as u8 {
                continue;
            }
            let temp_id = field_b_u32(*word) as usize;
            let entry = ctx
                .proto_entries
                .get(temp_id)
                .ok_or_else(|| self.internal_error(format!("Fix-up id {temp_id} out of range")))?;
            let resolved = match entry.resolved {
                Some(index) => index,
                None => {
                    return Err(Diagnostic::at_token(
                        &entry.first_ref,
                        AsmError::new(
                            AsmErrorKind::Compile,
                            format!("Undefined prototype '{}' referenced", entry.name),
                        ),
                    ));
                }
            };
            let cond = Cond::from_u8(cond_bits(*word))
                .ok_or_else(|| self.internal_error("Bad condition bits in fix-up".to_string()))?;
            *word = encode_u16_u32(Opcode::LoadPrototype, cond, field_a(*word), resolved);
        }
        Ok(())
    }

    fn internal_error(&self, message: String) -> Diagnostic {
        Diagnostic::new(
            0,
            Severity::Error,
            AsmError::new(AsmErrorKind::Internal, message),
        )
        .with_file(Some(self.input_name.clone()))
    }
}

fn define_label(ctx: &mut ScopeContext<'_>, token: &Token) -> Result<(), Diagnostic> {
    let name = match &token.kind {
        TokenKind::LabelDecl(name) => name.clone(),
        other => {
            return Err(Diagnostic::at_token(
                token,
                AsmError::new(
                    AsmErrorKind::Internal,
                    format!("Label definition on {} token", other.name()),
                ),
            ));
        }
    };
    let label = ctx.get_or_create_label(&name, token);
    ctx.emitter.define_label(label).map_err(|err| match err {
        EmitError::LabelRedefined => Diagnostic::at_token(
            token,
            AsmError::new(
                AsmErrorKind::Emitter,
                format!("Double label definition: Label '{name}'"),
            ),
        ),
        other => emit_error_to_diagnostic(other, token),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::processors::default_registry;
    use crate::core::lexer::tokenize;
    use crate::core::statement::group;

    fn compile(source: &str) -> Result<Bytecode, Diagnostic> {
        let lex = tokenize("<test>", source).expect("tokenize");
        let statements = group(&lex.tokens).expect("group");
        let registry = default_registry().expect("registry");
        let compiler = Compiler::new(&registry, "<test>");
        compiler.compile(&mut StatementCursor::new(&statements))
    }

    #[test]
    fn empty_input_yields_empty_root() {
        let bytecode = compile("").expect("compile");
        assert_eq!(bytecode.root.name, ROOT_PROTOTYPE_NAME);
        assert!(bytecode.root.instructions.is_empty());
        assert!(bytecode.root.children.is_empty());
        assert!(bytecode.constants.is_empty());
    }

    #[test]
    fn nested_scope_without_terminator_fails() {
        let err = compile(".start_prototype inner\nnop").unwrap_err();
        assert!(err.message().contains("missing '.end_prototype'"));
        assert_eq!(err.line(), 1);
    }

    #[test]
    fn unknown_directive_is_scope_fatal() {
        let err = compile(".align 4").unwrap_err();
        assert_eq!(err.message(), "Unknown directive '.align'");
    }

    #[test]
    fn root_end_prototype_stops_consumption() {
        let bytecode = compile("nop\n.end_prototype\nret").expect("compile");
        assert_eq!(bytecode.root.instructions.len(), 1);
    }

    #[test]
    fn double_label_definition_is_scope_fatal() {
        let err = compile(":here:\n:here:").unwrap_err();
        assert_eq!(err.message(), "Double label definition: Label 'here'");
        assert_eq!(err.line(), 2);
    }

    #[test]
    fn double_prototype_definition_is_scope_fatal() {
        let err = compile(
            ".start_prototype f\n.end_prototype\n.start_prototype f\n.end_prototype",
        )
        .unwrap_err();
        assert_eq!(err.message(), "Double prototype definition: 'f'");
    }

    #[test]
    fn sibling_scopes_have_independent_labels() {
        let source = "\
.start_prototype one
:spot:
b =spot
.end_prototype
.start_prototype two
:spot:
b =spot
.end_prototype
";
        let bytecode = compile(source).expect("compile");
        assert_eq!(bytecode.root.children.len(), 2);
    }
}
