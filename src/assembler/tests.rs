use super::{assemble, assemble_to_module, default_registry, Compiler};
use crate::core::lexer::tokenize;
use crate::core::statement::{group, StatementCursor};
use crate::vm::bytecode::{Bytecode, Constant};
use crate::vm::isa::{
    cond_bits, field_a, field_b_s32, field_b_u16, field_b_u32, field_c_u16, opcode_bits, Cond,
    Opcode,
};
use crate::vm::module::decode_module;

fn compile(source: &str) -> Bytecode {
    assemble("<test>", source).expect("assemble")
}

fn opcodes(bytecode: &Bytecode) -> Vec<u8> {
    bytecode.root.instructions.iter().map(|w| opcode_bits(*w)).collect()
}

#[test]
fn straight_line_program_compiles_to_expected_words() {
    let bytecode = compile("ldr $r0, #5\nldr $r1, #10\nadd $r0, $r0, $r1\nret");

    assert_eq!(bytecode.root.instructions.len(), 4);
    assert!(bytecode.constants.is_empty(), "both immediates fit inline");
    assert_eq!(
        opcodes(&bytecode),
        vec![
            Opcode::LoadInteger as u8,
            Opcode::LoadInteger as u8,
            Opcode::Add as u8,
            Opcode::Ret as u8,
        ]
    );
    for word in &bytecode.root.instructions {
        assert_eq!(cond_bits(*word), Cond::Always as u8);
    }

    let ldr0 = bytecode.root.instructions[0];
    assert_eq!(field_a(ldr0), 0);
    assert_eq!(field_b_s32(ldr0), 5);
    let ldr1 = bytecode.root.instructions[1];
    assert_eq!(field_a(ldr1), 1);
    assert_eq!(field_b_s32(ldr1), 10);
    let add = bytecode.root.instructions[2];
    assert_eq!((field_a(add), field_b_u16(add), field_c_u16(add)), (0, 0, 1));
}

#[test]
fn wide_immediate_goes_through_the_constant_pool() {
    let bytecode = compile("ldr $r0, #9999999999\nret");

    assert_eq!(bytecode.constants, vec![Constant::Integer(9_999_999_999)]);
    let load = bytecode.root.instructions[0];
    assert_eq!(opcode_bits(load), Opcode::LoadConstant as u8);
    assert_eq!(field_b_u32(load), 0);
}

#[test]
fn string_operand_goes_through_the_constant_pool() {
    let bytecode = compile("ldr $r3, \"hello\"\nret");

    assert_eq!(bytecode.constants, vec![Constant::String("hello".into())]);
    let load = bytecode.root.instructions[0];
    assert_eq!(opcode_bits(load), Opcode::LoadConstant as u8);
    assert_eq!(field_a(load), 3);
    assert_eq!(field_b_u32(load), 0);
}

#[test]
fn repeated_constants_are_not_deduplicated() {
    let bytecode = compile("ldr $r0, #9999999999\nldr $r1, #9999999999");
    assert_eq!(bytecode.constants.len(), 2);
    assert_eq!(field_b_u32(bytecode.root.instructions[0]), 0);
    assert_eq!(field_b_u32(bytecode.root.instructions[1]), 1);
}

#[test]
fn prototype_reference_before_definition_resolves_to_child_index() {
    let source = "\
ldr $r0, =second
ldr $r1, =first
.start_prototype first
ret
.end_prototype
.start_prototype second
nop
.end_prototype
ret
";
    let bytecode = compile(source);

    assert_eq!(bytecode.root.children.len(), 2);
    assert_eq!(bytecode.root.children[0].name, "first");
    assert_eq!(bytecode.root.children[1].name, "second");

    let load_second = bytecode.root.instructions[0];
    let load_first = bytecode.root.instructions[1];
    assert_eq!(opcode_bits(load_second), Opcode::LoadPrototype as u8);
    assert_eq!(field_b_u32(load_second), 1);
    assert_eq!(opcode_bits(load_first), Opcode::LoadPrototype as u8);
    assert_eq!(field_b_u32(load_first), 0);

    // The fix-up pass must leave no placeholder behind.
    assert!(!opcodes(&bytecode).contains(&(Opcode::LoadPrototypePending as u8)));
}

#[test]
fn nested_prototypes_resolve_in_their_own_scope() {
    let source = "\
.start_prototype outer
.start_prototype inner
ret
.end_prototype
ldr $r0, =inner
ret
.end_prototype
ret
";
    let bytecode = compile(source);

    assert_eq!(bytecode.root.children.len(), 1);
    let outer = &bytecode.root.children[0];
    assert_eq!(outer.children.len(), 1);
    assert_eq!(outer.children[0].name, "inner");
    let load = outer.instructions[0];
    assert_eq!(opcode_bits(load), Opcode::LoadPrototype as u8);
    assert_eq!(field_b_u32(load), 0);
}

#[test]
fn undefined_prototype_reference_fails_at_the_referencing_token() {
    let err = assemble("<test>", "ldr $r0, =Bar\nret").unwrap_err();
    let diag = err.diagnostic();
    assert_eq!(diag.message(), "Undefined prototype 'Bar' referenced");
    assert_eq!(diag.line(), 1);
    assert_eq!(diag.column(), Some(10));
}

#[test]
fn ldr_names_prototypes_not_jump_labels() {
    // `=spot` in ldr position is a prototype reference; the label
    // declaration of the same name does not satisfy it.
    let err = assemble("<test>", ":spot:\nldr $r0, =spot").unwrap_err();
    assert_eq!(
        err.diagnostic().message(),
        "Undefined prototype 'spot' referenced"
    );
}

#[test]
fn jump_to_undeclared_label_fails_at_the_referencing_token() {
    let err = assemble("<test>", "nop\nb =nowhere\nret").unwrap_err();
    let diag = err.diagnostic();
    assert_eq!(diag.message(), "Use of undefined label");
    assert_eq!(diag.line(), 2);
    assert_eq!(diag.column(), Some(3));
}

#[test]
fn jump_directions_and_magnitudes() {
    let source = "\
nop
b =end
nop
:end:
b =end
";
    let bytecode = compile(source);
    let words = &bytecode.root.instructions;

    let forward = words[1];
    assert_eq!(opcode_bits(forward), Opcode::JumpForward as u8);
    assert_eq!(field_b_u32(forward), 2);

    // Zero distance: the target equals the origin, which encodes as a
    // backward jump of magnitude zero.
    let zero = words[3];
    assert_eq!(opcode_bits(zero), Opcode::JumpBackward as u8);
    assert_eq!(field_b_u32(zero), 0);
}

#[test]
fn backward_jump_through_the_pipeline() {
    let bytecode = compile(":top:\nnop\nnop\nb.ne =top");
    let jump = bytecode.root.instructions[2];
    assert_eq!(opcode_bits(jump), Opcode::JumpBackward as u8);
    assert_eq!(cond_bits(jump), Cond::Ne as u8);
    assert_eq!(field_b_u32(jump), 2);
}

#[test]
fn condition_suffixes_reach_the_encoded_word() {
    let bytecode = compile("add.eq $r0, $r1, $r2\nmov.le $r0, $r1\nret.al");
    let words = &bytecode.root.instructions;
    assert_eq!(cond_bits(words[0]), Cond::Eq as u8);
    assert_eq!(cond_bits(words[1]), Cond::Le as u8);
    assert_eq!(cond_bits(words[2]), Cond::Always as u8);
}

#[test]
fn comments_do_not_affect_the_output() {
    let plain = compile("nop\nret");
    let commented = compile("/* prologue */\nnop\n/* body\nspans lines */\nret");
    assert_eq!(plain.root.instructions, commented.root.instructions);
}

#[test]
fn unknown_mnemonic_is_reported_with_position() {
    let err = assemble("<test>", "nop\nfrob $r0").unwrap_err();
    let diag = err.diagnostic();
    assert_eq!(diag.message(), "Unknown instruction 'frob'");
    assert_eq!(diag.line(), 2);
    assert_eq!(diag.column(), Some(1));
}

#[test]
fn wrong_operand_kind_is_reported() {
    let err = assemble("<test>", "add $r0, #1, $r2").unwrap_err();
    assert_eq!(
        err.diagnostic().message(),
        "Expected 'register', got immediate"
    );
}

#[test]
fn extra_operand_is_rejected() {
    let err = assemble("<test>", "nop $r0").unwrap_err();
    assert_eq!(err.diagnostic().message(), "Unexpected extra operand");
}

#[test]
fn repeated_runs_are_byte_identical() {
    let source = "ldr $r0, #5\nldr $r1, \"s\"\n.start_prototype f\nret\n.end_prototype\nldr $r2, =f\nret";
    let first = assemble_to_module("<test>", source).expect("assemble");
    let second = assemble_to_module("<test>", source).expect("assemble");
    assert_eq!(first, second);
}

#[test]
fn module_bytes_decode_back_to_the_compiled_tree() {
    let source = ".start_prototype f\nldr $r0, #7\nret\n.end_prototype\nldr $r0, =f\nret";
    let bytecode = compile(source);
    let module = assemble_to_module("<test>", source).expect("assemble");
    assert_eq!(decode_module(&module).expect("decode"), bytecode);
}

#[test]
fn diagnostics_render_source_line_with_caret() {
    let err = assemble("demo.pfasm", "nop\nfrob $r0").unwrap_err();
    let rendered = err.render(false);
    assert!(rendered.contains("demo.pfasm:2:1: ERROR [asm201]"));
    assert!(rendered.contains("    2 | frob $r0"));
    assert!(rendered.contains("      | ^"));
    assert!(rendered.ends_with("ERROR: Unknown instruction 'frob'"));
}

#[test]
fn unregistering_a_default_removes_the_mnemonic() {
    let lex = tokenize("<test>", "nop").expect("tokenize");
    let statements = group(&lex.tokens).expect("group");

    let mut registry = default_registry().expect("registry");
    registry.unregister("nop").expect("unregister");

    let compiler = Compiler::new(&registry, "<test>");
    let err = compiler
        .compile(&mut StatementCursor::new(&statements))
        .unwrap_err();
    assert_eq!(err.message(), "Unknown instruction 'nop'");
}
