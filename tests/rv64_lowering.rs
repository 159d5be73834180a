use tcg_lower::samples::rv_isa;
use tcg_lower::{
    lower_instruction, lower_isa, DiagnosticKind, GraphBuilder, Instruction, Isa, JumpPolicy,
    LoweringConfig, Register, RegisterFile, TcgWidth,
};

/// Lower one sample instruction and return its listing.
fn lowered(xlen: u32, name: &str) -> String {
    let mut isa = rv_isa(xlen).unwrap();
    let config = LoweringConfig::default().with_word_width(TcgWidth::from_bits(xlen).unwrap());
    let instruction = isa
        .instructions
        .iter_mut()
        .find(|i| i.name == name)
        .unwrap_or_else(|| panic!("no sample instruction {}", name));
    lower_instruction(instruction, &config).unwrap_or_else(|d| panic!("{}: {}", name, d));
    instruction.listing().join("\n")
}

// ── listings ──

#[test]
fn test_add_writes_destination_directly() {
    insta::assert_snapshot!(lowered(64, "ADD"), @r"
    regfile_x_rs1 = get_x(rs1)
    regfile_x_rs2 = get_x(rs2)
    regfile_x_rd_dest = dest_x(rd)
    add_i64 regfile_x_rd_dest, regfile_x_rs1, regfile_x_rs2
    ");
}

#[test]
fn test_add_on_32_bit_words() {
    insta::assert_snapshot!(lowered(32, "ADD"), @r"
    regfile_x_rs1 = get_x(rs1)
    regfile_x_rs2 = get_x(rs2)
    regfile_x_rd_dest = dest_x(rd)
    add_i32 regfile_x_rd_dest, regfile_x_rs1, regfile_x_rs2
    ");
}

#[test]
fn test_conditional_branch() {
    insta::assert_snapshot!(lowered(64, "BEQ"), @r"
    tmp_equ_n7_0 = temp_new_i64
    const_0_n23 = constant_i64(0)
    regfile_x_rs1 = get_x(rs1)
    regfile_x_rs2 = get_x(rs2)
    setcond_i64 tmp_equ_n7_0, regfile_x_rs1, regfile_x_rs2, eq
    gen_label l_taken_0
    gen_label l_end_1
    brcond_i64 tmp_equ_n7_0, const_0_n23, ne, l_taken_0
    br l_end_1
    set_label l_taken_0
    goto_tb 1, (pc + sext(imm, 13))
    set_label l_end_1
    is_jmp = chain
    ");
}

#[test]
fn test_jump_and_link() {
    insta::assert_snapshot!(lowered(64, "JAL"), @r"
    const_add_n3 = constant_i64((pc + 4))
    regfile_x_rd_dest = dest_x(rd)
    mov_i64 regfile_x_rd_dest, const_add_n3
    goto_tb 1, (pc + sext(imm, 21))
    is_jmp = noreturn
    ");
}

#[test]
fn test_indirect_jump_computes_into_pc() {
    insta::assert_snapshot!(lowered(64, "JALR"), @r"
    tmp_add_n6_0 = temp_new_i64
    const_sext_n5 = constant_i64(sext(imm, 12))
    const_0xfffffffffffffffe_n8 = constant_i64(0xfffffffffffffffe)
    const_add_n13 = constant_i64((pc + 4))
    regfile_x_rs1 = get_x(rs1)
    reg_pc_dest = dest_pc
    regfile_x_rd_dest = dest_x(rd)
    add_i64 tmp_add_n6_0, regfile_x_rs1, const_sext_n5
    and_i64 reg_pc_dest, tmp_add_n6_0, const_0xfffffffffffffffe_n8
    mov_i64 regfile_x_rd_dest, const_add_n13
    lookup_and_goto_ptr
    is_jmp = noreturn
    ");
}

#[test]
fn test_translation_time_condition_emits_no_labels() {
    insta::assert_snapshot!(lowered(64, "CADDI"), @r"
    const_sext_n11 = constant_i64(sext(imm, 6))
    regfile_x_rd = get_x(rd)
    regfile_x_rd_dest = dest_x(rd)
    add_i64 regfile_x_rd_dest, regfile_x_rd, const_sext_n11
    ");
}

#[test]
fn test_count_leading_zeros() {
    insta::assert_snapshot!(lowered(64, "CLZ"), @r"
    const_0x40_n12 = constant_i64(0x40)
    regfile_x_rs1 = get_x(rs1)
    regfile_x_rd_dest = dest_x(rd)
    clz_i64 regfile_x_rd_dest, regfile_x_rs1, const_0x40_n12
    ");
}

#[test]
fn test_breakpoint_raises_with_pc() {
    insta::assert_snapshot!(lowered(64, "EBREAK"), @r"
    const_pc_n1 = constant_i64(pc)
    gen_exception breakpoint, const_pc_n1
    is_jmp = noreturn
    ");
}

#[test]
fn test_memory_access_modes() {
    let lhu = lowered(64, "LHU");
    assert!(lhu.contains("ld16u_i64 "), "{}", lhu);
    assert!(!lhu.contains("ext16"), "{}", lhu);

    let lb = lowered(64, "LB");
    assert!(lb.contains("ld8u_i64 "), "{}", lb);
    assert!(lb.contains("ext8s_i64 regfile_x_rd_dest, "), "{}", lb);

    let sw = lowered(64, "SW");
    assert!(sw.contains("trunc_i64 "), "{}", sw);
    assert!(sw.contains("st32s_i64 "), "{}", sw);
}

#[test]
fn test_arithmetic_shift_is_two_ops() {
    let sra = lowered(32, "SRA");
    let lines: Vec<&str> = sra.lines().filter(|l| !l.contains(" = ")).collect();
    assert_eq!(
        lines,
        vec![
            "ext32s_i32 tmp_l0, regfile_x_rs1",
            "shr_i32 regfile_x_rd_dest, tmp_l0, regfile_x_rs2",
        ]
    );
}

// ── whole instruction set ──

#[test]
fn test_report_covers_every_instruction() {
    let mut isa = rv_isa(64).unwrap();
    let count = isa.instructions.len();
    let report = lower_isa(&mut isa, &LoweringConfig::default()).unwrap();

    assert_eq!(report.isa, "RV64I");
    assert_eq!(report.rows.len(), count);
    assert_eq!(report.total_ops(), report.rows.iter().map(|r| r.ops).sum::<usize>());

    let policy = |name: &str| report.row(name).unwrap().policy;
    assert_eq!(policy("ADD"), None);
    assert_eq!(policy("BEQ"), Some(JumpPolicy::Chain));
    assert_eq!(policy("JAL"), Some(JumpPolicy::NoReturn));
    assert_eq!(policy("JALR"), Some(JumpPolicy::NoReturn));
    assert_eq!(policy("EBREAK"), Some(JumpPolicy::NoReturn));
    assert_eq!(report.row("BEQ").unwrap().labels, 2);
    assert_eq!(report.row("CADDI").unwrap().labels, 0);
}

#[test]
fn test_parallel_lowering_matches_sequential() {
    let mut sequential = rv_isa(64).unwrap();
    let mut parallel = rv_isa(64).unwrap();
    let a = lower_isa(&mut sequential, &LoweringConfig::default()).unwrap();
    let b = lower_isa(&mut parallel, &LoweringConfig::default().with_parallel(true)).unwrap();
    assert_eq!(a, b);
    for (x, y) in sequential.instructions.iter().zip(&parallel.instructions) {
        assert_eq!(x.listing(), y.listing(), "{}", x.name);
    }
}

#[test]
fn test_lowering_is_deterministic() {
    let first = lowered(64, "JALR");
    let second = lowered(64, "JALR");
    assert_eq!(first, second);
}

#[test]
fn test_failure_names_the_instruction() {
    let x = RegisterFile::new("X", 5, 64);
    let mut b = GraphBuilder::new();
    let rs1 = b.field("rs1", 5);
    let a = b.read_reg_file(&x, rs1);
    let rs2 = b.field("rs2", 5);
    let c = b.read_reg_file(&x, rs2);
    let picked = b.select(a, a, c, 64);
    let rd = b.field("rd", 5);
    b.write_reg_file(&x, rd, picked);

    let mut isa = rv_isa(64).unwrap();
    isa.retain_named(&["ADD".to_string()]);
    isa.push(Instruction::new("CMOV", b.finish()));
    let err = lower_isa(&mut isa, &LoweringConfig::default()).unwrap_err();
    assert_eq!(err.kind, DiagnosticKind::Unimplemented);
    assert!(err.notes.iter().any(|n| n == "in instruction `CMOV`"), "{:?}", err.notes);
}

#[test]
fn test_empty_behavior_lowers_to_nothing() {
    let mut isa = Isa::new("empty", Register::new("PC", 32));
    isa.push(Instruction::new("NOP", GraphBuilder::new().finish()));
    let report = lower_isa(&mut isa, &LoweringConfig::default()).unwrap();
    assert_eq!(report.total_ops(), 0);
    assert!(isa.instructions[0].listing().is_empty());
}
