//! Bundled RV32I/RV64I-style instruction subset.
//!
//! The graphs are built the way the front end hands them over: calls
//! inlined, runtime values scheduled, side effects recorded on their
//! region. `SOURCE` is the behavior text the spans point into.

use std::sync::Arc;

use crate::diagnostic::Diagnostic;
use crate::graph::builder::GraphBuilder;
use crate::graph::{BuiltIn, Graph, NodeId};
use crate::isa::{Instruction, Isa, Memory, Register, RegisterFile};
use crate::span::Span;

pub const FILENAME: &str = "rv_base.vadl";

pub const SOURCE: &str = "\
instruction ADD   : Rtype = X(rd) := X(rs1) + X(rs2)
instruction SUB   : Rtype = X(rd) := X(rs1) - X(rs2)
instruction SLT   : Rtype = X(rd) := (X(rs1) <s X(rs2)) as Bits<XLEN>
instruction SLTU  : Rtype = X(rd) := (X(rs1) < X(rs2)) as Bits<XLEN>
instruction SRA   : Rtype = X(rd) := X(rs1) >>s X(rs2)
instruction ADDI  : Itype = X(rd) := X(rs1) + sext(imm)
instruction SRAI  : Itype = X(rd) := X(rs1) >>s shamt
instruction LB    : Itype = X(rd) := sext(MEM<1>(X(rs1) + sext(imm)))
instruction LHU   : Itype = X(rd) := zext(MEM<2>(X(rs1) + sext(imm)))
instruction SB    : Stype = MEM<1>(X(rs1) + sext(imm)) := X(rs2) as Bits<8>
instruction SW    : Stype = MEM<4>(X(rs1) + sext(imm)) := X(rs2) as Bits<32>
instruction BEQ   : Btype = if X(rs1) = X(rs2) then PC := PC + sext(imm)
instruction JAL   : Jtype = { X(rd) := PC + 4; PC := PC + sext(imm) }
instruction JALR  : Itype = { X(rd) := PC + 4; PC := (X(rs1) + sext(imm)) & ~1 }
instruction LUI   : Utype = X(rd) := sext(imm << 12)
instruction AUIPC : Utype = X(rd) := PC + sext(imm << 12)
instruction CADDI : CItype = if rd != 0 then X(rd) := X(rd) + sext(imm)
instruction CLZ   : Rtype = X(rd) := clz(X(rs1))
instruction EBREAK : Itype = raise BREAKPOINT(PC)
";

/// Span of the behavior line of `name` in `SOURCE`.
pub fn span_of(name: &str) -> Span {
    let needle = format!("instruction {} ", name);
    let Some(start) = SOURCE.find(&needle) else {
        return Span::dummy();
    };
    let len = SOURCE[start..].find('\n').unwrap_or(SOURCE.len() - start);
    Span::new(0, start as u32, (start + len) as u32)
}

/// Architectural state of the sample machine.
pub struct Machine {
    pub xlen: u32,
    pub pc: Arc<Register>,
    pub x: Arc<RegisterFile>,
    pub mem: Arc<Memory>,
}

impl Machine {
    pub fn new(xlen: u32) -> Self {
        Self {
            xlen,
            pc: Register::new("PC", xlen),
            x: RegisterFile::new("X", 5, xlen),
            mem: Memory::new("MEM", xlen, 8),
        }
    }

    fn all_ones(&self) -> u64 {
        if self.xlen >= 64 {
            u64::MAX
        } else {
            (1u64 << self.xlen) - 1
        }
    }
}

/// Common operand shapes.
struct Operands<'m> {
    m: &'m Machine,
    b: GraphBuilder,
}

impl<'m> Operands<'m> {
    fn new(m: &'m Machine, name: &str) -> Self {
        let mut b = GraphBuilder::new();
        b.at(span_of(name));
        Self { m, b }
    }

    fn reg(&mut self, field: &str) -> NodeId {
        let index = self.b.field(field, 5);
        self.b.read_reg_file(&self.m.x, index)
    }

    fn write_rd(&mut self, value: NodeId) {
        let rd = self.b.field("rd", 5);
        self.b.write_reg_file(&self.m.x, rd, value);
    }

    fn imm(&mut self, bits: u32) -> NodeId {
        let imm = self.b.field("imm", bits);
        self.b.sign_extend(imm, self.m.xlen)
    }

    fn effective_address(&mut self) -> NodeId {
        let base = self.reg("rs1");
        let offset = self.imm(12);
        self.b.builtin(BuiltIn::Add, &[base, offset], self.m.xlen)
    }

    fn finish(self) -> Graph {
        self.b.finish()
    }
}

fn r_type(m: &Machine, name: &str, op: BuiltIn) -> Instruction {
    let mut o = Operands::new(m, name);
    let a = o.reg("rs1");
    let b = o.reg("rs2");
    let sum = o.b.builtin(op, &[a, b], m.xlen);
    o.write_rd(sum);
    Instruction::new(name, o.finish()).with_span(span_of(name))
}

fn set_less(m: &Machine, name: &str, op: BuiltIn) -> Instruction {
    let mut o = Operands::new(m, name);
    let a = o.reg("rs1");
    let b = o.reg("rs2");
    let flag = o.b.builtin(op, &[a, b], 1);
    let wide = o.b.zero_extend(flag, m.xlen);
    o.write_rd(wide);
    Instruction::new(name, o.finish()).with_span(span_of(name))
}

fn addi(m: &Machine) -> Instruction {
    let mut o = Operands::new(m, "ADDI");
    let a = o.reg("rs1");
    let imm = o.imm(12);
    let sum = o.b.builtin(BuiltIn::Add, &[a, imm], m.xlen);
    o.write_rd(sum);
    Instruction::new("ADDI", o.finish()).with_span(span_of("ADDI"))
}

fn srai(m: &Machine) -> Instruction {
    let mut o = Operands::new(m, "SRAI");
    let a = o.reg("rs1");
    let shamt = o.b.field("shamt", 6);
    let shamt = o.b.zero_extend(shamt, m.xlen);
    let shifted = o.b.builtin(BuiltIn::Asr, &[a, shamt], m.xlen);
    o.write_rd(shifted);
    Instruction::new("SRAI", o.finish()).with_span(span_of("SRAI"))
}

fn load(m: &Machine, name: &str, bytes: u32, signed: bool) -> Instruction {
    let mut o = Operands::new(m, name);
    let address = o.effective_address();
    let value = o.b.read_mem(&m.mem, address, bytes * 8);
    let wide = if signed {
        o.b.sign_extend(value, m.xlen)
    } else {
        o.b.zero_extend(value, m.xlen)
    };
    o.write_rd(wide);
    Instruction::new(name, o.finish()).with_span(span_of(name))
}

fn store(m: &Machine, name: &str, bytes: u32) -> Instruction {
    let mut o = Operands::new(m, name);
    let address = o.effective_address();
    let mut value = o.reg("rs2");
    if bytes * 8 < m.xlen {
        value = o.b.truncate(value, bytes * 8);
    }
    o.b.write_mem(&m.mem, address, value);
    Instruction::new(name, o.finish()).with_span(span_of(name))
}

fn beq(m: &Machine) -> Instruction {
    let mut o = Operands::new(m, "BEQ");
    let a = o.reg("rs1");
    let b = o.reg("rs2");
    let equal = o.b.builtin(BuiltIn::Equ, &[a, b], 1);
    let pc = Arc::clone(&m.pc);
    let xlen = m.xlen;
    o.b.if_then(equal, |b| {
        let here = b.static_pc(xlen);
        let imm = b.field("imm", 13);
        let offset = b.sign_extend(imm, xlen);
        let target = b.builtin(BuiltIn::Add, &[here, offset], xlen);
        b.jump(&pc, target);
    });
    Instruction::new("BEQ", o.finish()).with_span(span_of("BEQ"))
}

fn link(o: &mut Operands<'_>) {
    let here = o.b.static_pc(o.m.xlen);
    let four = o.b.constant(4, o.m.xlen);
    let ret = o.b.builtin(BuiltIn::Add, &[here, four], o.m.xlen);
    o.write_rd(ret);
}

fn jal(m: &Machine) -> Instruction {
    let mut o = Operands::new(m, "JAL");
    link(&mut o);
    let here = o.b.static_pc(m.xlen);
    let offset = o.imm(21);
    let target = o.b.builtin(BuiltIn::Add, &[here, offset], m.xlen);
    o.b.jump(&m.pc, target);
    Instruction::new("JAL", o.finish()).with_span(span_of("JAL"))
}

fn jalr(m: &Machine) -> Instruction {
    let mut o = Operands::new(m, "JALR");
    let base = o.effective_address();
    let mask = o.b.constant(m.all_ones() - 1, m.xlen);
    let target = o.b.builtin(BuiltIn::And, &[base, mask], m.xlen);
    link(&mut o);
    o.b.jump(&m.pc, target);
    Instruction::new("JALR", o.finish()).with_span(span_of("JALR"))
}

fn upper_immediate(m: &Machine, name: &str, pc_relative: bool) -> Instruction {
    let mut o = Operands::new(m, name);
    let imm = o.b.field("imm", 20);
    let imm = o.b.zero_extend(imm, 32);
    let twelve = o.b.constant(12, 32);
    let shifted = o.b.builtin(BuiltIn::Lsl, &[imm, twelve], 32);
    let mut value = o.b.sign_extend(shifted, m.xlen);
    if pc_relative {
        let here = o.b.static_pc(m.xlen);
        value = o.b.builtin(BuiltIn::Add, &[here, value], m.xlen);
    }
    o.write_rd(value);
    Instruction::new(name, o.finish()).with_span(span_of(name))
}

fn caddi(m: &Machine) -> Instruction {
    let mut o = Operands::new(m, "CADDI");
    let rd = o.b.field("rd", 5);
    let zero = o.b.constant(0, 5);
    let nonzero = o.b.builtin(BuiltIn::Neq, &[rd, zero], 1);
    let x = Arc::clone(&m.x);
    let xlen = m.xlen;
    o.b.if_then(nonzero, |b| {
        let rd = b.field("rd", 5);
        let old = b.read_reg_file(&x, rd);
        let imm = b.field("imm", 6);
        let imm = b.sign_extend(imm, xlen);
        let sum = b.builtin(BuiltIn::Add, &[old, imm], xlen);
        let rd = b.field("rd", 5);
        b.write_reg_file(&x, rd, sum);
    });
    Instruction::new("CADDI", o.finish()).with_span(span_of("CADDI"))
}

fn clz(m: &Machine) -> Instruction {
    let mut o = Operands::new(m, "CLZ");
    let value = o.reg("rs1");
    let zeros = o.b.builtin(BuiltIn::Clz, &[value], m.xlen);
    o.write_rd(zeros);
    Instruction::new("CLZ", o.finish()).with_span(span_of("CLZ"))
}

fn ebreak(m: &Machine) -> Instruction {
    let mut o = Operands::new(m, "EBREAK");
    let here = o.b.static_pc(m.xlen);
    o.b.raise("BREAKPOINT", &[here]);
    Instruction::new("EBREAK", o.finish()).with_span(span_of("EBREAK"))
}

/// Build the sample instruction set for `xlen` (32 or 64).
pub fn rv_isa(xlen: u32) -> Result<Isa, Diagnostic> {
    if xlen != 32 && xlen != 64 {
        return Err(Diagnostic::config(format!("xlen must be 32 or 64, got {}", xlen)));
    }
    let m = Machine::new(xlen);
    let mut isa = Isa::new(format!("RV{}I", xlen), Arc::clone(&m.pc));
    for instruction in [
        r_type(&m, "ADD", BuiltIn::Add),
        r_type(&m, "SUB", BuiltIn::Sub),
        set_less(&m, "SLT", BuiltIn::Slth),
        set_less(&m, "SLTU", BuiltIn::Ulth),
        r_type(&m, "SRA", BuiltIn::Asr),
        addi(&m),
        srai(&m),
        load(&m, "LB", 1, true),
        load(&m, "LHU", 2, false),
        store(&m, "SB", 1),
        store(&m, "SW", 4),
        beq(&m),
        jal(&m),
        jalr(&m),
        upper_immediate(&m, "LUI", false),
        upper_immediate(&m, "AUIPC", true),
        caddi(&m),
        clz(&m),
        ebreak(&m),
    ] {
        isa.push(instruction);
    }
    Ok(isa)
}
