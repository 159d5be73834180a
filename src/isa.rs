//! Architectural objects shared by every instruction of an ISA.
//!
//! Registers, register files and memories are immutable once the ISA is
//! built and are referenced from behavior graphs through `Arc`, so
//! instruction graphs can be lowered on different threads.

use std::fmt;
use std::sync::Arc;

use crate::graph::Graph;
use crate::span::Span;
use crate::tcg::TcgCtx;

// ─── Resources ────────────────────────────────────────────────────

/// A single architectural register (e.g. the program counter).
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct Register {
    pub name: String,
    pub width: u32,
}

impl Register {
    pub fn new(name: impl Into<String>, width: u32) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            width,
        })
    }
}

/// A register file addressed by a dynamic index.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct RegisterFile {
    pub name: String,
    pub index_width: u32,
    pub value_width: u32,
}

impl RegisterFile {
    pub fn new(name: impl Into<String>, index_width: u32, value_width: u32) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            index_width,
            value_width,
        })
    }
}

/// Byte-addressed guest memory.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct Memory {
    pub name: String,
    pub address_width: u32,
    pub word_width: u32,
}

impl Memory {
    pub fn new(name: impl Into<String>, address_width: u32, word_width: u32) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            address_width,
            word_width,
        })
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

impl fmt::Display for RegisterFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

impl fmt::Display for Memory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

// ─── Instructions ─────────────────────────────────────────────────

/// One instruction: its behavior graph and the lowering context attached
/// to it for the duration of the TCG passes.
#[derive(Debug)]
pub struct Instruction {
    pub name: String,
    pub span: Span,
    pub graph: Graph,
    pub ctx: Option<TcgCtx>,
}

impl Instruction {
    pub fn new(name: impl Into<String>, graph: Graph) -> Self {
        Self {
            name: name.into(),
            span: Span::dummy(),
            graph,
            ctx: None,
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Lowered micro-ops in control order, one line per op.
    pub fn listing(&self) -> Vec<String> {
        self.graph
            .lowered_ops()
            .iter()
            .map(|op| op.to_string())
            .collect()
    }
}

/// An instruction set: the instructions plus the resources they touch.
#[derive(Debug)]
pub struct Isa {
    pub name: String,
    pub pc: Arc<Register>,
    pub instructions: Vec<Instruction>,
}

impl Isa {
    pub fn new(name: impl Into<String>, pc: Arc<Register>) -> Self {
        Self {
            name: name.into(),
            pc,
            instructions: Vec::new(),
        }
    }

    pub fn push(&mut self, instruction: Instruction) {
        self.instructions.push(instruction);
    }

    pub fn instruction(&self, name: &str) -> Option<&Instruction> {
        self.instructions
            .iter()
            .find(|i| i.name.eq_ignore_ascii_case(name))
    }

    /// Keep only the named instructions (case-insensitive).
    pub fn retain_named(&mut self, names: &[String]) {
        if names.is_empty() {
            return;
        }
        self.instructions
            .retain(|i| names.iter().any(|n| n.eq_ignore_ascii_case(&i.name)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::builder::GraphBuilder;

    #[test]
    fn test_resource_display() {
        assert_eq!(Register::new("PC", 64).to_string(), "PC");
        assert_eq!(RegisterFile::new("X", 5, 64).to_string(), "X");
        assert_eq!(Memory::new("MEM", 64, 8).to_string(), "MEM");
    }

    #[test]
    fn test_isa_lookup_and_retain() {
        let mut isa = Isa::new("demo", Register::new("PC", 64));
        isa.push(Instruction::new("ADD", GraphBuilder::new().finish()));
        isa.push(Instruction::new("SUB", GraphBuilder::new().finish()));
        assert!(isa.instruction("add").is_some());
        assert!(isa.instruction("mul").is_none());

        isa.retain_named(&["sub".to_string()]);
        assert_eq!(isa.instructions.len(), 1);
        assert_eq!(isa.instructions[0].name, "SUB");
    }

    #[test]
    fn test_retain_empty_keeps_all() {
        let mut isa = Isa::new("demo", Register::new("PC", 64));
        isa.push(Instruction::new("ADD", GraphBuilder::new().finish()));
        isa.retain_named(&[]);
        assert_eq!(isa.instructions.len(), 1);
    }
}
