//! Value model: the typed variable handle every TCG pass manipulates.
//!
//! A `TcgV` is an abstract, unlimited operand register of the target
//! virtual machine. It is either a temporary, a translation-time constant,
//! or bound to an architectural register / register-file element.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::graph::NodeId;
use crate::isa::{Register, RegisterFile};

// ─── Widths ───────────────────────────────────────────────────────

/// Width of a general TCG variable. The VM only knows 32 and 64 bit values.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TcgWidth {
    I32,
    I64,
}

impl TcgWidth {
    pub fn from_bits(bits: u32) -> Option<Self> {
        match bits {
            32 => Some(TcgWidth::I32),
            64 => Some(TcgWidth::I64),
            _ => None,
        }
    }

    pub fn bits(self) -> u32 {
        match self {
            TcgWidth::I32 => 32,
            TcgWidth::I64 => 64,
        }
    }
}

impl fmt::Display for TcgWidth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TcgWidth::I32 => write!(f, "i32"),
            TcgWidth::I64 => write!(f, "i64"),
        }
    }
}

/// Size of a memory transfer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TransferSize {
    B8,
    B16,
    B32,
    B64,
}

impl TransferSize {
    pub fn from_bits(bits: u32) -> Option<Self> {
        match bits {
            8 => Some(TransferSize::B8),
            16 => Some(TransferSize::B16),
            32 => Some(TransferSize::B32),
            64 => Some(TransferSize::B64),
            _ => None,
        }
    }

    pub fn bits(self) -> u32 {
        match self {
            TransferSize::B8 => 8,
            TransferSize::B16 => 16,
            TransferSize::B32 => 32,
            TransferSize::B64 => 64,
        }
    }
}

impl fmt::Display for TransferSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.bits())
    }
}

/// How a narrow value is widened to the variable width.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TcgExtend {
    Zero,
    Sign,
}

impl fmt::Display for TcgExtend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TcgExtend::Zero => write!(f, "u"),
            TcgExtend::Sign => write!(f, "s"),
        }
    }
}

/// Condition codes of `setcond` / `brcond`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TcgCondition {
    Eq,
    Ne,
    Lt,
    Ge,
    Le,
    Gt,
    Ltu,
    Geu,
    Leu,
    Gtu,
    /// `(a & b) == 0`
    TstEq,
    /// `(a & b) != 0`
    TstNe,
}

impl fmt::Display for TcgCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TcgCondition::Eq => "eq",
            TcgCondition::Ne => "ne",
            TcgCondition::Lt => "lt",
            TcgCondition::Ge => "ge",
            TcgCondition::Le => "le",
            TcgCondition::Gt => "gt",
            TcgCondition::Ltu => "ltu",
            TcgCondition::Geu => "geu",
            TcgCondition::Leu => "leu",
            TcgCondition::Gtu => "gtu",
            TcgCondition::TstEq => "tsteq",
            TcgCondition::TstNe => "tstne",
        };
        write!(f, "{}", s)
    }
}

// ─── Variables ────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum VarKind {
    Temp,
    Const,
    Reg,
    RegFile,
}

/// The architectural location a `Reg`/`RegFile` variable stands for.
#[derive(Clone, Debug)]
pub enum Binding {
    Reg(Arc<Register>),
    RegFile {
        file: Arc<RegisterFile>,
        /// Index expression; evaluated at translation time.
        index: NodeId,
    },
}

/// A TCG variable. Identity (equality, hashing) is the generated name,
/// which is unique within one instruction.
#[derive(Clone, Debug)]
pub struct TcgV {
    pub name: String,
    pub width: TcgWidth,
    pub kind: VarKind,
    pub binding: Option<Binding>,
    pub is_dest: bool,
    /// Decode-time expression a `Const` variable is initialized with.
    pub const_value: Option<NodeId>,
}

impl TcgV {
    pub fn temp(name: impl Into<String>, width: TcgWidth) -> Self {
        Self {
            name: name.into(),
            width,
            kind: VarKind::Temp,
            binding: None,
            is_dest: false,
            const_value: None,
        }
    }

    pub fn constant(name: impl Into<String>, width: TcgWidth, value: NodeId) -> Self {
        Self {
            name: name.into(),
            width,
            kind: VarKind::Const,
            binding: None,
            is_dest: false,
            const_value: Some(value),
        }
    }

    pub fn reg(name: impl Into<String>, width: TcgWidth, reg: Arc<Register>, is_dest: bool) -> Self {
        Self {
            name: name.into(),
            width,
            kind: VarKind::Reg,
            binding: Some(Binding::Reg(reg)),
            is_dest,
            const_value: None,
        }
    }

    pub fn reg_file(
        name: impl Into<String>,
        width: TcgWidth,
        file: Arc<RegisterFile>,
        index: NodeId,
        is_dest: bool,
    ) -> Self {
        Self {
            name: name.into(),
            width,
            kind: VarKind::RegFile,
            binding: Some(Binding::RegFile { file, index }),
            is_dest,
            const_value: None,
        }
    }

    /// Graph nodes this variable depends on (index / constant expression).
    pub fn node_refs(&self) -> Vec<NodeId> {
        let mut refs = Vec::new();
        if let Some(Binding::RegFile { index, .. }) = &self.binding {
            refs.push(*index);
        }
        if let Some(value) = self.const_value {
            refs.push(value);
        }
        refs
    }
}

impl PartialEq for TcgV {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for TcgV {}

impl Hash for TcgV {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl fmt::Display for TcgV {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_width_from_bits() {
        assert_eq!(TcgWidth::from_bits(32), Some(TcgWidth::I32));
        assert_eq!(TcgWidth::from_bits(64), Some(TcgWidth::I64));
        assert_eq!(TcgWidth::from_bits(16), None);
        assert_eq!(TcgWidth::I64.to_string(), "i64");
    }

    #[test]
    fn test_transfer_size_is_closed() {
        for bits in [8, 16, 32, 64] {
            assert_eq!(TransferSize::from_bits(bits).map(|s| s.bits()), Some(bits));
        }
        assert_eq!(TransferSize::from_bits(12), None);
        assert_eq!(TransferSize::from_bits(128), None);
    }

    #[test]
    fn test_equality_is_by_name() {
        let a = TcgV::temp("tmp_add_n3_0", TcgWidth::I64);
        let b = TcgV::constant("tmp_add_n3_0", TcgWidth::I32, NodeId(9));
        let c = TcgV::temp("tmp_add_n4_0", TcgWidth::I64);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_node_refs() {
        let file = RegisterFile::new("X", 5, 64);
        let v = TcgV::reg_file("regfile_x_rs1", TcgWidth::I64, file, NodeId(2), false);
        assert_eq!(v.node_refs(), vec![NodeId(2)]);
        let c = TcgV::constant("const_imm_n5", TcgWidth::I64, NodeId(5));
        assert_eq!(c.node_refs(), vec![NodeId(5)]);
        assert!(TcgV::temp("t", TcgWidth::I32).node_refs().is_empty());
    }

    #[test]
    fn test_condition_display() {
        assert_eq!(TcgCondition::Ltu.to_string(), "ltu");
        assert_eq!(TcgCondition::TstNe.to_string(), "tstne");
    }
}
