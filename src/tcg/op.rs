//! Micro-ops: the output vocabulary of the lowering passes.
//!
//! Every op carries concrete `TcgV` operands plus the width, condition and
//! extension metadata an emitter needs. Decode-time operands (constants,
//! register-file indices, static jump targets) are carried as `HostExpr`,
//! already rendered, so printing an op needs no further graph lookup.

use std::fmt;
use std::sync::Arc;

use super::jump::JumpPolicy;
use super::var::{TcgCondition, TcgExtend, TcgV, TcgWidth, TransferSize};
use crate::graph::NodeId;
use crate::isa::{Register, RegisterFile};

// ─── Operands ─────────────────────────────────────────────────────

/// An instruction-scoped jump target.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Label(pub String);

impl Label {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A translation-time expression: the graph node it came from and its
/// host-side rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostExpr {
    pub node: NodeId,
    pub text: String,
}

impl fmt::Display for HostExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.text)
    }
}

/// Whether a register binding is read (`get_`) or written (`dest_`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegKind {
    Src,
    Dest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Not,
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    Rotl,
    Rotr,
    Div,
    DivU,
    Rem,
    RemU,
}

impl UnaryOp {
    pub fn mnemonic(self) -> &'static str {
        match self {
            UnaryOp::Not => "not",
            UnaryOp::Neg => "neg",
        }
    }
}

impl BinaryOp {
    pub fn mnemonic(self) -> &'static str {
        match self {
            BinaryOp::Add => "add",
            BinaryOp::Sub => "sub",
            BinaryOp::Mul => "mul",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
            BinaryOp::Xor => "xor",
            BinaryOp::Shl => "shl",
            BinaryOp::Shr => "shr",
            BinaryOp::Rotl => "rotl",
            BinaryOp::Rotr => "rotr",
            BinaryOp::Div => "div",
            BinaryOp::DivU => "divu",
            BinaryOp::Rem => "rem",
            BinaryOp::RemU => "remu",
        }
    }
}

/// `goto_tb` slot. Slot 1 is reserved for the first statically known
/// branch target; everything else goes through slot 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JumpSlot {
    Lookup,
    BranchOut,
}

impl fmt::Display for JumpSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JumpSlot::Lookup => write!(f, "0"),
            JumpSlot::BranchOut => write!(f, "1"),
        }
    }
}

// ─── Micro-ops ────────────────────────────────────────────────────

/// One TCG micro-operation.
#[derive(Debug, Clone)]
pub enum TcgOp {
    // ── Prologue: variable materialization ──
    /// Allocate a fresh temporary.
    GetTemp(Arc<TcgV>),
    /// Bind a constant variable to a translation-time value.
    GetConst { dest: Arc<TcgV>, value: HostExpr },
    /// Bind a variable to an architectural register.
    GetReg {
        dest: Arc<TcgV>,
        reg: Arc<Register>,
        kind: RegKind,
    },
    /// Bind a variable to a register-file element.
    GetRegFile {
        dest: Arc<TcgV>,
        file: Arc<RegisterFile>,
        index: HostExpr,
        kind: RegKind,
    },

    // ── Data ──
    Mov {
        dest: Arc<TcgV>,
        src: Arc<TcgV>,
    },
    Unary {
        op: UnaryOp,
        dest: Arc<TcgV>,
        src: Arc<TcgV>,
    },
    Binary {
        op: BinaryOp,
        dest: Arc<TcgV>,
        a: Arc<TcgV>,
        b: Arc<TcgV>,
    },
    /// dest = (a <cond> b) ? 1 : 0
    SetCond {
        cond: TcgCondition,
        dest: Arc<TcgV>,
        a: Arc<TcgV>,
        b: Arc<TcgV>,
    },
    /// Widen the low `from_bits` of `src` to the variable width.
    Extend {
        dest: Arc<TcgV>,
        src: Arc<TcgV>,
        from_bits: u32,
        mode: TcgExtend,
    },
    /// Keep the low `bits` of `src`.
    Truncate {
        dest: Arc<TcgV>,
        src: Arc<TcgV>,
        bits: u32,
    },
    /// Count leading zeros; `dest = zero` when `src` is 0.
    Clz {
        dest: Arc<TcgV>,
        src: Arc<TcgV>,
        zero: Arc<TcgV>,
    },
    /// `dest = base` with bits `[pos, pos + len)` replaced by `value`.
    Deposit {
        dest: Arc<TcgV>,
        base: Arc<TcgV>,
        value: Arc<TcgV>,
        pos: u32,
        len: u32,
    },

    // ── Memory ──
    Load {
        size: TransferSize,
        mode: TcgExtend,
        dest: Arc<TcgV>,
        addr: Arc<TcgV>,
    },
    Store {
        size: TransferSize,
        mode: TcgExtend,
        value: Arc<TcgV>,
        addr: Arc<TcgV>,
    },

    // ── Control ──
    /// Declare a label (must precede any branch to it).
    GenLabel(Label),
    /// Place a label.
    SetLabel(Label),
    Br(Label),
    /// Jump to `label` if `a <cond> b`.
    BrCond {
        cond: TcgCondition,
        a: Arc<TcgV>,
        b: Arc<TcgV>,
        label: Label,
    },
    /// Leave the translation block towards a statically known PC.
    GotoTb { slot: JumpSlot, target: HostExpr },
    /// Leave the translation block towards the PC computed at runtime.
    LookupAndGotoPtr,
    /// Raise an architectural exception; leaves the translation block.
    GenException {
        exception: String,
        args: Vec<Arc<TcgV>>,
    },
    /// Tell the translation loop how to continue after this instruction.
    SetIsJmp(JumpPolicy),
}

impl TcgOp {
    /// Variables used or defined by the op, destination first.
    pub fn vars(&self) -> Vec<&Arc<TcgV>> {
        match self {
            TcgOp::GetTemp(v) => vec![v],
            TcgOp::GetConst { dest, .. }
            | TcgOp::GetReg { dest, .. }
            | TcgOp::GetRegFile { dest, .. } => vec![dest],
            TcgOp::Mov { dest, src }
            | TcgOp::Unary { dest, src, .. }
            | TcgOp::Extend { dest, src, .. }
            | TcgOp::Truncate { dest, src, .. } => vec![dest, src],
            TcgOp::Binary { dest, a, b, .. } | TcgOp::SetCond { dest, a, b, .. } => {
                vec![dest, a, b]
            }
            TcgOp::Clz { dest, src, zero } => vec![dest, src, zero],
            TcgOp::Deposit {
                dest, base, value, ..
            } => vec![dest, base, value],
            TcgOp::GenException { args, .. } => args.iter().collect(),
            TcgOp::Load { dest, addr, .. } => vec![dest, addr],
            TcgOp::Store { value, addr, .. } => vec![value, addr],
            TcgOp::BrCond { a, b, .. } => vec![a, b],
            TcgOp::GenLabel(_)
            | TcgOp::SetLabel(_)
            | TcgOp::Br(_)
            | TcgOp::GotoTb { .. }
            | TcgOp::LookupAndGotoPtr
            | TcgOp::SetIsJmp(_) => vec![],
        }
    }

    /// Graph nodes the op still refers to (host expressions and the
    /// expressions behind its variables).
    pub fn node_refs(&self) -> Vec<NodeId> {
        let mut refs: Vec<NodeId> = self.vars().iter().flat_map(|v| v.node_refs()).collect();
        match self {
            TcgOp::GetConst { value, .. } => refs.push(value.node),
            TcgOp::GetRegFile { index, .. } => refs.push(index.node),
            TcgOp::GotoTb { target, .. } => refs.push(target.node),
            _ => {}
        }
        refs
    }

    /// True for variable materialization ops.
    pub fn is_prologue(&self) -> bool {
        matches!(
            self,
            TcgOp::GetTemp(_)
                | TcgOp::GetConst { .. }
                | TcgOp::GetReg { .. }
                | TcgOp::GetRegFile { .. }
        )
    }

    /// True for ops that define or transfer control to a label.
    pub fn is_label_or_branch(&self) -> bool {
        matches!(
            self,
            TcgOp::GenLabel(_) | TcgOp::SetLabel(_) | TcgOp::Br(_) | TcgOp::BrCond { .. }
        )
    }

    /// True for ops that leave the translation block.
    pub fn is_exit(&self) -> bool {
        matches!(
            self,
            TcgOp::GotoTb { .. } | TcgOp::LookupAndGotoPtr | TcgOp::GenException { .. }
        )
    }

    fn width(&self) -> TcgWidth {
        self.vars().first().map(|v| v.width).unwrap_or(TcgWidth::I64)
    }
}

// ─── Display ──────────────────────────────────────────────────────

fn lower_name(name: &str) -> String {
    name.to_ascii_lowercase()
}

impl fmt::Display for TcgOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let w = self.width();
        match self {
            TcgOp::GetTemp(v) => write!(f, "{} = temp_new_{}", v, w),
            TcgOp::GetConst { dest, value } => {
                write!(f, "{} = constant_{}({})", dest, w, value)
            }
            TcgOp::GetReg { dest, reg, kind } => {
                let prefix = if *kind == RegKind::Dest { "dest" } else { "get" };
                write!(f, "{} = {}_{}", dest, prefix, lower_name(&reg.name))
            }
            TcgOp::GetRegFile {
                dest,
                file,
                index,
                kind,
            } => {
                let prefix = if *kind == RegKind::Dest { "dest" } else { "get" };
                write!(f, "{} = {}_{}({})", dest, prefix, lower_name(&file.name), index)
            }
            TcgOp::Mov { dest, src } => write!(f, "mov_{} {}, {}", w, dest, src),
            TcgOp::Unary { op, dest, src } => {
                write!(f, "{}_{} {}, {}", op.mnemonic(), w, dest, src)
            }
            TcgOp::Binary { op, dest, a, b } => {
                write!(f, "{}_{} {}, {}, {}", op.mnemonic(), w, dest, a, b)
            }
            TcgOp::SetCond { cond, dest, a, b } => {
                write!(f, "setcond_{} {}, {}, {}, {}", w, dest, a, b, cond)
            }
            TcgOp::Extend {
                dest,
                src,
                from_bits,
                mode,
            } => match from_bits {
                8 | 16 | 32 => write!(f, "ext{}{}_{} {}, {}", from_bits, mode, w, dest, src),
                _ => {
                    let prefix = if *mode == TcgExtend::Sign { "s" } else { "" };
                    write!(f, "{}extract_{} {}, {}, 0, {}", prefix, w, dest, src, from_bits)
                }
            },
            TcgOp::Truncate { dest, src, bits } => {
                write!(f, "trunc_{} {}, {}, {}", w, dest, src, bits)
            }
            TcgOp::Clz { dest, src, zero } => write!(f, "clz_{} {}, {}, {}", w, dest, src, zero),
            TcgOp::Deposit {
                dest,
                base,
                value,
                pos,
                len,
            } => write!(f, "deposit_{} {}, {}, {}, {}, {}", w, dest, base, value, pos, len),
            TcgOp::Load {
                size,
                mode,
                dest,
                addr,
            } => write!(f, "ld{}{}_{} {}, [{}]", size, mode, w, dest, addr),
            TcgOp::Store {
                size,
                mode,
                value,
                addr,
            } => write!(f, "st{}{}_{} {}, [{}]", size, mode, w, value, addr),
            TcgOp::GenLabel(l) => write!(f, "gen_label {}", l),
            TcgOp::SetLabel(l) => write!(f, "set_label {}", l),
            TcgOp::Br(l) => write!(f, "br {}", l),
            TcgOp::BrCond { cond, a, b, label } => {
                write!(f, "brcond_{} {}, {}, {}, {}", w, a, b, cond, label)
            }
            TcgOp::GotoTb { slot, target } => write!(f, "goto_tb {}, {}", slot, target),
            TcgOp::LookupAndGotoPtr => write!(f, "lookup_and_goto_ptr"),
            TcgOp::GenException { exception, args } => {
                write!(f, "gen_exception {}", lower_name(exception))?;
                for arg in args {
                    write!(f, ", {}", arg)?;
                }
                Ok(())
            }
            TcgOp::SetIsJmp(policy) => write!(f, "is_jmp = {}", policy),
        }
    }
}

// ─── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn tmp(name: &str) -> Arc<TcgV> {
        Arc::new(TcgV::temp(name, TcgWidth::I64))
    }

    #[test]
    fn test_label_display() {
        assert_eq!(Label::new("l_taken_0").to_string(), "l_taken_0");
    }

    #[test]
    fn test_data_op_display() {
        let (d, a, b) = (tmp("d"), tmp("a"), tmp("b"));
        let add = TcgOp::Binary {
            op: BinaryOp::Add,
            dest: d.clone(),
            a: a.clone(),
            b: b.clone(),
        };
        assert_eq!(add.to_string(), "add_i64 d, a, b");

        let set = TcgOp::SetCond {
            cond: TcgCondition::Ltu,
            dest: d.clone(),
            a: a.clone(),
            b,
        };
        assert_eq!(set.to_string(), "setcond_i64 d, a, b, ltu");

        let ext = TcgOp::Extend {
            dest: d.clone(),
            src: a.clone(),
            from_bits: 16,
            mode: TcgExtend::Sign,
        };
        assert_eq!(ext.to_string(), "ext16s_i64 d, a");

        let odd = TcgOp::Extend {
            dest: d,
            src: a,
            from_bits: 12,
            mode: TcgExtend::Sign,
        };
        assert_eq!(odd.to_string(), "sextract_i64 d, a, 0, 12");
    }

    #[test]
    fn test_memory_op_display() {
        let ld = TcgOp::Load {
            size: TransferSize::B16,
            mode: TcgExtend::Zero,
            dest: tmp("v"),
            addr: tmp("addr"),
        };
        assert_eq!(ld.to_string(), "ld16u_i64 v, [addr]");
        let st = TcgOp::Store {
            size: TransferSize::B8,
            mode: TcgExtend::Sign,
            value: tmp("v"),
            addr: tmp("addr"),
        };
        assert_eq!(st.to_string(), "st8s_i64 v, [addr]");
    }

    #[test]
    fn test_control_op_display() {
        let op = TcgOp::BrCond {
            cond: TcgCondition::Ne,
            a: tmp("c"),
            b: tmp("z"),
            label: Label::new("l_taken_0"),
        };
        assert_eq!(op.to_string(), "brcond_i64 c, z, ne, l_taken_0");
        assert_eq!(TcgOp::Br(Label::new("l_end_1")).to_string(), "br l_end_1");
        let goto = TcgOp::GotoTb {
            slot: JumpSlot::BranchOut,
            target: HostExpr {
                node: NodeId(3),
                text: "(pc + imm)".into(),
            },
        };
        assert_eq!(goto.to_string(), "goto_tb 1, (pc + imm)");
        assert_eq!(
            TcgOp::SetIsJmp(JumpPolicy::Chain).to_string(),
            "is_jmp = chain"
        );
    }

    #[test]
    fn test_vars_destination_first() {
        let (d, s) = (tmp("d"), tmp("s"));
        let mov = TcgOp::Mov {
            dest: d.clone(),
            src: s.clone(),
        };
        let vars = mov.vars();
        let names: Vec<&str> = vars.iter().map(|v| v.name.as_str()).collect();
        assert_eq!(names, vec!["d", "s"]);
        assert!(TcgOp::LookupAndGotoPtr.vars().is_empty());
    }

    #[test]
    fn test_classification() {
        assert!(TcgOp::GetTemp(tmp("t")).is_prologue());
        assert!(TcgOp::SetLabel(Label::new("x")).is_label_or_branch());
        assert!(TcgOp::LookupAndGotoPtr.is_exit());
        assert!(!TcgOp::SetIsJmp(JumpPolicy::NoReturn).is_exit());
        let raise = TcgOp::GenException {
            exception: "EBREAK".into(),
            args: vec![],
        };
        assert!(raise.is_exit());
    }

    #[test]
    fn test_bit_op_display() {
        let clz = TcgOp::Clz {
            dest: tmp("d"),
            src: tmp("s"),
            zero: tmp("w"),
        };
        assert_eq!(clz.to_string(), "clz_i64 d, s, w");
        let deposit = TcgOp::Deposit {
            dest: tmp("d"),
            base: tmp("lo"),
            value: tmp("hi"),
            pos: 16,
            len: 16,
        };
        assert_eq!(deposit.to_string(), "deposit_i64 d, lo, hi, 16, 16");
        let raise = TcgOp::GenException {
            exception: "ILLEGAL".into(),
            args: vec![tmp("cause"), tmp("pc")],
        };
        assert_eq!(raise.to_string(), "gen_exception illegal, cause, pc");
        assert_eq!(raise.vars().len(), 2);
    }

    #[test]
    fn test_node_refs_include_host_exprs() {
        let c = Arc::new(TcgV::constant("const_imm_n4", TcgWidth::I64, NodeId(4)));
        let op = TcgOp::GetConst {
            dest: c,
            value: HostExpr {
                node: NodeId(4),
                text: "imm".into(),
            },
        };
        assert_eq!(op.node_refs(), vec![NodeId(4), NodeId(4)]);
    }
}
