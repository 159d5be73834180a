//! Behavior graph: the per-instruction IR the TCG passes rewrite in place.
//!
//! Nodes live in an arena and are addressed by stable `NodeId`s. Control
//! nodes form the spine (`Start` → ... → `InstrEnd`) through their `next`
//! fields; dataflow nodes hang off the spine through `Scheduled` nodes and
//! reference each other by id. Removing a node marks its slot dead, so ids
//! held elsewhere never alias a different node.

pub mod builder;
pub mod describe;

#[cfg(test)]
mod tests;

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use crate::diagnostic::Diagnostic;
use crate::isa::{Memory, Register, RegisterFile};
use crate::span::Span;
use crate::tcg::op::TcgOp;
use crate::tcg::var::TcgV;

// ─── Ids and types ────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// Value type of a dataflow node.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Ty {
    Bits(u32),
    /// Multi-result values (e.g. add-with-status); one width per component.
    Tuple(Vec<u32>),
}

impl Ty {
    pub fn components(&self) -> usize {
        match self {
            Ty::Bits(_) => 1,
            Ty::Tuple(parts) => parts.len(),
        }
    }
}

impl fmt::Display for Ty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ty::Bits(n) => write!(f, "Bits<{}>", n),
            Ty::Tuple(parts) => {
                let parts: Vec<String> = parts.iter().map(|p| format!("Bits<{}>", p)).collect();
                write!(f, "({})", parts.join(", "))
            }
        }
    }
}

/// Abstract operators of the architecture description language.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BuiltIn {
    Add,
    Sub,
    Mul,
    Neg,
    Not,
    And,
    Or,
    Xor,
    Equ,
    Neq,
    Slth,
    Ulth,
    Sleq,
    Uleq,
    Sgth,
    Ugth,
    Sgeq,
    Ugeq,
    Lsl,
    Lsr,
    Asr,
    Rol,
    Ror,
    SDiv,
    UDiv,
    SMod,
    UMod,
    Concat,
    Clz,
    /// Add returning `(result, status)`.
    AddS,
}

impl BuiltIn {
    pub fn name(self) -> &'static str {
        match self {
            BuiltIn::Add => "ADD",
            BuiltIn::Sub => "SUB",
            BuiltIn::Mul => "MUL",
            BuiltIn::Neg => "NEG",
            BuiltIn::Not => "NOT",
            BuiltIn::And => "AND",
            BuiltIn::Or => "OR",
            BuiltIn::Xor => "XOR",
            BuiltIn::Equ => "EQU",
            BuiltIn::Neq => "NEQ",
            BuiltIn::Slth => "SLTH",
            BuiltIn::Ulth => "ULTH",
            BuiltIn::Sleq => "SLEQ",
            BuiltIn::Uleq => "ULEQ",
            BuiltIn::Sgth => "SGTH",
            BuiltIn::Ugth => "UGTH",
            BuiltIn::Sgeq => "SGEQ",
            BuiltIn::Ugeq => "UGEQ",
            BuiltIn::Lsl => "LSL",
            BuiltIn::Lsr => "LSR",
            BuiltIn::Asr => "ASR",
            BuiltIn::Rol => "ROL",
            BuiltIn::Ror => "ROR",
            BuiltIn::SDiv => "SDIV",
            BuiltIn::UDiv => "UDIV",
            BuiltIn::SMod => "SMOD",
            BuiltIn::UMod => "UMOD",
            BuiltIn::Concat => "CONCATENATE",
            BuiltIn::Clz => "CLZ",
            BuiltIn::AddS => "ADDS",
        }
    }
}

impl fmt::Display for BuiltIn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

// ─── Nodes ────────────────────────────────────────────────────────

#[derive(Clone, Debug)]
pub enum Node {
    // ── Control ──
    Start {
        next: Option<NodeId>,
    },
    /// Structured split. Both branches start with a `Begin` and end with a
    /// `BranchEnd` pointing at the same `Merge`.
    If {
        condition: NodeId,
        true_branch: NodeId,
        false_branch: NodeId,
    },
    Begin {
        next: Option<NodeId>,
    },
    BranchEnd {
        side_effects: Vec<NodeId>,
        merge: Option<NodeId>,
    },
    Merge {
        true_end: NodeId,
        false_end: NodeId,
        next: Option<NodeId>,
    },
    /// Places a runtime dataflow node at this point of the spine.
    Scheduled {
        node: NodeId,
        next: Option<NodeId>,
    },
    /// Leaves the instruction through its cause: a PC write or a raise.
    InstrExit {
        cause: NodeId,
        next: Option<NodeId>,
    },
    /// Terminal node; side effects of the default path.
    InstrEnd {
        side_effects: Vec<NodeId>,
    },
    /// A lowered micro-op.
    Op {
        op: TcgOp,
        next: Option<NodeId>,
    },

    // ── Dataflow ──
    Constant {
        value: u64,
        ty: Ty,
    },
    /// Instruction format field reference.
    Field {
        name: String,
        ty: Ty,
    },
    /// Raw function parameter; must be inlined away upstream.
    Param {
        name: String,
        ty: Ty,
    },
    /// Address of the current instruction, known at translation time.
    StaticPc {
        ty: Ty,
    },
    ReadReg {
        reg: Arc<Register>,
        ty: Ty,
    },
    ReadRegFile {
        file: Arc<RegisterFile>,
        index: NodeId,
        ty: Ty,
    },
    ReadMem {
        mem: Arc<Memory>,
        address: NodeId,
        ty: Ty,
    },
    WriteReg {
        reg: Arc<Register>,
        value: NodeId,
    },
    WriteRegFile {
        file: Arc<RegisterFile>,
        index: NodeId,
        value: NodeId,
    },
    WriteMem {
        mem: Arc<Memory>,
        address: NodeId,
        value: NodeId,
    },
    /// Architectural exception with its arguments.
    Raise {
        exception: String,
        args: Vec<NodeId>,
    },
    BuiltIn {
        op: BuiltIn,
        args: Vec<NodeId>,
        ty: Ty,
    },
    SignExtend {
        value: NodeId,
        ty: Ty,
    },
    ZeroExtend {
        value: NodeId,
        ty: Ty,
    },
    Truncate {
        value: NodeId,
        ty: Ty,
    },
    /// Pins a value into its own variable.
    ExprSave {
        value: NodeId,
        ty: Ty,
    },
    TupleGet {
        tuple: NodeId,
        index: usize,
        ty: Ty,
    },
    Let {
        name: String,
        value: NodeId,
        ty: Ty,
    },
    Select {
        condition: NodeId,
        if_true: NodeId,
        if_false: NodeId,
        ty: Ty,
    },
    Slice {
        value: NodeId,
        msb: u32,
        lsb: u32,
        ty: Ty,
    },
    Cast {
        value: NodeId,
        ty: Ty,
    },
    /// Call that survived inlining.
    FuncCall {
        name: String,
        args: Vec<NodeId>,
        ty: Ty,
    },
    /// Provenance marker for an assigned variable.
    VarRef {
        var: Arc<TcgV>,
        index: Option<NodeId>,
    },
}

impl Node {
    pub fn is_control(&self) -> bool {
        matches!(
            self,
            Node::Start { .. }
                | Node::If { .. }
                | Node::Begin { .. }
                | Node::BranchEnd { .. }
                | Node::Merge { .. }
                | Node::Scheduled { .. }
                | Node::InstrExit { .. }
                | Node::InstrEnd { .. }
                | Node::Op { .. }
        )
    }

    /// The successor slot of a node with exactly one control successor.
    pub fn next(&self) -> Option<NodeId> {
        match self {
            Node::Start { next }
            | Node::Begin { next }
            | Node::Merge { next, .. }
            | Node::Scheduled { next, .. }
            | Node::InstrExit { next, .. }
            | Node::Op { next, .. } => *next,
            _ => None,
        }
    }

    fn next_mut(&mut self) -> Option<&mut Option<NodeId>> {
        match self {
            Node::Start { next }
            | Node::Begin { next }
            | Node::Merge { next, .. }
            | Node::Scheduled { next, .. }
            | Node::InstrExit { next, .. }
            | Node::Op { next, .. } => Some(next),
            _ => None,
        }
    }

    pub fn is_directional(&self) -> bool {
        matches!(
            self,
            Node::Start { .. }
                | Node::Begin { .. }
                | Node::Merge { .. }
                | Node::Scheduled { .. }
                | Node::InstrExit { .. }
                | Node::Op { .. }
        )
    }

    /// Nodes this node consumes.
    pub fn inputs(&self) -> Vec<NodeId> {
        match self {
            Node::Start { .. } | Node::Begin { .. } | Node::Merge { .. } => vec![],
            Node::If { condition, .. } => vec![*condition],
            Node::BranchEnd { side_effects, .. } | Node::InstrEnd { side_effects } => {
                side_effects.clone()
            }
            Node::Scheduled { node, .. } => vec![*node],
            Node::InstrExit { cause, .. } => vec![*cause],
            Node::Op { op, .. } => op.node_refs(),

            Node::Constant { .. }
            | Node::Field { .. }
            | Node::Param { .. }
            | Node::StaticPc { .. }
            | Node::ReadReg { .. } => vec![],
            Node::ReadRegFile { index, .. } => vec![*index],
            Node::ReadMem { address, .. } => vec![*address],
            Node::WriteReg { value, .. } => vec![*value],
            Node::WriteRegFile { index, value, .. } => vec![*index, *value],
            Node::WriteMem { address, value, .. } => vec![*address, *value],
            Node::BuiltIn { args, .. } | Node::FuncCall { args, .. } | Node::Raise { args, .. } => {
                args.clone()
            }
            Node::SignExtend { value, .. }
            | Node::ZeroExtend { value, .. }
            | Node::Truncate { value, .. }
            | Node::ExprSave { value, .. }
            | Node::Let { value, .. }
            | Node::Slice { value, .. }
            | Node::Cast { value, .. } => vec![*value],
            Node::TupleGet { tuple, .. } => vec![*tuple],
            Node::Select {
                condition,
                if_true,
                if_false,
                ..
            } => vec![*condition, *if_true, *if_false],
            Node::VarRef { var, .. } => var.node_refs(),
        }
    }

    /// Result type of a value-producing node.
    pub fn ty(&self) -> Option<&Ty> {
        match self {
            Node::Constant { ty, .. }
            | Node::Field { ty, .. }
            | Node::Param { ty, .. }
            | Node::StaticPc { ty }
            | Node::ReadReg { ty, .. }
            | Node::ReadRegFile { ty, .. }
            | Node::ReadMem { ty, .. }
            | Node::BuiltIn { ty, .. }
            | Node::SignExtend { ty, .. }
            | Node::ZeroExtend { ty, .. }
            | Node::Truncate { ty, .. }
            | Node::ExprSave { ty, .. }
            | Node::TupleGet { ty, .. }
            | Node::Let { ty, .. }
            | Node::Select { ty, .. }
            | Node::Slice { ty, .. }
            | Node::Cast { ty, .. }
            | Node::FuncCall { ty, .. } => Some(ty),
            _ => None,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Node::Start { .. } => "start",
            Node::If { .. } => "if",
            Node::Begin { .. } => "branch begin",
            Node::BranchEnd { .. } => "branch end",
            Node::Merge { .. } => "merge",
            Node::Scheduled { .. } => "scheduled",
            Node::InstrExit { .. } => "instruction exit",
            Node::InstrEnd { .. } => "instruction end",
            Node::Op { .. } => "micro-op",
            Node::Constant { .. } => "constant",
            Node::Field { .. } => "field reference",
            Node::Param { .. } => "parameter",
            Node::StaticPc { .. } => "static pc",
            Node::ReadReg { .. } => "register read",
            Node::ReadRegFile { .. } => "register file read",
            Node::ReadMem { .. } => "memory read",
            Node::WriteReg { .. } => "register write",
            Node::WriteRegFile { .. } => "register file write",
            Node::WriteMem { .. } => "memory write",
            Node::Raise { .. } => "raise",
            Node::BuiltIn { .. } => "built-in call",
            Node::SignExtend { .. } => "sign extend",
            Node::ZeroExtend { .. } => "zero extend",
            Node::Truncate { .. } => "truncate",
            Node::ExprSave { .. } => "expression save",
            Node::TupleGet { .. } => "tuple access",
            Node::Let { .. } => "let",
            Node::Select { .. } => "select",
            Node::Slice { .. } => "slice",
            Node::Cast { .. } => "type cast",
            Node::FuncCall { .. } => "function call",
            Node::VarRef { .. } => "variable reference",
        }
    }
}

// ─── Arena ────────────────────────────────────────────────────────

#[derive(Clone, Debug)]
struct Slot {
    node: Node,
    span: Span,
    pred: Option<NodeId>,
}

/// Node arena of one instruction.
#[derive(Clone, Debug, Default)]
pub struct Graph {
    slots: Vec<Option<Slot>>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, node: Node) -> NodeId {
        self.add_at(node, Span::dummy())
    }

    pub fn add_at(&mut self, node: Node, span: Span) -> NodeId {
        let id = NodeId(self.slots.len() as u32);
        self.slots.push(Some(Slot {
            node,
            span,
            pred: None,
        }));
        id
    }

    fn slot(&self, id: NodeId) -> Option<&Slot> {
        self.slots.get(id.0 as usize).and_then(|s| s.as_ref())
    }

    fn slot_mut(&mut self, id: NodeId) -> Option<&mut Slot> {
        self.slots.get_mut(id.0 as usize).and_then(|s| s.as_mut())
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.slot(id).map(|s| &s.node)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.slot(id).is_some()
    }

    pub fn node(&self, id: NodeId) -> Result<&Node, Diagnostic> {
        self.get(id)
            .ok_or_else(|| Diagnostic::internal(format!("node {} does not exist", id), Span::dummy()))
    }

    pub fn node_mut(&mut self, id: NodeId) -> Result<&mut Node, Diagnostic> {
        self.slot_mut(id)
            .map(|s| &mut s.node)
            .ok_or_else(|| Diagnostic::internal(format!("node {} does not exist", id), Span::dummy()))
    }

    pub fn span(&self, id: NodeId) -> Span {
        self.slot(id).map(|s| s.span).unwrap_or_default()
    }

    /// Control predecessor (only tracked along `next` links and for the
    /// branch heads of an `If`).
    pub fn pred(&self, id: NodeId) -> Option<NodeId> {
        self.slot(id).and_then(|s| s.pred)
    }

    pub fn set_pred(&mut self, id: NodeId, pred: Option<NodeId>) -> Result<(), Diagnostic> {
        let slot = self
            .slot_mut(id)
            .ok_or_else(|| Diagnostic::internal(format!("node {} does not exist", id), Span::dummy()))?;
        slot.pred = pred;
        Ok(())
    }

    pub fn next(&self, id: NodeId) -> Option<NodeId> {
        self.get(id).and_then(Node::next)
    }

    /// Point `id`'s successor slot at `next` and record the back edge.
    pub fn set_next(&mut self, id: NodeId, next: Option<NodeId>) -> Result<(), Diagnostic> {
        let span = self.span(id);
        let node = self.node_mut(id)?;
        let kind = node.kind_name();
        let field = node.next_mut().ok_or_else(|| {
            Diagnostic::internal(format!("{} node {} has no successor", kind, id), span)
        })?;
        *field = next;
        if let Some(next) = next {
            self.set_pred(next, Some(id))?;
        }
        Ok(())
    }

    /// Link a new directional node right after `anchor`.
    pub fn insert_after(&mut self, anchor: NodeId, node: Node) -> Result<NodeId, Diagnostic> {
        let span = self.span(anchor);
        let old = self.next(anchor);
        let id = self.add_at(node, span);
        self.set_next(anchor, Some(id))?;
        self.set_next(id, old)?;
        Ok(id)
    }

    /// Link a new directional node right before `anchor`.
    pub fn insert_before(&mut self, anchor: NodeId, node: Node) -> Result<NodeId, Diagnostic> {
        let pred = self.pred(anchor).ok_or_else(|| {
            Diagnostic::internal(
                format!("node {} has no predecessor to insert after", anchor),
                self.span(anchor),
            )
        })?;
        self.insert_after(pred, node)
    }

    /// Take a directional node out of the spine and delete it.
    pub fn unlink(&mut self, id: NodeId) -> Result<(), Diagnostic> {
        let pred = self.pred(id).ok_or_else(|| {
            Diagnostic::internal(format!("node {} has no predecessor", id), self.span(id))
        })?;
        let next = self.next(id);
        self.set_next(pred, next)?;
        self.remove(id);
        Ok(())
    }

    /// Replace the slot of `id` by a dead slot.
    pub fn remove(&mut self, id: NodeId) {
        if let Some(slot) = self.slots.get_mut(id.0 as usize) {
            *slot = None;
        }
    }

    /// Live node ids in arena order.
    pub fn ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.is_some())
            .map(|(i, _)| NodeId(i as u32))
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &Node)> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|s| (NodeId(i as u32), &s.node)))
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn single(&self, kind: &str, pred: impl Fn(&Node) -> bool) -> Result<NodeId, Diagnostic> {
        let mut found = self.iter().filter(|(_, n)| pred(n)).map(|(id, _)| id);
        match (found.next(), found.next()) {
            (Some(id), None) => Ok(id),
            (None, _) => Err(Diagnostic::internal(
                format!("graph has no {} node", kind),
                Span::dummy(),
            )),
            (Some(_), Some(_)) => Err(Diagnostic::internal(
                format!("graph has more than one {} node", kind),
                Span::dummy(),
            )),
        }
    }

    pub fn start(&self) -> Result<NodeId, Diagnostic> {
        self.single("start", |n| matches!(n, Node::Start { .. }))
    }

    pub fn instr_end(&self) -> Result<NodeId, Diagnostic> {
        self.single("instruction end", |n| matches!(n, Node::InstrEnd { .. }))
    }

    pub fn ty(&self, id: NodeId) -> Result<Ty, Diagnostic> {
        let node = self.node(id)?;
        node.ty().cloned().ok_or_else(|| {
            Diagnostic::internal(
                format!("{} node {} has no value type", node.kind_name(), id),
                self.span(id),
            )
        })
    }

    /// Bit width of a scalar value.
    pub fn bits(&self, id: NodeId) -> Result<u32, Diagnostic> {
        match self.ty(id)? {
            Ty::Bits(n) => Ok(n),
            ty @ Ty::Tuple(_) => Err(Diagnostic::invariant(
                format!("expected a scalar value at {}, found {}", id, ty),
                self.span(id),
            )),
        }
    }

    /// Live nodes that consume `id`.
    pub fn users(&self, id: NodeId) -> Vec<NodeId> {
        self.iter()
            .filter(|(_, n)| n.inputs().contains(&id))
            .map(|(user, _)| user)
            .collect()
    }

    /// Control nodes in program order: the true branch of a region before
    /// its false branch, then the merge.
    pub fn control_order(&self) -> Vec<NodeId> {
        let mut out = Vec::new();
        if let Ok(start) = self.start() {
            self.walk_region(start, &mut out);
        }
        out
    }

    /// Walk from `from` until the end of the enclosing region. Returns the
    /// merge a closing `BranchEnd` leads to.
    fn walk_region(&self, from: NodeId, out: &mut Vec<NodeId>) -> Option<NodeId> {
        let mut cur = Some(from);
        while let Some(id) = cur {
            if out.len() > self.slots.len() {
                return None;
            }
            out.push(id);
            cur = match self.get(id)? {
                Node::If {
                    true_branch,
                    false_branch,
                    ..
                } => {
                    let merge = self.walk_region(*true_branch, out);
                    self.walk_region(*false_branch, out);
                    merge
                }
                Node::BranchEnd { merge, .. } => return *merge,
                Node::InstrEnd { .. } => return None,
                node => node.next(),
            };
        }
        None
    }

    /// Lowered micro-ops in control order.
    pub fn lowered_ops(&self) -> Vec<&TcgOp> {
        self.control_order()
            .into_iter()
            .filter_map(|id| match self.get(id) {
                Some(Node::Op { op, .. }) => Some(op),
                _ => None,
            })
            .collect()
    }

    /// Delete every node not reachable from the control spine. Variable
    /// markers survive while a live op still uses their variable.
    /// Returns the number of removed nodes.
    pub fn sweep(&mut self) -> usize {
        let mut live: HashSet<NodeId> = HashSet::new();
        let mut work: Vec<NodeId> = self.control_order();

        let used_vars: HashSet<String> = self
            .lowered_ops()
            .iter()
            .flat_map(|op| op.vars())
            .map(|v| v.name.clone())
            .collect();
        let markers: HashMap<String, NodeId> = self
            .iter()
            .filter_map(|(id, n)| match n {
                Node::VarRef { var, .. } => Some((var.name.clone(), id)),
                _ => None,
            })
            .collect();
        work.extend(
            markers
                .iter()
                .filter(|(name, _)| used_vars.contains(*name))
                .map(|(_, id)| *id),
        );

        while let Some(id) = work.pop() {
            if !live.insert(id) {
                continue;
            }
            if let Some(node) = self.get(id) {
                work.extend(node.inputs());
            }
        }

        let dead: Vec<NodeId> = self.ids().filter(|id| !live.contains(id)).collect();
        for id in &dead {
            self.remove(*id);
        }
        dead.len()
    }
}
