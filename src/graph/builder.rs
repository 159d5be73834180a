//! Construction of behavior graphs in the shape the scheduler hands them
//! to the TCG passes.
//!
//! Every node that can only be computed at runtime (resource reads and
//! anything depending on one) is placed on the spine through a `Scheduled`
//! node at the point it is built. Side effects are always scheduled and
//! are additionally recorded on the end node of the region they occur in.

use std::collections::HashSet;
use std::sync::Arc;

use super::{BuiltIn, Graph, Node, NodeId, Ty};
use crate::isa::{Memory, Register, RegisterFile};
use crate::span::Span;

pub struct GraphBuilder {
    graph: Graph,
    /// Last directional node of the spine under construction.
    cursor: NodeId,
    /// Side effects per open region; index 0 is the default path.
    regions: Vec<Vec<NodeId>>,
    runtime: HashSet<NodeId>,
    span: Span,
}

impl Default for GraphBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphBuilder {
    pub fn new() -> Self {
        let mut graph = Graph::new();
        let start = graph.add(Node::Start { next: None });
        Self {
            graph,
            cursor: start,
            regions: vec![Vec::new()],
            runtime: HashSet::new(),
            span: Span::dummy(),
        }
    }

    /// Span attached to the nodes built from now on.
    pub fn at(&mut self, span: Span) -> &mut Self {
        self.span = span;
        self
    }

    fn add(&mut self, node: Node) -> NodeId {
        self.graph.add_at(node, self.span)
    }

    /// Point `from` at `to`. `from` is always a directional node the
    /// builder created itself (start, begin, merge, scheduled, exit), so
    /// linking cannot fail.
    fn connect(&mut self, from: NodeId, to: NodeId) {
        let linked = self.graph.set_next(from, Some(to));
        debug_assert!(linked.is_ok(), "builder linked from a non-directional node: {:?}", linked);
    }

    fn link(&mut self, id: NodeId) {
        self.connect(self.cursor, id);
        self.cursor = id;
    }

    /// Place `node` on the spine at the current position.
    pub fn schedule(&mut self, node: NodeId) -> NodeId {
        let scheduled = self.add(Node::Scheduled { node, next: None });
        self.link(scheduled);
        self.runtime.insert(node);
        node
    }

    pub fn is_runtime(&self, node: NodeId) -> bool {
        self.runtime.contains(&node)
    }

    fn schedule_if_runtime(&mut self, node: NodeId, inputs: &[NodeId]) -> NodeId {
        if inputs.iter().any(|i| self.is_runtime(*i)) {
            self.schedule(node)
        } else {
            node
        }
    }

    fn record_side_effect(&mut self, node: NodeId) {
        if let Some(region) = self.regions.last_mut() {
            region.push(node);
        }
    }

    // ── Decode-time values ──

    pub fn constant(&mut self, value: u64, bits: u32) -> NodeId {
        self.add(Node::Constant {
            value,
            ty: Ty::Bits(bits),
        })
    }

    pub fn field(&mut self, name: &str, bits: u32) -> NodeId {
        self.add(Node::Field {
            name: name.to_string(),
            ty: Ty::Bits(bits),
        })
    }

    pub fn param(&mut self, name: &str, bits: u32) -> NodeId {
        self.add(Node::Param {
            name: name.to_string(),
            ty: Ty::Bits(bits),
        })
    }

    pub fn static_pc(&mut self, bits: u32) -> NodeId {
        self.add(Node::StaticPc { ty: Ty::Bits(bits) })
    }

    // ── Resource access ──

    pub fn read_reg(&mut self, reg: &Arc<Register>) -> NodeId {
        let id = self.add(Node::ReadReg {
            reg: Arc::clone(reg),
            ty: Ty::Bits(reg.width),
        });
        self.schedule(id)
    }

    pub fn read_reg_file(&mut self, file: &Arc<RegisterFile>, index: NodeId) -> NodeId {
        let id = self.add(Node::ReadRegFile {
            file: Arc::clone(file),
            index,
            ty: Ty::Bits(file.value_width),
        });
        self.schedule(id)
    }

    pub fn read_mem(&mut self, mem: &Arc<Memory>, address: NodeId, bits: u32) -> NodeId {
        let id = self.add(Node::ReadMem {
            mem: Arc::clone(mem),
            address,
            ty: Ty::Bits(bits),
        });
        self.schedule(id)
    }

    pub fn write_reg(&mut self, reg: &Arc<Register>, value: NodeId) -> NodeId {
        let id = self.add(Node::WriteReg {
            reg: Arc::clone(reg),
            value,
        });
        self.record_side_effect(id);
        self.schedule(id)
    }

    pub fn write_reg_file(
        &mut self,
        file: &Arc<RegisterFile>,
        index: NodeId,
        value: NodeId,
    ) -> NodeId {
        let id = self.add(Node::WriteRegFile {
            file: Arc::clone(file),
            index,
            value,
        });
        self.record_side_effect(id);
        self.schedule(id)
    }

    pub fn write_mem(&mut self, mem: &Arc<Memory>, address: NodeId, value: NodeId) -> NodeId {
        let id = self.add(Node::WriteMem {
            mem: Arc::clone(mem),
            address,
            value,
        });
        self.record_side_effect(id);
        self.schedule(id)
    }

    /// Write the program counter and leave the instruction. The write is
    /// only scheduled when the target is a runtime value.
    pub fn jump(&mut self, pc: &Arc<Register>, target: NodeId) -> NodeId {
        let write = self.add(Node::WriteReg {
            reg: Arc::clone(pc),
            value: target,
        });
        self.record_side_effect(write);
        if self.is_runtime(target) {
            self.schedule(write);
        }
        let exit = self.add(Node::InstrExit {
            cause: write,
            next: None,
        });
        self.link(exit);
        write
    }

    /// Raise `exception` with `args` and leave the instruction.
    pub fn raise(&mut self, exception: &str, args: &[NodeId]) -> NodeId {
        let raise = self.add(Node::Raise {
            exception: exception.to_string(),
            args: args.to_vec(),
        });
        self.record_side_effect(raise);
        let exit = self.add(Node::InstrExit {
            cause: raise,
            next: None,
        });
        self.link(exit);
        raise
    }

    // ── Expressions ──

    pub fn builtin(&mut self, op: BuiltIn, args: &[NodeId], bits: u32) -> NodeId {
        self.builtin_typed(op, args, Ty::Bits(bits))
    }

    pub fn builtin_typed(&mut self, op: BuiltIn, args: &[NodeId], ty: Ty) -> NodeId {
        let id = self.add(Node::BuiltIn {
            op,
            args: args.to_vec(),
            ty,
        });
        self.schedule_if_runtime(id, args)
    }

    pub fn sign_extend(&mut self, value: NodeId, bits: u32) -> NodeId {
        let id = self.add(Node::SignExtend {
            value,
            ty: Ty::Bits(bits),
        });
        self.schedule_if_runtime(id, &[value])
    }

    pub fn zero_extend(&mut self, value: NodeId, bits: u32) -> NodeId {
        let id = self.add(Node::ZeroExtend {
            value,
            ty: Ty::Bits(bits),
        });
        self.schedule_if_runtime(id, &[value])
    }

    pub fn truncate(&mut self, value: NodeId, bits: u32) -> NodeId {
        let id = self.add(Node::Truncate {
            value,
            ty: Ty::Bits(bits),
        });
        self.schedule_if_runtime(id, &[value])
    }

    pub fn expr_save(&mut self, value: NodeId, bits: u32) -> NodeId {
        let id = self.add(Node::ExprSave {
            value,
            ty: Ty::Bits(bits),
        });
        self.schedule_if_runtime(id, &[value])
    }

    pub fn tuple_get(&mut self, tuple: NodeId, index: usize, bits: u32) -> NodeId {
        let id = self.add(Node::TupleGet {
            tuple,
            index,
            ty: Ty::Bits(bits),
        });
        self.schedule_if_runtime(id, &[tuple])
    }

    pub fn let_binding(&mut self, name: &str, value: NodeId, bits: u32) -> NodeId {
        let id = self.add(Node::Let {
            name: name.to_string(),
            value,
            ty: Ty::Bits(bits),
        });
        self.schedule_if_runtime(id, &[value])
    }

    pub fn select(&mut self, condition: NodeId, if_true: NodeId, if_false: NodeId, bits: u32) -> NodeId {
        let id = self.add(Node::Select {
            condition,
            if_true,
            if_false,
            ty: Ty::Bits(bits),
        });
        self.schedule_if_runtime(id, &[condition, if_true, if_false])
    }

    pub fn slice(&mut self, value: NodeId, msb: u32, lsb: u32) -> NodeId {
        let id = self.add(Node::Slice {
            value,
            msb,
            lsb,
            ty: Ty::Bits(msb.saturating_sub(lsb) + 1),
        });
        self.schedule_if_runtime(id, &[value])
    }

    pub fn cast(&mut self, value: NodeId, bits: u32) -> NodeId {
        let id = self.add(Node::Cast {
            value,
            ty: Ty::Bits(bits),
        });
        self.schedule_if_runtime(id, &[value])
    }

    pub fn call(&mut self, name: &str, args: &[NodeId], bits: u32) -> NodeId {
        let id = self.add(Node::FuncCall {
            name: name.to_string(),
            args: args.to_vec(),
            ty: Ty::Bits(bits),
        });
        self.schedule_if_runtime(id, args)
    }

    // ── Control ──

    /// Build a structured if/else region. `then` and `otherwise` build the
    /// two branch bodies.
    pub fn if_else(
        &mut self,
        condition: NodeId,
        then: impl FnOnce(&mut GraphBuilder),
        otherwise: impl FnOnce(&mut GraphBuilder),
    ) -> NodeId {
        let true_begin = self.add(Node::Begin { next: None });
        let false_begin = self.add(Node::Begin { next: None });
        let split = self.add(Node::If {
            condition,
            true_branch: true_begin,
            false_branch: false_begin,
        });
        self.link(split);
        for begin in [true_begin, false_begin] {
            let linked = self.graph.set_pred(begin, Some(split));
            debug_assert!(linked.is_ok(), "branch head {} vanished: {:?}", begin, linked);
        }

        let true_end = self.branch(true_begin, then);
        let false_end = self.branch(false_begin, otherwise);

        let merge = self.add(Node::Merge {
            true_end,
            false_end,
            next: None,
        });
        for end in [true_end, false_end] {
            if let Ok(Node::BranchEnd { merge: m, .. }) = self.graph.node_mut(end) {
                *m = Some(merge);
            }
        }
        self.cursor = merge;
        split
    }

    /// `if condition then body` with an empty false branch.
    pub fn if_then(&mut self, condition: NodeId, body: impl FnOnce(&mut GraphBuilder)) -> NodeId {
        self.if_else(condition, body, |_| {})
    }

    fn branch(&mut self, begin: NodeId, body: impl FnOnce(&mut GraphBuilder)) -> NodeId {
        self.cursor = begin;
        self.regions.push(Vec::new());
        body(self);
        let side_effects = self.regions.pop().unwrap_or_default();
        let end = self.add(Node::BranchEnd {
            side_effects,
            merge: None,
        });
        self.connect(self.cursor, end);
        end
    }

    /// Close the default path and hand out the graph.
    pub fn finish(mut self) -> Graph {
        let side_effects = self.regions.drain(..).next().unwrap_or_default();
        let end = self.add(Node::InstrEnd { side_effects });
        self.connect(self.cursor, end);
        self.graph
    }
}
