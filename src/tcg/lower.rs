//! Operation lowering: replaces every scheduled dataflow node, in control
//! order, by the micro-ops computing it, turns instruction exits into
//! block exits or raised exceptions and materializes the variables at
//! instruction start.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::debug;

use super::builtin::lower_builtin;
use super::ctx::TcgCtx;
use super::jump::select_policy;
use super::op::{JumpSlot, RegKind, TcgOp};
use super::var::{Binding, TcgExtend, TcgV, TransferSize, VarKind};
use crate::config::LoweringConfig;
use crate::diagnostic::Diagnostic;
use crate::graph::describe::host_expr;
use crate::graph::{Graph, Node, NodeId};
use crate::span::Span;

struct OpLowering<'a> {
    graph: &'a mut Graph,
    ctx: &'a mut TcgCtx,
    optimize_jump_slots: bool,
    branch_out_taken: bool,
}

/// Lower all scheduled nodes and exits of a branch-lowered graph.
pub fn lower_ops(graph: &mut Graph, ctx: &mut TcgCtx, config: &LoweringConfig) -> Result<(), Diagnostic> {
    // Exits disappear during the walk, decide first.
    let policy = select_policy(graph)?;

    let mut pass = OpLowering {
        graph,
        ctx,
        optimize_jump_slots: config.optimize_jump_slots,
        branch_out_taken: false,
    };
    for id in pass.graph.control_order() {
        match pass.graph.get(id) {
            Some(Node::Scheduled { node, .. }) => {
                let node = *node;
                let ops = pass.lower_node(node)?;
                pass.replace(id, ops)?;
            }
            Some(Node::InstrExit { cause, .. }) => {
                let cause = *cause;
                let op = pass.lower_exit(id, cause)?;
                pass.replace(id, vec![op])?;
            }
            _ => {}
        }
    }

    let end = pass.graph.instr_end()?;
    if let Some(policy) = policy {
        pass.graph.insert_before(
            end,
            Node::Op {
                op: TcgOp::SetIsJmp(policy),
                next: None,
            },
        )?;
    }
    if let Node::InstrEnd { side_effects } = pass.graph.node_mut(end)? {
        side_effects.clear();
    }

    pass.prologue()?;
    let swept = pass.graph.sweep();
    debug!(swept, "removed unreachable nodes");
    Ok(())
}

impl OpLowering<'_> {
    fn dest(&mut self, id: NodeId) -> Result<Arc<TcgV>, Diagnostic> {
        self.ctx.single_destination_of(self.graph, id)
    }

    fn fail_unimplemented(&self, id: NodeId, kind: &str) -> Diagnostic {
        Diagnostic::unimplemented(
            format!("lowering of {} nodes is not supported", kind),
            self.graph.span(id),
        )
        .with_note(format!("node {}", id))
    }

    fn fail_internal(&self, id: NodeId, kind: &str) -> Diagnostic {
        Diagnostic::internal(
            format!("{} node {} must not reach operation lowering", kind, id),
            self.graph.span(id),
        )
        .with_help("it should have been removed by an earlier pass".to_string())
    }

    /// `dest = src`, nothing if both are the same variable.
    fn mov(&mut self, dest_of: NodeId, src_of: NodeId) -> Result<Vec<TcgOp>, Diagnostic> {
        let dest = self.dest(dest_of)?;
        let src = self.dest(src_of)?;
        if dest == src {
            Ok(vec![])
        } else {
            Ok(vec![TcgOp::Mov { dest, src }])
        }
    }

    fn transfer_size(&self, id: NodeId, bits: u32) -> Result<TransferSize, Diagnostic> {
        let size = TransferSize::from_bits(bits).ok_or_else(|| {
            Diagnostic::invariant(
                format!("memory access of {} bits cannot be expressed as a transfer size", bits),
                self.graph.span(id),
            )
            .with_note("supported sizes are 8, 16, 32 and 64 bits".to_string())
        })?;
        let word = self.ctx.word();
        if size.bits() > word.bits() {
            return Err(Diagnostic::invariant(
                format!("memory access of {} bits does not fit an {} variable", bits, word),
                self.graph.span(id),
            ));
        }
        Ok(size)
    }

    fn lower_node(&mut self, id: NodeId) -> Result<Vec<TcgOp>, Diagnostic> {
        let node = self.graph.node(id)?.clone();
        match node {
            Node::ExprSave { value, .. } | Node::ZeroExtend { value, .. } => self.mov(id, value),
            Node::SignExtend { value, .. } => {
                let from_bits = self.graph.bits(value)?;
                if from_bits >= self.ctx.word().bits() {
                    return self.mov(id, value);
                }
                let dest = self.dest(id)?;
                let src = self.dest(value)?;
                Ok(vec![TcgOp::Extend {
                    dest,
                    src,
                    from_bits,
                    mode: TcgExtend::Sign,
                }])
            }
            Node::Truncate { value, .. } => {
                let bits = self.graph.bits(id)?;
                let dest = self.dest(id)?;
                let src = self.dest(value)?;
                Ok(vec![TcgOp::Truncate { dest, src, bits }])
            }
            Node::ReadReg { .. } | Node::ReadRegFile { .. } | Node::StaticPc { .. } => Ok(vec![]),
            Node::WriteReg { value, .. } | Node::WriteRegFile { value, .. } => self.mov(id, value),
            Node::ReadMem { address, .. } => {
                let size = self.transfer_size(id, self.graph.bits(id)?)?;
                let dest = self.dest(id)?;
                let addr = self.dest(address)?;
                Ok(vec![TcgOp::Load {
                    size,
                    mode: TcgExtend::Zero,
                    dest,
                    addr,
                }])
            }
            Node::WriteMem { address, value, .. } => {
                let size = self.transfer_size(id, self.graph.bits(value)?)?;
                let value = self.dest(value)?;
                let addr = self.dest(address)?;
                Ok(vec![TcgOp::Store {
                    size,
                    mode: TcgExtend::Sign,
                    value,
                    addr,
                }])
            }
            Node::BuiltIn { .. } => lower_builtin(self.graph, self.ctx, id),
            Node::TupleGet { .. } | Node::Let { .. } | Node::Select { .. } | Node::Slice { .. } => {
                Err(self.fail_unimplemented(id, node.kind_name()))
            }
            Node::Constant { .. }
            | Node::Field { .. }
            | Node::Param { .. }
            | Node::Cast { .. }
            | Node::FuncCall { .. }
            | Node::VarRef { .. } => Err(self.fail_internal(id, node.kind_name())),
            Node::Start { .. }
            | Node::If { .. }
            | Node::Begin { .. }
            | Node::BranchEnd { .. }
            | Node::Merge { .. }
            | Node::Scheduled { .. }
            | Node::InstrExit { .. }
            | Node::InstrEnd { .. }
            | Node::Op { .. }
            | Node::Raise { .. } => Err(Diagnostic::internal(
                format!("{} node {} scheduled as a value", node.kind_name(), id),
                self.graph.span(id),
            )),
        }
    }

    fn lower_exit(&mut self, exit: NodeId, cause: NodeId) -> Result<TcgOp, Diagnostic> {
        let value = match self.graph.node(cause)?.clone() {
            Node::WriteReg { value, .. } => value,
            Node::Raise { exception, args } => {
                let args = args
                    .into_iter()
                    .map(|arg| self.dest(arg))
                    .collect::<Result<Vec<_>, _>>()?;
                return Ok(TcgOp::GenException { exception, args });
            }
            _ => {
                return Err(Diagnostic::internal(
                    format!(
                        "instruction exit {} is caused by neither a program counter write nor a raise",
                        exit
                    ),
                    self.graph.span(exit),
                ))
            }
        };
        if self.ctx.is_runtime(self.graph, value) {
            return Ok(TcgOp::LookupAndGotoPtr);
        }
        let slot = if self.optimize_jump_slots && !self.branch_out_taken {
            self.branch_out_taken = true;
            JumpSlot::BranchOut
        } else {
            JumpSlot::Lookup
        };
        Ok(TcgOp::GotoTb {
            slot,
            target: host_expr(self.graph, value)?,
        })
    }

    /// Put `ops` where the control node `id` was and delete it.
    fn replace(&mut self, id: NodeId, ops: Vec<TcgOp>) -> Result<(), Diagnostic> {
        let mut cursor = id;
        for op in ops {
            cursor = self.graph.insert_after(cursor, Node::Op { op, next: None })?;
        }
        self.graph.unlink(id)
    }

    /// Materialize every variable the lowered ops use at instruction
    /// start: temporaries, constants, sources, then destinations. First-use
    /// order within each group.
    fn prologue(&mut self) -> Result<(), Diagnostic> {
        let mut seen = HashSet::new();
        let mut used: Vec<Arc<TcgV>> = Vec::new();
        for op in self.graph.lowered_ops() {
            for var in op.vars() {
                if seen.insert(var.name.clone()) {
                    used.push(Arc::clone(var));
                }
            }
        }
        used.sort_by_key(|v| match (v.kind, v.is_dest) {
            (_, true) => 3,
            (VarKind::Temp, _) => 0,
            (VarKind::Const, _) => 1,
            _ => 2,
        });

        let ops = used
            .into_iter()
            .map(|var| self.materialize(var))
            .collect::<Result<Vec<_>, _>>()?;
        debug!(count = ops.len(), "prologue");

        let mut cursor = self.graph.start()?;
        for op in ops {
            cursor = self.graph.insert_after(cursor, Node::Op { op, next: None })?;
        }
        Ok(())
    }

    fn materialize(&self, var: Arc<TcgV>) -> Result<TcgOp, Diagnostic> {
        let kind = if var.is_dest { RegKind::Dest } else { RegKind::Src };
        match (var.kind, var.binding.clone(), var.const_value) {
            (VarKind::Temp, _, _) => Ok(TcgOp::GetTemp(var)),
            (VarKind::Const, _, Some(value)) => Ok(TcgOp::GetConst {
                value: host_expr(self.graph, value)?,
                dest: var,
            }),
            (VarKind::Reg, Some(Binding::Reg(reg)), _) => Ok(TcgOp::GetReg { dest: var, reg, kind }),
            (VarKind::RegFile, Some(Binding::RegFile { file, index }), _) => Ok(TcgOp::GetRegFile {
                index: host_expr(self.graph, index)?,
                dest: var,
                file,
                kind,
            }),
            _ => Err(Diagnostic::internal(
                format!("variable {} has an inconsistent binding", var.name),
                Span::dummy(),
            )),
        }
    }
}
