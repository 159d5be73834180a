//! Branch lowering: flattens runtime if/merge regions into labels and
//! conditional jumps.
//!
//! A runtime region
//!
//! ```text
//! if c then T else F
//! ```
//!
//! becomes
//!
//! ```text
//! gen_label taken; gen_label end
//! brcond c, 0, ne, taken
//! F
//! br end
//! set_label taken
//! T
//! set_label end
//! ```
//!
//! Regions whose condition is known at translation time stay structured;
//! only their bodies are visited.

use tracing::debug;

use super::ctx::TcgCtx;
use super::op::TcgOp;
use super::var::TcgCondition;
use crate::diagnostic::Diagnostic;
use crate::graph::{Graph, Node, NodeId, Ty};

/// Lower every runtime region of `graph`.
pub fn lower_branches(graph: &mut Graph, ctx: &mut TcgCtx) -> Result<(), Diagnostic> {
    let start = graph.start()?;
    let end = lower_region(graph, ctx, start)?;
    if let Some(end) = end {
        return Err(Diagnostic::internal(
            format!("branch end {} outside of any region", end),
            graph.span(end),
        ));
    }
    Ok(())
}

/// Walk one region from `from`. Returns the closing `BranchEnd`, or `None`
/// when the walk reached the instruction end.
fn lower_region(graph: &mut Graph, ctx: &mut TcgCtx, from: NodeId) -> Result<Option<NodeId>, Diagnostic> {
    let mut cur = from;
    loop {
        match graph.node(cur)? {
            Node::If { .. } => cur = lower_if(graph, ctx, cur)?,
            Node::BranchEnd { .. } => return Ok(Some(cur)),
            Node::InstrEnd { .. } => return Ok(None),
            node => {
                let kind = node.kind_name();
                cur = graph.next(cur).ok_or_else(|| {
                    Diagnostic::internal(
                        format!("{} node {} has no successor", kind, cur),
                        graph.span(cur),
                    )
                })?;
            }
        }
    }
}

struct Region {
    condition: NodeId,
    true_begin: NodeId,
    false_begin: NodeId,
}

fn region_of(graph: &Graph, id: NodeId) -> Result<Region, Diagnostic> {
    match graph.node(id)? {
        Node::If {
            condition,
            true_branch,
            false_branch,
        } => Ok(Region {
            condition: *condition,
            true_begin: *true_branch,
            false_begin: *false_branch,
        }),
        other => Err(Diagnostic::internal(
            format!("expected an if node at {}, found {}", id, other.kind_name()),
            graph.span(id),
        )),
    }
}

fn closing_merge(graph: &Graph, end: Option<NodeId>, split: NodeId) -> Result<NodeId, Diagnostic> {
    match end.map(|e| graph.node(e)).transpose()? {
        Some(Node::BranchEnd {
            merge: Some(merge), ..
        }) => Ok(*merge),
        _ => Err(Diagnostic::internal(
            format!("branch of if {} does not end in a merge", split),
            graph.span(split),
        )),
    }
}

/// Lower one if node. Returns the node the walk continues from.
fn lower_if(graph: &mut Graph, ctx: &mut TcgCtx, split: NodeId) -> Result<NodeId, Diagnostic> {
    let region = region_of(graph, split)?;

    if !ctx.is_runtime(graph, region.condition) {
        debug!(node = %split, "translation-time condition, keeping region");
        let true_end = lower_region(graph, ctx, region.true_begin)?;
        let false_end = lower_region(graph, ctx, region.false_begin)?;
        let merge = closing_merge(graph, true_end, split)?;
        if closing_merge(graph, false_end, split)? != merge {
            return Err(Diagnostic::internal(
                format!("branches of if {} end in different merges", split),
                graph.span(split),
            ));
        }
        return Ok(merge);
    }

    let taken = ctx.fresh_label("taken");
    let end = ctx.fresh_label("end");
    debug!(node = %split, taken = %taken, end = %end, "lowering runtime if");

    let cond = ctx.single_destination_of(graph, region.condition)?;
    let zero = graph.add_at(
        Node::Constant {
            value: 0,
            ty: Ty::Bits(ctx.word().bits()),
        },
        graph.span(region.condition),
    );
    let zero = ctx.single_destination_of(graph, zero)?;

    let head = graph.pred(split).ok_or_else(|| {
        Diagnostic::internal(format!("if {} has no predecessor", split), graph.span(split))
    })?;
    let head = graph.insert_after(head, Node::Op {
        op: TcgOp::GenLabel(taken.clone()),
        next: None,
    })?;
    let head = graph.insert_after(head, Node::Op {
        op: TcgOp::GenLabel(end.clone()),
        next: None,
    })?;
    let brcond = graph.insert_after(head, Node::Op {
        op: TcgOp::BrCond {
            cond: TcgCondition::Ne,
            a: cond,
            b: zero,
            label: taken.clone(),
        },
        next: None,
    })?;

    // Fall-through path first, so nested labels number in emission order.
    let false_end = lower_region(graph, ctx, region.false_begin)?;
    let true_end = lower_region(graph, ctx, region.true_begin)?;
    let merge = closing_merge(graph, false_end, split)?;
    let (Some(false_end), Some(true_end)) = (false_end, true_end) else {
        return Err(Diagnostic::internal(
            format!("if {} is not closed by branch ends", split),
            graph.span(split),
        ));
    };
    let continuation = graph.next(merge);

    let mut cursor = brcond;
    cursor = splice_body(graph, cursor, region.false_begin, false_end)?;
    cursor = append(graph, cursor, TcgOp::Br(end.clone()))?;
    cursor = append(graph, cursor, TcgOp::SetLabel(taken))?;
    cursor = splice_body(graph, cursor, region.true_begin, true_end)?;
    cursor = append(graph, cursor, TcgOp::SetLabel(end))?;
    graph.set_next(cursor, continuation)?;

    for id in [split, region.true_begin, region.false_begin, true_end, false_end, merge] {
        graph.remove(id);
    }
    Ok(cursor)
}

/// Move the nodes strictly between `begin` and `end` behind `cursor`.
/// Returns the new tail.
fn splice_body(graph: &mut Graph, cursor: NodeId, begin: NodeId, end: NodeId) -> Result<NodeId, Diagnostic> {
    let first = graph.next(begin);
    if first.is_none() || first == Some(end) {
        return Ok(cursor);
    }
    let last = graph.pred(end).ok_or_else(|| {
        Diagnostic::internal(format!("branch end {} has no predecessor", end), graph.span(end))
    })?;
    graph.set_next(cursor, first)?;
    Ok(last)
}

fn append(graph: &mut Graph, cursor: NodeId, op: TcgOp) -> Result<NodeId, Diagnostic> {
    let span = graph.span(cursor);
    let id = graph.add_at(Node::Op { op, next: None }, span);
    graph.set_next(cursor, Some(id))?;
    Ok(id)
}
