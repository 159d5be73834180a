//! Built-in operation table: abstract operator → micro-op sequence.

use std::sync::Arc;

use super::ctx::TcgCtx;
use super::op::{BinaryOp, TcgOp, UnaryOp};
use super::var::{TcgCondition, TcgExtend, TcgV};
use crate::diagnostic::Diagnostic;
use crate::graph::{BuiltIn, Graph, Node, NodeId, Ty};

enum Lowering {
    Unary(UnaryOp),
    Binary(BinaryOp),
    SetCond(TcgCondition),
    /// Sign-extend the left operand, then shift logically.
    ArithShiftRight,
    /// Count at word width, then drop the zeros above a narrow operand.
    CountLeadingZeros,
    /// `CONCATENATE(hi, lo)`: deposit `hi` above `lo`.
    Concatenate,
}

fn table(op: BuiltIn) -> Option<Lowering> {
    use Lowering::*;
    Some(match op {
        BuiltIn::Add => Binary(BinaryOp::Add),
        BuiltIn::Sub => Binary(BinaryOp::Sub),
        BuiltIn::Mul => Binary(BinaryOp::Mul),
        BuiltIn::And => Binary(BinaryOp::And),
        BuiltIn::Or => Binary(BinaryOp::Or),
        BuiltIn::Xor => Binary(BinaryOp::Xor),
        BuiltIn::Lsl => Binary(BinaryOp::Shl),
        BuiltIn::Lsr => Binary(BinaryOp::Shr),
        BuiltIn::Rol => Binary(BinaryOp::Rotl),
        BuiltIn::Ror => Binary(BinaryOp::Rotr),
        BuiltIn::SDiv => Binary(BinaryOp::Div),
        BuiltIn::UDiv => Binary(BinaryOp::DivU),
        BuiltIn::SMod => Binary(BinaryOp::Rem),
        BuiltIn::UMod => Binary(BinaryOp::RemU),
        BuiltIn::Not => Unary(UnaryOp::Not),
        BuiltIn::Neg => Unary(UnaryOp::Neg),
        BuiltIn::Equ => SetCond(TcgCondition::Eq),
        BuiltIn::Neq => SetCond(TcgCondition::Ne),
        BuiltIn::Slth => SetCond(TcgCondition::Lt),
        BuiltIn::Ulth => SetCond(TcgCondition::Ltu),
        BuiltIn::Sleq => SetCond(TcgCondition::Le),
        BuiltIn::Uleq => SetCond(TcgCondition::Leu),
        BuiltIn::Sgth => SetCond(TcgCondition::Gt),
        BuiltIn::Ugth => SetCond(TcgCondition::Gtu),
        BuiltIn::Sgeq => SetCond(TcgCondition::Ge),
        BuiltIn::Ugeq => SetCond(TcgCondition::Geu),
        BuiltIn::Asr => ArithShiftRight,
        BuiltIn::Clz => CountLeadingZeros,
        BuiltIn::Concat => Concatenate,
        BuiltIn::AddS => return None,
    })
}

fn arity(op: BuiltIn, args: &[NodeId], expected: usize, id: NodeId, graph: &Graph) -> Result<(), Diagnostic> {
    if args.len() == expected {
        Ok(())
    } else {
        Err(Diagnostic::invariant(
            format!(
                "built-in {} at {} expects {} operands, found {}",
                op,
                id,
                expected,
                args.len()
            ),
            graph.span(id),
        ))
    }
}

/// A constant variable of word width holding `value`.
fn word_constant(graph: &mut Graph, ctx: &mut TcgCtx, value: u64, at: NodeId) -> Result<Arc<TcgV>, Diagnostic> {
    let node = Node::Constant {
        value,
        ty: Ty::Bits(ctx.word().bits()),
    };
    let id = graph.add_at(node, graph.span(at));
    ctx.single_destination_of(graph, id)
}

fn too_wide(graph: &Graph, op: BuiltIn, call: NodeId, bits: u32, word: u32) -> Diagnostic {
    Diagnostic::invariant(
        format!("built-in {} at {} needs {} bits, wider than the {}-bit word", op, call, bits, word),
        graph.span(call),
    )
}

/// Micro-ops computing the built-in call `call`.
pub fn lower_builtin(graph: &mut Graph, ctx: &mut TcgCtx, call: NodeId) -> Result<Vec<TcgOp>, Diagnostic> {
    let (op, args, ty) = match graph.node(call)? {
        Node::BuiltIn { op, args, ty } => (*op, args.clone(), ty.clone()),
        other => {
            return Err(Diagnostic::internal(
                format!("expected a built-in call at {}, found {}", call, other.kind_name()),
                graph.span(call),
            ))
        }
    };

    let unsupported = || {
        Diagnostic::unimplemented(format!("built-in {} has no micro-op lowering", op), graph.span(call))
            .with_note(format!("node {} of type {}", call, ty))
    };
    if let Ty::Tuple(_) = ty {
        return Err(unsupported());
    }
    let Some(lowering) = table(op) else {
        return Err(unsupported());
    };

    match lowering {
        Lowering::Unary(unary) => {
            arity(op, &args, 1, call, graph)?;
            let dest = ctx.single_destination_of(graph, call)?;
            let src = ctx.single_destination_of(graph, args[0])?;
            Ok(vec![TcgOp::Unary { op: unary, dest, src }])
        }
        Lowering::Binary(binary) => {
            arity(op, &args, 2, call, graph)?;
            let dest = ctx.single_destination_of(graph, call)?;
            let a = ctx.single_destination_of(graph, args[0])?;
            let b = ctx.single_destination_of(graph, args[1])?;
            Ok(vec![TcgOp::Binary { op: binary, dest, a, b }])
        }
        Lowering::SetCond(cond) => {
            arity(op, &args, 2, call, graph)?;
            let dest = ctx.single_destination_of(graph, call)?;
            let a = ctx.single_destination_of(graph, args[0])?;
            let b = ctx.single_destination_of(graph, args[1])?;
            Ok(vec![TcgOp::SetCond { cond, dest, a, b }])
        }
        Lowering::ArithShiftRight => {
            arity(op, &args, 2, call, graph)?;
            let from_bits = graph.bits(args[0])?;
            let dest = ctx.single_destination_of(graph, call)?;
            let a = ctx.single_destination_of(graph, args[0])?;
            let b = ctx.single_destination_of(graph, args[1])?;
            let extended = ctx.fresh_temp(graph);
            Ok(vec![
                TcgOp::Extend {
                    dest: extended.clone(),
                    src: a,
                    from_bits,
                    mode: TcgExtend::Sign,
                },
                TcgOp::Binary {
                    op: BinaryOp::Shr,
                    dest,
                    a: extended,
                    b,
                },
            ])
        }
        Lowering::CountLeadingZeros => {
            arity(op, &args, 1, call, graph)?;
            let bits = graph.bits(args[0])?;
            let word = ctx.word().bits();
            if bits > word {
                return Err(too_wide(graph, op, call, bits, word));
            }
            let dest = ctx.single_destination_of(graph, call)?;
            let src = ctx.single_destination_of(graph, args[0])?;
            let zero = word_constant(graph, ctx, u64::from(word), call)?;
            let mut ops = vec![TcgOp::Clz {
                dest: dest.clone(),
                src,
                zero,
            }];
            if bits < word {
                let excess = word_constant(graph, ctx, u64::from(word - bits), call)?;
                ops.push(TcgOp::Binary {
                    op: BinaryOp::Sub,
                    dest: dest.clone(),
                    a: dest,
                    b: excess,
                });
            }
            Ok(ops)
        }
        Lowering::Concatenate => {
            arity(op, &args, 2, call, graph)?;
            let hi_bits = graph.bits(args[0])?;
            let lo_bits = graph.bits(args[1])?;
            let word = ctx.word().bits();
            if hi_bits + lo_bits > word {
                return Err(too_wide(graph, op, call, hi_bits + lo_bits, word));
            }
            let dest = ctx.single_destination_of(graph, call)?;
            let hi = ctx.single_destination_of(graph, args[0])?;
            let lo = ctx.single_destination_of(graph, args[1])?;
            Ok(vec![TcgOp::Deposit {
                dest,
                base: lo,
                value: hi,
                pos: lo_bits,
                len: hi_bits,
            }])
        }
    }
}
