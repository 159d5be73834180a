//! Chaining decision for the JIT loop.

use std::fmt;

use crate::diagnostic::Diagnostic;
use crate::graph::{Graph, Node};

/// Value of `ctx->is_jmp` after the instruction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum JumpPolicy {
    /// The instruction may fall through; chain to the next one.
    Chain,
    /// Every path leaves the block; do not emit a fall-through exit.
    NoReturn,
}

impl fmt::Display for JumpPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JumpPolicy::Chain => write!(f, "chain"),
            JumpPolicy::NoReturn => write!(f, "noreturn"),
        }
    }
}

/// Decide the policy from the exits of a graph.
///
/// Exits are program counter writes and raised exceptions alike.
/// No exit: `None`. An exit caused by a side effect of the default path
/// (the instruction end) is unconditional: `NoReturn`. Exits that only
/// occur in conditional regions: `Chain`.
pub fn select_policy(graph: &Graph) -> Result<Option<JumpPolicy>, Diagnostic> {
    let causes: Vec<_> = graph
        .iter()
        .filter_map(|(_, n)| match n {
            Node::InstrExit { cause, .. } => Some(*cause),
            _ => None,
        })
        .collect();
    if causes.is_empty() {
        return Ok(None);
    }

    let end = graph.instr_end()?;
    let Node::InstrEnd { side_effects } = graph.node(end)? else {
        return Err(Diagnostic::internal(
            format!("node {} is not an instruction end", end),
            graph.span(end),
        ));
    };
    if causes.iter().any(|c| side_effects.contains(c)) {
        Ok(Some(JumpPolicy::NoReturn))
    } else {
        Ok(Some(JumpPolicy::Chain))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::builder::GraphBuilder;
    use crate::graph::BuiltIn;
    use crate::isa::{Register, RegisterFile};

    #[test]
    fn test_no_exit_no_policy() {
        let graph = GraphBuilder::new().finish();
        assert_eq!(select_policy(&graph).unwrap(), None);
    }

    #[test]
    fn test_unconditional_exit_is_noreturn() {
        let pc = Register::new("PC", 64);
        let mut b = GraphBuilder::new();
        let here = b.static_pc(64);
        let imm = b.field("imm", 64);
        let target = b.builtin(BuiltIn::Add, &[here, imm], 64);
        b.jump(&pc, target);
        let graph = b.finish();
        assert_eq!(select_policy(&graph).unwrap(), Some(JumpPolicy::NoReturn));
    }

    #[test]
    fn test_conditional_exit_is_chain() {
        let pc = Register::new("PC", 64);
        let x = RegisterFile::new("X", 5, 64);
        let mut b = GraphBuilder::new();
        let rs1 = b.field("rs1", 5);
        let a = b.read_reg_file(&x, rs1);
        let zero = b.constant(0, 64);
        let cond = b.builtin(BuiltIn::Equ, &[a, zero], 1);
        b.if_then(cond, |b| {
            let here = b.static_pc(64);
            b.jump(&pc, here);
        });
        let graph = b.finish();
        assert_eq!(select_policy(&graph).unwrap(), Some(JumpPolicy::Chain));
    }

    #[test]
    fn test_raise_counts_as_exit() {
        let mut b = GraphBuilder::new();
        b.raise("ECALL", &[]);
        let graph = b.finish();
        assert_eq!(select_policy(&graph).unwrap(), Some(JumpPolicy::NoReturn));
    }

    #[test]
    fn test_display() {
        assert_eq!(JumpPolicy::NoReturn.to_string(), "noreturn");
    }
}
