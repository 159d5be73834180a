//! Driver for the TCG lowering passes.
//!
//! Each phase completes for every instruction before the next phase
//! starts. Instruction graphs are disjoint and all naming state lives in
//! the per-instruction context, so a phase may run its instructions on the
//! rayon pool without changing the result.

use std::fmt;

use rayon::prelude::*;
use tracing::{debug, info};

use crate::config::LoweringConfig;
use crate::diagnostic::Diagnostic;
use crate::isa::{Instruction, Isa};
use crate::tcg::{branch, lower, JumpPolicy, TcgCtx, TcgOp};

/// Summary of one lowered instruction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoweredInstruction {
    pub name: String,
    /// Number of micro-ops, prologue included.
    pub ops: usize,
    /// Number of declared labels.
    pub labels: usize,
    pub policy: Option<JumpPolicy>,
    /// BLAKE3 of the listing, hex encoded.
    pub fingerprint: String,
}

impl LoweredInstruction {
    fn of(instruction: &Instruction) -> Self {
        let ops = instruction.graph.lowered_ops();
        let labels = ops.iter().filter(|op| matches!(op, TcgOp::GenLabel(_))).count();
        let policy = ops.iter().find_map(|op| match op {
            TcgOp::SetIsJmp(policy) => Some(*policy),
            _ => None,
        });
        Self {
            name: instruction.name.clone(),
            ops: ops.len(),
            labels,
            policy,
            fingerprint: fingerprint(&instruction.listing()),
        }
    }
}

impl fmt::Display for LoweredInstruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let policy = self
            .policy
            .map(|p| p.to_string())
            .unwrap_or_else(|| "-".to_string());
        write!(
            f,
            "{:<8} {:>4} ops {:>2} labels  {:<8}",
            self.name, self.ops, self.labels, policy
        )
    }
}

/// Result of lowering a whole instruction set.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LoweringReport {
    pub isa: String,
    pub rows: Vec<LoweredInstruction>,
}

impl LoweringReport {
    pub fn total_ops(&self) -> usize {
        self.rows.iter().map(|r| r.ops).sum()
    }

    pub fn row(&self, name: &str) -> Option<&LoweredInstruction> {
        self.rows.iter().find(|r| r.name.eq_ignore_ascii_case(name))
    }
}

/// BLAKE3 over the newline-joined listing.
pub fn fingerprint(listing: &[String]) -> String {
    blake3::hash(listing.join("\n").as_bytes()).to_hex().to_string()
}

fn attach(instruction: &mut Instruction, config: &LoweringConfig) -> Result<(), Diagnostic> {
    instruction.ctx = Some(TcgCtx::attach(&instruction.graph, config.word_width));
    Ok(())
}

fn lower_branches(instruction: &mut Instruction) -> Result<(), Diagnostic> {
    debug!(instruction = %instruction.name, "branch lowering");
    let Instruction { graph, ctx, span, .. } = instruction;
    let ctx = ctx.as_mut().ok_or_else(|| {
        Diagnostic::internal("no lowering context attached".to_string(), *span)
    })?;
    branch::lower_branches(graph, ctx)
}

fn lower_ops(instruction: &mut Instruction, config: &LoweringConfig) -> Result<(), Diagnostic> {
    debug!(instruction = %instruction.name, "operation lowering");
    let Instruction { graph, ctx, span, .. } = instruction;
    let ctx = ctx.as_mut().ok_or_else(|| {
        Diagnostic::internal("no lowering context attached".to_string(), *span)
    })?;
    lower::lower_ops(graph, ctx, config)
}

/// Run one phase over all instructions, tagging a failure with the
/// instruction it came from.
fn run_phase<F>(instructions: &mut [Instruction], parallel: bool, phase: F) -> Result<(), Diagnostic>
where
    F: Fn(&mut Instruction) -> Result<(), Diagnostic> + Sync + Send,
{
    let run = |instruction: &mut Instruction| {
        phase(instruction).map_err(|d| d.in_instruction(&instruction.name, instruction.span))
    };
    if parallel {
        instructions.par_iter_mut().try_for_each(run)
    } else {
        instructions.iter_mut().try_for_each(run)
    }
}

/// Lower every instruction of `isa` in place.
pub fn lower_isa(isa: &mut Isa, config: &LoweringConfig) -> Result<LoweringReport, Diagnostic> {
    info!(
        isa = %isa.name,
        instructions = isa.instructions.len(),
        word = %config.word_width,
        parallel = config.parallel,
        "lowering instruction set"
    );
    run_phase(&mut isa.instructions, config.parallel, |i| attach(i, config))?;
    run_phase(&mut isa.instructions, config.parallel, lower_branches)?;
    run_phase(&mut isa.instructions, config.parallel, |i| lower_ops(i, config))?;

    let report = LoweringReport {
        isa: isa.name.clone(),
        rows: isa.instructions.iter().map(LoweredInstruction::of).collect(),
    };
    info!(total_ops = report.total_ops(), "lowering finished");
    Ok(report)
}

/// Run all phases on a single instruction.
pub fn lower_instruction(
    instruction: &mut Instruction,
    config: &LoweringConfig,
) -> Result<LoweredInstruction, Diagnostic> {
    attach(instruction, config)?;
    let lowered = lower_branches(instruction).and_then(|()| lower_ops(instruction, config));
    lowered.map_err(|d| d.in_instruction(&instruction.name, instruction.span))?;
    Ok(LoweredInstruction::of(instruction))
}
