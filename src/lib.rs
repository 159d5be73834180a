pub mod config;
pub mod diagnostic;
pub mod graph;
pub mod isa;
pub mod pipeline;
pub mod samples;
pub mod span;
pub mod tcg;

// Re-exports: the entry points used by the CLI, tests and benches
pub use config::LoweringConfig;
pub use diagnostic::{render_diagnostics, Diagnostic, DiagnosticKind};
pub use graph::builder::GraphBuilder;
pub use graph::{BuiltIn, Graph, Node, NodeId, Ty};
pub use isa::{Instruction, Isa, Memory, Register, RegisterFile};
pub use pipeline::{lower_instruction, lower_isa, LoweredInstruction, LoweringReport};
pub use tcg::{JumpPolicy, TcgOp, TcgV, TcgWidth};
