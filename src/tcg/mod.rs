//! TCG lowering: behavior graph → flat micro-op sequence.
//!
//! The passes run per instruction in a fixed order:
//!
//! 1. `TcgCtx::attach`: empty assignment table
//! 2. `branch::lower_branches`: runtime if/merge regions → labels + jumps
//! 3. `lower::lower_ops`: scheduled nodes → micro-ops, jump policy,
//!    prologue
//!
//! After the last pass the control spine holds only `Node::Op`s (plus
//! translation-time if regions around them) and the instruction end.

pub mod branch;
pub mod builtin;
pub mod ctx;
pub mod jump;
pub mod lower;
pub mod op;
pub mod var;


pub use ctx::TcgCtx;
pub use jump::JumpPolicy;
pub use op::{HostExpr, Label, TcgOp};
pub use var::{TcgCondition, TcgExtend, TcgV, TcgWidth, TransferSize, VarKind};
