//! ancalagon: loader for disassembler export artifacts.
//!
//! Decodes a flat, index-referenced record set describing a disassembled
//! executable into a navigable in-memory model: functions containing
//! control-flow graphs of basic blocks containing instructions, plus a
//! whole-program call graph. The source format omits information that must
//! be recomputed while loading: most instruction addresses are implicit and
//! recovered by backtracking through byte-length deltas, a raw block record
//! may concatenate several true basic blocks that have to be split back
//! apart and re-linked, and operand expressions arrive as flat
//! parent-indexed arrays that are reassembled into classified trees on
//! demand.
//!
//! ```no_run
//! use ancalagon::Program;
//!
//! fn main() -> ancalagon::Result<()> {
//!     let program = Program::from_path("sample.export")?;
//!     for function in program.functions().values() {
//!         println!("{:#x} {}", function.address(), function.name());
//!     }
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod export;
pub mod format;
pub mod logging;
pub mod model;

pub use error::{AncalagonError, Result};
pub use export::Exporter;
pub use format::artifact::Artifact;
pub use format::records::{ExpressionKind, FunctionKind};
pub use model::basic_block::BasicBlock;
pub use model::expression::{ExprNode, ExprToken, ExprTree};
pub use model::function::Function;
pub use model::instruction::Instruction;
pub use model::operand::Operand;
pub use model::program::Program;
