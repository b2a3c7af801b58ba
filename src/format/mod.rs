//! The flat record set of a disassembler's export artifact.
//!
//! The outer wire decoding is an external concern: this module only defines
//! the pre-parsed, read-only, randomly-indexable records and the [`Artifact`]
//! container that owns them, together with the instruction address resolver
//! that recovers the addresses the format stores only implicitly.

pub mod artifact;
pub mod records;

pub use artifact::Artifact;
pub use records::{
    AddressCommentRecord, CallEdgeRecord, CallGraphRecord, DataReferenceRecord, ExpressionKind,
    ExpressionRecord, FlowEdgeRecord, FlowGraphRecord, FunctionKind, IndexRange,
    InstructionRecord, MetaInformation, MnemonicRecord, OperandRecord, RawBlockRecord,
    StringReferenceRecord, VertexRecord,
};
