//! Record types of the export artifact.
//!
//! Everything here mirrors the flat, index-referenced schema of the export
//! format: arrays of instructions, raw blocks, flow graphs, call-graph
//! vertices and edges, operands, expressions, a mnemonic table, a string
//! table and the cross-reference tables. Records reference each other by
//! table index only; the model layer resolves those indices.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Architecture metadata exported with the artifact.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaInformation {
    /// Name of the executable the artifact was produced from.
    pub executable_name: String,
    /// Architecture name suffixed with the address size, e.g. `x86_32`, `x86_64`.
    pub architecture_name: String,
}

/// One disassembled instruction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstructionRecord {
    /// Absolute address. Only present when the encoder could not rely on
    /// contiguity with the preceding instruction; absent addresses are
    /// recovered by backtracking through `raw_bytes` lengths.
    pub address: Option<u64>,
    /// Raw encoding bytes of the instruction.
    pub raw_bytes: Vec<u8>,
    /// Index into the mnemonic table.
    pub mnemonic_index: u32,
    /// Operand table indices, in operand order.
    pub operand_index: Vec<u32>,
}

impl InstructionRecord {
    /// Instruction with an explicit address.
    pub fn at(address: u64, raw_bytes: Vec<u8>, mnemonic_index: u32) -> Self {
        Self {
            address: Some(address),
            raw_bytes,
            mnemonic_index,
            operand_index: Vec::new(),
        }
    }

    /// Instruction whose address must be recovered by backtracking.
    pub fn implicit(raw_bytes: Vec<u8>, mnemonic_index: u32) -> Self {
        Self {
            address: None,
            raw_bytes,
            mnemonic_index,
            operand_index: Vec::new(),
        }
    }
}

/// Half-open range of instruction indices.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexRange {
    pub begin_index: u32,
    /// Exclusive end; a missing end denotes a single-instruction range.
    pub end_index: Option<u32>,
}

impl IndexRange {
    pub fn new(begin_index: u32, end_index: u32) -> Self {
        Self {
            begin_index,
            end_index: Some(end_index),
        }
    }

    pub fn single(begin_index: u32) -> Self {
        Self {
            begin_index,
            end_index: None,
        }
    }

    /// Instruction indices covered by this range.
    pub fn indices(&self) -> std::ops::Range<usize> {
        let begin = self.begin_index as usize;
        let end = self
            .end_index
            .map(|end| end as usize)
            .unwrap_or(begin + 1);
        begin..end
    }
}

/// A raw block entry: one or more instruction-index ranges.
///
/// The format merges basic blocks concatenated by fallthrough into a single
/// record; each range is in fact one true basic block and the model layer
/// splits them back apart.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawBlockRecord {
    pub instruction_index: Vec<IndexRange>,
}

/// Directed edge between raw block indices inside one flow graph.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowEdgeRecord {
    pub source_basic_block_index: u32,
    pub target_basic_block_index: u32,
}

/// One function's control-flow graph, in raw block indices.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowGraphRecord {
    /// Raw block indices belonging to this function.
    pub basic_block_index: Vec<u32>,
    /// Raw block index of the entry block; its first instruction's address is
    /// the function address.
    pub entry_basic_block_index: u32,
    /// Edges between raw block indices.
    pub edges: Vec<FlowEdgeRecord>,
}

/// Call-graph vertex classification; doubles as the model's function kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FunctionKind {
    /// Regular function defined in the binary.
    Normal,
    /// Statically linked library function.
    Library,
    /// Thunk jumping to another function.
    Thunk,
    /// Imported function; carries no basic blocks.
    Imported,
    /// Invalid vertex.
    Invalid,
}

impl FunctionKind {
    pub fn value(&self) -> &str {
        match self {
            FunctionKind::Normal => "normal",
            FunctionKind::Library => "library",
            FunctionKind::Thunk => "thunk",
            FunctionKind::Imported => "imported",
            FunctionKind::Invalid => "invalid",
        }
    }
}

impl fmt::Display for FunctionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value())
    }
}

/// Call-graph vertex: one function known to the exporter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VertexRecord {
    pub address: u64,
    pub kind: FunctionKind,
    /// Mangled name; empty when the exporter had none.
    pub mangled_name: String,
}

impl VertexRecord {
    pub fn new(address: u64, kind: FunctionKind, mangled_name: impl Into<String>) -> Self {
        Self {
            address,
            kind,
            mangled_name: mangled_name.into(),
        }
    }
}

/// Directed call edge between vertex indices.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallEdgeRecord {
    pub source_vertex_index: u32,
    pub target_vertex_index: u32,
}

/// Whole-program call graph.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallGraphRecord {
    pub vertices: Vec<VertexRecord>,
    pub edges: Vec<CallEdgeRecord>,
}

/// One operand: an ordered list of expression table indices forming a
/// parent-indexed forest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperandRecord {
    pub expression_index: Vec<u32>,
}

/// Kind tag of an expression record.
///
/// Closed set; `Unknown` exists so that unrecognized wire values can be
/// carried through and reported instead of silently falling through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExpressionKind {
    Symbol,
    ImmediateInt,
    ImmediateFloat,
    Operator,
    Register,
    SizePrefix,
    Dereference,
    Unknown,
}

/// One node of an operand expression forest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpressionRecord {
    pub kind: ExpressionKind,
    /// Symbol payload: symbol name, register name, operator glyph or
    /// size-prefix token, depending on `kind`.
    pub symbol: String,
    /// Immediate payload for `ImmediateInt`.
    pub immediate: u64,
    /// Index of the parent expression in the expression table. Roots point at
    /// themselves or at the table's first slot.
    pub parent_index: u32,
}

impl ExpressionRecord {
    pub fn new(kind: ExpressionKind, symbol: impl Into<String>, immediate: u64, parent_index: u32) -> Self {
        Self {
            kind,
            symbol: symbol.into(),
            immediate,
            parent_index,
        }
    }

    pub fn symbol(kind: ExpressionKind, symbol: impl Into<String>, parent_index: u32) -> Self {
        Self::new(kind, symbol, 0, parent_index)
    }

    pub fn immediate(value: u64, parent_index: u32) -> Self {
        Self::new(ExpressionKind::ImmediateInt, "", value, parent_index)
    }
}

impl Default for ExpressionKind {
    fn default() -> Self {
        ExpressionKind::Unknown
    }
}

/// Mnemonic table entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MnemonicRecord {
    pub name: String,
}

impl MnemonicRecord {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Data cross-reference: an absolute address read or written by an instruction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataReferenceRecord {
    pub instruction_index: u32,
    pub address: u64,
}

/// Comment attached to an instruction, stored in the string table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressCommentRecord {
    pub instruction_index: u32,
    pub string_table_index: u32,
}

/// String cross-reference: at most one per instruction, attached to a
/// specific operand position.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StringReferenceRecord {
    pub instruction_index: u32,
    pub string_table_index: u32,
    /// Position of the referencing operand within the instruction.
    pub operand_expression_index: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_range_single() {
        let rng = IndexRange::single(7);
        assert_eq!(rng.indices(), 7..8);
    }

    #[test]
    fn test_index_range_span() {
        let rng = IndexRange::new(2, 6);
        assert_eq!(rng.indices(), 2..6);
        assert_eq!(rng.indices().count(), 4);
    }

    #[test]
    fn test_function_kind_value() {
        assert_eq!(FunctionKind::Imported.value(), "imported");
        assert_eq!(FunctionKind::Thunk.to_string(), "thunk");
    }

    #[test]
    fn test_instruction_record_constructors() {
        let explicit = InstructionRecord::at(0x1000, vec![0x90], 0);
        assert_eq!(explicit.address, Some(0x1000));
        let implicit = InstructionRecord::implicit(vec![0x90, 0x90], 1);
        assert_eq!(implicit.address, None);
        assert_eq!(implicit.raw_bytes.len(), 2);
    }
}
