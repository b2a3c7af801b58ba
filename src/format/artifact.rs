//! Artifact container and instruction address resolution.
//!
//! An [`Artifact`] is the fully materialized record set of one export. All
//! access goes through bounds-checked accessors: the format references
//! records by index and a dangling index means the artifact is malformed,
//! which is fatal.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::{AncalagonError, Result};
use crate::format::records::{
    AddressCommentRecord, CallGraphRecord, DataReferenceRecord, ExpressionRecord, FlowGraphRecord,
    InstructionRecord, MetaInformation, MnemonicRecord, OperandRecord, RawBlockRecord,
    StringReferenceRecord, VertexRecord,
};

/// The pre-decoded record set of one exported disassembly.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub meta: MetaInformation,
    pub instructions: Vec<InstructionRecord>,
    pub basic_blocks: Vec<RawBlockRecord>,
    pub flow_graphs: Vec<FlowGraphRecord>,
    pub call_graph: CallGraphRecord,
    pub operands: Vec<OperandRecord>,
    pub expressions: Vec<ExpressionRecord>,
    pub mnemonics: Vec<MnemonicRecord>,
    pub string_table: Vec<String>,
    pub data_references: Vec<DataReferenceRecord>,
    pub address_comments: Vec<AddressCommentRecord>,
    pub string_references: Vec<StringReferenceRecord>,
}

impl Artifact {
    /// Decode an artifact from its binary encoding.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        bincode::deserialize(data).map_err(|e| AncalagonError::Decode(e.to_string()))
    }

    /// Encode the artifact into its binary encoding.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(|e| AncalagonError::Decode(e.to_string()))
    }

    /// Decode an artifact from a JSON string.
    pub fn from_json_str(json_str: &str) -> Result<Self> {
        serde_json::from_str(json_str).map_err(|e| AncalagonError::Decode(e.to_string()))
    }

    /// Serialize to a JSON string.
    pub fn to_json_string(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| AncalagonError::Decode(e.to_string()))
    }

    /// Read and decode an artifact file.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let data = fs::read(path)?;
        Self::from_bytes(&data)
    }

    /// Name of the executable the artifact was produced from.
    pub fn executable_name(&self) -> &str {
        &self.meta.executable_name
    }

    /// Architecture name suffixed with the address size, e.g. `x86_64`.
    pub fn architecture(&self) -> &str {
        &self.meta.architecture_name
    }

    /// Mask for address values taken from fields that are not
    /// address-width-correct. 32-bit architectures keep the low 32 bits.
    pub fn address_mask(&self) -> u64 {
        if self.meta.architecture_name.ends_with("32") {
            0xFFFF_FFFF
        } else {
            0xFFFF_FFFF_FFFF_FFFF
        }
    }

    pub fn instruction(&self, index: usize) -> Result<&InstructionRecord> {
        self.instructions.get(index).ok_or(AncalagonError::RecordIndex {
            table: "instruction",
            index,
        })
    }

    pub fn raw_block(&self, index: usize) -> Result<&RawBlockRecord> {
        self.basic_blocks.get(index).ok_or(AncalagonError::RecordIndex {
            table: "basic_block",
            index,
        })
    }

    pub fn operand(&self, index: usize) -> Result<&OperandRecord> {
        self.operands.get(index).ok_or(AncalagonError::RecordIndex {
            table: "operand",
            index,
        })
    }

    pub fn expression(&self, index: usize) -> Result<&ExpressionRecord> {
        self.expressions.get(index).ok_or(AncalagonError::RecordIndex {
            table: "expression",
            index,
        })
    }

    pub fn mnemonic(&self, index: usize) -> Result<&MnemonicRecord> {
        self.mnemonics.get(index).ok_or(AncalagonError::RecordIndex {
            table: "mnemonic",
            index,
        })
    }

    pub fn string(&self, index: usize) -> Result<&str> {
        self.string_table
            .get(index)
            .map(String::as_str)
            .ok_or(AncalagonError::RecordIndex {
                table: "string_table",
                index,
            })
    }

    pub fn call_graph_vertex(&self, index: usize) -> Result<&VertexRecord> {
        self.call_graph
            .vertices
            .get(index)
            .ok_or(AncalagonError::RecordIndex {
                table: "call_graph.vertex",
                index,
            })
    }

    /// Absolute address of the instruction at `index`.
    ///
    /// The format stores addresses only at discontinuities; for all other
    /// instructions the address is recovered by backtracking through the
    /// raw byte lengths of the preceding instructions.
    pub fn instruction_address(&self, index: usize) -> Result<u64> {
        let inst = self.instruction(index)?;
        match inst.address {
            Some(address) => Ok(address),
            None => self.backtrack_address(index),
        }
    }

    fn backtrack_address(&self, index: usize) -> Result<u64> {
        if index == 0 {
            // Nothing to backtrack to; the record's default address stands.
            return Ok(self.instruction(0)?.address.unwrap_or(0));
        }
        let mut size = 0u64;
        let mut idx = index;
        while idx > 0 {
            idx -= 1;
            let inst = self.instruction(idx)?;
            size = size.wrapping_add(inst.raw_bytes.len() as u64);
            if let Some(address) = inst.address {
                return Ok(address.wrapping_add(size));
            }
        }
        Err(AncalagonError::InvalidRecord(format!(
            "no explicit address found backtracking from instruction {index}"
        )))
    }

    /// Address of the raw block at `index`: the address of its first
    /// instruction.
    pub fn basic_block_address(&self, index: usize) -> Result<u64> {
        let block = self.raw_block(index)?;
        let first = block.instruction_index.first().ok_or_else(|| {
            AncalagonError::InvalidRecord(format!("raw block {index} has no instruction ranges"))
        })?;
        self.instruction_address(first.begin_index as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::records::IndexRange;

    fn artifact_with_instructions(instructions: Vec<InstructionRecord>) -> Artifact {
        Artifact {
            instructions,
            ..Artifact::default()
        }
    }

    #[test]
    fn test_explicit_address_returned_unchanged() {
        let artifact = artifact_with_instructions(vec![
            InstructionRecord::at(0x1000, vec![0x55], 0),
            InstructionRecord::at(0x2000, vec![0xc3], 0),
        ]);
        assert_eq!(artifact.instruction_address(0).unwrap(), 0x1000);
        assert_eq!(artifact.instruction_address(1).unwrap(), 0x2000);
    }

    #[test]
    fn test_backtracked_address_sums_byte_lengths() {
        let artifact = artifact_with_instructions(vec![
            InstructionRecord::at(0x1000, vec![0x55], 0),
            InstructionRecord::implicit(vec![0x48, 0x89, 0xe5], 0),
            InstructionRecord::implicit(vec![0x90], 0),
        ]);
        // 0x1000 + 1
        assert_eq!(artifact.instruction_address(1).unwrap(), 0x1001);
        // 0x1000 + 1 + 3
        assert_eq!(artifact.instruction_address(2).unwrap(), 0x1004);
    }

    #[test]
    fn test_backtracking_is_locally_consistent() {
        let artifact = artifact_with_instructions(vec![
            InstructionRecord::at(0x4000, vec![0x55, 0x56], 0),
            InstructionRecord::implicit(vec![0x90; 4], 0),
            InstructionRecord::implicit(vec![0x90; 2], 0),
            InstructionRecord::implicit(vec![0xc3], 0),
        ]);
        for idx in 1..4 {
            let prev = artifact.instruction_address(idx - 1).unwrap();
            let prev_len = artifact.instruction(idx - 1).unwrap().raw_bytes.len() as u64;
            assert_eq!(artifact.instruction_address(idx).unwrap(), prev + prev_len);
        }
    }

    #[test]
    fn test_index_zero_without_address_is_degenerate() {
        let artifact =
            artifact_with_instructions(vec![InstructionRecord::implicit(vec![0x90], 0)]);
        // Known degenerate case: the default address is returned as-is.
        assert_eq!(artifact.instruction_address(0).unwrap(), 0);
    }

    #[test]
    fn test_out_of_range_index_is_fatal() {
        let artifact = artifact_with_instructions(vec![]);
        let err = artifact.instruction_address(3).unwrap_err();
        assert!(matches!(
            err,
            AncalagonError::RecordIndex {
                table: "instruction",
                index: 3
            }
        ));
    }

    #[test]
    fn test_basic_block_address_resolves_first_instruction() {
        let mut artifact = artifact_with_instructions(vec![
            InstructionRecord::at(0x1000, vec![0x55], 0),
            InstructionRecord::implicit(vec![0x90], 0),
        ]);
        artifact.basic_blocks.push(RawBlockRecord {
            instruction_index: vec![IndexRange::new(1, 2)],
        });
        assert_eq!(artifact.basic_block_address(0).unwrap(), 0x1001);
    }

    #[test]
    fn test_address_mask_by_architecture() {
        let mut artifact = Artifact::default();
        artifact.meta.architecture_name = "x86_32".to_string();
        assert_eq!(artifact.address_mask(), 0xFFFF_FFFF);
        artifact.meta.architecture_name = "x86_64".to_string();
        assert_eq!(artifact.address_mask(), u64::MAX);
    }

    #[test]
    fn test_binary_roundtrip() {
        let artifact = artifact_with_instructions(vec![InstructionRecord::at(
            0x1000,
            vec![0x55],
            0,
        )]);
        let bytes = artifact.to_bytes().unwrap();
        let decoded = Artifact::from_bytes(&bytes).unwrap();
        assert_eq!(artifact, decoded);
    }

    #[test]
    fn test_undecodable_buffer_is_fatal() {
        let err = Artifact::from_bytes(&[0xff, 0x00, 0x13]).unwrap_err();
        assert!(matches!(err, AncalagonError::Decode(_)));
    }
}
