//! True basic blocks and their assembly from raw block ranges.
//!
//! A raw block record may concatenate several true basic blocks as separate
//! instruction-index ranges; each range assembles into one block here. The
//! address/previous-index carry state is threaded across *all* ranges of one
//! function, never reset per block: contiguity of addresses only holds for
//! immediately adjacent instruction indices.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::error::{AncalagonError, Result};
use crate::format::artifact::Artifact;
use crate::format::records::IndexRange;
use crate::model::instruction::Instruction;
use crate::model::program::XrefTables;

/// Address accumulator threaded across the block assembly of one function.
///
/// `current_address` is the address of the next instruction when it is
/// contiguous with the previous one; `previous_index` is the last consumed
/// instruction index. An explicit accumulator keeps address resolution pure
/// and testable in isolation.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct CarryState {
    current_address: Option<u64>,
    previous_index: Option<usize>,
}

/// A true basic block: a maximal straight-line instruction sequence.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BasicBlock {
    address: u64,
    /// Instructions in strict address order.
    instructions: BTreeMap<u64, Instruction>,
    /// Predecessor block addresses within the same function.
    predecessors: BTreeSet<u64>,
    /// Successor block addresses within the same function.
    successors: BTreeSet<u64>,
}

impl BasicBlock {
    /// Assemble one true basic block from an instruction-index range.
    pub(crate) fn assemble(
        artifact: &Artifact,
        xrefs: &XrefTables,
        function_address: u64,
        range: &IndexRange,
        carry: &mut CarryState,
    ) -> Result<Self> {
        let mut address: Option<u64> = None;
        let mut instructions = BTreeMap::new();

        for idx in range.indices() {
            // No contiguity guarantee across non-adjacent indices.
            if carry.previous_index.map_or(true, |prev| idx != prev + 1) {
                carry.current_address = None;
            }

            let record = artifact.instruction(idx)?;
            let current = match (record.address, carry.current_address) {
                // An explicit address wins even when it conflicts with the
                // carried one: data interleaved with code inside a range
                // breaks contiguity, and that is tolerated.
                (Some(explicit), _) => {
                    carry.current_address = Some(explicit);
                    explicit
                }
                (None, Some(carried)) => carried,
                (None, None) => {
                    let resolved = artifact.instruction_address(idx)?;
                    carry.current_address = Some(resolved);
                    resolved
                }
            };

            // The block's own address is the current address at its first
            // processed instruction.
            if address.is_none() {
                address = Some(current);
            }

            let mnemonic = artifact.mnemonic(record.mnemonic_index as usize)?.name.clone();
            let data_refs = xrefs
                .data_refs
                .get(&(idx as u32))
                .cloned()
                .unwrap_or_default();
            let comments = xrefs
                .comments
                .get(&(idx as u32))
                .cloned()
                .unwrap_or_default();
            let string_reference = match xrefs.string_refs.get(&(idx as u32)) {
                Some(entry) => Some(artifact.string(entry.string_table_index as usize)?.to_string()),
                None => None,
            };
            instructions.insert(
                current,
                Instruction::new(
                    current,
                    idx as u32,
                    mnemonic,
                    function_address,
                    data_refs,
                    comments,
                    string_reference,
                ),
            );

            carry.current_address = Some(current.wrapping_add(record.raw_bytes.len() as u64));
            carry.previous_index = Some(idx);
        }

        let address = address.ok_or_else(|| {
            AncalagonError::InvalidRecord("basic block range is empty".to_string())
        })?;
        Ok(Self {
            address,
            instructions,
            predecessors: BTreeSet::new(),
            successors: BTreeSet::new(),
        })
    }

    /// Address of the block: the address of its first instruction.
    pub fn address(&self) -> u64 {
        self.address
    }

    /// Instructions in strict address order.
    pub fn instructions(&self) -> &BTreeMap<u64, Instruction> {
        &self.instructions
    }

    /// Predecessor block addresses within the function's control-flow graph.
    pub fn predecessors(&self) -> &BTreeSet<u64> {
        &self.predecessors
    }

    /// Successor block addresses within the function's control-flow graph.
    pub fn successors(&self) -> &BTreeSet<u64> {
        &self.successors
    }

    pub(crate) fn predecessors_mut(&mut self) -> &mut BTreeSet<u64> {
        &mut self.predecessors
    }

    pub(crate) fn successors_mut(&mut self) -> &mut BTreeSet<u64> {
        &mut self.successors
    }

    /// Deduplicated strings referenced by this block's instructions.
    pub fn string_references(&self) -> BTreeSet<&str> {
        self.instructions
            .values()
            .filter_map(|inst| inst.string_reference())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::records::{InstructionRecord, MnemonicRecord};

    fn artifact(instructions: Vec<InstructionRecord>) -> Artifact {
        Artifact {
            instructions,
            mnemonics: vec![MnemonicRecord::new("nop")],
            ..Artifact::default()
        }
    }

    #[test]
    fn test_assemble_contiguous_range() {
        let artifact = artifact(vec![
            InstructionRecord::at(0x1000, vec![0x55], 0),
            InstructionRecord::implicit(vec![0x90, 0x90], 0),
            InstructionRecord::implicit(vec![0xc3], 0),
        ]);
        let xrefs = XrefTables::default();
        let mut carry = CarryState::default();
        let block = BasicBlock::assemble(
            &artifact,
            &xrefs,
            0x1000,
            &IndexRange::new(0, 3),
            &mut carry,
        )
        .unwrap();
        assert_eq!(block.address(), 0x1000);
        let addrs: Vec<u64> = block.instructions().keys().copied().collect();
        assert_eq!(addrs, vec![0x1000, 0x1001, 0x1003]);
    }

    #[test]
    fn test_carry_discarded_across_gap() {
        let artifact = artifact(vec![
            InstructionRecord::at(0x1000, vec![0x55], 0),
            InstructionRecord::implicit(vec![0x90], 0),
            InstructionRecord::at(0x2000, vec![0x48], 0),
            InstructionRecord::implicit(vec![0xc3], 0),
        ]);
        let xrefs = XrefTables::default();
        let mut carry = CarryState::default();
        let first = BasicBlock::assemble(
            &artifact,
            &xrefs,
            0x1000,
            &IndexRange::new(0, 2),
            &mut carry,
        )
        .unwrap();
        assert_eq!(first.address(), 0x1000);
        // Index 3 is not the successor of index 1, so the carried address is
        // dropped and the explicit address at index 2 governs.
        let second = BasicBlock::assemble(
            &artifact,
            &xrefs,
            0x1000,
            &IndexRange::new(3, 4),
            &mut carry,
        )
        .unwrap();
        assert_eq!(second.address(), 0x2001);
    }

    #[test]
    fn test_explicit_address_overrides_carry() {
        let artifact = artifact(vec![
            InstructionRecord::at(0x1000, vec![0x55], 0),
            // conflicts with the carried 0x1001; data interleaved with code
            InstructionRecord::at(0x1010, vec![0x90], 0),
        ]);
        let xrefs = XrefTables::default();
        let mut carry = CarryState::default();
        let block = BasicBlock::assemble(
            &artifact,
            &xrefs,
            0x1000,
            &IndexRange::new(0, 2),
            &mut carry,
        )
        .unwrap();
        let addrs: Vec<u64> = block.instructions().keys().copied().collect();
        assert_eq!(addrs, vec![0x1000, 0x1010]);
    }

    #[test]
    fn test_empty_range_is_invalid() {
        let artifact = artifact(vec![InstructionRecord::at(0x1000, vec![0x55], 0)]);
        let xrefs = XrefTables::default();
        let mut carry = CarryState::default();
        let err = BasicBlock::assemble(
            &artifact,
            &xrefs,
            0x1000,
            &IndexRange::new(1, 1),
            &mut carry,
        )
        .unwrap_err();
        assert!(matches!(err, AncalagonError::InvalidRecord(_)));
    }
}
