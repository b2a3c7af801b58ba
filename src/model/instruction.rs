//! Instructions of the reconstructed model.
//!
//! An instruction owns its resolved address, mnemonic and attached
//! cross-references. Operands are reconstructed on demand from the flat
//! expression records and are never cached: the source records do not
//! change, so every reconstruction yields the same result.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::model::operand::Operand;
use crate::model::program::Program;

/// One instruction at a resolved address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instruction {
    address: u64,
    /// Index of this instruction in the artifact's instruction table.
    index: u32,
    mnemonic: String,
    /// Address of the owning function, for program-level lookups.
    function_address: u64,
    /// Data references attached to this instruction, most recently declared
    /// first.
    data_refs: Vec<u64>,
    /// Address comments attached to this instruction, most recently declared
    /// first.
    comments: Vec<String>,
    /// At most one string reference per instruction.
    string_reference: Option<String>,
}

impl Instruction {
    pub(crate) fn new(
        address: u64,
        index: u32,
        mnemonic: String,
        function_address: u64,
        data_refs: Vec<u64>,
        comments: Vec<String>,
        string_reference: Option<String>,
    ) -> Self {
        Self {
            address,
            index,
            mnemonic,
            function_address,
            data_refs,
            comments,
            string_reference,
        }
    }

    /// Resolved absolute address.
    pub fn address(&self) -> u64 {
        self.address
    }

    /// Index of this instruction in the artifact's instruction table.
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Mnemonic, resolved through the artifact's mnemonic table.
    pub fn mnemonic(&self) -> &str {
        &self.mnemonic
    }

    /// Address of the function this instruction was assembled into.
    pub fn function_address(&self) -> u64 {
        self.function_address
    }

    /// Data-reference addresses, most recently declared first.
    pub fn data_refs(&self) -> &[u64] {
        &self.data_refs
    }

    /// Address comments, most recently declared first.
    pub fn comments(&self) -> &[String] {
        &self.comments
    }

    /// The string referenced by this instruction, if any.
    pub fn string_reference(&self) -> Option<&str> {
        self.string_reference.as_deref()
    }

    /// Whether this instruction is the entry point of a known function.
    pub fn is_function_entry(&self, program: &Program) -> bool {
        program.function_at(self.address).is_some()
    }

    /// Reconstruct the operand list from the flat expression records.
    ///
    /// Built on demand and never cached.
    pub fn operands(&self, program: &Program) -> Result<Vec<Operand>> {
        let record = program.artifact().instruction(self.index as usize)?;
        let function = program.function_at(self.function_address);
        record
            .operand_index
            .iter()
            .enumerate()
            .map(|(position, &operand_index)| {
                Operand::build(program, function, self, operand_index, position as u32)
            })
            .collect()
    }

    /// Surface the comment for this instruction, when one applies.
    ///
    /// The selection between data references and address comments follows the
    /// exporter's index-parity quirk: the comment list is only consulted from
    /// position `len(data_refs)` onward when there are at least as many data
    /// references as comments. At a function entry whose trailing comment
    /// merely repeats the function name, the next-older comment is surfaced
    /// instead.
    pub fn comment(&self, program: &Program) -> Option<String> {
        let ith = if self.data_refs.len() >= self.comments.len() {
            self.data_refs.len()
        } else {
            0
        };
        if self.comments.len() <= ith {
            return None;
        }
        let last = self.comments.last()?;
        if self.is_function_entry(program) {
            let name = program.function_at(self.address).map(|f| f.name())?;
            if *last == name {
                if self.comments.len() >= 2 {
                    return Some(self.comments[self.comments.len() - 2].clone());
                }
                return None;
            }
            None
        } else {
            Some(last.clone())
        }
    }

    /// Canonical one-line rendering: mnemonic followed by the rendered
    /// operands.
    pub fn render(&self, program: &Program) -> Result<String> {
        let operands = self.operands(program)?;
        if operands.is_empty() {
            return Ok(self.mnemonic.clone());
        }
        let rendered: Vec<String> = operands.iter().map(|op| op.render()).collect();
        Ok(format!("{} {}", self.mnemonic, rendered.join(", ")))
    }
}
