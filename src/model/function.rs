//! Functions and control-flow graph assembly from flow-graph records.
//!
//! A function owns its basic blocks keyed by address and carries non-owning
//! caller/callee relation sets: the call graph is cyclic, so relations are
//! stored as addresses into the program's function table, never as owning
//! links.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

use tracing::error;

use crate::error::{AncalagonError, Result};
use crate::format::artifact::Artifact;
use crate::format::records::{FlowGraphRecord, FunctionKind};
use crate::model::basic_block::{BasicBlock, CarryState};
use crate::model::program::XrefTables;

/// One function of the reconstructed model.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Function {
    address: u64,
    /// Mangled name from the call graph; `None` renders as `sub_<addr>`.
    name: Option<String>,
    /// Classification backfilled during call-graph overlay; functions with
    /// no call-graph vertex never get one.
    kind: Option<FunctionKind>,
    /// Basic blocks keyed by address.
    blocks: BTreeMap<u64, BasicBlock>,
    /// Directed control-flow edges between block addresses.
    edges: BTreeSet<(u64, u64)>,
    /// Addresses of functions calling this one.
    parents: BTreeSet<u64>,
    /// Addresses of functions called by this one.
    children: BTreeSet<u64>,
}

impl Function {
    /// Assemble a function from one flow-graph record.
    ///
    /// The carry state is shared across all raw blocks of the function, and
    /// raw blocks split into several true basic blocks are re-linked as a
    /// fallthrough chain. Flow edges touching a split raw block resolve to
    /// its last true block on the source side and its first on the target
    /// side.
    pub(crate) fn assemble(
        artifact: &Artifact,
        xrefs: &XrefTables,
        record: &FlowGraphRecord,
    ) -> Result<Self> {
        let address =
            artifact.basic_block_address(record.entry_basic_block_index as usize)?;
        let mut function = Function {
            address,
            ..Function::default()
        };

        let mut carry = CarryState::default();
        // raw block index -> address of the last block assembled for it
        let mut block_map: HashMap<u32, u64> = HashMap::new();
        // raw block index -> (first, last) addresses, for split blocks only
        let mut range_map: HashMap<u32, (u64, u64)> = HashMap::new();
        let mut produced = 0usize;

        for &raw_index in &record.basic_block_index {
            let raw = artifact.raw_block(raw_index as usize)?;
            let mut split: Vec<u64> = Vec::with_capacity(raw.instruction_index.len());
            for range in &raw.instruction_index {
                produced += 1;
                let block = BasicBlock::assemble(artifact, xrefs, address, range, &mut carry)?;
                if function.blocks.contains_key(&block.address()) {
                    error!(
                        function = %format_args!("{address:#x}"),
                        block = %format_args!("{:#x}", block.address()),
                        raw_index,
                        "basic block address collision"
                    );
                }
                block_map.insert(raw_index, block.address());
                split.push(block.address());
                function.blocks.insert(block.address(), block);
            }
            if split.len() > 1 {
                for pair in split.windows(2) {
                    function.link(pair[0], pair[1]);
                }
                range_map.insert(raw_index, (split[0], split[split.len() - 1]));
            }
        }

        if produced != function.blocks.len() {
            error!(
                function = %format_args!("{address:#x}"),
                produced,
                distinct = function.blocks.len(),
                "basic block count mismatch"
            );
        }

        for edge in &record.edges {
            let source = match range_map.get(&edge.source_basic_block_index) {
                Some(&(_, last)) => last,
                None => *block_map.get(&edge.source_basic_block_index).ok_or_else(|| {
                    AncalagonError::InvalidRecord(format!(
                        "flow edge references unknown raw block {}",
                        edge.source_basic_block_index
                    ))
                })?,
            };
            let target = match range_map.get(&edge.target_basic_block_index) {
                Some(&(first, _)) => first,
                None => *block_map.get(&edge.target_basic_block_index).ok_or_else(|| {
                    AncalagonError::InvalidRecord(format!(
                        "flow edge references unknown raw block {}",
                        edge.target_basic_block_index
                    ))
                })?,
            };
            function.link(source, target);
        }

        Ok(function)
    }

    /// A block-less imported function.
    pub(crate) fn imported(address: u64) -> Self {
        Function {
            address,
            ..Function::default()
        }
    }

    fn link(&mut self, source: u64, target: u64) {
        self.edges.insert((source, target));
        if let Some(block) = self.blocks.get_mut(&source) {
            block.successors_mut().insert(target);
        }
        if let Some(block) = self.blocks.get_mut(&target) {
            block.predecessors_mut().insert(source);
        }
    }

    /// Entry address: the address of the entry block's first instruction.
    pub fn address(&self) -> u64 {
        self.address
    }

    /// Function name: the mangled name when one was exported, otherwise a
    /// synthetic `sub_<addr>` form.
    pub fn name(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => format!("sub_{:X}", self.address),
        }
    }

    /// The exported mangled name, when present.
    pub fn mangled_name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Classification from the call graph, when this function had a vertex.
    pub fn kind(&self) -> Option<FunctionKind> {
        self.kind
    }

    /// Whether this function is an import.
    pub fn is_import(&self) -> bool {
        self.kind == Some(FunctionKind::Imported)
    }

    /// Basic blocks keyed by address.
    pub fn blocks(&self) -> &BTreeMap<u64, BasicBlock> {
        &self.blocks
    }

    /// Look up a basic block by address.
    pub fn block_at(&self, address: u64) -> Option<&BasicBlock> {
        self.blocks.get(&address)
    }

    /// Directed control-flow edges between block addresses.
    pub fn edges(&self) -> &BTreeSet<(u64, u64)> {
        &self.edges
    }

    /// Addresses of functions calling this one.
    pub fn parents(&self) -> &BTreeSet<u64> {
        &self.parents
    }

    /// Addresses of functions called by this one.
    pub fn children(&self) -> &BTreeSet<u64> {
        &self.children
    }

    pub(crate) fn set_name(&mut self, name: Option<String>) {
        self.name = name;
    }

    pub(crate) fn set_kind(&mut self, kind: Option<FunctionKind>) {
        self.kind = kind;
    }

    pub(crate) fn parents_mut(&mut self) -> &mut BTreeSet<u64> {
        &mut self.parents
    }

    pub(crate) fn children_mut(&mut self) -> &mut BTreeSet<u64> {
        &mut self.children
    }

    /// Deduplicated strings referenced anywhere in this function.
    pub fn string_references(&self) -> BTreeSet<&str> {
        self.blocks
            .values()
            .flat_map(|block| block.string_references())
            .collect()
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{:#x}", self.name(), self.address)
    }
}
