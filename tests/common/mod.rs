//! Shared fixture builders for integration tests.
//!
//! Builds small, fully materialized artifacts by hand; the decode boundary
//! is exercised separately through the binary encoding roundtrip.

#![allow(dead_code)]

use ancalagon::format::records::{
    ExpressionRecord, FlowEdgeRecord, FlowGraphRecord, IndexRange, InstructionRecord,
    MetaInformation, MnemonicRecord, OperandRecord, RawBlockRecord,
};
use ancalagon::{Artifact, Operand, Program};

/// Artifact skeleton for the given architecture.
pub fn artifact(architecture: &str) -> Artifact {
    Artifact {
        meta: MetaInformation {
            executable_name: "fixture.bin".to_string(),
            architecture_name: architecture.to_string(),
        },
        mnemonics: vec![MnemonicRecord::new("mov"), MnemonicRecord::new("nop")],
        ..Artifact::default()
    }
}

pub fn flow_graph(entry: u32, blocks: &[u32], edges: &[(u32, u32)]) -> FlowGraphRecord {
    FlowGraphRecord {
        basic_block_index: blocks.to_vec(),
        entry_basic_block_index: entry,
        edges: edges
            .iter()
            .map(|&(source, target)| FlowEdgeRecord {
                source_basic_block_index: source,
                target_basic_block_index: target,
            })
            .collect(),
    }
}

pub fn raw_block(ranges: &[(u32, u32)]) -> RawBlockRecord {
    RawBlockRecord {
        instruction_index: ranges
            .iter()
            .map(|&(begin, end)| IndexRange::new(begin, end))
            .collect(),
    }
}

/// A single-function fixture: one instruction at 0x1000 carrying one operand
/// whose expressions are supplied by the caller.
pub struct OperandFixture {
    pub artifact: Artifact,
}

impl OperandFixture {
    pub fn new(architecture: &str) -> Self {
        let mut artifact = artifact(architecture);
        let mut instruction = InstructionRecord::at(0x1000, vec![0x90; 4], 0);
        instruction.operand_index = vec![0];
        artifact.instructions = vec![instruction];
        artifact.basic_blocks = vec![raw_block(&[(0, 1)])];
        artifact.flow_graphs = vec![flow_graph(0, &[0], &[])];
        artifact.operands = vec![OperandRecord {
            expression_index: vec![],
        }];
        Self { artifact }
    }

    /// Install the operand's expression list.
    pub fn expressions(mut self, expressions: Vec<ExpressionRecord>) -> Self {
        self.artifact.operands[0].expression_index =
            (0..expressions.len() as u32).collect();
        self.artifact.expressions = expressions;
        self
    }

    pub fn build(self) -> Program {
        Program::new(self.artifact).expect("fixture assembles")
    }
}

/// The single operand of the fixture's single instruction.
pub fn first_operand(program: &Program) -> Operand {
    let function = program.function_at(0x1000).expect("fixture function");
    let block = function.block_at(0x1000).expect("fixture block");
    let instruction = block
        .instructions()
        .values()
        .next()
        .expect("fixture instruction");
    instruction
        .operands(program)
        .expect("operands reconstruct")
        .remove(0)
}
