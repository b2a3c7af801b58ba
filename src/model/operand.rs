//! Operand reconstruction from flat parent-indexed expression arrays.
//!
//! Each operand is a forest of expression records connected only by parent
//! indices. Reconstruction classifies every node against the finished
//! program tables (function names for symbols, data references and known
//! function/block addresses for immediates), elides comma operators, and
//! renders the resulting tree in pre-order.

use std::fmt;

use tracing::{error, warn};

use crate::error::{AncalagonError, Result};
use crate::format::records::{ExpressionKind, FunctionKind};
use crate::model::expression::{
    build_tree, size_name, size_prefix_bytes, ExprNode, ExprToken, ExprTree,
};
use crate::model::function::Function;
use crate::model::instruction::Instruction;
use crate::model::program::Program;

/// One reconstructed operand.
///
/// Holds the classified node list; the tree shape is rebuilt on every
/// [`Operand::tree`] / [`Operand::render`] call, since the underlying
/// records never change.
#[derive(Debug, Clone, PartialEq)]
pub struct Operand {
    /// Index of this operand in the artifact's operand table.
    index: u32,
    nodes: Vec<ExprNode>,
    /// Byte width of the leading size prefix, when the operand starts with
    /// one.
    leading_size: Option<u32>,
    /// Dominant expression kind of the operand.
    kind: Option<ExpressionKind>,
    /// String referenced through this operand, if any.
    string_reference: Option<String>,
}

impl Operand {
    pub(crate) fn build(
        program: &Program,
        function: Option<&Function>,
        instruction: &Instruction,
        index: u32,
        position: u32,
    ) -> Result<Self> {
        let artifact = program.artifact();
        let record = artifact.operand(index as usize)?;

        let mut size: Option<u32> = None;
        let mut nodes = Vec::with_capacity(record.expression_index.len());
        for &expr_index in &record.expression_index {
            let expr = artifact.expression(expr_index as usize)?;
            let token = match expr.kind {
                ExpressionKind::Symbol => {
                    match classify_symbol(program, &expr.symbol) {
                        Some(token) => token,
                        None => continue,
                    }
                }
                ExpressionKind::ImmediateInt => {
                    classify_immediate(program, function, instruction, expr.immediate, size)
                }
                ExpressionKind::ImmediateFloat => {
                    warn!(
                        expression = expr_index,
                        "floating-point immediate ignored"
                    );
                    continue;
                }
                ExpressionKind::Operator | ExpressionKind::Dereference => {
                    ExprToken::Operator(expr.symbol.clone())
                }
                ExpressionKind::Register => ExprToken::Register(expr.symbol.clone()),
                ExpressionKind::SizePrefix => {
                    match size_prefix_bytes(&expr.symbol) {
                        Some(bytes) => size = Some(bytes),
                        None => warn!(symbol = %expr.symbol, "unknown size prefix token"),
                    }
                    continue;
                }
                ExpressionKind::Unknown => {
                    warn!(expression = expr_index, "unrecognized expression kind");
                    continue;
                }
            };
            nodes.push(ExprNode {
                token,
                index: expr_index,
                parent: expr.parent_index,
            });
        }

        let leading_size = match record.expression_index.first() {
            Some(&first) => {
                let expr = artifact.expression(first as usize)?;
                if expr.kind == ExpressionKind::SizePrefix {
                    size_prefix_bytes(&expr.symbol)
                } else {
                    None
                }
            }
            None => None,
        };

        let kind = dominant_kind(program, record.expression_index.as_slice(), index)?;

        let string_reference = match program.string_reference_record(instruction.index()) {
            Some(entry) if entry.operand_expression_index == position => {
                Some(artifact.string(entry.string_table_index as usize)?.to_string())
            }
            _ => None,
        };

        Ok(Self {
            index,
            nodes,
            leading_size,
            kind,
            string_reference,
        })
    }

    /// Index of this operand in the artifact's operand table.
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Classified surviving nodes, in expression-table order (pre-order).
    pub fn expressions(&self) -> &[ExprNode] {
        &self.nodes
    }

    /// Rebuild the expression tree. `None` for an operand with no surviving
    /// nodes.
    pub fn tree(&self) -> Option<ExprTree> {
        build_tree(&self.nodes)
    }

    /// Canonical pre-order string form. Empty for a malformed or empty
    /// operand.
    pub fn render(&self) -> String {
        match self.tree() {
            Some(tree) => tree.to_string(),
            None => String::new(),
        }
    }

    /// Byte width of the operand's leading size prefix.
    ///
    /// Errors when the operand does not start with a size prefix.
    pub fn byte_size(&self) -> Result<u32> {
        self.leading_size.ok_or(AncalagonError::NoSizePrefix)
    }

    /// Dominant expression kind: the first expression that is neither a size
    /// prefix nor an operator.
    pub fn kind(&self) -> Option<ExpressionKind> {
        self.kind
    }

    /// The string referenced through this operand, if any.
    pub fn string_reference(&self) -> Option<&str> {
        self.string_reference.as_deref()
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.render())
    }
}

/// Classify a symbol expression against the program's name table.
///
/// Symbols naming a function inherit the function's classification; symbols
/// naming a function of invalid or unknown kind emit nothing; everything
/// else is a local reference (stack variable / argument naming).
fn classify_symbol(program: &Program, symbol: &str) -> Option<ExprToken> {
    match program.function_by_name(symbol) {
        Some(function) => match function.kind() {
            Some(FunctionKind::Normal) => Some(ExprToken::Code(symbol.to_string())),
            Some(FunctionKind::Library) => Some(ExprToken::Library(symbol.to_string())),
            Some(FunctionKind::Imported) => Some(ExprToken::Import(symbol.to_string())),
            Some(FunctionKind::Thunk) => Some(ExprToken::CallTarget(symbol.to_string())),
            Some(FunctionKind::Invalid) | None => None,
        },
        None => Some(ExprToken::Local(symbol.to_string())),
    }
}

/// Classify an integer immediate.
///
/// Precedence: sized data label when the value is in the instruction's
/// data-reference set, then code label for a known function address, then
/// local-code label for a block address within the current function, then a
/// bare literal masked to the architecture width.
fn classify_immediate(
    program: &Program,
    function: Option<&Function>,
    instruction: &Instruction,
    value: u64,
    size: Option<u32>,
) -> ExprToken {
    if instruction.data_refs().contains(&value) {
        match size {
            Some(bytes) => {
                return ExprToken::Data(format!("{}_{value:X}", size_name(bytes)));
            }
            None => {
                warn!(
                    value = %format_args!("{value:#x}"),
                    "data reference immediate without a preceding size prefix"
                );
            }
        }
    } else if program.functions().contains_key(&value) {
        return ExprToken::Code(format!("sub_{value:X}"));
    } else if function.is_some_and(|f| f.blocks().contains_key(&value)) {
        return ExprToken::Code(format!("loc_{value:X}"));
    }
    ExprToken::Number(program.addr_mask(value))
}

/// First expression kind that is neither a size prefix nor an operator.
///
/// ARM exports type some lone flag operands as a single operator; those
/// report `Operator`. Any other miss is logged and reported as `None`.
fn dominant_kind(
    program: &Program,
    expression_index: &[u32],
    operand_index: u32,
) -> Result<Option<ExpressionKind>> {
    let artifact = program.artifact();
    for &expr_index in expression_index {
        let expr = artifact.expression(expr_index as usize)?;
        match expr.kind {
            ExpressionKind::SizePrefix | ExpressionKind::Operator => continue,
            other => return Ok(Some(other)),
        }
    }
    if expression_index.len() == 1 && artifact.architecture().starts_with("ARM") {
        let expr = artifact.expression(expression_index[0] as usize)?;
        if expr.kind == ExpressionKind::Operator {
            return Ok(Some(ExpressionKind::Operator));
        }
    }
    error!(operand = operand_index, "no dominant kind found for operand");
    Ok(None)
}
