//! Classified operand expression nodes and tree reconstruction.
//!
//! The format stores each operand's sub-expressions as a flat array whose
//! nodes are connected only by parent indices. This module holds the
//! classified node types and rebuilds the tree: comma operators are elided
//! (their children re-parented), the root is the surviving node reachable
//! from the smallest parent index, and rendering is pre-order with
//! operator-specific closing glyphs.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Closing glyph paired with an operator symbol. Anything unpaired closes
/// with a parenthesis.
fn closing_glyph(symbol: &str) -> Option<&'static str> {
    match symbol {
        "{" => Some("}"),
        "[" => Some("]"),
        "!" => Some(""),
        _ => None,
    }
}

/// Byte width denoted by a size-prefix token.
pub(crate) fn size_prefix_bytes(symbol: &str) -> Option<u32> {
    match symbol {
        "b1" => Some(1),
        "b2" => Some(2),
        "b4" => Some(4),
        "b8" => Some(8),
        "b10" => Some(10),
        "b16" => Some(16),
        "b32" => Some(32),
        "b64" => Some(64),
        _ => None,
    }
}

/// Label stem for a sized data reference.
pub(crate) fn size_name(bytes: u32) -> &'static str {
    match bytes {
        1 => "byte",
        2 => "word",
        4 => "dword",
        8 => "qword",
        10 => "b10",
        16 => "xmmword",
        32 => "ymmword",
        64 => "zmmword",
        _ => "data",
    }
}

/// A classified expression node payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExprToken {
    /// Symbol resolving to a normal function, or a synthesized code label
    /// (`sub_XXX` for a function address, `loc_XXX` for a block address).
    Code(String),
    /// Symbol resolving to a library function.
    Library(String),
    /// Symbol resolving to an imported function.
    Import(String),
    /// Symbol resolving to a thunk, i.e. a call target.
    CallTarget(String),
    /// Unresolved symbol: stack variable or argument naming.
    Local(String),
    /// Sized data label for an immediate backed by a data reference.
    Data(String),
    /// Bare numeric literal, masked to the architecture width.
    Number(u64),
    /// Operator or dereference glyph.
    Operator(String),
    /// Register name.
    Register(String),
}

impl ExprToken {
    pub fn is_operator(&self) -> bool {
        matches!(self, ExprToken::Operator(_))
    }

    /// Terminal text of the node; integers render as hexadecimal.
    pub fn value(&self) -> String {
        match self {
            ExprToken::Code(s)
            | ExprToken::Library(s)
            | ExprToken::Import(s)
            | ExprToken::CallTarget(s)
            | ExprToken::Local(s)
            | ExprToken::Data(s)
            | ExprToken::Operator(s)
            | ExprToken::Register(s) => s.clone(),
            ExprToken::Number(value) => format!("{value:#x}"),
        }
    }
}

/// A surviving node of an operand expression forest, positioned by its
/// expression-table index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExprNode {
    pub token: ExprToken,
    /// Index of this node in the expression table.
    pub index: u32,
    /// Index of the parent expression.
    pub parent: u32,
}

/// A reconstructed expression tree.
///
/// The root's token is `None` when the tree hangs off a placeholder parent
/// slot (the common case: the true root's parent index points outside the
/// surviving node set).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExprTree {
    pub token: Option<ExprToken>,
    pub children: Vec<ExprTree>,
}

impl fmt::Display for ExprTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(token) = &self.token {
            write!(f, "{}", token.value())?;
            if let ExprToken::Operator(symbol) = token {
                if closing_glyph(symbol).is_none() {
                    f.write_str("(")?;
                }
            }
        }
        for (i, child) in self.children.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{child}")?;
        }
        if let Some(ExprToken::Operator(symbol)) = &self.token {
            f.write_str(closing_glyph(symbol).unwrap_or(")"))?;
        }
        Ok(())
    }
}

/// Rebuild the expression tree for a classified node list.
///
/// Comma operators are elided: nodes parented on a comma are redirected to
/// the comma's own parent, flattening multi-component addressing expressions
/// into sibling lists. Returns `None` when no node survives (a malformed or
/// empty operand, rendered as an empty string).
pub(crate) fn build_tree(nodes: &[ExprNode]) -> Option<ExprTree> {
    let mut removed: HashMap<u32, u32> = HashMap::new();
    for node in nodes {
        if let ExprToken::Operator(symbol) = &node.token {
            if symbol == "," {
                removed.insert(node.index, node.parent);
            }
        }
    }

    let mut by_index: HashMap<u32, &ExprNode> = HashMap::new();
    let mut children: HashMap<u32, Vec<u32>> = HashMap::new();
    let mut root: Option<u32> = None;
    for node in nodes {
        if removed.contains_key(&node.index) {
            continue;
        }
        let parent = removed.get(&node.parent).copied().unwrap_or(node.parent);
        root = Some(root.map_or(parent, |r| r.min(parent)));
        children.entry(parent).or_default().push(node.index);
        by_index.insert(node.index, node);
    }

    let root = root?;
    let mut visited = HashSet::new();
    Some(materialize(root, &by_index, &children, &mut visited))
}

fn materialize(
    index: u32,
    by_index: &HashMap<u32, &ExprNode>,
    children: &HashMap<u32, Vec<u32>>,
    visited: &mut HashSet<u32>,
) -> ExprTree {
    visited.insert(index);
    let token = by_index.get(&index).map(|node| node.token.clone());
    let kids = children
        .get(&index)
        .map(|kids| {
            kids.iter()
                .filter(|&&kid| kid != index && !visited.contains(&kid))
                .copied()
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();
    let children = kids
        .into_iter()
        .map(|kid| materialize(kid, by_index, children, visited))
        .collect();
    ExprTree { token, children }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(token: ExprToken, index: u32, parent: u32) -> ExprNode {
        ExprNode {
            token,
            index,
            parent,
        }
    }

    #[test]
    fn test_token_values() {
        assert_eq!(ExprToken::Number(0x1f).value(), "0x1f");
        assert_eq!(ExprToken::Register("rax".into()).value(), "rax");
        assert_eq!(ExprToken::Code("sub_1000".into()).value(), "sub_1000");
    }

    #[test]
    fn test_empty_node_list_has_no_tree() {
        assert!(build_tree(&[]).is_none());
    }

    #[test]
    fn test_lone_comma_has_no_tree() {
        let nodes = [node(ExprToken::Operator(",".into()), 0, 0)];
        assert!(build_tree(&nodes).is_none());
    }

    #[test]
    fn test_operator_renders_prefix_with_parens() {
        let nodes = [
            node(ExprToken::Operator("+".into()), 1, 0),
            node(ExprToken::Register("rax".into()), 2, 1),
            node(ExprToken::Number(8), 3, 1),
        ];
        let tree = build_tree(&nodes).unwrap();
        assert_eq!(tree.to_string(), "+(rax,0x8)");
    }

    #[test]
    fn test_bracket_closes_with_bracket() {
        let nodes = [
            node(ExprToken::Operator("[".into()), 1, 0),
            node(ExprToken::Register("rsp".into()), 2, 1),
        ];
        let tree = build_tree(&nodes).unwrap();
        assert_eq!(tree.to_string(), "[rsp]");
    }

    #[test]
    fn test_comma_elision_flattens_siblings() {
        let nodes = [
            node(ExprToken::Operator("[".into()), 1, 0),
            node(ExprToken::Operator(",".into()), 2, 1),
            node(ExprToken::Register("reg1".into()), 3, 2),
            node(ExprToken::Register("reg2".into()), 4, 2),
        ];
        let tree = build_tree(&nodes).unwrap();
        assert_eq!(tree.to_string(), "[reg1,reg2]");
        // both registers are direct siblings under the bracket, not nested
        let bracket = &tree.children[0];
        assert_eq!(bracket.children.len(), 2);
    }

    #[test]
    fn test_self_parented_root() {
        let nodes = [node(ExprToken::Register("pc".into()), 0, 0)];
        let tree = build_tree(&nodes).unwrap();
        assert_eq!(tree.to_string(), "pc");
    }

    #[test]
    fn test_size_prefix_lookup() {
        assert_eq!(size_prefix_bytes("b4"), Some(4));
        assert_eq!(size_prefix_bytes("b64"), Some(64));
        assert_eq!(size_prefix_bytes("w4"), None);
        assert_eq!(size_name(4), "dword");
        assert_eq!(size_name(16), "xmmword");
    }
}
