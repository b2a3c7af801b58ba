//! Whole-program assembly: functions, call-graph overlay and
//! cross-reference wiring.
//!
//! Assembly is single-shot and ordered: cross-reference tables are preloaded
//! first, every flow-graph record becomes a function, the call graph is
//! overlaid (synthesizing block-less imported functions and backfilling
//! names and kinds), and the name table is built last, once all names are
//! final. Operand reconstruction reads these finished tables lazily.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use tracing::{debug, error, warn};

use crate::error::Result;
use crate::export::Exporter;
use crate::format::artifact::Artifact;
use crate::format::records::{FunctionKind, StringReferenceRecord};
use crate::model::function::Function;

/// Cross-reference tables keyed by instruction index, preloaded before any
/// function is assembled.
#[derive(Debug, Clone, Default)]
pub(crate) struct XrefTables {
    /// Data-reference addresses per instruction, most recently declared
    /// first.
    pub(crate) data_refs: HashMap<u32, Vec<u64>>,
    /// Address comments per instruction, most recently declared first.
    pub(crate) comments: HashMap<u32, Vec<String>>,
    /// At most one string reference per instruction; on duplicates the last
    /// declared record wins.
    pub(crate) string_refs: HashMap<u32, StringReferenceRecord>,
}

impl XrefTables {
    fn preload(artifact: &Artifact) -> Result<Self> {
        let mut data_refs: HashMap<u32, Vec<u64>> = HashMap::new();
        // Reverse iteration puts later-declared entries first in each list.
        for entry in artifact.data_references.iter().rev() {
            data_refs
                .entry(entry.instruction_index)
                .or_default()
                .push(entry.address);
        }

        let mut comments: HashMap<u32, Vec<String>> = HashMap::new();
        for entry in artifact.address_comments.iter().rev() {
            let text = artifact.string(entry.string_table_index as usize)?.to_string();
            comments
                .entry(entry.instruction_index)
                .or_default()
                .push(text);
        }

        let mut string_refs = HashMap::new();
        for entry in &artifact.string_references {
            string_refs.insert(entry.instruction_index, *entry);
        }

        Ok(Self {
            data_refs,
            comments,
            string_refs,
        })
    }
}

/// The reconstructed program: all functions keyed by address, the overlaid
/// call graph, and the lookup tables the operand reconstructor depends on.
///
/// Immutable once constructed; a fatal assembly error yields no partial
/// model.
#[derive(Debug, Clone)]
pub struct Program {
    artifact: Artifact,
    mask: u64,
    functions: BTreeMap<u64, Function>,
    names: HashMap<String, u64>,
    xrefs: XrefTables,
}

impl Program {
    /// Assemble the full model from a materialized record set.
    pub fn new(artifact: Artifact) -> Result<Self> {
        let mask = artifact.address_mask();
        let xrefs = XrefTables::preload(&artifact)?;

        let mut functions: BTreeMap<u64, Function> = BTreeMap::new();
        let mut collisions = 0usize;
        for record in &artifact.flow_graphs {
            let function = Function::assemble(&artifact, &xrefs, record)?;
            if functions.contains_key(&function.address()) {
                error!(
                    address = %format_args!("{:#x}", function.address()),
                    "function address collision"
                );
                collisions += 1;
            }
            // The later function silently replaces the earlier one.
            functions.insert(function.address(), function);
        }
        let assembled = artifact.flow_graphs.len();

        // Call-graph overlay. Imported vertices with no flow graph become
        // block-less functions; a normal vertex with no flow graph is a
        // structural defect in the artifact and is skipped.
        let mut imported = 0usize;
        for vertex in &artifact.call_graph.vertices {
            if !functions.contains_key(&vertex.address) {
                match vertex.kind {
                    FunctionKind::Imported => {
                        functions.insert(vertex.address, Function::imported(vertex.address));
                        imported += 1;
                    }
                    FunctionKind::Normal => {
                        error!(
                            address = %format_args!("{:#x}", vertex.address),
                            "call graph vertex without a matching function"
                        );
                        continue;
                    }
                    _ => {
                        warn!(
                            address = %format_args!("{:#x}", vertex.address),
                            kind = %vertex.kind,
                            "call graph vertex without a matching function"
                        );
                        continue;
                    }
                }
            }
            if let Some(function) = functions.get_mut(&vertex.address) {
                function.set_kind(Some(vertex.kind));
                if !vertex.mangled_name.is_empty() {
                    function.set_name(Some(vertex.mangled_name.clone()));
                }
            }
        }

        for edge in &artifact.call_graph.edges {
            let source = artifact
                .call_graph_vertex(edge.source_vertex_index as usize)?
                .address;
            let target = artifact
                .call_graph_vertex(edge.target_vertex_index as usize)?
                .address;
            if functions.contains_key(&source) && functions.contains_key(&target) {
                if let Some(function) = functions.get_mut(&source) {
                    function.children_mut().insert(target);
                }
                if let Some(function) = functions.get_mut(&target) {
                    function.parents_mut().insert(source);
                }
            } else {
                warn!(
                    source = %format_args!("{source:#x}"),
                    target = %format_args!("{target:#x}"),
                    "call edge endpoint has no function, edge dropped"
                );
            }
        }

        // Built last: every name is final only after the overlay.
        let mut names = HashMap::with_capacity(functions.len());
        for function in functions.values() {
            names.insert(function.name(), function.address());
        }

        debug!(
            functions = assembled,
            imported, collisions, "program assembly complete"
        );

        Ok(Self {
            artifact,
            mask,
            functions,
            names,
            xrefs,
        })
    }

    /// Decode and assemble from an artifact's binary encoding.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        Self::new(Artifact::from_bytes(data)?)
    }

    /// Read, decode and assemble an artifact file.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::new(Artifact::from_path(path)?)
    }

    /// Run the external exporter for `executable`, then load the artifact it
    /// produced.
    pub fn from_executable(
        exporter: &Exporter,
        executable: &Path,
        output: Option<&Path>,
    ) -> Result<Self> {
        let artifact_path = exporter.export(executable, output)?;
        Self::from_path(artifact_path)
    }

    /// The underlying record set.
    pub fn artifact(&self) -> &Artifact {
        &self.artifact
    }

    /// Name of the executable the artifact was produced from.
    pub fn name(&self) -> &str {
        self.artifact.executable_name()
    }

    /// Architecture name suffixed with the address size.
    pub fn architecture(&self) -> &str {
        self.artifact.architecture()
    }

    /// Mask a value to the architecture's address width.
    pub fn addr_mask(&self, value: u64) -> u64 {
        value & self.mask
    }

    /// All functions keyed by address.
    pub fn functions(&self) -> &BTreeMap<u64, Function> {
        &self.functions
    }

    /// Look up a function by address.
    pub fn function_at(&self, address: u64) -> Option<&Function> {
        self.functions.get(&address)
    }

    /// Look up a function by name (mangled or synthetic).
    pub fn function_by_name(&self, name: &str) -> Option<&Function> {
        self.names
            .get(name)
            .and_then(|address| self.functions.get(address))
    }

    pub(crate) fn string_reference_record(
        &self,
        instruction_index: u32,
    ) -> Option<&StringReferenceRecord> {
        self.xrefs.string_refs.get(&instruction_index)
    }
}
