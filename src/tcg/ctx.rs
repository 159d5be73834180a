//! Assignment table: the per-instruction mapping from behavior-graph nodes
//! and architectural resources to TCG variables.
//!
//! Variables are created on demand and memoized twice: by node, so asking
//! twice for the same node yields the same handle, and by resource, so two
//! reads of `X(rs1)` in one instruction share one source variable.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::trace;

use super::op::Label;
use super::var::{TcgV, TcgWidth};
use crate::diagnostic::Diagnostic;
use crate::graph::describe::{describe, index_desc, index_key};
use crate::graph::{Graph, Node, NodeId};
use crate::isa::{Register, RegisterFile};

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
enum ResourceKey {
    Reg {
        name: String,
        dest: bool,
    },
    RegFile {
        name: String,
        index: String,
        dest: bool,
    },
}

/// Lowering state attached to one instruction.
#[derive(Debug)]
pub struct TcgCtx {
    word: TcgWidth,
    /// Dataflow nodes placed on the spine when the context was attached.
    scheduled: HashSet<NodeId>,
    /// Dataflow node → its `Scheduled` spine node.
    schedule_of: HashMap<NodeId, NodeId>,
    assignments: HashMap<NodeId, Vec<Arc<TcgV>>>,
    resources: HashMap<ResourceKey, Arc<TcgV>>,
    /// (register file, index key) → readable index part of the variable
    /// names. Distinct keys that describe alike get a numeric suffix.
    index_names: HashMap<(String, String), String>,
    vars: Vec<Arc<TcgV>>,
    next_label: u32,
    next_temp: u32,
}

impl TcgCtx {
    /// Create an empty table for `graph`, snapshotting which nodes are
    /// scheduled. Later passes delete `Scheduled` nodes; runtime-ness is
    /// answered from this snapshot.
    pub fn attach(graph: &Graph, word: TcgWidth) -> Self {
        let mut scheduled = HashSet::new();
        let mut schedule_of = HashMap::new();
        for (id, node) in graph.iter() {
            if let Node::Scheduled { node, .. } = node {
                scheduled.insert(*node);
                schedule_of.insert(*node, id);
            }
        }
        Self {
            word,
            scheduled,
            schedule_of,
            assignments: HashMap::new(),
            resources: HashMap::new(),
            index_names: HashMap::new(),
            vars: Vec::new(),
            next_label: 0,
            next_temp: 0,
        }
    }

    pub fn word(&self) -> TcgWidth {
        self.word
    }

    /// True if the node's value only exists at runtime.
    pub fn is_runtime(&self, graph: &Graph, id: NodeId) -> bool {
        if self.scheduled.contains(&id) {
            return true;
        }
        match graph.get(id) {
            Some(Node::ReadReg { .. }) | Some(Node::ReadRegFile { .. }) | Some(Node::ReadMem { .. }) => {
                true
            }
            Some(Node::VarRef { var, .. }) => var.const_value.is_none(),
            _ => false,
        }
    }

    /// Variables created so far, in creation order.
    pub fn variables(&self) -> &[Arc<TcgV>] {
        &self.vars
    }

    pub fn fresh_label(&mut self, prefix: &str) -> Label {
        let label = Label::new(format!("l_{}_{}", prefix, self.next_label));
        self.next_label += 1;
        trace!(label = %label, "allocated label");
        label
    }

    /// A temporary that belongs to no graph node.
    pub fn fresh_temp(&mut self, graph: &mut Graph) -> Arc<TcgV> {
        let var = TcgV::temp(format!("tmp_l{}", self.next_temp), self.word);
        self.next_temp += 1;
        self.register(graph, var, None)
    }

    fn register(&mut self, graph: &mut Graph, var: TcgV, index: Option<NodeId>) -> Arc<TcgV> {
        let var = Arc::new(var);
        trace!(var = %var.name, kind = ?var.kind, "created variable");
        graph.add(Node::VarRef {
            var: Arc::clone(&var),
            index,
        });
        self.vars.push(Arc::clone(&var));
        var
    }

    fn reg_var(&mut self, graph: &mut Graph, reg: &Arc<Register>, dest: bool) -> Arc<TcgV> {
        let key = ResourceKey::Reg {
            name: reg.name.clone(),
            dest,
        };
        if let Some(var) = self.resources.get(&key) {
            return Arc::clone(var);
        }
        let mut name = format!("reg_{}", reg.name.to_ascii_lowercase());
        if dest {
            name.push_str("_dest");
        }
        let var = TcgV::reg(name, self.word, Arc::clone(reg), dest);
        let var = self.register(graph, var, None);
        self.resources.insert(key, Arc::clone(&var));
        var
    }

    fn index_name(&mut self, graph: &Graph, file: &RegisterFile, key: &str, index: NodeId) -> String {
        let slot = (file.name.clone(), key.to_string());
        if let Some(name) = self.index_names.get(&slot) {
            return name.clone();
        }
        let desc = index_desc(graph, index);
        let taken = |candidate: &str| {
            self.index_names
                .iter()
                .any(|((f, _), used)| *f == file.name && used == candidate)
        };
        let mut name = desc.clone();
        let mut n = 1;
        while taken(&name) {
            name = format!("{}_{}", desc, n);
            n += 1;
        }
        self.index_names.insert(slot, name.clone());
        name
    }

    fn reg_file_var(
        &mut self,
        graph: &mut Graph,
        file: &Arc<RegisterFile>,
        index: NodeId,
        dest: bool,
    ) -> Arc<TcgV> {
        let structural = index_key(graph, index);
        let key = ResourceKey::RegFile {
            name: file.name.clone(),
            index: structural.clone(),
            dest,
        };
        if let Some(var) = self.resources.get(&key) {
            return Arc::clone(var);
        }
        let index_name = self.index_name(graph, file, &structural, index);
        let mut name = format!("regfile_{}_{}", file.name.to_ascii_lowercase(), index_name);
        if dest {
            name.push_str("_dest");
        }
        let var = TcgV::reg_file(name, self.word, Arc::clone(file), index, dest);
        let var = self.register(graph, var, Some(index));
        self.resources.insert(key, Arc::clone(&var));
        var
    }

    fn const_var(&mut self, graph: &mut Graph, id: NodeId) -> Arc<TcgV> {
        let name = format!("const_{}_n{}", describe(graph, id), id.0);
        let var = TcgV::constant(name, self.word, id);
        self.register(graph, var, None)
    }

    fn temp_vars(&mut self, graph: &mut Graph, id: NodeId, count: usize) -> Vec<Arc<TcgV>> {
        let desc = describe(graph, id);
        (0..count)
            .map(|i| {
                let var = TcgV::temp(format!("tmp_{}_n{}_{}", desc, id.0, i), self.word);
                self.register(graph, var, None)
            })
            .collect()
    }

    /// Variables holding the value(s) of `id`, created on first request.
    pub fn destination_of(&mut self, graph: &mut Graph, id: NodeId) -> Result<Vec<Arc<TcgV>>, Diagnostic> {
        if let Some(vars) = self.assignments.get(&id) {
            return Ok(vars.clone());
        }
        let node = graph.node(id)?.clone();
        let vars = match node {
            Node::VarRef { var, .. } => vec![var],
            Node::WriteMem { .. } => vec![],
            Node::WriteReg { reg, .. } => vec![self.reg_var(graph, &reg, true)],
            Node::WriteRegFile { file, index, .. } => {
                vec![self.reg_file_var(graph, &file, index, true)]
            }
            Node::ReadReg { reg, .. } => vec![self.reg_var(graph, &reg, false)],
            Node::ReadRegFile { file, index, .. } => {
                vec![self.reg_file_var(graph, &file, index, false)]
            }
            Node::StaticPc { .. } => vec![self.const_var(graph, id)],

            Node::Start { .. }
            | Node::If { .. }
            | Node::Begin { .. }
            | Node::BranchEnd { .. }
            | Node::Merge { .. }
            | Node::Scheduled { .. }
            | Node::InstrExit { .. }
            | Node::InstrEnd { .. }
            | Node::Op { .. }
            | Node::Raise { .. } => {
                return Err(Diagnostic::internal(
                    format!("{} node {} does not produce a value", node.kind_name(), id),
                    graph.span(id),
                ));
            }

            Node::Constant { .. }
            | Node::Field { .. }
            | Node::Param { .. }
            | Node::ReadMem { .. }
            | Node::BuiltIn { .. }
            | Node::SignExtend { .. }
            | Node::ZeroExtend { .. }
            | Node::Truncate { .. }
            | Node::ExprSave { .. }
            | Node::TupleGet { .. }
            | Node::Let { .. }
            | Node::Select { .. }
            | Node::Slice { .. }
            | Node::Cast { .. }
            | Node::FuncCall { .. } => {
                if !self.is_runtime(graph, id) {
                    vec![self.const_var(graph, id)]
                } else if let Some(write) = self.aliased_write(graph, id) {
                    self.destination_of(graph, write)?
                } else {
                    let count = node.ty().map(|t| t.components()).unwrap_or(1);
                    self.temp_vars(graph, id, count)
                }
            }
        };
        self.assignments.insert(id, vars.clone());
        Ok(vars)
    }

    /// The single variable of `id`.
    pub fn single_destination_of(&mut self, graph: &mut Graph, id: NodeId) -> Result<Arc<TcgV>, Diagnostic> {
        let mut vars = self.destination_of(graph, id)?;
        if vars.len() != 1 {
            let kind = graph.get(id).map(|n| n.kind_name()).unwrap_or("dead");
            return Err(Diagnostic::invariant(
                format!(
                    "expected exactly one destination variable for {} node {}, found {}",
                    kind,
                    id,
                    vars.len()
                ),
                graph.span(id),
            ));
        }
        Ok(vars.remove(0))
    }

    /// A scheduled scalar expression may compute straight into the
    /// destination of the register write that consumes it, as long as
    /// nothing between the two can observe the register early.
    fn aliased_write(&self, graph: &Graph, id: NodeId) -> Option<NodeId> {
        if !matches!(graph.ty(id).ok()?.components(), 1) {
            return None;
        }
        let users: Vec<NodeId> = graph
            .users(id)
            .into_iter()
            .filter(|u| {
                !matches!(
                    graph.get(*u),
                    Some(Node::Scheduled { .. }) | Some(Node::VarRef { .. }) | None
                )
            })
            .collect();
        let [write] = users.as_slice() else {
            return None;
        };
        let write = *write;
        let resource = match graph.get(write)? {
            Node::WriteReg { reg, value } if *value == id => Access::Reg(reg.name.clone()),
            Node::WriteRegFile { file, index, value } if *value == id && *index != id => {
                Access::File(file.name.clone())
            }
            _ => return None,
        };

        let from = *self.schedule_of.get(&id)?;
        let to = *self.schedule_of.get(&write)?;
        let mut cur = graph.next(from)?;
        while cur != to {
            match graph.get(cur)? {
                Node::Scheduled { node, next } => {
                    if resource.touched_by(graph.get(*node)?) {
                        return None;
                    }
                    cur = (*next)?;
                }
                _ => return None,
            }
        }
        Some(write)
    }
}

enum Access {
    Reg(String),
    File(String),
}

impl Access {
    fn touched_by(&self, node: &Node) -> bool {
        match (self, node) {
            (Access::Reg(name), Node::ReadReg { reg, .. } | Node::WriteReg { reg, .. }) => {
                reg.name == *name
            }
            (
                Access::File(name),
                Node::ReadRegFile { file, .. } | Node::WriteRegFile { file, .. },
            ) => file.name == *name,
            _ => false,
        }
    }
}
