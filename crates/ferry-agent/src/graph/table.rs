use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use ferry_core::error::FerryError;

use super::node::{Action, DynNode, Node, NodeId};

/// Problems found while assembling a graph.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum GraphError {
    #[error("node '{0}' registered twice")]
    DuplicateNode(NodeId),

    #[error("edge references unknown node '{0}'")]
    UnknownNode(NodeId),

    #[error("node '{node}' already has an edge for '{action}'")]
    DuplicateEdge { node: NodeId, action: Action },

    #[error("node '{node}' never returns '{action}'")]
    UndeclaredAction { node: NodeId, action: Action },

    #[error("'{0}' ends the flow and cannot label an edge")]
    TerminalEdge(Action),

    #[error("graph has no entry node")]
    MissingEntry,
}

impl From<GraphError> for FerryError {
    fn from(e: GraphError) -> Self {
        FerryError::Graph(e.to_string())
    }
}

/// Immutable node graph: nodes keyed by id plus the `(node, action) -> node`
/// transition table.
pub struct Graph {
    nodes: HashMap<NodeId, Arc<dyn DynNode>>,
    edges: HashMap<(NodeId, Action), NodeId>,
    entry: NodeId,
}

impl Graph {
    pub fn builder() -> GraphBuilder {
        GraphBuilder::default()
    }

    pub fn entry(&self) -> NodeId {
        self.entry
    }

    pub fn node(&self, id: NodeId) -> Option<&Arc<dyn DynNode>> {
        self.nodes.get(&id)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Where `action` from `from` leads, if anywhere.
    pub fn successor(&self, from: NodeId, action: Action) -> Option<NodeId> {
        self.edges.get(&(from, action)).copied()
    }

    /// All edges, sorted for stable output.
    pub fn edges(&self) -> Vec<(NodeId, Action, NodeId)> {
        let mut edges: Vec<_> = self
            .edges
            .iter()
            .map(|((from, action), to)| (*from, *action, *to))
            .collect();
        edges.sort();
        edges
    }
}

#[derive(Default)]
pub struct GraphBuilder {
    nodes: Vec<Arc<dyn DynNode>>,
    edges: Vec<(NodeId, Action, NodeId)>,
    entry: Option<NodeId>,
}

impl GraphBuilder {
    pub fn node(mut self, node: impl Node) -> Self {
        self.nodes.push(Arc::new(node));
        self
    }

    pub fn edge(mut self, from: NodeId, action: Action, to: NodeId) -> Self {
        self.edges.push((from, action, to));
        self
    }

    pub fn entry(mut self, id: NodeId) -> Self {
        self.entry = Some(id);
        self
    }

    /// Validate and freeze the graph.
    pub fn build(self) -> Result<Graph, GraphError> {
        let mut nodes: HashMap<NodeId, Arc<dyn DynNode>> = HashMap::new();
        for node in self.nodes {
            let id = node.id();
            if nodes.insert(id, node).is_some() {
                return Err(GraphError::DuplicateNode(id));
            }
        }

        let mut edges = HashMap::new();
        let mut seen = HashSet::new();
        for (from, action, to) in self.edges {
            if action.is_terminal() {
                return Err(GraphError::TerminalEdge(action));
            }
            let source = nodes.get(&from).ok_or(GraphError::UnknownNode(from))?;
            if !nodes.contains_key(&to) {
                return Err(GraphError::UnknownNode(to));
            }
            if !source.outcomes().contains(&action) {
                return Err(GraphError::UndeclaredAction { node: from, action });
            }
            if !seen.insert((from, action)) {
                return Err(GraphError::DuplicateEdge { node: from, action });
            }
            edges.insert((from, action), to);
        }

        let entry = self.entry.ok_or(GraphError::MissingEntry)?;
        if !nodes.contains_key(&entry) {
            return Err(GraphError::UnknownNode(entry));
        }

        Ok(Graph { nodes, edges, entry })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::BoxFuture;

    use crate::context::TurnContext;

    struct Fixed(NodeId, Action);

    impl Node for Fixed {
        type Prep = ();
        type Exec = ();

        fn id(&self) -> NodeId {
            self.0
        }

        fn outcomes(&self) -> &'static [Action] {
            &[Action::CallLlm, Action::Done]
        }

        fn prepare<'a>(&'a self, _ctx: &'a mut TurnContext) -> BoxFuture<'a, ()> {
            Box::pin(async {})
        }

        fn execute<'a>(&'a self, _prep: &'a mut ()) -> BoxFuture<'a, ()> {
            Box::pin(async {})
        }

        fn decide<'a>(&'a self, _ctx: &'a mut TurnContext, _: (), _: ()) -> BoxFuture<'a, Action> {
            let action = self.1;
            Box::pin(async move { action })
        }
    }

    const A: NodeId = NodeId("a");
    const B: NodeId = NodeId("b");

    fn two_nodes() -> GraphBuilder {
        Graph::builder()
            .node(Fixed(A, Action::CallLlm))
            .node(Fixed(B, Action::Done))
            .entry(A)
    }

    #[test]
    fn test_valid_graph() {
        let graph = two_nodes().edge(A, Action::CallLlm, B).build().unwrap();
        assert_eq!(graph.entry(), A);
        assert_eq!(graph.successor(A, Action::CallLlm), Some(B));
        assert_eq!(graph.successor(B, Action::CallLlm), None);
    }

    #[test]
    fn test_rejects_unknown_target() {
        let err = two_nodes()
            .edge(A, Action::CallLlm, NodeId("ghost"))
            .build()
            .err()
            .unwrap();
        assert_eq!(err, GraphError::UnknownNode(NodeId("ghost")));
    }

    #[test]
    fn test_rejects_duplicate_edge() {
        let err = two_nodes()
            .edge(A, Action::CallLlm, B)
            .edge(A, Action::CallLlm, A)
            .build()
            .err()
            .unwrap();
        assert_eq!(err, GraphError::DuplicateEdge { node: A, action: Action::CallLlm });
    }

    #[test]
    fn test_rejects_undeclared_action() {
        let err = two_nodes().edge(A, Action::Execute, B).build().err().unwrap();
        assert_eq!(err, GraphError::UndeclaredAction { node: A, action: Action::Execute });
    }

    #[test]
    fn test_rejects_terminal_edge() {
        let err = two_nodes().edge(A, Action::Done, B).build().err().unwrap();
        assert_eq!(err, GraphError::TerminalEdge(Action::Done));
    }

    #[test]
    fn test_rejects_duplicate_node_and_missing_entry() {
        let err = two_nodes().node(Fixed(A, Action::Done)).build().err().unwrap();
        assert_eq!(err, GraphError::DuplicateNode(A));

        let err = Graph::builder().node(Fixed(A, Action::Done)).build().err().unwrap();
        assert_eq!(err, GraphError::MissingEntry);
    }

    #[test]
    fn test_converts_into_ferry_error() {
        let err: FerryError = GraphError::MissingEntry.into();
        assert!(matches!(err, FerryError::Graph(ref m) if m.contains("entry")));
    }
}
