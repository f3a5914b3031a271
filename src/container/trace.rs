use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::graph::Graph;

/// Diagnostic record of which identifier caused the creation or use of
/// which other identifier.
///
/// Shared by every container under one root when tracing is enabled.
/// Purely informational: resolution never consults it for correctness.
#[derive(Clone)]
pub struct CreationTrace {
    graph: Rc<RefCell<Graph<String>>>,
}

impl CreationTrace {
    pub(crate) fn new() -> Self {
        Self {
            graph: Rc::new(RefCell::new(Graph::new(|key: &String| key.clone()))),
        }
    }

    pub(crate) fn record(&self, from: &str, to: &str) {
        self.graph
            .borrow_mut()
            .insert_edge(from.to_string(), to.to_string());
    }

    /// Human-readable dump of every recorded edge.
    pub fn dump(&self) -> String {
        self.graph.borrow().to_string()
    }

    /// First dependency cycle visible in the recorded edges, if any.
    pub fn find_cycle(&self) -> Option<String> {
        self.graph.borrow().find_cycle_slow()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.borrow().is_empty()
    }
}

impl fmt::Debug for CreationTrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CreationTrace")
            .field("nodes", &self.graph.borrow().node_count())
            .finish()
    }
}
