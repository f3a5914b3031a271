use indexmap::{IndexMap, IndexSet};
use std::fmt;

/// A node in the dependency graph.
///
/// Tracks both edge directions: `outgoing` holds the keys this node depends
/// on, `incoming` the keys that depend on it.
pub struct Node<T> {
    data: T,
    incoming: IndexSet<String>,
    outgoing: IndexSet<String>,
}

impl<T> Node<T> {
    fn new(data: T) -> Self {
        Self {
            data,
            incoming: IndexSet::new(),
            outgoing: IndexSet::new(),
        }
    }

    pub fn data(&self) -> &T {
        &self.data
    }

    pub fn incoming(&self) -> impl Iterator<Item = &str> {
        self.incoming.iter().map(String::as_str)
    }

    pub fn outgoing(&self) -> impl Iterator<Item = &str> {
        self.outgoing.iter().map(String::as_str)
    }
}

/// Directed graph over caller-defined payloads, keyed by a caller-supplied
/// key function. Iteration follows insertion order, so cycle reports are
/// deterministic across runs.
pub struct Graph<T> {
    nodes: IndexMap<String, Node<T>>,
    key_of: Box<dyn Fn(&T) -> String>,
}

impl<T> Graph<T> {
    pub fn new(key_of: impl Fn(&T) -> String + 'static) -> Self {
        Self {
            nodes: IndexMap::new(),
            key_of: Box::new(key_of),
        }
    }

    /// Every node whose outgoing-edge set is empty, i.e. nodes that depend
    /// on nothing else still in the graph.
    pub fn roots(&self) -> Vec<&Node<T>> {
        self.nodes
            .values()
            .filter(|node| node.outgoing.is_empty())
            .collect()
    }

    /// Insert an edge `from -> to`, creating both endpoints if absent.
    /// Idempotent: re-inserting an existing edge changes nothing.
    pub fn insert_edge(&mut self, from: T, to: T) {
        let from_key = (self.key_of)(&from);
        let to_key = (self.key_of)(&to);
        self.nodes
            .entry(from_key.clone())
            .or_insert_with(|| Node::new(from));
        self.nodes
            .entry(to_key.clone())
            .or_insert_with(|| Node::new(to));
        if let Some(node) = self.nodes.get_mut(&from_key) {
            node.outgoing.insert(to_key.clone());
        }
        if let Some(node) = self.nodes.get_mut(&to_key) {
            node.incoming.insert(from_key);
        }
    }

    /// Remove the node for `data` and strip its key from every remaining
    /// node's edge sets. O(nodes) per removal; per-resolution graphs are
    /// small enough for that.
    pub fn remove_node(&mut self, data: &T) {
        let key = (self.key_of)(data);
        self.nodes.shift_remove(&key);
        for node in self.nodes.values_mut() {
            node.outgoing.shift_remove(&key);
            node.incoming.shift_remove(&key);
        }
    }

    pub fn lookup_or_insert_node(&mut self, data: T) -> &Node<T> {
        let key = (self.key_of)(&data);
        self.nodes.entry(key).or_insert_with(|| Node::new(data))
    }

    pub fn lookup(&self, data: &T) -> Option<&Node<T>> {
        self.nodes.get(&(self.key_of)(data))
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
    }

    /// Brute-force cycle search: depth-first walk from every node, keeping
    /// an ordered on-path set. Returns the first cycle found as
    /// `"a -> b -> a"` (the path ends by repeating the revisited key).
    /// The search order is deterministic but the result is not guaranteed
    /// to be the shortest cycle.
    pub fn find_cycle_slow(&self) -> Option<String> {
        for (key, node) in &self.nodes {
            let mut seen = IndexSet::new();
            seen.insert(key.clone());
            if let Some(cycle) = self.find_cycle_from(node, &mut seen) {
                return Some(cycle);
            }
        }
        None
    }

    fn find_cycle_from(&self, node: &Node<T>, seen: &mut IndexSet<String>) -> Option<String> {
        for key in &node.outgoing {
            if seen.contains(key) {
                let mut path: Vec<&str> = seen.iter().map(String::as_str).collect();
                path.push(key);
                return Some(path.join(" -> "));
            }
            if let Some(next) = self.nodes.get(key) {
                seen.insert(key.clone());
                if let Some(cycle) = self.find_cycle_from(next, seen) {
                    return Some(cycle);
                }
                seen.shift_remove(key);
            }
        }
        None
    }
}

impl<T> fmt::Display for Graph<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (key, node) in &self.nodes {
            let incoming: Vec<&str> = node.incoming().collect();
            let outgoing: Vec<&str> = node.outgoing().collect();
            writeln!(
                f,
                "{key}\n\t(-> incoming)[{}]\n\t(outgoing ->)[{}]",
                incoming.join(", "),
                outgoing.join(", ")
            )?;
        }
        Ok(())
    }
}

impl<T> fmt::Debug for Graph<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Graph")
            .field("nodes", &self.nodes.keys().collect::<Vec<_>>())
            .finish()
    }
}
