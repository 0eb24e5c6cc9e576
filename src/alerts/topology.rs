//! Device dependency topology (spec §4.2 "Suppression (cascade)").
//!
//! A directed edge `D -> U` means D depends on upstream device U: while U
//! is down, new `is_down`/`is_down_for` alerts for D are withheld. Cycles
//! are rejected at configuration time, never at evaluation time (spec §7,
//! "Configuration error").

use std::collections::{HashMap, HashSet};

use crate::error::AlertError;
use crate::types::DeviceId;

#[derive(Default)]
pub struct DependencyGraph {
    /// device -> its declared upstream dependencies.
    edges: HashMap<DeviceId, Vec<DeviceId>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare that `device` depends on `upstream`. Rejected if it would
    /// close a cycle.
    pub fn add_dependency(&mut self, device: DeviceId, upstream: DeviceId) -> Result<(), AlertError> {
        self.edges.entry(device.clone()).or_default().push(upstream.clone());
        if self.has_cycle_from(&device) {
            // Undo — configuration errors must leave the graph exactly as
            // it was before the rejected edge (spec §7).
            if let Some(list) = self.edges.get_mut(&device) {
                list.retain(|u| u != &upstream);
            }
            return Err(AlertError::DependencyCycle(device.to_string()));
        }
        Ok(())
    }

    fn has_cycle_from(&self, start: &DeviceId) -> bool {
        let mut visiting = HashSet::new();
        let mut stack = vec![start.clone()];
        let mut path = HashSet::new();
        path.insert(start.clone());

        fn visit(
            node: &DeviceId,
            edges: &HashMap<DeviceId, Vec<DeviceId>>,
            path: &mut HashSet<DeviceId>,
            visited: &mut HashSet<DeviceId>,
        ) -> bool {
            if !visited.insert(node.clone()) {
                return false;
            }
            if let Some(upstreams) = edges.get(node) {
                for up in upstreams {
                    if path.contains(up) {
                        return true;
                    }
                    path.insert(up.clone());
                    if visit(up, edges, path, visited) {
                        return true;
                    }
                    path.remove(up);
                }
            }
            false
        }

        let _ = stack.pop();
        let mut visited = HashSet::new();
        visit(start, &self.edges, &mut path, &mut visited)
    }

    /// Direct upstream dependencies declared for `device`.
    pub fn upstreams_of(&self, device: &DeviceId) -> &[DeviceId] {
        self.edges.get(device).map_or(&[], |v| v.as_slice())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_a_direct_cycle() {
        let mut g = DependencyGraph::new();
        g.add_dependency(DeviceId::from("a"), DeviceId::from("b")).unwrap();
        let err = g.add_dependency(DeviceId::from("b"), DeviceId::from("a")).unwrap_err();
        assert!(matches!(err, AlertError::DependencyCycle(_)));
    }

    #[test]
    fn rejects_a_transitive_cycle() {
        let mut g = DependencyGraph::new();
        g.add_dependency(DeviceId::from("a"), DeviceId::from("b")).unwrap();
        g.add_dependency(DeviceId::from("b"), DeviceId::from("c")).unwrap();
        let err = g.add_dependency(DeviceId::from("c"), DeviceId::from("a")).unwrap_err();
        assert!(matches!(err, AlertError::DependencyCycle(_)));
    }

    #[test]
    fn accepts_a_diamond_with_no_cycle() {
        let mut g = DependencyGraph::new();
        g.add_dependency(DeviceId::from("a"), DeviceId::from("b")).unwrap();
        g.add_dependency(DeviceId::from("a"), DeviceId::from("c")).unwrap();
        g.add_dependency(DeviceId::from("b"), DeviceId::from("d")).unwrap();
        g.add_dependency(DeviceId::from("c"), DeviceId::from("d")).unwrap();
        assert_eq!(g.upstreams_of(&DeviceId::from("a")).len(), 2);
    }

    #[test]
    fn rejected_edge_leaves_graph_unchanged() {
        let mut g = DependencyGraph::new();
        g.add_dependency(DeviceId::from("a"), DeviceId::from("b")).unwrap();
        let _ = g.add_dependency(DeviceId::from("b"), DeviceId::from("a"));
        assert!(g.upstreams_of(&DeviceId::from("b")).is_empty());
    }
}
