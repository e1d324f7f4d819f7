//! Flow network: typed nodes joined by typed pipes.
//!
//! Node and pipe ids share one namespace. Every pipe's endpoints name
//! existing nodes at all times; removing a node removes the pipes that
//! touch it.

use std::collections::BTreeMap;

use flowsim_types::{Node, Pipe};
use serde_json::Value;

use crate::error::EditError;

/// Nodes and pipes keyed by id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Network {
    nodes: BTreeMap<String, Node>,
    pipes: BTreeMap<String, Pipe>,
}

impl Network {
    /// Create an empty network.
    pub const fn new() -> Self {
        Self {
            nodes: BTreeMap::new(),
            pipes: BTreeMap::new(),
        }
    }

    /// Whether `id` names a node or a pipe.
    pub fn contains_id(&self, id: &str) -> bool {
        self.nodes.contains_key(id) || self.pipes.contains_key(id)
    }

    // -------------------------------------------------------------------
    // Nodes
    // -------------------------------------------------------------------

    /// Insert a node.
    ///
    /// # Errors
    ///
    /// Returns [`EditError::IdConflict`] if the id is taken by a node or pipe.
    pub fn add_node(&mut self, node: Node) -> Result<(), EditError> {
        if self.contains_id(&node.id) {
            return Err(EditError::IdConflict(node.id));
        }
        self.nodes.insert(node.id.clone(), node);
        Ok(())
    }

    /// Look up a node.
    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    /// Number of nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Nodes in id order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    // -------------------------------------------------------------------
    // Pipes
    // -------------------------------------------------------------------

    /// Insert a pipe between two existing nodes.
    ///
    /// # Errors
    ///
    /// Returns [`EditError::IdConflict`] if the id is taken, or
    /// [`EditError::UnknownEntity`] if either endpoint is not a node.
    pub fn add_pipe(&mut self, pipe: Pipe) -> Result<(), EditError> {
        if self.contains_id(&pipe.id) {
            return Err(EditError::IdConflict(pipe.id));
        }
        for endpoint in [&pipe.a, &pipe.b] {
            if !self.nodes.contains_key(endpoint) {
                return Err(EditError::UnknownEntity(endpoint.clone()));
            }
        }
        self.pipes.insert(pipe.id.clone(), pipe);
        Ok(())
    }

    /// Look up a pipe.
    pub fn pipe(&self, id: &str) -> Option<&Pipe> {
        self.pipes.get(id)
    }

    /// Number of pipes.
    pub fn pipe_count(&self) -> usize {
        self.pipes.len()
    }

    /// Pipes in id order.
    pub fn pipes(&self) -> impl Iterator<Item = &Pipe> {
        self.pipes.values()
    }

    // -------------------------------------------------------------------
    // Shared
    // -------------------------------------------------------------------

    /// Set one parameter on a node or pipe.
    ///
    /// # Errors
    ///
    /// Returns [`EditError::UnknownEntity`] if `id` names nothing.
    pub fn set_param(&mut self, id: &str, key: String, value: Value) -> Result<(), EditError> {
        let params = if let Some(node) = self.nodes.get_mut(id) {
            &mut node.params
        } else if let Some(pipe) = self.pipes.get_mut(id) {
            &mut pipe.params
        } else {
            return Err(EditError::UnknownEntity(id.to_owned()));
        };
        params.insert(key, value);
        Ok(())
    }

    /// Remove a node (with its incident pipes) or a pipe.
    ///
    /// # Errors
    ///
    /// Returns [`EditError::UnknownEntity`] if `id` names nothing.
    pub fn remove(&mut self, id: &str) -> Result<(), EditError> {
        if self.nodes.remove(id).is_some() {
            self.pipes.retain(|_, p| p.a != id && p.b != id);
            return Ok(());
        }
        if self.pipes.remove(id).is_some() {
            return Ok(());
        }
        Err(EditError::UnknownEntity(id.to_owned()))
    }

    /// Materialize nodes and pipes, each ordered by id.
    pub fn view(&self) -> (Vec<Node>, Vec<Pipe>) {
        (
            self.nodes.values().cloned().collect(),
            self.pipes.values().cloned().collect(),
        )
    }
}
