//! Dependency graph of a task registration batch.
//!
//! A batch may register tasks whose parents are registered in the same batch.
//! [`RegistrationGraph`] holds the in-batch edges and yields an order in
//! which every task comes after its in-batch parents, so the batch is
//! constructible task by task. A cycle is detected once, when the order is
//! computed.

use crate::core::task::TaskKey;
use crate::core::AssetKind;
use crate::error::{Error, Result};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use std::collections::{BTreeMap, BTreeSet};

/// Parent → child edges between the tasks of one batch.
pub struct RegistrationGraph {
    graph: DiGraph<TaskKey, ()>,
    /// Key-ordered so iteration never depends on insertion or hashing.
    task_index: BTreeMap<TaskKey, NodeIndex>,
}

impl RegistrationGraph {
    pub fn new() -> Self {
        Self {
            graph: DiGraph::new(),
            task_index: BTreeMap::new(),
        }
    }

    /// Add a task of the batch. A key appearing twice is a collision.
    pub fn add_task(&mut self, key: TaskKey) -> Result<NodeIndex> {
        if self.task_index.contains_key(&key) {
            return Err(Error::already_exists(AssetKind::ComputeTask, key));
        }
        let index = self.graph.add_node(key);
        self.task_index.insert(key, index);
        Ok(index)
    }

    /// Record that `child` consumes outputs of `parent`, both in the batch.
    pub fn add_dependency(&mut self, parent: &TaskKey, child: &TaskKey) -> Result<()> {
        let parent_index = self.node(parent)?;
        let child_index = self.node(child)?;

        self.graph.add_edge(parent_index, child_index, ());
        Ok(())
    }

    pub fn contains_task(&self, key: &TaskKey) -> bool {
        self.task_index.contains_key(key)
    }

    pub fn task_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn dependency_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Topological order, smallest key first among tasks that are ready.
    ///
    /// Tasks left with unordered parents sit on a cycle; the smallest of
    /// them is reported.
    pub fn registration_order(&self) -> Result<Vec<TaskKey>> {
        let mut pending_parents: BTreeMap<TaskKey, usize> = self
            .task_index
            .iter()
            .map(|(key, &index)| {
                let count = self
                    .graph
                    .neighbors_directed(index, Direction::Incoming)
                    .count();
                (*key, count)
            })
            .collect();

        let mut ready: BTreeSet<TaskKey> = pending_parents
            .iter()
            .filter(|(_, count)| **count == 0)
            .map(|(key, _)| *key)
            .collect();

        let mut order = Vec::with_capacity(self.task_index.len());
        while let Some(key) = ready.pop_first() {
            order.push(key);
            let index = self.task_index[&key];
            for child_index in self.graph.neighbors_directed(index, Direction::Outgoing) {
                let child = self.graph[child_index];
                if let Some(count) = pending_parents.get_mut(&child) {
                    *count -= 1;
                    if *count == 0 {
                        ready.insert(child);
                    }
                }
            }
        }

        if let Some((key, _)) = pending_parents.iter().find(|(_, count)| **count > 0) {
            return Err(Error::invalid_input(key, "task dependencies form a cycle"));
        }
        Ok(order)
    }

    fn node(&self, key: &TaskKey) -> Result<NodeIndex> {
        self.task_index
            .get(key)
            .copied()
            .ok_or_else(|| Error::invalid_input(key, "task is not part of the batch"))
    }
}

impl Default for RegistrationGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RegistrationGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistrationGraph")
            .field("tasks", &self.task_count())
            .field("dependencies", &self.dependency_count())
            .finish()
    }
}
