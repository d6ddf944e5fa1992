//! Stack and variable dependencies of data-flow nodes.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::Error;

static NEXT_GRAPH_ID: AtomicU64 = AtomicU64::new(0);

/// Identifies one `DataFlowGraph` instance.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct GraphId(u64);

impl GraphId {
    pub(crate) fn fresh() -> GraphId {
        GraphId(NEXT_GRAPH_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// A value produced by a data-flow node: the node's offset and the index of
/// the value among those the node produces.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct DataSource {
    graph: GraphId,
    node: u32,
    slot: usize,
}

impl DataSource {
    pub fn new(graph: GraphId, node: u32, slot: usize) -> DataSource {
        DataSource { graph, node, slot }
    }

    pub fn graph(&self) -> GraphId {
        self.graph
    }

    /// The offset of the producing node.
    pub fn node(&self) -> u32 {
        self.node
    }

    pub fn slot(&self) -> usize {
        self.slot
    }
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "IL_{:04x}#{}", self.node, self.slot)
    }
}

/// The producers of one consumed stack slot.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct StackDependency {
    sources: BTreeSet<DataSource>,
    owner: Option<u32>,
}

impl StackDependency {
    pub fn new(sources: BTreeSet<DataSource>) -> StackDependency {
        StackDependency { sources, owner: None }
    }

    /// The producers of this slot, in ascending offset order. Empty when the
    /// value has no producer in the method, like a caught exception.
    pub fn sources(&self) -> &BTreeSet<DataSource> {
        &self.sources
    }

    /// The node this dependency is attached to.
    pub fn owner(&self) -> Option<u32> {
        self.owner
    }
}

/// The stack dependencies of one node, ordered by slot, deepest first.
///
/// A dependency belongs to at most one collection at a time.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct StackDependencyCollection {
    graph: GraphId,
    owner: u32,
    items: Vec<StackDependency>,
}

impl StackDependencyCollection {
    pub fn new(graph: GraphId, owner: u32) -> StackDependencyCollection {
        StackDependencyCollection {
            graph,
            owner,
            items: Vec::new(),
        }
    }

    fn adopt(&self, mut dependency: StackDependency) -> Result<StackDependency, Error> {
        if dependency.owner.is_some() {
            return Err(Error::DependencyAlreadyOwned);
        }
        if dependency.sources.iter().any(|source| source.graph != self.graph) {
            return Err(Error::ForeignDataSource);
        }
        dependency.owner = Some(self.owner);
        Ok(dependency)
    }

    pub fn push(&mut self, dependency: StackDependency) -> Result<(), Error> {
        let dependency = self.adopt(dependency)?;
        self.items.push(dependency);
        Ok(())
    }

    pub fn insert(&mut self, index: usize, dependency: StackDependency) -> Result<(), Error> {
        if index > self.items.len() {
            return Err(format!("stack dependency index {} out of range", index).into());
        }
        let dependency = self.adopt(dependency)?;
        self.items.insert(index, dependency);
        Ok(())
    }

    /// Detach the dependency at `index`, clearing its owner.
    pub fn remove(&mut self, index: usize) -> Result<StackDependency, Error> {
        if index >= self.items.len() {
            return Err(format!("stack dependency index {} out of range", index).into());
        }
        let mut dependency = self.items.remove(index);
        dependency.owner = None;
        Ok(dependency)
    }

    pub fn get(&self, index: usize) -> Option<&StackDependency> {
        self.items.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &StackDependency> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Replace the dependency at `index`, detaching the old one.
    pub fn set(&mut self, index: usize, dependency: StackDependency) -> Result<StackDependency, Error> {
        let dependency = self.adopt(dependency)?;
        match self.items.get_mut(index) {
            Some(item) => {
                let mut old = std::mem::replace(item, dependency);
                old.owner = None;
                Ok(old)
            }
            None => Err(format!("stack dependency index {} out of range", index).into()),
        }
    }

    /// Grow or shrink the collection to `count` slots. New slots have no
    /// producers.
    pub fn set_count(&mut self, count: usize) {
        self.items.truncate(count);
        while self.items.len() < count {
            self.items.push(StackDependency {
                sources: BTreeSet::new(),
                owner: Some(self.owner),
            });
        }
    }

    /// The number of producer edges over all slots.
    pub fn edge_count(&self) -> usize {
        self.items.iter().map(|item| item.sources.len()).sum()
    }
}

/// For every variable a node reads, the nodes which last wrote it.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct VariableDependencyCollection<V: Ord> {
    items: BTreeMap<V, BTreeSet<DataSource>>,
}

impl<V: Ord> Default for VariableDependencyCollection<V> {
    fn default() -> Self {
        VariableDependencyCollection { items: BTreeMap::new() }
    }
}

impl<V: Ord> VariableDependencyCollection<V> {
    pub fn insert(&mut self, variable: V, sources: BTreeSet<DataSource>) {
        self.items.insert(variable, sources);
    }

    pub fn get(&self, variable: &V) -> Option<&BTreeSet<DataSource>> {
        self.items.get(variable)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&V, &BTreeSet<DataSource>)> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn edge_count(&self) -> usize {
        self.items.values().map(|sources| sources.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sources(graph: GraphId, nodes: &[u32]) -> BTreeSet<DataSource> {
        nodes.iter().map(|node| DataSource::new(graph, *node, 0)).collect()
    }

    #[test]
    fn ownership_is_exclusive() {
        let graph = GraphId::fresh();
        let mut first = StackDependencyCollection::new(graph, 4);
        let mut second = StackDependencyCollection::new(graph, 8);

        first.push(StackDependency::new(sources(graph, &[0]))).unwrap();
        assert_eq!(first.get(0).unwrap().owner(), Some(4));

        let owned = first.get(0).unwrap().clone();
        assert!(matches!(second.push(owned), Err(Error::DependencyAlreadyOwned)));

        let detached = first.remove(0).unwrap();
        assert_eq!(detached.owner(), None);
        second.insert(0, detached).unwrap();
        assert_eq!(second.get(0).unwrap().owner(), Some(8));
        assert!(first.is_empty());
    }

    #[test]
    fn sources_must_belong_to_the_same_graph() {
        let graph = GraphId::fresh();
        let other = GraphId::fresh();
        let mut collection = StackDependencyCollection::new(graph, 2);

        let result = collection.push(StackDependency::new(sources(other, &[0])));
        assert!(matches!(result, Err(Error::ForeignDataSource)));
    }

    #[test]
    fn counts() {
        let graph = GraphId::fresh();
        let mut collection = StackDependencyCollection::new(graph, 9);
        collection.push(StackDependency::new(sources(graph, &[1, 5]))).unwrap();
        collection.push(StackDependency::new(BTreeSet::new())).unwrap();
        collection.push(StackDependency::new(sources(graph, &[7]))).unwrap();

        assert_eq!(collection.len(), 3);
        assert_eq!(collection.edge_count(), 3);

        collection.set_count(5);
        assert_eq!(collection.len(), 5);
        assert_eq!(collection.get(4).unwrap().owner(), Some(9));
        collection.set_count(1);
        assert_eq!(collection.edge_count(), 2);

        let old = collection.set(0, StackDependency::new(sources(graph, &[3]))).unwrap();
        assert_eq!(old.owner(), None);
        assert_eq!(collection.edge_count(), 1);

        let mut variables = VariableDependencyCollection::default();
        variables.insert(0u16, sources(graph, &[1, 2]));
        assert_eq!(variables.edge_count(), 2);
    }
}
