//! Implements a directed graph.
//!
//! Vertices and edges are stored in ordered maps keyed by index, so every
//! traversal in this module visits vertices in a deterministic order.

use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::Error;

pub trait Vertex: Clone {
    // The index of this vertex.
    fn index(&self) -> usize;
    // A string to display in dot graphviz format.
    fn dot_label(&self) -> String;
    // Fill color in dot graphviz format.
    fn dot_fill_color(&self) -> String {
        "#ffddcc".to_string()
    }
}

pub trait Edge: Clone {
    /// The index of the head vertex.
    fn head(&self) -> usize;
    /// The index of the tail vertex.
    fn tail(&self) -> usize;
    /// A string to display in dot graphviz format.
    fn dot_label(&self) -> String;
    // Style in dot graphviz format.
    fn dot_style(&self) -> String {
        "solid".to_string()
    }
    // Color in dot graphviz format.
    fn dot_color(&self) -> String {
        "#000000".to_string()
    }
}

/// A directed graph.
///
/// At most one edge exists between any ordered pair of vertices.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Graph<V: Vertex, E: Edge> {
    vertices: BTreeMap<usize, V>,
    edges: BTreeMap<(usize, usize), E>,
    successors: BTreeMap<usize, BTreeSet<usize>>,
    predecessors: BTreeMap<usize, BTreeSet<usize>>,
}

impl<V, E> Default for Graph<V, E>
where
    V: Vertex,
    E: Edge,
{
    fn default() -> Self {
        Graph::new()
    }
}

impl<V, E> Graph<V, E>
where
    V: Vertex,
    E: Edge,
{
    pub fn new() -> Graph<V, E> {
        Graph {
            vertices: BTreeMap::new(),
            edges: BTreeMap::new(),
            successors: BTreeMap::new(),
            predecessors: BTreeMap::new(),
        }
    }

    pub fn num_vertices(&self) -> usize {
        self.vertices.len()
    }

    pub fn num_edges(&self) -> usize {
        self.edges.len()
    }

    /// Returns true if the vertex with the given index exists in this graph
    pub fn has_vertex(&self, index: usize) -> bool {
        self.vertices.contains_key(&index)
    }

    /// Returns true if the edge with the given head and tail index exists in this graph
    pub fn has_edge(&self, head: usize, tail: usize) -> bool {
        self.edges.contains_key(&(head, tail))
    }

    /// Inserts a vertex into the graph.
    /// # Errors
    /// Error if the vertex already exists by index.
    pub fn insert_vertex(&mut self, v: V) -> Result<(), Error> {
        if self.vertices.contains_key(&v.index()) {
            return Err(format!("duplicate vertex index {}", v.index()).into());
        }
        self.successors.insert(v.index(), BTreeSet::new());
        self.predecessors.insert(v.index(), BTreeSet::new());
        self.vertices.insert(v.index(), v);
        Ok(())
    }

    /// Inserts an edge into the graph.
    /// # Errors
    /// Error if the edge already exists by indices, or if either vertex is missing.
    pub fn insert_edge(&mut self, edge: E) -> Result<(), Error> {
        let (head, tail) = (edge.head(), edge.tail());
        if self.edges.contains_key(&(head, tail)) {
            return Err(format!("duplicate edge {} -> {}", head, tail).into());
        }
        if !self.vertices.contains_key(&head) {
            return Err(Error::GraphVertexNotFound(head));
        }
        if !self.vertices.contains_key(&tail) {
            return Err(Error::GraphVertexNotFound(tail));
        }

        self.edges.insert((head, tail), edge);
        if let Some(successors) = self.successors.get_mut(&head) {
            successors.insert(tail);
        }
        if let Some(predecessors) = self.predecessors.get_mut(&tail) {
            predecessors.insert(head);
        }

        Ok(())
    }

    /// Removes a vertex, and all edges associated with that vertex.
    pub fn remove_vertex(&mut self, index: usize) -> Result<V, Error> {
        let vertex = self
            .vertices
            .remove(&index)
            .ok_or(Error::GraphVertexNotFound(index))?;

        let mut edges = Vec::new();
        if let Some(successors) = self.successors.get(&index) {
            edges.extend(successors.iter().map(|&successor| (index, successor)));
        }
        if let Some(predecessors) = self.predecessors.get(&index) {
            edges.extend(
                predecessors
                    .iter()
                    .filter(|&&predecessor| predecessor != index)
                    .map(|&predecessor| (predecessor, index)),
            );
        }
        for (head, tail) in edges {
            self.remove_edge(head, tail)?;
        }

        self.successors.remove(&index);
        self.predecessors.remove(&index);

        Ok(vertex)
    }

    /// Removes an edge
    pub fn remove_edge(&mut self, head: usize, tail: usize) -> Result<E, Error> {
        let edge = self
            .edges
            .remove(&(head, tail))
            .ok_or(Error::GraphEdgeNotFound(head, tail))?;

        if let Some(predecessors) = self.predecessors.get_mut(&tail) {
            predecessors.remove(&head);
        }
        if let Some(successors) = self.successors.get_mut(&head) {
            successors.remove(&tail);
        }

        Ok(edge)
    }

    /// Fetch a vertex by index.
    pub fn vertex(&self, index: usize) -> Result<&V, Error> {
        self.vertices
            .get(&index)
            .ok_or(Error::GraphVertexNotFound(index))
    }

    /// Fetch a mutable reference to a vertex by index.
    pub fn vertex_mut(&mut self, index: usize) -> Result<&mut V, Error> {
        self.vertices
            .get_mut(&index)
            .ok_or(Error::GraphVertexNotFound(index))
    }

    /// All vertices, ordered by index.
    pub fn vertices(&self) -> Vec<&V> {
        self.vertices.values().collect()
    }

    /// Fetch an edge by its head and tail.
    pub fn edge(&self, head: usize, tail: usize) -> Result<&E, Error> {
        self.edges
            .get(&(head, tail))
            .ok_or(Error::GraphEdgeNotFound(head, tail))
    }

    /// All edges, ordered by (head, tail).
    pub fn edges(&self) -> Vec<&E> {
        self.edges.values().collect()
    }

    /// All edges leaving the vertex at the given index.
    pub fn edges_out(&self, index: usize) -> Result<Vec<&E>, Error> {
        let successors = self
            .successors
            .get(&index)
            .ok_or(Error::GraphVertexNotFound(index))?;
        successors
            .iter()
            .map(|&successor| self.edge(index, successor))
            .collect()
    }

    /// All edges entering the vertex at the given index.
    pub fn edges_in(&self, index: usize) -> Result<Vec<&E>, Error> {
        let predecessors = self
            .predecessors
            .get(&index)
            .ok_or(Error::GraphVertexNotFound(index))?;
        predecessors
            .iter()
            .map(|&predecessor| self.edge(predecessor, index))
            .collect()
    }

    /// Returns the indices of all immediate successors of a vertex from the graph.
    pub fn successor_indices(&self, index: usize) -> Result<Vec<usize>, Error> {
        self.successors
            .get(&index)
            .map(|successors| successors.iter().cloned().collect())
            .ok_or(Error::GraphVertexNotFound(index))
    }

    /// Returns the indices of all immediate predecessors of a vertex from the graph.
    pub fn predecessor_indices(&self, index: usize) -> Result<Vec<usize>, Error> {
        self.predecessors
            .get(&index)
            .map(|predecessors| predecessors.iter().cloned().collect())
            .ok_or(Error::GraphVertexNotFound(index))
    }

    /// Computes the set of vertices reachable from the given index.
    pub fn reachable_vertices(&self, index: usize) -> Result<FxHashSet<usize>, Error> {
        if !self.has_vertex(index) {
            return Err(Error::GraphVertexNotFound(index));
        }

        let mut reachable_vertices: FxHashSet<usize> = FxHashSet::default();
        let mut queue: Vec<usize> = vec![index];

        reachable_vertices.insert(index);

        while let Some(vertex) = queue.pop() {
            for &successor in &self.successors[&vertex] {
                if reachable_vertices.insert(successor) {
                    queue.push(successor)
                }
            }
        }

        Ok(reachable_vertices)
    }

    /// Computes the set of vertices unreachable from the given index.
    pub fn unreachable_vertices(&self, index: usize) -> Result<BTreeSet<usize>, Error> {
        let reachable_vertices = self.reachable_vertices(index)?;
        Ok(self
            .vertices
            .keys()
            .filter(|index| !reachable_vertices.contains(index))
            .cloned()
            .collect())
    }

    /// Compute the pre order of all vertices reachable from `root`.
    ///
    /// Successors are visited in ascending index order.
    pub fn compute_pre_order(&self, root: usize) -> Result<Vec<usize>, Error> {
        if !self.has_vertex(root) {
            return Err(Error::GraphVertexNotFound(root));
        }

        let mut visited: FxHashSet<usize> = FxHashSet::default();
        let mut stack: Vec<usize> = vec![root];
        let mut order: Vec<usize> = Vec::new();

        while let Some(node) = stack.pop() {
            if !visited.insert(node) {
                continue;
            }

            order.push(node);

            for &successor in self.successors[&node].iter().rev() {
                if !visited.contains(&successor) {
                    stack.push(successor);
                }
            }
        }

        Ok(order)
    }

    /// Compute the post order of all vertices reachable from `root`.
    pub fn compute_post_order(&self, root: usize) -> Result<Vec<usize>, Error> {
        if !self.has_vertex(root) {
            return Err(Error::GraphVertexNotFound(root));
        }

        let mut visited: FxHashSet<usize> = FxHashSet::default();
        let mut order: Vec<usize> = Vec::new();
        // (vertex, successors already pushed)
        let mut stack: Vec<(usize, bool)> = vec![(root, false)];

        while let Some((node, expanded)) = stack.pop() {
            if expanded {
                order.push(node);
                continue;
            }
            if !visited.insert(node) {
                continue;
            }
            stack.push((node, true));
            for &successor in self.successors[&node].iter().rev() {
                if !visited.contains(&successor) {
                    stack.push((successor, false));
                }
            }
        }

        Ok(order)
    }

    /// Returns a string in the graphviz format
    pub fn dot_graph(&self) -> String {
        let vertices = self
            .vertices
            .values()
            .map(|v| {
                format!(
                    "{} [shape=\"box\", label=\"{}\", style=\"filled\", fillcolor=\"{}\"];",
                    v.index(),
                    v.dot_label().replace('\n', "\\l"),
                    v.dot_fill_color(),
                )
            })
            .collect::<Vec<String>>();

        let edges = self
            .edges
            .values()
            .map(|e| {
                format!(
                    "{} -> {} [label=\"{}\", style=\"{}\", color=\"{}\"];",
                    e.head(),
                    e.tail(),
                    e.dot_label().replace('\n', "\\l"),
                    e.dot_style(),
                    e.dot_color()
                )
            })
            .collect::<Vec<String>>();

        let options = [
            "graph [fontname = \"Courier New\", splines=\"polyline\"]",
            "node [fontname = \"Courier New\"]",
            "edge [fontname = \"Courier New\"]",
        ];

        format!(
            "digraph G {{\n{}\n\n{}\n{}\n}}",
            options.join("\n"),
            vertices.join("\n"),
            edges.join("\n")
        )
    }
}
