//! Dependency graph
//!
//! One node per package reachable from the requested roots. Nodes are stored
//! in a `Vec` and addressed by [`NodeId`]; every node knows its dependants and
//! how many of its dependencies are not yet satisfied. Nodes with no
//! dependencies form the initial ready set.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::core::package::PackageDescriptor;
use crate::core::recipe::RecipeBook;
use crate::error::{GraphError, RecipeError};

/// Index of a node in its graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// A package in the graph
#[derive(Debug, Clone)]
pub struct Node {
    pub package: Arc<PackageDescriptor>,
    /// Distinct dependencies, in recipe order
    pub dependencies: Vec<NodeId>,
    /// Nodes that depend on this one
    pub dependants: Vec<NodeId>,
    /// Dependencies not yet satisfied
    pub unsatisfied: usize,
}

impl Node {
    pub fn name(&self) -> &str {
        &self.package.name
    }
}

/// Packages and the edges between them
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    nodes: Vec<Node>,
    index: HashMap<String, NodeId>,
    ready: Vec<NodeId>,
}

impl DependencyGraph {
    /// Build the graph of `roots` and everything they depend on.
    ///
    /// Fails without creating any node of a dependency cycle, on dependencies
    /// with no recipe, and on constraints the recipe versions cannot meet.
    pub fn build<S: AsRef<str>>(roots: &[S], recipes: &RecipeBook) -> Result<Self, GraphError> {
        let mut graph = Self::default();
        let mut path = Vec::new();
        for root in roots {
            graph.visit(root.as_ref(), None, recipes, &mut path)?;
        }
        Ok(graph)
    }

    fn visit(
        &mut self,
        name: &str,
        requested_by: Option<&str>,
        recipes: &RecipeBook,
        path: &mut Vec<String>,
    ) -> Result<NodeId, GraphError> {
        if let Some(&id) = self.index.get(name) {
            return Ok(id);
        }

        if let Some(start) = path.iter().position(|n| n == name) {
            let mut cycle = path[start..].to_vec();
            cycle.push(name.to_string());
            return Err(GraphError::Cycle { cycle });
        }

        if !recipes.contains(name) {
            return Err(match requested_by {
                Some(package) => GraphError::UnknownPackage {
                    package: package.to_string(),
                    dependency: name.to_string(),
                },
                None => GraphError::Recipe(RecipeError::NotFound {
                    name: name.to_string(),
                }),
            });
        }

        let package = recipes.load(name)?;
        path.push(name.to_string());

        let mut dependencies = Vec::new();
        let mut seen = HashSet::new();
        for dep in &package.dependencies {
            let id = self.visit(&dep.name, Some(name), recipes, path)?;

            let have = self.nodes[id.0].package.version;
            if !dep.accepts(have) {
                return Err(GraphError::Unsatisfiable {
                    package: name.to_string(),
                    dependency: dep.name.clone(),
                    constraint: dep.constraint(),
                    version: have.to_string(),
                });
            }

            if seen.insert(id) {
                dependencies.push(id);
            }
        }

        path.pop();

        let id = NodeId(self.nodes.len());
        for dep in &dependencies {
            self.nodes[dep.0].dependants.push(id);
        }
        if dependencies.is_empty() {
            self.ready.push(id);
        }
        self.nodes.push(Node {
            package,
            unsatisfied: dependencies.len(),
            dependencies,
            dependants: Vec::new(),
        });
        self.index.insert(name.to_string(), id);

        Ok(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    /// Look up a node by package name
    pub fn id(&self, name: &str) -> Option<NodeId> {
        self.index.get(name).copied()
    }

    /// Nodes without dependencies
    pub fn ready(&self) -> &[NodeId] {
        &self.ready
    }

    /// All nodes; dependencies always come before their dependants
    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes.iter().enumerate().map(|(i, n)| (NodeId(i), n))
    }

    /// Package names in a valid build order
    pub fn order(&self) -> Vec<&str> {
        self.nodes.iter().map(Node::name).collect()
    }
}
