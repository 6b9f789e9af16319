//! Ancestry graph of builder definitions.

use crate::error::{ConfigError, Result};
use kiln_core::definition::DefinitionSet;
use kiln_core::ids::BuilderName;
use petgraph::Direction;
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::HashMap;

/// Parent-to-child edges over a whole [`DefinitionSet`].
///
/// Building the graph rejects unknown parents and cycles, so every name in a
/// built graph resolves.
#[derive(Debug)]
pub struct AncestryGraph {
    graph: DiGraph<BuilderName, ()>,
    name_to_index: HashMap<BuilderName, NodeIndex>,
}

impl AncestryGraph {
    pub fn build(set: &DefinitionSet) -> Result<Self> {
        let mut graph = DiGraph::new();
        let mut name_to_index = HashMap::new();

        for def in set.iter() {
            let idx = graph.add_node(def.name.clone());
            name_to_index.insert(def.name.clone(), idx);
        }

        for def in set.iter() {
            let Some(parent) = &def.parent else {
                continue;
            };
            let parent_idx = name_to_index
                .get(parent)
                .ok_or_else(|| ConfigError::UnknownParent {
                    definition: def.name.to_string(),
                    parent: parent.to_string(),
                })?;
            graph.add_edge(*parent_idx, name_to_index[&def.name], ());
        }

        let dag = Self {
            graph,
            name_to_index,
        };
        dag.check_acyclic()?;
        Ok(dag)
    }

    fn check_acyclic(&self) -> Result<()> {
        for component in tarjan_scc(&self.graph) {
            let cyclic = component.len() > 1
                || component
                    .first()
                    .is_some_and(|&idx| self.graph.contains_edge(idx, idx));
            if cyclic {
                let mut members: Vec<String> = component
                    .iter()
                    .map(|&idx| self.graph[idx].to_string())
                    .collect();
                members.sort();
                return Err(ConfigError::CyclicAncestry { members });
            }
        }
        Ok(())
    }

    /// Builders without a parent, in name order.
    pub fn roots(&self) -> Vec<&BuilderName> {
        let mut roots: Vec<&BuilderName> = self
            .graph
            .node_indices()
            .filter(|&idx| {
                self.graph
                    .neighbors_directed(idx, Direction::Incoming)
                    .next()
                    .is_none()
            })
            .map(|idx| &self.graph[idx])
            .collect();
        roots.sort();
        roots
    }

    /// Direct children of a builder, in name order.
    pub fn children(&self, name: &str) -> Vec<&BuilderName> {
        let mut children: Vec<&BuilderName> = self
            .name_to_index
            .get(name)
            .map(|&idx| {
                self.graph
                    .neighbors_directed(idx, Direction::Outgoing)
                    .map(|n| &self.graph[n])
                    .collect()
            })
            .unwrap_or_default();
        children.sort();
        children
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_core::definition::BuilderDefinition;
    use pretty_assertions::assert_eq;

    fn set(edges: &[(&str, Option<&str>)]) -> DefinitionSet {
        edges
            .iter()
            .map(|(name, parent)| {
                let def = BuilderDefinition::new(*name);
                match parent {
                    Some(p) => def.with_parent(*p),
                    None => def,
                }
            })
            .collect()
    }

    fn names(list: Vec<&BuilderName>) -> Vec<&str> {
        list.into_iter().map(|n| n.as_str()).collect()
    }

    #[test]
    fn test_tree_shape() {
        let graph = AncestryGraph::build(&set(&[
            ("cpp", None),
            ("cpp-cuda", Some("cpp")),
            ("python", Some("cpp")),
            ("python-cuda", Some("python")),
            ("js", None),
        ]))
        .unwrap();

        assert_eq!(graph.len(), 5);
        assert_eq!(names(graph.roots()), vec!["cpp", "js"]);
        assert_eq!(names(graph.children("cpp")), vec!["cpp-cuda", "python"]);
        assert!(graph.children("js").is_empty());
        assert!(graph.children("missing").is_empty());
        assert_eq!(names(graph.children("python")), vec!["python-cuda"]);
    }

    #[test]
    fn test_unknown_parent() {
        let err = AncestryGraph::build(&set(&[("a", Some("ghost"))])).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::UnknownParent { ref definition, ref parent } if definition == "a" && parent == "ghost"
        ));
    }

    #[test]
    fn test_cycle_lists_members() {
        let err = AncestryGraph::build(&set(&[
            ("a", Some("c")),
            ("b", Some("a")),
            ("c", Some("b")),
            ("d", None),
        ]))
        .unwrap_err();
        match err {
            ConfigError::CyclicAncestry { members } => assert_eq!(members, vec!["a", "b", "c"]),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_self_parent_is_a_cycle() {
        let err = AncestryGraph::build(&set(&[("a", Some("a"))])).unwrap_err();
        assert!(matches!(err, ConfigError::CyclicAncestry { .. }));
    }
}
