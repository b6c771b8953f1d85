//! Node nesting derived from `composed-of` relationships.
//!
//! Shared by the diagram and annotated renderers so both agree on which
//! node sits inside which.

use std::collections::{HashMap, HashSet};

use crate::model::{Architecture, Node, RelationshipType};

#[derive(Debug, Default)]
pub struct Containment {
    parents: HashMap<String, String>,
}

impl Containment {
    /// The first `composed-of` relationship that claims a node determines its
    /// parent; later claims are ignored. A claim only counts when the container
    /// is a node of `arch`. Claims that form a cycle are cut where the walk
    /// first enters the cycle, in model order, so the cycle's first node ends
    /// up at the root.
    pub fn build(arch: &Architecture) -> Self {
        let mut claims: HashMap<&str, &str> = HashMap::new();
        for rel in &arch.relationships {
            if let RelationshipType::ComposedOf { container, nodes } = &rel.kind {
                for member in nodes {
                    claims.entry(member.as_str()).or_insert(container.as_str());
                }
            }
        }
        let claimed = |id: &str| claims.get(id).copied().filter(|p| arch.has_node(p));

        let mut children: HashMap<&str, Vec<usize>> = HashMap::new();
        for (index, node) in arch.nodes.iter().enumerate() {
            if let Some(parent) = claimed(&node.id) {
                children.entry(parent).or_default().push(index);
            }
        }

        // Real roots first, then whatever only a cycle could reach.
        let roots = arch
            .nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| claimed(&n.id).is_none())
            .map(|(i, _)| i)
            .chain(0..arch.nodes.len());

        let mut parents = HashMap::new();
        let mut visited = vec![false; arch.nodes.len()];
        for root in roots {
            let mut stack: Vec<(usize, Option<&str>)> = vec![(root, None)];
            while let Some((index, parent)) = stack.pop() {
                if visited[index] {
                    continue;
                }
                visited[index] = true;
                let id = arch.nodes[index].id.as_str();
                if let Some(parent) = parent {
                    parents.entry(id.to_string()).or_insert_with(|| parent.to_string());
                }
                if let Some(kids) = children.get(id) {
                    stack.extend(kids.iter().rev().map(|&kid| (kid, Some(id))));
                }
            }
        }
        Self { parents }
    }

    /// The container `id` is rendered inside, if any.
    pub fn parent(&self, id: &str) -> Option<&str> {
        self.parents.get(id).map(String::as_str)
    }

    /// Dot-joined chain of ancestors, root first, ending with `id` itself.
    ///
    /// `segment` maps each id to its rendered form.
    pub fn path(&self, id: &str, segment: impl Fn(&str) -> String) -> String {
        let mut chain = vec![id];
        let mut seen: HashSet<&str> = HashSet::from([id]);
        let mut current = id;
        while let Some(parent) = self.parent(current) {
            // resolved parents are acyclic, duplicate ids aside
            if !seen.insert(parent) {
                break;
            }
            chain.push(parent);
            current = parent;
        }
        chain
            .iter()
            .rev()
            .map(|s| segment(s))
            .collect::<Vec<_>>()
            .join(".")
    }

    /// Nodes in nesting order: each entry is a node with its depth.
    ///
    /// Roots come in model order and children follow their parent
    /// depth-first, so every node is visited exactly once.
    pub fn walk<'a>(&self, arch: &'a Architecture) -> Vec<Placed<'a>> {
        let mut children: HashMap<&str, Vec<usize>> = HashMap::new();
        for (index, node) in arch.nodes.iter().enumerate() {
            if let Some(parent) = self.parent(&node.id) {
                children.entry(parent).or_default().push(index);
            }
        }

        let mut walker = Walker {
            nodes: &arch.nodes,
            children,
            visited: vec![false; arch.nodes.len()],
            out: Vec::with_capacity(arch.nodes.len()),
        };
        for (index, node) in arch.nodes.iter().enumerate() {
            if self.parent(&node.id).is_none() {
                walker.visit(index, 0);
            }
        }
        // only reachable with duplicate ids
        for index in 0..arch.nodes.len() {
            walker.visit(index, 0);
        }
        walker.out
    }
}

/// A node positioned in the nesting tree.
#[derive(Debug, Clone, Copy)]
pub struct Placed<'a> {
    /// Position of the node in `Architecture::nodes`.
    pub index: usize,
    pub node: &'a Node,
    pub depth: usize,
    /// Whether the next entries (until depth drops back) are its children.
    pub has_children: bool,
}

struct Walker<'a, 'c> {
    nodes: &'a [Node],
    children: HashMap<&'c str, Vec<usize>>,
    visited: Vec<bool>,
    out: Vec<Placed<'a>>,
}

impl<'a, 'c> Walker<'a, 'c> {
    fn visit(&mut self, index: usize, depth: usize) {
        if self.visited[index] {
            return;
        }
        self.visited[index] = true;
        let nodes = self.nodes;
        let node = &nodes[index];
        let slot = self.out.len();
        self.out.push(Placed {
            index,
            node,
            depth,
            has_children: false,
        });
        let kids = self.children.get(node.id.as_str()).cloned().unwrap_or_default();
        for kid in kids {
            self.visit(kid, depth + 1);
        }
        self.out[slot].has_children = self.out.len() > slot + 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NodeType;

    fn nested() -> Architecture {
        let mut arch = Architecture::new("a", "A", "");
        arch.define_node("platform", NodeType::System, "Platform", "");
        arch.define_node("checkout", NodeType::System, "Checkout", "");
        arch.define_node("api", NodeType::Service, "API", "");
        arch.define_node("db", NodeType::Database, "DB", "");
        arch.composed_of("platform-has", "", "platform", &["checkout"]);
        arch.composed_of("checkout-has", "", "checkout", &["api", "db"]);
        arch
    }

    #[test]
    fn paths_are_root_first() {
        let arch = nested();
        let c = Containment::build(&arch);
        assert_eq!(c.path("api", str::to_string), "platform.checkout.api");
        assert_eq!(c.path("platform", str::to_string), "platform");
    }

    #[test]
    fn first_claim_wins() {
        let mut arch = nested();
        arch.composed_of("steal", "", "platform", &["api"]);
        let c = Containment::build(&arch);
        assert_eq!(c.parent("api"), Some("checkout"));
    }

    #[test]
    fn walk_visits_each_node_once_even_with_cycles() {
        let mut arch = Architecture::new("a", "A", "");
        arch.define_node("x", NodeType::System, "X", "");
        arch.define_node("y", NodeType::System, "Y", "");
        arch.define_node("z", NodeType::Service, "Z", "");
        arch.composed_of("x-y", "", "x", &["y"]);
        arch.composed_of("y-x", "", "y", &["x"]);

        let c = Containment::build(&arch);
        let order: Vec<(&str, usize)> = c
            .walk(&arch)
            .iter()
            .map(|p| (p.node.id.as_str(), p.depth))
            .collect();
        assert_eq!(order, vec![("x", 0), ("y", 1), ("z", 0)]);
        assert_eq!(c.parent("x"), None);
        assert_eq!(c.path("x", str::to_string), "x");
        assert_eq!(c.path("y", str::to_string), "x.y");
    }

    #[test]
    fn missing_container_leaves_member_at_root() {
        let mut arch = Architecture::new("a", "A", "");
        arch.define_node("api", NodeType::Service, "API", "");
        arch.composed_of("ghost-has", "", "ghost", &["api"]);
        arch.composed_of("real-has", "", "api", &["api"]);

        let c = Containment::build(&arch);
        assert_eq!(c.parent("api"), None);
        assert_eq!(c.path("api", str::to_string), "api");
        assert_eq!(c.walk(&arch).len(), 1);
    }

    #[test]
    fn walk_marks_containers() {
        let arch = nested();
        let placed = Containment::build(&arch).walk(&arch);
        let containers: Vec<&str> = placed
            .iter()
            .filter(|p| p.has_children)
            .map(|p| p.node.id.as_str())
            .collect();
        assert_eq!(containers, vec!["platform", "checkout"]);
        assert_eq!(placed.len(), 4);
    }
}
