//! Scene graph and hierarchical scene organization.
//!
//! Nodes live in an arena owned by [`NodeTree`]. A node's children are the
//! ids it lists, its parent is a plain back-index, and nodes can only be
//! attached under a node that already exists, so the graph is always a tree.
//! World transforms are computed on demand by walking ancestors; nothing is
//! cached.

use cgmath::{Matrix4, SquareMatrix};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Clone, Debug)]
pub struct Node {
    pub name: String,
    pub local: Matrix4<f32>,
    /// Index into the owning model's meshes.
    pub mesh: Option<usize>,
    /// Index into the owning model's materials.
    pub material: Option<usize>,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

impl Node {
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }
}

#[derive(Clone, Debug)]
pub struct NodeTree {
    nodes: Vec<Node>,
}

impl NodeTree {
    pub fn new(root_name: &str, local: Matrix4<f32>) -> Self {
        Self {
            nodes: vec![Node {
                name: root_name.to_string(),
                local,
                mesh: None,
                material: None,
                parent: None,
                children: Vec::new(),
            }],
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn add_child(&mut self, parent: NodeId, name: &str, local: Matrix4<f32>) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            name: name.to_string(),
            local,
            mesh: None,
            material: None,
            parent: Some(parent),
            children: Vec::new(),
        });
        self.nodes[parent.0].children.push(id);
        id
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Ancestor locals composed root-first with the node's own local last.
    pub fn world_transform(&self, id: NodeId) -> Matrix4<f32> {
        let mut world = self.nodes[id.0].local;
        let mut current = self.nodes[id.0].parent;
        while let Some(parent) = current {
            let node = &self.nodes[parent.0];
            world = node.local * world;
            current = node.parent;
        }
        world
    }

    /// Pre-order walk from the root, children in insertion order.
    pub fn depth_first(&self) -> DepthFirst<'_> {
        DepthFirst {
            tree: self,
            stack: vec![self.root()],
        }
    }
}

impl Default for NodeTree {
    fn default() -> Self {
        Self::new("root", Matrix4::identity())
    }
}

pub struct DepthFirst<'a> {
    tree: &'a NodeTree,
    stack: Vec<NodeId>,
}

impl Iterator for DepthFirst<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let id = self.stack.pop()?;
        self.stack
            .extend(self.tree.node(id).children.iter().rev().copied());
        Some(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cgmath::{Deg, Vector3};

    #[test]
    fn depth_first_visits_children_in_order() {
        let mut tree = NodeTree::default();
        let a = tree.add_child(tree.root(), "a", Matrix4::identity());
        let b = tree.add_child(tree.root(), "b", Matrix4::identity());
        let a1 = tree.add_child(a, "a1", Matrix4::identity());
        let order: Vec<NodeId> = tree.depth_first().collect();
        assert_eq!(order, vec![tree.root(), a, a1, b]);
    }

    #[test]
    fn parent_links_point_back() {
        let mut tree = NodeTree::default();
        let a = tree.add_child(tree.root(), "a", Matrix4::identity());
        assert_eq!(tree.node(a).parent(), Some(tree.root()));
        assert_eq!(tree.node(tree.root()).children(), &[a]);
    }

    #[test]
    fn world_transform_applies_parent_after_child() {
        let mut tree = NodeTree::new("root", Matrix4::from_translation(Vector3::new(1.0, 0.0, 0.0)));
        let child = tree.add_child(tree.root(), "child", Matrix4::from_angle_z(Deg(90.0)));
        let expected = Matrix4::from_translation(Vector3::new(1.0, 0.0, 0.0))
            * Matrix4::from_angle_z(Deg(90.0));
        assert_eq!(tree.world_transform(child), expected);
    }
}
