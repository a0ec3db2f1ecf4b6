use bindless_renderer::data_structures::scene_graph::NodeTree;
use cgmath::{Deg, Matrix4, SquareMatrix, Vector3, Vector4};

fn approx_eq(a: Matrix4<f32>, b: Matrix4<f32>) -> bool {
    let a: [[f32; 4]; 4] = a.into();
    let b: [[f32; 4]; 4] = b.into();
    a.iter()
        .flatten()
        .zip(b.iter().flatten())
        .all(|(x, y)| (x - y).abs() < 1e-5)
}

#[test]
fn three_level_chain_composes_root_first() {
    let root_local = Matrix4::from_translation(Vector3::new(5.0, 0.0, 0.0));
    let mid_local = Matrix4::from_angle_y(Deg(90.0));
    let leaf_local = Matrix4::from_nonuniform_scale(2.0, 1.0, 1.0);

    let mut tree = NodeTree::new("root", root_local);
    let mid = tree.add_child(tree.root(), "mid", mid_local);
    let leaf = tree.add_child(mid, "leaf", leaf_local);

    let expected = root_local * mid_local * leaf_local;
    assert!(approx_eq(tree.world_transform(leaf), expected));
    assert!(approx_eq(tree.world_transform(mid), root_local * mid_local));
    assert!(approx_eq(tree.world_transform(tree.root()), root_local));

    // The leaf's +x axis is scaled, turned onto -z, then moved by the root.
    let point = tree.world_transform(leaf) * Vector4::new(1.0, 0.0, 0.0, 1.0);
    let expected_point = Vector4::new(5.0, 0.0, -2.0, 1.0);
    for i in 0..4 {
        assert!((point[i] - expected_point[i]).abs() < 1e-5, "{point:?}");
    }
}

#[test]
fn changing_a_parent_moves_its_descendants() {
    let mut tree = NodeTree::default();
    let mid = tree.add_child(tree.root(), "mid", Matrix4::identity());
    let leaf = tree.add_child(mid, "leaf", Matrix4::identity());

    tree.node_mut(mid).local = Matrix4::from_translation(Vector3::new(0.0, 3.0, 0.0));
    assert_eq!(
        tree.world_transform(leaf),
        Matrix4::from_translation(Vector3::new(0.0, 3.0, 0.0))
    );
}

#[test]
fn every_node_is_reachable_once() {
    let mut tree = NodeTree::default();
    let a = tree.add_child(tree.root(), "a", Matrix4::identity());
    tree.add_child(a, "a1", Matrix4::identity());
    tree.add_child(a, "a2", Matrix4::identity());
    tree.add_child(tree.root(), "b", Matrix4::identity());

    let mut visited: Vec<usize> = tree.depth_first().map(|id| id.index()).collect();
    assert_eq!(visited.len(), tree.len());
    visited.sort_unstable();
    visited.dedup();
    assert_eq!(visited.len(), tree.len());
}
