//! Engine data structures: GPU resource wrappers and the scene they form.
//!
//! - `buffer` and `texture` own device resources and their descriptor indices
//! - `mesh` and `material` are the per-surface pieces of a model
//! - `scene_graph` is the node tree that places meshes
//! - `model` ties them together and uploads parsed models

pub mod buffer;
pub mod material;
pub mod mesh;
pub mod model;
pub mod scene_graph;
pub mod texture;
