//! Loading model files into device resources.
//!
//! - `cpu` is the GPU-free intermediate form parsers produce
//! - `parser` is the parser seam, with `gltf_parser` and `obj_parser` behind it
//! - `model_manager` runs parsing on worker threads and uploads the results

pub mod cpu;
pub mod gltf_parser;
pub mod model_manager;
pub mod obj_parser;
pub mod parser;
