//! The model-file parser seam.

use std::path::Path;

use anyhow::bail;

use crate::resources::{cpu::ModelCpuData, gltf_parser::GltfParser, obj_parser::ObjParser};

/// Turns a model file into its CPU intermediate form.
///
/// Parsers run on worker threads and must not touch GPU state.
pub trait ModelParser: Send + Sync {
    fn parse(&self, path: &Path) -> anyhow::Result<ModelCpuData>;
}

/// Picks a parser from the file extension: glTF (`.gltf`, `.glb`) or Wavefront
/// OBJ (`.obj`).
#[derive(Clone, Copy, Debug, Default)]
pub struct FileModelParser;

impl ModelParser for FileModelParser {
    fn parse(&self, path: &Path) -> anyhow::Result<ModelCpuData> {
        if !path.exists() {
            bail!("{} not found", path.display());
        }
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match extension.as_deref() {
            Some("gltf") | Some("glb") => GltfParser.parse(path),
            Some("obj") => ObjParser.parse(path),
            _ => bail!("{}: unsupported model format", path.display()),
        }
    }
}
