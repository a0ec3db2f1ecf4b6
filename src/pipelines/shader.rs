//! Shader compilation.

use std::path::Path;

use crate::{
    error::RenderError,
    gpu::{ShaderBlob, ShaderStage},
};

/// Produces the blob for one entry point of a shader source file.
pub trait ShaderCompiler {
    fn compile(
        &self,
        stage: ShaderStage,
        source_path: &Path,
        entry_point: &str,
    ) -> Result<ShaderBlob, RenderError>;
}

/// Loads WGSL sources. The blob is the source text itself; the device
/// compiles it when the pipeline state is created.
#[derive(Clone, Copy, Debug, Default)]
pub struct WgslCompiler;

impl ShaderCompiler for WgslCompiler {
    fn compile(
        &self,
        stage: ShaderStage,
        source_path: &Path,
        entry_point: &str,
    ) -> Result<ShaderBlob, RenderError> {
        let fail = |reason: String| RenderError::ShaderCompile {
            path: source_path.display().to_string(),
            entry_point: entry_point.to_string(),
            reason,
        };
        let source = std::fs::read_to_string(source_path).map_err(|e| fail(e.to_string()))?;
        if !declares_function(&source, entry_point) {
            return Err(fail(format!("no function named {entry_point}")));
        }
        log::debug!("loaded {stage:?} shader {}:{entry_point}", source_path.display());
        Ok(ShaderBlob {
            stage,
            source_path: source_path.to_path_buf(),
            entry_point: entry_point.to_string(),
            bytecode: source.into_bytes(),
            layout: None,
        })
    }
}

fn declares_function(source: &str, name: &str) -> bool {
    source.split("fn ").skip(1).any(|rest| {
        rest.trim_start()
            .strip_prefix(name)
            .is_some_and(|tail| tail.trim_start().starts_with('('))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_entry_points_by_name() {
        let source = "@vertex\nfn vs_main(@builtin(vertex_index) i: u32) {}\nfn vs_main_helper() {}";
        assert!(declares_function(source, "vs_main"));
        assert!(declares_function(source, "vs_main_helper"));
        assert!(!declares_function(source, "fs_main"));
        assert!(!declares_function(source, "vs"));
    }

    #[test]
    fn missing_files_are_compile_errors() {
        let err = WgslCompiler
            .compile(ShaderStage::Vertex, Path::new("does/not/exist.wgsl"), "vs_main")
            .unwrap_err();
        assert!(matches!(err, RenderError::ShaderCompile { .. }));
    }
}
