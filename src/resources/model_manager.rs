//! The two-phase model loader.
//!
//! Paths are queued first, then parsed on the blocking pool of a tokio runtime
//! (one task per path), then uploaded on the device thread once every parse
//! task has been joined:
//!
//! ```text
//! queue_model ──▶ load_queued_models_async ──▶ load_models_gpu
//!   (no I/O)        (worker threads, CPU form)   (device thread, Model)
//! ```
//!
//! A task that fails or panics yields the empty CPU form of its path and a
//! logged error; the rest of the batch is unaffected.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use cgmath::Matrix4;
use tokio::{runtime::Runtime, task::JoinHandle};

use crate::{
    context::Context,
    data_structures::model::Model,
    gpu::command::CommandList,
    resources::{
        cpu::ModelCpuData,
        parser::{FileModelParser, ModelParser},
    },
};

pub struct ModelManager {
    async_runtime: Runtime,
    parser: Arc<dyn ModelParser>,
    asset_root: PathBuf,
    queued: Vec<PathBuf>,
    pending: Vec<(PathBuf, JoinHandle<ModelCpuData>)>,
    models: Vec<Model>,
}

impl ModelManager {
    pub fn new(asset_root: impl Into<PathBuf>) -> anyhow::Result<Self> {
        Self::with_parser(asset_root, Arc::new(FileModelParser))
    }

    pub fn with_parser(
        asset_root: impl Into<PathBuf>,
        parser: Arc<dyn ModelParser>,
    ) -> anyhow::Result<Self> {
        let async_runtime = tokio::runtime::Builder::new_multi_thread()
            .thread_name("model-parser")
            .enable_all()
            .build()?;
        Ok(Self {
            async_runtime,
            parser,
            asset_root: asset_root.into(),
            queued: Vec::new(),
            pending: Vec::new(),
            models: Vec::new(),
        })
    }

    /// Remembers `path` for the next parse batch. Relative paths are resolved
    /// against the asset root; nothing is read yet.
    pub fn queue_model(&mut self, path: impl AsRef<Path>) {
        let path = path.as_ref();
        let resolved = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.asset_root.join(path)
        };
        log::debug!("queued {}", resolved.display());
        self.queued.push(resolved);
    }

    /// Starts one parse task per queued path and empties the queue.
    pub fn load_queued_models_async(&mut self) {
        for path in self.queued.drain(..) {
            let parser = Arc::clone(&self.parser);
            let task_path = path.clone();
            let handle = self.async_runtime.spawn_blocking(move || {
                match parser.parse(&task_path) {
                    Ok(model) => model,
                    Err(e) => {
                        log::error!("failed to load {}: {e:#}", task_path.display());
                        ModelCpuData::empty(task_path)
                    }
                }
            });
            self.pending.push((path, handle));
        }
    }

    /// Joins every pending parse task, then uploads each result in queue
    /// order. Returns the number of models added.
    ///
    /// Blocks until the slowest parse has finished and until the copy queue
    /// has completed the uploads.
    pub fn load_models_gpu(&mut self, ctx: &mut Context) -> anyhow::Result<usize> {
        if self.pending.is_empty() {
            return Ok(0);
        }
        let (paths, handles): (Vec<_>, Vec<_>) = self.pending.drain(..).unzip();
        let joined = self
            .async_runtime
            .block_on(futures::future::join_all(handles));

        let mut added = 0;
        for (path, result) in paths.into_iter().zip(joined) {
            let cpu = result.unwrap_or_else(|e| {
                log::error!("parse task for {} did not finish: {e}", path.display());
                ModelCpuData::empty(path)
            });
            self.models.push(Model::upload(ctx, cpu)?);
            added += 1;
        }
        Ok(added)
    }

    /// Records the draws of every loaded model. The geometry pipeline state
    /// must already be bound on `list`.
    pub fn draw_models(
        &self,
        list: &mut CommandList,
        view_proj: Matrix4<f32>,
        model_transform: Matrix4<f32>,
    ) {
        for model in &self.models {
            model.draw(list, view_proj, model_transform);
        }
    }

    pub fn models(&self) -> &[Model] {
        &self.models
    }

    pub fn queued(&self) -> &[PathBuf] {
        &self.queued
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Drains both queues and releases every model.
    pub fn clear(&mut self, ctx: &Context) -> anyhow::Result<()> {
        ctx.flush()?;
        self.models.clear();
        Ok(())
    }
}
