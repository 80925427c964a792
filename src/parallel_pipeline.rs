// THEORY:
// The parallel pipeline runs exactly the same per-frame work as `pipeline`, but
// fans it out over a pool of workers. Frame computations share no mutable state:
// each depends only on its own file and the set-wide crop. The only ordering
// constraint is the barrier after black-bar detection; once the crop is known
// every frame of the set is submitted at once. Routing (pass 2) only needs a
// frame's own light map, so it is a separate parallel stage.
//
// A single dispatcher hands tasks round-robin to the workers. Each worker
// moves the CPU-bound work onto the blocking thread pool and answers on the
// task's oneshot channel. Results are collected in submission order, so the
// reports list frames in the same sorted order as the sequential pipeline.

use crate::core_modules::black_bars::CropOffsets;
use crate::core_modules::light_direction::Direction;
use crate::error::{PaletteError, Result};
use crate::pipeline::{
    BatchReport, ClassificationReport, FrameOutcome, FrameSet, FrameSetReport, LightmapEntry,
    PalettePipeline, frame_id,
};
use futures::future::join_all;
use std::path::{Path, PathBuf};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

pub enum FrameTask {
    Summarize {
        set_id: String,
        dir: PathBuf,
        frame: PathBuf,
        crop: Option<CropOffsets>,
        result_sender: oneshot::Sender<FrameOutcome>,
    },
    Route {
        set_id: String,
        set_dir: PathBuf,
        entry: LightmapEntry,
        buckets_root: PathBuf,
        result_sender: oneshot::Sender<Result<Direction>>,
    },
}

pub struct WorkerPool {
    task_sender: mpsc::UnboundedSender<FrameTask>,
    workers: Vec<tokio::task::JoinHandle<()>>,
}

impl WorkerPool {
    pub fn new(pipeline: PalettePipeline, worker_count: usize) -> Self {
        let worker_count = worker_count.max(1);
        let (task_sender, mut task_receiver) = mpsc::unbounded_channel::<FrameTask>();
        let mut workers = Vec::with_capacity(worker_count);

        let (worker_senders, worker_receivers): (Vec<_>, Vec<_>) = (0..worker_count)
            .map(|_| mpsc::unbounded_channel::<FrameTask>())
            .unzip();

        // Spawn dispatcher
        tokio::spawn(async move {
            let mut worker_idx = 0;
            while let Some(task) = task_receiver.recv().await {
                let _ = worker_senders[worker_idx].send(task);
                worker_idx = (worker_idx + 1) % worker_count;
            }
        });

        // Spawn workers
        for (worker_id, mut worker_receiver) in worker_receivers.into_iter().enumerate() {
            let worker_pipeline = pipeline.clone();
            let worker = tokio::spawn(async move {
                while let Some(task) = worker_receiver.recv().await {
                    Self::run_task(worker_id, &worker_pipeline, task).await;
                }
            });
            workers.push(worker);
        }

        Self {
            task_sender,
            workers,
        }
    }

    async fn run_task(worker_id: usize, pipeline: &PalettePipeline, task: FrameTask) {
        match task {
            FrameTask::Summarize {
                set_id,
                dir,
                frame,
                crop,
                result_sender,
            } => {
                let pipeline = pipeline.clone();
                let id = frame_id(&frame);
                debug!(worker = worker_id, set = %set_id, frame = %id, "summarizing");
                let outcome = tokio::task::spawn_blocking(move || {
                    pipeline.process_frame(&set_id, &dir, &frame, crop)
                })
                .await
                .unwrap_or_else(|err| FrameOutcome::Failed(PaletteError::WorkerPool(err.to_string())));
                let _ = result_sender.send(outcome);
            }
            FrameTask::Route {
                set_id,
                set_dir,
                entry,
                buckets_root,
                result_sender,
            } => {
                let pipeline = pipeline.clone();
                let result = tokio::task::spawn_blocking(move || {
                    pipeline.route_frame(&set_id, &set_dir, &entry, &buckets_root)
                })
                .await
                .unwrap_or_else(|err| Err(PaletteError::WorkerPool(err.to_string())));
                let _ = result_sender.send(result);
            }
        }
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    pub async fn summarize(
        &self,
        set_id: String,
        dir: PathBuf,
        frame: PathBuf,
        crop: Option<CropOffsets>,
    ) -> FrameOutcome {
        let (result_sender, result_receiver) = oneshot::channel();
        let task = FrameTask::Summarize {
            set_id,
            dir,
            frame,
            crop,
            result_sender,
        };

        if self.task_sender.send(task).is_err() {
            return FrameOutcome::Failed(PaletteError::WorkerPool(
                "Failed to send task to worker pool".to_string(),
            ));
        }
        result_receiver.await.unwrap_or_else(|_| {
            FrameOutcome::Failed(PaletteError::WorkerPool(
                "Failed to receive result from worker".to_string(),
            ))
        })
    }

    pub async fn route(
        &self,
        set_id: String,
        set_dir: PathBuf,
        entry: LightmapEntry,
        buckets_root: PathBuf,
    ) -> Result<Direction> {
        let (result_sender, result_receiver) = oneshot::channel();
        let task = FrameTask::Route {
            set_id,
            set_dir,
            entry,
            buckets_root,
            result_sender,
        };

        self.task_sender
            .send(task)
            .map_err(|_| PaletteError::WorkerPool("Failed to send task to worker pool".to_string()))?;
        result_receiver
            .await
            .map_err(|_| PaletteError::WorkerPool("Failed to receive result from worker".to_string()))?
    }
}

pub struct ParallelPipeline {
    pipeline: PalettePipeline,
    worker_pool: WorkerPool,
}

impl ParallelPipeline {
    /// Must be called from within a tokio runtime.
    pub fn new(pipeline: PalettePipeline) -> Self {
        let worker_count = pipeline.config().worker_count();
        let worker_pool = WorkerPool::new(pipeline.clone(), worker_count);
        info!(workers = worker_count, "worker pool started");
        Self {
            pipeline,
            worker_pool,
        }
    }

    pub fn pipeline(&self) -> &PalettePipeline {
        &self.pipeline
    }

    pub fn worker_count(&self) -> usize {
        self.worker_pool.worker_count()
    }

    /// Pass 1 over a FrameSet: detection first, then every frame in parallel.
    pub async fn process_frame_set(&self, dir: &Path) -> Result<FrameSetReport> {
        let pipeline = self.pipeline.clone();
        let owned_dir = dir.to_path_buf();
        let (set, crop) = tokio::task::spawn_blocking(move || -> Result<_> {
            let set = FrameSet::open(&owned_dir)?;
            if set.is_empty() {
                return Ok((set, None));
            }
            let crop = pipeline.prepare_set(&set)?;
            Ok((set, crop))
        })
        .await
        .map_err(|err| PaletteError::WorkerPool(err.to_string()))??;

        if set.is_empty() {
            warn!(set = %set.id, dir = %dir.display(), "no frames found, nothing to do");
            return Ok(FrameSetReport::new(set.id, None));
        }

        let outcomes = join_all(set.frames.iter().map(|frame| {
            self.worker_pool
                .summarize(set.id.clone(), set.dir.clone(), frame.clone(), crop)
        }))
        .await;

        let mut report = FrameSetReport::new(set.id.clone(), crop);
        for (frame, outcome) in set.frames.iter().zip(outcomes) {
            report.record(frame_id(frame), outcome);
        }
        info!(
            set = %report.set_id,
            summarized = report.summarized.len(),
            skipped = report.skipped_existing.len(),
            failed = report.failed.len(),
            "frame set summarized"
        );
        Ok(report)
    }

    /// Pass 2 over a set directory, every light map routed in parallel.
    pub async fn classify_frame_set(&self, set_dir: &Path, buckets_root: &Path) -> Result<ClassificationReport> {
        let entries = self.pipeline.list_lightmaps(set_dir)?;
        let set_id = set_dir
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        let results = join_all(entries.iter().map(|entry| {
            self.worker_pool.route(
                set_id.clone(),
                set_dir.to_path_buf(),
                entry.clone(),
                buckets_root.to_path_buf(),
            )
        }))
        .await;

        let mut report = ClassificationReport::new(set_id.clone());
        for (entry, result) in entries.into_iter().zip(results) {
            if let Err(err) = &result {
                warn!(set = %set_id, frame = %entry.frame_id, error = %err, "could not route palette");
            }
            report.record(entry.frame_id, result);
        }
        info!(set = %set_id, routed = report.routed.len(), failed = report.failed.len(), "frame set classified");
        Ok(report)
    }

    /// Pass 2 over every FrameSet under `root`, sets routed concurrently.
    pub async fn classify_root(&self, root: &Path, buckets_root: &Path) -> Result<Vec<ClassificationReport>> {
        let sets = self.pipeline.list_frame_sets(root)?;
        let results = join_all(
            sets.iter()
                .map(|set_dir| self.classify_frame_set(set_dir, buckets_root)),
        )
        .await;

        let mut reports = Vec::with_capacity(results.len());
        for (set_dir, result) in sets.iter().zip(results) {
            match result {
                Ok(report) => reports.push(report),
                Err(err) => error!(set = %set_dir.display(), error = %err, "classification failed for set"),
            }
        }
        Ok(reports)
    }

    /// Both passes over every FrameSet under `root`, sets processed concurrently.
    pub async fn process_batch(&self, root: &Path) -> Result<BatchReport> {
        let mut batch = BatchReport::default();
        let sets = self.pipeline.list_frame_sets(root)?;
        if sets.is_empty() {
            warn!(root = %root.display(), "no frame sets found");
            return Ok(batch);
        }

        let results = join_all(sets.iter().map(|set_dir| self.process_frame_set(set_dir))).await;
        for (set_dir, result) in sets.iter().zip(results) {
            let set_id = set_dir
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();
            match result {
                Ok(report) => batch.sets.push(report),
                Err(err) => {
                    error!(set = %set_id, error = %err, "abandoning frame set");
                    batch.failed_sets.push((set_id, err.to_string()));
                }
            }
        }

        let buckets_root = self.pipeline.buckets_root(root);
        let classified = join_all(
            batch
                .sets
                .iter()
                .map(|report| self.classify_frame_set_owned(root.join(&report.set_id), buckets_root.clone())),
        )
        .await;
        for result in classified {
            match result {
                Ok(report) => batch.classification.push(report),
                Err(err) => error!(error = %err, "classification failed for set"),
            }
        }
        Ok(batch)
    }

    async fn classify_frame_set_owned(&self, set_dir: PathBuf, buckets_root: PathBuf) -> Result<ClassificationReport> {
        self.classify_frame_set(&set_dir, &buckets_root).await
    }
}
