// THEORY:
// This file is the main entry point for the `palette_vision` library crate.
// It exposes the `PalettePipeline` (sequential) and `ParallelPipeline` (tokio
// worker pool) together with their configuration, reports and error type.
//
// The analyzers under `core_modules` are public so that callers can run a single
// stage on an in-memory frame: black-bar detection, grid reduction, color
// summaries and light-direction classification. The pipelines only add the
// directory conventions, artifact naming and failure scoping on top of them.

pub mod config;
pub mod core_modules;
pub mod error;
pub mod parallel_pipeline;
pub mod pipeline;
