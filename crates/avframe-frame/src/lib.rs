#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// Source adapter contract and the in-memory adapter.
pub mod adapter;

/// Turning a frame uri into a frame.
pub mod assembler;

/// Parallel batch runs and frame sinks.
pub mod batch;

/// Camera records and the projection of points and cuboids into pixels.
pub mod camera;

/// Serde configuration for the assembler, batches and adapters.
pub mod config;

/// Error types for frame assembly.
pub mod error;

/// The frame record and its binary encoding.
pub mod frame;

/// Per-segment sample indexes.
pub mod index;

/// Adapter reading a dataset directory described by a `manifest.json`.
pub mod manifest;

/// Typed records served by source adapters.
pub mod records;

/// Aggregated statistics over assembled frames.
pub mod stats;

/// Frame throughput counter.
pub mod thruput;

/// Frame uris.
pub mod uri;

pub use crate::adapter::{AdapterError, InMemoryAdapter, SourceAdapter};
pub use crate::assembler::FrameAssembler;
pub use crate::camera::{CameraError, CameraImage, ProjectedPoint};
pub use crate::error::FrameError;
pub use crate::frame::Frame;
pub use crate::uri::{FrameUri, UriError, Viewport};
