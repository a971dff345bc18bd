#![deny(missing_docs)]
//! Image-space boxes and debug overlays for camera frames

/// Axis-aligned boxes in pixel space.
pub mod bbox;

/// Error types for the image module.
pub mod error;

/// Image size.
pub mod image;

/// Drawing boxes onto decoded camera images.
pub mod viz;

pub use crate::bbox::BBox;
pub use crate::error::ImageError;
pub use crate::image::ImageSize;
