#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// Oriented 3D boxes annotating tracked objects.
pub mod cuboid;

/// Readers for raw lidar sweeps.
pub mod io;

/// Linear algebra utilities.
pub mod linalg;

/// Small geometric operations on 3D points.
pub mod ops;

/// Sensor point clouds tagged with their coordinate frame.
pub mod pointcloud;

/// Rigid 3D transforms.
pub mod transforms;

pub use crate::cuboid::{Cuboid, CuboidSize};
pub use crate::pointcloud::{CoordFrame, PointCloud, PointCloudError};
pub use crate::transforms::{Transform, TransformError};
