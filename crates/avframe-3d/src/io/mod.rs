/// Binary PCD and packed float32 lidar sweep readers.
pub mod lidar;

pub use lidar::{read_float_records, read_pcd_binary, LidarError};
