use avframe_3d::Transform;

use crate::{camera::CameraImage, error::FrameError, uri::FrameUri};

/// The unit of output: one uri with its ego pose and camera images.
#[derive(Debug, Clone, PartialEq, bincode::Encode, bincode::Decode)]
pub struct Frame {
    /// The uri the frame was assembled for.
    pub uri: FrameUri,
    /// Maps world-frame points into the ego frame.
    pub world_to_ego: Transform,
    /// Camera images in request order.
    pub camera_images: Vec<CameraImage>,
}

impl Frame {
    /// Encode the frame with bincode's standard configuration.
    pub fn to_bytes(&self) -> Result<Vec<u8>, FrameError> {
        Ok(bincode::encode_to_vec(self, bincode::config::standard())?)
    }

    /// Decode a frame produced by [`Frame::to_bytes`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, FrameError> {
        let (frame, _) = bincode::decode_from_slice(bytes, bincode::config::standard())?;
        Ok(frame)
    }
}
