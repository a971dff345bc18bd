use crate::image::ImageSize;

/// An error type for the image module.
#[derive(thiserror::Error, Debug)]
pub enum ImageError {
    /// The decoded image does not have the size the boxes were computed for.
    #[error("Image size mismatch: expected {expected}, got {actual}")]
    SizeMismatch {
        /// Size declared by the boxes.
        expected: ImageSize,
        /// Size of the decoded image.
        actual: ImageSize,
    },

    /// Failed to decode or encode the image bytes.
    #[error("Failed to decode the image. {0}")]
    Codec(#[from] ::image::ImageError),
}
