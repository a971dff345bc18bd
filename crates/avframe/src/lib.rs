#![doc = include_str!(concat!("../", env!("CARGO_PKG_README")))]

#[doc(inline)]
pub use avframe_3d as geometry;

#[doc(inline)]
pub use avframe_image as image;

#[doc(inline)]
pub use avframe_frame as frame;
