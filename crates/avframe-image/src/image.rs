/// Image size in pixels
///
/// # Examples
///
/// ```
/// use avframe_image::ImageSize;
///
/// let image_size = ImageSize {
///   width: 1600,
///   height: 900,
/// };
///
/// assert_eq!(image_size.width, 1600);
/// assert_eq!(image_size.height, 900);
/// ```
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    Hash,
    serde::Serialize,
    serde::Deserialize,
    bincode::Encode,
    bincode::Decode,
)]
pub struct ImageSize {
    /// Width of the image in pixels
    pub width: usize,
    /// Height of the image in pixels
    pub height: usize,
}

impl ImageSize {
    /// Whether the pixel coordinate lies in `[0, width) x [0, height)`.
    #[inline]
    pub fn contains(&self, u: f64, v: f64) -> bool {
        u >= 0.0 && v >= 0.0 && u < self.width as f64 && v < self.height as f64
    }
}

impl std::fmt::Display for ImageSize {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "ImageSize {{ width: {}, height: {} }}",
            self.width, self.height
        )
    }
}

impl From<[usize; 2]> for ImageSize {
    fn from(size: [usize; 2]) -> Self {
        ImageSize {
            width: size[0],
            height: size[1],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contains() {
        let size = ImageSize::from([100, 50]);
        assert!(size.contains(0.0, 0.0));
        assert!(size.contains(99.9, 49.9));
        assert!(!size.contains(100.0, 10.0));
        assert!(!size.contains(10.0, -0.1));
        assert!(!size.contains(f64::NAN, 1.0));
        assert_eq!(size.to_string(), "ImageSize { width: 100, height: 50 }");
    }
}
