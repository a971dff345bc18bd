use crate::image::ImageSize;

/// An axis-aligned box in pixel space, typically the image-space extent of an
/// annotated object.
///
/// The box is always clipped to its declared image bounds: `0 <= x`, `0 <= y`,
/// `x + width <= image_width` and `y + height <= image_height`. A box with
/// zero area is a valid, empty box and is never visible.
///
/// Geometry is stored as extents `[x1, x2) x [y1, y2)` so that clipping is
/// exact and idempotent.
#[derive(Debug, Clone, PartialEq, bincode::Encode, bincode::Decode)]
pub struct BBox {
    x1: f64,
    y1: f64,
    x2: f64,
    y2: f64,
    image_size: ImageSize,
    category_name: String,
    is_visible: bool,
    track_id: Option<String>,
}

impl BBox {
    /// Create a box from its top-left corner and size, clipped to `image_size`.
    ///
    /// # Examples
    ///
    /// ```
    /// use avframe_image::{BBox, ImageSize};
    ///
    /// let size = ImageSize { width: 100, height: 100 };
    /// let bbox = BBox::new(-10.0, 20.0, 50.0, 100.0, size);
    /// assert_eq!((bbox.x(), bbox.y(), bbox.width(), bbox.height()), (0.0, 20.0, 40.0, 60.0));
    /// ```
    pub fn new(x: f64, y: f64, width: f64, height: f64, image_size: ImageSize) -> Self {
        Self::from_extent(x, y, x + width, y + height, image_size)
    }

    /// Create a box from its corners `(x1, y1)` and `(x2, y2)`, clipped to
    /// `image_size`.
    pub fn from_extent(x1: f64, y1: f64, x2: f64, y2: f64, image_size: ImageSize) -> Self {
        Self {
            x1,
            y1,
            x2,
            y2,
            image_size,
            category_name: String::new(),
            is_visible: true,
            track_id: None,
        }
        .clip_to(image_size)
    }

    /// A box spanning the whole image.
    pub fn of_size(image_size: ImageSize) -> Self {
        Self::from_extent(
            0.0,
            0.0,
            image_size.width as f64,
            image_size.height as f64,
            image_size,
        )
    }

    /// Set the category label.
    pub fn with_category(mut self, category_name: impl Into<String>) -> Self {
        self.category_name = category_name.into();
        self
    }

    /// Link the box to a tracked object.
    pub fn with_track_id(mut self, track_id: impl Into<String>) -> Self {
        self.track_id = Some(track_id.into());
        self
    }

    /// Mark the box as not visible, keeping its geometry.
    pub fn into_invisible(mut self) -> Self {
        self.is_visible = false;
        self
    }

    /// Left edge in pixels.
    #[inline]
    pub fn x(&self) -> f64 {
        self.x1
    }

    /// Top edge in pixels.
    #[inline]
    pub fn y(&self) -> f64 {
        self.y1
    }

    /// Right edge (exclusive) in pixels.
    #[inline]
    pub fn x2(&self) -> f64 {
        self.x2
    }

    /// Bottom edge (exclusive) in pixels.
    #[inline]
    pub fn y2(&self) -> f64 {
        self.y2
    }

    /// Width in pixels.
    #[inline]
    pub fn width(&self) -> f64 {
        self.x2 - self.x1
    }

    /// Height in pixels.
    #[inline]
    pub fn height(&self) -> f64 {
        self.y2 - self.y1
    }

    /// The image bounds the box is clipped to.
    #[inline]
    pub fn image_size(&self) -> ImageSize {
        self.image_size
    }

    /// The category label.
    pub fn category_name(&self) -> &str {
        &self.category_name
    }

    /// The tracked object this box belongs to, if any.
    pub fn track_id(&self) -> Option<&str> {
        self.track_id.as_deref()
    }

    /// Whether the box should be treated as a visible object.
    #[inline]
    pub fn is_visible(&self) -> bool {
        self.is_visible
    }

    /// The box center in pixels.
    pub fn center(&self) -> [f64; 2] {
        [(self.x1 + self.x2) / 2.0, (self.y1 + self.y2) / 2.0]
    }

    /// Whether the box spans `(0, 0)-(image_width, image_height)`.
    pub fn is_full_image(&self) -> bool {
        self.x1 == 0.0
            && self.y1 == 0.0
            && self.x2 == self.image_size.width as f64
            && self.y2 == self.image_size.height as f64
    }

    /// Whether the box has zero area.
    pub fn is_empty(&self) -> bool {
        !(self.x2 > self.x1 && self.y2 > self.y1)
    }

    /// The box area, `0` for degenerate boxes.
    pub fn get_area(&self) -> f64 {
        if self.is_empty() {
            0.0
        } else {
            self.width() * self.height()
        }
    }

    /// Truncate the box to `[0, image_width] x [0, image_height]`.
    ///
    /// A box falling fully outside the image keeps a zero area and is marked
    /// not visible. Clipping is idempotent.
    pub fn clip_to(&self, image_size: ImageSize) -> BBox {
        let (w, h) = (image_size.width as f64, image_size.height as f64);

        let finite = [self.x1, self.y1, self.x2, self.y2]
            .iter()
            .all(|v| v.is_finite());
        if !finite {
            return Self {
                x1: 0.0,
                y1: 0.0,
                x2: 0.0,
                y2: 0.0,
                image_size,
                is_visible: false,
                ..self.clone()
            };
        }

        let x1 = self.x1.clamp(0.0, w);
        let y1 = self.y1.clamp(0.0, h);
        let x2 = self.x2.clamp(0.0, w).max(x1);
        let y2 = self.y2.clamp(0.0, h).max(y1);

        Self {
            x1,
            y1,
            x2,
            y2,
            image_size,
            is_visible: self.is_visible && x2 > x1 && y2 > y1,
            ..self.clone()
        }
    }

    /// The overlap of two boxes; the result keeps this box's metadata.
    ///
    /// The x-range is `[max(x1, x2), min(x1 + w1, x2 + w2))`, and likewise for
    /// y. When the boxes do not overlap the result is an empty, invisible box.
    /// Neither input is modified.
    pub fn get_intersection_with(&self, other: &BBox) -> BBox {
        let x1 = self.x1.max(other.x1);
        let y1 = self.y1.max(other.y1);
        let x2 = self.x2.min(other.x2).max(x1);
        let y2 = self.y2.min(other.y2).max(y1);

        Self {
            x1,
            y1,
            x2,
            y2,
            ..self.clone()
        }
        .clip_to(self.image_size)
    }

    /// The smallest box containing both boxes; the result keeps this box's
    /// metadata. Empty boxes do not contribute to the extent.
    pub fn get_union_with(&self, other: &BBox) -> BBox {
        if other.is_empty() {
            return self.clone();
        }
        if self.is_empty() {
            return Self {
                x1: other.x1,
                y1: other.y1,
                x2: other.x2,
                y2: other.y2,
                is_visible: true,
                ..self.clone()
            }
            .clip_to(self.image_size);
        }

        Self {
            x1: self.x1.min(other.x1),
            y1: self.y1.min(other.y1),
            x2: self.x2.max(other.x2),
            y2: self.y2.max(other.y2),
            is_visible: self.is_visible || other.is_visible,
            ..self.clone()
        }
        .clip_to(self.image_size)
    }

    /// Shift the box by `(dx, dy)` pixels and clip it to its image.
    pub fn translate(&self, dx: f64, dy: f64) -> BBox {
        Self {
            x1: self.x1 + dx,
            y1: self.y1 + dy,
            x2: self.x2 + dx,
            y2: self.y2 + dy,
            ..self.clone()
        }
        .clip_to(self.image_size)
    }

    /// Re-express the box in the pixel coordinates of `viewport`, a
    /// sub-rectangle of the same image.
    pub fn relative_to(&self, viewport: &BBox) -> BBox {
        let viewport_size = ImageSize {
            width: viewport.width().ceil() as usize,
            height: viewport.height().ceil() as usize,
        };
        let overlap = self.get_intersection_with(viewport);
        Self {
            x1: overlap.x1 - viewport.x1,
            y1: overlap.y1 - viewport.y1,
            x2: overlap.x2 - viewport.x1,
            y2: overlap.y2 - viewport.y1,
            ..overlap
        }
        .clip_to(viewport_size)
    }
}
