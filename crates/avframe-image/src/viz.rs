pub use ::image::RgbImage;

use ::image::Rgb;

use crate::{bbox::BBox, error::ImageError, image::ImageSize};

/// A stable color for a category label.
///
/// The label is hashed with 64-bit FNV-1a so that the same category gets the
/// same color across runs and machines.
pub fn category_color(category_name: &str) -> [u8; 3] {
    let hash = category_name
        .bytes()
        .fold(0xcbf2_9ce4_8422_2325u64, |h, b| {
            (h ^ b as u64).wrapping_mul(0x0000_0100_0000_01b3)
        });
    // keep colors away from black so boxes stay readable on dark scenes
    let channel = |shift: u32| 64 + ((hash >> shift) & 0xff) as u8 % 192;
    [channel(0), channel(8), channel(16)]
}

/// Decode JPEG or PNG bytes into an RGB image.
pub fn decode_rgb(bytes: &[u8]) -> Result<RgbImage, ImageError> {
    Ok(::image::load_from_memory(bytes)?.to_rgb8())
}

/// Encode an RGB image as PNG bytes.
pub fn encode_png(img: &RgbImage) -> Result<Vec<u8>, ImageError> {
    let mut buffer = std::io::Cursor::new(Vec::new());
    img.write_to(&mut buffer, ::image::ImageFormat::Png)?;
    Ok(buffer.into_inner())
}

/// Draw the border of `bbox` into `img` with the given thickness.
///
/// The image must have the size the box was clipped to.
pub fn draw_bbox(
    img: &mut RgbImage,
    bbox: &BBox,
    color: [u8; 3],
    thickness: u32,
) -> Result<(), ImageError> {
    let actual = ImageSize {
        width: img.width() as usize,
        height: img.height() as usize,
    };
    if actual != bbox.image_size() {
        return Err(ImageError::SizeMismatch {
            expected: bbox.image_size(),
            actual,
        });
    }
    if bbox.is_empty() {
        return Ok(());
    }

    let (w, h) = img.dimensions();
    let x0 = bbox.x().floor() as u32;
    let y0 = bbox.y().floor() as u32;
    // extents are exclusive
    let x1 = (bbox.x2().ceil() as u32).saturating_sub(1).min(w - 1);
    let y1 = (bbox.y2().ceil() as u32).saturating_sub(1).min(h - 1);

    let color = Rgb(color);
    for t in 0..thickness {
        let (xx0, yy0) = (x0.saturating_add(t), y0.saturating_add(t));
        let (xx1, yy1) = (x1.saturating_sub(t), y1.saturating_sub(t));
        if xx0 > xx1 || yy0 > yy1 {
            break;
        }
        for x in xx0..=xx1 {
            img.put_pixel(x, yy0, color);
            img.put_pixel(x, yy1, color);
        }
        for y in yy0..=yy1 {
            img.put_pixel(xx0, y, color);
            img.put_pixel(xx1, y, color);
        }
    }
    Ok(())
}

/// Decode a camera image and draw every visible box with its category color.
pub fn debug_overlay(
    image_bytes: &[u8],
    bboxes: &[BBox],
    thickness: u32,
) -> Result<RgbImage, ImageError> {
    let mut img = decode_rgb(image_bytes)?;
    for bbox in bboxes.iter().filter(|b| b.is_visible()) {
        draw_bbox(&mut img, bbox, category_color(bbox.category_name()), thickness)?;
    }
    Ok(img)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_color_is_stable() {
        assert_eq!(category_color("vehicle.car"), category_color("vehicle.car"));
        assert_ne!(category_color("vehicle.car"), category_color("human.pedestrian"));
        assert!(category_color("").iter().all(|&c| c >= 64));
    }

    #[test]
    fn test_draw_bbox() -> Result<(), ImageError> {
        let mut img = RgbImage::new(20, 10);
        let size = ImageSize {
            width: 20,
            height: 10,
        };
        let bbox = BBox::new(2.0, 2.0, 5.0, 4.0, size);
        draw_bbox(&mut img, &bbox, [255, 0, 0], 1)?;
        assert_eq!(img.get_pixel(2, 2), &Rgb([255, 0, 0]));
        assert_eq!(img.get_pixel(6, 5), &Rgb([255, 0, 0]));
        // interior untouched
        assert_eq!(img.get_pixel(4, 3), &Rgb([0, 0, 0]));

        let wrong = BBox::new(0.0, 0.0, 5.0, 5.0, ImageSize { width: 8, height: 8 });
        assert!(matches!(
            draw_bbox(&mut img, &wrong, [0, 255, 0], 1),
            Err(ImageError::SizeMismatch { .. })
        ));
        Ok(())
    }

    #[test]
    fn test_overlay_roundtrip_png() -> Result<(), ImageError> {
        let img = RgbImage::new(16, 16);
        let png = encode_png(&img)?;
        let size = ImageSize {
            width: 16,
            height: 16,
        };
        let boxes = vec![
            BBox::new(1.0, 1.0, 8.0, 8.0, size).with_category("car"),
            BBox::new(4.0, 4.0, 4.0, 4.0, size).into_invisible(),
        ];
        let overlay = debug_overlay(&png, &boxes, 1)?;
        let color = category_color("car");
        assert_eq!(overlay.get_pixel(1, 1), &Rgb(color));
        Ok(())
    }
}
