use image::{DynamicImage, GrayImage, imageops::FilterType};

/// Prepare a captured region for recognition: integer upscale with cubic
/// interpolation, grayscale, contrast equalization, global threshold, then
/// a small morphological closing to merge broken digit strokes.
pub fn prepare(image: &DynamicImage, scale_factor: u32, threshold: u8) -> GrayImage {
    let scale = scale_factor.max(1);
    let enlarged = image.resize_exact(
        image.width() * scale,
        image.height() * scale,
        FilterType::CatmullRom,
    );

    let gray = enlarged.to_luma8();
    let equalized = equalize_contrast(&gray);
    let binary = binarize(&equalized, threshold);
    close_2x2(&binary)
}

/// Histogram equalization over the full intensity range. Spreads the
/// timestamp overlay away from its background regardless of whether the
/// text is light-on-dark or dark-on-light.
pub fn equalize_contrast(gray: &GrayImage) -> GrayImage {
    let total = (gray.width() * gray.height()) as u64;
    if total == 0 {
        return gray.clone();
    }

    let mut histogram = [0u64; 256];
    for pixel in gray.pixels() {
        histogram[pixel.0[0] as usize] += 1;
    }

    let mut lookup = [0u8; 256];
    let mut cumulative = 0u64;
    for (level, count) in histogram.iter().enumerate() {
        cumulative += count;
        lookup[level] = ((cumulative * 255) / total) as u8;
    }

    GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
        image::Luma([lookup[gray.get_pixel(x, y).0[0] as usize]])
    })
}

/// Fixed global threshold to a 0/255 binary image.
pub fn binarize(gray: &GrayImage, threshold: u8) -> GrayImage {
    GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
        if gray.get_pixel(x, y).0[0] > threshold {
            image::Luma([255])
        } else {
            image::Luma([0])
        }
    })
}

/// Morphological closing with a 2x2 structuring element: dilate then erode.
pub fn close_2x2(binary: &GrayImage) -> GrayImage {
    erode_2x2(&dilate_2x2(binary))
}

fn dilate_2x2(binary: &GrayImage) -> GrayImage {
    GrayImage::from_fn(binary.width(), binary.height(), |x, y| {
        let mut value = 0u8;
        for dy in 0..2 {
            for dx in 0..2 {
                let nx = x.saturating_sub(dx);
                let ny = y.saturating_sub(dy);
                value = value.max(binary.get_pixel(nx, ny).0[0]);
            }
        }
        image::Luma([value])
    })
}

fn erode_2x2(binary: &GrayImage) -> GrayImage {
    GrayImage::from_fn(binary.width(), binary.height(), |x, y| {
        let mut value = 255u8;
        for dy in 0..2 {
            for dx in 0..2 {
                let nx = x.saturating_sub(dx);
                let ny = y.saturating_sub(dy);
                value = value.min(binary.get_pixel(nx, ny).0[0]);
            }
        }
        image::Luma([value])
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uniform(width: u32, height: u32, value: u8) -> GrayImage {
        GrayImage::from_pixel(width, height, image::Luma([value]))
    }

    #[test]
    fn test_prepare_scales_dimensions() {
        let source = DynamicImage::new_rgb8(100, 40);
        let prepared = prepare(&source, 3, 200);
        assert_eq!(prepared.width(), 300);
        assert_eq!(prepared.height(), 120);
    }

    #[test]
    fn test_binarize_is_two_valued() {
        let mut gray = uniform(4, 4, 50);
        gray.put_pixel(0, 0, image::Luma([250]));
        let binary = binarize(&gray, 200);
        assert_eq!(binary.get_pixel(0, 0).0[0], 255);
        assert_eq!(binary.get_pixel(1, 1).0[0], 0);
    }

    #[test]
    fn test_equalize_spreads_two_level_image() {
        let mut gray = uniform(2, 1, 100);
        gray.put_pixel(1, 0, image::Luma([101]));
        let equalized = equalize_contrast(&gray);
        let low = equalized.get_pixel(0, 0).0[0];
        let high = equalized.get_pixel(1, 0).0[0];
        assert!(high > low);
        assert_eq!(high, 255);
    }

    #[test]
    fn test_close_fills_single_pixel_gap() {
        // Two strokes separated by a one pixel gap merge after closing
        let mut binary = uniform(5, 1, 0);
        binary.put_pixel(1, 0, image::Luma([255]));
        binary.put_pixel(3, 0, image::Luma([255]));
        let closed = close_2x2(&binary);
        assert_eq!(closed.get_pixel(2, 0).0[0], 255);
    }
}
