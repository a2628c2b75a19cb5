//! Draw ground-truth and predicted boxes onto screenshots.
//!
//! Boxes arrive in normalized coordinates and are scaled back to the pixel
//! grid of the image being drawn on, clamped to its bounds.
use std::path::Path;

use image::{DynamicImage, ImageFormat, RgbaImage};

use crate::config::RenderConfig;
use crate::errors::{BenchError, BenchResult};
use crate::scoring::{BoundingBox, ImageDimensions};

/// Colours and stroke width for the two box kinds.
#[derive(Debug, Clone)]
pub struct Annotator {
    ground_truth_colour: [u8; 4],
    prediction_colour: [u8; 4],
    thickness: i32,
}

impl Annotator {
    pub fn new(config: &RenderConfig) -> Self {
        Self {
            ground_truth_colour: config.ground_truth_colour,
            prediction_colour: config.prediction_colour,
            thickness: config.thickness.max(1),
        }
    }

    /// Copy `img` and draw whichever boxes are present; ground truth first so
    /// the prediction stays visible where they coincide.
    pub fn draw(
        &self,
        img: &DynamicImage,
        ground_truth: Option<&BoundingBox>,
        prediction: Option<&BoundingBox>,
    ) -> RgbaImage {
        let mut canvas = img.to_rgba8();
        if let Some(gt) = ground_truth {
            draw_bbox(&mut canvas, gt, self.ground_truth_colour, self.thickness);
        }
        if let Some(pred) = prediction {
            draw_bbox(&mut canvas, pred, self.prediction_colour, self.thickness);
        }
        canvas
    }
}

/// Outline one normalized box on `canvas`. The stroke grows inward from the
/// box edge; parts falling outside the image are dropped.
pub fn draw_bbox(canvas: &mut RgbaImage, bbox: &BoundingBox, col: [u8; 4], thickness: i32) {
    let (w, h) = canvas.dimensions();
    let Some(dims) = ImageDimensions::new(w, h) else {
        return;
    };
    let (x1, y1, x2, y2) = bbox.to_pixel_rect(dims);
    let t = thickness.max(1);
    let alpha = f32::from(col[3]) / 255.0;

    for y in y1.max(0)..=y2.min(h as i32 - 1) {
        let full_row = y - y1 < t || y2 - y < t;
        for x in x1.max(0)..=x2.min(w as i32 - 1) {
            if !full_row && x - x1 >= t && x2 - x >= t {
                continue;
            }
            let px = canvas.get_pixel_mut(x as u32, y as u32);
            for (channel, target) in px.0.iter_mut().zip(col).take(3) {
                *channel = (f32::from(*channel) * (1.0 - alpha) + f32::from(target) * alpha).round() as u8;
            }
            px.0[3] = 255;
        }
    }
}

/// PNG-encode a canvas in memory.
pub fn encode_png(canvas: &RgbaImage) -> BenchResult<Vec<u8>> {
    let mut out = Vec::new();
    DynamicImage::ImageRgba8(canvas.clone())
        .write_to(&mut std::io::Cursor::new(&mut out), ImageFormat::Png)
        .map_err(|e| BenchError::Render(format!("PNG encode: {e}")))?;
    Ok(out)
}

/// Save a canvas, picking the format from the file extension. Formats
/// without an alpha channel get an RGB copy.
pub fn save_canvas(canvas: &RgbaImage, path: &Path) -> BenchResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let format = ImageFormat::from_path(path)
        .map_err(|e| BenchError::Render(format!("{}: {e}", path.display())))?;
    let img = DynamicImage::ImageRgba8(canvas.clone());
    let img = match format {
        ImageFormat::Jpeg | ImageFormat::Bmp | ImageFormat::Pnm => DynamicImage::ImageRgb8(img.to_rgb8()),
        _ => img,
    };
    img.save_with_format(path, format)
        .map_err(|e| BenchError::Render(format!("save {}: {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;
    use tempfile::tempdir;

    fn white(w: u32, h: u32) -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(w, h, Rgba([255, 255, 255, 255])))
    }

    fn annotator() -> Annotator {
        Annotator::new(&RenderConfig::default())
    }

    #[test]
    fn boxes_are_drawn_in_their_colours() {
        let gt = BoundingBox::new(0.1, 0.1, 0.5, 0.5);
        let pred = BoundingBox::new(0.6, 0.6, 0.9, 0.9);
        let canvas = annotator().draw(&white(100, 100), Some(&gt), Some(&pred));

        assert_eq!(canvas.get_pixel(10, 30).0, [255, 0, 0, 255]);
        assert_eq!(canvas.get_pixel(60, 75).0, [0, 200, 0, 255]);
        // interior untouched
        assert_eq!(canvas.get_pixel(30, 30).0, [255, 255, 255, 255]);
    }

    #[test]
    fn missing_boxes_leave_the_image_alone() {
        let src = white(20, 10);
        let canvas = annotator().draw(&src, None, None);
        assert_eq!(canvas, src.to_rgba8());
    }

    #[test]
    fn out_of_range_boxes_are_clamped() {
        let mut canvas = RgbaImage::from_pixel(50, 50, Rgba([0, 0, 0, 255]));
        draw_bbox(&mut canvas, &BoundingBox::new(-0.5, -0.5, 2.0, 2.0), [0, 0, 255, 255], 1);
        assert_eq!(canvas.get_pixel(0, 25).0, [0, 0, 255, 255]);
        assert_eq!(canvas.get_pixel(25, 0).0, [0, 0, 255, 255]);
        assert_eq!(canvas.get_pixel(25, 25).0, [0, 0, 0, 255]);
    }

    #[test]
    fn thick_strokes_grow_inward_and_blend() {
        let mut canvas = RgbaImage::from_pixel(20, 20, Rgba([0, 0, 0, 255]));
        draw_bbox(&mut canvas, &BoundingBox::new(0.25, 0.25, 0.75, 0.75), [255, 255, 255, 128], 3);
        // rect (5, 5)-(15, 15), stroke covers 5..=7 and 13..=15
        let half = canvas.get_pixel(5, 10).0;
        assert_eq!(half, [128, 128, 128, 255]);
        assert_eq!(canvas.get_pixel(7, 10).0, half);
        assert_eq!(canvas.get_pixel(15, 10).0, half);
        assert_eq!(canvas.get_pixel(10, 13).0, half);
        assert_eq!(canvas.get_pixel(8, 10).0, [0, 0, 0, 255]);
        assert_eq!(canvas.get_pixel(4, 10).0, [0, 0, 0, 255]);
        assert_eq!(canvas.get_pixel(10, 10).0, [0, 0, 0, 255]);
    }

    #[test]
    fn png_and_jpeg_output() {
        let canvas = annotator().draw(&white(32, 16), Some(&BoundingBox::new(0.0, 0.0, 0.5, 0.5)), None);
        let png = encode_png(&canvas).unwrap();
        let decoded = image::load_from_memory(&png).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (32, 16));

        let dir = tempdir().unwrap();
        let jpg = dir.path().join("nested").join("shot.jpg");
        save_canvas(&canvas, &jpg).unwrap();
        assert!(jpg.exists());
    }
}
