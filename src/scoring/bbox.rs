use serde::{Deserialize, Serialize};

/// Axis-aligned box `[x1, y1, x2, y2]`, either in pixels or normalized to 0.0–1.0.
///
/// Serialized as a plain four-element array, matching the predictions file.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 4]", into = "[f64; 4]")]
pub struct BoundingBox {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl BoundingBox {
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Build a box from a raw coordinate list. Anything but exactly four values is rejected.
    pub fn from_slice(values: &[f64]) -> Option<Self> {
        match values {
            [x1, y1, x2, y2] => Some(Self::new(*x1, *y1, *x2, *y2)),
            _ => None,
        }
    }

    pub fn center(&self) -> (f64, f64) {
        ((self.x1 + self.x2) / 2.0, (self.y1 + self.y2) / 2.0)
    }

    /// True when every coordinate lies in the closed interval [0, 1].
    pub fn is_unit_range(&self) -> bool {
        [self.x1, self.y1, self.x2, self.y2]
            .iter()
            .all(|v| (0.0..=1.0).contains(v))
    }

    /// Divide pixel coordinates by the image size. No clamping.
    pub fn pixel_to_normalized(&self, dims: ImageDimensions) -> Self {
        let (w, h) = (dims.width as f64, dims.height as f64);
        Self::new(self.x1 / w, self.y1 / h, self.x2 / w, self.y2 / h)
    }

    /// Bring a box of unknown coordinate space into normalized space.
    ///
    /// A box whose four values already fall in [0, 1] is assumed to be
    /// normalized and returned unchanged; anything else is treated as pixels.
    /// Known limitation: a genuine pixel box hugging the origin (e.g.
    /// `[0, 0, 1, 1]`) is misread as normalized. Callers that know their
    /// input is in pixels should use [`BoundingBox::pixel_to_normalized`].
    pub fn normalized(&self, dims: ImageDimensions) -> Self {
        if self.is_unit_range() {
            *self
        } else {
            self.pixel_to_normalized(dims)
        }
    }

    /// Scale a normalized box back to a pixel rectangle clamped to the image,
    /// with corners reordered so that `x1 <= x2` and `y1 <= y2`.
    pub fn to_pixel_rect(&self, dims: ImageDimensions) -> (i32, i32, i32, i32) {
        let (w, h) = (dims.width as f64, dims.height as f64);
        let (lx, hx) = (self.x1.min(self.x2), self.x1.max(self.x2));
        let (ly, hy) = (self.y1.min(self.y2), self.y1.max(self.y2));
        let x1 = (lx * w).clamp(0.0, w).round() as i32;
        let y1 = (ly * h).clamp(0.0, h).round() as i32;
        let x2 = (hx * w).clamp(0.0, w).round() as i32;
        let y2 = (hy * h).clamp(0.0, h).round() as i32;
        (x1, y1, x2, y2)
    }
}

impl From<[f64; 4]> for BoundingBox {
    fn from(v: [f64; 4]) -> Self {
        Self::new(v[0], v[1], v[2], v[3])
    }
}

impl From<BoundingBox> for [f64; 4] {
    fn from(b: BoundingBox) -> Self {
        [b.x1, b.y1, b.x2, b.y2]
    }
}

/// Image size in pixels, serialized as `[width, height]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "[u32; 2]", into = "[u32; 2]")]
pub struct ImageDimensions {
    pub width: u32,
    pub height: u32,
}

impl ImageDimensions {
    /// Both sides must be positive.
    pub fn new(width: u32, height: u32) -> Option<Self> {
        (width > 0 && height > 0).then_some(Self { width, height })
    }
}

impl From<[u32; 2]> for ImageDimensions {
    fn from(v: [u32; 2]) -> Self {
        Self { width: v[0], height: v[1] }
    }
}

impl From<ImageDimensions> for [u32; 2] {
    fn from(d: ImageDimensions) -> Self {
        [d.width, d.height]
    }
}

/// Serde adapter for optional boxes in the predictions file.
///
/// `None` is written as `[]`. On read, any array that is not exactly four
/// numbers, `null`, or a non-array placeholder such as `"N/A"` becomes `None`.
pub mod optional_box {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use super::BoundingBox;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawBox {
        Values(Vec<f64>),
        Other(serde::de::IgnoredAny),
    }

    pub fn serialize<S: Serializer>(value: &Option<BoundingBox>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(b) => b.serialize(serializer),
            None => Vec::<f64>::new().serialize(serializer),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<BoundingBox>, D::Error> {
        Ok(match RawBox::deserialize(deserializer)? {
            RawBox::Values(v) => BoundingBox::from_slice(&v),
            RawBox::Other(_) => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dims(w: u32, h: u32) -> ImageDimensions {
        ImageDimensions::new(w, h).unwrap()
    }

    fn assert_close(a: BoundingBox, b: BoundingBox) {
        let (a, b): ([f64; 4], [f64; 4]) = (a.into(), b.into());
        for (x, y) in a.iter().zip(b.iter()) {
            assert!((x - y).abs() < 1e-4, "{a:?} != {b:?}");
        }
    }

    #[test]
    fn pixel_box_is_divided_by_image_size() {
        let b = BoundingBox::new(100.0, 50.0, 200.0, 150.0).normalized(dims(400, 300));
        assert_close(b, BoundingBox::new(0.25, 0.1667, 0.5, 0.5));
    }

    #[test]
    fn normalization_is_idempotent() {
        let d = dims(1920, 1080);
        let once = BoundingBox::new(12.0, 40.0, 300.0, 90.0).normalized(d);
        assert_eq!(once.normalized(d), once);

        let already = BoundingBox::new(0.1, 0.2, 0.3, 0.4);
        assert_eq!(already.normalized(d), already);
    }

    #[test]
    fn out_of_range_results_are_not_clamped() {
        let b = BoundingBox::new(-10.0, 0.0, 500.0, 100.0).normalized(dims(400, 100));
        assert_close(b, BoundingBox::new(-0.025, 0.0, 1.25, 1.0));
    }

    #[test]
    fn tiny_pixel_box_near_origin_is_taken_as_normalized() {
        let b = BoundingBox::new(0.0, 0.0, 1.0, 1.0);
        assert_eq!(b.normalized(dims(800, 600)), b);
        assert_close(
            b.pixel_to_normalized(dims(800, 600)),
            BoundingBox::new(0.0, 0.0, 1.0 / 800.0, 1.0 / 600.0),
        );
    }

    #[test]
    fn from_slice_requires_four_values() {
        assert!(BoundingBox::from_slice(&[]).is_none());
        assert!(BoundingBox::from_slice(&[1.0, 2.0, 3.0]).is_none());
        assert!(BoundingBox::from_slice(&[1.0, 2.0, 3.0, 4.0, 5.0]).is_none());
        assert_eq!(
            BoundingBox::from_slice(&[1.0, 2.0, 3.0, 4.0]),
            Some(BoundingBox::new(1.0, 2.0, 3.0, 4.0))
        );
    }

    #[test]
    fn pixel_rect_is_clamped_and_ordered() {
        let rect = BoundingBox::new(0.9, 1.2, -0.1, 0.5).to_pixel_rect(dims(100, 200));
        assert_eq!(rect, (0, 100, 90, 200));
    }

    #[test]
    fn zero_sized_image_is_rejected() {
        assert!(ImageDimensions::new(0, 10).is_none());
        assert!(ImageDimensions::new(10, 0).is_none());
    }

    #[derive(Serialize, Deserialize)]
    struct Holder {
        #[serde(default, with = "optional_box")]
        bbox: Option<BoundingBox>,
    }

    #[test]
    fn optional_box_wire_format() {
        let none = serde_json::to_string(&Holder { bbox: None }).unwrap();
        assert_eq!(none, r#"{"bbox":[]}"#);

        let some = serde_json::to_string(&Holder { bbox: Some(BoundingBox::new(0.5, 0.25, 1.0, 1.0)) }).unwrap();
        assert_eq!(some, r#"{"bbox":[0.5,0.25,1.0,1.0]}"#);

        for raw in [r#"{"bbox":[1,2,3]}"#, r#"{"bbox":"N/A"}"#, r#"{"bbox":null}"#, r#"{}"#] {
            let h: Holder = serde_json::from_str(raw).unwrap();
            assert!(h.bbox.is_none(), "{raw}");
        }

        let h: Holder = serde_json::from_str(r#"{"bbox":[10,20,30,40]}"#).unwrap();
        assert_eq!(h.bbox, Some(BoundingBox::new(10.0, 20.0, 30.0, 40.0)));
    }
}
