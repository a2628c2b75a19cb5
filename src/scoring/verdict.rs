use serde::{Deserialize, Serialize};

use crate::scoring::bbox::{BoundingBox, ImageDimensions};

/// Centre-point containment: the predicted box's centre lies inside the
/// closed ground-truth rectangle.
pub fn hit(predicted: &BoundingBox, ground_truth: &BoundingBox) -> bool {
    let (px, py) = predicted.center();
    (ground_truth.x1..=ground_truth.x2).contains(&px) && (ground_truth.y1..=ground_truth.y2).contains(&py)
}

/// Boundary-inclusive axis-aligned intersection test. Boxes that only touch
/// along an edge count as overlapping.
pub fn overlap(a: &BoundingBox, b: &BoundingBox) -> bool {
    if a.x2 < b.x1 || b.x2 < a.x1 {
        return false;
    }
    if a.y2 < b.y1 || b.y2 < a.y1 {
        return false;
    }
    true
}

/// Four-field hit/overlap verdict for one sample, stored as 0/1 integers.
///
/// Only one prediction is ever produced per sample, so the `_topk` fields
/// always mirror their `_top1` counterparts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Verdict {
    #[serde(default, with = "flag")]
    pub hit_top1: bool,
    #[serde(default, with = "flag")]
    pub overlap_top1: bool,
    #[serde(default, with = "flag")]
    pub hit_topk: bool,
    #[serde(default, with = "flag")]
    pub overlap_topk: bool,
}

impl Verdict {
    /// All four flags cleared.
    pub fn failed() -> Self {
        Self::default()
    }

    /// Score two normalized boxes. A missing box on either side fails closed.
    pub fn from_boxes(predicted: Option<&BoundingBox>, ground_truth: Option<&BoundingBox>) -> Self {
        let (Some(pred), Some(gt)) = (predicted, ground_truth) else {
            return Self::failed();
        };
        let hit_top1 = hit(pred, gt);
        let overlap_top1 = overlap(pred, gt);
        Self {
            hit_top1,
            overlap_top1,
            hit_topk: hit_top1,
            overlap_topk: overlap_top1,
        }
    }

    /// A bad case is any sample where at least one flag is not set.
    pub fn is_bad_case(&self) -> bool {
        !(self.hit_top1 && self.overlap_top1 && self.hit_topk && self.overlap_topk)
    }
}

/// Score raw coordinate lists of unknown space.
///
/// The ground truth is always normalized; the prediction only when it has
/// exactly four values. Anything malformed counts as missing.
pub fn score(predicted: Option<&[f64]>, ground_truth: Option<&[f64]>, dims: ImageDimensions) -> Verdict {
    let gt = ground_truth
        .and_then(BoundingBox::from_slice)
        .map(|b| b.normalized(dims));
    let pred = predicted
        .and_then(BoundingBox::from_slice)
        .map(|b| b.normalized(dims));
    Verdict::from_boxes(pred.as_ref(), gt.as_ref())
}

/// Booleans on disk are the integers 0 and 1. On read only the integer 1
/// (or `true`) sets the flag.
mod flag {
    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawFlag {
        Int(i64),
        Float(f64),
        Bool(bool),
        Other(serde::de::IgnoredAny),
    }

    pub fn serialize<S: Serializer>(value: &bool, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(u8::from(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
        Ok(match RawFlag::deserialize(deserializer)? {
            RawFlag::Int(i) => i == 1,
            RawFlag::Float(f) => f == 1.0,
            RawFlag::Bool(b) => b,
            RawFlag::Other(_) => false,
        })
    }
}
