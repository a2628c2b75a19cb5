use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::{BenchError, BenchResult};

/// Coarse platform family a ScreenSpot data source belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    Desktop,
    Mobile,
    Web,
}

impl Domain {
    pub fn for_source(data_source: &str) -> Option<Self> {
        match data_source {
            "windows" | "macos" => Some(Self::Desktop),
            "ios" | "android" => Some(Self::Mobile),
            "tool" | "shop" | "gitlab" | "forum" => Some(Self::Web),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Desktop => "desktop",
            Self::Mobile => "mobile",
            Self::Web => "web",
        }
    }
}

/// One benchmark sample as listed in the dataset manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sample {
    #[serde(alias = "img_filename")]
    pub file_name: String,
    /// Image path relative to the image directory. Defaults to `file_name`.
    #[serde(default)]
    pub image: Option<PathBuf>,
    pub instruction: String,
    /// Ground truth `[x1, y1, x2, y2]`, pixel or normalized. `null` or
    /// non-numeric values read as empty and score as a missing box.
    #[serde(default, deserialize_with = "lenient_values")]
    pub bbox: Vec<f64>,
    #[serde(default)]
    pub data_type: String,
    pub data_source: String,
}

fn lenient_values<'de, D: serde::Deserializer<'de>>(deserializer: D) -> Result<Vec<f64>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawValues {
        Values(Vec<f64>),
        Other(serde::de::IgnoredAny),
    }

    Ok(match RawValues::deserialize(deserializer)? {
        RawValues::Values(v) => v,
        RawValues::Other(_) => Vec::new(),
    })
}

impl Sample {
    pub fn domain(&self) -> Option<Domain> {
        Domain::for_source(&self.data_source)
    }
}

/// A loaded manifest plus the directory its images are resolved against.
pub struct Dataset {
    image_dir: PathBuf,
    samples: Vec<Sample>,
}

impl Dataset {
    /// Read a JSON array of samples. Images resolve against `image_dir`
    /// when given, otherwise against the manifest's own directory.
    pub fn load(manifest: &Path, image_dir: Option<&Path>) -> BenchResult<Self> {
        let content = std::fs::read_to_string(manifest).map_err(|e| {
            BenchError::Dataset(format!("cannot read manifest {}: {e}", manifest.display()))
        })?;
        let samples: Vec<Sample> = serde_json::from_str(&content)
            .map_err(|e| BenchError::Dataset(format!("cannot parse manifest {}: {e}", manifest.display())))?;
        let image_dir = match image_dir {
            Some(dir) => dir.to_path_buf(),
            None => manifest.parent().map(Path::to_path_buf).unwrap_or_default(),
        };
        tracing::info!(
            manifest = %manifest.display(),
            samples = samples.len(),
            image_dir = %image_dir.display(),
            "dataset loaded"
        );
        Ok(Self { image_dir, samples })
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// First sample with this `file_name`.
    pub fn find(&self, file_name: &str) -> Option<&Sample> {
        self.samples.iter().find(|s| s.file_name == file_name)
    }

    pub fn image_path(&self, sample: &Sample) -> PathBuf {
        let rel = sample.image.as_deref().unwrap_or(Path::new(&sample.file_name));
        if rel.is_absolute() {
            rel.to_path_buf()
        } else {
            self.image_dir.join(rel)
        }
    }

    /// Raw encoded bytes of the sample's screenshot.
    pub fn read_image(&self, sample: &Sample) -> BenchResult<Vec<u8>> {
        let path = self.image_path(sample);
        std::fs::read(&path)
            .map_err(|e| BenchError::Dataset(format!("cannot read image {}: {e}", path.display())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn sources_map_to_domains() {
        assert_eq!(Domain::for_source("windows"), Some(Domain::Desktop));
        assert_eq!(Domain::for_source("macos"), Some(Domain::Desktop));
        assert_eq!(Domain::for_source("ios"), Some(Domain::Mobile));
        assert_eq!(Domain::for_source("android"), Some(Domain::Mobile));
        for web in ["tool", "shop", "gitlab", "forum"] {
            assert_eq!(Domain::for_source(web), Some(Domain::Web));
        }
        assert_eq!(Domain::for_source("linux"), None);
    }

    #[test]
    fn manifest_resolves_images_next_to_it() {
        let dir = tempdir().unwrap();
        let manifest = dir.path().join("screenspot_web.json");
        std::fs::write(
            &manifest,
            r#"[
                {"img_filename": "a.png", "instruction": "search box", "bbox": [10, 20, 30, 40],
                 "data_type": "text", "data_source": "shop"},
                {"file_name": "b.png", "image": "imgs/b.png", "instruction": "close",
                 "bbox": [0.1, 0.1, 0.2, 0.2], "data_type": "icon", "data_source": "ios"}
            ]"#,
        )
        .unwrap();

        let ds = Dataset::load(&manifest, None).unwrap();
        assert_eq!(ds.len(), 2);
        let a = &ds.samples()[0];
        assert_eq!(a.file_name, "a.png");
        assert_eq!(a.domain(), Some(Domain::Web));
        assert_eq!(ds.image_path(a), dir.path().join("a.png"));
        let b = &ds.samples()[1];
        assert_eq!(ds.image_path(b), dir.path().join("imgs/b.png"));

        let other = tempdir().unwrap();
        let ds = Dataset::load(&manifest, Some(other.path())).unwrap();
        assert_eq!(ds.image_path(&ds.samples()[0]), other.path().join("a.png"));
    }

    #[test]
    fn malformed_ground_truth_does_not_sink_the_manifest() {
        let dir = tempdir().unwrap();
        let manifest = dir.path().join("m.json");
        std::fs::write(
            &manifest,
            r#"[
                {"file_name": "a.png", "instruction": "a", "bbox": null, "data_source": "shop"},
                {"file_name": "b.png", "instruction": "b", "bbox": [1, "x", 3, 4], "data_source": "shop"},
                {"file_name": "c.png", "instruction": "c", "data_source": "shop"},
                {"file_name": "d.png", "instruction": "d", "bbox": [1, 2, 3, 4], "data_source": "shop"}
            ]"#,
        )
        .unwrap();

        let ds = Dataset::load(&manifest, None).unwrap();
        assert_eq!(ds.len(), 4);
        assert!(ds.samples()[0].bbox.is_empty());
        assert!(ds.samples()[1].bbox.is_empty());
        assert!(ds.samples()[2].bbox.is_empty());
        assert_eq!(ds.find("d.png").unwrap().bbox, vec![1.0, 2.0, 3.0, 4.0]);
        assert!(ds.find("missing.png").is_none());
    }

    #[test]
    fn unreadable_manifest_is_a_dataset_error() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("nope.json");
        assert!(matches!(Dataset::load(&missing, None), Err(BenchError::Dataset(_))));

        let broken = dir.path().join("broken.json");
        std::fs::write(&broken, "{not json").unwrap();
        assert!(matches!(Dataset::load(&broken, None), Err(BenchError::Dataset(_))));
    }
}
