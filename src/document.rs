//! Document descriptor built from the container metadata tree

use crate::error::{CziError, Result};
use crate::metadata::MetadataNode;
use crate::types::Channel;
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Locations of the image information block, tried in order
const IMAGE_SECTIONS: &[&str] = &[
    "ImageDocument.Metadata.Information.Image",
    "Metadata.Information.Image",
    "Information.Image",
];

/// Locations of the metadata root, tried in order
const METADATA_ROOTS: &[&str] = &["ImageDocument.Metadata", "Metadata", ""];

/// Descriptor of one opened container. Depth and channels apply to every scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub path: PathBuf,
    pub channels: Vec<Channel>,
    pub depth: usize,
    /// Scene count declared by the metadata; 1 when not declared
    pub scene_count_hint: usize,
    pub name: Option<String>,
    /// Acquisition timestamp as written in the metadata
    pub acquisition_date: Option<String>,
}

impl Document {
    /// Acquisition timestamp, when it parses as RFC 3339
    pub fn acquired_at(&self) -> Option<DateTime<FixedOffset>> {
        self.acquisition_date
            .as_deref()
            .and_then(|s| DateTime::parse_from_rfc3339(s.trim()).ok())
    }
}

/// Builds a [`Document`] from a metadata tree, tolerating schema variants
pub struct MetadataInterpreter;

impl MetadataInterpreter {
    pub fn interpret(path: &Path, tree: &MetadataNode) -> Result<Document> {
        let image = first_present(tree, IMAGE_SECTIONS);
        let root = first_present(tree, METADATA_ROOTS);

        let channels = Self::channels(image, root)?;
        let depth = Self::depth(image)?;
        let scene_count_hint = Self::scene_count_hint(image);

        let name = root
            .at("Information.Document.Name")
            .as_str()
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        let acquisition_date = image
            .get("AcquisitionDateAndTime")
            .as_str()
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        let document = Document {
            path: path.to_path_buf(),
            channels,
            depth,
            scene_count_hint,
            name,
            acquisition_date,
        };

        info!(
            name = document.name.as_deref().unwrap_or("<unnamed>"),
            acquired = document.acquisition_date.as_deref().unwrap_or("<unknown>"),
            channels = document.channels.len(),
            depth = document.depth,
            "Interpreted metadata for {}",
            path.display()
        );
        if document.acquisition_date.is_some() && document.acquired_at().is_none() {
            debug!("Acquisition date is not RFC 3339, keeping it verbatim");
        }

        Ok(document)
    }

    fn channels(image: &MetadataNode, root: &MetadataNode) -> Result<Vec<Channel>> {
        let mut entries = image.at("Dimensions.Channels.Channel").items();
        if entries.is_empty() {
            entries = root.at("DisplaySetting.Channels.Channel").items();
        }
        if entries.is_empty() {
            return Err(CziError::malformed("channel list is absent or empty"));
        }

        Ok(entries
            .into_iter()
            .enumerate()
            .map(|(index, entry)| Channel {
                index,
                name: Self::channel_name(index, entry),
            })
            .collect())
    }

    fn channel_name(index: usize, entry: &MetadataNode) -> String {
        let declared = ["@Name", "Name", "@Id"]
            .iter()
            .filter_map(|key| entry.get(key).as_str())
            .map(str::trim)
            .find(|s| !s.is_empty());
        match declared {
            Some(name) => name.to_string(),
            None => {
                let fallback = format!("C{index}");
                warn!("Channel {index} has no name, using {fallback}");
                fallback
            }
        }
    }

    fn depth(image: &MetadataNode) -> Result<usize> {
        let node = image.get("SizeZ");
        if node.is_absent() {
            return Err(CziError::malformed("SizeZ is absent"));
        }
        match node.as_i64() {
            Some(depth) if depth > 0 => Ok(depth as usize),
            Some(depth) => Err(CziError::malformed(format!(
                "SizeZ must be positive, got {depth}"
            ))),
            None => Err(CziError::malformed(format!(
                "SizeZ is not an integer: {:?}",
                node.as_str().unwrap_or_default()
            ))),
        }
    }

    fn scene_count_hint(image: &MetadataNode) -> usize {
        let node = image.get("SizeS");
        if node.is_absent() {
            info!("SizeS not declared, assuming a single scene");
            return 1;
        }
        match node.as_i64() {
            Some(count) if count > 0 => count as usize,
            _ => {
                warn!(
                    "Ignoring unusable SizeS {:?}, assuming a single scene",
                    node.as_str().unwrap_or_default()
                );
                1
            }
        }
    }
}

fn first_present<'a>(tree: &'a MetadataNode, paths: &[&str]) -> &'a MetadataNode {
    paths
        .iter()
        .map(|path| tree.at(path))
        .find(|node| !node.is_absent())
        .unwrap_or(MetadataNode::absent())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel(name: &str) -> MetadataNode {
        MetadataNode::mapping().with_field("@Name", MetadataNode::scalar(name))
    }

    fn tree(image: MetadataNode) -> MetadataNode {
        MetadataNode::mapping().with_field(
            "ImageDocument",
            MetadataNode::mapping().with_field(
                "Metadata",
                MetadataNode::mapping().with_field(
                    "Information",
                    MetadataNode::mapping().with_field("Image", image),
                ),
            ),
        )
    }

    fn image(channels: &[&str], size_z: Option<&str>, size_s: Option<&str>) -> MetadataNode {
        let mut list = MetadataNode::mapping();
        for name in channels {
            list.push_field("Channel", channel(name));
        }
        let mut image = MetadataNode::mapping().with_field(
            "Dimensions",
            MetadataNode::mapping().with_field("Channels", list),
        );
        if let Some(z) = size_z {
            image.push_field("SizeZ", MetadataNode::scalar(z));
        }
        if let Some(s) = size_s {
            image.push_field("SizeS", MetadataNode::scalar(s));
        }
        image
    }

    #[test]
    fn test_channel_index_is_position() {
        let names = ["Zeta", "Alpha", "Mu"];
        let doc = MetadataInterpreter::interpret(
            Path::new("a.czi"),
            &tree(image(&names, Some("5"), Some("2"))),
        )
        .unwrap();

        assert_eq!(doc.depth, 5);
        assert_eq!(doc.scene_count_hint, 2);
        for (i, channel) in doc.channels.iter().enumerate() {
            assert_eq!(channel.index, i);
            assert_eq!(channel.name, names[i]);
        }
    }

    #[test]
    fn test_single_channel_entry() {
        let doc = MetadataInterpreter::interpret(
            Path::new("a.czi"),
            &tree(image(&["DAPI"], Some("1"), None)),
        )
        .unwrap();
        assert_eq!(doc.channels.len(), 1);
        assert_eq!(doc.channels[0].name, "DAPI");
    }

    #[test]
    fn test_scene_hint_defaults_to_one() {
        let doc = MetadataInterpreter::interpret(
            Path::new("a.czi"),
            &tree(image(&["A", "B"], Some("3"), None)),
        )
        .unwrap();
        assert_eq!(doc.scene_count_hint, 1);

        let doc = MetadataInterpreter::interpret(
            Path::new("a.czi"),
            &tree(image(&["A"], Some("3"), Some("many"))),
        )
        .unwrap();
        assert_eq!(doc.scene_count_hint, 1);
    }

    #[test]
    fn test_missing_channels_is_malformed() {
        let err = MetadataInterpreter::interpret(
            Path::new("a.czi"),
            &tree(image(&[], Some("3"), None)),
        )
        .unwrap_err();
        assert!(matches!(err, CziError::MalformedMetadata(_)));
    }

    #[test]
    fn test_bad_depth_is_malformed() {
        for size_z in [None, Some("three"), Some("0"), Some("2.5")] {
            let err = MetadataInterpreter::interpret(
                Path::new("a.czi"),
                &tree(image(&["A"], size_z, None)),
            )
            .unwrap_err();
            assert!(matches!(err, CziError::MalformedMetadata(_)), "{size_z:?}");
        }
    }

    #[test]
    fn test_channel_name_fallbacks() {
        let mut list = MetadataNode::mapping();
        list.push_field(
            "Channel",
            MetadataNode::mapping().with_field("@Id", MetadataNode::scalar("Channel:0")),
        );
        list.push_field("Channel", MetadataNode::mapping());
        let image = MetadataNode::mapping()
            .with_field(
                "Dimensions",
                MetadataNode::mapping().with_field("Channels", list),
            )
            .with_field("SizeZ", MetadataNode::scalar("1"));

        let doc = MetadataInterpreter::interpret(Path::new("a.czi"), &tree(image)).unwrap();
        assert_eq!(doc.channels[0].name, "Channel:0");
        assert_eq!(doc.channels[1].name, "C1");
    }

    #[test]
    fn test_headless_layout_and_extras() {
        let image = image(&["GFP"], Some("2"), None).with_field(
            "AcquisitionDateAndTime",
            MetadataNode::scalar("2025-05-16T10:12:34.1234567Z"),
        );
        let headless = MetadataNode::mapping().with_field(
            "Metadata",
            MetadataNode::mapping().with_field(
                "Information",
                MetadataNode::mapping()
                    .with_field("Image", image)
                    .with_field(
                        "Document",
                        MetadataNode::mapping()
                            .with_field("Name", MetadataNode::scalar("CCDN1_TX-02")),
                    ),
            ),
        );

        let doc = MetadataInterpreter::interpret(Path::new("b.czi"), &headless).unwrap();
        assert_eq!(doc.channels[0].name, "GFP");
        assert_eq!(doc.name.as_deref(), Some("CCDN1_TX-02"));
        assert!(doc.acquired_at().is_some());
    }
}
