use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Declared pixel layout of an image payload, or the "pass-through" case.
///
/// `Jpg` bytes are never decoded by the fabric — they are carried as opaque
/// bytes end to end (§4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ColorFormat {
    Bgr,
    Rgb,
    Gray,
    Jpg,
}

/// A single image payload: declared format plus pixel (or opaque JPEG) bytes.
///
/// `bytes` is reference-counted so cloning an `Image` never copies pixel data
/// — this is what makes `Frame::clone` the "cheap shallow copy" §4.1 asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    pub format: ColorFormat,
    pub width: u32,
    pub height: u32,
    pub bytes: bytes::Bytes,
}

impl Image {
    pub fn new(format: ColorFormat, width: u32, height: u32, bytes: impl Into<bytes::Bytes>) -> Self {
        Self { format, width, height, bytes: bytes.into() }
    }
}

/// `meta.ts` / `meta.id` plus whatever else the filter attached.
///
/// `ts` is wall-clock send time in seconds; `id` is the logical frame ID used
/// by the `_filter` side channel (§4.5). Unknown keys round-trip through
/// `extra` so metadata is bit-exact across a publish/subscribe hop (§8).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Metadata {
    pub ts: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Metadata {
    pub fn now(id: Option<i64>) -> Self {
        Self { ts: crate::util::now_secs(), id, extra: Map::new() }
    }
}

/// Arbitrary output attached by the producing filter. Not interpreted by the
/// fabric itself — only by downstream filters and by `MetricSpec::value_fn`.
pub type FrameData = Map<String, Value>;

/// One topic's payload in one tick (§3 "Frame").
///
/// Frames are immutable once published; a worker may clone (cheaply, see
/// `Image`) and mutate its own copy before republishing under the same or a
/// different topic.
#[derive(Debug, Clone)]
pub struct Frame {
    image: Option<Image>,
    metadata: Metadata,
    data: FrameData,
}

impl Frame {
    pub fn new(image: Option<Image>, metadata: Metadata, data: FrameData) -> Self {
        Self { image, metadata, data }
    }

    pub fn data_only(metadata: Metadata, data: FrameData) -> Self {
        Self::new(None, metadata, data)
    }

    pub fn has_image(&self) -> bool {
        self.image.is_some()
    }

    pub fn image(&self) -> Option<&Image> {
        self.image.as_ref()
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn metadata_mut(&mut self) -> &mut Metadata {
        &mut self.metadata
    }

    pub fn data(&self) -> &FrameData {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut FrameData {
        &mut self.data
    }

    /// Envelope half that excludes the image — what a subscriber decodes
    /// even when it elects to skip the (possibly large) image blob (§4.1, §4.2).
    pub fn encode_metadata_blob(&self) -> serde_json::Result<Vec<u8>> {
        #[derive(Serialize)]
        struct Envelope<'a> {
            metadata: &'a Metadata,
            data: &'a FrameData,
        }
        serde_json::to_vec(&Envelope { metadata: &self.metadata, data: &self.data })
    }

    pub fn decode_metadata_blob(bytes: &[u8]) -> serde_json::Result<(Metadata, FrameData)> {
        #[derive(Deserialize)]
        struct Envelope {
            metadata: Metadata,
            data: FrameData,
        }
        let env: Envelope = serde_json::from_slice(bytes)?;
        Ok((env.metadata, env.data))
    }
}

/// The atomic unit delivered to `process()`: topic → frame (§3 "frame set").
///
/// `BTreeMap` keeps topic iteration order stable, which matters for
/// deterministic wire encoding and for tests that assert on frame-set
/// equality.
pub type FrameSet = BTreeMap<String, Frame>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_blob_round_trips_bit_exact() {
        let mut data = FrameData::new();
        data.insert("count".into(), Value::from(3));
        let frame = Frame::new(None, Metadata { ts: 123.5, id: Some(7), extra: Map::new() }, data);

        let blob = frame.encode_metadata_blob().unwrap();
        let (meta, data) = Frame::decode_metadata_blob(&blob).unwrap();

        assert_eq!(meta.ts, 123.5);
        assert_eq!(meta.id, Some(7));
        assert_eq!(data.get("count"), Some(&Value::from(3)));
    }

    #[test]
    fn image_clone_is_shallow() {
        let bytes = bytes::Bytes::from_static(b"pixels");
        let img = Image::new(ColorFormat::Rgb, 2, 2, bytes.clone());
        let cloned = img.clone();
        assert_eq!(img.bytes.as_ptr(), cloned.bytes.as_ptr());
    }
}
