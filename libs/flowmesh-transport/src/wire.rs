use bytes::{Buf, BufMut, Bytes, BytesMut};
use flowmesh_core::{ColorFormat, Frame, FrameData, FrameSet, Image, Metadata};

use crate::error::TransportError;

/// One topic's wire-level record: metadata/data blob plus an optional image
/// blob, kept separate so a subscriber can skip image decoding for topics it
/// doesn't consume (§4.1, §4.2).
#[derive(Debug, Clone)]
pub struct WireRecord {
    pub topic: String,
    pub metadata_blob: Vec<u8>,
    pub image: Option<(ColorFormat, u32, u32, Bytes)>,
}

/// A length-prefixed bundle of topic records plus the per-tick monotonically
/// increasing message ID used for join synchronization (§4.2, §4.3).
#[derive(Debug, Clone)]
pub struct WireTick {
    pub msg_id: u64,
    pub records: Vec<WireRecord>,
}

impl WireTick {
    pub fn from_frame_set(msg_id: u64, frames: &FrameSet) -> Result<Self, TransportError> {
        let mut records = Vec::with_capacity(frames.len());
        for (topic, frame) in frames {
            let metadata_blob = frame.encode_metadata_blob().map_err(TransportError::Encode)?;
            let image = frame
                .image()
                .map(|img| (img.format, img.width, img.height, img.bytes.clone()));
            records.push(WireRecord { topic: topic.clone(), metadata_blob, image });
        }
        Ok(Self { msg_id, records })
    }

    pub fn into_frame_set(self) -> Result<FrameSet, TransportError> {
        let mut out = FrameSet::new();
        for record in self.records {
            let (metadata, data): (Metadata, FrameData) =
                Frame::decode_metadata_blob(&record.metadata_blob).map_err(TransportError::Decode)?;
            let image = record
                .image
                .map(|(format, width, height, bytes)| Image::new(format, width, height, bytes));
            out.insert(record.topic, Frame::new(image, metadata, data));
        }
        Ok(out)
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::new();
        buf.put_u64(self.msg_id);
        buf.put_u32(self.records.len() as u32);
        for record in &self.records {
            let topic_bytes = record.topic.as_bytes();
            buf.put_u16(topic_bytes.len() as u16);
            buf.put_slice(topic_bytes);
            buf.put_u32(record.metadata_blob.len() as u32);
            buf.put_slice(&record.metadata_blob);
            match &record.image {
                None => buf.put_u8(0),
                Some((format, width, height, bytes)) => {
                    buf.put_u8(1);
                    buf.put_u8(color_format_tag(*format));
                    buf.put_u32(*width);
                    buf.put_u32(*height);
                    buf.put_u64(bytes.len() as u64);
                    buf.put_slice(bytes);
                }
            }
        }
        buf.freeze()
    }

    pub fn decode(mut buf: Bytes) -> Result<Self, TransportError> {
        if buf.remaining() < 12 {
            return Err(TransportError::Framing("truncated tick header".into()));
        }
        let msg_id = buf.get_u64();
        let num_records = buf.get_u32() as usize;
        let mut records = Vec::with_capacity(num_records);
        for _ in 0..num_records {
            if buf.remaining() < 2 {
                return Err(TransportError::Framing("truncated topic length".into()));
            }
            let topic_len = buf.get_u16() as usize;
            require(&buf, topic_len)?;
            let topic = String::from_utf8(buf.copy_to_bytes(topic_len).to_vec())
                .map_err(|e| TransportError::Framing(e.to_string()))?;

            require(&buf, 4)?;
            let meta_len = buf.get_u32() as usize;
            require(&buf, meta_len)?;
            let metadata_blob = buf.copy_to_bytes(meta_len).to_vec();

            require(&buf, 1)?;
            let has_image = buf.get_u8();
            let image = if has_image == 1 {
                require(&buf, 1 + 4 + 4 + 8)?;
                let format = color_format_from_tag(buf.get_u8())?;
                let width = buf.get_u32();
                let height = buf.get_u32();
                let img_len = buf.get_u64() as usize;
                require(&buf, img_len)?;
                Some((format, width, height, buf.copy_to_bytes(img_len)))
            } else {
                None
            };
            records.push(WireRecord { topic, metadata_blob, image });
        }
        Ok(Self { msg_id, records })
    }
}

fn require(buf: &Bytes, n: usize) -> Result<(), TransportError> {
    if buf.remaining() < n {
        Err(TransportError::Framing("truncated tick body".into()))
    } else {
        Ok(())
    }
}

fn color_format_tag(f: ColorFormat) -> u8 {
    match f {
        ColorFormat::Bgr => 0,
        ColorFormat::Rgb => 1,
        ColorFormat::Gray => 2,
        ColorFormat::Jpg => 3,
    }
}

fn color_format_from_tag(tag: u8) -> Result<ColorFormat, TransportError> {
    match tag {
        0 => Ok(ColorFormat::Bgr),
        1 => Ok(ColorFormat::Rgb),
        2 => Ok(ColorFormat::Gray),
        3 => Ok(ColorFormat::Jpg),
        other => Err(TransportError::Framing(format!("unknown color format tag {other}"))),
    }
}
