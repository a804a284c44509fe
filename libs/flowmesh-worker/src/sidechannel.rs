use flowmesh_core::{Frame, FrameData, Metadata};
use serde_json::json;

/// The `_filter` frame: one per tick, carrying the logical frame ID (§4.5).
pub fn filter_frame(frame_id: i64) -> Frame {
    let mut data = FrameData::new();
    data.insert("id".into(), json!(frame_id));
    Frame::data_only(Metadata::now(Some(frame_id)), data)
}

/// One `metrics_interval` sample (§4.5). Keys always present, matching the
/// §8 invariant on `_metrics` frame keys.
pub struct MetricsSample {
    pub ts: f64,
    pub fps: f64,
    pub cpu: f32,
    pub mem: u64,
    pub lat_in: f64,
    pub lat_out: f64,
    pub uptime_count: u64,
    pub frame_count: u64,
    pub megapx_count: f64,
}

/// Builds the `_metrics` frame, merging in the filter's `extra_metrics` (§6).
pub fn metrics_frame(sample: &MetricsSample, extra: &FrameData) -> Frame {
    let mut data = FrameData::new();
    data.insert("ts".into(), json!(sample.ts));
    data.insert("fps".into(), json!(sample.fps));
    data.insert("cpu".into(), json!(sample.cpu));
    data.insert("mem".into(), json!(sample.mem));
    data.insert("lat_in".into(), json!(sample.lat_in));
    data.insert("lat_out".into(), json!(sample.lat_out));
    data.insert("uptime_count".into(), json!(sample.uptime_count));
    data.insert("frame_count".into(), json!(sample.frame_count));
    data.insert("megapx_count".into(), json!(sample.megapx_count));
    for (k, v) in extra {
        data.insert(k.clone(), v.clone());
    }
    Frame::data_only(Metadata::now(None), data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_frame_always_carries_the_required_keys() {
        let sample = MetricsSample {
            ts: 1.0,
            fps: 30.0,
            cpu: 12.5,
            mem: 1024,
            lat_in: 0.01,
            lat_out: 0.02,
            uptime_count: 5,
            frame_count: 5,
            megapx_count: 1.5,
        };
        let frame = metrics_frame(&sample, &FrameData::new());
        for key in ["ts", "fps", "cpu", "mem", "lat_in", "lat_out", "uptime_count", "frame_count", "megapx_count"] {
            assert!(frame.data().contains_key(key), "missing key {key}");
        }
    }

    #[test]
    fn filter_frame_id_round_trips_into_metadata() {
        let frame = filter_frame(42);
        assert_eq!(frame.metadata().id, Some(42));
        assert_eq!(frame.data()["id"], json!(42));
    }
}
