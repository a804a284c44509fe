use crate::error::TelemetryError;

/// Domain inferred from a metric name's substrings, checked in this order
/// (§4.7 SUPPLEMENT "Histogram bucket domain table"). `frame` is checked
/// before the generic fallback, matching the source's special case.
fn infer_domain(name: &str) -> (f64, f64) {
    let lower = name.to_lowercase();
    if lower.contains("confidence") {
        (0.0, 1.0)
    } else if lower.contains("detection") {
        (0.0, 50.0)
    } else if lower.contains("frame") {
        (0.0, 100.0)
    } else if lower.contains("time") || lower.contains("latency") {
        (0.0, 10.0)
    } else if lower.contains("size") || lower.contains("ratio") {
        (0.0, 2.0)
    } else {
        (0.0, 100.0)
    }
}

/// Log-spaced histogram boundaries: `num_buckets` buckets need
/// `num_buckets - 1` strictly increasing boundaries (§8 boundary behavior).
pub fn generate_log_spaced(name: &str, num_buckets: usize) -> Result<Vec<f64>, TelemetryError> {
    if num_buckets < 2 {
        return Err(TelemetryError::TooFewBuckets(name.to_string()));
    }
    let (min_val, max_val) = infer_domain(name);
    let min_val = if min_val <= 0.0 { 0.1 } else { min_val };

    let num_boundaries = num_buckets - 1;
    let log_min = min_val.ln();
    let log_max = max_val.ln();
    let log_step = (log_max - log_min) / num_boundaries as f64;

    Ok((0..num_boundaries).map(|i| (log_min + i as f64 * log_step).exp()).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yields_n_minus_one_strictly_increasing_boundaries() {
        let b = generate_log_spaced("detection_count", 10).unwrap();
        assert_eq!(b.len(), 9);
        for pair in b.windows(2) {
            assert!(pair[0] < pair[1]);
        }
    }

    #[test]
    fn rejects_fewer_than_two_buckets() {
        assert!(generate_log_spaced("x", 1).is_err());
    }

    #[test]
    fn domain_inference_checks_frame_before_fallback() {
        let confidence = generate_log_spaced("det_confidence", 3).unwrap();
        assert!(confidence[0] < 1.0);
        let frame = generate_log_spaced("frame_rate", 3).unwrap();
        assert!(frame.last().unwrap() < &100.0);
    }
}
