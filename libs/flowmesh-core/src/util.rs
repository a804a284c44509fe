/// Wall-clock send time in seconds, as used by `meta.ts` (§3).
pub fn now_secs() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

pub fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

/// Resolve a dot-notation path in a frame's data map, e.g. `"quote.bid"`.
/// Used by `MetricSpec::value_fn` implementations and by `_metrics`
/// `extra_metrics` merging.
pub fn resolve_path<'a>(value: &'a serde_json::Value, path: &str) -> Option<&'a serde_json::Value> {
    let mut current = value;
    for segment in path.split('.') {
        current = current.get(segment)?;
    }
    Some(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn resolves_nested_path() {
        let v = json!({"quote": {"bid": 1.5}});
        assert_eq!(resolve_path(&v, "quote.bid"), Some(&json!(1.5)));
        assert_eq!(resolve_path(&v, "quote.ask"), None);
    }
}
