/// Default topic name when a frame set specifier carries no explicit topic.
pub const MAIN: &str = "main";

/// Runtime metrics side channel (§4.5).
pub const METRICS: &str = "_metrics";

/// Filter-emitted logical frame-ID side channel (§4.5).
pub const FILTER: &str = "_filter";

/// Reserved topics begin with `_` (§3). They are filtered out of an ordinary
/// (non-wildcard) subscription by default and must be requested by name or
/// via `*`.
pub fn is_reserved(topic: &str) -> bool {
    topic.starts_with('_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserved_topics_start_with_underscore() {
        assert!(is_reserved(METRICS));
        assert!(is_reserved(FILTER));
        assert!(!is_reserved(MAIN));
        assert!(!is_reserved("other"));
    }
}
