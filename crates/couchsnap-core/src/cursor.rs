//! Sequence token helpers.
//!
//! Sequence tokens are opaque to couchsnap: they are stored, compared for
//! nothing, and handed back to the feed verbatim. The only structure we
//! rely on is the `<number>-<opaque suffix>` shape for log output.

/// Sentinel cursor meaning "from the beginning of the feed".
pub const BEGINNING: &str = "0";

/// Resolve a stored cursor into the value sent to the feed. An empty cursor
/// and the sentinel both mean "from the beginning".
pub fn resolve_since(stored: &str) -> &str {
    if stored.is_empty() {
        BEGINNING
    } else {
        stored
    }
}

/// Shorten a sequence token for log output: keep everything before the
/// first `-`. The stored token is never modified.
pub fn truncate_seq(seq: &str) -> &str {
    if seq == BEGINNING {
        return seq;
    }
    match seq.find('-') {
        Some(idx) => &seq[..idx],
        None => seq,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_since() {
        assert_eq!(resolve_since(""), "0");
        assert_eq!(resolve_since("0"), "0");
        assert_eq!(resolve_since("42-abc"), "42-abc");
    }

    #[test]
    fn test_truncate_seq_sentinel_unchanged() {
        assert_eq!(truncate_seq("0"), "0");
    }

    #[test]
    fn test_truncate_seq_strips_suffix() {
        assert_eq!(truncate_seq("512-g1AAAACbeJzLYW"), "512");
        assert_eq!(truncate_seq("7-a-b-c"), "7");
    }

    #[test]
    fn test_truncate_seq_without_suffix() {
        assert_eq!(truncate_seq("512"), "512");
    }
}
