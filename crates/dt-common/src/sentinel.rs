//! Sentinel strings for facts that could not be resolved.
//!
//! Absence of a fact is an expected outcome, not an error. Consumers
//! compare against these constants rather than checking for errors.

/// Fact exists in principle but no source produced a value.
pub const UNKNOWN: &str = "Unknown";

/// The device lacks the capability entirely (e.g. DRM scheme missing).
pub const NOT_SUPPORTED: &str = "Not Supported";

/// No active network link.
pub const NOT_CONNECTED: &str = "Not Connected";

/// No root manager present.
pub const NONE: &str = "None";

/// Returns true when `value` is one of the unavailable sentinels or blank.
pub fn is_unavailable(value: &str) -> bool {
    let v = value.trim();
    v.is_empty() || v == UNKNOWN || v == NOT_SUPPORTED || v == NOT_CONNECTED
}

/// Returns `value` trimmed, or [`UNKNOWN`] when it is blank.
pub fn or_unknown(value: impl AsRef<str>) -> String {
    let v = value.as_ref().trim();
    if v.is_empty() {
        UNKNOWN.to_string()
    } else {
        v.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_and_sentinels_are_unavailable() {
        assert!(is_unavailable(""));
        assert!(is_unavailable("  "));
        assert!(is_unavailable(UNKNOWN));
        assert!(is_unavailable(NOT_SUPPORTED));
        assert!(!is_unavailable("schedutil"));
    }

    #[test]
    fn or_unknown_trims() {
        assert_eq!(or_unknown("  Pixel 7 \n"), "Pixel 7");
        assert_eq!(or_unknown(""), UNKNOWN);
    }
}
