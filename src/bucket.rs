// Bucket alignment: floor a timestamp to its resolution-wide slot.

/// Half-open bucket `[start, end)` in epoch milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketWindow {
    pub start: i64,
    pub end: i64,
}

impl BucketWindow {
    pub fn contains(&self, timestamp: i64) -> bool {
        timestamp >= self.start && timestamp < self.end
    }
}

/// `floor(timestamp / resolution) * resolution`, flooring toward negative infinity.
/// A non-positive resolution leaves the timestamp unchanged.
pub fn aligned_start(timestamp: i64, resolution_ms: i64) -> i64 {
    if resolution_ms <= 0 {
        return timestamp;
    }
    timestamp.div_euclid(resolution_ms) * resolution_ms
}

pub fn window_for(timestamp: i64, resolution_ms: i64) -> BucketWindow {
    let start = aligned_start(timestamp, resolution_ms);
    BucketWindow {
        start,
        end: start + resolution_ms.max(1),
    }
}

/// True when `timestamp` lies within `tolerance_ms` after a resolution boundary.
/// Absorbs scheduler jitter: a tick at 10:05:00.250 still counts as the 10:05 boundary.
pub fn is_on_boundary(timestamp: i64, resolution_ms: i64, tolerance_ms: i64) -> bool {
    if resolution_ms <= 0 {
        return false;
    }
    timestamp.rem_euclid(resolution_ms) < tolerance_ms.max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aligned_start_floors() {
        assert_eq!(aligned_start(0, 10_000), 0);
        assert_eq!(aligned_start(9_999, 10_000), 0);
        assert_eq!(aligned_start(10_000, 10_000), 10_000);
        assert_eq!(aligned_start(125_000, 60_000), 120_000);
    }

    #[test]
    fn aligned_start_negative_timestamps() {
        assert_eq!(aligned_start(-1, 10_000), -10_000);
        assert_eq!(aligned_start(-10_000, 10_000), -10_000);
    }

    #[test]
    fn window_contains_its_timestamp() {
        let resolutions = [1, 7, 1_000, 10_000, 300_000, 86_400_000];
        let timestamps = [-123_456_789, -1, 0, 1, 59_999, 1_700_000_123_456];
        for &r in &resolutions {
            for &t in &timestamps {
                let w = window_for(t, r);
                assert!(w.start <= t && t < w.start + r, "t={t} r={r}");
                assert!(w.contains(t));
                assert_eq!(w.end - w.start, r);
            }
        }
    }

    #[test]
    fn boundary_with_tolerance() {
        let five_min = 300_000;
        assert!(is_on_boundary(1_500_000, five_min, 10_000));
        assert!(is_on_boundary(1_500_250, five_min, 10_000));
        assert!(is_on_boundary(1_509_999, five_min, 10_000));
        assert!(!is_on_boundary(1_510_000, five_min, 10_000));
        assert!(!is_on_boundary(1_799_999, five_min, 10_000));
    }

    #[test]
    fn boundary_zero_resolution_is_false() {
        assert!(!is_on_boundary(0, 0, 10));
    }
}
