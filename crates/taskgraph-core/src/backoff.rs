//! Capped exponential backoff with jitter.
//!
//! `min(base * 2^retries, max) * (1 +/- jitter)`.

use chrono::Duration as ChronoDuration;

/// Computes the backoff delay for the `retries`-th retry of a task.
///
/// `jitter_fraction` is applied as a uniform random multiplier in
/// `[1 - jitter_fraction, 1 + jitter_fraction]`. Pass a deterministic
/// `rand_unit` (`fastrand::f64()` in production, a fixed value in tests) so
/// the jitter itself stays testable without threading a PRNG everywhere.
pub fn compute_backoff(
    retries: i32,
    base_seconds: u64,
    cap_seconds: u64,
    jitter_fraction: f64,
    rand_unit: f64,
) -> ChronoDuration {
    let exponent = retries.max(0) as u32;
    let raw = (base_seconds as f64) * 2f64.powi(exponent as i32);
    let capped = raw.min(cap_seconds as f64);

    // rand_unit in [0, 1) maps to a jitter multiplier in
    // [1 - jitter_fraction, 1 + jitter_fraction].
    let jitter_multiplier = 1.0 - jitter_fraction + 2.0 * jitter_fraction * rand_unit;
    let jittered = (capped * jitter_multiplier).max(0.0);

    ChronoDuration::milliseconds((jittered * 1000.0).round() as i64)
}

/// Convenience wrapper that draws its own jitter from `fastrand`.
pub fn compute_backoff_with_system_jitter(
    retries: i32,
    base_seconds: u64,
    cap_seconds: u64,
    jitter_fraction: f64,
) -> ChronoDuration {
    compute_backoff(
        retries,
        base_seconds,
        cap_seconds,
        jitter_fraction,
        fastrand::f64(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grows_exponentially_before_the_cap() {
        let d0 = compute_backoff(0, 300, 3600, 0.0, 0.5);
        let d1 = compute_backoff(1, 300, 3600, 0.0, 0.5);
        let d2 = compute_backoff(2, 300, 3600, 0.0, 0.5);
        assert_eq!(d0.num_seconds(), 300);
        assert_eq!(d1.num_seconds(), 600);
        assert_eq!(d2.num_seconds(), 1200);
    }

    #[test]
    fn caps_at_the_configured_maximum() {
        let d = compute_backoff(20, 300, 3600, 0.0, 0.5);
        assert_eq!(d.num_seconds(), 3600);
    }

    #[test]
    fn jitter_stays_within_the_configured_fraction() {
        let base = 300u64;
        let low = compute_backoff(0, base, 3600, 0.2, 0.0);
        let high = compute_backoff(0, base, 3600, 0.2, 1.0);
        assert_eq!(low.num_milliseconds(), (base as f64 * 0.8 * 1000.0).round() as i64);
        assert_eq!(high.num_milliseconds(), (base as f64 * 1.2 * 1000.0).round() as i64);
    }

    #[test]
    fn never_goes_negative_even_with_large_jitter_fraction() {
        let d = compute_backoff(0, 300, 3600, 1.5, 0.0);
        assert!(d.num_milliseconds() >= 0);
    }
}
