use crate::data::Progress;

/// Fraction of `expected` covered by `received`, clamped to `[0, 1]`.
///
/// An expected size of zero reads as complete.
///
/// # Examples
///
/// ```
/// use progress_fetch::core::byte_fraction;
///
/// assert_eq!(byte_fraction(50, 200), 0.25);
/// assert_eq!(byte_fraction(300, 200), 1.0);
/// assert_eq!(byte_fraction(0, 0), 1.0);
/// ```
pub fn byte_fraction(received: u64, expected: u64) -> f64 {
    if expected == 0 {
        return 1.0;
    }
    (received as f64 / expected as f64).clamp(0.0, 1.0)
}

/// Contribution of an in-flight fetch to its aggregate unit.
///
/// Unknown sizes contribute nothing until the fetch terminates.
pub fn unit_fraction(progress: &Progress) -> f64 {
    progress.fraction().unwrap_or(0.0)
}
