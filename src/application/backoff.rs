//! Retry, backoff, and adaptive chunk sizing policy
//!
//! Pure functions so the transfer loop's failure handling is testable
//! without a transport.

use std::time::Duration;

/// Retries per network call before the failure surfaces.
pub const MAX_RETRIES: u32 = 3;

/// Base delay for exponential backoff.
pub const BASE_DELAY_MS: u64 = 300;

/// Bounded per-request timeout; a call exceeding it is aborted and retried.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Floor for adaptive chunk shrinking.
pub const MIN_CHUNK_BYTES: u64 = 8192;

/// How a retryable call failed, for chunk adaptation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Timed out or was aborted mid-flight.
    Timeout,
    /// Server error or connection failure.
    Transient,
}

/// Delay before retry `attempt` (0-based): 300ms, 600ms, 1200ms, ...
pub fn next_delay(attempt: u32) -> Duration {
    Duration::from_millis(BASE_DELAY_MS.saturating_mul(1u64 << attempt.min(16)))
}

/// Chunk size for the next attempt. Repeated timeouts on a flaky or
/// bandwidth-constrained link halve the chunk down to the floor; plain
/// transient failures keep the current size. A configured size already at
/// or under the floor is left alone.
pub fn next_chunk_size(current: u64, failure: FailureKind) -> u64 {
    match failure {
        FailureKind::Timeout if current > MIN_CHUNK_BYTES => (current / 2).max(MIN_CHUNK_BYTES),
        _ => current,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_doubles_per_attempt() {
        assert_eq!(next_delay(0), Duration::from_millis(300));
        assert_eq!(next_delay(1), Duration::from_millis(600));
        assert_eq!(next_delay(2), Duration::from_millis(1200));
    }

    #[test]
    fn delay_does_not_overflow_on_large_attempts() {
        let d = next_delay(u32::MAX);
        assert!(d >= next_delay(16));
    }

    #[test]
    fn timeout_halves_chunk_to_floor() {
        assert_eq!(next_chunk_size(32768, FailureKind::Timeout), 16384);
        assert_eq!(next_chunk_size(16384, FailureKind::Timeout), 8192);
        assert_eq!(next_chunk_size(8192, FailureKind::Timeout), 8192);
        assert_eq!(next_chunk_size(10000, FailureKind::Timeout), 8192);
    }

    #[test]
    fn transient_keeps_chunk() {
        assert_eq!(next_chunk_size(32768, FailureKind::Transient), 32768);
    }

    #[test]
    fn chunk_under_the_floor_is_left_alone() {
        assert_eq!(next_chunk_size(1024, FailureKind::Timeout), 1024);
        assert_eq!(next_chunk_size(MIN_CHUNK_BYTES, FailureKind::Timeout), MIN_CHUNK_BYTES);
    }
}
