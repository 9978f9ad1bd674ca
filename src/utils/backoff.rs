//! Jittered exponential backoff for ledger retries.

use rand::Rng;
use std::time::Duration;

const BASE_MS: u64 = 50;
const MAX_MS: u64 = 2_000;

/// Delay before retry number `attempt` (0-based): base * 2^attempt,
/// capped, with +/-50% jitter so concurrent retries spread out.
pub fn retry_delay(attempt: u32) -> Duration {
    let exp = BASE_MS.saturating_mul(1u64 << attempt.min(10)).min(MAX_MS);
    let jitter = rand::thread_rng().gen_range(exp / 2..=exp + exp / 2);
    Duration::from_millis(jitter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_grows_and_stays_bounded() {
        for attempt in 0..12 {
            let delay = retry_delay(attempt).as_millis() as u64;
            assert!(delay >= BASE_MS / 2);
            assert!(delay <= MAX_MS + MAX_MS / 2, "attempt {} gave {}ms", attempt, delay);
        }
    }
}
