//! Exponential backoff with jitter, for client-side retries.

use rand::Rng;
use std::time::Duration;

/// Delay before retry number `attempt` (1-based): `base * 2^(attempt-1)`,
/// capped at `max_ms`, plus up to 10% jitter. Attempt 0 waits nothing.
pub fn calculate_backoff(attempt: u32, base_ms: u64, max_ms: u64) -> Duration {
    if attempt == 0 {
        return Duration::ZERO;
    }

    let factor = 2u64.saturating_pow(attempt - 1);
    let capped = base_ms.saturating_mul(factor).min(max_ms);

    let jitter_range = capped / 10;
    let jitter = if jitter_range > 0 {
        rand::thread_rng().gen_range(0..jitter_range)
    } else {
        0
    };

    Duration::from_millis(capped + jitter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubles_per_attempt() {
        let first = calculate_backoff(1, 100, 10_000).as_millis();
        let second = calculate_backoff(2, 100, 10_000).as_millis();
        let third = calculate_backoff(3, 100, 10_000).as_millis();
        assert!((100..110).contains(&first));
        assert!((200..220).contains(&second));
        assert!((400..440).contains(&third));
    }

    #[test]
    fn capped_and_zero() {
        assert_eq!(calculate_backoff(0, 100, 1000), Duration::ZERO);
        let capped = calculate_backoff(40, 100, 1000).as_millis();
        assert!((1000..1100).contains(&capped));
        assert_eq!(calculate_backoff(3, 0, 1000), Duration::ZERO);
    }
}
