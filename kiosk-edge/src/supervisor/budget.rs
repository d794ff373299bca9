//! Restart rate limiting

use std::time::Duration;
use tokio::time::Instant;

/// Spacing guard for one kind of restart
///
/// A restart may be issued only when none was issued in the last
/// `min_interval`. Granting resets the timer and bumps the count; the count
/// is never reset.
#[derive(Debug, Clone)]
pub struct RestartBudget {
    last_restart: Option<Instant>,
    min_interval: Duration,
    count: u32,
}

impl RestartBudget {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            last_restart: None,
            min_interval,
            count: 0,
        }
    }

    /// Claim a restart at `now`. Returns false while the previous one is
    /// still inside the interval.
    pub fn try_acquire(&mut self, now: Instant) -> bool {
        if let Some(last) = self.last_restart
            && now.duration_since(last) < self.min_interval
        {
            return false;
        }
        self.last_restart = Some(now);
        self.count += 1;
        true
    }

    /// Restarts granted so far
    pub fn count(&self) -> u32 {
        self.count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_spacing_invariant() {
        let interval = Duration::from_secs(300);
        let mut budget = RestartBudget::new(interval);
        let mut granted = Vec::new();

        // One request per second for half an hour
        for _ in 0..1800 {
            let now = Instant::now();
            if budget.try_acquire(now) {
                granted.push(now);
            }
            tokio::time::advance(Duration::from_secs(1)).await;
        }

        assert_eq!(granted.len(), 6);
        assert_eq!(budget.count(), 6);
        for pair in granted.windows(2) {
            assert!(pair[1] - pair[0] >= interval);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_restart_is_free() {
        let mut budget = RestartBudget::new(Duration::from_secs(60));
        assert!(budget.try_acquire(Instant::now()));
        assert!(!budget.try_acquire(Instant::now()));
        assert_eq!(budget.count(), 1);
    }
}
