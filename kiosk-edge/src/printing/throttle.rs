//! Minimum spacing between operations on one printer

use std::time::Duration;
use tokio::time::Instant;

/// What the next operation does to the printer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Status query
    Poll,
    /// Anything that moves paper
    Print,
}

/// Per-printer throttle
///
/// Only touched while the printer lock is held. The cooldown stored after an
/// operation applies to whatever comes next, so a print is followed by the
/// print cooldown and a poll by the shorter poll cooldown.
#[derive(Debug)]
pub struct ThrottleState {
    last_request: Option<Instant>,
    cooldown: Duration,
    print_cooldown: Duration,
    poll_cooldown: Duration,
}

impl ThrottleState {
    pub fn new(print_cooldown: Duration, poll_cooldown: Duration) -> Self {
        Self {
            last_request: None,
            cooldown: Duration::ZERO,
            print_cooldown,
            poll_cooldown,
        }
    }

    /// Sleep out the remaining cooldown, then record `op` as the latest request.
    pub async fn wait(&mut self, op: Operation) {
        if let Some(last) = self.last_request {
            let elapsed = last.elapsed();
            if elapsed < self.cooldown {
                let remaining = self.cooldown - elapsed;
                tracing::debug!(?remaining, ?op, "throttled");
                tokio::time::sleep(remaining).await;
            }
        }
        self.last_request = Some(Instant::now());
        self.cooldown = match op {
            Operation::Print => self.print_cooldown,
            Operation::Poll => self.poll_cooldown,
        };
    }

    /// Window within which a cached status is considered fresh
    pub fn poll_cooldown(&self) -> Duration {
        self.poll_cooldown
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PRINT: Duration = Duration::from_secs(4);
    const POLL: Duration = Duration::from_secs(1);

    #[tokio::test(start_paused = true)]
    async fn test_first_operation_is_immediate() {
        let mut throttle = ThrottleState::new(PRINT, POLL);
        let start = Instant::now();
        throttle.wait(Operation::Print).await;
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_print_spacing() {
        let mut throttle = ThrottleState::new(PRINT, POLL);
        let mut stamps = Vec::new();
        for _ in 0..3 {
            throttle.wait(Operation::Print).await;
            stamps.push(Instant::now());
        }
        for pair in stamps.windows(2) {
            assert!(pair[1] - pair[0] >= PRINT);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_after_print_waits_print_cooldown() {
        let mut throttle = ThrottleState::new(PRINT, POLL);
        throttle.wait(Operation::Print).await;
        let start = Instant::now();
        throttle.wait(Operation::Poll).await;
        assert!(start.elapsed() >= PRINT);

        // Polls after a poll are cheap
        let start = Instant::now();
        throttle.wait(Operation::Poll).await;
        let waited = start.elapsed();
        assert!(waited >= POLL && waited < PRINT);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_wait_once_cooldown_elapsed() {
        let mut throttle = ThrottleState::new(PRINT, POLL);
        throttle.wait(Operation::Poll).await;
        tokio::time::sleep(Duration::from_secs(2)).await;
        let start = Instant::now();
        throttle.wait(Operation::Print).await;
        assert_eq!(start.elapsed(), Duration::ZERO);
    }
}
