use std::time::Duration;
use tokio::time::Instant;

/// Gate that holds indexing work back until the environment has been free
/// of user-activity signals for a threshold.
///
/// The wait is pollable: `remaining` reports how long until work may
/// start, so callers can surface "processing in N seconds".
#[derive(Debug)]
pub struct IdleGate {
    threshold: Duration,
    last_activity: Option<Instant>,
}

impl IdleGate {
    #[must_use]
    pub const fn new(threshold: Duration) -> Self {
        Self {
            threshold,
            last_activity: None,
        }
    }

    pub fn record_activity(&mut self) {
        self.last_activity = Some(Instant::now());
    }

    /// True when no activity signal has arrived within the threshold
    #[must_use]
    pub fn is_idle(&self, now: Instant) -> bool {
        self.last_activity
            .is_none_or(|last| now.duration_since(last) >= self.threshold)
    }

    /// Time until the gate opens; `None` when already idle
    #[must_use]
    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        let last = self.last_activity?;
        let ready_at = last + self.threshold;
        (ready_at > now).then(|| ready_at.duration_since(now))
    }

    /// Earliest instant at which work may start
    #[must_use]
    pub fn ready_at(&self, now: Instant) -> Instant {
        match self.remaining(now) {
            Some(wait) => now + wait,
            None => now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn idle_when_no_activity_was_ever_seen() {
        let gate = IdleGate::new(Duration::from_secs(120));
        assert!(gate.is_idle(Instant::now()));
        assert!(gate.remaining(Instant::now()).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn activity_closes_the_gate_until_threshold_passes() {
        let mut gate = IdleGate::new(Duration::from_secs(120));
        gate.record_activity();

        let now = Instant::now();
        assert!(!gate.is_idle(now));
        let wait = gate.remaining(now).unwrap();
        assert!(wait <= Duration::from_secs(120));
        assert!(wait > Duration::from_secs(119));

        tokio::time::advance(Duration::from_secs(121)).await;
        assert!(gate.is_idle(Instant::now()));
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_activity_extends_the_wait() {
        let mut gate = IdleGate::new(Duration::from_secs(10));
        gate.record_activity();
        tokio::time::advance(Duration::from_secs(8)).await;
        gate.record_activity();

        let remaining = gate.remaining(Instant::now()).unwrap();
        assert!(remaining > Duration::from_secs(9));
    }
}
