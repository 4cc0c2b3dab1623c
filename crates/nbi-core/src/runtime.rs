//! Time and cancellation primitives shared by the polling services
//!
//! - [`Clock`]: injectable wall clock so caches and sync timestamps are testable
//! - [`CancelToken`]: cooperative cancellation for long poll loops
//! - [`Poller`]: bounded, cancellable tick sequence built on `tokio::time::interval`

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

use crate::config::PollSettings;
use crate::error::{Error, Result};

/// Source of "now" for timestamps and TTL checks
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    pub fn advance(&self, by: std::time::Duration) {
        let step = ChronoDuration::from_std(by).unwrap_or_else(|_| ChronoDuration::zero());
        if let Ok(mut now) = self.now.lock() {
            *now += step;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.now.lock().map(|now| *now).unwrap_or_else(|e| *e.into_inner())
    }
}

/// Sender half: flips every [`CancelToken`] cloned from it
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

/// Receiver half handed to poll loops
#[derive(Debug, Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

impl CancelHandle {
    pub fn new() -> (Self, CancelToken) {
        let (tx, rx) = watch::channel(false);
        (Self { tx }, CancelToken { rx })
    }

    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

impl CancelToken {
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancellation is requested. Never resolves if the handle
    /// is dropped without cancelling.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

/// Bounded sequence of poll attempts, each one interval after the previous;
/// the first also waits a full interval.
pub struct Poller {
    ticker: Interval,
    remaining: u32,
    attempt: u32,
    cancel: Option<CancelToken>,
}

impl Poller {
    pub fn new(settings: PollSettings, cancel: Option<CancelToken>) -> Self {
        let period = settings.interval.max(std::time::Duration::from_millis(1));
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self {
            ticker,
            remaining: settings.max_attempts.max(1),
            attempt: 0,
            cancel,
        }
    }

    /// Wait for the next attempt slot. `Ok(None)` when the budget is spent,
    /// `Err(Cancelled)` when the token fires first.
    pub async fn next_attempt(&mut self) -> Result<Option<u32>> {
        if self.remaining == 0 {
            return Ok(None);
        }

        match &self.cancel {
            Some(token) => {
                if token.is_cancelled() {
                    return Err(Error::Cancelled("poll loop cancelled".to_string()));
                }
                tokio::select! {
                    _ = self.ticker.tick() => {}
                    _ = token.cancelled() => {
                        return Err(Error::Cancelled("poll loop cancelled".to_string()));
                    }
                }
            }
            None => {
                self.ticker.tick().await;
            }
        }

        self.remaining -= 1;
        self.attempt += 1;
        Ok(Some(self.attempt))
    }

    pub fn attempts_made(&self) -> u32 {
        self.attempt
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_poller_is_bounded() {
        let mut poller = Poller::new(PollSettings::new(Duration::from_secs(3), 3), None);
        let start = tokio::time::Instant::now();

        let mut seen = Vec::new();
        while let Some(n) = poller.next_attempt().await.unwrap() {
            seen.push(n);
        }

        assert_eq!(seen, vec![1, 2, 3]);
        assert_eq!(poller.attempts_made(), 3);
        assert!(start.elapsed() >= Duration::from_secs(9));
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_attempt_waits_one_interval() {
        let mut poller = Poller::new(PollSettings::new(Duration::from_secs(5), 2), None);
        let start = tokio::time::Instant::now();

        assert_eq!(poller.next_attempt().await.unwrap(), Some(1));
        assert!(start.elapsed() >= Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_poller_cancel() {
        let (handle, token) = CancelHandle::new();
        let mut poller = Poller::new(PollSettings::new(Duration::from_secs(60), 10), Some(token));

        assert_eq!(poller.next_attempt().await.unwrap(), Some(1));
        handle.cancel();
        let err = poller.next_attempt().await.unwrap_err();
        assert!(matches!(err, Error::Cancelled(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_while_waiting() {
        let (handle, token) = CancelHandle::new();
        let mut poller = Poller::new(PollSettings::new(Duration::from_secs(60), 10), Some(token));
        poller.next_attempt().await.unwrap();

        let waiter = tokio::spawn(async move { poller.next_attempt().await });
        tokio::time::sleep(Duration::from_secs(1)).await;
        handle.cancel();

        let result = waiter.await.unwrap();
        assert!(matches!(result, Err(Error::Cancelled(_))));
    }

    #[test]
    fn test_manual_clock_advances() {
        let start = Utc::now();
        let clock = ManualClock::new(start);
        clock.advance(Duration::from_secs(301));
        assert_eq!((clock.now() - start).num_seconds(), 301);
    }
}
