//! C4 — Page Poller. Repeatedly samples the live page through the CDP
//! Client and turns the resulting observations into a lazy event sequence,
//! the same `tokio::select!` + bounded-`flume`-channel shape the teacher's
//! `bg_poll::background_polling` uses for its filesystem watcher.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio_util::sync::CancellationToken;

use crate::cdp::PageSource;
use crate::differ::{self, PageSnapshot};
use crate::error::CoreError;

/// Bounded so a slow consumer applies back-pressure to the poller rather
/// than letting memory grow unbounded; overflow drops the oldest queued
/// event rather than blocking the poll loop (spec B3).
const CHANNEL_CAPACITY: usize = 16;

/// Polling below this floor is rejected in favour of it, so a misconfigured
/// near-zero interval can't turn the poller into a busy loop.
const MIN_INTERVAL: Duration = Duration::from_millis(250);

/// Settling delay before the very first capture, giving a page that just
/// navigated a moment to finish its initial paint (spec §4.4: 20-40ms).
const MIN_INITIAL_DELAY: Duration = Duration::from_millis(20);
const MAX_INITIAL_DELAY: Duration = Duration::from_millis(40);

#[derive(Debug, Clone)]
pub struct PageObservation {
    pub html: String,
    pub timestamp_ms: i64,
    /// Always `true` for the very first snapshot taken, regardless of
    /// whether any later snapshot ever differs from it (spec B2).
    pub is_initial: bool,
    /// The differ's textual report of what's new relative to the previous
    /// observation; empty for the initial snapshot.
    pub new_content: String,
}

#[derive(Debug)]
pub enum PollEvent {
    Observed(PageObservation),
    Error(CoreError),
}

/// Applies up to +/-10% jitter to `interval` so multiple pollers running
/// against the same target don't all sample in lockstep.
fn jittered(interval: Duration) -> Duration {
    let base = interval.max(MIN_INTERVAL);
    let jitter_fraction = rand::thread_rng().gen_range(-0.1..=0.1);
    let nanos = base.as_nanos() as f64 * (1.0 + jitter_fraction);
    Duration::from_nanos(nanos.max(0.0) as u64)
}

fn initial_delay() -> Duration {
    rand::thread_rng().gen_range(MIN_INITIAL_DELAY..=MAX_INITIAL_DELAY)
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

pub struct PagePoller;

impl PagePoller {
    /// Spawns the poll loop and returns the receiving end of its event
    /// channel. The loop runs for up to `duration`, always emits the
    /// initial snapshot even if nothing ever changes after it (B2), and
    /// terminates early if `cancel` fires or the CDP session closes (its
    /// calls start erroring). Dropping the receiver lets `try_send` start
    /// failing, at which point the loop drops its own oldest queued event
    /// rather than stalling.
    pub fn spawn(
        cdp: Arc<dyn PageSource>,
        interval: Duration,
        duration: Duration,
        cancel: CancellationToken,
    ) -> flume::Receiver<PollEvent> {
        let (tx, rx) = flume::bounded(CHANNEL_CAPACITY);
        let internal_rx = rx.clone();

        tokio::spawn(async move {
            let deadline = tokio::time::Instant::now() + duration;

            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(initial_delay()) => {}
            }

            let mut previous: Option<PageSnapshot> = None;

            loop {
                if tokio::time::Instant::now() >= deadline {
                    return;
                }

                let event = match cdp.extract_html().await {
                    Ok(html) => {
                        let timestamp_ms = now_ms();
                        let (changed, snapshot) = differ::observe(&html, timestamp_ms, previous.as_ref());
                        let is_initial = previous.is_none();
                        let should_emit = is_initial || changed;
                        let new_content = previous
                            .as_ref()
                            .map(|prev| differ::diff(&prev.html, &snapshot.html))
                            .unwrap_or_default();
                        previous = Some(snapshot.clone());

                        should_emit.then(|| {
                            PollEvent::Observed(PageObservation {
                                html: snapshot.html,
                                timestamp_ms,
                                is_initial,
                                new_content,
                            })
                        })
                    }
                    Err(e) => Some(PollEvent::Error(e)),
                };

                if let Some(mut event) = event {
                    loop {
                        match tx.try_send(event) {
                            Ok(()) => break,
                            Err(flume::TrySendError::Full(returned)) => {
                                let _ = internal_rx.try_recv();
                                event = returned;
                            }
                            Err(flume::TrySendError::Disconnected(_)) => return,
                        }
                    }
                }

                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = tokio::time::sleep(jittered(interval).min(
                        deadline.saturating_duration_since(tokio::time::Instant::now())
                    )) => {}
                }
            }
        });

        rx
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_floor_is_enforced() {
        let tiny = Duration::from_millis(1);
        let result = jittered(tiny);
        assert!(result >= MIN_INTERVAL.mul_f64(0.9));
    }

    #[test]
    fn jitter_stays_within_ten_percent() {
        let base = Duration::from_secs(10);
        for _ in 0..50 {
            let result = jittered(base);
            assert!(result.as_secs_f64() >= 9.0);
            assert!(result.as_secs_f64() <= 11.0);
        }
    }

    #[test]
    fn initial_delay_stays_within_bounds() {
        for _ in 0..50 {
            let d = initial_delay();
            assert!(d >= MIN_INITIAL_DELAY && d <= MAX_INITIAL_DELAY);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn b3_immediate_cancellation_emits_zero_events() {
        use crate::cdp::testing::always_ok_client;

        let cdp = always_ok_client("<html></html>");
        let cancel = CancellationToken::new();
        cancel.cancel();

        let rx = PagePoller::spawn(cdp, Duration::from_millis(500), Duration::from_secs(5), cancel);
        tokio::time::advance(Duration::from_secs(1)).await;

        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn b2_initial_snapshot_is_always_emitted() {
        use crate::cdp::testing::always_ok_client;

        let cdp = always_ok_client("<html><body>static</body></html>");
        let cancel = CancellationToken::new();

        let rx = PagePoller::spawn(cdp, Duration::from_millis(500), Duration::from_millis(600), cancel);
        tokio::time::advance(Duration::from_millis(700)).await;

        let first = rx.try_recv().expect("initial snapshot must be emitted");
        match first {
            PollEvent::Observed(obs) => assert!(obs.is_initial),
            PollEvent::Error(e) => panic!("unexpected error: {e}"),
        }
    }
}
