//! One stream of state changes for the presenter.
//!
//! Push frames arrive on a channel fed by the daemon subscription. While the
//! current status is `analyzing`, a timer re-reads the persisted state every
//! poll interval as well, because pushes sent while the presenter was closed
//! (or lost with a dropped connection) are never replayed. Both paths update
//! the same `current` state and only surface real changes.

use factcheck_protocol::{CheckStatus, Message, PersistedState, Push};
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use super::StateSource;
use crate::error::Result;

pub struct StateFeed<S: StateSource> {
    source: S,
    pushes: Option<Receiver<Push>>,
    poll_interval: Duration,
    current: PersistedState,
    // Dropped with the feed, which closes the daemon connection.
    _subscription: Option<Box<dyn Send>>,
}

impl<S: StateSource> StateFeed<S> {
    /// Reads the initial state once. `pushes` is `None` when no subscription
    /// could be established; the feed then relies on polling alone.
    pub fn open(source: S, pushes: Option<Receiver<Push>>, poll_interval: Duration) -> Result<Self> {
        let current = source.fetch_state()?;
        Ok(Self {
            source,
            pushes,
            poll_interval,
            current,
            _subscription: None,
        })
    }

    /// Ties the lifetime of a subscription handle to this feed.
    pub fn with_subscription(mut self, subscription: impl Send + 'static) -> Self {
        self._subscription = Some(Box::new(subscription));
        self
    }

    pub fn current(&self) -> &PersistedState {
        &self.current
    }

    pub fn is_push_connected(&self) -> bool {
        self.pushes.is_some()
    }

    /// Blocks until the state changes. Returns `None` once nothing further
    /// can arrive: the push channel is gone and no check is in flight.
    pub fn next_change(&mut self) -> Option<PersistedState> {
        loop {
            let analyzing = self.current.status == CheckStatus::Analyzing;
            let received = self
                .pushes
                .as_ref()
                .map(|rx| rx.recv_timeout(self.poll_interval));

            match received {
                Some(Ok(push)) => {
                    if let Some(state) = self.on_push(push) {
                        return Some(state);
                    }
                    continue;
                }
                Some(Err(RecvTimeoutError::Timeout)) => {}
                Some(Err(RecvTimeoutError::Disconnected)) => {
                    tracing::debug!("Push channel closed; falling back to polling");
                    self.pushes = None;
                    continue;
                }
                None => {
                    if !analyzing {
                        return None;
                    }
                    thread::sleep(self.poll_interval);
                }
            }

            if analyzing {
                if let Some(state) = self.poll() {
                    return Some(state);
                }
            }
        }
    }

    fn on_push(&mut self, push: Push) -> Option<PersistedState> {
        let skips_ahead = push.request_id > self.current.request_id
            && !matches!(push.message, Message::UpdateSelectedText { .. });
        if skips_ahead {
            // Missed the announcement for this request, so the selected text
            // is unknown locally; the persisted record has it.
            if let Some(state) = self.poll() {
                return Some(state);
            }
        }

        if self.current.apply_push(&push) {
            tracing::debug!(
                request_id = push.request_id,
                action = push.message.action(),
                "Applied push"
            );
            return Some(self.current.clone());
        }
        None
    }

    fn poll(&mut self) -> Option<PersistedState> {
        let fetched = match self.source.fetch_state() {
            Ok(state) => state,
            Err(err) => {
                tracing::warn!(error = %err, "Failed to poll state");
                return None;
            }
        };

        if fetched.request_id < self.current.request_id || fetched.same_content(&self.current) {
            return None;
        }
        self.current = fetched;
        Some(self.current.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;
    use chrono::Utc;
    use factcheck_protocol::CheckResult;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;
    use std::sync::{Arc, Mutex};

    /// Returns queued states in order, repeating the last one.
    struct ScriptedSource {
        states: Mutex<VecDeque<PersistedState>>,
        fetches: AtomicUsize,
    }

    impl ScriptedSource {
        fn new(states: Vec<PersistedState>) -> Self {
            Self {
                states: Mutex::new(states.into()),
                fetches: AtomicUsize::new(0),
            }
        }
    }

    impl StateSource for &ScriptedSource {
        fn fetch_state(&self) -> Result<PersistedState> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            let mut states = self.states.lock().unwrap();
            if states.len() > 1 {
                Ok(states.pop_front().unwrap())
            } else {
                states
                    .front()
                    .cloned()
                    .ok_or_else(|| CoreError::StateUnavailable("empty script".to_string()))
            }
        }
    }

    fn analyzing(id: u64) -> PersistedState {
        PersistedState::default().analyzing(id, "claim", Utc::now())
    }

    fn completed(id: u64, pct: u64) -> PersistedState {
        let mut state = analyzing(id);
        state.complete(CheckResult::new(pct, "summary", Vec::new()), Utc::now());
        state
    }

    const FAST: Duration = Duration::from_millis(10);

    #[test]
    fn polling_reaches_terminal_state_without_pushes() {
        let source = ScriptedSource::new(vec![analyzing(1), analyzing(1), completed(1, 70)]);
        let mut feed = StateFeed::open(&source, None, FAST).unwrap();
        assert_eq!(feed.current().status, CheckStatus::Analyzing);

        let next = feed.next_change().unwrap();
        assert_eq!(next.status, CheckStatus::Completed);

        // Terminal, no subscription: the feed is finished.
        assert!(feed.next_change().is_none());
    }

    #[test]
    fn push_and_poll_converge_without_duplicate_changes() {
        let source = ScriptedSource::new(vec![analyzing(2), completed(2, 40)]);
        let (tx, rx) = mpsc::channel();
        let mut feed = StateFeed::open(&source, Some(rx), Duration::from_secs(5)).unwrap();

        let results = completed(2, 40).result.unwrap();
        tx.send(Push::new(2, Message::DisplayResults { results: results.clone() }))
            .unwrap();
        let change = feed.next_change().unwrap();
        assert_eq!(change.status, CheckStatus::Completed);

        // A redundant push of the same frame is swallowed; the closed channel
        // then ends the feed because nothing is in flight.
        tx.send(Push::new(2, Message::DisplayResults { results })).unwrap();
        drop(tx);
        assert!(feed.next_change().is_none());
    }

    #[test]
    fn stale_pushes_are_ignored() {
        let source = ScriptedSource::new(vec![analyzing(5)]);
        let (tx, rx) = mpsc::channel();
        let mut feed = StateFeed::open(&source, Some(rx), FAST).unwrap();

        let old = completed(4, 10).result.unwrap();
        tx.send(Push::new(4, Message::DisplayResults { results: old })).unwrap();
        tx.send(Push::new(
            5,
            Message::DisplayError {
                error: factcheck_protocol::CheckError::service(Some(503), "unavailable"),
            },
        ))
        .unwrap();

        let change = feed.next_change().unwrap();
        assert_eq!(change.request_id, 5);
        assert_eq!(change.status, CheckStatus::Error);
    }

    #[test]
    fn push_for_unseen_request_refreshes_from_source() {
        let mut newer = completed(9, 88);
        newer.selected_text = Some("newer claim".to_string());
        let source = ScriptedSource::new(vec![completed(3, 20), newer.clone()]);
        let (tx, rx) = mpsc::channel();
        let mut feed = StateFeed::open(&source, Some(rx), FAST).unwrap();

        tx.send(newer.to_push().unwrap()).unwrap();
        let change = feed.next_change().unwrap();
        assert_eq!(change.selected_text.as_deref(), Some("newer claim"));
        assert_eq!(source.fetches.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn unreadable_source_never_shows_verdict_under_previous_claim() {
        let mut previous = completed(3, 20);
        previous.selected_text = Some("previous claim".to_string());
        let source = ScriptedSource::new(vec![previous]);
        let (tx, rx) = mpsc::channel();
        let mut feed = StateFeed::open(&source, Some(rx), FAST).unwrap();
        source.states.lock().unwrap().clear();

        let results = completed(4, 90).result.unwrap();
        tx.send(Push::new(4, Message::DisplayResults { results })).unwrap();
        let change = feed.next_change().unwrap();
        assert_eq!(change.request_id, 4);
        assert_eq!(change.status, CheckStatus::Completed);
        assert_eq!(change.selected_text, None);
    }

    #[test]
    fn dropping_feed_releases_subscription() {
        struct Guard(Arc<AtomicUsize>);
        impl Drop for Guard {
            fn drop(&mut self) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let dropped = Arc::new(AtomicUsize::new(0));
        let source = ScriptedSource::new(vec![PersistedState::default()]);
        let feed = StateFeed::open(&source, None, FAST)
            .unwrap()
            .with_subscription(Guard(Arc::clone(&dropped)));
        drop(feed);
        assert_eq!(dropped.load(Ordering::SeqCst), 1);
    }
}
