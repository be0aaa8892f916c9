//! `factcheck popup`: the result presenter in a terminal.
//!
//! Subscribes first and reads the state second, so nothing published in
//! between is missed. Without `--follow` it exits once a terminal state has
//! been shown.

use factcheck_core::presenter::{Renderer, StateFeed, StateSource, TitleFetcher, TitleResolver};
use factcheck_core::PresenterConfig;
use factcheck_protocol::PersistedState;
use std::io::{self, IsTerminal, Write};

use crate::daemon_client::DaemonClient;

#[derive(Debug, Clone, Copy, Default)]
pub struct PopupOptions {
    pub follow: bool,
    pub plain: bool,
}

pub fn run(
    client: DaemonClient,
    config: &PresenterConfig,
    options: PopupOptions,
) -> Result<(), String> {
    let subscription = match client.subscribe() {
        Ok((subscription, _, pushes)) => Some((subscription, pushes)),
        Err(err) => {
            tracing::warn!(error = %err, "Push subscription failed; polling only");
            None
        }
    };

    let (subscription, pushes) = match subscription {
        Some((subscription, pushes)) => (Some(subscription), Some(pushes)),
        None => (None, None),
    };
    let mut feed = StateFeed::open(client, pushes, config.poll_interval())
        .map_err(|err| format!("Failed to read check state: {}", err))?;
    if let Some(subscription) = subscription {
        feed = feed.with_subscription(subscription);
    }
    tracing::debug!(push = feed.is_push_connected(), "Presenter feed opened");

    let stdout = io::stdout();
    let color = !options.plain && stdout.is_terminal();
    let renderer = Renderer::new(stdout, TitleFetcher::new(config.title_timeout()), color);
    present(feed, renderer, options.follow)
}

/// Renders the current state and then every change until the feed ends or,
/// unless following, a terminal state has been rendered.
fn present<S, W, T>(
    mut feed: StateFeed<S>,
    mut renderer: Renderer<W, T>,
    follow: bool,
) -> Result<(), String>
where
    S: StateSource,
    W: Write,
    T: TitleResolver,
{
    render(&mut renderer, feed.current())?;
    if !follow && feed.current().is_terminal() {
        return Ok(());
    }

    while let Some(state) = feed.next_change() {
        render(&mut renderer, &state)?;
        if !follow && state.is_terminal() {
            break;
        }
    }
    Ok(())
}

fn render<W: Write, T: TitleResolver>(
    renderer: &mut Renderer<W, T>,
    state: &PersistedState,
) -> Result<(), String> {
    renderer
        .render(state)
        .map(|_| ())
        .map_err(|err| format!("Failed to write output: {}", err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use factcheck_core::CoreError;
    use factcheck_protocol::{CheckResult, Message, Push};
    use std::sync::mpsc;
    use std::sync::Mutex;
    use std::time::Duration;

    struct Sequence(Mutex<Vec<PersistedState>>);

    impl StateSource for Sequence {
        fn fetch_state(&self) -> factcheck_core::Result<PersistedState> {
            let mut states = self.0.lock().unwrap();
            match states.len() {
                0 => Err(CoreError::StateUnavailable("empty".to_string())),
                1 => Ok(states[0].clone()),
                _ => Ok(states.remove(0)),
            }
        }
    }

    struct NoTitles;

    impl TitleResolver for NoTitles {
        fn resolve_titles(&self, urls: &[String]) -> Vec<Option<String>> {
            vec![None; urls.len()]
        }
    }

    fn completed(id: u64) -> PersistedState {
        let mut state = PersistedState::default().analyzing(id, "claim", Utc::now());
        state.complete(
            CheckResult::new(64, "Partly true.", vec!["https://a.example".to_string()]),
            Utc::now(),
        );
        state
    }

    #[test]
    fn stops_after_terminal_state_without_follow() {
        let analyzing = PersistedState::default().analyzing(1, "claim", Utc::now());
        let source = Sequence(Mutex::new(vec![analyzing, completed(1)]));
        let feed = StateFeed::open(source, None, Duration::from_millis(10)).unwrap();

        let mut out = Vec::new();
        {
            let renderer = Renderer::new(&mut out, NoTitles, false);
            present(feed, renderer, false).unwrap();
        }
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Analyzing..."));
        assert!(text.contains("Truth: 64%  (probably true)"));
        assert!(text.contains("  1. https://a.example"));
    }

    #[test]
    fn terminal_state_on_open_returns_immediately() {
        let source = Sequence(Mutex::new(vec![completed(3)]));
        let (_tx, rx) = mpsc::channel();
        let feed = StateFeed::open(source, Some(rx), Duration::from_secs(30)).unwrap();

        let mut out = Vec::new();
        {
            let renderer = Renderer::new(&mut out, NoTitles, false);
            present(feed, renderer, false).unwrap();
        }
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.matches("FACT CHECK").count(), 1);
    }

    #[test]
    fn follow_keeps_rendering_pushes_until_channel_closes() {
        let source = Sequence(Mutex::new(vec![completed(1)]));
        let (tx, rx) = mpsc::channel();
        let feed = StateFeed::open(source, Some(rx), Duration::from_millis(10)).unwrap();

        let next = completed(2).result.unwrap();
        tx.send(Push::new(
            2,
            Message::UpdateSelectedText {
                text: "second claim".to_string(),
            },
        ))
        .unwrap();
        tx.send(Push::new(2, Message::DisplayResults { results: next }))
            .unwrap();
        drop(tx);

        let mut out = Vec::new();
        {
            let renderer = Renderer::new(&mut out, NoTitles, false);
            present(feed, renderer, true).unwrap();
        }
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("\"second claim\""));
        assert_eq!(text.matches("Truth: 64%").count(), 2);
    }
}
