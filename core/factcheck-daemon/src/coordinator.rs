//! Runs one fact-check from a selection to its terminal state.
//!
//! `begin` is cheap and runs on the connection thread so the caller's reply
//! already reflects `analyzing`. `run` blocks on the analysis service and is
//! meant for a worker thread.

use factcheck_protocol::{CheckError, CheckResult, SelectionRequest};
use std::sync::Arc;

use crate::analysis::{AnalysisService, ServiceFailure};
use crate::parser::parse_response;
use crate::state::SharedState;

const PARSE_FAILURE_MESSAGE: &str = "Could not read the analysis response";

/// A request that has been announced and is waiting on the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
    pub request_id: u64,
    pub text: String,
}

pub struct Coordinator {
    state: Arc<SharedState>,
    service: Box<dyn AnalysisService>,
}

impl Coordinator {
    pub fn new(state: Arc<SharedState>, service: Box<dyn AnalysisService>) -> Self {
        Self { state, service }
    }

    pub fn state(&self) -> &Arc<SharedState> {
        &self.state
    }

    /// Validates `text` and moves the shared state to `analyzing`. Invalid
    /// input leaves the state untouched.
    pub fn begin(&self, text: &str) -> Result<Ticket, CheckError> {
        let request = SelectionRequest::new(text)?;
        let request_id = self.state.begin_request(&request);
        Ok(Ticket {
            request_id,
            text: request.text,
        })
    }

    /// Calls the service once and records the outcome, unless a newer
    /// request took over in the meantime. The outcome is returned either way.
    pub fn run(&self, ticket: Ticket) -> Result<CheckResult, CheckError> {
        let outcome = self.analyze(&ticket);
        if !self.state.finish_request(ticket.request_id, outcome.clone()) {
            tracing::debug!(request_id = ticket.request_id, "Outcome not applied");
        }
        outcome
    }

    pub fn submit(&self, text: &str) -> Result<CheckResult, CheckError> {
        let ticket = self.begin(text)?;
        self.run(ticket)
    }

    fn analyze(&self, ticket: &Ticket) -> Result<CheckResult, CheckError> {
        let raw = self.service.analyze(&ticket.text).map_err(|failure| {
            tracing::debug!(request_id = ticket.request_id, error = %failure, "Analysis call failed");
            service_error(failure)
        })?;

        parse_response(&raw).map_err(|err| {
            tracing::warn!(
                request_id = ticket.request_id,
                error = %err,
                raw_chars = raw.chars().count(),
                "Failed to parse analysis response"
            );
            CheckError::parse(PARSE_FAILURE_MESSAGE)
        })
    }
}

fn service_error(failure: ServiceFailure) -> CheckError {
    match failure {
        ServiceFailure::Status { status, .. } => {
            CheckError::service(Some(status), failure.to_string())
        }
        ServiceFailure::MissingApiKey(_) | ServiceFailure::Transport(_) => {
            CheckError::service(None, failure.to_string())
        }
        ServiceFailure::Envelope(ref details) => {
            tracing::warn!(details = %details, "Malformed analysis envelope");
            CheckError::parse(PARSE_FAILURE_MESSAGE)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Db;
    use factcheck_protocol::{CheckStatus, ErrorKind};
    use std::sync::mpsc::{self, Receiver, Sender};
    use std::sync::Mutex;
    use std::thread;

    const GOOD_REPLY: &str = "72%\n\nMostly accurate.\n\nSources:\n1. https://a.example/1\n2. https://b.example/2";

    /// Answers every call with the same canned outcome.
    struct CannedService(fn() -> Result<String, ServiceFailure>);

    impl AnalysisService for CannedService {
        fn analyze(&self, _text: &str) -> Result<String, ServiceFailure> {
            (self.0)()
        }
    }

    /// Blocks each call until the test releases a reply for that text.
    struct GatedService {
        started: Mutex<Sender<String>>,
        replies: Mutex<Vec<(String, Receiver<String>)>>,
    }

    impl AnalysisService for GatedService {
        fn analyze(&self, text: &str) -> Result<String, ServiceFailure> {
            let gate = {
                let mut replies = self.replies.lock().unwrap();
                let index = replies.iter().position(|(key, _)| key == text).unwrap();
                replies.remove(index).1
            };
            self.started.lock().unwrap().send(text.to_string()).unwrap();
            Ok(gate.recv().unwrap())
        }
    }

    fn coordinator(service: Box<dyn AnalysisService>) -> (tempfile::TempDir, Coordinator) {
        let dir = tempfile::tempdir().expect("temp dir");
        let db = Db::new(dir.path().join("state.db")).expect("db init");
        let state = Arc::new(SharedState::new(db));
        (dir, Coordinator::new(state, service))
    }

    #[test]
    fn successful_check_completes_state() {
        let (_dir, coordinator) = coordinator(Box::new(CannedService(|| Ok(GOOD_REPLY.to_string()))));
        let result = coordinator.submit("  the earth orbits the sun ").unwrap();
        assert_eq!(result.truth_percentage, 72);
        assert_eq!(result.sources.len(), 2);

        let snapshot = coordinator.state().snapshot();
        assert_eq!(snapshot.status, CheckStatus::Completed);
        assert_eq!(snapshot.selected_text.as_deref(), Some("the earth orbits the sun"));
        assert_eq!(snapshot.result, Some(result));
    }

    #[test]
    fn blank_selection_is_rejected_without_state_change() {
        let (_dir, coordinator) = coordinator(Box::new(CannedService(|| Ok(GOOD_REPLY.to_string()))));
        let before = coordinator.state().snapshot();
        let err = coordinator.submit(" \n\t ").unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);
        assert_eq!(coordinator.state().snapshot(), before);
    }

    #[test]
    fn http_status_becomes_service_error() {
        let (_dir, coordinator) = coordinator(Box::new(CannedService(|| {
            Err(ServiceFailure::Status {
                status: 401,
                body: "unauthorized".to_string(),
            })
        })));
        let err = coordinator.submit("claim").unwrap_err();
        assert_eq!(err.kind, ErrorKind::Service);
        assert_eq!(err.status, Some(401));
        assert!(err.message.contains("unauthorized"));

        let snapshot = coordinator.state().snapshot();
        assert_eq!(snapshot.status, CheckStatus::Error);
        assert_eq!(snapshot.error, Some(err));
    }

    #[test]
    fn transport_failure_has_no_status() {
        let (_dir, coordinator) = coordinator(Box::new(CannedService(|| {
            Err(ServiceFailure::Transport("connection refused".to_string()))
        })));
        let err = coordinator.submit("claim").unwrap_err();
        assert_eq!(err.kind, ErrorKind::Service);
        assert_eq!(err.status, None);
    }

    #[test]
    fn unparseable_reply_is_parse_error() {
        let (_dir, coordinator) =
            coordinator(Box::new(CannedService(|| Ok("I cannot rate this claim.".to_string()))));
        let err = coordinator.submit("claim").unwrap_err();
        assert_eq!(err.kind, ErrorKind::Parse);
        assert_eq!(coordinator.state().snapshot().status, CheckStatus::Error);
    }

    #[test]
    fn malformed_envelope_is_parse_error() {
        let (_dir, coordinator) = coordinator(Box::new(CannedService(|| {
            Err(ServiceFailure::Envelope("no choices".to_string()))
        })));
        let err = coordinator.submit("claim").unwrap_err();
        assert_eq!(err.kind, ErrorKind::Parse);
    }

    fn race(finish_newer_first: bool) {
        let (older_tx, older_rx) = mpsc::channel();
        let (newer_tx, newer_rx) = mpsc::channel();
        let (started_tx, started_rx) = mpsc::channel();
        let service = GatedService {
            started: Mutex::new(started_tx),
            replies: Mutex::new(vec![
                ("older claim".to_string(), older_rx),
                ("newer claim".to_string(), newer_rx),
            ]),
        };
        let (_dir, coordinator) = coordinator(Box::new(service));
        let coordinator = Arc::new(coordinator);

        let older = coordinator.begin("older claim").unwrap();
        let older_worker = {
            let coordinator = Arc::clone(&coordinator);
            thread::spawn(move || coordinator.run(older))
        };
        assert_eq!(started_rx.recv().unwrap(), "older claim");

        let newer = coordinator.begin("newer claim").unwrap();
        let newer_id = newer.request_id;
        let newer_worker = {
            let coordinator = Arc::clone(&coordinator);
            thread::spawn(move || coordinator.run(newer))
        };
        assert_eq!(started_rx.recv().unwrap(), "newer claim");

        let older_reply = "5%\nFalse.\nSources:\nhttps://old.example".to_string();
        if finish_newer_first {
            newer_tx.send(GOOD_REPLY.to_string()).unwrap();
            newer_worker.join().unwrap().unwrap();
            older_tx.send(older_reply).unwrap();
            older_worker.join().unwrap().unwrap();
        } else {
            older_tx.send(older_reply).unwrap();
            older_worker.join().unwrap().unwrap();
            assert_eq!(coordinator.state().snapshot().status, CheckStatus::Analyzing);
            newer_tx.send(GOOD_REPLY.to_string()).unwrap();
            newer_worker.join().unwrap().unwrap();
        }

        let snapshot = coordinator.state().snapshot();
        assert_eq!(snapshot.request_id, newer_id);
        assert_eq!(snapshot.status, CheckStatus::Completed);
        assert_eq!(snapshot.selected_text.as_deref(), Some("newer claim"));
        assert_eq!(snapshot.result.unwrap().truth_percentage, 72);
    }

    #[test]
    fn stale_completion_never_overwrites_newer_when_it_lands_last() {
        race(true);
    }

    #[test]
    fn stale_completion_never_overwrites_newer_when_it_lands_first() {
        race(false);
    }
}
