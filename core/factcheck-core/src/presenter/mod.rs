//! Result presentation.
//!
//! The presenter has no guaranteed lifetime: it may open long after the
//! daemon finished a check, or close in the middle of one. It therefore reads
//! the persisted state on open and then follows a [`StateFeed`], which merges
//! daemon push frames with a polling fallback into one stream of changes.
//! Every change goes through the same idempotent [`Renderer`].

mod feed;
mod render;
mod titles;

pub use feed::StateFeed;
pub use render::Renderer;
pub use titles::{extract_title, TitleFetcher, TitleResolver};

use factcheck_protocol::{CheckResult, CheckStatus, PersistedState};

use crate::error::Result;

pub const IDLE_PLACEHOLDER: &str = "Highlight any text on the webpage to fact-check it";
pub const NUMERIC_PLACEHOLDER: &str = "--";
const MISSING_RESULT_MESSAGE: &str = "No results found";
const MISSING_ERROR_MESSAGE: &str = "Failed to fact-check the text";

/// Where the presenter reads the authoritative state from.
pub trait StateSource {
    fn fetch_state(&self) -> Result<PersistedState>;
}

/// What the presenter shows, derived from one persisted state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresenterView {
    Idle,
    Analyzing {
        text: String,
    },
    Completed {
        text: Option<String>,
        result: CheckResult,
    },
    Error {
        text: Option<String>,
        message: String,
    },
}

impl PresenterView {
    pub fn from_state(state: &PersistedState) -> Self {
        let text = state.selected_text.clone();
        match state.status {
            CheckStatus::Idle => PresenterView::Idle,
            CheckStatus::Analyzing => PresenterView::Analyzing {
                text: text.unwrap_or_default(),
            },
            CheckStatus::Completed => match &state.result {
                Some(result) => PresenterView::Completed {
                    text,
                    result: result.clone(),
                },
                None => PresenterView::Error {
                    text,
                    message: MISSING_RESULT_MESSAGE.to_string(),
                },
            },
            CheckStatus::Error => PresenterView::Error {
                text,
                message: state
                    .error
                    .as_ref()
                    .map(|err| err.message.clone())
                    .unwrap_or_else(|| MISSING_ERROR_MESSAGE.to_string()),
            },
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PresenterView::Completed { .. } | PresenterView::Error { .. }
        )
    }
}
