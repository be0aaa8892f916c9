//! Shared data model: selection requests, check outcomes and the persisted
//! hand-off record that presenters read on open.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Message, Push};

pub const STATE_SCHEMA_VERSION: u32 = 1;
pub const MAX_SOURCES: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionRequest {
    pub text: String,
    pub requested_at: DateTime<Utc>,
}

impl SelectionRequest {
    pub fn new(text: &str) -> Result<Self, CheckError> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(CheckError::validation("Selected text is empty"));
        }
        Ok(Self {
            text: trimmed.to_string(),
            requested_at: Utc::now(),
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    #[default]
    Idle,
    Analyzing,
    Completed,
    Error,
}

impl CheckStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckStatus::Idle => "idle",
            CheckStatus::Analyzing => "analyzing",
            CheckStatus::Completed => "completed",
            CheckStatus::Error => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, CheckStatus::Completed | CheckStatus::Error)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckResult {
    pub truth_percentage: u8,
    pub summary: String,
    #[serde(default)]
    pub sources: Vec<String>,
}

impl CheckResult {
    /// Builds a result, clamping the percentage to 0..=100 and keeping at
    /// most [`MAX_SOURCES`] sources.
    pub fn new(truth_percentage: u64, summary: impl Into<String>, mut sources: Vec<String>) -> Self {
        sources.truncate(MAX_SOURCES);
        Self {
            truth_percentage: truth_percentage.min(100) as u8,
            summary: summary.into(),
            sources,
        }
    }

    pub fn verdict(&self) -> &'static str {
        match self.truth_percentage {
            80..=u8::MAX => "very likely true",
            60..=79 => "probably true",
            40..=59 => "uncertain",
            20..=39 => "probably false",
            _ => "very likely false",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    Validation,
    Service,
    Parse,
    Storage,
}

impl ErrorKind {
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation_error",
            ErrorKind::Service => "service_error",
            ErrorKind::Parse => "parse_error",
            ErrorKind::Storage => "storage_error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(rename_all = "camelCase")]
#[error("{message}")]
pub struct CheckError {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    pub occurred_at: DateTime<Utc>,
}

impl CheckError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
            occurred_at: Utc::now(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    pub fn service(status: Option<u16>, message: impl Into<String>) -> Self {
        Self {
            status,
            ..Self::new(ErrorKind::Service, message)
        }
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Parse, message)
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Storage, message)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Dark,
    Light,
}

impl Theme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Theme::Dark => "dark",
            Theme::Light => "light",
        }
    }
}

/// The durable hand-off record. Presenters have no guaranteed lifetime, so
/// this is what they read on open; the daemon overwrites it on every request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedState {
    pub version: u32,
    pub request_id: u64,
    #[serde(default)]
    pub selected_text: Option<String>,
    pub status: CheckStatus,
    #[serde(default)]
    pub result: Option<CheckResult>,
    #[serde(default)]
    pub error: Option<CheckError>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub theme: Theme,
}

impl Default for PersistedState {
    fn default() -> Self {
        Self {
            version: STATE_SCHEMA_VERSION,
            request_id: 0,
            selected_text: None,
            status: CheckStatus::Idle,
            result: None,
            error: None,
            timestamp: DateTime::<Utc>::default(),
            theme: Theme::default(),
        }
    }
}

impl PersistedState {
    /// A fresh `analyzing` record for a new request, keeping the theme.
    pub fn analyzing(&self, request_id: u64, text: &str, now: DateTime<Utc>) -> Self {
        Self {
            version: STATE_SCHEMA_VERSION,
            request_id,
            selected_text: Some(text.to_string()),
            status: CheckStatus::Analyzing,
            result: None,
            error: None,
            timestamp: now,
            theme: self.theme,
        }
    }

    pub fn complete(&mut self, result: CheckResult, now: DateTime<Utc>) {
        self.status = CheckStatus::Completed;
        self.result = Some(result);
        self.error = None;
        self.timestamp = now;
    }

    pub fn fail(&mut self, error: CheckError) {
        self.status = CheckStatus::Error;
        self.timestamp = error.occurred_at;
        self.result = None;
        self.error = Some(error);
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// The push frame announcing the current status, if it has one.
    pub fn to_push(&self) -> Option<Push> {
        let message = match self.status {
            CheckStatus::Idle => return None,
            CheckStatus::Analyzing => Message::UpdateSelectedText {
                text: self.selected_text.clone().unwrap_or_default(),
            },
            CheckStatus::Completed => Message::DisplayResults {
                results: self.result.clone()?,
            },
            CheckStatus::Error => Message::DisplayError {
                error: self.error.clone()?,
            },
        };
        Some(Push::new(self.request_id, message))
    }

    /// Folds a push frame into this state. Frames for older requests are
    /// ignored. Returns true when the visible content changed.
    pub fn apply_push(&mut self, push: &Push) -> bool {
        if push.request_id < self.request_id {
            return false;
        }

        let mut next = self.clone();
        next.request_id = push.request_id;
        match &push.message {
            Message::UpdateSelectedText { text } => {
                if push.request_id == self.request_id && self.is_terminal() {
                    // Late announcement for a request that already finished.
                    return false;
                }
                next = self.analyzing(push.request_id, text, Utc::now());
            }
            Message::DisplayResults { results } => next.complete(results.clone(), Utc::now()),
            Message::DisplayError { error } => next.fail(error.clone()),
            Message::FactCheck { .. } | Message::GetSelectedText => return false,
        }
        if next.request_id > self.request_id && next.is_terminal() {
            // The selection for a request we never saw announced is unknown.
            next.selected_text = None;
        }

        if next.same_content(self) {
            return false;
        }
        *self = next;
        true
    }

    /// Equality ignoring the timestamp and schema version.
    pub fn same_content(&self, other: &PersistedState) -> bool {
        self.request_id == other.request_id
            && self.status == other.status
            && self.selected_text == other.selected_text
            && self.result == other.result
            && self.error == other.error
            && self.theme == other.theme
    }
}
