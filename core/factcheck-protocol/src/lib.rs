//! IPC protocol types and validation for factcheck-daemon.
//!
//! This crate is shared by the daemon and its clients to prevent schema drift.
//! The daemon remains the authority on validation, but clients can reuse the
//! same types to construct valid requests and to fold push frames into the
//! state they display.

use serde::{Deserialize, Serialize};
use serde_json::Value;

mod state;

pub use state::{
    CheckError, CheckResult, CheckStatus, ErrorKind, PersistedState, SelectionRequest, Theme,
    MAX_SOURCES, STATE_SCHEMA_VERSION,
};

pub const PROTOCOL_VERSION: u32 = 1;
pub const MAX_REQUEST_BYTES: usize = 1024 * 1024; // 1MB
pub const MAX_SELECTION_BYTES: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub enum Method {
    GetHealth,
    GetState,
    Subscribe,
    SetTheme,
    Message,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Request {
    pub protocol_version: u32,
    pub method: Method,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub params: Option<Value>,
}

impl Request {
    pub fn new(method: Method, id: Option<String>, params: Option<Value>) -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION,
            method,
            id,
            params,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Response {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ErrorInfo {
    pub code: String,
    pub message: String,
}

impl ErrorInfo {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

impl From<CheckError> for ErrorInfo {
    fn from(err: CheckError) -> Self {
        ErrorInfo::new(err.kind.code(), err.message)
    }
}

impl Response {
    pub fn ok(id: Option<String>, data: Value) -> Self {
        Self {
            ok: true,
            id,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(id: Option<String>, code: &str, message: impl Into<String>) -> Self {
        Self {
            ok: false,
            id,
            data: None,
            error: Some(ErrorInfo::new(code, message)),
        }
    }

    pub fn error_with_info(id: Option<String>, error: ErrorInfo) -> Self {
        Self {
            ok: false,
            id,
            data: None,
            error: Some(error),
        }
    }
}

/// Messages exchanged between the selection detector, the daemon and
/// presenters. `factCheck` and `getSelectedText` flow towards the daemon;
/// the remaining actions are only ever pushed by it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum Message {
    FactCheck { text: String },
    DisplayResults { results: CheckResult },
    DisplayError { error: CheckError },
    UpdateSelectedText { text: String },
    GetSelectedText,
}

impl Message {
    pub fn action(&self) -> &'static str {
        match self {
            Message::FactCheck { .. } => "factCheck",
            Message::DisplayResults { .. } => "displayResults",
            Message::DisplayError { .. } => "displayError",
            Message::UpdateSelectedText { .. } => "updateSelectedText",
            Message::GetSelectedText => "getSelectedText",
        }
    }

    /// True for actions a client may send to the daemon.
    pub fn is_inbound(&self) -> bool {
        matches!(self, Message::FactCheck { .. } | Message::GetSelectedText)
    }
}

/// One frame written to a subscribed connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Push {
    pub protocol_version: u32,
    pub request_id: u64,
    pub message: Message,
}

impl Push {
    pub fn new(request_id: u64, message: Message) -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION,
            request_id,
            message,
        }
    }
}

pub fn parse_message(params: Value) -> Result<Message, ErrorInfo> {
    let message: Message = serde_json::from_value(params).map_err(|err| {
        ErrorInfo::new(
            "invalid_params",
            format!("message payload is invalid: {}", err),
        )
    })?;

    if !message.is_inbound() {
        return Err(ErrorInfo::new(
            "unsupported_action",
            format!("{} is not accepted by the daemon", message.action()),
        ));
    }

    if let Message::FactCheck { text } = &message {
        if text.len() > MAX_SELECTION_BYTES {
            return Err(ErrorInfo::new(
                "selection_too_large",
                format!("selection must be {} bytes or fewer", MAX_SELECTION_BYTES),
            ));
        }
    }

    Ok(message)
}

pub fn parse_theme(params: Value) -> Result<Theme, ErrorInfo> {
    #[derive(Deserialize)]
    #[serde(deny_unknown_fields)]
    struct ThemeParams {
        theme: Theme,
    }

    serde_json::from_value::<ThemeParams>(params)
        .map(|params| params.theme)
        .map_err(|err| ErrorInfo::new("invalid_params", format!("theme is invalid: {}", err)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn fact_check_uses_action_tag() {
        let value = serde_json::to_value(Message::FactCheck {
            text: "water is wet".to_string(),
        })
        .unwrap();
        assert_eq!(value, json!({"action": "factCheck", "text": "water is wet"}));

        let parsed = parse_message(json!({"action": "getSelectedText"})).unwrap();
        assert_eq!(parsed, Message::GetSelectedText);
    }

    #[test]
    fn rejects_outbound_actions() {
        let err = parse_message(json!({"action": "updateSelectedText", "text": "x"})).unwrap_err();
        assert_eq!(err.code, "unsupported_action");
    }

    #[test]
    fn rejects_unknown_action() {
        let err = parse_message(json!({"action": "explode"})).unwrap_err();
        assert_eq!(err.code, "invalid_params");
    }

    #[test]
    fn rejects_oversized_selection() {
        let text = "a".repeat(MAX_SELECTION_BYTES + 1);
        let err = parse_message(json!({"action": "factCheck", "text": text})).unwrap_err();
        assert_eq!(err.code, "selection_too_large");
    }

    #[test]
    fn parses_theme_params() {
        assert_eq!(parse_theme(json!({"theme": "light"})).unwrap(), Theme::Light);
        assert!(parse_theme(json!({"theme": "sepia"})).is_err());
        assert!(parse_theme(json!({"colour": "dark"})).is_err());
    }

    #[test]
    fn request_rejects_unknown_fields() {
        let raw = json!({"protocol_version": 1, "method": "get_state", "extra": true});
        assert!(serde_json::from_value::<Request>(raw).is_err());
    }

    #[test]
    fn check_error_maps_to_error_info() {
        let info = ErrorInfo::from(CheckError::validation("selection is empty"));
        assert_eq!(info.code, "validation_error");
        assert_eq!(info.message, "selection is empty");
    }
}
