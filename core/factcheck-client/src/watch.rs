//! `factcheck watch`: host bridge for the selection detector.
//!
//! Reads one JSON event per line on stdin and answers with JSON lines on
//! stdout telling the host page what to draw:
//!
//! ```text
//! in:  {"type":"selection","text":"...","bounds":{"left":10,"top":20,"width":90,"height":16},
//!       "viewport":{"width":1280,"height":800}}
//! in:  {"type":"click","x":112,"y":40}
//! out: {"type":"show_affordance","affordance":{"bounds":{...},"text":"..."}}
//! out: {"type":"hide_affordance"}
//! out: {"type":"submitted","request_id":3}
//! out: {"type":"error","code":"validation_error","message":"..."}
//! ```
//!
//! Lines that do not parse are reported as `invalid_event` errors and
//! skipped; the loop ends at end of input.

use factcheck_core::{Affordance, DetectorAction, Point, Rect, SelectionDetector, Viewport};
use factcheck_protocol::SelectionRequest;
use serde::{Deserialize, Serialize};
use std::io::{BufRead, Write};

use crate::daemon_client::{ClientError, DaemonClient};

const DEFAULT_VIEWPORT: Viewport = Viewport {
    width: 1280.0,
    height: 800.0,
};

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum HostEvent {
    Selection {
        text: String,
        #[serde(default)]
        bounds: Option<Rect>,
        #[serde(default)]
        viewport: Option<Viewport>,
    },
    Click {
        x: f64,
        y: f64,
    },
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum HostCommand {
    ShowAffordance { affordance: Affordance },
    HideAffordance,
    Submitted { request_id: u64 },
    Error { code: String, message: String },
}

pub fn run(client: &DaemonClient, input: impl BufRead, output: impl Write) -> Result<(), String> {
    bridge(input, output, |request| {
        client
            .fact_check(&request.text)
            .map(|accepted| accepted.request_id)
    })
}

fn bridge(
    input: impl BufRead,
    mut output: impl Write,
    mut submit: impl FnMut(&SelectionRequest) -> Result<u64, ClientError>,
) -> Result<(), String> {
    let mut detector = SelectionDetector::new();
    let mut viewport = DEFAULT_VIEWPORT;

    for line in input.lines() {
        let line = line.map_err(|err| format!("Failed to read stdin: {}", err))?;
        if line.trim().is_empty() {
            continue;
        }

        let event: HostEvent = match serde_json::from_str(&line) {
            Ok(event) => event,
            Err(err) => {
                tracing::debug!(error = %err, "Skipping malformed watch event");
                emit(
                    &mut output,
                    &HostCommand::Error {
                        code: "invalid_event".to_string(),
                        message: err.to_string(),
                    },
                )?;
                continue;
            }
        };

        let actions = match event {
            HostEvent::Selection {
                text,
                bounds,
                viewport: reported,
            } => {
                if let Some(reported) = reported {
                    viewport = reported;
                }
                detector.on_selection_change(&text, bounds, viewport)
            }
            HostEvent::Click { x, y } => detector.on_click(Point { x, y }),
        };

        for action in actions {
            let command = match action {
                DetectorAction::ShowAffordance(affordance) => {
                    HostCommand::ShowAffordance { affordance }
                }
                DetectorAction::HideAffordance => HostCommand::HideAffordance,
                DetectorAction::Emit(request) => match submit(&request) {
                    Ok(request_id) => HostCommand::Submitted { request_id },
                    Err(err) => {
                        tracing::warn!(error = %err, "Failed to submit selection");
                        let (code, message) = match err {
                            ClientError::Daemon { code, message } => (code, message),
                            other => ("daemon_unavailable".to_string(), other.to_string()),
                        };
                        HostCommand::Error { code, message }
                    }
                },
            };
            emit(&mut output, &command)?;
        }
    }
    Ok(())
}

fn emit(output: &mut impl Write, command: &HostCommand) -> Result<(), String> {
    let mut line = serde_json::to_string(command)
        .map_err(|err| format!("Failed to encode watch output: {}", err))?;
    line.push('\n');
    output
        .write_all(line.as_bytes())
        .and_then(|_| output.flush())
        .map_err(|err| format!("Failed to write stdout: {}", err))
}
