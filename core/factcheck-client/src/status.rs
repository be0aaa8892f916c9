//! `factcheck status`, `factcheck selected` and `factcheck theme`.

use factcheck_protocol::{CheckStatus, PersistedState, Theme};
use serde_json::Value;
use std::io::Write;

use crate::daemon_client::DaemonClient;

pub fn run(client: &DaemonClient, mut out: impl Write) -> Result<(), String> {
    let health = client
        .health()
        .map_err(|err| format!("Daemon is not reachable: {}", err))?;
    let state = client
        .get_state()
        .map_err(|err| format!("Failed to read check state: {}", err))?;

    out.write_all(summary(&health, &state).as_bytes())
        .map_err(|err| format!("Failed to write output: {}", err))
}

/// Prints the selection of the current check, or nothing when idle.
pub fn print_selected(client: &DaemonClient, mut out: impl Write) -> Result<(), String> {
    let text = client
        .selected_text()
        .map_err(|err| format!("Failed to read selected text: {}", err))?;
    if let Some(text) = text {
        writeln!(out, "{}", text).map_err(|err| format!("Failed to write output: {}", err))?;
    }
    Ok(())
}

pub fn set_theme(client: &DaemonClient, theme: Theme, mut out: impl Write) -> Result<(), String> {
    let state = client
        .set_theme(theme)
        .map_err(|err| format!("Failed to set theme: {}", err))?;
    writeln!(out, "Theme set to {}", state.theme.as_str())
        .map_err(|err| format!("Failed to write output: {}", err))
}

fn summary(health: &Value, state: &PersistedState) -> String {
    let mut lines = vec![format!(
        "daemon: {} (pid {}, version {})",
        health.get("status").and_then(Value::as_str).unwrap_or("unknown"),
        health.get("pid").and_then(Value::as_u64).unwrap_or(0),
        health.get("version").and_then(Value::as_str).unwrap_or("?"),
    )];
    lines.push(format!(
        "subscribers: {}",
        health.get("subscribers").and_then(Value::as_u64).unwrap_or(0)
    ));
    lines.push(format!(
        "check: {} (request {})",
        state.status.as_str(),
        state.request_id
    ));
    if let Some(text) = &state.selected_text {
        lines.push(format!("selected: {}", text));
    }
    match state.status {
        CheckStatus::Completed => {
            if let Some(result) = &state.result {
                lines.push(format!(
                    "truth: {}% ({})",
                    result.truth_percentage,
                    result.verdict()
                ));
            }
        }
        CheckStatus::Error => {
            if let Some(error) = &state.error {
                lines.push(format!("error: {} ({})", error.message, error.kind.code()));
            }
        }
        CheckStatus::Idle | CheckStatus::Analyzing => {}
    }
    lines.push(format!("theme: {}", state.theme.as_str()));

    let mut text = lines.join("\n");
    text.push('\n');
    text
}
