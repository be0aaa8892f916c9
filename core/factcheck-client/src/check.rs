//! `factcheck check`: submit one selection to the daemon.

use std::io::Read;

use crate::daemon_client::DaemonClient;

/// Sends `text`, or everything on `input` when no text was given, and
/// returns the request id the daemon assigned.
pub fn run(client: &DaemonClient, text: Option<String>, input: impl Read) -> Result<u64, String> {
    let text = match text {
        Some(text) => text,
        None => read_selection(input)?,
    };

    let accepted = client
        .fact_check(&text)
        .map_err(|err| format!("Fact-check was not accepted: {}", err))?;
    tracing::info!(request_id = accepted.request_id, "Fact-check submitted");
    Ok(accepted.request_id)
}

fn read_selection(mut input: impl Read) -> Result<String, String> {
    let mut text = String::new();
    input
        .read_to_string(&mut text)
        .map_err(|err| format!("Failed to read stdin: {}", err))?;
    Ok(text)
}
