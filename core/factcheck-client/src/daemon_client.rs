//! Client for the factcheck daemon socket.
//!
//! Every call opens a fresh connection, writes one request line and reads one
//! response line. `subscribe` is the exception: its connection stays open and
//! a reader thread forwards push frames onto a channel until the returned
//! [`Subscription`] is dropped.

use factcheck_core::config;
use factcheck_core::presenter::StateSource;
use factcheck_core::CoreError;
use factcheck_protocol::{
    Method, PersistedState, Push, Request, Response, Theme, MAX_REQUEST_BYTES, PROTOCOL_VERSION,
};
use chrono::Utc;
use rand::RngCore;
use serde_json::{json, Value};
use std::env;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::Shutdown;
use std::os::unix::net::UnixStream;
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver};
use std::thread;
use std::time::Duration;

const ENABLE_ENV: &str = "FACTCHECK_DAEMON_ENABLED";
const SOCKET_ENV: &str = "FACTCHECK_DAEMON_SOCKET";
const READ_TIMEOUT_MS: u64 = 2000;
const WRITE_TIMEOUT_MS: u64 = 600;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Daemon disabled via {}", ENABLE_ENV)]
    Disabled,

    #[error("Failed to resolve daemon socket: {0}")]
    Socket(#[from] CoreError),

    #[error("Failed to connect to daemon socket {}: {source}", path.display())]
    Connect {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to talk to daemon: {0}")]
    Io(#[from] std::io::Error),

    #[error("Timed out waiting for daemon response")]
    Timeout,

    #[error("{code}: {message}")]
    Daemon { code: String, message: String },

    #[error("Invalid daemon response: {0}")]
    InvalidResponse(String),
}

pub fn daemon_enabled() -> bool {
    match env::var(ENABLE_ENV) {
        Ok(value) => matches!(value.as_str(), "1" | "true" | "TRUE" | "yes" | "YES"),
        Err(_) => true,
    }
}

pub fn socket_path() -> Result<PathBuf, ClientError> {
    if let Ok(path) = env::var(SOCKET_ENV) {
        if !path.trim().is_empty() {
            return Ok(PathBuf::from(path));
        }
    }
    Ok(config::default_socket_path()?)
}

/// Answer to a `factCheck` message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
pub struct Accepted {
    pub request_id: u64,
}

/// Keeps a push connection open. Dropping it shuts the socket down, which
/// ends the reader thread and closes the push channel.
pub struct Subscription {
    stream: UnixStream,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let _ = self.stream.shutdown(Shutdown::Both);
    }
}

#[derive(Debug, Clone)]
pub struct DaemonClient {
    socket: PathBuf,
}

impl DaemonClient {
    pub fn new(socket: PathBuf) -> Self {
        Self { socket }
    }

    /// Client for the configured socket, honoring the kill switch.
    pub fn from_env() -> Result<Self, ClientError> {
        if !daemon_enabled() {
            return Err(ClientError::Disabled);
        }
        Ok(Self::new(socket_path()?))
    }

    pub fn health(&self) -> Result<Value, ClientError> {
        self.call(Method::GetHealth, None)
    }

    pub fn get_state(&self) -> Result<PersistedState, ClientError> {
        let data = self.call(Method::GetState, None)?;
        decode(data, "state")
    }

    pub fn fact_check(&self, text: &str) -> Result<Accepted, ClientError> {
        let data = self.call(
            Method::Message,
            Some(json!({ "action": "factCheck", "text": text })),
        )?;
        decode(data, "factCheck acknowledgement")
    }

    pub fn selected_text(&self) -> Result<Option<String>, ClientError> {
        let data = self.call(Method::Message, Some(json!({ "action": "getSelectedText" })))?;
        Ok(data
            .get("text")
            .and_then(Value::as_str)
            .map(str::to_string))
    }

    pub fn set_theme(&self, theme: Theme) -> Result<PersistedState, ClientError> {
        let data = self.call(Method::SetTheme, Some(json!({ "theme": theme })))?;
        decode(data, "state")
    }

    /// Opens a push connection. Returns the handle that keeps it alive, the
    /// state at subscription time and the channel of subsequent pushes.
    pub fn subscribe(&self) -> Result<(Subscription, PersistedState, Receiver<Push>), ClientError> {
        let mut stream = self.connect()?;
        write_request(
            &mut stream,
            &Request::new(Method::Subscribe, Some(make_request_id()), None),
        )?;

        // The ack and the first pushes can share a read, so one buffered
        // reader serves both.
        let mut reader = BufReader::new(stream.try_clone()?);
        let mut ack = String::new();
        match reader.read_line(&mut ack) {
            Ok(0) => {
                return Err(ClientError::InvalidResponse("response was empty".to_string()));
            }
            Ok(_) => {}
            Err(err) if is_timeout(&err) => return Err(ClientError::Timeout),
            Err(err) => return Err(ClientError::Io(err)),
        }
        let ack: Response = serde_json::from_str(ack.trim_end())
            .map_err(|err| ClientError::InvalidResponse(format!("not valid JSON: {}", err)))?;
        let data = into_data(ack)?;
        let state = decode(
            data.get("state").cloned().unwrap_or(Value::Null),
            "subscription state",
        )?;

        // Pushes arrive whenever the daemon has something; only the ack
        // above is bounded.
        stream.set_read_timeout(None)?;
        let (tx, rx) = mpsc::channel();
        thread::Builder::new()
            .name("factcheck-pushes".to_string())
            .spawn(move || forward_pushes(reader, tx))?;

        Ok((Subscription { stream }, state, rx))
    }

    fn call(&self, method: Method, params: Option<Value>) -> Result<Value, ClientError> {
        let request = Request::new(method, Some(make_request_id()), params);
        tracing::debug!(method = ?method, id = ?request.id, "Sending daemon request");
        let mut stream = self.connect()?;
        write_request(&mut stream, &request)?;
        into_data(read_response(&mut stream)?)
    }

    fn connect(&self) -> Result<UnixStream, ClientError> {
        let stream = UnixStream::connect(&self.socket).map_err(|source| ClientError::Connect {
            path: self.socket.clone(),
            source,
        })?;
        let _ = stream.set_read_timeout(Some(Duration::from_millis(READ_TIMEOUT_MS)));
        let _ = stream.set_write_timeout(Some(Duration::from_millis(WRITE_TIMEOUT_MS)));
        Ok(stream)
    }
}

impl StateSource for DaemonClient {
    fn fetch_state(&self) -> factcheck_core::Result<PersistedState> {
        self.get_state()
            .map_err(|err| CoreError::StateUnavailable(err.to_string()))
    }
}

fn forward_pushes(reader: BufReader<UnixStream>, tx: mpsc::Sender<Push>) {
    for line in reader.lines() {
        let line = match line {
            Ok(line) => line,
            Err(err) => {
                tracing::debug!(error = %err, "Push connection closed");
                return;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<Push>(&line) {
            Ok(push) if push.protocol_version == PROTOCOL_VERSION => {
                if tx.send(push).is_err() {
                    return;
                }
            }
            Ok(push) => {
                tracing::warn!(
                    version = push.protocol_version,
                    "Ignoring push with unknown protocol version"
                );
            }
            Err(err) => {
                tracing::warn!(error = %err, "Ignoring malformed push frame");
            }
        }
    }
    tracing::debug!("Push connection ended");
}

fn write_request(stream: &mut UnixStream, request: &Request) -> Result<(), ClientError> {
    serde_json::to_writer(&mut *stream, request)
        .map_err(|err| ClientError::InvalidResponse(format!("failed to encode request: {}", err)))?;
    stream.write_all(b"\n")?;
    stream.flush()?;
    Ok(())
}

fn read_response(stream: &mut UnixStream) -> Result<Response, ClientError> {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 4096];

    loop {
        match stream.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => {
                buffer.extend_from_slice(&chunk[..n]);
                if buffer.len() > MAX_REQUEST_BYTES {
                    return Err(ClientError::InvalidResponse(
                        "response exceeded maximum size".to_string(),
                    ));
                }
                if chunk[..n].contains(&b'\n') {
                    break;
                }
            }
            Err(err) if is_timeout(&err) => return Err(ClientError::Timeout),
            Err(err) => return Err(ClientError::Io(err)),
        }
    }

    let newline_index = buffer.iter().position(|b| *b == b'\n');
    let response_bytes = match newline_index {
        Some(index) => &buffer[..index],
        None => buffer.as_slice(),
    };

    if response_bytes.is_empty() {
        return Err(ClientError::InvalidResponse("response was empty".to_string()));
    }

    serde_json::from_slice(response_bytes)
        .map_err(|err| ClientError::InvalidResponse(format!("not valid JSON: {}", err)))
}

fn is_timeout(err: &std::io::Error) -> bool {
    matches!(
        err.kind(),
        std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
    )
}

fn into_data(response: Response) -> Result<Value, ClientError> {
    if response.ok {
        return Ok(response.data.unwrap_or(Value::Null));
    }
    Err(match response.error {
        Some(error) => ClientError::Daemon {
            code: error.code,
            message: error.message,
        },
        None => ClientError::Daemon {
            code: "unknown".to_string(),
            message: "Unknown daemon error".to_string(),
        },
    })
}

fn decode<T: serde::de::DeserializeOwned>(data: Value, what: &str) -> Result<T, ClientError> {
    serde_json::from_value(data)
        .map_err(|err| ClientError::InvalidResponse(format!("bad {}: {}", what, err)))
}

fn make_request_id() -> String {
    let mut random = rand::thread_rng();
    format!(
        "msg-{}-{}-{:x}",
        Utc::now().timestamp_millis(),
        std::process::id(),
        random.next_u64()
    )
}
