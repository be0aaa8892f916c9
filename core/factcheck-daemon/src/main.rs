//! factcheck daemon entrypoint.
//!
//! A small single-writer service that owns check state. Clients talk to it
//! over a Unix socket with one JSON request per connection; a connection that
//! sends `subscribe` stays open and receives push frames. Analysis calls run
//! on worker threads so the socket stays responsive while a check is pending.

use fs_err as fs;
use std::env;
use std::io::{Read, Write};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use factcheck_core::config;
use factcheck_protocol::{
    parse_message, parse_theme, CheckError, ErrorInfo, Message, Method, PersistedState, Request,
    Response, MAX_REQUEST_BYTES, PROTOCOL_VERSION,
};

mod analysis;
mod broadcast;
mod coordinator;
mod db;
mod parser;
mod state;

use analysis::HttpAnalysisService;
use coordinator::Coordinator;
use db::Db;
use state::SharedState;

const READ_TIMEOUT_SECS: u64 = 2;
const READ_CHUNK_SIZE: usize = 4096;

fn main() {
    init_logging();

    let socket_path = match config::default_socket_path() {
        Ok(path) => path,
        Err(err) => {
            error!(error = %err, "Failed to resolve daemon socket path");
            std::process::exit(1);
        }
    };

    if let Err(err) = prepare_socket_dir(&socket_path) {
        error!(error = %err, "Failed to prepare daemon socket directory");
        std::process::exit(1);
    }

    if let Err(err) = remove_existing_socket(&socket_path) {
        error!(error = %err, path = %socket_path.display(), "Failed to remove existing socket");
        std::process::exit(1);
    }

    let listener = match UnixListener::bind(&socket_path) {
        Ok(listener) => listener,
        Err(err) => {
            error!(error = %err, path = %socket_path.display(), "Failed to bind daemon socket");
            std::process::exit(1);
        }
    };

    info!(path = %socket_path.display(), "factcheck daemon started");

    let db_path = match config::default_db_path() {
        Ok(path) => path,
        Err(err) => {
            error!(error = %err, "Failed to resolve daemon database path");
            std::process::exit(1);
        }
    };

    let db = match Db::new(db_path) {
        Ok(db) => db,
        Err(err) => {
            error!(error = %err, "Failed to initialize daemon database");
            std::process::exit(1);
        }
    };
    info!(path = %db.path().display(), "Check state store opened");

    let settings = match config::load_config(None) {
        Ok(settings) => settings,
        Err(err) => {
            warn!(error = %err, "Failed to load config; using defaults");
            config::FactcheckConfig::default()
        }
    };
    if settings.service.api_key().is_none() {
        warn!(
            env = %settings.service.api_key_env,
            "API key is not set; checks will fail until it is"
        );
    }
    info!(
        endpoint = %settings.service.endpoint,
        model = %settings.service.model,
        timeout_secs = settings.service.timeout_secs,
        "Analysis service configured"
    );

    let shared_state = Arc::new(SharedState::new(db));
    let service = HttpAnalysisService::new(settings.service);
    let coordinator = Arc::new(Coordinator::new(shared_state, Box::new(service)));

    for stream in listener.incoming() {
        match stream {
            Ok(stream) => {
                let coordinator = Arc::clone(&coordinator);
                thread::spawn(|| handle_connection(stream, coordinator));
            }
            Err(err) => {
                warn!(error = %err, "Failed to accept daemon connection");
            }
        }
    }
}

fn init_logging() {
    let debug_enabled = env::var("FACTCHECK_DEBUG_LOG")
        .map(|value| matches!(value.as_str(), "1" | "true" | "TRUE" | "yes" | "YES"))
        .unwrap_or(false);
    let filter = if debug_enabled {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn prepare_socket_dir(socket_path: &Path) -> Result<(), String> {
    let parent = socket_path
        .parent()
        .ok_or_else(|| "Socket path has no parent".to_string())?;
    fs::create_dir_all(parent).map_err(|err| format!("Failed to create socket directory: {}", err))
}

fn remove_existing_socket(socket_path: &Path) -> Result<(), String> {
    if socket_path.exists() {
        fs::remove_file(socket_path)
            .map_err(|err| format!("Failed to remove existing socket: {}", err))?;
    }
    Ok(())
}

fn handle_connection(mut stream: UnixStream, coordinator: Arc<Coordinator>) {
    let request = match read_request(&mut stream) {
        Ok(request) => request,
        Err(err) => {
            warn!(code = %err.code, message = %err.message, "Failed to read request");
            let response = Response::error_with_info(None, err);
            let _ = write_response(&mut stream, response);
            return;
        }
    };

    tracing::debug!(method = ?request.method, id = ?request.id, "Daemon request received");

    if request.method == Method::Subscribe && request.protocol_version == PROTOCOL_VERSION {
        subscribe(stream, request, &coordinator);
        return;
    }

    let response = handle_request(request, coordinator);
    let _ = write_response(&mut stream, response);
}

/// Acknowledges with the current state, then hands the stream to the
/// broadcaster. The stream is closed when a push write fails.
fn subscribe(mut stream: UnixStream, request: Request, coordinator: &Coordinator) {
    let state = coordinator.state();
    let snapshot = state.snapshot();
    let data = match serde_json::to_value(&snapshot) {
        Ok(value) => serde_json::json!({ "subscribed": true, "state": value }),
        Err(err) => {
            let response = Response::error(
                request.id,
                "serialization_error",
                format!("Failed to serialize state: {}", err),
            );
            let _ = write_response(&mut stream, response);
            return;
        }
    };

    if let Err(err) = write_response(&mut stream, Response::ok(request.id, data)) {
        warn!(error = %err, "Failed to acknowledge subscription");
        return;
    }
    state.subscribe(stream);
    info!(subscribers = state.subscriber_count(), "Presenter subscribed");
}

fn read_request(stream: &mut UnixStream) -> Result<Request, ErrorInfo> {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(READ_TIMEOUT_SECS)));

    let mut buffer = Vec::new();
    let mut chunk = [0u8; READ_CHUNK_SIZE];

    loop {
        match stream.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => {
                buffer.extend_from_slice(&chunk[..n]);
                if buffer.len() > MAX_REQUEST_BYTES {
                    return Err(ErrorInfo::new(
                        "request_too_large",
                        "request exceeded maximum size",
                    ));
                }
                if chunk[..n].contains(&b'\n') {
                    break;
                }
            }
            Err(err)
                if matches!(
                    err.kind(),
                    std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
                ) =>
            {
                return Err(ErrorInfo::new("read_timeout", "request timed out"));
            }
            Err(err) => {
                return Err(ErrorInfo::new(
                    "read_error",
                    format!("failed to read request: {}", err),
                ));
            }
        }
    }

    if buffer.is_empty() {
        return Err(ErrorInfo::new("empty_request", "request body was empty"));
    }

    let newline_index = buffer.iter().position(|b| *b == b'\n');
    let request_bytes = match newline_index {
        Some(index) => {
            if buffer.len() > index + 1 {
                let trailing = &buffer[index + 1..];
                if trailing.iter().any(|b| !b.is_ascii_whitespace()) {
                    warn!("Extra bytes detected after newline; ignoring trailing data");
                }
            }
            &buffer[..index]
        }
        None => buffer.as_slice(),
    };

    if request_bytes.iter().all(|b| b.is_ascii_whitespace()) {
        return Err(ErrorInfo::new("empty_request", "request body was empty"));
    }

    serde_json::from_slice(request_bytes).map_err(|err| {
        ErrorInfo::new(
            "invalid_json",
            format!("request was not valid JSON: {}", err),
        )
    })
}

fn handle_request(request: Request, coordinator: Arc<Coordinator>) -> Response {
    if request.protocol_version != PROTOCOL_VERSION {
        return Response::error(
            request.id,
            "protocol_mismatch",
            "unsupported protocol version",
        );
    }

    let state = coordinator.state();
    match request.method {
        Method::GetHealth => {
            let snapshot = state.snapshot();
            Response::ok(
                request.id,
                serde_json::json!({
                    "status": "ok",
                    "pid": std::process::id(),
                    "version": env!("CARGO_PKG_VERSION"),
                    "protocol_version": PROTOCOL_VERSION,
                    "request_id": snapshot.request_id,
                    "check_status": snapshot.status.as_str(),
                    "subscribers": state.subscriber_count(),
                }),
            )
        }
        Method::GetState => state_response(request.id, &state.snapshot()),
        Method::SetTheme => {
            let params = match request.params {
                Some(params) => params,
                None => return Response::error(request.id, "invalid_params", "theme is required"),
            };
            let theme = match parse_theme(params) {
                Ok(theme) => theme,
                Err(err) => return Response::error_with_info(request.id, err),
            };
            info!(theme = theme.as_str(), "Theme updated");
            state_response(request.id, &state.set_theme(theme))
        }
        Method::Subscribe => Response::error(
            request.id,
            "invalid_request",
            "subscribe must be the only request on its connection",
        ),
        Method::Message => handle_message(request, coordinator),
    }
}

fn handle_message(request: Request, coordinator: Arc<Coordinator>) -> Response {
    let params = match request.params {
        Some(params) => params,
        None => return Response::error(request.id, "invalid_params", "message payload is required"),
    };

    let message = match parse_message(params) {
        Ok(message) => message,
        Err(err) => return Response::error_with_info(request.id, err),
    };

    match message {
        Message::FactCheck { text } => {
            let ticket = match coordinator.begin(&text) {
                Ok(ticket) => ticket,
                Err(err) => {
                    info!(code = err.kind.code(), message = %err.message, "Rejected selection");
                    return Response::error_with_info(request.id, ErrorInfo::from(err));
                }
            };

            let request_id = ticket.request_id;
            let worker = Arc::clone(&coordinator);
            let spawned = thread::Builder::new()
                .name(format!("check-{}", request_id))
                .spawn(move || {
                    let _ = worker.run(ticket);
                });
            if let Err(err) = spawned {
                error!(error = %err, request_id, "Failed to spawn check worker");
                coordinator.state().finish_request(
                    request_id,
                    Err(CheckError::service(None, "Failed to start the check")),
                );
            }

            Response::ok(
                request.id,
                serde_json::json!({ "accepted": true, "request_id": request_id }),
            )
        }
        Message::GetSelectedText => Response::ok(
            request.id,
            serde_json::json!({ "text": coordinator.state().selected_text() }),
        ),
        other => Response::error(
            request.id,
            "unsupported_action",
            format!("{} is not accepted by the daemon", other.action()),
        ),
    }
}

fn state_response(id: Option<String>, snapshot: &PersistedState) -> Response {
    match serde_json::to_value(snapshot) {
        Ok(value) => Response::ok(id, value),
        Err(err) => Response::error(
            id,
            "serialization_error",
            format!("Failed to serialize state: {}", err),
        ),
    }
}

fn write_response(stream: &mut UnixStream, response: Response) -> std::io::Result<()> {
    serde_json::to_writer(&mut *stream, &response)?;
    stream.write_all(b"\n")?;
    stream.flush()?;
    Ok(())
}
