//! Push delivery to subscribed presenters.
//!
//! A subscriber is a client connection that sent `subscribe`. The daemon
//! keeps its stream and writes each push frame to it as one JSON line.
//! Streams that fail a write are dropped, so a closed presenter never
//! causes errors on later broadcasts.

use factcheck_protocol::Push;
use std::io::Write;
use std::os::unix::net::UnixStream;
use std::sync::Mutex;
use std::time::Duration;

const WRITE_TIMEOUT_MS: u64 = 500;

#[derive(Default)]
pub struct Subscribers {
    streams: Mutex<Vec<UnixStream>>,
}

impl Subscribers {
    pub fn add(&self, stream: UnixStream) {
        if let Err(err) = stream.set_write_timeout(Some(Duration::from_millis(WRITE_TIMEOUT_MS))) {
            tracing::debug!(error = %err, "Failed to set subscriber write timeout");
        }
        if let Ok(mut streams) = self.streams.lock() {
            streams.push(stream);
            tracing::debug!(subscribers = streams.len(), "Subscriber added");
        }
    }

    /// Writes `push` to every subscriber and returns how many received it.
    pub fn broadcast(&self, push: &Push) -> usize {
        let mut line = match serde_json::to_vec(push) {
            Ok(line) => line,
            Err(err) => {
                tracing::warn!(error = %err, "Failed to serialize push");
                return 0;
            }
        };
        line.push(b'\n');

        let Ok(mut streams) = self.streams.lock() else {
            return 0;
        };
        let before = streams.len();
        streams.retain_mut(|stream| {
            stream
                .write_all(&line)
                .and_then(|_| stream.flush())
                .is_ok()
        });

        let delivered = streams.len();
        if delivered < before {
            tracing::debug!(dropped = before - delivered, "Dropped closed subscribers");
        }
        tracing::debug!(
            request_id = push.request_id,
            action = push.message.action(),
            delivered,
            "Broadcast push"
        );
        delivered
    }

    pub fn len(&self) -> usize {
        self.streams.lock().map(|streams| streams.len()).unwrap_or(0)
    }
}
