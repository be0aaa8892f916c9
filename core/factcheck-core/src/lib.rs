//! # factcheck-core
//!
//! Shared logic for factcheck clients: configuration, the selection detector
//! that turns raw selection events into check requests, and the result
//! presenter that follows daemon state and renders it.
//!
//! ## Design Principles
//!
//! - **Synchronous**: No async runtime. Blocking work runs on plain threads.
//! - **Transport-agnostic**: The presenter reads state through
//!   [`presenter::StateSource`] and push frames through a channel, so the
//!   socket client lives in the CLI crate.
//! - **Graceful degradation**: A missing config file yields defaults; a page
//!   title that cannot be fetched falls back to the raw URL.

pub mod config;
pub mod error;
pub mod presenter;
pub mod selection;

pub use config::{FactcheckConfig, PresenterConfig, ServiceConfig};
pub use error::{CoreError, Result};
pub use selection::{Affordance, DetectorAction, Point, Rect, SelectionDetector, Viewport};
