//! Text rendering of the presenter view.
//!
//! A frame is built from scratch on every call and only written when it
//! differs from the previous frame, so redundant notifications (a push and a
//! poll observing the same state) never produce duplicate output.

use factcheck_protocol::{CheckResult, PersistedState, Theme};
use std::io::{self, Write};

use super::titles::TitleResolver;
use super::{PresenterView, IDLE_PLACEHOLDER, NUMERIC_PLACEHOLDER};

const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";
const RULE: &str = "────────────────────────────────────────";

struct Palette {
    accent: &'static str,
    muted: &'static str,
    error: &'static str,
}

fn palette(theme: Theme) -> Palette {
    match theme {
        Theme::Dark => Palette {
            accent: "\x1b[38;5;141m",
            muted: "\x1b[38;5;246m",
            error: "\x1b[38;5;203m",
        },
        Theme::Light => Palette {
            accent: "\x1b[38;5;55m",
            muted: "\x1b[38;5;240m",
            error: "\x1b[38;5;160m",
        },
    }
}

pub struct Renderer<W: Write, T: TitleResolver> {
    out: W,
    titles: T,
    color: bool,
    last_frame: Option<String>,
}

impl<W: Write, T: TitleResolver> Renderer<W, T> {
    pub fn new(out: W, titles: T, color: bool) -> Self {
        Self {
            out,
            titles,
            color,
            last_frame: None,
        }
    }

    /// Renders `state`, returning whether anything was written.
    pub fn render(&mut self, state: &PersistedState) -> io::Result<bool> {
        let view = PresenterView::from_state(state);
        let frame = self.frame(&view, state.theme);
        if self.last_frame.as_deref() == Some(frame.as_str()) {
            return Ok(false);
        }

        self.out.write_all(frame.as_bytes())?;
        self.out.flush()?;
        self.last_frame = Some(frame);
        Ok(true)
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn frame(&self, view: &PresenterView, theme: Theme) -> String {
        let palette = palette(theme);
        let mut lines = vec![self.paint(BOLD, "FACT CHECK"), RULE.to_string()];

        match view {
            PresenterView::Idle => {
                lines.push(self.paint(palette.muted, IDLE_PLACEHOLDER));
            }
            PresenterView::Analyzing { text } => {
                lines.push(format!("\"{}\"", text));
                lines.push(String::new());
                lines.push(self.paint(palette.accent, "Analyzing..."));
            }
            PresenterView::Completed { text, result } => {
                if let Some(text) = text {
                    lines.push(format!("\"{}\"", text));
                    lines.push(String::new());
                }
                self.push_result(&mut lines, result, &palette);
            }
            PresenterView::Error { text, message } => {
                if let Some(text) = text {
                    lines.push(format!("\"{}\"", text));
                    lines.push(String::new());
                }
                lines.push(format!(
                    "Truth: {}  ({})",
                    NUMERIC_PLACEHOLDER,
                    self.paint(palette.error, "error")
                ));
                lines.push(String::new());
                lines.push(self.paint(palette.error, message));
            }
        }

        lines.push(RULE.to_string());
        let mut frame = lines.join("\n");
        frame.push('\n');
        frame
    }

    fn push_result(&self, lines: &mut Vec<String>, result: &CheckResult, palette: &Palette) {
        lines.push(format!(
            "Truth: {}  ({})",
            self.paint(palette.accent, &format!("{}%", result.truth_percentage)),
            result.verdict()
        ));
        lines.push(String::new());
        lines.push(result.summary.clone());

        if result.sources.is_empty() {
            return;
        }
        lines.push(String::new());
        lines.push(self.paint(BOLD, "Sources:"));
        let titles = self.titles.resolve_titles(&result.sources);
        for (index, url) in result.sources.iter().enumerate() {
            let entry = match titles.get(index).cloned().flatten() {
                Some(title) => format!("{}  {}", title, self.paint(palette.muted, url)),
                None => url.clone(),
            };
            lines.push(format!("  {}. {}", index + 1, entry));
        }
    }

    fn paint(&self, code: &str, text: &str) -> String {
        if self.color {
            format!("{}{}{}", code, text, RESET)
        } else {
            text.to_string()
        }
    }
}
