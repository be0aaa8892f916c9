//! Selection detection for the page-side context.
//!
//! Turns raw selection-change and click events into [`SelectionRequest`]s and
//! keeps track of the floating "check this" affordance. At most one
//! affordance exists at a time; it is replaced on every new selection and
//! removed by any click.
//!
//! Coordinates are viewport pixels with the origin at the top-left corner.

use factcheck_protocol::SelectionRequest;
use serde::{Deserialize, Serialize};

pub const AFFORDANCE_SIZE: f64 = 28.0;
const AFFORDANCE_GAP: f64 = 6.0;
const VIEWPORT_MARGIN: f64 = 4.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn right(&self) -> f64 {
        self.left + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.top + self.height
    }

    pub fn contains(&self, point: Point) -> bool {
        point.x >= self.left
            && point.x <= self.right()
            && point.y >= self.top
            && point.y <= self.bottom()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
}

/// The clickable button shown next to a selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Affordance {
    pub bounds: Rect,
    pub text: String,
}

impl Affordance {
    /// Places the affordance just below and to the right of the selection,
    /// clamped so it stays fully inside the viewport.
    pub fn place(selection: Rect, viewport: Viewport, text: String) -> Self {
        let size = AFFORDANCE_SIZE;
        let left = clamp_axis(selection.right() + AFFORDANCE_GAP, size, viewport.width);
        let top = clamp_axis(selection.bottom() + AFFORDANCE_GAP, size, viewport.height);
        Self {
            bounds: Rect {
                left,
                top,
                width: size,
                height: size,
            },
            text,
        }
    }
}

fn clamp_axis(position: f64, size: f64, extent: f64) -> f64 {
    let max = extent - size - VIEWPORT_MARGIN;
    if max < VIEWPORT_MARGIN {
        // Viewport smaller than the affordance: pin to the origin side.
        return VIEWPORT_MARGIN.min(max.max(0.0));
    }
    position.clamp(VIEWPORT_MARGIN, max)
}

/// What the host should do after an event.
#[derive(Debug, Clone, PartialEq)]
pub enum DetectorAction {
    /// Send this request to the coordinator.
    Emit(SelectionRequest),
    ShowAffordance(Affordance),
    HideAffordance,
}

#[derive(Debug, Default)]
pub struct SelectionDetector {
    last_reported: Option<String>,
    affordance: Option<Affordance>,
}

impl SelectionDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn affordance(&self) -> Option<&Affordance> {
        self.affordance.as_ref()
    }

    /// Handles a selection change. Empty and unchanged selections produce no
    /// actions; a new selection yields exactly one `Emit`.
    pub fn on_selection_change(
        &mut self,
        text: &str,
        bounds: Option<Rect>,
        viewport: Viewport,
    ) -> Vec<DetectorAction> {
        let request = match SelectionRequest::new(text) {
            Ok(request) => request,
            Err(_) => return Vec::new(),
        };
        if self.last_reported.as_deref() == Some(request.text.as_str()) {
            return Vec::new();
        }

        let mut actions = Vec::new();
        if self.affordance.take().is_some() {
            actions.push(DetectorAction::HideAffordance);
        }
        if let Some(bounds) = bounds {
            let affordance = Affordance::place(bounds, viewport, request.text.clone());
            self.affordance = Some(affordance.clone());
            actions.push(DetectorAction::ShowAffordance(affordance));
        }

        tracing::debug!(chars = request.text.chars().count(), "Selection changed");
        self.last_reported = Some(request.text.clone());
        actions.push(DetectorAction::Emit(request));
        actions
    }

    /// Handles a click anywhere on the page. Clicking the affordance re-emits
    /// its selection; any click removes it.
    pub fn on_click(&mut self, point: Point) -> Vec<DetectorAction> {
        let affordance = match self.affordance.take() {
            Some(affordance) => affordance,
            None => return Vec::new(),
        };

        let mut actions = vec![DetectorAction::HideAffordance];
        if affordance.bounds.contains(point) {
            if let Ok(request) = SelectionRequest::new(&affordance.text) {
                actions.push(DetectorAction::Emit(request));
            }
        }
        actions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VIEWPORT: Viewport = Viewport {
        width: 800.0,
        height: 600.0,
    };

    fn rect(left: f64, top: f64) -> Rect {
        Rect {
            left,
            top,
            width: 100.0,
            height: 20.0,
        }
    }

    fn emitted(actions: &[DetectorAction]) -> Vec<String> {
        actions
            .iter()
            .filter_map(|action| match action {
                DetectorAction::Emit(request) => Some(request.text.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn emits_once_per_distinct_selection() {
        let mut detector = SelectionDetector::new();
        let actions = detector.on_selection_change("  claim one ", Some(rect(10.0, 10.0)), VIEWPORT);
        assert_eq!(emitted(&actions), vec!["claim one"]);

        let repeat = detector.on_selection_change("claim one", Some(rect(10.0, 10.0)), VIEWPORT);
        assert!(repeat.is_empty());

        let next = detector.on_selection_change("claim two", Some(rect(10.0, 10.0)), VIEWPORT);
        assert_eq!(emitted(&next), vec!["claim two"]);
        assert_eq!(next[0], DetectorAction::HideAffordance);
    }

    #[test]
    fn ignores_empty_selection() {
        let mut detector = SelectionDetector::new();
        assert!(detector.on_selection_change(" \n ", Some(rect(0.0, 0.0)), VIEWPORT).is_empty());
        assert!(detector.affordance().is_none());
    }

    #[test]
    fn affordance_is_clamped_inside_viewport() {
        let mut detector = SelectionDetector::new();
        detector.on_selection_change("edge", Some(rect(750.0, 590.0)), VIEWPORT);
        let bounds = detector.affordance().unwrap().bounds;
        assert!(bounds.right() <= VIEWPORT.width);
        assert!(bounds.bottom() <= VIEWPORT.height);
        assert!(bounds.left >= 0.0 && bounds.top >= 0.0);
    }

    #[test]
    fn affordance_sits_next_to_selection() {
        let affordance = Affordance::place(rect(10.0, 10.0), VIEWPORT, "x".to_string());
        assert_eq!(affordance.bounds.left, 110.0 + AFFORDANCE_GAP);
        assert_eq!(affordance.bounds.top, 30.0 + AFFORDANCE_GAP);
    }

    #[test]
    fn clicking_affordance_emits_and_removes_it() {
        let mut detector = SelectionDetector::new();
        detector.on_selection_change("claim", Some(rect(10.0, 10.0)), VIEWPORT);
        let bounds = detector.affordance().unwrap().bounds;

        let actions = detector.on_click(Point {
            x: bounds.left + 1.0,
            y: bounds.top + 1.0,
        });
        assert_eq!(actions[0], DetectorAction::HideAffordance);
        assert_eq!(emitted(&actions), vec!["claim"]);
        assert!(detector.affordance().is_none());
    }

    #[test]
    fn clicking_elsewhere_only_removes_affordance() {
        let mut detector = SelectionDetector::new();
        detector.on_selection_change("claim", Some(rect(10.0, 10.0)), VIEWPORT);

        let actions = detector.on_click(Point { x: 700.0, y: 500.0 });
        assert_eq!(actions, vec![DetectorAction::HideAffordance]);
        assert!(detector.on_click(Point { x: 1.0, y: 1.0 }).is_empty());
    }

    #[test]
    fn selection_without_bounds_still_emits() {
        let mut detector = SelectionDetector::new();
        let actions = detector.on_selection_change("keyboard selection", None, VIEWPORT);
        assert_eq!(actions.len(), 1);
        assert_eq!(emitted(&actions), vec!["keyboard selection"]);
    }
}
