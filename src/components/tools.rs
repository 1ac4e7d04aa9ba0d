use image::Rgba;

use crate::canvas::{CompositeMode, LayerStack};
use crate::components::gesture::ContactId;
use crate::components::history::{HistoryEntry, HistoryManager};
use crate::error::{EditorError, Result};
use crate::log_warn;

// ============================================================================
// BRUSH SETTINGS
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BrushSettings {
    pub color: Rgba<u8>,
    /// Stroke diameter in pixels.
    pub width: f32,
    pub mode: CompositeMode,
}

impl Default for BrushSettings {
    fn default() -> Self {
        Self {
            color: Rgba([0, 0, 0, 255]),
            width: 5.0,
            mode: CompositeMode::Normal,
        }
    }
}

impl BrushSettings {
    pub fn new(color: Rgba<u8>, width: f32, mode: CompositeMode) -> Self {
        Self { color, width, mode }
    }

    pub fn validate(&self) -> Result<()> {
        if self.width.is_finite() && self.width > 0.0 {
            Ok(())
        } else {
            Err(EditorError::validation(format!("brush width must be > 0, got {}", self.width)))
        }
    }

    /// History label for strokes made with these settings.
    pub fn description(&self) -> &'static str {
        match self.mode {
            CompositeMode::Normal => "Brush Stroke",
            CompositeMode::Erase => "Eraser Stroke",
        }
    }
}

// ============================================================================
// STROKE TRACKER - one history entry per stroke
// ============================================================================

/// An in-progress freehand stroke.
///
/// The target layer is snapshotted once when the stroke starts; segments
/// then paint straight onto the live surface, and [`finish`](Self::finish)
/// pushes that single snapshot.
#[derive(Debug)]
pub struct StrokeTracker {
    pub layer_index: usize,
    pub brush: BrushSettings,
    /// The contact driving this stroke, when it came from pointer input.
    pub contact: Option<ContactId>,
    before: Option<HistoryEntry>,
    last_point: Option<(f32, f32)>,
}

/// Emitted when a stroke completes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StrokeEvent {
    pub layer_index: usize,
    pub description: String,
    /// False when the stroke left the layer untouched.
    pub changed: bool,
    /// False when the stroke changed pixels but no undo entry exists for it.
    pub history_recorded: bool,
}

impl StrokeTracker {
    /// Start a stroke on the active layer.  A failed snapshot is logged and
    /// the stroke proceeds without history.
    pub fn start(stack: &LayerStack, brush: BrushSettings, contact: Option<ContactId>) -> Result<Self> {
        brush.validate()?;
        let layer_index = stack.active_index();
        let before = match HistoryEntry::layer(brush.description(), stack, layer_index) {
            Ok(entry) => Some(entry),
            Err(e) => {
                log_warn!("stroke: no undo snapshot for layer {}: {}", layer_index, e);
                None
            }
        };
        Ok(Self {
            layer_index,
            brush,
            contact,
            before,
            last_point: None,
        })
    }

    /// Paint from the previous point to `(x, y)`.  The first point stamps a
    /// round dot.
    pub fn extend(&mut self, stack: &mut LayerStack, x: f32, y: f32) -> Result<()> {
        if !x.is_finite() || !y.is_finite() {
            return Err(EditorError::validation(format!("stroke point ({}, {}) is not finite", x, y)));
        }
        let from = self.last_point.unwrap_or((x, y));
        let layer = stack.layer_mut(self.layer_index)?;
        layer
            .surface
            .draw_stroke_segment(from, (x, y), self.brush.width, self.brush.color, self.brush.mode);
        self.last_point = Some((x, y));
        Ok(())
    }

    /// Close the stroke, pushing its snapshot if the layer changed.
    pub fn finish(self, stack: &LayerStack, history: &mut HistoryManager) -> StrokeEvent {
        let description = self.brush.description().to_string();
        let (changed, history_recorded) = match self.before {
            Some(entry) => {
                let recorded = history.push_if_changed(entry, stack);
                (recorded, recorded)
            }
            // Without a snapshot there is nothing to compare against
            None => (self.last_point.is_some(), false),
        };
        StrokeEvent {
            layer_index: self.layer_index,
            description,
            changed,
            history_recorded,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stroke_is_one_history_entry() {
        let mut stack = LayerStack::new(32, 32);
        let mut history = HistoryManager::default();
        let mut stroke = StrokeTracker::start(&stack, BrushSettings::default(), None).unwrap();
        for i in 0..20 {
            stroke.extend(&mut stack, i as f32, i as f32).unwrap();
        }
        let event = stroke.finish(&stack, &mut history);
        assert!(event.changed);
        assert!(event.history_recorded);
        assert_eq!(history.undo_count(), 1);
        assert_eq!(history.undo_description(), Some("Brush Stroke"));

        history.undo(&mut stack);
        assert!(stack.active_layer().surface.is_blank());
    }

    #[test]
    fn test_first_point_stamps_dot() {
        let mut stack = LayerStack::new(16, 16);
        let mut stroke = StrokeTracker::start(&stack, BrushSettings::default(), None).unwrap();
        stroke.extend(&mut stack, 8.0, 8.0).unwrap();
        assert_eq!(stack.active_layer().surface.get_pixel(8, 8), Some(Rgba([0, 0, 0, 255])));
    }

    #[test]
    fn test_empty_stroke_records_nothing() {
        let stack = LayerStack::new(8, 8);
        let mut history = HistoryManager::default();
        let stroke = StrokeTracker::start(&stack, BrushSettings::default(), None).unwrap();
        let event = stroke.finish(&stack, &mut history);
        assert!(!event.changed);
        assert!(!history.can_undo());
    }

    #[test]
    fn test_invalid_width_rejected() {
        let stack = LayerStack::new(8, 8);
        let brush = BrushSettings::new(Rgba([0, 0, 0, 255]), 0.0, CompositeMode::Normal);
        assert!(StrokeTracker::start(&stack, brush, None).is_err());
    }

    #[test]
    fn test_eraser_description() {
        let brush = BrushSettings::new(Rgba([0, 0, 0, 255]), 3.0, CompositeMode::Erase);
        assert_eq!(brush.description(), "Eraser Stroke");
    }
}
