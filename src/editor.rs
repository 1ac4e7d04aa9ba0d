// ============================================================================
// EDITOR FACADE: the single entry point hosts drive the editor through
// ============================================================================
//
// One `EditorFacade` owns one `EditorState`.  Every intent takes `&mut self`,
// validates before it mutates, and records at most one history entry.  An
// open stroke is closed before any other intent runs.
// ============================================================================

use image::Rgba;

use crate::canvas::{
    CompositeMode, Layer, LayerId, LayerProperty, LayerStack, MoveDirection, RasterSurface,
};
use crate::components::gesture::{ContactId, ImageOverlay, OverlayTransform, Point};
use crate::components::history::{HistoryEntry, HistoryManager};
use crate::components::tools::{BrushSettings, StrokeEvent, StrokeTracker};
use crate::error::{EditorError, Result};
use crate::io;
use crate::ops::{fill, transform};
use crate::settings::EditorSettings;
use crate::{log_info, log_warn};

/// What a mutating intent did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ActionOutcome {
    /// The editor state differs from before the intent.
    pub changed: bool,
    /// One undo entry was pushed for it.  False with `changed == true` means
    /// the history snapshot could not be allocated.
    pub history_recorded: bool,
}

impl ActionOutcome {
    pub const UNCHANGED: ActionOutcome = ActionOutcome { changed: false, history_recorded: false };
}

impl From<StrokeEvent> for ActionOutcome {
    fn from(event: StrokeEvent) -> Self {
        ActionOutcome {
            changed: event.changed,
            history_recorded: event.history_recorded,
        }
    }
}

/// Which part of the stack an action's undo snapshot covers.
#[derive(Clone, Copy, Debug)]
enum Scope {
    Layer(usize),
    Stack,
}

/// The pre-action snapshot, if one could be taken.
struct Pending {
    entry: Option<HistoryEntry>,
    scope: Scope,
}

/// All mutable editor data.
#[derive(Debug)]
pub struct EditorState {
    pub stack: LayerStack,
    pub history: HistoryManager,
    pub brush: BrushSettings,
    pub settings: EditorSettings,
    stroke: Option<StrokeTracker>,
    overlay: Option<ImageOverlay>,
    last_outcome: ActionOutcome,
    #[cfg(test)]
    fail_captures: bool,
}

impl EditorState {
    fn new(stack: LayerStack, settings: EditorSettings) -> Self {
        Self {
            stack,
            history: settings.new_history(),
            brush: settings.brush,
            settings,
            stroke: None,
            overlay: None,
            last_outcome: ActionOutcome::UNCHANGED,
            #[cfg(test)]
            fail_captures: false,
        }
    }
}

pub struct EditorFacade {
    state: EditorState,
}

impl EditorFacade {
    /// A `width × height` editor with one transparent layer and default
    /// settings.
    pub fn new(width: u32, height: u32) -> Self {
        Self::with_settings_and_size(EditorSettings::default(), width, height)
    }

    /// Canvas size and tunables from `settings`.
    pub fn with_settings(settings: EditorSettings) -> Self {
        let (w, h) = (settings.canvas_width, settings.canvas_height);
        Self::with_settings_and_size(settings, w, h)
    }

    pub fn with_settings_and_size(settings: EditorSettings, width: u32, height: u32) -> Self {
        Self {
            state: EditorState::new(LayerStack::new(width, height), settings),
        }
    }

    /// Start from an existing image as the bottom layer.
    pub fn from_surface(surface: RasterSurface, settings: EditorSettings) -> Self {
        let mut stack = LayerStack::new(surface.width(), surface.height());
        stack.active_layer_mut().surface = surface;
        Self {
            state: EditorState::new(stack, settings),
        }
    }

    // ---- queries ------------------------------------------------------------

    pub fn state(&self) -> &EditorState {
        &self.state
    }

    pub fn stack(&self) -> &LayerStack {
        &self.state.stack
    }

    pub fn history(&self) -> &HistoryManager {
        &self.state.history
    }

    pub fn brush(&self) -> BrushSettings {
        self.state.brush
    }

    pub fn settings(&self) -> &EditorSettings {
        &self.state.settings
    }

    pub fn width(&self) -> u32 {
        self.state.stack.width()
    }

    pub fn height(&self) -> u32 {
        self.state.stack.height()
    }

    pub fn active_layer_id(&self) -> LayerId {
        self.state.stack.active_layer().id
    }

    pub fn layer_ids(&self) -> Vec<LayerId> {
        self.state.stack.layers().iter().map(|l| l.id).collect()
    }

    pub fn is_stroking(&self) -> bool {
        self.state.stroke.is_some()
    }

    pub fn overlay(&self) -> Option<&ImageOverlay> {
        self.state.overlay.as_ref()
    }

    pub fn overlay_transform(&self) -> Option<OverlayTransform> {
        self.state.overlay.as_ref().map(|o| o.controller.transform())
    }

    /// Outcome of the most recent mutating intent.
    pub fn last_outcome(&self) -> ActionOutcome {
        self.state.last_outcome
    }

    /// Visible layers flattened bottom-to-top.
    pub fn composite(&self) -> RasterSurface {
        self.state.stack.composite(true)
    }

    /// Every layer flattened, hidden ones included.
    pub fn composite_all(&self) -> RasterSurface {
        self.state.stack.composite(false)
    }

    // ---- action bracketing --------------------------------------------------

    /// Close an open stroke, recording its entry.
    fn finish_stroke(&mut self) -> ActionOutcome {
        let Some(stroke) = self.state.stroke.take() else {
            return ActionOutcome::UNCHANGED;
        };
        let event = stroke.finish(&self.state.stack, &mut self.state.history);
        if event.changed {
            log_info!("{} on layer {}", event.description, event.layer_index);
        }
        let outcome = ActionOutcome::from(event);
        self.state.last_outcome = outcome;
        outcome
    }

    /// Capture the pre-action snapshot.  Failure is logged and the action
    /// goes ahead without history.
    fn capture(&self, description: &str, scope: Scope) -> Pending {
        let captured = match scope {
            Scope::Layer(index) => HistoryEntry::layer(description, &self.state.stack, index),
            Scope::Stack => HistoryEntry::stack(description, &self.state.stack),
        };
        #[cfg(test)]
        let captured = if self.state.fail_captures {
            Err(EditorError::resource("snapshot allocation refused"))
        } else {
            captured
        };
        let entry = match captured {
            Ok(entry) => Some(entry),
            Err(e) => {
                log_warn!("{}: proceeding without undo: {}", description, e);
                None
            }
        };
        Pending { entry, scope }
    }

    /// Push the snapshot if the action changed anything.  `changed` is used
    /// only when no snapshot exists to compare against.
    ///
    /// A structural change without a snapshot clears the history: older
    /// entries were taken against a layer order that is gone.
    fn commit(&mut self, before: Pending, changed: bool) -> ActionOutcome {
        let outcome = match before.entry {
            Some(entry) => {
                let recorded = self.state.history.push_if_changed(entry, &self.state.stack);
                ActionOutcome { changed: recorded, history_recorded: recorded }
            }
            None => {
                let history = &mut self.state.history;
                if changed && matches!(before.scope, Scope::Stack) && (history.can_undo() || history.can_redo()) {
                    log_warn!(
                        "history: dropping {} undo and {} redo entries after an unrecorded layer change",
                        history.undo_count(),
                        history.redo_count()
                    );
                    history.clear();
                }
                ActionOutcome { changed, history_recorded: false }
            }
        };
        self.state.last_outcome = outcome;
        outcome
    }

    fn unchanged(&mut self) -> ActionOutcome {
        self.state.last_outcome = ActionOutcome::UNCHANGED;
        ActionOutcome::UNCHANGED
    }

    fn reject_if_overlay_open(&self, what: &str) -> Result<()> {
        if self.state.overlay.is_some() {
            return Err(EditorError::invalid(format!("cannot {} while an image overlay is open", what)));
        }
        Ok(())
    }

    // ---- pointer input ------------------------------------------------------

    /// With an overlay open the contact feeds the gesture controller;
    /// otherwise the first contact starts a stroke with the current brush.
    pub fn pointer_down(&mut self, id: ContactId, x: f64, y: f64) -> Result<()> {
        if let Some(overlay) = self.state.overlay.as_mut() {
            overlay.controller.pointer_down(id, Point::new(x, y));
            return Ok(());
        }
        if self.state.stroke.is_some() {
            // Only one contact paints at a time
            return Ok(());
        }
        let stroke = StrokeTracker::start(&self.state.stack, self.state.brush, Some(id))?;
        self.state.stroke = Some(stroke);
        self.extend_stroke(x as f32, y as f32)
    }

    pub fn pointer_move(&mut self, id: ContactId, x: f64, y: f64) -> Result<()> {
        if let Some(overlay) = self.state.overlay.as_mut() {
            overlay.controller.pointer_move(id, Point::new(x, y));
            return Ok(());
        }
        match &self.state.stroke {
            Some(stroke) if stroke.contact == Some(id) => self.extend_stroke(x as f32, y as f32),
            _ => Ok(()),
        }
    }

    pub fn pointer_up(&mut self, id: ContactId) -> ActionOutcome {
        if let Some(overlay) = self.state.overlay.as_mut() {
            overlay.controller.pointer_up(id);
            return ActionOutcome::UNCHANGED;
        }
        match &self.state.stroke {
            Some(stroke) if stroke.contact == Some(id) => self.finish_stroke(),
            _ => ActionOutcome::UNCHANGED,
        }
    }

    /// Wheel zoom about `(focal_x, focal_y)`.  Returns whether an overlay
    /// consumed it.
    pub fn wheel(&mut self, delta_sign: f64, focal_x: f64, focal_y: f64) -> bool {
        match self.state.overlay.as_mut() {
            Some(overlay) => {
                overlay.controller.wheel(delta_sign, Point::new(focal_x, focal_y));
                true
            }
            None => false,
        }
    }

    pub fn zoom_in(&mut self) -> bool {
        self.with_overlay(|o| o.controller.zoom_in())
    }

    pub fn zoom_out(&mut self) -> bool {
        self.with_overlay(|o| o.controller.zoom_out())
    }

    pub fn rotate_left(&mut self) -> bool {
        self.with_overlay(|o| o.controller.rotate_left())
    }

    pub fn rotate_right(&mut self) -> bool {
        self.with_overlay(|o| o.controller.rotate_right())
    }

    fn with_overlay(&mut self, f: impl FnOnce(&mut ImageOverlay)) -> bool {
        match self.state.overlay.as_mut() {
            Some(overlay) => {
                f(overlay);
                true
            }
            None => false,
        }
    }

    // ---- strokes ------------------------------------------------------------

    pub fn set_brush(&mut self, brush: BrushSettings) -> Result<()> {
        brush.validate()?;
        self.state.brush = brush;
        Ok(())
    }

    /// Open a stroke on the active layer (closing any open one first).
    pub fn begin_stroke(&mut self, color: Rgba<u8>, width: f32, mode: CompositeMode) -> Result<()> {
        self.reject_if_overlay_open("paint")?;
        let brush = BrushSettings::new(color, width, mode);
        brush.validate()?;
        self.finish_stroke();
        self.state.stroke = Some(StrokeTracker::start(&self.state.stack, brush, None)?);
        Ok(())
    }

    pub fn extend_stroke(&mut self, x: f32, y: f32) -> Result<()> {
        let stroke = self
            .state
            .stroke
            .as_mut()
            .ok_or_else(|| EditorError::invalid("no stroke in progress"))?;
        stroke.extend(&mut self.state.stack, x, y)
    }

    /// Close the open stroke.  A no-op without one.
    pub fn end_stroke(&mut self) -> ActionOutcome {
        self.finish_stroke()
    }

    // ---- fills --------------------------------------------------------------

    /// Flood fill the active layer from the pixel under `(x, y)`.
    pub fn flood_fill_at(&mut self, x: f32, y: f32, color: Rgba<u8>, tolerance: f32) -> Result<ActionOutcome> {
        self.finish_stroke();
        if !x.is_finite() || !y.is_finite() {
            return Err(EditorError::validation(format!("fill point ({}, {}) is not finite", x, y)));
        }
        let (sx, sy) = (x.floor() as i64, y.floor() as i64);
        let index = self.state.stack.active_index();
        {
            let surface = &self.state.stack.active_layer().surface;
            if !surface.contains(sx, sy) {
                return Err(EditorError::validation(format!(
                    "fill seed ({}, {}) outside {}×{} layer",
                    sx,
                    sy,
                    surface.width(),
                    surface.height()
                )));
            }
            if tolerance.is_nan() || tolerance < 0.0 {
                return Err(EditorError::validation(format!("fill tolerance must be >= 0, got {}", tolerance)));
            }
            // Nothing to do: skip the snapshot copy
            if surface.get_pixel(sx as u32, sy as u32) == Some(color) {
                return Ok(self.unchanged());
            }
        }

        let before = self.capture("Fill", Scope::Layer(index));
        let written = fill::flood_fill(&mut self.state.stack.active_layer_mut().surface, sx, sy, color, tolerance)?;
        Ok(self.commit(before, written > 0))
    }

    /// Paint the whole active layer with one color.
    pub fn fill_active_layer(&mut self, color: Rgba<u8>) -> Result<ActionOutcome> {
        self.finish_stroke();
        let index = self.state.stack.active_index();
        let before = self.capture("Fill Layer", Scope::Layer(index));
        self.state.stack.active_layer_mut().surface.fill(color);
        Ok(self.commit(before, true))
    }

    pub fn clear_active_layer(&mut self) -> Result<ActionOutcome> {
        self.finish_stroke();
        let index = self.state.stack.active_index();
        let before = self.capture("Clear Layer", Scope::Layer(index));
        self.state.stack.active_layer_mut().surface.clear();
        Ok(self.commit(before, true))
    }

    // ---- layer structure ----------------------------------------------------

    pub fn add_layer(&mut self) -> Result<LayerId> {
        self.finish_stroke();
        let before = self.capture("Add Layer", Scope::Stack);
        let id = self.state.stack.add_layer();
        self.commit(before, true);
        log_info!("layer added: {}", id);
        Ok(id)
    }

    pub fn delete_layer(&mut self, id: LayerId) -> Result<ActionOutcome> {
        self.finish_stroke();
        self.state.stack.index_of(id)?;
        if self.state.stack.len() <= 1 {
            return Err(EditorError::invalid("cannot delete the last layer"));
        }
        let before = self.capture("Delete Layer", Scope::Stack);
        self.state.stack.delete_layer(id)?;
        Ok(self.commit(before, true))
    }

    /// Swap with the neighbor in `dir`.  At the stack edge nothing changes
    /// and no history is recorded.
    pub fn move_layer(&mut self, id: LayerId, dir: MoveDirection) -> Result<ActionOutcome> {
        self.finish_stroke();
        let index = self.state.stack.index_of(id)?;
        let at_edge = match dir {
            MoveDirection::Up => index + 1 >= self.state.stack.len(),
            MoveDirection::Down => index == 0,
        };
        if at_edge {
            return Ok(self.unchanged());
        }
        let label = match dir {
            MoveDirection::Up => "Move Layer Up",
            MoveDirection::Down => "Move Layer Down",
        };
        let before = self.capture(label, Scope::Stack);
        let moved = self.state.stack.move_layer(id, dir)?;
        Ok(self.commit(before, moved))
    }

    pub fn merge_layer(&mut self, id: LayerId, target_id: LayerId) -> Result<ActionOutcome> {
        self.finish_stroke();
        let src = self.state.stack.index_of(id)?;
        let dst = self.state.stack.index_of(target_id)?;
        if src == dst {
            return Err(EditorError::invalid("cannot merge a layer into itself"));
        }
        let before = self.capture("Merge Layer", Scope::Stack);
        self.state.stack.merge_layer(id, target_id)?;
        Ok(self.commit(before, true))
    }

    /// Merge the active layer down (or up from the bottom).  Returns the
    /// surviving layer.
    pub fn merge_active_with_neighbor(&mut self) -> Result<LayerId> {
        self.finish_stroke();
        if self.state.stack.neighbor_of_active().is_none() {
            return Err(EditorError::invalid("no neighbor layer to merge with"));
        }
        let before = self.capture("Merge Layer", Scope::Stack);
        let target = self.state.stack.merge_active_with_neighbor()?;
        self.commit(before, true);
        Ok(target)
    }

    /// Selection is not an undoable action.
    pub fn set_active_layer(&mut self, id: LayerId) -> Result<()> {
        self.finish_stroke();
        self.state.stack.set_active(id)
    }

    pub fn set_layer_property(&mut self, id: LayerId, prop: LayerProperty) -> Result<ActionOutcome> {
        self.finish_stroke();
        let index = self.state.stack.index_of(id)?;
        prop.validate()?;
        let label = format!("Layer {}", prop.label());
        let before = self.capture(&label, Scope::Layer(index));
        self.state.stack.layer_mut(index)?.set_property(prop)?;
        Ok(self.commit(before, true))
    }

    /// Resample every layer to a new canvas size.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<ActionOutcome> {
        self.finish_stroke();
        RasterSurface::try_new(width, height)?;
        if (width, height) == (self.width(), self.height()) {
            return Ok(self.unchanged());
        }
        let before = self.capture("Resize Canvas", Scope::Stack);
        self.state.stack.resize(width, height)?;
        Ok(self.commit(before, true))
    }

    // ---- serialization ------------------------------------------------------

    pub fn serialize_layer(&self, id: LayerId) -> Result<Vec<u8>> {
        io::serialize_layer(self.state.stack.layer_by_id(id)?)
    }

    pub fn deserialize_layer(&self, blob: &[u8]) -> Result<Layer> {
        io::deserialize_layer(blob)
    }

    /// Insert a serialized layer above the active one, stretched to the
    /// canvas size if needed.
    pub fn import_layer(&mut self, blob: &[u8]) -> Result<LayerId> {
        self.finish_stroke();
        let mut layer = io::deserialize_layer(blob)?;
        let (w, h) = (self.width(), self.height());
        if layer.surface.dimensions() != (w, h) {
            layer.surface = transform::resample(&layer.surface, w, h)?;
        }
        let before = self.capture("Import Layer", Scope::Stack);
        let index = self.state.stack.active_index() + 1;
        let id = self.state.stack.insert_layer(index, layer)?;
        self.commit(before, true);
        Ok(id)
    }

    // ---- image overlay ------------------------------------------------------

    /// Float a decoded image over the canvas, fitted and centered.
    pub fn begin_image_overlay(&mut self, image: RasterSurface) -> Result<()> {
        self.finish_stroke();
        if self.state.overlay.is_some() {
            return Err(EditorError::invalid("an image overlay is already open"));
        }
        let viewport = (self.width() as f64, self.height() as f64);
        let overlay = ImageOverlay::new(image, viewport, self.state.settings.gesture_limits());
        log_info!(
            "overlay opened: {}×{} at scale {:.3}",
            overlay.source.width(),
            overlay.source.height(),
            overlay.controller.transform().scale
        );
        self.state.overlay = Some(overlay);
        Ok(())
    }

    /// Draw the overlay into the active layer with its final transform.
    pub fn commit_image_overlay(&mut self) -> Result<ActionOutcome> {
        let overlay = self
            .state
            .overlay
            .take()
            .ok_or_else(|| EditorError::invalid("no image overlay to commit"))?;
        let index = self.state.stack.active_index();
        let before = self.capture("Insert Image", Scope::Layer(index));
        let affine = overlay.affine();
        self.state
            .stack
            .active_layer_mut()
            .surface
            .blit_transformed(&overlay.source, &affine, CompositeMode::Normal);
        Ok(self.commit(before, true))
    }

    /// Drop the overlay without touching any layer.  Returns whether one
    /// was open.
    pub fn cancel_image_overlay(&mut self) -> bool {
        self.state.overlay.take().is_some()
    }

    // ---- history ------------------------------------------------------------

    pub fn undo(&mut self) -> bool {
        self.finish_stroke();
        self.state.history.undo(&mut self.state.stack).is_some()
    }

    pub fn redo(&mut self) -> bool {
        self.finish_stroke();
        self.state.history.redo(&mut self.state.stack).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);
    const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);
    const BLACK: Rgba<u8> = Rgba([0, 0, 0, 255]);

    #[test]
    fn test_pointer_stroke_is_single_undo() {
        let mut editor = EditorFacade::new(40, 40);
        editor.pointer_down(7, 5.0, 5.0).unwrap();
        for i in 0..30 {
            editor.pointer_move(7, 5.0 + i as f64, 5.0 + i as f64 * 0.5).unwrap();
        }
        let outcome = editor.pointer_up(7);
        assert!(outcome.changed && outcome.history_recorded);
        assert_eq!(editor.history().undo_count(), 1);
        assert!(editor.undo());
        assert!(editor.composite_all().is_blank());
    }

    #[test]
    fn test_second_contact_does_not_paint() {
        let mut editor = EditorFacade::new(20, 20);
        editor.pointer_down(1, 2.0, 2.0).unwrap();
        editor.pointer_down(2, 15.0, 15.0).unwrap();
        editor.pointer_move(2, 16.0, 16.0).unwrap();
        editor.pointer_up(1);
        assert_eq!(editor.stack().active_layer().surface.get_pixel(15, 15).unwrap()[3], 0);
        assert_eq!(editor.history().undo_count(), 1);
    }

    #[test]
    fn test_undo_closes_open_stroke() {
        let mut editor = EditorFacade::new(20, 20);
        editor.begin_stroke(BLACK, 3.0, CompositeMode::Normal).unwrap();
        editor.extend_stroke(1.0, 1.0).unwrap();
        editor.extend_stroke(10.0, 10.0).unwrap();
        assert!(editor.undo());
        assert!(!editor.is_stroking());
        assert!(editor.composite_all().is_blank());
    }

    #[test]
    fn test_extend_without_stroke_fails() {
        let mut editor = EditorFacade::new(4, 4);
        assert!(matches!(editor.extend_stroke(1.0, 1.0), Err(EditorError::InvalidOperation(_))));
    }

    #[test]
    fn test_noop_fill_records_nothing() {
        let mut editor = EditorFacade::new(6, 6);
        editor.fill_active_layer(WHITE).unwrap();
        assert_eq!(editor.history().undo_count(), 1);
        let outcome = editor.flood_fill_at(2.0, 2.0, WHITE, 0.0).unwrap();
        assert!(!outcome.changed);
        assert_eq!(editor.history().undo_count(), 1);
    }

    #[test]
    fn test_fill_out_of_bounds_is_validation() {
        let mut editor = EditorFacade::new(6, 6);
        let err = editor.flood_fill_at(6.0, 0.0, RED, 0.0).unwrap_err();
        assert!(matches!(err, EditorError::Validation(_)));
        assert!(!editor.history().can_undo());
    }

    #[test]
    fn test_move_at_edge_has_no_history() {
        let mut editor = EditorFacade::new(4, 4);
        let top = editor.add_layer().unwrap();
        let before = editor.history().undo_count();
        let outcome = editor.move_layer(top, MoveDirection::Up).unwrap();
        assert!(!outcome.changed);
        assert_eq!(editor.history().undo_count(), before);
    }

    #[test]
    fn test_property_change_is_undoable() {
        let mut editor = EditorFacade::new(4, 4);
        let id = editor.active_layer_id();
        editor.set_layer_property(id, LayerProperty::Opacity(0.3)).unwrap();
        assert!((editor.stack().active_layer().opacity() - 0.3).abs() < 1e-6);
        assert!(editor.undo());
        assert_eq!(editor.stack().active_layer().opacity(), 1.0);
        let err = editor.set_layer_property(id, LayerProperty::Saturation(0.0)).unwrap_err();
        assert!(matches!(err, EditorError::Validation(_)));
    }

    #[test]
    fn test_overlay_commit_and_cancel() {
        let mut editor = EditorFacade::new(10, 10);
        let image = RasterSurface::new_filled(10, 10, RED);

        editor.begin_image_overlay(image.clone()).unwrap();
        assert!(matches!(editor.begin_image_overlay(image.clone()), Err(EditorError::InvalidOperation(_))));
        assert!(editor.cancel_image_overlay());
        assert!(editor.composite_all().is_blank());
        assert!(!editor.history().can_undo());

        editor.begin_image_overlay(image).unwrap();
        let outcome = editor.commit_image_overlay().unwrap();
        assert!(outcome.history_recorded);
        assert!(editor.composite().pixels().iter().all(|p| *p == RED.0));
        assert_eq!(editor.history().undo_count(), 1);
        assert!(matches!(editor.commit_image_overlay(), Err(EditorError::InvalidOperation(_))));
    }

    #[test]
    fn test_overlay_takes_pointer_input() {
        let mut editor = EditorFacade::new(100, 100);
        editor.begin_image_overlay(RasterSurface::new_filled(10, 10, RED)).unwrap();
        editor.pointer_down(1, 50.0, 50.0).unwrap();
        editor.pointer_move(1, 60.0, 55.0).unwrap();
        editor.pointer_up(1);
        let t = editor.overlay_transform().unwrap();
        assert_eq!((t.tx, t.ty), (55.0, 50.0));
        assert!(editor.composite_all().is_blank());
        assert!(editor.zoom_in());
        editor.cancel_image_overlay();
        assert!(!editor.zoom_in());
    }

    #[test]
    fn test_fill_without_snapshot_still_paints() {
        let mut editor = EditorFacade::new(6, 6);
        editor.fill_active_layer(WHITE).unwrap();
        editor.state.fail_captures = true;

        let outcome = editor.flood_fill_at(1.0, 1.0, RED, 0.0).unwrap();
        assert!(outcome.changed);
        assert!(!outcome.history_recorded);
        assert_eq!(editor.history().undo_count(), 1);
        assert_eq!(editor.stack().active_layer().surface.get_pixel(1, 1), Some(RED));
    }

    #[test]
    fn test_unrecorded_move_clears_history() {
        let mut editor = EditorFacade::new(4, 4);
        let bottom = editor.active_layer_id();
        let top = editor.add_layer().unwrap();
        editor.set_active_layer(bottom).unwrap();
        editor.fill_active_layer(RED).unwrap();
        assert!(editor.history().can_undo());

        editor.state.fail_captures = true;
        let outcome = editor.move_layer(bottom, MoveDirection::Up).unwrap();
        assert!(outcome.changed);
        assert!(!editor.last_outcome().history_recorded);
        assert!(!editor.history().can_undo());

        assert!(!editor.undo());
        assert_eq!(editor.layer_ids(), vec![top, bottom]);
        assert_eq!(editor.stack().layer_by_id(bottom).unwrap().surface.get_pixel(0, 0), Some(RED));
        assert!(editor.stack().layer_by_id(top).unwrap().surface.is_blank());
    }

    #[test]
    fn test_import_layer_resamples() {
        let mut editor = EditorFacade::new(8, 8);
        let layer = Layer::new("Imported", 2, 2, RED);
        let blob = io::serialize_layer(&layer).unwrap();
        let id = editor.import_layer(&blob).unwrap();
        let imported = editor.stack().layer_by_id(id).unwrap();
        assert_eq!(imported.surface.dimensions(), (8, 8));
        assert_eq!(imported.name, "Imported");
        assert_eq!(editor.active_layer_id(), id);
        assert!(editor.undo());
        assert_eq!(editor.stack().len(), 1);
    }
}
