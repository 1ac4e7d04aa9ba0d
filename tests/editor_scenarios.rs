// End-to-end scenarios driven through the public facade.

use image::Rgba;
use layerpaint::{
    CompositeMode, EditorError, EditorFacade, LayerProperty, MoveDirection, Point, RasterSurface,
};

const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);
const BLACK: Rgba<u8> = Rgba([0, 0, 0, 255]);
const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);

fn active_pixels(editor: &EditorFacade) -> Vec<u8> {
    editor.stack().active_layer().surface.as_raw().to_vec()
}

#[test]
fn test_stroke_undo_redo_scenario() {
    let mut editor = EditorFacade::new(32, 32);
    editor.begin_stroke(BLACK, 5.0, CompositeMode::Normal).unwrap();
    editor.extend_stroke(0.0, 0.0).unwrap();
    editor.extend_stroke(10.0, 10.0).unwrap();
    let outcome = editor.end_stroke();
    assert!(outcome.changed && outcome.history_recorded);

    let painted = active_pixels(&editor);
    assert_eq!(editor.stack().active_layer().surface.get_pixel(5, 5), Some(BLACK));

    assert!(editor.undo());
    assert!(editor.stack().active_layer().surface.is_blank());

    assert!(editor.redo());
    assert_eq!(active_pixels(&editor), painted);
}

#[test]
fn test_many_moves_single_undo() {
    let mut editor = EditorFacade::new(64, 64);
    editor.fill_active_layer(WHITE).unwrap();
    let before = active_pixels(&editor);

    editor.pointer_down(1, 3.0, 3.0).unwrap();
    for i in 0..200 {
        let t = i as f64 * 0.3;
        editor.pointer_move(1, 3.0 + t, 30.0 + (t * 0.2).sin() * 20.0).unwrap();
    }
    editor.pointer_up(1);
    assert_ne!(active_pixels(&editor), before);

    assert!(editor.undo());
    assert_eq!(active_pixels(&editor), before);
}

#[test]
fn test_fill_red_on_white_composites_red() {
    let mut editor = EditorFacade::new(12, 12);
    editor.fill_active_layer(WHITE).unwrap();
    let outcome = editor.flood_fill_at(5.0, 5.0, RED, 0.0).unwrap();
    assert!(outcome.changed);
    assert!(editor.stack().active_layer().surface.pixels().iter().all(|p| *p == RED.0));
    assert!(editor.composite().pixels().iter().all(|p| *p == RED.0));
}

#[test]
fn test_fill_idempotent_and_contained() {
    let mut editor = EditorFacade::new(20, 10);
    editor.fill_active_layer(WHITE).unwrap();
    editor.begin_stroke(BLACK, 3.0, CompositeMode::Normal).unwrap();
    editor.extend_stroke(10.5, -2.0).unwrap();
    editor.extend_stroke(10.5, 12.0).unwrap();
    editor.end_stroke();

    editor.flood_fill_at(2.0, 5.0, RED, 0.0).unwrap();
    let after_first = active_pixels(&editor);
    let entries = editor.history().undo_count();

    let second = editor.flood_fill_at(2.0, 5.0, RED, 0.0).unwrap();
    assert!(!second.changed);
    assert_eq!(active_pixels(&editor), after_first);
    assert_eq!(editor.history().undo_count(), entries);

    let surface = &editor.stack().active_layer().surface;
    for y in 0..10 {
        assert_eq!(surface.get_pixel(18, y), Some(WHITE));
    }
}

#[test]
fn test_undo_redo_roundtrip_over_structure() {
    let mut editor = EditorFacade::new(8, 8);
    editor.fill_active_layer(WHITE).unwrap();
    let top = editor.add_layer().unwrap();
    editor.fill_active_layer(RED).unwrap();
    editor.set_layer_property(top, LayerProperty::Opacity(0.5)).unwrap();
    editor.merge_active_with_neighbor().unwrap();

    let merged = editor.composite();
    assert_eq!(editor.stack().len(), 1);

    assert!(editor.undo());
    assert_eq!(editor.stack().len(), 2);
    assert!(editor.redo());
    assert_eq!(editor.stack().len(), 1);
    assert_eq!(editor.composite(), merged);
}

#[test]
fn test_last_layer_cannot_be_deleted() {
    let mut editor = EditorFacade::new(4, 4);
    let only = editor.active_layer_id();
    let err = editor.delete_layer(only).unwrap_err();
    assert!(matches!(err, EditorError::InvalidOperation(_)));
    assert_eq!(editor.stack().len(), 1);
    assert!(!editor.history().can_undo());
}

#[test]
fn test_move_layer_changes_stacking() {
    let mut editor = EditorFacade::new(4, 4);
    let bottom = editor.active_layer_id();
    editor.fill_active_layer(RED).unwrap();
    let top = editor.add_layer().unwrap();
    editor.fill_active_layer(WHITE).unwrap();
    assert_eq!(editor.composite().get_pixel(0, 0), Some(WHITE));

    editor.move_layer(bottom, MoveDirection::Up).unwrap();
    assert_eq!(editor.layer_ids(), vec![top, bottom]);
    assert_eq!(editor.composite().get_pixel(0, 0), Some(RED));
    assert_eq!(editor.active_layer_id(), top);
}

#[test]
fn test_overlay_pinch_and_rotate() {
    let mut editor = EditorFacade::new(400, 400);
    editor.begin_image_overlay(RasterSurface::new_filled(40, 40, RED)).unwrap();
    assert_eq!(editor.overlay_transform().unwrap().scale, 1.0);

    editor.pointer_down(1, 150.0, 200.0).unwrap();
    editor.pointer_down(2, 250.0, 200.0).unwrap();
    editor.pointer_move(2, 350.0, 200.0).unwrap();
    let t = editor.overlay_transform().unwrap();
    assert!((t.scale - 2.0).abs() < 1e-9);

    editor.pointer_up(2);
    editor.pointer_down(2, 250.0, 200.0).unwrap();
    editor.pointer_move(2, 150.0, 300.0).unwrap();
    let t = editor.overlay_transform().unwrap();
    assert!((t.rotation_deg - 90.0).abs() < 1e-9);
    assert!((t.scale - 2.0).abs() < 1e-9);
}

#[test]
fn test_overlay_pinch_keeps_midpoint_anchor() {
    let mut editor = EditorFacade::new(300, 300);
    editor.begin_image_overlay(RasterSurface::new_filled(100, 100, RED)).unwrap();
    editor.rotate_right();

    editor.pointer_down(1, 120.0, 160.0).unwrap();
    editor.pointer_down(2, 160.0, 160.0).unwrap();

    // Moving the first contact puts the midpoint at (130, 160)
    let mid = Point::new(130.0, 160.0);
    let anchor = editor.overlay().unwrap().image_point_at(mid).unwrap();
    editor.pointer_move(1, 100.0, 160.0).unwrap();

    let after = editor.overlay().unwrap().image_point_at(mid).unwrap();
    assert!((after.x - anchor.x).abs() < 1e-3);
    assert!((after.y - anchor.y).abs() < 1e-3);
    assert!((editor.overlay_transform().unwrap().scale - 1.5).abs() < 1e-9);
}

#[test]
fn test_zoom_buttons_respect_limits() {
    let mut editor = EditorFacade::new(200, 200);
    editor.begin_image_overlay(RasterSurface::new_filled(50, 50, RED)).unwrap();
    let limits = editor.settings().gesture_limits();
    for _ in 0..500 {
        editor.zoom_in();
        assert!(editor.overlay_transform().unwrap().scale <= limits.max_scale);
    }
    for _ in 0..1000 {
        editor.zoom_out();
        assert!(editor.overlay_transform().unwrap().scale >= limits.min_scale);
    }
}

#[test]
fn test_committed_overlay_undoes_in_one_step() {
    let mut editor = EditorFacade::new(50, 50);
    editor.fill_active_layer(WHITE).unwrap();
    let before = active_pixels(&editor);

    editor.begin_image_overlay(RasterSurface::new_filled(10, 10, RED)).unwrap();
    editor.pointer_down(9, 25.0, 25.0).unwrap();
    editor.pointer_move(9, 5.0, 5.0).unwrap();
    editor.pointer_up(9);
    editor.wheel(-1.0, 0.0, 0.0);
    editor.commit_image_overlay().unwrap();

    assert_ne!(active_pixels(&editor), before);
    assert!(editor.overlay().is_none());
    assert!(editor.undo());
    assert_eq!(active_pixels(&editor), before);
}

#[test]
fn test_layer_blob_survives_export_and_import() {
    let mut editor = EditorFacade::new(16, 16);
    let id = editor.active_layer_id();
    editor.fill_active_layer(RED).unwrap();
    editor.set_layer_property(id, LayerProperty::Name("Base".into())).unwrap();
    editor.set_layer_property(id, LayerProperty::Brightness(1.5)).unwrap();
    let blob = editor.serialize_layer(id).unwrap();

    let mut other = EditorFacade::new(16, 16);
    let imported = other.import_layer(&blob).unwrap();
    let layer = other.stack().layer_by_id(imported).unwrap();
    assert_eq!(layer.name, "Base");
    assert_eq!(layer.brightness(), 1.5);
    assert_eq!(layer.surface.get_pixel(3, 3), Some(RED));
    assert_eq!(other.stack().len(), 2);
}
