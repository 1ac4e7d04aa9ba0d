//! LayerPaint: a layered raster painting engine.
//!
//! Hosts drive everything through [`EditorFacade`]: strokes, flood fill,
//! layer structure and properties, a gesture-positioned image overlay, and
//! snapshot-based undo/redo.  The `LayerPaint` binary replays action
//! scripts through the same facade.

#![allow(clippy::too_many_arguments)]

pub mod canvas;
pub mod cli;
pub mod components;
pub mod editor;
pub mod error;
pub mod io;
pub mod logger;
pub mod ops;
pub mod settings;

pub use canvas::{CompositeMode, Layer, LayerId, LayerProperty, LayerStack, MoveDirection, RasterSurface};
pub use components::gesture::{ContactId, GestureLimits, OverlayTransform, Point};
pub use components::tools::BrushSettings;
pub use editor::{ActionOutcome, EditorFacade};
pub use error::{EditorError, Result};
pub use settings::EditorSettings;
