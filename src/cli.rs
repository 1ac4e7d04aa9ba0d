// ============================================================================
// LayerPaint CLI: headless replay of an action script
// ============================================================================
//
// Usage examples:
//   LayerPaint --script actions.txt --output out.png
//   LayerPaint -s actions.txt -o out.png --input base.png
//   LayerPaint -s actions.txt -o out.png --width 640 --height 480 --verbose
//
// The script is one intent per line; `#` starts a comment.  Layer operands
// are stack indices (0 = bottom).  Everything runs on the calling thread
// through `EditorFacade`, exactly as an interactive host would drive it.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::str::FromStr;
use std::time::Instant;

use clap::Parser;
use image::Rgba;

use crate::canvas::{CompositeMode, LayerId, LayerProperty, MoveDirection};
use crate::editor::EditorFacade;
use crate::error::EditorError;
use crate::io::{load_image, save_image};
use crate::settings::EditorSettings;
use crate::{log_err, log_info};

// ============================================================================
// CLI argument definition (clap Derive)
// ============================================================================

/// LayerPaint headless editor.
///
/// Replays a script of editing intents and writes the flattened result.
#[derive(Parser, Debug)]
#[command(
    name = "LayerPaint",
    about = "LayerPaint headless action-script runner",
    long_about = "Replay a line-oriented script of painting, layer and overlay\n\
                  intents against a fresh canvas (or an input image) and save\n\
                  the composited result.\n\n\
                  Example:\n  \
                  LayerPaint --script actions.txt --output out.png"
)]
pub struct CliArgs {
    /// Action script to replay.
    #[arg(short, long, value_name = "SCRIPT")]
    pub script: PathBuf,

    /// Where to write the composited image.  Format follows the extension.
    #[arg(short, long, value_name = "FILE")]
    pub output: PathBuf,

    /// Start from this image as the bottom layer instead of a blank canvas.
    #[arg(short, long, value_name = "IMAGE")]
    pub input: Option<PathBuf>,

    /// Canvas width (overrides the settings file).
    #[arg(long)]
    pub width: Option<u32>,

    /// Canvas height (overrides the settings file).
    #[arg(long)]
    pub height: Option<u32>,

    /// Settings file to use instead of the platform default.
    #[arg(long, value_name = "FILE.cfg")]
    pub settings: Option<PathBuf>,

    /// Echo log lines and per-command progress to the terminal.
    #[arg(short, long)]
    pub verbose: bool,
}

// ============================================================================
// Script commands
// ============================================================================

#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    LayerAdd,
    LayerDelete(usize),
    LayerMove(usize, MoveDirection),
    LayerMerge(usize, Option<usize>),
    LayerSelect(usize),
    LayerSet(usize, LayerProperty),
    Brush(Rgba<u8>, f32, CompositeMode),
    Stroke(Vec<(f32, f32)>),
    Fill { x: f32, y: f32, color: Rgba<u8>, tolerance: f32 },
    FillLayer(Rgba<u8>),
    ClearLayer,
    Resize(u32, u32),
    Insert(PathBuf),
    PointerDown(u64, f64, f64),
    PointerMove(u64, f64, f64),
    PointerUp(u64),
    Wheel(f64, f64, f64),
    ZoomIn,
    ZoomOut,
    RotateLeft,
    RotateRight,
    Commit,
    Cancel,
    Undo,
    Redo,
    ExportLayer(usize, PathBuf),
    ImportLayer(PathBuf),
    Save(PathBuf),
}

/// A script problem tied to its 1-based line.
#[derive(Debug, thiserror::Error)]
#[error("line {line}: {message}")]
pub struct ScriptError {
    pub line: usize,
    pub message: String,
}

fn num<T: FromStr>(tok: Option<&str>, what: &str) -> Result<T, String> {
    let tok = tok.ok_or_else(|| format!("missing {}", what))?;
    tok.parse::<T>().map_err(|_| format!("invalid {} '{}'", what, tok))
}

fn color(toks: &mut std::str::SplitWhitespace<'_>) -> Result<Rgba<u8>, String> {
    Ok(Rgba([
        num(toks.next(), "red")?,
        num(toks.next(), "green")?,
        num(toks.next(), "blue")?,
        num(toks.next(), "alpha")?,
    ]))
}

fn path(toks: &mut std::str::SplitWhitespace<'_>) -> Result<PathBuf, String> {
    let rest: Vec<&str> = toks.collect();
    if rest.is_empty() {
        return Err("missing path".to_string());
    }
    Ok(PathBuf::from(rest.join(" ")))
}

fn parse_bool(tok: &str) -> Result<bool, String> {
    match tok {
        "true" | "on" | "1" | "yes" => Ok(true),
        "false" | "off" | "0" | "no" => Ok(false),
        _ => Err(format!("invalid boolean '{}'", tok)),
    }
}

fn parse_property(toks: &mut std::str::SplitWhitespace<'_>) -> Result<LayerProperty, String> {
    let name = toks.next().ok_or("missing property name")?;
    let prop = match name {
        "name" => {
            let rest: Vec<&str> = toks.by_ref().collect();
            return Ok(LayerProperty::Name(rest.join(" ")));
        }
        "visible" => LayerProperty::Visible(parse_bool(toks.next().ok_or("missing value")?)?),
        "opacity" => LayerProperty::Opacity(num(toks.next(), "opacity")?),
        "brightness" => LayerProperty::Brightness(num(toks.next(), "brightness")?),
        "contrast" => LayerProperty::Contrast(num(toks.next(), "contrast")?),
        "saturation" => LayerProperty::Saturation(num(toks.next(), "saturation")?),
        "blur" => LayerProperty::Blur(num(toks.next(), "blur radius")?),
        other => return Err(format!("unknown layer property '{}'", other)),
    };
    Ok(prop)
}

fn parse_line(line: &str) -> Result<Option<Command>, String> {
    let line = match line.split_once('#') {
        Some((code, _)) => code,
        None => line,
    };
    let mut toks = line.split_whitespace();
    let Some(head) = toks.next() else {
        return Ok(None);
    };

    let cmd = match head {
        "layer" => match toks.next().ok_or("missing layer action")? {
            "add" => Command::LayerAdd,
            "delete" => Command::LayerDelete(num(toks.next(), "layer index")?),
            "up" => Command::LayerMove(num(toks.next(), "layer index")?, MoveDirection::Up),
            "down" => Command::LayerMove(num(toks.next(), "layer index")?, MoveDirection::Down),
            "merge" => {
                let src = num(toks.next(), "layer index")?;
                let target = match toks.next() {
                    Some(t) => Some(num(Some(t), "target index")?),
                    None => None,
                };
                Command::LayerMerge(src, target)
            }
            "select" => Command::LayerSelect(num(toks.next(), "layer index")?),
            "set" => {
                let index = num(toks.next(), "layer index")?;
                Command::LayerSet(index, parse_property(&mut toks)?)
            }
            other => return Err(format!("unknown layer action '{}'", other)),
        },
        "brush" => {
            let c = color(&mut toks)?;
            let width = num(toks.next(), "brush width")?;
            let mode_name = toks.next().unwrap_or("normal");
            let mode = CompositeMode::from_name(mode_name).ok_or_else(|| format!("unknown brush mode '{}'", mode_name))?;
            Command::Brush(c, width, mode)
        }
        "stroke" => {
            let coords: Vec<&str> = toks.by_ref().collect();
            if coords.is_empty() || coords.len() % 2 != 0 {
                return Err("stroke needs x y pairs".to_string());
            }
            let points = coords
                .chunks(2)
                .map(|pair| -> Result<(f32, f32), String> { Ok((num(Some(pair[0]), "x")?, num(Some(pair[1]), "y")?)) })
                .collect::<Result<Vec<_>, String>>()?;
            Command::Stroke(points)
        }
        "fill" => {
            let x = num(toks.next(), "x")?;
            let y = num(toks.next(), "y")?;
            let c = color(&mut toks)?;
            let tolerance = match toks.next() {
                Some(t) => num(Some(t), "tolerance")?,
                None => 0.0,
            };
            Command::Fill { x, y, color: c, tolerance }
        }
        "fill-layer" => Command::FillLayer(color(&mut toks)?),
        "clear-layer" => Command::ClearLayer,
        "resize" => Command::Resize(num(toks.next(), "width")?, num(toks.next(), "height")?),
        "insert" => Command::Insert(path(&mut toks)?),
        "gesture" => match toks.next().ok_or("missing gesture action")? {
            "down" => Command::PointerDown(num(toks.next(), "contact id")?, num(toks.next(), "x")?, num(toks.next(), "y")?),
            "move" => Command::PointerMove(num(toks.next(), "contact id")?, num(toks.next(), "x")?, num(toks.next(), "y")?),
            "up" => Command::PointerUp(num(toks.next(), "contact id")?),
            other => return Err(format!("unknown gesture action '{}'", other)),
        },
        "wheel" => Command::Wheel(num(toks.next(), "wheel delta")?, num(toks.next(), "x")?, num(toks.next(), "y")?),
        "zoom-in" => Command::ZoomIn,
        "zoom-out" => Command::ZoomOut,
        "rotate-left" => Command::RotateLeft,
        "rotate-right" => Command::RotateRight,
        "commit" => Command::Commit,
        "cancel" => Command::Cancel,
        "undo" => Command::Undo,
        "redo" => Command::Redo,
        "export-layer" => {
            let index = num(toks.next(), "layer index")?;
            Command::ExportLayer(index, path(&mut toks)?)
        }
        "import-layer" => Command::ImportLayer(path(&mut toks)?),
        "save" => Command::Save(path(&mut toks)?),
        other => return Err(format!("unknown command '{}'", other)),
    };

    if let Some(extra) = toks.next() {
        return Err(format!("unexpected '{}' after {}", extra, head));
    }
    Ok(Some(cmd))
}

/// Parse a whole script.  Stops at the first bad line.
pub fn parse_script(source: &str) -> Result<Vec<(usize, Command)>, ScriptError> {
    let mut commands = Vec::new();
    for (i, line) in source.lines().enumerate() {
        match parse_line(line) {
            Ok(Some(cmd)) => commands.push((i + 1, cmd)),
            Ok(None) => {}
            Err(message) => return Err(ScriptError { line: i + 1, message }),
        }
    }
    Ok(commands)
}

// ============================================================================
// Execution
// ============================================================================

fn layer_id(editor: &EditorFacade, index: usize) -> Result<LayerId, EditorError> {
    editor
        .layer_ids()
        .get(index)
        .copied()
        .ok_or_else(|| EditorError::validation(format!("no layer at index {} (stack has {})", index, editor.stack().len())))
}

/// Apply one command to the editor.
pub fn execute(editor: &mut EditorFacade, cmd: &Command) -> Result<(), String> {
    let e = |err: EditorError| err.to_string();
    match cmd {
        Command::LayerAdd => {
            editor.add_layer().map_err(e)?;
        }
        Command::LayerDelete(i) => {
            let id = layer_id(editor, *i).map_err(e)?;
            editor.delete_layer(id).map_err(e)?;
        }
        Command::LayerMove(i, dir) => {
            let id = layer_id(editor, *i).map_err(e)?;
            editor.move_layer(id, *dir).map_err(e)?;
        }
        Command::LayerMerge(i, target) => {
            let id = layer_id(editor, *i).map_err(e)?;
            match target {
                Some(t) => {
                    let target_id = layer_id(editor, *t).map_err(e)?;
                    editor.merge_layer(id, target_id).map_err(e)?;
                }
                None => {
                    editor.set_active_layer(id).map_err(e)?;
                    editor.merge_active_with_neighbor().map_err(e)?;
                }
            }
        }
        Command::LayerSelect(i) => {
            let id = layer_id(editor, *i).map_err(e)?;
            editor.set_active_layer(id).map_err(e)?;
        }
        Command::LayerSet(i, prop) => {
            let id = layer_id(editor, *i).map_err(e)?;
            editor.set_layer_property(id, prop.clone()).map_err(e)?;
        }
        Command::Brush(c, width, mode) => {
            editor
                .set_brush(crate::components::tools::BrushSettings::new(*c, *width, *mode))
                .map_err(e)?;
        }
        Command::Stroke(points) => {
            let brush = editor.brush();
            editor.begin_stroke(brush.color, brush.width, brush.mode).map_err(e)?;
            for &(x, y) in points {
                if let Err(err) = editor.extend_stroke(x, y) {
                    editor.end_stroke();
                    return Err(err.to_string());
                }
            }
            editor.end_stroke();
        }
        Command::Fill { x, y, color, tolerance } => {
            editor.flood_fill_at(*x, *y, *color, *tolerance).map_err(e)?;
        }
        Command::FillLayer(c) => {
            editor.fill_active_layer(*c).map_err(e)?;
        }
        Command::ClearLayer => {
            editor.clear_active_layer().map_err(e)?;
        }
        Command::Resize(w, h) => {
            editor.resize(*w, *h).map_err(e)?;
        }
        Command::Insert(p) => {
            let image = load_image(p)?;
            editor.begin_image_overlay(image).map_err(e)?;
        }
        Command::PointerDown(id, x, y) => editor.pointer_down(*id, *x, *y).map_err(e)?,
        Command::PointerMove(id, x, y) => editor.pointer_move(*id, *x, *y).map_err(e)?,
        Command::PointerUp(id) => {
            editor.pointer_up(*id);
        }
        Command::Wheel(sign, x, y) => {
            if !editor.wheel(*sign, *x, *y) {
                return Err("wheel: no image overlay open".to_string());
            }
        }
        Command::ZoomIn | Command::ZoomOut | Command::RotateLeft | Command::RotateRight => {
            let handled = match cmd {
                Command::ZoomIn => editor.zoom_in(),
                Command::ZoomOut => editor.zoom_out(),
                Command::RotateLeft => editor.rotate_left(),
                _ => editor.rotate_right(),
            };
            if !handled {
                return Err("no image overlay open".to_string());
            }
        }
        Command::Commit => {
            editor.commit_image_overlay().map_err(e)?;
        }
        Command::Cancel => {
            if !editor.cancel_image_overlay() {
                return Err("cancel: no image overlay open".to_string());
            }
        }
        // Empty history is not an error
        Command::Undo => {
            editor.undo();
        }
        Command::Redo => {
            editor.redo();
        }
        Command::ExportLayer(i, p) => {
            let id = layer_id(editor, *i).map_err(e)?;
            let blob = editor.serialize_layer(id).map_err(e)?;
            std::fs::write(p, blob).map_err(|err| format!("could not write '{}': {}", p.display(), err))?;
        }
        Command::ImportLayer(p) => {
            let blob = std::fs::read(p).map_err(|err| format!("could not read '{}': {}", p.display(), err))?;
            editor.import_layer(&blob).map_err(e)?;
        }
        Command::Save(p) => save_image(&editor.composite(), p)?,
    }
    Ok(())
}

/// Parse and replay `source`, stopping at the first failure.
pub fn run_script(editor: &mut EditorFacade, source: &str, verbose: bool) -> Result<(), ScriptError> {
    let commands = parse_script(source)?;
    for (line, cmd) in &commands {
        if verbose {
            println!("  [{}] {:?}", line, cmd);
        }
        execute(editor, cmd).map_err(|message| ScriptError { line: *line, message })?;
    }
    // A trailing open overlay is dropped, never silently committed
    if editor.cancel_image_overlay() {
        log_info!("script ended with an open image overlay; discarded");
    }
    Ok(())
}

// ============================================================================
// Public entry point
// ============================================================================

fn build_editor(args: &CliArgs) -> Result<EditorFacade, String> {
    let mut settings = match &args.settings {
        Some(p) => EditorSettings::load_from(p),
        None => EditorSettings::load(),
    };
    if let Some(w) = args.width {
        settings.canvas_width = w;
    }
    if let Some(h) = args.height {
        settings.canvas_height = h;
    }

    match &args.input {
        Some(p) => {
            let base = load_image(p)?;
            let mut editor = EditorFacade::from_surface(base, settings);
            if args.width.is_some() || args.height.is_some() {
                let w = args.width.unwrap_or(editor.width());
                let h = args.height.unwrap_or(editor.height());
                editor.resize(w, h).map_err(|e| e.to_string())?;
            }
            Ok(editor)
        }
        None => {
            if settings.canvas_width == 0 || settings.canvas_height == 0 {
                return Err("canvas dimensions must be non-zero".to_string());
            }
            Ok(EditorFacade::with_settings(settings))
        }
    }
}

fn read_script(path: &Path) -> Result<String, String> {
    std::fs::read_to_string(path).map_err(|e| format!("could not read script '{}': {}", path.display(), e))
}

/// Run the CLI and return an OS exit code.
/// `0` = script replayed and output written, `1` = any failure.
pub fn run(args: CliArgs) -> ExitCode {
    let start = Instant::now();

    let source = match read_script(&args.script) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let mut editor = match build_editor(&args) {
        Ok(ed) => ed,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = run_script(&mut editor, &source, args.verbose) {
        log_err!("script {}: {}", args.script.display(), e);
        eprintln!("error: {}: {}", args.script.display(), e);
        return ExitCode::FAILURE;
    }

    if let Err(e) = save_image(&editor.composite(), &args.output) {
        eprintln!("error: {}", e);
        return ExitCode::FAILURE;
    }

    if args.verbose {
        println!(
            "  → {} ({}×{}, {} layers, {:.0}ms)",
            args.output.display(),
            editor.width(),
            editor.height(),
            editor.stack().len(),
            start.elapsed().as_secs_f64() * 1000.0
        );
    }
    ExitCode::SUCCESS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_reports_line_numbers() {
        let err = parse_script("layer add\n\n# note\nbrush 1 2 3\n").unwrap_err();
        assert_eq!(err.line, 4);
        assert!(err.to_string().starts_with("line 4:"));
    }

    #[test]
    fn test_parse_commands() {
        let cmds = parse_script(
            "layer add   # trailing comment\n\
             brush 255 0 0 255 4 erase\n\
             stroke 1 1 5 5 9 1\n\
             fill 2 3 0 0 255 255 12.5\n\
             layer set 1 name Sky layer\n\
             layer merge 1\n\
             gesture down 3 10 20\n",
        )
        .unwrap();
        assert_eq!(cmds.len(), 7);
        assert_eq!(cmds[0], (1, Command::LayerAdd));
        assert_eq!(cmds[1].1, Command::Brush(Rgba([255, 0, 0, 255]), 4.0, CompositeMode::Erase));
        assert_eq!(cmds[2].1, Command::Stroke(vec![(1.0, 1.0), (5.0, 5.0), (9.0, 1.0)]));
        assert_eq!(
            cmds[3].1,
            Command::Fill { x: 2.0, y: 3.0, color: Rgba([0, 0, 255, 255]), tolerance: 12.5 }
        );
        assert_eq!(cmds[4].1, Command::LayerSet(1, LayerProperty::Name("Sky layer".into())));
        assert_eq!(cmds[5].1, Command::LayerMerge(1, None));
        assert_eq!(cmds[6].1, Command::PointerDown(3, 10.0, 20.0));
    }

    #[test]
    fn test_parse_rejects_odd_stroke_and_extra_tokens() {
        assert!(parse_script("stroke 1 2 3").is_err());
        assert!(parse_script("undo now").is_err());
        assert!(parse_script("teleport").is_err());
    }

    #[test]
    fn test_run_script_paints_and_undoes() {
        let mut editor = EditorFacade::new(16, 16);
        run_script(
            &mut editor,
            "fill-layer 255 255 255 255\nlayer add\nbrush 0 0 0 255 3 normal\nstroke 2 2 12 2\nundo\n",
            false,
        )
        .unwrap();
        assert_eq!(editor.stack().len(), 2);
        assert_eq!(editor.composite().get_pixel(7, 2), Some(Rgba([255, 255, 255, 255])));
        assert!(editor.history().can_redo());
    }

    #[test]
    fn test_run_script_error_carries_line() {
        let mut editor = EditorFacade::new(8, 8);
        let err = run_script(&mut editor, "layer add\nlayer delete 7\n", false).unwrap_err();
        assert_eq!(err.line, 2);
    }
}
