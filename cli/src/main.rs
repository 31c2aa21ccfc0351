use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::Level;
use viewcam::camera::{Camera, Point};
use viewcam::config::{ConfigError, ControllerConfig};
use viewcam::controller::CameraController;
use viewcam::input::InputEvent;
use viewcam::readout::Readout;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("config: {0}")]
    Config(#[from] ConfigError),
    #[error("line {line}: invalid event: {source}")]
    Event { line: usize, source: serde_json::Error },
    #[error("invalid JSON output: {0}")]
    Json(#[from] serde_json::Error),
    #[error("camera scale must be positive, got {0}")]
    InvalidScale(f64),
}

#[derive(Parser, Debug)]
#[command(name = "viewcam", about = "Replay pan/zoom input through the camera controller")]
struct Cli {
    /// Controller config file (JSON). Missing fields take defaults.
    #[arg(long, env = "VIEWCAM_CONFIG")]
    config: Option<PathBuf>,

    /// Log gesture transitions to stderr (repeat for per-event tracing).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Feed a JSON-lines event script (or `-` for stdin) to a controller and
    /// print the readout after each event.
    Replay {
        script: PathBuf,
        /// Surface width used for the initial reset.
        #[arg(long, default_value_t = 800.0)]
        width: f64,
        /// Surface height used for the initial reset.
        #[arg(long, default_value_t = 600.0)]
        height: f64,
        /// Print readouts as JSON objects instead of text.
        #[arg(long)]
        json: bool,
    },
    /// Convert a point between screen and world space for a given camera.
    Map {
        #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
        x_offset: f64,
        #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
        y_offset: f64,
        #[arg(long, default_value_t = 1.0)]
        scale: f64,
        #[arg(allow_hyphen_values = true)]
        x: f64,
        #[arg(allow_hyphen_values = true)]
        y: f64,
        /// Treat the point as world space and convert to screen.
        #[arg(long)]
        to_screen: bool,
    },
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(err) = run(cli) {
        tracing::error!(error = %err, "viewcam failed");
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt().with_max_level(level).with_writer(io::stderr).init();
}

fn run(cli: Cli) -> Result<(), CliError> {
    let config = match &cli.config {
        Some(path) => ControllerConfig::from_json(&std::fs::read_to_string(path)?)?,
        None => ControllerConfig::default(),
    };

    match cli.command {
        Command::Replay { script, width, height, json } => {
            let reader: Box<dyn BufRead> = if script.as_os_str() == "-" {
                Box::new(BufReader::new(io::stdin()))
            } else {
                Box::new(BufReader::new(File::open(&script)?))
            };
            replay(reader, config, width, height, json, &mut io::stdout().lock())
        }
        Command::Map { x_offset, y_offset, scale, x, y, to_screen } => {
            if !(scale.is_finite() && scale > 0.0) {
                return Err(CliError::InvalidScale(scale));
            }
            let camera = Camera::new(x_offset, y_offset, scale);
            let p = Point::new(x, y);
            let out = if to_screen { camera.world_to_screen(p) } else { camera.screen_to_world(p) };
            println!("{} {}", out.x, out.y);
            Ok(())
        }
    }
}

fn replay(
    reader: impl BufRead,
    config: ControllerConfig,
    width: f64,
    height: f64,
    json: bool,
    out: &mut impl Write,
) -> Result<(), CliError> {
    let mut controller = CameraController::new(config);
    controller.reset(width, height);

    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let event = InputEvent::from_json(trimmed).map_err(|source| CliError::Event { line: index + 1, source })?;
        let response = controller.handle(&event);
        tracing::debug!(?event, ?response, "handled");

        let readout = Readout::capture(&controller);
        if json {
            writeln!(out, "{}", readout.to_json()?)?;
        } else {
            writeln!(out, "{readout}")?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_script(script: &str, json: bool) -> Result<String, CliError> {
        let mut out = Vec::new();
        replay(script.as_bytes(), ControllerConfig::default(), 800.0, 600.0, json, &mut out)?;
        Ok(String::from_utf8(out).unwrap())
    }

    #[test]
    fn replay_prints_one_line_per_event() {
        let script = r#"
# drag from (10,10) to (30,25)
{"type": "pointer_down", "point": {"x": 10, "y": 10}}
{"type": "pointer_move", "point": {"x": 30, "y": 25}}
{"type": "pointer_up", "point": {"x": 30, "y": 25}}
"#;
        let output = run_script(script, false).unwrap();
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[1].starts_with("camera x=-20.00 y=-15.00 z=1.000"), "{}", lines[1]);
        assert!(lines[1].ends_with("| panning"));
        assert!(!lines[2].contains("panning"));
    }

    #[test]
    fn replay_json_output_parses() {
        let script = r#"{"type": "wheel", "point": {"x": 0, "y": 0}, "delta": {"dx": 0, "dy": -100}, "modifiers": {"ctrl": true}}"#;
        let output = run_script(script, true).unwrap();
        let value: serde_json::Value = serde_json::from_str(output.trim()).unwrap();
        assert_eq!(value["camera"]["z"], 2.0);
    }

    #[test]
    fn replay_reports_bad_line_number() {
        let script = "{\"type\": \"touch_end\"}\n{\"type\": \"spin\"}\n";
        let err = run_script(script, false).unwrap_err();
        assert!(matches!(err, CliError::Event { line: 2, .. }), "{err}");
    }

    #[test]
    fn replay_reset_after_pan_restores_identity() {
        let script = r#"
{"type": "wheel", "point": {"x": 0, "y": 0}, "delta": {"dx": 100, "dy": 50}}
{"type": "reset", "width": 800, "height": 600}
"#;
        let output = run_script(script, false).unwrap();
        let last = output.lines().last().unwrap();
        assert!(last.starts_with("camera x=0.00 y=0.00 z=1.000"), "{last}");
    }
}
