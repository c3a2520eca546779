//! Command-line control for a VISCA PTZ camera on a serial port.
//!
//! Subcommands:
//! - `ports`: List serial ports that could host a camera
//! - `connect`: Find a camera and remember its port
//! - `status`: Show connection, speed and current pose
//! - `move` / `zoom`: Drive in one direction for a fixed time
//! - `speed`: Set the steer speed
//! - `focus`: Read or set focus, switch autofocus
//! - `preset`: Store, recall and list presets
//! - `repl`: Interactive intent shell

use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use strum::IntoEnumIterator;
use tandyberg::config::{ConfigStore, JsonFileStore, MemoryStore, DEFAULT_CONFIG_FILE};
use tandyberg::controller::Controller;
use tandyberg::intent::{Intent, KEY_BINDINGS};
use tandyberg::mock::MockTransport;
use tandyberg::motion::{AxisGroup, Direction, SpeedLevel};
use tandyberg::presets::PresetSlot;
use tandyberg::transport::{SerialSettings, SerialTransport, DEFAULT_BAUD_RATE};
use tandyberg::{InterfaceId, Transport};
use tracing::info;

/// Serial port name used for the simulated camera
const DRY_RUN_PORT: &str = "mock0";

/// VISCA PTZ Camera Control Tool
#[derive(Parser, Debug)]
#[command(name = "ptz_tool")]
#[command(about = "Control a VISCA pan-tilt-zoom camera over RS-232")]
#[command(version)]
struct Args {
    /// Config file holding the last port and presets
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Serial port to try first (overrides the saved one)
    #[arg(long, global = true)]
    port: Option<String>,

    /// Serial baud rate
    #[arg(long, global = true, default_value_t = DEFAULT_BAUD_RATE)]
    baud: u32,

    /// Read timeout in milliseconds
    #[arg(long, global = true, default_value = "1000")]
    timeout_ms: u64,

    /// Use a simulated camera and an in-memory config
    #[arg(long, global = true)]
    dry_run: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List candidate serial ports
    Ports,

    /// Find a camera and save its port
    Connect,

    /// Show connection state, speed and pose
    Status,

    /// Pan or tilt for a fixed time, then stop
    Move {
        #[arg(value_enum)]
        direction: Direction,

        /// How long to drive, in milliseconds
        #[arg(short, long, default_value = "500")]
        duration_ms: u64,

        /// Speed level 0-7 (default: current)
        #[arg(short, long)]
        speed: Option<SpeedLevel>,
    },

    /// Zoom for a fixed time, then stop
    Zoom {
        #[arg(value_enum)]
        direction: ZoomDirection,

        /// How long to drive, in milliseconds
        #[arg(short, long, default_value = "500")]
        duration_ms: u64,
    },

    /// Set the steer speed
    Speed {
        /// Level 0-7
        level: Option<SpeedLevel>,

        /// Operator menu label (1, 3, ... 15) instead of a level
        #[arg(long, conflicts_with = "level")]
        label: Option<u8>,
    },

    /// Focus control
    Focus {
        #[command(subcommand)]
        action: FocusAction,
    },

    /// Preset control
    Preset {
        #[command(subcommand)]
        action: PresetAction,
    },

    /// Interactive shell
    Repl,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ZoomDirection {
    #[value(alias = "tele")]
    In,
    #[value(alias = "wide")]
    Out,
}

impl From<ZoomDirection> for Direction {
    fn from(zoom: ZoomDirection) -> Self {
        match zoom {
            ZoomDirection::In => Direction::ZoomIn,
            ZoomDirection::Out => Direction::ZoomOut,
        }
    }
}

#[derive(Subcommand, Debug)]
enum FocusAction {
    /// Read the focus position
    Get,
    /// Switch to manual and move focus
    Set { value: i32 },
    /// Enable autofocus
    Auto,
    /// Disable autofocus
    Manual,
}

#[derive(Subcommand, Debug)]
enum PresetAction {
    /// Store the current pose
    Set { slot: PresetSlot },
    /// Drive to a stored pose
    Recall { slot: PresetSlot },
    /// Show stored presets
    List,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    if args.dry_run {
        info!("Dry run: simulated camera on {DRY_RUN_PORT}");
        return run(MockTransport::with_camera_on(DRY_RUN_PORT), MemoryStore::new(), &args);
    }

    let settings = SerialSettings {
        baud_rate: args.baud,
        timeout: Duration::from_millis(args.timeout_ms),
    };
    run(
        SerialTransport::new(settings),
        JsonFileStore::new(&args.config),
        &args,
    )
}

fn run<T: Transport, S: ConfigStore>(transport: T, store: S, args: &Args) -> Result<()> {
    if let Command::Ports = args.command {
        return cmd_ports(&Controller::new(transport, store));
    }

    let controller = open(transport, store, args.port.as_deref());
    println!("{}", controller.status_text());

    match &args.command {
        Command::Ports | Command::Connect => Ok(()),
        Command::Status => cmd_status(&controller),
        Command::Move {
            direction,
            duration_ms,
            speed,
        } => {
            if let Some(level) = speed {
                controller.set_speed(*level)?;
            }
            drive(&controller, *direction, *duration_ms)
        }
        Command::Zoom {
            direction,
            duration_ms,
        } => drive(&controller, (*direction).into(), *duration_ms),
        Command::Speed { level, label } => cmd_speed(&controller, *level, *label),
        Command::Focus { action } => cmd_focus(&controller, action),
        Command::Preset { action } => cmd_preset(&controller, action),
        Command::Repl => cmd_repl(&controller),
    }
}

/// Bind a camera: the `--port` choice, else the saved port, else any.
fn open<T: Transport, S: ConfigStore>(
    transport: T,
    store: S,
    port: Option<&str>,
) -> Controller<T, S> {
    let controller = match port {
        Some(port) => {
            let controller = Controller::new(transport, store);
            controller.connect(Some(InterfaceId::from(port)));
            controller
        }
        None => Controller::open(transport, store),
    };
    if !controller.connection_state().is_connected() {
        controller.connect(None);
    }
    controller
}

// ==================== One-shot Commands ====================

fn cmd_ports<T: Transport, S: ConfigStore>(controller: &Controller<T, S>) -> Result<()> {
    let ports = controller.list_interfaces();
    if ports.is_empty() {
        println!("No serial ports found");
    }
    for port in ports {
        println!("{port}");
    }
    Ok(())
}

fn cmd_status<T: Transport, S: ConfigStore>(controller: &Controller<T, S>) -> Result<()> {
    if !controller.connection_state().is_connected() {
        return Ok(());
    }
    let speed = controller.speed();
    println!("Speed: level {} (menu {})", speed, speed.menu_label());
    let pose = controller.capture_pose()?;
    println!(
        "Pose: pan {} tilt {} zoom {} focus {}",
        pose.pan, pose.tilt, pose.zoom, pose.focus
    );
    Ok(())
}

fn drive<T: Transport, S: ConfigStore>(
    controller: &Controller<T, S>,
    direction: Direction,
    duration_ms: u64,
) -> Result<()> {
    controller.start_motion(direction)?;
    thread::sleep(Duration::from_millis(duration_ms));
    controller
        .stop_motion(direction.group())
        .with_context(|| format!("Failed to stop {direction}"))?;
    Ok(())
}

fn cmd_speed<T: Transport, S: ConfigStore>(
    controller: &Controller<T, S>,
    level: Option<SpeedLevel>,
    label: Option<u8>,
) -> Result<()> {
    let level = match (level, label) {
        (Some(level), _) => level,
        (None, Some(label)) => match SpeedLevel::from_menu_label(label) {
            Some(level) => level,
            None => bail!("Menu label must be odd, 1-15, got {label}"),
        },
        (None, None) => {
            println!("Menu labels:");
            for level in SpeedLevel::all() {
                println!("  {:>2} -> level {}", level.menu_label(), level);
            }
            return Ok(());
        }
    };
    controller.set_speed(level)?;
    println!("Speed set to level {level}");
    Ok(())
}

fn cmd_focus<T: Transport, S: ConfigStore>(
    controller: &Controller<T, S>,
    action: &FocusAction,
) -> Result<()> {
    match action {
        FocusAction::Get => println!("Focus: {}", controller.get_focus()?),
        FocusAction::Set { value } => {
            controller.disable_autofocus()?;
            controller.set_focus(*value)?;
        }
        FocusAction::Auto => controller.enable_autofocus()?,
        FocusAction::Manual => controller.disable_autofocus()?,
    }
    Ok(())
}

fn cmd_preset<T: Transport, S: ConfigStore>(
    controller: &Controller<T, S>,
    action: &PresetAction,
) -> Result<()> {
    match action {
        PresetAction::Set { slot } => {
            let pose = controller.set_preset(*slot)?;
            println!("Preset {slot}: {pose:?}");
        }
        PresetAction::Recall { slot } => match controller.recall_preset(*slot)? {
            Some(pose) => println!("Recalled preset {slot}: {pose:?}"),
            None => println!("Preset {slot} is empty"),
        },
        PresetAction::List => {
            for slot in PresetSlot::all() {
                match controller.preset(slot) {
                    Some(pose) => println!("{slot:>2}: {pose:?}"),
                    None => println!("{slot:>2}: -"),
                }
            }
        }
    }
    Ok(())
}

// ==================== REPL ====================

fn print_repl_help() {
    println!("Commands:");
    println!("  left | right | up | down | in | out   start moving");
    println!("  stop [steer|zoom]                     stop one group, or everything");
    println!("  speed <0-7>");
    println!("  set <1-10> | recall <1-10>            presets");
    println!("  af [on|off|toggle]");
    println!("  focus [value]                         read or set focus");
    println!("  connect [port] | status | help | quit");
    let keys: Vec<String> = KEY_BINDINGS
        .iter()
        .map(|(key, direction)| format!("{}={direction}", key.to_ascii_uppercase()))
        .collect();
    println!("Keyboard bindings in GUI front ends: {}", keys.join(" "));
}

fn cmd_repl<T: Transport, S: ConfigStore>(controller: &Controller<T, S>) -> Result<()> {
    let mut rl = DefaultEditor::new()?;
    print_repl_help();

    loop {
        match rl.readline("ptz> ") {
            Ok(line) => {
                let cmd = line.trim();
                if cmd.is_empty() {
                    continue;
                }
                let _ = rl.add_history_entry(&line);

                let mut words = cmd.split_whitespace();
                match words.next().map(str::to_ascii_lowercase).as_deref() {
                    Some("quit") | Some("exit") => break,
                    Some("help") => {
                        print_repl_help();
                        continue;
                    }
                    Some("status") => {
                        println!("{}", controller.status_text());
                        for group in AxisGroup::iter() {
                            println!("  {group}: {:?}", controller.motion_state(group));
                        }
                        println!("  focus mode: {}", controller.focus_mode());
                        continue;
                    }
                    Some("connect") => {
                        let state = controller.connect(words.next().map(InterfaceId::from));
                        println!("{state}");
                        continue;
                    }
                    _ => {}
                }

                match cmd.parse::<Intent>() {
                    Ok(intent) => match controller.dispatch(intent) {
                        Ok(outcome) => println!("{outcome}"),
                        Err(e) => println!("Error: {e}"),
                    },
                    Err(e) => println!("{e}"),
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("^C");
                break;
            }
            Err(ReadlineError::Eof) => break,
            Err(err) => {
                println!("Error: {err}");
                break;
            }
        }
    }

    if let Err(e) = controller.halt() {
        println!("Halt on exit: {e}");
    }
    Ok(())
}
