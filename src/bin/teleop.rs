// Keyboard teleop: WASD translate, R/F stick level, L lock, Q quit
//
// Keys act like a stick pushed to the selected level. The stick magnitude is
// shaped through the configured throttle curve and every module gets the same
// speed and heading.
use std::path::PathBuf;
use std::time::{Duration, Instant};

use clap::Parser;
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode},
};
use swerve_module_runtime::config::{RuntimeConfig, TOPIC_CMD_MODULES};
use swerve_module_runtime::drive::{ModuleState, Rotation, ThrottleMap};
use swerve_module_runtime::messages::ModuleCommand;
use tracing::info;
use tracing_subscriber::EnvFilter;

const STICK_LEVELS: [f64; 3] = [0.3, 0.6, 1.0];
const INPUT_TIMEOUT_MS: u64 = 100; // Release the stick after this much time with no input

#[derive(Parser, Debug)]
#[command(about = "Keyboard teleop for the swerve module runtime")]
struct Args {
    /// JSON platform config (throttle curve and deadband)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Module speed at full throttle, m/s
    #[arg(long, default_value_t = 1.0)]
    max_speed: f64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("info"))
        .init();

    let args = Args::parse();
    let config = RuntimeConfig::load(args.config.as_deref())?;
    let throttle = config.throttle.build()?;

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;
    let publisher = session.declare_publisher(TOPIC_CMD_MODULES).await?;

    info!("Controls: WASD=move, R/F=stick level, L=lock, Q=quit");
    print_level(0);

    enable_raw_mode()?;
    let result = run_teleop(&publisher, &throttle, args.max_speed).await;
    disable_raw_mode()?;

    result
}

async fn run_teleop(
    publisher: &zenoh::pubsub::Publisher<'_>,
    throttle: &ThrottleMap,
    max_speed: f64,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut level_idx: usize = 0;

    // Persistent stick state, each axis in [-1, 1]
    let mut stick_x = 0.0;
    let mut stick_y = 0.0;
    let mut lock = false;
    let mut last_movement_input = Instant::now();

    loop {
        // Poll for key with 20ms timeout (50Hz effective rate)
        if event::poll(Duration::from_millis(20))? {
            if let Event::Key(KeyEvent { code, kind, .. }) = event::read()? {
                let pressed = kind == KeyEventKind::Press || kind == KeyEventKind::Repeat;

                match code {
                    KeyCode::Char('w') if pressed => {
                        stick_x = STICK_LEVELS[level_idx];
                        last_movement_input = Instant::now();
                    }
                    KeyCode::Char('s') if pressed => {
                        stick_x = -STICK_LEVELS[level_idx];
                        last_movement_input = Instant::now();
                    }
                    KeyCode::Char('a') if pressed => {
                        stick_y = STICK_LEVELS[level_idx];
                        last_movement_input = Instant::now();
                    }
                    KeyCode::Char('d') if pressed => {
                        stick_y = -STICK_LEVELS[level_idx];
                        last_movement_input = Instant::now();
                    }

                    KeyCode::Char('l') if pressed => {
                        lock = !lock;
                        info!("Lock: {}", if lock { "ON" } else { "OFF" });
                    }

                    // Stick level
                    KeyCode::Char('r') if pressed => {
                        level_idx = (level_idx + 1).min(STICK_LEVELS.len() - 1);
                        print_level(level_idx);
                    }
                    KeyCode::Char('f') if pressed => {
                        level_idx = level_idx.saturating_sub(1);
                        print_level(level_idx);
                    }

                    // Quit
                    KeyCode::Char('q') | KeyCode::Esc if pressed => break,

                    _ => {}
                }
            }
        }

        // Release the stick if no movement input for INPUT_TIMEOUT_MS
        if last_movement_input.elapsed() > Duration::from_millis(INPUT_TIMEOUT_MS) {
            stick_x = 0.0;
            stick_y = 0.0;
        }

        // Always publish at ~50Hz
        let mut cmd = ModuleCommand::uniform(shape_stick(throttle, stick_x, stick_y, max_speed));
        cmd.lock = lock;
        publisher.put(serde_json::to_string(&cmd)?).await?;
    }

    Ok(())
}

/// Turn a stick position into a module state
fn shape_stick(throttle: &ThrottleMap, x: f64, y: f64, max_speed: f64) -> ModuleState {
    let magnitude = x.hypot(y).min(1.0);
    let speed = throttle.throttle_lookup(magnitude) * max_speed;
    let angle = if magnitude > 0.0 {
        Rotation::from_radians(y.atan2(x))
    } else {
        Rotation::ZERO
    };
    ModuleState::new(speed, angle)
}

fn print_level(idx: usize) {
    let label = ["LOW", "MED", "HIGH"][idx];
    info!("Stick level: {}", label);
}
