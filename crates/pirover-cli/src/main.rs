//! `pirover` – rover server entry point.
//!
//! 1. Installs tracing (compact or JSON, optional OTLP export).
//! 2. Loads `~/.pirover/config.toml` (`--init` writes the defaults).
//! 3. Builds the drive train, lights relay, ranger and position source.
//! 4. Serves the command channel until **Ctrl-C**, then cancels every task
//!    and leaves the wheels at neutral.

mod config;

use std::process::ExitCode;
use std::sync::Arc;

use colored::Colorize;
use pirover_cockpit::CommandServer;
use pirover_hal::sim::{SimPositionSource, SimRangeSensor, SimRelay, SimServo};
use pirover_hal::{DriveTrain, GpsdSource, PositionSource};
use pirover_middleware::NotificationBus;
use pirover_runtime::{CancelToken, Rover, init_tracing};
use pirover_types::RoverError;
use tracing::{debug, error, info, warn};

use crate::config::{Config, GpsBackend};

const USAGE: &str = "usage: pirover [--init] [--help]";

fn main() -> ExitCode {
    let mut init = false;
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--init" => init = true,
            "-h" | "--help" => {
                println!("{USAGE}");
                return ExitCode::SUCCESS;
            }
            other => {
                eprintln!("{}: unknown argument '{other}'\n{USAGE}", "error".red());
                return ExitCode::FAILURE;
            }
        }
    }

    if init {
        return write_default_config();
    }

    let _tracing = init_tracing("pirover");
    print_banner();

    let cfg = match config::load() {
        Ok(Some(cfg)) => {
            println!(
                "  Config loaded from {}",
                config::config_path().display().to_string().bold()
            );
            cfg
        }
        Ok(None) => {
            println!(
                "  No config at {}; using defaults ({} writes one).",
                config::config_path().display().to_string().dimmed(),
                "pirover --init".bold()
            );
            let mut cfg = Config::default();
            config::apply_env_overrides(&mut cfg);
            cfg
        }
        Err(e) => {
            eprintln!("{}: {e}", "Config error".red());
            return ExitCode::FAILURE;
        }
    };

    // ── Ctrl-C handler ────────────────────────────────────────────────────
    let shutdown = CancelToken::new();
    let on_signal = shutdown.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – stopping the rover …".yellow().bold());
        on_signal.cancel();
    }) {
        warn!(error = %e, "failed to install Ctrl-C handler; the rover can only be stopped by killing it");
    }

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            error!(error = %e, "failed to start the async runtime");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(serve(cfg, shutdown)) {
        Ok(()) => {
            println!("{}", "  ✓ Wheels at neutral. Goodbye.".green());
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "rover stopped with an error");
            ExitCode::FAILURE
        }
    }
}

async fn serve(cfg: Config, shutdown: CancelToken) -> Result<(), RoverError> {
    let rover_config = cfg.rover_config()?;
    let bus = NotificationBus::default();

    let drive = DriveTrain::new(
        Box::new(SimServo::new("left_wheel")),
        Box::new(SimServo::new("right_wheel")),
    );
    let rover = Arc::new(Rover::new(
        rover_config,
        Box::new(drive),
        Box::new(SimRelay::new("front_led")),
        bus.clone(),
    ));

    let gps = position_source(&cfg).await;
    rover.start_sensors(Box::new(SimRangeSensor::new(cfg.range.sim_distance_cm)), gps);
    tokio::spawn(log_notifications(bus));

    info!(
        port = cfg.server.port,
        gps = %cfg.gps.source,
        avoidance = cfg.safety.avoidance_enabled,
        "rover online"
    );
    println!(
        "  {} Command channel on {}",
        "✓".green().bold(),
        format!("ws://0.0.0.0:{}", cfg.server.port).bold()
    );

    let server = CommandServer::new(Arc::clone(&rover)).with_port(cfg.server.port);
    let result = tokio::select! {
        r = server.run() => r,
        _ = shutdown.cancelled() => Ok(()),
    };

    rover.shutdown().await;
    result
}

/// Fall back to a silent simulated receiver when gpsd is unreachable; the
/// rover runs without a fix until restarted.
async fn position_source(cfg: &Config) -> Box<dyn PositionSource> {
    match cfg.gps.source {
        GpsBackend::Sim => Box::new(SimPositionSource::fixed(
            cfg.gps.sim_latitude,
            cfg.gps.sim_longitude,
        )),
        GpsBackend::Gpsd => match GpsdSource::connect(&cfg.gps.gpsd_addr).await {
            Ok(source) => Box::new(source),
            Err(e) => {
                warn!(error = %e, "gpsd unavailable, running without GPS");
                Box::new(SimPositionSource::without_fix())
            }
        },
    }
}

async fn log_notifications(bus: NotificationBus) {
    let mut rx = bus.subscribe_all();
    while let Ok(event) = rx.recv().await {
        debug!(source = %event.source, payload = ?event.payload, "notification");
    }
}

fn write_default_config() -> ExitCode {
    let path = config::config_path();
    if path.exists() {
        println!("  Config already exists at {}", path.display().to_string().bold());
        return ExitCode::SUCCESS;
    }
    match config::save(&Config::default()) {
        Ok(()) => {
            println!(
                "  {} Config saved to {}",
                "✓".green().bold(),
                path.display().to_string().bold()
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{}: {e}", "Error saving config".red());
            ExitCode::FAILURE
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Banner
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("{}", r#"      ____  _ ____                      "#.bold().cyan());
    println!("{}", r#"     / __ \(_) __ \____ _   _____  _____"#.bold().cyan());
    println!("{}", r#"    / /_/ / / /_/ / __ \ | / / _ \/ ___/"#.bold().cyan());
    println!("{}", r#"   / ____/ / _, _/ /_/ / |/ /  __/ /    "#.bold().cyan());
    println!("{}", r#"  /_/   /_/_/ |_|\____/|___/\___/_/     "#.bold().cyan());
    println!();
    println!(
        "  {} {}",
        "PiRover".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!();
}
