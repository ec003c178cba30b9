//! `chroma-cli` – Chroma Command Line Interface
//!
//! This binary drives the color-sorting gantry. It:
//!
//! 1. Checks for `~/.chroma/config.toml`; runs a **First-Run Wizard** when the
//!    file is absent.
//! 2. Opens the executor link chosen by `connection.mode`: an in-memory
//!    simulated arm, a TCP dial-out, or a TCP listener the executor dials
//!    into.
//! 3. Homes the robot and drops the operator into an **interactive REPL**
//!    (`x,y,z`, `pickup <color>`, `autosort`, `help`, …).
//! 4. Intercepts **Ctrl-C**: a running auto-sort stops after its current
//!    cycle; at the prompt the shell exits and the link is released.
//!
//! `chroma executor [ADDR] [--dial]` runs the executor side instead: a
//! simulated arm served over TCP, listening on `ADDR` (or dialing it with
//! `--dial`).

mod config;
mod repl;

use colored::Colorize;
use std::net::{TcpListener, TcpStream};
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{error, info, warn};

use chroma_hal::{ExecutorServer, MotionExecutor, SceneObject, SimArm, SimExecutor, TcpTransport};
use chroma_perception::{CandidatePipeline, ColorThresholdSegmenter};
use chroma_runtime::{MotionGate, PickAndPlace};
use chroma_types::{RobotConfig, RobotError};

use config::{Config, ExecutorMode};

fn main() -> ExitCode {
    // RUST_LOG filters, CHROMA_LOG_FORMAT=json switches to JSON lines and
    // OTEL_EXPORTER_OTLP_ENDPOINT enables span export. Operator output still
    // uses println!.
    let _telemetry = chroma_runtime::init_tracing("chroma");

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.first().map(String::as_str) {
        None => run_controller(),
        Some("executor") => run_executor(&args[1..]),
        Some("-h" | "--help" | "help") => {
            print_usage();
            ExitCode::SUCCESS
        }
        Some(other) => {
            eprintln!("{}: unknown argument '{}'", "Error".red(), other);
            print_usage();
            ExitCode::FAILURE
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Controller
// ─────────────────────────────────────────────────────────────────────────────

fn run_controller() -> ExitCode {
    print_banner();

    // ── Shared flags ──────────────────────────────────────────────────────
    // `busy` is set while a long command runs; Ctrl-C then raises
    // `interrupt` (auto-sort's cancel flag) instead of `shutdown`.
    let shutdown = Arc::new(AtomicBool::new(false));
    let interrupt = Arc::new(AtomicBool::new(false));
    let busy = Arc::new(AtomicBool::new(false));

    {
        let (shutdown, interrupt, busy) = (shutdown.clone(), interrupt.clone(), busy.clone());
        if let Err(e) = ctrlc::set_handler(move || {
            println!();
            if busy.load(Ordering::SeqCst) {
                println!("{}", "⚠  Ctrl-C received – stopping after the current cycle …".yellow().bold());
                interrupt.store(true, Ordering::SeqCst);
            } else {
                println!("{}", "⚠  Ctrl-C received – exiting after this prompt.".yellow().bold());
                shutdown.store(true, Ordering::SeqCst);
            }
        }) {
            warn!(error = %e, "Failed to install Ctrl-C handler; auto-sort cannot be interrupted");
        }
    }

    // ── Configuration ─────────────────────────────────────────────────────
    let cfg = match config::load() {
        Ok(Some(cfg)) => {
            println!(
                "  Config loaded from {}",
                config::config_path().display().to_string().bold()
            );
            cfg
        }
        Ok(None) => run_first_run_wizard(),
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
            let mut cfg = Config::default();
            config::apply_env_overrides(&mut cfg);
            cfg
        }
    };

    // ── Executor link ─────────────────────────────────────────────────────
    let executor = match open_executor(&cfg) {
        Ok(executor) => executor,
        Err(e) => {
            error!(error = %e, mode = %cfg.connection.mode, "could not open executor link");
            println!("{}: {}", "Executor unavailable".red().bold(), e);
            return ExitCode::FAILURE;
        }
    };
    println!("  Executor link: {}", executor.describe().bold());

    let mut gate = MotionGate::from_config(executor, &cfg.robot);
    match gate.home() {
        Ok(home) => println!("  {} Homed at {}", "✓".green().bold(), home),
        Err(e) => {
            println!("{}: {}", "Homing failed".red().bold(), e);
            if e.is_fatal() {
                return ExitCode::FAILURE;
            }
        }
    }

    let pipeline = CandidatePipeline::from_config(
        Box::new(ColorThresholdSegmenter::from_config(&cfg.robot)),
        &cfg.robot,
    );
    let robot = PickAndPlace::new(gate, pipeline, cfg.robot.clone());

    println!();
    println!(
        "  Colors: {}   Type {} for a list of commands.\n",
        cfg.robot.sort_order().join(", ").bold(),
        "help".bold().cyan()
    );

    // ── Interactive REPL ──────────────────────────────────────────────────
    repl::run(repl::Session::new(robot, interrupt, busy), shutdown);
    ExitCode::SUCCESS
}

fn open_executor(cfg: &Config) -> Result<Box<dyn MotionExecutor>, RobotError> {
    let conn = &cfg.connection;
    match conn.mode {
        ExecutorMode::Sim => Ok(Box::new(SimExecutor::new(demo_arm(&cfg.robot)))),
        ExecutorMode::Connect => {
            print!("  Connecting to executor at {} … ", conn.executor_addr.dimmed());
            let link = TcpTransport::connect(conn.executor_addr.as_str(), conn.response_timeout());
            println!("{}", if link.is_ok() { "connected".green() } else { "failed".red() });
            Ok(Box::new(link?))
        }
        ExecutorMode::Listen => {
            let listener = TcpListener::bind(conn.bind_addr.as_str())?;
            println!(
                "  Waiting for the executor to connect on {} …",
                conn.bind_addr.dimmed()
            );
            Ok(Box::new(TcpTransport::accept(&listener, conn.response_timeout())?))
        }
    }
}

/// A simulated table with one object per default color, placed inside the
/// search region and clear of every drop zone.
fn demo_arm(cfg: &RobotConfig) -> SimArm {
    let spots = [(2.0, 2.5), (4.0, 4.5), (2.5, 4.5)];
    cfg.sort_order()
        .into_iter()
        .zip(spots)
        .fold(SimArm::from_config(cfg), |arm, (color, (x, y))| {
            arm.with_object(SceneObject::new(color, x, y))
        })
}

// ─────────────────────────────────────────────────────────────────────────────
// Executor
// ─────────────────────────────────────────────────────────────────────────────

fn run_executor(args: &[String]) -> ExitCode {
    let dial = args.iter().any(|a| a == "--dial");
    let cfg = config::load().ok().flatten().unwrap_or_default();
    let addr = args
        .iter()
        .find(|a| !a.starts_with("--"))
        .cloned()
        .unwrap_or_else(|| {
            if dial {
                cfg.connection.executor_addr.clone()
            } else {
                cfg.connection.bind_addr.clone()
            }
        });

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = shutdown.clone();
        if let Err(e) = ctrlc::set_handler(move || shutdown.store(true, Ordering::SeqCst)) {
            warn!(error = %e, "Failed to install Ctrl-C handler");
        }
    }

    let mut server = ExecutorServer::new(demo_arm(&cfg.robot));
    let result = if dial {
        println!("  Simulated executor dialing controller at {}", addr.bold());
        TcpStream::connect(addr.as_str())
            .map_err(RobotError::from)
            .and_then(|stream| server.serve_connection(stream, &shutdown))
            .map(|end| info!(?end, "session ended"))
    } else {
        println!("  Simulated executor listening on {}", addr.bold());
        TcpListener::bind(addr.as_str())
            .map_err(RobotError::from)
            .and_then(|listener| server.serve(&listener, &shutdown))
    };

    match result {
        Ok(()) => {
            println!("  Served {} command(s).", server.commands_served());
            ExitCode::SUCCESS
        }
        Err(e) => {
            println!("{}: {}", "Executor error".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// First-Run Wizard
// ─────────────────────────────────────────────────────────────────────────────

fn run_first_run_wizard() -> Config {
    println!();
    println!("{}", "  ╔══════════════════════════════════════╗".bold().cyan());
    println!("{}", "  ║       Chroma First-Run Wizard        ║".bold().cyan());
    println!("{}", "  ╚══════════════════════════════════════╝".bold().cyan());
    println!();
    println!("  No configuration found.  Let's set up Chroma.\n");

    let mut cfg = Config::default();

    println!("  How should the controller reach the motion executor?");
    println!("    1) Simulated arm in this process  (default)");
    println!("    2) Connect to an executor over TCP");
    println!("    3) Listen and let the executor connect");
    let choice = prompt_line("  Enter choice [1]: ", "1");
    cfg.connection.mode = match choice.trim() {
        "2" => ExecutorMode::Connect,
        "3" => ExecutorMode::Listen,
        _ => ExecutorMode::Sim,
    };

    match cfg.connection.mode {
        ExecutorMode::Connect => {
            cfg.connection.executor_addr = prompt_line(
                &format!("  Executor address [{}]: ", cfg.connection.executor_addr),
                &cfg.connection.executor_addr,
            );
        }
        ExecutorMode::Listen => {
            cfg.connection.bind_addr = prompt_line(
                &format!("  Listen address [{}]: ", cfg.connection.bind_addr),
                &cfg.connection.bind_addr,
            );
        }
        ExecutorMode::Sim => {}
    }

    if cfg.connection.mode != ExecutorMode::Sim {
        let ms = prompt_line("  Response timeout in ms, 0 waits forever [0]: ", "0");
        if let Ok(ms) = ms.trim().parse::<u64>() {
            cfg.connection.response_timeout_ms = (ms > 0).then_some(ms);
        }
    }

    match config::save(&cfg) {
        Ok(()) => println!(
            "\n  {} Config saved to {}\n",
            "✓".green().bold(),
            config::config_path().display().to_string().bold()
        ),
        Err(e) => println!("{}: {}", "Error saving config".red(), e),
    }
    config::apply_env_overrides(&mut cfg);
    cfg
}

// ─────────────────────────────────────────────────────────────────────────────
// Banner
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("{}", r#"   _____ __                            "#.bold().cyan());
    println!("{}", r#"  / ___// /_  _________  ____ ___  ____ _"#.bold().cyan());
    println!("{}", r#" / /   / __ \/ ___/ __ \/ __ `__ \/ __ `/"#.bold().cyan());
    println!("{}", r#"/ /___/ / / / /  / /_/ / / / / / / /_/ / "#.bold().cyan());
    println!("{}", r#"\____/_/ /_/_/   \____/_/ /_/ /_/\__,_/  "#.bold().cyan());
    println!();
    println!(
        "  {} {}",
        "Chroma".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Vision-guided color sorting controller");
    println!();
}

fn print_usage() {
    println!("Usage:");
    println!("  chroma                          interactive controller");
    println!("  chroma executor [ADDR]          simulated executor listening on ADDR");
    println!("  chroma executor [ADDR] --dial   simulated executor dialing a controller");
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn prompt_line(msg: &str, default: &str) -> String {
    use std::io::{BufRead, Write};
    print!("{}", msg);
    std::io::stdout().flush().ok();
    let mut line = String::new();
    match std::io::stdin().lock().read_line(&mut line) {
        Ok(_) => {
            let t = line.trim().to_string();
            if t.is_empty() { default.to_string() } else { t }
        }
        Err(_) => default.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn demo_objects_are_searchable_and_outside_drop_zones() {
        let cfg = RobotConfig::default();
        let arm = demo_arm(&cfg);
        assert_eq!(arm.objects().len(), 3);
        for object in arm.objects() {
            assert!(cfg.search.x_min <= object.x && object.x <= cfg.search.x_max);
            assert!(cfg.search.y_min <= object.y && object.y <= cfg.search.y_max);
            assert!(cfg.drop_zones.iter().all(|z| !z.contains_xy(object.x, object.y)));
        }
    }
}
