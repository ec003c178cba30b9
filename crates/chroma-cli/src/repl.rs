//! REPL – Read-Eval-Print Loop for the interactive controller shell.
//!
//! Supported commands:
//!   x,y,z            – absolute move, gripper unchanged
//!   open | close     – gripper
//!   set              – store the current position as home
//!   home             – run the homing routine
//!   safety on|off    – toggle the executor-side bounds check
//!   search <color>   – sweep the search region and report the first hit
//!   pickup <color>   – one full pick-and-place cycle
//!   autosort         – sort until a pass finds nothing (Ctrl-C stops it)
//!   status           – position, gripper and link state
//!   help             – show this list
//!   exit | quit      – home, release the link and leave

use colored::Colorize;
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chroma_runtime::{AutoSort, PickAndPlace, SearchOutcome};
use chroma_types::{CycleOutcome, GripperState, Position, RobotError};

/// One parsed line of operator input.
#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    Move(Position),
    Gripper(GripperState),
    SetHome,
    Home,
    Safety(bool),
    Search(String),
    Pickup(String),
    AutoSort,
    Status,
    Help,
    Exit,
}

/// Parse one line. Color names are lower-cased but not checked here.
pub fn parse(line: &str) -> Result<Input, String> {
    let line = line.trim();
    if line.contains(',') {
        return parse_coordinates(line);
    }
    let mut words = line.split_whitespace();
    let head = words.next().unwrap_or_default().to_ascii_lowercase();
    let arg = words.next().map(str::to_ascii_lowercase);
    if words.next().is_some() {
        return Err(format!("too many arguments in '{line}'"));
    }

    let input = match (head.as_str(), arg) {
        ("open", None) => Input::Gripper(GripperState::Open),
        ("close", None) => Input::Gripper(GripperState::Closed),
        ("set", None) => Input::SetHome,
        ("home", None) => Input::Home,
        ("safety", Some(state)) => match state.as_str() {
            "on" => Input::Safety(true),
            "off" => Input::Safety(false),
            _ => return Err("Usage: safety on|off".into()),
        },
        ("search", Some(color)) => Input::Search(color),
        ("pickup", Some(color)) => Input::Pickup(color),
        ("search", None) => return Err("Usage: search <color>  (e.g. 'search red')".into()),
        ("pickup", None) => return Err("Usage: pickup <color>  (e.g. 'pickup blue')".into()),
        ("autosort", None) => Input::AutoSort,
        ("status", None) => Input::Status,
        ("help", None) => Input::Help,
        ("exit" | "quit", None) => Input::Exit,
        _ => return Err(format!("unknown command '{line}'")),
    };
    Ok(input)
}

fn parse_coordinates(raw: &str) -> Result<Input, String> {
    let values = raw
        .split(',')
        .map(|v| v.trim().parse::<f64>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| "Invalid numbers! Use format: x,y,z".to_string())?;
    let &[x, y, z] = values.as_slice() else {
        return Err("Invalid format! Use: x,y,z".into());
    };
    if ![x, y, z].iter().all(|v| v.is_finite()) {
        return Err("Coordinates must be finite".into());
    }
    Ok(Input::Move(Position::new(x, y, z)))
}

/// What the loop should do after a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

/// A controller plus the flags shared with the Ctrl-C handler.
pub struct Session {
    robot: PickAndPlace,
    /// Raised by Ctrl-C while a long command runs.
    interrupt: Arc<AtomicBool>,
    /// Set while a long command runs, so Ctrl-C cancels it instead of
    /// leaving the shell.
    busy: Arc<AtomicBool>,
}

impl Session {
    pub fn new(robot: PickAndPlace, interrupt: Arc<AtomicBool>, busy: Arc<AtomicBool>) -> Self {
        Self {
            robot,
            interrupt,
            busy,
        }
    }

    pub fn robot(&self) -> &PickAndPlace {
        &self.robot
    }

    /// Execute one command.
    ///
    /// # Errors
    ///
    /// Errors from the controller. Fatal ones leave the gate unusable.
    pub fn execute(&mut self, input: Input) -> Result<Flow, RobotError> {
        match input {
            Input::Move(target) => {
                let at = self.robot.gate_mut().move_keep_gripper(target)?;
                println!("  {} {}", "→".green(), at);
            }
            Input::Gripper(state) => {
                self.robot.gate_mut().set_gripper(state)?;
                println!("  Gripper {}", state.to_string().bold());
            }
            Input::SetHome => {
                let home = self.robot.gate_mut().set_home()?;
                println!("  Home set to {}", home.to_string().bold());
            }
            Input::Home => {
                let home = self.robot.gate_mut().home()?;
                println!("  Homed at {}", home.to_string().bold());
            }
            Input::Safety(enabled) => {
                self.robot.gate_mut().set_safety(enabled)?;
                let label = if enabled { "enabled".green() } else { "disabled".yellow() };
                println!("  Executor safety {label}");
            }
            Input::Search(color) => self.cmd_search(&color)?,
            Input::Pickup(color) => self.cmd_pickup(&color)?,
            Input::AutoSort => self.cmd_autosort()?,
            Input::Status => self.cmd_status(),
            Input::Help => cmd_help(),
            Input::Exit => {
                if self.robot.gate().is_usable() {
                    if let Err(e) = self.robot.gate_mut().home() {
                        println!("  {}: {}", "Could not home before exit".yellow(), e);
                    }
                    self.robot.gate_mut().shutdown()?;
                }
                return Ok(Flow::Exit);
            }
        }
        Ok(Flow::Continue)
    }

    fn check_color(&self, color: &str) -> Result<(), RobotError> {
        if self.robot.config().color(color).is_none() {
            return Err(RobotError::UnknownColor(color.to_string()));
        }
        Ok(())
    }

    fn cmd_search(&mut self, color: &str) -> Result<(), RobotError> {
        self.check_color(color)?;
        println!("\n  Starting vision search for {} object …", color.bold());
        match self.robot.search(color)? {
            SearchOutcome::Found {
                position,
                detection,
            } => println!(
                "  {} {} object at pixel ({:.0}, {:.0}), {} px, seen from {}",
                "✓".green().bold(),
                color,
                detection.pixel_x,
                detection.pixel_y,
                detection.pixel_area,
                position
            ),
            SearchOutcome::NotFound => {
                println!("  {} No {} object in the search region.", "–".yellow(), color)
            }
        }
        Ok(())
    }

    fn cmd_pickup(&mut self, color: &str) -> Result<(), RobotError> {
        self.check_color(color)?;
        println!("\n  Starting pick and place for {} object …", color.bold());
        self.busy.store(true, Ordering::SeqCst);
        let result = self.robot.run_cycle(color);
        self.busy.store(false, Ordering::SeqCst);
        match result?.outcome {
            CycleOutcome::Sorted => println!("  {} Pick and place complete!", "✓".green().bold()),
            CycleOutcome::NotFound => {
                println!("  {} No {} object found.", "–".yellow(), color)
            }
            CycleOutcome::Aborted { reason } => {
                println!("  {} Pick and place failed: {}", "✗".red().bold(), reason)
            }
        }
        Ok(())
    }

    fn cmd_autosort(&mut self) -> Result<(), RobotError> {
        println!("\n  Starting automatic sorting … press {} to stop\n", "Ctrl-C".bold());
        self.interrupt.store(false, Ordering::SeqCst);
        self.busy.store(true, Ordering::SeqCst);
        let sorter = AutoSort::for_robot(&self.robot).with_cancel_flag(Arc::clone(&self.interrupt));
        let report = sorter.run(&mut self.robot);
        self.busy.store(false, Ordering::SeqCst);
        self.interrupt.store(false, Ordering::SeqCst);

        let report = report?;
        let secs = (report.finished_at - report.started_at).num_milliseconds() as f64 / 1000.0;
        println!(
            "\n  Automatic sorting finished. Total objects sorted: {}",
            report.total_sorted.to_string().bold()
        );
        println!(
            "  {} cycle(s) in {:.1} s, stopped: {:?}  (run {})",
            report.attempts,
            secs,
            report.stop_reason,
            report.run_id.to_string().dimmed()
        );
        Ok(())
    }

    fn cmd_status(&self) {
        let gate = self.robot.gate();
        let position = gate
            .position()
            .map_or_else(|| "unknown".to_string(), |p| p.to_string());
        let gripper = gate
            .gripper()
            .map_or_else(|| "unknown".to_string(), |g| g.to_string());
        let link = if gate.is_usable() { "up".green() } else { "down".red() };
        println!("  Executor : {} ({})", gate.executor_label().bold(), link);
        println!("  Position : {}", position.bold());
        println!("  Gripper  : {}", gripper.bold());
        println!("  Home     : {}", gate.home_position());
        println!("  Commands : {}", gate.commands_sent());
    }
}

fn cmd_help() {
    println!();
    println!("{}", "Chroma Commands".bold().underline());
    println!("  {}          – absolute move (gripper unchanged)", "x,y,z".bold().cyan());
    println!("  {}   – open / close the gripper", "open  close".bold().cyan());
    println!("  {}            – set the current position as home", "set".bold().cyan());
    println!("  {}           – run the homing routine", "home".bold().cyan());
    println!("  {}  – executor bounds check", "safety on|off".bold().cyan());
    println!("  {} – look for an object", "search <color>".bold().cyan());
    println!("  {} – pick one object and drop it in its zone", "pickup <color>".bold().cyan());
    println!("  {}       – sort everything until none remain", "autosort".bold().cyan());
    println!("  {}         – position, gripper, link", "status".bold().cyan());
    println!("  {}    – home and exit", "exit  quit".bold().cyan());
    println!();
}

/// Entry point for the interactive REPL.
///
/// `shutdown` is polled each iteration; when set the REPL exits cleanly.
pub fn run(mut session: Session, shutdown: Arc<AtomicBool>) {
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }

        print!("{} ", "chroma>".bold().cyan());
        stdout.flush().ok();

        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                eprintln!("{}: {}", "Read error".red(), e);
                break;
            }
        }
        if line.trim().is_empty() {
            continue;
        }

        let input = match parse(&line) {
            Ok(input) => input,
            Err(msg) => {
                println!("  {} Type {} for available commands.", msg.red(), "help".bold());
                continue;
            }
        };

        match session.execute(input) {
            Ok(Flow::Continue) => {}
            Ok(Flow::Exit) => {
                println!("{}", "Done!".green());
                shutdown.store(true, Ordering::SeqCst);
                return;
            }
            Err(e) if e.is_fatal() => {
                println!("  {}: {}", "Link failure".red().bold(), e);
                println!("  No further motion is possible. Restart to reconnect.");
            }
            Err(e) => println!("  {}: {}", "Error".red(), e),
        }
    }

    if session.robot().gate().is_usable()
        && let Err(e) = session.robot.gate_mut().shutdown()
    {
        eprintln!("{}: {}", "Failed to close executor link".red(), e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chroma_hal::{Command, SimExecutor};
    use chroma_perception::{Blob, CandidatePipeline, ScriptedSegmenter};
    use chroma_runtime::MotionGate;
    use chroma_types::RobotConfig;

    fn session() -> (Session, SimExecutor, ScriptedSegmenter) {
        let cfg = RobotConfig::default();
        let sim = SimExecutor::from_config(&cfg);
        let script = ScriptedSegmenter::new();
        let gate = MotionGate::from_config(Box::new(sim.clone()), &cfg);
        let pipeline = CandidatePipeline::from_config(Box::new(script.clone()), &cfg);
        let robot = PickAndPlace::new(gate, pipeline, cfg);
        let flags = (Arc::new(AtomicBool::new(false)), Arc::new(AtomicBool::new(false)));
        (Session::new(robot, flags.0, flags.1), sim, script)
    }

    #[test]
    fn parses_the_command_surface() {
        assert_eq!(parse("3,3,2"), Ok(Input::Move(Position::new(3.0, 3.0, 2.0))));
        assert_eq!(parse(" 1.5, -0.5 ,0 "), Ok(Input::Move(Position::new(1.5, -0.5, 0.0))));
        assert_eq!(parse("OPEN"), Ok(Input::Gripper(GripperState::Open)));
        assert_eq!(parse("close"), Ok(Input::Gripper(GripperState::Closed)));
        assert_eq!(parse("set"), Ok(Input::SetHome));
        assert_eq!(parse("safety off"), Ok(Input::Safety(false)));
        assert_eq!(parse("search Red"), Ok(Input::Search("red".into())));
        assert_eq!(parse("pickup blue"), Ok(Input::Pickup("blue".into())));
        assert_eq!(parse("autosort"), Ok(Input::AutoSort));
        assert_eq!(parse("quit"), Ok(Input::Exit));
    }

    #[test]
    fn rejects_malformed_input() {
        assert!(parse("1,2").is_err());
        assert!(parse("1,2,three").is_err());
        assert!(parse("1,2,inf").is_err());
        assert!(parse("search").is_err());
        assert!(parse("pickup red now").is_err());
        assert!(parse("safety maybe").is_err());
        assert!(parse("dance").is_err());
    }

    #[test]
    fn manual_jog_keeps_gripper_state() {
        let (mut s, sim, _) = session();
        s.execute(Input::Home).unwrap();
        s.execute(Input::Gripper(GripperState::Closed)).unwrap();
        s.execute(Input::Move(Position::new(2.0, 2.0, 1.0))).unwrap();
        assert_eq!(
            sim.moves().last(),
            Some(&(Position::new(2.0, 2.0, 1.0), GripperState::Closed))
        );
    }

    #[test]
    fn out_of_bounds_jog_is_refused_locally() {
        let (mut s, sim, _) = session();
        let err = s.execute(Input::Move(Position::new(9.0, 0.0, 0.0))).unwrap_err();
        assert!(matches!(err, RobotError::OutOfBounds { axis: 'x', .. }));
        assert!(sim.commands().is_empty());
    }

    #[test]
    fn unknown_color_is_refused_before_moving() {
        let (mut s, sim, _) = session();
        assert_eq!(
            s.execute(Input::Pickup("purple".into())),
            Err(RobotError::UnknownColor("purple".into()))
        );
        assert!(sim.commands().is_empty());
    }

    #[test]
    fn pickup_runs_a_cycle() {
        let (mut s, sim, script) = session();
        script.push("red", vec![Blob::new(320.0, 360.0, 500)]);
        script.push("red", vec![Blob::new(320.0, 360.0, 500)]);
        assert_eq!(s.execute(Input::Pickup("red".into())), Ok(Flow::Continue));
        assert_eq!(sim.count(&Command::ResetGripper), 1);
        assert!(!s.busy.load(Ordering::SeqCst));
    }

    #[test]
    fn exit_homes_and_terminates() {
        let (mut s, sim, _) = session();
        assert_eq!(s.execute(Input::Exit), Ok(Flow::Exit));
        assert_eq!(sim.commands(), vec![Command::Home, Command::Terminate]);
        assert!(!s.robot().gate().is_usable());
    }
}
