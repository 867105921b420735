//! `loco`: runs the museum layout from a TOML configuration.
//!
//! Operator commands are read line by line from stdin:
//!
//! ```text
//! confirm   release the opening ceremony
//! stop      emergency stop
//! clear     clear the emergency stop
//! pause     ramp all trains down and refuse power-on
//! resume    lift the pause
//! status    print the latest snapshot
//! quit      cut power and exit
//! ```
//!
//! When stdin is closed (running as a service) the layout stays powered
//! until SIGINT or SIGTERM arrives.

use std::io::{self, BufRead};
use std::path::PathBuf;
use std::process::ExitCode;
use std::str::FromStr;

use clap::Parser;
use loco::engine::{
    ConfigError, ControlConfig, ControlSnapshot, LoggingSink, ModeFlags, RealtimeController,
    SubmitError, SystemClock,
};
use loco::types::{Intent, IntentPayload, RoundKind, TrainPhase};
use thiserror::Error;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "loco", about = "Museum model railway train control")]
struct Cli {
    /// Layout, train, and round configuration.
    #[arg(long, env = "LOCO_CONFIG", default_value = "museum.toml")]
    config: PathBuf,

    /// Relax safety timers and ignore off-time windows.
    #[arg(long)]
    debug: bool,

    /// Run the opening ceremony before the first round.
    #[arg(long)]
    opening: bool,

    /// Disable sound.
    #[arg(long)]
    no_sound: bool,

    /// No hardware attached.
    #[arg(long = "virtual")]
    virtual_mode: bool,

    /// Read-only exhibition display.
    #[arg(long)]
    show: bool,

    /// Round to start with (regular, fast, outside).
    #[arg(long)]
    round: Option<RoundKind>,

    /// Log round durations.
    #[arg(long)]
    measure: bool,
}

impl Cli {
    fn flags(&self) -> ModeFlags {
        ModeFlags {
            debug: self.debug,
            opening: self.opening,
            sound: !self.no_sound,
            virtual_mode: self.virtual_mode,
            show: self.show,
            round: self.round,
            measure: self.measure,
        }
    }
}

#[derive(Debug, Error)]
enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("io: {0}")]
    Io(#[from] io::Error),
}

/// One operator command from stdin.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Command {
    Confirm,
    Stop,
    Clear,
    Pause,
    Resume,
    Status,
    Quit,
}

impl FromStr for Command {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "confirm" => Ok(Self::Confirm),
            "stop" => Ok(Self::Stop),
            "clear" => Ok(Self::Clear),
            "pause" => Ok(Self::Pause),
            "resume" => Ok(Self::Resume),
            "status" => Ok(Self::Status),
            "quit" => Ok(Self::Quit),
            other => Err(other.to_owned()),
        }
    }
}

/// How the command input ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum InputEnd {
    /// The operator asked to quit.
    Quit,
    /// Input reached end of file without `quit`.
    Closed,
}

/// Feed every command in `input` to `apply` until `quit` or end of input.
fn read_commands<R: BufRead>(input: R, mut apply: impl FnMut(Command)) -> io::Result<InputEnd> {
    for line in input.lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match line.parse::<Command>() {
            Ok(Command::Quit) => return Ok(InputEnd::Quit),
            Ok(command) => apply(command),
            Err(other) => warn!(command = %other, "unknown command"),
        }
    }
    Ok(InputEnd::Closed)
}

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "loco stopped");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<(), RunError> {
    let config = ControlConfig::from_path(&cli.config)?;
    let flags = cli.flags();
    info!(config = %cli.config.display(), ?flags, "starting");

    let mut ctl = RealtimeController::new(
        config,
        flags,
        Box::new(SystemClock),
        Box::new(LoggingSink),
    )?;

    let end = read_commands(io::stdin().lock(), |command| match command {
        Command::Confirm => ctl.opening_gate().confirm(),
        Command::Stop => ctl.emergency_stop(),
        Command::Clear => submit(&ctl, Intent::clear_emergency()),
        Command::Pause => submit(&ctl, Intent::new(IntentPayload::Pause)),
        Command::Resume => submit(&ctl, Intent::new(IntentPayload::Resume)),
        Command::Status => match ctl.latest_snapshot() {
            Some(snap) => print_status(&snap),
            None => println!("no snapshot yet"),
        },
        Command::Quit => {}
    })?;

    // Without a terminal the layout keeps running until the service
    // manager stops it.
    if end == InputEnd::Closed {
        info!("stdin closed, running until interrupted or terminated");
        wait_for_termination()?;
    }

    let report = ctl.shutdown();
    info!(total_ms = report.total_ms, "power off");
    Ok(())
}

/// Block until SIGINT, or SIGTERM on unix.
fn wait_for_termination() -> io::Result<()> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?
        .block_on(shutdown_signal());
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        tokio::select! {
            _ = ctrl_c() => {},
            _ = terminate() => {},
        }
    }

    #[cfg(not(unix))]
    ctrl_c().await;

    info!("termination signal received");
}

async fn ctrl_c() {
    if let Err(err) = signal::ctrl_c().await {
        warn!(?err, "failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
}

#[cfg(unix)]
async fn terminate() {
    match signal::unix::signal(signal::unix::SignalKind::terminate()) {
        Ok(mut term) => {
            term.recv().await;
        }
        Err(err) => {
            warn!(?err, "failed to install SIGTERM handler");
            std::future::pending::<()>().await;
        }
    }
}

fn submit(ctl: &RealtimeController, intent: Intent) {
    match ctl.submit_intents(vec![intent]) {
        Ok(receipts) => {
            for r in receipts.iter().filter(|r| !r.accepted) {
                if let Some(reason) = &r.reason {
                    warn!(%reason, "rejected");
                }
            }
        }
        Err(SubmitError::ChannelFull) => warn!("busy, try again"),
        Err(SubmitError::Shutdown) => error!("tick thread has stopped"),
    }
}

fn print_status(snap: &ControlSnapshot) {
    let round = snap.round.map_or("-", RoundKind::as_str);
    println!(
        "tick {} at {}  round {}  {}{}{}",
        snap.tick_id.0,
        snap.time_of_day.format("%H:%M:%S"),
        round,
        snap.scheduler,
        if snap.halted { "  HALTED" } else { "" },
        if snap.off_time { "  off-time" } else { "" },
    );
    for train in snap.trains.iter().filter(|t| t.visible) {
        println!("{}", train_line(&train.label, train.phase, train.speed));
    }
}

/// Status line for one train; `speed` is in km/h.
fn train_line(label: &str, phase: TrainPhase, speed: f64) -> String {
    format!("  {label:<16} {phase:?} {speed:>6.1} km/h")
}
