use crate::mode::RunMode;
use std::ffi::OsString;
use std::io;
use std::process::{Command, Stdio};
use thiserror::Error;
use tracing::{info, instrument, warn};

#[derive(Debug, Error)]
pub enum ElevationError {
    #[error("failed to run {program} to elevate privileges: {source}")]
    Spawn { program: String, source: io::Error },
}

/// Outcome of the privilege check for one invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relaunch {
    /// This process may keep going and bind its own listeners.
    NotNeeded,
    /// An elevated copy ran to completion; exit with its code.
    Exited(i32),
}

impl Relaunch {
    /// Status for this process to exit with, if an elevated copy already ran.
    /// Codes outside `0..=255` report a plain failure.
    pub fn exit_status(self) -> Option<u8> {
        match self {
            Self::NotNeeded => None,
            Self::Exited(code) => Some(u8::try_from(code).unwrap_or(1)),
        }
    }
}

/// Re-runs the current invocation with elevated privileges.
pub trait Elevator {
    /// Runs `program` with `args` elevated, blocking until it exits, and
    /// returns its exit code.
    fn relaunch(&self, program: &OsString, args: &[OsString]) -> Result<i32, ElevationError>;
}

/// Elevates through `sudo`, passing the standard streams through.
#[derive(Debug, Clone)]
pub struct SudoElevator {
    program: String,
}

impl SudoElevator {
    pub fn new() -> Self {
        Self {
            program: "sudo".to_string(),
        }
    }
}

impl Default for SudoElevator {
    fn default() -> Self {
        Self::new()
    }
}

impl Elevator for SudoElevator {
    fn relaunch(&self, program: &OsString, args: &[OsString]) -> Result<i32, ElevationError> {
        let status = Command::new(&self.program)
            .arg(program)
            .args(args)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .map_err(|source| ElevationError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        // Killed by a signal: report a plain failure.
        Ok(status.code().unwrap_or(1))
    }
}

/// Whether this process may bind ports below 1024.
pub fn is_privileged() -> bool {
    nix::unistd::geteuid().is_root()
}

/// The binary to hand to an elevated relaunch.
///
/// Only the program is taken from the current process. `sudo` resets the
/// environment, so the caller passes the resolved settings as flags.
pub fn current_program() -> OsString {
    match std::env::current_exe() {
        Ok(path) => path.into_os_string(),
        Err(_) => std::env::args_os().next().unwrap_or_default(),
    }
}

/// Relaunches elevated when production mode lacks the privilege to bind
/// :80 and :443. Every other mode, and an already privileged process,
/// continues untouched.
#[instrument(skip(program, args, elevator), err(Debug))]
pub fn relaunch_if_unprivileged(
    mode: RunMode,
    privileged: bool,
    program: &OsString,
    args: &[OsString],
    elevator: &dyn Elevator,
) -> Result<Relaunch, ElevationError> {
    if mode != RunMode::Production || privileged {
        return Ok(Relaunch::NotNeeded);
    }

    warn!("Production mode requires root privileges to bind ports 80 and 443");
    info!("Relaunching with elevated privileges");

    let code = elevator.relaunch(program, args)?;
    info!(code, "Elevated server exited");
    Ok(Relaunch::Exited(code))
}
