//! Commitment: detach from the terminal, then drop to the target identity.
//!
//! Everything here forks or changes process-wide state, so it runs exactly
//! once, synchronously, before the tokio runtime exists.
//!
//! The process that was started waits on a status pipe until the detached
//! daemon has finished committing, and exits with the daemon's status, so a
//! failed identity switch reaches the caller as a non-zero exit code.

use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::os::fd::{AsRawFd, RawFd};

use nix::sys::signal::{SigHandler, Signal, signal};
use nix::unistd::{ForkResult, dup2, fork, pipe, setsid};
use tracing::{debug, info};

use crate::error::TunnelError;
use crate::privilege::{Identity, SystemIdentity, assume_identity};

const DEV_NULL: &str = "/dev/null";

/// Startup status meaning the daemon is serving.
const STATUS_OK: u8 = 0;

/// Terminal job-control and hangup signals a daemon must not react to.
const IGNORED_SIGNALS: [Signal; 4] = [
    Signal::SIGHUP,
    Signal::SIGTSTP,
    Signal::SIGTTIN,
    Signal::SIGTTOU,
];

/// Write end of the startup status pipe, held by the detached daemon.
struct StartupReport(File);

impl StartupReport {
    /// Tell the waiting parent how commitment ended. Consumes the pipe.
    fn send(mut self, status: u8) {
        if let Err(e) = self.0.write_all(&[status]) {
            debug!(error = %e, "startup status not delivered");
        }
    }
}

/// Perform the one-way transition before serving.
///
/// Unless `foreground` is set the process detaches first; standard error
/// stays open until the identity switch has succeeded so a failure can
/// still be reported.
pub fn commit(identity: &Identity, foreground: bool) -> Result<(), TunnelError> {
    let report = if foreground { None } else { Some(detach()?) };

    let mut result = assume_identity(&mut SystemIdentity, identity).map_err(TunnelError::from);
    if result.is_ok() {
        info!(
            user = %identity.user,
            uid = identity.uid.as_raw(),
            group = %identity.group,
            gid = identity.gid.as_raw(),
            "identity dropped"
        );
    }

    if let Some(report) = report {
        if result.is_ok() {
            result = redirect_to_null(&[nix::libc::STDERR_FILENO]);
        }
        report.send(startup_status(&result));
    }
    result
}

/// Exit status the waiting parent should report for a commitment outcome.
fn startup_status(result: &Result<(), TunnelError>) -> u8 {
    match result {
        Ok(()) => STATUS_OK,
        Err(e) => e.exit_code(),
    }
}

/// Block until the daemon reports its startup status.
///
/// A pipe closed without a status means the daemon died while detaching.
fn await_startup(mut pipe: File) -> u8 {
    let mut status = [0u8; 1];
    match pipe.read_exact(&mut status) {
        Ok(()) => status[0],
        Err(_) => TunnelError::Detach(String::new()).exit_code(),
    }
}

/// Double fork into a new session without a controlling terminal.
///
/// Only the grandchild returns; the original process exits with the status
/// the grandchild later sends through the returned [`StartupReport`].
fn detach() -> Result<StartupReport, TunnelError> {
    let detach_err = |what: &str, e: nix::Error| TunnelError::Detach(format!("{}: {}", what, e));

    let (status_rx, status_tx) = pipe().map_err(|e| detach_err("pipe", e))?;

    // SAFETY: called before the tokio runtime is built, while the process is
    // single-threaded; the parent only waits on the pipe and exits.
    match unsafe { fork() }.map_err(|e| detach_err("fork", e))? {
        ForkResult::Parent { .. } => {
            drop(status_tx);
            std::process::exit(i32::from(await_startup(File::from(status_rx))));
        }
        ForkResult::Child => drop(status_rx),
    }

    setsid().map_err(|e| detach_err("setsid", e))?;

    // SAFETY: still single-threaded; the session leader exits so the daemon
    // can never reacquire a controlling terminal.
    match unsafe { fork() }.map_err(|e| detach_err("fork", e))? {
        ForkResult::Parent { .. } => std::process::exit(0),
        ForkResult::Child => {}
    }

    redirect_to_null(&[nix::libc::STDIN_FILENO, nix::libc::STDOUT_FILENO])?;

    for sig in IGNORED_SIGNALS {
        // SAFETY: SIG_IGN installs no handler code.
        unsafe { signal(sig, SigHandler::SigIgn) }.map_err(|e| detach_err("signal", e))?;
    }

    nix::unistd::chdir(gunnel_core::DEFAULT_WORKING_DIR).map_err(|e| detach_err("chdir", e))?;
    Ok(StartupReport(File::from(status_tx)))
}

fn redirect_to_null(fds: &[RawFd]) -> Result<(), TunnelError> {
    let null = OpenOptions::new()
        .read(true)
        .write(true)
        .open(DEV_NULL)
        .map_err(|e| TunnelError::Detach(format!("{}: {}", DEV_NULL, e)))?;
    for &fd in fds {
        dup2(null.as_raw_fd(), fd).map_err(|e| TunnelError::Detach(format!("dup2: {}", e)))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::privilege::PrivilegeError;

    fn status_pipe() -> (File, StartupReport) {
        let (rx, tx) = pipe().unwrap();
        (File::from(rx), StartupReport(File::from(tx)))
    }

    #[test]
    fn test_startup_status_carries_transition_failures() {
        assert_eq!(startup_status(&Ok(())), STATUS_OK);

        let group = Err(PrivilegeError::GroupTransitionFailed("staff".into()).into());
        assert_eq!(startup_status(&group), 7);

        let user = Err(PrivilegeError::UserTransitionFailed("www".into()).into());
        assert_eq!(startup_status(&user), 8);
    }

    #[test]
    fn test_parent_exits_with_reported_status() {
        let (rx, report) = status_pipe();
        let user: Result<(), TunnelError> =
            Err(PrivilegeError::UserTransitionFailed("www".into()).into());
        report.send(startup_status(&user));
        assert_eq!(await_startup(rx), 8);

        let (rx, report) = status_pipe();
        report.send(startup_status(&Ok(())));
        assert_eq!(await_startup(rx), 0);
    }

    #[test]
    fn test_silent_daemon_counts_as_detach_failure() {
        let (rx, report) = status_pipe();
        drop(report);
        assert_eq!(await_startup(rx), 9);
    }
}
