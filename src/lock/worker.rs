//! Forked isolation worker that owns the locking file descriptor.
//!
//! A POSIX quirk makes a naive implementation wrong: advisory `flock(2)`
//! locks are dropped as soon as *any* descriptor referring to the same file
//! is closed by the owning process, even one opened later by unrelated
//! code. This module guarantees the descriptor used to take the lock lives
//! in a forked child's own descriptor table, never the parent's, by
//! performing the `open` and the `flock` call entirely inside the child
//! (mirrors `fslock/unix.py`'s `_lock_process` in the original
//! implementation this crate was distilled from).

use crate::error::{LockError, LockResult};
use crate::lock::protocol::{self, ControlMessage, WorkerMessage};
use crate::lock::LockMode;
use crate::observability::LOCK_TARGET;
use camino::Utf8Path;
use nix::sys::signal::{SaFlags, SigAction, SigHandler, SigSet, Signal, sigaction};
use nix::sys::wait::{WaitStatus, waitpid};
use nix::unistd::{ForkResult, Pid, fork, pipe};
use std::fs::{File, OpenOptions};
use std::io::{self, BufReader};
use std::os::fd::AsRawFd;
use std::time::Duration;
use tracing::{debug, error, info};

/// A live lock held by a forked worker process.
///
/// The worker keeps the locking descriptor open and blocks until it
/// receives [`ControlMessage::Unlock`], at which point it exits and the
/// kernel releases the lock.
pub(crate) struct WorkerLock {
    pid: Pid,
    control_tx: File,
}

/// Forks a worker, has it acquire `path` in `mode`, and returns once the
/// worker confirms the lock is held (or reports a definitive failure).
pub(crate) fn acquire(path: &Utf8Path, mode: LockMode, timeout: Option<Duration>) -> LockResult<WorkerLock> {
    let (report_rx, report_tx) = pipe().map_err(io::Error::from)?;
    let (control_rx, control_tx) = pipe().map_err(io::Error::from)?;

    // SAFETY: the child immediately either execs nothing and only calls
    // async-signal-safe syscalls (open, flock, read, write, exit) before any
    // other thread-unsafe state is touched; it never returns into Rust code
    // that assumes a single-threaded parent.
    match unsafe { fork() }.map_err(io::Error::from)? {
        ForkResult::Child => {
            drop(report_rx);
            drop(control_tx);
            run_child(path, mode, timeout, File::from(report_tx), File::from(control_rx));
        }
        ForkResult::Parent { child } => {
            drop(report_tx);
            drop(control_rx);
            let mut report_reader = BufReader::new(File::from(report_rx));
            let outcome = protocol::read_message::<_, WorkerMessage>(&mut report_reader)
                .map_err(LockError::Io)?;
            match outcome {
                Some(WorkerMessage::Locked) => {
                    info!(target: LOCK_TARGET, path = %path, ?mode, "acquired lock");
                    Ok(WorkerLock {
                        pid: child,
                        control_tx: File::from(control_tx),
                    })
                }
                Some(WorkerMessage::NotFound) => {
                    reap(child);
                    Err(LockError::NotFound)
                }
                Some(WorkerMessage::Timeout) => {
                    debug!(target: LOCK_TARGET, path = %path, ?mode, "timed out acquiring lock");
                    reap(child);
                    Err(LockError::Timeout)
                }
                Some(WorkerMessage::Error(message)) => {
                    reap(child);
                    Err(LockError::Io(io::Error::other(message)))
                }
                None => {
                    reap(child);
                    Err(LockError::Io(io::Error::other(
                        "lock worker exited without reporting an outcome",
                    )))
                }
            }
        }
    }
}

/// Signals the worker to release the lock and waits for it to exit cleanly.
///
/// A non-zero exit status means the kernel never confirmed the unlock; this
/// is fatal per the crate's error handling design, so the caller aborts.
pub(crate) fn release(mut lock: WorkerLock, path: &Utf8Path, mode: LockMode) -> LockResult<()> {
    protocol::write_message(&mut lock.control_tx, &ControlMessage::Unlock).map_err(LockError::Io)?;

    match waitpid(lock.pid, None) {
        Ok(WaitStatus::Exited(_, 0)) => {
            info!(target: LOCK_TARGET, path = %path, ?mode, "released lock");
            Ok(())
        }
        other => {
            error!(
                target: LOCK_TARGET,
                path = %path,
                ?mode,
                status = ?other,
                "lock worker failed to confirm release"
            );
            Err(LockError::ReleaseFailure)
        }
    }
}

fn reap(pid: Pid) {
    let _ = waitpid(pid, None);
}

/// Entry point executed inside the forked child; never returns.
fn run_child(
    path: &Utf8Path,
    mode: LockMode,
    timeout: Option<Duration>,
    mut report_tx: File,
    control_rx: File,
) -> ! {
    reset_inherited_signal_dispositions();

    let outcome = open_and_lock(path, mode, timeout);
    let should_wait_for_unlock = matches!(outcome, WorkerMessage::Locked);

    if protocol::write_message(&mut report_tx, &outcome).is_err() {
        std::process::exit(1);
    }

    if should_wait_for_unlock {
        let mut control_reader = BufReader::new(control_rx);
        let _ = protocol::read_message::<_, ControlMessage>(&mut control_reader);
    }

    std::process::exit(0);
}

/// Resets signals the child may have inherited so a signal aimed at the
/// parent's process group does not leave the held-lock child in a
/// half-handled state.
fn reset_inherited_signal_dispositions() {
    for signal in [Signal::SIGINT, Signal::SIGHUP, Signal::SIGTERM] {
        let default = SigAction::new(SigHandler::SigDfl, SaFlags::empty(), SigSet::empty());
        // SAFETY: installing the default disposition for a signal is safe
        // from the single-threaded child immediately after fork.
        let _ = unsafe { sigaction(signal, &default) };
    }
}

/// Opens `path` per `mode` and attempts the `flock(2)` call, honouring
/// `timeout`. Runs entirely inside the child.
fn open_and_lock(path: &Utf8Path, mode: LockMode, timeout: Option<Duration>) -> WorkerMessage {
    let file = match open_for_mode(path, mode) {
        Ok(file) => file,
        Err(err) if err.kind() == io::ErrorKind::NotFound && mode == LockMode::Shared => {
            return WorkerMessage::NotFound;
        }
        Err(err) => return WorkerMessage::Error(err.to_string()),
    };

    let op = match mode {
        LockMode::Exclusive => libc::LOCK_EX,
        LockMode::Shared => libc::LOCK_SH,
    };
    let fd = file.as_raw_fd();

    match timeout {
        None => lock_blocking(fd, op),
        Some(duration) if duration.is_zero() => lock_nonblocking(fd, op),
        Some(duration) => lock_with_alarm(fd, op, duration),
    }
}

fn open_for_mode(path: &Utf8Path, mode: LockMode) -> io::Result<File> {
    OpenOptions::new()
        .read(true)
        .write(true)
        .create(mode == LockMode::Exclusive)
        .truncate(false)
        .open(path)
}

fn lock_blocking(fd: i32, op: i32) -> WorkerMessage {
    // SAFETY: `fd` is owned by `file` in `open_and_lock`'s scope, which
    // outlives this call.
    let result = unsafe { libc::flock(fd, op) };
    if result == 0 {
        WorkerMessage::Locked
    } else {
        WorkerMessage::Error(io::Error::last_os_error().to_string())
    }
}

fn lock_nonblocking(fd: i32, op: i32) -> WorkerMessage {
    // SAFETY: see `lock_blocking`.
    let result = unsafe { libc::flock(fd, op | libc::LOCK_NB) };
    if result == 0 {
        WorkerMessage::Locked
    } else {
        let err = io::Error::last_os_error();
        if err.kind() == io::ErrorKind::WouldBlock {
            WorkerMessage::Timeout
        } else {
            WorkerMessage::Error(err.to_string())
        }
    }
}

extern "C" fn alarm_noop(_signum: i32) {}

fn lock_with_alarm(fd: i32, op: i32, duration: Duration) -> WorkerMessage {
    let seconds = u32::try_from(duration.as_secs().max(1)).unwrap_or(u32::MAX);

    let handler = SigAction::new(
        SigHandler::Handler(alarm_noop),
        SaFlags::empty(),
        SigSet::empty(),
    );
    // SAFETY: single-threaded child, installing our own alarm handler.
    let previous = unsafe { sigaction(Signal::SIGALRM, &handler) };

    // SAFETY: `seconds` schedules a one-shot SIGALRM; cleared below.
    unsafe { libc::alarm(seconds) };

    // SAFETY: see `lock_blocking`.
    let result = unsafe { libc::flock(fd, op) };
    let lock_errno = io::Error::last_os_error();

    // SAFETY: cancels any pending alarm before it can fire spuriously later.
    unsafe { libc::alarm(0) };
    if let Ok(previous) = previous {
        // SAFETY: restoring the previous disposition we just displaced.
        let _ = unsafe { sigaction(Signal::SIGALRM, &previous) };
    }

    if result == 0 {
        WorkerMessage::Locked
    } else if lock_errno.kind() == io::ErrorKind::Interrupted {
        WorkerMessage::Timeout
    } else {
        WorkerMessage::Error(lock_errno.to_string())
    }
}
