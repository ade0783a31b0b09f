/*
Copyright (c) 2022 VMware, Inc.
SPDX-License-Identifier: MIT
Permission is hereby granted, free of charge, to any person obtaining a copy
of this software and associated documentation files (the "Software"), to deal
in the Software without restriction, including without limitation the rights
to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
copies of the Software, and to permit persons to whom the Software is
furnished to do so, subject to the following conditions:
The above copyright notice and this permission notice shall be included in all
copies or substantial portions of the Software.
THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
SOFTWARE.
 */

// Derived from lib/daemon-unix.c in Open vSwitch, with the following license:
/*
 * Copyright (c) 2008, 2009, 2010, 2011, 2012, 2013, 2015 Nicira, Inc.
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at:
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

//! Utilities for running an executable or an in-process callable as a
//! supervised background daemon.
//!
//! [`start`] detaches a daemon from the current session through a chain of
//! three processes:
//!
//!   - The "setup process", forked from the caller.  It forks the guardian
//!     and exits immediately, so the guardian is reparented to process 1 and
//!     can never reacquire the caller's controlling terminal.
//!
//!   - The "guardian process".  It takes an exclusive advisory lock on the
//!     pidfile, holds it for its whole life, records the daemon's identity
//!     in the pidfile, and blocks waiting for the daemon.  When the daemon
//!     exits, or when the guardian receives `SIGTERM`, it kills the daemon's
//!     entire process group, truncates the pidfile and exits; the lock dies
//!     with it.  It shows up in `ps` as `ubic-guardian <name>`.
//!
//!   - The "daemon process", running in its own process group as
//!     `ubic-daemon <name>`.  It either execs the requested binary or runs
//!     the caller-supplied callable.
//!
//! The caller learns the outcome through a handshake pipe: the guardian
//! writes a marker line once the pidfile is written, the daemon writes one
//! just before handing itself over, and any process in the chain that fails
//! writes the error text instead.  `start` succeeds exactly when both marker
//! lines arrive, so a successful return guarantees the pidfile is on disk,
//! locked by a live guardian, and the daemon is off in its own process
//! group.
//!
//! [`check`] decides, from nothing but the pidfile, whether a daemon is
//! running: if the pidfile's lock is held a guardian is alive; otherwise the
//! record is orphaned, and `check` inspects the recorded `(pid, start-time
//! token)` pair to distinguish a dead daemon, a live but unguarded daemon
//! (killed on sight), and an unrelated process that inherited a recycled
//! pid (left strictly alone).  [`stop`] signals the guardian and waits for
//! `check` to agree the daemon is gone.
//!
//! ```no_run
//! use clap::Parser;
//! use ubic_daemon::{StartOptions, Target};
//!
//! let options = StartOptions::parse();
//! let target = Target::Exec {
//!     path: "/usr/bin/my-service".into(),
//!     args: Vec::new(),
//! };
//! unsafe { ubic_daemon::start(target, &options) }.expect("daemon failed to start");
//! ```

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use libc::{self, c_int, pid_t};
use signal_hook::consts::signal::SIGTERM;
use signal_hook::iterator::Signals;
use std::ffi::{CString, OsString};
use std::fmt;
use std::fs::{read_dir, File, OpenOptions};
use std::io::prelude::*;
use std::io::ErrorKind;
use std::os::unix::prelude::*;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};
use std::sync::Mutex;
use std::thread;
use std::time::Duration;
use tracing::{event, Level};

pub mod pidfile;
pub mod procstat;
pub mod proctitle;

pub use pidfile::PidRecord;

/// Written by the guardian once the pidfile record is on disk.
const MARKER_PIDFILE_WRITTEN: &str = "pidfile written\n";

/// Written by the daemon process just before it execs the binary or enters
/// the callable.
const MARKER_EXECING: &str = "xexecing into daemon\n";

/// What the daemon process should run.
pub enum Target {
    /// Exec `path` with `args`, replacing the daemon's process image.
    Exec { path: PathBuf, args: Vec<OsString> },
    /// Run a callable inside the daemon process.  Only meaningful when the
    /// caller's process image contains the code the daemon should run; the
    /// callable is invoked in a fresh fork of the caller.
    Callable(Box<dyn FnOnce()>),
}

impl Target {
    fn default_name(&self) -> String {
        match self {
            Target::Exec { path, .. } => path.display().to_string(),
            Target::Callable(_) => "anonymous".to_owned(),
        }
    }
}

/// Options for starting a supervised daemon.
///
/// This can be used on its own or flattened into a larger `clap` argument
/// structure:
///
/// ```no_run
/// use clap::Parser;
/// use ubic_daemon::StartOptions;
///
/// #[derive(Parser, Debug)]
/// struct Args {
///     #[clap(flatten)]
///     start: StartOptions,
///
///     //...other options...
/// }
///
/// let Args { start, .. } = Args::parse();
/// ```
#[derive(Clone, Debug, Parser)]
pub struct StartOptions {
    /// The pidfile that identifies and locks this daemon.
    #[clap(long)]
    pub pidfile: PathBuf,

    /// Service name, shown in process listings.  Defaults to the binary
    /// path, or to `anonymous` for callables.
    #[clap(long)]
    pub name: Option<String>,

    /// File the daemon's stdout is appended to.
    #[clap(long)]
    pub stdout: Option<PathBuf>,

    /// File the daemon's stderr is appended to.
    #[clap(long)]
    pub stderr: Option<PathBuf>,

    /// The guardian's own log file.
    #[clap(long)]
    pub ubic_log: Option<PathBuf>,

    /// Run the daemon as this user.
    #[clap(long)]
    pub user: Option<String>,
}

/// Starts a daemon under a guardian process and waits until the pair is up
/// (or has failed to come up).  Fails without side effects if [`check`]
/// says a daemon already holds the pidfile.
///
/// On success the pidfile contains a current-format record, its lock is
/// held by the guardian, and the daemon is running in its own process
/// group.  On failure the error carries everything the process chain wrote
/// on the handshake pipe.
///
/// # Safety
///
/// This function forks, and any thread other than the calling one is dead
/// in the children: it is only safe to call while the process is
/// single-threaded, and it will assert-fail if additional threads have been
/// started.
pub unsafe fn start(target: Target, options: &StartOptions) -> Result<()> {
    assert_single_threaded();

    if check(&options.pidfile)? {
        bail!("{}: daemon is already running", options.pidfile.display());
    }
    let name = match options.name {
        Some(ref name) => name.clone(),
        None => target.default_name(),
    };

    let (read_fd, write_fd) = sys::pipe().context("creating handshake pipe")?;
    match sys::fork().context("forking setup process")? {
        Some(setup_pid) => {
            drop(write_fd);
            sys::waitpid(setup_pid, 0).context("waiting for setup process")?;

            let mut raw = Vec::new();
            File::from(read_fd)
                .read_to_end(&mut raw)
                .context("reading handshake pipe")?;
            let output = String::from_utf8_lossy(&raw);
            if output.contains(MARKER_PIDFILE_WRITTEN) && output.contains(MARKER_EXECING) {
                Ok(())
            } else {
                bail!("{name}: daemon failed to start:\n{output}");
            }
        }
        None => {
            // Setup process.  Fork the guardian and exit at once, so the
            // guardian is reparented to process 1.
            drop(read_fd);
            let mut pipe = File::from(write_fd);
            match sys::fork() {
                Ok(Some(_guardian_pid)) => sys::immediate_exit(0),
                Ok(None) => run_guardian(target, options, &name, pipe),
                Err(e) => {
                    let _ = writeln!(pipe, "forking guardian: {e}");
                    sys::immediate_exit(1);
                }
            }
        }
    }
}

fn run_guardian(target: Target, options: &StartOptions, name: &str, pipe: File) -> ! {
    let mut pipe = Some(pipe);
    let status = match guardian_main(target, options, name, &mut pipe) {
        Ok(status) => status,
        Err(error) => {
            // The caller decides success solely from the marker lines, so
            // serialize the failure onto the pipe while it is still open.
            match pipe {
                Some(ref mut pipe) => drop(writeln!(pipe, "{error:#}")),
                None => event!(Level::ERROR, "guardian failed: {error:#}"),
            }
            sys::immediate_exit(1);
        }
    };
    sys::immediate_exit(if status.success() { 0 } else { 1 });
}

/// The guardian's whole life, from detaching to reaping the daemon.
/// Returns the daemon's exit status; errors before the pidfile-written
/// marker are reported on the handshake pipe by [`run_guardian`].
fn guardian_main(
    target: Target,
    options: &StartOptions,
    name: &str,
    pipe: &mut Option<File>,
) -> Result<ExitStatus> {
    redirect_standard_streams(options)?;

    let log = open_sink(options.ubic_log.as_deref())?;
    let subscriber = tracing_subscriber::fmt()
        .with_writer(Mutex::new(log))
        .with_ansi(false)
        .finish();
    let _log_guard = tracing::subscriber::set_default(subscriber);

    // Losing the terminal is routine for a detached process.
    sys::ignore_signal(libc::SIGHUP).context("ignoring SIGHUP")?;
    proctitle::set(&format!("ubic-guardian {name}"));
    sys::setsid().context("creating session")?;

    let _lock = match pidfile::Lock::try_acquire(&options.pidfile, true)
        .with_context(|| format!("{}: locking pidfile", options.pidfile.display()))?
    {
        Some(lock) => lock,
        // A daemon slipped in between the caller's precondition check and
        // here; this closes that race.
        None => bail!(
            "{}: cannot lock pidfile, daemon is already running",
            options.pidfile.display()
        ),
    };
    pidfile::clear(&options.pidfile)?;

    if let Some(ref user) = options.user {
        let uid = sys::getpwnam_uid(user)
            .with_context(|| format!("{user}: user lookup failed"))?
            .ok_or_else(|| anyhow!("{user}: no such user"))?;
        sys::setuid(uid).with_context(|| format!("{user}: setuid failed"))?;
    }

    let daemon_pid = match unsafe { sys::fork() }.context("forking daemon process")? {
        Some(pid) => pid,
        None => run_daemon(target, name, pipe.take()),
    };

    // Capture the daemon's start-time token and publish the record before
    // telling the caller anything, so a successful `start` implies the
    // record is observable.
    let token = procstat::start_time(daemon_pid)?.ok_or_else(|| {
        anyhow!("daemon process {daemon_pid} disappeared before it could be recorded")
    })?;
    pidfile::write(
        &options.pidfile,
        std::process::id() as pid_t,
        token,
        daemon_pid,
    )?;
    install_termination_handler(daemon_pid, options.pidfile.clone())?;

    if let Some(mut pipe) = pipe.take() {
        pipe.write_all(MARKER_PIDFILE_WRITTEN.as_bytes())
            .context("writing to handshake pipe")?;
    }
    event!(Level::INFO, "{name}: daemon running as pid {daemon_pid}");

    let (_, status) = sys::waitpid(daemon_pid, 0).context("waiting for daemon")?;
    if status.success() {
        event!(Level::INFO, "{name}: daemon exited");
    } else {
        event!(Level::ERROR, "{name}: daemon failed ({status})");
    }
    pidfile::clear(&options.pidfile)?;
    Ok(status)
}

/// On SIGTERM the guardian takes the daemon's whole process group down hard,
/// truncates the pidfile and leaves without running any cleanup inherited
/// from the caller.
//
// TODO: send the group SIGTERM first and allow a bounded grace period
// before escalating to SIGKILL.
fn install_termination_handler(daemon_pid: pid_t, pidfile_path: PathBuf) -> Result<()> {
    let mut signals = Signals::new([SIGTERM]).context("installing termination handler")?;
    thread::spawn(move || {
        if signals.forever().next().is_some() {
            let _ = sys::kill(-daemon_pid, libc::SIGKILL);
            let _ = pidfile::clear(&pidfile_path);
            sys::immediate_exit(0);
        }
    });
    Ok(())
}

/// The daemon process: moves into its own process group, announces itself
/// on the handshake pipe, then hands the process over to the target.
fn run_daemon(target: Target, name: &str, mut pipe: Option<File>) -> ! {
    if let Err(e) = daemon_setup() {
        if let Some(ref mut pipe) = pipe {
            let _ = writeln!(pipe, "daemon setup failed: {e}");
        }
        sys::immediate_exit(1);
    }
    proctitle::set(&format!("ubic-daemon {name}"));

    // The marker has to go out before exec: afterwards the pipe would
    // belong to a program that knows nothing about it.
    if let Some(mut pipe) = pipe.take() {
        let _ = pipe.write_all(MARKER_EXECING.as_bytes());
    }

    match target {
        Target::Exec { path, args } => {
            // Only returns on failure.
            let error = Command::new(&path).args(&args).exec();
            eprintln!("{}: exec failed: {error}", path.display());
            sys::immediate_exit(1);
        }
        Target::Callable(callable) => {
            // The forked stack still holds the caller's state; a panic must
            // not unwind into it and run its cleanup a second time.
            match catch_unwind(AssertUnwindSafe(callable)) {
                Ok(()) => sys::immediate_exit(0),
                Err(_) => sys::immediate_exit(1),
            }
        }
    }
}

fn daemon_setup() -> Result<(), std::io::Error> {
    // A group of its own lets the guardian signal the daemon's entire
    // subtree with one negative-pid kill.
    sys::setpgid(0, 0)?;
    // The guardian ignores hangups and the disposition would survive exec;
    // the daemon gets the default back.
    sys::restore_signal(libc::SIGHUP)
}

fn redirect_standard_streams(options: &StartOptions) -> Result<()> {
    let stdin = File::open("/dev/null").context("/dev/null: open failed")?;
    sys::dup2(stdin.as_raw_fd(), 0).context("redirecting stdin")?;
    let stdout = open_sink(options.stdout.as_deref())?;
    sys::dup2(stdout.as_raw_fd(), 1).context("redirecting stdout")?;
    let stderr = open_sink(options.stderr.as_deref())?;
    sys::dup2(stderr.as_raw_fd(), 2).context("redirecting stderr")?;
    Ok(())
}

fn open_sink(path: Option<&Path>) -> Result<File> {
    let path = path.unwrap_or_else(|| Path::new("/dev/null"));
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("{}: open failed", path.display()))
}

/// Reports whether the daemon recorded in `pidfile_path` is present.
///
/// A held pidfile lock means a live guardian, full stop.  An unlocked
/// pidfile with content is an orphaned record, and `check` cleans it up
/// according to what the recorded `(pid, start-time token)` pair turns out
/// to name: nothing (stale record, cleared), the original daemon running
/// unguarded (killed by process group, then cleared), or an unrelated
/// process that inherited the recycled pid (cleared, never killed).
pub fn check<P: AsRef<Path>>(pidfile_path: P) -> Result<bool> {
    let path = pidfile_path.as_ref();
    match std::fs::metadata(path) {
        Ok(metadata) if metadata.len() == 0 => return Ok(false),
        Ok(_) => (),
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e).with_context(|| format!("{}: stat failed", path.display())),
    }
    let _lock = match pidfile::Lock::try_acquire(path, false) {
        Ok(Some(lock)) => lock,
        Ok(None) => return Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
        Err(e) => {
            return Err(e).with_context(|| format!("{}: locking pidfile", path.display()))
        }
    };

    // No guardian holds the lock, yet the pidfile has content.  Decide the
    // orphaned record's fate.
    let (daemon_pid, token) = match pidfile::read(path)? {
        PidRecord::Empty => return Ok(false),
        PidRecord::Legacy { .. } => {
            // No token to compare against, so nothing can be cleaned up
            // safely; leave the file for manual recovery.
            event!(
                Level::WARN,
                "{}: legacy pidfile, assuming daemon is not running",
                path.display()
            );
            return Ok(false);
        }
        PidRecord::Current { daemon: None, .. } => bail!(
            "{}: pidfile records no daemon pid, cannot clean up safely",
            path.display()
        ),
        PidRecord::Current {
            daemon: Some(daemon),
            token,
            ..
        } => (daemon, token),
    };
    match procstat::start_time(daemon_pid)? {
        None => {
            event!(
                Level::INFO,
                "{}: daemon {daemon_pid} is gone, clearing stale pidfile",
                path.display()
            );
            pidfile::clear(path)?;
            Ok(false)
        }
        Some(found) if found == token => {
            // The guardian died without cleaning up, but its daemon is
            // still alive.
            event!(
                Level::WARN,
                "{}: killing unguarded daemon {daemon_pid}",
                path.display()
            );
            if let Err(e) = sys::kill(-daemon_pid, libc::SIGKILL) {
                event!(Level::WARN, "killing process group {daemon_pid} failed ({e})");
            }
            pidfile::clear(path)?;
            Ok(false)
        }
        Some(found) => {
            // Same pid, different start time: the pid now belongs to an
            // unrelated process, which must not be touched.
            event!(
                Level::WARN,
                "{}: pid {daemon_pid} was reused (start time {found}, recorded {token}), \
                 clearing pidfile",
                path.display()
            );
            pidfile::clear(path)?;
            Ok(false)
        }
    }
}

/// What [`stop`] found.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopOutcome {
    NotRunning,
    Stopped,
}

impl fmt::Display for StopOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StopOutcome::NotRunning => "not running",
            StopOutcome::Stopped => "stopped",
        })
    }
}

/// Stops the daemon recorded in `pidfile_path`, politely.
///
/// The termination signal goes to the guardian, whose handler performs the
/// actual teardown of the daemon's process group.  Fails if the daemon is
/// still present after five probe-and-signal rounds, a second apart.
pub fn stop<P: AsRef<Path>>(pidfile_path: P) -> Result<StopOutcome> {
    let path = pidfile_path.as_ref();
    let controller = match pidfile::read(path)? {
        PidRecord::Empty => return Ok(StopOutcome::NotRunning),
        PidRecord::Legacy { pid } => pid,
        PidRecord::Current { guardian, .. } => guardian,
    };
    let mut signalled = false;
    for _ in 0..5 {
        if !check(path)? {
            return Ok(if signalled {
                StopOutcome::Stopped
            } else {
                StopOutcome::NotRunning
            });
        }
        if let Err(e) = sys::kill(controller, libc::SIGTERM) {
            event!(Level::WARN, "sending SIGTERM to {controller} failed ({e})");
        }
        signalled = true;
        thread::sleep(Duration::from_secs(1));
    }
    bail!("{}: unable to stop daemon (pid {controller})", path.display());
}

#[cfg(target_os = "linux")]
fn count_threads(pid: u32) -> Result<usize, std::io::Error> {
    Ok(read_dir(format!("/proc/{pid}/task"))?.count())
}

#[cfg(target_os = "linux")]
fn assert_single_threaded() {
    assert_eq!(count_threads(std::process::id()).unwrap(), 1);
}

#[cfg(not(target_os = "linux"))]
fn assert_single_threaded() {
    // Don't know how to count our threads.
}

mod sys {
    //! System call wrappers.

    use super::*;
    use std::io::Error;

    pub fn pipe() -> Result<(OwnedFd, OwnedFd), Error> {
        let mut fds: [c_int; 2] = [0; 2];
        if unsafe { libc::pipe(fds.as_mut_ptr()) } < 0 {
            return Err(Error::last_os_error());
        }
        Ok((unsafe { OwnedFd::from_raw_fd(fds[0]) }, unsafe {
            OwnedFd::from_raw_fd(fds[1])
        }))
    }

    pub unsafe fn fork() -> Result<Option<pid_t>, Error> {
        let pid = libc::fork();
        if pid < 0 {
            Err(Error::last_os_error())
        } else if pid == 0 {
            Ok(None)
        } else {
            Ok(Some(pid))
        }
    }

    pub fn waitpid(pid: pid_t, flags: c_int) -> Result<(pid_t, ExitStatus), Error> {
        loop {
            let mut status = 0;
            let retval = unsafe { libc::waitpid(pid, &mut status as *mut c_int, flags) };
            if retval != -1 {
                return Ok((retval, ExitStatus::from_raw(status)));
            }
            let err = Error::last_os_error();
            if err.kind() != ErrorKind::Interrupted {
                return Err(err);
            }
        }
    }

    /// `pid` may be negative to signal a whole process group.
    pub fn kill(pid: pid_t, signal: c_int) -> Result<(), Error> {
        match unsafe { libc::kill(pid, signal) } {
            -1 => Err(Error::last_os_error()),
            _ => Ok(()),
        }
    }

    pub fn setsid() -> Result<(), Error> {
        match unsafe { libc::setsid() } {
            -1 => Err(Error::last_os_error()),
            _ => Ok(()),
        }
    }

    pub fn setpgid(pid: pid_t, pgid: pid_t) -> Result<(), Error> {
        match unsafe { libc::setpgid(pid, pgid) } {
            -1 => Err(Error::last_os_error()),
            _ => Ok(()),
        }
    }

    pub fn setuid(uid: libc::uid_t) -> Result<(), Error> {
        match unsafe { libc::setuid(uid) } {
            -1 => Err(Error::last_os_error()),
            _ => Ok(()),
        }
    }

    pub fn dup2(src: c_int, dst: c_int) -> Result<(), Error> {
        loop {
            if unsafe { libc::dup2(src, dst) } >= 0 {
                return Ok(());
            }
            let err = Error::last_os_error();
            if err.kind() != ErrorKind::Interrupted {
                return Err(err);
            }
        }
    }

    pub fn ignore_signal(signal: c_int) -> Result<(), Error> {
        if unsafe { libc::signal(signal, libc::SIG_IGN) } == libc::SIG_ERR {
            return Err(Error::last_os_error());
        }
        Ok(())
    }

    pub fn restore_signal(signal: c_int) -> Result<(), Error> {
        if unsafe { libc::signal(signal, libc::SIG_DFL) } == libc::SIG_ERR {
            return Err(Error::last_os_error());
        }
        Ok(())
    }

    /// Non-blocking exclusive `flock`.  `Ok(false)` means some other process
    /// holds the lock.
    pub fn flock_nonblocking(file: &File) -> Result<bool, Error> {
        loop {
            if unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) } == 0 {
                return Ok(true);
            }
            let err = Error::last_os_error();
            match err.kind() {
                ErrorKind::Interrupted => (),
                ErrorKind::WouldBlock => return Ok(false),
                _ => return Err(err),
            }
        }
    }

    /// Looks up a user's numeric uid.  `Ok(None)` means no such user.
    pub fn getpwnam_uid(user: &str) -> Result<Option<libc::uid_t>, Error> {
        let name = CString::new(user).map_err(|_| Error::from(ErrorKind::InvalidInput))?;
        unsafe {
            // getpwnam tells "no such user" from failure only via errno.
            *libc::__errno_location() = 0;
            let passwd = libc::getpwnam(name.as_ptr());
            if passwd.is_null() {
                match Error::last_os_error() {
                    e if e.raw_os_error() == Some(0) => Ok(None),
                    e => Err(e),
                }
            } else {
                Ok(Some((*passwd).pw_uid))
            }
        }
    }

    /// Exits at once, skipping any cleanup handlers.  The forked children
    /// inherit arbitrary caller state whose shutdown code must not run a
    /// second time.
    pub fn immediate_exit(status: c_int) -> ! {
        unsafe { libc::_exit(status) }
    }
}
