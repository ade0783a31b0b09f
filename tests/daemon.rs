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

use anyhow::{anyhow, ensure, Result};
use std::fs;
use std::os::raw::c_int;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Mutex;
use ubic_daemon::{check, pidfile, procstat, stop, PidRecord, StopOutcome};

fn test_daemon_command() -> Result<Command> {
    let examples_dir = std::env::current_dir()?.join("target/debug/examples");
    Ok(Command::new(examples_dir.join("test-daemon")))
}

fn unique_filename(extension: &str) -> PathBuf {
    static COUNTER: Mutex<usize> = Mutex::new(0);
    let count = match *COUNTER.lock().unwrap() {
        ref mut counter => {
            *counter += 1;
            *counter
        }
    };
    let pid = std::process::id();
    std::env::temp_dir().join(format!("ubic-test{pid}.{count}.{extension}"))
}

fn pidfile_name() -> PathBuf {
    unique_filename("pid")
}

enum Completion<T> {
    Incomplete,
    Complete(T),
}
use Completion::*;

/// Repeatedly evaluates `condition`, sleeping a bit between calls, until it
/// yields Complete(value), then returns Ok(value).  After a while, however,
/// give up and return an error instead.
fn wait_until<T, F>(mut condition: F) -> Result<T>
where
    F: FnMut() -> Completion<T>,
{
    for i in 0..10 {
        if let Complete(result) = condition() {
            return Ok(result);
        }
        let ms = match i {
            0 => 10,
            1 => 100,
            _ => 1000,
        };
        std::thread::sleep(std::time::Duration::from_millis(ms));
    }
    Err(anyhow!("wait_until timed out"))
}

fn send_signal(pid: libc::pid_t, signal: c_int) -> Result<(), std::io::Error> {
    if unsafe { libc::kill(pid, signal) } < 0 {
        Err(std::io::Error::last_os_error())
    } else {
        Ok(())
    }
}

fn process_exists(pid: libc::pid_t) -> Result<(), std::io::Error> {
    send_signal(pid, 0)
}

fn wait_for_process_to_die(pid: libc::pid_t) -> Result<()> {
    wait_until(|| match process_exists(pid) {
        Ok(()) => Incomplete,
        Err(_) => Complete(()),
    })
}

fn wait_until_file_exists<P>(path: P) -> Result<()>
where
    P: AsRef<Path>,
{
    wait_until(|| match path.as_ref().exists() {
        true => Complete(()),
        false => Incomplete,
    })?;
    Ok(())
}

#[cfg(all(target_os = "linux", target_env = "gnu"))]
fn check_title(pid: libc::pid_t, prefix: &str) -> Result<()> {
    let raw = std::fs::read(format!("/proc/{pid}/cmdline"))?;
    let first = raw.split(|&b| b == 0).next().unwrap_or(&[]);
    let title = String::from_utf8_lossy(first);
    ensure!(
        title.starts_with(prefix),
        "process {pid} is titled {title:?}, expected a {prefix:?} prefix"
    );
    Ok(())
}

#[cfg(not(all(target_os = "linux", target_env = "gnu")))]
fn check_title(_pid: libc::pid_t, _prefix: &str) -> Result<()> {
    Ok(())
}

fn start_sleep_daemon(pidfile_name: &Path) -> Result<()> {
    let status = test_daemon_command()?
        .arg("start")
        .arg("--pidfile")
        .arg(pidfile_name)
        .arg("--")
        .arg("/bin/sleep")
        .arg("600")
        .status()?;
    ensure!(status.success(), "daemon start exited with {status}");
    Ok(())
}

fn read_current_record(path: &Path) -> Result<(libc::pid_t, u64, libc::pid_t)> {
    match pidfile::read(path)? {
        PidRecord::Current {
            guardian,
            token,
            daemon: Some(daemon),
        } => Ok((guardian, token, daemon)),
        other => Err(anyhow!("unexpected pidfile record {other:?}")),
    }
}

/// Spawns a long-lived process in its own process group, standing in for an
/// unrelated pid that a stale record might point at.
fn spawn_decoy() -> Result<std::process::Child> {
    use std::os::unix::process::CommandExt;
    let mut command = Command::new("/bin/sleep");
    command.arg("600");
    unsafe {
        command.pre_exec(|| {
            if libc::setpgid(0, 0) < 0 {
                return Err(std::io::Error::last_os_error());
            }
            Ok(())
        });
    }
    Ok(command.spawn()?)
}

#[test]
fn test_start_check_stop() -> Result<()> {
    let pidfile_name = pidfile_name();
    let log_name = unique_filename("log");
    let status = test_daemon_command()?
        .arg("start")
        .arg("--pidfile")
        .arg(&pidfile_name)
        .arg("--ubic-log")
        .arg(&log_name)
        .arg("--")
        .arg("/bin/sleep")
        .arg("600")
        .status()?;
    assert!(status.success());
    assert!(check(&pidfile_name)?);

    // The record is bit-exact and names a live daemon watched by a
    // recognizably-titled guardian.
    let (guardian, token, daemon) = read_current_record(&pidfile_name)?;
    assert_eq!(
        fs::read_to_string(&pidfile_name)?,
        format!("pid {guardian}\npid-token {token}\ndaemon-pid {daemon}\n")
    );
    process_exists(daemon)?;
    check_title(guardian, "ubic-guardian ")?;

    assert_eq!(stop(&pidfile_name)?, StopOutcome::Stopped);
    assert!(!check(&pidfile_name)?);
    assert_eq!(fs::metadata(&pidfile_name)?.len(), 0);
    wait_for_process_to_die(daemon)?;

    // The guardian logged at least its startup line.
    assert!(fs::metadata(&log_name)?.len() > 0);

    fs::remove_file(&pidfile_name)?;
    fs::remove_file(&log_name)?;
    Ok(())
}

#[test]
fn test_double_start_fails() -> Result<()> {
    let pidfile_name = pidfile_name();
    start_sleep_daemon(&pidfile_name)?;

    let output = test_daemon_command()?
        .arg("start")
        .arg("--pidfile")
        .arg(&pidfile_name)
        .arg("--")
        .arg("/bin/sleep")
        .arg("600")
        .output()?;
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("already running"),
        "unexpected start error: {stderr}"
    );

    // The first daemon is unaffected.
    assert!(check(&pidfile_name)?);
    assert_eq!(stop(&pidfile_name)?, StopOutcome::Stopped);
    fs::remove_file(&pidfile_name)?;
    Ok(())
}

#[test]
fn test_concurrent_start() -> Result<()> {
    let pidfile_name = pidfile_name();
    let mut children = Vec::new();
    for _ in 0..2 {
        children.push(
            test_daemon_command()?
                .arg("start")
                .arg("--pidfile")
                .arg(&pidfile_name)
                .arg("--")
                .arg("/bin/sleep")
                .arg("600")
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .spawn()?,
        );
    }
    let mut successes = 0;
    for child in children {
        if child.wait_with_output()?.status.success() {
            successes += 1;
        }
    }
    assert_eq!(successes, 1, "expected exactly one of two starts to win");

    assert!(check(&pidfile_name)?);
    assert_eq!(stop(&pidfile_name)?, StopOutcome::Stopped);
    fs::remove_file(&pidfile_name)?;
    Ok(())
}

#[test]
fn test_stop_without_daemon() -> Result<()> {
    let missing = pidfile_name();
    assert_eq!(stop(&missing)?, StopOutcome::NotRunning);

    let empty = pidfile_name();
    fs::write(&empty, "")?;
    assert_eq!(stop(&empty)?, StopOutcome::NotRunning);
    fs::remove_file(&empty)?;
    Ok(())
}

#[test]
fn test_stale_record_with_dead_daemon() -> Result<()> {
    let pidfile_name = pidfile_name();
    fs::write(
        &pidfile_name,
        format!("pid 1\npid-token 0\ndaemon-pid {}\n", libc::pid_t::MAX),
    )?;
    assert!(!check(&pidfile_name)?);
    assert_eq!(fs::metadata(&pidfile_name)?.len(), 0);
    fs::remove_file(&pidfile_name)?;
    Ok(())
}

#[test]
fn test_stale_record_with_reused_pid() -> Result<()> {
    let mut decoy = spawn_decoy()?;
    let decoy_pid = decoy.id() as libc::pid_t;
    let token = procstat::start_time(decoy_pid)?
        .ok_or_else(|| anyhow!("decoy process has no start time"))?;

    // A record whose pid is alive but whose token belongs to a process that
    // no longer exists: the pid has been "reused".
    let pidfile_name = pidfile_name();
    fs::write(
        &pidfile_name,
        format!("pid 1\npid-token {}\ndaemon-pid {decoy_pid}\n", token + 1),
    )?;
    assert!(!check(&pidfile_name)?);
    assert_eq!(fs::metadata(&pidfile_name)?.len(), 0);

    // The unrelated process must survive the cleanup.
    process_exists(decoy_pid)?;

    decoy.kill()?;
    decoy.wait()?;
    fs::remove_file(&pidfile_name)?;
    Ok(())
}

#[test]
fn test_unguarded_daemon_is_killed() -> Result<()> {
    let pidfile_name = pidfile_name();
    start_sleep_daemon(&pidfile_name)?;
    let (guardian, token, daemon) = read_current_record(&pidfile_name)?;
    assert_eq!(procstat::start_time(daemon)?, Some(token));

    // Kill only the guardian; the daemon keeps running with nobody watching.
    send_signal(guardian, libc::SIGKILL)?;
    wait_for_process_to_die(guardian)?;
    process_exists(daemon)?;

    // check() takes the now-free lock, recognizes the daemon by its token,
    // and puts it down.
    assert!(!check(&pidfile_name)?);
    assert_eq!(fs::metadata(&pidfile_name)?.len(), 0);
    wait_for_process_to_die(daemon)?;
    fs::remove_file(&pidfile_name)?;
    Ok(())
}

#[test]
fn test_legacy_pidfile_is_left_alone() -> Result<()> {
    let pidfile_name = pidfile_name();
    fs::write(&pidfile_name, "4242\n")?;
    assert!(!check(&pidfile_name)?);
    assert_eq!(fs::read_to_string(&pidfile_name)?, "4242\n");
    fs::remove_file(&pidfile_name)?;
    Ok(())
}

#[test]
fn test_callable_daemon() -> Result<()> {
    let pidfile_name = pidfile_name();
    let heartbeat_name = unique_filename("txt");
    let status = test_daemon_command()?
        .arg("start")
        .arg("--pidfile")
        .arg(&pidfile_name)
        .arg("--heartbeat")
        .arg(&heartbeat_name)
        .status()?;
    assert!(status.success());

    wait_until_file_exists(&heartbeat_name)?;
    assert!(check(&pidfile_name)?);
    let (_guardian, _token, daemon) = read_current_record(&pidfile_name)?;
    check_title(daemon, "ubic-daemon ")?;

    assert_eq!(stop(&pidfile_name)?, StopOutcome::Stopped);
    assert!(!check(&pidfile_name)?);
    wait_for_process_to_die(daemon)?;

    fs::remove_file(&pidfile_name)?;
    let _ = fs::remove_file(&heartbeat_name);
    Ok(())
}
