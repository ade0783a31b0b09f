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

//! The on-disk pidfile: both the identity record for a supervised daemon and
//! the rendezvous for the advisory lock that proves a guardian is alive.
//!
//! The file is written and "removed" by truncating it in place, never by
//! unlinking it.  The advisory lock is bound to the file's inode; unlinking
//! would let a concurrent [`crate::check`] create a fresh inode on which a
//! later guardian could take a second, independent lock for the same logical
//! service.

use anyhow::{anyhow, Context, Result};
use libc::pid_t;
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::Path;
use std::str::FromStr;

use crate::sys;

/// Decoded contents of a pidfile.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PidRecord {
    /// Missing or zero-length file: never written, or cleared by a guardian
    /// that has shut down (or is about to).
    Empty,
    /// A bare pid, written by supervisors that predate start-time tokens.
    /// Accepted on read, never written.
    Legacy { pid: pid_t },
    /// The record a live guardian maintains: its own pid, the start-time
    /// token it captured for the daemon process, and the daemon's pid.  The
    /// daemon pid is optional only because two-line records from an older
    /// writer are still accepted.
    Current {
        guardian: pid_t,
        token: u64,
        daemon: Option<pid_t>,
    },
}

/// Reads and decodes the pidfile at `path`.  A missing or empty file is
/// `PidRecord::Empty`; content that is neither a legacy nor a current record
/// is an error, never a guess.
pub fn read(path: &Path) -> Result<PidRecord> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(PidRecord::Empty),
        Err(e) => return Err(e).with_context(|| format!("{}: read failed", path.display())),
    };
    parse(&contents).ok_or_else(|| anyhow!("{}: malformed pidfile", path.display()))
}

fn parse(contents: &str) -> Option<PidRecord> {
    if contents.is_empty() {
        return Some(PidRecord::Empty);
    }
    let mut lines = contents.lines();
    let first = lines.next()?;
    if first.bytes().all(|b| b.is_ascii_digit()) {
        // Legacy records are a single bare pid and nothing else.
        if lines.next().is_some() {
            return None;
        }
        return Some(PidRecord::Legacy {
            pid: first.parse().ok()?,
        });
    }
    let guardian = field(first, "pid ")?;
    let token = field(lines.next()?, "pid-token ")?;
    let daemon = match lines.next() {
        Some(line) => Some(field(line, "daemon-pid ")?),
        None => None,
    };
    if lines.next().is_some() {
        return None;
    }
    Some(PidRecord::Current {
        guardian,
        token,
        daemon,
    })
}

fn field<T: FromStr>(line: &str, label: &str) -> Option<T> {
    let value = line.strip_prefix(label)?;
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    value.parse().ok()
}

/// Writes a current-format record, truncating whatever was there.  The open
/// uses truncate, not unlink-and-recreate, so the inode the lock is bound to
/// survives.
pub fn write(path: &Path, guardian: pid_t, token: u64, daemon: pid_t) -> Result<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
        .with_context(|| format!("{}: open failed", path.display()))?;
    file.write_all(format!("pid {guardian}\npid-token {token}\ndaemon-pid {daemon}\n").as_bytes())
        .with_context(|| format!("{}: write failed", path.display()))?;
    Ok(())
}

/// Truncates the pidfile to zero length.  Used everywhere the file is being
/// "removed"; see the module comment for why unlink is off the table.
pub fn clear(path: &Path) -> Result<()> {
    OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
        .map(drop)
        .with_context(|| format!("{}: truncate failed", path.display()))
}

/// The advisory whole-file lock on a pidfile.
///
/// A guardian acquires it right after detaching and holds it until the
/// process dies, so "somebody holds the lock" is exactly "a guardian is
/// alive".  [`crate::check`] takes the lock briefly while it examines a
/// record no guardian is protecting; dropping the `Lock` releases it.
#[derive(Debug)]
pub struct Lock {
    _file: File,
}

impl Lock {
    /// Attempts a non-blocking exclusive lock on `path`, creating the file
    /// first if `create` is set.  `Ok(None)` means another process holds the
    /// lock.
    pub fn try_acquire(path: &Path, create: bool) -> std::io::Result<Option<Lock>> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(create)
            .open(path)?;
        match sys::flock_nonblocking(&file)? {
            true => Ok(Some(Lock { _file: file })),
            false => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::MetadataExt;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn pidfile_in(dir: &TempDir) -> PathBuf {
        dir.path().join("test.pid")
    }

    #[test]
    fn test_write_read_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = pidfile_in(&dir);
        write(&path, 100, 12345678, 101).unwrap();
        assert_eq!(
            read(&path).unwrap(),
            PidRecord::Current {
                guardian: 100,
                token: 12345678,
                daemon: Some(101),
            }
        );
    }

    #[test]
    fn test_wire_format_is_exact() {
        let dir = TempDir::new().unwrap();
        let path = pidfile_in(&dir);
        write(&path, 7, 42, 8).unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "pid 7\npid-token 42\ndaemon-pid 8\n");
    }

    #[test]
    fn test_read_missing_file() {
        let dir = TempDir::new().unwrap();
        assert_eq!(read(&pidfile_in(&dir)).unwrap(), PidRecord::Empty);
    }

    #[test]
    fn test_read_empty_file() {
        let dir = TempDir::new().unwrap();
        let path = pidfile_in(&dir);
        std::fs::write(&path, "").unwrap();
        assert_eq!(read(&path).unwrap(), PidRecord::Empty);
    }

    #[test]
    fn test_read_legacy() {
        let dir = TempDir::new().unwrap();
        let path = pidfile_in(&dir);
        std::fs::write(&path, "4242\n").unwrap();
        assert_eq!(read(&path).unwrap(), PidRecord::Legacy { pid: 4242 });

        // A legacy record without the trailing newline is still a legacy
        // record.
        std::fs::write(&path, "4242").unwrap();
        assert_eq!(read(&path).unwrap(), PidRecord::Legacy { pid: 4242 });
    }

    #[test]
    fn test_read_two_line_record() {
        let dir = TempDir::new().unwrap();
        let path = pidfile_in(&dir);
        std::fs::write(&path, "pid 7\npid-token 99\n").unwrap();
        assert_eq!(
            read(&path).unwrap(),
            PidRecord::Current {
                guardian: 7,
                token: 99,
                daemon: None,
            }
        );
    }

    #[test]
    fn test_read_rejects_malformed() {
        let dir = TempDir::new().unwrap();
        let path = pidfile_in(&dir);
        let malformed = [
            "junk\n",
            "-12\n",
            "12 34\n",
            "12\n34\n",
            "pid 1\n",
            "pid one\npid-token 2\ndaemon-pid 3\n",
            "pid 1\ntoken 2\ndaemon-pid 3\n",
            "pid 1\npid-token 2\ndaemon-pid \n",
            "pid 1\npid-token 2\ndaemon-pid 3\nextra 4\n",
            " pid 1\npid-token 2\ndaemon-pid 3\n",
        ];
        for contents in malformed {
            std::fs::write(&path, contents).unwrap();
            assert!(read(&path).is_err(), "accepted malformed {contents:?}");
        }
    }

    #[test]
    fn test_clear_preserves_inode() {
        let dir = TempDir::new().unwrap();
        let path = pidfile_in(&dir);
        write(&path, 1, 2, 3).unwrap();
        let inode = std::fs::metadata(&path).unwrap().ino();

        clear(&path).unwrap();
        let metadata = std::fs::metadata(&path).unwrap();
        assert_eq!(metadata.len(), 0);
        assert_eq!(metadata.ino(), inode);
        assert_eq!(read(&path).unwrap(), PidRecord::Empty);
    }

    #[test]
    fn test_write_truncates_in_place() {
        let dir = TempDir::new().unwrap();
        let path = pidfile_in(&dir);
        std::fs::write(&path, "x".repeat(1000)).unwrap();
        let inode = std::fs::metadata(&path).unwrap().ino();

        write(&path, 5, 6, 7).unwrap();
        assert_eq!(std::fs::metadata(&path).unwrap().ino(), inode);
        assert_eq!(
            read(&path).unwrap(),
            PidRecord::Current {
                guardian: 5,
                token: 6,
                daemon: Some(7),
            }
        );
    }

    #[test]
    fn test_lock_is_exclusive() {
        let dir = TempDir::new().unwrap();
        let path = pidfile_in(&dir);
        let held = Lock::try_acquire(&path, true).unwrap();
        assert!(held.is_some());

        // flock conflicts between separate opens even within one process.
        assert!(Lock::try_acquire(&path, true).unwrap().is_none());

        drop(held);
        assert!(Lock::try_acquire(&path, true).unwrap().is_some());
    }

    #[test]
    fn test_lock_without_create() {
        let dir = TempDir::new().unwrap();
        let error = Lock::try_acquire(&pidfile_in(&dir), false).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::NotFound);
    }
}
