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

//! Reuse-resistant process identity.
//!
//! A pid alone does not identify a process: the kernel recycles pids, so a
//! recorded pid can name a complete stranger by the time anyone looks at it.
//! Pairing the pid with the process's start time closes that hole at the
//! cost of one filesystem read.  The start time is field #22 of the
//! space-separated `/proc/<pid>/stat` line (0-indexed 21), measured in clock
//! ticks since boot; it is assigned at process creation and never changes
//! for the life of the pid.

use anyhow::{anyhow, Context, Result};
use libc::pid_t;
use std::path::PathBuf;

/// Returns the start-time token of the live process with pid `pid`, or
/// `None` when no such process exists.
pub fn start_time(pid: pid_t) -> Result<Option<u64>> {
    let proc_dir = PathBuf::from(format!("/proc/{pid}"));
    if !proc_dir.exists() {
        return Ok(None);
    }
    let stat_path = proc_dir.join("stat");
    let contents = match std::fs::read_to_string(&stat_path) {
        Ok(contents) => contents,
        // The process can exit between the existence check and the open;
        // that window is "no such process", anything else is a real failure
        // (permissions, a broken /proc).
        Err(_) if !proc_dir.exists() => return Ok(None),
        Err(e) => return Err(e).with_context(|| format!("{}: open failed", stat_path.display())),
    };
    let line = contents.lines().next().unwrap_or("");
    let token = line
        .split_whitespace()
        .nth(21)
        .ok_or_else(|| anyhow!("{}: truncated stat record", stat_path.display()))?;
    token
        .parse()
        .map(Some)
        .with_context(|| format!("{}: unparseable start time {token:?}", stat_path.display()))
}
