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

//! Command-line driver for the daemon toolkit, used by the integration
//! tests.

use anyhow::{bail, Result};
use clap::Parser;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::thread::sleep;
use std::time::Duration;
use ubic_daemon::{check, start, stop, StartOptions, Target};

#[derive(Parser, Debug)]
#[clap(version, about)]
enum Cli {
    /// Start a supervised daemon.
    Start {
        #[clap(flatten)]
        options: StartOptions,

        /// Run a built-in heartbeat loop instead of executing a binary.
        #[clap(long)]
        heartbeat: Option<PathBuf>,

        /// Binary to execute, with its arguments.
        #[clap(last = true)]
        command: Vec<OsString>,
    },
    /// Report whether a daemon holds the pidfile.
    Check {
        #[clap(long)]
        pidfile: PathBuf,
    },
    /// Stop a running daemon.
    Stop {
        #[clap(long)]
        pidfile: PathBuf,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();
    match Cli::parse() {
        Cli::Start {
            options,
            heartbeat,
            command,
        } => {
            let target = match (heartbeat, command.is_empty()) {
                (Some(path), true) => Target::Callable(Box::new(move || heartbeat_loop(&path))),
                (None, false) => {
                    let mut parts = command.into_iter();
                    let path = PathBuf::from(parts.next().unwrap());
                    Target::Exec {
                        path,
                        args: parts.collect(),
                    }
                }
                _ => bail!("give exactly one of --heartbeat or a command after --"),
            };
            unsafe { start(target, &options) }
        }
        Cli::Check { pidfile } => {
            match check(&pidfile)? {
                true => println!("running"),
                false => println!("not running"),
            }
            Ok(())
        }
        Cli::Stop { pidfile } => {
            println!("{}", stop(&pidfile)?);
            Ok(())
        }
    }
}

fn heartbeat_loop(path: &Path) {
    loop {
        let _ = std::fs::write(path, format!("{}\n", std::process::id()));
        sleep(Duration::from_millis(200));
    }
}
