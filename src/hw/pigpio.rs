// This file is part of mppcd, the slow-control and counting daemon for an MPPC coincidence detector.
//
// Copyright 2026 The mppcd developers
//
// SPDX-License-Identifier: GPL-3.0-only
//
// mppcd is free software: you can redistribute it and/or modify it under the terms of the GNU General Public License version 3, as published by the Free Software Foundation.
//
// mppcd is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranties of MERCHANTABILITY, SATISFACTORY QUALITY, or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with this program.  If not, see http://www.gnu.org/licenses/.

//! Hardware clock control through the pigpio daemon's pipe interface.
//!
//! The GPCLK divider sits behind SoC registers that only pigpiod maps; its
//! pipe interface turns that into file I/O: textual commands written to
//! `/dev/pigpio`, one numeric status line per command read back from
//! `/dev/pigout`. The two commands used here:
//!
//! ```text
//! hc <gpio> <hz>    program the hardware clock (0 Hz halts it)
//! m <gpio> r        set the pin mode to input
//! ```
//!
//! Provisioning starts pigpiod before any mppcd component runs; a missing
//! pipe is reported as an IO error on the pipe path.

use crate::config;
use crate::error::MppcdError;
use crate::hw::ClockOutput;
use crate::system_io::fs_write;
use log::trace;
use std::fs::OpenOptions;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;

pub struct PigpioPipe {
    command_path: PathBuf,
    result_path: PathBuf,
    results: BufReader<std::fs::File>,
}

impl PigpioPipe {
    pub fn open() -> Result<PigpioPipe, MppcdError> {
        let result_path = PathBuf::from(config::PIGPIO_RESULT_PIPE);
        let results = OpenOptions::new()
            .read(true)
            .open(&result_path)
            .map_err(|e| MppcdError::IOOpen {
                file: result_path.clone(),
                e,
            })?;
        Ok(PigpioPipe {
            command_path: PathBuf::from(config::PIGPIO_COMMAND_PIPE),
            result_path,
            results: BufReader::new(results),
        })
    }

    /// Issue one command and read its status line.
    fn command(&mut self, cmd: &str) -> Result<i64, MppcdError> {
        trace!("pigpiod command {cmd:?}");
        fs_write(&self.command_path, format!("{cmd}\n"))?;
        let mut line = String::new();
        self.results
            .read_line(&mut line)
            .map_err(|e| MppcdError::IORead {
                file: self.result_path.clone(),
                e,
            })?;
        line.trim()
            .parse::<i64>()
            .map_err(|_| MppcdError::Internal(format!(
                "unparsable pigpiod response {:?} to {cmd:?}",
                line.trim()
            )))
    }

    fn checked(&mut self, cmd: &str) -> Result<(), MppcdError> {
        match self.command(cmd)? {
            0 => Ok(()),
            rc => Err(MppcdError::Internal(format!(
                "pigpiod returned status {rc} for {cmd:?}"
            ))),
        }
    }
}

impl ClockOutput for PigpioPipe {
    fn set_clock(&mut self, line: u32, hz: u32) -> Result<(), MppcdError> {
        self.checked(&format!("hc {line} {hz}"))
    }

    fn stop_clock(&mut self, line: u32) -> Result<(), MppcdError> {
        // Frequency 0 halts the divider; the mode write then takes the pin
        // off the clock's alternate function and leaves it inert.
        self.checked(&format!("hc {line} 0"))?;
        self.checked(&format!("m {line} r"))
    }
}
