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

//! GPIO access through the legacy sysfs interface.
//!
//! Every operation is a read or write of an attribute file under
//! `/sys/class/gpio/gpioN/`:
//!
//! ```text
//! /sys/class/gpio
//! ├── export            <- write "N" to materialize gpioN
//! ├── gpioN
//! │   ├── direction     <- "in", "out", "high", "low"
//! │   ├── edge          <- "none", "rising", "falling", "both"
//! │   └── value         <- "0" / "1"; POLLPRI-capable once edge is set
//! └── unexport
//! ```
//!
//! The provisioning layer guarantees the class directory exists and is
//! writable by the detector user; this module only materializes and drives
//! individual lines.

use crate::config;
use crate::error::MppcdError;
use crate::hw::{Gpio, Level};
use crate::system_io::{fs_read, fs_write};
use log::trace;
use std::fs::OpenOptions;
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};
use tokio::io::Interest;
use tokio::io::unix::AsyncFd;

fn line_dir(line: u32) -> PathBuf {
    Path::new(config::GPIO_CLASS_DIR).join(format!("gpio{line}"))
}

/// GPIO controller backed by `/sys/class/gpio`.
///
/// Stateless: line numbers are resolved to attribute paths on every call,
/// and a line is exported lazily the first time its direction is set.
#[derive(Debug, Default)]
pub struct SysfsGpio;

impl SysfsGpio {
    pub fn new() -> SysfsGpio {
        SysfsGpio
    }

    /// Materialize `gpioN` in sysfs. A line that is already exported (by a
    /// previous run or by provisioning) is left as found.
    fn export(&self, line: u32) -> Result<(), MppcdError> {
        if line_dir(line).exists() {
            trace!("gpio{line} already exported");
            return Ok(());
        }
        fs_write(
            &Path::new(config::GPIO_CLASS_DIR).join("export"),
            line.to_string(),
        )
    }
}

impl Gpio for SysfsGpio {
    /// The direction attribute accepts "high"/"low" as well as "out"; the
    /// former flips the direction and the initial level in one write, so
    /// the line never glitches through the wrong state.
    fn set_output(&self, line: u32, initial: Level) -> Result<(), MppcdError> {
        self.export(line)?;
        let direction = match initial {
            Level::High => "high",
            Level::Low => "low",
        };
        fs_write(&line_dir(line).join("direction"), direction)
    }

    fn set_input(&self, line: u32) -> Result<(), MppcdError> {
        self.export(line)?;
        fs_write(&line_dir(line).join("direction"), "in")
    }

    fn write(&self, line: u32, level: Level) -> Result<(), MppcdError> {
        let value = match level {
            Level::High => "1",
            Level::Low => "0",
        };
        fs_write(&line_dir(line).join("value"), value)
    }

    fn read(&self, line: u32) -> Result<Level, MppcdError> {
        let path = line_dir(line).join("value");
        match fs_read(&path)?.trim_end() {
            "0" => Ok(Level::Low),
            "1" => Ok(Level::High),
            other => Err(MppcdError::Internal(format!(
                "unexpected value {other:?} in {path:?}"
            ))),
        }
    }
}

/// Rising-edge event stream on one line.
///
/// Configures the line's `edge` attribute and then waits for the kernel's
/// out-of-band readiness (`EPOLLPRI`) on the value file, which is how GPIO
/// interrupts surface through sysfs. Each consumed event requires a fresh
/// read of the value file to re-arm the interrupt.
///
/// One `RisingEdges` per monitored trigger line; the counter daemon drives
/// each from its own task.
pub struct RisingEdges {
    line: u32,
    value_path: PathBuf,
    value: AsyncFd<std::fs::File>,
}

impl RisingEdges {
    pub fn open(gpio: &SysfsGpio, line: u32) -> Result<Self, MppcdError> {
        gpio.set_input(line)?;
        fs_write(&line_dir(line).join("edge"), "rising")?;

        let value_path = line_dir(line).join("value");
        let file = OpenOptions::new()
            .read(true)
            .open(&value_path)
            .map_err(|e| MppcdError::IOOpen {
                file: value_path.clone(),
                e,
            })?;

        // Consume the interrupt state that predates the watch, or the first
        // poll would report an edge that never happened.
        let mut scratch = [0u8; 8];
        file.read_at(&mut scratch, 0).map_err(|e| MppcdError::IORead {
            file: value_path.clone(),
            e,
        })?;

        let value = AsyncFd::with_interest(file, Interest::PRIORITY).map_err(|e| {
            MppcdError::IOOpen {
                file: value_path.clone(),
                e,
            }
        })?;

        trace!("watching rising edges on gpio{line}");
        Ok(RisingEdges {
            line,
            value_path,
            value,
        })
    }

    pub fn line(&self) -> u32 {
        self.line
    }

    /// Wait for the next rising edge.
    pub async fn next(&mut self) -> Result<(), MppcdError> {
        let mut guard =
            self.value
                .ready(Interest::PRIORITY)
                .await
                .map_err(|e| MppcdError::IORead {
                    file: self.value_path.clone(),
                    e,
                })?;

        // Re-arm: sysfs keeps reporting POLLPRI until the value is re-read.
        let mut scratch = [0u8; 8];
        self.value
            .get_ref()
            .read_at(&mut scratch, 0)
            .map_err(|e| MppcdError::IORead {
                file: self.value_path.clone(),
                e,
            })?;
        guard.clear_ready();
        Ok(())
    }
}
