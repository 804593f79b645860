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

use mppcd::clock::{ReferenceClock, parse_frequency_arg};
use mppcd::config::RuntimeConfig;
use mppcd::error::MppcdError;
use mppcd::hw::pigpio::PigpioPipe;
use std::path::Path;

static USAGE: &str = "usage: mppc clock <frequency-hz|off>";

/// Drive the hardware clock on the configured reference line.
pub fn clock_handler(config: Option<&Path>, frequency: Option<&str>) -> Result<String, MppcdError> {
    let Some(arg) = frequency else {
        return Err(MppcdError::Argument(USAGE.to_string()));
    };
    let target = parse_frequency_arg(arg).map_err(|_| {
        MppcdError::Argument(format!(
            "invalid frequency {arg:?}; expected a positive integer in Hz or \"off\" ({USAGE})"
        ))
    })?;

    let cfg = RuntimeConfig::load(config)?;
    let line = cfg.ref_clock.line;
    let mut pipe = PigpioPipe::open()?;
    let mut clock = ReferenceClock::new(&mut pipe);
    match target {
        Some(hz) => {
            clock.set_frequency(line, hz)?;
            Ok(format!("gpio{line} -> {hz} Hz"))
        }
        None => {
            clock.stop(line)?;
            Ok(format!("stopped hardware clock on gpio{line}"))
        }
    }
}
