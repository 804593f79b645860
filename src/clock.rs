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

//! Hardware clock generator control.
//!
//! The FPGA's PLL input wants a steady reference that software timing loops
//! cannot provide, so it comes from a GPCLK divider output. This module
//! validates a request against the divider's limits and the SoC's clock pin
//! routing before anything reaches the hardware; the [`ClockOutput`]
//! implementation behind it only ever sees arguments it can satisfy.

use crate::error::MppcdError;
use crate::hw::ClockOutput;
use log::info;

/// Floor of the BCM clock divider's output range.
pub const HW_CLOCK_MIN_HZ: u32 = 4_689;

/// Ceiling of the BCM clock divider's output range.
pub const HW_CLOCK_MAX_HZ: u32 = 250_000_000;

/// BCM lines with a clock-generator alternate function. Only 4, 5, 6, 20
/// and 21 reach the 40-pin header on the reference board.
pub const CLOCK_CAPABLE_LINES: [u32; 10] = [4, 5, 6, 20, 21, 32, 34, 42, 43, 44];

/// A clock generator assignment: a line and a target frequency, or `None`
/// for off. Applying a spec reprograms the divider; no history is kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockSpec {
    pub line: u32,
    pub frequency: Option<u32>,
}

/// Parse the clock utility's single argument: a positive frequency in Hz or
/// the literal `off`.
pub fn parse_frequency_arg(arg: &str) -> Result<Option<u32>, MppcdError> {
    if arg == "off" {
        return Ok(None);
    }
    arg.parse::<u32>()
        .ok()
        .filter(|hz| *hz > 0)
        .map(Some)
        .ok_or_else(|| {
            MppcdError::Argument(format!(
                "expected a positive frequency in Hz or \"off\", got {arg:?}"
            ))
        })
}

/// The reference clock feeding the FPGA.
pub struct ReferenceClock<'a> {
    out: &'a mut dyn ClockOutput,
}

impl<'a> ReferenceClock<'a> {
    pub fn new(out: &'a mut dyn ClockOutput) -> ReferenceClock<'a> {
        ReferenceClock { out }
    }

    /// Program `line` to carry `hz`. Idempotent: a running clock is simply
    /// reprogrammed.
    ///
    /// # Returns: `Result<(), MppcdError>`
    /// * `Ok(())` - Divider programmed
    /// * `Err(MppcdError::Frequency)` - `hz` is zero or outside the divider range
    /// * `Err(MppcdError::Pin)` - `line` has no clock-generator routing
    pub fn set_frequency(&mut self, line: u32, hz: u32) -> Result<(), MppcdError> {
        require_clock_capable(line)?;
        if !(HW_CLOCK_MIN_HZ..=HW_CLOCK_MAX_HZ).contains(&hz) {
            return Err(MppcdError::Frequency(hz));
        }
        self.out.set_clock(line, hz)?;
        info!("hardware clock on gpio{line} set to {hz} Hz");
        Ok(())
    }

    /// Halt the clock on `line` and return the pin to an inactive input
    /// state. Idempotent.
    pub fn stop(&mut self, line: u32) -> Result<(), MppcdError> {
        require_clock_capable(line)?;
        self.out.stop_clock(line)?;
        info!("hardware clock on gpio{line} stopped");
        Ok(())
    }

    /// Apply a full [`ClockSpec`].
    pub fn apply(&mut self, spec: &ClockSpec) -> Result<(), MppcdError> {
        match spec.frequency {
            Some(hz) => self.set_frequency(spec.line, hz),
            None => self.stop(spec.line),
        }
    }
}

fn require_clock_capable(line: u32) -> Result<(), MppcdError> {
    if CLOCK_CAPABLE_LINES.contains(&line) {
        Ok(())
    } else {
        Err(MppcdError::Pin(line))
    }
}
