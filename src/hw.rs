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

//! Hardware capability layer.
//!
//! Each peripheral concern the detector touches is behind its own trait:
//! [`Gpio`] for the FPGA control lines, [`SpiBus`] for the configuration
//! stream, [`ClockOutput`] for the hardware clock generator feeding the
//! FPGA's PLL. The Raspberry Pi implementations live in the submodules and
//! reach the kernel exclusively through virtual files (GPIO sysfs
//! attributes, the spidev character device, the pigpiod command pipe);
//! callers never touch a register address directly. Tests substitute
//! recording mocks behind the same traits.
//!
//! The traits are synchronous because their only callers are: the bring-up
//! path, which is a single sequential call chain per the bus ownership rule
//! (one `program()` owns the bus and its control lines exclusively), and the
//! counter daemon's line monitors, which are async but built on the separate
//! [`sysfs_gpio::RisingEdges`] type rather than on `Gpio`.

pub mod pigpio;
pub mod spidev;
pub mod sysfs_gpio;

use crate::error::MppcdError;
use std::time::{Duration, Instant};

/// Logic level of a digital line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Low,
    High,
}

/// Digital I/O on numbered lines (BCM numbering on the reference board).
pub trait Gpio {
    /// Configure a line as an output, driving `initial` from the first
    /// moment the direction flips. Glitch-free: the level must never pass
    /// through the opposite state while the line becomes an output.
    fn set_output(&self, line: u32, initial: Level) -> Result<(), MppcdError>;

    /// Configure a line as a high-impedance input. Pull resistors are a
    /// device-tree concern and are not controlled from here.
    fn set_input(&self, line: u32) -> Result<(), MppcdError>;

    /// Drive an output line.
    fn write(&self, line: u32, level: Level) -> Result<(), MppcdError>;

    /// Sample a line.
    fn read(&self, line: u32) -> Result<Level, MppcdError>;
}

/// A synchronous serial bus in mode 0 (clock idle low, sample on rising
/// edge). Transmit only: the FPGA's configuration port never drives data
/// back during programming.
pub trait SpiBus {
    /// Shift `tx` out as one bus message. Implementations bound the message
    /// size; callers chunk accordingly.
    fn transfer(&mut self, tx: &[u8]) -> Result<(), MppcdError>;
}

/// A hardware clock-generator output: a pin driven by a dedicated clock
/// divider, independent of software timing.
pub trait ClockOutput {
    /// Program the divider so `line` carries `hz`. Reprogramming a running
    /// clock is permitted.
    fn set_clock(&mut self, line: u32, hz: u32) -> Result<(), MppcdError>;

    /// Halt the clock and return the line to an inactive input state.
    fn stop_clock(&mut self, line: u32) -> Result<(), MppcdError>;
}

/// Bounded wait for a line to go high.
///
/// Samples `line` every `poll` until it reads high or `timeout` elapses.
/// Returns `Ok(true)` on assertion, `Ok(false)` on timeout; never blocks
/// past the deadline. Both parameters are explicit so no caller encodes a
/// delay in a loop iteration count.
pub fn wait_for_high(
    gpio: &dyn Gpio,
    line: u32,
    poll: Duration,
    timeout: Duration,
) -> Result<bool, MppcdError> {
    let deadline = Instant::now() + timeout;
    loop {
        if gpio.read(line)? == Level::High {
            return Ok(true);
        }
        if Instant::now() >= deadline {
            return Ok(false);
        }
        std::thread::sleep(poll);
    }
}
