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

use mppcd::clock::ReferenceClock;
use mppcd::config::RuntimeConfig;
use mppcd::error::MppcdError;
use mppcd::hw::pigpio::PigpioPipe;
use mppcd::hw::spidev::SpidevBus;
use mppcd::hw::sysfs_gpio::SysfsGpio;
use mppcd::ice40::{Bitstream, Ice40};
use std::path::Path;

/// Program the FPGA once: reference clock, then the configuration stream.
///
/// The image is read and validated before any pin is touched, so an
/// oversized or unreadable file cannot leave the device mid-reset.
pub fn flash_handler(
    config: Option<&Path>,
    file: &Path,
    no_clock: bool,
) -> Result<String, MppcdError> {
    let cfg = RuntimeConfig::load(config)?;
    let image = Bitstream::load(file)?;

    if !no_clock {
        let mut pipe = PigpioPipe::open()?;
        ReferenceClock::new(&mut pipe).apply(&cfg.ref_clock)?;
    }

    let gpio = SysfsGpio::new();
    let mut bus = SpidevBus::open(cfg.device.bus_channel, cfg.device.bus_hz)?;
    let mut fpga = Ice40::new(cfg.device, &gpio, &mut bus)?;
    fpga.program(&image)?;

    Ok(format!(
        "{} loaded: {} bytes, CDONE high",
        file.display(),
        image.len()
    ))
}
