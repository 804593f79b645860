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

//! SPI through the spidev character device.
//!
//! Each `write(2)` on `/dev/spidev0.N` shifts one message out on the bus.
//! Mode 0 is the spidev default and the device tree fixes the actual bus
//! clock (`spi-max-frequency`), so no ioctl layer is needed for this
//! transmit-only use; the speed carried in the device configuration is
//! advisory and logged at open so a mis-provisioned bus is visible in the
//! bring-up output. The kernel bounds one message at its default buffer
//! size of 4096 bytes, which is also the loader's chunk size.

use crate::error::MppcdError;
use crate::hw::SpiBus;
use log::info;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

/// One spidev message cannot exceed the kernel's default `bufsiz`.
pub const SPIDEV_MAX_MSG: usize = 4096;

pub struct SpidevBus {
    path: PathBuf,
    dev: File,
}

impl SpidevBus {
    /// Open bus channel `channel` (chip select `/dev/spidev0.<channel>`).
    pub fn open(channel: u8, advisory_hz: u32) -> Result<SpidevBus, MppcdError> {
        let path = PathBuf::from(format!("/dev/spidev0.{channel}"));
        let dev = OpenOptions::new()
            .write(true)
            .open(&path)
            .map_err(|e| MppcdError::IOOpen {
                file: path.clone(),
                e,
            })?;
        info!(
            "opened {path:?}; bus clock is device-tree controlled (configured {advisory_hz} Hz is advisory)"
        );
        Ok(SpidevBus { path, dev })
    }
}

impl SpiBus for SpidevBus {
    fn transfer(&mut self, tx: &[u8]) -> Result<(), MppcdError> {
        if tx.len() > SPIDEV_MAX_MSG {
            return Err(MppcdError::Internal(format!(
                "spidev message of {} bytes exceeds the {SPIDEV_MAX_MSG} byte kernel buffer",
                tx.len()
            )));
        }
        self.dev.write_all(tx).map_err(|e| MppcdError::IOWrite {
            data: format!("<{} bus bytes>", tx.len()),
            file: self.path.clone(),
            e,
        })
    }
}
