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

use std::path::PathBuf;

/// Maximum bitstream length encodable in the configuration protocol's 16-bit
/// length field. Anything larger is rejected at load time, never truncated.
pub const MAX_BITSTREAM_LEN: u64 = u16::MAX as u64;

#[derive(Debug, thiserror::Error)]
pub enum MppcdError {
    #[error("MppcdError::Argument: {0}")]
    Argument(String),
    #[error("MppcdError::IOOpen: An IO error occurred when opening {file:?}: {e}")]
    IOOpen { file: PathBuf, e: std::io::Error },
    #[error("MppcdError::IORead: An IO error occurred when reading from {file:?}: {e}")]
    IORead { file: PathBuf, e: std::io::Error },
    #[error("MppcdError::IOWrite: An IO error occurred when writing {data:?} to {file:?}: {e}")]
    IOWrite {
        data: String,
        file: PathBuf,
        e: std::io::Error,
    },
    #[error(
        "MppcdError::Size: bitstream is {len} bytes but the configuration protocol's length field is 16-bit (max 65535 bytes)"
    )]
    Size { len: u64 },
    #[error("MppcdError::Transfer: SPI transfer failed in chunk {chunk}: {reason}")]
    Transfer { chunk: usize, reason: String },
    #[error("MppcdError::Timeout: CDONE on line {line} did not assert within {timeout_ms} ms")]
    Timeout { line: u32, timeout_ms: u64 },
    #[error("MppcdError::Frequency: {0} Hz is outside the hardware clock divider range")]
    Frequency(u32),
    #[error("MppcdError::Pin: GPIO line {0} has no hardware clock-generator routing")]
    Pin(u32),
    #[error("MppcdError::TomlDe: Failed to parse {file:?} as TOML: {e}")]
    TomlDe {
        file: PathBuf,
        e: Box<toml::de::Error>,
    },
    #[error("MppcdError::Internal: An internal error occurred: {0}")]
    Internal(String),
}
