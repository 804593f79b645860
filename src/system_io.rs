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

//! Error Wrapping File System I/O Helpers
//!
//! Convenient wrappers around standard file system operations with automatic
//! conversion to `MppcdError`. All hardware in this crate is reached through
//! kernel virtual files (GPIO sysfs attributes, the spidev node, the pigpiod
//! command pipe), so these helpers carry the trace logging and error context
//! for every register-level poke the daemon makes.

use crate::error::MppcdError;
use log::trace;
use std::fs::OpenOptions;
use std::io::{Read, Write};
use std::path::Path;

/// Read the contents of a file to a String.
///
/// Wrapper around `read_to_string` that provides trace logging and automatic
/// error conversion to `MppcdError::IORead`.
///
/// # Arguments
///
/// * `file_path` - Path to the file to read
///
/// # Returns: `Result<String, MppcdError>`
/// * `Ok(String)` - The complete contents of the file
/// * `Err(MppcdError::IORead)` - If the file cannot be read (doesn't exist, permissions, etc.)
pub fn fs_read(file_path: &Path) -> Result<String, MppcdError> {
    trace!("Attempting to read from {file_path:?}");
    let mut buf: String = String::new();
    let result = OpenOptions::new()
        .read(true)
        .open(file_path)
        .and_then(|mut f| f.read_to_string(&mut buf));

    match result {
        Ok(_) => {
            trace!("Reading done");
            Ok(buf)
        }
        Err(e) => Err(MppcdError::IORead {
            file: file_path.into(),
            e,
        }),
    }
}

/// Write a string value to an existing file.
///
/// Wrapper around file write operations that provides trace logging and
/// automatic error conversion to `MppcdError::IOWrite`. The file must already
/// exist: every write target in this crate is a kernel-provided virtual file,
/// and creating a regular file in its place would mask a provisioning error.
///
/// # Arguments
///
/// * `file_path` - Path to the file to write
/// * `value` - The string value to write (implements `AsRef<str>`)
///
/// # Returns: `Result<(), MppcdError>`
/// * `Ok(())` - Write succeeded
/// * `Err(MppcdError::IOWrite)` - If the write fails (permissions, missing device node, etc.)
pub fn fs_write(file_path: &Path, value: impl AsRef<str>) -> Result<(), MppcdError> {
    trace!(
        "Attempting to write {:?} to {:?}",
        value.as_ref(),
        file_path
    );
    let result = OpenOptions::new()
        .read(false)
        .write(true)
        .open(file_path)
        .and_then(|mut f| write!(f, "{}", value.as_ref()));
    match result {
        Ok(_) => {
            trace!("Write done.");
            Ok(())
        }
        Err(e) => Err(MppcdError::IOWrite {
            data: value.as_ref().to_string(),
            file: file_path.into(),
            e,
        }),
    }
}

/// Append one line to a file, creating it if necessary.
///
/// Opens in append mode for every call so that external tools may rotate the
/// file between writes; nothing is held open across flush intervals. The line
/// terminator is added here.
///
/// # Arguments
///
/// * `file_path` - Path to the file to append to
/// * `line` - The line to append (without trailing newline)
///
/// # Returns: `Result<(), MppcdError>`
/// * `Ok(())` - Line appended
/// * `Err(MppcdError::IOWrite)` - If opening or writing fails
pub fn fs_append(file_path: &Path, line: impl AsRef<str>) -> Result<(), MppcdError> {
    trace!("Attempting to append to {file_path:?}");
    let result = OpenOptions::new()
        .create(true)
        .append(true)
        .open(file_path)
        .and_then(|mut f| writeln!(f, "{}", line.as_ref()));
    match result {
        Ok(_) => {
            trace!("Append done.");
            Ok(())
        }
        Err(e) => Err(MppcdError::IOWrite {
            data: line.as_ref().to_string(),
            file: file_path.into(),
            e,
        }),
    }
}
