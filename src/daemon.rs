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

//! The flush loop of the counter daemon.
//!
//! One cooperative driver: sleep out the interval, capture-and-reset the
//! bank, write the row to the live display stream (stdout) and append it to
//! the log file. The line monitor tasks feeding the bank are wired up by the
//! binary; this loop only consumes.
//!
//! Lifecycle: `Running` until a stop is signalled, then `Draining` — one
//! final record covering the partial interval — then `Stopped`. The process
//! therefore never loses the tail of a run to a service stop.

use crate::counter::{CounterBank, LogRecord};
use crate::error::MppcdError;
use crate::system_io::fs_append;
use log::{info, warn};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior, interval_at};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DaemonState {
    Running,
    Draining,
    Stopped,
}

/// Drive the flush loop until `shutdown` fires, then drain.
///
/// Rows are written at most once per `interval`: the ticker starts one full
/// interval after entry and delays (rather than bursts) after any stall, so
/// two rows are never closer together than the configured spacing.
pub async fn run(
    bank: Arc<CounterBank>,
    log_path: PathBuf,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), MppcdError> {
    let mut ticker = interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!(
        "counting on {} channels; flushing to {log_path:?} every {interval:?}",
        bank.len()
    );

    let mut state = DaemonState::Running;
    loop {
        match state {
            DaemonState::Running => {
                tokio::select! {
                    _ = ticker.tick() => {
                        flush(&bank, &log_path);
                    }
                    changed = shutdown.changed() => {
                        // a dropped sender counts as a stop request
                        if changed.is_err() || *shutdown.borrow() {
                            info!("stop requested; draining the open interval");
                            state = DaemonState::Draining;
                        }
                    }
                }
            }
            DaemonState::Draining => {
                flush(&bank, &log_path);
                state = DaemonState::Stopped;
            }
            DaemonState::Stopped => {
                info!("counter daemon stopped");
                return Ok(());
            }
        }
    }
}

/// Capture-and-reset, then write one row. A failed append costs that
/// interval's row in the file but never the process; the next flush reopens
/// the file and tries again.
fn flush(bank: &CounterBank, log_path: &std::path::Path) {
    let record = LogRecord::capture(bank);
    println!("{record}");
    if let Err(e) = fs_append(log_path, record.to_string()) {
        warn!("interval record not logged: {e}");
    }
}
