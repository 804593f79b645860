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

//! Coincidence counter daemon (mppcd).
//!
//! Binds one rising-edge monitor per configured trigger line, accumulates
//! events into the counter bank, and appends one row of counts per interval
//! to the log file named on the command line. Runs until SIGINT or SIGTERM,
//! then drains the partial interval and exits.
//!
//! # Invocation
//!
//! ```bash
//! # reference wiring, 60 s intervals
//! mppcd /data/counts.log
//!
//! # explicit deployment file and a faster cadence
//! mppcd --config /etc/mppcd/config.toml --interval-secs 10 /data/counts.log
//! ```
//!
//! # Environment Variables
//!
//! - `RUST_LOG` - Controls logging level (`trace`, `debug`, `info`, `warn`,
//!   `error` or `off`). Defaults to `info`. Diagnostics go to stderr; the
//!   live count rows go to stdout.

use clap::Parser;
use log::{error, info};
use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::watch;

use mppcd::config::RuntimeConfig;
use mppcd::counter::CounterBank;
use mppcd::daemon;
use mppcd::hw::sysfs_gpio::{RisingEdges, SysfsGpio};

#[derive(Parser, Debug)]
#[command(name = "mppcd")]
#[command(about = "Coincidence counter daemon for an MPPC detector")]
struct Cli {
    /// Output log file; one row of counts is appended per interval.
    output: Option<PathBuf>,
    /// Deployment TOML; defaults to /etc/mppcd/config.toml when present.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Override the flush interval from config/default.
    #[arg(long)]
    interval_secs: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let Some(output) = cli.output else {
        eprintln!("Usage: mppcd [--config <file>] [--interval-secs <n>] <output-log>");
        std::process::exit(1);
    };

    let mut cfg = RuntimeConfig::load(cli.config.as_deref())?;
    if let Some(secs) = cli.interval_secs {
        cfg.interval = Duration::from_secs(secs);
    }
    cfg.validate()?;

    let bank = Arc::new(CounterBank::new(cfg.channels.len()));
    let gpio = SysfsGpio::new();
    for (idx, binding) in cfg.channels.iter().enumerate() {
        info!("slot {idx} ({}) on gpio{}", binding.slot, binding.line);
        let mut edges = RisingEdges::open(&gpio, binding.line)?;
        let bank = bank.clone();
        let slot = binding.slot;
        tokio::spawn(async move {
            loop {
                match edges.next().await {
                    // O(1), lock-free; safe against a concurrent flush
                    Ok(()) => bank.increment(idx),
                    Err(e) => {
                        error!("edge monitor for {slot} stopped: {e}");
                        break;
                    }
                }
            }
        });
    }

    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(s) => s,
            Err(e) => {
                error!("cannot listen for SIGTERM: {e}");
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
        let _ = stop_tx.send(true);
    });

    daemon::run(bank, output, cfg.interval, stop_rx).await?;
    Ok(())
}
