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

//! Bring-up utilities (`mppc`).
//!
//! `mppc flash` programs the front-end FPGA (reference clock first, then the
//! configuration stream); `mppc clock` drives the hardware clock generator
//! on its own. Both act once and exit: a failed attempt reports its
//! diagnostic and returns status 1, and reissuing the command is the only
//! retry path.

use clap::{Parser, Subcommand};
use log::debug;
use std::path::PathBuf;

mod clock;
mod flash;

#[derive(Parser, Debug)]
#[command(name = "mppc")]
#[command(bin_name = "mppc")]
struct Cli {
    /// Deployment TOML; defaults to /etc/mppcd/config.toml when present.
    #[arg(long)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Program the front-end FPGA with a raw binary bitstream.
    Flash {
        /// Configuration image, 1..=65535 bytes.
        file: PathBuf,
        /// Leave the reference clock alone (it is already running).
        #[arg(long)]
        no_clock: bool,
    },
    /// Set or stop the hardware clock feeding the FPGA's PLL.
    Clock {
        /// Target frequency in Hz, or "off".
        frequency: Option<String>,
    },
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    debug!("parsed cli command with {cli:?}");

    let result = match &cli.command {
        Commands::Flash { file, no_clock } => {
            flash::flash_handler(cli.config.as_deref(), file, *no_clock)
        }
        Commands::Clock { frequency } => {
            clock::clock_handler(cli.config.as_deref(), frequency.as_deref())
        }
    };

    match result {
        Ok(message) => println!("{message}"),
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    }
}
