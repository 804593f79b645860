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

//! Deployment configuration.
//!
//! Hardcoded defaults describe the reference detector wiring; an optional
//! TOML file (`/etc/mppcd/config.toml`) overrides them field by field. Every
//! field of every section is optional, so a deployment states only what
//! differs from the reference board.
//!
//! ```toml
//! [counter]
//! interval_secs = 60
//! channels = [
//!     { slot = "pair01", line = 27 },
//!     { slot = "single0", line = 6 },
//! ]
//!
//! [fpga]
//! cs_line = 24
//! done_line = 23
//! reset_line = 22
//! bus_channel = 0
//! bus_hz = 4000000
//!
//! [clock]
//! line = 4
//! frequency_hz = 9600000
//! ```

use crate::clock::ClockSpec;
use crate::counter::{ChannelBinding, default_channel_map};
use crate::error::MppcdError;
use crate::ice40::DeviceConfig;
use crate::system_io::fs_read;
use log::{trace, warn};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// The kernel GPIO sysfs class directory. The provisioning layer is expected
/// to have the legacy sysfs interface enabled.
pub static GPIO_CLASS_DIR: &str = "/sys/class/gpio/";

/// Command pipe of the pigpio daemon, used for the hardware clock generator.
pub static PIGPIO_COMMAND_PIPE: &str = "/dev/pigpio";

/// Result pipe of the pigpio daemon. One numeric status line per command.
pub static PIGPIO_RESULT_PIPE: &str = "/dev/pigout";

/// Default location of the deployment override file.
pub static CONFIG_FILE: &str = "/etc/mppcd/config.toml";

/// Default flush interval of the counter daemon.
pub const DEFAULT_INTERVAL_SECS: u64 = 60;

/// Reference clock the iCE40's PLL input expects, produced on GPCLK0.
pub const DEFAULT_REF_CLOCK_HZ: u32 = 9_600_000;

/// BCM line carrying GPCLK0 on the 40-pin header.
pub const DEFAULT_REF_CLOCK_LINE: u32 = 4;

/// Fully resolved runtime configuration: defaults overlaid with the TOML
/// file. Fixed for the lifetime of the process.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub interval: Duration,
    pub channels: Vec<ChannelBinding>,
    pub device: DeviceConfig,
    pub ref_clock: ClockSpec,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            interval: Duration::from_secs(DEFAULT_INTERVAL_SECS),
            channels: default_channel_map(),
            device: DeviceConfig::default(),
            ref_clock: ClockSpec {
                line: DEFAULT_REF_CLOCK_LINE,
                frequency: Some(DEFAULT_REF_CLOCK_HZ),
            },
        }
    }
}

/// Top level TOML struct which holds all sections.
#[derive(Debug, Deserialize)]
struct TomlConfig {
    counter: Option<CounterSection>,
    fpga: Option<FpgaSection>,
    clock: Option<ClockSection>,
}

#[derive(Debug, Deserialize)]
struct CounterSection {
    interval_secs: Option<u64>,
    channels: Option<Vec<ChannelBinding>>,
}

#[derive(Debug, Deserialize)]
struct FpgaSection {
    cs_line: Option<u32>,
    done_line: Option<u32>,
    reset_line: Option<u32>,
    bus_channel: Option<u8>,
    bus_hz: Option<u32>,
    done_poll_ms: Option<u64>,
    done_timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ClockSection {
    line: Option<u32>,
    frequency_hz: Option<u32>,
}

fn toml_str_to_config(file: &Path, toml_string: &str) -> Result<TomlConfig, MppcdError> {
    toml::from_str(toml_string).map_err(|e| MppcdError::TomlDe {
        file: file.into(),
        e: Box::new(e),
    })
}

impl RuntimeConfig {
    /// Resolve the runtime configuration.
    ///
    /// With an explicit path (`--config`), the file must exist and parse;
    /// errors propagate. Without one, `/etc/mppcd/config.toml` is used when
    /// present, and a missing or unparsable file falls back to the hardcoded
    /// reference wiring with a warning, so a misdeployed config file cannot
    /// keep the detector from booting.
    pub fn load(explicit: Option<&Path>) -> Result<RuntimeConfig, MppcdError> {
        match explicit {
            Some(path) => {
                let parsed = toml_str_to_config(path, &fs_read(path)?)?;
                Ok(RuntimeConfig::default().overlaid(parsed))
            }
            None => {
                let path = Path::new(CONFIG_FILE);
                if !path.is_file() {
                    trace!("No config file at {path:?}; using reference wiring");
                    return Ok(RuntimeConfig::default());
                }
                let parsed = fs_read(path).and_then(|s| toml_str_to_config(path, &s));
                match parsed {
                    Ok(parsed) => Ok(RuntimeConfig::default().overlaid(parsed)),
                    Err(e) => {
                        warn!("Using hardcoded reference wiring because loading {path:?} failed: {e}");
                        Ok(RuntimeConfig::default())
                    }
                }
            }
        }
    }

    fn overlaid(mut self, parsed: TomlConfig) -> RuntimeConfig {
        if let Some(counter) = parsed.counter {
            if let Some(secs) = counter.interval_secs {
                self.interval = Duration::from_secs(secs);
            }
            if let Some(channels) = counter.channels {
                self.channels = channels;
            }
        }
        if let Some(fpga) = parsed.fpga {
            let d = &mut self.device;
            d.cs_line = fpga.cs_line.unwrap_or(d.cs_line);
            d.done_line = fpga.done_line.unwrap_or(d.done_line);
            d.reset_line = fpga.reset_line.unwrap_or(d.reset_line);
            d.bus_channel = fpga.bus_channel.unwrap_or(d.bus_channel);
            d.bus_hz = fpga.bus_hz.unwrap_or(d.bus_hz);
            if let Some(ms) = fpga.done_poll_ms {
                d.done_poll = Duration::from_millis(ms);
            }
            if let Some(ms) = fpga.done_timeout_ms {
                d.done_timeout = Duration::from_millis(ms);
            }
        }
        if let Some(clock) = parsed.clock {
            if let Some(line) = clock.line {
                self.ref_clock.line = line;
            }
            if let Some(hz) = clock.frequency_hz {
                self.ref_clock.frequency = Some(hz);
            }
        }
        self
    }

    /// The interval and channel count are fixed at startup; an empty channel
    /// map would make the daemon a no-op writing empty rows forever, so it
    /// is rejected here rather than at first flush.
    pub fn validate(&self) -> Result<(), MppcdError> {
        if self.channels.is_empty() {
            return Err(MppcdError::Argument(
                "channel map is empty: at least one trigger line must be configured".to_string(),
            ));
        }
        if self.interval.is_zero() {
            return Err(MppcdError::Argument(
                "flush interval must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counter::TriggerSlot;

    #[test]
    fn empty_toml_keeps_reference_wiring() {
        let parsed = toml_str_to_config(Path::new("test.toml"), "").unwrap();
        let cfg = RuntimeConfig::default().overlaid(parsed);
        assert_eq!(cfg.interval, Duration::from_secs(DEFAULT_INTERVAL_SECS));
        assert_eq!(cfg.channels, default_channel_map());
        assert_eq!(cfg.ref_clock.frequency, Some(DEFAULT_REF_CLOCK_HZ));
    }

    #[test]
    fn partial_section_overrides_only_named_fields() {
        let toml = r#"
            [fpga]
            cs_line = 12
            done_timeout_ms = 2000
        "#;
        let parsed = toml_str_to_config(Path::new("test.toml"), toml).unwrap();
        let cfg = RuntimeConfig::default().overlaid(parsed);
        assert_eq!(cfg.device.cs_line, 12);
        assert_eq!(cfg.device.done_timeout, Duration::from_millis(2000));
        // untouched fields keep the reference values
        let reference = DeviceConfig::default();
        assert_eq!(cfg.device.done_line, reference.done_line);
        assert_eq!(cfg.device.bus_hz, reference.bus_hz);
    }

    #[test]
    fn channel_map_replaces_wholesale() {
        let toml = r#"
            [counter]
            interval_secs = 10
            channels = [
                { slot = "triple012", line = 21 },
                { slot = "single2", line = 13 },
            ]
        "#;
        let parsed = toml_str_to_config(Path::new("test.toml"), toml).unwrap();
        let cfg = RuntimeConfig::default().overlaid(parsed);
        assert_eq!(cfg.interval, Duration::from_secs(10));
        assert_eq!(cfg.channels.len(), 2);
        assert_eq!(cfg.channels[0].slot, TriggerSlot::Triple012);
        assert_eq!(cfg.channels[0].line, 21);
        assert_eq!(cfg.channels[1].slot, TriggerSlot::Single2);
    }

    #[test]
    fn bad_toml_is_a_tomlde_error() {
        let result = toml_str_to_config(Path::new("test.toml"), "counter = 'not a section'");
        assert!(matches!(result, Err(MppcdError::TomlDe { .. })));
    }

    #[test]
    fn empty_channel_map_fails_validation() {
        let cfg = RuntimeConfig {
            channels: Vec::new(),
            ..RuntimeConfig::default()
        };
        assert!(cfg.validate().is_err());
    }
}
