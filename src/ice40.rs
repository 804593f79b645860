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

//! iCE40 slave-SPI configuration loader.
//!
//! The front-end FPGA (an iCE40 LP384) is programmed at bring-up by
//! replaying the device's slave configuration sequence over the serial bus:
//!
//! 1. CRESET pulsed low (≥200 µs) with the chip selected, then ≥1200 µs for
//!    the device to clear its configuration memory, chip select released.
//! 2. Eight warm-up clocks (one zero byte) with chip select high.
//! 3. The image streamed in order with chip select low.
//! 4. Sixteen trailing clocks (two zero bytes) so the device latches the
//!    final bits and enters user mode.
//! 5. A bounded wait for CDONE.
//!
//! One [`Ice40`] owns its control lines and the bus for the duration of a
//! `program()` call; attempts are sequential and a failed attempt is
//! reissued by the caller from `load`/`program`, never retried internally.
//! On every exit path the chip select line is left deasserted high.

use crate::error::{MAX_BITSTREAM_LEN, MppcdError};
use crate::hw::{Gpio, Level, SpiBus, wait_for_high};
use log::{info, trace};
use std::path::Path;
use std::time::Duration;

/// Bytes per bus message while streaming. A throughput/memory compromise,
/// not a protocol requirement; it coincides with the spidev kernel buffer.
pub const STREAM_CHUNK_LEN: usize = 4096;

/// Minimum CRESET low time (device power-on requirement).
const RESET_PULSE: Duration = Duration::from_micros(200);

/// Minimum wait after CRESET release before configuration data is accepted.
const RESET_SETTLE: Duration = Duration::from_micros(1200);

/// One zero byte of warm-up clocking before the image.
const DUMMY_CLOCK_BYTES: usize = 1;

/// Two zero bytes of trailing clocking after the image.
const FLUSH_CLOCK_BYTES: usize = 2;

/// Control line and bus assignment for one FPGA. Set once at construction;
/// immutable thereafter.
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    /// Dedicated chip-select line, asserted low to address the device.
    pub cs_line: u32,
    /// CDONE output from the device; high once configuration completed.
    pub done_line: u32,
    /// CRESET input of the device, pulsed low to restart configuration.
    pub reset_line: u32,
    /// spidev bus channel carrying SCK/MOSI.
    pub bus_channel: u8,
    /// Advisory bus clock; the device tree owns the real value.
    pub bus_hz: u32,
    /// CDONE sampling granularity.
    pub done_poll: Duration,
    /// Upper bound on the CDONE wait.
    pub done_timeout: Duration,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        DeviceConfig {
            cs_line: 24,
            done_line: 23,
            reset_line: 22,
            bus_channel: 0,
            bus_hz: 4_000_000,
            done_poll: Duration::from_millis(1),
            done_timeout: Duration::from_secs(1),
        }
    }
}

/// A configuration image held in memory: an immutable byte sequence of
/// 1..=65535 bytes, consumed by one programming attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitstream {
    data: Vec<u8>,
}

impl Bitstream {
    /// Read a whole image file.
    ///
    /// # Returns: `Result<Bitstream, MppcdError>`
    /// * `Ok(Bitstream)` - The file's bytes, unmodified
    /// * `Err(MppcdError::IORead)` - The file cannot be opened or read, or is empty
    /// * `Err(MppcdError::Size)` - The file exceeds the 16-bit length limit;
    ///   an oversized image is rejected outright, never truncated
    pub fn load(path: &Path) -> Result<Bitstream, MppcdError> {
        let meta = std::fs::metadata(path).map_err(|e| MppcdError::IORead {
            file: path.into(),
            e,
        })?;
        if meta.len() > MAX_BITSTREAM_LEN {
            return Err(MppcdError::Size { len: meta.len() });
        }

        let data = std::fs::read(path).map_err(|e| MppcdError::IORead {
            file: path.into(),
            e,
        })?;
        if data.is_empty() {
            return Err(MppcdError::IORead {
                file: path.into(),
                e: std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "empty bitstream"),
            });
        }
        info!("bitstream {path:?}: {} bytes (0x{:x})", data.len(), data.len());
        Bitstream::from_vec(data)
    }

    /// Wrap an in-memory image, enforcing the same length bounds as
    /// [`load`](Bitstream::load).
    pub fn from_vec(data: Vec<u8>) -> Result<Bitstream, MppcdError> {
        if data.is_empty() {
            return Err(MppcdError::Argument("empty bitstream".to_string()));
        }
        if data.len() as u64 > MAX_BITSTREAM_LEN {
            return Err(MppcdError::Size {
                len: data.len() as u64,
            });
        }
        Ok(Bitstream { data })
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}

/// Where a programming attempt stands. Transitions are strictly sequential;
/// `Configured` and `Failed` are the only terminal phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgramPhase {
    Idle,
    ResetPulse,
    DummyClocking,
    Streaming,
    FlushClocking,
    WaitDone,
    Configured,
    Failed,
}

/// One iCE40 device on the bus.
pub struct Ice40<'a> {
    cfg: DeviceConfig,
    gpio: &'a dyn Gpio,
    bus: &'a mut dyn SpiBus,
    phase: ProgramPhase,
}

impl<'a> Ice40<'a> {
    /// Claim the control lines: chip select and reset become outputs driven
    /// high (device deselected, out of reset), CDONE becomes an input. The
    /// exclusive `&mut` bus borrow keeps a second attempt from interleaving
    /// with this device's.
    pub fn new(
        cfg: DeviceConfig,
        gpio: &'a dyn Gpio,
        bus: &'a mut dyn SpiBus,
    ) -> Result<Ice40<'a>, MppcdError> {
        gpio.set_output(cfg.cs_line, Level::High)?;
        gpio.set_output(cfg.reset_line, Level::High)?;
        gpio.set_input(cfg.done_line)?;
        Ok(Ice40 {
            cfg,
            gpio,
            bus,
            phase: ProgramPhase::Idle,
        })
    }

    pub fn phase(&self) -> ProgramPhase {
        self.phase
    }

    /// Run one programming attempt to completion.
    ///
    /// # Returns: `Result<(), MppcdError>`
    /// * `Ok(())` - CDONE observed high; the device is configured
    /// * `Err(MppcdError::Transfer)` - A bus transfer failed mid-stream;
    ///   chip select was deasserted before returning
    /// * `Err(MppcdError::Timeout)` - CDONE never asserted in the window
    ///
    /// No implicit retry: after an error the attempt is over and the caller
    /// decides whether to start a fresh one.
    pub fn program(&mut self, image: &Bitstream) -> Result<(), MppcdError> {
        match self.attempt(image) {
            Ok(()) => {
                self.phase = ProgramPhase::Configured;
                info!("CDONE high: configuration successful ({} bytes)", image.len());
                Ok(())
            }
            Err(e) => {
                self.phase = ProgramPhase::Failed;
                Err(e)
            }
        }
    }

    fn attempt(&mut self, image: &Bitstream) -> Result<(), MppcdError> {
        self.reset_pulse()?;
        self.dummy_clock()?;
        self.stream(image)?;
        self.flush_clock()?;
        self.wait_done()
    }

    fn reset_pulse(&mut self) -> Result<(), MppcdError> {
        self.phase = ProgramPhase::ResetPulse;
        trace!("CRESET pulse on gpio{}", self.cfg.reset_line);
        self.gpio.write(self.cfg.cs_line, Level::Low)?;
        self.gpio.write(self.cfg.reset_line, Level::Low)?;
        std::thread::sleep(RESET_PULSE);
        self.gpio.write(self.cfg.reset_line, Level::High)?;
        std::thread::sleep(RESET_SETTLE);
        self.gpio.write(self.cfg.cs_line, Level::High)?;
        Ok(())
    }

    fn dummy_clock(&mut self) -> Result<(), MppcdError> {
        self.phase = ProgramPhase::DummyClocking;
        self.bus.transfer(&[0u8; DUMMY_CLOCK_BYTES])
    }

    fn stream(&mut self, image: &Bitstream) -> Result<(), MppcdError> {
        self.phase = ProgramPhase::Streaming;
        trace!(
            "streaming {} bytes in {} byte chunks",
            image.len(),
            STREAM_CHUNK_LEN
        );
        self.gpio.write(self.cfg.cs_line, Level::Low)?;
        let streamed = self.stream_chunks(image);
        // Deasserted on success and failure alike: a failed attempt must not
        // leave the device addressed on a shared bus.
        self.gpio.write(self.cfg.cs_line, Level::High)?;
        streamed
    }

    fn stream_chunks(&mut self, image: &Bitstream) -> Result<(), MppcdError> {
        for (index, chunk) in image.as_bytes().chunks(STREAM_CHUNK_LEN).enumerate() {
            self.bus
                .transfer(chunk)
                .map_err(|e| MppcdError::Transfer {
                    chunk: index,
                    reason: e.to_string(),
                })?;
        }
        Ok(())
    }

    fn flush_clock(&mut self) -> Result<(), MppcdError> {
        self.phase = ProgramPhase::FlushClocking;
        self.bus.transfer(&[0u8; FLUSH_CLOCK_BYTES])
    }

    fn wait_done(&mut self) -> Result<(), MppcdError> {
        self.phase = ProgramPhase::WaitDone;
        let asserted = wait_for_high(
            self.gpio,
            self.cfg.done_line,
            self.cfg.done_poll,
            self.cfg.done_timeout,
        )?;
        if asserted {
            Ok(())
        } else {
            Err(MppcdError::Timeout {
                line: self.cfg.done_line,
                timeout_ms: self.cfg.done_timeout.as_millis() as u64,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    #[derive(Debug, Clone, PartialEq)]
    enum Op {
        Dir(u32, &'static str),
        Write(u32, Level),
        Transfer(Vec<u8>),
    }

    type Journal = Rc<RefCell<Vec<Op>>>;

    /// CDONE behavior: number of samples until the line reads high, or
    /// `None` for a device that never finishes.
    struct MockGpio {
        journal: Journal,
        done_after: Option<u32>,
        done_reads: Cell<u32>,
    }

    impl Gpio for MockGpio {
        fn set_output(&self, line: u32, initial: Level) -> Result<(), MppcdError> {
            let dir = match initial {
                Level::High => "out-high",
                Level::Low => "out-low",
            };
            self.journal.borrow_mut().push(Op::Dir(line, dir));
            Ok(())
        }
        fn set_input(&self, line: u32) -> Result<(), MppcdError> {
            self.journal.borrow_mut().push(Op::Dir(line, "in"));
            Ok(())
        }
        fn write(&self, line: u32, level: Level) -> Result<(), MppcdError> {
            self.journal.borrow_mut().push(Op::Write(line, level));
            Ok(())
        }
        fn read(&self, _line: u32) -> Result<Level, MppcdError> {
            let seen = self.done_reads.get();
            self.done_reads.set(seen + 1);
            match self.done_after {
                Some(after) if seen >= after => Ok(Level::High),
                _ => Ok(Level::Low),
            }
        }
    }

    struct MockBus {
        journal: Journal,
        fail_at_chunk: Option<usize>,
        data_transfers: Cell<usize>,
    }

    impl SpiBus for MockBus {
        fn transfer(&mut self, tx: &[u8]) -> Result<(), MppcdError> {
            // dummy/flush clocking is all-zero; only count image chunks
            let is_data = tx.iter().any(|b| *b != 0) || tx.len() > FLUSH_CLOCK_BYTES;
            if is_data {
                let index = self.data_transfers.get();
                self.data_transfers.set(index + 1);
                if self.fail_at_chunk == Some(index) {
                    return Err(MppcdError::Internal("injected bus fault".to_string()));
                }
            }
            self.journal.borrow_mut().push(Op::Transfer(tx.to_vec()));
            Ok(())
        }
    }

    fn rig(done_after: Option<u32>, fail_at_chunk: Option<usize>) -> (Journal, MockGpio, MockBus) {
        let journal: Journal = Rc::new(RefCell::new(Vec::new()));
        let gpio = MockGpio {
            journal: journal.clone(),
            done_after,
            done_reads: Cell::new(0),
        };
        let bus = MockBus {
            journal: journal.clone(),
            fail_at_chunk,
            data_transfers: Cell::new(0),
        };
        (journal, gpio, bus)
    }

    fn quick_cfg() -> DeviceConfig {
        DeviceConfig {
            done_poll: Duration::from_micros(100),
            done_timeout: Duration::from_millis(20),
            ..DeviceConfig::default()
        }
    }

    fn patterned(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8 | 1).collect()
    }

    #[test]
    fn streams_whole_image_in_order_in_bounded_chunks() {
        let image = Bitstream::from_vec(patterned(10_000)).unwrap();
        let (journal, gpio, mut bus) = rig(Some(0), None);
        Ice40::new(quick_cfg(), &gpio, &mut bus)
            .unwrap()
            .program(&image)
            .unwrap();

        let transfers: Vec<Vec<u8>> = journal
            .borrow()
            .iter()
            .filter_map(|op| match op {
                Op::Transfer(tx) => Some(tx.clone()),
                _ => None,
            })
            .collect();

        // warm-up byte, ceil(10000/4096) = 3 image chunks, flush bytes
        assert_eq!(transfers.len(), 5);
        assert_eq!(transfers[0], vec![0u8]);
        assert_eq!(transfers[4], vec![0u8, 0u8]);
        let data: Vec<u8> = transfers[1..4].concat();
        assert_eq!(data, image.as_bytes(), "byte order must be preserved");
        assert!(transfers[1..4].iter().all(|tx| tx.len() <= STREAM_CHUNK_LEN));
    }

    #[test]
    fn single_byte_image_is_one_chunk() {
        let image = Bitstream::from_vec(vec![0xA5]).unwrap();
        let (journal, gpio, mut bus) = rig(Some(0), None);
        Ice40::new(quick_cfg(), &gpio, &mut bus)
            .unwrap()
            .program(&image)
            .unwrap();

        let data_chunks = journal
            .borrow()
            .iter()
            .filter(|op| matches!(op, Op::Transfer(tx) if tx.as_slice() == [0xA5]))
            .count();
        assert_eq!(data_chunks, 1);
    }

    #[test]
    fn full_sequence_for_a_small_image() {
        let cfg = quick_cfg();
        let (cs, rst, done) = (cfg.cs_line, cfg.reset_line, cfg.done_line);
        let image = Bitstream::from_vec(patterned(5)).unwrap();
        let (journal, gpio, mut bus) = rig(Some(0), None);
        let mut fpga = Ice40::new(cfg, &gpio, &mut bus).unwrap();
        fpga.program(&image).unwrap();
        assert_eq!(fpga.phase(), ProgramPhase::Configured);

        let expected = vec![
            // line claim: CS high before anything else happens on the bus
            Op::Dir(cs, "out-high"),
            Op::Dir(rst, "out-high"),
            Op::Dir(done, "in"),
            // reset pulse
            Op::Write(cs, Level::Low),
            Op::Write(rst, Level::Low),
            Op::Write(rst, Level::High),
            Op::Write(cs, Level::High),
            // warm-up clocks with CS high
            Op::Transfer(vec![0]),
            // streaming window
            Op::Write(cs, Level::Low),
            Op::Transfer(image.as_bytes().to_vec()),
            Op::Write(cs, Level::High),
            // trailing clocks
            Op::Transfer(vec![0, 0]),
        ];
        assert_eq!(*journal.borrow(), expected);
    }

    #[test]
    fn failed_transfer_deasserts_cs_and_stops_the_attempt() {
        let cfg = quick_cfg();
        let cs = cfg.cs_line;
        let image = Bitstream::from_vec(patterned(9_000)).unwrap();
        let (journal, gpio, mut bus) = rig(Some(0), Some(1));
        let mut fpga = Ice40::new(cfg, &gpio, &mut bus).unwrap();

        let result = fpga.program(&image);
        assert!(matches!(result, Err(MppcdError::Transfer { chunk: 1, .. })));
        assert_eq!(fpga.phase(), ProgramPhase::Failed);

        let ops = journal.borrow();
        // the last chip-select operation leaves the device deselected
        let last_cs = ops
            .iter()
            .rev()
            .find_map(|op| match op {
                Op::Write(line, level) if *line == cs => Some(*level),
                _ => None,
            })
            .unwrap();
        assert_eq!(last_cs, Level::High);
        // nothing after the failure: no flush clocking was attempted
        assert!(
            !ops.iter()
                .any(|op| matches!(op, Op::Transfer(tx) if tx.as_slice() == [0, 0])),
        );
    }

    #[test]
    fn missing_done_is_a_bounded_timeout() {
        let image = Bitstream::from_vec(patterned(64)).unwrap();
        let (_journal, gpio, mut bus) = rig(None, None);
        let mut fpga = Ice40::new(quick_cfg(), &gpio, &mut bus).unwrap();

        let started = std::time::Instant::now();
        let result = fpga.program(&image);
        assert!(matches!(result, Err(MppcdError::Timeout { .. })));
        assert_eq!(fpga.phase(), ProgramPhase::Failed);
        assert!(
            started.elapsed() < Duration::from_secs(5),
            "the CDONE wait must terminate within its configured timeout"
        );
    }

    #[test]
    fn late_done_still_configures() {
        let image = Bitstream::from_vec(patterned(64)).unwrap();
        let (_journal, gpio, mut bus) = rig(Some(3), None);
        let mut fpga = Ice40::new(quick_cfg(), &gpio, &mut bus).unwrap();
        fpga.program(&image).unwrap();
        assert_eq!(fpga.phase(), ProgramPhase::Configured);
    }

    fn temp_file(name: &str, contents: Option<&[u8]>) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("mppcd_{}_{name}", std::process::id()));
        if let Some(bytes) = contents {
            std::fs::write(&path, bytes).unwrap();
        }
        path
    }

    #[test]
    fn load_missing_file_is_an_io_error() {
        let path = temp_file("missing.bin", None);
        assert!(matches!(
            Bitstream::load(&path),
            Err(MppcdError::IORead { .. })
        ));
    }

    #[test]
    fn load_empty_file_is_an_io_error() {
        let path = temp_file("empty.bin", Some(&[]));
        assert!(matches!(
            Bitstream::load(&path),
            Err(MppcdError::IORead { .. })
        ));
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn load_oversized_file_is_rejected_not_truncated() {
        let path = temp_file("huge.bin", Some(&vec![0x5A; 65_536]));
        assert!(matches!(
            Bitstream::load(&path),
            Err(MppcdError::Size { len: 65_536 })
        ));
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn max_length_image_is_accepted() {
        let image = Bitstream::from_vec(vec![0xFF; 65_535]).unwrap();
        assert_eq!(image.len(), 65_535);
        assert!(matches!(
            Bitstream::from_vec(vec![0xFF; 65_536]),
            Err(MppcdError::Size { .. })
        ));
    }
}
