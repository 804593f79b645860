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

//! Coincidence counter core.
//!
//! The discriminator/coincidence logic upstream of the Pi combines the three
//! detector channels into seven trigger lines: the three pairwise
//! coincidences, the triple, and the three raw singles rates. Each line gets
//! a named [`TriggerSlot`] bound to a physical BCM line by a
//! [`ChannelBinding`]; the binding order is the column order of the log.
//! Slots are named rather than positional so that rewiring a deployment is a
//! config edit, not a silent column reshuffle.
//!
//! [`CounterBank`] is the one piece of state shared between the line monitor
//! tasks and the flush loop. Every slot is an `AtomicU64`: increments are
//! single relaxed `fetch_add`s (cheap enough for interrupt-rate callers) and
//! the flush is a per-slot `swap(0)`, so an edge arriving during a flush
//! lands in exactly one of the two adjacent intervals and is never lost or
//! double counted.

use chrono::{DateTime, Local};
use serde::Deserialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Logical meaning of one trigger line. Channel numbering follows the
/// detector: MPPC channels 0, 1 and 2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerSlot {
    /// ch0 && ch1 coincidence
    Pair01,
    /// ch0 && ch2 coincidence
    Pair02,
    /// ch1 && ch2 coincidence
    Pair12,
    /// ch0 && ch1 && ch2 triple coincidence
    Triple012,
    /// ch0 raw singles
    Single0,
    /// ch1 raw singles
    Single1,
    /// ch2 raw singles
    Single2,
}

impl TriggerSlot {
    pub fn label(&self) -> &'static str {
        match self {
            TriggerSlot::Pair01 => "ch0&ch1",
            TriggerSlot::Pair02 => "ch0&ch2",
            TriggerSlot::Pair12 => "ch1&ch2",
            TriggerSlot::Triple012 => "ch0&ch1&ch2",
            TriggerSlot::Single0 => "ch0",
            TriggerSlot::Single1 => "ch1",
            TriggerSlot::Single2 => "ch2",
        }
    }
}

impl fmt::Display for TriggerSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One slot-to-line assignment. The set of bindings is fixed at startup for
/// the process lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChannelBinding {
    pub slot: TriggerSlot,
    pub line: u32,
}

/// The reference deployment's wiring (BCM numbering), in log column order.
pub fn default_channel_map() -> Vec<ChannelBinding> {
    [
        (TriggerSlot::Pair01, 27),
        (TriggerSlot::Pair02, 18),
        (TriggerSlot::Pair12, 17),
        (TriggerSlot::Triple012, 25),
        (TriggerSlot::Single0, 6),
        (TriggerSlot::Single1, 5),
        (TriggerSlot::Single2, 16),
    ]
    .into_iter()
    .map(|(slot, line)| ChannelBinding { slot, line })
    .collect()
}

/// Fixed bank of event counters, one per channel binding.
#[derive(Debug)]
pub struct CounterBank {
    slots: Vec<AtomicU64>,
}

impl CounterBank {
    pub fn new(len: usize) -> CounterBank {
        CounterBank {
            slots: (0..len).map(|_| AtomicU64::new(0)).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Count one event in slot `idx`. O(1), lock-free, safe to call from any
    /// task concurrently with [`drain`](CounterBank::drain). An index past
    /// the bank (impossible with a validated channel map) counts nothing.
    pub fn increment(&self, idx: usize) {
        if let Some(slot) = self.slots.get(idx) {
            slot.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Atomically take and zero every counter, as one paired operation per
    /// slot. An increment racing the flush lands in exactly one interval.
    pub fn drain(&self) -> Vec<u64> {
        self.slots
            .iter()
            .map(|slot| slot.swap(0, Ordering::AcqRel))
            .collect()
    }
}

/// One flushed interval: the drained counts and the wall-clock flush time.
/// Immutable once captured; the daemon never revisits a written record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub timestamp: DateTime<Local>,
    pub counts: Vec<u64>,
}

impl LogRecord {
    pub fn capture(bank: &CounterBank) -> LogRecord {
        LogRecord {
            timestamp: Local::now(),
            counts: bank.drain(),
        }
    }
}

impl fmt::Display for LogRecord {
    /// `count_0, count_1, ..., count_n, <asctime timestamp>` — the format
    /// the downstream analysis scripts already parse.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for count in &self.counts {
            write!(f, "{count}, ")?;
        }
        write!(f, "{}", self.timestamp.format("%a %b %e %H:%M:%S %Y"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::Arc;

    #[test]
    fn increments_land_in_their_slot() {
        let bank = CounterBank::new(7);
        for _ in 0..3 {
            bank.increment(0);
        }
        bank.increment(3);
        assert_eq!(bank.drain(), vec![3, 0, 0, 1, 0, 0, 0]);
    }

    #[test]
    fn drain_resets_every_slot_exactly_once() {
        let bank = CounterBank::new(3);
        bank.increment(1);
        assert_eq!(bank.drain(), vec![0, 1, 0]);
        assert_eq!(bank.drain(), vec![0, 0, 0]);
    }

    #[test]
    fn out_of_range_increment_counts_nothing() {
        let bank = CounterBank::new(2);
        bank.increment(5);
        assert_eq!(bank.drain(), vec![0, 0]);
    }

    /// No event may be lost or double counted when flushes race increments:
    /// the sum over all drained records must equal the number of delivered
    /// events exactly.
    #[test]
    fn concurrent_flush_loses_no_updates() {
        const PRODUCERS: usize = 4;
        const EVENTS_EACH: u64 = 50_000;

        let bank = Arc::new(CounterBank::new(1));
        let mut handles = Vec::new();
        for _ in 0..PRODUCERS {
            let bank = bank.clone();
            handles.push(std::thread::spawn(move || {
                for _ in 0..EVENTS_EACH {
                    bank.increment(0);
                }
            }));
        }

        // flush while producers are hammering
        let mut total = 0u64;
        while handles.iter().any(|h| !h.is_finished()) {
            total += bank.drain()[0];
        }
        for handle in handles {
            handle.join().unwrap();
        }
        total += bank.drain()[0];

        assert_eq!(total, PRODUCERS as u64 * EVENTS_EACH);
    }

    #[test]
    fn record_renders_counts_then_asctime() {
        let record = LogRecord {
            timestamp: Local.with_ymd_and_hms(2021, 1, 1, 12, 30, 5).unwrap(),
            counts: vec![3, 0, 0, 1, 0, 0, 0],
        };
        assert_eq!(
            record.to_string(),
            "3, 0, 0, 1, 0, 0, 0, Fri Jan  1 12:30:05 2021"
        );
    }

    #[test]
    fn default_map_matches_reference_wiring() {
        let map = default_channel_map();
        assert_eq!(map.len(), 7);
        assert_eq!(map[0], ChannelBinding { slot: TriggerSlot::Pair01, line: 27 });
        assert_eq!(map[3], ChannelBinding { slot: TriggerSlot::Triple012, line: 25 });
        assert_eq!(map[6], ChannelBinding { slot: TriggerSlot::Single2, line: 16 });
    }

    #[test]
    fn slot_names_deserialize_from_config_form() {
        let binding: ChannelBinding =
            toml::from_str(r#"slot = "triple012"
line = 25"#).unwrap();
        assert_eq!(binding.slot, TriggerSlot::Triple012);
        assert_eq!(binding.line, 25);
    }
}
