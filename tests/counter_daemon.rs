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

//! End-to-end behavior of the counter daemon's flush loop, driven against
//! an in-memory bank instead of real trigger lines. Intervals are shortened
//! far below the deployed 60 s so each test runs in well under a second.

use googletest::prelude::*;
use rstest::rstest;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use mppcd::counter::CounterBank;
use mppcd::daemon;

fn temp_log(name: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!("mppcd_it_{}_{name}", std::process::id()));
    let _ = std::fs::remove_file(&path);
    path
}

#[gtest]
#[tokio::test]
async fn interval_flush_writes_counts_then_resets() {
    let log = temp_log("flush.log");
    let bank = Arc::new(CounterBank::new(7));
    let (_stop_tx, stop_rx) = watch::channel(false);
    let handle = tokio::spawn(daemon::run(
        bank.clone(),
        log.clone(),
        Duration::from_millis(200),
        stop_rx,
    ));

    // events landing inside the first interval
    for _ in 0..3 {
        bank.increment(0);
    }
    bank.increment(3);

    tokio::time::sleep(Duration::from_millis(500)).await;
    handle.abort();

    let contents = std::fs::read_to_string(&log).expect("a row was appended");
    let first = contents.lines().next().unwrap();
    assert_that!(
        first,
        matches_regex(r"^3, 0, 0, 1, 0, 0, 0, \w{3} \w{3} [ \d]\d \d{2}:\d{2}:\d{2} \d{4}$")
    );
    // every slot was reset by the flush
    assert_eq!(bank.drain(), vec![0u64; 7]);
    let _ = std::fs::remove_file(&log);
}

#[gtest]
#[tokio::test]
async fn stop_signal_drains_the_partial_interval() {
    let log = temp_log("drain.log");
    let bank = Arc::new(CounterBank::new(7));
    let (stop_tx, stop_rx) = watch::channel(false);
    // interval far beyond the test runtime: only the drain may write
    let handle = tokio::spawn(daemon::run(
        bank.clone(),
        log.clone(),
        Duration::from_secs(3600),
        stop_rx,
    ));

    tokio::time::sleep(Duration::from_millis(50)).await;
    bank.increment(2);
    stop_tx.send(true).unwrap();
    handle
        .await
        .expect("daemon task must not panic")
        .expect("daemon exits cleanly after draining");

    let contents = std::fs::read_to_string(&log).expect("the partial interval was flushed");
    assert_that!(contents.lines().count(), eq(1));
    assert_that!(
        contents.lines().next().unwrap(),
        starts_with("0, 0, 1, 0, 0, 0, 0, ")
    );
    let _ = std::fs::remove_file(&log);
}

#[gtest]
#[tokio::test]
async fn rows_are_never_closer_than_the_interval() {
    let log = temp_log("cadence.log");
    let bank = Arc::new(CounterBank::new(7));
    let (_stop_tx, stop_rx) = watch::channel(false);
    let handle = tokio::spawn(daemon::run(
        bank.clone(),
        log.clone(),
        Duration::from_millis(150),
        stop_rx,
    ));

    tokio::time::sleep(Duration::from_millis(650)).await;
    handle.abort();

    let contents = std::fs::read_to_string(&log).unwrap_or_default();
    let rows = contents.lines().count();
    // 650 ms fits at most four 150 ms interval boundaries
    assert_that!(rows, le(4usize));
    assert_that!(rows, ge(1usize));
    let _ = std::fs::remove_file(&log);
}

#[gtest]
#[tokio::test]
async fn log_write_failure_does_not_kill_the_daemon() {
    let log = PathBuf::from("/nonexistent-mppcd-dir/counts.log");
    let bank = Arc::new(CounterBank::new(7));
    let (stop_tx, stop_rx) = watch::channel(false);
    let handle = tokio::spawn(daemon::run(
        bank.clone(),
        log,
        Duration::from_millis(100),
        stop_rx,
    ));

    // several failed flushes later the loop is still alive
    tokio::time::sleep(Duration::from_millis(350)).await;
    assert_that!(handle.is_finished(), eq(false));

    stop_tx.send(true).unwrap();
    handle
        .await
        .expect("daemon task must not panic")
        .expect("a failing log file is not a fatal error");
}

#[gtest]
#[rstest]
#[case::three_in_slot_zero(0, 3)]
#[case::one_in_slot_three(3, 1)]
#[case::many_in_last_slot(6, 42)]
fn increments_surface_in_the_matching_column(#[case] slot: usize, #[case] n: u64) {
    let bank = CounterBank::new(7);
    for _ in 0..n {
        bank.increment(slot);
    }
    let counts = bank.drain();
    assert_that!(counts[slot], eq(n));
    // no event may leak into another column
    assert_that!(counts.iter().sum::<u64>(), eq(n));
}
