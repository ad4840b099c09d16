//! Snapshot identifiers.
//!
//! Identifiers are local wall-clock timestamps at microsecond resolution,
//! formatted so that lexical order is chronological order:
//! `2019-01-23_23-19-56.871484`. When the clock has not advanced since the
//! previous identifier (same tick, or the clock stepped backwards) the previous
//! stamp is reused with a zero-padded counter suffix, `…871484-0000000001`, which
//! still sorts after the bare stamp and before any later one.

use chrono::{DateTime, Local};
use std::sync::Mutex;

const STAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S%.6f";

/// Produces unique, sortable snapshot identifiers.
#[derive(Debug, Default)]
pub struct SnapshotNamer {
    last: Option<Issued>,
}

#[derive(Debug, Clone)]
struct Issued {
    stamp: String,
    counter: u32,
}

impl SnapshotNamer {
    pub const fn new() -> Self {
        Self { last: None }
    }

    /// Identifier for the current wall-clock time.
    pub fn next_id(&mut self) -> String {
        self.next_id_at(Local::now())
    }

    /// Identifier for an explicit instant; used by tests to pin the clock.
    pub fn next_id_at(&mut self, now: DateTime<Local>) -> String {
        let stamp = now.format(STAMP_FORMAT).to_string();

        let issued = match self.last.take() {
            Some(prev) if stamp <= prev.stamp => Issued {
                stamp: prev.stamp,
                counter: prev.counter + 1,
            },
            _ => Issued { stamp, counter: 0 },
        };

        let id = if issued.counter == 0 {
            issued.stamp.clone()
        } else {
            format!("{}-{:010}", issued.stamp, issued.counter)
        };
        self.last = Some(issued);
        id
    }
}

static NAMER: Mutex<SnapshotNamer> = Mutex::new(SnapshotNamer::new());

/// Returns a new snapshot identifier, unique within this process.
pub fn new_snapshot_id() -> String {
    match NAMER.lock() {
        Ok(mut namer) => namer.next_id(),
        Err(poisoned) => poisoned.into_inner().next_id(),
    }
}
