// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! The two CRDTs at the heart of this crate and the reconciliation rule they share.
//!
//! - [`ReverseTree`]: a list CRDT in which every element points at its predecessor.
//! - [`LwwMap`]: a last-writer-wins map whose deletions leave short-lived tombstones.
//!
//! Both resolve a write against the value they already hold with the same table, implemented
//! once in [`LwwCell::write`]. Who issued a write is described by an [`Origin`]:
//!
//! | current cell      | origin             | result                                        |
//! |-------------------|--------------------|-----------------------------------------------|
//! | any               | `Local`            | overwrite value, mark local, keep stamp       |
//! | stamp newer       | `RemoteAck`/`Write`| stale, ignored                                |
//! | local             | `RemoteAck(v)`     | keep value, stay local, advance stamp to `v`  |
//! | otherwise         | `RemoteAck`/`Write`| overwrite value, clear local, stamp `v`       |
//!
//! Local writes deliberately leave the stamp alone. A remote write that the sequencer ordered
//! after the one we last saw must still be able to win over a pending local edit.
use crate::versionstamp::{self, Versionstamp};

pub mod lww_map;
pub mod reverse_tree;
#[cfg(any(test, feature = "arbitrary"))]
mod test_util;

pub use lww_map::LwwMap;
pub use reverse_tree::{NodeId, NodeValue, ReverseTree};

/// Where a write comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Origin {
    /// An optimistic write made by this session that the sequencer has not confirmed yet.
    Local,
    /// The sequencer echoing back a write this session issued.
    RemoteAck(Versionstamp),
    /// A sequenced write issued by another session.
    RemoteWrite(Versionstamp),
}

impl Origin {
    /// Builds the origin of an inbound command from its out-of-band transport metadata.
    pub fn remote(versionstamp: Versionstamp, ack: bool) -> Self {
        if ack {
            Origin::RemoteAck(versionstamp)
        } else {
            Origin::RemoteWrite(versionstamp)
        }
    }

    /// Returns true for [`Origin::Local`].
    pub fn is_local(&self) -> bool {
        matches!(self, Origin::Local)
    }

    /// Returns the sequencer-assigned stamp, if there is one.
    pub fn versionstamp(&self) -> Option<&Versionstamp> {
        match self {
            Origin::Local => None,
            Origin::RemoteAck(vs) | Origin::RemoteWrite(vs) => Some(vs),
        }
    }
}

/// What a write did to the value it targeted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// There was nothing there yet; the write created it.
    Created,
    /// The written value replaced the previous one.
    Applied,
    /// The sequencer confirmed a pending local write; only the stamp moved.
    Confirmed,
    /// The write was older than what we already have and was dropped.
    Stale,
}

impl WriteOutcome {
    /// Returns true if the written value is now the visible one.
    pub fn took_value(self) -> bool {
        matches!(self, WriteOutcome::Created | WriteOutcome::Applied)
    }
}

/// A value under last-writer-wins control, plus the bookkeeping needed to decide the next write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LwwCell<V> {
    value: V,
    versionstamp: Option<Versionstamp>,
    local: bool,
}

impl<V> LwwCell<V> {
    /// Creates a cell for the first write seen for some id or key.
    pub fn new(value: V, origin: &Origin) -> Self {
        Self {
            value,
            versionstamp: origin.versionstamp().cloned(),
            local: origin.is_local(),
        }
    }

    /// Creates a confirmed cell, as loaded from a checkpoint.
    pub fn confirmed(value: V, versionstamp: Option<Versionstamp>) -> Self {
        Self {
            value,
            versionstamp,
            local: false,
        }
    }

    pub fn value(&self) -> &V {
        &self.value
    }

    pub fn versionstamp(&self) -> Option<&Versionstamp> {
        self.versionstamp.as_ref()
    }

    /// Returns true while the value is an optimistic local write not superseded by a remote one.
    pub fn is_local(&self) -> bool {
        self.local
    }

    /// Reconciles `value` written by `origin` against the current state.
    pub fn write(&mut self, value: V, origin: Origin) -> WriteOutcome {
        let (versionstamp, ack) = match origin {
            Origin::Local => {
                self.value = value;
                self.local = true;
                return WriteOutcome::Applied;
            }
            Origin::RemoteAck(vs) => (vs, true),
            Origin::RemoteWrite(vs) => (vs, false),
        };

        if versionstamp::is_older(Some(&versionstamp), self.versionstamp.as_ref()) {
            return WriteOutcome::Stale;
        }

        let outcome = if self.local && ack {
            WriteOutcome::Confirmed
        } else {
            self.value = value;
            self.local = false;
            WriteOutcome::Applied
        };
        self.versionstamp = Some(versionstamp);
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck::TestResult;

    fn vs(n: u8) -> Versionstamp {
        Versionstamp::from_bytes([n])
    }

    #[test]
    fn local_write_keeps_the_stamp() {
        let mut cell = LwwCell::new("v1", &Origin::RemoteWrite(vs(2)));
        assert_eq!(cell.write("local", Origin::Local), WriteOutcome::Applied);
        assert_eq!(cell.value(), &"local");
        assert!(cell.is_local());
        assert_eq!(cell.versionstamp(), Some(&vs(2)));
    }

    #[test]
    fn stale_writes_are_dropped() {
        let mut cell = LwwCell::new("v1", &Origin::RemoteWrite(vs(2)));
        assert_eq!(cell.write("v0", Origin::RemoteWrite(vs(1))), WriteOutcome::Stale);
        assert_eq!(cell.write("v0", Origin::RemoteAck(vs(1))), WriteOutcome::Stale);
        assert_eq!(cell.value(), &"v1");
        assert_eq!(cell.versionstamp(), Some(&vs(2)));
    }

    #[test]
    fn ack_of_pending_local_write_only_moves_the_stamp() {
        let mut cell = LwwCell::new("v1", &Origin::RemoteWrite(vs(2)));
        cell.write("mine", Origin::Local);

        assert_eq!(cell.write("echo", Origin::RemoteAck(vs(3))), WriteOutcome::Confirmed);
        assert_eq!(cell.value(), &"mine");
        assert!(cell.is_local());
        assert_eq!(cell.versionstamp(), Some(&vs(3)));

        assert_eq!(cell.write("other", Origin::RemoteWrite(vs(4))), WriteOutcome::Applied);
        assert_eq!(cell.value(), &"other");
        assert!(!cell.is_local());
    }

    #[test]
    fn ack_without_pending_local_write_overwrites() {
        let mut cell = LwwCell::new("v1", &Origin::RemoteWrite(vs(2)));
        assert_eq!(cell.write("acked", Origin::RemoteAck(vs(3))), WriteOutcome::Applied);
        assert_eq!(cell.value(), &"acked");
    }

    #[test]
    fn same_stamp_is_not_stale() {
        let mut cell = LwwCell::new("v1", &Origin::RemoteWrite(vs(2)));
        assert_eq!(cell.write("v1", Origin::RemoteWrite(vs(2))), WriteOutcome::Applied);
        assert_eq!(cell.value(), &"v1");
    }

    #[quickcheck]
    fn remote_writes_settle_on_the_newest_stamp(writes: Vec<(u8, Versionstamp)>) -> TestResult {
        // equal stamps are resolved by arrival order, so only keep the first of each
        let mut distinct: Vec<(u8, Versionstamp)> = Vec::new();
        for (value, stamp) in writes {
            if !distinct.iter().any(|(_, seen)| *seen == stamp) {
                distinct.push((value, stamp));
            }
        }
        let Some((newest, _)) = distinct.iter().max_by(|l, r| l.1.cmp(&r.1)).cloned() else {
            return TestResult::discard();
        };

        let settle = |writes: Vec<&(u8, Versionstamp)>| {
            let mut cell = LwwCell::new(None, &Origin::Local);
            for (value, stamp) in writes {
                cell.write(Some(*value), Origin::RemoteWrite(stamp.clone()));
            }
            *cell.value()
        };
        let forward = settle(distinct.iter().collect());
        let backward = settle(distinct.iter().rev().collect());
        TestResult::from_bool(forward == Some(newest) && backward == Some(newest))
    }

    #[quickcheck]
    fn stale_writes_never_change_the_cell(origin: Origin, value: u8) -> bool {
        let mut cell = LwwCell::new(0, &Origin::RemoteWrite(Versionstamp::from_bytes([0xff; 13])));
        let outcome = cell.write(value, origin.clone());
        match origin {
            Origin::Local => outcome == WriteOutcome::Applied && *cell.value() == value,
            _ => outcome == WriteOutcome::Stale && *cell.value() == 0,
        }
    }

    #[test]
    fn unstamped_cells_accept_any_remote_write() {
        let mut cell = LwwCell::new("local", &Origin::Local);
        assert_eq!(cell.versionstamp(), None);
        assert_eq!(cell.write("remote", Origin::RemoteWrite(vs(0))), WriteOutcome::Applied);
        assert_eq!(cell.value(), &"remote");
    }
}
