// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! Implementation of the quickcheck::Arbitrary trait for stamps, ids and write origins.

use crate::{
    crdts::{
        Origin,
        reverse_tree::{NodeId, SessionToken},
    },
    versionstamp::Versionstamp,
};
use quickcheck::{Arbitrary, Gen};

impl Arbitrary for Versionstamp {
    fn arbitrary(g: &mut Gen) -> Self {
        // Skew the distribution to increase the likelihood of triggering bugs.
        // Most interesting behavior occurs when two stamps only differ in length or in a single
        // low byte, so short stamps made of small bytes are far more likely than random ones.
        let len_choices = [0, 1, 1, 2, 3, 3, 10, 10, 10, 12, usize::arbitrary(g) % 13];
        let len = *g.choose(&len_choices).unwrap();
        let bytes: Vec<u8> = (0..len)
            .map(|_| {
                let byte_choices = [0, 0, 0, 0, 1, 1, 2, 0x0a, u8::arbitrary(g)];
                *g.choose(&byte_choices).unwrap()
            })
            .collect();
        Self::from_bytes(bytes)
    }

    fn shrink(&self) -> Box<dyn Iterator<Item = Self>> {
        Box::new(self.as_bytes().to_vec().shrink().map(Self::from_bytes))
    }
}

impl Arbitrary for SessionToken {
    fn arbitrary(g: &mut Gen) -> Self {
        // a handful of sessions, so counters collide across sessions
        let token = *g.choose(&["alice", "bob", "carol", "me"]).unwrap();
        Self::new(token).unwrap()
    }
}

impl Arbitrary for NodeId {
    fn arbitrary(g: &mut Gen) -> Self {
        let counter_choices = [0, 0, 1, 1, 2, 3, 9, 10, u64::arbitrary(g)];
        match *g.choose(&["root", "item", "item", "item", "item"]).unwrap() {
            "root" => Self::Root,
            "item" => Self::item(
                *g.choose(&counter_choices).unwrap(),
                SessionToken::arbitrary(g),
            ),
            _ => unreachable!(),
        }
    }

    fn shrink(&self) -> Box<dyn Iterator<Item = Self>> {
        match self {
            Self::Root => quickcheck::empty_shrinker(),
            Self::Item { counter, session } => {
                let session = session.clone();
                Box::new(
                    counter
                        .shrink()
                        .map(move |counter| Self::item(counter, session.clone())),
                )
            }
        }
    }
}

impl Arbitrary for Origin {
    fn arbitrary(g: &mut Gen) -> Self {
        match *g.choose(&["local", "ack", "write", "write"]).unwrap() {
            "local" => Self::Local,
            "ack" => Self::RemoteAck(Versionstamp::arbitrary(g)),
            "write" => Self::RemoteWrite(Versionstamp::arbitrary(g)),
            _ => unreachable!(),
        }
    }
}
