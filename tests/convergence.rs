// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! Replays random editing sessions through a simulated sequencer and checks that every replica
//! ends up in the same state.
use cowrite::{
    Command, Config, ListInterpreter, MapInterpreter, Versionstamp,
    clock::ManualClock,
    codec::RawCodec,
    crdts::reverse_tree::SessionToken,
};
use quickcheck_macros::quickcheck;
use rand::{Rng, SeedableRng, rngs::StdRng, seq::SliceRandom};

const SESSIONS: [&str; 3] = ["alice", "bob", "carol"];

/// Stamps commands in arrival order and keeps them around for delivery.
#[derive(Default)]
struct Sequencer {
    log: Vec<(Vec<String>, usize, String)>,
}

impl Sequencer {
    fn submit(&mut self, command: Command, writer: usize) {
        let position = self.log.len() as u64 + 1;
        // trim leading zeroes so stamps vary in length, as they do in the wild
        let bytes = position.to_be_bytes();
        let first = bytes.iter().position(|&b| b != 0).unwrap_or(bytes.len());
        let stamp = Versionstamp::from_bytes(&bytes[first..]);
        self.log
            .push((command.to_tuple(), writer, stamp.token().to_string()));
    }
}

trait Replica {
    fn edit(&mut self, rng: &mut StdRng) -> Option<Command>;
    fn deliver(&mut self, tuple: &[String], stamp: &str, ack: bool);
}

impl Replica for ListInterpreter<RawCodec> {
    fn edit(&mut self, rng: &mut StdRng) -> Option<Command> {
        let value = format!("v{}", rng.random_range(0..100));
        let len = self.len();
        match rng.random_range(0..4) {
            0 => self.push(&value).ok(),
            1 => self.insert_at(rng.random_range(0..=len), &value).ok(),
            2 if len > 0 => self.set_at(rng.random_range(0..len), &value).ok(),
            3 if len > 0 => self.delete_at(rng.random_range(0..len)),
            _ => self.push(&value).ok(),
        }
    }

    fn deliver(&mut self, tuple: &[String], stamp: &str, ack: bool) {
        self.apply_command(tuple, stamp, ack).unwrap();
    }
}

impl Replica for MapInterpreter<RawCodec, ManualClock> {
    fn edit(&mut self, rng: &mut StdRng) -> Option<Command> {
        let key = format!("k{}", rng.random_range(0..4));
        if rng.random_bool(0.3) {
            Some(self.delete(key))
        } else {
            Some(self.set(key, &format!("v{}", rng.random_range(0..100))))
        }
    }

    fn deliver(&mut self, tuple: &[String], stamp: &str, ack: bool) {
        self.apply_command(tuple, stamp, ack).unwrap();
    }
}

/// Interleaves local edits with in-order delivery of the sequencer's log, at random, then
/// delivers whatever is left.
fn simulate<R: Replica>(replicas: &mut [R], seed: u64, steps: usize) {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut sequencer = Sequencer::default();
    let mut cursors = vec![0; replicas.len()];

    for _ in 0..steps {
        let who = rng.random_range(0..replicas.len());
        if rng.random_bool(0.5) {
            if let Some(command) = replicas[who].edit(&mut rng) {
                sequencer.submit(command, who);
            }
        } else if let Some((tuple, writer, stamp)) = sequencer.log.get(cursors[who]) {
            replicas[who].deliver(tuple, stamp, *writer == who);
            cursors[who] += 1;
        }
    }

    deliver_rest(replicas, &sequencer, &cursors);
}

/// Delivers everything from each replica's cursor onwards.
fn deliver_rest<R: Replica>(replicas: &mut [R], sequencer: &Sequencer, cursors: &[usize]) {
    for (who, replica) in replicas.iter_mut().enumerate() {
        for (tuple, writer, stamp) in &sequencer.log[cursors[who]..] {
            replica.deliver(tuple, stamp, *writer == who);
        }
    }
}

/// Like [`simulate`], but every replica receives the commands it hasn't seen yet in random order,
/// its own acks included.
fn simulate_shuffled<R: Replica>(replicas: &mut [R], seed: u64, steps: usize) {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut sequencer = Sequencer::default();
    let mut pending: Vec<Vec<usize>> = vec![Vec::new(); replicas.len()];

    for _ in 0..steps {
        let who = rng.random_range(0..replicas.len());
        if rng.random_bool(0.5) {
            if let Some(command) = replicas[who].edit(&mut rng) {
                sequencer.submit(command, who);
                let position = sequencer.log.len() - 1;
                for queue in &mut pending {
                    queue.push(position);
                }
            }
        } else if !pending[who].is_empty() {
            let pick = rng.random_range(0..pending[who].len());
            let (tuple, writer, stamp) = &sequencer.log[pending[who].swap_remove(pick)];
            replicas[who].deliver(tuple, stamp, *writer == who);
        }
    }

    for (who, (replica, queue)) in replicas.iter_mut().zip(&mut pending).enumerate() {
        queue.shuffle(&mut rng);
        for &position in queue.iter() {
            let (tuple, writer, stamp) = &sequencer.log[position];
            replica.deliver(tuple, stamp, *writer == who);
        }
    }
}

fn lists() -> Vec<ListInterpreter<RawCodec>> {
    SESSIONS
        .iter()
        .map(|session| {
            ListInterpreter::with_session("doc", "list", SessionToken::new(*session).unwrap())
        })
        .collect()
}

fn maps(clock: &ManualClock) -> Vec<MapInterpreter<RawCodec, ManualClock>> {
    SESSIONS
        .iter()
        .map(|_| MapInterpreter::with_clock("doc", "map", Config::default(), clock.clone()))
        .collect()
}

#[quickcheck]
fn lists_converge(seed: u64) -> bool {
    let mut replicas = lists();
    simulate(&mut replicas, seed, 60);
    lists_agree(&replicas)
}

#[quickcheck]
fn maps_converge(seed: u64) -> bool {
    // a clock that never moves keeps every tombstone around
    let clock = ManualClock::new();
    let mut replicas = maps(&clock);
    simulate(&mut replicas, seed, 60);

    let expected = replicas[0].to_map();
    replicas.iter().all(|replica| replica.to_map() == expected)
}

fn lists_agree(replicas: &[ListInterpreter<RawCodec>]) -> bool {
    let expected = replicas[0].to_vec().unwrap();
    replicas.iter().all(|replica| {
        replica.to_vec().unwrap() == expected
            && replica.item_ids() == replica.tree().live_ids().as_slice()
    })
}

#[quickcheck]
fn lists_converge_under_shuffled_delivery(seed: u64) -> bool {
    let mut replicas = lists();
    simulate_shuffled(&mut replicas, seed, 60);
    lists_agree(&replicas)
}

#[quickcheck]
fn maps_converge_under_shuffled_delivery(seed: u64) -> bool {
    let clock = ManualClock::new();
    let mut replicas = maps(&clock);
    simulate_shuffled(&mut replicas, seed, 60);

    let expected = replicas[0].to_map();
    replicas.iter().all(|replica| replica.to_map() == expected)
}

#[test]
fn concurrent_pushes_keep_each_sessions_run_together() {
    let mut replicas = lists();
    let mut sequencer = Sequencer::default();

    for (who, replica) in replicas.iter_mut().enumerate().take(2) {
        for i in 0..3 {
            let command = replica.push(&format!("{}{i}", SESSIONS[who])).unwrap();
            sequencer.submit(command, who);
        }
    }
    deliver_rest(&mut replicas, &sequencer, &[0, 0, 0]);

    let expected = ["alice0", "alice1", "alice2", "bob0", "bob1", "bob2"];
    for replica in &replicas {
        assert_eq!(replica.to_vec().unwrap(), expected);
    }
}

#[test]
fn a_later_write_replaces_a_pending_local_one() {
    let clock = ManualClock::new();
    let mut replicas = maps(&clock);
    let mut sequencer = Sequencer::default();

    // bob writes first, alice edits before seeing it, and alice's write is sequenced last
    sequencer.submit(replicas[1].set("color", &"blue".into()), 1);
    sequencer.submit(replicas[0].set("color", &"red".into()), 0);

    let (tuple, _, stamp) = &sequencer.log[0];
    replicas[0].deliver(tuple, stamp, false);
    assert_eq!(replicas[0].get("color").as_deref(), Some("blue"));

    deliver_rest(&mut replicas, &sequencer, &[1, 0, 0]);
    for replica in &replicas {
        assert_eq!(replica.get("color").as_deref(), Some("red"));
    }
}
