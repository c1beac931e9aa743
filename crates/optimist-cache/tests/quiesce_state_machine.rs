//! Stateful property testing for quiesce holds and refetch tickets.
//!
//! Exercises the race between in-flight refetches and optimistic writes on
//! a single cache key. The model tracks:
//!
//! - Nested quiesce holds (refetches land only with zero holds)
//! - The key epoch, bumped by every quiesce
//! - Outstanding fetch tickets and the epoch they were issued at
//! - Staleness (set by invalidate, cleared by a landed fetch)

use std::sync::Arc;

use proptest::prelude::*;
use proptest_state_machine::{ReferenceStateMachine, StateMachineTest, prop_state_machine};

use optimist_cache::{
    CacheEntry, CacheKey, CacheStore, CacheUpdate, FetchTicket, QueryCache, Record,
};

/// Operations on the watched key.
#[derive(Debug, Clone)]
pub enum KeyOperation {
    Quiesce,
    Resume,
    BeginFetch,
    /// Land the ticket at this index with the given version.
    CompleteFetch { ticket: usize, version: i64 },
    /// Optimistic write with the given version.
    Write { version: i64 },
    Invalidate,
}

/// Reference model of one key.
#[derive(Clone, Debug, Default)]
pub struct KeyModel {
    pub holds: usize,
    pub epoch: u64,
    pub stale: bool,
    pub version: i64,
    /// Epoch each outstanding ticket was issued at.
    pub tickets: Vec<u64>,
}

impl ReferenceStateMachine for KeyModel {
    type State = Self;
    type Transition = KeyOperation;

    fn init_state() -> BoxedStrategy<Self::State> {
        Just(Self::default()).boxed()
    }

    fn transitions(state: &Self::State) -> BoxedStrategy<Self::Transition> {
        let tickets = state.tickets.len().max(1);
        prop_oneof![
            2 => Just(KeyOperation::Quiesce),
            2 => Just(KeyOperation::Resume),
            2 => Just(KeyOperation::BeginFetch),
            3 => (0..tickets, 1i64..1000).prop_map(|(ticket, version)| {
                KeyOperation::CompleteFetch { ticket, version }
            }),
            2 => (1i64..1000).prop_map(|version| KeyOperation::Write { version }),
            1 => Just(KeyOperation::Invalidate),
        ]
        .boxed()
    }

    fn apply(mut state: Self::State, transition: &Self::Transition) -> Self::State {
        match transition {
            KeyOperation::Quiesce => {
                state.holds += 1;
                state.epoch += 1;
            }
            KeyOperation::Resume => {
                state.holds = state.holds.saturating_sub(1);
            }
            KeyOperation::BeginFetch => {
                state.tickets.push(state.epoch);
            }
            KeyOperation::CompleteFetch { ticket, version } => {
                let issued = state.tickets.remove(*ticket);
                if state.holds == 0 && issued == state.epoch {
                    state.version = *version;
                    state.stale = false;
                }
            }
            KeyOperation::Write { version } => {
                state.version = *version;
            }
            KeyOperation::Invalidate => {
                state.stale = true;
            }
        }
        state
    }

    fn preconditions(state: &Self::State, transition: &Self::Transition) -> bool {
        match transition {
            KeyOperation::CompleteFetch { ticket, .. } => *ticket < state.tickets.len(),
            _ => true,
        }
    }
}

/// Harness driving a real cache with one seeded key.
pub struct KeyTestHarness {
    cache: Arc<QueryCache>,
    key: CacheKey,
    tickets: Vec<FetchTicket>,
}

fn payload(version: i64) -> CacheEntry {
    CacheEntry::collection(vec![Record::new(1_i64).with("version", version)])
}

impl KeyTestHarness {
    fn new() -> Self {
        let cache = QueryCache::new();
        let key = CacheKey::list("posts", "");
        cache
            .insert(key.clone(), payload(0))
            .expect("seed entry fits its key");
        Self {
            cache,
            key,
            tickets: Vec::new(),
        }
    }

    fn apply_operation(&mut self, op: &KeyOperation) {
        match op {
            KeyOperation::Quiesce => self.cache.quiesce(&self.key),
            KeyOperation::Resume => self.cache.resume(&self.key),
            KeyOperation::BeginFetch => self.tickets.push(self.cache.begin_fetch(&self.key)),
            KeyOperation::CompleteFetch { ticket, version } => {
                let ticket = self.tickets.remove(*ticket);
                self.cache
                    .complete_fetch(ticket, payload(*version))
                    .expect("payload fits its key");
            }
            KeyOperation::Write { version } => self.cache.write(&self.key, payload(*version)),
            KeyOperation::Invalidate => self.cache.invalidate(&self.key),
        }
    }

    fn verify_invariants(&self, model: &KeyModel) {
        assert_eq!(self.cache.is_quiesced(&self.key), model.holds > 0);
        assert_eq!(self.cache.is_stale(&self.key), model.stale);
        assert_eq!(self.tickets.len(), model.tickets.len());

        let entry = self.cache.get(&self.key).expect("key is never removed");
        let version = entry.records()[0].get("version").and_then(|v| v.as_i64());
        assert_eq!(
            version,
            Some(model.version),
            "version mismatch: actual {:?} vs model {}",
            version,
            model.version
        );
    }
}

impl StateMachineTest for KeyTestHarness {
    type SystemUnderTest = Self;
    type Reference = KeyModel;

    fn init_test(
        _ref_state: &<Self::Reference as ReferenceStateMachine>::State,
    ) -> Self::SystemUnderTest {
        Self::new()
    }

    fn apply(
        mut state: Self::SystemUnderTest,
        ref_state: &<Self::Reference as ReferenceStateMachine>::State,
        transition: <Self::Reference as ReferenceStateMachine>::Transition,
    ) -> Self::SystemUnderTest {
        state.apply_operation(&transition);
        state.verify_invariants(ref_state);
        state
    }

    fn check_invariants(
        state: &Self::SystemUnderTest,
        ref_state: &<Self::Reference as ReferenceStateMachine>::State,
    ) {
        state.verify_invariants(ref_state);
    }
}

prop_state_machine! {
    #![proptest_config(ProptestConfig {
        cases: 100,
        max_shrink_iters: 10000,
        ..ProptestConfig::default()
    })]

    #[test]
    fn quiesce_state_machine_test(sequential 1..60 => KeyTestHarness);
}

// Additional targeted tests

#[test]
fn test_nested_holds_broadcast_resume_once() {
    let cache = QueryCache::new();
    let key = CacheKey::one("posts", 1_i64);
    cache
        .insert(key.clone(), CacheEntry::single(Record::new(1_i64)))
        .unwrap();
    let mut rx = cache.subscribe();

    cache.quiesce(&key);
    cache.quiesce(&key);
    cache.resume(&key);
    cache.resume(&key);

    let mut updates = Vec::new();
    while let Ok(update) = rx.try_recv() {
        updates.push(update);
    }
    assert_eq!(
        updates,
        vec![
            CacheUpdate::Quiesced { key: key.clone() },
            CacheUpdate::Quiesced { key: key.clone() },
            CacheUpdate::Resumed { key },
        ]
    );
}

#[test]
fn test_suppressed_broadcasts() {
    let cache = QueryCache::new();
    let mut rx = cache.subscribe();

    cache.set_suppress_broadcasts(true);
    cache
        .insert(CacheKey::list("posts", ""), CacheEntry::collection(vec![]))
        .unwrap();
    assert!(rx.try_recv().is_err());

    cache.set_suppress_broadcasts(false);
    cache.invalidate(&CacheKey::list("posts", ""));
    assert!(matches!(
        rx.try_recv(),
        Ok(CacheUpdate::Invalidated { .. })
    ));
}
