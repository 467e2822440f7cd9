//! Parallel unit scheduling.
//!
//! The coordinating thread owns all unit state. It dispatches ready units
//! (every dependency Built or Skipped) to a bounded rayon pool in
//! lexicographic order and then waits on a completion channel. A failed
//! unit cancels its transitive dependents before any of them starts; units
//! already running are left to finish.
//!
//! ```text
//! Pending -> Resolving -> Building -> Built | Failed
//!                     \-> Skipped
//! Pending -> Cancelled
//! ```

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{mpsc, Mutex};
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use serde::Serialize;

use crate::builder::errors::BuildError;
use crate::builder::unit::{UnitOutcome, UnitRunner};
use crate::core::UnitId;
use crate::resolver::BuildOrder;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitState {
    Pending,
    Resolving,
    Building,
    Built,
    Failed,
    Skipped,
    Cancelled,
}

impl UnitState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            UnitState::Built | UnitState::Failed | UnitState::Skipped | UnitState::Cancelled
        )
    }

    /// Whether dependents may start.
    pub fn is_success(self) -> bool {
        matches!(self, UnitState::Built | UnitState::Skipped)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            UnitState::Pending => "pending",
            UnitState::Resolving => "resolving",
            UnitState::Building => "building",
            UnitState::Built => "built",
            UnitState::Failed => "failed",
            UnitState::Skipped => "skipped",
            UnitState::Cancelled => "cancelled",
        }
    }
}

/// One terminal state reached by a unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerEntry {
    pub unit: UnitId,
    pub state: UnitState,
    #[serde(rename = "duration_ms", serialize_with = "as_millis")]
    pub duration: Duration,
}

fn as_millis<S: serde::Serializer>(d: &Duration, s: S) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
}

/// Append-only record of completions, in the order they happened.
#[derive(Debug, Default)]
pub struct CompletionLedger {
    entries: Mutex<Vec<LedgerEntry>>,
}

impl CompletionLedger {
    pub fn record(&self, unit: UnitId, state: UnitState, duration: Duration) {
        let entry = LedgerEntry { unit, state, duration };
        match self.entries.lock() {
            Ok(mut entries) => entries.push(entry),
            Err(poisoned) => poisoned.into_inner().push(entry),
        }
    }

    pub fn into_entries(self) -> Vec<LedgerEntry> {
        match self.entries.into_inner() {
            Ok(entries) => entries,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Outcome of a whole build.
#[derive(Debug)]
pub struct BuildReport {
    /// Final state of every unit in the order.
    pub states: BTreeMap<UnitId, UnitState>,
    pub ledger: Vec<LedgerEntry>,
    /// Errors of failed units, in completion order.
    pub errors: Vec<(UnitId, BuildError)>,
    pub duration: Duration,
}

impl BuildReport {
    pub fn success(&self) -> bool {
        self.errors.is_empty() && self.states.values().all(|s| s.is_success())
    }

    pub fn count(&self, state: UnitState) -> usize {
        self.states.values().filter(|s| **s == state).count()
    }

    pub fn state(&self, id: &UnitId) -> Option<UnitState> {
        self.states.get(id).copied()
    }
}

/// Progress notifications, delivered on the coordinating thread.
#[derive(Debug)]
pub enum UnitEvent<'a> {
    Started(&'a UnitId),
    Building(&'a UnitId),
    Finished {
        unit: &'a UnitId,
        state: UnitState,
        duration: Duration,
    },
    Failed {
        unit: &'a UnitId,
        error: &'a BuildError,
        duration: Duration,
    },
    Cancelled {
        unit: &'a UnitId,
        cause: &'a UnitId,
    },
}

enum Message {
    Building(usize),
    Finished(usize, std::result::Result<UnitOutcome, BuildError>, Duration),
}

pub struct Scheduler {
    jobs: usize,
}

impl Scheduler {
    /// `jobs` bounds the number of units built at once; 0 means one per CPU.
    pub fn new(jobs: usize) -> Self {
        Scheduler { jobs }
    }

    pub fn run<R: UnitRunner>(
        &self,
        order: &BuildOrder,
        runner: &R,
        on_event: &mut dyn FnMut(UnitEvent<'_>),
    ) -> Result<BuildReport> {
        let start = Instant::now();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.jobs)
            .thread_name(|i| format!("suitebuild-worker-{}", i))
            .build()
            .context("failed to start worker pool")?;

        let units = order.units();
        let index: BTreeMap<&UnitId, usize> = units.iter().enumerate().map(|(i, u)| (&u.id, i)).collect();

        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); units.len()];
        let mut waiting: Vec<usize> = vec![0; units.len()];
        for (i, unit) in units.iter().enumerate() {
            for dep in &unit.deps {
                let d = *index
                    .get(dep)
                    .ok_or_else(|| anyhow!("`{}` depends on `{}`, which is not in the build order", unit.id, dep))?;
                dependents[d].push(i);
                waiting[i] += 1;
            }
        }

        let mut states = vec![UnitState::Pending; units.len()];
        // Indexes follow the order, but dispatch is by id so ties are
        // broken lexicographically.
        let mut ready: BTreeSet<(&UnitId, usize)> = units
            .iter()
            .enumerate()
            .filter(|(i, _)| waiting[*i] == 0)
            .map(|(i, u)| (&u.id, i))
            .collect();

        let ledger = CompletionLedger::default();
        let mut errors = Vec::new();
        let (tx, rx) = mpsc::channel::<Message>();

        pool.in_place_scope(|scope| {
            let mut running = 0usize;
            loop {
                while let Some((id, i)) = ready.pop_first() {
                    states[i] = UnitState::Resolving;
                    on_event(UnitEvent::Started(id));
                    running += 1;

                    let unit = &units[i];
                    let tx = tx.clone();
                    let ledger = &ledger;
                    scope.spawn(move |_| {
                        let began = Instant::now();
                        let building = tx.clone();
                        let notify = move || {
                            let _ = building.send(Message::Building(i));
                        };
                        let result = catch_unwind(AssertUnwindSafe(|| runner.run(unit, &notify)))
                            .unwrap_or_else(|payload| Err(panicked(&unit.id, payload)));
                        let elapsed = began.elapsed();
                        let state = match &result {
                            Ok(UnitOutcome::Built) => UnitState::Built,
                            Ok(UnitOutcome::Skipped) => UnitState::Skipped,
                            Err(_) => UnitState::Failed,
                        };
                        ledger.record(unit.id.clone(), state, elapsed);
                        let _ = tx.send(Message::Finished(i, result, elapsed));
                    });
                }

                if running == 0 {
                    break;
                }

                let Ok(message) = rx.recv() else {
                    break;
                };
                match message {
                    Message::Building(i) => {
                        states[i] = UnitState::Building;
                        on_event(UnitEvent::Building(&units[i].id));
                    }
                    Message::Finished(i, result, duration) => {
                        running -= 1;
                        let id = &units[i].id;
                        match result {
                            Ok(outcome) => {
                                let state = match outcome {
                                    UnitOutcome::Built => UnitState::Built,
                                    UnitOutcome::Skipped => UnitState::Skipped,
                                };
                                states[i] = state;
                                on_event(UnitEvent::Finished { unit: id, state, duration });
                                for &dependent in &dependents[i] {
                                    waiting[dependent] -= 1;
                                    if waiting[dependent] == 0 && states[dependent] == UnitState::Pending {
                                        ready.insert((&units[dependent].id, dependent));
                                    }
                                }
                            }
                            Err(error) => {
                                states[i] = UnitState::Failed;
                                on_event(UnitEvent::Failed {
                                    unit: id,
                                    error: &error,
                                    duration,
                                });
                                for cancelled in cancel_dependents(i, &dependents, &mut states) {
                                    ledger.record(units[cancelled].id.clone(), UnitState::Cancelled, Duration::ZERO);
                                    on_event(UnitEvent::Cancelled {
                                        unit: &units[cancelled].id,
                                        cause: id,
                                    });
                                }
                                errors.push((id.clone(), error));
                            }
                        }
                    }
                }
            }
        });

        Ok(BuildReport {
            states: units.iter().map(|u| u.id.clone()).zip(states).collect(),
            ledger: ledger.into_entries(),
            errors,
            duration: start.elapsed(),
        })
    }
}

/// Mark every Pending transitive dependent of `failed` as Cancelled and
/// return them in breadth-first order.
fn cancel_dependents(failed: usize, dependents: &[Vec<usize>], states: &mut [UnitState]) -> Vec<usize> {
    let mut cancelled = Vec::new();
    let mut queue: VecDeque<usize> = dependents[failed].iter().copied().collect();
    while let Some(next) = queue.pop_front() {
        if states[next] != UnitState::Pending {
            continue;
        }
        states[next] = UnitState::Cancelled;
        cancelled.push(next);
        queue.extend(dependents[next].iter().copied());
    }
    cancelled
}

fn panicked(unit: &UnitId, payload: Box<dyn std::any::Any + Send>) -> BuildError {
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    BuildError::Other(anyhow!("building `{}` panicked: {}", unit, message))
}
