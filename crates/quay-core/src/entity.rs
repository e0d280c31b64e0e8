//! The event-sourced entity pattern shared by catalog entries and accounts.
//!
//! An aggregate lives as a snapshot row plus an append-only log of change
//! events. The snapshot's `version` is a watermark: events with a sequence
//! number above it have not been folded in yet. Loading reads the snapshot
//! and replays the tail of the log; `set` changes only append to the log.
//!
//! Folding is pure ([`Aggregate::apply`], [`replay`]); I/O goes through the
//! [`EventStore`] trait so storage backends stay out of this crate.

use std::future::Future;

use crate::{
  Error,
  event::ChangeEvent,
  gate::{Gate, Validate},
  lookup::Lookup,
};

// ─── Aggregate ───────────────────────────────────────────────────────────────

/// Outcome of folding one or more events onto a snapshot.
#[derive(Debug, Clone, PartialEq)]
pub enum Folded<A> {
  Live(A),
  /// A delete event was met; the aggregate is logically gone.
  Deleted,
}

/// A snapshot type that can be rebuilt from its change log.
pub trait Aggregate: Validate + Clone + Send + Sync + 'static {
  /// Creation input. Carries no id: the store assigns one.
  type New: Validate + Send + Sync + 'static;
  /// Optional-field delta carried by change events.
  type Patch: Validate + Clone + Default + Send + Sync + 'static;

  /// Human-readable kind, used in error messages.
  const KIND: &'static str;

  fn id(&self) -> i64;
  fn name(&self) -> &str;
  fn version(&self) -> i64;

  /// The delta that recreates this snapshot from nothing; logged as the
  /// `add` event.
  fn birth_patch(&self) -> Self::Patch;

  /// Fold a single event onto the snapshot, advancing the watermark.
  fn apply(self, event: &ChangeEvent<Self::Patch>) -> Folded<Self>;

  /// Adopt the row the store returned after a write, keeping whichever
  /// watermark is further along.
  fn merge(self, stored: Self) -> Self;
}

/// Fold every event above the snapshot's watermark, oldest first.
///
/// Folding a log in one batch or in several consecutive batches yields the
/// same result, since events at or below the watermark are skipped.
pub fn replay<A: Aggregate>(snapshot: A, events: &[ChangeEvent<A::Patch>]) -> Folded<A> {
  let mut pending: Vec<&ChangeEvent<A::Patch>> = events.iter().collect();
  pending.sort_by_key(|event| event.seq);

  let mut current = snapshot;
  for event in pending {
    if event.seq <= current.version() {
      continue;
    }
    match current.apply(event) {
      Folded::Live(next) => current = next,
      Folded::Deleted => return Folded::Deleted,
    }
  }
  Folded::Live(current)
}

// ─── Store traits ────────────────────────────────────────────────────────────

/// The store-wide event sequence.
///
/// Every change event of every aggregate kind takes its `seq` from here, so
/// the sequence is an explicit counter rather than a property of one table's
/// key generation.
pub trait EventSequence: Send + Sync {
  type Error: std::error::Error + From<Error> + Send + Sync + 'static;

  /// Reserve the next sequence number. Strictly increasing.
  fn next_seq(&self) -> impl Future<Output = Result<i64, Self::Error>> + Send + '_;
}

/// Snapshot rows and change log for one aggregate kind.
pub trait EventStore<A: Aggregate>: EventSequence {
  /// Find the snapshot by id, or by the name it currently carries once its
  /// logged renames are taken into account.
  fn find<'a>(
    &'a self,
    lookup: &'a Lookup,
  ) -> impl Future<Output = Result<Option<A>, Self::Error>> + Send + 'a;

  /// All snapshot rows, ordered by id.
  fn list(&self) -> impl Future<Output = Result<Vec<A>, Self::Error>> + Send + '_;

  /// Persist a birth snapshot with watermark 0 and return it with its
  /// generated id. A taken name is a conflict.
  fn insert<'a>(
    &'a self,
    new: &'a A::New,
  ) -> impl Future<Output = Result<A, Self::Error>> + Send + 'a;

  /// Create or replace the snapshot row, returning what was stored.
  fn upsert<'a>(
    &'a self,
    snapshot: &'a A,
  ) -> impl Future<Output = Result<A, Self::Error>> + Send + 'a;

  /// Events for `id` with `seq > after`, ascending.
  fn events_after(
    &self,
    id: i64,
    after: i64,
  ) -> impl Future<Output = Result<Vec<ChangeEvent<A::Patch>>, Self::Error>> + Send + '_;

  fn append<'a>(
    &'a self,
    event: &'a ChangeEvent<A::Patch>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Remove the snapshot row and every event for `id` in one step. Returns
  /// `false` if there was no row.
  fn purge(&self, id: i64) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;
}

// ─── Entity ──────────────────────────────────────────────────────────────────

/// An in-memory aggregate bound to the store it was loaded from.
///
/// Every operation routes its input through a [`Gate`] so validation runs
/// exactly once before any effect reaches the store.
pub struct Entity<'s, A, S> {
  store: &'s S,
  state: A,
}

impl<'s, A, S> Entity<'s, A, S>
where
  A: Aggregate,
  S: EventStore<A>,
{
  /// Wrap an existing snapshot after validating its shape.
  pub fn new(store: &'s S, state: A) -> Result<Self, S::Error> {
    let state = Gate::new(state).into_valid()?;
    Ok(Self { store, state })
  }

  /// Load the snapshot and replay its unfolded events.
  pub async fn load(store: &'s S, lookup: Lookup) -> Result<Self, S::Error> {
    let state = Gate::new(lookup)
      .run(|lookup| async move {
        let snapshot = store
          .find(&lookup)
          .await?
          .ok_or_else(|| Error::NotFound(format!("{} with {lookup}", A::KIND)))?;
        let events = store.events_after(snapshot.id(), snapshot.version()).await?;
        match replay(snapshot, &events) {
          Folded::Live(state) => Ok::<_, S::Error>(state),
          Folded::Deleted => {
            Err(Error::NotFound(format!("{} with {lookup} was deleted", A::KIND)).into())
          }
        }
      })
      .await?;
    Ok(Self { store, state })
  }

  /// Create a new aggregate: persist the birth snapshot (which assigns the
  /// id), then log the creation as the first event under that id.
  pub async fn create(store: &'s S, new: A::New) -> Result<Self, S::Error> {
    let state = Gate::new(new)
      .run(|new| async move {
        let born = store.insert(&new).await?;
        let seq = store.next_seq().await?;
        let event = ChangeEvent::add(seq, born.id(), born.birth_patch());
        store.append(&event).await?;
        match born.apply(&event) {
          Folded::Live(state) => Ok::<_, S::Error>(state),
          Folded::Deleted => {
            Err(Error::Validation(format!("{} creation folded to a delete", A::KIND)).into())
          }
        }
      })
      .await?;
    Ok(Self { store, state })
  }

  /// Append a `set` event and fold it in. The snapshot row stays a
  /// checkpoint; later loads replay this event from the log.
  pub async fn change(&mut self, patch: A::Patch) -> Result<(), S::Error> {
    let store = self.store;
    let target = self.state.id();
    let event = Gate::new(patch)
      .run(|patch| async move {
        let seq = store.next_seq().await?;
        let event = ChangeEvent::set(seq, target, patch);
        store.append(&event).await?;
        Ok::<_, S::Error>(event)
      })
      .await?;

    match self.state.clone().apply(&event) {
      Folded::Live(state) => {
        self.state = state;
        Ok(())
      }
      Folded::Deleted => {
        Err(Error::Validation(format!("{} change folded to a delete", A::KIND)).into())
      }
    }
  }

  /// Remove the snapshot and its whole history.
  pub async fn delete(self) -> Result<(), S::Error> {
    let store = self.store;
    Gate::new(Lookup::Id(self.state.id()))
      .run(|lookup| async move {
        let Lookup::Id(id) = lookup else {
          return Err(Error::Validation("delete needs an id".into()).into());
        };
        if store.purge(id).await? {
          Ok::<_, S::Error>(())
        } else {
          Err(Error::NotFound(format!("{} with id {id}", A::KIND)).into())
        }
      })
      .await
  }

  /// Write the current state back as the snapshot row, checkpointing every
  /// event folded so far.
  pub async fn save(&mut self) -> Result<(), S::Error> {
    let store = self.store;
    let stored = Gate::new(self.state.clone())
      .run(|snapshot| async move { store.upsert(&snapshot).await })
      .await?;
    self.state = self.state.clone().merge(stored);
    Ok(())
  }

  pub fn state(&self) -> &A { &self.state }

  pub fn into_state(self) -> A { self.state }
}
