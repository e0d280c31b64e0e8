//! The validate-before-mutate gate.
//!
//! Every state-changing operation on an aggregate routes its input through a
//! [`Gate`]. A gate only moves forward, `Init → Valid → Ready`: validation
//! runs at most once, and the effect runs at most once, strictly after
//! validation has succeeded. Calling into a gate that is already `Ready` is
//! free and runs nothing.

use std::future::Future;

use crate::{Error, Result};

/// A shape or invariant check over an operation's input.
pub trait Validate {
  fn validate(&self) -> Result<()>;
}

/// The externally visible position of a [`Gate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
  Init,
  Valid,
  Ready,
}

enum Stage<T> {
  Init(T),
  /// Validation ran and failed; the message is re-reported without
  /// re-running it.
  Rejected(String),
  Valid(T),
  Ready,
}

/// Holds an operation's input until it has been validated and consumed by
/// exactly one effect.
pub struct Gate<T> {
  stage: Stage<T>,
}

impl<T: Validate> Gate<T> {
  pub fn new(subject: T) -> Self {
    Self { stage: Stage::Init(subject) }
  }

  pub fn state(&self) -> GateState {
    match self.stage {
      Stage::Init(_) | Stage::Rejected(_) => GateState::Init,
      Stage::Valid(_) => GateState::Valid,
      Stage::Ready => GateState::Ready,
    }
  }

  /// Advance to `Valid`, running validation if it has not run yet.
  pub fn mark_valid(&mut self) -> Result<()> {
    match std::mem::replace(&mut self.stage, Stage::Ready) {
      Stage::Init(subject) => match subject.validate() {
        Ok(()) => {
          self.stage = Stage::Valid(subject);
          Ok(())
        }
        Err(err) => {
          let message = match err {
            Error::Validation(message) => message,
            other => other.to_string(),
          };
          self.stage = Stage::Rejected(message.clone());
          Err(Error::Validation(message))
        }
      },
      Stage::Rejected(message) => {
        self.stage = Stage::Rejected(message.clone());
        Err(Error::Validation(message))
      }
      other => {
        self.stage = other;
        Ok(())
      }
    }
  }

  /// Advance to `Ready`, running `effect` on the validated subject.
  ///
  /// Returns `Ok(None)` if the gate was already `Ready`.
  pub fn mark_ready<R>(&mut self, effect: impl FnOnce(T) -> R) -> Result<Option<R>> {
    self.mark_valid()?;
    match std::mem::replace(&mut self.stage, Stage::Ready) {
      Stage::Valid(subject) => Ok(Some(effect(subject))),
      other => {
        self.stage = other;
        Ok(None)
      }
    }
  }

  /// Asynchronous form of [`Gate::mark_ready`] for effects that touch a
  /// store.
  pub async fn mark_ready_async<F, Fut, R, E>(&mut self, effect: F) -> Result<Option<R>, E>
  where
    F: FnOnce(T) -> Fut,
    Fut: Future<Output = Result<R, E>>,
    E: From<Error>,
  {
    self.mark_valid()?;
    match std::mem::replace(&mut self.stage, Stage::Ready) {
      Stage::Valid(subject) => effect(subject).await.map(Some),
      other => {
        self.stage = other;
        Ok(None)
      }
    }
  }

  /// Validate and run `effect` on a gate that has not been used yet.
  pub async fn run<F, Fut, R, E>(mut self, effect: F) -> Result<R, E>
  where
    F: FnOnce(T) -> Fut,
    Fut: Future<Output = Result<R, E>>,
    E: From<Error>,
  {
    match self.mark_ready_async(effect).await? {
      Some(out) => Ok(out),
      None => Err(Error::Validation("gate was already consumed".into()).into()),
    }
  }

  /// Validate and hand the subject back without running an effect.
  pub fn into_valid(mut self) -> Result<T> {
    self.mark_valid()?;
    match self.stage {
      Stage::Valid(subject) => Ok(subject),
      _ => Err(Error::Validation("gate was already consumed".into())),
    }
  }
}
