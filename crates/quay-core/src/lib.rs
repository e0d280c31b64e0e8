//! Core types for the Quay database catalog.
//!
//! This crate holds the catalog and account aggregates, the event-sourced
//! entity pattern that persists them, the validation gate every mutation
//! passes through, and capability checks. It has no database or filesystem
//! dependencies; storage backends implement [`entity::EventStore`].

// Native `async fn` in traits; the store traits spell out `Send` bounds.
#![allow(async_fn_in_trait)]

pub mod access;
pub mod account;
pub mod catalog;
pub mod entity;
pub mod error;
pub mod event;
pub mod gate;
pub mod lookup;
pub mod variable;

pub use error::{Error, Result};
