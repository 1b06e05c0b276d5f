//! Database access for rollcall-sync
//!
//! Typed row structs and queries over the shared rollcall.db schema.
//! Functions that participate in ledger transactions take a
//! `&mut SqliteConnection` so they can run on either a pool or an open
//! transaction.

pub mod attendance;
pub mod enrollment;
pub mod sessions;
pub mod students;
pub mod video_tasks;
