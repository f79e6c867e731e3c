//! SQLite durable store for mirrored documents.
//!
//! This crate is the durable half of vellum's two-tier publication system.
//! It holds, per tracked document: the sync record (validators, reprocess
//! flag, live cache generation), the last fetched raw bytes, and the
//! sharded rendered output — plus the singleton global checkpoint.
//!
//! # Consistency
//! Two writes are transactional because the publish protocol depends on it:
//! a rendered head and its overflow parts always land together, and a sync
//! record lands together with its raw bytes. Everything else is a plain
//! single-record write. Cross-document ordering is not this crate's
//! problem; each document's key space is disjoint.

mod db;
pub mod error;
pub mod models;
mod repo;

pub use crate::db::Database;
pub use crate::repo::Repository;
