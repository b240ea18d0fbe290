//! Durable storage synchronization for research papers, analyses and notes.
//!
//! A user's GitHub repository is the system of record. A local SQLite database
//! is a disposable read cache that can be rebuilt from it at any time.
//!
//! | Direction | Entry point | Semantics |
//! |-----------|-------------|-----------|
//! | cache → remote | [`sync::SyncEngine::save_paper`] and friends, usually via [`sync::SyncQueue`] | re-read version token, write, bounded retry, then merge the manifest entry |
//! | remote → cache | [`sync::SyncEngine::hydrate`] | manifest ∪ directory listing, legacy root fallback, idempotent upserts |
//!
//! # Modules
//!
//! - [`config`]: TOML configuration and environment overrides
//! - [`db`]: SQLite open, schema, migrations, health check
//! - [`cache`]: typed cache entities and their queries
//! - [`remote`]: the remote store contract and its GitHub implementation
//! - [`layout`], [`manifest`], [`codec`]: where and how documents live remotely
//! - [`validate`]: schema gate applied before anything is persisted
//! - [`sync`]: save path, manifest update, hydration, background queue, sessions

pub mod cache;
pub mod codec;
pub mod config;
pub mod db;
pub mod error;
pub mod layout;
pub mod manifest;
pub mod remote;
pub mod sync;
pub mod validate;
