//! # Universal Search
//!
//! Universal Search keeps an external full-text/faceted search index
//! consistent with a mutable content catalog, and answers search requests
//! expressed as typed text, transcribed voice, or analyzed images by
//! normalizing them into one structured query form.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌───────────────┐
//! │   Catalog    │──▶│ Synchronizer │──▶│  Search index │
//! │  (SQLite)    │   │ build+upsert │   │  (Typesense)  │
//! └──────┬───────┘   └──────────────┘   └───────┬───────┘
//!        │                                      │
//!        │ fallback                    translate│+execute
//!        ▼                                      ▼
//! ┌──────────────┐   ┌──────────────┐   ┌───────────────┐
//! │ basic_search │◀──│ SearchService│◀──│ text / voice /│
//! │ (degraded)   │   │              │   │ image queries │
//! └──────────────┘   └──────────────┘   └───────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! usearch init                      # create the catalog schema
//! usearch health                    # probe the engine and collection
//! usearch backfill                  # bulk index everything published
//! usearch search "red lamp"         # ranked search (fallback-aware)
//! usearch serve                     # HTTP query surface + resync loop
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`index`] | Search engine backends (HTTP client, in-memory) |
//! | [`schema`] | Canonical collection schema and reconciliation |
//! | [`document`] | Entity → document normalization |
//! | [`sync`] | Lifecycle-driven indexing, resync, backfill |
//! | [`scheduler`] | Debounced resync scheduling |
//! | [`query`] | Structured query validation and translation |
//! | [`search`] | Ranked execution with fallback orchestration |
//! | [`fallback`] | Degraded repository-backed search |
//! | [`ai`] | Voice/image query extraction |
//! | [`cache`] | Digest-keyed query cache |
//! | [`repository`] | Catalog access seam and SQLite adapter |
//! | [`server`] | HTTP query surface |

pub mod ai;
pub mod cache;
pub mod clock;
pub mod config;
pub mod db;
pub mod document;
pub mod error;
pub mod fallback;
pub mod index;
pub mod migrate;
pub mod models;
pub mod query;
pub mod repository;
pub mod scheduler;
pub mod schema;
pub mod search;
pub mod server;
pub mod sync;
