//! # Review Harness
//!
//! A batch code-review engine: walks a project, asks an AI analysis provider
//! to review each source file, and caches the resulting insights keyed by
//! content fingerprint so unchanged files are never re-analyzed.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────┐   ┌────────────┐
//! │  Discovery  │──▶│    Batch     │──▶│  Provider  │
//! │ walk+filter │   │ N workers    │   │ OpenAI/... │
//! └─────────────┘   └──────┬───────┘   └────────────┘
//!                          │ fingerprint gate
//!                          ▼
//!                   ┌──────────────┐   ┌────────────┐
//!                   │ InsightStore │   │ Aggregate  │──▶ export / HTTP
//!                   │ json/sqlite  │   │  + summary │
//!                   └──────────────┘   └────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! rvw init                       # create the insight store
//! rvw analyze                    # review changed files under [project].root
//! rvw analyze --force --format json --output report.json
//! rvw insights src/main.rs       # show the cached review for one file
//! rvw serve                      # start the HTTP trigger
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Wire and domain types |
//! | [`hasher`] | Content fingerprints |
//! | [`discovery`] | Project walk, ignore globs, extension filter |
//! | [`store`] | Insight cache backends (memory, JSON, SQLite) |
//! | [`provider`] | Analysis provider abstraction |
//! | [`batch`] | Bounded-concurrency batch orchestration |
//! | [`aggregate`] | Outcome counting and severity summary |
//! | [`export`] | JSON / CSV / text rendering |
//! | [`progress`] | Batch progress reporting |
//! | [`insights`] | CLI view of stored insights |
//! | [`server`] | HTTP trigger |
//! | [`db`] | SQLite connection |
//! | [`migrate`] | Store initialization |

pub mod aggregate;
pub mod batch;
pub mod config;
pub mod db;
pub mod discovery;
pub mod export;
pub mod hasher;
pub mod insights;
pub mod migrate;
pub mod models;
pub mod progress;
pub mod provider;
pub mod server;
pub mod store;
