//! # logsift
//!
//! Fleet kernel-log triage. Agents ship new `dmesg` lines to a central
//! collector, which asks an LLM whether anything looks wrong and keeps a
//! record of every delta it receives, whether or not analysis succeeded.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐  POST /ingest  ┌───────────┐   ┌──────────────────┐
//! │  agent   │───────────────▶│ collector │──▶│ fallback chain   │
//! │ (dmesg)  │   Bearer auth  │  (axum)   │   │ endpoint 1..N    │
//! └──────────┘                └─────┬─────┘   └──────────────────┘
//!                                   │ always
//!                                   ▼
//!                             ┌──────────┐      ┌──────────────┐
//!                             │  SQLite  │◀─────│ logsift CLI  │
//!                             │ results  │      │ results/stats│
//!                             └──────────┘      └──────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! logsift init                  # create database
//! logsift serve                 # run the collector
//! logsift agent                 # run on each host
//! logsift problems --limit 10   # recent non-ok results
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Deltas, analysis results, stored records |
//! | [`error`] | Provider and analysis error taxonomy |
//! | [`provider`] | One attempt against one inference endpoint |
//! | [`coordinator`] | Ordered fallback across endpoints |
//! | [`ingest`] | `POST /ingest` handler |
//! | [`server`] | Router, health check, serve loop |
//! | [`store`] | Result store trait with SQLite and in-memory backends |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema creation |
//! | [`report`] | Operator queries printed by the CLI |
//! | [`agent`] | Collection loop that posts deltas |
//! | [`dmesg`] | Kernel ring buffer parsing |
//! | [`state`] | Agent high-water mark file |
//! | [`logging`] | tracing subscriber setup |

pub mod agent;
pub mod config;
pub mod coordinator;
pub mod db;
pub mod dmesg;
pub mod error;
pub mod ingest;
pub mod logging;
pub mod migrate;
pub mod models;
pub mod provider;
pub mod report;
pub mod server;
pub mod state;
pub mod store;
