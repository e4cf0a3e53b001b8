//! # Pledge Tracker
//!
//! Extracts policy commitments from government-response documents with a
//! language-model oracle and tracks their fulfillment over time.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐   ┌──────────────────┐   ┌─────────┐   ┌──────────┐
//! │ Documents │──▶│ Segment+Extract  │──▶│  Dedup  │──▶│  SQLite  │
//! │  (JSON)   │   │   (oracle)       │   │         │   │  store   │
//! └─────┬─────┘   └──────────────────┘   └─────────┘   └────┬─────┘
//!       │                                                   │
//!       │         ┌──────────────────┐                      │
//!       └────────▶│ Screen → Verify  │─────────────────────▶│
//!                 │   (oracle)       │                      ▼
//!                 └──────────────────┘            ┌────────────────────┐
//!                                                 │ records + index    │
//!                                                 └────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! pledge init                       # create database
//! pledge extract                    # find commitments in new documents
//! pledge track                      # match documents to open commitments
//! pledge sweep                      # mark overdue / quiet commitments
//! pledge export && pledge index     # write records and the index
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Error taxonomy |
//! | [`models`] | Core data types |
//! | [`segment`] | Sliding-window segmenter |
//! | [`identity`] | Deterministic ids |
//! | [`oracle`] | Language-model oracle, retry and timeout |
//! | [`extract`] | Commitment extraction |
//! | [`similarity`] | Title similarity and union-find |
//! | [`dedup`] | Canonicalization and compaction |
//! | [`store`] | Commitment repository |
//! | [`tracker`] | Screen/verify tracking and date sweep |
//! | [`checkpoint`] | Resumable runs |
//! | [`pipeline`] | Run orchestration |
//! | [`record`] | Markdown record format |
//! | [`index`] | Index read model |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod checkpoint;
pub mod config;
pub mod db;
pub mod dedup;
pub mod documents;
pub mod error;
pub mod export;
pub mod extract;
pub mod get;
pub mod identity;
pub mod index;
pub mod migrate;
pub mod models;
pub mod oracle;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod record;
pub mod segment;
pub mod similarity;
pub mod stats;
pub mod store;
pub mod tracker;
