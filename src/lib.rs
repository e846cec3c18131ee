//! # Report Analyst
//!
//! Retrieval-augmented analysis of blood test reports.
//!
//! A PDF report is split into overlapping text segments, embedded, and
//! indexed in memory for that one request. Four agent steps (verifier,
//! doctor, nutritionist, exercise physiologist) each search the report and
//! ask a language model for their part of the analysis. Requests run on a
//! background worker pool; status and results are kept in SQLite and served
//! over HTTP.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌────────────────────┐   ┌──────────────┐
//! │  upload  │──▶│ extract → chunk →  │──▶│ agent steps  │
//! │  (HTTP)  │   │ embed → index      │   │ + LLM        │
//! └────┬─────┘   └────────────────────┘   └──────┬───────┘
//!      │                                          │
//!      ▼                                          ▼
//! ┌──────────┐        job queue            ┌──────────────┐
//! │  SQLite  │◀────────────────────────────│   workers    │
//! └──────────┘                             └──────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! analyst init
//! analyst analyze report.pdf --query "What is my hemoglobin level?"
//! analyst serve
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`error`] | Error kinds per pipeline stage |
//! | [`extract`] | PDF page text and table rows |
//! | [`chunk`] | Overlapping text chunking |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`index`] | In-memory vector index |
//! | [`retriever`] | Per-document retrieval and the report search tool |
//! | [`llm`] | Language model clients |
//! | [`agents`] | Sequential agent orchestration |
//! | [`pipeline`] | End-to-end analysis of one report |
//! | [`store`] | Request/result persistence |
//! | [`queue`] | Background worker pool |
//! | [`server`] | HTTP server |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod agents;
pub mod chunk;
pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod extract;
mod http;
pub mod index;
pub mod llm;
pub mod migrate;
pub mod models;
pub mod pipeline;
pub mod queue;
pub mod retriever;
pub mod server;
pub mod store;
