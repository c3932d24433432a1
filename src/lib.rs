//! # Docvec
//!
//! Semantic search and duplicate mining over technical documentation.
//!
//! Docvec extracts chunks from a DocBook XML corpus, embeds them with a
//! configurable provider, and builds a row-aligned vector index + metadata
//! snapshot. The snapshot powers filtered semantic search (CLI and HTTP)
//! and near-duplicate mining for documentation review.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────┐   ┌───────────────┐
//! │ DocBook XML │──▶│   Pipeline   │──▶│   Snapshot    │
//! │   corpus    │   │ Chunk+Embed  │   │ index + meta  │
//! └─────────────┘   └──────────────┘   └──────┬────────┘
//!                                             │
//!                        ┌────────────────────┼─────────┐
//!                        ▼                    ▼         ▼
//!                  ┌──────────┐        ┌──────────┐ ┌───────┐
//!                  │   CLI    │        │   HTTP   │ │ Dedup │
//!                  │  (dvx)   │        │ /search  │ │  CSV  │
//!                  └──────────┘        └──────────┘ └───────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! dvx build                     # extract, embed, write the snapshot
//! dvx search "rotate certificates" --product AcmeX
//! dvx dups --k 10 --threshold 0.85
//! dvx serve api                 # start the HTTP search server
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`extract`] | DocBook corpus walking and parsing |
//! | [`chunk`] | Sentence-greedy text chunking |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`index`] | Flat inner-product vector index |
//! | [`meta`] | Columnar chunk metadata store |
//! | [`snapshot`] | Index + metadata pairing and atomic swap |
//! | [`search`] | Filtered semantic search |
//! | [`dedup`] | Near-duplicate pair mining |
//! | [`ingest`] | Build pipeline orchestration |
//! | [`inspect`] | Corpus and snapshot overview |
//! | [`server`] | JSON HTTP search API |
//! | [`error`] | Error taxonomy |

pub mod chunk;
pub mod config;
pub mod dedup;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod index;
pub mod ingest;
pub mod inspect;
pub mod meta;
pub mod models;
pub mod search;
pub mod server;
pub mod snapshot;
