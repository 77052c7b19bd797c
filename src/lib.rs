//! # Headline Archiver
//!
//! A polling crawl-and-archive daemon for financial news headlines.
//!
//! Every cycle the archiver reads a headline listing, records each new
//! headline once (deduplicated by a hash of its normalized title), fetches
//! the full article through a rendered-page strategy with a syndication-feed
//! fallback, writes it as a Markdown file and indexes it in SQLite. Old
//! records are swept after a configurable retention window.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────────┐   ┌───────────────┐
//! │  Listing    │──▶│   Archive loop   │──▶│ SQLite        │
//! │  (Finviz)   │   │ dedup · limiter  │   │ headlines     │
//! └─────────────┘   └───────┬──────────┘   └──────┬────────┘
//!                           ▼                     │
//!               ┌───────────────────────┐         │
//!               │ render ──▶ feed       │         │
//!               │ (strategy A, then B)  │         │
//!               └──────────┬────────────┘         │
//!                          ▼                      ▼
//!                  ┌──────────────┐       ┌──────────────┐
//!                  │ Markdown     │       │ list · stats │
//!                  │ content dir  │       │ export       │
//!                  └──────────────┘       └──────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! harc init                     # create database and content dir
//! harc run                      # archive until Ctrl-C
//! harc list --titles-only       # last 12 hours of headlines
//! harc stats
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`error`] | Error kinds |
//! | [`archive`] | The crawl cycle and daemon loop |
//! | [`traits`] | Listing and content strategy seams |
//! | [`shutdown`] | Cooperative shutdown signal |
//! | [`dedup`] | Title normalization, content hash, seen set |
//! | [`rate_limit`] | Per-domain request spacing |
//! | [`connector_listing`] | Headline listing parser |
//! | [`connector_render`] | Rendered page strategy |
//! | [`connector_feed`] | Syndication feed strategy |
//! | [`extract`] | HTML to Markdown, quality checks |
//! | [`fetch`] | Shared HTTP client |
//! | [`content`] | Content file naming and atomic writes |
//! | [`retention`] | Retention sweep |
//! | [`store`] | Record store trait, SQLite and in-memory backends |
//! | [`query`] | Read-only listing |
//! | [`stats`] | Archive statistics |
//! | [`export`] | JSON export |
//! | [`sources`] | Configured sources overview |
//! | [`logging`] | Log output setup |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod archive;
pub mod config;
pub mod connector_feed;
pub mod connector_listing;
pub mod connector_render;
pub mod content;
pub mod db;
pub mod dedup;
pub mod error;
pub mod export;
pub mod extract;
pub mod fetch;
pub mod logging;
pub mod migrate;
pub mod models;
pub mod query;
pub mod rate_limit;
pub mod retention;
pub mod shutdown;
pub mod sources;
pub mod stats;
pub mod store;
pub mod traits;
