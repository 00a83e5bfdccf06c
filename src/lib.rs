//! # docbot
//!
//! A retrieval-augmented documentation assistant. Scrape documentation
//! pages, chunk and embed them into a local vector index, then chat with a
//! hosted model that answers from the most relevant chunks.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌────────────┐   ┌──────────────┐   ┌────────────┐
//! │ Scraper  │──▶│ Processor  │──▶│ Chunk+Embed  │──▶│   SQLite   │
//! │ urls.txt │   │ HTML/PDF   │   │  (ingest)    │   │   index    │
//! └──────────┘   └────────────┘   └──────────────┘   └─────┬──────┘
//!                                                          │
//!        ┌─────────────┐   ┌───────────┐   ┌───────────┐   │
//!        │  Chat API   │◀──│ Manager   │◀──│ Retriever │◀──┘
//!        │ (Messages)  │   │ + history │   │ + context │
//!        └─────────────┘   └───────────┘   └───────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! docbot init                 # create the index database
//! docbot scrape               # download everything in urls.txt
//! docbot ingest               # chunk, embed, and index the downloads
//! docbot query "async traits" # inspect what retrieval finds
//! docbot chat -v              # ask questions, with sources
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`error`] | Typed errors for retrieval, chat, and ingestion |
//! | [`models`] | Core data types |
//! | [`scrape`] | Rate-limited page downloader and raw cache |
//! | [`processor`] | HTML/text/PDF structure extraction |
//! | [`chunk`] | Sentence-boundary chunking with overlap |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`store`] | Vector index trait, SQLite and in-memory backends |
//! | [`ingest`] | Raw cache → index pipeline |
//! | [`retrieve`] | Query embedding and nearest-chunk search |
//! | [`context`] | Relevance filtering and context assembly |
//! | [`history`] | Bounded conversation history |
//! | [`llm`] | Chat API client |
//! | [`retry`] | Exponential backoff policy |
//! | [`chat`] | Conversation manager |
//! | [`session`] | Interactive chat loop |
//! | [`query`] | Search, listing, and statistics output |

pub mod chat;
pub mod chunk;
pub mod config;
pub mod context;
pub mod db;
pub mod embedding;
pub mod error;
pub mod history;
pub mod ingest;
pub mod llm;
pub mod logging;
pub mod migrate;
pub mod models;
pub mod processor;
pub mod progress;
pub mod query;
pub mod retrieve;
pub mod retry;
pub mod scrape;
pub mod session;
pub mod store;
