//! # Efiko
//!
//! A study-assistant chat backend. Efiko answers student questions with a
//! hosted generative model, grounding replies in recent conversation, in
//! web search results when a question looks time-sensitive, and in the
//! content of documents the student uploads.
//!
//! ## Architecture
//!
//! ```text
//!                ┌──────────────┐
//!   message ───▶ │ Orchestrator │──▶ needs_search? ──▶ WebSearch
//!                └──────┬───────┘──▶ IndexService (k nearest chunks)
//!                       │
//!                       ▼
//!              ContextAssembler ──▶ ModelClient ──▶ reply
//!                       ▲                             │
//!              ConversationBuffer ◀───────────────────┘
//!
//!   upload ───▶ DocumentIngestor: extract ─▶ chunk ─▶ embed ─▶ index
//!   export ───▶ ExportService: transcript ─▶ PDF
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! export GEMINI_API_KEY=...
//! efiko serve                                  # HTTP API on 127.0.0.1:8000
//! efiko chat "What is the capital of Nigeria?"
//! efiko chat "summarize the document" --document notes.pdf
//! efiko export transcript.json -o chat.pdf
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Turns, chunks and wire types |
//! | [`conversation`] | Bounded conversation buffer |
//! | [`prompt`] | Prompt assembly |
//! | [`web_search`] | Search heuristic and DuckDuckGo client |
//! | [`extract`] | PDF, DOCX and TXT text extraction |
//! | [`chunk`] | Overlapping text chunking |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`index`] | In-memory similarity index cache |
//! | [`ingest`] | Upload ingestion pipeline |
//! | [`progress`] | Ingest progress reporting |
//! | [`llm`] | Gemini model client |
//! | [`orchestrator`] | One chat turn end to end |
//! | [`session`] | Chat sessions keyed by chat id |
//! | [`export`] | Transcript PDF rendering |
//! | [`server`] | HTTP API |

pub mod chunk;
pub mod config;
pub mod conversation;
pub mod embedding;
pub mod export;
pub mod extract;
pub mod index;
pub mod ingest;
pub mod llm;
pub mod models;
pub mod orchestrator;
pub mod progress;
pub mod prompt;
pub mod server;
pub mod session;
pub mod web_search;
