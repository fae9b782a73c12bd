//! # ragchat
//!
//! A terminal client for a retrieval-augmented generation (RAG) backend:
//! chat with your documents inside a namespace, narrow answers with
//! metadata filters, and ingest new documents (pasted text or files) with
//! editable metadata.
//!
//! The state machines live in [`ragchat_core`]; this crate adds the HTTP
//! backend, the event-driven [`session::ChatSession`], and the terminal
//! surface.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐  begin/settle  ┌──────────────────┐
//! │ REPL / CLI   │──────────────▶│   ChatSession     │
//! │ (clap, stdin)│◀── updates ────│ (tokio + mpsc)    │
//! └──────────────┘                └────────┬─────────┘
//!                                          │ spawned calls
//!                                          ▼
//!                                 ┌──────────────────┐
//!                                 │   HttpBackend     │──▶ RAG service
//!                                 │   (reqwest)       │
//!                                 └──────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! ragchat health                              # is the backend up?
//! ragchat ingest --file notes.md --meta author=Alice
//! ragchat ask "What do my notes say about X?" --filter author=Alice
//! ragchat chat                                # interactive session
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`http`] | reqwest implementation of the backend contract |
//! | [`session`] | Event-driven session controller |
//! | [`repl`] | Interactive chat loop and command parser |
//! | [`ask`] | One-shot `ask` and `ingest` commands |
//! | [`stats`] | Metadata catalog and health overview |
//! | [`render`] | Terminal output |
//! | [`export`] | Transcript export |
//! | [`attachment`] | Loading files for ingestion |

pub mod ask;
pub mod attachment;
pub mod config;
pub mod export;
pub mod http;
pub mod render;
pub mod repl;
pub mod session;
pub mod stats;
