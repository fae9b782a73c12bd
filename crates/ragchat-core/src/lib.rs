//! # ragchat core
//!
//! Runtime-free logic for the ragchat client: the message model, session
//! identity, namespace context, metadata catalog, filter composer,
//! conversation log, ingestion workflow, and the [`Backend`](backend::Backend)
//! trait describing the RAG service's REST contract.
//!
//! This crate contains no tokio, reqwest, filesystem I/O, or terminal
//! code. Every state machine is split into a synchronous *begin* half
//! that validates input and produces a request, and a *settle* half that
//! applies the backend's answer. The application crate decides how the
//! two halves are scheduled.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`models`] | Messages and source references |
//! | [`session`] | Per-conversation session token |
//! | [`namespace`] | Active namespace |
//! | [`catalog`] | Per-namespace metadata catalog with stale-response guard |
//! | [`filters`] | Active metadata filters |
//! | [`conversation`] | Append-only conversation log and exchange state |
//! | [`ingest`] | Document ingestion draft, metadata rows, and status |
//! | [`backend`] | REST contract types, [`Backend`](backend::Backend) trait, in-memory backend |

pub mod backend;
pub mod catalog;
pub mod conversation;
pub mod filters;
pub mod ingest;
pub mod models;
pub mod namespace;
pub mod session;
