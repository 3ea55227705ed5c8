//! Inbox Agent: email classification, action extraction, reply drafting and
//! retrieval over a local mailbox store.

pub mod agent;
pub mod config;
pub mod email;
pub mod error;
pub mod llm;
pub mod pipeline;
pub mod rag;
pub mod routes;
pub mod store;
