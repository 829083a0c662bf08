//! salesbridge: syncs sales documents from an accounting backend into a
//! CRM through a delivery worker, keeping durable progress state in a
//! versioned store.
//!
//! The pipeline is a fixed sequence of steps over a shared context:
//! read state, list candidates, select the next document, fetch it,
//! extract fields, deliver, finalize. A REST trigger runs the whole
//! sequence or, for debugging, a single step or prefix.

pub mod config;
pub mod delivery;
pub mod extract;
pub mod finalize;
pub mod logging;
pub mod pipeline;
pub mod rest;
pub mod selector;
pub mod source;
pub mod store;
