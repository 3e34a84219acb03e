//! Pipeline record shapes consumed by the AI agent contracts.
//!
//! A [`Pipeline`] is a map of [`GenericNode`]s keyed by [`NodeId`]. The AI
//! contracts in the `agent` crate read and produce pipelines but never
//! interpret node semantics; execution belongs elsewhere.
//!
//! ## Architectural Layer
//!
//! **Data only.** This crate has no I/O dependencies and no behavior beyond
//! map bookkeeping.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`identifiers`] | Newtype identifiers (`NodeId`, `NodeType`) and the `string_id!` macro |
//! | [`node`] | The [`GenericNode`] record |
//! | [`graph`] | The [`Pipeline`] node map |

pub mod graph;
pub mod identifiers;
pub mod node;

// Re-export everything at the crate root for ergonomic usage by downstream crates.
pub use graph::Pipeline;
pub use identifiers::{NodeId, NodeType};
pub use node::GenericNode;
