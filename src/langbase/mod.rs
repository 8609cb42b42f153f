//! Langbase Pipes client and wire types.
//!
//! The recommendation pipeline reaches its LLM-backed collaborators
//! (forecast refinement and explanation text) through Langbase pipes.

mod client;
mod types;


pub use client::LangbaseClient;
pub use types::*;
