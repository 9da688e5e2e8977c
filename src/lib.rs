//! `mailsweep`: a personal mail automation agent.
//!
//! This crate provides the core library for polling a Gmail inbox for
//! attachments, deduplicating and downloading them, summarizing their content
//! through an LLM adapter, and acting on user directives recorded in a small
//! categorization memory (e.g. printing and archiving matching files).

pub mod agent;
pub mod analyzer;
pub mod config;
pub mod directive;
pub mod error;
pub mod fingerprint;
pub mod printer;
pub mod provider;
pub mod retriever;
pub mod store;
pub mod summarizer;
