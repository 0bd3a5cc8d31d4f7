//! # tpl-analyzer
//!
//! Finds which third-party jars a compiled Java codebase actually reaches.
//!
//! ## Architecture
//!
//! - **classfile**: Static constant-pool reader that lists the classes a class file references
//! - **archive**: Memory-mapped jar reading, one decoded class per `.class` entry
//! - **scan**: Class and jar discovery with test-directory and regex filters
//! - **model** / **inventory**: Deduplicated class and archive entities plus the reference map
//! - **store**: Graph store trait and its LMDB implementation
//! - **builder**: Two-phase graph population (nodes, barrier, edges)
//! - **search**: Archive and user-class searches with depth-reducing retry, unused-archive search
//! - **results**: Chain orientation, filtering and deduplication feeding the reporters
//! - **report**: JSON, plain-text and visualization reporters
//! - **analyzer**: End-to-end build and search orchestration

pub mod analyzer;
pub mod archive;
pub mod builder;
pub mod classfile;
pub mod cli;
pub mod config;
pub mod error;
pub mod inventory;
pub mod logging;
pub mod model;
pub mod report;
pub mod results;
pub mod scan;
pub mod search;
pub mod store;

#[cfg(test)]
mod test_support;
