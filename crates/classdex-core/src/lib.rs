//! Classdex Core Components
//!
//! This crate provides the pieces shared by every classdex front end:
//! the metadata store (named multimap indices with transitive-closure
//! queries), include/exclude name filters, and on-disk configuration.

mod config;
mod error;
mod filter;
mod store;

pub use config::ClassdexConfig;
pub use error::StoreError;
pub use filter::NameFilter;
pub use store::{Backing, Index, Store};
