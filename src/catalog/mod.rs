//! Catalog layer for available Xcode releases
//!
//! This module retrieves, merges and persists the list of release builds the
//! developer portal offers.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │ AuthSession │────▶│CatalogClient│────▶│CatalogCache │
//! │  (listing)  │     │   (merge)   │     │  (storage)  │
//! └─────────────┘     └─────────────┘     └─────────────┘
//!                            ▲
//!                            │
//!                     ┌─────────────┐
//!                     │ Prerelease  │
//!                     │  (scrape)   │
//!                     └─────────────┘
//! ```
//!
//! # Modules
//!
//! - [`cache`]: SQLite-backed snapshot of the last fetched catalog
//! - [`client`]: Fetches, merges and persists the catalog
//! - [`entity`]: `VersionEntity`, one catalog entry
//! - [`error`]: Error types for session, cache and catalog operations
//! - [`listing`]: Typed deserialization of the stable download listing
//! - [`prerelease`]: Prerelease page adapter
//! - [`semver`]: Version parsing and "current" selection
//! - [`session`]: Authenticated portal session

pub mod cache;
pub mod client;
pub mod entity;
pub mod error;
pub mod listing;
pub mod prerelease;
pub mod semver;
pub mod session;
