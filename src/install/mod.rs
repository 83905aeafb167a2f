//! Installation layer
//!
//! Turns a catalog entry into an installed, active Xcode bundle.
//!
//! # Modules
//!
//! - [`command`]: `SystemCommand` seam for every OS utility the installer runs
//! - [`download`]: Resumable artifact download
//! - [`error`]: Error types for downloads, registry queries and installs
//! - [`installer`]: Facade composing catalog, download and pipeline
//! - [`lock`]: Advisory lock serializing installs on one host
//! - [`pipeline`]: Mount → copy → verify → license → components → symlink
//! - [`registry`]: Installed bundles discovered through Spotlight

pub mod command;
pub mod download;
pub mod error;
pub mod installer;
pub mod lock;
pub mod pipeline;
pub mod registry;
