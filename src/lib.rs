//! sc-manifest - Structured Reader and Editor for Repo Manifests
//!
//! A repo manifest is an XML document describing the layout of a
//! multi-repository checkout: which remotes exist, which projects are
//! checked out where, default settings, and post-sync scripts. This crate
//! reads a manifest (from an explicit path or from a checkout's metadata
//! directory), exposes its elements as typed accessor objects, and writes
//! edits back to disk without disturbing untouched parts of the file.
//!
//! # Architecture
//!
//! - **dom**: format-preserving XML tree (node arena, raw-byte round-trip)
//! - **manifest**: the `Manifest` root object, element wrappers, and
//!   collection views
//! - **error**: crate-wide error enum
//! - **logging**: tracing subscriber setup
//!
//! # Attribute access
//!
//! Manifest vocabulary is attribute-shaped (`project.name`,
//! `remote.fetch`). Rust has no dynamic field interception, so attribute
//! access goes through `attr("name")` / `set_attr("name", value)` /
//! `remove_attr("name")` on [`Element`], with named convenience getters on
//! [`Project`] and [`Remote`] for the common fields.
//!
//! ```no_run
//! use sc_manifest::Manifest;
//!
//! # fn main() -> sc_manifest::Result<()> {
//! let manifest = Manifest::load("manifest.xml")?;
//! for project in manifest.projects() {
//!     println!("{} -> {}", project.name()?, project.path()?);
//! }
//! if let Some(project) = manifest.project_by_name("tools/build.git") {
//!     project.set_attr("revision", "refs/heads/main")?;
//! }
//! manifest.write()?;
//! # Ok(())
//! # }
//! ```

pub mod dom;
pub mod error;
pub mod logging;
pub mod manifest;

// Re-exports
pub use error::{ManifestError, Result};
pub use manifest::{Element, Manifest, Project, Remote};
