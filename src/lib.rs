//! Client-side viewer plugin host.
//!
//! A declarative catalog describes every viewer; the registry filters it by
//! feature flags, resolves which viewers can open a file set, and loads,
//! switches and unloads viewers so that at most one is active at a time.

pub mod builtin;
pub mod catalog;
pub mod config;
pub mod document;
pub mod features;
pub mod host;
pub mod loader;
pub mod registry;
pub mod resolver;
pub mod tracker;
pub mod utils;

pub use catalog::{Catalog, CatalogError, CatalogSource, ViewerDescriptor};
pub use features::FeatureSet;
pub use host::{HostController, HostView, ShowRequest};
pub use registry::{DependencyOutcome, LoadStatus, LoadedViewerHandle, PluginErrorKind, PluginLoadError, PluginRegistry};
pub use resolver::FileDescriptor;
