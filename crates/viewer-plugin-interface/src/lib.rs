//! Shared contract between the viewer host and viewer implementations.
//!
//! Viewer implementations and their optional dependency managers implement the
//! traits in this crate. The host never reaches into an implementation beyond
//! these traits, so implementations can live in separate crates.

pub mod dependency;
pub mod props;
pub mod viewer;
pub mod version;

pub use dependency::{DependencyManager, DependencyModule};
pub use props::{PropsError, ViewerMode, ViewerProps};
pub use viewer::{MountedView, NoopCallbacks, ViewerCallbacks, ViewerContext, ViewerImplementation};
pub use version::{is_version_compatible, INTERFACE_VERSION};
