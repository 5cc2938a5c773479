//! figcache: directory watching plus the path and render-model caches of a
//! plotting workspace.

pub mod cache;
pub mod cli;
pub mod config;
pub mod context;
pub mod logging;
pub mod model;
pub mod watcher;
pub mod workspace;

pub use cache::{Category, ExtensionClassifier, FileClassifier, PathCache, TrackedPath};
pub use config::Settings;
pub use context::{ContextHandle, MainContext};
pub use model::ModelCache;
pub use watcher::{ChangeBatch, ChangeEvent, ChangeKind, ChangeListener, WatchService};
pub use workspace::Workspace;
