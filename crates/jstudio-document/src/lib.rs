//! The document graph: folders of typed elements owned by a node, a linear
//! undo history over structurally-shared snapshots of those folders, and
//! format detection plus the read/write transaction shape every codec in
//! `jstudio-formats` goes through.
//!
//! A concrete document type (one per supported format) is a plain struct of
//! [`Folder`] fields implementing [`CollectionHost`]; this crate supplies
//! the building blocks, not the per-format struct definitions, since the
//! folder set is fixed per format and belongs with that format's codec.

pub mod folder;
pub mod history;
pub mod import_config;
pub mod registry;

pub use folder::{AnyFolder, CollectionHost, Folder, FolderKey};
pub use history::History;
pub use import_config::{ImportConfig, MipmapPolicy};
pub use registry::{import, export, CodecMessage, DependencyResolver, FormatKind, NoDependencies, Severity, TransactionOutcome};
