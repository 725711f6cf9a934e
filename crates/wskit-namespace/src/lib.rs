//! wskit-namespace: run one action inside another process's namespaces
//!
//! - **config**: namespace kinds and `/proc` handle paths
//! - **slots**: descriptor set and the slot table shared by parent and child
//! - **action**: actions a helper can run, and their command-line form
//! - **runner**: spawn a helper child and wait for it (parent side)
//! - **helper**: join the inherited namespaces and run the action (child side)

pub mod action;
pub mod config;
pub mod helper;
pub mod runner;
pub mod slots;

pub use action::{Action, MountAction, HELPER_SUBCOMMAND};
pub use config::{namespace_inode, shares_namespace, NamespaceKind};
pub use helper::{run_helper, HelperState};
pub use runner::NamespaceRunner;
pub use slots::{descriptor_set, DescriptorKind, DescriptorSpec, SlotTable};
