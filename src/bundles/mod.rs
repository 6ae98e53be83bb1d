//! Bundles: named groups of tools triggered together

pub mod defaults;
pub mod models;
pub mod registry;
pub mod store;

pub use defaults::default_bundles;
pub use models::{Bundle, BundleConfigFile, BundleUpdate, ExecutionOrder, NewBundle};
pub use registry::BundleRegistry;
pub use store::{BundleStore, InMemoryBundleStore, JsonDirectoryStore};
