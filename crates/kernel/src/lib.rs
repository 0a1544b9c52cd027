//! Shelf kernel: layered settings and the module lifecycle every feature plugs into.

pub mod module;
pub mod registry;
pub mod settings;

pub use module::{InitCtx, Migration, Module};
pub use registry::ModuleRegistry;
