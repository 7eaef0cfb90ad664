mod action;
mod modules;
pub(crate) mod sandbox;

pub use action::ScriptAction;
pub use modules::{Capability, ModuleInfo, ModuleOptions, ModuleRegistry};
