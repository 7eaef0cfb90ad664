//! CRUD lifecycle hooks.
//!
//! The host fires `items.*` events on a [`HookBus`]; the [`HookBridge`] maps them onto
//! hook-triggered workflows.

mod bridge;
mod bus;

pub use bridge::{HookBridge, apply};
pub use bus::{AFTER_SUFFIX, BEFORE_ACTIONS, HookBus, HookEvent, HookHandler, MemHookBus};
