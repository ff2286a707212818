//! Core types for the Switchboard synchronization layer.
//!
//! This crate defines the pieces every Switchboard process shares:
//!
//! - [`events::types`] — the bus channels, typed payloads and the JSON
//!   envelope that travels over the wire
//! - [`events::broadcaster`] — the in-process fan-out point that bridges
//!   the wire to local handlers
//! - [`events::hooks`] / [`events::registry`] — the handler registry: every
//!   reaction to a bus event is a statically-constructed hook registered
//!   explicitly at startup, dispatched with error and panic isolation
//!
//! Processes that only publish (route handlers, the platform worker) depend
//! on this crate alone; the store, cache and gateway live in
//! `switchboard-server`.

pub mod events;

pub use events::broadcaster::EventBroadcaster;
pub use events::hooks::{HookError, SyncHook};
pub use events::registry::{HookDispatcher, HookRegistry};
pub use events::types::{
    BusChannel, CommandExecuted, CommandOutcome, ConfigUpdate, EnvelopeError, ModuleToggle,
    PermissionRevoked, ReceivedEvent, SyncEvent, TenantReload, epoch_ms_now,
};
