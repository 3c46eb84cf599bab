//! Business logic services.

#![allow(missing_docs)]

pub mod association;
mod effects;
pub mod event_publisher;
pub mod expiry;
pub mod hooks;
pub mod ledger;
pub mod warning;

pub use association::{AssociationLink, AssociationManager, parse_associations, serialize_associations};
pub use event_publisher::{
    BroadcastEventPublisher, EventPublisher, EventPublisherService, LedgerEvent,
    NoOpEventPublisher, RecordingEventPublisher,
};
pub use expiry::{
    ExpiryArmer, ExpiryArmerService, ExpiryService, ExpiryTicket, NoOpExpiryArmer,
    RecordingExpiryArmer,
};
pub use hooks::{
    HookExecutor, HookExecutorService, HookInvocation, HookTrigger, NoOpHookExecutor,
    RecordingHookExecutor, WarningContext,
};
pub use ledger::{IssuePunishmentInput, LedgerService, RevokePunishmentInput};
pub use warning::{WarningController, WarningTarget};
