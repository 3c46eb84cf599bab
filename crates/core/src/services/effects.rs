//! Side effects collected while a cascade runs and dispatched after commit.

use tracing::warn;

use super::event_publisher::{EventPublisher, LedgerEvent};
use super::expiry::{ExpiryArmer, ExpiryTicket};
use super::hooks::{HookExecutor, HookInvocation};

/// Events, hooks and timers produced by one committed transition.
#[derive(Debug, Default)]
pub(crate) struct Effects {
    pub events: Vec<LedgerEvent>,
    pub hooks: Vec<HookInvocation>,
    pub timers: Vec<ExpiryTicket>,
}

impl Effects {
    pub fn event(&mut self, event: LedgerEvent) {
        self.events.push(event);
    }

    pub fn hook(&mut self, invocation: HookInvocation) {
        self.hooks.push(invocation);
    }

    pub fn timer(&mut self, ticket: ExpiryTicket) {
        self.timers.push(ticket);
    }

    /// Publish everything. Failures are logged; the ledger state is already
    /// committed and is not rolled back.
    pub async fn dispatch(
        self,
        events: &dyn EventPublisher,
        hooks: &dyn HookExecutor,
        expiry: &dyn ExpiryArmer,
    ) {
        for event in self.events {
            let record_id = event.record_id().to_string();
            if let Err(e) = events.publish(event).await {
                warn!(record_id = %record_id, error = %e, "Failed to publish ledger event");
            }
        }
        for ticket in self.timers {
            let subject_id = ticket.subject_id.clone();
            if let Err(e) = expiry.arm(ticket).await {
                warn!(subject_id = %subject_id, error = %e, "Failed to arm expiry timer");
            }
        }
        for invocation in self.hooks {
            let subject_id = invocation.subject_id.clone();
            if let Err(e) = hooks.execute(invocation).await {
                warn!(subject_id = %subject_id, error = %e, "Hook execution failed");
            }
        }
    }
}
