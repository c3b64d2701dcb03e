//! Routing of verified payment events to the signal counter

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::counter::SignalCounter;
use super::dedup::DeliveryLedger;
use crate::payments::event::PaymentEvent;

/// What the dispatcher did with an event. Every outcome is acknowledged to Stripe.
#[derive(Debug)]
pub enum Outcome {
    /// An increment runs detached; the handle may be dropped
    IncrementScheduled {
        project_id: String,
        task: JoinHandle<bool>,
    },
    /// Checkout completed without a project id in its metadata
    MissingProjectId,
    /// Event id was already processed
    Duplicate { event_id: String },
    /// Not an event this server acts on
    Ignored { event_type: String },
}

/// Dispatches verified events, spawning increments off the request path
#[derive(Clone)]
pub struct Dispatcher {
    counter: SignalCounter,
    ledger: Arc<DeliveryLedger>,
}

impl Dispatcher {
    pub fn new(counter: SignalCounter, ledger: Arc<DeliveryLedger>) -> Self {
        Self { counter, ledger }
    }

    pub fn dispatch(&self, event: PaymentEvent) -> Outcome {
        if !event.is_checkout_completed() {
            info!(event_type = %event.event_type, "Unhandled webhook event type");
            return Outcome::Ignored {
                event_type: event.event_type,
            };
        }

        let Some(project_id) = event.project_id().map(str::to_string) else {
            warn!(
                event_id = ?event.id,
                "checkout.session.completed received without projectId in metadata"
            );
            return Outcome::MissingProjectId;
        };

        if let Some(event_id) = &event.id {
            if !self.ledger.claim(event_id) {
                info!(
                    event_id = %event_id,
                    project_id = %project_id,
                    "Duplicate delivery skipped"
                );
                return Outcome::Duplicate {
                    event_id: event_id.clone(),
                };
            }
        }

        info!(
            event_id = ?event.id,
            project_id = %project_id,
            "Checkout completed, scheduling signal increment"
        );

        let counter = self.counter.clone();
        let ledger = self.ledger.clone();
        let event_id = event.id;
        let task_project_id = project_id.clone();
        let task = tokio::spawn(async move {
            let ok = counter.increment(&task_project_id).await;
            if !ok {
                error!(project_id = %task_project_id, "Failed to process signal count");
                // Let a manual resend of the event retry the increment
                if let Some(event_id) = event_id {
                    ledger.release(&event_id);
                }
            }
            ok
        });

        Outcome::IncrementScheduled { project_id, task }
    }
}
