//! In-process queue of one-shot expiry timers.
//!
//! Armed tickets sit in a min-heap keyed by end time. A single worker sleeps
//! until the earliest one is due and hands it to
//! [`ExpiryService::expire_live`], which re-reads the row, so tickets never
//! need to be cancelled. Tickets do not survive a restart; call
//! [`ExpiryQueueHandle::rearm_pending`] on startup.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sanction_common::{AppError, AppResult, Clock};
use sanction_core::{ExpiryArmer, ExpiryService, ExpiryTicket};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Longest single sleep, so a wall clock that jumps is noticed.
const MAX_SLEEP: Duration = Duration::from_secs(60);

/// Ticket ordered by end time, then by arrival.
#[derive(Debug)]
struct Pending {
    due: i64,
    seq: u64,
    ticket: ExpiryTicket,
}

impl Ord for Pending {
    fn cmp(&self, other: &Self) -> Ordering {
        self.due
            .cmp(&other.due)
            .then_with(|| self.seq.cmp(&other.seq))
    }
}

impl PartialOrd for Pending {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Eq for Pending {}

impl PartialEq for Pending {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

/// Expiry queue worker.
pub struct ExpiryQueue {
    expiry: ExpiryService,
    clock: Arc<dyn Clock>,
    rx: mpsc::UnboundedReceiver<ExpiryTicket>,
    heap: BinaryHeap<Reverse<Pending>>,
    seq: u64,
}

/// Cheap handle used to arm timers on a running [`ExpiryQueue`].
#[derive(Clone)]
pub struct ExpiryQueueHandle {
    tx: mpsc::UnboundedSender<ExpiryTicket>,
}

impl ExpiryQueue {
    /// Spawn the worker. It stops once every handle has been dropped.
    #[must_use]
    pub fn spawn(expiry: ExpiryService, clock: Arc<dyn Clock>) -> (ExpiryQueueHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let queue = Self {
            expiry,
            clock,
            rx,
            heap: BinaryHeap::new(),
            seq: 0,
        };
        let worker = tokio::spawn(queue.run());
        (ExpiryQueueHandle { tx }, worker)
    }

    async fn run(mut self) {
        loop {
            let wait = self.time_until_next();
            tokio::select! {
                received = self.rx.recv() => match received {
                    Some(ticket) => self.push(ticket),
                    None => break,
                },
                () = sleep_for(wait) => self.fire_due().await,
            }
        }
        debug!(pending = self.heap.len(), "Expiry queue stopped");
    }

    fn push(&mut self, ticket: ExpiryTicket) {
        self.seq += 1;
        debug!(subject_id = %ticket.subject_id, end_time = ticket.end_time, "Expiry timer armed");
        self.heap.push(Reverse(Pending {
            due: ticket.end_time,
            seq: self.seq,
            ticket,
        }));
    }

    fn time_until_next(&self) -> Option<Duration> {
        self.heap.peek().map(|Reverse(next)| {
            let millis = next.due.saturating_sub(self.clock.now_millis()).max(0);
            Duration::from_millis(millis as u64).min(MAX_SLEEP)
        })
    }

    async fn fire_due(&mut self) {
        let now = self.clock.now_millis();
        while self
            .heap
            .peek()
            .is_some_and(|Reverse(next)| next.due <= now)
        {
            let Some(Reverse(pending)) = self.heap.pop() else {
                break;
            };
            match self.expiry.expire_live(&pending.ticket).await {
                Ok(true) => {}
                Ok(false) => {
                    debug!(subject_id = %pending.ticket.subject_id, "Stale expiry timer ignored");
                }
                Err(e) => {
                    error!(subject_id = %pending.ticket.subject_id, error = %e, "Expiry timer failed");
                }
            }
        }
    }
}

async fn sleep_for(wait: Option<Duration>) {
    match wait {
        Some(wait) => tokio::time::sleep(wait).await,
        None => std::future::pending().await,
    }
}

impl ExpiryQueueHandle {
    /// Arm a timer for every live row that still has a finite end.
    pub async fn rearm_pending(&self, expiry: &ExpiryService) -> AppResult<usize> {
        let tickets = expiry.pending_live_expiries().await?;
        let count = tickets.len();
        for ticket in tickets {
            self.arm(ticket).await?;
        }
        info!(count, "Re-armed expiry timers");
        Ok(count)
    }
}

#[async_trait]
impl ExpiryArmer for ExpiryQueueHandle {
    async fn arm(&self, ticket: ExpiryTicket) -> AppResult<()> {
        self.tx
            .send(ticket)
            .map_err(|e| AppError::Queue(format!("expiry queue closed: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sanction_db::repositories::LiveTable;

    fn pending(due: i64, seq: u64) -> Reverse<Pending> {
        Reverse(Pending {
            due,
            seq,
            ticket: ExpiryTicket {
                table: LiveTable::Mute,
                subject_id: format!("subject-{seq}"),
                end_time: due,
            },
        })
    }

    #[test]
    fn test_heap_pops_earliest_then_oldest() {
        let mut heap = BinaryHeap::new();
        heap.push(pending(300, 1));
        heap.push(pending(100, 2));
        heap.push(pending(100, 3));
        heap.push(pending(200, 4));

        let order: Vec<u64> = std::iter::from_fn(|| heap.pop().map(|Reverse(p)| p.seq)).collect();
        assert_eq!(order, vec![2, 3, 4, 1]);
    }
}
