//! Periodic expiry sweep for baskets past their `expires_at`.
//!
//! The sweep is uncoordinated with request traffic: `ExpireBasket` is an
//! idempotent no-op on already-terminal baskets, and a version race simply
//! retries against rehydrated state.

use std::sync::{Arc, mpsc};
use std::thread;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use tracing::{debug, info, warn};

use lastbasket_baskets::{BASKET_AGGREGATE_TYPE, Basket, BasketCommand, BasketId, ExpireBasket};
use lastbasket_discovery::BasketReadModel;
use lastbasket_events::{EventBus, EventEnvelope};

use crate::command_dispatcher::CommandDispatcher;
use crate::event_store::EventStore;
use crate::projections::BasketDirectoryProjection;
use crate::read_model::ReadStore;

/// Handle to a running sweeper thread.
#[derive(Debug)]
pub struct SweeperHandle {
    shutdown: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<()>>,
}

impl SweeperHandle {
    /// Request graceful shutdown and wait for the thread to stop.
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

/// Scans the basket directory and expires overdue baskets through the
/// regular command pipeline.
pub struct ExpirySweeper<S, B, R>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
    R: ReadStore<BasketId, BasketReadModel>,
{
    dispatcher: Arc<CommandDispatcher<S, B>>,
    directory: Arc<BasketDirectoryProjection<R>>,
}

impl<S, B, R> ExpirySweeper<S, B, R>
where
    S: EventStore + 'static,
    B: EventBus<EventEnvelope<JsonValue>> + 'static,
    R: ReadStore<BasketId, BasketReadModel> + 'static,
{
    pub fn new(
        dispatcher: Arc<CommandDispatcher<S, B>>,
        directory: Arc<BasketDirectoryProjection<R>>,
    ) -> Self {
        Self {
            dispatcher,
            directory,
        }
    }

    /// One sweep pass. Returns how many baskets were expired.
    pub fn run_once(&self, now: DateTime<Utc>) -> usize {
        let mut expired = 0;
        for row in self.directory.list() {
            if row.status.is_terminal() || now < row.expires_at {
                continue;
            }

            let command = BasketCommand::Expire(ExpireBasket { occurred_at: now });
            match self.dispatcher.dispatch_retrying(
                row.basket_id,
                BASKET_AGGREGATE_TYPE,
                &command,
                Basket::empty,
            ) {
                Ok(committed) if !committed.is_empty() => {
                    debug!(basket_id = %row.basket_id, "basket expired by sweep");
                    expired += 1;
                }
                Ok(_) => {} // already terminal by the time we got there
                Err(err) => {
                    warn!(basket_id = %row.basket_id, error = %err, "expiry sweep failed for basket");
                }
            }
        }
        expired
    }

    /// Spawn the sweep loop in a background thread.
    pub fn spawn(self, interval: Duration) -> SweeperHandle {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

        let join = thread::Builder::new()
            .name("expiry-sweeper".to_string())
            .spawn(move || {
                info!(interval_secs = interval.as_secs(), "expiry sweeper started");
                loop {
                    match shutdown_rx.recv_timeout(interval) {
                        Err(mpsc::RecvTimeoutError::Timeout) => {
                            let expired = self.run_once(Utc::now());
                            if expired > 0 {
                                info!(expired, "expiry sweep pass finished");
                            }
                        }
                        _ => break,
                    }
                }
                info!("expiry sweeper stopped");
            })
            .expect("failed to spawn expiry sweeper thread");

        SweeperHandle {
            shutdown: shutdown_tx,
            join: Some(join),
        }
    }
}
