//! Periodic expiry of lapsed reservations
//!
//! Each reservation expires in its own transaction, so stopping the sweeper
//! between ticks or mid-sweep loses at most the step in flight.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::{
    clock::Clock,
    reservations::{ReservationsService, SweepReport},
};
use crate::error::AppResult;

pub struct ExpirySweeper {
    reservations: ReservationsService,
    clock: Arc<dyn Clock>,
    interval: Duration,
}

impl ExpirySweeper {
    pub fn new(reservations: ReservationsService, clock: Arc<dyn Clock>, interval: Duration) -> Self {
        Self {
            reservations,
            clock,
            interval,
        }
    }

    pub async fn sweep_once(&self) -> AppResult<SweepReport> {
        self.reservations.expire_sweep(self.clock.now()).await
    }

    /// Sweep on every tick until `shutdown` flips to true or its sender is dropped
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!("Expiry sweeper started, interval {:?}", self.interval);

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        'ticks: loop {
            tokio::select! {
                _ = ticker.tick() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            }

            let sweep = self.sweep_once();
            tokio::pin!(sweep);
            loop {
                tokio::select! {
                    result = &mut sweep => {
                        if let Err(e) = result {
                            tracing::error!("Expiry sweep aborted: {}", e);
                        }
                        break;
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break 'ticks;
                        }
                    }
                }
            }
        }

        tracing::info!("Expiry sweeper stopped");
    }

    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }
}
