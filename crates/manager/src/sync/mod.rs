//! Background reconciliation loops.
//!
//! Every loop is a [`Synchronizer`] driven by [`SyncLoop`]: it sleeps until its
//! wake condition fires (timer tick or change notification), recomputes its
//! whole output from the store, and, when it wrote a file, asks the owning
//! backend to reload after a debounce window. A failed cycle is logged and
//! left for the next wake-up; nothing carries over between cycles.

pub mod route;
pub mod rule;
pub mod state;
pub mod target;

pub use route::RouteSynchronizer;
pub use rule::RuleSynchronizer;
pub use state::StateReconciler;
pub use target::TargetSynchronizer;

use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::{
    metrics,
    signal::{Shutdown, Subscription},
    Result,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// A configuration file was rewritten and the backend must re-read it.
    Reload,
    /// Nothing for a backend to pick up.
    Done,
}

#[async_trait]
pub trait Synchronizer: Send + Sync {
    fn name(&self) -> &'static str;

    async fn sync(&self) -> Result<Outcome>;

    async fn reload(&self) -> Result<()> {
        Ok(())
    }
}

/// What wakes a loop up.
pub enum Trigger {
    Interval(Duration),
    Signal(Subscription),
}

enum Wake {
    Tick(Interval),
    Signal(Subscription),
}

impl Wake {
    fn new(trigger: Trigger) -> Self {
        match trigger {
            Trigger::Interval(period) => {
                // First tick after one full period, like a plain ticker.
                let mut interval = interval_at(Instant::now() + period, period);
                interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                Wake::Tick(interval)
            }
            Trigger::Signal(subscription) => Wake::Signal(subscription),
        }
    }

    // false once the wake source is gone for good
    async fn next(&mut self) -> bool {
        match self {
            Wake::Tick(interval) => {
                interval.tick().await;
                true
            }
            Wake::Signal(subscription) => subscription.recv().await.is_some(),
        }
    }
}

pub struct SyncLoop<S> {
    synchronizer: S,
    trigger: Trigger,
    reload_delay: Duration,
    shutdown: Shutdown,
}

impl<S: Synchronizer> SyncLoop<S> {
    pub fn new(synchronizer: S, trigger: Trigger, reload_delay: Duration, shutdown: Shutdown) -> Self {
        Self {
            synchronizer,
            trigger,
            reload_delay,
            shutdown,
        }
    }

    pub async fn run(self) {
        let SyncLoop {
            synchronizer,
            trigger,
            reload_delay,
            mut shutdown,
        } = self;
        let name = synchronizer.name();
        let mut wake = Wake::new(trigger);

        info!("Starting {} synchronizer", name);
        loop {
            tokio::select! {
                biased;
                _ = shutdown.wait() => break,
                woke = wake.next() => {
                    if !woke {
                        info!("Wake source for {} synchronizer closed", name);
                        break;
                    }
                }
            }

            run_cycle(&synchronizer, reload_delay, &mut shutdown).await;
        }
        info!("Stopped {} synchronizer", name);
    }
}

/// Runs one sync, then the debounced reload if the sync asked for one.
pub async fn run_cycle<S: Synchronizer>(
    synchronizer: &S,
    reload_delay: Duration,
    shutdown: &mut Shutdown,
) {
    let name = synchronizer.name();

    match synchronizer.sync().await {
        Ok(Outcome::Done) => record(name, "success"),
        Ok(Outcome::Reload) => {
            if !reload_delay.is_zero() {
                tokio::select! {
                    biased;
                    _ = shutdown.wait() => {
                        debug!("Skipping {} reload, shutting down", name);
                        return;
                    }
                    _ = tokio::time::sleep(reload_delay) => {}
                }
            }
            match synchronizer.reload().await {
                Ok(()) => record(name, "success"),
                Err(e) => {
                    error!("Error occurred while reloading after {} sync: {}", name, e);
                    record(name, "reload_failure");
                }
            }
        }
        Err(e) => {
            error!("Error occurred while running {} synchronizer: {}", name, e);
            record(name, "failure");
        }
    }
}

fn record(name: &str, outcome: &str) {
    metrics::SYNC_RUNS_TOTAL
        .with_label_values(&[name, outcome])
        .inc();
}
