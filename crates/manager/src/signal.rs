//! Wake-up plumbing between the mutation paths and the reconciliation loops.
//!
//! Each topic is a channel with a single slot. `notify` never blocks: when the
//! slot is already occupied the notification is dropped, because the consumer
//! recomputes its full output from the store on every wake-up anyway.

use std::fmt;

use tokio::sync::{mpsc, watch};
use tracing::debug;

use crate::metrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Routing tree and receivers need regenerating.
    AlertChanged,
    /// Alerting rules need regenerating.
    MetricsChanged,
}

impl Topic {
    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::AlertChanged => "alert-changed",
            Topic::MetricsChanged => "metrics-changed",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Queued,
    Coalesced,
    Closed,
}

#[derive(Clone)]
pub struct SignalBus {
    alert_tx: mpsc::Sender<()>,
    metrics_tx: mpsc::Sender<()>,
}

pub struct Subscriptions {
    pub alert_changed: Subscription,
    pub metrics_changed: Subscription,
}

pub struct Subscription {
    topic: Topic,
    rx: mpsc::Receiver<()>,
}

impl SignalBus {
    pub fn new() -> (Self, Subscriptions) {
        let (alert_tx, alert_rx) = mpsc::channel(1);
        let (metrics_tx, metrics_rx) = mpsc::channel(1);

        let bus = Self {
            alert_tx,
            metrics_tx,
        };
        let subscriptions = Subscriptions {
            alert_changed: Subscription {
                topic: Topic::AlertChanged,
                rx: alert_rx,
            },
            metrics_changed: Subscription {
                topic: Topic::MetricsChanged,
                rx: metrics_rx,
            },
        };
        (bus, subscriptions)
    }

    pub fn notify(&self, topic: Topic) -> Delivery {
        let tx = match topic {
            Topic::AlertChanged => &self.alert_tx,
            Topic::MetricsChanged => &self.metrics_tx,
        };

        match tx.try_send(()) {
            Ok(()) => {
                debug!("Queued {} notification", topic);
                Delivery::Queued
            }
            Err(mpsc::error::TrySendError::Full(())) => {
                debug!("Coalesced {} notification into pending one", topic);
                metrics::SIGNALS_COALESCED_TOTAL
                    .with_label_values(&[topic.as_str()])
                    .inc();
                Delivery::Coalesced
            }
            Err(mpsc::error::TrySendError::Closed(())) => {
                debug!("No subscriber for {} notification", topic);
                Delivery::Closed
            }
        }
    }
}

impl Subscription {
    pub fn topic(&self) -> Topic {
        self.topic
    }

    /// Waits for the next notification. `None` once every bus handle is gone.
    pub async fn recv(&mut self) -> Option<()> {
        self.rx.recv().await
    }
}

/// Owner side of the process-wide stop signal.
pub struct ShutdownHandle {
    tx: watch::Sender<bool>,
}

/// Observer side of the stop signal, one clone per loop.
#[derive(Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

pub fn shutdown_channel() -> (ShutdownHandle, Shutdown) {
    let (tx, rx) = watch::channel(false);
    (ShutdownHandle { tx }, Shutdown { rx })
}

impl ShutdownHandle {
    pub fn trigger(&self) {
        let _ = self.tx.send(true);
    }

    pub fn subscribe(&self) -> Shutdown {
        Shutdown {
            rx: self.tx.subscribe(),
        }
    }
}

impl Shutdown {
    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once shutdown is triggered or the handle is dropped.
    pub async fn wait(&mut self) {
        while !*self.rx.borrow_and_update() {
            if self.rx.changed().await.is_err() {
                return;
            }
        }
    }
}
