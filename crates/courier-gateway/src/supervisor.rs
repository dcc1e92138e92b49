use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::gateway::Gateway;

/// Intake gate consulted before every new session. Starts open; once closed
/// it stays closed for the life of the process.
#[derive(Clone, Default)]
pub struct Gate {
    closed: Arc<AtomicBool>,
}

impl Gate {
    pub fn is_open(&self) -> bool {
        !self.closed.load(Ordering::Acquire)
    }

    /// Close the gate. Returns true for the call that actually closed it.
    pub fn close(&self) -> bool {
        !self.closed.swap(true, Ordering::AcqRel)
    }
}

#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub probe_interval: Duration,
    pub probe_retries: u32,
    pub drain_poll: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            probe_interval: Duration::from_secs(5),
            probe_retries: 3,
            drain_poll: Duration::from_millis(10),
        }
    }
}

/// Why the supervisor asked the process to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shutdown {
    StoreUnreachable,
}

/// Background watchdog over the durable store.
///
/// Probes on an interval. A failed probe is re-checked `probe_retries`
/// times; only when every re-check fails is the outage confirmed, the gate
/// closed and the registry drained.
pub struct Supervisor {
    gateway: Gateway,
    config: SupervisorConfig,
}

impl Supervisor {
    pub fn new(gateway: Gateway, config: SupervisorConfig) -> Self {
        Self { gateway, config }
    }

    /// Runs until the store is confirmed unreachable and every online
    /// session has ended.
    pub async fn run(self) -> Shutdown {
        let mut interval = tokio::time::interval(self.config.probe_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            interval.tick().await;

            let Err(e) = self.gateway.store().probe().await else {
                continue;
            };
            warn!("Store probe failed: {:#}", e);

            if self.outage_confirmed().await {
                break;
            }
            info!("Store reachable again, outage alarm cancelled");
        }

        if self.gateway.gate().close() {
            error!("Store unreachable, refusing new connections");
        }
        self.drain().await;
        Shutdown::StoreUnreachable
    }

    async fn outage_confirmed(&self) -> bool {
        for attempt in 1..=self.config.probe_retries {
            match self.gateway.store().probe().await {
                Ok(()) => return false,
                Err(e) => warn!(
                    attempt,
                    retries = self.config.probe_retries,
                    "Store re-probe failed: {:#}",
                    e
                ),
            }
        }
        true
    }

    async fn drain(&self) {
        loop {
            let online = self.gateway.registry().size().await;
            if online == 0 {
                info!("All sessions drained");
                return;
            }
            debug!(online, "Waiting for sessions to end");
            tokio::time::sleep(self.config.drain_poll).await;
        }
    }
}
