//! Periodic discovery cycle
//!
//! Restarts the transport's discovery primitive at a fixed interval on a
//! dedicated timer task, cancelling a pass that is still running before the
//! next one starts, and pumps transport discovery events into the registry.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use btchat_core::{
    DeviceRegistry, DiscoveryConfig, DiscoveryEvent, DiscoveryTransport, ErrorContext, EventBus,
};
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

// ----------------------------------------------------------------------------
// Discovery Cycle
// ----------------------------------------------------------------------------

/// Cancellable periodic discovery controller
pub struct DiscoveryCycle {
    transport: Arc<dyn DiscoveryTransport>,
    registry: Arc<DeviceRegistry>,
    events: EventBus,
    config: DiscoveryConfig,
    /// Whether the discovery permission is currently granted
    capability: Arc<AtomicBool>,
    timer: Mutex<Option<TimerHandle>>,
}

struct TimerHandle {
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl DiscoveryCycle {
    pub fn new(
        transport: Arc<dyn DiscoveryTransport>,
        registry: Arc<DeviceRegistry>,
        events: EventBus,
        config: DiscoveryConfig,
    ) -> Self {
        Self {
            transport,
            registry,
            events,
            config,
            capability: Arc::new(AtomicBool::new(true)),
            timer: Mutex::new(None),
        }
    }

    pub fn registry(&self) -> &Arc<DeviceRegistry> {
        &self.registry
    }

    pub fn interval(&self) -> Duration {
        self.config.interval()
    }

    pub async fn is_running(&self) -> bool {
        self.timer.lock().await.is_some()
    }

    /// Record a grant or revocation of the discovery permission
    pub fn set_capability(&self, granted: bool) {
        self.capability.store(granted, Ordering::SeqCst);
    }

    pub fn has_capability(&self) -> bool {
        self.capability.load(Ordering::SeqCst)
    }

    /// Run one pass now and arm the repeating timer. No-op while running.
    pub async fn start(&self) {
        let mut timer = self.timer.lock().await;
        if timer.is_some() {
            debug!("Discovery cycle already running");
            return;
        }

        if self.config.clear_on_start {
            self.registry.clear();
        }

        let pass = self.pass();
        pass.run().await;

        let (shutdown, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(run_timer(pass, self.config.interval(), shutdown_rx));
        *timer = Some(TimerHandle { shutdown, task });

        info!(
            "Discovery cycle started (interval {}ms)",
            self.config.interval_ms
        );
    }

    /// Disarm the timer and cancel a pass in progress. No-op while stopped.
    pub async fn stop(&self) {
        let Some(handle) = self.timer.lock().await.take() else {
            return;
        };

        let _ = handle.shutdown.send(());
        if let Err(e) = handle.task.await {
            warn!("Discovery timer task ended abnormally: {}", e);
        }

        if self.has_capability() && self.transport.is_discovering() {
            if let Err(e) = self.transport.cancel_discovery().await {
                warn!("Failed to cancel discovery pass: {}", e);
                self.events.publish_error(ErrorContext::Discovery, &e);
            }
        }

        info!("Discovery cycle stopped");
    }

    /// Spawn the task that applies transport discovery events
    pub fn attach(&self, mut receiver: mpsc::Receiver<DiscoveryEvent>) -> JoinHandle<()> {
        let registry = Arc::clone(&self.registry);
        let capability = Arc::clone(&self.capability);

        tokio::spawn(async move {
            while let Some(event) = receiver.recv().await {
                match event {
                    DiscoveryEvent::CapabilityChanged { granted } => {
                        debug!("Discovery capability granted: {}", granted);
                        capability.store(granted, Ordering::SeqCst);
                    }
                    event => {
                        registry.apply(&event);
                    }
                }
            }
            debug!("Discovery event channel closed");
        })
    }

    fn pass(&self) -> DiscoveryPass {
        DiscoveryPass {
            transport: Arc::clone(&self.transport),
            capability: Arc::clone(&self.capability),
            events: self.events.clone(),
        }
    }
}

// ----------------------------------------------------------------------------
// Timer Task
// ----------------------------------------------------------------------------

#[derive(Clone)]
struct DiscoveryPass {
    transport: Arc<dyn DiscoveryTransport>,
    capability: Arc<AtomicBool>,
    events: EventBus,
}

impl DiscoveryPass {
    async fn run(&self) {
        if !self.capability.load(Ordering::SeqCst) {
            debug!("Discovery capability not granted, skipping pass");
            return;
        }

        // Never two concurrent scans from one controller
        if self.transport.is_discovering() {
            if let Err(e) = self.transport.cancel_discovery().await {
                warn!("Failed to cancel previous discovery pass: {}", e);
            }
        }

        match self.transport.start_discovery().await {
            Ok(()) => debug!("Discovery pass started"),
            Err(e) if e.is_capability_unavailable() => {
                debug!("Discovery unavailable, retrying next interval: {}", e);
            }
            Err(e) => {
                warn!("Failed to start discovery pass: {}", e);
                self.events.publish_error(ErrorContext::Discovery, &e);
            }
        }
    }
}

async fn run_timer(pass: DiscoveryPass, interval: Duration, mut shutdown: oneshot::Receiver<()>) {
    let mut ticker = interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = ticker.tick() => pass.run().await,
        }
    }

    debug!("Discovery timer stopped");
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MemoryDiscovery;
    use btchat_core::ChatEvent;
    use tokio::sync::broadcast::error::TryRecvError;

    const INTERVAL: Duration = Duration::from_millis(500);

    fn cycle_with(transport: Arc<MemoryDiscovery>) -> (DiscoveryCycle, EventBus) {
        let events = EventBus::new(32);
        let registry = Arc::new(DeviceRegistry::new());
        let config = DiscoveryConfig::default().with_interval(INTERVAL);
        let cycle = DiscoveryCycle::new(transport, registry, events.clone(), config);
        (cycle, events)
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    async fn tick() {
        tokio::time::advance(INTERVAL).await;
        settle().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_runs_pass_immediately() {
        let transport = Arc::new(MemoryDiscovery::new());
        let (cycle, _events) = cycle_with(Arc::clone(&transport));

        cycle.start().await;

        assert_eq!(transport.starts(), 1);
        assert!(transport.is_discovering());
        assert!(cycle.is_running().await);
        cycle.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_tick_cancels_pass_in_progress() {
        let transport = Arc::new(MemoryDiscovery::new());
        let (cycle, _events) = cycle_with(Arc::clone(&transport));

        cycle.start().await;
        tick().await;

        assert_eq!(transport.starts(), 2);
        assert_eq!(transport.cancels(), 1);
        cycle.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_tick_after_finished_pass_does_not_cancel() {
        let transport = Arc::new(MemoryDiscovery::new());
        let (cycle, _events) = cycle_with(Arc::clone(&transport));

        cycle.start().await;
        transport.finish_pass();
        tick().await;

        assert_eq!(transport.starts(), 2);
        assert_eq!(transport.cancels(), 0);
        cycle.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_is_idempotent() {
        let transport = Arc::new(MemoryDiscovery::new());
        let (cycle, _events) = cycle_with(Arc::clone(&transport));

        cycle.start().await;
        cycle.start().await;

        assert_eq!(transport.starts(), 1);
        cycle.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_unavailable_capability_retries_next_tick() {
        let transport = Arc::new(MemoryDiscovery::new());
        transport.set_available(false);
        let (cycle, events) = cycle_with(Arc::clone(&transport));
        let mut rx = events.subscribe();

        cycle.start().await;
        assert_eq!(transport.attempts(), 1);
        assert_eq!(transport.starts(), 0);
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));

        transport.set_available(true);
        tick().await;
        assert_eq!(transport.starts(), 1);
        cycle.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_revoked_capability_skips_passes() {
        let transport = Arc::new(MemoryDiscovery::new());
        let (cycle, _events) = cycle_with(Arc::clone(&transport));
        cycle.set_capability(false);

        cycle.start().await;
        tick().await;
        assert_eq!(transport.attempts(), 0);

        cycle.set_capability(true);
        tick().await;
        assert_eq!(transport.starts(), 1);
        cycle.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_disarms_timer_and_cancels_pass() {
        let transport = Arc::new(MemoryDiscovery::new());
        let (cycle, _events) = cycle_with(Arc::clone(&transport));

        cycle.start().await;
        cycle.stop().await;
        assert!(!transport.is_discovering());
        assert_eq!(transport.cancels(), 1);

        tick().await;
        tick().await;
        assert_eq!(transport.starts(), 1);
        assert!(!cycle.is_running().await);

        // Second stop is a no-op
        cycle.stop().await;
        assert_eq!(transport.cancels(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_without_capability_leaves_pass_alone() {
        let transport = Arc::new(MemoryDiscovery::new());
        let (cycle, _events) = cycle_with(Arc::clone(&transport));

        cycle.start().await;
        cycle.set_capability(false);
        cycle.stop().await;

        assert_eq!(transport.cancels(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_clears_stale_devices() {
        let transport = Arc::new(MemoryDiscovery::new());
        let (cycle, _events) = cycle_with(transport);
        cycle.registry().observe("AA:BB", Some("Old"), -70);

        cycle.start().await;

        assert!(cycle.registry().is_empty());
        cycle.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_failure_is_reported() {
        let transport = Arc::new(MemoryDiscovery::new());
        transport.fail_next_start();
        let (cycle, events) = cycle_with(Arc::clone(&transport));
        let mut rx = events.subscribe();

        cycle.start().await;

        assert!(matches!(
            rx.try_recv(),
            Ok(ChatEvent::Error {
                context: ErrorContext::Discovery,
                ..
            })
        ));
        cycle.stop().await;
    }

    #[tokio::test]
    async fn test_attached_events_reach_registry() {
        let transport = Arc::new(MemoryDiscovery::new());
        let (cycle, _events) = cycle_with(transport);
        let (tx, rx) = mpsc::channel(8);
        let pump = cycle.attach(rx);

        tx.send(DiscoveryEvent::Observed {
            address: "AA:BB".to_string(),
            name: Some("Phone".to_string()),
            rssi: -60,
        })
        .await
        .unwrap();
        tx.send(DiscoveryEvent::Observed {
            address: "AA:BB".to_string(),
            name: Some("Phone".to_string()),
            rssi: -90,
        })
        .await
        .unwrap();
        tx.send(DiscoveryEvent::Renamed {
            address: "CC:DD".to_string(),
            name: "Ghost".to_string(),
        })
        .await
        .unwrap();
        tx.send(DiscoveryEvent::CapabilityChanged { granted: false })
            .await
            .unwrap();
        drop(tx);
        pump.await.unwrap();

        let devices = cycle.registry().snapshot();
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].rssi(), -90);
        assert_eq!(devices[0].quality(), 20);
        assert!(!cycle.has_capability());
    }
}
