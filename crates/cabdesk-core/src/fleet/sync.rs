//! ============================================================================
//! Fleet Sync - Pull fleet vehicles from the CRM into listing cards
//! ============================================================================

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::catalog::to_listing;
use crate::config::SyncConfig;
use crate::crm::CrmService;
use crate::rpc::RpcError;
use crate::types::VehicleListing;

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("No vehicles found in the CRM fleet")]
    NoVehicles,

    #[error("Fleet sync failed: {0}")]
    Transport(#[from] RpcError),
}

/// Result of a successful sync
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FleetSnapshot {
    pub vehicles: Vec<VehicleListing>,
    pub count: usize,
    pub synced_at: DateTime<Utc>,
}

/// Fleet sync coordinator. Clones share the last-sync time.
#[derive(Clone)]
pub struct FleetSync {
    crm: CrmService,
    config: SyncConfig,
    last_sync: Arc<Mutex<Option<Instant>>>,
}

impl FleetSync {
    /// A zero interval falls back to the default; tokio intervals need a
    /// non-zero period.
    pub fn new(crm: CrmService, mut config: SyncConfig) -> Self {
        if config.interval.is_zero() {
            warn!("Fleet sync interval of zero replaced by the default");
            config.interval = SyncConfig::default().interval;
        }
        Self {
            crm,
            config,
            last_sync: Arc::new(Mutex::new(None)),
        }
    }

    pub fn interval(&self) -> Duration {
        self.config.interval
    }

    /// Pull the fleet once and map it to listings
    pub async fn sync_once(&self) -> Result<FleetSnapshot, SyncError> {
        info!("Syncing vehicles from CRM fleet...");

        let vehicles = self.crm.list_available_vehicles(None).await?;
        if vehicles.is_empty() {
            warn!("No vehicles found in CRM fleet");
            return Err(SyncError::NoVehicles);
        }

        let listings: Vec<VehicleListing> = vehicles.iter().map(to_listing).collect();
        self.mark_synced();

        info!("Fleet sync complete: {} vehicles", listings.len());
        Ok(FleetSnapshot {
            count: listings.len(),
            vehicles: listings,
            synced_at: Utc::now(),
        })
    }

    /// True when no sync succeeded yet or the interval has elapsed since
    pub fn should_sync(&self) -> bool {
        match *self.lock_last_sync() {
            None => true,
            Some(at) => at.elapsed() >= self.config.interval,
        }
    }

    /// Sync now if due, then every interval until the handle is aborted.
    /// `callback` sees every outcome, failures included.
    pub fn start_auto_sync<F>(&self, mut callback: F) -> JoinHandle<()>
    where
        F: FnMut(Result<FleetSnapshot, SyncError>) + Send + 'static,
    {
        let sync = self.clone();
        let period = self.config.interval;

        tokio::spawn(async move {
            if sync.should_sync() {
                callback(sync.sync_once().await);
            } else {
                debug!("Skipping initial fleet sync, last sync is recent");
            }

            let mut ticker = time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                callback(sync.sync_once().await);
            }
        })
    }

    fn mark_synced(&self) {
        *self.lock_last_sync() = Some(Instant::now());
    }

    fn lock_last_sync(&self) -> std::sync::MutexGuard<'_, Option<Instant>> {
        self.last_sync.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Synced listings on success, `local` otherwise
pub fn merge_with_fallback(
    result: Result<FleetSnapshot, SyncError>,
    local: Vec<VehicleListing>,
) -> Vec<VehicleListing> {
    match result {
        Ok(snapshot) => snapshot.vehicles,
        Err(e) => {
            warn!("Using local vehicle data: {}", e);
            local
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crm::models;
    use crate::testing::{mount_auth, mount_call, rpc_error, rpc_result, test_config};
    use serde_json::json;
    use tokio::sync::mpsc;
    use wiremock::MockServer;

    async fn fleet_server(vehicles: serde_json::Value) -> MockServer {
        let server = MockServer::start().await;
        mount_auth(&server, "tok").await;
        mount_call(&server, models::FLEET_VEHICLE, "search_read", rpc_result(vehicles)).await;
        server
    }

    fn coordinator(server: &MockServer, interval: Duration) -> FleetSync {
        FleetSync::new(
            CrmService::new(test_config(&server.uri())),
            SyncConfig { interval },
        )
    }

    fn two_vehicles() -> serde_json::Value {
        json!([
            {"id": 1, "name": "RJ14 A", "model_id": [3, "Toyota Innova"], "license_plate": "RJ14 A",
             "state_id": [1, "Available"], "location": "Jaipur"},
            {"id": 2, "name": "RJ14 B", "model_id": [4, "Maruti Alto"], "license_plate": false,
             "state_id": false, "location": false}
        ])
    }

    #[tokio::test]
    async fn test_sync_once_maps_vehicles() {
        let server = fleet_server(two_vehicles()).await;
        let sync = coordinator(&server, Duration::from_secs(1800));
        assert!(sync.should_sync());

        let snapshot = sync.sync_once().await.unwrap();
        assert_eq!(snapshot.count, 2);
        assert_eq!(snapshot.vehicles[0].seats, 7);
        assert_eq!(snapshot.vehicles[1].price, 12);
        assert!(!sync.should_sync(), "fresh sync is not due again");
    }

    #[tokio::test]
    async fn test_empty_fleet_is_no_vehicles() {
        let server = fleet_server(json!([])).await;
        let sync = coordinator(&server, Duration::from_secs(1800));

        assert!(matches!(sync.sync_once().await, Err(SyncError::NoVehicles)));
        assert!(sync.should_sync(), "failed sync does not count");
    }

    #[tokio::test]
    async fn test_remote_failure_is_transport_error() {
        let server = MockServer::start().await;
        mount_auth(&server, "tok").await;
        mount_call(
            &server,
            models::FLEET_VEHICLE,
            "search_read",
            rpc_error(200, "Odoo Server Error", Some("Object fleet.vehicle doesn't exist")),
        )
        .await;
        let sync = coordinator(&server, Duration::from_secs(1800));

        let result = sync.sync_once().await;
        assert!(matches!(result, Err(SyncError::Transport(_))));

        let local = vec![to_listing(&crate::types::FleetVehicle {
            id: 99,
            name: "local".to_string(),
            model_id: None,
            license_plate: None,
            state_id: None,
            location: None,
        })];
        let merged = merge_with_fallback(result, local.clone());
        assert_eq!(merged, local);
    }

    #[tokio::test]
    async fn test_auto_sync_runs_now_and_on_interval() {
        let server = fleet_server(two_vehicles()).await;
        let sync = coordinator(&server, Duration::from_millis(100));
        let (tx, mut rx) = mpsc::unbounded_channel();

        let handle = sync.start_auto_sync(move |result| {
            let _ = tx.send(result.map(|s| s.count));
        });

        for _ in 0..2 {
            let outcome = time::timeout(Duration::from_secs(5), rx.recv())
                .await
                .expect("sync callback")
                .expect("channel open");
            assert_eq!(outcome.unwrap(), 2);
        }
        handle.abort();
    }

    #[tokio::test]
    async fn test_auto_sync_keeps_running_after_failures() {
        let server = fleet_server(json!([])).await;
        let sync = coordinator(&server, Duration::from_millis(50));
        let (tx, mut rx) = mpsc::unbounded_channel();

        let handle = sync.start_auto_sync(move |result| {
            let _ = tx.send(result);
        });

        for _ in 0..3 {
            let outcome = time::timeout(Duration::from_secs(5), rx.recv())
                .await
                .expect("sync callback")
                .expect("channel open");
            assert!(matches!(outcome, Err(SyncError::NoVehicles)), "got {:?}", outcome);
        }
        assert!(!handle.is_finished(), "timer task survives failed syncs");
        handle.abort();
    }

    #[tokio::test]
    async fn test_zero_interval_falls_back_to_default() {
        let server = fleet_server(two_vehicles()).await;
        let sync = coordinator(&server, Duration::ZERO);
        assert_eq!(sync.interval(), SyncConfig::default().interval);

        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = sync.start_auto_sync(move |result| {
            let _ = tx.send(result.map(|s| s.count));
        });
        let first = time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("initial sync")
            .expect("channel open");
        assert_eq!(first.unwrap(), 2);
        assert!(!handle.is_finished());
        handle.abort();
    }

    #[tokio::test]
    async fn test_auto_sync_skips_initial_run_when_recent() {
        let server = fleet_server(two_vehicles()).await;
        let sync = coordinator(&server, Duration::from_secs(3600));
        sync.sync_once().await.unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel::<usize>();
        let handle = sync.start_auto_sync(move |result| {
            let _ = tx.send(result.map(|s| s.count).unwrap_or(0));
        });

        let waited = time::timeout(Duration::from_millis(200), rx.recv()).await;
        assert!(waited.is_err(), "no callback before the interval elapses");
        handle.abort();
    }
}
