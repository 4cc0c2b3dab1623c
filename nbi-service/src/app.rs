//! Service wiring: one controller client, one store and the services built on them

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

use nbi_core::{Clock, Settings, SystemClock};
use nbi_drivers::DriverRegistry;
use nbi_network::{
    CapabilityManager, Controller, FlowEngine, IntentService, InterfaceDiscovery, MountService,
    OdlClient, SyncService,
};
use nbi_store::{DeviceStore, FlowStore, SqliteStore};

pub struct App {
    pub store: Arc<SqliteStore>,
    pub capabilities: Arc<CapabilityManager>,
    pub mounts: Arc<MountService>,
    pub sync: SyncService,
    pub flows: FlowEngine,
    pub discovery: InterfaceDiscovery,
    pub intents: IntentService,
}

impl App {
    pub async fn connect(settings: &Settings) -> Result<Self> {
        let store = Arc::new(
            SqliteStore::new(&settings.database_url)
                .await
                .with_context(|| format!("opening {}", settings.database_url))?,
        );
        let controller: Arc<dyn Controller> = Arc::new(OdlClient::new(&settings.controller));
        info!("Controller at {}", settings.controller.base_url);
        Ok(Self::assemble(settings, store, controller))
    }

    pub fn assemble(settings: &Settings, store: Arc<SqliteStore>, controller: Arc<dyn Controller>) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let devices: Arc<dyn DeviceStore> = store.clone();
        let flow_store: Arc<dyn FlowStore> = store.clone();
        let drivers = Arc::new(DriverRegistry::with_defaults());

        let capabilities = Arc::new(
            CapabilityManager::new(controller.clone(), clock.clone(), settings.capability_poll)
                .with_diagnose_timeout(settings.diagnose_timeout),
        );
        let mounts = Arc::new(MountService::new(
            controller.clone(),
            devices.clone(),
            clock.clone(),
            settings.mount_wait,
        ));
        let intents = IntentService::new(
            controller.clone(),
            devices.clone(),
            drivers.clone(),
            mounts.clone(),
            clock.clone(),
        )
        .with_capabilities(capabilities.clone());

        Self {
            sync: SyncService::new(controller.clone(), devices.clone(), clock.clone()),
            flows: FlowEngine::new(controller.clone(), devices, flow_store, clock.clone()),
            discovery: InterfaceDiscovery::new(controller, drivers, clock, settings.discovery_ttl),
            store,
            capabilities,
            mounts,
            intents,
        }
    }
}
