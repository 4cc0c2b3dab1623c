use async_trait::async_trait;
use chrono::{DateTime, Utc};

use nbi_core::ManagementProtocol;

use crate::device::{DeviceRecord, InterfaceRecord};
use crate::error::Result;
use crate::flow::{FlowFilter, FlowKey, FlowRule, FlowStatus};

/// Device records and their interface catalogue
#[async_trait]
pub trait DeviceStore: Send + Sync {
    /// Insert and return the stored record with its id
    async fn create_device(&self, device: &DeviceRecord) -> Result<DeviceRecord>;
    async fn get_device(&self, id: i64) -> Result<Option<DeviceRecord>>;
    async fn find_device_by_node_id(&self, node_id: &str) -> Result<Option<DeviceRecord>>;
    async fn list_devices(&self, protocol: Option<ManagementProtocol>) -> Result<Vec<DeviceRecord>>;
    async fn update_device(&self, device: &DeviceRecord) -> Result<()>;

    /// Insert or update by (device_id, name)
    async fn upsert_interface(&self, interface: &InterfaceRecord) -> Result<InterfaceRecord>;
    async fn list_interfaces(&self, device_id: i64) -> Result<Vec<InterfaceRecord>>;
    async fn find_interface(&self, device_id: i64, name: &str) -> Result<Option<InterfaceRecord>>;
}

/// Persisted OpenFlow rules, unique on (node_id, flow_id, table_id)
#[async_trait]
pub trait FlowStore: Send + Sync {
    /// Insert or overwrite the row for the rule's key, returning what was stored
    async fn upsert_flow(&self, rule: &FlowRule) -> Result<FlowRule>;
    async fn get_flow(&self, key: &FlowKey) -> Result<Option<FlowRule>>;
    async fn list_flows(&self, filter: &FlowFilter) -> Result<Vec<FlowRule>>;
    /// Stamps `updated_at` with `at`. Fails with `NotFound` when no row matches
    async fn set_flow_status(
        &self,
        key: &FlowKey,
        status: FlowStatus,
        error: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<()>;
    /// Returns whether a row was removed
    async fn delete_flow(&self, key: &FlowKey) -> Result<bool>;
    /// Mark every non-deleted row of a table DELETED, returning the count
    async fn mark_table_deleted(&self, node_id: &str, table_id: u32, at: DateTime<Utc>) -> Result<u64>;
}
