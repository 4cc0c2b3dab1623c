//! SQLite-backed device and flow rule store
//!
//! Enums are stored as their canonical text, match details as JSON and
//! timestamps as RFC 3339 text.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use tracing::{debug, info, warn};

use nbi_core::{ConnectionStatus, DeviceStatus, ManagementProtocol, OsType, Vendor};

use crate::device::{DeviceRecord, InterfaceRecord};
use crate::error::{Result, StoreError};
use crate::flow::{FlowDirection, FlowFilter, FlowKey, FlowRule, FlowStatus};
use crate::metrics::{record_store_error, OperationTimer};
use crate::store::{DeviceStore, FlowStore};

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open a store. URL format: `sqlite://nbi.db?mode=rwc` or `sqlite::memory:`
    pub async fn new(url: &str) -> Result<Self> {
        info!("Initializing SQLite store: {}", url);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(url)
            .await?;

        let store = Self { pool };
        store.initialize_schema().await?;
        Ok(store)
    }

    /// Private in-memory database. One connection, so every query sees the
    /// same database.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        let store = Self { pool };
        store.initialize_schema().await?;
        Ok(store)
    }

    async fn initialize_schema(&self) -> Result<()> {
        debug!("Initializing database schema");

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS devices (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                node_id TEXT UNIQUE,
                vendor TEXT NOT NULL,
                os_type TEXT,
                management_protocol TEXT NOT NULL,
                ip_address TEXT,
                netconf_host TEXT,
                netconf_port INTEGER NOT NULL,
                netconf_username TEXT,
                netconf_password TEXT,
                datapath_id TEXT,
                mounted INTEGER NOT NULL DEFAULT 0,
                connection_status TEXT NOT NULL,
                mount_error TEXT,
                status TEXT NOT NULL,
                last_synced_at TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS interfaces (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                device_id INTEGER NOT NULL REFERENCES devices(id) ON DELETE CASCADE,
                name TEXT NOT NULL,
                port_number INTEGER,
                mac_address TEXT,
                tp_id TEXT,
                status TEXT NOT NULL,
                UNIQUE (device_id, name)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS flow_rules (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                flow_id TEXT NOT NULL,
                node_id TEXT NOT NULL,
                table_id INTEGER NOT NULL,
                flow_type TEXT NOT NULL,
                priority INTEGER NOT NULL,
                bidirectional INTEGER NOT NULL DEFAULT 0,
                pair_flow_id TEXT,
                direction TEXT,
                match_details TEXT NOT NULL,
                status TEXT NOT NULL,
                error_message TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE (node_id, flow_id, table_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_flow_rules_status ON flow_rules(node_id, status)")
            .execute(&self.pool)
            .await?;

        debug!("Database schema initialized");
        Ok(())
    }
}

const DEVICE_COLUMNS: &str = "id, name, node_id, vendor, os_type, management_protocol, ip_address, \
    netconf_host, netconf_port, netconf_username, netconf_password, datapath_id, mounted, \
    connection_status, mount_error, status, last_synced_at";

const INTERFACE_COLUMNS: &str = "id, device_id, name, port_number, mac_address, tp_id, status";

const FLOW_COLUMNS: &str = "id, flow_id, node_id, table_id, priority, bidirectional, pair_flow_id, \
    direction, match_details, status, error_message, created_at, updated_at";

#[async_trait]
impl DeviceStore for SqliteStore {
    async fn create_device(&self, device: &DeviceRecord) -> Result<DeviceRecord> {
        let _timer = OperationTimer::new("create_device");

        let result = sqlx::query(
            r#"
            INSERT INTO devices (name, node_id, vendor, os_type, management_protocol, ip_address,
                netconf_host, netconf_port, netconf_username, netconf_password, datapath_id,
                mounted, connection_status, mount_error, status, last_synced_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&device.name)
        .bind(&device.node_id)
        .bind(device.vendor.as_str())
        .bind(device.os_type.map(|os| os.as_str()))
        .bind(device.management_protocol.as_str())
        .bind(&device.ip_address)
        .bind(&device.netconf_host)
        .bind(i64::from(device.netconf_port))
        .bind(&device.netconf_username)
        .bind(&device.netconf_password)
        .bind(&device.datapath_id)
        .bind(device.mounted)
        .bind(device.connection_status.as_str())
        .bind(&device.mount_error)
        .bind(device.status.as_str())
        .bind(device.last_synced_at.map(|t| t.to_rfc3339()))
        .execute(&self.pool)
        .await
        .map_err(|e| unique_conflict(e, "create_device", &device.name))?;

        let mut stored = device.clone();
        stored.id = result.last_insert_rowid();
        debug!("Created device {} (id {})", stored.name, stored.id);
        Ok(stored)
    }

    async fn get_device(&self, id: i64) -> Result<Option<DeviceRecord>> {
        let row = sqlx::query(&format!("SELECT {} FROM devices WHERE id = ?", DEVICE_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| row_to_device(&r)).transpose()
    }

    async fn find_device_by_node_id(&self, node_id: &str) -> Result<Option<DeviceRecord>> {
        let row = sqlx::query(&format!("SELECT {} FROM devices WHERE node_id = ?", DEVICE_COLUMNS))
            .bind(node_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| row_to_device(&r)).transpose()
    }

    async fn list_devices(&self, protocol: Option<ManagementProtocol>) -> Result<Vec<DeviceRecord>> {
        let rows = match protocol {
            Some(protocol) => {
                sqlx::query(&format!(
                    "SELECT {} FROM devices WHERE management_protocol = ? ORDER BY id",
                    DEVICE_COLUMNS
                ))
                .bind(protocol.as_str())
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(&format!("SELECT {} FROM devices ORDER BY id", DEVICE_COLUMNS))
                    .fetch_all(&self.pool)
                    .await?
            }
        };
        rows.iter().map(row_to_device).collect()
    }

    async fn update_device(&self, device: &DeviceRecord) -> Result<()> {
        let _timer = OperationTimer::new("update_device");

        let result = sqlx::query(
            r#"
            UPDATE devices
            SET name = ?, node_id = ?, vendor = ?, os_type = ?, management_protocol = ?,
                ip_address = ?, netconf_host = ?, netconf_port = ?, netconf_username = ?,
                netconf_password = ?, datapath_id = ?, mounted = ?, connection_status = ?,
                mount_error = ?, status = ?, last_synced_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&device.name)
        .bind(&device.node_id)
        .bind(device.vendor.as_str())
        .bind(device.os_type.map(|os| os.as_str()))
        .bind(device.management_protocol.as_str())
        .bind(&device.ip_address)
        .bind(&device.netconf_host)
        .bind(i64::from(device.netconf_port))
        .bind(&device.netconf_username)
        .bind(&device.netconf_password)
        .bind(&device.datapath_id)
        .bind(device.mounted)
        .bind(device.connection_status.as_str())
        .bind(&device.mount_error)
        .bind(device.status.as_str())
        .bind(device.last_synced_at.map(|t| t.to_rfc3339()))
        .bind(device.id)
        .execute(&self.pool)
        .await
        .map_err(|e| unique_conflict(e, "update_device", &device.name))?;

        if result.rows_affected() == 0 {
            warn!("Device {} not found for update", device.id);
            return Err(StoreError::NotFound(format!("device {}", device.id)));
        }
        Ok(())
    }

    async fn upsert_interface(&self, interface: &InterfaceRecord) -> Result<InterfaceRecord> {
        let _timer = OperationTimer::new("upsert_interface");

        sqlx::query(
            r#"
            INSERT INTO interfaces (device_id, name, port_number, mac_address, tp_id, status)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(device_id, name) DO UPDATE SET
                port_number = excluded.port_number,
                mac_address = COALESCE(excluded.mac_address, interfaces.mac_address),
                tp_id = COALESCE(excluded.tp_id, interfaces.tp_id),
                status = excluded.status
            "#,
        )
        .bind(interface.device_id)
        .bind(&interface.name)
        .bind(interface.port_number.map(i64::from))
        .bind(&interface.mac_address)
        .bind(&interface.tp_id)
        .bind(&interface.status)
        .execute(&self.pool)
        .await?;

        self.find_interface(interface.device_id, &interface.name)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("interface {}", interface.name)))
    }

    async fn list_interfaces(&self, device_id: i64) -> Result<Vec<InterfaceRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM interfaces WHERE device_id = ? ORDER BY name",
            INTERFACE_COLUMNS
        ))
        .bind(device_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_interface).collect()
    }

    async fn find_interface(&self, device_id: i64, name: &str) -> Result<Option<InterfaceRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM interfaces WHERE device_id = ? AND name = ?",
            INTERFACE_COLUMNS
        ))
        .bind(device_id)
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| row_to_interface(&r)).transpose()
    }
}

#[async_trait]
impl FlowStore for SqliteStore {
    async fn upsert_flow(&self, rule: &FlowRule) -> Result<FlowRule> {
        let _timer = OperationTimer::new("upsert_flow");
        let details = serde_json::to_string(&rule.match_details)?;

        sqlx::query(
            r#"
            INSERT INTO flow_rules (flow_id, node_id, table_id, flow_type, priority, bidirectional,
                pair_flow_id, direction, match_details, status, error_message, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(node_id, flow_id, table_id) DO UPDATE SET
                flow_type = excluded.flow_type,
                priority = excluded.priority,
                bidirectional = excluded.bidirectional,
                pair_flow_id = excluded.pair_flow_id,
                direction = excluded.direction,
                match_details = excluded.match_details,
                status = excluded.status,
                error_message = excluded.error_message,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&rule.flow_id)
        .bind(&rule.node_id)
        .bind(i64::from(rule.table_id))
        .bind(rule.flow_type())
        .bind(i64::from(rule.priority))
        .bind(rule.bidirectional)
        .bind(&rule.pair_flow_id)
        .bind(rule.direction.map(|d| d.as_str()))
        .bind(&details)
        .bind(rule.status.as_str())
        .bind(&rule.error_message)
        .bind(rule.created_at.to_rfc3339())
        .bind(rule.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            record_store_error("upsert_flow");
            StoreError::from(e)
        })?;

        debug!("Upserted flow {} as {}", rule.key(), rule.status);
        self.get_flow(&rule.key())
            .await?
            .ok_or_else(|| StoreError::NotFound(rule.key().to_string()))
    }

    async fn get_flow(&self, key: &FlowKey) -> Result<Option<FlowRule>> {
        let _timer = OperationTimer::new("get_flow");
        let row = sqlx::query(&format!(
            "SELECT {} FROM flow_rules WHERE node_id = ? AND flow_id = ? AND table_id = ?",
            FLOW_COLUMNS
        ))
        .bind(&key.node_id)
        .bind(&key.flow_id)
        .bind(i64::from(key.table_id))
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| row_to_flow(&r)).transpose()
    }

    async fn list_flows(&self, filter: &FlowFilter) -> Result<Vec<FlowRule>> {
        let _timer = OperationTimer::new("list_flows");

        // NULL parameters disable their condition
        let rows = sqlx::query(&format!(
            r#"
            SELECT {} FROM flow_rules
            WHERE (?1 IS NULL OR node_id = ?1)
              AND (?2 IS NULL OR table_id = ?2)
              AND (?3 IS NULL OR status = ?3)
            ORDER BY node_id, table_id, flow_id
            "#,
            FLOW_COLUMNS
        ))
        .bind(filter.node_id.as_deref())
        .bind(filter.table_id.map(i64::from))
        .bind(filter.status.map(|s| s.as_str()))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_flow).collect()
    }

    async fn set_flow_status(
        &self,
        key: &FlowKey,
        status: FlowStatus,
        error: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let _timer = OperationTimer::new("set_flow_status");
        let result = sqlx::query(
            r#"
            UPDATE flow_rules SET status = ?, error_message = ?, updated_at = ?
            WHERE node_id = ? AND flow_id = ? AND table_id = ?
            "#,
        )
        .bind(status.as_str())
        .bind(error)
        .bind(at.to_rfc3339())
        .bind(&key.node_id)
        .bind(&key.flow_id)
        .bind(i64::from(key.table_id))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(key.to_string()));
        }
        debug!("Flow {} -> {}", key, status);
        Ok(())
    }

    async fn delete_flow(&self, key: &FlowKey) -> Result<bool> {
        let _timer = OperationTimer::new("delete_flow");
        let result = sqlx::query(
            "DELETE FROM flow_rules WHERE node_id = ? AND flow_id = ? AND table_id = ?",
        )
        .bind(&key.node_id)
        .bind(&key.flow_id)
        .bind(i64::from(key.table_id))
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn mark_table_deleted(&self, node_id: &str, table_id: u32, at: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE flow_rules SET status = 'DELETED', updated_at = ?
            WHERE node_id = ? AND table_id = ? AND status != 'DELETED'
            "#,
        )
        .bind(at.to_rfc3339())
        .bind(node_id)
        .bind(i64::from(table_id))
        .execute(&self.pool)
        .await?;

        let count = result.rows_affected();
        info!("Marked {} flows deleted on {} table {}", count, node_id, table_id);
        Ok(count)
    }
}

fn unique_conflict(err: sqlx::Error, operation: &'static str, what: &str) -> StoreError {
    record_store_error(operation);
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            StoreError::Conflict(format!("{} already exists", what))
        }
        _ => StoreError::Database(err),
    }
}

fn parse<T: std::str::FromStr>(value: &str, what: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| StoreError::InvalidRecord(format!("{} '{}'", what, value)))
}

fn parse_time(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| StoreError::InvalidRecord(format!("timestamp '{}'", value)))
}

fn to_u32(value: i64, what: &str) -> Result<u32> {
    u32::try_from(value).map_err(|_| StoreError::InvalidRecord(format!("{} {}", what, value)))
}

fn row_to_device(row: &SqliteRow) -> Result<DeviceRecord> {
    let vendor: String = row.get("vendor");
    let os_type: Option<String> = row.get("os_type");
    let protocol: String = row.get("management_protocol");
    let connection: String = row.get("connection_status");
    let status: String = row.get("status");
    let port: i64 = row.get("netconf_port");
    let last_synced: Option<String> = row.get("last_synced_at");

    Ok(DeviceRecord {
        id: row.get("id"),
        name: row.get("name"),
        node_id: row.get("node_id"),
        vendor: parse::<Vendor>(&vendor, "vendor")?,
        os_type: os_type.map(|os| parse::<OsType>(&os, "os_type")).transpose()?,
        management_protocol: parse::<ManagementProtocol>(&protocol, "management_protocol")?,
        ip_address: row.get("ip_address"),
        netconf_host: row.get("netconf_host"),
        netconf_port: u16::try_from(port)
            .map_err(|_| StoreError::InvalidRecord(format!("netconf_port {}", port)))?,
        netconf_username: row.get("netconf_username"),
        netconf_password: row.get("netconf_password"),
        datapath_id: row.get("datapath_id"),
        mounted: row.get("mounted"),
        connection_status: ConnectionStatus::from_controller(&connection),
        mount_error: row.get("mount_error"),
        status: parse::<DeviceStatus>(&status, "status")?,
        last_synced_at: last_synced.as_deref().map(parse_time).transpose()?,
    })
}

fn row_to_interface(row: &SqliteRow) -> Result<InterfaceRecord> {
    let port: Option<i64> = row.get("port_number");
    Ok(InterfaceRecord {
        id: row.get("id"),
        device_id: row.get("device_id"),
        name: row.get("name"),
        port_number: port.map(|p| to_u32(p, "port_number")).transpose()?,
        mac_address: row.get("mac_address"),
        tp_id: row.get("tp_id"),
        status: row.get("status"),
    })
}

fn row_to_flow(row: &SqliteRow) -> Result<FlowRule> {
    let details: String = row.get("match_details");
    let status: String = row.get("status");
    let direction: Option<String> = row.get("direction");
    let created_at: String = row.get("created_at");
    let updated_at: String = row.get("updated_at");

    Ok(FlowRule {
        id: row.get("id"),
        flow_id: row.get("flow_id"),
        node_id: row.get("node_id"),
        table_id: to_u32(row.get("table_id"), "table_id")?,
        priority: to_u32(row.get("priority"), "priority")?,
        bidirectional: row.get("bidirectional"),
        pair_flow_id: row.get("pair_flow_id"),
        direction: direction.map(|d| d.parse::<FlowDirection>()).transpose()?,
        match_details: serde_json::from_str(&details)?,
        status: status.parse::<FlowStatus>()?,
        error_message: row.get("error_message"),
        created_at: parse_time(&created_at)?,
        updated_at: parse_time(&updated_at)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::FlowMatchDetails;

    fn rule(flow_id: &str, status: FlowStatus) -> FlowRule {
        let mut rule = FlowRule::new(
            FlowKey::new("openflow:1", flow_id, 0),
            500,
            FlowMatchDetails::BaseConnectivity { in_port: 1, out_port: 2 },
            Utc::now(),
        );
        rule.status = status;
        rule
    }

    #[tokio::test]
    async fn test_device_round_trip() {
        let store = SqliteStore::in_memory().await.unwrap();

        let device = DeviceRecord::new("core-1", Vendor::Huawei, ManagementProtocol::Netconf)
            .with_node_id("core-1")
            .with_ip("10.0.0.1")
            .with_credentials("admin", "secret");
        let created = store.create_device(&device).await.unwrap();
        assert!(created.id > 0);

        let mut found = store.find_device_by_node_id("core-1").await.unwrap().unwrap();
        assert_eq!(found.vendor, Vendor::Huawei);
        assert_eq!(found.netconf_port, 830);

        found.apply_connection(ConnectionStatus::Connected, Utc::now());
        store.update_device(&found).await.unwrap();
        let reread = store.get_device(created.id).await.unwrap().unwrap();
        assert_eq!(reread.status, DeviceStatus::Online);
        assert!(reread.last_synced_at.is_some());
    }

    #[tokio::test]
    async fn test_duplicate_node_id_conflicts() {
        let store = SqliteStore::in_memory().await.unwrap();
        let device = DeviceRecord::new("a", Vendor::Cisco, ManagementProtocol::Netconf).with_node_id("n1");
        store.create_device(&device).await.unwrap();
        let err = store.create_device(&device).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_interface_upsert_keeps_one_row() {
        let store = SqliteStore::in_memory().await.unwrap();
        let device = store
            .create_device(&DeviceRecord::new("s1", Vendor::OpenFlow, ManagementProtocol::Openflow))
            .await
            .unwrap();

        store
            .upsert_interface(&InterfaceRecord::new(device.id, "eth1"))
            .await
            .unwrap();
        let updated = store
            .upsert_interface(&InterfaceRecord::new(device.id, "eth1").with_port(1))
            .await
            .unwrap();
        assert_eq!(updated.port_number, Some(1));
        assert_eq!(store.list_interfaces(device.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_flow_upsert_is_last_writer_wins() {
        let store = SqliteStore::in_memory().await.unwrap();
        store.upsert_flow(&rule("f1", FlowStatus::Pending)).await.unwrap();
        let second = store.upsert_flow(&rule("f1", FlowStatus::Failed)).await.unwrap();
        assert_eq!(second.status, FlowStatus::Failed);

        let all = store.list_flows(&FlowFilter::default()).await.unwrap();
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn test_flow_filters_and_status() {
        let store = SqliteStore::in_memory().await.unwrap();
        store.upsert_flow(&rule("a", FlowStatus::Active)).await.unwrap();
        store.upsert_flow(&rule("b", FlowStatus::Failed)).await.unwrap();

        let active = store
            .list_flows(&FlowFilter::node("openflow:1").status(FlowStatus::Active))
            .await
            .unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].flow_id, "a");

        let key = FlowKey::new("openflow:1", "b", 0);
        store.set_flow_status(&key, FlowStatus::Pending, None, Utc::now()).await.unwrap();
        assert_eq!(store.get_flow(&key).await.unwrap().unwrap().status, FlowStatus::Pending);

        let missing = FlowKey::new("openflow:1", "zzz", 0);
        assert!(matches!(
            store.set_flow_status(&missing, FlowStatus::Active, None, Utc::now()).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_mark_table_deleted() {
        let store = SqliteStore::in_memory().await.unwrap();
        store.upsert_flow(&rule("a", FlowStatus::Active)).await.unwrap();
        store.upsert_flow(&rule("b", FlowStatus::Deleted)).await.unwrap();
        let at = Utc::now() + chrono::Duration::hours(1);
        assert_eq!(store.mark_table_deleted("openflow:1", 0, at).await.unwrap(), 1);
        let a = store.get_flow(&FlowKey::new("openflow:1", "a", 0)).await.unwrap().unwrap();
        assert_eq!(a.updated_at.timestamp(), at.timestamp());
        assert!(store.delete_flow(&FlowKey::new("openflow:1", "a", 0)).await.unwrap());
        assert!(!store.delete_flow(&FlowKey::new("openflow:1", "a", 0)).await.unwrap());
    }
}
