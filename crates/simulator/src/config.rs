use std::time::Duration;

use anyhow::bail;

/// Default controller endpoint of a local hub.
const DEFAULT_WS_URL: &str = "ws://127.0.0.1:3000/api/v1/ws/controller";

/// Default interval between heartbeats.
const DEFAULT_HEARTBEAT_SECS: u64 = 20;

/// Which kind of controller to impersonate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceKind {
    /// One door, identified by its locker id.
    Single { locker_id: String },
    /// A shelf driving `racks` in door-index order.
    Shelf { shelf_id: String, racks: Vec<String> },
}

#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    pub ws_url: String,
    pub kind: DeviceKind,
    pub heartbeat_interval: Duration,
    /// Initial item-sensor reading for every door.
    pub item_present: bool,
}

impl SimulatorConfig {
    /// Load configuration from environment variables.
    ///
    /// | Variable             | Default                                      |
    /// |----------------------|----------------------------------------------|
    /// | `SIM_WS_URL`         | `ws://127.0.0.1:3000/api/v1/ws/controller`   |
    /// | `SIM_LOCKER_ID`      | --  (single-door mode)                       |
    /// | `SIM_SHELF_ID`       | --  (multi-door mode, wins over locker id)   |
    /// | `SIM_RACKS`          | --  comma-separated, required with shelf id  |
    /// | `SIM_HEARTBEAT_SECS` | `20`                                         |
    /// | `SIM_ITEM_PRESENT`   | `true`                                       |
    pub fn from_env() -> anyhow::Result<Self> {
        let ws_url = std::env::var("SIM_WS_URL").unwrap_or_else(|_| DEFAULT_WS_URL.into());

        let kind = match (
            std::env::var("SIM_SHELF_ID").ok().filter(|s| !s.is_empty()),
            std::env::var("SIM_LOCKER_ID").ok().filter(|s| !s.is_empty()),
        ) {
            (Some(shelf_id), _) => {
                let racks = parse_racks(&std::env::var("SIM_RACKS").unwrap_or_default());
                if racks.is_empty() {
                    bail!("SIM_RACKS must list at least one rack with SIM_SHELF_ID");
                }
                DeviceKind::Shelf { shelf_id, racks }
            }
            (None, Some(locker_id)) => DeviceKind::Single { locker_id },
            (None, None) => bail!("set SIM_LOCKER_ID or SIM_SHELF_ID"),
        };

        let heartbeat_secs: u64 = std::env::var("SIM_HEARTBEAT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .filter(|secs| *secs > 0)
            .unwrap_or(DEFAULT_HEARTBEAT_SECS);

        let item_present = std::env::var("SIM_ITEM_PRESENT")
            .map(|v| v != "false" && v != "0")
            .unwrap_or(true);

        Ok(Self {
            ws_url,
            kind,
            heartbeat_interval: Duration::from_secs(heartbeat_secs),
            item_present,
        })
    }
}

/// Split a comma-separated rack list, dropping blanks.
pub fn parse_racks(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
