//! Controller wire messages.
//!
//! Controllers speak JSON text frames shaped `{"type": "<kind>", ...}`.
//! Inbound frames are parsed into [`InboundMessage`] and validated before
//! anything touches hub state; a frame that fails either step is rejected
//! with [`HubError::Malformed`].

use std::collections::HashSet;

use rackhub_core::types::{ControllerId, DoorIndex, LockerId};
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::error::HubError;

// ---------------------------------------------------------------------------
// Inbound
// ---------------------------------------------------------------------------

/// Every message a controller may send.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundMessage {
    /// Single-door registration.
    Register(SingleRegistration),
    /// Multi-door (shelf) registration.
    ShelfRegister(ShelfRegistration),
    Heartbeat(Heartbeat),
    /// Hardware status report for one door.
    Status(StatusReport),
}

/// Payload of `register`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Validate)]
pub struct SingleRegistration {
    #[validate(length(min = 1, max = 128))]
    pub controller_id: String,
    /// Locker served by this controller. Defaults to the controller id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1, max = 128))]
    pub locker_id: Option<String>,
    pub is_locked: bool,
    pub item_present: bool,
}

impl SingleRegistration {
    pub fn locker_id(&self) -> LockerId {
        LockerId::from(
            self.locker_id
                .clone()
                .unwrap_or_else(|| self.controller_id.clone()),
        )
    }
}

/// Largest number of doors one shelf controller may announce.
pub const MAX_SHELF_DOORS: usize = 256;

/// Payload of `shelf_register`.
///
/// The position of a rack in `racks` is its door index on the shelf, so a
/// shelf may list at most [`MAX_SHELF_DOORS`] racks.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Validate)]
pub struct ShelfRegistration {
    #[validate(length(min = 1, max = 128))]
    pub shelf_id: String,
    #[validate(length(min = 1, max = 256), custom(function = "unique_rack_ids"), nested)]
    pub racks: Vec<RackReport>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
}

/// One door as reported in a shelf registration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Validate)]
pub struct RackReport {
    #[validate(length(min = 1, max = 128))]
    pub rack_id: String,
    pub is_locked: bool,
    pub item_present: bool,
}

fn unique_rack_ids(racks: &[RackReport]) -> Result<(), ValidationError> {
    let mut seen = HashSet::with_capacity(racks.len());
    for rack in racks {
        if !seen.insert(rack.rack_id.as_str()) {
            let mut err = ValidationError::new("duplicate_rack_id");
            err.message = Some(format!("rack '{}' listed twice", rack.rack_id).into());
            return Err(err);
        }
    }
    Ok(())
}

/// Payload of `heartbeat`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Validate)]
pub struct Heartbeat {
    #[validate(length(min = 1, max = 128))]
    pub controller_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rssi: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uptime_secs: Option<u64>,
    /// Per-door sub-state. Entries without a `rack_id` are matched by position.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(nested)]
    pub doors: Option<Vec<DoorReport>>,
}

/// One door as reported in a heartbeat.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Validate)]
pub struct DoorReport {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1, max = 128))]
    pub rack_id: Option<String>,
    pub locked: bool,
    pub item: bool,
}

/// Payload of `status`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Validate)]
pub struct StatusReport {
    #[validate(length(min = 1, max = 128))]
    pub rack_id: String,
    pub is_locked: bool,
    pub item_present: bool,
    /// Set when the controller detected a hardware failure on this door.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fault: Option<String>,
}

impl InboundMessage {
    pub fn validate(&self) -> Result<(), HubError> {
        let result = match self {
            InboundMessage::Register(m) => m.validate(),
            InboundMessage::ShelfRegister(m) => m.validate(),
            InboundMessage::Heartbeat(m) => m.validate(),
            InboundMessage::Status(m) => m.validate(),
        };
        result.map_err(|e| HubError::Malformed(e.to_string()))
    }
}

/// Parse and validate one inbound text frame.
pub fn parse_inbound(text: &str) -> Result<InboundMessage, HubError> {
    let message: InboundMessage =
        serde_json::from_str(text).map_err(|e| HubError::Malformed(e.to_string()))?;
    message.validate()?;
    Ok(message)
}

// ---------------------------------------------------------------------------
// Outbound
// ---------------------------------------------------------------------------

/// Lock command verbs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    Lock,
    Unlock,
}

impl Command {
    pub fn as_str(self) -> &'static str {
        match self {
            Command::Lock => "lock",
            Command::Unlock => "unlock",
        }
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Every message the hub sends to a controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    /// Registration accepted.
    Registered {
        controller_id: ControllerId,
        lockers: Vec<LockerId>,
    },
    Lock {
        rack_id: LockerId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        door_index: Option<DoorIndex>,
    },
    Unlock {
        rack_id: LockerId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        door_index: Option<DoorIndex>,
    },
}

impl OutboundMessage {
    pub fn command(command: Command, rack_id: LockerId, door_index: Option<DoorIndex>) -> Self {
        match command {
            Command::Lock => OutboundMessage::Lock { rack_id, door_index },
            Command::Unlock => OutboundMessage::Unlock { rack_id, door_index },
        }
    }

    pub fn to_json(&self) -> String {
        // Serializing these variants cannot fail: every field is a string,
        // integer or list of strings.
        serde_json::to_string(self).unwrap_or_default()
    }
}
