//! In-memory model of the doors a simulated controller drives.
//!
//! The device produces the frames a real controller would send and
//! reacts to `lock` / `unlock` commands by flipping the door and
//! reporting the new hardware state.

use rackhub_controllers::messages::{
    DoorReport, Heartbeat, InboundMessage, RackReport, ShelfRegistration, SingleRegistration,
    StatusReport,
};
use rackhub_controllers::OutboundMessage;
use tokio::time::Instant;

use crate::config::DeviceKind;

/// Signal strength reported in every heartbeat.
const SIMULATED_RSSI: i32 = -52;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimDoor {
    pub rack_id: String,
    pub locked: bool,
    pub item_present: bool,
}

pub struct SimulatedDevice {
    kind: DeviceKind,
    doors: Vec<SimDoor>,
    started: Instant,
}

impl SimulatedDevice {
    pub fn new(kind: DeviceKind, item_present: bool) -> Self {
        let rack_ids = match &kind {
            DeviceKind::Single { locker_id } => vec![locker_id.clone()],
            DeviceKind::Shelf { racks, .. } => racks.clone(),
        };
        let doors = rack_ids
            .into_iter()
            .map(|rack_id| SimDoor {
                rack_id,
                locked: true,
                item_present,
            })
            .collect();

        Self {
            kind,
            doors,
            started: Instant::now(),
        }
    }

    /// Identity this device registers and heartbeats under.
    pub fn controller_id(&self) -> &str {
        match &self.kind {
            DeviceKind::Single { locker_id } => locker_id,
            DeviceKind::Shelf { shelf_id, .. } => shelf_id,
        }
    }

    pub fn doors(&self) -> &[SimDoor] {
        &self.doors
    }

    /// First frame sent on every (re)connect.
    pub fn registration(&self) -> InboundMessage {
        match &self.kind {
            DeviceKind::Single { locker_id } => {
                let door = &self.doors[0];
                InboundMessage::Register(SingleRegistration {
                    controller_id: locker_id.clone(),
                    locker_id: None,
                    is_locked: door.locked,
                    item_present: door.item_present,
                })
            }
            DeviceKind::Shelf { shelf_id, .. } => InboundMessage::ShelfRegister(ShelfRegistration {
                shelf_id: shelf_id.clone(),
                racks: self
                    .doors
                    .iter()
                    .map(|d| RackReport {
                        rack_id: d.rack_id.clone(),
                        is_locked: d.locked,
                        item_present: d.item_present,
                    })
                    .collect(),
                ip: None,
            }),
        }
    }

    pub fn heartbeat(&self) -> InboundMessage {
        InboundMessage::Heartbeat(Heartbeat {
            controller_id: self.controller_id().to_string(),
            rssi: Some(SIMULATED_RSSI),
            uptime_secs: Some(self.started.elapsed().as_secs()),
            doors: Some(
                self.doors
                    .iter()
                    .map(|d| DoorReport {
                        rack_id: Some(d.rack_id.clone()),
                        locked: d.locked,
                        item: d.item_present,
                    })
                    .collect(),
            ),
        })
    }

    /// React to a hub message, returning the status report to send back.
    ///
    /// Opening a door is treated as the customer taking the item out.
    pub fn respond(&mut self, message: &OutboundMessage) -> Option<InboundMessage> {
        let (rack_id, door_index, locked) = match message {
            OutboundMessage::Registered { lockers, .. } => {
                tracing::info!(lockers = lockers.len(), "Registration acknowledged");
                return None;
            }
            OutboundMessage::Lock { rack_id, door_index } => (rack_id, door_index, true),
            OutboundMessage::Unlock { rack_id, door_index } => (rack_id, door_index, false),
        };

        let position = door_index
            .map(usize::from)
            .filter(|i| self.doors.get(*i).is_some_and(|d| d.rack_id == rack_id.as_str()))
            .or_else(|| self.doors.iter().position(|d| d.rack_id == rack_id.as_str()));
        let Some(door) = position.and_then(|i| self.doors.get_mut(i)) else {
            tracing::warn!(rack_id = %rack_id, "Command for a door this device does not drive");
            return None;
        };

        door.locked = locked;
        if !locked {
            door.item_present = false;
        }
        tracing::info!(rack_id = %rack_id, locked, "Door actuated");

        Some(InboundMessage::Status(StatusReport {
            rack_id: door.rack_id.clone(),
            is_locked: door.locked,
            item_present: door.item_present,
            fault: None,
        }))
    }
}

#[cfg(test)]
mod tests {
    use rackhub_core::types::LockerId;

    use super::*;

    fn shelf() -> SimulatedDevice {
        SimulatedDevice::new(
            DeviceKind::Shelf {
                shelf_id: "SHELF-1".into(),
                racks: vec!["A1".into(), "A2".into()],
            },
            true,
        )
    }

    #[tokio::test]
    async fn unlock_opens_the_indexed_door() {
        let mut device = shelf();
        let reply = device.respond(&OutboundMessage::Unlock {
            rack_id: LockerId::from("A2"),
            door_index: Some(1),
        });

        match reply {
            Some(InboundMessage::Status(status)) => {
                assert_eq!(status.rack_id, "A2");
                assert!(!status.is_locked);
                assert!(!status.item_present);
            }
            other => panic!("expected status, got {other:?}"),
        }
        assert!(device.doors()[0].locked);
    }

    #[tokio::test]
    async fn mismatched_index_falls_back_to_rack_id() {
        let mut device = shelf();
        device.respond(&OutboundMessage::Unlock {
            rack_id: LockerId::from("A1"),
            door_index: Some(1),
        });
        assert!(!device.doors()[0].locked);
        assert!(device.doors()[1].locked);
    }

    #[tokio::test]
    async fn unknown_rack_is_ignored() {
        let mut device = shelf();
        assert!(device
            .respond(&OutboundMessage::Lock {
                rack_id: LockerId::from("Z9"),
                door_index: None,
            })
            .is_none());
    }
}
