//! In-memory hub routing events to connected clients.
//!
//! Connections register once and receive events through an unbounded
//! channel drained by their socket task. Rooms are plain membership sets;
//! a connection may sit in several rooms at once (a ride room plus mesh
//! rooms), while per-ride engine bookkeeping stays in the registry.

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::events::ServerEvent;
use crate::models::{ParticipantId, RoomId};

pub type EventSender = mpsc::UnboundedSender<ServerEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<ServerEvent>;

pub struct MessageHub {
    /// connection id -> outbound channel
    senders: DashMap<ParticipantId, EventSender>,
    /// room id -> member connection ids
    rooms: DashMap<RoomId, Vec<ParticipantId>>,
    /// connection id -> rooms it joined, for cleanup
    memberships: DashMap<ParticipantId, Vec<RoomId>>,
}

impl MessageHub {
    #[must_use]
    pub fn new() -> Self {
        Self {
            senders: DashMap::new(),
            rooms: DashMap::new(),
            memberships: DashMap::new(),
        }
    }

    /// Register a connection. The returned receiver is drained by the
    /// connection's socket task.
    pub fn register(&self, connection_id: ParticipantId) -> EventReceiver {
        let (tx, rx) = mpsc::unbounded_channel();
        self.senders.insert(connection_id, tx);
        rx
    }

    /// Remove a connection and every room membership it held. Returns the
    /// rooms it was in so the caller can notify remaining members.
    pub fn deregister(&self, connection_id: &ParticipantId) -> Vec<RoomId> {
        self.senders.remove(connection_id);
        let rooms = self
            .memberships
            .remove(connection_id)
            .map(|(_, rooms)| rooms)
            .unwrap_or_default();
        for room in &rooms {
            self.drop_member(room, connection_id);
        }
        rooms
    }

    /// Add a connection to a room. Joining twice is a no-op.
    pub fn join_room(&self, room: RoomId, connection_id: &ParticipantId) {
        let mut members = self.rooms.entry(room.clone()).or_default();
        if !members.contains(connection_id) {
            members.push(connection_id.clone());
        }
        drop(members);

        let mut rooms = self.memberships.entry(connection_id.clone()).or_default();
        if !rooms.contains(&room) {
            rooms.push(room);
        }
    }

    /// Remove a connection from a room. Returns `true` if the room is now
    /// empty (and has been dropped).
    pub fn leave_room(&self, room: &RoomId, connection_id: &ParticipantId) -> bool {
        if let Some(mut rooms) = self.memberships.get_mut(connection_id) {
            rooms.retain(|r| r != room);
        }
        self.drop_member(room, connection_id)
    }

    fn drop_member(&self, room: &RoomId, connection_id: &ParticipantId) -> bool {
        let mut emptied = false;
        if let Some(mut members) = self.rooms.get_mut(room) {
            members.retain(|m| m != connection_id);
            if members.is_empty() {
                drop(members);
                self.rooms.remove(room);
                emptied = true;
                debug!(room = %room, "room has no more members, removed");
            }
        }
        emptied
    }

    /// Rooms a connection is currently a member of.
    #[must_use]
    pub fn rooms_of(&self, connection_id: &ParticipantId) -> Vec<RoomId> {
        self.memberships
            .get(connection_id)
            .map(|rooms| rooms.clone())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn member_count(&self, room: &RoomId) -> usize {
        self.rooms.get(room).map_or(0, |members| members.len())
    }

    #[must_use]
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.senders.len()
    }

    /// Deliver an event to one connection. Returns `false` if the
    /// connection is gone (and prunes it).
    pub fn send_to(&self, connection_id: &ParticipantId, event: ServerEvent) -> bool {
        let delivered = match self.senders.get(connection_id) {
            Some(sender) => sender.send(event).is_ok(),
            None => false,
        };
        if !delivered {
            warn!(connection_id = %connection_id, "dropping event for dead connection");
            self.deregister(connection_id);
        }
        delivered
    }

    /// Deliver an event to every member of a room. Returns the number of
    /// connections reached; dead members are pruned.
    pub fn broadcast(&self, room: &RoomId, event: &ServerEvent) -> usize {
        self.broadcast_filtered(room, None, event)
    }

    /// Deliver an event to every member of a room except `except`.
    pub fn broadcast_except(
        &self,
        room: &RoomId,
        except: &ParticipantId,
        event: &ServerEvent,
    ) -> usize {
        self.broadcast_filtered(room, Some(except), event)
    }

    fn broadcast_filtered(
        &self,
        room: &RoomId,
        except: Option<&ParticipantId>,
        event: &ServerEvent,
    ) -> usize {
        let members: Vec<ParticipantId> = match self.rooms.get(room) {
            Some(members) => members.clone(),
            None => return 0,
        };

        let mut sent = 0;
        let mut dead = Vec::new();
        for member in &members {
            if Some(member) == except {
                continue;
            }
            match self.senders.get(member) {
                Some(sender) if sender.send(event.clone()).is_ok() => sent += 1,
                _ => dead.push(member.clone()),
            }
        }

        for member in dead {
            warn!(room = %room, connection_id = %member, "pruning dead room member");
            self.deregister(&member);
        }

        debug!(room = %room, event_type = event.event_type(), sent, "room broadcast");
        sent
    }
}

impl Default for MessageHub {
    fn default() -> Self {
        Self::new()
    }
}
