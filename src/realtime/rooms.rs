use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::auth::SessionIdentity;
use crate::roles::RoleRoom;

/// Room
///
/// A named delivery group. Wire form is `user:<id>`, `customer:<id>`, or one
/// of the bare role-group names (`admins`, `owners`, `managers`, `tenants`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Room {
    User(Uuid),
    Customer(Uuid),
    Role(RoleRoom),
}

impl fmt::Display for Room {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Room::User(id) => write!(f, "user:{id}"),
            Room::Customer(id) => write!(f, "customer:{id}"),
            Room::Role(role) => f.write_str(role.as_str()),
        }
    }
}

impl FromStr for Room {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        if let Some(id) = raw.strip_prefix("user:") {
            return Uuid::parse_str(id).map(Room::User).map_err(|e| e.to_string());
        }
        if let Some(id) = raw.strip_prefix("customer:") {
            return Uuid::parse_str(id).map(Room::Customer).map_err(|e| e.to_string());
        }
        RoleRoom::parse(raw)
            .map(Room::Role)
            .ok_or_else(|| format!("unknown room `{raw}`"))
    }
}

impl TryFrom<String> for Room {
    type Error = String;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        raw.parse()
    }
}

impl From<Room> for String {
    fn from(room: Room) -> Self {
        room.to_string()
    }
}

/// rooms_for
///
/// Membership is fixed at join time: the user's own room, the customer room
/// when the identity has one, and the role group. An unrecognized role joins
/// no role group.
pub fn rooms_for(identity: &SessionIdentity) -> Vec<Room> {
    let mut rooms = vec![Room::User(identity.subject_id)];
    if let Some(customer_id) = identity.customer_id {
        rooms.push(Room::Customer(customer_id));
    }
    if let Some(role) = identity.role() {
        rooms.push(Room::Role(role.room()));
    }
    rooms
}
