mod device;
mod message;
mod room;
mod room_user;
mod subscription;
mod user;

pub use device::{Device, Platform, UnknownCode};
pub use message::{Message, MessagePayload, MessageRow};
pub use room::{Room, RoomType};
pub use room_user::RoomUser;
pub use subscription::Subscription;
pub use user::User;

pub const ROLE_GENERAL: i64 = 1;
pub const ROLE_ADMIN: i64 = 2;

/// Seconds since the unix epoch, the unit of every created/modified/deleted column.
pub fn now() -> i64 {
    time::OffsetDateTime::now_utc().unix_timestamp()
}

/// Entities removed or invalidated by one cascading transaction.
///
/// Handed to the fan-out adapter so push-provider state can follow the
/// already-committed datastore change.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CascadeOutcome {
    pub devices: Vec<Device>,
    pub subscriptions: Vec<Subscription>,
}

impl CascadeOutcome {
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty() && self.subscriptions.is_empty()
    }

    pub fn merge(&mut self, other: CascadeOutcome) {
        self.devices.extend(other.devices);
        self.subscriptions.extend(other.subscriptions);
    }
}
