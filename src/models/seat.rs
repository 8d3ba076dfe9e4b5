use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A specific assigned seat, tied to an event and optionally to one date of
/// an event series.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Seat {
    pub id: Uuid,
    pub event_id: Uuid,
    pub subevent_id: Option<Uuid>,
    pub name: String,
    /// Blocked seats are never sold (broken chair, camera platform, ...).
    pub blocked: bool,
}
