use uuid::Uuid;

/// An active login session bound to one account and one circuit code
#[derive(Clone, Debug, PartialEq)]
pub struct Presence {
    pub account_id: Uuid,
    /// Server-assigned handle binding transport traffic to this session
    pub circuit_code: u32,
    pub session_id: Uuid,
    pub secure_session_id: Uuid,
    /// Unix timestamp of the last keep-alive
    pub last_packet: i64,
    /// Set once the sweep decided to evict; removal happens at this time
    pub evict_at: Option<i64>,
}

impl Presence {
    pub fn new(account_id: Uuid, circuit_code: u32, now: i64) -> Self {
        Self {
            account_id,
            circuit_code,
            session_id: Uuid::new_v4(),
            secure_session_id: Uuid::new_v4(),
            last_packet: now,
            evict_at: None,
        }
    }

    pub fn ping(&mut self, now: i64) {
        self.last_packet = now;
    }

    pub fn is_pending_eviction(&self) -> bool {
        self.evict_at.is_some()
    }
}
