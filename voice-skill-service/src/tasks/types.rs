// Context keys shared by the turn tasks
pub mod session_keys {
    pub const USER_ID: &str = "user_id";
    pub const SESSION_ID: &str = "session_id";
    pub const UTTERANCE: &str = "utterance";
    pub const RAW_UTTERANCE: &str = "raw_utterance";
    pub const INTENT: &str = "intent";
    /// Session state echoed back by the platform
    pub const INBOUND_STATE: &str = "inbound_state";
    /// Session state to hand back with this turn's reply
    pub const OUTBOUND_STATE: &str = "outbound_state";
    pub const CREDENTIALS: &str = "credentials";
}
