//! Types for routing inbound push-notification payloads.

use serde::Serialize;

/// Receives the work a push payload asks for.
///
/// Implementors are called on whatever thread delivered the payload and
/// should hand anything slow to a session rather than doing it inline.
pub trait PushHandler {
    /// Messages addressed to the game known to the server as `connname`.
    fn process_game_msgs(&self, connname: &str, msgs: Vec<Vec<u8>>);

    /// Messages addressed to this device rather than to one game.
    fn process_dev_msgs(&self, msgs: Vec<Vec<u8>>);

    fn check_versions(&self);

    /// Poll the relay for moves that may be waiting.
    fn fetch_moves(&self);

    /// Reconnect to the MQTT broker.
    fn mqtt_wakeup(&self);

    fn post_notification(&self, title: &str, teaser: &str, msg: &str);
}

/// One handler entry point a payload reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PushRoute {
    GameMsgs,
    DevMsgs,
    CheckVersions,
    FetchMoves,
    MqttWakeup,
    Notification,
}

/// What routing a payload did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PushOutcome {
    /// Payload dropped unread because push is switched off.
    pub ignored: bool,
    /// Routes taken, in the order they fired
    pub routed: Vec<PushRoute>,
    /// Parts of the payload that couldn't be decoded
    pub errors: Vec<String>,
}

impl PushOutcome {
    pub fn fired(&self, route: PushRoute) -> bool {
        self.routed.contains(&route)
    }
}
