//! Routes a push payload's keys to a `PushHandler`.
//!
//! Keys are independent: a malformed `msgs64` is reported but doesn't stop
//! `getMoves` or `msg` in the same payload from being acted on.

use std::collections::HashMap;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use log::{debug, error, info};

use super::types::{PushHandler, PushOutcome, PushRoute};
use crate::configuration::config::PushConfig;
use crate::error_handling::types::PushError;

pub const DEFAULT_NOTIFICATION_TITLE: &str = "Message from the developers";

/// Flags arrive as strings; anything but a case-insensitive "true" is false.
fn flag_set(payload: &HashMap<String, String>, key: &str) -> bool {
    payload
        .get(key)
        .map(|v| v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

/// Decodes a JSON array of base64 strings. All or nothing.
pub fn decode_msgs64(value: &str) -> Result<Vec<Vec<u8>>, PushError> {
    let strs: Vec<String> =
        serde_json::from_str(value).map_err(|e| PushError::BadJson(e.to_string()))?;
    strs.iter()
        .map(|s| {
            STANDARD
                .decode(s.trim())
                .map_err(|e| PushError::BadBase64(e.to_string()))
        })
        .collect()
}

pub fn route_push(
    payload: &HashMap<String, String>,
    config: &PushConfig,
    handler: &dyn PushHandler,
) -> PushOutcome {
    let mut outcome = PushOutcome::default();
    if config.ignore_fcm {
        debug!("route_push(): ignoring payload with {} keys", payload.len());
        outcome.ignored = true;
        return outcome;
    }
    debug!("route_push(keys={:?})", payload.keys().collect::<Vec<_>>());

    if let Some(value) = payload.get("msgs64") {
        match decode_msgs64(value) {
            Ok(msgs) => {
                info!("route_push(): got {} msgs", msgs.len());
                match payload.get("connname") {
                    Some(connname) => {
                        handler.process_game_msgs(connname, msgs);
                        outcome.routed.push(PushRoute::GameMsgs);
                    }
                    None => {
                        handler.process_dev_msgs(msgs);
                        outcome.routed.push(PushRoute::DevMsgs);
                    }
                }
            }
            Err(e) => {
                error!("route_push(): dropping msgs64: {}", e);
                outcome.errors.push(e.to_string());
            }
        }
    }

    if flag_set(payload, "checkUpdates") {
        handler.check_versions();
        outcome.routed.push(PushRoute::CheckVersions);
    }
    if flag_set(payload, "getMoves") {
        handler.fetch_moves();
        outcome.routed.push(PushRoute::FetchMoves);
    }
    if flag_set(payload, "getMQTT") {
        handler.mqtt_wakeup();
        outcome.routed.push(PushRoute::MqttWakeup);
    }

    if let Some(msg) = payload.get("msg") {
        let title = payload
            .get("title")
            .cloned()
            .or_else(|| config.default_title.clone())
            .unwrap_or_else(|| DEFAULT_NOTIFICATION_TITLE.to_string());
        let teaser = payload.get("teaser").unwrap_or(msg);
        handler.post_notification(&title, teaser, msg);
        outcome.routed.push(PushRoute::Notification);
    }

    outcome
}
