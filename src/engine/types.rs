//! Plain data passed across the engine boundary.

use serde::{Deserialize, Serialize};

/// Board layout computed by the engine for a given view size.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardDims {
    pub left: i32,
    pub top: i32,
    pub width: i32,
    pub height: i32,
    pub score_left: i32,
    pub score_width: i32,
    pub score_ht: i32,
    pub board_width: i32,
    pub board_ht: i32,
    pub tray_left: i32,
    pub tray_top: i32,
    pub tray_width: i32,
    pub tray_ht: i32,
    pub cell_size: i32,
    pub timer_width: i32,
}

/// Screen rectangle, inclusive left/top, exclusive right/bottom.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

/// Arguments to the engine's layout figuring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutParams {
    pub left: i32,
    pub top: i32,
    pub width: i32,
    pub height: i32,
    pub score_pct: i32,
    pub tray_pct: i32,
    pub score_width: i32,
    pub font_width: i32,
    pub font_height: i32,
    pub square_tiles: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrayVisState {
    #[default]
    Hidden,
    Reversed,
    Revealed,
}

/// Toolbar/button state snapshot, refreshed after every redraw.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameStateInfo {
    pub vis_tile_count: u32,
    pub tray_vis_state: TrayVisState,
    pub n_pending_messages: u32,
    pub can_hint: bool,
    pub can_undo: bool,
    pub can_redo: bool,
    pub in_trade: bool,
    pub trade_tiles_selected: bool,
    pub can_chat: bool,
    pub can_shuffle: bool,
    pub cur_turn_selected: bool,
    pub can_hide_rack: bool,
    pub can_trade: bool,
    pub can_pause: bool,
    pub can_unpause: bool,
    pub can_rematch: bool,
}

/// Result of a hint request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HintOutcome {
    pub redraw: bool,
    /// The engine stopped early and wants to be asked again.
    pub work_remains: bool,
}

/// Transport kinds a game can be reached over.
///
/// Declaration order matches the engine's ordinals; `_None` holds ordinal 0
/// and never appears in a set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CommsConnType {
    Ir = 1,
    IpDirect = 2,
    Relay = 3,
    Bt = 4,
    Sms = 5,
    P2p = 6,
    Nfc = 7,
    Mqtt = 8,
}

impl CommsConnType {
    pub const ALL: [CommsConnType; 8] = [
        CommsConnType::Ir,
        CommsConnType::IpDirect,
        CommsConnType::Relay,
        CommsConnType::Bt,
        CommsConnType::Sms,
        CommsConnType::P2p,
        CommsConnType::Nfc,
        CommsConnType::Mqtt,
    ];

    /// Bit used for this type in the engine's packed set.
    pub fn bit(self) -> u32 {
        1 << (self as u32 - 1)
    }

    pub fn short_name(self) -> &'static str {
        match self {
            CommsConnType::Ir => "IR",
            CommsConnType::IpDirect => "IP",
            CommsConnType::Relay => "RELAY",
            CommsConnType::Bt => "BT",
            CommsConnType::Sms => "SMS",
            CommsConnType::P2p => "P2P",
            CommsConnType::Nfc => "NFC",
            CommsConnType::Mqtt => "MQTT",
        }
    }
}

/// Set of transports, packed the way the engine stores it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CommsConnTypeSet(u32);

impl CommsConnTypeSet {
    pub fn new() -> Self {
        Self(0)
    }

    /// Unknown bits are dropped.
    pub fn from_bits(bits: u32) -> Self {
        let known = CommsConnType::ALL.iter().fold(0, |acc, t| acc | t.bit());
        Self(bits & known)
    }

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn insert(&mut self, typ: CommsConnType) -> bool {
        let had = self.contains(typ);
        self.0 |= typ.bit();
        !had
    }

    pub fn remove(&mut self, typ: CommsConnType) {
        self.0 &= !typ.bit();
    }

    pub fn contains(self, typ: CommsConnType) -> bool {
        self.0 & typ.bit() != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn types(self) -> Vec<CommsConnType> {
        CommsConnType::ALL
            .iter()
            .copied()
            .filter(|t| self.contains(*t))
            .collect()
    }
}

impl std::fmt::Display for CommsConnTypeSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.types().into_iter().map(|t| t.short_name()).collect();
        write!(f, "[{}]", names.join(","))
    }
}

/// Where a message came from, or where to reach a peer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommsAddr {
    pub types: CommsConnTypeSet,
    pub relay_host: Option<String>,
    pub relay_port: Option<u16>,
    pub relay_room: Option<String>,
    pub bt_name: Option<String>,
    pub bt_addr: Option<String>,
    pub sms_phone: Option<String>,
    pub sms_port: Option<u16>,
    pub p2p_addr: Option<String>,
    pub mqtt_dev_id: Option<String>,
}

impl CommsAddr {
    pub fn with_type(typ: CommsConnType) -> Self {
        let mut types = CommsConnTypeSet::new();
        types.insert(typ);
        Self {
            types,
            ..Default::default()
        }
    }

    pub fn mqtt<S: Into<String>>(dev_id: S) -> Self {
        Self {
            mqtt_dev_id: Some(dev_id.into()),
            ..Self::with_type(CommsConnType::Mqtt)
        }
    }

    pub fn sms<S: Into<String>>(phone: S, port: u16) -> Self {
        Self {
            sms_phone: Some(phone.into()),
            sms_port: Some(port),
            ..Self::with_type(CommsConnType::Sms)
        }
    }
}
