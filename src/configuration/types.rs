use serde::{Deserialize, Serialize};

pub const MAX_NUM_PLAYERS: usize = 4;

/// Which side of a networked game this device plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceRole {
    Standalone,
    Host,
    Guest,
}

impl Default for DeviceRole {
    fn default() -> Self {
        DeviceRole::Standalone
    }
}

impl std::str::FromStr for DeviceRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "standalone" => Ok(DeviceRole::Standalone),
            "host" => Ok(DeviceRole::Host),
            "guest" => Ok(DeviceRole::Guest),
            other => Err(format!("unknown role '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PhoniesAction {
    Ignore,
    Warn,
    Disallow,
    Block,
}

impl Default for PhoniesAction {
    fn default() -> Self {
        PhoniesAction::Warn
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalPlayer {
    pub name: String,
    pub is_local: bool,
    pub is_robot: bool,
    /// Overrides the game dictionary for this player.
    #[serde(default)]
    pub dict: Option<String>,
}

impl LocalPlayer {
    pub fn human<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            is_local: true,
            is_robot: false,
            dict: None,
        }
    }

    pub fn robot<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            is_local: true,
            is_robot: true,
            dict: None,
        }
    }
}

/// Configuration of one game, as stored at the front of its saved stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameConfig {
    #[serde(default)]
    pub name: String,
    pub dict_name: String,
    pub players: Vec<LocalPlayer>,
    pub game_id: u32,
    pub board_size: u8,
    pub tray_size: u8,
    pub role: DeviceRole,
    #[serde(default)]
    pub phonies: PhoniesAction,
    #[serde(default)]
    pub duplicate_mode: bool,
    #[serde(default)]
    pub hints_not_allowed: bool,
    #[serde(default)]
    pub timer_enabled: bool,
}

impl GameConfig {
    pub fn new<S: Into<String>>(dict_name: S, role: DeviceRole) -> Self {
        Self {
            name: String::new(),
            dict_name: dict_name.into(),
            players: vec![LocalPlayer::human("Player 1"), LocalPlayer::robot("Robot")],
            game_id: 0,
            board_size: 15,
            tray_size: 7,
            role,
            phonies: PhoniesAction::default(),
            duplicate_mode: false,
            hints_not_allowed: false,
            timer_enabled: false,
        }
    }

    /// Every dictionary the game needs, game-wide one first, without repeats.
    pub fn dict_names(&self) -> Vec<String> {
        let mut names = vec![self.dict_name.clone()];
        for player in &self.players {
            if let Some(dict) = &player.dict {
                if !names.contains(dict) {
                    names.push(dict.clone());
                }
            }
        }
        names
    }

    pub fn player_names(&self) -> Vec<String> {
        self.players.iter().map(|p| p.name.clone()).collect()
    }

    pub fn is_networked(&self) -> bool {
        self.role != DeviceRole::Standalone
    }

    /// Number of players on other devices.
    pub fn remote_count(&self) -> usize {
        self.players.iter().filter(|p| !p.is_local).count()
    }
}

/// Device-wide preferences handed to the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommonPrefs {
    #[serde(default)]
    pub show_board_arrow: bool,
    #[serde(default)]
    pub show_robot_scores: bool,
    #[serde(default)]
    pub hide_tile_values: bool,
    #[serde(default)]
    pub skip_commit_confirm: bool,
    #[serde(default)]
    pub square_tiles: bool,
    #[serde(default = "default_robot_smartness")]
    pub robot_smartness: u8,
}

fn default_robot_smartness() -> u8 {
    1
}

impl Default for CommonPrefs {
    fn default() -> Self {
        Self {
            show_board_arrow: true,
            show_robot_scores: false,
            hide_tile_values: false,
            skip_commit_confirm: false,
            square_tiles: false,
            robot_smartness: default_robot_smartness(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dict_names_dedups_in_order() {
        let mut gi = GameConfig::new("English", DeviceRole::Standalone);
        gi.players[0].dict = Some("French".into());
        gi.players[1].dict = Some("English".into());
        gi.players.push(LocalPlayer {
            dict: Some("French".into()),
            ..LocalPlayer::human("Third")
        });
        assert_eq!(gi.dict_names(), vec!["English".to_string(), "French".to_string()]);
    }

    #[test]
    fn role_parses_case_insensitively() {
        assert_eq!("Guest".parse::<DeviceRole>(), Ok(DeviceRole::Guest));
        assert!("server".parse::<DeviceRole>().is_err());
    }

    #[test]
    fn remote_count_counts_non_local() {
        let mut gi = GameConfig::new("English", DeviceRole::Host);
        gi.players[1].is_local = false;
        assert_eq!(gi.remote_count(), 1);
        assert!(gi.is_networked());
    }
}
