//! Persistent JSON configuration for the server and client sides of a
//! session: listen address, per-game metadata, and the codec parameters
//! negotiated for a streaming session.

use serde::{Deserialize, Serialize};
use shared::error::{Error, Result};
use std::fs;
use std::path::Path;

/// Hardware/software encoder selected for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Codec {
    H264Nvenc,
    HevcNvenc,
    Av1Nvenc,
    Libx264,
}

impl Codec {
    /// RTP payload type every codec binds to (clock-rate 90000, NACK and PLI advertised).
    pub const PAYLOAD_TYPE: u8 = 112;
    /// RTX payload type, registered as `apt=112`.
    pub const RTX_PAYLOAD_TYPE: u8 = 113;
    /// FlexFEC-03 payload type (`repair-window=10000000` microseconds).
    pub const FEC_PAYLOAD_TYPE: u8 = 118;
    pub const CLOCK_RATE: u32 = 90_000;

    pub fn mime_type(&self) -> &'static str {
        match self {
            Codec::H264Nvenc | Codec::Libx264 => "video/H264",
            Codec::HevcNvenc => "video/H265",
            Codec::Av1Nvenc => "video/AV1",
        }
    }
}

/// Bitrate and framerate parameters fed to the send-side estimator and the
/// encoder's bitrate-controller interface.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CodecConfig {
    pub codec: Codec,
    pub initial_bitrate: i64,
    pub max_bitrate: i64,
    pub min_bitrate: i64,
    pub frame_rate: f32,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            codec: Codec::H264Nvenc,
            initial_bitrate: 6_000_000,
            max_bitrate: 20_000_000,
            min_bitrate: 300_000,
            frame_rate: 60.0,
        }
    }
}

/// The game the client selected for this session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameSelection {
    pub game_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    pub codec_config: CodecConfig,
    pub game_config: GameSelection,
}

/// Client-side persisted config: `{ addr, session_config }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    pub addr: String,
    pub session_config: SessionConfig,
}

/// A command run when a game session ends (e.g. to kill a stray process).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndGameCommand {
    pub flags: Vec<String>,
    pub process_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameConfig {
    pub game_id: String,
    pub game_window_name: String,
    pub game_display_name: String,
    pub game_icon: String,
    #[serde(default)]
    pub end_game_commands: Vec<EndGameCommand>,
}

/// Server-side persisted config: listen address, the catalog of launchable
/// games, and the ephemeral UDP port range handed out per session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub addr: String,
    #[serde(default)]
    pub games: Vec<GameConfig>,
    pub ephemeral_udp_port_min: u16,
    pub ephemeral_udp_port_max: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: "0.0.0.0:9000".to_string(),
            games: Vec::new(),
            ephemeral_udp_port_min: 40000,
            ephemeral_udp_port_max: 40100,
        }
    }
}

/// Load a JSON config document, or fall back to `T::default()` if the file
/// does not exist yet.
pub fn load<T: Default + for<'de> Deserialize<'de>>(path: impl AsRef<Path>) -> Result<T> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(T::default());
    }
    let data = fs::read_to_string(path)?;
    serde_json::from_str(&data).map_err(Error::from)
}

/// Persist a JSON config document with an atomic overwrite-and-truncate:
/// write to a sibling temp file, then rename over the target so a crash
/// mid-write never leaves a half-written config behind.
pub fn save<T: Serialize>(path: impl AsRef<Path>, value: &T) -> Result<()> {
    let path = path.as_ref();
    let tmp_path = path.with_extension("tmp");
    let data = serde_json::to_string_pretty(value).map_err(Error::from)?;
    fs::write(&tmp_path, data)?;
    fs::rename(&tmp_path, path)?;
    Ok(())
}

impl ServerConfig {
    pub fn game(&self, game_id: &str) -> Option<&GameConfig> {
        self.games.iter().find(|g| g.game_id == game_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_server_config_through_json() {
        let config = ServerConfig {
            addr: "0.0.0.0:9000".to_string(),
            games: vec![GameConfig {
                game_id: "game-1".to_string(),
                game_window_name: "Game Window".to_string(),
                game_display_name: "Game One".to_string(),
                game_icon: "icon.png".to_string(),
                end_game_commands: vec![EndGameCommand {
                    flags: vec!["/f".to_string()],
                    process_name: "game.exe".to_string(),
                }],
            }],
            ephemeral_udp_port_min: 40000,
            ephemeral_udp_port_max: 40100,
        };
        let json = serde_json::to_string(&config).unwrap();
        let parsed: ServerConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.addr, config.addr);
        assert_eq!(parsed.games.len(), 1);
        assert_eq!(parsed.game("game-1").unwrap().end_game_commands.len(), 1);
    }

    #[test]
    fn load_missing_file_returns_default() {
        let config: ServerConfig = load("/nonexistent/path/does-not-exist.json").unwrap();
        assert_eq!(config.ephemeral_udp_port_min, 40000);
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = std::env::temp_dir().join(format!("session-config-test-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("client.json");

        let config = ClientConfig {
            addr: "127.0.0.1:9000".to_string(),
            session_config: SessionConfig {
                codec_config: CodecConfig::default(),
                game_config: GameSelection {
                    game_id: "game-1".to_string(),
                },
            },
        };
        save(&path, &config).unwrap();
        let loaded: ClientConfig = load(&path).unwrap();
        assert_eq!(loaded.addr, config.addr);
        assert_eq!(loaded.session_config.game_config.game_id, "game-1");

        fs::remove_dir_all(&dir).unwrap();
    }
}
