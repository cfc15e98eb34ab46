//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

use crate::game::combat::WeaponConfig;
use crate::game::zone::ZoneConfig;
use crate::util::time::DEFAULT_TICK_RATE;

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Allowed client origins for CORS, comma separated; `*` allows any
    pub client_origin: String,
    /// Session tuning
    pub session: SessionConfig,
    /// Rail source for the track
    pub track: TrackSource,
}

/// Where the track rail comes from
#[derive(Clone, Debug, PartialEq)]
pub enum TrackSource {
    /// JSON polyline on disk
    File(PathBuf),
    /// Generated flat ring
    Ring { radius: f32, points: usize },
    /// No track: zone elimination and lap stats are skipped
    None,
}

/// Everything the authoritative session needs to run
#[derive(Clone, Debug, PartialEq)]
pub struct SessionConfig {
    /// Simulation ticks per second
    pub tick_rate: u32,
    pub min_players: usize,
    pub max_players: usize,
    /// Seconds observers render behind the newest sample
    pub smoothing_window: f64,
    /// Worst round trip lag compensation must cover
    pub max_expected_rtt: f64,
    pub countdown_secs: f64,
    /// Delay between `Win` and the podium reveal
    pub post_win_secs: f64,
    /// How long the podium is shown before the session resets
    pub podium_secs: f64,
    pub ping_interval_secs: f64,
    /// Radius of each player's sphere hitbox
    pub hitbox_radius: f32,
    pub zone: ZoneConfig,
    pub weapon: WeaponConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            tick_rate: DEFAULT_TICK_RATE,
            min_players: 2,
            max_players: 16,
            smoothing_window: 0.1,
            max_expected_rtt: 0.5,
            countdown_secs: 3.0,
            post_win_secs: 3.0,
            podium_secs: 10.0,
            ping_interval_secs: 1.0,
            hitbox_radius: 0.6,
            zone: ZoneConfig::default(),
            weapon: WeaponConfig::default(),
        }
    }
}

impl SessionConfig {
    /// Seconds of position history to keep per player
    pub fn history_retention(&self) -> f64 {
        crate::game::history::PositionHistory::retention_for(
            self.smoothing_window,
            self.max_expected_rtt,
        )
    }

    fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let zone_defaults = defaults.zone;
        let weapon_defaults = defaults.weapon;

        let config = Self {
            tick_rate: env_or("TICK_RATE", defaults.tick_rate)?,
            min_players: env_or("MIN_PLAYERS", defaults.min_players)?,
            max_players: env_or("MAX_PLAYERS", defaults.max_players)?,
            smoothing_window: env_or("SMOOTHING_WINDOW_SECS", defaults.smoothing_window)?,
            max_expected_rtt: env_or("MAX_EXPECTED_RTT_SECS", defaults.max_expected_rtt)?,
            countdown_secs: env_or("COUNTDOWN_SECS", defaults.countdown_secs)?,
            post_win_secs: env_or("POST_WIN_SECS", defaults.post_win_secs)?,
            podium_secs: env_or("PODIUM_SECS", defaults.podium_secs)?,
            ping_interval_secs: env_or("PING_INTERVAL_SECS", defaults.ping_interval_secs)?,
            hitbox_radius: env_or("HITBOX_RADIUS", defaults.hitbox_radius)?,
            zone: ZoneConfig {
                base_speed: env_or("ZONE_BASE_SPEED", zone_defaults.base_speed)?,
                speed_increase: env_or("ZONE_SPEED_INCREASE", zone_defaults.speed_increase)?,
                exponent: env_or("ZONE_EXPONENT", zone_defaults.exponent)?,
                max_offset_degrees: env_or(
                    "ZONE_MAX_OFFSET_DEGREES",
                    zone_defaults.max_offset_degrees,
                )?,
                centroid_bias: env_or("ZONE_CENTROID_BIAS", zone_defaults.centroid_bias)?,
                smooth_time: env_or("ZONE_SMOOTH_TIME", zone_defaults.smooth_time)?,
                closing_rate: env_or("ZONE_CLOSING_RATE", zone_defaults.closing_rate)?,
                initial_width: env_or("ZONE_INITIAL_WIDTH", zone_defaults.initial_width)?,
                min_speed: env_or("ZONE_MIN_SPEED", zone_defaults.min_speed)?,
            },
            weapon: WeaponConfig {
                damage: env_or("WEAPON_DAMAGE", weapon_defaults.damage)?,
                range: env_or("WEAPON_RANGE", weapon_defaults.range)?,
                max_health: env_or("MAX_HEALTH", weapon_defaults.max_health)?,
            },
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject values the session cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_rate == 0 {
            return Err(ConfigError::Invalid { key: "TICK_RATE" });
        }
        if self.min_players == 0 {
            return Err(ConfigError::Invalid { key: "MIN_PLAYERS" });
        }
        if self.max_players < self.min_players {
            return Err(ConfigError::Invalid { key: "MAX_PLAYERS" });
        }
        if self.smoothing_window < 0.0 {
            return Err(ConfigError::Invalid {
                key: "SMOOTHING_WINDOW_SECS",
            });
        }
        if self.max_expected_rtt < 0.0 {
            return Err(ConfigError::Invalid {
                key: "MAX_EXPECTED_RTT_SECS",
            });
        }
        if self.weapon.max_health <= 0.0 {
            return Err(ConfigError::Invalid { key: "MAX_HEALTH" });
        }
        Ok(())
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Hosts that provide PORT win over SERVER_ADDR
        let server_addr = if let Ok(port) = env::var("PORT") {
            format!("0.0.0.0:{}", port)
        } else {
            env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string())
        };

        let track = match env::var("RAIL_FILE") {
            Ok(path) if !path.trim().is_empty() => TrackSource::File(PathBuf::from(path)),
            _ => {
                let points: usize = env_or("TRACK_POINTS", 128)?;
                if points == 0 {
                    TrackSource::None
                } else {
                    TrackSource::Ring {
                        radius: env_or("TRACK_RADIUS", 250.0)?,
                        points,
                    }
                }
            }
        };

        Ok(Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            client_origin: env::var("CLIENT_ORIGIN").unwrap_or_else(|_| "*".to_string()),
            session: SessionConfig::from_env()?,
            track,
        })
    }
}

/// Read and parse `key`, falling back to `default` when unset
fn env_or<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid { key }),
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConfigError {
    #[error("Invalid server address format")]
    InvalidAddress,

    #[error("Invalid value for environment variable: {key}")]
    Invalid { key: &'static str },
}
