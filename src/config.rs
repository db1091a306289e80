use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::str::FromStr;

use crate::game::constants::{map, tick};
use crate::game::player::WindowMode;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the game and metrics listeners to
    pub bind_address: IpAddr,
    /// Game port
    pub port: u16,
    /// Metrics HTTP port
    pub metrics_port: u16,
    /// Game tick length in milliseconds
    pub tick_ms: u64,
    /// JSON file of map keys; none means every area is unencrypted
    pub region_keys_path: Option<PathBuf>,
    /// Loaded map area edge length in tiles
    pub base_area_size: i32,
    /// Window mode assumed when a login does not send a valid one
    pub default_window_mode: WindowMode,
    pub welcome_message: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)),
            port: 43594,
            metrics_port: 9090,
            tick_ms: tick::DURATION_MS,
            region_keys_path: None,
            base_area_size: map::BASE_AREA_SIZE,
            default_window_mode: WindowMode::Resizable,
            welcome_message: "Welcome to RuneScape.".to_string(),
        }
    }
}

/// Parse `key` with `parse`, keeping the default (and warning) if it fails
fn override_with<T, F>(lookup: &F, key: &str, target: &mut T, accept: impl Fn(&T) -> bool)
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(key) else {
        return;
    };
    match raw.parse::<T>() {
        Ok(parsed) if accept(&parsed) => *target = parsed,
        Ok(_) => tracing::warn!("{} '{}' out of range, using default", key, raw),
        Err(_) => tracing::warn!("Invalid {} '{}', using default", key, raw),
    }
}

impl ServerConfig {
    /// Load config from environment or use defaults
    pub fn load_or_default() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load config from an arbitrary key source
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        override_with(&lookup, "BIND_ADDRESS", &mut config.bind_address, |_| true);
        override_with(&lookup, "PORT", &mut config.port, |p| *p > 0);
        override_with(&lookup, "METRICS_PORT", &mut config.metrics_port, |p| *p > 0);
        override_with(&lookup, "TICK_MS", &mut config.tick_ms, |t| (50..=5000).contains(t));
        override_with(&lookup, "BASE_AREA_SIZE", &mut config.base_area_size, |s| {
            (16..=256).contains(s)
        });

        let mut window_mode = config.default_window_mode as u8;
        override_with(&lookup, "WINDOW_MODE", &mut window_mode, |m| (1..=3).contains(m));
        config.default_window_mode = WindowMode::from_raw(window_mode);

        if let Some(path) = lookup("REGION_KEYS_PATH").filter(|p| !p.is_empty()) {
            config.region_keys_path = Some(PathBuf::from(path));
        }

        if let Some(message) = lookup("WELCOME_MESSAGE") {
            config.welcome_message = message;
        }

        config
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), String> {
        if self.port == 0 {
            return Err("Port cannot be 0".to_string());
        }
        if self.port == self.metrics_port {
            return Err("Game and metrics ports must differ".to_string());
        }
        if self.tick_ms == 0 {
            return Err("tick_ms must be at least 1".to_string());
        }
        if self.base_area_size < 16 {
            return Err("base_area_size must be at least 16".to_string());
        }
        if self.welcome_message.len() > 200 {
            return Err("welcome_message must fit in one game message".to_string());
        }
        Ok(())
    }
}
