use anyhow::{Context, Result};
use std::path::PathBuf;

use crate::sources::youtube::find_ytdlp;

#[derive(Debug, Clone)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub guild_id: Option<u64>, // Para comandos de desarrollo

    // Audio
    pub default_volume: f32,
    pub max_playlist_size: usize,

    // Tiempos (segundos)
    pub connect_timeout_secs: u64,
    pub reconnect_timeout_secs: u64,
    pub inactivity_timeout_secs: u64,

    // yt-dlp
    pub ytdlp_path: PathBuf,
    pub ytdlp_cookies: Option<PathBuf>,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            // Discord
            discord_token: std::env::var("DISCORD_TOKEN").context("DISCORD_TOKEN no está definido")?,
            guild_id: std::env::var("GUILD_ID").ok().and_then(|s| s.parse().ok()),

            // Audio
            default_volume: std::env::var("DEFAULT_VOLUME")
                .unwrap_or_else(|_| "1.0".to_string())
                .parse()
                .context("DEFAULT_VOLUME inválido")?,
            max_playlist_size: std::env::var("MAX_PLAYLIST_SIZE")
                .unwrap_or_else(|_| "50".to_string())
                .parse()
                .context("MAX_PLAYLIST_SIZE inválido")?,

            // Tiempos
            connect_timeout_secs: std::env::var("CONNECT_TIMEOUT_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .context("CONNECT_TIMEOUT_SECS inválido")?,
            reconnect_timeout_secs: std::env::var("RECONNECT_TIMEOUT_SECS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .context("RECONNECT_TIMEOUT_SECS inválido")?,
            inactivity_timeout_secs: std::env::var("INACTIVITY_TIMEOUT_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .context("INACTIVITY_TIMEOUT_SECS inválido")?,

            // yt-dlp
            ytdlp_path: match std::env::var("YTDLP_PATH") {
                Ok(path) if !path.trim().is_empty() => path.into(),
                _ => find_ytdlp(),
            },
            ytdlp_cookies: std::env::var("YTDLP_COOKIES")
                .ok()
                .filter(|path| !path.trim().is_empty())
                .map(PathBuf::from),
        };

        config.validate()?;

        Ok(config)
    }

    /// Valida los valores cargados.
    ///
    /// - El volumen debe estar entre 0.0 y 2.0
    /// - El límite de playlist y los tiempos deben ser mayores que 0
    pub fn validate(&self) -> Result<()> {
        if self.discord_token.trim().is_empty() {
            anyhow::bail!("DISCORD_TOKEN no puede estar vacío");
        }

        if !(0.0..=2.0).contains(&self.default_volume) {
            anyhow::bail!("El volumen debe estar entre 0.0 y 2.0, recibido: {}", self.default_volume);
        }

        if self.max_playlist_size == 0 {
            anyhow::bail!("MAX_PLAYLIST_SIZE debe ser mayor que 0");
        }

        if self.connect_timeout_secs == 0
            || self.reconnect_timeout_secs == 0
            || self.inactivity_timeout_secs == 0
        {
            anyhow::bail!("Los timeouts deben ser mayores que 0");
        }

        Ok(())
    }

    /// Resumen sin el token, apto para logs
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Discord: comandos {}\n  \
            Audio: {}% vol, playlists de hasta {} canciones\n  \
            Tiempos: conexión {}s, reconexión {}s, inactividad {}s\n  \
            yt-dlp: {} (cookies: {})",
            self.guild_id.map_or("globales".to_string(), |id| format!("en guild {}", id)),
            (self.default_volume * 100.0) as u32,
            self.max_playlist_size,
            self.connect_timeout_secs,
            self.reconnect_timeout_secs,
            self.inactivity_timeout_secs,
            self.ytdlp_path.display(),
            if self.ytdlp_cookies.is_some() { "sí" } else { "no" },
        )
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            // Discord (sin default, debe configurarse)
            discord_token: String::new(),
            guild_id: None,

            default_volume: 1.0,
            max_playlist_size: 50,

            connect_timeout_secs: 30,
            reconnect_timeout_secs: 5,
            inactivity_timeout_secs: 30,

            ytdlp_path: PathBuf::from("yt-dlp"),
            ytdlp_cookies: None,
        }
    }
}
