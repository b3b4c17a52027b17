use regex::Regex;
use std::sync::LazyLock;
use url::Url;

use crate::error::{MusicError, MusicResult};

/// Formato aceptado antes de invocar a yt-dlp
static YOUTUBE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(https?://)?(www\.|m\.|music\.)?(youtube\.com/(watch\?v=|shorts/|playlist\?list=)|youtu\.be/)",
    )
    .expect("patrón de URL válido")
});

/// Locator validado, clasificado como video único o playlist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    Single(String),
    Collection(String),
}

impl Locator {
    /// Valida el formato y decide si la URL nombra una playlist.
    ///
    /// Una URL con id de playlist y además un video concreto (`v=`) o una
    /// posición válida (`index=`) se trata como un único elemento.
    pub fn parse(raw: &str) -> MusicResult<Self> {
        let raw = raw.trim();
        if !YOUTUBE_PATTERN.is_match(raw) {
            return Err(MusicError::InvalidLocator);
        }

        let normalized = if raw.starts_with("http://") || raw.starts_with("https://") {
            raw.to_string()
        } else {
            format!("https://{}", raw)
        };

        let url = Url::parse(&normalized).map_err(|_| MusicError::InvalidLocator)?;

        if is_collection(&url) {
            Ok(Self::Collection(normalized))
        } else {
            Ok(Self::Single(normalized))
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Single(url) | Self::Collection(url) => url,
        }
    }

    pub fn is_collection(&self) -> bool {
        matches!(self, Self::Collection(_))
    }
}

/// Posición (desde 1) que selecciona una URL de playlist sin video concreto.
///
/// yt-dlp ignora `index=` y `--no-playlist` en estas URLs, así que quien lo
/// invoque debe pedir el elemento con `--playlist-items`.
pub fn playlist_position(locator: &str) -> Option<u32> {
    Url::parse(locator).ok().and_then(|url| PlaylistQuery::of(&url).position())
}

#[derive(Default)]
struct PlaylistQuery {
    has_list: bool,
    has_video: bool,
    index: Option<u32>,
}

impl PlaylistQuery {
    fn of(url: &Url) -> Self {
        let mut query = Self::default();
        if url.host_str() == Some("youtu.be") || url.path().starts_with("/shorts") {
            query.has_video = true;
        }

        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "list" if !value.is_empty() => query.has_list = true,
                "v" => query.has_video = true,
                "index" => query.index = value.parse().ok().filter(|i| *i > 0),
                _ => {}
            }
        }
        query
    }

    fn position(&self) -> Option<u32> {
        self.index.filter(|_| self.has_list && !self.has_video)
    }
}

fn is_collection(url: &Url) -> bool {
    let query = PlaylistQuery::of(url);
    query.has_list && !query.has_video && query.index.is_none()
}
