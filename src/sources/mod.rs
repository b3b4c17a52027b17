//! # Sources
//!
//! Resolución de metadatos y apertura de streams de audio.
//!
//! Ambas responsabilidades se delegan en procesos externos (yt-dlp) y se
//! exponen al orquestador a través de dos traits, [`MediaResolver`] y
//! [`StreamProvider`], para que el estado de la cola se pueda probar sin
//! lanzar procesos reales.

pub mod locator;
pub mod stream;
pub mod youtube;

use async_trait::async_trait;

use crate::error::MusicResult;

pub use locator::Locator;
pub use stream::{ByteSource, StreamEvent, YtDlpStreamProvider};
pub use youtube::YouTubeClient;

/// Metadatos de un único elemento, sin descargar audio.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaInfo {
    pub title: String,
    /// Segundos enteros; 0 significa duración desconocida.
    pub duration_secs: u64,
    pub thumbnail: Option<String>,
}

/// Entrada de una playlist tal y como la lista yt-dlp en modo plano.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionEntry {
    pub id: String,
    pub title: String,
    pub duration_secs: u64,
    pub thumbnail: Option<String>,
}

impl CollectionEntry {
    /// URL reproducible de un solo video para esta entrada
    pub fn locator(&self) -> String {
        format!("https://www.youtube.com/watch?v={}", self.id)
    }

    pub fn into_media(self) -> (String, MediaInfo) {
        let url = self.locator();
        (
            url,
            MediaInfo {
                title: self.title,
                duration_secs: self.duration_secs,
                thumbnail: self.thumbnail,
            },
        )
    }
}

/// Obtiene metadatos de un locator ya validado.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MediaResolver: Send + Sync {
    /// Metadatos de un único video
    async fn resolve_single(&self, locator: &str) -> MusicResult<MediaInfo>;

    /// Entradas de una playlist, como máximo `limit`; el resto se descarta sin error
    async fn resolve_collection(&self, locator: &str, limit: usize)
        -> MusicResult<Vec<CollectionEntry>>;
}

/// Abre un stream de audio en vivo para un único video.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StreamProvider: Send + Sync {
    async fn open_stream(&self, locator: &str) -> MusicResult<ByteSource>;
}
