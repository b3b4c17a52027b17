use async_process::Command;
use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use super::{locator::playlist_position, CollectionEntry, MediaInfo, MediaResolver};
use crate::error::{MusicError, MusicResult};

/// Rutas habituales de instalación, en orden de preferencia
const COMMON_YTDLP_PATHS: &[&str] = &["/usr/local/bin/yt-dlp", "/usr/bin/yt-dlp"];

/// Cliente de metadatos respaldado por yt-dlp
pub struct YouTubeClient {
    ytdlp: PathBuf,
    cookies: Option<PathBuf>,
    // Limitar procesos concurrentes para evitar rate limiting
    rate_limiter: Semaphore,
}

/// Información extraída de yt-dlp
#[derive(Debug, Deserialize)]
struct YtDlpInfo {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    duration: Option<f64>,
    #[serde(default)]
    thumbnail: Option<String>,
    #[serde(default)]
    thumbnails: Vec<Thumbnail>,
}

#[derive(Debug, Deserialize)]
struct Thumbnail {
    url: String,
}

impl YtDlpInfo {
    fn title(&self) -> String {
        self.title.clone().unwrap_or_else(|| "Unknown".to_string())
    }

    fn duration_secs(&self) -> u64 {
        self.duration
            .filter(|d| d.is_finite() && *d > 0.0)
            .map(|d| d as u64)
            .unwrap_or(0)
    }

    fn thumbnail(&self) -> Option<String> {
        self.thumbnail
            .clone()
            .or_else(|| self.thumbnails.last().map(|t| t.url.clone()))
    }
}

impl YouTubeClient {
    pub fn new(ytdlp: PathBuf, cookies: Option<PathBuf>) -> Self {
        Self {
            ytdlp,
            cookies,
            rate_limiter: Semaphore::new(3),
        }
    }

    /// Versión de yt-dlp, usada por el health check
    pub async fn version(&self) -> anyhow::Result<String> {
        let output = Command::new(&self.ytdlp).arg("--version").output().await?;
        if !output.status.success() {
            anyhow::bail!("yt-dlp no puede ejecutarse correctamente");
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    async fn run(&self, args: &[&str], locator: &str) -> MusicResult<String> {
        let _permit = self
            .rate_limiter
            .acquire()
            .await
            .map_err(|e| MusicError::ResolutionFailed(e.to_string()))?;

        let mut cmd = Command::new(&self.ytdlp);
        cmd.args(args);
        if let Some(cookies) = &self.cookies {
            cmd.arg("--cookies").arg(cookies);
        }
        cmd.arg(locator);

        let started = std::time::Instant::now();
        let output = cmd
            .output()
            .await
            .map_err(|e| MusicError::ResolutionFailed(format!("error al ejecutar yt-dlp: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            warn!("❌ yt-dlp falló para {}: {}", locator, stderr);
            return Err(MusicError::ResolutionFailed(if stderr.is_empty() {
                "yt-dlp no devolvió información".to_string()
            } else {
                stderr
            }));
        }

        debug!("📊 yt-dlp respondió en {:?} para {}", started.elapsed(), locator);
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl MediaResolver for YouTubeClient {
    async fn resolve_single(&self, locator: &str) -> MusicResult<MediaInfo> {
        debug!("📊 Obteniendo info de: {}", locator);
        let args = single_args(locator);
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        let stdout = self.run(&args, locator).await?;
        let info = parse_single(&stdout)?;
        info!("🎵 Info obtenida: {}", info.title);
        Ok(info)
    }

    async fn resolve_collection(
        &self,
        locator: &str,
        limit: usize,
    ) -> MusicResult<Vec<CollectionEntry>> {
        debug!("📋 Obteniendo playlist: {}", locator);
        let end = limit.to_string();
        let stdout = self
            .run(
                &["--dump-json", "--flat-playlist", "--no-warnings", "--playlist-end", &end],
                locator,
            )
            .await?;
        let entries = parse_collection(&stdout, limit);
        info!("🎵 Playlist extraída con {} tracks", entries.len());
        Ok(entries)
    }
}

/// Argumentos para los metadatos de un solo elemento
fn single_args(locator: &str) -> Vec<String> {
    let mut args: Vec<String> = ["--dump-json", "--no-warnings", "--no-playlist"]
        .into_iter()
        .map(String::from)
        .collect();

    if let Some(position) = playlist_position(locator) {
        args.push("--playlist-items".to_string());
        args.push(position.to_string());
    }
    args
}

fn parse_single(stdout: &str) -> MusicResult<MediaInfo> {
    let info: YtDlpInfo = serde_json::from_str(stdout.trim())
        .map_err(|e| MusicError::ResolutionFailed(format!("respuesta de yt-dlp ilegible: {}", e)))?;

    Ok(MediaInfo {
        title: info.title(),
        duration_secs: info.duration_secs(),
        thumbnail: info.thumbnail(),
    })
}

fn parse_collection(stdout: &str, limit: usize) -> Vec<CollectionEntry> {
    stdout
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| match serde_json::from_str::<YtDlpInfo>(line) {
            Ok(info) => Some(info),
            Err(e) => {
                warn!("⚠️ Línea de playlist ilegible: {}", e);
                None
            }
        })
        .filter_map(|info| {
            let id = info.id.clone()?;
            Some(CollectionEntry {
                title: info.title(),
                duration_secs: info.duration_secs(),
                thumbnail: info.thumbnail(),
                id,
            })
        })
        .take(limit)
        .collect()
}

/// Encuentra el ejecutable de yt-dlp: rutas comunes, luego PATH, luego el nombre a secas
pub fn find_ytdlp() -> PathBuf {
    let home_bin = std::env::var("HOME")
        .ok()
        .map(|home| Path::new(&home).join(".local/bin/yt-dlp"));

    let candidates = COMMON_YTDLP_PATHS
        .iter()
        .map(|path| PathBuf::from(*path))
        .chain(home_bin);

    for path in candidates {
        if path.exists() {
            return path;
        }
    }

    if let Ok(output) = std::process::Command::new("which").arg("yt-dlp").output() {
        if output.status.success() {
            let found = String::from_utf8_lossy(&output.stdout);
            if let Some(first) = found.lines().next().map(str::trim).filter(|l| !l.is_empty()) {
                let path = PathBuf::from(first);
                if path.exists() {
                    return path;
                }
            }
        }
    }

    PathBuf::from("yt-dlp")
}
