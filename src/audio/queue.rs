use chrono::{DateTime, Utc};
use serenity::model::id::UserId;
use std::{collections::VecDeque, sync::Arc, time::Duration};
use tokio::{task::JoinHandle, time::Instant};
use tracing::{debug, info};

use super::{
    connection::{self, VoiceConnection},
    session::PlaybackSession,
    timer::InactivityTimer,
};
use crate::sources::MediaInfo;

/// Canción en cola; inmutable una vez creada.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueItem {
    pub url: String,
    pub title: String,
    /// 0 significa desconocida
    pub duration_secs: u64,
    pub thumbnail: Option<String>,
    pub requested_by: UserId,
    pub added_at: DateTime<Utc>,
}

impl QueueItem {
    pub fn new(url: String, info: MediaInfo, requested_by: UserId) -> Self {
        Self {
            url,
            title: info.title,
            duration_secs: info.duration_secs,
            thumbnail: info.thumbnail,
            requested_by,
            added_at: Utc::now(),
        }
    }

    pub fn duration(&self) -> Option<Duration> {
        (self.duration_secs > 0).then(|| Duration::from_secs(self.duration_secs))
    }

    pub fn duration_label(&self) -> String {
        self.duration()
            .map(format_duration)
            .unwrap_or_else(|| "Desconocida".to_string())
    }

    /// Marca de tiempo relativa de Discord (`hace 3 minutos`)
    pub fn added_label(&self) -> String {
        format!("<t:{}:R>", self.added_at.timestamp())
    }
}

/// Estado de una guild: cola, canción actual, conexión y temporizador.
///
/// Solo el orquestador lo muta, siempre bajo el lock de la guild.
pub struct GuildQueue {
    pending: VecDeque<QueueItem>,
    current: Option<QueueItem>,
    is_playing: bool,
    playback_started_at: Option<Instant>,
    pub(super) connection: Option<Arc<dyn VoiceConnection>>,
    /// Se incrementa con cada conexión nueva para descartar callbacks viejos
    pub(super) connection_epoch: u64,
    pub(super) wiring: Option<JoinHandle<()>>,
    pub(super) session: PlaybackSession,
    pub(super) inactivity: InactivityTimer,
}

impl GuildQueue {
    pub fn new(volume: f32) -> Self {
        Self {
            pending: VecDeque::new(),
            current: None,
            is_playing: false,
            playback_started_at: None,
            connection: None,
            connection_epoch: 0,
            wiring: None,
            session: PlaybackSession::new(volume),
            inactivity: InactivityTimer::default(),
        }
    }

    /// Agrega los items al final en un solo paso
    pub fn extend(&mut self, items: Vec<QueueItem>) {
        for item in &items {
            debug!("➕ Agregado a la cola: {}", item.title);
        }
        self.pending.extend(items);
    }

    /// Mueve la cabeza de la cola a `current` y la marca como reproduciéndose
    pub fn promote_next(&mut self, now: Instant) -> Option<QueueItem> {
        let next = self.pending.pop_front()?;
        info!("➡️ Siguiente en cola (FIFO): {}", next.title);
        self.current = Some(next.clone());
        self.is_playing = true;
        self.playback_started_at = Some(now);
        Some(next)
    }

    /// Ya no hay canción actual
    pub fn finish(&mut self) {
        self.current = None;
        self.is_playing = false;
        self.playback_started_at = None;
    }

    pub fn clear(&mut self) {
        let cleared = self.pending.len();
        self.pending.clear();
        self.finish();
        info!("🗑️ Cola limpiada: {} canciones removidas", cleared);
    }

    pub fn is_playing(&self) -> bool {
        self.is_playing
    }

    pub fn current(&self) -> Option<&QueueItem> {
        self.current.as_ref()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn has_valid_connection(&self) -> bool {
        connection::is_valid(self.connection.as_ref())
    }

    /// Condiciones bajo las que el temporizador de inactividad puede actuar
    pub fn is_idle(&self) -> bool {
        !self.is_playing && self.pending.is_empty() && self.connection.is_some()
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            current: self.current.clone(),
            pending: self.pending.iter().cloned().collect(),
            is_playing: self.is_playing,
        }
    }

    pub fn now_playing(&self, now: Instant) -> Option<NowPlaying> {
        let item = self.current.clone()?;
        let elapsed = self
            .playback_started_at
            .map(|started| now.saturating_duration_since(started))
            .unwrap_or_default();
        Some(NowPlaying { item, elapsed })
    }
}

/// Proyección de solo lectura de la cola
#[derive(Debug, Clone, PartialEq)]
pub struct QueueSnapshot {
    pub current: Option<QueueItem>,
    pub pending: Vec<QueueItem>,
    pub is_playing: bool,
}

impl QueueSnapshot {
    pub fn is_empty(&self) -> bool {
        self.current.is_none() && self.pending.is_empty()
    }

    pub fn total_duration(&self) -> Duration {
        self.current
            .iter()
            .chain(self.pending.iter())
            .filter_map(QueueItem::duration)
            .sum()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NowPlaying {
    pub item: QueueItem,
    pub elapsed: Duration,
}

impl NowPlaying {
    /// `0:05 / 2:05`
    pub fn progress_label(&self) -> String {
        format!("{} / {}", format_duration(self.elapsed), self.item.duration_label())
    }
}

pub fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn item(title: &str, duration_secs: u64) -> QueueItem {
        QueueItem::new(
            format!("https://youtu.be/{}", title.replace(' ', "")),
            MediaInfo {
                title: title.to_string(),
                duration_secs,
                thumbnail: None,
            },
            UserId::new(42),
        )
    }

    #[test]
    fn test_fifo_order_preserved() {
        let mut queue = GuildQueue::new(1.0);
        for title in ["A", "B", "C"] {
            queue.extend(vec![item(title, 60)]);
        }
        assert_eq!(queue.pending_len(), 3);

        let titles: Vec<_> = queue.snapshot().pending.into_iter().map(|i| i.title).collect();
        assert_eq!(titles, vec!["A", "B", "C"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_promote_and_finish() {
        let mut queue = GuildQueue::new(1.0);
        queue.extend(vec![item("A", 60), item("B", 60)]);

        let promoted = queue.promote_next(Instant::now()).unwrap();
        assert_eq!(promoted.title, "A");
        assert!(queue.is_playing());
        assert_eq!(queue.current().map(|i| i.title.as_str()), Some("A"));
        assert_eq!(queue.pending_len(), 1);

        queue.finish();
        assert!(!queue.is_playing());
        assert!(queue.current().is_none());
        assert!(queue.now_playing(Instant::now()).is_none());
    }

    #[test]
    fn test_promote_on_empty_returns_none() {
        let mut queue = GuildQueue::new(1.0);
        assert!(queue.promote_next(Instant::now()).is_none());
        assert!(!queue.is_playing());
    }

    #[tokio::test(start_paused = true)]
    async fn test_now_playing_elapsed() {
        let mut queue = GuildQueue::new(1.0);
        queue.extend(vec![item("Song A", 125)]);
        queue.promote_next(Instant::now());

        tokio::time::advance(Duration::from_secs(5)).await;

        let now_playing = queue.now_playing(Instant::now()).unwrap();
        assert_eq!(now_playing.elapsed, Duration::from_secs(5));
        assert_eq!(now_playing.progress_label(), "0:05 / 2:05");
    }

    #[test]
    fn test_clear_empties_everything() {
        let mut queue = GuildQueue::new(1.0);
        queue.extend(vec![item("A", 60), item("B", 60)]);
        queue.promote_next(Instant::now());

        queue.clear();
        let snapshot = queue.snapshot();
        assert!(snapshot.is_empty());
        assert!(!snapshot.is_playing);
    }

    #[test]
    fn test_total_duration_skips_unknown() {
        let mut queue = GuildQueue::new(1.0);
        queue.extend(vec![item("A", 60), item("Live", 0), item("B", 30)]);
        assert_eq!(queue.snapshot().total_duration(), Duration::from_secs(90));
    }

    #[test]
    fn test_added_label_uses_discord_timestamp() {
        let mut song = item("A", 60);
        song.added_at = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        assert_eq!(song.added_label(), "<t:1700000000:R>");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(125)), "2:05");
        assert_eq!(format_duration(Duration::from_secs(0)), "0:00");
        assert_eq!(format_duration(Duration::from_secs(3725)), "1:02:05");
        assert_eq!(item("Live", 0).duration_label(), "Desconocida");
    }
}
