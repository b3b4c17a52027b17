use dashmap::DashMap;
use serenity::model::id::{ChannelId, GuildId, UserId};
use std::{
    sync::{Arc, Weak},
    time::Duration,
};
use tokio::{
    sync::{mpsc, watch, Mutex},
    time::Instant,
};
use tracing::{debug, error, info, warn};

use crate::{
    audio::{
        connection::{ConnectionManager, ConnectionStatus, VoiceConnection, VoiceTransport},
        queue::{GuildQueue, NowPlaying, QueueItem, QueueSnapshot},
        session::{PlaybackEvent, PlaybackEventKind, TrackId},
    },
    config::Config,
    error::{MusicError, MusicResult},
    sources::{Locator, MediaResolver, StreamProvider},
};

/// Parámetros del orquestador derivados de la configuración
#[derive(Debug, Clone)]
pub struct PlayerSettings {
    pub volume: f32,
    pub max_collection_size: usize,
    pub connect_timeout: Duration,
    pub reconnect_timeout: Duration,
    pub inactivity_timeout: Duration,
}

impl Default for PlayerSettings {
    fn default() -> Self {
        Self {
            volume: 1.0,
            max_collection_size: 50,
            connect_timeout: Duration::from_secs(30),
            reconnect_timeout: Duration::from_secs(5),
            inactivity_timeout: Duration::from_secs(30),
        }
    }
}

impl From<&Config> for PlayerSettings {
    fn from(config: &Config) -> Self {
        Self {
            volume: config.default_volume,
            max_collection_size: config.max_playlist_size,
            connect_timeout: Duration::from_secs(config.connect_timeout_secs),
            reconnect_timeout: Duration::from_secs(config.reconnect_timeout_secs),
            inactivity_timeout: Duration::from_secs(config.inactivity_timeout_secs),
        }
    }
}

/// Resultado de agregar un locator a la cola
#[derive(Debug, Clone, PartialEq)]
pub enum Enqueued {
    Single { item: QueueItem, position: usize },
    Collection { count: usize, first: QueueItem },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Advance {
    Started(QueueItem),
    /// No quedan canciones
    Exhausted,
}

struct GuildHandle {
    state: Mutex<GuildQueue>,
    // Serializa los intentos de conexión de una misma guild
    joining: Mutex<()>,
}

struct PlayerInner {
    guilds: DashMap<GuildId, Arc<GuildHandle>>,
    resolver: Arc<dyn MediaResolver>,
    streams: Arc<dyn StreamProvider>,
    connections: ConnectionManager,
    settings: PlayerSettings,
}

/// Orquestador de colas: una máquina de estados por guild.
///
/// Cada operación toma el lock de su guild solo mientras muta estado. Las
/// esperas largas (resolver metadatos, esperar a que la voz esté lista) se
/// hacen sin el lock, y el estado se vuelve a validar al retomarlo.
#[derive(Clone)]
pub struct AudioPlayer {
    inner: Arc<PlayerInner>,
}

impl AudioPlayer {
    pub fn new(
        resolver: Arc<dyn MediaResolver>,
        streams: Arc<dyn StreamProvider>,
        transport: Arc<dyn VoiceTransport>,
        settings: PlayerSettings,
    ) -> Self {
        let connections = ConnectionManager::new(
            transport,
            settings.connect_timeout,
            settings.reconnect_timeout,
        );

        Self {
            inner: Arc::new(PlayerInner {
                guilds: DashMap::new(),
                resolver,
                streams,
                connections,
                settings,
            }),
        }
    }

    /// Valida, resuelve y agrega a la cola. Si no hay nada sonando, empieza a reproducir.
    ///
    /// Nada se agrega si la resolución o la conexión fallan.
    pub async fn enqueue(
        &self,
        guild_id: GuildId,
        locator: &str,
        requested_by: UserId,
        channel_id: ChannelId,
    ) -> MusicResult<Enqueued> {
        let locator = Locator::parse(locator)?;
        let guild = self.guild(guild_id);
        debug!("🔎 Resolviendo {} para guild {}", locator.as_str(), guild_id);

        // Conexión vigente antes de suspender en la resolución
        let observed = {
            let state = guild.state.lock().await;
            state.has_valid_connection().then_some(state.connection_epoch)
        };

        let items = self.resolve(&locator, requested_by).await?;
        let first = items
            .first()
            .cloned()
            .ok_or_else(|| MusicError::ResolutionFailed("sin resultados".to_string()))?;

        self.ensure_connection(guild_id, channel_id, &guild, observed)
            .await?;

        let mut state = guild.state.lock().await;
        if !state.has_valid_connection() {
            return Err(MusicError::ConnectionFailed(
                "la conexión se perdió antes de agregar la canción".to_string(),
            ));
        }

        let count = items.len();
        state.extend(items);
        let position = state.pending_len();
        if state.inactivity.cancel() {
            debug!("⏱️ Temporizador de inactividad cancelado en guild {}", guild_id);
        }

        let outcome = if locator.is_collection() {
            info!("➕ Agregadas {} canciones a la cola de guild {}", count, guild_id);
            Enqueued::Collection { count, first }
        } else {
            info!("➕ Agregado a la cola de guild {}: {}", guild_id, first.title);
            Enqueued::Single {
                item: first,
                position,
            }
        };

        if !state.is_playing() {
            self.advance_locked(guild_id, &mut state).await;
        }

        Ok(outcome)
    }

    /// Reproduce la siguiente canción de la cola, saltando las que no arrancan
    pub async fn advance(&self, guild_id: GuildId) -> Advance {
        let guild = self.guild(guild_id);
        let mut state = guild.state.lock().await;
        self.advance_locked(guild_id, &mut state).await
    }

    pub async fn pause(&self, guild_id: GuildId) -> MusicResult<()> {
        let guild = self.guild(guild_id);
        let mut state = guild.state.lock().await;

        if !state.is_playing() {
            return Err(MusicError::NotPlaying);
        }
        state.session.pause()?;

        info!("⏸️ Reproducción pausada en guild {}", guild_id);
        Ok(())
    }

    pub async fn resume(&self, guild_id: GuildId) -> MusicResult<()> {
        let guild = self.guild(guild_id);
        let mut state = guild.state.lock().await;

        state.session.resume()?;

        info!("▶️ Reproducción reanudada en guild {}", guild_id);
        Ok(())
    }

    /// Detiene la canción actual; la siguiente arranca cuando la sesión reporte `Idle`
    pub async fn skip(&self, guild_id: GuildId) -> MusicResult<QueueItem> {
        let guild = self.guild(guild_id);
        let mut state = guild.state.lock().await;

        let skipped = state.current().cloned().ok_or(MusicError::NothingToSkip)?;
        info!("⏭️ Saltando en guild {}: {}", guild_id, skipped.title);

        if !state.session.stop() {
            // No hay recurso que vaya a emitir Idle
            self.advance_locked(guild_id, &mut state).await;
        }

        Ok(skipped)
    }

    /// Vacía la cola y detiene la reproducción; la conexión se mantiene
    pub async fn stop(&self, guild_id: GuildId) {
        let guild = self.guild(guild_id);
        let mut state = guild.state.lock().await;

        state.clear();
        if !state.session.stop() {
            self.arm_inactivity(guild_id, &mut state);
        }

        info!("⏹️ Reproducción detenida en guild {}", guild_id);
    }

    pub async fn leave(&self, guild_id: GuildId) -> MusicResult<()> {
        let guild = self.guild(guild_id);
        let mut state = guild.state.lock().await;

        if state.connection.is_none() {
            return Err(MusicError::NotConnected);
        }

        Self::drop_connection(&mut state, true).await;
        state.clear();

        info!("👋 Desconectado del canal de voz en guild {}", guild_id);
        Ok(())
    }

    pub async fn query_queue(&self, guild_id: GuildId) -> QueueSnapshot {
        let guild = self.guild(guild_id);
        let state = guild.state.lock().await;
        state.snapshot()
    }

    pub async fn query_now_playing(&self, guild_id: GuildId) -> Option<NowPlaying> {
        let guild = self.guild(guild_id);
        let state = guild.state.lock().await;
        state.now_playing(Instant::now())
    }

    fn guild(&self, guild_id: GuildId) -> Arc<GuildHandle> {
        self.inner
            .guilds
            .entry(guild_id)
            .or_insert_with(|| {
                Arc::new(GuildHandle {
                    state: Mutex::new(GuildQueue::new(self.inner.settings.volume)),
                    joining: Mutex::new(()),
                })
            })
            .clone()
    }

    fn upgrade(inner: &Weak<PlayerInner>) -> Option<Self> {
        inner.upgrade().map(|inner| Self { inner })
    }

    async fn resolve(&self, locator: &Locator, requested_by: UserId) -> MusicResult<Vec<QueueItem>> {
        match locator {
            Locator::Single(url) => {
                let info = self.inner.resolver.resolve_single(url).await?;
                Ok(vec![QueueItem::new(url.clone(), info, requested_by)])
            }
            Locator::Collection(url) => {
                let limit = self.inner.settings.max_collection_size;
                let mut entries = self.inner.resolver.resolve_collection(url, limit).await?;

                if entries.len() > limit {
                    debug!("✂️ Playlist recortada de {} a {} canciones", entries.len(), limit);
                    entries.truncate(limit);
                }
                if entries.is_empty() {
                    return Err(MusicError::ResolutionFailed("la playlist está vacía".to_string()));
                }

                Ok(entries
                    .into_iter()
                    .map(|entry| {
                        let (url, info) = entry.into_media();
                        QueueItem::new(url, info, requested_by)
                    })
                    .collect())
            }
        }
    }

    /// Reutiliza la conexión si es válida; si no, descarta la obsoleta y abre otra.
    ///
    /// `observed` es la conexión vigente antes de resolver: si se desmontó
    /// mientras tanto (leave, abandono) no se reconecta en silencio. Si solo
    /// se cayó, se trata como obsoleta.
    async fn ensure_connection(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
        guild: &GuildHandle,
        observed: Option<u64>,
    ) -> MusicResult<()> {
        let _joining = guild.joining.lock().await;

        let replaced_stale = {
            let mut state = guild.state.lock().await;

            // Una conexión presente pero caída se reemplaza más abajo
            if let Some(epoch) = observed {
                if state.connection_epoch != epoch || state.connection.is_none() {
                    return Err(MusicError::ConnectionFailed(
                        "la conexión se cerró mientras se resolvía la canción".to_string(),
                    ));
                }
            }

            if let Some(connection) = state.connection.as_ref().filter(|_| state.has_valid_connection()) {
                if connection.channel_id() != channel_id {
                    warn!(
                        "⚠️ Reutilizando la conexión en el canal {} aunque se pidió desde {} (guild {})",
                        connection.channel_id(),
                        channel_id,
                        guild_id
                    );
                }
                return Ok(());
            }

            if state.connection.is_some() {
                debug!("🧹 Descartando conexión obsoleta en guild {}", guild_id);
                Self::drop_connection(&mut state, true).await;
                // La canción actual murió con la conexión
                state.finish();
                true
            } else {
                false
            }
        };

        let connection = match self.inner.connections.connect(guild_id, channel_id).await {
            Ok(connection) => connection,
            Err(e) => {
                if replaced_stale {
                    // Sin conexión nada reproducirá lo que quedó pendiente
                    let mut state = guild.state.lock().await;
                    if state.connection.is_none() {
                        warn!("❌ No se pudo reemplazar la conexión en guild {}, limpiando cola", guild_id);
                        state.clear();
                    }
                }
                return Err(e);
            }
        };

        let mut state = guild.state.lock().await;
        self.install_connection(guild_id, &mut state, connection);
        Ok(())
    }

    /// Suscribe la sesión a la conexión nueva y reemplaza el cableado de eventos
    fn install_connection(
        &self,
        guild_id: GuildId,
        state: &mut GuildQueue,
        connection: Arc<dyn VoiceConnection>,
    ) {
        state.connection_epoch += 1;
        let epoch = state.connection_epoch;

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        state.session.subscribe(connection.output(), events_tx);

        let wiring = tokio::spawn(run_wiring(
            Arc::downgrade(&self.inner),
            guild_id,
            epoch,
            events_rx,
            connection.status(),
        ));
        if let Some(previous) = state.wiring.replace(wiring) {
            previous.abort();
        }

        state.connection = Some(connection);
        debug!("🔌 Sesión suscrita a la conexión #{} en guild {}", epoch, guild_id);
    }

    async fn drop_connection(state: &mut GuildQueue, abort_wiring: bool) {
        state.inactivity.cancel();
        if let Some(wiring) = state.wiring.take() {
            if abort_wiring {
                wiring.abort();
            }
        }
        state.session.detach();
        if let Some(connection) = state.connection.take() {
            connection.destroy().await;
        }
    }

    async fn advance_locked(&self, guild_id: GuildId, state: &mut GuildQueue) -> Advance {
        while let Some(item) = state.promote_next(Instant::now()) {
            match self.start_item(state, &item).await {
                Ok(track) => {
                    info!("🎵 Reproduciendo en guild {}: {} (track {})", guild_id, item.title, track);
                    return Advance::Started(item);
                }
                Err(e) => {
                    warn!("⏭️ No se pudo reproducir {}: {}. Saltando", item.title, e);
                }
            }
        }

        state.finish();
        info!("📭 Cola vacía en guild {}", guild_id);
        self.arm_inactivity(guild_id, state);
        Advance::Exhausted
    }

    async fn start_item(&self, state: &mut GuildQueue, item: &QueueItem) -> MusicResult<TrackId> {
        let source = self.inner.streams.open_stream(&item.url).await?;
        state.session.play(source).await
    }

    fn arm_inactivity(&self, guild_id: GuildId, state: &mut GuildQueue) {
        if state.connection.is_none() {
            return;
        }

        let player = Arc::downgrade(&self.inner);
        let timeout = self.inner.settings.inactivity_timeout;
        state.inactivity.arm(timeout, move |timer_id| async move {
            if let Some(player) = Self::upgrade(&player) {
                player.on_inactivity(guild_id, timer_id).await;
            }
        });

        debug!("⏱️ Desconexión por inactividad programada en {:?} para guild {}", timeout, guild_id);
    }

    async fn on_inactivity(&self, guild_id: GuildId, timer_id: u64) {
        let guild = self.guild(guild_id);
        let mut state = guild.state.lock().await;

        if !state.inactivity.take_fired(timer_id) {
            return;
        }
        // El temporizador es orientativo: se vuelve a comprobar antes de actuar
        if !state.is_idle() {
            debug!("⏱️ Guild {} volvió a estar activa, se ignora la inactividad", guild_id);
            return;
        }

        info!("🚪 Desconectando por inactividad en guild {}", guild_id);
        Self::drop_connection(&mut state, true).await;
    }

    async fn handle_playback_event(&self, guild_id: GuildId, epoch: u64, event: PlaybackEvent) {
        let guild = self.guild(guild_id);
        let mut state = guild.state.lock().await;

        if state.connection_epoch != epoch || !state.session.on_event(&event) {
            debug!("Evento descartado en guild {}: {:?}", guild_id, event);
            return;
        }

        match event.kind {
            PlaybackEventKind::Playing => {
                debug!("▶️ Track {} sonando en guild {}", event.track, guild_id);
                state.inactivity.cancel();
            }
            PlaybackEventKind::Buffering => {
                debug!("⏳ Track {} cargando en guild {}", event.track, guild_id);
            }
            PlaybackEventKind::Idle => {
                debug!("Track {} terminado en guild {}", event.track, guild_id);
                self.advance_locked(guild_id, &mut state).await;
            }
            PlaybackEventKind::Error(message) => {
                error!("❌ Error en track para guild {}: {}", guild_id, message);
                self.advance_locked(guild_id, &mut state).await;
            }
        }
    }

    async fn abandon_connection(&self, guild_id: GuildId, epoch: u64) {
        let guild = self.guild(guild_id);
        let mut state = guild.state.lock().await;

        if state.connection_epoch != epoch || state.connection.is_none() {
            return;
        }

        warn!("❌ La conexión de voz no se recuperó en guild {}, limpiando cola", guild_id);
        Self::drop_connection(&mut state, false).await;
        state.clear();
    }

    #[cfg(test)]
    async fn is_connected(&self, guild_id: GuildId) -> bool {
        self.guild(guild_id).state.lock().await.connection.is_some()
    }

    #[cfg(test)]
    async fn inactivity_armed(&self, guild_id: GuildId) -> bool {
        self.guild(guild_id).state.lock().await.inactivity.is_armed()
    }
}

/// Cableado de una conexión: eventos de la sesión y transiciones de la voz.
/// Se reemplaza (no se acumula) en cada conexión nueva.
async fn run_wiring(
    player: Weak<PlayerInner>,
    guild_id: GuildId,
    epoch: u64,
    mut events: mpsc::UnboundedReceiver<PlaybackEvent>,
    mut status: watch::Receiver<ConnectionStatus>,
) {
    loop {
        tokio::select! {
            event = events.recv() => {
                let (Some(event), Some(player)) = (event, AudioPlayer::upgrade(&player)) else {
                    break;
                };
                player.handle_playback_event(guild_id, epoch, event).await;
            }
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = *status.borrow_and_update();
                if !matches!(current, ConnectionStatus::Disconnected | ConnectionStatus::Destroyed) {
                    continue;
                }
                let Some(player) = AudioPlayer::upgrade(&player) else {
                    break;
                };

                if current == ConnectionStatus::Disconnected {
                    warn!("🔌 Voz desconectada en guild {}, esperando reconexión...", guild_id);
                    if player.inner.connections.await_recovery(&mut status).await {
                        info!("🔄 Voz recuperándose en guild {}", guild_id);
                        continue;
                    }
                }

                player.abandon_connection(guild_id, epoch).await;
                break;
            }
        }
    }

    debug!("Cableado #{} de guild {} terminado", epoch, guild_id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        audio::testing::{FakeTransport, ReadyMode},
        sources::{ByteSource, CollectionEntry, MediaInfo, MockMediaResolver, MockStreamProvider},
    };
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::{collections::HashMap, io};

    fn guild() -> GuildId {
        GuildId::new(1)
    }

    fn user() -> UserId {
        UserId::new(7)
    }

    fn channel() -> ChannelId {
        ChannelId::new(10)
    }

    fn url(id: &str) -> String {
        format!("https://youtu.be/{}", id)
    }

    fn catalog(entries: &[(&str, &str, u64)]) -> MockMediaResolver {
        let catalog: HashMap<String, MediaInfo> = entries
            .iter()
            .map(|(id, title, duration_secs)| {
                (
                    url(id),
                    MediaInfo {
                        title: title.to_string(),
                        duration_secs: *duration_secs,
                        thumbnail: None,
                    },
                )
            })
            .collect();

        let mut resolver = MockMediaResolver::new();
        resolver.expect_resolve_single().returning(move |locator: &str| {
            catalog
                .get(locator)
                .cloned()
                .ok_or_else(|| MusicError::ResolutionFailed(format!("desconocido: {}", locator)))
        });
        resolver
    }

    fn abc() -> MockMediaResolver {
        catalog(&[("a", "Song A", 125), ("b", "Song B", 60), ("c", "Song C", 90)])
    }

    fn streams() -> MockStreamProvider {
        let mut streams = MockStreamProvider::new();
        streams.expect_open_stream().returning(|locator: &str| {
            if locator.ends_with("broken") {
                Err(MusicError::StreamError("yt-dlp terminó con 1".to_string()))
            } else {
                Ok(ByteSource::from_reader(locator, io::empty()))
            }
        });
        streams
    }

    fn player_with(
        resolver: impl MediaResolver + 'static,
        mode: ReadyMode,
    ) -> (AudioPlayer, Arc<FakeTransport>) {
        let transport = Arc::new(FakeTransport::new(mode));
        let player = AudioPlayer::new(
            Arc::new(resolver),
            Arc::new(streams()),
            transport.clone(),
            PlayerSettings::default(),
        );
        (player, transport)
    }

    async fn enqueue(player: &AudioPlayer, id: &str) -> MusicResult<Enqueued> {
        player.enqueue(guild(), &url(id), user(), channel()).await
    }

    /// Deja correr las tareas de cableado pendientes
    async fn settle() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    fn titles(snapshot: &QueueSnapshot) -> (Option<String>, Vec<String>) {
        (
            snapshot.current.as_ref().map(|i| i.title.clone()),
            snapshot.pending.iter().map(|i| i.title.clone()).collect(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_enqueue_while_disconnected_starts_playing() {
        let (player, transport) = player_with(abc(), ReadyMode::After(Duration::from_secs(2)));

        let outcome = enqueue(&player, "a").await.unwrap();
        match outcome {
            Enqueued::Single { item, position } => {
                assert_eq!(item.title, "Song A");
                assert_eq!(position, 1);
            }
            other => panic!("resultado inesperado: {:?}", other),
        }

        assert_eq!(transport.opened(), 1);
        let snapshot = player.query_queue(guild()).await;
        assert_eq!(titles(&snapshot), (Some("Song A".to_string()), vec![]));
        assert!(snapshot.is_playing);
        assert_eq!(transport.last().sink().started(), vec![url("a")]);

        tokio::time::advance(Duration::from_secs(5)).await;
        let now_playing = player.query_now_playing(guild()).await.unwrap();
        assert_eq!(now_playing.elapsed, Duration::from_secs(5));
        assert_eq!(now_playing.item.duration_label(), "2:05");
    }

    #[tokio::test(start_paused = true)]
    async fn test_enqueue_preserves_fifo_order() {
        let (player, transport) = player_with(abc(), ReadyMode::Immediate);

        for id in ["a", "b", "c"] {
            enqueue(&player, id).await.unwrap();
        }

        let snapshot = player.query_queue(guild()).await;
        assert_eq!(
            titles(&snapshot),
            (Some("Song A".to_string()), vec!["Song B".to_string(), "Song C".to_string()])
        );
        assert_eq!(transport.opened(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_locator_touches_nothing() {
        // Un resolver sin expectativas falla si se le llama
        let (player, transport) = player_with(MockMediaResolver::new(), ReadyMode::Immediate);

        let result = player
            .enqueue(guild(), "https://example.com/video", user(), channel())
            .await;

        assert_eq!(result, Err(MusicError::InvalidLocator));
        assert_eq!(transport.opened(), 0);
        assert!(player.query_queue(guild()).await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolution_failure_does_not_mutate() {
        let (player, transport) = player_with(abc(), ReadyMode::Immediate);

        let result = enqueue(&player, "missing").await;

        assert!(matches!(result, Err(MusicError::ResolutionFailed(_))));
        assert_eq!(transport.opened(), 0);
        assert!(player.query_queue(guild()).await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_connection_timeout_does_not_mutate() {
        let (player, transport) = player_with(abc(), ReadyMode::Never);

        let result = enqueue(&player, "a").await;

        assert!(matches!(result, Err(MusicError::ConnectionFailed(_))));
        assert!(transport.last().is_destroyed());
        assert!(player.query_queue(guild()).await.is_empty());
        assert!(!player.is_connected(guild()).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_collection_is_bounded() {
        let mut resolver = MockMediaResolver::new();
        resolver
            .expect_resolve_collection()
            .returning(|_locator: &str, _limit: usize| {
                Ok((0..70)
                    .map(|i| CollectionEntry {
                        id: format!("v{}", i),
                        title: format!("Track {}", i),
                        duration_secs: 60,
                        thumbnail: None,
                    })
                    .collect())
            });
        let (player, _transport) = player_with(resolver, ReadyMode::Immediate);

        let outcome = player
            .enqueue(guild(), "https://www.youtube.com/playlist?list=PL1", user(), channel())
            .await
            .unwrap();

        match outcome {
            Enqueued::Collection { count, first } => {
                assert_eq!(count, 50);
                assert_eq!(first.title, "Track 0");
                assert_eq!(first.url, "https://www.youtube.com/watch?v=v0");
            }
            other => panic!("resultado inesperado: {:?}", other),
        }

        let snapshot = player.query_queue(guild()).await;
        assert_eq!(snapshot.current.map(|i| i.title), Some("Track 0".to_string()));
        assert_eq!(snapshot.pending.len(), 49);
        assert_eq!(snapshot.pending.last().map(|i| i.title.as_str()), Some("Track 49"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_collection_fails() {
        let mut resolver = MockMediaResolver::new();
        resolver
            .expect_resolve_collection()
            .returning(|_locator: &str, _limit: usize| Ok(Vec::new()));
        let (player, transport) = player_with(resolver, ReadyMode::Immediate);

        let result = player
            .enqueue(guild(), "https://www.youtube.com/playlist?list=PL1", user(), channel())
            .await;

        assert!(matches!(result, Err(MusicError::ResolutionFailed(_))));
        assert_eq!(transport.opened(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_and_resume() {
        let (player, _transport) = player_with(abc(), ReadyMode::Immediate);
        assert_eq!(player.pause(guild()).await, Err(MusicError::NotPlaying));

        enqueue(&player, "a").await.unwrap();
        let before = player.query_queue(guild()).await;

        player.pause(guild()).await.unwrap();
        assert_eq!(player.query_queue(guild()).await, before);
        assert_eq!(player.pause(guild()).await, Err(MusicError::NotPlaying));

        player.resume(guild()).await.unwrap();
        assert_eq!(player.resume(guild()).await, Err(MusicError::NotPaused));
    }

    #[tokio::test(start_paused = true)]
    async fn test_skip_promotes_next_without_idle_gap() {
        let (player, _transport) = player_with(abc(), ReadyMode::Immediate);
        enqueue(&player, "a").await.unwrap();
        enqueue(&player, "b").await.unwrap();

        let skipped = player.skip(guild()).await.unwrap();
        assert_eq!(skipped.title, "Song A");
        assert!(player.query_queue(guild()).await.is_playing);

        settle().await;

        let snapshot = player.query_queue(guild()).await;
        assert_eq!(titles(&snapshot), (Some("Song B".to_string()), vec![]));
        assert!(snapshot.is_playing);
    }

    #[tokio::test(start_paused = true)]
    async fn test_skip_with_nothing_playing() {
        let (player, _transport) = player_with(abc(), ReadyMode::Immediate);
        assert_eq!(player.skip(guild()).await, Err(MusicError::NothingToSkip));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_queue_arms_inactivity_and_disconnects() {
        let (player, transport) = player_with(abc(), ReadyMode::Immediate);
        enqueue(&player, "a").await.unwrap();

        player.skip(guild()).await.unwrap();
        settle().await;

        let snapshot = player.query_queue(guild()).await;
        assert!(snapshot.is_empty());
        assert!(!snapshot.is_playing);
        assert!(player.inactivity_armed(guild()).await);

        // Avanzar sobre una cola vacía vuelve a armar, sin duplicar
        assert_eq!(player.advance(guild()).await, Advance::Exhausted);
        assert!(player.inactivity_armed(guild()).await);

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert!(transport.last().is_destroyed());
        assert!(!player.is_connected(guild()).await);
        assert!(!player.inactivity_armed(guild()).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_enqueue_cancels_inactivity() {
        let (player, transport) = player_with(abc(), ReadyMode::Immediate);
        enqueue(&player, "a").await.unwrap();
        player.skip(guild()).await.unwrap();
        settle().await;
        assert!(player.inactivity_armed(guild()).await);

        tokio::time::sleep(Duration::from_secs(10)).await;
        enqueue(&player, "b").await.unwrap();
        assert!(!player.inactivity_armed(guild()).await);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(!transport.last().is_destroyed());
        assert_eq!(
            player.query_queue(guild()).await.current.map(|i| i.title),
            Some("Song B".to_string())
        );
        assert_eq!(transport.opened(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_clears_queue_and_keeps_connection() {
        let (player, transport) = player_with(abc(), ReadyMode::Immediate);
        enqueue(&player, "a").await.unwrap();
        enqueue(&player, "b").await.unwrap();

        player.stop(guild()).await;

        let snapshot = player.query_queue(guild()).await;
        assert!(snapshot.is_empty());
        assert!(!snapshot.is_playing);

        settle().await;
        assert!(player.query_queue(guild()).await.is_empty());
        assert!(player.is_connected(guild()).await);
        assert!(!transport.last().is_destroyed());
        assert!(player.inactivity_armed(guild()).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_when_idle_still_arms_inactivity() {
        let (player, _transport) = player_with(abc(), ReadyMode::Immediate);
        enqueue(&player, "a").await.unwrap();
        player.skip(guild()).await.unwrap();
        settle().await;

        player.stop(guild()).await;
        assert!(player.inactivity_armed(guild()).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_leave() {
        let (player, transport) = player_with(abc(), ReadyMode::Immediate);
        assert_eq!(player.leave(guild()).await, Err(MusicError::NotConnected));

        enqueue(&player, "a").await.unwrap();
        enqueue(&player, "b").await.unwrap();
        player.leave(guild()).await.unwrap();

        assert!(transport.last().is_destroyed());
        assert!(player.query_queue(guild()).await.is_empty());
        assert_eq!(player.leave(guild()).await, Err(MusicError::NotConnected));

        // El Idle del track detenido no revive nada
        settle().await;
        assert!(player.query_queue(guild()).await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_broken_stream_is_skipped() {
        let resolver = catalog(&[("a", "Song A", 125), ("broken", "Broken", 10), ("c", "Song C", 90)]);
        let (player, transport) = player_with(resolver, ReadyMode::Immediate);
        enqueue(&player, "a").await.unwrap();
        enqueue(&player, "broken").await.unwrap();
        enqueue(&player, "c").await.unwrap();

        player.skip(guild()).await.unwrap();
        settle().await;

        let snapshot = player.query_queue(guild()).await;
        assert_eq!(titles(&snapshot), (Some("Song C".to_string()), vec![]));
        assert_eq!(transport.last().sink().started(), vec![url("a"), url("c")]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_only_broken_stream_leaves_queue_idle() {
        let resolver = catalog(&[("broken", "Broken", 10)]);
        let (player, _transport) = player_with(resolver, ReadyMode::Immediate);

        enqueue(&player, "broken").await.unwrap();

        let snapshot = player.query_queue(guild()).await;
        assert!(snapshot.is_empty());
        assert!(!snapshot.is_playing);
        assert!(player.inactivity_armed(guild()).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_playback_error_advances_once() {
        let (player, transport) = player_with(abc(), ReadyMode::Immediate);
        enqueue(&player, "a").await.unwrap();
        enqueue(&player, "b").await.unwrap();
        enqueue(&player, "c").await.unwrap();

        let sink = transport.last().sink();
        let failing = sink.last_track().unwrap();
        sink.emit(failing, PlaybackEventKind::Error("decodificador".to_string()));
        sink.emit(failing, PlaybackEventKind::Idle);
        settle().await;

        let snapshot = player.query_queue(guild()).await;
        assert_eq!(titles(&snapshot), (Some("Song B".to_string()), vec!["Song C".to_string()]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_playing_event_is_ignored() {
        let (player, transport) = player_with(abc(), ReadyMode::Immediate);
        enqueue(&player, "a").await.unwrap();
        let sink = transport.last().sink();
        let finished = sink.last_track().unwrap();

        player.skip(guild()).await.unwrap();
        settle().await;
        assert!(player.inactivity_armed(guild()).await);

        sink.emit(finished, PlaybackEventKind::Playing);
        settle().await;
        assert!(player.inactivity_armed(guild()).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_without_recovery_clears_everything() {
        let (player, transport) = player_with(abc(), ReadyMode::Immediate);
        enqueue(&player, "a").await.unwrap();
        enqueue(&player, "b").await.unwrap();

        transport.last().set_status(ConnectionStatus::Disconnected);
        tokio::time::sleep(Duration::from_secs(6)).await;

        let snapshot = player.query_queue(guild()).await;
        assert!(snapshot.is_empty());
        assert!(!snapshot.is_playing);
        assert!(!player.is_connected(guild()).await);
        assert!(transport.last().is_destroyed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_with_recovery_keeps_queue() {
        let (player, transport) = player_with(abc(), ReadyMode::Immediate);
        enqueue(&player, "a").await.unwrap();
        enqueue(&player, "b").await.unwrap();

        let connection = transport.last();
        connection.set_status(ConnectionStatus::Disconnected);
        tokio::time::sleep(Duration::from_secs(2)).await;
        connection.set_status(ConnectionStatus::Connecting);
        settle().await;
        connection.set_status(ConnectionStatus::Ready);
        tokio::time::sleep(Duration::from_secs(10)).await;

        let snapshot = player.query_queue(guild()).await;
        assert_eq!(titles(&snapshot), (Some("Song A".to_string()), vec!["Song B".to_string()]));
        assert!(player.is_connected(guild()).await);
        assert!(!connection.is_destroyed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_connection_is_replaced() {
        let (player, transport) = player_with(abc(), ReadyMode::Immediate);
        enqueue(&player, "a").await.unwrap();
        let first = transport.last();

        // Desconectada pero aún sin limpiar
        first.set_status(ConnectionStatus::Disconnected);

        enqueue(&player, "b").await.unwrap();

        assert_eq!(transport.opened(), 2);
        assert!(first.is_destroyed());
        let snapshot = player.query_queue(guild()).await;
        assert_eq!(snapshot.current.map(|i| i.title), Some("Song B".to_string()));
        assert_eq!(transport.last().sink().started(), vec![url("b")]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_enqueues_share_connection() {
        let (player, transport) = player_with(abc(), ReadyMode::After(Duration::from_secs(2)));

        let first = tokio::spawn({
            let player = player.clone();
            async move { enqueue(&player, "a").await }
        });
        let second = tokio::spawn({
            let player = player.clone();
            async move { enqueue(&player, "b").await }
        });

        assert!(first.await.unwrap().is_ok());
        assert!(second.await.unwrap().is_ok());
        assert_eq!(transport.opened(), 1);

        let snapshot = player.query_queue(guild()).await;
        assert!(snapshot.is_playing);
        assert_eq!(snapshot.pending.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_from_other_channel_reuses_connection() {
        let (player, transport) = player_with(abc(), ReadyMode::Immediate);
        enqueue(&player, "a").await.unwrap();

        player
            .enqueue(guild(), &url("b"), user(), ChannelId::new(11))
            .await
            .unwrap();

        assert_eq!(transport.opened(), 1);
        assert_eq!(transport.last().channel_id(), channel());
    }

    struct SlowResolver;

    #[async_trait]
    impl MediaResolver for SlowResolver {
        async fn resolve_single(&self, locator: &str) -> MusicResult<MediaInfo> {
            tokio::time::sleep(Duration::from_secs(1)).await;
            Ok(MediaInfo {
                title: locator.to_string(),
                duration_secs: 60,
                thumbnail: None,
            })
        }

        async fn resolve_collection(
            &self,
            _locator: &str,
            _limit: usize,
        ) -> MusicResult<Vec<CollectionEntry>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_leave_during_resolution_fails_add() {
        let (player, transport) = player_with(SlowResolver, ReadyMode::Immediate);
        enqueue(&player, "a").await.unwrap();

        let pending = tokio::spawn({
            let player = player.clone();
            async move { enqueue(&player, "b").await }
        });
        tokio::time::sleep(Duration::from_millis(100)).await;
        player.leave(guild()).await.unwrap();

        let result = pending.await.unwrap();
        assert!(matches!(result, Err(MusicError::ConnectionFailed(_))));
        assert_eq!(transport.opened(), 1);
        assert!(player.query_queue(guild()).await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_during_resolution_reconnects() {
        let (player, transport) = player_with(SlowResolver, ReadyMode::Immediate);
        enqueue(&player, "a").await.unwrap();
        let first = transport.last();

        let pending = tokio::spawn({
            let player = player.clone();
            async move { enqueue(&player, "b").await }
        });
        tokio::time::sleep(Duration::from_millis(100)).await;
        first.set_status(ConnectionStatus::Disconnected);

        let result = pending.await.unwrap();
        assert!(result.is_ok(), "la canción debería agregarse: {:?}", result);
        assert_eq!(transport.opened(), 2);
        assert!(first.is_destroyed());

        let snapshot = player.query_queue(guild()).await;
        assert_eq!(snapshot.current.map(|i| i.url), Some(url("b")));
        assert!(snapshot.is_playing);
        assert_eq!(transport.last().sink().started(), vec![url("b")]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_replacement_clears_queue() {
        let (player, transport) = player_with(abc(), ReadyMode::Immediate);
        enqueue(&player, "a").await.unwrap();
        enqueue(&player, "b").await.unwrap();
        let first = transport.last();

        first.set_status(ConnectionStatus::Disconnected);
        transport.set_mode(ReadyMode::Never);

        let result = enqueue(&player, "c").await;

        assert!(matches!(result, Err(MusicError::ConnectionFailed(_))));
        assert_eq!(transport.opened(), 2);
        assert!(first.is_destroyed());
        assert!(transport.last().is_destroyed());

        let snapshot = player.query_queue(guild()).await;
        assert!(snapshot.is_empty());
        assert!(!snapshot.is_playing);
        assert!(!player.is_connected(guild()).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_guilds_are_independent() {
        let (player, transport) = player_with(abc(), ReadyMode::Immediate);
        let other = GuildId::new(2);

        enqueue(&player, "a").await.unwrap();
        player.enqueue(other, &url("b"), user(), channel()).await.unwrap();
        player.stop(guild()).await;

        assert!(player.query_queue(guild()).await.is_empty());
        assert_eq!(
            player.query_queue(other).await.current.map(|i| i.title),
            Some("Song B".to_string())
        );
        assert_eq!(transport.opened(), 2);
    }
}
