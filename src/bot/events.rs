use serenity::{async_trait, model::id::GuildId};
use songbird::{
    events::CoreEvent, tracks::PlayMode, Event as VoiceEvent, EventContext,
    EventHandler as VoiceEventHandler,
};
use tracing::{debug, error, info, warn};

use crate::audio::{
    connection::{ConnectionStatus, StatusCell},
    session::{PlaybackEvent, PlaybackEventKind, PlaybackEvents, TrackId},
};

/// Reenvía un evento de songbird de un track a la sesión de reproducción
pub struct TrackEventForwarder {
    guild_id: GuildId,
    track: TrackId,
    kind: PlaybackEventKind,
    events: PlaybackEvents,
}

impl TrackEventForwarder {
    pub fn new(
        guild_id: GuildId,
        track: TrackId,
        kind: PlaybackEventKind,
        events: PlaybackEvents,
    ) -> Self {
        Self {
            guild_id,
            track,
            kind,
            events,
        }
    }
}

#[async_trait]
impl VoiceEventHandler for TrackEventForwarder {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<VoiceEvent> {
        let kind = match &self.kind {
            PlaybackEventKind::Error(_) => {
                let message = describe_track_error(ctx);
                error!("❌ Error en track {} para guild {}: {}", self.track, self.guild_id, message);
                PlaybackEventKind::Error(message)
            }
            other => other.clone(),
        };

        if self
            .events
            .send(PlaybackEvent {
                track: self.track,
                kind,
            })
            .is_err()
        {
            debug!("Sesión de guild {} ya no escucha eventos", self.guild_id);
        }

        None
    }
}

fn describe_track_error(ctx: &EventContext<'_>) -> String {
    if let EventContext::Track(track_list) = ctx {
        for (state, _handle) in *track_list {
            if let PlayMode::Errored(e) = &state.playing {
                return format!("{:?}", e);
            }
        }
    }
    "error de reproducción desconocido".to_string()
}

/// Publica las transiciones del driver de voz en el estado de la conexión
pub struct ConnectionStatusForwarder {
    pub guild_id: GuildId,
    pub status: StatusCell,
    pub next: ConnectionStatus,
}

#[async_trait]
impl VoiceEventHandler for ConnectionStatusForwarder {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<VoiceEvent> {
        match ctx {
            EventContext::DriverDisconnect(data) => warn!(
                "🔌 Driver de voz desconectado en guild {}: {:?}",
                self.guild_id, data.reason
            ),
            _ if self.next == ConnectionStatus::Ready => {
                info!("🔄 Driver de voz conectado en guild {}", self.guild_id)
            }
            _ => {}
        }

        // Un Destroyed es definitivo
        if self.status.get() != ConnectionStatus::Destroyed {
            self.status.set(self.next);
        }

        None
    }
}

/// Registra los handlers de conexión de una llamada
pub fn register_voice_events(handler: &mut songbird::Call, guild_id: GuildId, status: StatusCell) {
    let transitions = [
        (CoreEvent::DriverConnect, ConnectionStatus::Ready),
        (CoreEvent::DriverReconnect, ConnectionStatus::Ready),
        (CoreEvent::DriverDisconnect, ConnectionStatus::Disconnected),
    ];

    for (event, next) in transitions {
        handler.add_global_event(
            VoiceEvent::Core(event),
            ConnectionStatusForwarder {
                guild_id,
                status: status.clone(),
                next,
            },
        );
    }
}
