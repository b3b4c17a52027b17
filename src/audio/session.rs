//! Sesión de reproducción: un único recurso activo por guild.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::{
    error::{MusicError, MusicResult},
    sources::ByteSource,
};

/// Identificador de cada recurso entregado a la salida de audio.
/// Los eventos de un recurso reemplazado se descartan por este id.
pub type TrackId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Buffering,
    Playing,
    Paused,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackEventKind {
    Playing,
    Buffering,
    /// Terminó de forma natural o fue detenido
    Idle,
    Error(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaybackEvent {
    pub track: TrackId,
    pub kind: PlaybackEventKind,
}

pub type PlaybackEvents = mpsc::UnboundedSender<PlaybackEvent>;

/// Salida de audio de una conexión de voz.
#[async_trait]
pub trait AudioSink: Send + Sync {
    /// Empieza a emitir `source`, reemplazando cualquier recurso previo.
    /// El ciclo de vida del recurso se reporta por `events` con el id `track`.
    async fn start(
        &self,
        track: TrackId,
        source: ByteSource,
        volume: f32,
        events: PlaybackEvents,
    ) -> MusicResult<Box<dyn TrackControl>>;
}

/// Control del recurso en reproducción.
pub trait TrackControl: Send + Sync {
    fn pause(&self) -> MusicResult<()>;
    fn resume(&self) -> MusicResult<()>;
    fn stop(&self) -> MusicResult<()>;
}

struct Subscription {
    output: Arc<dyn AudioSink>,
    events: PlaybackEvents,
}

struct ActiveTrack {
    id: TrackId,
    control: Box<dyn TrackControl>,
}

pub struct PlaybackSession {
    state: PlaybackState,
    volume: f32,
    subscription: Option<Subscription>,
    active: Option<ActiveTrack>,
    next_track: TrackId,
}

impl PlaybackSession {
    pub fn new(volume: f32) -> Self {
        Self {
            state: PlaybackState::Idle,
            volume,
            subscription: None,
            active: None,
            next_track: 1,
        }
    }

    #[cfg(test)]
    pub fn state(&self) -> PlaybackState {
        self.state
    }

    #[cfg(test)]
    pub fn is_subscribed(&self) -> bool {
        self.subscription.is_some()
    }

    /// Conecta la sesión a la salida de una conexión nueva.
    /// Reemplaza la suscripción anterior; el recurso activo se olvida.
    pub fn subscribe(&mut self, output: Arc<dyn AudioSink>, events: PlaybackEvents) {
        self.active = None;
        self.state = PlaybackState::Idle;
        self.subscription = Some(Subscription { output, events });
    }

    /// Suelta la salida sin emitir eventos; se usa al destruir la conexión
    pub fn detach(&mut self) {
        if let Some(active) = self.active.take() {
            if let Err(e) = active.control.stop() {
                debug!("No se pudo detener el track {} al desconectar: {}", active.id, e);
            }
        }
        self.subscription = None;
        self.state = PlaybackState::Idle;
    }

    pub async fn play(&mut self, source: ByteSource) -> MusicResult<TrackId> {
        let subscription = self
            .subscription
            .as_ref()
            .ok_or_else(|| MusicError::StreamError("sin salida de audio".to_string()))?;

        let id = self.next_track;
        self.next_track += 1;

        let control = subscription
            .output
            .start(id, source, self.volume, subscription.events.clone())
            .await?;

        self.active = Some(ActiveTrack { id, control });
        self.state = PlaybackState::Playing;
        Ok(id)
    }

    pub fn pause(&mut self) -> MusicResult<()> {
        let active = match (&self.active, self.state) {
            (Some(active), PlaybackState::Playing) => active,
            _ => return Err(MusicError::NotPlaying),
        };
        active.control.pause()?;
        self.state = PlaybackState::Paused;
        Ok(())
    }

    pub fn resume(&mut self) -> MusicResult<()> {
        let active = match (&self.active, self.state) {
            (Some(active), PlaybackState::Paused) => active,
            _ => return Err(MusicError::NotPaused),
        };
        active.control.resume()?;
        self.state = PlaybackState::Playing;
        Ok(())
    }

    /// Detiene el recurso activo. Su evento `Idle` sigue siendo válido, así
    /// que el orquestador avanzará la cola cuando llegue.
    ///
    /// Devuelve `false` si no había nada que detener.
    pub fn stop(&mut self) -> bool {
        self.state = PlaybackState::Idle;
        match &self.active {
            Some(active) => {
                if let Err(e) = active.control.stop() {
                    warn!("⚠️ Error al detener el track {}: {}", active.id, e);
                }
                true
            }
            None => false,
        }
    }

    /// Aplica un evento de la salida. Devuelve `false` si el evento viene de
    /// un recurso que ya no es el activo.
    pub fn on_event(&mut self, event: &PlaybackEvent) -> bool {
        if self.active.as_ref().map(|a| a.id) != Some(event.track) {
            return false;
        }

        match &event.kind {
            PlaybackEventKind::Playing => {
                if self.state == PlaybackState::Buffering {
                    self.state = PlaybackState::Playing;
                }
            }
            PlaybackEventKind::Buffering => {
                if self.state == PlaybackState::Playing {
                    self.state = PlaybackState::Buffering;
                }
            }
            PlaybackEventKind::Idle | PlaybackEventKind::Error(_) => {
                self.active = None;
                self.state = PlaybackState::Idle;
            }
        }
        true
    }
}
