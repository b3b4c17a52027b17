//! # Connection Lifecycle
//!
//! Ciclo de vida de la conexión de voz de una guild: unirse, esperar a que
//! esté lista, detectar conexiones obsoletas y decidir si una desconexión
//! se recupera o se abandona.
//!
//! El transporte real (songbird) vive en `bot::voice`; aquí solo se
//! describen las capacidades que el orquestador necesita.

use async_trait::async_trait;
use serenity::model::id::{ChannelId, GuildId};
use std::{fmt, sync::Arc, time::Duration};
use tokio::sync::watch;
use tracing::{info, warn};

use super::session::AudioSink;
use crate::error::{MusicError, MusicResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Signalling,
    Connecting,
    Ready,
    Disconnected,
    Destroyed,
}

impl ConnectionStatus {
    /// Conectada o intentando (re)conectarse
    pub fn is_alive(self) -> bool {
        matches!(self, Self::Ready | Self::Signalling | Self::Connecting)
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Signalling => "signalling",
            Self::Connecting => "connecting",
            Self::Ready => "ready",
            Self::Disconnected => "disconnected",
            Self::Destroyed => "destroyed",
        };
        f.write_str(name)
    }
}

/// Conexión de voz abierta contra un canal.
#[async_trait]
pub trait VoiceConnection: Send + Sync {
    fn channel_id(&self) -> ChannelId;

    /// Observador de las transiciones de estado del transporte
    fn status(&self) -> watch::Receiver<ConnectionStatus>;

    /// Salida de audio a la que se suscribe la sesión de reproducción
    fn output(&self) -> Arc<dyn AudioSink>;

    async fn destroy(&self);
}

#[async_trait]
pub trait VoiceTransport: Send + Sync {
    /// Abre una conexión; no espera a que esté lista
    async fn open(&self, guild_id: GuildId, channel_id: ChannelId)
        -> MusicResult<Arc<dyn VoiceConnection>>;
}

/// Estado publicado por un transporte, con log de cada transición.
#[derive(Clone)]
pub struct StatusCell {
    guild_id: GuildId,
    tx: Arc<watch::Sender<ConnectionStatus>>,
}

impl StatusCell {
    pub fn new(guild_id: GuildId, initial: ConnectionStatus) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self {
            guild_id,
            tx: Arc::new(tx),
        }
    }

    pub fn set(&self, status: ConnectionStatus) {
        let old = self.tx.send_replace(status);
        if old != status {
            info!("🔊 Voz en guild {}: {} -> {}", self.guild_id, old, status);
        }
    }

    pub fn get(&self) -> ConnectionStatus {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionStatus> {
        self.tx.subscribe()
    }
}

pub fn is_valid(connection: Option<&Arc<dyn VoiceConnection>>) -> bool {
    connection.is_some_and(|c| c.status().borrow().is_alive())
}

/// Tiempos del ciclo de vida de la conexión
#[derive(Clone)]
pub struct ConnectionManager {
    transport: Arc<dyn VoiceTransport>,
    connect_timeout: Duration,
    reconnect_timeout: Duration,
}

impl ConnectionManager {
    pub fn new(
        transport: Arc<dyn VoiceTransport>,
        connect_timeout: Duration,
        reconnect_timeout: Duration,
    ) -> Self {
        Self {
            transport,
            connect_timeout,
            reconnect_timeout,
        }
    }

    /// Abre una conexión y espera a que llegue a `Ready`.
    /// Si no llega a tiempo, la conexión se destruye y se devuelve `ConnectionFailed`.
    pub async fn connect(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> MusicResult<Arc<dyn VoiceConnection>> {
        info!("🔊 Uniéndose al canal {} en guild {}", channel_id, guild_id);
        let connection = self.transport.open(guild_id, channel_id).await?;

        match wait_for_ready(connection.as_ref(), self.connect_timeout).await {
            Ok(()) => {
                info!("✅ Conectado al canal de voz en guild {}", guild_id);
                Ok(connection)
            }
            Err(e) => {
                warn!("❌ Conexión fallida en guild {}: {}", guild_id, e);
                connection.destroy().await;
                Err(e)
            }
        }
    }

    /// Tras un `Disconnected`, espera a que el transporte intente recuperarse.
    /// Devuelve `false` si la desconexión debe tratarse como definitiva.
    pub async fn await_recovery(&self, status: &mut watch::Receiver<ConnectionStatus>) -> bool {
        let recovering = tokio::time::timeout(
            self.reconnect_timeout,
            status.wait_for(|s| *s != ConnectionStatus::Disconnected),
        )
        .await;

        match recovering {
            Ok(Ok(current)) => current.is_alive(),
            _ => false,
        }
    }
}

async fn wait_for_ready(connection: &dyn VoiceConnection, timeout: Duration) -> MusicResult<()> {
    let mut status = connection.status();

    let reached = tokio::time::timeout(
        timeout,
        status.wait_for(|s| matches!(s, ConnectionStatus::Ready | ConnectionStatus::Destroyed)),
    )
    .await
    .map_err(|_| MusicError::ConnectionFailed(format!("no estuvo lista en {:?}", timeout)))?
    .map(|s| *s)
    .map_err(|_| MusicError::ConnectionFailed("el transporte se cerró".to_string()))?;

    match reached {
        ConnectionStatus::Ready => Ok(()),
        other => Err(MusicError::ConnectionFailed(format!("estado {}", other))),
    }
}
