//! Transporte y salida de audio en memoria para las pruebas.

use async_trait::async_trait;
use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId};
use std::{sync::Arc, time::Duration};
use tokio::sync::watch;

use super::{
    connection::{ConnectionStatus, StatusCell, VoiceConnection, VoiceTransport},
    session::{AudioSink, PlaybackEvent, PlaybackEventKind, PlaybackEvents, TrackControl, TrackId},
};
use crate::{error::MusicResult, sources::ByteSource};

#[derive(Default)]
pub struct FakeSink {
    started: Mutex<Vec<(TrackId, String, f32)>>,
    events: Mutex<Option<PlaybackEvents>>,
}

impl FakeSink {
    pub fn started(&self) -> Vec<String> {
        self.started.lock().iter().map(|(_, url, _)| url.clone()).collect()
    }

    pub fn volumes(&self) -> Vec<f32> {
        self.started.lock().iter().map(|(_, _, volume)| *volume).collect()
    }

    pub fn last_track(&self) -> Option<TrackId> {
        self.started.lock().last().map(|(id, _, _)| *id)
    }

    /// Emite un evento como lo haría el driver de voz
    pub fn emit(&self, track: TrackId, kind: PlaybackEventKind) {
        if let Some(events) = self.events.lock().as_ref() {
            let _ = events.send(PlaybackEvent { track, kind });
        }
    }
}

#[async_trait]
impl AudioSink for FakeSink {
    async fn start(
        &self,
        track: TrackId,
        source: ByteSource,
        volume: f32,
        events: PlaybackEvents,
    ) -> MusicResult<Box<dyn TrackControl>> {
        self.started.lock().push((track, source.locator().to_string(), volume));
        *self.events.lock() = Some(events.clone());
        Ok(Box::new(FakeTrack { track, events }))
    }
}

struct FakeTrack {
    track: TrackId,
    events: PlaybackEvents,
}

impl TrackControl for FakeTrack {
    fn pause(&self) -> MusicResult<()> {
        Ok(())
    }

    fn resume(&self) -> MusicResult<()> {
        Ok(())
    }

    fn stop(&self) -> MusicResult<()> {
        let _ = self.events.send(PlaybackEvent {
            track: self.track,
            kind: PlaybackEventKind::Idle,
        });
        Ok(())
    }
}

pub struct FakeConnection {
    channel_id: ChannelId,
    status: StatusCell,
    sink: Arc<FakeSink>,
    destroyed: Mutex<bool>,
}

impl FakeConnection {
    pub fn set_status(&self, status: ConnectionStatus) {
        self.status.set(status);
    }

    pub fn is_destroyed(&self) -> bool {
        *self.destroyed.lock()
    }

    pub fn sink(&self) -> Arc<FakeSink> {
        self.sink.clone()
    }
}

#[async_trait]
impl VoiceConnection for FakeConnection {
    fn channel_id(&self) -> ChannelId {
        self.channel_id
    }

    fn status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.subscribe()
    }

    fn output(&self) -> Arc<dyn AudioSink> {
        self.sink.clone()
    }

    async fn destroy(&self) {
        *self.destroyed.lock() = true;
        self.status.set(ConnectionStatus::Destroyed);
    }
}

#[derive(Debug, Clone, Copy)]
pub enum ReadyMode {
    Immediate,
    After(Duration),
    Never,
}

pub struct FakeTransport {
    mode: Mutex<ReadyMode>,
    opened: Mutex<Vec<Arc<FakeConnection>>>,
}

impl FakeTransport {
    pub fn new(mode: ReadyMode) -> Self {
        Self {
            mode: Mutex::new(mode),
            opened: Mutex::new(Vec::new()),
        }
    }

    /// Cambia cómo se comportan las conexiones que se abran a partir de ahora
    pub fn set_mode(&self, mode: ReadyMode) {
        *self.mode.lock() = mode;
    }

    pub fn opened(&self) -> usize {
        self.opened.lock().len()
    }

    pub fn last(&self) -> Arc<FakeConnection> {
        self.opened
            .lock()
            .last()
            .cloned()
            .expect("no se abrió ninguna conexión")
    }
}

#[async_trait]
impl VoiceTransport for FakeTransport {
    async fn open(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> MusicResult<Arc<dyn VoiceConnection>> {
        let connection = Arc::new(FakeConnection {
            channel_id,
            status: StatusCell::new(guild_id, ConnectionStatus::Signalling),
            sink: Arc::new(FakeSink::default()),
            destroyed: Mutex::new(false),
        });

        let mode = *self.mode.lock();
        match mode {
            ReadyMode::Immediate => connection.set_status(ConnectionStatus::Ready),
            ReadyMode::After(delay) => {
                connection.set_status(ConnectionStatus::Connecting);
                let pending = connection.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    pending.set_status(ConnectionStatus::Ready);
                });
            }
            ReadyMode::Never => connection.set_status(ConnectionStatus::Connecting),
        }

        self.opened.lock().push(connection.clone());
        Ok(connection)
    }
}
