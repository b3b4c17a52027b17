//! Transporte de voz sobre songbird.

use async_trait::async_trait;
use serenity::model::id::{ChannelId, GuildId};
use songbird::{
    input::{AudioStream, Input, LiveInput},
    tracks::TrackHandle,
    Call, Event as VoiceEvent, Songbird, TrackEvent,
};
use std::sync::Arc;
use symphonia::core::io::{MediaSource, ReadOnlySource};
use tokio::sync::{watch, Mutex};
use tracing::{debug, warn};

use crate::{
    audio::{
        connection::{ConnectionStatus, StatusCell, VoiceConnection, VoiceTransport},
        session::{
            AudioSink, PlaybackEvent, PlaybackEventKind, PlaybackEvents, TrackControl, TrackId,
        },
    },
    bot::events::{register_voice_events, TrackEventForwarder},
    error::{MusicError, MusicResult},
    sources::{ByteSource, StreamEvent},
};

pub struct SongbirdTransport {
    manager: Arc<Songbird>,
}

impl SongbirdTransport {
    pub fn new(manager: Arc<Songbird>) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl VoiceTransport for SongbirdTransport {
    async fn open(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> MusicResult<Arc<dyn VoiceConnection>> {
        let call = self.manager.get_or_insert(guild_id);
        let status = StatusCell::new(guild_id, ConnectionStatus::Signalling);

        {
            let mut handler = call.lock().await;
            handler.remove_all_global_events();
            register_voice_events(&mut handler, guild_id, status.clone());
        }

        // El join de songbird bloquea hasta conectar; la espera con timeout
        // la hace el gestor de conexiones observando el estado
        let manager = self.manager.clone();
        let joining = status.clone();
        joining.set(ConnectionStatus::Connecting);
        tokio::spawn(async move {
            match manager.join(guild_id, channel_id).await {
                Ok(_) if joining.get() == ConnectionStatus::Destroyed => {
                    debug!("Join tardío en guild {}, saliendo", guild_id);
                    let _ = manager.remove(guild_id).await;
                }
                Ok(_) => joining.set(ConnectionStatus::Ready),
                Err(e) => {
                    warn!("❌ Error al unirse al canal {} en guild {}: {:?}", channel_id, guild_id, e);
                    let _ = manager.remove(guild_id).await;
                    joining.set(ConnectionStatus::Destroyed);
                }
            }
        });

        Ok(Arc::new(SongbirdConnection {
            guild_id,
            channel_id,
            manager: self.manager.clone(),
            call,
            status,
        }))
    }
}

struct SongbirdConnection {
    guild_id: GuildId,
    channel_id: ChannelId,
    manager: Arc<Songbird>,
    call: Arc<Mutex<Call>>,
    status: StatusCell,
}

#[async_trait]
impl VoiceConnection for SongbirdConnection {
    fn channel_id(&self) -> ChannelId {
        self.channel_id
    }

    fn status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.subscribe()
    }

    fn output(&self) -> Arc<dyn AudioSink> {
        Arc::new(SongbirdSink {
            guild_id: self.guild_id,
            call: self.call.clone(),
        })
    }

    async fn destroy(&self) {
        if self.status.get() == ConnectionStatus::Destroyed {
            return;
        }
        self.status.set(ConnectionStatus::Destroyed);

        if let Err(e) = self.manager.remove(self.guild_id).await {
            debug!("Songbird ya no tenía llamada en guild {}: {:?}", self.guild_id, e);
        }
    }
}

struct SongbirdSink {
    guild_id: GuildId,
    call: Arc<Mutex<Call>>,
}

#[async_trait]
impl AudioSink for SongbirdSink {
    async fn start(
        &self,
        track: TrackId,
        source: ByteSource,
        volume: f32,
        events: PlaybackEvents,
    ) -> MusicResult<Box<dyn TrackControl>> {
        debug!("🎶 Track {} desde {}", track, source.locator());
        let (reader, stream_events) = source.into_parts();
        let input = Input::Live(
            LiveInput::Raw(AudioStream {
                input: Box::new(ReadOnlySource::new(reader)) as Box<dyn MediaSource>,
                hint: None,
            }),
            None,
        );

        let handle = {
            let mut call = self.call.lock().await;
            call.play_only_input(input)
        };
        handle.set_volume(volume).map_err(control_error)?;

        let forwarded = [
            (TrackEvent::Preparing, PlaybackEventKind::Buffering),
            (TrackEvent::Playable, PlaybackEventKind::Playing),
            (TrackEvent::End, PlaybackEventKind::Idle),
            (TrackEvent::Error, PlaybackEventKind::Error(String::new())),
        ];
        for (event, kind) in forwarded {
            handle
                .add_event(
                    VoiceEvent::Track(event),
                    TrackEventForwarder::new(self.guild_id, track, kind, events.clone()),
                )
                .map_err(control_error)?;
        }

        tokio::spawn(forward_stream_failures(track, stream_events, events));

        Ok(Box::new(SongbirdTrack { handle }))
    }
}

/// Los fallos del proceso de descarga llegan como error del recurso
async fn forward_stream_failures(
    track: TrackId,
    mut stream_events: tokio::sync::mpsc::UnboundedReceiver<StreamEvent>,
    events: PlaybackEvents,
) {
    while let Some(event) = stream_events.recv().await {
        match event {
            StreamEvent::Data => debug!("📥 Primeros bytes del track {}", track),
            StreamEvent::Ended => break,
            StreamEvent::Failed(message) => {
                let _ = events.send(PlaybackEvent {
                    track,
                    kind: PlaybackEventKind::Error(message),
                });
                break;
            }
        }
    }
}

struct SongbirdTrack {
    handle: TrackHandle,
}

impl TrackControl for SongbirdTrack {
    fn pause(&self) -> MusicResult<()> {
        self.handle.pause().map_err(control_error)
    }

    fn resume(&self) -> MusicResult<()> {
        self.handle.play().map_err(control_error)
    }

    fn stop(&self) -> MusicResult<()> {
        self.handle.stop().map_err(control_error)
    }
}

fn control_error(e: songbird::error::ControlError) -> MusicError {
    MusicError::StreamError(e.to_string())
}
