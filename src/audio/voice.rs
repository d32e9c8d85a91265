//! Voice transport seam.
//!
//! The playback core only sees [`VoiceTransport`] / [`VoiceConnection`]. The
//! production implementation drives a songbird [`Call`]; tests use an
//! in-memory fake.

use async_trait::async_trait;
use futures::future::BoxFuture;
use serenity::model::id::{ChannelId, GuildId};
use songbird::{
    error::JoinError,
    input::{File, HttpRequest, Input},
    tracks::{PlayMode, TrackHandle},
    Call, Event, EventContext, EventHandler as VoiceEventHandler, Songbird, TrackEvent,
};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use super::track::StreamSource;
use crate::error::{MusicError, MusicResult};

/// Callback que se ejecuta una sola vez cuando el stream termina
pub type CompletionHook = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

/// Dónde vive una sesión: guild, canal de voz y canal de texto para anuncios
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoomTarget {
    pub guild_id: GuildId,
    pub voice_channel: ChannelId,
    pub text_channel: ChannelId,
}

#[async_trait]
pub trait VoiceTransport: Send + Sync {
    async fn connect(&self, room: &RoomTarget) -> MusicResult<Box<dyn VoiceConnection>>;
}

#[async_trait]
pub trait VoiceConnection: Send + Sync {
    /// Empieza a reproducir `stream`; `on_complete` se llama cuando termina
    /// de forma natural o es detenido.
    async fn play(&self, stream: &StreamSource, on_complete: CompletionHook) -> MusicResult<()>;

    /// Detiene el stream actual. Idempotente.
    async fn stop(&self);

    async fn pause(&self) -> MusicResult<()>;

    async fn resume(&self) -> MusicResult<()>;

    async fn disconnect(&self) -> MusicResult<()>;

    async fn is_playing(&self) -> bool;

    async fn is_paused(&self) -> bool;

    /// La llamada sigue unida a un canal de voz
    async fn is_connected(&self) -> bool;
}

/// Transporte de voz sobre songbird
pub struct SongbirdTransport {
    manager: Arc<Songbird>,
    http: reqwest::Client,
    volume: f32,
}

impl SongbirdTransport {
    pub fn new(manager: Arc<Songbird>, volume: f32) -> Self {
        Self {
            manager,
            http: reqwest::Client::new(),
            volume,
        }
    }
}

#[async_trait]
impl VoiceTransport for SongbirdTransport {
    async fn connect(&self, room: &RoomTarget) -> MusicResult<Box<dyn VoiceConnection>> {
        let call = self
            .manager
            .join(room.guild_id, room.voice_channel)
            .await
            .map_err(|e| {
                error!("Error al conectar al canal de voz: {:?}", e);
                MusicError::ConnectionFailed(e.to_string())
            })?;

        info!("🔊 Conectado al canal de voz en guild {}", room.guild_id);

        Ok(Box::new(SongbirdConnection {
            manager: self.manager.clone(),
            guild_id: room.guild_id,
            call,
            http: self.http.clone(),
            volume: self.volume,
            current: parking_lot::Mutex::new(None),
        }))
    }
}

struct SongbirdConnection {
    manager: Arc<Songbird>,
    guild_id: GuildId,
    call: Arc<Mutex<Call>>,
    http: reqwest::Client,
    volume: f32,
    current: parking_lot::Mutex<Option<TrackHandle>>,
}

impl SongbirdConnection {
    fn input_for(&self, stream: &StreamSource) -> Input {
        match stream {
            StreamSource::File(path) => File::new(path.clone()).into(),
            StreamSource::Remote(url) => HttpRequest::new(self.http.clone(), url.clone()).into(),
        }
    }

    fn current(&self) -> Option<TrackHandle> {
        self.current.lock().clone()
    }

    async fn play_mode(&self) -> Option<PlayMode> {
        let handle = self.current()?;
        handle.get_info().await.ok().map(|state| state.playing)
    }
}

#[async_trait]
impl VoiceConnection for SongbirdConnection {
    async fn play(&self, stream: &StreamSource, on_complete: CompletionHook) -> MusicResult<()> {
        let input = self.input_for(stream);
        let handle = {
            let mut call = self.call.lock().await;
            call.play_input(input)
        };
        if let Err(e) = handle.set_volume(self.volume) {
            warn!("⚠️ No se pudo ajustar el volumen en guild {}: {}", self.guild_id, e);
        }

        // Fin natural, stop() y error de decodificación comparten el mismo hook
        let notifier = TrackEndNotifier::new(on_complete);
        for event in [TrackEvent::End, TrackEvent::Error] {
            if let Err(e) = handle.add_event(Event::Track(event), notifier.clone()) {
                let _ = handle.stop();
                return Err(MusicError::ConnectionFailed(format!(
                    "Error al agregar event handler: {}",
                    e
                )));
            }
        }

        if let Err(e) = handle.make_playable_async().await {
            let _ = handle.stop();
            return Err(MusicError::ConnectionFailed(format!(
                "No se pudo preparar el audio: {}",
                e
            )));
        }

        *self.current.lock() = Some(handle);
        Ok(())
    }

    async fn stop(&self) {
        let handle = self.current.lock().take();
        if let Some(handle) = handle {
            let _ = handle.stop();
            debug!("⏹️ Stream detenido en guild {}", self.guild_id);
        }
    }

    async fn pause(&self) -> MusicResult<()> {
        let handle = self.current().ok_or(MusicError::NothingPlaying)?;
        handle
            .pause()
            .map_err(|e| MusicError::ConnectionFailed(e.to_string()))
    }

    async fn resume(&self) -> MusicResult<()> {
        let handle = self.current().ok_or(MusicError::NothingPaused)?;
        handle
            .play()
            .map_err(|e| MusicError::ConnectionFailed(e.to_string()))
    }

    async fn disconnect(&self) -> MusicResult<()> {
        self.stop().await;

        match self.manager.remove(self.guild_id).await {
            Ok(()) => {
                info!("👋 Desconectado del canal de voz en guild {}", self.guild_id);
                Ok(())
            }
            Err(JoinError::NoCall) => {
                debug!("Guild {} ya no tenía llamada activa", self.guild_id);
                Ok(())
            }
            Err(e) => {
                warn!("Error al desconectar guild {}: {:?}", self.guild_id, e);
                Err(MusicError::ConnectionFailed(e.to_string()))
            }
        }
    }

    async fn is_playing(&self) -> bool {
        matches!(self.play_mode().await, Some(PlayMode::Play))
    }

    async fn is_paused(&self) -> bool {
        matches!(self.play_mode().await, Some(PlayMode::Pause))
    }

    async fn is_connected(&self) -> bool {
        // Tras un `remove` el manager ya no tiene esta llamada, aunque se haya
        // creado otra para la misma guild
        let registered = self
            .manager
            .get(self.guild_id)
            .is_some_and(|call| Arc::ptr_eq(&call, &self.call));
        registered && self.call.lock().await.current_channel().is_some()
    }
}

/// Handler de songbird que dispara el hook de fin una única vez
#[derive(Clone)]
struct TrackEndNotifier {
    hook: Arc<parking_lot::Mutex<Option<CompletionHook>>>,
}

impl TrackEndNotifier {
    fn new(hook: CompletionHook) -> Self {
        Self {
            hook: Arc::new(parking_lot::Mutex::new(Some(hook))),
        }
    }
}

#[async_trait]
impl VoiceEventHandler for TrackEndNotifier {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        if let EventContext::Track(tracks) = ctx {
            for (state, _handle) in *tracks {
                debug!("Track terminado con estado {:?}", state.playing);
            }
        }

        let hook = self.hook.lock().take();
        if let Some(hook) = hook {
            hook().await;
        }

        None
    }
}
