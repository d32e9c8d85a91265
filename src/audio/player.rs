use serenity::model::id::{ChannelId, GuildId, UserId};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{
    media::MediaStore,
    queue::QueueSnapshot,
    session::{Admission, PlaybackNotifier, RoomSession, SessionMap},
    track::{Track, TrackInfo},
    voice::{RoomTarget, VoiceTransport},
};
use crate::{
    error::{MusicError, MusicResult},
    sources::TrackResolver,
};

pub use super::session::Added;

/// Pedido de reproducción tal como llega del comando
#[derive(Debug, Clone)]
pub struct PlayRequest {
    pub guild_id: GuildId,
    /// Canal de voz del usuario, si está en uno
    pub voice_channel: Option<ChannelId>,
    pub text_channel: ChannelId,
    pub requested_by: UserId,
    pub query: String,
}

/// Punto de entrada de la reproducción para todas las guilds.
///
/// Guarda a lo sumo una [`RoomSession`] por guild. Las sesiones se crean con
/// el primer `play` y salen del registro solas cuando se cierran.
pub struct AudioPlayer {
    sessions: Arc<SessionMap>,
    resolver: Arc<dyn TrackResolver>,
    transport: Arc<dyn VoiceTransport>,
    media: Arc<MediaStore>,
    notifier: Arc<dyn PlaybackNotifier>,
    max_queue_size: usize,
}

impl AudioPlayer {
    pub fn new(
        resolver: Arc<dyn TrackResolver>,
        transport: Arc<dyn VoiceTransport>,
        media: Arc<MediaStore>,
        notifier: Arc<dyn PlaybackNotifier>,
        max_queue_size: usize,
    ) -> Self {
        Self {
            sessions: Arc::new(SessionMap::new()),
            resolver,
            transport,
            media,
            notifier,
            max_queue_size,
        }
    }

    /// Resuelve `query` y lo agrega a la cola de la guild, conectando y
    /// arrancando la reproducción si hace falta.
    pub async fn play(&self, request: PlayRequest) -> MusicResult<Added> {
        if !self.sessions.contains_key(&request.guild_id) && request.voice_channel.is_none() {
            return Err(MusicError::NotInRoom);
        }

        // La descarga ocurre sin tomar el lock de la sesión
        info!("🔍 Resolviendo: {}", request.query);
        let mut tracks = self.resolver.resolve(&request.query).await?;
        if tracks.is_empty() {
            return Err(MusicError::ResolutionFailed(format!(
                "sin resultados para: {}",
                request.query
            )));
        }
        for track in &mut tracks {
            track.set_requested_by(request.requested_by);
        }

        loop {
            let Some(session) = self.session_for(&request) else {
                self.release_all(tracks).await;
                return Err(MusicError::NotInRoom);
            };

            match session.admit(tracks).await {
                Admission::Done(result) => return result,
                Admission::Closed(returned) => {
                    // Se cerró entre el lookup y el lock: se crea una nueva
                    debug!("Sesión de guild {} cerrada durante el play, reintentando", request.guild_id);
                    self.sessions
                        .remove_if(&request.guild_id, |_, existing| Arc::ptr_eq(existing, &session));
                    tracks = returned;
                }
            }
        }
    }

    pub async fn skip(&self, guild_id: GuildId) -> MusicResult<TrackInfo> {
        match self.session(guild_id) {
            Some(session) => session.skip().await,
            None => Err(MusicError::NothingPlaying),
        }
    }

    pub async fn pause(&self, guild_id: GuildId) -> MusicResult<()> {
        match self.session(guild_id) {
            Some(session) => session.pause().await,
            None => Err(MusicError::NothingPlaying),
        }
    }

    pub async fn resume(&self, guild_id: GuildId) -> MusicResult<()> {
        match self.session(guild_id) {
            Some(session) => session.resume().await,
            None => Err(MusicError::NothingPaused),
        }
    }

    /// Detiene la reproducción, vacía la cola y desconecta
    pub async fn stop(&self, guild_id: GuildId) -> MusicResult<()> {
        match self.session(guild_id) {
            Some(session) => session.stop().await,
            None => Err(MusicError::NotConnected),
        }
    }

    /// Elimina el track en la posición `index` (1-based) de la cola
    pub async fn remove(&self, guild_id: GuildId, index: usize) -> MusicResult<TrackInfo> {
        match self.session(guild_id) {
            Some(session) => session.remove(index).await,
            None => Err(MusicError::OutOfRange { index, len: 0 }),
        }
    }

    pub async fn queue_snapshot(&self, guild_id: GuildId) -> QueueSnapshot {
        match self.session(guild_id) {
            Some(session) => session.snapshot().await,
            None => QueueSnapshot::default(),
        }
    }

    /// Cierre forzado cuando el bot fue desconectado del canal.
    ///
    /// Solo cierra la sesión si su propia conexión se perdió; un aviso
    /// atrasado de una llamada anterior no afecta a la sesión nueva.
    pub async fn teardown(&self, guild_id: GuildId) {
        let Some(session) = self.session(guild_id) else {
            return;
        };

        match session.stop_if_disconnected().await {
            Ok(true) => info!("🧹 Sesión de guild {} limpiada", guild_id),
            Ok(false) => debug!(
                "🔊 Aviso de desconexión atrasado en guild {}, la sesión sigue conectada",
                guild_id
            ),
            Err(MusicError::NotConnected) => {}
            Err(e) => warn!("Error limpiando guild {}: {}", guild_id, e),
        }
    }

    /// Detiene todas las sesiones activas
    pub async fn shutdown(&self) {
        let sessions: Vec<Arc<RoomSession>> =
            self.sessions.iter().map(|entry| entry.value().clone()).collect();

        if !sessions.is_empty() {
            info!("⏹️ Deteniendo {} sesiones activas", sessions.len());
        }
        for session in sessions {
            if let Err(e) = session.stop().await {
                debug!("Sesión de guild {} ya cerrada: {}", session.room().guild_id, e);
            }
        }
    }

    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }

    fn session(&self, guild_id: GuildId) -> Option<Arc<RoomSession>> {
        self.sessions.get(&guild_id).map(|entry| entry.value().clone())
    }

    fn session_for(&self, request: &PlayRequest) -> Option<Arc<RoomSession>> {
        if let Some(session) = self.session(request.guild_id) {
            return Some(session);
        }

        let voice_channel = request.voice_channel?;
        let room = RoomTarget {
            guild_id: request.guild_id,
            voice_channel,
            text_channel: request.text_channel,
        };

        let session = self
            .sessions
            .entry(request.guild_id)
            .or_insert_with(|| {
                Arc::new(RoomSession::new(
                    room,
                    self.max_queue_size,
                    self.transport.clone(),
                    self.media.clone(),
                    self.notifier.clone(),
                    Arc::downgrade(&self.sessions),
                ))
            })
            .clone();

        Some(session)
    }

    async fn release_all(&self, tracks: Vec<Track>) {
        for track in tracks {
            if let Some(media) = track.into_media() {
                self.media.release(media).await;
            }
        }
    }
}
