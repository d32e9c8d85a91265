//! Playback state machine of one guild.
//!
//! [`PlaybackController`] is the single writer of a room's playback state. It
//! is always driven under the room lock held by
//! [`RoomSession`](super::session::RoomSession) and never does slow work
//! itself: every transition returns a [`Transition`] describing the effects
//! (files to release, track to announce, session closed) that the session
//! runs once the lock is released.
//!
//! Each `play` on the voice connection gets a fresh generation number. A
//! completion event only advances the queue if its generation is still the
//! one in the now-playing slot, so the late end-event of a stopped or skipped
//! stream is ignored instead of advancing twice.

use tracing::{debug, error, info, warn};

use super::{
    queue::{MusicQueue, QueueSnapshot},
    track::{Track, TrackInfo},
    voice::{CompletionHook, RoomTarget, VoiceConnection, VoiceTransport},
};
use crate::error::{MusicError, MusicResult};

/// Construye el hook de fin para una generación dada
pub type HookFactory = dyn Fn(u64) -> CompletionHook + Send + Sync;

#[derive(Debug)]
pub struct NowPlaying {
    track: Track,
    generation: u64,
}

impl NowPlaying {
    pub fn track(&self) -> &Track {
        &self.track
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

#[derive(Debug, Default)]
pub enum PlaybackState {
    #[default]
    Idle,
    Playing(NowPlaying),
    Paused(NowPlaying),
}

impl PlaybackState {
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    pub fn now_playing(&self) -> Option<&NowPlaying> {
        match self {
            Self::Idle => None,
            Self::Playing(now) | Self::Paused(now) => Some(now),
        }
    }

    fn take(&mut self) -> Option<NowPlaying> {
        match std::mem::take(self) {
            Self::Idle => None,
            Self::Playing(now) | Self::Paused(now) => Some(now),
        }
    }
}

/// Efectos de una transición, a ejecutar fuera del lock
#[derive(Debug, Default)]
#[must_use]
pub struct Transition {
    /// Tracks que ya no tienen dueño y deben liberarse
    pub released: Vec<Track>,
    /// Track que acaba de ocupar el slot
    pub started: Option<TrackInfo>,
    /// La sesión terminó y debe salir del registro
    pub closed: bool,
    /// Fallo al iniciar el siguiente track
    pub failure: Option<MusicError>,
}

impl Transition {
    pub fn absorb(&mut self, other: Transition) {
        self.released.extend(other.released);
        if other.started.is_some() {
            self.started = other.started;
        }
        self.closed |= other.closed;
        if other.failure.is_some() {
            self.failure = other.failure;
        }
    }
}

pub struct PlaybackController {
    queue: MusicQueue,
    state: PlaybackState,
    connection: Option<Box<dyn VoiceConnection>>,
    generation: u64,
    closed: bool,
}

impl PlaybackController {
    pub fn new(max_queue_size: usize) -> Self {
        Self {
            queue: MusicQueue::new(max_queue_size),
            state: PlaybackState::Idle,
            connection: None,
            generation: 0,
            closed: false,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn is_idle(&self) -> bool {
        self.state.is_idle()
    }

    #[cfg(test)]
    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    #[cfg(test)]
    pub fn state(&self) -> &PlaybackState {
        &self.state
    }

    pub fn queue(&self) -> &MusicQueue {
        &self.queue
    }

    /// Conecta al canal de voz si la sesión aún no tiene conexión
    pub async fn ensure_connected(
        &mut self,
        transport: &dyn VoiceTransport,
        room: &RoomTarget,
    ) -> MusicResult<()> {
        if self.connection.is_none() {
            self.connection = Some(transport.connect(room).await?);
        }
        Ok(())
    }

    /// La conexión de voz de la sesión sigue en su canal
    pub async fn is_voice_alive(&self) -> bool {
        match &self.connection {
            Some(connection) => connection.is_connected().await,
            None => false,
        }
    }

    /// Cierra una sesión que nunca llegó a usarse (conexión fallida)
    pub fn close_if_unused(&mut self) -> bool {
        if self.connection.is_none() && self.queue.is_empty() && self.state.is_idle() {
            self.closed = true;
        }
        self.closed
    }

    /// Encola los tracks en orden; los que no caben van a `transition.released`
    pub fn enqueue(&mut self, tracks: Vec<Track>, transition: &mut Transition) -> Vec<TrackInfo> {
        let mut accepted = Vec::with_capacity(tracks.len());

        for track in tracks {
            let info = track.info().clone();
            match self.queue.enqueue(track) {
                Ok(()) => accepted.push(info),
                Err(rejected) => {
                    warn!(
                        "🚫 Cola llena ({}), descartando: {}",
                        self.queue.capacity(),
                        rejected.title()
                    );
                    transition.released.push(rejected);
                }
            }
        }

        accepted
    }

    /// Pasa al siguiente track de la cola.
    ///
    /// El track anterior solo se entrega para liberar después de que el
    /// siguiente (o la desconexión) ocupó el slot.
    pub async fn advance(&mut self, arm: &HookFactory) -> Transition {
        let mut transition = Transition::default();
        let previous = self.state.take();

        match self.queue.pop_front() {
            Some(track) => match self.start(track, arm).await {
                Ok(info) => transition.started = Some(info),
                Err(err) => transition.failure = Some(err),
            },
            None => self.shutdown_connection(&mut transition).await,
        }

        if let Some(previous) = previous {
            transition.released.push(previous.track);
        }

        transition
    }

    async fn start(&mut self, track: Track, arm: &HookFactory) -> MusicResult<TrackInfo> {
        let Some(connection) = self.connection.as_ref() else {
            self.queue.push_front(track);
            return Err(MusicError::ConnectionFailed("sin conexión de voz".to_string()));
        };

        self.generation += 1;
        let generation = self.generation;

        match connection.play(track.stream(), arm(generation)).await {
            Ok(()) => {
                info!("🎵 Reproduciendo: {}", track.title());
                let info = track.info().clone();
                self.state = PlaybackState::Playing(NowPlaying { track, generation });
                Ok(info)
            }
            Err(err) => {
                error!("❌ No se pudo iniciar {}: {}", track.title(), err);
                self.queue.push_front(track);
                Err(err)
            }
        }
    }

    /// Evento de fin de stream. Solo avanza si `generation` sigue sonando.
    pub async fn on_track_end(&mut self, generation: u64, arm: &HookFactory) -> Option<Transition> {
        match self.state.now_playing() {
            Some(now) if now.generation == generation => {
                debug!("Track terminado, reproduciendo siguiente...");
                Some(self.advance(arm).await)
            }
            _ => {
                debug!("⏭️ Evento de fin obsoleto (generación {}) ignorado", generation);
                None
            }
        }
    }

    pub async fn skip(&mut self, arm: &HookFactory) -> MusicResult<(TrackInfo, Transition)> {
        let skipped = match self.state.now_playing() {
            Some(now) => now.track.info().clone(),
            None => return Err(MusicError::NothingPlaying),
        };

        if let Some(connection) = &self.connection {
            connection.stop().await;
        }
        info!("⏭️ Saltando: {}", skipped.title);

        Ok((skipped, self.advance(arm).await))
    }

    pub async fn pause(&mut self) -> MusicResult<()> {
        match &self.state {
            PlaybackState::Idle => return Err(MusicError::NothingPlaying),
            PlaybackState::Paused(_) => return Err(MusicError::NothingPaused),
            PlaybackState::Playing(_) => {}
        }

        let connection = self.connection.as_ref().ok_or(MusicError::NotConnected)?;
        // El stream pudo terminar con su evento de fin aún en camino
        if !connection.is_playing().await {
            return Err(MusicError::NothingPlaying);
        }
        connection.pause().await?;

        if let Some(now) = self.state.take() {
            self.state = PlaybackState::Paused(now);
        }
        info!("⏸️ Reproducción pausada");
        Ok(())
    }

    pub async fn resume(&mut self) -> MusicResult<()> {
        if !matches!(self.state, PlaybackState::Paused(_)) {
            return Err(MusicError::NothingPaused);
        }

        let connection = self.connection.as_ref().ok_or(MusicError::NotConnected)?;
        if !connection.is_paused().await {
            return Err(MusicError::NothingPaused);
        }
        connection.resume().await?;

        if let Some(now) = self.state.take() {
            self.state = PlaybackState::Playing(now);
        }
        info!("▶️ Reproducción reanudada");
        Ok(())
    }

    /// Detiene todo: stream, cola y conexión. La sesión queda cerrada.
    pub async fn stop(&mut self) -> Transition {
        let mut transition = Transition::default();

        if let Some(connection) = &self.connection {
            connection.stop().await;
        }
        let current = self.state.take();
        transition.released.extend(self.queue.drain());
        self.shutdown_connection(&mut transition).await;

        if let Some(current) = current {
            transition.released.push(current.track);
        }

        info!("⏹️ Reproducción detenida");
        transition
    }

    pub fn remove_at(&mut self, index: usize) -> MusicResult<Track> {
        self.queue.remove_at(index)
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            now_playing: self.state.now_playing().map(|now| now.track.info().clone()),
            paused: matches!(self.state, PlaybackState::Paused(_)),
            upcoming: self.queue.entries(),
        }
    }

    async fn shutdown_connection(&mut self, transition: &mut Transition) {
        if let Some(connection) = self.connection.take() {
            if let Err(e) = connection.disconnect().await {
                warn!("Error al desconectar: {}", e);
            }
        }
        self.closed = true;
        transition.closed = true;
    }
}
