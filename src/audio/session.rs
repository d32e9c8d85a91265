//! One voice session per guild.
//!
//! A [`RoomSession`] owns the controller lock of its guild. Every operation
//! takes the lock, drives the [`PlaybackController`] and, once the lock is
//! dropped, runs the resulting [`Transition`]: deregistration, media release
//! and announcements. Nothing slow (disk, Discord messages) happens while the
//! lock is held except the voice transport calls themselves.

use async_trait::async_trait;
use dashmap::DashMap;
use futures::future::BoxFuture;
use serenity::model::id::GuildId;
use std::sync::{Arc, Weak};
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use super::{
    controller::{HookFactory, PlaybackController, Transition},
    media::MediaStore,
    queue::QueueSnapshot,
    track::{Track, TrackInfo},
    voice::{CompletionHook, RoomTarget, VoiceTransport},
};
use crate::error::{MusicError, MusicResult};

pub(crate) type SessionMap = DashMap<GuildId, Arc<RoomSession>>;

/// Avisos de reproducción hacia el canal de texto de la sesión
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PlaybackNotifier: Send + Sync {
    async fn now_playing(&self, room: &RoomTarget, track: &TrackInfo);

    async fn playback_failed(&self, room: &RoomTarget, error: &MusicError);
}

/// Resultado de un `play` aceptado
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Added {
    /// Título del primer track agregado
    pub title: String,
    pub count: usize,
    /// `true` si la reproducción arrancó con este pedido
    pub started: bool,
}

pub(crate) enum Admission {
    Done(MusicResult<Added>),
    /// La sesión se cerró antes de tomar el lock; los tracks vuelven intactos
    Closed(Vec<Track>),
}

pub struct RoomSession {
    room: RoomTarget,
    controller: Mutex<PlaybackController>,
    transport: Arc<dyn VoiceTransport>,
    media: Arc<MediaStore>,
    notifier: Arc<dyn PlaybackNotifier>,
    registry: Weak<SessionMap>,
}

impl RoomSession {
    pub(crate) fn new(
        room: RoomTarget,
        max_queue_size: usize,
        transport: Arc<dyn VoiceTransport>,
        media: Arc<MediaStore>,
        notifier: Arc<dyn PlaybackNotifier>,
        registry: Weak<SessionMap>,
    ) -> Self {
        debug!("🆕 Nueva sesión para guild {}", room.guild_id);
        Self {
            room,
            controller: Mutex::new(PlaybackController::new(max_queue_size)),
            transport,
            media,
            notifier,
            registry,
        }
    }

    pub fn room(&self) -> &RoomTarget {
        &self.room
    }

    pub(crate) async fn admit(self: &Arc<Self>, tracks: Vec<Track>) -> Admission {
        let mut controller = self.controller.lock().await;
        if controller.is_closed() {
            return Admission::Closed(tracks);
        }

        let mut transition = Transition::default();

        if let Err(err) = controller
            .ensure_connected(self.transport.as_ref(), &self.room)
            .await
        {
            transition.closed = controller.close_if_unused();
            transition.released = tracks;
            drop(controller);
            self.finish(transition).await;
            return Admission::Done(Err(err));
        }

        let accepted = controller.enqueue(tracks, &mut transition);
        let Some(first) = accepted.first() else {
            let capacity = controller.queue().capacity();
            drop(controller);
            self.finish(transition).await;
            return Admission::Done(Err(MusicError::QueueFull(capacity)));
        };

        let mut added = Added {
            title: first.title.clone(),
            count: accepted.len(),
            started: false,
        };
        let mut result = Ok(());

        if controller.is_idle() {
            let arm = self.arm();
            let mut advanced = controller.advance(arm.as_ref()).await;
            // El fallo vuelve al que pidió el play, no al canal
            match advanced.failure.take() {
                Some(err) => result = Err(err),
                None => added.started = advanced.started.is_some(),
            }
            transition.absorb(advanced);
        }

        drop(controller);
        self.finish(transition).await;

        Admission::Done(result.map(|()| added))
    }

    pub async fn skip(self: &Arc<Self>) -> MusicResult<TrackInfo> {
        let mut controller = self.controller.lock().await;
        if controller.is_closed() {
            return Err(MusicError::NothingPlaying);
        }

        let arm = self.arm();
        let (skipped, transition) = controller.skip(arm.as_ref()).await?;
        drop(controller);

        self.finish(transition).await;
        Ok(skipped)
    }

    pub async fn pause(&self) -> MusicResult<()> {
        let mut controller = self.controller.lock().await;
        if controller.is_closed() {
            return Err(MusicError::NothingPlaying);
        }
        controller.pause().await
    }

    pub async fn resume(&self) -> MusicResult<()> {
        let mut controller = self.controller.lock().await;
        if controller.is_closed() {
            return Err(MusicError::NothingPaused);
        }
        controller.resume().await
    }

    pub async fn stop(&self) -> MusicResult<()> {
        let mut controller = self.controller.lock().await;
        if controller.is_closed() {
            return Err(MusicError::NotConnected);
        }

        let transition = controller.stop().await;
        drop(controller);

        self.finish(transition).await;
        Ok(())
    }

    /// Cierra la sesión si su conexión de voz ya no existe.
    ///
    /// Devuelve `Ok(false)` cuando la conexión sigue viva: el aviso de
    /// desconexión era de una llamada anterior de la misma guild.
    pub async fn stop_if_disconnected(&self) -> MusicResult<bool> {
        let mut controller = self.controller.lock().await;
        if controller.is_closed() {
            return Err(MusicError::NotConnected);
        }
        if controller.is_voice_alive().await {
            return Ok(false);
        }

        let transition = controller.stop().await;
        drop(controller);

        self.finish(transition).await;
        Ok(true)
    }

    pub async fn remove(&self, index: usize) -> MusicResult<TrackInfo> {
        let mut controller = self.controller.lock().await;
        if controller.is_closed() {
            return Err(MusicError::OutOfRange { index, len: 0 });
        }

        let track = controller.remove_at(index)?;
        drop(controller);

        let info = track.info().clone();
        self.release(track).await;
        Ok(info)
    }

    pub async fn snapshot(&self) -> QueueSnapshot {
        let controller = self.controller.lock().await;
        if controller.is_closed() {
            return QueueSnapshot::default();
        }
        controller.snapshot()
    }

    /// Fábrica de hooks de fin para esta sesión.
    ///
    /// Los hooks guardan solo un `Weak`: un stream que sobrevive a su sesión
    /// no la mantiene viva.
    fn arm(self: &Arc<Self>) -> Box<HookFactory> {
        let session = Arc::downgrade(self);
        Box::new(move |generation| -> CompletionHook {
            let session = session.clone();
            Box::new(move || -> BoxFuture<'static, ()> {
                Box::pin(async move {
                    if let Some(session) = session.upgrade() {
                        session.on_track_end(generation).await;
                    }
                })
            })
        })
    }

    async fn on_track_end(self: Arc<Self>, generation: u64) {
        let mut controller = self.controller.lock().await;
        if controller.is_closed() {
            return;
        }

        let arm = self.arm();
        let Some(transition) = controller.on_track_end(generation, arm.as_ref()).await else {
            return;
        };
        drop(controller);

        self.finish(transition).await;
    }

    async fn finish(&self, transition: Transition) {
        let Transition {
            released,
            started,
            closed,
            failure,
        } = transition;

        if closed {
            self.deregister();
        }

        for track in released {
            self.release(track).await;
        }

        if let Some(error) = failure {
            error!("❌ Error de reproducción en guild {}: {}", self.room.guild_id, error);
            self.notifier.playback_failed(&self.room, &error).await;
        }

        if let Some(info) = started {
            self.notifier.now_playing(&self.room, &info).await;
        }
    }

    async fn release(&self, track: Track) {
        if let Some(media) = track.into_media() {
            self.media.release(media).await;
        }
    }

    fn deregister(&self) {
        let Some(registry) = self.registry.upgrade() else {
            return;
        };

        // Solo sale del registro si la entrada sigue siendo esta sesión
        let removed = registry
            .remove_if(&self.room.guild_id, |_, existing| {
                std::ptr::eq(existing.as_ref(), self)
            })
            .is_some();

        if removed {
            info!("👋 Sesión cerrada en guild {}", self.room.guild_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::testing::{room, FakeVoice, RecordingNotifier};
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        voice: FakeVoice,
        media: Arc<MediaStore>,
        notifier: Arc<RecordingNotifier>,
        registry: Arc<SessionMap>,
        session: Arc<RoomSession>,
    }

    async fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let media = Arc::new(MediaStore::open(dir.path()).await.unwrap());
        let voice = FakeVoice::new();
        let notifier = Arc::new(RecordingNotifier::default());
        let registry: Arc<SessionMap> = Arc::new(DashMap::new());
        let session = Arc::new(RoomSession::new(
            room(),
            10,
            Arc::new(voice.clone()),
            media.clone(),
            notifier.clone(),
            Arc::downgrade(&registry),
        ));
        registry.insert(room().guild_id, session.clone());

        Fixture {
            _dir: dir,
            voice,
            media,
            notifier,
            registry,
            session,
        }
    }

    async fn tracks(media: &MediaStore, titles: &[&str]) -> Vec<Track> {
        let mut tracks = Vec::new();
        for (i, title) in titles.iter().enumerate() {
            let path = media.root().join(format!("{}_{}.m4a", i, title));
            tokio::fs::write(&path, b"audio").await.unwrap();
            let handle = media.materialize(path).await.unwrap();
            tracks.push(Track::materialized(TrackInfo::new(*title, *title), handle));
        }
        tracks
    }

    fn added(admission: Admission) -> MusicResult<Added> {
        match admission {
            Admission::Done(result) => result,
            Admission::Closed(_) => panic!("sesión cerrada inesperadamente"),
        }
    }

    #[tokio::test]
    async fn test_natural_end_advances_and_closes() {
        let f = fixture().await;
        let batch = tracks(&f.media, &["x", "y"]).await;

        let result = added(f.session.admit(batch).await).unwrap();
        assert_eq!(result.count, 2);
        assert!(result.started);

        f.voice.finish_current().unwrap()().await;
        assert_eq!(f.voice.log().plays, vec!["x", "y"]);
        assert_eq!(f.media.live_count(), 1);

        f.voice.finish_current().unwrap()().await;
        assert_eq!(f.media.live_count(), 0);
        assert_eq!(f.voice.log().disconnects, 1);
        assert!(f.registry.is_empty());
        assert_eq!(f.notifier.announced(), vec!["x", "y"]);
    }

    #[tokio::test]
    async fn test_closed_session_hands_tracks_back() {
        let f = fixture().await;
        let batch = tracks(&f.media, &["x"]).await;
        added(f.session.admit(batch).await).unwrap();
        f.session.stop().await.unwrap();

        let late = tracks(&f.media, &["late"]).await;
        match f.session.admit(late).await {
            Admission::Closed(returned) => {
                assert_eq!(returned.len(), 1);
                assert_eq!(returned[0].title(), "late");
            }
            Admission::Done(_) => panic!("la sesión debía estar cerrada"),
        }
        assert_eq!(f.session.stop().await, Err(MusicError::NotConnected));
    }

    #[tokio::test]
    async fn test_stale_hook_after_skip_is_ignored() {
        let f = fixture().await;
        let batch = tracks(&f.media, &["x", "y", "z"]).await;
        added(f.session.admit(batch).await).unwrap();

        let skipped = f.session.skip().await.unwrap();
        assert_eq!(skipped.title, "x");

        // El evento de fin de "x" llega tarde
        for hook in f.voice.take_stopped_hooks() {
            hook().await;
        }

        assert_eq!(f.voice.log().plays, vec!["x", "y"]);
        assert_eq!(
            f.session.snapshot().await.now_playing.map(|i| i.title),
            Some("y".to_string())
        );
        assert_eq!(f.voice.log().overlaps, 0);
    }

    #[tokio::test]
    async fn test_failed_advance_is_reported_to_channel() {
        let f = fixture().await;
        let batch = tracks(&f.media, &["x", "y"]).await;
        added(f.session.admit(batch).await).unwrap();

        f.voice.log().fail_plays = 1;
        f.voice.finish_current().unwrap()().await;

        assert_eq!(f.notifier.announced(), vec!["x"]);
        assert!(matches!(
            f.notifier.failures().as_slice(),
            [MusicError::ConnectionFailed(_)]
        ));
        let snapshot = f.session.snapshot().await;
        assert!(snapshot.now_playing.is_none());
        assert_eq!(snapshot.titles(), vec![(1, "y")]);
        // "x" ya se liberó, "y" sigue en cola
        assert_eq!(f.media.live_count(), 1);
    }

    #[tokio::test]
    async fn test_remove_unblocks_after_failed_advance() {
        let f = fixture().await;
        let batch = tracks(&f.media, &["x", "y"]).await;
        added(f.session.admit(batch).await).unwrap();

        f.voice.log().fail_plays = 1;
        f.voice.finish_current().unwrap()().await;

        // Nada suena: skip no tiene qué saltar
        assert_eq!(f.session.skip().await, Err(MusicError::NothingPlaying));

        let removed = f.session.remove(1).await.unwrap();
        assert_eq!(removed.title, "y");
        assert_eq!(f.media.live_count(), 0);

        let next = tracks(&f.media, &["z"]).await;
        let result = added(f.session.admit(next).await).unwrap();
        assert!(result.started);
        assert_eq!(f.voice.log().plays, vec!["x", "z"]);
        assert_eq!(f.voice.log().connects, 1);
    }

    #[tokio::test]
    async fn test_stop_if_disconnected_only_when_kicked() {
        let f = fixture().await;
        let batch = tracks(&f.media, &["x", "y"]).await;
        added(f.session.admit(batch).await).unwrap();

        assert_eq!(f.session.stop_if_disconnected().await, Ok(false));
        assert_eq!(f.media.live_count(), 2);

        f.voice.log().kicked = true;
        assert_eq!(f.session.stop_if_disconnected().await, Ok(true));
        assert_eq!(f.media.live_count(), 0);
        assert!(f.registry.is_empty());
        assert_eq!(
            f.session.stop_if_disconnected().await,
            Err(MusicError::NotConnected)
        );
    }

    #[tokio::test]
    async fn test_hook_after_session_dropped_is_noop() {
        let f = fixture().await;
        let batch = tracks(&f.media, &["x"]).await;
        added(f.session.admit(batch).await).unwrap();

        let hook = f.voice.finish_current().unwrap();
        let Fixture {
            session, registry, ..
        } = f;
        registry.clear();
        drop(session);

        hook().await;
    }
}
