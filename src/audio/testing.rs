//! In-memory doubles for the voice transport, resolver and notifier.

use async_trait::async_trait;
use futures::future::BoxFuture;
use parking_lot::{Mutex, MutexGuard};
use serenity::model::id::{ChannelId, GuildId, UserId};
use std::{
    path::Path,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};
use tempfile::TempDir;

use super::{
    media::MediaStore,
    player::{AudioPlayer, PlayRequest},
    session::PlaybackNotifier,
    track::{StreamSource, Track, TrackInfo},
    voice::{CompletionHook, RoomTarget, VoiceConnection, VoiceTransport},
};
use crate::{
    error::{MusicError, MusicResult},
    sources::TrackResolver,
};

fn noop_hook(_generation: u64) -> CompletionHook {
    Box::new(|| -> BoxFuture<'static, ()> { Box::pin(async {}) })
}

/// Fábrica de hooks que no hacen nada
pub const NO_HOOK: fn(u64) -> CompletionHook = noop_hook;

pub fn room() -> RoomTarget {
    RoomTarget {
        guild_id: GuildId::new(1),
        voice_channel: ChannelId::new(10),
        text_channel: ChannelId::new(20),
    }
}

pub struct ActiveStream {
    pub paused: bool,
    pub stopped: bool,
    hook: Option<CompletionHook>,
}

#[derive(Default)]
pub struct VoiceLog {
    pub connects: usize,
    pub disconnects: usize,
    pub plays: Vec<String>,
    pub stops: usize,
    /// Veces que un stream empezó con otro todavía sonando
    pub overlaps: usize,
    pub active: Option<ActiveStream>,
    pub fail_connect: bool,
    pub fail_plays: usize,
    /// La conexión actual fue cortada desde fuera (kick, canal borrado)
    pub kicked: bool,
    stopped_hooks: Vec<CompletionHook>,
}

#[derive(Clone, Default)]
pub struct FakeVoice(Arc<Mutex<VoiceLog>>);

impl FakeVoice {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log(&self) -> MutexGuard<'_, VoiceLog> {
        self.0.lock()
    }

    /// Termina el stream actual de forma natural y entrega su hook
    pub fn finish_current(&self) -> Option<CompletionHook> {
        let mut log = self.0.lock();
        let active = log.active.as_mut()?;
        active.stopped = true;
        active.hook.take()
    }

    /// Hooks de streams detenidos con `stop`, pendientes de disparar
    pub fn take_stopped_hooks(&self) -> Vec<CompletionHook> {
        std::mem::take(&mut self.0.lock().stopped_hooks)
    }
}

#[async_trait]
impl VoiceTransport for FakeVoice {
    async fn connect(&self, _room: &RoomTarget) -> MusicResult<Box<dyn VoiceConnection>> {
        let mut log = self.0.lock();
        log.connects += 1;
        log.kicked = false;
        if log.fail_connect {
            return Err(MusicError::ConnectionFailed("conexión simulada fallida".to_string()));
        }
        Ok(Box::new(FakeConnection(self.0.clone())))
    }
}

struct FakeConnection(Arc<Mutex<VoiceLog>>);

fn label(stream: &StreamSource) -> String {
    match stream {
        StreamSource::Remote(url) => url.clone(),
        StreamSource::File(path) => {
            let stem = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            match stem.split_once('_') {
                Some((_, title)) => title.to_string(),
                None => stem,
            }
        }
    }
}

#[async_trait]
impl VoiceConnection for FakeConnection {
    async fn play(&self, stream: &StreamSource, on_complete: CompletionHook) -> MusicResult<()> {
        let mut log = self.0.lock();
        if log.fail_plays > 0 {
            log.fail_plays -= 1;
            return Err(MusicError::ConnectionFailed("reproducción simulada fallida".to_string()));
        }

        if log.active.as_ref().is_some_and(|a| !a.stopped) {
            log.overlaps += 1;
        }
        log.plays.push(label(stream));
        log.active = Some(ActiveStream {
            paused: false,
            stopped: false,
            hook: Some(on_complete),
        });
        Ok(())
    }

    async fn stop(&self) {
        let mut log = self.0.lock();
        let Some(active) = log.active.as_mut() else {
            return;
        };
        if active.stopped {
            return;
        }
        active.stopped = true;
        let hook = active.hook.take();
        log.stops += 1;
        if let Some(hook) = hook {
            log.stopped_hooks.push(hook);
        }
    }

    async fn pause(&self) -> MusicResult<()> {
        let mut log = self.0.lock();
        match log.active.as_mut() {
            Some(active) if !active.stopped && !active.paused => {
                active.paused = true;
                Ok(())
            }
            _ => Err(MusicError::NothingPlaying),
        }
    }

    async fn resume(&self) -> MusicResult<()> {
        let mut log = self.0.lock();
        match log.active.as_mut() {
            Some(active) if !active.stopped && active.paused => {
                active.paused = false;
                Ok(())
            }
            _ => Err(MusicError::NothingPaused),
        }
    }

    async fn disconnect(&self) -> MusicResult<()> {
        self.stop().await;
        self.0.lock().disconnects += 1;
        Ok(())
    }

    async fn is_playing(&self) -> bool {
        self.0
            .lock()
            .active
            .as_ref()
            .is_some_and(|a| !a.stopped && !a.paused)
    }

    async fn is_paused(&self) -> bool {
        self.0
            .lock()
            .active
            .as_ref()
            .is_some_and(|a| !a.stopped && a.paused)
    }

    async fn is_connected(&self) -> bool {
        !self.0.lock().kicked
    }
}

/// Resolver que "descarga" escribiendo un archivo por título.
///
/// `"a,b"` produce dos tracks; un query con prefijo `fail:` falla.
pub struct FakeResolver {
    media: Arc<MediaStore>,
    delay: Duration,
    counter: AtomicUsize,
}

impl FakeResolver {
    pub fn new(media: Arc<MediaStore>, delay: Duration) -> Self {
        Self {
            media,
            delay,
            counter: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl TrackResolver for FakeResolver {
    async fn resolve(&self, query: &str) -> MusicResult<Vec<Track>> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if let Some(reason) = query.strip_prefix("fail:") {
            return Err(MusicError::ResolutionFailed(reason.to_string()));
        }

        let mut tracks = Vec::new();
        for title in query.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            let n = self.counter.fetch_add(1, Ordering::Relaxed);
            let path = self.media.root().join(format!("{}_{}.m4a", n, title));
            tokio::fs::write(&path, b"audio")
                .await
                .map_err(|e| MusicError::ResolutionFailed(e.to_string()))?;
            let handle = self.media.materialize(path).await?;
            let info = TrackInfo::new(title, format!("https://example.com/{}", title));
            tracks.push(Track::materialized(info, handle));
        }
        Ok(tracks)
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    announced: Mutex<Vec<String>>,
    failures: Mutex<Vec<MusicError>>,
}

impl RecordingNotifier {
    pub fn announced(&self) -> Vec<String> {
        self.announced.lock().clone()
    }

    pub fn failures(&self) -> Vec<MusicError> {
        self.failures.lock().clone()
    }
}

#[async_trait]
impl PlaybackNotifier for RecordingNotifier {
    async fn now_playing(&self, _room: &RoomTarget, track: &TrackInfo) {
        self.announced.lock().push(track.title.clone());
    }

    async fn playback_failed(&self, _room: &RoomTarget, error: &MusicError) {
        self.failures.lock().push(error.clone());
    }
}

/// Player completo sobre los dobles de prueba
pub struct Harness {
    _dir: TempDir,
    pub media: Arc<MediaStore>,
    pub voice: FakeVoice,
    pub notifier: Arc<RecordingNotifier>,
    pub player: AudioPlayer,
}

impl Harness {
    pub async fn new(max_queue_size: usize) -> Self {
        Self::build(max_queue_size, Duration::ZERO, None, None).await
    }

    pub async fn with_delay(max_queue_size: usize, delay: Duration) -> Self {
        Self::build(max_queue_size, delay, None, None).await
    }

    pub async fn with_resolver(max_queue_size: usize, resolver: Arc<dyn TrackResolver>) -> Self {
        Self::build(max_queue_size, Duration::ZERO, Some(resolver), None).await
    }

    pub async fn with_notifier(
        max_queue_size: usize,
        notifier: Arc<dyn PlaybackNotifier>,
    ) -> Self {
        Self::build(max_queue_size, Duration::ZERO, None, Some(notifier)).await
    }

    async fn build(
        max_queue_size: usize,
        delay: Duration,
        resolver: Option<Arc<dyn TrackResolver>>,
        notifier: Option<Arc<dyn PlaybackNotifier>>,
    ) -> Self {
        let dir = TempDir::new().unwrap();
        let media = Arc::new(MediaStore::open(dir.path()).await.unwrap());
        let voice = FakeVoice::new();
        let recording = Arc::new(RecordingNotifier::default());

        let resolver = resolver.unwrap_or_else(|| {
            Arc::new(FakeResolver::new(media.clone(), delay)) as Arc<dyn TrackResolver>
        });
        let notifier =
            notifier.unwrap_or_else(|| recording.clone() as Arc<dyn PlaybackNotifier>);

        let player = AudioPlayer::new(
            resolver,
            Arc::new(voice.clone()),
            media.clone(),
            notifier,
            max_queue_size,
        );

        Self {
            _dir: dir,
            media,
            voice,
            notifier: recording,
            player,
        }
    }

    pub fn guild(&self) -> GuildId {
        room().guild_id
    }

    pub fn request(&self, query: &str) -> PlayRequest {
        let room = room();
        PlayRequest {
            guild_id: room.guild_id,
            voice_channel: Some(room.voice_channel),
            text_channel: room.text_channel,
            requested_by: UserId::new(5),
            query: query.to_string(),
        }
    }

    /// Archivos que quedan en el directorio de medios
    pub fn media_files(&self) -> usize {
        count_files(self.media.root())
    }
}

fn count_files(dir: &Path) -> usize {
    std::fs::read_dir(dir)
        .map(|entries| entries.filter_map(Result::ok).count())
        .unwrap_or(0)
}
