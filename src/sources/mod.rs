pub mod direct_url;
pub mod ytdlp;

use async_trait::async_trait;
use tracing::{debug, info};
use url::Url;

pub use direct_url::DirectUrlResolver;
pub use ytdlp::YtDlpResolver;

use crate::{
    audio::track::Track,
    error::{MusicError, MusicResult},
};

/// Convierte lo que escribe el usuario en tracks listos para reproducir.
///
/// Todo track devuelto ya está materializado (o es un stream remoto); el
/// resolver nunca toca el estado de una sesión.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TrackResolver: Send + Sync {
    async fn resolve(&self, query: &str) -> MusicResult<Vec<Track>>;
}

/// Qué tipo de consulta hizo el usuario
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceType {
    /// Archivo de audio servido por HTTP
    DirectAudio,
    Playlist,
    /// URL de una página con un único video/track
    Page,
    /// Texto libre, se busca en YouTube
    Search,
}

impl SourceType {
    pub fn classify(query: &str) -> Self {
        let Ok(url) = Url::parse(query) else {
            return Self::Search;
        };
        if !matches!(url.scheme(), "http" | "https") {
            return Self::Search;
        }

        if direct_url::is_audio_file(&url) {
            Self::DirectAudio
        } else if is_playlist_url(&url) {
            Self::Playlist
        } else {
            Self::Page
        }
    }
}

/// `?list=` de YouTube o rutas de playlist/sets de otros sitios
pub fn is_playlist_url(url: &Url) -> bool {
    let has_list = url.query_pairs().any(|(key, _)| key == "list");
    let path = url.path();
    has_list || path.starts_with("/playlist") || path.contains("/sets/")
}

/// Resolver principal: despacha por tipo de consulta
pub struct SourceResolver {
    ytdlp: YtDlpResolver,
    direct: DirectUrlResolver,
}

impl SourceResolver {
    pub fn new(ytdlp: YtDlpResolver, direct: DirectUrlResolver) -> Self {
        Self { ytdlp, direct }
    }
}

#[async_trait]
impl TrackResolver for SourceResolver {
    async fn resolve(&self, query: &str) -> MusicResult<Vec<Track>> {
        let query = query.trim();
        if query.is_empty() {
            return Err(MusicError::ResolutionFailed("consulta vacía".to_string()));
        }

        let kind = SourceType::classify(query);
        debug!("Consulta {:?}: {}", kind, query);

        match kind {
            SourceType::DirectAudio => Ok(vec![self.direct.resolve_url(query)?]),
            SourceType::Playlist => {
                let tracks = self.ytdlp.resolve_playlist(query).await?;
                info!("📋 Playlist resuelta: {} tracks", tracks.len());
                Ok(tracks)
            }
            SourceType::Page => Ok(vec![self.ytdlp.download(query).await?]),
            SourceType::Search => Ok(vec![self.ytdlp.download(&ytdlp::search_target(query)).await?]),
        }
    }
}
