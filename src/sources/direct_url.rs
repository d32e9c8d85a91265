use tracing::info;
use url::Url;

use crate::{
    audio::track::{Track, TrackInfo},
    error::{MusicError, MusicResult},
};

const AUDIO_EXTENSIONS: [&str; 5] = [".mp3", ".wav", ".ogg", ".flac", ".m4a"];

/// La ruta termina en una extensión de audio conocida
pub fn is_audio_file(url: &Url) -> bool {
    let path = url.path().to_lowercase();
    AUDIO_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
}

/// Archivos de audio servidos por HTTP: se reproducen en streaming, sin
/// descarga previa.
#[derive(Debug, Default)]
pub struct DirectUrlResolver;

impl DirectUrlResolver {
    pub fn new() -> Self {
        Self
    }

    pub fn resolve_url(&self, raw: &str) -> MusicResult<Track> {
        let url = Url::parse(raw)
            .map_err(|e| MusicError::ResolutionFailed(format!("URL inválida {}: {}", raw, e)))?;

        if !matches!(url.scheme(), "http" | "https") || !is_audio_file(&url) {
            return Err(MusicError::ResolutionFailed(format!(
                "no es un archivo de audio: {}",
                raw
            )));
        }

        let title = url
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| url.host_str().unwrap_or("audio").to_string());

        info!("🔗 Audio directo: {}", title);
        Ok(Track::remote(TrackInfo::new(title, url.as_str()), url.as_str()))
    }
}
