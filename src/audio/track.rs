use chrono::{DateTime, Utc};
use serenity::model::id::UserId;
use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use super::media::MediaHandle;

/// Metadatos visibles de un track
#[derive(Debug, Clone, PartialEq)]
pub struct TrackInfo {
    pub title: String,
    pub source_url: String,
    pub duration: Option<Duration>,
    pub requested_by: Option<UserId>,
    pub added_at: DateTime<Utc>,
}

impl TrackInfo {
    pub fn new(title: impl Into<String>, source_url: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            source_url: source_url.into(),
            duration: None,
            requested_by: None,
            added_at: Utc::now(),
        }
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }
}

/// De dónde sale el audio decodificable
#[derive(Debug, Clone, PartialEq)]
pub enum StreamSource {
    /// Archivo local materializado
    File(PathBuf),
    /// Stream HTTP sin copia local
    Remote(String),
}

/// Unidad reproducible ya resuelta.
///
/// El stream y el archivo que lo respalda son un único recurso: el track se
/// mueve entre la cola, el slot "now playing" y la limpieza pendiente, y
/// nunca se copia.
#[derive(Debug)]
pub struct Track {
    info: TrackInfo,
    stream: StreamSource,
    media: Option<MediaHandle>,
}

impl Track {
    /// Track respaldado por un archivo del [`MediaStore`](super::media::MediaStore)
    pub fn materialized(info: TrackInfo, media: MediaHandle) -> Self {
        Self {
            info,
            stream: StreamSource::File(media.path().to_path_buf()),
            media: Some(media),
        }
    }

    pub fn remote(info: TrackInfo, url: impl Into<String>) -> Self {
        Self {
            info,
            stream: StreamSource::Remote(url.into()),
            media: None,
        }
    }

    pub fn info(&self) -> &TrackInfo {
        &self.info
    }

    pub fn title(&self) -> &str {
        &self.info.title
    }

    pub fn stream(&self) -> &StreamSource {
        &self.stream
    }

    pub fn media_path(&self) -> Option<&Path> {
        self.media.as_ref().map(MediaHandle::path)
    }

    pub fn set_requested_by(&mut self, user_id: UserId) {
        self.info.requested_by = Some(user_id);
    }

    /// Consume el track y entrega el archivo a liberar, si lo hay
    pub fn into_media(self) -> Option<MediaHandle> {
        self.media
    }
}
