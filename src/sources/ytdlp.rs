use async_process::{Command, Stdio};
use regex::Regex;
use serde::Deserialize;
use std::{path::PathBuf, sync::Arc, time::Duration};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::{
    audio::{
        media::MediaStore,
        track::{Track, TrackInfo},
    },
    error::{MusicError, MusicResult},
};

/// Lo que imprime yt-dlp al terminar de mover el archivo descargado
const PRINT_TEMPLATE: &str = "after_move:%(.{title,webpage_url,duration,filepath})j";

/// Descarga audio con yt-dlp al directorio de medios.
///
/// Cada descarga usa un prefijo propio ([`MediaStore::allocate_stem`]) para
/// poder limpiar sus restos si falla o se agota el tiempo.
pub struct YtDlpResolver {
    binary: String,
    media: Arc<MediaStore>,
    timeout: Duration,
    max_playlist_size: usize,
}

#[derive(Debug, Deserialize, PartialEq)]
struct DownloadedEntry {
    title: String,
    webpage_url: Option<String>,
    duration: Option<f64>,
    filepath: String,
}

impl DownloadedEntry {
    fn into_info(self, fallback_url: &str) -> (TrackInfo, PathBuf) {
        let mut info = TrackInfo::new(
            self.title,
            self.webpage_url.unwrap_or_else(|| fallback_url.to_string()),
        );
        if let Some(secs) = self.duration.filter(|d| d.is_finite() && *d > 0.0) {
            info = info.with_duration(Duration::from_secs_f64(secs));
        }
        (info, PathBuf::from(self.filepath))
    }
}

impl YtDlpResolver {
    pub fn new(
        binary: impl Into<String>,
        media: Arc<MediaStore>,
        timeout: Duration,
        max_playlist_size: usize,
    ) -> Self {
        Self {
            binary: binary.into(),
            media,
            timeout,
            max_playlist_size,
        }
    }

    /// Verifica que yt-dlp esté disponible y devuelve su versión
    pub async fn version(binary: &str) -> anyhow::Result<String> {
        let output = Command::new(binary).arg("--version").output().await?;
        if !output.status.success() {
            anyhow::bail!("{} --version terminó con {}", binary, output.status);
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Descarga un único video (URL o `ytsearch1:`) y lo materializa
    pub async fn download(&self, target: &str) -> MusicResult<Track> {
        let stem = self.media.allocate_stem();
        let template = self.media.root().join(format!("{}-%(id)s.%(ext)s", stem));

        info!("⬇️ Descargando: {}", target);
        let mut cmd = Command::new(&self.binary);
        cmd.args([
            "--format",
            "bestaudio[ext=m4a]/bestaudio/best",
            "--no-playlist",
            "--no-progress",
            "--quiet",
            "--no-warnings",
            "--restrict-filenames",
            "--no-simulate",
            "--socket-timeout",
            "30",
            "--retries",
            "3",
        ])
        .arg("--output")
        .arg(&template)
        .args(["--print", PRINT_TEMPLATE])
        .arg(target)
        .stdin(Stdio::null())
        .kill_on_drop(true);

        let output = match timeout(self.timeout, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                self.media.discard_partial(&stem).await;
                error!("❌ No se pudo ejecutar {}: {}", self.binary, e);
                return Err(MusicError::ResolutionFailed(format!("yt-dlp no disponible: {}", e)));
            }
            Err(_) => {
                // kill_on_drop ya terminó el proceso
                self.media.discard_partial(&stem).await;
                warn!("⏰ Descarga cancelada tras {:?}: {}", self.timeout, target);
                return Err(MusicError::ResolutionFailed(format!(
                    "tiempo agotado tras {}",
                    humantime::format_duration(self.timeout)
                )));
            }
        };

        if !output.status.success() {
            self.media.discard_partial(&stem).await;
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!("yt-dlp falló para {}: {}", target, stderr.trim());
            return Err(MusicError::ResolutionFailed(summarize_stderr(&stderr)));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let Some(entry) = parse_download_line(&stdout) else {
            self.media.discard_partial(&stem).await;
            return Err(MusicError::ResolutionFailed(format!(
                "sin resultados para: {}",
                target
            )));
        };

        let (info, path) = entry.into_info(target);
        let handle = match self.media.materialize(path).await {
            Ok(handle) => handle,
            Err(e) => {
                self.media.discard_partial(&stem).await;
                return Err(e);
            }
        };

        info!("✅ Descargado: {}", info.title);
        Ok(Track::materialized(info, handle))
    }

    /// Expande una playlist y descarga sus entradas en orden.
    ///
    /// Las entradas que fallan se saltan; solo es error si no se pudo
    /// descargar ninguna.
    pub async fn resolve_playlist(&self, url: &str) -> MusicResult<Vec<Track>> {
        let entries = self.list_playlist(url).await?;
        info!("📋 Playlist con {} entradas: {}", entries.len(), url);

        let mut tracks = Vec::with_capacity(entries.len());
        for entry in &entries {
            match self.download(entry).await {
                Ok(track) => tracks.push(track),
                Err(e) => warn!("⚠️ Saltando entrada {}: {}", entry, e),
            }
        }

        if tracks.is_empty() {
            return Err(MusicError::ResolutionFailed(format!(
                "ninguna entrada de la playlist se pudo descargar: {}",
                url
            )));
        }
        if tracks.len() < entries.len() {
            warn!(
                "⚠️ Playlist parcial: {}/{} entradas descargadas",
                tracks.len(),
                entries.len()
            );
        }

        Ok(tracks)
    }

    async fn list_playlist(&self, url: &str) -> MusicResult<Vec<String>> {
        let limit = self.max_playlist_size.to_string();
        let mut cmd = Command::new(&self.binary);
        cmd.args([
            "--flat-playlist",
            "--quiet",
            "--no-warnings",
            "--print",
            "%(url)s",
            "--playlist-end",
            limit.as_str(),
        ])
        .arg(url)
        .stdin(Stdio::null())
        .kill_on_drop(true);

        let output = match timeout(self.timeout, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(MusicError::ResolutionFailed(format!("yt-dlp no disponible: {}", e)))
            }
            Err(_) => {
                return Err(MusicError::ResolutionFailed(
                    "tiempo agotado listando la playlist".to_string(),
                ))
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(MusicError::ResolutionFailed(summarize_stderr(&stderr)));
        }

        let entries = parse_playlist_entries(&String::from_utf8_lossy(&output.stdout), self.max_playlist_size);
        if entries.is_empty() {
            return Err(MusicError::ResolutionFailed(format!("playlist vacía: {}", url)));
        }
        Ok(entries)
    }
}

/// Texto libre → primera coincidencia en YouTube
pub fn search_target(query: &str) -> String {
    format!("ytsearch1:{}", query)
}

/// Toma la última línea JSON válida de la salida de `--print`
fn parse_download_line(stdout: &str) -> Option<DownloadedEntry> {
    stdout
        .lines()
        .rev()
        .map(str::trim)
        .filter(|line| line.starts_with('{'))
        .find_map(|line| match serde_json::from_str::<DownloadedEntry>(line) {
            Ok(entry) => Some(entry),
            Err(e) => {
                debug!("Línea de yt-dlp no reconocida ({}): {}", e, line);
                None
            }
        })
}

fn parse_playlist_entries(stdout: &str, limit: usize) -> Vec<String> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| line.starts_with("http"))
        .take(limit)
        .map(str::to_string)
        .collect()
}

/// Primer `ERROR:` de yt-dlp, o la última línea si no hay ninguno
fn summarize_stderr(stderr: &str) -> String {
    let error_line = Regex::new(r"(?m)^ERROR:\s*(.+)$")
        .ok()
        .and_then(|re| re.captures(stderr))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string());

    error_line
        .or_else(|| stderr.lines().rev().map(str::trim).find(|l| !l.is_empty()).map(str::to_string))
        .unwrap_or_else(|| "yt-dlp terminó con error".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_parse_download_line_takes_last_json() {
        let stdout = "\
[info] something\n\
{\"title\": \"Old\", \"webpage_url\": null, \"duration\": null, \"filepath\": \"/m/a.m4a\"}\n\
{\"title\": \"Song\", \"webpage_url\": \"https://youtu.be/x\", \"duration\": 212.5, \"filepath\": \"/m/b.m4a\"}\n";

        let entry = parse_download_line(stdout).unwrap();
        assert_eq!(entry.title, "Song");
        assert_eq!(entry.duration, Some(212.5));

        let (info, path) = entry.into_info("ytsearch1:song");
        assert_eq!(info.source_url, "https://youtu.be/x");
        assert_eq!(info.duration, Some(Duration::from_secs_f64(212.5)));
        assert_eq!(path, PathBuf::from("/m/b.m4a"));
    }

    #[test]
    fn test_parse_download_line_without_json() {
        assert!(parse_download_line("").is_none());
        assert!(parse_download_line("{not json}\n").is_none());
    }

    #[test]
    fn test_missing_url_falls_back_to_target() {
        let entry = DownloadedEntry {
            title: "t".to_string(),
            webpage_url: None,
            duration: Some(0.0),
            filepath: "/m/t.m4a".to_string(),
        };
        let (info, _) = entry.into_info("ytsearch1:t");
        assert_eq!(info.source_url, "ytsearch1:t");
        assert_eq!(info.duration, None);
    }

    #[test]
    fn test_parse_playlist_entries_caps_length() {
        let stdout = "https://youtu.be/a\nNA\n\nhttps://youtu.be/b\nhttps://youtu.be/c\n";
        assert_eq!(
            parse_playlist_entries(stdout, 2),
            vec!["https://youtu.be/a", "https://youtu.be/b"]
        );
    }

    #[test]
    fn test_summarize_stderr() {
        let stderr = "WARNING: slow\nERROR: [youtube] abc: Video unavailable\n";
        assert_eq!(summarize_stderr(stderr), "[youtube] abc: Video unavailable");
        assert_eq!(summarize_stderr("boom\n"), "boom");
        assert_eq!(summarize_stderr(""), "yt-dlp terminó con error");
    }

    #[test]
    fn test_search_target() {
        assert_eq!(search_target("daft punk"), "ytsearch1:daft punk");
    }

    #[tokio::test]
    async fn test_missing_binary_is_resolution_failure() {
        let dir = TempDir::new().unwrap();
        let media = Arc::new(MediaStore::open(dir.path()).await.unwrap());
        let resolver = YtDlpResolver::new(
            "/nonexistent/yt-dlp",
            media.clone(),
            Duration::from_secs(5),
            10,
        );

        let result = resolver.download("ytsearch1:anything").await;
        assert!(matches!(result, Err(MusicError::ResolutionFailed(_))));
        assert_eq!(media.live_count(), 0);
    }
}
