use dashmap::DashMap;
use std::{
    path::{Path, PathBuf},
    sync::atomic::{AtomicU64, Ordering},
};
use tokio::fs;
use tracing::{debug, info, warn};

use crate::error::{MusicError, MusicResult};

/// Referencia exclusiva a un archivo descargado.
///
/// No implementa `Clone`: quien tiene el handle es el único dueño del archivo
/// y la única forma de soltarlo es [`MediaStore::release`].
#[derive(Debug)]
pub struct MediaHandle {
    id: u64,
    path: PathBuf,
}

impl MediaHandle {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Almacén de archivos de audio transitorios.
///
/// Todos los archivos viven bajo `root`. Cada archivo materializado queda
/// registrado hasta que se libera; liberar un handle desconocido es un no-op
/// que solo deja rastro en el log.
#[derive(Debug)]
pub struct MediaStore {
    root: PathBuf,
    live: DashMap<u64, PathBuf>,
    next_id: AtomicU64,
}

impl MediaStore {
    /// Abre el directorio de medios, creándolo si hace falta y eliminando
    /// restos de ejecuciones anteriores (no hay persistencia entre reinicios).
    pub async fn open(root: impl AsRef<Path>) -> anyhow::Result<Self> {
        fs::create_dir_all(root.as_ref()).await?;
        let root = fs::canonicalize(root.as_ref()).await?;

        let store = Self {
            root,
            live: DashMap::new(),
            next_id: AtomicU64::new(1),
        };

        let purged = store.purge_all().await?;
        if purged > 0 {
            info!("🧹 Eliminados {} archivos huérfanos de {}", purged, store.root.display());
        }
        info!("📁 Medios temporales en: {}", store.root.display());

        Ok(store)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Prefijo único para los archivos de una descarga
    pub fn allocate_stem(&self) -> String {
        format!("bb{:016x}", fastrand::u64(..))
    }

    /// Registra un archivo ya descargado y devuelve su handle
    pub async fn materialize(&self, path: PathBuf) -> MusicResult<MediaHandle> {
        if !path.starts_with(&self.root) {
            return Err(MusicError::ResolutionFailed(format!(
                "archivo fuera del directorio de medios: {}",
                path.display()
            )));
        }

        let metadata = fs::metadata(&path).await.map_err(|e| {
            MusicError::ResolutionFailed(format!(
                "archivo descargado no encontrado {}: {}",
                path.display(),
                e
            ))
        })?;
        if !metadata.is_file() {
            return Err(MusicError::ResolutionFailed(format!(
                "{} no es un archivo",
                path.display()
            )));
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.live.insert(id, path.clone());
        debug!("💾 Medio #{} materializado: {}", id, path.display());

        Ok(MediaHandle { id, path })
    }

    /// Libera un handle y borra su archivo.
    ///
    /// Devuelve `false` si el handle ya había sido liberado. Los errores de
    /// borrado se registran y nunca se propagan.
    pub async fn release(&self, handle: MediaHandle) -> bool {
        let Some((id, path)) = self.live.remove(&handle.id) else {
            warn!("⚠️ Medio #{} ya liberado: {}", handle.id, handle.path.display());
            return false;
        };

        match fs::remove_file(&path).await {
            Ok(()) => debug!("🗑️ Medio #{} eliminado: {}", id, path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("🗑️ Medio #{} ya no existía: {}", id, path.display())
            }
            Err(e) => warn!("⚠️ No se pudo eliminar {}: {}", path.display(), e),
        }

        true
    }

    /// Número de archivos materializados aún no liberados
    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    /// Borra los restos de una descarga fallida o interrumpida
    pub async fn discard_partial(&self, stem: &str) -> usize {
        let mut removed = 0;
        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!("⚠️ No se pudo listar {}: {}", self.root.display(), e);
                return 0;
            }
        };

        while let Ok(Some(entry)) = entries.next_entry().await {
            let name = entry.file_name();
            if !name.to_string_lossy().starts_with(stem) {
                continue;
            }
            match fs::remove_file(entry.path()).await {
                Ok(()) => removed += 1,
                Err(e) => warn!("⚠️ No se pudo eliminar {}: {}", entry.path().display(), e),
            }
        }

        if removed > 0 {
            debug!("🧹 {} archivos parciales eliminados ({})", removed, stem);
        }
        removed
    }

    async fn purge_all(&self) -> std::io::Result<usize> {
        let mut purged = 0;
        let mut entries = fs::read_dir(&self.root).await?;

        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                fs::remove_file(entry.path()).await?;
                purged += 1;
            }
        }

        Ok(purged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn write_file(store: &MediaStore, name: &str) -> PathBuf {
        let path = store.root().join(name);
        fs::write(&path, b"audio").await.unwrap();
        path
    }

    #[tokio::test]
    async fn test_release_deletes_file_once() {
        let temp_dir = TempDir::new().unwrap();
        let store = MediaStore::open(temp_dir.path()).await.unwrap();

        let path = write_file(&store, "song.m4a").await;
        let handle = store.materialize(path.clone()).await.unwrap();
        assert_eq!(store.live_count(), 1);

        let duplicate = MediaHandle {
            id: handle.id,
            path: handle.path.clone(),
        };

        assert!(store.release(handle).await);
        assert!(!path.exists());
        assert_eq!(store.live_count(), 0);

        // Segunda liberación: no-op
        assert!(!store.release(duplicate).await);
    }

    #[tokio::test]
    async fn test_release_tolerates_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let store = MediaStore::open(temp_dir.path()).await.unwrap();

        let path = write_file(&store, "gone.m4a").await;
        let handle = store.materialize(path.clone()).await.unwrap();
        fs::remove_file(&path).await.unwrap();

        assert!(store.release(handle).await);
        assert_eq!(store.live_count(), 0);
    }

    #[tokio::test]
    async fn test_materialize_rejects_foreign_and_missing_paths() {
        let temp_dir = TempDir::new().unwrap();
        let other_dir = TempDir::new().unwrap();
        let store = MediaStore::open(temp_dir.path()).await.unwrap();

        let foreign = other_dir.path().join("x.m4a");
        std::fs::write(&foreign, b"audio").unwrap();
        assert!(matches!(
            store.materialize(foreign).await,
            Err(MusicError::ResolutionFailed(_))
        ));

        let missing = store.root().join("missing.m4a");
        assert!(matches!(
            store.materialize(missing).await,
            Err(MusicError::ResolutionFailed(_))
        ));
        assert_eq!(store.live_count(), 0);
    }

    #[tokio::test]
    async fn test_open_purges_leftovers() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("old-1.webm"), b"x").unwrap();
        std::fs::write(temp_dir.path().join("old-2.m4a"), b"x").unwrap();

        let store = MediaStore::open(temp_dir.path()).await.unwrap();

        let mut entries = std::fs::read_dir(store.root()).unwrap();
        assert!(entries.next().is_none());
    }

    #[tokio::test]
    async fn test_discard_partial_only_touches_stem() {
        let temp_dir = TempDir::new().unwrap();
        let store = MediaStore::open(temp_dir.path()).await.unwrap();

        let stem = store.allocate_stem();
        write_file(&store, &format!("{}-abc.m4a.part", stem)).await;
        write_file(&store, &format!("{}-abc.f140.m4a", stem)).await;
        let keep = write_file(&store, "other-song.m4a").await;

        assert_eq!(store.discard_partial(&stem).await, 2);
        assert!(keep.exists());
    }
}
