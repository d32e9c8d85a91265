use std::{collections::VecDeque, time::Duration};
use tracing::{debug, info};

use super::track::{Track, TrackInfo};
use crate::error::{MusicError, MusicResult};

/// Cola FIFO de tracks pendientes de una guild.
///
/// No contiene el track que está sonando: ese vive en el controlador.
#[derive(Debug)]
pub struct MusicQueue {
    items: VecDeque<Track>,
    max_size: usize,
}

impl MusicQueue {
    pub fn new(max_size: usize) -> Self {
        Self {
            items: VecDeque::new(),
            max_size,
        }
    }

    /// Agrega un track al final. Si la cola está llena devuelve el track
    /// para que el llamador lo libere.
    pub fn enqueue(&mut self, track: Track) -> Result<(), Track> {
        if self.items.len() >= self.max_size {
            return Err(track);
        }

        info!("➕ Agregado a la cola: {}", track.title());
        self.items.push_back(track);
        Ok(())
    }

    /// Devuelve un track a la cabeza (rollback de un inicio fallido)
    pub fn push_front(&mut self, track: Track) {
        debug!("↩️ Track devuelto a la cabeza de la cola: {}", track.title());
        self.items.push_front(track);
    }

    /// Obtiene el siguiente track (FIFO estricto)
    pub fn pop_front(&mut self) -> Option<Track> {
        let next = self.items.pop_front();
        match &next {
            Some(track) => info!("➡️ Siguiente en cola (FIFO): {}", track.title()),
            None => info!("📭 Cola vacía, no hay siguiente track"),
        }
        next
    }

    /// Elimina el track en la posición `index` (1-based)
    pub fn remove_at(&mut self, index: usize) -> MusicResult<Track> {
        let len = self.items.len();
        if index == 0 || index > len {
            return Err(MusicError::OutOfRange { index, len });
        }

        let track = self
            .items
            .remove(index - 1)
            .ok_or(MusicError::OutOfRange { index, len })?;
        debug!("❌ Track eliminado en posición {}: {}", index, track.title());
        Ok(track)
    }

    /// Vacía la cola y entrega todos los tracks
    pub fn drain(&mut self) -> Vec<Track> {
        let drained: Vec<Track> = self.items.drain(..).collect();
        if !drained.is_empty() {
            info!("🗑️ Cola limpiada: {} tracks removidos", drained.len());
        }
        drained
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.max_size
    }

    /// Vista ordenada de la cola con posiciones 1-based
    pub fn entries(&self) -> Vec<QueueEntry> {
        self.items
            .iter()
            .enumerate()
            .map(|(i, track)| QueueEntry {
                position: i + 1,
                info: track.info().clone(),
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueueEntry {
    pub position: usize,
    pub info: TrackInfo,
}

/// Foto consistente del estado de una guild, tomada bajo su lock
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueueSnapshot {
    pub now_playing: Option<TrackInfo>,
    pub paused: bool,
    pub upcoming: Vec<QueueEntry>,
}

impl QueueSnapshot {
    pub fn is_empty(&self) -> bool {
        self.now_playing.is_none() && self.upcoming.is_empty()
    }

    pub fn titles(&self) -> Vec<(usize, &str)> {
        self.upcoming
            .iter()
            .map(|entry| (entry.position, entry.info.title.as_str()))
            .collect()
    }

    pub fn total_duration(&self) -> Duration {
        let queued: Duration = self.upcoming.iter().filter_map(|e| e.info.duration).sum();
        let current = self
            .now_playing
            .as_ref()
            .and_then(|info| info.duration)
            .unwrap_or_default();
        queued + current
    }

    /// Obtiene una página específica de la cola
    pub fn page(&self, page: usize, items_per_page: usize) -> QueuePage {
        let items_per_page = items_per_page.max(1);
        let total_items = self.upcoming.len();
        let total_pages = if total_items == 0 {
            1
        } else {
            total_items.div_ceil(items_per_page)
        };
        let current_page = page.clamp(1, total_pages);
        let start = (current_page - 1) * items_per_page;
        let end = (start + items_per_page).min(total_items);

        QueuePage {
            items: self.upcoming[start..end].to_vec(),
            current_page,
            total_pages,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueuePage {
    pub items: Vec<QueueEntry>,
    pub current_page: usize,
    pub total_pages: usize,
}
