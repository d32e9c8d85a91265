//! Error taxonomy of the playback core.
//!
//! Everything the command layer can get back from [`AudioPlayer`] is a
//! [`MusicError`]. Resolution and connection failures carry the reason
//! verbatim; the state-mismatch variants are ordinary outcomes of a command
//! issued at the wrong time and are not logged as failures.
//!
//! [`AudioPlayer`]: crate::audio::player::AudioPlayer

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MusicError {
    /// El usuario no está en un canal de voz y no hay sesión activa
    #[error("Debes estar en un canal de voz")]
    NotInRoom,

    /// El resolver falló, expiró o no devolvió resultados
    #[error("No se pudo resolver la canción: {0}")]
    ResolutionFailed(String),

    /// El transporte de voz no pudo conectar o adjuntar el audio
    #[error("Error de conexión de voz: {0}")]
    ConnectionFailed(String),

    /// Posición fuera de la cola (1-based)
    #[error("Posición {index} inválida, la cola tiene {len} canciones")]
    OutOfRange { index: usize, len: usize },

    #[error("La cola está llena (máximo {0} canciones)")]
    QueueFull(usize),

    #[error("No hay nada reproduciéndose")]
    NothingPlaying,

    #[error("No hay ninguna canción en pausa")]
    NothingPaused,

    #[error("No estoy conectado a un canal de voz")]
    NotConnected,
}

impl MusicError {
    /// Resultados esperados de un comando en el estado equivocado
    pub fn is_state_mismatch(&self) -> bool {
        matches!(
            self,
            Self::NothingPlaying | Self::NothingPaused | Self::NotConnected | Self::OutOfRange { .. }
        )
    }
}

pub type MusicResult<T> = std::result::Result<T, MusicError>;
