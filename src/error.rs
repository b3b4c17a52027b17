use thiserror::Error;

/// Errores del orquestador de colas.
///
/// Los errores de validación y de precondición se devuelven sin tocar el
/// estado de la guild. `StreamError` nunca llega al usuario durante la
/// reproducción: se registra y la cola avanza a la siguiente canción.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MusicError {
    #[error("URL de YouTube inválida")]
    InvalidLocator,

    #[error("No se pudo obtener la información: {0}")]
    ResolutionFailed(String),

    #[error("No se pudo conectar al canal de voz: {0}")]
    ConnectionFailed(String),

    #[error("No hay nada reproduciéndose")]
    NotPlaying,

    #[error("La reproducción no está pausada")]
    NotPaused,

    #[error("No hay nada que saltar")]
    NothingToSkip,

    #[error("No estoy en un canal de voz")]
    NotConnected,

    #[error("Error de stream: {0}")]
    StreamError(String),
}

pub type MusicResult<T> = std::result::Result<T, MusicError>;
