//! # Audio Module
//!
//! Orquestación de colas de audio por guild.
//!
//! ## Arquitectura
//!
//! ### [`player`] - Orquestador
//! - Punto de entrada de todas las operaciones (agregar, pausar, saltar, salir)
//! - Una máquina de estados independiente por guild
//! - Conecta los eventos de reproducción y de la conexión con la cola
//!
//! ### [`queue`] - Estado de la cola
//! - Cola FIFO, canción actual y momento de inicio
//! - Proyecciones de solo lectura para los comandos
//!
//! ### [`session`] - Sesión de reproducción
//! - Un único recurso activo, identificado por [`session::TrackId`]
//! - Descarta eventos de recursos ya reemplazados
//!
//! ### [`connection`] - Ciclo de vida de la voz
//! - Unirse y esperar `Ready` (30s)
//! - Ventana de recuperación tras una desconexión (5s)
//!
//! ### [`timer`] - Inactividad
//! - Desconexión tras 30s sin nada que reproducir
//!
//! ## Ejemplo
//!
//! ```rust,ignore
//! let player = AudioPlayer::new(resolver, streams, transport, PlayerSettings::default());
//! player.enqueue(guild_id, "https://youtu.be/dQw4w9WgXcQ", user_id, channel_id).await?;
//! player.skip(guild_id).await?;
//! ```

pub mod connection;
pub mod player;
pub mod queue;
pub mod session;
pub mod timer;

#[cfg(test)]
pub mod testing;

pub use player::{Advance, AudioPlayer, Enqueued, PlayerSettings};
