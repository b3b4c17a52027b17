//! # Bot Module
//!
//! Superficie de Discord del bot: registra los comandos slash, traduce cada
//! interacción a una operación del [`AudioPlayer`] y adapta songbird como
//! transporte de voz.
//!
//! - [`commands`]: definición y registro de comandos
//! - [`handlers`]: un handler por comando, sin estado propio
//! - [`voice`]: conexiones y salida de audio sobre songbird
//! - [`events`]: eventos de songbird reenviados al orquestador

use anyhow::Result;
use serenity::{
    all::{Context, EventHandler, GuildId, Interaction, Ready},
    async_trait,
};
use std::sync::Arc;
use tracing::{error, info, warn};

pub mod commands;
pub mod events;
pub mod handlers;
pub mod voice;

use crate::{audio::AudioPlayer, config::Config};

pub struct MusicBot {
    config: Arc<Config>,
    player: AudioPlayer,
}

impl MusicBot {
    pub fn new(config: Config, player: AudioPlayer) -> Self {
        Self {
            config: Arc::new(config),
            player,
        }
    }

    /// Registra los comandos globalmente o en `GUILD_ID` si está configurado
    async fn register_commands(&self, ctx: &Context) -> Result<()> {
        info!("📝 Registrando comandos slash...");

        match self.config.guild_id {
            Some(guild_id) => {
                let guild_id = GuildId::new(guild_id);

                if !ctx.cache.guilds().contains(&guild_id) {
                    warn!("⚠️ El bot no está en la guild especificada: {}", guild_id);
                    return Ok(());
                }

                commands::register_guild_commands(ctx, guild_id).await.map_err(|e| {
                    error!("❌ Error registrando comandos de guild: {:?}", e);
                    anyhow::anyhow!("No se pudieron registrar comandos de guild. Verifica que el bot tenga permisos de 'applications.commands' en la guild.")
                })?;
                info!("✅ Comandos de guild registrados para: {}", guild_id);
            }
            None => {
                commands::register_global_commands(ctx).await.map_err(|e| {
                    error!("❌ Error registrando comandos globales: {:?}", e);
                    anyhow::anyhow!("No se pudieron registrar comandos globales. Verifica que el bot tenga permisos de 'applications.commands'.")
                })?;
                info!("✅ Comandos globales registrados");
            }
        }

        Ok(())
    }
}

#[async_trait]
impl EventHandler for MusicBot {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 {} está en línea!", ready.user.name);
        info!("📊 Conectado a {} servidores", ready.guilds.len());

        if let Err(e) = self.register_commands(&ctx).await {
            error!("Error al registrar comandos: {:?}", e);
        }
    }

    /// Todo error de un comando termina en una respuesta "❌" al usuario
    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        if let Interaction::Command(command) = interaction {
            if let Err(e) = handlers::handle_command(&ctx, &command, &self.player).await {
                error!("Error manejando comando /{}: {:?}", command.data.name, e);
                handlers::report_failure(&ctx, &command, &e).await;
            }
        }
    }
}
