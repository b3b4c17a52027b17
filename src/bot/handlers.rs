use anyhow::Result;
use serenity::{
    builder::{CreateInteractionResponse, CreateInteractionResponseMessage, EditInteractionResponse},
    model::{
        application::CommandInteraction,
        id::{ChannelId, GuildId, UserId},
    },
    prelude::Context,
};
use tracing::{error, info, warn};

use crate::{
    audio::{AudioPlayer, Enqueued},
    error::MusicError,
    ui::embeds,
};

/// Maneja comandos slash
pub async fn handle_command(
    ctx: &Context,
    command: &CommandInteraction,
    player: &AudioPlayer,
) -> Result<()> {
    let guild_id = command
        .guild_id
        .ok_or_else(|| anyhow::anyhow!("Comando usado fuera de un servidor"))?;

    info!(
        "📝 Comando /{} usado por {} en guild {}",
        command.data.name, command.user.name, guild_id
    );

    match command.data.name.as_str() {
        "play" => handle_play(ctx, command, guild_id, player).await?,
        "pause" => {
            player.pause(guild_id).await?;
            respond(ctx, command, "⏸️ Reproducción pausada").await?;
        }
        "resume" => {
            player.resume(guild_id).await?;
            respond(ctx, command, "▶️ Reproducción reanudada").await?;
        }
        "skip" => {
            let skipped = player.skip(guild_id).await?;
            respond(ctx, command, format!("⏭️ Saltando: **{}**", skipped.title)).await?;
        }
        "stop" => {
            player.stop(guild_id).await;
            respond(ctx, command, "⏹️ Reproducción detenida y cola limpiada").await?;
        }
        "leave" => {
            player.leave(guild_id).await?;
            respond(ctx, command, "👋 Desconectado del canal de voz").await?;
        }
        "queue" => {
            let snapshot = player.query_queue(guild_id).await;
            command
                .create_response(
                    &ctx.http,
                    CreateInteractionResponse::Message(
                        CreateInteractionResponseMessage::new()
                            .embed(embeds::create_queue_embed(&snapshot)),
                    ),
                )
                .await?;
        }
        "nowplaying" => match player.query_now_playing(guild_id).await {
            Some(now_playing) => {
                command
                    .create_response(
                        &ctx.http,
                        CreateInteractionResponse::Message(
                            CreateInteractionResponseMessage::new()
                                .embed(embeds::create_now_playing_embed(&now_playing)),
                        ),
                    )
                    .await?;
            }
            None => {
                respond_ephemeral(ctx, command, "❌ No hay nada reproduciéndose actualmente")
                    .await?;
            }
        },
        _ => {
            respond_ephemeral(ctx, command, "❌ Comando no reconocido").await?;
        }
    }

    Ok(())
}

async fn handle_play(
    ctx: &Context,
    command: &CommandInteraction,
    guild_id: GuildId,
    player: &AudioPlayer,
) -> Result<()> {
    let url = command
        .data
        .options
        .iter()
        .find(|opt| opt.name == "url")
        .and_then(|opt| opt.value.as_str())
        .ok_or_else(|| anyhow::anyhow!("URL no proporcionada"))?;

    // Verificar que el usuario esté en un canal de voz
    let Some(channel_id) = get_user_voice_channel(ctx, guild_id, command.user.id) else {
        respond_ephemeral(ctx, command, "❌ Debes estar en un canal de voz para usar este comando")
            .await?;
        return Ok(());
    };

    // Defer la respuesta ya que puede tomar tiempo
    command.defer(&ctx.http).await?;

    let embed = match player.enqueue(guild_id, url, command.user.id, channel_id).await {
        Ok(Enqueued::Single { item, position }) => embeds::create_track_added_embed(&item, position),
        Ok(Enqueued::Collection { count, first }) => {
            embeds::create_playlist_added_embed(count, &first)
        }
        Err(e) => {
            warn!("❌ No se pudo agregar {} en guild {}: {}", url, guild_id, e);
            embeds::create_error_embed("No se pudo agregar la canción", &e.to_string())
        }
    };

    command
        .edit_response(&ctx.http, EditInteractionResponse::new().embed(embed))
        .await?;

    Ok(())
}

/// Responde al usuario cuando un comando falla; si la interacción ya fue
/// diferida, edita la respuesta en lugar de crear una nueva
pub async fn report_failure(ctx: &Context, command: &CommandInteraction, failure: &anyhow::Error) {
    let message = failure_message(failure);

    let created = command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new()
                    .content(&message)
                    .ephemeral(true),
            ),
        )
        .await;

    if created.is_err() {
        if let Err(e) = command
            .edit_response(&ctx.http, EditInteractionResponse::new().content(message))
            .await
        {
            error!("No se pudo informar el error al usuario: {:?}", e);
        }
    }
}

fn failure_message(failure: &anyhow::Error) -> String {
    match failure.downcast_ref::<MusicError>() {
        Some(e) => format!("❌ {}", e),
        None => "❌ Ocurrió un error al procesar el comando".to_string(),
    }
}

async fn respond(ctx: &Context, command: &CommandInteraction, content: impl Into<String>) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(CreateInteractionResponseMessage::new().content(content)),
        )
        .await?;
    Ok(())
}

async fn respond_ephemeral(ctx: &Context, command: &CommandInteraction, content: &str) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new()
                    .content(content)
                    .ephemeral(true),
            ),
        )
        .await?;
    Ok(())
}

// Funciones auxiliares

fn get_user_voice_channel(ctx: &Context, guild_id: GuildId, user_id: UserId) -> Option<ChannelId> {
    let guild = guild_id.to_guild_cached(&ctx.cache)?;
    guild
        .voice_states
        .get(&user_id)
        .and_then(|voice_state| voice_state.channel_id)
}
