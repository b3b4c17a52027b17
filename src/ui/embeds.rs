use serenity::{
    all::Timestamp,
    builder::{CreateEmbed, CreateEmbedFooter},
};

use crate::audio::queue::{format_duration, NowPlaying, QueueItem, QueueSnapshot};

/// Canciones pendientes que se listan en `/queue`
const QUEUE_PREVIEW: usize = 10;

/// Paleta de colores estandarizada para el bot
pub mod colors {
    use serenity::all::Colour;

    pub const SUCCESS_GREEN: Colour = Colour::from_rgb(67, 181, 129);
    pub const ERROR_RED: Colour = Colour::from_rgb(220, 53, 69);
    pub const INFO_BLUE: Colour = Colour::from_rgb(52, 144, 220);
    pub const MUSIC_PURPLE: Colour = Colour::from_rgb(138, 43, 226);
    pub const NEUTRAL_GRAY: Colour = Colour::from_rgb(108, 117, 125);
}

/// Footer estandarizado para todos los embeds
const STANDARD_FOOTER: &str = "🎵 GuildTunes";

pub fn create_track_added_embed(item: &QueueItem, position: usize) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .title("✅ Agregado a la cola")
        .description(format!("**{}**", item.title))
        .color(colors::SUCCESS_GREEN)
        .field("⏱️ Duración", item.duration_label(), true)
        .field("📍 Posición", format!("#{}", position), true)
        .field("👤 Solicitado por", format!("<@{}>", item.requested_by), true)
        .url(&item.url);

    if let Some(thumbnail) = &item.thumbnail {
        embed = embed.thumbnail(thumbnail);
    }

    embed
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

pub fn create_playlist_added_embed(count: usize, first: &QueueItem) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .title("📋 Playlist agregada")
        .description(format!("Se agregaron **{}** canciones a la cola", count))
        .color(colors::SUCCESS_GREEN)
        .field("🎵 Primera canción", &first.title, false);

    if let Some(thumbnail) = &first.thumbnail {
        embed = embed.thumbnail(thumbnail);
    }

    embed
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

pub fn create_queue_embed(snapshot: &QueueSnapshot) -> CreateEmbed {
    let embed = CreateEmbed::default()
        .title("📋 Cola de Reproducción")
        .color(colors::INFO_BLUE)
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
        .timestamp(Timestamp::now());

    if snapshot.is_empty() {
        return embed
            .description("😴 **La cola está vacía**\n\n💡 Usa `/play <url>` para agregar música")
            .color(colors::NEUTRAL_GRAY);
    }

    embed.description(queue_description(snapshot))
}

/// Texto de `/queue`: canción actual, las primeras pendientes y el total
pub fn queue_description(snapshot: &QueueSnapshot) -> String {
    let mut description = String::new();

    if let Some(current) = &snapshot.current {
        description.push_str(&format!(
            "▶️ **Reproduciendo:** {} `[{}]`\n\n",
            current.title,
            current.duration_label()
        ));
    }

    if !snapshot.pending.is_empty() {
        description.push_str("**Próximas canciones**\n");
        for (i, item) in snapshot.pending.iter().take(QUEUE_PREVIEW).enumerate() {
            description.push_str(&format!("**{}**. {} `[{}]`\n", i + 1, item.title, item.duration_label()));
        }

        let hidden = snapshot.pending.len().saturating_sub(QUEUE_PREVIEW);
        if hidden > 0 {
            description.push_str(&format!("... y {} más\n", hidden));
        }
    }

    description.push_str(&format!("\n**Total:** {} en espera", snapshot.pending.len()));
    let total = snapshot.total_duration();
    if !total.is_zero() {
        description.push_str(&format!(" • {}", format_duration(total)));
    }

    description
}

pub fn create_now_playing_embed(now_playing: &NowPlaying) -> CreateEmbed {
    let item = &now_playing.item;
    let mut embed = CreateEmbed::default()
        .title("🎵 Reproduciendo Ahora")
        .description(format!("**{}**", item.title))
        .color(colors::MUSIC_PURPLE)
        .field("⏱️ Progreso", now_playing.progress_label(), true)
        .field("👤 Solicitado por", format!("<@{}>", item.requested_by), true)
        .field("🕒 Agregada", item.added_label(), true)
        .url(&item.url);

    if let Some(thumbnail) = &item.thumbnail {
        embed = embed.thumbnail(thumbnail);
    }

    embed
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

pub fn create_error_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("❌ {}", title))
        .description(description)
        .color(colors::ERROR_RED)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}
