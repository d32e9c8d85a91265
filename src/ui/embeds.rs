use serenity::{
    all::Timestamp,
    builder::{CreateEmbed, CreateEmbedFooter},
};
use std::time::Duration;

use crate::audio::{
    player::Added,
    queue::{QueuePage, QueueSnapshot},
    track::TrackInfo,
};

/// Paleta de colores estandarizada para el bot
pub mod colors {
    use serenity::all::Colour;

    pub const SUCCESS_GREEN: Colour = Colour::from_rgb(67, 181, 129);
    pub const ERROR_RED: Colour = Colour::from_rgb(220, 53, 69);
    pub const WARNING_ORANGE: Colour = Colour::from_rgb(255, 193, 7);
    pub const INFO_BLUE: Colour = Colour::from_rgb(52, 144, 220);
    pub const MUSIC_PURPLE: Colour = Colour::from_rgb(138, 43, 226);
    pub const NEUTRAL_GRAY: Colour = Colour::from_rgb(108, 117, 125);
}

/// Footer estandarizado para todos los embeds
const STANDARD_FOOTER: &str = "🎵 BlackBulb";

pub const QUEUE_PAGE_SIZE: usize = 10;

/// Crea un embed para mostrar la canción actual
pub fn create_now_playing_embed(track: &TrackInfo, paused: bool) -> CreateEmbed {
    let title = if paused {
        "⏸️ En Pausa"
    } else {
        "🎵 Reproduciendo Ahora"
    };

    let mut embed = CreateEmbed::default()
        .title(title)
        .description(format!("**{}**", track.title))
        .color(if paused {
            colors::WARNING_ORANGE
        } else {
            colors::SUCCESS_GREEN
        });

    embed = match track.duration {
        Some(duration) => embed.field("⏱️ Duración", format_duration(duration), true),
        None => embed.field("⏱️ Duración", "Desconocida", true),
    };

    if let Some(user) = track.requested_by {
        embed = embed.field("👤 Solicitado por", format!("<@{}>", user), true);
    }

    if track.source_url.starts_with("http") {
        embed = embed.url(&track.source_url);
    }

    embed
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed para mostrar lo que se agregó a la cola
pub fn create_track_added_embed(added: &Added) -> CreateEmbed {
    if added.count > 1 {
        return create_playlist_added_embed(added);
    }

    let (title, footer) = if added.started {
        ("▶️ Reproduciendo", STANDARD_FOOTER)
    } else {
        (
            "✅ Agregado a la Cola",
            "🎵 Se reproducirá automáticamente cuando termine la actual",
        )
    };

    CreateEmbed::default()
        .title(title)
        .description(format!("**{}**", added.title))
        .color(colors::SUCCESS_GREEN)
        .footer(CreateEmbedFooter::new(footer))
        .timestamp(Timestamp::now())
}

fn create_playlist_added_embed(added: &Added) -> CreateEmbed {
    let footer_text = if added.started {
        "🎵 La reproducción ya comenzó • Usa /queue para ver todas las canciones"
    } else {
        "🎵 Usa /queue para ver todas las canciones"
    };

    CreateEmbed::default()
        .title("📋 Playlist Agregada")
        .description(format!(
            "Se agregaron **{} canciones** a la cola, empezando por **{}**",
            added.count, added.title
        ))
        .color(colors::MUSIC_PURPLE)
        .field("📊 Canciones agregadas", added.count.to_string(), true)
        .footer(CreateEmbedFooter::new(footer_text))
        .timestamp(Timestamp::now())
}

/// Crea un embed para mostrar la cola de reproducción
pub fn create_queue_embed(snapshot: &QueueSnapshot, page: usize) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .title("📋 Cola de Reproducción")
        .color(colors::INFO_BLUE);

    if snapshot.is_empty() {
        return embed
            .description("😴 **La cola está vacía**\n\n💡 Usa `/play <canción>` para agregar música")
            .color(colors::NEUTRAL_GRAY)
            .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
            .timestamp(Timestamp::now());
    }

    if let Some(current) = &snapshot.now_playing {
        let status = if snapshot.paused { "⏸️" } else { "▶️" };
        embed = embed.field(
            format!("{} Reproduciendo", status),
            format!("**{}**", current.title),
            false,
        );
    }

    let queue_page = snapshot.page(page, QUEUE_PAGE_SIZE);
    if !queue_page.items.is_empty() {
        embed = embed.field("Próximas canciones", queue_lines(&queue_page), false);
    }

    let mut info = format!("**En cola:** {} canciones", snapshot.upcoming.len());
    let total = snapshot.total_duration();
    if total > Duration::ZERO {
        info.push_str(&format!(" • **Duración:** {}", format_duration(total)));
    }
    embed = embed.field("Información", info, false);

    if queue_page.total_pages > 1 {
        embed = embed.footer(CreateEmbedFooter::new(format!(
            "Página {} de {} • BlackBulb",
            queue_page.current_page, queue_page.total_pages
        )));
    } else {
        embed = embed.footer(CreateEmbedFooter::new(STANDARD_FOOTER));
    }

    embed.timestamp(Timestamp::now())
}

fn queue_lines(page: &QueuePage) -> String {
    page.items
        .iter()
        .map(|entry| {
            let duration = entry
                .info
                .duration
                .map(|d| format!(" `[{}]`", format_duration(d)))
                .unwrap_or_default();
            format!("**{}**. {}{}\n", entry.position, entry.info.title, duration)
        })
        .collect()
}

/// Crea un embed de ayuda general
pub fn create_help_embed() -> CreateEmbed {
    CreateEmbed::default()
        .title("🎵 BlackBulb - Comandos")
        .color(colors::INFO_BLUE)
        .description("Bot de música con una cola por servidor")
        .field(
            "🎵 Reproducción",
            "• `/play <canción o URL>` - Reproduce o agrega a la cola\n\
            • `/playlist <url>` - Agrega una playlist completa\n\
            • `/pause` - Pausa la reproducción\n\
            • `/resume` - Reanuda la reproducción\n\
            • `/skip` - Salta a la siguiente canción\n\
            • `/stop` - Detiene, limpia la cola y desconecta",
            false,
        )
        .field(
            "📜 Cola",
            "• `/queue [página]` - Muestra la cola\n\
            • `/nowplaying` - Muestra la canción actual\n\
            • `/remove <posición>` - Quita una canción de la cola",
            false,
        )
        .field(
            "🎵 Fuentes Soportadas",
            "• Búsquedas de texto (YouTube)\n\
            • URLs de YouTube, SoundCloud y otros sitios soportados por yt-dlp\n\
            • URLs directas de audio (.mp3, .ogg, .flac, .wav, .m4a)",
            false,
        )
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
        .timestamp(Timestamp::now())
}

/// Crea un embed de error
pub fn create_error_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("❌ {}", title))
        .description(description)
        .color(colors::ERROR_RED)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed de éxito
pub fn create_success_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("✅ {}", title))
        .description(description)
        .color(colors::SUCCESS_GREEN)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Formatea una duración en formato legible
pub fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::queue::QueueEntry;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(59)), "0:59");
        assert_eq!(format_duration(Duration::from_secs(212)), "3:32");
        assert_eq!(format_duration(Duration::from_secs(3723)), "1:02:03");
    }

    #[test]
    fn test_queue_lines() {
        let page = QueuePage {
            items: vec![
                QueueEntry {
                    position: 11,
                    info: TrackInfo::new("a", "u").with_duration(Duration::from_secs(90)),
                },
                QueueEntry {
                    position: 12,
                    info: TrackInfo::new("b", "u"),
                },
            ],
            current_page: 2,
            total_pages: 2,
        };

        assert_eq!(queue_lines(&page), "**11**. a `[1:30]`\n**12**. b\n");
    }

    #[test]
    fn test_empty_queue_embed() {
        let embed = create_queue_embed(&QueueSnapshot::default(), 1);
        let json = serde_json::to_value(&embed).unwrap();
        assert!(json["description"]
            .as_str()
            .unwrap()
            .contains("La cola está vacía"));
    }
}
