use anyhow::Result;
use serenity::{
    builder::{
        CreateEmbed, CreateInteractionResponse, CreateInteractionResponseMessage,
        EditInteractionResponse,
    },
    model::{
        application::{CommandInteraction, ComponentInteraction},
        id::{ChannelId, GuildId, UserId},
    },
    prelude::Context,
};
use tracing::{debug, info, warn};

use crate::{
    audio::player::PlayRequest,
    bot::BlackBulbBot,
    error::MusicError,
    ui::{
        buttons::{self, PlayerAction},
        embeds,
    },
};

/// Maneja comandos slash
pub async fn handle_command(
    ctx: &Context,
    command: CommandInteraction,
    bot: &BlackBulbBot,
) -> Result<()> {
    let guild_id = command
        .guild_id
        .ok_or_else(|| anyhow::anyhow!("Comando usado fuera de un servidor"))?;

    info!(
        "📝 Comando /{} usado por {} en guild {}",
        command.data.name, command.user.name, guild_id
    );

    match command.data.name.as_str() {
        "play" => handle_play(ctx, &command, bot, guild_id, "query").await?,
        "playlist" => handle_play(ctx, &command, bot, guild_id, "url").await?,
        "pause" => handle_pause(ctx, &command, bot, guild_id).await?,
        "resume" => handle_resume(ctx, &command, bot, guild_id).await?,
        "skip" => handle_skip(ctx, &command, bot, guild_id).await?,
        "stop" => handle_stop(ctx, &command, bot, guild_id).await?,
        "queue" => handle_queue(ctx, &command, bot, guild_id).await?,
        "nowplaying" => handle_nowplaying(ctx, &command, bot, guild_id).await?,
        "remove" => handle_remove(ctx, &command, bot, guild_id).await?,
        "help" => respond(ctx, &command, embeds::create_help_embed()).await?,
        _ => {
            command
                .create_response(
                    &ctx.http,
                    CreateInteractionResponse::Message(
                        CreateInteractionResponseMessage::new()
                            .content("❌ Comando no reconocido")
                            .ephemeral(true),
                    ),
                )
                .await?;
        }
    }

    Ok(())
}

/// Maneja los botones del reproductor
pub async fn handle_component(
    ctx: &Context,
    component: ComponentInteraction,
    bot: &BlackBulbBot,
) -> Result<()> {
    let guild_id = component
        .guild_id
        .ok_or_else(|| anyhow::anyhow!("Componente usado fuera de un servidor"))?;

    info!(
        "🔘 Botón {} presionado por {} en guild {}",
        component.data.custom_id, component.user.name, guild_id
    );

    let Some(action) = PlayerAction::from_custom_id(&component.data.custom_id) else {
        debug!("Botón desconocido: {}", component.data.custom_id);
        return Ok(());
    };

    let (command_name, outcome) = match action {
        PlayerAction::Pause => ("pause", bot.player.pause(guild_id).await),
        PlayerAction::Resume => ("resume", bot.player.resume(guild_id).await),
        PlayerAction::Skip => ("skip", bot.player.skip(guild_id).await.map(|_| ())),
        PlayerAction::Stop => ("stop", bot.player.stop(guild_id).await),
    };

    let response = match outcome {
        Ok(()) => {
            // Los botones solo siguen vivos mientras la canción del mensaje suena
            let components = match action {
                PlayerAction::Pause => buttons::create_player_buttons(true),
                PlayerAction::Resume => buttons::create_player_buttons(false),
                PlayerAction::Skip | PlayerAction::Stop => Vec::new(),
            };
            CreateInteractionResponse::UpdateMessage(
                CreateInteractionResponseMessage::new().components(components),
            )
        }
        Err(e) => {
            log_music_error(command_name, guild_id, &e);
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new()
                    .embed(error_embed(command_name, &e))
                    .ephemeral(true),
            )
        }
    };

    component.create_response(&ctx.http, response).await?;

    Ok(())
}

/// `/play` y `/playlist`: resuelven (posiblemente descargando) antes de responder
async fn handle_play(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &BlackBulbBot,
    guild_id: GuildId,
    option: &str,
) -> Result<()> {
    let query = string_option(command, option)
        .ok_or_else(|| anyhow::anyhow!("Falta el parámetro '{}'", option))?
        .trim()
        .to_string();

    // La descarga puede tardar más que los 3s que da Discord
    command
        .create_response(&ctx.http, CreateInteractionResponse::Defer(Default::default()))
        .await?;

    let request = PlayRequest {
        guild_id,
        voice_channel: user_voice_channel(ctx, guild_id, command.user.id),
        text_channel: command.channel_id,
        requested_by: command.user.id,
        query,
    };

    let embed = match bot.player.play(request).await {
        Ok(added) => {
            info!(
                "✅ {} canción(es) agregadas en guild {}: {}",
                added.count, guild_id, added.title
            );
            embeds::create_track_added_embed(&added)
        }
        Err(e) => {
            log_music_error(&command.data.name, guild_id, &e);
            error_embed(&command.data.name, &e)
        }
    };

    command
        .edit_response(&ctx.http, EditInteractionResponse::new().embed(embed))
        .await?;

    Ok(())
}

async fn handle_pause(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &BlackBulbBot,
    guild_id: GuildId,
) -> Result<()> {
    let embed = match bot.player.pause(guild_id).await {
        Ok(()) => embeds::create_success_embed("Pausado", "⏸️ Reproducción en pausa"),
        Err(e) => {
            log_music_error("pause", guild_id, &e);
            error_embed("pause", &e)
        }
    };

    respond(ctx, command, embed).await
}

async fn handle_resume(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &BlackBulbBot,
    guild_id: GuildId,
) -> Result<()> {
    let embed = match bot.player.resume(guild_id).await {
        Ok(()) => embeds::create_success_embed("Reanudado", "▶️ Reproducción reanudada"),
        Err(e) => {
            log_music_error("resume", guild_id, &e);
            error_embed("resume", &e)
        }
    };

    respond(ctx, command, embed).await
}

async fn handle_skip(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &BlackBulbBot,
    guild_id: GuildId,
) -> Result<()> {
    let embed = match bot.player.skip(guild_id).await {
        Ok(skipped) => embeds::create_success_embed(
            "Saltado",
            &format!("⏭️ Se saltó **{}**", skipped.title),
        ),
        Err(e) => {
            log_music_error("skip", guild_id, &e);
            error_embed("skip", &e)
        }
    };

    respond(ctx, command, embed).await
}

async fn handle_stop(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &BlackBulbBot,
    guild_id: GuildId,
) -> Result<()> {
    let embed = match bot.player.stop(guild_id).await {
        Ok(()) => embeds::create_success_embed(
            "Detenido",
            "⏹️ Reproducción detenida, cola limpiada y desconectado",
        ),
        Err(e) => {
            log_music_error("stop", guild_id, &e);
            error_embed("stop", &e)
        }
    };

    respond(ctx, command, embed).await
}

async fn handle_queue(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &BlackBulbBot,
    guild_id: GuildId,
) -> Result<()> {
    let page = integer_option(command, "page")
        .and_then(|p| usize::try_from(p).ok())
        .unwrap_or(1);

    let snapshot = bot.player.queue_snapshot(guild_id).await;
    respond(ctx, command, embeds::create_queue_embed(&snapshot, page)).await
}

async fn handle_nowplaying(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &BlackBulbBot,
    guild_id: GuildId,
) -> Result<()> {
    let snapshot = bot.player.queue_snapshot(guild_id).await;

    let message = match &snapshot.now_playing {
        Some(track) => CreateInteractionResponseMessage::new()
            .embed(embeds::create_now_playing_embed(track, snapshot.paused))
            .components(buttons::create_player_buttons(snapshot.paused)),
        None => CreateInteractionResponseMessage::new()
            .embed(error_embed("nowplaying", &MusicError::NothingPlaying)),
    };

    command
        .create_response(&ctx.http, CreateInteractionResponse::Message(message))
        .await?;

    Ok(())
}

async fn handle_remove(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &BlackBulbBot,
    guild_id: GuildId,
) -> Result<()> {
    let index = integer_option(command, "position")
        .and_then(|p| usize::try_from(p).ok())
        .unwrap_or(0);

    let embed = match bot.player.remove(guild_id, index).await {
        Ok(removed) => embeds::create_success_embed(
            "Eliminado",
            &format!("🗑️ Se quitó **{}** de la cola", removed.title),
        ),
        Err(e) => {
            log_music_error("remove", guild_id, &e);
            error_embed("remove", &e)
        }
    };

    respond(ctx, command, embed).await
}

async fn respond(ctx: &Context, command: &CommandInteraction, embed: CreateEmbed) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new().embed(embed),
            ),
        )
        .await?;

    Ok(())
}

fn string_option<'a>(command: &'a CommandInteraction, name: &str) -> Option<&'a str> {
    command
        .data
        .options
        .iter()
        .find(|option| option.name == name)
        .and_then(|option| option.value.as_str())
}

fn integer_option(command: &CommandInteraction, name: &str) -> Option<i64> {
    command
        .data
        .options
        .iter()
        .find(|option| option.name == name)
        .and_then(|option| option.value.as_i64())
}

/// Canal de voz en el que está el usuario, según la caché
fn user_voice_channel(ctx: &Context, guild_id: GuildId, user_id: UserId) -> Option<ChannelId> {
    let guild = guild_id.to_guild_cached(&ctx.cache)?;
    guild
        .voice_states
        .get(&user_id)
        .and_then(|voice_state| voice_state.channel_id)
}

/// Los desajustes de estado son respuestas normales; el resto sí se reporta
fn log_music_error(command: &str, guild_id: GuildId, error: &MusicError) {
    if error.is_state_mismatch() {
        debug!("/{} en guild {}: {}", command, guild_id, error);
    } else {
        warn!("⚠️ /{} falló en guild {}: {}", command, guild_id, error);
    }
}

fn error_embed(command: &str, error: &MusicError) -> CreateEmbed {
    let (title, description) = error_message(command, error);
    embeds::create_error_embed(title, &description)
}

/// Título y texto que ve el usuario para cada error
fn error_message(command: &str, error: &MusicError) -> (&'static str, String) {
    match (command, error) {
        ("pause", MusicError::NothingPaused) => {
            ("Ya en pausa", "⏸️ La reproducción ya está en pausa".to_string())
        }
        ("resume", MusicError::NothingPaused) => {
            ("Nada en pausa", "▶️ No hay ninguna canción en pausa".to_string())
        }
        (_, MusicError::NotInRoom) => (
            "No estás en un canal de voz",
            "🔊 Únete a un canal de voz y vuelve a intentarlo".to_string(),
        ),
        (_, MusicError::ResolutionFailed(reason)) => (
            "No se encontró la canción",
            format!("🔍 {}", reason),
        ),
        (_, MusicError::ConnectionFailed(reason)) => (
            "Error de conexión",
            format!("🔌 {}", reason),
        ),
        (_, MusicError::OutOfRange { index, len }) => (
            "Posición inválida",
            if *len == 0 {
                format!("📭 La cola está vacía, no existe la posición {}", index)
            } else {
                format!("📋 Elige una posición entre 1 y {} (pediste {})", len, index)
            },
        ),
        (_, MusicError::QueueFull(max)) => (
            "Cola llena",
            format!("📋 La cola admite como máximo {} canciones", max),
        ),
        (_, e @ (MusicError::NothingPlaying
        | MusicError::NothingPaused
        | MusicError::NotConnected)) => ("Nada que hacer", format!("😴 {}", e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_pause_twice_reads_as_already_paused() {
        let (title, text) = error_message("pause", &MusicError::NothingPaused);
        assert_eq!(title, "Ya en pausa");
        assert!(text.contains("ya está en pausa"));

        let (title, _) = error_message("resume", &MusicError::NothingPaused);
        assert_eq!(title, "Nada en pausa");
    }

    #[test]
    fn test_out_of_range_messages() {
        let (_, empty) = error_message("remove", &MusicError::OutOfRange { index: 2, len: 0 });
        assert!(empty.contains("vacía"));

        let (_, bounded) = error_message("remove", &MusicError::OutOfRange { index: 7, len: 3 });
        assert_eq!(bounded, "📋 Elige una posición entre 1 y 3 (pediste 7)");
    }

    #[test]
    fn test_resolution_reason_is_shown() {
        let (title, text) = error_message(
            "play",
            &MusicError::ResolutionFailed("Video unavailable".to_string()),
        );
        assert_eq!(title, "No se encontró la canción");
        assert_eq!(text, "🔍 Video unavailable");
    }

    #[test]
    fn test_state_errors_fall_back_to_display() {
        let (_, text) = error_message("stop", &MusicError::NotConnected);
        assert_eq!(text, format!("😴 {}", MusicError::NotConnected));
    }
}
