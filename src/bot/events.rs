use anyhow::Result;
use serenity::{
    async_trait,
    builder::{CreateEmbed, CreateMessage},
    http::Http,
    model::id::ChannelId,
};
use std::sync::Arc;
use tracing::{error, info};

use crate::{
    audio::{session::PlaybackNotifier, track::TrackInfo, voice::RoomTarget},
    error::MusicError,
    ui::{buttons, embeds},
};

/// Publica los avisos de reproducción en el canal de texto de la sesión
pub struct ChannelNotifier {
    http: Arc<Http>,
}

impl ChannelNotifier {
    pub fn new(http: Arc<Http>) -> Self {
        Self { http }
    }
}

#[async_trait]
impl PlaybackNotifier for ChannelNotifier {
    async fn now_playing(&self, room: &RoomTarget, track: &TrackInfo) {
        info!(
            "▶️ Reproduciendo: {} en guild {}",
            track.title, room.guild_id
        );

        let message = CreateMessage::new()
            .embed(embeds::create_now_playing_embed(track, false))
            .components(buttons::create_player_buttons(false));

        if let Err(e) = send(&self.http, room.text_channel, message).await {
            error!("Error al enviar mensaje now playing: {:?}", e);
        }
    }

    async fn playback_failed(&self, room: &RoomTarget, error: &MusicError) {
        error!(
            "❌ No se pudo continuar la reproducción en guild {}: {}",
            room.guild_id, error
        );

        let embed = failure_embed(error);
        if let Err(e) = send(&self.http, room.text_channel, CreateMessage::new().embed(embed)).await {
            error!("Error al enviar aviso de fallo: {:?}", e);
        }
    }
}

fn failure_embed(error: &MusicError) -> CreateEmbed {
    embeds::create_error_embed(
        "Error de reproducción",
        &format!(
            "{}\n\n💡 La canción sigue primera en la cola: usa `/remove 1` para quitarla y continuar",
            error
        ),
    )
}

async fn send(http: &Http, channel_id: ChannelId, message: CreateMessage) -> Result<()> {
    channel_id.send_message(http, message).await?;
    Ok(())
}
