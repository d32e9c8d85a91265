//! # Bot Module
//!
//! Discord glue for BlackBulb.
//!
//! This module contains:
//! - Slash command registration ([`commands`])
//! - Command and button dispatch to the [`AudioPlayer`] ([`handlers`])
//! - Now-playing announcements in the session's text channel ([`events`])
//!
//! ## Architecture
//!
//! [`BlackBulbBot`] implements Serenity's [`EventHandler`]. It owns no
//! playback state of its own: every command is translated into a call on the
//! shared [`AudioPlayer`], which keeps one session per guild.
//!
//! When the bot is disconnected from voice by someone else (kicked, channel
//! deleted), the guild's session is torn down so its queue and downloaded
//! files do not outlive the connection.

use anyhow::Result;
use serenity::{
    all::{Context, EventHandler, GuildId, Interaction, Ready, VoiceState},
    async_trait,
};
use std::sync::Arc;
use tracing::{error, info, warn};

pub mod commands;
pub mod events;
pub mod handlers;

use crate::{audio::player::AudioPlayer, config::Config};

/// Handler de eventos de Discord.
///
/// ## Fields
///
/// - `config`: configuración del bot (tokens, guild de desarrollo)
/// - `player`: reproductor compartido con el resto del proceso
pub struct BlackBulbBot {
    config: Arc<Config>,
    pub player: Arc<AudioPlayer>,
}

impl BlackBulbBot {
    pub fn new(config: Arc<Config>, player: Arc<AudioPlayer>) -> Self {
        Self { config, player }
    }

    /// Registra los comandos slash.
    ///
    /// Con `GUILD_ID` definido se registran solo en esa guild (aparecen al
    /// instante, útil en desarrollo); si no, globalmente.
    async fn register_commands(&self, ctx: &Context) -> Result<()> {
        info!("📝 Registrando comandos slash...");
        info!("🔧 Application ID: {}", self.config.application_id);

        match self.config.guild_id {
            Some(guild_id) => {
                info!("🏠 Registrando comandos para guild específica: {}", guild_id);
                let guild_id = GuildId::new(guild_id);

                if !ctx.cache.guilds().contains(&guild_id) {
                    warn!("⚠️ El bot no está en la guild especificada: {}", guild_id);
                    return Ok(());
                }

                commands::register_guild_commands(ctx, guild_id)
                    .await
                    .map_err(|e| {
                        error!("❌ Error registrando comandos de guild: {:?}", e);
                        anyhow::anyhow!("No se pudieron registrar comandos de guild. Verifica que el bot tenga permisos de 'applications.commands' en la guild.")
                    })?;
                info!("✅ Comandos de guild registrados para: {}", guild_id);
            }
            None => {
                info!("🌐 Registrando comandos globalmente");
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
impl EventHandler for BlackBulbBot {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 {} está en línea!", ready.user.name);
        info!("📊 Conectado a {} servidores", ready.guilds.len());

        if let Err(e) = self.register_commands(&ctx).await {
            error!("Error al registrar comandos: {:?}", e);
        }
    }

    /// Errors are logged but don't crash the bot. A failed handler may
    /// leave the user with Discord's "This interaction failed" message.
    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        match interaction {
            Interaction::Command(command_interaction) => {
                if let Err(e) = handlers::handle_command(&ctx, command_interaction, self).await {
                    error!("Error manejando comando: {:?}", e);
                }
            }
            Interaction::Component(component_interaction) => {
                if let Err(e) = handlers::handle_component(&ctx, component_interaction, self).await
                {
                    error!("Error manejando componente: {:?}", e);
                }
            }
            _ => {}
        }
    }

    /// Detecta cuando el bot sale del canal de voz sin pasar por `/stop`.
    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        let current_user_id = ctx.cache.current_user().id;
        if new.user_id != current_user_id {
            return;
        }

        if old.is_some() && new.channel_id.is_none() {
            if let Some(guild_id) = new.guild_id {
                info!("🔌 Bot desconectado en guild {}", guild_id);
                self.player.teardown(guild_id).await;
            }
        }
    }
}
