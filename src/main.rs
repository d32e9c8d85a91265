use anyhow::Result;
use serenity::{http::Http, model::gateway::GatewayIntents, Client};
use songbird::{SerenityInit, Songbird};
use std::sync::Arc;
use tracing::{error, info};

mod audio;
mod bot;
mod config;
mod error;
mod sources;
mod ui;

use crate::audio::{media::MediaStore, player::AudioPlayer, voice::SongbirdTransport};
use crate::bot::{events::ChannelNotifier, BlackBulbBot};
use crate::config::Config;
use crate::sources::{DirectUrlResolver, SourceResolver, YtDlpResolver};

#[tokio::main]
async fn main() -> Result<()> {
    // Inicializar logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("blackbulb=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    info!("🎵 Iniciando BlackBulb v{}", env!("CARGO_PKG_VERSION"));

    // Cargar configuración
    let config = Arc::new(Config::load()?);
    info!("{}", config.summary());

    if std::env::args().any(|arg| arg == "--health-check") {
        return health_check(&config).await;
    }

    // Directorio de medios: se purga lo que haya quedado de ejecuciones anteriores
    let media = Arc::new(MediaStore::open(&config.media_dir).await?);

    let songbird = Songbird::serenity();
    let transport = Arc::new(SongbirdTransport::new(
        songbird.clone(),
        config.default_volume,
    ));

    let resolver = Arc::new(SourceResolver::new(
        YtDlpResolver::new(
            config.ytdlp_path.clone(),
            media.clone(),
            config.resolve_timeout,
            config.max_playlist_size,
        ),
        DirectUrlResolver::new(),
    ));

    let notifier = Arc::new(ChannelNotifier::new(Arc::new(Http::new(
        &config.discord_token,
    ))));

    let player = Arc::new(AudioPlayer::new(
        resolver,
        transport,
        media,
        notifier,
        config.max_queue_size,
    ));

    // Slash commands + estado de voz; no se leen mensajes
    let intents = GatewayIntents::GUILDS | GatewayIntents::GUILD_VOICE_STATES;

    let handler = BlackBulbBot::new(config.clone(), player.clone());

    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(handler)
        .register_songbird_with(songbird)
        .await?;

    // Manejar shutdown graceful
    let shard_manager = client.shard_manager.clone();
    let shutdown_player = player.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Error al registrar Ctrl+C: {:?}", e);
            return;
        }
        info!("⚠️ Señal de shutdown recibida, cerrando...");
        shutdown_player.shutdown().await;
        shard_manager.shutdown_all().await;
    });

    // Iniciar bot
    info!("🚀 Bot iniciado exitosamente");
    if let Err(why) = client.start().await {
        error!("Error al ejecutar cliente: {:?}", why);
    }

    info!("👋 BlackBulb detenido ({} sesiones activas)", player.active_sessions());

    Ok(())
}

async fn health_check(config: &Config) -> Result<()> {
    // yt-dlp es la única dependencia externa crítica
    let version = YtDlpResolver::version(&config.ytdlp_path).await?;
    info!("✅ yt-dlp {}", version);
    println!("OK");
    Ok(())
}
