//! # Audio Module
//!
//! Per-guild playback for BlackBulb.
//!
//! ## Architecture
//!
//! ### [`player`] - Audio Player
//! - Entry point for every command: resolves queries and routes them to the
//!   guild's session
//! - Keeps at most one session per guild; sessions deregister themselves
//!   when they close
//!
//! ### [`session`] / [`controller`] - Playback State
//! - One lock per guild serializes commands and end-of-stream events
//! - The controller owns the queue, the now-playing slot and the voice
//!   connection; the session runs the side effects after unlocking
//!
//! ### [`queue`] - Queue Management
//! - Strict FIFO with a size cap and 1-based removal
//! - Consistent snapshots for `/queue` and `/nowplaying`
//!
//! ### [`media`] / [`track`] - Downloaded Audio
//! - Every downloaded file has exactly one owner and is deleted exactly once
//!
//! ### [`voice`] - Voice Transport
//! - Songbird-backed connections behind a small trait
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! use blackbulb::audio::player::{AudioPlayer, PlayRequest};
//! use serenity::all::{ChannelId, GuildId, UserId};
//!
//! # async fn example(player: AudioPlayer) -> anyhow::Result<()> {
//! let guild_id = GuildId::new(123456789);
//!
//! player
//!     .play(PlayRequest {
//!         guild_id,
//!         voice_channel: Some(ChannelId::new(1)),
//!         text_channel: ChannelId::new(2),
//!         requested_by: UserId::new(3),
//!         query: "never gonna give you up".to_string(),
//!     })
//!     .await?;
//!
//! player.pause(guild_id).await?;
//! player.resume(guild_id).await?;
//! player.skip(guild_id).await?;
//! # Ok(())
//! # }
//! ```

pub mod controller;
pub mod media;
pub mod player;
pub mod queue;
pub mod session;
pub mod track;
pub mod voice;

#[cfg(test)]
mod testing;
