use serenity::{
    all::ButtonStyle,
    builder::{CreateActionRow, CreateButton},
};

/// IDs personalizados para los botones
pub mod button_ids {
    pub const PAUSE: &str = "player_pause";
    pub const RESUME: &str = "player_resume";
    pub const SKIP: &str = "player_skip";
    pub const STOP: &str = "player_stop";
}

/// Acción pedida por un botón del reproductor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerAction {
    Pause,
    Resume,
    Skip,
    Stop,
}

impl PlayerAction {
    pub fn from_custom_id(custom_id: &str) -> Option<Self> {
        match custom_id {
            button_ids::PAUSE => Some(Self::Pause),
            button_ids::RESUME => Some(Self::Resume),
            button_ids::SKIP => Some(Self::Skip),
            button_ids::STOP => Some(Self::Stop),
            _ => None,
        }
    }
}

/// Crea los controles del reproductor.
///
/// Muestra pausa o reanudar según el estado actual.
pub fn create_player_buttons(paused: bool) -> Vec<CreateActionRow> {
    let toggle = if paused {
        CreateButton::new(button_ids::RESUME)
            .emoji('▶')
            .style(ButtonStyle::Success)
    } else {
        CreateButton::new(button_ids::PAUSE)
            .emoji('⏸')
            .style(ButtonStyle::Secondary)
    };

    let skip_btn = CreateButton::new(button_ids::SKIP)
        .emoji('⏭')
        .style(ButtonStyle::Primary);

    let stop_btn = CreateButton::new(button_ids::STOP)
        .emoji('⏹')
        .style(ButtonStyle::Danger);

    vec![CreateActionRow::Buttons(vec![toggle, skip_btn, stop_btn])]
}
