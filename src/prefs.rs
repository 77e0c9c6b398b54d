//! Reader display preferences.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{
    error::Result,
    state::{StateStore, FONT_SIZE, THEME},
};

pub const DEFAULT_FONT_SIZE: u8 = 18;
pub const MIN_FONT_SIZE: u8 = 12;
pub const MAX_FONT_SIZE: u8 = 28;
pub const FONT_STEP: i32 = 2;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

impl Theme {
    pub fn toggled(self) -> Self {
        match self {
            Theme::Light => Theme::Dark,
            Theme::Dark => Theme::Light,
        }
    }
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Theme::Light => f.write_str("light"),
            Theme::Dark => f.write_str("dark"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Preferences {
    pub theme: Theme,
    pub font_size: u8,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            theme: Theme::Light,
            font_size: DEFAULT_FONT_SIZE,
        }
    }
}

pub fn clamp_font_size(size: i32) -> u8 {
    size.clamp(MIN_FONT_SIZE as i32, MAX_FONT_SIZE as i32) as u8
}

/// Load stored preferences; missing values take defaults and out-of-range
/// sizes are pulled back into range.
pub fn load(state: &StateStore) -> Result<Preferences> {
    let theme = state.get::<Theme>(THEME)?.unwrap_or_default();
    let font_size = state
        .get::<i32>(FONT_SIZE)?
        .map(clamp_font_size)
        .unwrap_or(DEFAULT_FONT_SIZE);
    Ok(Preferences { theme, font_size })
}

pub fn toggle_theme(state: &StateStore) -> Result<Preferences> {
    let mut prefs = load(state)?;
    prefs.theme = prefs.theme.toggled();
    state.set(THEME, &prefs.theme)?;
    Ok(prefs)
}

/// Move the font size by `delta` steps of [`FONT_STEP`].
pub fn change_font_size(state: &StateStore, delta: i32) -> Result<Preferences> {
    let mut prefs = load(state)?;
    prefs.font_size = clamp_font_size(prefs.font_size as i32 + delta.saturating_mul(FONT_STEP));
    state.set(FONT_SIZE, &prefs.font_size)?;
    Ok(prefs)
}
