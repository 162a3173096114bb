use serde::Serialize;

/// Coarse performance tier shown on the result screen.
///
/// Breakpoints are absolute Purificoin totals; they are not scaled by the
/// number of questions in the session.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Level {
    CubDragon,
    YoungWolf,
    BraveLion,
    LegendaryPhoenix,
}

impl Level {
    pub fn classify(score: u32) -> Self {
        match score {
            0..=25 => Level::CubDragon,
            26..=50 => Level::YoungWolf,
            51..=75 => Level::BraveLion,
            _ => Level::LegendaryPhoenix,
        }
    }

    pub fn tier(self) -> u8 {
        match self {
            Level::CubDragon => 1,
            Level::YoungWolf => 2,
            Level::BraveLion => 3,
            Level::LegendaryPhoenix => 4,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Level::CubDragon => "Drago Cucciolo",
            Level::YoungWolf => "Lupo Giovane",
            Level::BraveLion => "Leone Coraggioso",
            Level::LegendaryPhoenix => "Fenice Leggendaria",
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            Level::CubDragon => "Devi migliorare, continua a studiare!",
            Level::YoungWolf => "Buon inizio, puoi fare di meglio!",
            Level::BraveLion => "Molto bene, continua così!",
            Level::LegendaryPhoenix => "Eccellente, sei un vero campione!",
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct LevelInfo {
    pub tier: u8,
    pub label: &'static str,
    pub message: &'static str,
}

pub fn classify(score: u32) -> LevelInfo {
    let level = Level::classify(score);
    LevelInfo {
        tier: level.tier(),
        label: level.label(),
        message: level.message(),
    }
}
