//! UI theme: palette tokens and style helpers for unit states

use ratatui::style::{Color, Modifier, Style};

use pilot_core::unit::UnitRecord;

/// Color palette tokens for the theme
#[derive(Clone, Debug)]
pub struct Palette {
    /// Panel border color
    pub panel_border: Color,
    /// Primary text color
    pub text: Color,
    /// Dimmed text (secondary info)
    pub text_dim: Color,
    /// Muted text (inactive units, disabled hints)
    pub text_muted: Color,
    /// Accent color (highlights, focus)
    pub accent: Color,
    /// Running units
    pub success: Color,
    /// Units in transition, pending reconciliation
    pub warn: Color,
    /// Failed units, error notices
    pub error: Color,
    pub selection_bg: Color,
    pub selection_fg: Color,
    /// Key hint text
    pub key_hint: Color,
}

impl Default for Palette {
    fn default() -> Self {
        Self::dark()
    }
}

impl Palette {
    pub fn dark() -> Self {
        Self {
            panel_border: Color::Rgb(60, 60, 60),
            text: Color::Rgb(212, 212, 212),
            text_dim: Color::Rgb(150, 150, 150),
            text_muted: Color::Rgb(100, 100, 100),
            accent: Color::Rgb(79, 193, 255),
            success: Color::Rgb(78, 201, 176),
            warn: Color::Rgb(220, 180, 100),
            error: Color::Rgb(244, 135, 113),
            selection_bg: Color::Rgb(38, 79, 120),
            selection_fg: Color::White,
            key_hint: Color::Rgb(206, 145, 120),
        }
    }
}

/// Coarse visual class of a unit's state
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnitTone {
    Running,
    Failed,
    Transition,
    /// Active but not running (oneshot services that exited, etc.)
    Idle,
    Inactive,
}

impl UnitTone {
    pub fn of(unit: &UnitRecord) -> Self {
        if unit.is_failed() {
            Self::Failed
        } else if unit.is_running() {
            Self::Running
        } else {
            match unit.active_state.as_str() {
                "activating" | "deactivating" | "reloading" | "refreshing" => Self::Transition,
                "active" => Self::Idle,
                _ => Self::Inactive,
            }
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct Theme {
    pub palette: Palette,
}

impl Theme {
    pub fn unit_style(&self, tone: UnitTone) -> Style {
        let color = match tone {
            UnitTone::Running => self.palette.success,
            UnitTone::Failed => self.palette.error,
            UnitTone::Transition => self.palette.warn,
            UnitTone::Idle => self.palette.text_dim,
            UnitTone::Inactive => self.palette.text_muted,
        };
        Style::default().fg(color)
    }

    pub fn unit_icon(&self, tone: UnitTone) -> &'static str {
        match tone {
            UnitTone::Running => "●",
            UnitTone::Failed => "✗",
            UnitTone::Transition => "◐",
            UnitTone::Idle => "◌",
            UnitTone::Inactive => "○",
        }
    }

    pub fn tab_style(&self, active: bool) -> Style {
        if active {
            Style::default()
                .fg(self.palette.accent)
                .add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(self.palette.text_dim)
        }
    }

    pub fn key_hint_style(&self) -> Style {
        Style::default().fg(self.palette.key_hint)
    }

    pub fn border_style(&self, focused: bool) -> Style {
        if focused {
            Style::default().fg(self.palette.accent)
        } else {
            Style::default().fg(self.palette.panel_border)
        }
    }

    pub fn selection_style(&self) -> Style {
        Style::default()
            .bg(self.palette.selection_bg)
            .fg(self.palette.selection_fg)
            .add_modifier(Modifier::BOLD)
    }

    pub fn text_style(&self) -> Style {
        Style::default().fg(self.palette.text)
    }

    pub fn text_dim_style(&self) -> Style {
        Style::default().fg(self.palette.text_dim)
    }

    pub fn warn_style(&self) -> Style {
        Style::default().fg(self.palette.warn)
    }

    pub fn error_style(&self) -> Style {
        Style::default().fg(self.palette.error)
    }

    pub fn title_style(&self) -> Style {
        Style::default()
            .fg(self.palette.text)
            .add_modifier(Modifier::BOLD)
    }
}

static DEFAULT_THEME: std::sync::OnceLock<Theme> = std::sync::OnceLock::new();

pub fn theme() -> &'static Theme {
    DEFAULT_THEME.get_or_init(Theme::default)
}

/// Free-function shorthands over the default theme
pub mod styles {
    use super::*;

    pub fn unit(tone: UnitTone) -> Style {
        theme().unit_style(tone)
    }

    pub fn unit_icon(tone: UnitTone) -> &'static str {
        theme().unit_icon(tone)
    }

    pub fn tab(active: bool) -> Style {
        theme().tab_style(active)
    }

    pub fn key_hint() -> Style {
        theme().key_hint_style()
    }

    pub fn border(focused: bool) -> Style {
        theme().border_style(focused)
    }

    pub fn selection() -> Style {
        theme().selection_style()
    }

    pub fn text() -> Style {
        theme().text_style()
    }

    pub fn text_dim() -> Style {
        theme().text_dim_style()
    }

    pub fn warn() -> Style {
        theme().warn_style()
    }

    pub fn error() -> Style {
        theme().error_style()
    }

    pub fn title() -> Style {
        theme().title_style()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(active: &str, sub: &str) -> UnitRecord {
        UnitRecord::from_full_name("x.service", "loaded", active, sub, "").unwrap()
    }

    #[test]
    fn test_unit_tone() {
        assert_eq!(UnitTone::of(&unit("active", "running")), UnitTone::Running);
        assert_eq!(UnitTone::of(&unit("failed", "failed")), UnitTone::Failed);
        assert_eq!(UnitTone::of(&unit("activating", "start-pre")), UnitTone::Transition);
        assert_eq!(UnitTone::of(&unit("active", "exited")), UnitTone::Idle);
        assert_eq!(UnitTone::of(&unit("inactive", "dead")), UnitTone::Inactive);
    }
}
