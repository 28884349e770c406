pub mod theme;
pub mod view;

use ratatui::widgets::ListState;

use pilot_core::unit::UnitRecord;

/// Terminal-side state the engine does not own: cursor and search input
#[derive(Debug, Default)]
pub struct App {
    pub selected: usize,
    /// The search line has keyboard focus
    pub searching: bool,
    /// Query as typed; the engine's focus lags it by one round trip
    pub query: String,
    pub list_state: ListState,
}

impl App {
    pub fn selected_unit<'a>(&self, visible: &[&'a UnitRecord]) -> Option<&'a UnitRecord> {
        visible.get(self.selected).copied()
    }

    pub fn move_by(&mut self, delta: isize, len: usize) {
        if len == 0 {
            self.selected = 0;
            return;
        }
        let next = self.selected as isize + delta;
        self.selected = next.clamp(0, len as isize - 1) as usize;
    }

    /// Keep the cursor inside the list after it shrinks
    pub fn clamp(&mut self, len: usize) {
        self.selected = self.selected.min(len.saturating_sub(1));
        self.list_state
            .select(if len == 0 { None } else { Some(self.selected) });
    }
}
