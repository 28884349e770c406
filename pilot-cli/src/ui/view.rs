use std::time::SystemTime;

use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout, Rect},
    text::{Line, Span, Text},
    widgets::{Block, Borders, List, ListItem, Paragraph},
};

use pilot_core::filter::Scope;
use pilot_core::reducer::{NoticeLevel, ViewState};
use pilot_core::unit::UnitRecord;

use super::App;
use super::theme::{UnitTone, styles};

/// Format a SystemTime as HH:MM:SS (UTC)
fn format_timestamp(time: SystemTime) -> String {
    match time.duration_since(SystemTime::UNIX_EPOCH) {
        Ok(duration) => {
            let secs = duration.as_secs();
            let hours = (secs / 3600) % 24;
            let minutes = (secs / 60) % 60;
            let seconds = secs % 60;
            format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
        }
        Err(_) => "??:??:??".to_string(),
    }
}

pub fn draw(f: &mut Frame, state: &ViewState, app: &mut App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Length(1),
            Constraint::Min(3),
            Constraint::Length(2),
        ])
        .split(f.area());

    draw_header(f, chunks[0], state);
    draw_search(f, chunks[1], state, app);
    draw_units(f, chunks[2], state, app);
    draw_footer(f, chunks[3], state);
}

fn draw_header(f: &mut Frame, area: Rect, state: &ViewState) {
    let mut spans = vec![Span::styled(" svc-pilot ", styles::title())];
    for (i, scope) in Scope::ALL.iter().enumerate() {
        let active = *scope == state.focus.scope;
        spans.push(Span::styled(
            format!(" {}:{} ", i + 1, scope.label()),
            styles::tab(active),
        ));
    }

    let (running, failed, total) = state.snapshot.counts();
    spans.push(Span::styled(
        format!("  {} running · {} failed · {} listed", running, failed, total),
        styles::text_dim(),
    ));
    if state.loading {
        spans.push(Span::styled("  ⟳ loading", styles::warn()));
    }
    f.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn draw_search(f: &mut Frame, area: Rect, state: &ViewState, app: &App) {
    let line = if app.searching {
        Line::from(vec![
            Span::styled(" / ", styles::key_hint()),
            Span::styled(format!("{}▏", app.query), styles::text()),
        ])
    } else if !state.focus.query.is_empty() {
        Line::from(vec![
            Span::styled(" filter: ", styles::text_dim()),
            Span::styled(state.focus.query.clone(), styles::text()),
            Span::styled("  (/ to edit, Esc to clear)", styles::text_dim()),
        ])
    } else {
        Line::from(Span::styled(" / to search", styles::text_dim()))
    };
    f.render_widget(Paragraph::new(line), area);
}

fn unit_item<'a>(unit: &'a UnitRecord, state: &ViewState) -> ListItem<'a> {
    let tone = UnitTone::of(unit);
    let mut head = vec![
        Span::styled(format!("{} ", styles::unit_icon(tone)), styles::unit(tone)),
        Span::styled(format!("{:<32}", unit.short_name), styles::text()),
        Span::styled(format!("{:<24}", unit.status_text()), styles::unit(tone)),
        Span::styled(unit.description.as_str(), styles::text_dim()),
    ];
    if state.busy.contains(&unit.short_name) {
        head.push(Span::styled("  …", styles::warn()));
    } else if state.reconciling.contains(&unit.short_name) {
        head.push(Span::styled("  ⟲", styles::warn()));
    }

    let mut lines = vec![Line::from(head)];
    if state.focus.is_expanded(&unit.short_name) {
        for (label, value) in [
            ("Unit", unit.full_name.as_str()),
            ("Loaded", unit.load_state.as_str()),
            ("Active", unit.active_state.as_str()),
            ("Sub", unit.sub_state.as_str()),
            ("Description", unit.description.as_str()),
        ] {
            lines.push(Line::from(vec![
                Span::styled(format!("    {:<12}", label), styles::text_dim()),
                Span::styled(value, styles::text()),
            ]));
        }
        lines.push(Line::from(Span::styled(
            "    s start · x stop · r restart · e enable · d disable · E edit · i status",
            styles::key_hint(),
        )));
    }
    ListItem::new(Text::from(lines))
}

fn draw_units(f: &mut Frame, area: Rect, state: &ViewState, app: &mut App) {
    let visible = state.visible();
    app.clamp(visible.len());

    let title = format!(
        " services [{}] {}/{} ",
        state.focus.filter().label(),
        visible.len(),
        state.snapshot.len()
    );
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(styles::border(!app.searching))
        .title(Span::styled(title, styles::title()));

    if visible.is_empty() {
        let msg = if state.loading && state.snapshot.is_empty() {
            "loading services..."
        } else {
            "no services match"
        };
        f.render_widget(
            Paragraph::new(Span::styled(msg, styles::text_dim())).block(block),
            area,
        );
        return;
    }

    let items: Vec<ListItem> = visible.iter().map(|u| unit_item(u, state)).collect();
    let list = List::new(items)
        .block(block)
        .highlight_style(styles::selection());
    f.render_stateful_widget(list, area, &mut app.list_state);
}

fn draw_footer(f: &mut Frame, area: Rect, state: &ViewState) {
    let notice = match state.last_notice() {
        Some(n) => {
            let style = match n.level {
                NoticeLevel::Info => styles::text_dim(),
                NoticeLevel::Error => styles::error(),
            };
            Line::from(vec![
                Span::styled(format!(" {} ", format_timestamp(n.at)), styles::text_dim()),
                Span::styled(n.text.clone(), style),
            ])
        }
        None => Line::from(""),
    };

    let hints = Line::from(vec![
        Span::styled(" ↑↓/jk", styles::key_hint()),
        Span::styled(" move  ", styles::text_dim()),
        Span::styled("⏎", styles::key_hint()),
        Span::styled(" expand  ", styles::text_dim()),
        Span::styled("Tab/1-4", styles::key_hint()),
        Span::styled(" scope  ", styles::text_dim()),
        Span::styled("g", styles::key_hint()),
        Span::styled(" refresh  ", styles::text_dim()),
        Span::styled("R", styles::key_hint()),
        Span::styled(" daemon-reload  ", styles::text_dim()),
        Span::styled("q", styles::key_hint()),
        Span::styled(" quit", styles::text_dim()),
    ]);

    f.render_widget(Paragraph::new(vec![notice, hints]), area);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_timestamp() {
        let t = SystemTime::UNIX_EPOCH + std::time::Duration::from_secs(3 * 3600 + 4 * 60 + 5);
        assert_eq!(format_timestamp(t), "03:04:05");
    }
}
