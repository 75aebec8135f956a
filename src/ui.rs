use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, BorderType, Borders, Clear, Paragraph, Wrap},
    Frame,
};

use crate::app::{App, RowView};
use crate::types::{ConnectionState, Role};

const FOCUS: Color = Color::Cyan;
const TEXT_DIM: Color = Color::DarkGray;
const PRIMARY: Color = Color::LightGreen;
const SECONDARY: Color = Color::LightBlue;
const ERROR: Color = Color::LightRed;
const WARN: Color = Color::Yellow;

// ===============================
// Top-level draw
// ===============================
pub fn draw(f:&mut Frame, app:&mut App){
    let failed = app.controller().last_failure().is_some();

    let mut constraints: Vec<Constraint> = Vec::with_capacity(4);
    constraints.push(Constraint::Length(2));                    // header
    if failed { constraints.push(Constraint::Length(3)); }      // failure banner
    constraints.push(Constraint::Min(0));                       // body (fills remainder)
    constraints.push(Constraint::Length(2));                    // footer

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints(constraints)
        .split(f.area());

    let mut idx = 0usize;
    header(f, chunks[idx], app); idx += 1;
    if failed {
        failure_banner(f, chunks[idx], app); idx += 1;
    }
    body(f, chunks[idx], app); idx += 1;
    footer(f, chunks[idx], app);

    if app.toast_message().is_some() {
        draw_toast_modal(f, app);
    }
}

// ===============================
// Header
// ===============================
fn state_style(state: ConnectionState) -> Style {
    let color = match state {
        ConnectionState::Live => PRIMARY,
        ConnectionState::Connecting | ConnectionState::Reconnecting => WARN,
        ConnectionState::Failed => ERROR,
        ConnectionState::Idle => TEXT_DIM,
    };
    Style::default().fg(color).add_modifier(Modifier::BOLD)
}

fn header(f:&mut Frame, area:Rect, app:&App){
    let c = app.controller();
    let r = c.renderer();

    let mut spans = vec![
        Span::styled(" tailview ", Style::default().fg(FOCUS).add_modifier(Modifier::BOLD)),
        Span::raw("│ "),
        Span::styled(c.mode().to_string(), Style::default().add_modifier(Modifier::BOLD)),
        Span::raw(" │ "),
        Span::raw(c.source_id().to_string()),
    ];
    if app.sources().len() > 1 {
        spans.push(Span::styled(
            format!(" ({}/{})", app.source_index() + 1, app.sources().len()),
            Style::default().fg(TEXT_DIM),
        ));
    }
    spans.push(Span::raw(" │ "));
    spans.push(Span::styled(c.connection_state().to_string(), state_style(c.connection_state())));
    spans.push(Span::raw(format!(" │ {} records", r.len())));
    if let Some(meta) = c.source_meta() {
        if let Some(size) = meta.size {
            spans.push(Span::styled(format!(" │ {size} B"), Style::default().fg(TEXT_DIM)));
        }
        if let Some(modified) = meta.modified {
            let ms = (modified * 1000.0) as i64;
            spans.push(Span::styled(
                format!(" │ modified {}", crate::util_text::format_clock(Some(ms), r.host().clock_offset())),
                Style::default().fg(TEXT_DIM),
            ));
        }
    }

    let paragraph = Paragraph::new(Line::from(spans))
        .block(Block::default().borders(Borders::BOTTOM).border_type(BorderType::Plain));
    f.render_widget(paragraph, area);
}

fn failure_banner(f:&mut Frame, area:Rect, app:&App){
    let Some(err) = app.controller().last_failure() else { return; };
    let text = Line::from(vec![
        Span::styled(err.to_string(), Style::default().fg(ERROR).add_modifier(Modifier::BOLD)),
        Span::raw("  press "),
        Span::styled("r", Style::default().fg(FOCUS)),
        Span::raw(" to retry"),
    ]);
    let paragraph = Paragraph::new(text)
        .wrap(Wrap { trim: true })
        .block(Block::default()
            .borders(Borders::ALL)
            .border_type(BorderType::Double)
            .border_style(Style::default().fg(ERROR)));
    f.render_widget(paragraph, area);
}

// ===============================
// Body
// ===============================
fn body(f:&mut Frame, area:Rect, app:&mut App){
    // Keep the renderer's container in step with the terminal.
    app.set_viewport_rows(area.height);

    let host = app.controller().renderer().host();
    if host.placeholder() {
        let msg = match app.controller().connection_state() {
            ConnectionState::Failed => "No records (connection failed)",
            ConnectionState::Live => "No records yet",
            _ => "Waiting for records…",
        };
        let placeholder = Paragraph::new(msg)
            .alignment(Alignment::Center)
            .style(Style::default().fg(TEXT_DIM));
        let y = area.y + area.height / 2;
        f.render_widget(placeholder, Rect::new(area.x, y, area.width, area.height.min(1)));
        return;
    }

    let item_h = host.item_height() as i64;
    let anchor = host.anchor() as i64;
    let bottom = area.height as i64;

    for (&pos, row) in host.rows() {
        let top = pos as i64 * item_h - anchor;
        if top + item_h <= 0 || top >= bottom {
            continue; // buffered, off screen
        }
        draw_row(f, area, top, item_h, row);
    }

    // Scroll position indicator in the corner
    let extent = host.extent();
    if extent > area.height as u64 && area.width > 8 {
        let pct = ((host.anchor() + area.height as u64) * 100 / extent).min(100);
        let label = format!("{pct:>3}%");
        let w = label.len() as u16;
        f.render_widget(
            Paragraph::new(label).style(Style::default().fg(TEXT_DIM)),
            Rect::new(area.x + area.width - w, area.y, w, 1),
        );
    }
}

/// Draw one row whose top edge sits `top` rows below the body's top (may be negative).
fn draw_row(f:&mut Frame, area:Rect, top:i64, item_h:i64, row:&RowView){
    let (tag, color) = match row.role {
        Role::Primary => ("user", PRIMARY),
        Role::Secondary => ("assistant", SECONDARY),
    };
    let mut lines: Vec<Line> = Vec::with_capacity(item_h as usize);
    lines.push(Line::from(vec![
        Span::styled(format!("{} ", row.clock), Style::default().fg(TEXT_DIM)),
        Span::styled(tag, Style::default().fg(color).add_modifier(Modifier::BOLD)),
    ]));
    for l in &row.lines {
        lines.push(Line::from(Span::raw(format!("  {l}"))));
    }
    if item_h == 1 {
        // Single-row layout: header and first line side by side
        let first = row.lines.first().cloned().unwrap_or_default();
        lines = vec![Line::from(vec![
            Span::styled(format!("{} ", row.clock), Style::default().fg(TEXT_DIM)),
            Span::styled(format!("{tag:<9} "), Style::default().fg(color).add_modifier(Modifier::BOLD)),
            Span::raw(first),
        ])];
    }

    // Clip rows that straddle the top or bottom edge
    let skip = (-top).max(0) as usize;
    let y = area.y as i64 + top.max(0);
    let visible = (item_h - skip as i64).min(area.y as i64 + area.height as i64 - y);
    if visible <= 0 {
        return;
    }
    let lines: Vec<Line> = lines.into_iter().skip(skip).take(visible as usize).collect();
    let rect = Rect::new(area.x, y as u16, area.width, visible as u16);
    f.render_widget(Paragraph::new(lines), rect);
}

// ===============================
// Footer
// ===============================
fn footer(f:&mut Frame, area:Rect, app:&App){
    let key = |k: &'static str| Span::styled(k, Style::default().fg(FOCUS));
    let mut spans = vec![
        key("↑↓ PgUp PgDn Home End"),
        Span::raw(" scroll │ "),
        key("m"),
        Span::raw(" mode │ "),
        key("n/p"),
        Span::raw(" source │ "),
        key("r"),
        Span::raw(" resume │ "),
        key("q"),
        Span::raw(" quit"),
    ];
    if let Some(toast) = app.toast_message() {
        spans.push(Span::raw(" │ "));
        spans.push(Span::styled(toast, Style::default().fg(PRIMARY).add_modifier(Modifier::BOLD)));
    }
    spans.push(Span::raw(format!(" │ FPS {}", app.fps())));

    let w = Paragraph::new(Line::from(spans))
        .block(Block::default().borders(Borders::TOP).border_type(BorderType::Plain));
    f.render_widget(w, area);
}

// ===============================
// Overlays
// ===============================
fn draw_toast_modal(f:&mut Frame, app:&App){
    let Some(msg) = app.toast_message() else { return; };
    let area = f.area();
    let width = (msg.chars().count() as u16 + 4).min(area.width);
    let height = area.height.min(3);
    let rect = Rect::new(
        area.x + (area.width - width) / 2,
        area.y + area.height.saturating_sub(height + 3),
        width,
        height,
    );
    f.render_widget(Clear, rect);
    let toast = Paragraph::new(msg)
        .alignment(Alignment::Center)
        .style(Style::default().fg(PRIMARY).add_modifier(Modifier::BOLD))
        .block(Block::default()
            .borders(Borders::ALL)
            .border_type(BorderType::Rounded)
            .border_style(Style::default().fg(PRIMARY)));
    f.render_widget(toast, rect);
}
