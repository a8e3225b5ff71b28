use crate::app::App;
use crate::constants::{
    CATEGORY_WIDTH, INPUT_FIELD_HEIGHT, MANAGEMENT_BAR_HEIGHT, QUIT_POPUP_HEIGHT, QUIT_POPUP_WIDTH,
    STATUS_BAR_HEIGHT, TIMESTAMP_WIDTH,
};
use crate::core::{get_time_age, InputMode, LogCategory, LogRecord, TimeAge};
use crate::highlight::{apply_highlights, category_style, highlight_line, sanitize_for_display};
use crate::input::TextInput;
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph},
    Frame,
};

/// Rows taken by everything except the log pane's content.
pub const CHROME_HEIGHT: u16 =
    MANAGEMENT_BAR_HEIGHT + INPUT_FIELD_HEIGHT + 1 + 2 + INPUT_FIELD_HEIGHT + STATUS_BAR_HEIGHT;

pub fn draw(frame: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(MANAGEMENT_BAR_HEIGHT),
            Constraint::Length(INPUT_FIELD_HEIGHT),
            Constraint::Length(1),
            Constraint::Min(1),
            Constraint::Length(INPUT_FIELD_HEIGHT),
            Constraint::Length(STATUS_BAR_HEIGHT),
        ])
        .split(frame.area());

    draw_management_bar(frame, app, chunks[0]);
    draw_text_input(
        frame,
        &app.input_fields.search,
        chunks[1],
        " Search (/) ",
        app.input_mode == InputMode::SearchEdit,
    );
    draw_category_bar(frame, app, chunks[2]);
    draw_log_view(frame, app, chunks[3]);
    draw_text_input(
        frame,
        &app.input_fields.send,
        chunks[4],
        " Send (i) ",
        app.input_mode == InputMode::SendEdit,
    );
    draw_status_bar(frame, app, chunks[5]);

    if app.show_quit_confirm {
        draw_quit_confirm(frame);
    }
}

fn draw_management_bar(frame: &mut Frame, app: &App, area: Rect) {
    let state_color = if app.connection.is_reading() {
        Color::Green
    } else if app.connection.has_handle() {
        Color::Yellow
    } else {
        Color::Red
    };
    let settings = app.settings.get();

    let mut spans = vec![
        Span::styled(
            format!(" ● {} ", app.connection_label()),
            Style::default().fg(state_color).add_modifier(Modifier::BOLD),
        ),
        Span::styled(app.connection.port_label(), Style::default().fg(Color::White)),
        Span::styled(
            format!("  {} baud", settings.baud_rate),
            Style::default().fg(Color::Cyan),
        ),
    ];
    if settings.classify {
        spans.push(Span::styled("  [classify]", Style::default().fg(Color::DarkGray)));
    }

    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn draw_text_input(frame: &mut Frame, input: &TextInput, area: Rect, label: &str, is_active: bool) {
    let style = if is_active {
        Style::default().fg(Color::Yellow)
    } else {
        Style::default()
    };

    let widget = Paragraph::new(input.text.as_str())
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(label)
                .border_style(style),
        )
        .style(style);
    frame.render_widget(widget, area);

    if is_active {
        frame.set_cursor_position((area.x + input.cursor as u16 + 1, area.y + 1));
    }
}

fn draw_category_bar(frame: &mut Frame, app: &App, area: Rect) {
    let mut spans = vec![Span::raw(" ")];
    for (category, count, selected) in app.category_buttons() {
        let mut style = category_style(category);
        if selected {
            style = style.add_modifier(Modifier::REVERSED | Modifier::BOLD);
        }
        spans.push(Span::styled(
            format!("[{} {} {}]", category.index() + 1, category.label(), count),
            style,
        ));
        spans.push(Span::raw(" "));
    }
    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn draw_log_view(frame: &mut Frame, app: &App, area: Rect) {
    let inner_height = area.height.saturating_sub(2) as usize;
    let affordances = app.window.affordances();

    let title = format!(
        " Log [{}/{}] p{}/{} {}{}{}{}",
        app.filtered.len(),
        app.store.len(),
        app.window.current_page(),
        app.window.total_pages().max(app.window.config().min_window_pages),
        if app.filtered.is_caught_up(&app.store) { "" } else { "[scanning] " },
        if app.window.auto_scroll() { "[FOLLOW] " } else { "" },
        if affordances.show_jump_to_top { "▲ g " } else { "" },
        if affordances.show_jump_to_bottom { "▼ G " } else { "" },
    );
    let block = Block::default()
        .borders(Borders::ALL)
        .title(title)
        .border_style(Style::default().fg(Color::Cyan));

    let records: Vec<&LogRecord> = app.window_records().collect();
    let chunk = app.chunk_preview();

    if records.is_empty() && chunk.is_none() {
        let message = if app.store.is_empty() && !app.connection.has_handle() {
            format!("Press 'o' to connect to {}", app.connection.port_label())
        } else if app.filtered.filter().is_active() {
            "No records match the current filter".to_string()
        } else {
            String::new()
        };
        let para = Paragraph::new(Line::from(Span::styled(
            message,
            Style::default().fg(Color::DarkGray),
        )))
        .block(block);
        frame.render_widget(para, area);
        return;
    }

    let total_rows = records.len() + usize::from(chunk.is_some());
    let start = app.scroll_offset().min(total_rows);
    let end = (start + inner_height).min(total_rows);

    let lines: Vec<Line> = (start..end)
        .map(|row| match records.get(row) {
            Some(record) => record_line(app, record),
            None => chunk_line(chunk.unwrap_or_default()),
        })
        .collect();

    frame.render_widget(Paragraph::new(lines).block(block), area);
}

fn timestamp_style(record: &LogRecord) -> Style {
    match get_time_age(record.created_at) {
        TimeAge::VeryRecent => Style::default()
            .fg(Color::LightGreen)
            .add_modifier(Modifier::BOLD),
        TimeAge::Recent => Style::default().fg(Color::Green),
        TimeAge::Older => Style::default().fg(Color::Rgb(136, 136, 136)),
    }
}

fn record_line<'a>(app: &App, record: &'a LogRecord) -> Line<'a> {
    let mut spans = vec![
        Span::styled(
            format!(
                "{:<width$}",
                record.created_at.format("%H:%M:%S%.3f").to_string(),
                width = TIMESTAMP_WIDTH
            ),
            timestamp_style(record),
        ),
        Span::styled(
            format!("{:<width$}", record.category.tag(), width = CATEGORY_WIDTH),
            category_style(record.category).add_modifier(Modifier::BOLD),
        ),
    ];

    let display = sanitize_for_display(&record.content);
    let hits = app.filtered.filter().search_hits(&display);
    let highlights = highlight_line(&display, &hits, record.category == LogCategory::Plain);
    for (text, style) in apply_highlights(&display, &highlights, category_style(record.category)) {
        spans.push(Span::styled(text, style));
    }
    Line::from(spans)
}

fn chunk_line(chunk: &str) -> Line<'static> {
    Line::from(vec![
        Span::styled(
            format!("{:<width$}", "…", width = TIMESTAMP_WIDTH),
            Style::default().fg(Color::DarkGray),
        ),
        Span::styled(
            format!("{:<width$}", LogCategory::Plain.tag(), width = CATEGORY_WIDTH),
            Style::default().fg(Color::DarkGray),
        ),
        Span::styled(
            sanitize_for_display(chunk).into_owned(),
            category_style(LogCategory::Plain).add_modifier(Modifier::DIM),
        ),
    ])
}

fn draw_status_bar(frame: &mut Frame, app: &App, area: Rect) {
    let status = if let Some(msg) = &app.status_message {
        msg.clone()
    } else {
        let last_update = app
            .store
            .last_update_time()
            .map(|time| format!(" | Last: {}", time.format("%H:%M:%S")))
            .unwrap_or_default();
        format!(
            "q:Quit o:Connect b/B:Baud C:Classify /:Search 1-6:Category c:Clear i:Send g/G:Top/Bottom{}",
            last_update
        )
    };

    let paragraph =
        Paragraph::new(status).style(Style::default().fg(Color::White).bg(Color::Blue));
    frame.render_widget(paragraph, area);
}

fn draw_quit_confirm(frame: &mut Frame) {
    let area = frame.area();
    let popup_width = QUIT_POPUP_WIDTH.min(area.width.saturating_sub(4));
    let popup_height = QUIT_POPUP_HEIGHT.min(area.height.saturating_sub(4));

    let popup_area = Rect {
        x: area.width.saturating_sub(popup_width) / 2,
        y: area.height.saturating_sub(popup_height) / 2,
        width: popup_width,
        height: popup_height,
    };

    let text = vec![
        Line::from(""),
        Line::from(Span::styled(
            "  Still reading. Press 'y' to quit",
            Style::default().fg(Color::White),
        )),
    ];

    let popup = Paragraph::new(text)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(" Quit? ")
                .border_style(Style::default().fg(Color::Red)),
        )
        .style(Style::default().bg(Color::Black));

    frame.render_widget(Clear, popup_area);
    frame.render_widget(popup, popup_area);
}
