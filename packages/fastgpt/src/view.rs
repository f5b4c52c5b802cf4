use fastgpt_stream::splitter::{plain_lines, split_language};
use fastgpt_stream::{ConnectionState, Conversation, SegmentKind};
use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Padding, Paragraph, Wrap},
};

use crate::app::ChatApp;

/// Prompt box grows with its content up to this many text rows.
const MAX_PROMPT_ROWS: u16 = 5;

const HELP: &str = " enter send · shift+enter newline · ^T test prompt · ^O test input · ^N/^P model · ^L clear · esc quit ";

pub fn draw(frame: &mut Frame, app: &ChatApp) {
    let prompt_rows = (app.input().matches('\n').count() as u16 + 1).min(MAX_PROMPT_ROWS);
    let [header, panes, prompt, help] = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Min(3),
            Constraint::Length(prompt_rows + 2),
            Constraint::Length(1),
        ])
        .areas(frame.area());

    frame.render_widget(Paragraph::new(header_line(app)), header);
    draw_panes(frame, app.conversation(), panes);
    draw_prompt(frame, app, prompt);
    frame.render_widget(
        Paragraph::new(Line::styled(HELP, Style::default().add_modifier(Modifier::DIM))),
        help,
    );
}

fn state_style(state: ConnectionState) -> Style {
    let color = match state {
        ConnectionState::Open => Color::Green,
        ConnectionState::Connecting => Color::Yellow,
        ConnectionState::Closed => Color::Red,
        ConnectionState::Idle => Color::DarkGray,
    };
    Style::default().fg(color).add_modifier(Modifier::BOLD)
}

fn header_line(app: &ChatApp) -> Line<'_> {
    let dim = Style::default().add_modifier(Modifier::DIM);
    let model = match app.selected_model() {
        Some(m) => Span::styled(m, Style::default().add_modifier(Modifier::BOLD)),
        None => Span::styled("No models available", Style::default().fg(Color::Red)),
    };
    let test_input = if app.test_input() { "on" } else { "off" };

    let mut spans = vec![
        Span::styled(" fastgpt ", Style::default().add_modifier(Modifier::REVERSED)),
        Span::raw(" "),
        Span::styled(app.state().to_string(), state_style(app.state())),
        Span::styled(format!(" {} ", app.server()), dim),
        Span::raw("· model: "),
        model,
        Span::styled(format!(" ({} listed)", app.models().len()), dim),
        Span::raw(format!(" · test input: {test_input}")),
    ];
    if app.streaming_code() {
        spans.push(Span::styled(
            " · streaming code",
            Style::default().fg(Color::Yellow).add_modifier(Modifier::ITALIC),
        ));
    }
    if let Some(status) = app.status() {
        spans.push(Span::styled(format!("  {status}"), Style::default().fg(Color::Yellow)));
    }
    Line::from(spans)
}

fn draw_panes(frame: &mut Frame, conversation: &Conversation, area: Rect) {
    let [left, right] = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .areas(area);

    let prose = prose_lines(conversation);
    let block = Block::default()
        .title(" Response ")
        .borders(Borders::ALL)
        .padding(Padding::horizontal(1));
    let scroll = tail_offset(&prose, block.inner(left));
    frame.render_widget(
        Paragraph::new(prose)
            .block(block)
            .wrap(Wrap { trim: false })
            .scroll((scroll, 0)),
        left,
    );

    let code: Vec<Line> = conversation.code().split('\n').map(Line::raw).collect();
    let block = Block::default()
        .title(" Code ")
        .borders(Borders::ALL)
        .padding(Padding::horizontal(1));
    let scroll = tail_offset(&code, block.inner(right));
    frame.render_widget(
        Paragraph::new(code)
            .block(block)
            .style(Style::default().fg(Color::Cyan))
            .wrap(Wrap { trim: false })
            .scroll((scroll, 0)),
        right,
    );
}

fn draw_prompt(frame: &mut Frame, app: &ChatApp, area: Rect) {
    let block = Block::default()
        .title(" Prompt ")
        .borders(Borders::ALL)
        .padding(Padding::horizontal(1));
    let inner = block.inner(area);
    let (row, col) = app.cursor_position();
    let row_scroll = (row as u16).saturating_sub(inner.height.saturating_sub(1));

    frame.render_widget(
        Paragraph::new(app.input())
            .block(block)
            .scroll((row_scroll, 0)),
        area,
    );

    let x = inner.x + (col as u16).min(inner.width.saturating_sub(1));
    let y = inner.y + row as u16 - row_scroll;
    frame.set_cursor_position((x, y));
}

/// Scroll offset that keeps the last line visible. Wrapped rows are
/// estimated from display width.
fn tail_offset(lines: &[Line], inner: Rect) -> u16 {
    let width = inner.width.max(1) as usize;
    let rows: usize = lines
        .iter()
        .map(|l| l.width().div_ceil(width).max(1))
        .sum();
    rows.saturating_sub(inner.height as usize)
        .try_into()
        .unwrap_or(u16::MAX)
}

/// Render the prose accumulator: plain text line by line, fenced code as a
/// framed block. An unterminated block is marked as still streaming.
pub fn prose_lines(conversation: &Conversation) -> Vec<Line<'static>> {
    let segments = conversation.segments();
    let last = segments.len().saturating_sub(1);
    let code_style = Style::default().fg(Color::Cyan);
    let frame_style = Style::default().fg(Color::DarkGray);
    let mut lines = Vec::new();

    for (i, seg) in segments.iter().enumerate() {
        match seg.kind {
            SegmentKind::PlainText => {
                // Newlines hugging a fence belong to the block boundary.
                let mut text = seg.content;
                if i > 0 {
                    text = text.strip_prefix('\n').unwrap_or(text);
                }
                if i < last {
                    text = text.strip_suffix('\n').unwrap_or(text);
                }
                if text.is_empty() {
                    continue;
                }
                lines.extend(plain_lines(text).map(|l| Line::raw(l.to_string())));
            }
            SegmentKind::CodeBlock => {
                let (lang, body) = split_language(seg.content);
                let mut header = vec![Span::styled(
                    format!("┌─ {}", lang.unwrap_or("code")),
                    frame_style,
                )];
                if seg.is_open {
                    header.push(Span::styled(
                        " streaming…",
                        Style::default()
                            .fg(Color::Yellow)
                            .add_modifier(Modifier::ITALIC),
                    ));
                }
                lines.push(Line::from(header));

                let body = body.strip_prefix('\n').unwrap_or(body);
                let body = body.strip_suffix('\n').unwrap_or(body);
                if !body.is_empty() {
                    for l in plain_lines(body) {
                        lines.push(Line::from(vec![
                            Span::styled("│ ", frame_style),
                            Span::styled(l.to_string(), code_style),
                        ]));
                    }
                }
                if !seg.is_open {
                    lines.push(Line::styled("└─", frame_style));
                }
            }
        }
    }
    lines
}
