pub mod effects;

use crate::app::{
    AppCommand, AppEvent, AppState, AudioStatus, DownloadAction, ErrorState, FormField,
    LoadingState, Phase, ResultState, NUM_NOTES_RANGE, RESULT_FOCUS_DELAY, RESULT_REVEAL,
    TEMPO_RANGE,
};
use anyhow::Result;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph, Wrap},
    Frame, Terminal,
};
use std::time::{Duration, Instant};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

const TICK: Duration = Duration::from_millis(50);
const SPINNER_FRAMES: &[char] = &['⠋', '⠙', '⠹', '⠸', '⠼', '⠴', '⠦', '⠧', '⠇', '⠏'];
const SPINNER_FRAME_EVERY: Duration = Duration::from_millis(80);
const SHAKE_DURATION: Duration = Duration::from_millis(500);
const SHAKE_FLIP: Duration = Duration::from_millis(80);
const SLIDER_WIDTH: usize = 24;

const APP_TITLE: &str = "♪ Cadenza";
const TAGLINE: &str = "AI music generation from your terminal";

pub fn run<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    app: &mut AppState,
    event_rx: &mut UnboundedReceiver<AppEvent>,
    command_tx: UnboundedSender<AppCommand>,
) -> Result<()> {
    loop {
        while let Ok(app_event) = event_rx.try_recv() {
            app.handle_event(app_event, Instant::now());
        }
        app.tick(Instant::now());

        terminal.draw(|frame| render(frame, app, Instant::now()))?;

        if event::poll(TICK)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    handle_key(app, &command_tx, key);
                }
            }
        }

        if app.should_quit {
            return Ok(());
        }
    }
}

fn handle_key(app: &mut AppState, command_tx: &UnboundedSender<AppCommand>, key: KeyEvent) {
    let now = Instant::now();
    match key.code {
        KeyCode::Esc => app.should_quit = true,
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            app.should_quit = true;
        }
        KeyCode::Tab | KeyCode::Down => app.form.focus_next(),
        KeyCode::BackTab | KeyCode::Up => app.form.focus_previous(),
        KeyCode::Left => app.form.adjust(-1, now),
        KeyCode::Right => app.form.adjust(1, now),
        KeyCode::Backspace => app.form.backspace(),
        KeyCode::Enter => {
            if let Some(request) = app.begin_generation(now) {
                let _ = command_tx.send(AppCommand::Generate { request });
            }
        }
        KeyCode::Char(c) => handle_char(app, command_tx, c, now),
        _ => {}
    }
}

fn handle_char(
    app: &mut AppState,
    command_tx: &UnboundedSender<AppCommand>,
    c: char,
    now: Instant,
) {
    if app.form.focus.is_text() {
        app.form.push_char(c);
        return;
    }
    match c {
        'q' => app.should_quit = true,
        'n' => {
            let was_playing = matches!(&app.phase, Phase::Result(state) if state.is_playing());
            app.dismiss_panels();
            if was_playing {
                let _ = command_tx.send(AppCommand::StopPlayback);
            }
        }
        'd' => {
            if let Some(url) = app.begin_midi_download(now) {
                let _ = command_tx.send(AppCommand::DownloadMidi { url });
            }
        }
        'p' => {
            if let Some(command) = app.toggle_playback() {
                let _ = command_tx.send(command);
            }
        }
        _ => {}
    }
}

fn render(frame: &mut Frame, app: &AppState, now: Instant) {
    let area = frame.area();
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(2),
            Constraint::Length(9),
            Constraint::Min(9),
            Constraint::Length(4),
            Constraint::Length(1),
        ])
        .split(area);

    render_header(frame, chunks[0]);
    render_form(frame, chunks[1], app, now);
    render_lifecycle(frame, chunks[2], app, now);
    render_activity(frame, chunks[3], app);
    render_footer(frame, chunks[4], app);

    // Overlays paint on top of the page: ambient drift everywhere, the
    // success burst over the result panel, the toast near the bottom.
    app.ambient.render(area, frame.buffer_mut(), now);
    if let Phase::Result(state) = &app.phase {
        if !state.particles.is_done(now) {
            state.particles.render(chunks[2], frame.buffer_mut(), now);
        }
    }
    if let Some(toast) = &app.toast {
        render_toast(frame, area, &toast.message);
    }
}

fn render_header(frame: &mut Frame, area: Rect) {
    let lines = vec![
        Line::from(Span::styled(
            APP_TITLE,
            Style::default().fg(Color::Magenta).add_modifier(Modifier::BOLD),
        )),
        Line::from(Span::styled(
            TAGLINE,
            Style::default().fg(Color::Gray).add_modifier(Modifier::ITALIC),
        )),
    ];
    frame.render_widget(Paragraph::new(lines).alignment(Alignment::Center), area);
}

fn render_form(frame: &mut Frame, area: Rect, app: &AppState, now: Instant) {
    let block = Block::default()
        .borders(Borders::ALL)
        .title("Composer Settings")
        .border_style(Style::default().fg(Color::DarkGray));
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let form = &app.form;
    let lines = vec![
        slider_line(
            "Notes",
            form.num_notes,
            NUM_NOTES_RANGE,
            form.focus == FormField::NumNotes,
            form.notes_pulsing(now),
            "",
        ),
        slider_line(
            "Tempo",
            form.tempo,
            TEMPO_RANGE,
            form.focus == FormField::Tempo,
            form.tempo_pulsing(now),
            " BPM",
        ),
        text_line(
            "Temperature",
            &form.temperature,
            form.focus == FormField::Temperature,
            "1.0",
        ),
        text_line("Seed", &form.seed, form.focus == FormField::Seed, "(random)"),
        Line::from(""),
        submit_line(app, now),
    ];
    frame.render_widget(Paragraph::new(lines), inner);
}

fn slider_line(
    label: &str,
    value: u32,
    range: (u32, u32),
    focused: bool,
    pulsing: bool,
    suffix: &str,
) -> Line<'static> {
    let marker = if focused { "▸ " } else { "  " };
    let label_style = if focused {
        Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
    } else {
        Style::default().fg(Color::Gray)
    };
    let value_style = if pulsing {
        Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
    } else {
        Style::default().fg(Color::White)
    };
    Line::from(vec![
        Span::styled(format!("{marker}{label:<12}"), label_style),
        Span::styled(slider_bar(value, range, SLIDER_WIDTH), Style::default().fg(Color::Cyan)),
        Span::styled(format!(" {value}{suffix}"), value_style),
    ])
}

fn slider_bar(value: u32, (min, max): (u32, u32), width: usize) -> String {
    let span = max.saturating_sub(min).max(1) as usize;
    let filled = (value.saturating_sub(min) as usize * width) / span;
    let mut bar = String::with_capacity(width * 3);
    for i in 0..width {
        bar.push(if i < filled { '█' } else { '░' });
    }
    bar
}

fn text_line(label: &str, value: &str, focused: bool, placeholder: &str) -> Line<'static> {
    let marker = if focused { "▸ " } else { "  " };
    let label_style = if focused {
        Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
    } else {
        Style::default().fg(Color::Gray)
    };
    let mut spans = vec![Span::styled(format!("{marker}{label:<12}"), label_style)];
    if value.is_empty() && !focused {
        spans.push(Span::styled(
            placeholder.to_string(),
            Style::default().fg(Color::DarkGray).add_modifier(Modifier::DIM),
        ));
    } else {
        spans.push(Span::styled(value.to_string(), Style::default().fg(Color::White)));
    }
    if focused {
        spans.push(Span::styled("▏", Style::default().fg(Color::Yellow)));
    }
    Line::from(spans)
}

fn submit_line(app: &AppState, now: Instant) -> Line<'static> {
    if let Phase::Loading(state) = &app.phase {
        let spinner = spinner_frame(state.elapsed(now));
        Line::from(Span::styled(
            format!("  {spinner} Generating…"),
            Style::default().fg(Color::DarkGray).add_modifier(Modifier::DIM),
        ))
    } else {
        Line::from(vec![
            Span::styled(
                "  Enter ",
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
            ),
            Span::styled(
                "Generate AI Music",
                Style::default().fg(Color::White).add_modifier(Modifier::BOLD),
            ),
        ])
    }
}

fn render_lifecycle(frame: &mut Frame, area: Rect, app: &AppState, now: Instant) {
    match &app.phase {
        Phase::Idle => render_idle(frame, area),
        Phase::Loading(state) => render_loading(frame, area, state, now),
        Phase::Result(state) => render_result(frame, area, state, now),
        Phase::Error(state) => render_error(frame, area, state, now),
    }
}

fn render_idle(frame: &mut Frame, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .title("Ready")
        .border_style(Style::default().fg(Color::DarkGray));
    let lines = vec![
        Line::from(""),
        Line::from(Span::styled(
            "Press Enter to compose something new.",
            Style::default().fg(Color::DarkGray),
        )),
    ];
    frame.render_widget(
        Paragraph::new(lines).alignment(Alignment::Center).block(block),
        area,
    );
}

fn render_loading(frame: &mut Frame, area: Rect, state: &LoadingState, now: Instant) {
    let block = Block::default()
        .borders(Borders::ALL)
        .title("Generating")
        .border_style(Style::default().fg(Color::Cyan));
    let spinner = spinner_frame(state.elapsed(now));
    let lines = vec![
        Line::from(""),
        Line::from(Span::styled(
            format!("{spinner}  {}", state.status_text(now)),
            Style::default().fg(Color::Cyan),
        )),
    ];
    frame.render_widget(
        Paragraph::new(lines).alignment(Alignment::Center).block(block),
        area,
    );
}

fn render_result(frame: &mut Frame, area: Rect, state: &ResultState, now: Instant) {
    let elapsed = state.elapsed(now);
    // One hidden beat before the reveal animation starts.
    if elapsed < Duration::from_millis(100) {
        return;
    }
    let rise = rise_offset(elapsed);
    let area = Rect {
        y: area.y.saturating_add(rise),
        height: area.height.saturating_sub(rise),
        ..area
    };

    let focused = elapsed >= RESULT_FOCUS_DELAY;
    let border_style = if focused {
        Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)
    } else {
        Style::default().fg(Color::DarkGray)
    };
    let block = Block::default()
        .borders(Borders::ALL)
        .title("Your Composition")
        .border_style(border_style);

    let mut lines = Vec::new();
    lines.push(player_line(state, elapsed));
    lines.push(download_line(state, elapsed, now));
    lines.push(Line::from(""));

    let details = [
        (Duration::from_millis(200), format!("Notes: {}", state.result.total_notes)),
        (
            Duration::from_millis(400),
            format!("Creativity: {}", state.result.parameters.temperature),
        ),
        (Duration::from_millis(600), format!("Tempo: {} BPM", state.result.parameters.tempo)),
    ];
    for (delay, text) in details {
        if elapsed >= delay {
            lines.push(Line::from(Span::styled(
                format!("  {text}"),
                Style::default().fg(Color::White),
            )));
        } else {
            lines.push(Line::from(""));
        }
    }

    let mut preview_spans = vec![
        Span::styled("  Preview: ", Style::default().fg(Color::Gray)),
        Span::styled(
            state.preview.visible(elapsed).to_string(),
            Style::default().fg(Color::Magenta),
        ),
    ];
    if !state.preview.is_complete(elapsed) {
        preview_spans.push(Span::styled("▌", Style::default().fg(Color::Magenta)));
    }
    lines.push(Line::from(preview_spans));

    let mut paragraph = Paragraph::new(lines).wrap(Wrap { trim: false }).block(block);
    if elapsed < RESULT_REVEAL {
        paragraph = paragraph.style(Style::default().add_modifier(Modifier::DIM));
    }
    frame.render_widget(paragraph, area);
}

fn player_line(state: &ResultState, elapsed: Duration) -> Line<'static> {
    if !state.result.has_playable_audio() {
        return Line::from(Span::styled(
            " MIDI composition ready — no audio preview; download it and open it in your synth.",
            Style::default().fg(Color::Gray),
        ));
    }

    let glow = if (elapsed.as_millis() / 1000) % 2 == 0 { Color::LightCyan } else { Color::Cyan };
    let file = file_name_of(state.result.audio_url.as_deref().unwrap_or_default());
    let (icon, action) = match &state.audio {
        AudioStatus::Local { playing: true, .. } => ("▶".to_string(), "p stop"),
        AudioStatus::Fetching => (spinner_frame(elapsed).to_string(), "fetching…"),
        _ => ("♫".to_string(), "p play"),
    };
    Line::from(vec![
        Span::styled(format!(" {icon} Audio preview: "), Style::default().fg(glow)),
        Span::styled(file, Style::default().fg(Color::White)),
        Span::styled(format!("  [{action}]"), Style::default().fg(Color::DarkGray)),
    ])
}

fn download_line(state: &ResultState, elapsed: Duration, now: Instant) -> Line<'static> {
    if let DownloadAction::Busy { since, .. } = &state.download {
        return Line::from(Span::styled(
            format!(" {} Downloading…", spinner_frame(now.duration_since(*since))),
            Style::default().fg(Color::DarkGray),
        ));
    }

    let glow =
        if ((elapsed.as_millis() + 500) / 1000) % 2 == 0 { Color::LightGreen } else { Color::Green };
    let mut spans = vec![Span::styled(
        format!(" d Download MIDI: {}", file_name_of(&state.result.midi_url)),
        Style::default().fg(glow),
    )];
    if let Some(audio_url) = state.result.audio_url.as_deref() {
        spans.push(Span::styled(
            format!("  ·  audio: {}", file_name_of(audio_url)),
            Style::default().fg(Color::Green),
        ));
    }
    Line::from(spans)
}

fn render_error(frame: &mut Frame, area: Rect, state: &ErrorState, now: Instant) {
    let elapsed = state.elapsed(now);
    let area = shaken(area, shake_offset(elapsed));
    let block = Block::default()
        .borders(Borders::ALL)
        .title("Error")
        .border_style(Style::default().fg(Color::Red));
    let lines = vec![
        Line::from(""),
        Line::from(Span::styled(
            state.message.clone(),
            Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
        Line::from(Span::styled(
            "n dismiss · Enter try again",
            Style::default().fg(Color::DarkGray),
        )),
    ];
    frame.render_widget(
        Paragraph::new(lines).alignment(Alignment::Center).wrap(Wrap { trim: true }).block(block),
        area,
    );
}

fn render_activity(frame: &mut Frame, area: Rect, app: &AppState) {
    let block = Block::default()
        .borders(Borders::TOP)
        .title("Activity")
        .border_style(Style::default().fg(Color::DarkGray));
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let visible = inner.height as usize;
    let lines: Vec<Line> = app
        .status_lines
        .iter()
        .rev()
        .take(visible)
        .rev()
        .map(|entry| {
            Line::from(vec![
                Span::styled(
                    format!("{} ", entry.at.format("%H:%M:%S")),
                    Style::default().fg(Color::DarkGray),
                ),
                Span::styled(entry.text.clone(), Style::default().fg(Color::Gray)),
            ])
        })
        .collect();
    frame.render_widget(Paragraph::new(lines), inner);
}

fn render_footer(frame: &mut Frame, area: Rect, app: &AppState) {
    let mut hints = String::from("Tab/↑↓ field · ←/→ adjust · Enter generate");
    match app.phase {
        Phase::Result(_) => hints.push_str(" · d download · p play · n new"),
        Phase::Error(_) => hints.push_str(" · n dismiss"),
        _ => {}
    }
    hints.push_str(" · Esc quit");
    frame.render_widget(
        Paragraph::new(Span::styled(
            hints,
            Style::default().fg(Color::DarkGray).add_modifier(Modifier::DIM),
        ))
        .alignment(Alignment::Center),
        area,
    );
}

fn render_toast(frame: &mut Frame, area: Rect, message: &str) {
    let height = 4;
    if area.width < 24 || area.height <= height + 2 {
        return;
    }
    let width = (message.chars().count() as u16 + 6).clamp(20, area.width.saturating_sub(4));
    let toast_area = Rect {
        x: area.x + area.width.saturating_sub(width) / 2,
        y: area.bottom().saturating_sub(height + 2),
        width,
        height,
    };
    frame.render_widget(Clear, toast_area);
    let block = Block::default()
        .borders(Borders::ALL)
        .title("Success")
        .border_style(Style::default().fg(Color::Green));
    frame.render_widget(
        Paragraph::new(Span::styled(message.to_string(), Style::default().fg(Color::Green)))
            .wrap(Wrap { trim: true })
            .block(block),
        toast_area,
    );
}

fn file_name_of(url: &str) -> String {
    url.rsplit('/').next().unwrap_or(url).to_string()
}

fn spinner_frame(elapsed: Duration) -> char {
    let index =
        (elapsed.as_millis() / SPINNER_FRAME_EVERY.as_millis()) as usize % SPINNER_FRAMES.len();
    SPINNER_FRAMES[index]
}

fn rise_offset(elapsed: Duration) -> u16 {
    if elapsed >= RESULT_REVEAL {
        return 0;
    }
    let t = elapsed.as_secs_f32() / RESULT_REVEAL.as_secs_f32();
    ((1.0 - t) * 3.0).round() as u16
}

fn shake_offset(elapsed: Duration) -> i32 {
    if elapsed >= SHAKE_DURATION {
        return 0;
    }
    if (elapsed.as_millis() / SHAKE_FLIP.as_millis()) % 2 == 0 {
        -1
    } else {
        1
    }
}

// Keeps one cell of slack on both sides so the jitter never leaves the frame.
fn shaken(area: Rect, dx: i32) -> Rect {
    let base = area.x.saturating_add(1);
    let x = if dx < 0 { base.saturating_sub(dx.unsigned_abs() as u16) } else { base + dx as u16 };
    Rect { x, width: area.width.saturating_sub(2), ..area }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slider_bar_fills_proportionally() {
        assert_eq!(slider_bar(20, (20, 200), 8), "░░░░░░░░");
        assert_eq!(slider_bar(200, (20, 200), 8), "████████");
        let half = slider_bar(110, (20, 200), 8);
        assert_eq!(half.chars().filter(|c| *c == '█').count(), 4);
    }

    #[test]
    fn file_name_strips_the_url_path() {
        assert_eq!(file_name_of("/static/generated_music_ab12cd34.mid"), "generated_music_ab12cd34.mid");
        assert_eq!(file_name_of("plain.wav"), "plain.wav");
    }

    #[test]
    fn shake_settles_after_half_a_second() {
        assert_ne!(shake_offset(Duration::from_millis(0)), 0);
        assert_ne!(shake_offset(Duration::from_millis(90)), 0);
        assert_eq!(shake_offset(SHAKE_DURATION), 0);
    }

    #[test]
    fn result_panel_rises_into_place() {
        assert_eq!(rise_offset(Duration::ZERO), 3);
        assert_eq!(rise_offset(RESULT_REVEAL), 0);
        assert!(rise_offset(Duration::from_millis(400)) <= 2);
    }

    #[test]
    fn shaken_area_stays_inside_the_frame() {
        let area = Rect::new(0, 0, 40, 10);
        assert_eq!(shaken(area, -1).x, 0);
        assert_eq!(shaken(area, 0).x, 1);
        assert_eq!(shaken(area, 1).x, 2);
        assert!(shaken(area, 1).right() <= area.right());
    }
}
