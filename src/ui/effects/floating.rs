use rand::Rng;
use ratatui::{
    buffer::Buffer,
    layout::{Position, Rect},
    style::{Color, Modifier, Style},
};
use std::time::{Duration, Instant};

pub const NOTE_SYMBOLS: &[char] = &['♪', '♫', '♬', '♩', '♭', '♯'];
pub const SPAWN_EVERY: Duration = Duration::from_secs(3);
pub const NOTE_LIFETIME: Duration = Duration::from_secs(12);
const MIN_RISE_SECS: f32 = 8.0;
const MAX_RISE_EXTRA_SECS: f32 = 4.0;

#[derive(Debug, Clone)]
struct FloatingNote {
    symbol: char,
    column: f32,
    rise: Duration,
    emphasized: bool,
    spawned: Instant,
}

/// Ambient spawner: one drifting note symbol every three seconds at a random
/// horizontal position, removed twelve seconds after it appears. Runs from
/// startup, independent of the request lifecycle.
#[derive(Debug, Default)]
pub struct FloatingNotes {
    notes: Vec<FloatingNote>,
    last_spawn: Option<Instant>,
}

impl FloatingNotes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, now: Instant) {
        self.notes.retain(|note| now.duration_since(note.spawned) < NOTE_LIFETIME);
        let due = self.last_spawn.map_or(true, |at| now.duration_since(at) >= SPAWN_EVERY);
        if due {
            self.notes.push(spawn_note(now));
            self.last_spawn = Some(now);
        }
    }

    pub fn render(&self, area: Rect, buf: &mut Buffer, now: Instant) {
        if area.width == 0 || area.height == 0 {
            return;
        }
        for note in &self.notes {
            let age = now.duration_since(note.spawned).as_secs_f32();
            let progress = age / note.rise.as_secs_f32();
            if progress >= 1.0 {
                continue;
            }
            let x_span = area.width.saturating_sub(1) as f32;
            let y_span = area.height.saturating_sub(1) as f32;
            let x = area.x + (note.column * x_span).round() as u16;
            let y = area.y + ((1.0 - progress) * y_span).round() as u16;
            if let Some(cell) = buf.cell_mut(Position::new(x, y)) {
                let style = if note.emphasized {
                    Style::default().fg(Color::Magenta).add_modifier(Modifier::BOLD)
                } else {
                    Style::default().fg(Color::Magenta).add_modifier(Modifier::DIM)
                };
                cell.set_char(note.symbol);
                cell.set_style(style);
            }
        }
    }
}

fn spawn_note(now: Instant) -> FloatingNote {
    let mut rng = rand::thread_rng();
    FloatingNote {
        symbol: NOTE_SYMBOLS[rng.gen_range(0..NOTE_SYMBOLS.len())],
        column: rng.gen::<f32>(),
        rise: Duration::from_secs_f32(MIN_RISE_SECS + rng.gen::<f32>() * MAX_RISE_EXTRA_SECS),
        emphasized: rng.gen_bool(0.4),
        spawned: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spawns_on_the_fixed_cadence() {
        let start = Instant::now();
        let mut notes = FloatingNotes::new();

        notes.update(start);
        assert_eq!(notes.notes.len(), 1);
        notes.update(start + Duration::from_secs(1));
        assert_eq!(notes.notes.len(), 1);
        notes.update(start + SPAWN_EVERY);
        assert_eq!(notes.notes.len(), 2);
    }

    #[test]
    fn notes_expire_after_their_lifetime() {
        let start = Instant::now();
        let mut notes = FloatingNotes::new();
        notes.update(start);
        notes.update(start + NOTE_LIFETIME);
        // The first note is gone; the update that removed it spawned another.
        assert_eq!(notes.notes.len(), 1);
    }

    #[test]
    fn render_places_a_fresh_note_near_the_bottom() {
        let start = Instant::now();
        let mut notes = FloatingNotes::new();
        notes.notes.push(FloatingNote {
            symbol: '♪',
            column: 0.0,
            rise: Duration::from_secs(8),
            emphasized: false,
            spawned: start,
        });

        let area = Rect::new(0, 0, 10, 5);
        let mut buf = Buffer::empty(area);
        notes.render(area, &mut buf, start);
        assert_eq!(buf.cell(Position::new(0, 4)).unwrap().symbol(), "♪");
    }

    #[test]
    fn render_skips_notes_past_their_rise() {
        let start = Instant::now();
        let mut notes = FloatingNotes::new();
        notes.notes.push(FloatingNote {
            symbol: '♪',
            column: 0.0,
            rise: Duration::from_secs(8),
            emphasized: false,
            spawned: start,
        });

        let area = Rect::new(0, 0, 10, 5);
        let mut buf = Buffer::empty(area);
        notes.render(area, &mut buf, start + Duration::from_secs(9));
        for y in 0..5 {
            assert_eq!(buf.cell(Position::new(0, y)).unwrap().symbol(), " ");
        }
    }
}
