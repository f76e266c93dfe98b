use rand::Rng;
use ratatui::{
    buffer::Buffer,
    layout::{Position, Rect},
    style::{Color, Modifier, Style},
};
use std::f32::consts::TAU;
use std::time::{Duration, Instant};

pub const PARTICLE_COUNT: usize = 15;
pub const PARTICLE_LIFETIME: Duration = Duration::from_millis(1500);
pub const SPAWN_STAGGER: Duration = Duration::from_millis(50);

const PARTICLE_SYMBOLS: &[char] = &['♪', '♫', '♬', '♩'];
const PARTICLE_COLORS: &[Color] = &[
    Color::Rgb(0x66, 0x7e, 0xea),
    Color::Rgb(0x76, 0x4b, 0xa2),
    Color::Rgb(0x48, 0xbb, 0x78),
    Color::Rgb(0xed, 0x89, 0x36),
];

// Cells travelled over a full lifetime.
const MIN_REACH: f32 = 4.0;
const MAX_REACH: f32 = 16.0;

#[derive(Debug, Clone)]
struct Particle {
    symbol: char,
    color: Color,
    angle: f32,
    reach: f32,
    emphasized: bool,
    delay: Duration,
}

/// One-shot celebration burst: a fixed batch of note glyphs thrown outward
/// from the panel center, each with its own direction, speed, color, and
/// staggered start, gone after a fixed lifetime.
#[derive(Debug)]
pub struct ParticleBurst {
    started: Instant,
    particles: Vec<Particle>,
}

impl ParticleBurst {
    pub fn spawn(now: Instant) -> Self {
        let mut rng = rand::thread_rng();
        let particles = (0..PARTICLE_COUNT)
            .map(|index| Particle {
                symbol: PARTICLE_SYMBOLS[rng.gen_range(0..PARTICLE_SYMBOLS.len())],
                color: PARTICLE_COLORS[rng.gen_range(0..PARTICLE_COLORS.len())],
                angle: rng.gen::<f32>() * TAU,
                reach: MIN_REACH + rng.gen::<f32>() * (MAX_REACH - MIN_REACH),
                emphasized: rng.gen_bool(0.5),
                delay: SPAWN_STAGGER * index as u32,
            })
            .collect();
        Self { started: now, particles }
    }

    pub fn is_done(&self, now: Instant) -> bool {
        let last_delay = SPAWN_STAGGER * PARTICLE_COUNT.saturating_sub(1) as u32;
        now.duration_since(self.started) >= last_delay + PARTICLE_LIFETIME
    }

    pub fn render(&self, area: Rect, buf: &mut Buffer, now: Instant) {
        if area.width == 0 || area.height == 0 {
            return;
        }
        let center_x = area.x as f32 + area.width as f32 / 2.0;
        let center_y = area.y as f32 + area.height as f32 / 2.0;
        let elapsed = now.duration_since(self.started);

        for particle in &self.particles {
            let Some(age) = elapsed.checked_sub(particle.delay) else {
                continue;
            };
            let t = age.as_secs_f32() / PARTICLE_LIFETIME.as_secs_f32();
            if t >= 1.0 {
                continue;
            }
            let eased = 1.0 - (1.0 - t) * (1.0 - t);
            // Terminal cells are taller than wide; stretch x to keep the
            // burst round.
            let x = center_x + particle.angle.cos() * particle.reach * eased * 2.0;
            let y = center_y + particle.angle.sin() * particle.reach * eased;
            if x < area.x as f32 || y < area.y as f32 {
                continue;
            }
            let (x, y) = (x.round() as u16, y.round() as u16);
            if x >= area.x + area.width || y >= area.y + area.height {
                continue;
            }
            if let Some(cell) = buf.cell_mut(Position::new(x, y)) {
                let mut style = Style::default().fg(particle.color);
                if particle.emphasized {
                    style = style.add_modifier(Modifier::BOLD);
                }
                cell.set_char(particle.symbol);
                cell.set_style(style);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn burst_spawns_the_fixed_count() {
        let burst = ParticleBurst::spawn(Instant::now());
        assert_eq!(burst.particles.len(), PARTICLE_COUNT);
    }

    #[test]
    fn burst_finishes_after_the_last_particle_expires() {
        let start = Instant::now();
        let burst = ParticleBurst::spawn(start);
        let last_delay = SPAWN_STAGGER * (PARTICLE_COUNT - 1) as u32;

        assert!(!burst.is_done(start + PARTICLE_LIFETIME));
        assert!(burst.is_done(start + last_delay + PARTICLE_LIFETIME));
    }

    fn visible_cells(buf: &Buffer, area: Rect) -> usize {
        let mut count = 0;
        for y in area.top()..area.bottom() {
            for x in area.left()..area.right() {
                if buf.cell(Position::new(x, y)).unwrap().symbol() != " " {
                    count += 1;
                }
            }
        }
        count
    }

    #[test]
    fn staggered_particles_wait_for_their_delay() {
        let start = Instant::now();
        let mut burst = ParticleBurst::spawn(start);
        for particle in &mut burst.particles {
            particle.angle = 0.0;
            particle.reach = MAX_REACH;
        }

        let area = Rect::new(0, 0, 60, 11);
        let mut buf = Buffer::empty(area);
        burst.render(area, &mut buf, start + Duration::from_millis(1));
        // Only the first particle has spawned this early.
        assert_eq!(visible_cells(&buf, area), 1);

        let mut buf = Buffer::empty(area);
        burst.render(area, &mut buf, start + Duration::from_millis(300));
        assert!(visible_cells(&buf, area) > 1);
    }
}
