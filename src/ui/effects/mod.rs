mod floating;
mod particles;
mod typewriter;

pub use floating::FloatingNotes;
pub use particles::ParticleBurst;
pub use typewriter::{reveal, Typewriter};
