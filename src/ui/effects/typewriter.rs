use std::time::Duration;

/// Character-by-character reveal: the prefix of `text` visible after
/// `elapsed`, one character every `char_every`.
pub fn reveal(text: &str, elapsed: Duration, char_every: Duration) -> &str {
    if char_every.is_zero() {
        return text;
    }
    let visible = (elapsed.as_millis() / char_every.as_millis()) as usize;
    match text.char_indices().nth(visible) {
        Some((byte_index, _)) => &text[..byte_index],
        None => text,
    }
}

/// A reveal with its own text and cadence, anchored to whatever clock the
/// owner keeps.
#[derive(Debug, Clone)]
pub struct Typewriter {
    text: String,
    char_every: Duration,
}

impl Typewriter {
    pub fn new(text: String, char_every: Duration) -> Self {
        Self { text, char_every }
    }

    pub fn visible(&self, elapsed: Duration) -> &str {
        reveal(&self.text, elapsed, self.char_every)
    }

    pub fn is_complete(&self, elapsed: Duration) -> bool {
        self.visible(elapsed).len() == self.text.len()
    }
}
