use crate::{
    config::AppConfig,
    types::{GenerationRequest, GenerationResult},
    ui::effects::{reveal, FloatingNotes, ParticleBurst, Typewriter},
};
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::time::{Duration, Instant};

const MAX_STATUS_LINES: usize = 8;

pub const LOADING_MESSAGES: &[&str] = &[
    "Analyzing musical patterns…",
    "Creating beautiful note sequences…",
    "Composing your unique melody…",
    "Preparing audio output…",
];

pub const LOADING_CYCLE: Duration = Duration::from_millis(2000);
pub const LOADING_TYPE_SPEED: Duration = Duration::from_millis(50);
pub const PREVIEW_TYPE_SPEED: Duration = Duration::from_millis(30);
pub const ERROR_AUTO_HIDE: Duration = Duration::from_secs(8);
pub const TOAST_AUTO_HIDE: Duration = Duration::from_secs(6);
pub const RESULT_FOCUS_DELAY: Duration = Duration::from_millis(500);
pub const RESULT_REVEAL: Duration = Duration::from_millis(800);
pub const DOWNLOAD_RESTORE_DELAY: Duration = Duration::from_secs(1);
pub const SLIDER_PULSE: Duration = Duration::from_millis(300);

pub const NUM_NOTES_RANGE: (u32, u32) = (20, 200);
pub const TEMPO_RANGE: (u32, u32) = (60, 200);
const NUM_NOTES_STEP: u32 = 5;
const TEMPO_STEP: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormField {
    NumNotes,
    Tempo,
    Temperature,
    Seed,
}

impl FormField {
    pub fn next(self) -> Self {
        match self {
            Self::NumNotes => Self::Tempo,
            Self::Tempo => Self::Temperature,
            Self::Temperature => Self::Seed,
            Self::Seed => Self::NumNotes,
        }
    }

    pub fn previous(self) -> Self {
        match self {
            Self::NumNotes => Self::Seed,
            Self::Tempo => Self::NumNotes,
            Self::Temperature => Self::Tempo,
            Self::Seed => Self::Temperature,
        }
    }

    pub fn is_text(self) -> bool {
        matches!(self, Self::Temperature | Self::Seed)
    }
}

/// The four generation parameters plus focus and echo-pulse bookkeeping.
#[derive(Debug)]
pub struct GenerationForm {
    pub num_notes: u32,
    pub tempo: u32,
    pub temperature: String,
    pub seed: String,
    pub focus: FormField,
    notes_pulse: Option<Instant>,
    tempo_pulse: Option<Instant>,
}

impl GenerationForm {
    fn new(config: &AppConfig) -> Self {
        Self {
            num_notes: config.default_num_notes(),
            tempo: config.default_tempo(),
            temperature: format!("{:.1}", config.default_temperature()),
            seed: String::new(),
            focus: FormField::NumNotes,
            notes_pulse: None,
            tempo_pulse: None,
        }
    }

    /// Snapshot of the form as a request body. Temperature is coerced with
    /// the runtime's parser and never bounds-checked; an empty seed is
    /// absent, not empty.
    pub fn to_request(&self) -> GenerationRequest {
        let temperature = self.temperature.trim().parse::<f64>().unwrap_or(f64::NAN);
        let seed = if self.seed.is_empty() { None } else { Some(self.seed.clone()) };
        GenerationRequest { num_notes: self.num_notes, temperature, tempo: self.tempo, seed }
    }

    pub fn focus_next(&mut self) {
        self.focus = self.focus.next();
    }

    pub fn focus_previous(&mut self) {
        self.focus = self.focus.previous();
    }

    /// Moves the focused slider and starts its value-label pulse.
    pub fn adjust(&mut self, direction: i32, now: Instant) {
        match self.focus {
            FormField::NumNotes => {
                self.num_notes = step(self.num_notes, direction, NUM_NOTES_STEP, NUM_NOTES_RANGE);
                self.notes_pulse = Some(now);
            }
            FormField::Tempo => {
                self.tempo = step(self.tempo, direction, TEMPO_STEP, TEMPO_RANGE);
                self.tempo_pulse = Some(now);
            }
            _ => {}
        }
    }

    pub fn push_char(&mut self, c: char) {
        match self.focus {
            FormField::Temperature => self.temperature.push(c),
            FormField::Seed => self.seed.push(c),
            _ => {}
        }
    }

    pub fn backspace(&mut self) {
        match self.focus {
            FormField::Temperature => {
                self.temperature.pop();
            }
            FormField::Seed => {
                self.seed.pop();
            }
            _ => {}
        }
    }

    pub fn notes_pulsing(&self, now: Instant) -> bool {
        self.notes_pulse.is_some_and(|at| now.duration_since(at) < SLIDER_PULSE)
    }

    pub fn tempo_pulsing(&self, now: Instant) -> bool {
        self.tempo_pulse.is_some_and(|at| now.duration_since(at) < SLIDER_PULSE)
    }
}

fn step(value: u32, direction: i32, step: u32, (min, max): (u32, u32)) -> u32 {
    if direction >= 0 {
        value.saturating_add(step).min(max)
    } else {
        value.saturating_sub(step).max(min)
    }
}

/// Lifecycle of the current request: idle → loading → (result | error) → idle.
#[derive(Debug)]
pub enum Phase {
    Idle,
    Loading(LoadingState),
    Result(ResultState),
    Error(ErrorState),
}

#[derive(Debug)]
pub struct LoadingState {
    started: Instant,
}

impl LoadingState {
    pub fn new(now: Instant) -> Self {
        Self { started: now }
    }

    pub fn elapsed(&self, now: Instant) -> Duration {
        now.duration_since(self.started)
    }

    /// Currently-revealed slice of the cycling status message.
    pub fn status_text(&self, now: Instant) -> &'static str {
        status_text_at(self.elapsed(now))
    }
}

/// Status message visible after `elapsed` of loading: one of four fixed
/// strings, rotated every cycle, each revealed character by character.
pub fn status_text_at(elapsed: Duration) -> &'static str {
    let cycle_ms = LOADING_CYCLE.as_millis();
    let index = ((elapsed.as_millis() / cycle_ms) as usize) % LOADING_MESSAGES.len();
    let within = Duration::from_millis((elapsed.as_millis() % cycle_ms) as u64);
    reveal(LOADING_MESSAGES[index], within, LOADING_TYPE_SPEED)
}

/// Whether the audio preview can be played, and where it currently lives.
#[derive(Debug, Clone, PartialEq)]
pub enum AudioStatus {
    /// No playable preview; the MIDI panel is shown instead.
    Unavailable,
    /// Playable preview advertised by the server, not fetched yet.
    Remote,
    Fetching,
    Local { path: PathBuf, playing: bool },
}

#[derive(Debug)]
pub enum DownloadAction {
    Idle,
    Busy { since: Instant, saved: Option<PathBuf> },
}

#[derive(Debug)]
pub struct ResultState {
    pub result: GenerationResult,
    pub shown_at: Instant,
    pub preview: Typewriter,
    pub particles: ParticleBurst,
    pub download: DownloadAction,
    pub audio: AudioStatus,
}

impl ResultState {
    pub fn new(result: GenerationResult, now: Instant) -> Self {
        let preview = Typewriter::new(result.preview_line(), PREVIEW_TYPE_SPEED);
        let audio =
            if result.has_playable_audio() { AudioStatus::Remote } else { AudioStatus::Unavailable };
        Self {
            result,
            shown_at: now,
            preview,
            particles: ParticleBurst::spawn(now),
            download: DownloadAction::Idle,
            audio,
        }
    }

    pub fn elapsed(&self, now: Instant) -> Duration {
        now.duration_since(self.shown_at)
    }

    pub fn is_playing(&self) -> bool {
        matches!(self.audio, AudioStatus::Local { playing: true, .. })
    }
}

#[derive(Debug)]
pub struct ErrorState {
    pub message: String,
    shown_at: Instant,
}

impl ErrorState {
    pub fn new(message: String, now: Instant) -> Self {
        Self { message, shown_at: now }
    }

    pub fn elapsed(&self, now: Instant) -> Duration {
        now.duration_since(self.shown_at)
    }

    pub fn expired(&self, now: Instant) -> bool {
        self.elapsed(now) >= ERROR_AUTO_HIDE
    }
}

#[derive(Debug)]
pub struct Toast {
    pub message: String,
    shown_at: Instant,
}

impl Toast {
    fn expired(&self, now: Instant) -> bool {
        now.duration_since(self.shown_at) >= TOAST_AUTO_HIDE
    }
}

#[derive(Debug, Clone)]
pub struct StatusLine {
    pub at: DateTime<Utc>,
    pub text: String,
}

#[derive(Debug, Clone)]
pub enum AppEvent {
    Info(String),
    Error(String),
    GenerationSucceeded { result: GenerationResult },
    GenerationFailed { message: String },
    DownloadFinished { path: PathBuf },
    DownloadFailed { message: String },
    AudioFetched { path: PathBuf },
    PlaybackStarted,
    PlaybackStopped,
}

#[derive(Debug, Clone)]
pub enum AppCommand {
    Generate { request: GenerationRequest },
    DownloadMidi { url: String },
    PlayAudio { url: String },
    StopPlayback,
}

pub struct AppState {
    pub form: GenerationForm,
    pub phase: Phase,
    pub toast: Option<Toast>,
    pub ambient: FloatingNotes,
    pub status_lines: Vec<StatusLine>,
    pub should_quit: bool,
}

impl AppState {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            form: GenerationForm::new(config),
            phase: Phase::Idle,
            toast: None,
            ambient: FloatingNotes::new(),
            status_lines: Vec::new(),
            should_quit: false,
        }
    }

    /// True while a request is in flight; the submit control is disabled for
    /// the whole interval, so a second submission cannot race the first.
    pub fn is_loading(&self) -> bool {
        matches!(self.phase, Phase::Loading(_))
    }

    /// Starts a generation cycle: snapshots the form, enters Loading, and
    /// returns the request to hand to the controller. Returns `None` while a
    /// request is already in flight.
    pub fn begin_generation(&mut self, now: Instant) -> Option<GenerationRequest> {
        if self.is_loading() {
            return None;
        }
        let request = self.form.to_request();
        self.phase = Phase::Loading(LoadingState::new(now));
        self.push_status_line(format!(
            "Requested {} notes at {} BPM",
            request.num_notes, request.tempo
        ));
        Some(request)
    }

    /// "Generate another": hides whichever panel is up and returns to the form.
    pub fn dismiss_panels(&mut self) {
        if matches!(self.phase, Phase::Result(_) | Phase::Error(_)) {
            self.phase = Phase::Idle;
        }
    }

    /// Starts the download action, returning the MIDI URL to fetch. The
    /// trigger stays disabled until the fixed restore delay passes.
    pub fn begin_midi_download(&mut self, now: Instant) -> Option<String> {
        let Phase::Result(state) = &mut self.phase else {
            return None;
        };
        if matches!(state.download, DownloadAction::Busy { .. }) {
            return None;
        }
        state.download = DownloadAction::Busy { since: now, saved: None };
        Some(state.result.midi_url.clone())
    }

    /// Play/stop for the audio preview. Returns the command to send, if any.
    pub fn toggle_playback(&mut self) -> Option<AppCommand> {
        let Phase::Result(state) = &mut self.phase else {
            return None;
        };
        let url = state.result.audio_url.clone()?;
        match &state.audio {
            AudioStatus::Remote => {
                state.audio = AudioStatus::Fetching;
                Some(AppCommand::PlayAudio { url })
            }
            AudioStatus::Local { playing: false, .. } => Some(AppCommand::PlayAudio { url }),
            AudioStatus::Local { playing: true, .. } => Some(AppCommand::StopPlayback),
            AudioStatus::Fetching | AudioStatus::Unavailable => None,
        }
    }

    pub fn handle_event(&mut self, event: AppEvent, now: Instant) {
        match event {
            AppEvent::Info(message) => self.push_status_line(message),
            AppEvent::Error(message) => {
                // A failed preview fetch leaves the play key usable again.
                if let Phase::Result(state) = &mut self.phase {
                    if state.audio == AudioStatus::Fetching {
                        state.audio = AudioStatus::Remote;
                    }
                }
                self.push_status_line(format!("Error: {message}"));
            }
            AppEvent::GenerationSucceeded { result } => {
                self.push_status_line(format!("Composed {} notes", result.total_notes));
                self.phase = Phase::Result(ResultState::new(result, now));
            }
            AppEvent::GenerationFailed { message } => {
                self.push_status_line(format!("Generation failed: {message}"));
                self.phase = Phase::Error(ErrorState::new(message, now));
            }
            AppEvent::DownloadFinished { path } => {
                self.push_status_line(format!("Saved {}", path.display()));
                if let Phase::Result(state) = &mut self.phase {
                    if let DownloadAction::Busy { since, .. } = state.download {
                        state.download = DownloadAction::Busy { since, saved: Some(path) };
                    }
                }
            }
            AppEvent::DownloadFailed { message } => {
                self.push_status_line(format!("Download failed: {message}"));
                if let Phase::Result(state) = &mut self.phase {
                    state.download = DownloadAction::Idle;
                }
            }
            AppEvent::AudioFetched { path } => {
                if let Phase::Result(state) = &mut self.phase {
                    state.audio = AudioStatus::Local { path, playing: false };
                }
            }
            AppEvent::PlaybackStarted => {
                if let Phase::Result(state) = &mut self.phase {
                    if let AudioStatus::Local { playing, .. } = &mut state.audio {
                        *playing = true;
                    }
                }
            }
            AppEvent::PlaybackStopped => {
                if let Phase::Result(state) = &mut self.phase {
                    if let AudioStatus::Local { playing, .. } = &mut state.audio {
                        *playing = false;
                    }
                }
            }
        }
    }

    /// Advances every elapsed-time effect: ambient spawner, toast and error
    /// expiry, download-trigger restore.
    pub fn tick(&mut self, now: Instant) {
        self.ambient.update(now);

        if self.toast.as_ref().is_some_and(|toast| toast.expired(now)) {
            self.toast = None;
        }

        if let Phase::Error(state) = &self.phase {
            if state.expired(now) {
                self.phase = Phase::Idle;
            }
        }

        let mut finished_download = None;
        if let Phase::Result(state) = &mut self.phase {
            if let DownloadAction::Busy { since, saved: Some(path) } = &state.download {
                if now.duration_since(*since) >= DOWNLOAD_RESTORE_DELAY {
                    finished_download = Some(path.clone());
                    state.download = DownloadAction::Idle;
                }
            }
        }
        if let Some(path) = finished_download {
            self.show_toast(
                format!(
                    "MIDI file saved to {} — open it with your favorite music software to hear \
                     your composition.",
                    path.display()
                ),
                now,
            );
        }
    }

    pub fn show_toast(&mut self, message: String, now: Instant) {
        self.toast = Some(Toast { message, shown_at: now });
    }

    pub fn push_status_line(&mut self, text: String) {
        self.status_lines.push(StatusLine { at: Utc::now(), text });
        if self.status_lines.len() > MAX_STATUS_LINES {
            let overflow = self.status_lines.len() - MAX_STATUS_LINES;
            self.status_lines.drain(0..overflow);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EchoedParameters;

    fn test_config() -> AppConfig {
        AppConfig::default()
    }

    fn sample_result(audio_url: Option<&str>) -> GenerationResult {
        GenerationResult {
            midi_url: "/static/generated_music_ab12cd34.mid".into(),
            audio_url: audio_url.map(Into::into),
            total_notes: 80,
            parameters: EchoedParameters { temperature: 1.2, tempo: 120 },
            notes_preview: vec!["C4".into(), "E4".into(), "G4".into()],
        }
    }

    #[test]
    fn request_snapshot_matches_form_state() {
        let mut app = AppState::new(&test_config());
        app.form.num_notes = 120;
        app.form.tempo = 90;
        app.form.temperature = "1.5".into();
        app.form.seed = "deadbeef".into();

        let request = app.begin_generation(Instant::now()).unwrap();
        assert_eq!(request.num_notes, 120);
        assert_eq!(request.tempo, 90);
        assert_eq!(request.temperature, 1.5);
        assert_eq!(request.seed.as_deref(), Some("deadbeef"));
        assert!(app.is_loading());
    }

    #[test]
    fn empty_seed_is_absent_and_bad_temperature_propagates() {
        let mut form = GenerationForm::new(&test_config());
        form.temperature = "very hot".into();
        let request = form.to_request();
        assert!(request.seed.is_none());
        assert!(request.temperature.is_nan());
    }

    #[test]
    fn submit_is_inert_while_a_request_is_in_flight() {
        let mut app = AppState::new(&test_config());
        let now = Instant::now();
        assert!(app.begin_generation(now).is_some());
        assert!(app.begin_generation(now).is_none());
    }

    #[test]
    fn loading_exits_exactly_once_per_request() {
        let mut app = AppState::new(&test_config());
        let now = Instant::now();

        app.begin_generation(now).unwrap();
        assert!(app.is_loading());
        app.handle_event(AppEvent::GenerationFailed { message: "boom".into() }, now);
        assert!(matches!(app.phase, Phase::Error(_)));

        app.begin_generation(now).unwrap();
        assert!(app.is_loading());
        app.handle_event(
            AppEvent::GenerationSucceeded { result: sample_result(None) },
            now,
        );
        assert!(matches!(app.phase, Phase::Result(_)));
    }

    #[test]
    fn wav_audio_enables_the_player_panel() {
        let now = Instant::now();
        let with_audio = ResultState::new(sample_result(Some("/static/a.wav")), now);
        assert_eq!(with_audio.audio, AudioStatus::Remote);

        let without_audio = ResultState::new(sample_result(None), now);
        assert_eq!(without_audio.audio, AudioStatus::Unavailable);
    }

    #[test]
    fn error_panel_auto_hides_after_eight_seconds() {
        let mut app = AppState::new(&test_config());
        let now = Instant::now();
        app.handle_event(AppEvent::GenerationFailed { message: "X".into() }, now);

        let Phase::Error(state) = &app.phase else { panic!("expected error phase") };
        assert_eq!(state.message, "X");

        app.tick(now + ERROR_AUTO_HIDE - Duration::from_millis(1));
        assert!(matches!(app.phase, Phase::Error(_)));
        app.tick(now + ERROR_AUTO_HIDE);
        assert!(matches!(app.phase, Phase::Idle));
    }

    #[test]
    fn dismissing_and_resubmitting_leaves_no_residual_panel() {
        let mut app = AppState::new(&test_config());
        let now = Instant::now();
        app.handle_event(
            AppEvent::GenerationSucceeded { result: sample_result(Some("/static/a.wav")) },
            now,
        );
        app.dismiss_panels();
        assert!(matches!(app.phase, Phase::Idle));

        app.begin_generation(now).unwrap();
        assert!(app.is_loading());
    }

    #[test]
    fn download_trigger_restores_after_fixed_delay_and_raises_toast() {
        let mut app = AppState::new(&test_config());
        let now = Instant::now();
        app.handle_event(AppEvent::GenerationSucceeded { result: sample_result(None) }, now);

        let url = app.begin_midi_download(now).unwrap();
        assert_eq!(url, "/static/generated_music_ab12cd34.mid");
        assert!(app.begin_midi_download(now).is_none());

        app.handle_event(
            AppEvent::DownloadFinished { path: PathBuf::from("/tmp/a.mid") },
            now,
        );
        app.tick(now + Duration::from_millis(200));
        assert!(app.toast.is_none());

        app.tick(now + DOWNLOAD_RESTORE_DELAY);
        let toast = app.toast.as_ref().expect("toast after restore delay");
        assert!(toast.message.contains("/tmp/a.mid"));

        let Phase::Result(state) = &app.phase else { panic!("expected result phase") };
        assert!(matches!(state.download, DownloadAction::Idle));
    }

    #[test]
    fn toast_auto_hides_after_six_seconds() {
        let mut app = AppState::new(&test_config());
        let now = Instant::now();
        app.show_toast("saved".into(), now);
        app.tick(now + TOAST_AUTO_HIDE - Duration::from_millis(1));
        assert!(app.toast.is_some());
        app.tick(now + TOAST_AUTO_HIDE);
        assert!(app.toast.is_none());
    }

    #[test]
    fn status_cycle_rotates_messages_every_two_seconds() {
        // Nothing is revealed yet at the start of a cycle.
        assert_eq!(status_text_at(Duration::ZERO), "");
        assert_eq!(status_text_at(LOADING_CYCLE), "");
        // Deep into a cycle the whole message is revealed.
        assert_eq!(
            status_text_at(Duration::from_millis(1900)),
            LOADING_MESSAGES[0]
        );
        assert_eq!(
            status_text_at(LOADING_CYCLE + Duration::from_millis(1900)),
            LOADING_MESSAGES[1]
        );
        // Wraps back to the first message after a full rotation.
        assert_eq!(
            status_text_at(LOADING_CYCLE * 4 + Duration::from_millis(1900)),
            LOADING_MESSAGES[0]
        );
    }

    #[test]
    fn slider_adjustments_clamp_and_pulse() {
        let mut form = GenerationForm::new(&test_config());
        let now = Instant::now();
        form.focus = FormField::Tempo;
        form.tempo = TEMPO_RANGE.1;
        form.adjust(1, now);
        assert_eq!(form.tempo, TEMPO_RANGE.1);
        assert!(form.tempo_pulsing(now));
        assert!(!form.tempo_pulsing(now + SLIDER_PULSE));
    }
}
