use anyhow::{anyhow, Context, Result};
use crossterm::{
    event::{DisableMouseCapture, EnableMouseCapture},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use std::{
    fs::File,
    io::{self, BufReader},
    path::Path,
    sync::Arc,
};
use tokio::{
    sync::{
        mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender},
        Mutex,
    },
    time::{sleep, Duration as TokioDuration},
};
use tracing::{error, info};

use rodio::{Decoder, OutputStream, Sink};

mod api;
mod app;
mod config;
mod types;
mod ui;

use app::{AppCommand, AppEvent, AppState};
use config::AppConfig;
use types::GenerationOutcome;

struct AudioPlayer {
    _stream: OutputStream,
    handle: rodio::OutputStreamHandle,
    sink: Option<Sink>,
}

unsafe impl Send for AudioPlayer {}
unsafe impl Sync for AudioPlayer {}

impl AudioPlayer {
    fn new() -> Result<Self> {
        let (stream, handle) =
            OutputStream::try_default().context("failed to open audio output")?;
        Ok(Self { _stream: stream, handle, sink: None })
    }

    fn play(&mut self, path: &Path) -> Result<()> {
        self.stop();
        let file =
            File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
        let decoder = Decoder::new(BufReader::new(file)).context("failed to decode audio")?;
        let sink = Sink::try_new(&self.handle).context("failed to create audio sink")?;
        sink.append(decoder);
        sink.play();
        self.sink = Some(sink);
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(sink) = self.sink.take() {
            sink.stop();
        }
    }

    fn is_playing(&self) -> bool {
        self.sink.as_ref().map(|sink| !sink.empty()).unwrap_or(false)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_tracing()?;
    info!("starting cadenza");

    let config = AppConfig::load()?;
    let client = api::Client::new(config.server_url())?;
    let server = client.base_url().to_string();

    let (event_tx, mut event_rx) = unbounded_channel();
    let (command_tx, command_rx) = unbounded_channel();

    let controller = Controller::new(client, event_tx.clone(), config.clone())?;
    controller.spawn(command_rx);

    let mut app_state = AppState::new(&config);
    app_state.push_status_line(format!("Server: {server}"));

    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    enable_raw_mode()?;

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    terminal.clear()?;
    terminal.hide_cursor()?;

    let ui_result = ui::run(&mut terminal, &mut app_state, &mut event_rx, command_tx.clone());

    terminal.show_cursor()?;
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen, DisableMouseCapture)?;

    ui_result
}

fn setup_tracing() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .try_init()
        .map_err(|err: Box<dyn std::error::Error + Send + Sync>| {
            anyhow!("failed to initialise tracing: {err}")
        })?;
    Ok(())
}

struct Controller {
    inner: Arc<ControllerInner>,
}

struct ControllerInner {
    client: api::Client,
    event_tx: UnboundedSender<AppEvent>,
    config: AppConfig,
    player: Mutex<AudioPlayer>,
}

impl Controller {
    fn new(
        client: api::Client,
        event_tx: UnboundedSender<AppEvent>,
        config: AppConfig,
    ) -> Result<Self> {
        let player = AudioPlayer::new()?;
        let inner = ControllerInner { client, event_tx, config, player: Mutex::new(player) };
        Ok(Self { inner: Arc::new(inner) })
    }

    fn spawn(self, mut command_rx: UnboundedReceiver<AppCommand>) {
        let inner = self.inner.clone();
        tokio::spawn(async move {
            while let Some(command) = command_rx.recv().await {
                if let Err(err) = Controller::handle_command(inner.clone(), command).await {
                    error!("command error: {err}");
                    let _ = inner.event_tx.send(AppEvent::Error(format!("{err}")));
                }
            }
        });
    }

    async fn handle_command(inner: Arc<ControllerInner>, command: AppCommand) -> Result<()> {
        match command {
            AppCommand::Generate { request } => Controller::generate(inner, request).await,
            AppCommand::DownloadMidi { url } => Controller::download_midi(inner, url).await,
            AppCommand::PlayAudio { url } => Controller::play_audio(inner, url).await,
            AppCommand::StopPlayback => Controller::stop_playback(inner).await,
        }
    }

    async fn generate(inner: Arc<ControllerInner>, request: types::GenerationRequest) -> Result<()> {
        info!(num_notes = request.num_notes, tempo = request.tempo, "submitting generation request");
        let event = match inner.client.generate(&request).await {
            Ok(GenerationOutcome::Success(result)) => {
                info!(total_notes = result.total_notes, "generation succeeded");
                AppEvent::GenerationSucceeded { result }
            }
            Ok(GenerationOutcome::Failure { message }) => {
                error!("generation failed: {message}");
                AppEvent::GenerationFailed { message }
            }
            Err(err) => {
                error!("generation request error: {err}");
                AppEvent::GenerationFailed { message: api::network_error_message(&err) }
            }
        };
        let _ = inner.event_tx.send(event);
        Ok(())
    }

    async fn download_midi(inner: Arc<ControllerInner>, url: String) -> Result<()> {
        match inner.client.fetch_artifact(&url, inner.config.download_dir()).await {
            Ok(path) => {
                info!(path = %path.display(), "MIDI file saved");
                let _ = inner.event_tx.send(AppEvent::DownloadFinished { path });
            }
            Err(err) => {
                error!("MIDI download failed: {err}");
                let _ = inner.event_tx.send(AppEvent::DownloadFailed { message: format!("{err}") });
            }
        }
        Ok(())
    }

    async fn play_audio(inner: Arc<ControllerInner>, url: String) -> Result<()> {
        let path = inner
            .client
            .fetch_artifact(&url, inner.config.download_dir())
            .await
            .context("failed to fetch audio preview")?;
        let _ = inner.event_tx.send(AppEvent::AudioFetched { path: path.clone() });
        {
            let mut player = inner.player.lock().await;
            player.play(&path)?;
        }
        let _ = inner.event_tx.send(AppEvent::Info(format!("Playing {}", path.display())));
        let _ = inner.event_tx.send(AppEvent::PlaybackStarted);
        Controller::spawn_playback_monitor(inner.clone());
        Ok(())
    }

    async fn stop_playback(inner: Arc<ControllerInner>) -> Result<()> {
        let mut player = inner.player.lock().await;
        player.stop();
        let _ = inner.event_tx.send(AppEvent::PlaybackStopped);
        Ok(())
    }

    fn spawn_playback_monitor(inner: Arc<ControllerInner>) {
        tokio::spawn(async move {
            loop {
                sleep(TokioDuration::from_millis(500)).await;
                let playing = {
                    let player = inner.player.lock().await;
                    player.is_playing()
                };
                if !playing {
                    let _ = inner.event_tx.send(AppEvent::PlaybackStopped);
                    break;
                }
            }
        });
    }
}
