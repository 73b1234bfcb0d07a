//! The SIP agent: owns the media thread, the account, and every per-call
//! recorder/player. See spec.md §4.7.
//!
//! The media thread is the only thread permitted to touch `SipLibrary` or
//! per-call `Recorder`/`Player` state. It must never `.await` — all async
//! work (transcription, LLM calls, TTS) happens on the
//! [`crate::orchestrator::DialogueOrchestrator`]'s own runtime, which talks
//! back to the media thread only through the command queue and event bus.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::account::Account;
use crate::call::{CallId, CallMediaState};
use crate::command::{command_queue, Command, CommandReceiver, CommandSender, DEFAULT_DRAIN_LIMIT};
use crate::error::{AgentError, AgentResult};
use crate::events::{Event, EventBus, EventTag};
use crate::player::Player;
use crate::recorder::{Recorder, RecorderConfig, RecorderEvent, DEFAULT_POLL_INTERVAL};
use crate::sip::{AccountParams, SipLibrary, SipLibraryEvent, TransportParams};

/// The full configuration surface named in spec.md §4.7, mirroring the
/// pjsua2 `EpConfig`/`AccountConfig` fields `original_source`'s
/// `SipAgent.__init__`/`register_account` build from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub agent_id: String,

    pub bound_address: String,
    pub bound_port: u16,
    pub public_address: Option<String>,

    pub id_uri: String,
    pub registrar_uri: String,
    pub outbound_proxy: Option<String>,
    pub username: String,
    pub password: String,
    pub register_on_add: bool,

    pub clock_rate: u32,
    pub sound_clock_rate: u32,
    pub channel_count: u8,
    pub ptime: u32,
    pub quality: u8,
    pub ec_tail_len: u32,
    pub echo_cancellation: bool,
    pub no_vad: bool,
    pub tx_drop_pct: u8,
    pub thread_count: u8,
    pub main_thread_only: bool,

    pub stun_server: Option<String>,
    pub nat_keep_alive_interval: u32,
    pub nat_type_in_sdp: u8,

    pub sample_rate: u32,
    pub sample_width: u16,
    pub silence_threshold: f64,
    pub silence_duration_ms: u64,
    pub auto_answer: bool,

    /// Default voice/model passed to the dialogue orchestrator's
    /// `TextToSpeech::synthesize` calls, matching `original_source`'s
    /// `config.py` `tts_voice: 'echo'` default and `tts_generator.py`'s
    /// hardcoded `"tts-1"` request model.
    pub tts_voice: String,
    pub tts_model: String,

    pub recording_directory: String,
    pub welcome_message_path: Option<String>,
    pub disconnect_message_path: Option<String>,
    pub welcome_delay_ms: u64,
    pub max_call_length_sec: u64,

    pub media_tick_interval_ms: u64,
    pub start_timeout_sec: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            agent_id: "agent-1".to_string(),
            bound_address: "0.0.0.0".to_string(),
            bound_port: 5060,
            public_address: None,
            id_uri: "sip:agent@example.com".to_string(),
            registrar_uri: "sip:example.com".to_string(),
            outbound_proxy: None,
            username: "agent".to_string(),
            password: String::new(),
            register_on_add: true,
            clock_rate: 8000,
            sound_clock_rate: 8000,
            channel_count: 1,
            ptime: 20,
            quality: 8,
            ec_tail_len: 200,
            echo_cancellation: true,
            no_vad: true,
            tx_drop_pct: 0,
            thread_count: 1,
            main_thread_only: false,
            stun_server: None,
            nat_keep_alive_interval: 30,
            nat_type_in_sdp: 1,
            sample_rate: 8000,
            sample_width: 2,
            silence_threshold: 500.0,
            silence_duration_ms: 1500,
            auto_answer: true,
            tts_voice: "echo".to_string(),
            tts_model: "tts-1".to_string(),
            recording_directory: "/tmp/callbot-core/recordings".to_string(),
            welcome_message_path: None,
            disconnect_message_path: None,
            welcome_delay_ms: 500,
            max_call_length_sec: 3600,
            media_tick_interval_ms: DEFAULT_POLL_INTERVAL.as_millis() as u64,
            start_timeout_sec: 5,
        }
    }
}

/// Fluent builder over [`AgentConfig`], mirroring `client-core`'s
/// `ClientConfigBuilder` setter chain.
#[derive(Default)]
pub struct ConfigBuilder {
    config: AgentConfig,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: AgentConfig::default(),
        }
    }

    pub fn agent_id(mut self, id: impl Into<String>) -> Self {
        self.config.agent_id = id.into();
        self
    }

    pub fn sip_identity(mut self, id_uri: impl Into<String>, registrar_uri: impl Into<String>) -> Self {
        self.config.id_uri = id_uri.into();
        self.config.registrar_uri = registrar_uri.into();
        self
    }

    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.config.username = username.into();
        self.config.password = password.into();
        self
    }

    pub fn recording_directory(mut self, dir: impl Into<String>) -> Self {
        self.config.recording_directory = dir.into();
        self
    }

    pub fn silence_params(mut self, threshold: f64, duration_ms: u64) -> Self {
        self.config.silence_threshold = threshold;
        self.config.silence_duration_ms = duration_ms;
        self
    }

    pub fn welcome_message(mut self, path: impl Into<String>, delay_ms: u64) -> Self {
        self.config.welcome_message_path = Some(path.into());
        self.config.welcome_delay_ms = delay_ms;
        self
    }

    pub fn build(self) -> AgentResult<AgentConfig> {
        if self.config.id_uri.is_empty() {
            return Err(AgentError::ConfigInvalid("id_uri must not be empty".into()));
        }
        if self.config.sample_width != 1 && self.config.sample_width != 2 && self.config.sample_width != 4 {
            return Err(AgentError::ConfigInvalid(
                "sample_width must be 1, 2 or 4".into(),
            ));
        }
        Ok(self.config)
    }
}

/// Wraps an [`EventBus`] to auto-stamp every emitted event's `agent_id` and
/// to filter events by tag for handlers that only care about a subset.
pub struct AgentEventBus {
    agent_id: String,
    inner: Arc<EventBus>,
}

impl AgentEventBus {
    pub fn new(agent_id: impl Into<String>, inner: Arc<EventBus>) -> Self {
        Self {
            agent_id: agent_id.into(),
            inner,
        }
    }

    pub fn inner(&self) -> Arc<EventBus> {
        self.inner.clone()
    }

    pub fn emit(&self, event: Event) {
        debug_assert_eq!(event.agent_id(), self.agent_id, "event stamped for a different agent");
        self.inner.emit(event);
    }

    pub fn subscribe<F>(&self, tag: EventTag, handler: F) -> Uuid
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.inner.subscribe(tag, handler)
    }
}

struct MediaThreadState {
    sip: Arc<dyn SipLibrary>,
    account: Arc<Account>,
    events: Arc<EventBus>,
    commands: CommandReceiver,
    recorders: HashMap<CallId, Recorder>,
    players: HashMap<CallId, Player>,
    config: AgentConfig,
}

/// A running SIP agent: the account it serves, the event bus other threads
/// subscribe to, and a handle for enqueueing playback commands.
pub struct Agent {
    config: AgentConfig,
    events: Arc<EventBus>,
    account: Arc<Account>,
    commands: CommandSender,
    command_receiver: Mutex<Option<CommandReceiver>>,
    run_flag: Arc<AtomicBool>,
    initialized: Arc<AtomicBool>,
    join_handle: Mutex<Option<JoinHandle<()>>>,
}

impl Agent {
    /// Construct an agent. Does not start the media thread or touch any SIP
    /// library; call [`Agent::start_nonblocking`] or [`Agent::start`] with
    /// a [`SipLibrary`] implementation for that.
    pub fn new(config: AgentConfig) -> Self {
        let events = Arc::new(EventBus::new());
        let (commands, command_receiver) = command_queue();
        let account = Arc::new(Account::new(config.id_uri.clone(), commands.clone()));
        Self {
            config,
            events,
            account,
            commands,
            command_receiver: Mutex::new(Some(command_receiver)),
            run_flag: Arc::new(AtomicBool::new(false)),
            initialized: Arc::new(AtomicBool::new(false)),
            join_handle: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn event_bus(&self) -> AgentEventBus {
        AgentEventBus::new(self.config.agent_id.clone(), self.events.clone())
    }

    pub fn command_sender(&self) -> CommandSender {
        self.commands.clone()
    }

    pub fn account(&self) -> Arc<Account> {
        self.account.clone()
    }

    pub fn is_running(&self) -> bool {
        self.run_flag.load(Ordering::Acquire)
    }

    /// Start the media thread and block the calling thread until it exits.
    /// Used by long-running binaries that have nothing else to do.
    pub fn start(self: Arc<Self>, sip: Arc<dyn SipLibrary>) -> AgentResult<()> {
        self.clone().start_nonblocking(sip)?;
        if let Some(handle) = self.join_handle.lock().unwrap().take() {
            handle.join().map_err(|_| {
                AgentError::LibraryInitFailed("media thread panicked".to_string())
            })?;
        }
        Ok(())
    }

    /// Start the media thread in the background, waiting up to
    /// `config.start_timeout_sec` for library initialization to complete.
    pub fn start_nonblocking(self: Arc<Self>, sip: Arc<dyn SipLibrary>) -> AgentResult<()> {
        sip.lib_create()?;
        sip.lib_init()?;
        sip.transport_create(&TransportParams {
            bound_address: self.config.bound_address.clone(),
            bound_port: self.config.bound_port,
            public_address: self.config.public_address.clone(),
        })?;
        sip.account_create(&AccountParams {
            id_uri: self.config.id_uri.clone(),
            registrar_uri: self.config.registrar_uri.clone(),
            outbound_proxy: self.config.outbound_proxy.clone(),
            username: self.config.username.clone(),
            password: self.config.password.clone(),
            register_on_add: self.config.register_on_add,
        })?;
        sip.lib_start()?;

        std::fs::create_dir_all(&self.config.recording_directory)
            .map_err(|e| AgentError::ConfigInvalid(format!("recording_directory: {e}")))?;

        let run_flag = self.run_flag.clone();
        run_flag.store(true, Ordering::Release);
        let initialized = self.initialized.clone();
        let commands_rx = self
            .command_receiver
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| AgentError::LibraryInitFailed("agent already started".to_string()))?;

        let mut state = MediaThreadState {
            sip,
            account: self.account.clone(),
            events: self.events.clone(),
            commands: commands_rx,
            recorders: HashMap::new(),
            players: HashMap::new(),
            config: self.config.clone(),
        };

        let tick_interval = Duration::from_millis(self.config.media_tick_interval_ms.max(1));
        let events_for_thread = self.events.clone();
        let agent_id = self.config.agent_id.clone();

        let handle = thread::Builder::new()
            .name(format!("{}-media", agent_id))
            .spawn(move || {
                initialized.store(true, Ordering::Release);
                events_for_thread.emit(Event::AgentStarted {
                    agent_id: agent_id.clone(),
                    timestamp: crate::events::now(),
                });
                while run_flag.load(Ordering::Acquire) {
                    media_thread_tick(&mut state, &agent_id);
                    thread::sleep(tick_interval);
                }
                events_for_thread.emit(Event::AgentStopped {
                    agent_id,
                    timestamp: crate::events::now(),
                });
            })
            .map_err(|e| AgentError::LibraryInitFailed(e.to_string()))?;

        *self.join_handle.lock().unwrap() = Some(handle);

        let deadline = Instant::now() + Duration::from_secs(self.config.start_timeout_sec.max(1));
        while !self.initialized.load(Ordering::Acquire) {
            if Instant::now() >= deadline {
                return Err(AgentError::Timeout(Duration::from_secs(
                    self.config.start_timeout_sec,
                )));
            }
            thread::sleep(Duration::from_millis(5));
        }

        Ok(())
    }

    /// Signal the media thread to stop and join it, waiting up to 5 seconds.
    pub fn stop(&self) -> AgentResult<()> {
        self.events.emit(Event::AgentStopping {
            agent_id: self.config.agent_id.clone(),
            timestamp: crate::events::now(),
        });
        self.run_flag.store(false, Ordering::Release);
        self.commands.close();

        if let Some(handle) = self.join_handle.lock().unwrap().take() {
            let start = Instant::now();
            while !handle.is_finished() {
                if start.elapsed() > Duration::from_secs(5) {
                    return Err(AgentError::Timeout(Duration::from_secs(5)));
                }
                thread::sleep(Duration::from_millis(10));
            }
            let _ = handle.join();
        }
        Ok(())
    }
}

fn media_thread_tick(state: &mut MediaThreadState, agent_id: &str) {
    match state.sip.handle_events(0) {
        Ok(events) => {
            for event in events {
                apply_sip_event(state, agent_id, event);
            }
        }
        Err(err) => tracing::warn!(error = %err, "sip library handle_events failed"),
    }

    let now = Instant::now();
    let commands = state.commands.drain(DEFAULT_DRAIN_LIMIT);
    for command in commands {
        match command {
            Command::PlayWav { call_id, file_path } => {
                let media_state = state.account.get_call(&call_id).map(|call| call.lock().unwrap().media_state);
                match media_state {
                    None | Some(CallMediaState::Idle) | Some(CallMediaState::Disconnected) => {
                        let err = AgentError::CallNotReady(call_id.clone());
                        tracing::warn!(call_id = %call_id, error = %err, "play_wav rejected");
                        continue;
                    }
                    Some(CallMediaState::Confirmed) => {}
                }

                let player = state
                    .players
                    .entry(call_id.clone())
                    .or_insert_with(|| Player::new(state.config.sample_rate, state.config.sample_width));
                match player.play(std::path::PathBuf::from(&file_path), now) {
                    Ok(superseded) => {
                        if let Some(prior) = superseded {
                            state.events.emit(Event::AudioEnded {
                                agent_id: agent_id.to_string(),
                                timestamp: crate::events::now(),
                                call_id: call_id.clone(),
                                file_path: prior.display().to_string(),
                            });
                        }
                        if let Err(err) = state.sip.attach_player(&call_id, &file_path) {
                            tracing::warn!(call_id = %call_id, error = %err, "attach_player failed");
                            player.stop();
                            let err = AgentError::NoActiveMedia(call_id.clone());
                            tracing::warn!(call_id = %call_id, error = %err, "play_wav could not attach media");
                            continue;
                        }
                        let duration = player.duration_secs();
                        state.events.emit(Event::AudioPlaying {
                            agent_id: agent_id.to_string(),
                            timestamp: crate::events::now(),
                            call_id,
                            file_path,
                            duration,
                        });
                    }
                    Err(err) => {
                        tracing::warn!(call_id = %call_id, error = %err, "play_wav failed");
                    }
                }
            }
        }
    }

    for (call_id, recorder) in state.recorders.iter_mut() {
        match recorder.poll(now) {
            Ok(Some(RecorderEvent::SpeechDetected { start_ms })) => {
                state.events.emit(Event::SpeechDetected {
                    agent_id: agent_id.to_string(),
                    timestamp: crate::events::now(),
                    call_id: call_id.clone(),
                    start_ms: start_ms as i64,
                });
            }
            Ok(Some(RecorderEvent::SegmentComplete(segment))) => {
                if let Some(call) = state.account.get_call(call_id) {
                    call.lock().unwrap().add_speech_segment(segment.clone());
                }
                state.events.emit(Event::SpeechSegmentComplete {
                    agent_id: agent_id.to_string(),
                    timestamp: crate::events::now(),
                    call_id: call_id.clone(),
                    segment,
                    path: recorder.path().display().to_string(),
                });
            }
            Ok(None) => {}
            Err(err) => tracing::warn!(call_id = %call_id, error = %err, "recorder poll failed"),
        }
    }

    let finished: Vec<(CallId, std::path::PathBuf)> = state
        .players
        .iter_mut()
        .filter_map(|(call_id, player)| player.tick(now).map(|path| (call_id.clone(), path)))
        .collect();
    for (call_id, path) in finished {
        state.events.emit(Event::AudioEnded {
            agent_id: agent_id.to_string(),
            timestamp: crate::events::now(),
            call_id,
            file_path: path.display().to_string(),
        });
    }
}

fn apply_sip_event(state: &mut MediaThreadState, agent_id: &str, event: SipLibraryEvent) {
    match event {
        SipLibraryEvent::IncomingCall { call_id, remote_uri } => {
            let _ = state.sip.answer(&call_id, 200);
            state.account.on_incoming_call(call_id.clone(), remote_uri);
            state.events.emit(Event::CallAnswered {
                agent_id: agent_id.to_string(),
                timestamp: crate::events::now(),
                call_id,
            });
        }
        SipLibraryEvent::CallStateConfirmed { call_id } => {
            if let Some(call) = state.account.get_call(&call_id) {
                call.lock().unwrap().mark_answered();
            }
            let recorder_path = std::path::PathBuf::from(&state.config.recording_directory)
                .join(format!("{call_id}.pcm"));
            let mut recorder = Recorder::new(
                recorder_path.clone(),
                RecorderConfig {
                    sample_rate: state.config.sample_rate,
                    sample_width: state.config.sample_width as u8,
                    silence_threshold: state.config.silence_threshold,
                    silence_duration_ms: state.config.silence_duration_ms,
                    analysis_window_seconds: 1.0,
                },
            );
            if recorder.start(Instant::now()).is_ok() {
                let _ = state.sip.attach_recorder(&call_id, &recorder_path.display().to_string());
                state.events.emit(Event::RecordingStarted {
                    agent_id: agent_id.to_string(),
                    timestamp: crate::events::now(),
                    call_id: call_id.clone(),
                    path: recorder_path.display().to_string(),
                });
                state.recorders.insert(call_id, recorder);
            }
        }
        SipLibraryEvent::CallStateDisconnected { call_id } => {
            if let Some(mut recorder) = state.recorders.remove(&call_id) {
                let stop_time = Instant::now();
                let duration = recorder.elapsed_seconds(stop_time);
                recorder.stop(stop_time);
                state.events.emit(Event::RecordingStopped {
                    agent_id: agent_id.to_string(),
                    timestamp: crate::events::now(),
                    call_id: call_id.clone(),
                    path: recorder.path().display().to_string(),
                    duration,
                });
            }
            state.players.remove(&call_id);
            let _ = state.sip.detach_media(&call_id);
            if let Some(call) = state.account.remove_call(&call_id) {
                let mut call = call.lock().unwrap();
                call.mark_disconnected();
                let duration = call.duration_sec();
                state.events.emit(Event::CallDisconnected {
                    agent_id: agent_id.to_string(),
                    timestamp: crate::events::now(),
                    call_id,
                    duration,
                });
            }
        }
        SipLibraryEvent::TimerFired { .. } => {}
        SipLibraryEvent::AccountRegistered { status } => {
            state.events.emit(Event::AccountRegistered {
                agent_id: agent_id.to_string(),
                timestamp: crate::events::now(),
                status,
            });
        }
    }
}
