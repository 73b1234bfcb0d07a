//! The dialogue orchestrator: turns a completed speech segment into a
//! spoken reply. See spec.md §4.8, directly grounded on
//! `original_source/echomatrix/engine.py::process_calls` and
//! `event_handlers.py::on_speech_segment_complete`.
//!
//! This is the only place in the crate where `tokio` is load-bearing — the
//! media thread that owns `SipLibrary`/`Recorder`/`Player` state is plain
//! `std::thread` and must never `.await`. The orchestrator talks to it only
//! through the command queue and event bus.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use tokio::runtime::Runtime;

use crate::account::Account;
use crate::audio;
use crate::call::ChatRole;
use crate::collab::{LanguageModel, TextToSpeech, Transcriber};
use crate::command::{Command, CommandSender};
use crate::error::AgentError;
use crate::events::{Event, EventTag};
use crate::recorder::SpeechSegment;

/// The language-model prompt template every reply is generated from
/// (spec.md §4.8 step 5 names this template explicitly).
const PROMPT_TEMPLATE: &str = "generic";

/// Wires the three external collaborators to an account's calls, owning a
/// dedicated tokio runtime so async collaborator calls never touch the
/// media thread.
pub struct DialogueOrchestrator<T, L, S>
where
    T: Transcriber + 'static,
    L: LanguageModel + 'static,
    S: TextToSpeech + 'static,
{
    transcriber: Arc<T>,
    language_model: Arc<L>,
    tts: Arc<S>,
    account: Arc<Account>,
    commands: CommandSender,
    runtime: Runtime,
    sample_rate: u32,
    sample_width: u8,
    tts_voice: String,
    tts_model: String,
}

impl<T, L, S> DialogueOrchestrator<T, L, S>
where
    T: Transcriber + 'static,
    L: LanguageModel + 'static,
    S: TextToSpeech + 'static,
{
    pub fn new(
        transcriber: Arc<T>,
        language_model: Arc<L>,
        tts: Arc<S>,
        account: Arc<Account>,
        commands: CommandSender,
        sample_rate: u32,
        sample_width: u8,
        tts_voice: impl Into<String>,
        tts_model: impl Into<String>,
    ) -> std::io::Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("callbot-orchestrator")
            .enable_all()
            .build()?;
        Ok(Self {
            transcriber,
            language_model,
            tts,
            account,
            commands,
            runtime,
            sample_rate,
            sample_width,
            tts_voice: tts_voice.into(),
            tts_model: tts_model.into(),
        })
    }

    /// Handle one completed speech segment synchronously, on the calling
    /// thread, via this orchestrator's own runtime. Intended to be called
    /// from an [`crate::events::EventBus::subscribe`] handler for
    /// [`EventTag::SpeechSegmentComplete`]; the handler itself must stay
    /// synchronous (event dispatch is synchronous per spec.md §4.1), so it
    /// blocks on `runtime.block_on` rather than spawning detached work.
    pub fn handle_segment_complete(&self, call_id: &str, recording_path: &str, segment: &SpeechSegment) {
        let call = match self.account.get_call(call_id) {
            Some(call) => call,
            None => {
                tracing::warn!(call_id, "speech segment completed for unknown call, dropping");
                return;
            }
        };

        let audio_bytes = match audio::extract_range(Path::new(recording_path), segment.start_byte, segment.end_byte) {
            Ok(bytes) => bytes,
            Err(err) => {
                tracing::warn!(call_id, error = %err, "failed to extract speech segment audio");
                return;
            }
        };

        let transcriber = self.transcriber.clone();
        let language_model = self.language_model.clone();
        let tts = self.tts.clone();
        let commands = self.commands.clone();
        let call_id = call_id.to_string();
        let sample_rate = self.sample_rate;
        let sample_width = self.sample_width;
        let tts_voice = self.tts_voice.clone();
        let tts_model = self.tts_model.clone();

        self.runtime.block_on(async move {
            let transcript = match transcriber.transcribe(&audio_bytes, sample_rate, sample_width).await {
                Ok(text) => text,
                Err(err) => {
                    tracing::warn!(call_id = %call_id, error = %err, "transcription failed");
                    return;
                }
            };

            {
                let mut call = call.lock().unwrap();
                call.add_chat_message(ChatRole::Caller, transcript);
            }

            let prompt = {
                let call = call.lock().unwrap();
                call.unprocessed_messages()
                    .map(|m| format!("{}: {}", m.role.as_str(), m.text))
                    .collect::<Vec<_>>()
                    .join("\n")
            };
            if prompt.is_empty() {
                return;
            }

            let mut variables = HashMap::new();
            variables.insert("text".to_string(), prompt);

            let reply = match language_model.reply(PROMPT_TEMPLATE, &variables).await {
                Ok(reply) => reply,
                Err(err) => {
                    tracing::warn!(call_id = %call_id, error = %err, "language model reply failed");
                    return;
                }
            };

            {
                let mut call = call.lock().unwrap();
                call.add_chat_message(ChatRole::System, reply.clone());
                call.mark_all_processed();
            }

            let audio_path = match tts.synthesize(&reply, &tts_voice, &tts_model).await {
                Ok(path) => path,
                Err(err) => {
                    tracing::warn!(call_id = %call_id, error = %err, "speech synthesis failed");
                    return;
                }
            };
            let audio_path = audio_path.display().to_string();

            {
                let mut call = call.lock().unwrap();
                call.add_outgoing_audio(audio_path.clone());
            }

            if let Err(err) = commands.submit(Command::PlayWav {
                call_id: call_id.clone(),
                file_path: audio_path,
            }) {
                if !matches!(err, AgentError::QueueClosed) {
                    tracing::warn!(call_id = %call_id, error = %err, "failed to enqueue reply playback");
                }
            }
        });
    }

    /// Register this orchestrator against an agent's event bus, so every
    /// completed speech segment drives a reply automatically.
    pub fn attach(self: Arc<Self>, events: &crate::agent::AgentEventBus) {
        events.subscribe(EventTag::SpeechSegmentComplete, move |event| {
            if let Event::SpeechSegmentComplete { call_id, path, segment, .. } = event {
                self.handle_segment_complete(call_id, path, segment);
            }
        });
    }
}
