//! Per-call state: media lifecycle, transcript, and the lightweight history
//! that gets serialized out as a call transcript. See spec.md §3 and §6.

use std::fs;
use std::io;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::recorder::SpeechSegment;

/// Calls are identified by the SIP/media library's own call id, carried
/// through as an owned string rather than re-keyed to a UUID.
pub type CallId = String;

/// The three media states a call passes through (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallMediaState {
    Idle,
    Confirmed,
    Disconnected,
}

/// Who produced a transcript line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    Caller,
    System,
}

impl ChatRole {
    /// The lowercase form used when rendering a transcript line as
    /// `role: text` for a dialogue-orchestrator prompt.
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatRole::Caller => "caller",
            ChatRole::System => "system",
        }
    }
}

/// One line of the conversation transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptMessage {
    pub role: ChatRole,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    /// Set once the orchestrator has folded this message into a prompt.
    pub processed: bool,
    pub processed_time: Option<DateTime<Utc>>,
}

impl TranscriptMessage {
    pub fn new(role: ChatRole, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
            timestamp: Utc::now(),
            processed: false,
            processed_time: None,
        }
    }
}

/// An outbound audio playback recorded against the call, for the transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutgoingAudio {
    pub file_path: String,
    pub timestamp: DateTime<Utc>,
}

/// A side-effect recorded against the call (e.g. a transfer, a DTMF
/// capture) — not part of the chat transcript itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallAction {
    pub action_type: String,
    pub details: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

/// The YAML-serializable shape of a finished call, matching the transcript
/// schema named in spec.md §6.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallTranscript {
    pub id: CallId,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration_sec: f64,
    pub chat: Vec<TranscriptMessage>,
    pub actions: Vec<CallAction>,
    pub unprocessed_count: usize,
    pub outgoing_audio_count: usize,
    pub metadata: serde_json::Value,
}

/// Per-call state owned by an [`crate::account::Account`].
pub struct Call {
    pub id: CallId,
    pub remote_uri: String,
    pub created_at: DateTime<Utc>,
    pub answered_at: Option<DateTime<Utc>>,
    pub disconnected_at: Option<DateTime<Utc>>,
    pub media_state: CallMediaState,
    pub chat: Vec<TranscriptMessage>,
    pub segments: Vec<SpeechSegment>,
    pub outgoing_audio: Vec<OutgoingAudio>,
    pub actions: Vec<CallAction>,
    pub metadata: serde_json::Value,
}

impl Call {
    pub fn new(id: CallId, remote_uri: impl Into<String>) -> Self {
        Self {
            id,
            remote_uri: remote_uri.into(),
            created_at: Utc::now(),
            answered_at: None,
            disconnected_at: None,
            media_state: CallMediaState::Idle,
            chat: Vec::new(),
            segments: Vec::new(),
            outgoing_audio: Vec::new(),
            actions: Vec::new(),
            metadata: serde_json::Value::Object(Default::default()),
        }
    }

    pub fn mark_answered(&mut self) {
        self.media_state = CallMediaState::Confirmed;
        self.answered_at = Some(Utc::now());
    }

    pub fn mark_disconnected(&mut self) {
        self.media_state = CallMediaState::Disconnected;
        self.disconnected_at = Some(Utc::now());
    }

    pub fn add_chat_message(&mut self, role: ChatRole, text: impl Into<String>) {
        self.chat.push(TranscriptMessage::new(role, text));
    }

    pub fn add_speech_segment(&mut self, segment: SpeechSegment) {
        self.segments.push(segment);
    }

    pub fn add_outgoing_audio(&mut self, file_path: impl Into<String>) {
        self.outgoing_audio.push(OutgoingAudio {
            file_path: file_path.into(),
            timestamp: Utc::now(),
        });
    }

    pub fn add_action(&mut self, action_type: impl Into<String>, details: serde_json::Value) {
        self.actions.push(CallAction {
            action_type: action_type.into(),
            details,
            timestamp: Utc::now(),
        });
    }

    /// Messages not yet folded into a dialogue-orchestrator prompt, in
    /// chronological order.
    pub fn unprocessed_messages(&self) -> impl Iterator<Item = &TranscriptMessage> {
        self.chat.iter().filter(|m| !m.processed)
    }

    /// Mark every currently-unprocessed message as processed, stamping
    /// `processed_time`. Called once the orchestrator has built a prompt
    /// from them.
    pub fn mark_all_processed(&mut self) {
        let now = Utc::now();
        for msg in self.chat.iter_mut().filter(|m| !m.processed) {
            msg.processed = true;
            msg.processed_time = Some(now);
        }
    }

    /// Seconds elapsed since the call started, up to `disconnected_at` if
    /// the call has ended, otherwise up to now.
    pub fn duration_sec(&self) -> f64 {
        let end = self.disconnected_at.unwrap_or_else(Utc::now);
        (end - self.created_at).num_milliseconds() as f64 / 1000.0
    }

    /// Build the YAML-serializable transcript document for this call.
    pub fn to_transcript(&self) -> CallTranscript {
        CallTranscript {
            id: self.id.clone(),
            start_time: self.created_at,
            end_time: self.disconnected_at,
            duration_sec: self.duration_sec(),
            chat: self.chat.clone(),
            actions: self.actions.clone(),
            unprocessed_count: self.chat.iter().filter(|m| !m.processed).count(),
            outgoing_audio_count: self.outgoing_audio.len(),
            metadata: self.metadata.clone(),
        }
    }

    /// Serialize and write the transcript to `path` as YAML.
    pub fn save_transcript(&self, path: &Path) -> io::Result<()> {
        let transcript = self.to_transcript();
        let yaml = serde_yaml::to_string(&transcript)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        fs::write(path, yaml)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_call_starts_idle_with_no_chat() {
        let call = Call::new("call-1".to_string(), "sip:alice@example.com");
        assert_eq!(call.media_state, CallMediaState::Idle);
        assert!(call.chat.is_empty());
        assert!(call.answered_at.is_none());
    }

    #[test]
    fn mark_answered_transitions_to_confirmed() {
        let mut call = Call::new("call-1".to_string(), "sip:alice@example.com");
        call.mark_answered();
        assert_eq!(call.media_state, CallMediaState::Confirmed);
        assert!(call.answered_at.is_some());
    }

    #[test]
    fn unprocessed_messages_then_mark_all_processed() {
        let mut call = Call::new("call-1".to_string(), "sip:alice@example.com");
        call.add_chat_message(ChatRole::Caller, "hello");
        call.add_chat_message(ChatRole::System, "hi there");
        assert_eq!(call.unprocessed_messages().count(), 2);

        call.mark_all_processed();
        assert_eq!(call.unprocessed_messages().count(), 0);
        assert!(call.chat.iter().all(|m| m.processed_time.is_some()));
    }

    #[test]
    fn to_transcript_reports_unprocessed_and_outgoing_counts() {
        let mut call = Call::new("call-1".to_string(), "sip:alice@example.com");
        call.add_chat_message(ChatRole::Caller, "hello");
        call.add_outgoing_audio("/tmp/reply.wav");

        let transcript = call.to_transcript();
        assert_eq!(transcript.unprocessed_count, 1);
        assert_eq!(transcript.outgoing_audio_count, 1);
        assert_eq!(transcript.id, "call-1");
    }

    #[test]
    fn to_transcript_carries_recorded_actions() {
        let mut call = Call::new("call-1".to_string(), "sip:alice@example.com");
        call.add_action("transfer", serde_json::json!({"target": "sip:bob@example.com"}));

        let transcript = call.to_transcript();
        assert_eq!(transcript.actions.len(), 1);
        assert_eq!(transcript.actions[0].action_type, "transfer");
    }
}
