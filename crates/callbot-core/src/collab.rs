//! The three external collaborator contracts the dialogue orchestrator
//! drives: speech-to-text, a language model, and text-to-speech. All three
//! are explicitly out of scope to implement (spec.md §6) — only the trait
//! boundary lives here, modeled on `client-core`'s
//! `#[async_trait] ClientEventHandler` shape.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;

use crate::error::AgentResult;

/// Converts a segment of raw PCM audio into text.
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, audio: &[u8], sample_rate: u32, sample_width: u8) -> AgentResult<String>;
}

/// Produces a reply from a named prompt template and its template
/// variables. A variable the template references but `variables` doesn't
/// supply is a client-side `AgentError::CollaboratorFailed`, raised before
/// any network call.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn reply(&self, prompt_name: &str, variables: &HashMap<String, String>) -> AgentResult<String>;
}

/// Synthesizes speech audio for a line of text with the given voice/model,
/// returning the path to the WAV file it wrote. The caller owns the file
/// and is responsible for deleting it.
#[async_trait]
pub trait TextToSpeech: Send + Sync {
    async fn synthesize(&self, text: &str, voice: &str, model: &str) -> AgentResult<PathBuf>;
}

/// In-memory collaborator stand-ins used by the scaffolding binary and
/// tests. Not meant for production use — a real deployment supplies its
/// own `Transcriber`/`LanguageModel`/`TextToSpeech`.
pub mod fakes {
    use super::*;

    pub struct EchoTranscriber;

    #[async_trait]
    impl Transcriber for EchoTranscriber {
        async fn transcribe(&self, audio: &[u8], _sample_rate: u32, _sample_width: u8) -> AgentResult<String> {
            Ok(format!("transcript of {} bytes", audio.len()))
        }
    }

    pub struct StaticLanguageModel(pub String);

    #[async_trait]
    impl LanguageModel for StaticLanguageModel {
        async fn reply(&self, _prompt_name: &str, _variables: &HashMap<String, String>) -> AgentResult<String> {
            Ok(self.0.clone())
        }
    }

    pub struct FakeTextToSpeech;

    #[async_trait]
    impl TextToSpeech for FakeTextToSpeech {
        async fn synthesize(&self, text: &str, _voice: &str, _model: &str) -> AgentResult<PathBuf> {
            Ok(PathBuf::from(format!("/tmp/callbot-core-tts-{}.wav", text.len())))
        }
    }
}
