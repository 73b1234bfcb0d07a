//! Call-lifecycle engine for a voice-AI telephony agent.
//!
//! A [`agent::Agent`] drives a single dedicated media thread that owns a
//! [`sip::SipLibrary`], per-call [`recorder::Recorder`]s and
//! [`player::Player`]s. Other threads talk to it only through the
//! [`events::EventBus`] (read) and [`command::Command`] queue (write); the
//! [`orchestrator::DialogueOrchestrator`] is the one component that bridges
//! the two, driving external transcription/LLM/TTS collaborators on its own
//! tokio runtime.

pub mod account;
pub mod agent;
pub mod audio;
pub mod call;
pub mod collab;
pub mod command;
pub mod config_load;
pub mod error;
pub mod events;
pub mod logging;
pub mod orchestrator;
pub mod player;
pub mod recorder;
pub mod sip;
pub mod wavfile;

pub use account::Account;
pub use agent::{Agent, AgentConfig, ConfigBuilder};
pub use call::{Call, CallId};
pub use error::{AgentError, AgentResult};
pub use events::{Event, EventBus, EventTag};
pub use orchestrator::DialogueOrchestrator;
