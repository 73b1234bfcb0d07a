//! Thin scaffolding binary: loads configuration, wires a [`FakeSipLibrary`]
//! (no real PJSIP-equivalent ships with this crate, per spec.md §6), starts
//! the agent non-blocking, and runs until interrupted.
//!
//! Not a reimplementation of the operator recordings CLI spec.md marks as
//! out of scope — this exists only to exercise the crate end to end.

use std::env;
use std::sync::Arc;

use callbot_core::agent::{Agent, AgentConfig};
use callbot_core::collab::fakes::{EchoTranscriber, FakeTextToSpeech, StaticLanguageModel};
use callbot_core::logging::{init_logging, LoggingConfig};
use callbot_core::orchestrator::DialogueOrchestrator;
use callbot_core::sip::FakeSipLibrary;

fn main() {
    init_logging(LoggingConfig::default());

    let config = match env::args().nth(1) {
        Some(path) => AgentConfig::from_file(std::path::Path::new(&path)).unwrap_or_else(|e| {
            tracing::error!(error = %e, "failed to load config, falling back to defaults");
            AgentConfig::default()
        }),
        None => AgentConfig::default(),
    };

    let agent = Arc::new(Agent::new(config));
    let sip = Arc::new(FakeSipLibrary::new());

    let sample_rate = agent.config().sample_rate;
    let sample_width = agent.config().sample_width as u8;
    let tts_voice = agent.config().tts_voice.clone();
    let tts_model = agent.config().tts_model.clone();

    let orchestrator = DialogueOrchestrator::new(
        Arc::new(EchoTranscriber),
        Arc::new(StaticLanguageModel("Thanks for calling, how can I help?".to_string())),
        Arc::new(FakeTextToSpeech),
        agent.account(),
        agent.command_sender(),
        sample_rate,
        sample_width,
        tts_voice,
        tts_model,
    )
    .expect("failed to build dialogue orchestrator runtime");
    Arc::new(orchestrator).attach(&agent.event_bus());

    if let Err(err) = agent.clone().start_nonblocking(sip) {
        tracing::error!(error = %err, "agent failed to start");
        std::process::exit(1);
    }

    tracing::info!("agent running, press ctrl-c to stop");
    let _ = ctrlc_placeholder();
    let _ = agent.stop();
}

/// Blocks until the process receives an interrupt. This crate doesn't pull
/// in `ctrlc` since the scaffolding binary isn't part of the core contract;
/// `std::thread::park` parks forever and relies on the OS delivering
/// SIGINT/SIGTERM to actually terminate the process.
fn ctrlc_placeholder() -> std::io::Result<()> {
    std::thread::park();
    Ok(())
}
