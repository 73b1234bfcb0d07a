//! The registered SIP account: owns the table of in-progress calls and
//! routes outbound playback requests onto the command queue. See spec.md
//! §4.6 and `original_source/sip_manager/sip_manager/account.py`.

use std::sync::{Arc, Mutex};

use dashmap::DashMap;

use crate::call::{Call, CallId};
use crate::command::{Command, CommandSender};
use crate::error::{AgentError, AgentResult};

/// Owns every call currently known to this agent. Calls are removed once
/// disconnected and their transcript has been persisted.
pub struct Account {
    pub id_uri: String,
    calls: DashMap<CallId, Arc<Mutex<Call>>>,
    commands: CommandSender,
}

impl Account {
    pub fn new(id_uri: impl Into<String>, commands: CommandSender) -> Self {
        Self {
            id_uri: id_uri.into(),
            calls: DashMap::new(),
            commands,
        }
    }

    /// Record a freshly-arrived call. The SIP library answers immediately
    /// with 200 OK (no 180 Ringing stage — see DESIGN.md's Open Question
    /// decisions), matching `onIncomingCall`'s immediate-answer behaviour.
    pub fn on_incoming_call(&self, call_id: CallId, remote_uri: impl Into<String>) -> Arc<Mutex<Call>> {
        let call = Arc::new(Mutex::new(Call::new(call_id.clone(), remote_uri)));
        self.calls.insert(call_id, call.clone());
        call
    }

    pub fn get_call(&self, call_id: &str) -> Option<Arc<Mutex<Call>>> {
        self.calls.get(call_id).map(|entry| entry.value().clone())
    }

    /// Drop a call from the table, returning it so the caller (typically
    /// the agent, on disconnect) can persist its transcript first.
    pub fn remove_call(&self, call_id: &str) -> Option<Arc<Mutex<Call>>> {
        self.calls.remove(call_id).map(|(_, call)| call)
    }

    pub fn call_ids(&self) -> Vec<CallId> {
        self.calls.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn call_count(&self) -> usize {
        self.calls.len()
    }

    /// Enqueue a WAV playback for `call_id` (or, if `None`, the sole active
    /// call — matching `AudioPlayer.play_wav_to_call`'s `account.calls[0]`
    /// fallback when no explicit call is named). Never blocks: the actual
    /// playback runs on the media thread once it drains this command.
    pub fn play_wav_to_call(
        &self,
        file_path: impl Into<String>,
        call_id: Option<CallId>,
    ) -> AgentResult<()> {
        let target = match call_id {
            Some(id) => id,
            None => {
                let ids = self.call_ids();
                ids.into_iter()
                    .next()
                    .ok_or_else(|| AgentError::CallNotReady("no active call".into()))?
            }
        };
        self.commands.submit(Command::PlayWav {
            call_id: target,
            file_path: file_path.into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::command_queue;

    #[test]
    fn incoming_call_is_tracked() {
        let (tx, _rx) = command_queue();
        let account = Account::new("sip:agent@example.com", tx);
        account.on_incoming_call("call-1".to_string(), "sip:bob@example.com");
        assert_eq!(account.call_count(), 1);
        assert!(account.get_call("call-1").is_some());
    }

    #[test]
    fn play_wav_with_no_calls_fails() {
        let (tx, _rx) = command_queue();
        let account = Account::new("sip:agent@example.com", tx);
        let result = account.play_wav_to_call("/tmp/reply.wav", None);
        assert!(matches!(result, Err(AgentError::CallNotReady(_))));
    }

    #[test]
    fn play_wav_falls_back_to_sole_active_call() {
        let (tx, rx) = command_queue();
        let account = Account::new("sip:agent@example.com", tx);
        account.on_incoming_call("call-1".to_string(), "sip:bob@example.com");

        account.play_wav_to_call("/tmp/reply.wav", None).unwrap();
        let drained = rx.drain(8);
        assert_eq!(drained.len(), 1);
        match &drained[0] {
            Command::PlayWav { call_id, .. } => assert_eq!(call_id, "call-1"),
        }
    }

    #[test]
    fn remove_call_takes_it_out_of_the_table() {
        let (tx, _rx) = command_queue();
        let account = Account::new("sip:agent@example.com", tx);
        account.on_incoming_call("call-1".to_string(), "sip:bob@example.com");
        assert!(account.remove_call("call-1").is_some());
        assert_eq!(account.call_count(), 0);
    }
}
