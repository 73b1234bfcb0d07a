//! The `SipLibrary` trait: the contract this crate expects from whatever
//! telephony library (PJSIP-equivalent) provides SIP signalling and media
//! transport, per spec.md §6. Out of scope for this crate itself — only the
//! contract and an in-memory fake for tests live here.

use crate::error::AgentResult;

/// Parameters needed to stand up a SIP endpoint, mirroring the pjsua2
/// `EpConfig`/`AccountConfig` fields exercised in
/// `original_source/sip_manager/sip_manager/agent.py`.
#[derive(Debug, Clone)]
pub struct TransportParams {
    pub bound_address: String,
    pub bound_port: u16,
    pub public_address: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AccountParams {
    pub id_uri: String,
    pub registrar_uri: String,
    pub outbound_proxy: Option<String>,
    pub username: String,
    pub password: String,
    pub register_on_add: bool,
}

/// Inbound notifications the library delivers to the agent. The trait
/// method names mirror the pjsua2 callback surface
/// (`onIncomingCall`/`onCallState`/`onCallMediaState`) translated into an
/// explicit Rust contract.
pub trait SipLibrary: Send + Sync {
    fn lib_create(&self) -> AgentResult<()>;
    fn lib_init(&self) -> AgentResult<()>;
    fn lib_start(&self) -> AgentResult<()>;
    fn lib_destroy(&self) -> AgentResult<()>;

    fn transport_create(&self, params: &TransportParams) -> AgentResult<()>;
    fn account_create(&self, params: &AccountParams) -> AgentResult<String>;

    /// Answer an incoming call with a SIP status code (200 = OK, 180 =
    /// Ringing, etc).
    fn answer(&self, call_id: &str, status_code: u16) -> AgentResult<()>;

    /// Attach a recorder sink to a call's inbound audio media.
    fn attach_recorder(&self, call_id: &str, recorder_path: &str) -> AgentResult<()>;

    /// Attach a player source to a call's outbound audio media.
    fn attach_player(&self, call_id: &str, player_path: &str) -> AgentResult<()>;

    fn detach_media(&self, call_id: &str) -> AgentResult<()>;

    fn set_codec_priority(&self, codec_id: &str, priority: u8) -> AgentResult<()>;

    /// Schedule a one-shot timer, firing after `delay_ms` milliseconds.
    /// Used for the welcome-message delay instead of blocking the calling
    /// thread (see SPEC_FULL.md §4.6's note on `on_pickup`'s blocking sleep).
    fn schedule_timer(&self, delay_ms: u64, timer_id: u32) -> AgentResult<()>;

    /// Drive one iteration of the library's internal event loop and return
    /// whatever callbacks fired during it. Analogous to pjsua2's
    /// `libHandleEvents`, but pull-based rather than callback-based so the
    /// media thread stays the only thread touching library state.
    fn handle_events(&self, timeout_ms: u32) -> AgentResult<Vec<SipLibraryEvent>>;
}

/// Events a [`SipLibrary`] implementation hands back to the agent once
/// `handle_events` has run. Modeled as a pull rather than a push so the
/// media thread stays the only thread touching library state.
#[derive(Debug, Clone)]
pub enum SipLibraryEvent {
    IncomingCall { call_id: String, remote_uri: String },
    CallStateConfirmed { call_id: String },
    CallStateDisconnected { call_id: String },
    TimerFired { timer_id: u32 },
    AccountRegistered { status: String },
}

/// An in-memory [`SipLibrary`] double for tests and the scaffolding binary.
/// Calls and timers are injected via `inject_*` and drained via
/// `handle_events`, so tests can drive the agent deterministically without
/// a real SIP stack.
pub struct FakeSipLibrary {
    events: std::sync::Mutex<std::collections::VecDeque<SipLibraryEvent>>,
}

impl Default for FakeSipLibrary {
    fn default() -> Self {
        Self {
            events: std::sync::Mutex::new(std::collections::VecDeque::new()),
        }
    }
}

impl FakeSipLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inject(&self, event: SipLibraryEvent) {
        self.events.lock().unwrap().push_back(event);
    }

    pub fn drain_events(&self) -> Vec<SipLibraryEvent> {
        self.events.lock().unwrap().drain(..).collect()
    }
}

impl SipLibrary for FakeSipLibrary {
    fn lib_create(&self) -> AgentResult<()> {
        Ok(())
    }

    fn lib_init(&self) -> AgentResult<()> {
        Ok(())
    }

    fn lib_start(&self) -> AgentResult<()> {
        Ok(())
    }

    fn lib_destroy(&self) -> AgentResult<()> {
        Ok(())
    }

    fn transport_create(&self, _params: &TransportParams) -> AgentResult<()> {
        Ok(())
    }

    fn account_create(&self, params: &AccountParams) -> AgentResult<String> {
        Ok(params.id_uri.clone())
    }

    fn answer(&self, _call_id: &str, _status_code: u16) -> AgentResult<()> {
        Ok(())
    }

    fn attach_recorder(&self, _call_id: &str, _recorder_path: &str) -> AgentResult<()> {
        Ok(())
    }

    fn attach_player(&self, _call_id: &str, _player_path: &str) -> AgentResult<()> {
        Ok(())
    }

    fn detach_media(&self, _call_id: &str) -> AgentResult<()> {
        Ok(())
    }

    fn set_codec_priority(&self, _codec_id: &str, _priority: u8) -> AgentResult<()> {
        Ok(())
    }

    fn schedule_timer(&self, _delay_ms: u64, _timer_id: u32) -> AgentResult<()> {
        Ok(())
    }

    fn handle_events(&self, _timeout_ms: u32) -> AgentResult<Vec<SipLibraryEvent>> {
        Ok(self.drain_events())
    }
}
