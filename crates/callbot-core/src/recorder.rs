//! Per-call recorder: a PCM sink paired with a silence-based speech
//! segmentation state machine. See spec.md §4.4.
//!
//! The segmenter is driven by `poll`, called from the media thread on every
//! tick. It never reads the clock itself beyond what's passed in, so tests
//! can drive it deterministically with synthetic instants.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::audio::rms_of_tail;
use crate::error::{AgentError, AgentResult};

/// Minimum spacing between amplitude analyses, matching
/// `original_source`'s `check_for_silence` 0.5s gate.
pub const MIN_ANALYSIS_SPACING: Duration = Duration::from_millis(500);

/// Default poll interval the media thread uses for recorder ticks.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Minimum file size before the IDLE state will even consider a loud
/// reading, matching `original_source`'s `check_for_silence`
/// `if current_size > 10000` warm-up gate. Without it a few loud bytes at
/// the very start of a recording (codec priming, line noise) would open a
/// speech segment before there's enough audio to call it speech.
pub const WARMUP_BYTES: u64 = 10_000;

/// One completed utterance: the byte range in the recording file spanned by
/// continuous speech, and its millisecond offsets for convenience.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeechSegment {
    pub start_ms: u64,
    pub end_ms: u64,
    pub start_byte: u64,
    pub end_byte: u64,
}

/// What a single `poll` tick observed, if anything notable happened.
#[derive(Debug, Clone)]
pub enum RecorderEvent {
    /// The segmenter just left `Idle` or `InSilence` for `InSpeech`.
    SpeechDetected { start_ms: u64 },
    /// An utterance closed out.
    SegmentComplete(SpeechSegment),
}

/// Internal segmenter mode. `InSilencePending` is a hysteresis sub-state of
/// the IN_SPEECH -> IN_SILENCE transition (spec.md §4.4); no event marks
/// entry to it, only the eventual settle into `InSilence` or bounce back to
/// `InSpeech`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmenterState {
    Idle,
    InSpeech,
    InSilencePending,
    InSilence,
}

#[derive(Debug, Clone)]
pub struct RecorderConfig {
    pub sample_rate: u32,
    pub sample_width: u8,
    pub silence_threshold: f64,
    pub silence_duration_ms: u64,
    pub analysis_window_seconds: f64,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            sample_rate: 8000,
            sample_width: 2,
            silence_threshold: 500.0,
            silence_duration_ms: 1500,
            analysis_window_seconds: 1.0,
        }
    }
}

/// A PCM recorder for a single call, carrying the silence-segmentation
/// state machine over the bytes it has written so far.
pub struct Recorder {
    path: PathBuf,
    file: Option<File>,
    config: RecorderConfig,
    state: SegmenterState,
    paused: bool,
    started_at: Option<Instant>,
    last_analysis_at: Option<Instant>,
    bytes_written: u64,
    speech_start_ms: Option<u64>,
    speech_start_byte: Option<u64>,
    silence_start_ms: Option<u64>,
    segments: Vec<SpeechSegment>,
}

impl Recorder {
    pub fn new(path: PathBuf, config: RecorderConfig) -> Self {
        Self {
            path,
            file: None,
            config,
            state: SegmenterState::Idle,
            paused: false,
            started_at: None,
            last_analysis_at: None,
            bytes_written: 0,
            speech_start_ms: None,
            speech_start_byte: None,
            silence_start_ms: None,
            segments: Vec::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn state(&self) -> SegmenterState {
        self.state
    }

    pub fn segments(&self) -> &[SpeechSegment] {
        &self.segments
    }

    /// Create the output file and begin accepting writes. `now` anchors the
    /// recorder's relative millisecond clock.
    pub fn start(&mut self, now: Instant) -> io::Result<()> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&self.path)?;
        self.file = Some(file);
        self.state = SegmenterState::Idle;
        self.paused = false;
        self.started_at = Some(now);
        self.last_analysis_at = None;
        self.bytes_written = 0;
        self.speech_start_ms = None;
        self.speech_start_byte = None;
        self.silence_start_ms = None;
        self.segments.clear();
        Ok(())
    }

    /// Stop accepting writes without resetting accumulated segments; the
    /// underlying analysis still reads from the file on disk.
    pub fn pause(&mut self) {
        self.paused = true;
    }

    pub fn resume(&mut self) {
        self.paused = false;
    }

    /// Finalize the recording. If currently mid-utterance, the in-progress
    /// segment is closed out at the current write position.
    pub fn stop(&mut self, now: Instant) {
        if self.state == SegmenterState::InSpeech || self.state == SegmenterState::InSilencePending
        {
            self.close_segment(self.elapsed_ms(now));
        }
        self.state = SegmenterState::Idle;
        self.file = None;
    }

    /// Append raw PCM bytes to the recording. No-op while paused.
    pub fn write(&mut self, data: &[u8]) -> io::Result<()> {
        if self.paused {
            return Ok(());
        }
        if let Some(file) = self.file.as_mut() {
            file.write_all(data)?;
            file.flush()?;
            self.bytes_written += data.len() as u64;
        }
        Ok(())
    }

    fn elapsed_ms(&self, now: Instant) -> u64 {
        self.started_at
            .map(|start| now.saturating_duration_since(start).as_millis() as u64)
            .unwrap_or(0)
    }

    /// Seconds elapsed since `start`, for duration fields on lifecycle events.
    pub fn elapsed_seconds(&self, now: Instant) -> f64 {
        self.elapsed_ms(now) as f64 / 1000.0
    }

    fn ms_to_byte(&self, ms: u64) -> u64 {
        (ms as u128 * self.config.sample_rate as u128 * self.config.sample_width as u128 / 1000)
            as u64
    }

    /// Close out the in-progress utterance at `end_ms`, returning it if one
    /// was open.
    fn close_segment(&mut self, end_ms: u64) -> Option<SpeechSegment> {
        let segment = match (self.speech_start_ms, self.speech_start_byte) {
            (Some(start_ms), Some(start_byte)) => {
                let end_byte = self.bytes_written.min(self.ms_to_byte(end_ms)).max(start_byte);
                let segment = SpeechSegment {
                    start_ms,
                    end_ms,
                    start_byte,
                    end_byte,
                };
                self.segments.push(segment.clone());
                Some(segment)
            }
            _ => None,
        };
        self.speech_start_ms = None;
        self.speech_start_byte = None;
        self.silence_start_ms = None;
        segment
    }

    /// Advance the segmenter by one tick. Returns whatever notable
    /// transition this tick's analysis produced: speech just starting, or a
    /// completed segment.
    ///
    /// Respects the minimum inter-analysis spacing: a call before the
    /// previous analysis is `MIN_ANALYSIS_SPACING` old is a no-op.
    pub fn poll(&mut self, now: Instant) -> AgentResult<Option<RecorderEvent>> {
        if self.paused || self.file.is_none() {
            return Ok(None);
        }
        if let Some(last) = self.last_analysis_at {
            if now.saturating_duration_since(last) < MIN_ANALYSIS_SPACING {
                return Ok(None);
            }
        }
        self.last_analysis_at = Some(now);

        let rms = rms_of_tail(
            &self.path,
            self.config.sample_rate,
            self.config.sample_width,
            self.config.analysis_window_seconds,
        );
        let elapsed = self.elapsed_ms(now);
        let is_loud = rms >= self.config.silence_threshold;

        match self.state {
            SegmenterState::Idle => {
                if is_loud && self.bytes_written >= WARMUP_BYTES {
                    self.state = SegmenterState::InSpeech;
                    self.speech_start_ms = Some(elapsed);
                    self.speech_start_byte = Some(self.bytes_written);
                    return Ok(Some(RecorderEvent::SpeechDetected { start_ms: elapsed }));
                }
                Ok(None)
            }
            SegmenterState::InSpeech => {
                if !is_loud {
                    self.state = SegmenterState::InSilencePending;
                    self.silence_start_ms = Some(elapsed);
                }
                Ok(None)
            }
            SegmenterState::InSilencePending => {
                if is_loud {
                    // false alarm: back to speech, keep the original start
                    self.state = SegmenterState::InSpeech;
                    self.silence_start_ms = None;
                    return Ok(None);
                }
                let silence_start = self
                    .silence_start_ms
                    .ok_or_else(|| AgentError::CollaboratorFailed("missing silence start".into()))?;
                if elapsed.saturating_sub(silence_start) >= self.config.silence_duration_ms {
                    self.state = SegmenterState::InSilence;
                    let segment_end = silence_start;
                    return Ok(self.close_segment(segment_end).map(RecorderEvent::SegmentComplete));
                }
                Ok(None)
            }
            SegmenterState::InSilence => {
                if is_loud {
                    self.state = SegmenterState::InSpeech;
                    self.speech_start_ms = Some(elapsed);
                    self.speech_start_byte = Some(self.bytes_written);
                    return Ok(Some(RecorderEvent::SpeechDetected { start_ms: elapsed }));
                }
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn silence_bytes(ms: u64, cfg: &RecorderConfig) -> Vec<u8> {
        let samples = (ms * cfg.sample_rate as u64 / 1000) as usize;
        vec![0u8; samples * cfg.sample_width as usize]
    }

    fn loud_bytes(ms: u64, cfg: &RecorderConfig) -> Vec<u8> {
        let samples = (ms * cfg.sample_rate as u64 / 1000) as usize;
        let mut out = Vec::with_capacity(samples * 2);
        for _ in 0..samples {
            out.extend_from_slice(&3000i16.to_le_bytes());
        }
        out
    }

    #[test]
    fn idle_stays_idle_on_silence() {
        let path = PathBuf::from("/tmp/callbot-core-recorder-idle.pcm");
        let cfg = RecorderConfig::default();
        let mut rec = Recorder::new(path.clone(), cfg.clone());
        let t0 = Instant::now();
        rec.start(t0).unwrap();
        rec.write(&silence_bytes(1000, &cfg)).unwrap();
        let result = rec.poll(t0 + Duration::from_millis(600)).unwrap();
        assert!(result.is_none());
        assert_eq!(rec.state(), SegmenterState::Idle);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn speech_then_silence_produces_segment() {
        let path = PathBuf::from("/tmp/callbot-core-recorder-segment.pcm");
        let cfg = RecorderConfig::default();
        let mut rec = Recorder::new(path.clone(), cfg.clone());
        let t0 = Instant::now();
        rec.start(t0).unwrap();

        rec.write(&loud_bytes(1000, &cfg)).unwrap();
        let t1 = t0 + Duration::from_millis(600);
        assert!(matches!(
            rec.poll(t1).unwrap(),
            Some(RecorderEvent::SpeechDetected { .. })
        ));
        assert_eq!(rec.state(), SegmenterState::InSpeech);

        rec.write(&silence_bytes(2000, &cfg)).unwrap();
        let t2 = t1 + Duration::from_millis(600);
        assert!(rec.poll(t2).unwrap().is_none());
        assert_eq!(rec.state(), SegmenterState::InSilencePending);

        let t3 = t2 + Duration::from_millis(1600);
        let event = rec.poll(t3).unwrap();
        assert!(matches!(event, Some(RecorderEvent::SegmentComplete(_))));
        assert_eq!(rec.state(), SegmenterState::InSilence);

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn loud_audio_under_warmup_size_stays_idle() {
        let path = PathBuf::from("/tmp/callbot-core-recorder-warmup.pcm");
        let cfg = RecorderConfig::default();
        let mut rec = Recorder::new(path.clone(), cfg.clone());
        let t0 = Instant::now();
        rec.start(t0).unwrap();

        // 200ms @ 8000Hz/16-bit is 3200 bytes, well under WARMUP_BYTES.
        rec.write(&loud_bytes(200, &cfg)).unwrap();
        let result = rec.poll(t0 + Duration::from_millis(600)).unwrap();
        assert!(result.is_none());
        assert_eq!(rec.state(), SegmenterState::Idle);

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn brief_silence_bounces_back_to_speech() {
        let path = PathBuf::from("/tmp/callbot-core-recorder-falsealarm.pcm");
        let cfg = RecorderConfig::default();
        let mut rec = Recorder::new(path.clone(), cfg.clone());
        let t0 = Instant::now();
        rec.start(t0).unwrap();

        rec.write(&loud_bytes(1000, &cfg)).unwrap();
        let t1 = t0 + Duration::from_millis(600);
        rec.poll(t1).unwrap();
        assert_eq!(rec.state(), SegmenterState::InSpeech);

        rec.write(&silence_bytes(200, &cfg)).unwrap();
        let t2 = t1 + Duration::from_millis(600);
        rec.poll(t2).unwrap();
        assert_eq!(rec.state(), SegmenterState::InSilencePending);

        rec.write(&loud_bytes(500, &cfg)).unwrap();
        let t3 = t2 + Duration::from_millis(600);
        rec.poll(t3).unwrap();
        assert_eq!(rec.state(), SegmenterState::InSpeech);

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn poll_respects_minimum_analysis_spacing() {
        let path = PathBuf::from("/tmp/callbot-core-recorder-spacing.pcm");
        let cfg = RecorderConfig::default();
        let mut rec = Recorder::new(path.clone(), cfg.clone());
        let t0 = Instant::now();
        rec.start(t0).unwrap();
        rec.write(&loud_bytes(1000, &cfg)).unwrap();

        rec.poll(t0 + Duration::from_millis(600)).unwrap();
        assert_eq!(rec.state(), SegmenterState::InSpeech);

        rec.write(&silence_bytes(2000, &cfg)).unwrap();
        // too soon after the last analysis - should be a no-op
        rec.poll(t0 + Duration::from_millis(700)).unwrap();
        assert_eq!(rec.state(), SegmenterState::InSpeech);

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn paused_recorder_does_not_write_or_poll() {
        let path = PathBuf::from("/tmp/callbot-core-recorder-paused.pcm");
        let cfg = RecorderConfig::default();
        let mut rec = Recorder::new(path.clone(), cfg.clone());
        let t0 = Instant::now();
        rec.start(t0).unwrap();
        rec.pause();
        rec.write(&loud_bytes(1000, &cfg)).unwrap();
        assert!(rec.poll(t0 + Duration::from_millis(600)).unwrap().is_none());
        assert_eq!(rec.state(), SegmenterState::Idle);
        let _ = fs::remove_file(&path);
    }
}
