//! Per-call playback: tracks a single in-flight WAV playback, superseding
//! any prior one. See spec.md §4.5.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::error::{AgentError, AgentResult};
use crate::wavfile;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState {
    Idle,
    Playing,
}

/// A single call's playback slot. Starting a new playback while one is
/// already active supersedes it (spec.md §4.5: "starting a new playback on
/// a call already playing stops the prior one first").
pub struct Player {
    state: PlayerState,
    current_path: Option<PathBuf>,
    started_at: Option<Instant>,
    duration: Duration,
    sample_rate: u32,
    sample_width: u16,
}

impl Player {
    pub fn new(sample_rate: u32, sample_width: u16) -> Self {
        Self {
            state: PlayerState::Idle,
            current_path: None,
            started_at: None,
            duration: Duration::ZERO,
            sample_rate,
            sample_width,
        }
    }

    pub fn state(&self) -> PlayerState {
        self.state
    }

    pub fn current_path(&self) -> Option<&Path> {
        self.current_path.as_deref()
    }

    /// The duration of the current (or most recently started) playback, in
    /// seconds.
    pub fn duration_secs(&self) -> f64 {
        self.duration.as_secs_f64()
    }

    /// Begin playing `path` at `now`. Returns the prior path if one was
    /// superseded, so the caller can emit `AudioEnded` for it before
    /// emitting `AudioPlaying` for the new one.
    pub fn play(&mut self, path: PathBuf, now: Instant) -> AgentResult<Option<PathBuf>> {
        if !path.exists() {
            return Err(AgentError::FileNotFound(path.display().to_string()));
        }

        let duration_secs = wavfile::duration_seconds(&path, self.sample_rate, self.sample_width)
            .map_err(|e| AgentError::FileNotFound(format!("{}: {}", path.display(), e)))?;

        let superseded = if self.state == PlayerState::Playing {
            self.current_path.take()
        } else {
            None
        };

        self.state = PlayerState::Playing;
        self.current_path = Some(path);
        self.started_at = Some(now);
        self.duration = Duration::from_secs_f64(duration_secs.max(0.0));

        Ok(superseded)
    }

    /// Stop playback unconditionally (e.g. on call disconnect).
    pub fn stop(&mut self) -> Option<PathBuf> {
        self.state = PlayerState::Idle;
        self.started_at = None;
        self.current_path.take()
    }

    /// Advance playback state at `now`. Returns the path of a playback that
    /// just finished naturally, if any.
    pub fn tick(&mut self, now: Instant) -> Option<PathBuf> {
        if self.state != PlayerState::Playing {
            return None;
        }
        let started_at = self.started_at?;
        if now.saturating_duration_since(started_at) >= self.duration {
            self.state = PlayerState::Idle;
            self.started_at = None;
            return self.current_path.take();
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn wav_fixture(path: &Path, seconds: f64) {
        let samples = (8000.0 * seconds) as usize;
        let pcm = vec![0u8; samples * 2];
        wavfile::write_wav(path, &pcm, 8000, 2).unwrap();
    }

    #[test]
    fn play_missing_file_fails() {
        let mut player = Player::new(8000, 2);
        let result = player.play(PathBuf::from("/tmp/callbot-core-player-missing.wav"), Instant::now());
        assert!(matches!(result, Err(AgentError::FileNotFound(_))));
    }

    #[test]
    fn play_then_tick_completes_after_duration() {
        let path = PathBuf::from("/tmp/callbot-core-player-short.wav");
        wav_fixture(&path, 0.1);

        let mut player = Player::new(8000, 2);
        let t0 = Instant::now();
        player.play(path.clone(), t0).unwrap();
        assert_eq!(player.state(), PlayerState::Playing);

        assert!(player.tick(t0 + Duration::from_millis(50)).is_none());
        let finished = player.tick(t0 + Duration::from_millis(150));
        assert_eq!(finished, Some(path.clone()));
        assert_eq!(player.state(), PlayerState::Idle);

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn second_play_supersedes_first() {
        let path1 = PathBuf::from("/tmp/callbot-core-player-first.wav");
        let path2 = PathBuf::from("/tmp/callbot-core-player-second.wav");
        wav_fixture(&path1, 5.0);
        wav_fixture(&path2, 5.0);

        let mut player = Player::new(8000, 2);
        let t0 = Instant::now();
        player.play(path1.clone(), t0).unwrap();

        let superseded = player.play(path2.clone(), t0 + Duration::from_millis(10)).unwrap();
        assert_eq!(superseded, Some(path1.clone()));
        assert_eq!(player.current_path(), Some(path2.as_path()));

        let _ = fs::remove_file(&path1);
        let _ = fs::remove_file(&path2);
    }
}
