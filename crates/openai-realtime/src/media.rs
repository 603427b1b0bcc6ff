//! Audio plumbing shared by the negotiator and the capture/playback backends.
//!
//! Audio moves through the session as mono `f32` frames. Captured frames fan
//! out over a broadcast channel so the peer connection and the mix recorder
//! can each consume them independently.

use crate::error::Result;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;

/// Sample rate the mix recorder and the Opus codec work at.
pub const MIX_SAMPLE_RATE: u32 = 48_000;

/// A chunk of mono PCM audio.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl AudioFrame {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Returns this frame's samples at `rate`.
    pub fn resampled(&self, rate: u32) -> Vec<f32> {
        resample_linear(&self.samples, self.sample_rate, rate)
    }
}

/// Grants access to the local microphone.
#[async_trait]
pub trait MediaSource: Send + Sync {
    /// Opens the microphone and starts capturing.
    ///
    /// Fails with `NegotiationError::MediaAccessDenied` when no device is
    /// available or access is refused.
    async fn acquire_microphone(&self) -> Result<Arc<dyn LocalStream>>;
}

/// A live local capture stream.
pub trait LocalStream: Send + Sync {
    /// Subscribes to captured frames from this point on.
    fn subscribe(&self) -> broadcast::Receiver<AudioFrame>;
    /// Stops every track of the stream. Idempotent.
    fn stop(&self);
}

/// Somewhere to play remote audio as it arrives.
pub trait AudioOutput: Send + Sync {
    /// Queues a frame for playback without blocking.
    fn play(&self, frame: &AudioFrame);
}

type StopHook = Box<dyn FnOnce() + Send>;

/// A `LocalStream` fed by a capture backend through a broadcast sender.
pub struct FrameStream {
    frames: broadcast::Sender<AudioFrame>,
    stopped: AtomicBool,
    on_stop: Mutex<Option<StopHook>>,
}

impl FrameStream {
    pub fn new(capacity: usize) -> Self {
        let (frames, _) = broadcast::channel(capacity);
        Self {
            frames,
            stopped: AtomicBool::new(false),
            on_stop: Mutex::new(None),
        }
    }

    /// Creates a stream that runs `hook` the first time it is stopped, e.g. to
    /// release the capture device.
    pub fn with_stop_hook(capacity: usize, hook: impl FnOnce() + Send + 'static) -> Self {
        let stream = Self::new(capacity);
        if let Ok(mut slot) = stream.on_stop.lock() {
            *slot = Some(Box::new(hook));
        }
        stream
    }

    /// The sending half, for the capture backend.
    pub fn sender(&self) -> broadcast::Sender<AudioFrame> {
        self.frames.clone()
    }

    /// Publishes a frame to every subscriber. Frames are dropped once stopped.
    pub fn publish(&self, frame: AudioFrame) {
        if self.is_stopped() {
            return;
        }
        // No subscribers yet is not an error.
        let _ = self.frames.send(frame);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

impl LocalStream for FrameStream {
    fn subscribe(&self) -> broadcast::Receiver<AudioFrame> {
        self.frames.subscribe()
    }

    fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        let hook = self.on_stop.lock().ok().and_then(|mut slot| slot.take());
        if let Some(hook) = hook {
            hook();
        }
        debug!("Local stream stopped");
    }
}

#[derive(Default)]
struct MixState {
    recording: bool,
    local: VecDeque<f32>,
    remote: VecDeque<f32>,
    mixed: VecDeque<f32>,
}

/// Records the local and remote audio mixed into a single track.
///
/// Both inputs are resampled to `MIX_SAMPLE_RATE` and summed sample by sample.
/// When one side falls more than a second behind, the other side is mixed
/// against silence. Only the most recent `capacity` mixed samples are kept.
pub struct MixRecorder {
    state: Mutex<MixState>,
    capacity: usize,
}

impl MixRecorder {
    /// One minute of mixed audio.
    pub const DEFAULT_CAPACITY: usize = MIX_SAMPLE_RATE as usize * 60;
    const MAX_SKEW: usize = MIX_SAMPLE_RATE as usize;

    pub fn new() -> Self {
        Self::with_capacity(Self::DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            state: Mutex::new(MixState::default()),
            capacity,
        }
    }

    pub fn start(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.recording = true;
        }
    }

    pub fn stop(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.recording = false;
            state.local.clear();
            state.remote.clear();
        }
    }

    pub fn is_recording(&self) -> bool {
        self.state.lock().map(|s| s.recording).unwrap_or(false)
    }

    pub fn push_local(&self, frame: &AudioFrame) {
        self.push(frame, true);
    }

    pub fn push_remote(&self, frame: &AudioFrame) {
        self.push(frame, false);
    }

    /// Number of mixed samples currently held.
    pub fn recorded_len(&self) -> usize {
        self.state.lock().map(|s| s.mixed.len()).unwrap_or(0)
    }

    /// A copy of the mixed samples currently held.
    pub fn snapshot(&self) -> Vec<f32> {
        self.state
            .lock()
            .map(|s| s.mixed.iter().copied().collect())
            .unwrap_or_default()
    }

    fn push(&self, frame: &AudioFrame, local: bool) {
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        if !state.recording {
            return;
        }
        let samples = frame.resampled(MIX_SAMPLE_RATE);
        if local {
            state.local.extend(samples);
        } else {
            state.remote.extend(samples);
        }
        self.mix(&mut state);
    }

    fn mix(&self, state: &mut MixState) {
        let MixState {
            local,
            remote,
            mixed,
            ..
        } = state;

        while let (Some(a), Some(b)) = (local.front().copied(), remote.front().copied()) {
            local.pop_front();
            remote.pop_front();
            mixed.push_back((a + b).clamp(-1.0, 1.0));
        }
        for lagging in [&mut *local, &mut *remote] {
            while lagging.len() > Self::MAX_SKEW {
                if let Some(sample) = lagging.pop_front() {
                    mixed.push_back(sample);
                }
            }
        }
        while mixed.len() > self.capacity {
            mixed.pop_front();
        }
    }
}

impl Default for MixRecorder {
    fn default() -> Self {
        Self::new()
    }
}

/// Converts interleaved multi-channel audio to mono by averaging channels.
pub fn to_mono(data: &[f32], channels: u16) -> Vec<f32> {
    if channels <= 1 {
        return data.to_vec();
    }
    let ch = channels as usize;
    data.chunks_exact(ch)
        .map(|frame| frame.iter().sum::<f32>() / ch as f32)
        .collect()
}

/// Linear-interpolation resampler, adequate for speech.
pub fn resample_linear(samples: &[f32], src_rate: u32, dst_rate: u32) -> Vec<f32> {
    if src_rate == dst_rate || samples.is_empty() || src_rate == 0 || dst_rate == 0 {
        return samples.to_vec();
    }

    let ratio = src_rate as f64 / dst_rate as f64;
    let out_len = ((samples.len() as f64) / ratio).round() as usize;
    let last = samples.len() - 1;
    (0..out_len)
        .map(|i| {
            let pos = i as f64 * ratio;
            let idx = (pos.floor() as usize).min(last);
            let next = (idx + 1).min(last);
            let frac = (pos - idx as f64) as f32;
            samples[idx] * (1.0 - frac) + samples[next] * frac
        })
        .collect()
}
