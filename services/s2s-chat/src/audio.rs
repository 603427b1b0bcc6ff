//! Local audio devices.
//!
//! With the `native-audio` feature the microphone and speaker are opened with
//! `cpal`. Its streams are not `Send`, so each one lives on a dedicated thread
//! that holds it until told to stop.

use openai_realtime::{AudioFrame, AudioOutput};
use tracing::trace;

/// Discards remote audio. Used when no output device can be opened.
#[derive(Debug, Default)]
pub struct NullOutput;

impl AudioOutput for NullOutput {
    fn play(&self, frame: &AudioFrame) {
        trace!(samples = frame.samples.len(), "Discarding remote audio");
    }
}

#[cfg(feature = "native-audio")]
pub use native::{CpalMicrophone, CpalSpeaker};

#[cfg(not(feature = "native-audio"))]
pub use silent::SilentMicrophone;

#[cfg(feature = "native-audio")]
mod native {
    use async_trait::async_trait;
    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
    use openai_realtime::media::to_mono;
    use openai_realtime::{
        AudioFrame, AudioOutput, FrameStream, LocalStream, MediaSource, NegotiationError,
    };
    use ringbuf::HeapRb;
    use ringbuf::traits::{Consumer, Producer, Split};
    use std::sync::{Arc, Mutex, mpsc};
    use tokio::sync::{broadcast, oneshot};
    use tracing::{debug, error, info};

    const CAPTURE_QUEUE: usize = 64;
    /// Two seconds of buffered playback at 48kHz.
    const PLAYBACK_BUFFER: usize = 96_000;

    /// The default input device.
    #[derive(Debug, Default)]
    pub struct CpalMicrophone;

    #[async_trait]
    impl MediaSource for CpalMicrophone {
        async fn acquire_microphone(&self) -> openai_realtime::Result<Arc<dyn LocalStream>> {
            let (stop_tx, stop_rx) = mpsc::channel::<()>();
            let stream = Arc::new(FrameStream::with_stop_hook(CAPTURE_QUEUE, move || {
                let _ = stop_tx.send(());
            }));
            let frames = stream.sender();
            let (ready_tx, ready_rx) = oneshot::channel();

            std::thread::Builder::new()
                .name("mic-capture".to_string())
                .spawn(move || {
                    let input = match open_input(frames) {
                        Ok(input) => input,
                        Err(e) => {
                            let _ = ready_tx.send(Err(e));
                            return;
                        }
                    };
                    let _ = ready_tx.send(Ok(()));
                    // Returns on stop, or when the stream is dropped.
                    let _ = stop_rx.recv();
                    drop(input);
                    info!("Audio capture stopped");
                })
                .map_err(|e| NegotiationError::MediaAccessDenied(e.to_string()))?;

            ready_rx.await.map_err(|_| {
                NegotiationError::MediaAccessDenied("capture thread exited".to_string())
            })??;
            Ok(stream as Arc<dyn LocalStream>)
        }
    }

    fn open_input(
        frames: broadcast::Sender<AudioFrame>,
    ) -> openai_realtime::Result<cpal::Stream> {
        let denied = |what: &str, e: &dyn std::fmt::Display| {
            NegotiationError::MediaAccessDenied(format!("{what}: {e}"))
        };

        let host = cpal::default_host();
        let device = host.default_input_device().ok_or_else(|| {
            NegotiationError::MediaAccessDenied("no default input device".to_string())
        })?;
        let device_name = device.name().unwrap_or_else(|_| "<unknown>".into());
        let config = device
            .default_input_config()
            .map_err(|e| denied("no default input config", &e))?
            .config();
        let rate = config.sample_rate.0;
        let channels = config.channels;
        info!(device = %device_name, rate, channels, "Opening microphone");

        let stream = device
            .build_input_stream(
                &config,
                move |data: &[f32], _info: &cpal::InputCallbackInfo| {
                    // No subscribers is fine.
                    let _ = frames.send(AudioFrame::new(to_mono(data, channels), rate));
                },
                move |err| {
                    error!("audio input stream error: {err}");
                },
                None,
            )
            .map_err(|e| denied("failed to build input stream", &e))?;
        stream
            .play()
            .map_err(|e| denied("failed to start input stream", &e))?;
        Ok(stream)
    }

    /// The default output device, fed through a ring buffer.
    pub struct CpalSpeaker {
        producer: Mutex<ringbuf::HeapProd<f32>>,
        sample_rate: u32,
        // Dropping this ends the playback thread.
        _stop: mpsc::Sender<()>,
    }

    impl CpalSpeaker {
        pub fn open() -> anyhow::Result<Self> {
            let (producer, consumer) = HeapRb::<f32>::new(PLAYBACK_BUFFER).split();
            let (stop_tx, stop_rx) = mpsc::channel::<()>();
            let (ready_tx, ready_rx) = mpsc::sync_channel(1);

            std::thread::Builder::new()
                .name("speaker".to_string())
                .spawn(move || {
                    let output = match open_output(consumer) {
                        Ok((output, rate)) => {
                            let _ = ready_tx.send(Ok(rate));
                            output
                        }
                        Err(e) => {
                            let _ = ready_tx.send(Err(e));
                            return;
                        }
                    };
                    let _ = stop_rx.recv();
                    drop(output);
                    debug!("Audio playback stopped");
                })?;

            let sample_rate = ready_rx
                .recv()
                .map_err(|_| anyhow::anyhow!("playback thread exited"))??;
            Ok(Self {
                producer: Mutex::new(producer),
                sample_rate,
                _stop: stop_tx,
            })
        }
    }

    impl AudioOutput for CpalSpeaker {
        fn play(&self, frame: &AudioFrame) {
            let samples = frame.resampled(self.sample_rate);
            let Ok(mut producer) = self.producer.lock() else {
                return;
            };
            let pushed = producer.push_slice(&samples);
            if pushed < samples.len() {
                debug!(dropped = samples.len() - pushed, "Playback buffer full");
            }
        }
    }

    fn open_output(
        mut consumer: ringbuf::HeapCons<f32>,
    ) -> anyhow::Result<(cpal::Stream, u32)> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| anyhow::anyhow!("no default output device"))?;
        let device_name = device.name().unwrap_or_else(|_| "<unknown>".into());
        let config = device.default_output_config()?.config();
        let rate = config.sample_rate.0;
        let channels = config.channels as usize;
        info!(device = %device_name, rate, channels, "Opening speaker");

        let stream = device.build_output_stream(
            &config,
            move |data: &mut [f32], _info: &cpal::OutputCallbackInfo| {
                for frame in data.chunks_mut(channels) {
                    let sample = consumer.try_pop().unwrap_or(0.0);
                    frame.fill(sample);
                }
            },
            move |err| {
                error!("audio output stream error: {err}");
            },
            None,
        )?;
        stream.play()?;
        Ok((stream, rate))
    }
}

#[cfg(not(feature = "native-audio"))]
mod silent {
    use async_trait::async_trait;
    use openai_realtime::media::MIX_SAMPLE_RATE;
    use openai_realtime::{AudioFrame, FrameStream, LocalStream, MediaSource};
    use std::sync::Arc;
    use std::time::Duration;

    const FRAME_SAMPLES: usize = MIX_SAMPLE_RATE as usize / 50;

    /// Sends 20ms frames of silence, for builds without audio devices.
    #[derive(Debug, Default)]
    pub struct SilentMicrophone;

    #[async_trait]
    impl MediaSource for SilentMicrophone {
        async fn acquire_microphone(&self) -> openai_realtime::Result<Arc<dyn LocalStream>> {
            let (abort_tx, abort_rx) = tokio::sync::oneshot::channel::<()>();
            let stream = Arc::new(FrameStream::with_stop_hook(16, move || {
                let _ = abort_tx.send(());
            }));
            let frames = stream.sender();
            tokio::spawn(async move {
                let mut ticks = tokio::time::interval(Duration::from_millis(20));
                tokio::pin!(abort_rx);
                loop {
                    tokio::select! {
                        _ = &mut abort_rx => break,
                        _ = ticks.tick() => {
                            let _ = frames.send(AudioFrame::new(vec![0.0; FRAME_SAMPLES], MIX_SAMPLE_RATE));
                        }
                    }
                }
            });
            Ok(stream as Arc<dyn LocalStream>)
        }
    }
}
