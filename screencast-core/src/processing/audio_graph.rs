use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use super::audio_mixer::AudioMixer;
use super::compressor::{CompressorSettings, DynamicsCompressor};
use super::ring_buffer::RingBuffer;
use crate::models::config::AudioMixConfig;
use crate::models::error::CaptureError;
use crate::traits::audio_track::{AudioBufferCallback, AudioTrack};
use crate::traits::subscription::{ListenerSet, Subscription};
use crate::traits::video_track::EndedListener;

type BufferListener = dyn Fn(&[f32], f64, u16) + Send + Sync;
type Listener = dyn Fn() + Send + Sync;

/// Output channel count of the mixing graph.
pub const OUTPUT_CHANNELS: u16 = 2;

/// Buffered input of one node and the time it last received samples.
struct NodeInput {
    ring: RingBuffer,
    last_write: Instant,
}

impl NodeInput {
    fn push(&mut self, stereo: &[f32], at: Instant) {
        self.ring.write(stereo);
        self.last_write = at;
    }
}

/// One source feeding the shared compressor through its own gain stage.
pub struct AudioMixNode {
    pub source_id: String,
    pub gain: f32,
    input: Arc<Mutex<NodeInput>>,
    ended: Arc<AtomicBool>,
    subscriptions: Vec<Subscription>,
}

impl AudioMixNode {
    fn new(source_id: &str, gain: f32, capacity_frames: usize, now: Instant) -> Self {
        Self {
            source_id: source_id.to_string(),
            gain,
            input: Arc::new(Mutex::new(NodeInput {
                ring: RingBuffer::new(capacity_frames, OUTPUT_CHANNELS),
                last_write: now,
            })),
            ended: Arc::new(AtomicBool::new(false)),
            subscriptions: Vec::new(),
        }
    }

    /// Whether the next block waits for this node.
    ///
    /// Ended sources never hold the mix back, and neither does a source that
    /// has been empty for longer than `max_lag`; both play as silence.
    fn paces(&self, input: &NodeInput, now: Instant, max_lag: Duration) -> bool {
        if self.ended.load(Ordering::SeqCst) {
            return false;
        }
        !input.ring.is_empty() || now.saturating_duration_since(input.last_write) <= max_lag
    }
}

struct MixedTrackInner {
    id: String,
    live: AtomicBool,
    sample_rate: f64,
    subscribers: ListenerSet<BufferListener>,
    ended: ListenerSet<Listener>,
}

/// The single audio track produced by the mixing graph.
///
/// Clones share the same output; the graph has exactly one consumer (the
/// encoder), so stopping any handle ends the output.
#[derive(Clone)]
pub struct MixedAudioTrack {
    inner: Arc<MixedTrackInner>,
}

impl MixedAudioTrack {
    fn new(sample_rate: f64) -> Self {
        Self {
            inner: Arc::new(MixedTrackInner {
                id: format!("audio-mix-{}", uuid::Uuid::new_v4()),
                live: AtomicBool::new(true),
                sample_rate,
                subscribers: ListenerSet::new(),
                ended: ListenerSet::new(),
            }),
        }
    }

    fn deliver(&self, samples: &[f32]) {
        if !self.is_live() {
            return;
        }
        for subscriber in self.inner.subscribers.snapshot() {
            subscriber(samples, self.inner.sample_rate, OUTPUT_CHANNELS);
        }
    }

    fn end(&self) {
        if self.inner.live.swap(false, Ordering::SeqCst) {
            self.inner.subscribers.clear();
            for listener in self.inner.ended.snapshot() {
                listener();
            }
        }
    }
}

impl AudioTrack for MixedAudioTrack {
    fn id(&self) -> &str {
        &self.inner.id
    }

    fn is_live(&self) -> bool {
        self.inner.live.load(Ordering::SeqCst)
    }

    fn subscribe(&self, callback: AudioBufferCallback) -> Subscription {
        self.inner.subscribers.add(callback)
    }

    fn on_ended(&self, listener: EndedListener) -> Subscription {
        self.inner.ended.add(listener)
    }

    fn clone_track(&self) -> Arc<dyn AudioTrack> {
        Arc::new(self.clone())
    }

    fn stop(&self) {
        self.inner.live.store(false, Ordering::SeqCst);
        self.inner.subscribers.clear();
    }
}

/// Mixes every live audio source into one track.
///
/// ```text
/// [source] → [resample → stereo] → [RingBuffer] → gain 0.8 ─┐
/// [source] → [resample → stereo] → [RingBuffer] → gain 0.8 ─┼→ [compressor] → MixedAudioTrack
/// ```
///
/// Buffers are drained by a dedicated processing thread, independent of the
/// video path.
pub struct AudioMixingGraph {
    nodes: Arc<Mutex<Vec<AudioMixNode>>>,
    output: MixedAudioTrack,
    running: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
    cycles: Arc<AtomicU64>,
}

impl AudioMixingGraph {
    pub fn build(sources: &[Arc<dyn AudioTrack>], config: &AudioMixConfig) -> Result<Self, CaptureError> {
        if !config.sample_rate.is_finite() || config.sample_rate < 8000.0 {
            return Err(CaptureError::AudioGraphUnavailable(format!(
                "unsupported output sample rate: {}",
                config.sample_rate
            )));
        }
        if config.block_interval.is_zero() {
            return Err(CaptureError::AudioGraphUnavailable(
                "processing interval must be positive".into(),
            ));
        }

        let mixer = AudioMixer::new(config.sample_rate);
        // 5 seconds per source
        let capacity = (config.sample_rate * 5.0) as usize;

        let now = Instant::now();
        let mut nodes = Vec::with_capacity(sources.len());
        for source in sources.iter().filter(|s| s.is_live()) {
            let mut node = AudioMixNode::new(source.id(), config.source_gain, capacity, now);
            let node_input = Arc::clone(&node.input);
            let node_mixer = mixer.clone();

            let callback: AudioBufferCallback = Arc::new(move |samples: &[f32], rate: f64, channels: u16| {
                let stereo = node_mixer.to_output_stereo(samples, rate, channels);
                node_input.lock().push(&stereo, Instant::now());
            });
            let ended = Arc::clone(&node.ended);
            node.subscriptions.push(source.subscribe(callback));
            node.subscriptions
                .push(source.on_ended(Arc::new(move || ended.store(true, Ordering::SeqCst))));
            nodes.push(node);
        }

        let mut graph = Self {
            nodes: Arc::new(Mutex::new(nodes)),
            output: MixedAudioTrack::new(config.sample_rate),
            running: Arc::new(AtomicBool::new(true)),
            handle: None,
            cycles: Arc::new(AtomicU64::new(0)),
        };

        let compressor = DynamicsCompressor::new(CompressorSettings::default(), config.sample_rate);
        // at most one second per cycle
        let max_frames = config.sample_rate as usize;
        graph.start_processing_loop(
            mixer,
            compressor,
            config.block_interval,
            config.max_source_lag,
            max_frames,
        )?;

        log::info!(
            "audio mixing graph started with {} source(s) at {} Hz",
            graph.node_count(),
            config.sample_rate
        );
        Ok(graph)
    }

    pub fn output(&self) -> Arc<dyn AudioTrack> {
        Arc::new(self.output.clone())
    }

    pub fn node_count(&self) -> usize {
        self.nodes.lock().len()
    }

    pub fn mix_cycles(&self) -> u64 {
        self.cycles.load(Ordering::Relaxed)
    }

    /// Disconnect sources, stop the processing thread and end the output.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
        for node in self.nodes.lock().iter_mut() {
            for subscription in node.subscriptions.drain(..) {
                subscription.unsubscribe();
            }
        }
        self.output.end();
    }

    fn start_processing_loop(
        &mut self,
        mixer: AudioMixer,
        mut compressor: DynamicsCompressor,
        interval: Duration,
        max_lag: Duration,
        max_frames: usize,
    ) -> Result<(), CaptureError> {
        let running = Arc::clone(&self.running);
        let nodes = Arc::clone(&self.nodes);
        let output = self.output.clone();
        let cycles = Arc::clone(&self.cycles);

        let handle = thread::Builder::new()
            .name("audio-mix".into())
            .spawn(move || {
                while running.load(Ordering::SeqCst) {
                    thread::sleep(interval);
                    let mixed = process_block(
                        &nodes.lock(),
                        &mixer,
                        &mut compressor,
                        max_frames,
                        Instant::now(),
                        max_lag,
                    );
                    if !mixed.is_empty() {
                        cycles.fetch_add(1, Ordering::Relaxed);
                        output.deliver(&mixed);
                    }
                }
            })
            .map_err(|e| CaptureError::AudioGraphUnavailable(format!("failed to spawn mix thread: {}", e)))?;

        self.handle = Some(handle);
        Ok(())
    }
}

impl Drop for AudioMixingGraph {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Drain node buffers, apply gains, sum, and compress one block.
///
/// The block is as long as the shortest input among pacing nodes, so a
/// source that is briefly behind is never padded and output never outruns
/// real time. Leftover frames wait for the next block.
fn process_block(
    nodes: &[AudioMixNode],
    mixer: &AudioMixer,
    compressor: &mut DynamicsCompressor,
    max_frames: usize,
    now: Instant,
    max_lag: Duration,
) -> Vec<f32> {
    let available: Vec<(usize, bool)> = nodes
        .iter()
        .map(|n| {
            let input = n.input.lock();
            (input.ring.frames(), n.paces(&input, now, max_lag))
        })
        .collect();
    let frames = available
        .iter()
        .filter(|(_, paces)| *paces)
        .map(|(frames, _)| *frames)
        .min()
        // nothing left pacing: drain what ended or stalled sources left behind
        .unwrap_or_else(|| available.iter().map(|(frames, _)| *frames).max().unwrap_or(0))
        .min(max_frames);
    if frames == 0 {
        return Vec::new();
    }

    let drained: Vec<(Vec<f32>, f32)> = nodes
        .iter()
        .map(|n| (n.input.lock().ring.read_frames(frames), n.gain))
        .collect();
    let inputs: Vec<(&[f32], f32)> = drained.iter().map(|(s, g)| (s.as_slice(), *g)).collect();

    let mut mixed = mixer.mix_nodes(&inputs);
    compressor.process_interleaved(&mut mixed, OUTPUT_CHANNELS as usize);
    mixed
}

/// Audio handed to the encoder for one recording.
pub enum AudioMix {
    /// No source carries audio; the encoder runs video-only.
    Silent,
    Mixed(AudioMixingGraph),
    /// The graph could not be built; the first live source is forwarded raw.
    Passthrough(Arc<dyn AudioTrack>),
}

impl AudioMix {
    pub fn track(&self) -> Option<Arc<dyn AudioTrack>> {
        match self {
            Self::Silent => None,
            Self::Mixed(graph) => Some(graph.output()),
            Self::Passthrough(track) => Some(Arc::clone(track)),
        }
    }

    pub fn is_mixed(&self) -> bool {
        matches!(self, Self::Mixed(_))
    }

    pub fn mix_cycles(&self) -> u64 {
        match self {
            Self::Mixed(graph) => graph.mix_cycles(),
            _ => 0,
        }
    }

    /// Stop the graph. Passthrough tracks are owned by the caller.
    pub fn stop(&mut self) {
        if let Self::Mixed(graph) = self {
            graph.stop();
        }
    }
}

/// Combine all live audio sources into exactly one track.
///
/// Graph construction failures are absorbed: the first live source is
/// forwarded unmixed rather than failing the session.
pub fn mix(sources: &[Arc<dyn AudioTrack>], config: &AudioMixConfig) -> AudioMix {
    let live: Vec<Arc<dyn AudioTrack>> = sources.iter().filter(|s| s.is_live()).cloned().collect();
    if live.is_empty() {
        return AudioMix::Silent;
    }

    match AudioMixingGraph::build(&live, config) {
        Ok(graph) => AudioMix::Mixed(graph),
        Err(e) => {
            log::warn!("{}; passing through first audio source", e);
            AudioMix::Passthrough(Arc::clone(&live[0]))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    /// Audio track whose samples are pushed by the test.
    struct FakeAudio {
        id: String,
        live: AtomicBool,
        subscribers: ListenerSet<BufferListener>,
        ended: ListenerSet<Listener>,
    }

    impl FakeAudio {
        fn new(id: &str) -> Arc<Self> {
            Arc::new(Self {
                id: id.into(),
                live: AtomicBool::new(true),
                subscribers: ListenerSet::new(),
                ended: ListenerSet::new(),
            })
        }

        fn push(&self, samples: &[f32], rate: f64, channels: u16) {
            for s in self.subscribers.snapshot() {
                s(samples, rate, channels);
            }
        }
    }

    impl AudioTrack for FakeAudio {
        fn id(&self) -> &str {
            &self.id
        }
        fn is_live(&self) -> bool {
            self.live.load(Ordering::SeqCst)
        }
        fn subscribe(&self, callback: AudioBufferCallback) -> Subscription {
            self.subscribers.add(callback)
        }
        fn on_ended(&self, listener: EndedListener) -> Subscription {
            self.ended.add(listener)
        }
        fn clone_track(&self) -> Arc<dyn AudioTrack> {
            unreachable!("not cloned in these tests")
        }
        fn stop(&self) {
            self.live.store(false, Ordering::SeqCst);
        }
    }

    fn collect_output(track: &Arc<dyn AudioTrack>) -> (Arc<Mutex<Vec<f32>>>, Subscription) {
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&received);
        let sub = track.subscribe(Arc::new(move |samples: &[f32], _rate: f64, _channels: u16| {
            sink.lock().extend_from_slice(samples);
        }));
        (received, sub)
    }

    fn wait_for(received: &Mutex<Vec<f32>>, len: usize) {
        let deadline = Instant::now() + Duration::from_secs(2);
        while received.lock().len() < len && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
    }

    const MAX_LAG: Duration = Duration::from_millis(40);

    fn compressor() -> DynamicsCompressor {
        DynamicsCompressor::new(CompressorSettings::default(), 48000.0)
    }

    fn at(base: Instant, millis: u64) -> Instant {
        base + Duration::from_millis(millis)
    }

    #[test]
    fn block_sums_nodes_through_gain_stages() {
        let mixer = AudioMixer::new(48000.0);
        let base = Instant::now();
        let nodes: Vec<AudioMixNode> = (0..2)
            .map(|i| {
                let node = AudioMixNode::new(&format!("node-{i}"), 0.8, 4800, base);
                node.input.lock().push(&[0.05; 960], base);
                node
            })
            .collect();

        let mixed = process_block(&nodes, &mixer, &mut compressor(), 48000, base, MAX_LAG);

        // quiet enough to stay below the compressor knee
        assert_eq!(mixed.len(), 960);
        assert!(mixed.iter().all(|s| (*s - 0.08).abs() < 1e-6));
        assert!(nodes.iter().all(|n| n.input.lock().ring.is_empty()));
    }

    #[test]
    fn jittered_deliveries_stay_aligned_and_real_time() {
        let mixer = AudioMixer::new(48000.0);
        let mut compressor = compressor();
        let base = Instant::now();
        let nodes = vec![
            AudioMixNode::new("screen", 0.8, 48000, base),
            AudioMixNode::new("mic", 0.8, 48000, base),
        ];
        // 10 ms of mono per buffer; the mic trails by 1 ms and every fifth
        // buffer arrives 2 ms later still
        let buffer = mixer.to_output_stereo(&[0.05; 480], 48000.0, 1);
        let mut deliveries: Vec<(u64, usize)> = (0..100u64)
            .flat_map(|k| {
                let late = if k % 5 == 4 { 2 } else { 0 };
                [(k * 10, 0), (k * 10 + 1 + late, 1)]
            })
            .collect();
        deliveries.sort();
        let mut pending = deliveries.into_iter().peekable();

        let mut out = Vec::new();
        for tick in 1..=50u64 {
            let now = tick * 20;
            while let Some(&(when, node)) = pending.peek() {
                if when > now {
                    break;
                }
                nodes[node].input.lock().push(&buffer, at(base, when));
                pending.next();
            }
            out.extend(process_block(&nodes, &mixer, &mut compressor, 48000, at(base, now), MAX_LAG));
        }

        // one second in, one second out, every sample carrying both sources
        assert_eq!(out.len(), 96_000);
        assert!(out.iter().all(|s| (*s - 0.08).abs() < 1e-4));
    }

    #[test]
    fn briefly_quiet_source_holds_the_block() {
        let mixer = AudioMixer::new(48000.0);
        let base = Instant::now();
        let nodes = vec![
            AudioMixNode::new("screen", 0.8, 4800, base),
            AudioMixNode::new("mic", 0.8, 4800, base),
        ];
        nodes[0].input.lock().push(&[0.05; 960], at(base, 5));

        assert!(process_block(&nodes, &mixer, &mut compressor(), 48000, at(base, 10), MAX_LAG).is_empty());
        assert_eq!(nodes[0].input.lock().ring.frames(), 480);
    }

    #[test]
    fn stalled_source_stops_holding_the_block() {
        let mixer = AudioMixer::new(48000.0);
        let base = Instant::now();
        let nodes = vec![
            AudioMixNode::new("screen", 0.8, 4800, base),
            AudioMixNode::new("mic", 0.8, 4800, base),
        ];
        nodes[0].input.lock().push(&[0.05; 960], at(base, 45));

        let mixed = process_block(&nodes, &mixer, &mut compressor(), 48000, at(base, 50), MAX_LAG);
        assert_eq!(mixed.len(), 960);
        assert!(mixed.iter().all(|s| (*s - 0.04).abs() < 1e-6));
    }

    #[test]
    fn ended_source_stops_holding_the_block() {
        let mixer = AudioMixer::new(48000.0);
        let base = Instant::now();
        let nodes = vec![
            AudioMixNode::new("screen", 0.8, 4800, base),
            AudioMixNode::new("mic", 0.8, 4800, base),
        ];
        nodes[1].ended.store(true, Ordering::SeqCst);
        nodes[0].input.lock().push(&[0.05; 960], base);

        let mixed = process_block(&nodes, &mixer, &mut compressor(), 48000, at(base, 1), MAX_LAG);
        assert_eq!(mixed.len(), 960);
    }

    #[test]
    fn ending_a_source_marks_its_node() {
        let mic = FakeAudio::new("mic");
        let graph = AudioMixingGraph::build(&[mic.clone() as Arc<dyn AudioTrack>], &AudioMixConfig::default()).unwrap();
        for listener in mic.ended.snapshot() {
            listener();
        }
        assert!(graph.nodes.lock()[0].ended.load(Ordering::SeqCst));
    }

    #[test]
    fn graph_delivers_mixed_stereo() {
        let mic = FakeAudio::new("mic");
        let sources: Vec<Arc<dyn AudioTrack>> = vec![mic.clone()];

        let mut mix = mix(&sources, &AudioMixConfig::default());
        assert!(mix.is_mixed());
        let track = mix.track().unwrap();
        let (received, _sub) = collect_output(&track);

        mic.push(&[0.05; 480], 48000.0, 1);
        wait_for(&received, 960);
        mix.stop();

        let out = received.lock();
        assert_eq!(out.len(), 960);
        assert!(out.iter().all(|s| (*s - 0.04).abs() < 1e-4));
        assert!(mix.mix_cycles() >= 1);
    }

    #[test]
    fn no_audio_sources_is_silent() {
        let mix = mix(&[], &AudioMixConfig::default());
        assert!(mix.track().is_none());

        let ended = FakeAudio::new("gone");
        ended.stop();
        let mix = super::mix(&[ended as Arc<dyn AudioTrack>], &AudioMixConfig::default());
        assert!(matches!(mix, AudioMix::Silent));
    }

    #[test]
    fn unavailable_graph_falls_back_to_first_source() {
        let mic = FakeAudio::new("mic");
        let screen = FakeAudio::new("screen");
        let config = AudioMixConfig {
            sample_rate: 0.0,
            ..Default::default()
        };

        let mix = mix(&[mic as Arc<dyn AudioTrack>, screen], &config);
        match mix {
            AudioMix::Passthrough(track) => assert_eq!(track.id(), "mic"),
            _ => panic!("expected passthrough"),
        }
    }

    #[test]
    fn stop_ends_output_and_disconnects_sources() {
        let mic = FakeAudio::new("mic");
        let mut graph = AudioMixingGraph::build(&[mic.clone() as Arc<dyn AudioTrack>], &AudioMixConfig::default()).unwrap();
        assert_eq!(mic.subscribers.len(), 1);

        let output = graph.output();
        graph.stop();
        graph.stop();

        assert!(!output.is_live());
        assert!(mic.subscribers.is_empty());
    }
}
