//! State shared between the decode thread and the host tick
//!
//! One mutex guards both queues together with every flag either side looks
//! at. Two condition variables carry the wakeups: `data_available` for
//! readers and `space_available` for writers. Every mutation broadcasts on
//! both, and every waiter re-checks liveness when it wakes.

use parking_lot::{Condvar, Mutex, MutexGuard};

use crate::pipeline::ByteQueue;
use crate::utils::config::ColorSpace;

/// Decode thread state, published for observation
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum ProducerState {
    /// Started, nothing read yet
    Idle,

    /// Pulling the next packet from the demuxer
    ReadPacket,

    /// Decoding and converting a video packet
    DecodeVideo,

    /// Decoding and resampling an audio packet
    DecodeAudio,

    /// Feeding a subtitle packet to the compositor
    DecodeSubtitle,

    /// Waiting for queue space or writing a record
    WriteQueue,

    /// Repositioning the demuxer
    Seeking,

    /// Exited; no more data will arrive
    Terminated,
}

/// Which of the two queues a record belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum QueueKind {
    Video,
    Audio,
}

/// Everything guarded by the exchange mutex
#[derive(Debug)]
pub(crate) struct Shared {
    pub(crate) video: ByteQueue,
    pub(crate) audio: ByteQueue,

    /// Outstanding seek target in seconds
    pub(crate) seek: Option<f64>,

    /// Set while the consumer waits for data; lets the producer drop instead of wait
    pub(crate) consumer_blocked: bool,

    /// Timestamp of the newest record written to each queue
    pub(crate) last_video_time: f64,
    pub(crate) last_audio_time: f64,

    /// Producer has exited
    pub(crate) producer_dead: bool,

    /// Consumer asked the producer to exit
    pub(crate) shutdown: bool,

    pub(crate) active_audio: Option<usize>,
    pub(crate) active_subtitle: Option<usize>,
    pub(crate) color_space: ColorSpace,

    pub(crate) producer_state: ProducerState,

    /// Records whose queue was cleared to make room
    pub(crate) congestion_drops: u64,
}

impl Shared {
    pub(crate) fn queue(&self, kind: QueueKind) -> &ByteQueue {
        match kind {
            QueueKind::Video => &self.video,
            QueueKind::Audio => &self.audio,
        }
    }

    pub(crate) fn queue_mut(&mut self, kind: QueueKind) -> &mut ByteQueue {
        match kind {
            QueueKind::Video => &mut self.video,
            QueueKind::Audio => &mut self.audio,
        }
    }

    /// True when nothing else can arrive
    pub(crate) fn finished(&self) -> bool {
        self.producer_dead || self.shutdown
    }
}

/// Mutex plus the two condition variables
#[derive(Debug)]
pub(crate) struct Exchange {
    shared: Mutex<Shared>,
    data_available: Condvar,
    space_available: Condvar,
}

impl Exchange {
    pub(crate) fn new(
        video_capacity: usize,
        audio_capacity: usize,
        active_audio: Option<usize>,
        active_subtitle: Option<usize>,
        color_space: ColorSpace,
    ) -> Self {
        Self {
            shared: Mutex::new(Shared {
                video: ByteQueue::new(video_capacity),
                audio: ByteQueue::new(audio_capacity),
                seek: None,
                consumer_blocked: false,
                last_video_time: 0.0,
                last_audio_time: 0.0,
                producer_dead: false,
                shutdown: false,
                active_audio,
                active_subtitle,
                color_space,
                producer_state: ProducerState::Idle,
                congestion_drops: 0,
            }),
            data_available: Condvar::new(),
            space_available: Condvar::new(),
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock()
    }

    /// Block until the producer signals new data or a state change
    pub(crate) fn wait_data(&self, guard: &mut MutexGuard<'_, Shared>) {
        self.data_available.wait(guard);
    }

    /// Block until the consumer frees space or changes state
    pub(crate) fn wait_space(&self, guard: &mut MutexGuard<'_, Shared>) {
        self.space_available.wait(guard);
    }

    /// Wake every waiter on both conditions
    pub(crate) fn broadcast(&self) {
        self.data_available.notify_all();
        self.space_available.notify_all();
    }

    /// Ask the decode thread to exit
    pub(crate) fn request_shutdown(&self) {
        self.lock().shutdown = true;
        self.broadcast();
    }

    pub(crate) fn producer_state(&self) -> ProducerState {
        self.lock().producer_state
    }
}
