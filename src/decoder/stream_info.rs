//! Runtime stream selection
//!
//! Audio and subtitle tracks are an ordered list with an active cursor.
//! A cursor over zero tracks means the feature is absent.

/// Active index into an ordered list of tracks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackCursor {
    count: usize,
    active: usize,
}

impl TrackCursor {
    pub fn new(count: usize) -> Self {
        Self { count, active: 0 }
    }

    /// Active track, `None` when there are no tracks
    pub fn active(&self) -> Option<usize> {
        if self.count == 0 {
            None
        } else {
            Some(self.active)
        }
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// Advance to the next track, wrapping around
    ///
    /// Returns the newly active track, or `None` when there is nothing to switch.
    pub fn cycle(&mut self) -> Option<usize> {
        if self.count == 0 {
            return None;
        }
        self.active = (self.active + 1) % self.count;
        Some(self.active)
    }
}

/// Which audio and subtitle tracks are currently selected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamSelection {
    pub audio: TrackCursor,
    pub subtitle: TrackCursor,
}

impl StreamSelection {
    pub fn new(audio_tracks: usize, subtitle_tracks: usize) -> Self {
        Self {
            audio: TrackCursor::new(audio_tracks),
            subtitle: TrackCursor::new(subtitle_tracks),
        }
    }
}
