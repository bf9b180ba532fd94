use serde::{Deserialize, Serialize};

/// Track state enumeration for the track lifecycle.
///
/// Only `Active` tracks take part in assignment; every other state is
/// terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TrackState {
    /// Participates in the next assignment
    #[default]
    Active,
    /// Went unmatched for longer than the maximum track age
    AgedOut,
    /// Ended by a division; the track is a mother
    Divided,
    /// Truncated by an explicit split
    Split,
}

impl TrackState {
    #[inline]
    pub fn is_active(self) -> bool {
        self == TrackState::Active
    }
}
