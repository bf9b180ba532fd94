//! Arena of tracks and the mother/daughter lineage forest.

use std::collections::{HashSet, VecDeque};

use serde::{Deserialize, Serialize};

use crate::error::{Result, TrackError};
use crate::tracker::attribute::Detection;
use crate::tracker::track_data::{TrackData, TrackId, TrackView};
use crate::tracker::track_state::TrackState;

/// Lineage traversal order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Traversal {
    /// Root, then the first daughter's subtree, then the second's.
    Preorder,
    /// Level by level.
    BreadthFirst,
    /// From the track up through its mothers to the lineage root.
    Backward,
}

/// Owns every track. Ids are 1-based slot indices and are never reused;
/// deleting a track vacates its slot.
#[derive(Debug, Clone, Default)]
pub struct TrackArray {
    slots: Vec<Option<TrackData>>,
}

impl TrackArray {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live (non-deleted) tracks.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Id the next added track will receive.
    pub fn next_id(&self) -> TrackId {
        self.slots.len() as TrackId + 1
    }

    fn slot(id: TrackId) -> Option<usize> {
        usize::try_from(id).ok()?.checked_sub(1)
    }

    pub fn get(&self, id: TrackId) -> Result<&TrackData> {
        Self::slot(id)
            .and_then(|s| self.slots.get(s))
            .and_then(Option::as_ref)
            .ok_or(TrackError::TrackNotFound(id))
    }

    pub(crate) fn get_mut(&mut self, id: TrackId) -> Result<&mut TrackData> {
        Self::slot(id)
            .and_then(|s| self.slots.get_mut(s))
            .and_then(Option::as_mut)
            .ok_or(TrackError::TrackNotFound(id))
    }

    pub fn contains(&self, id: TrackId) -> bool {
        self.get(id).is_ok()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TrackData> {
        self.slots.iter().flatten()
    }

    pub fn track_ids(&self) -> Vec<TrackId> {
        self.iter().map(TrackData::id).collect()
    }

    pub fn active_track_ids(&self) -> Vec<TrackId> {
        self.iter().filter(|t| t.is_active()).map(TrackData::id).collect()
    }

    /// Start a new active track holding `detection` at `frame`.
    pub fn add_track(&mut self, frame: u32, detection: &Detection) -> TrackId {
        let id = self.next_id();
        self.slots.push(Some(TrackData::new(id, frame, detection)));
        id
    }

    /// Write `detection` into track `id` at `frame`.
    ///
    /// A new frame is inserted in sorted position with every other field
    /// empty there; an existing frame has the supplied fields overwritten.
    pub fn update_track(&mut self, id: TrackId, frame: u32, detection: &Detection) -> Result<()> {
        self.get_mut(id)?.set_frame(frame, detection);
        Ok(())
    }

    /// Apply several frames at once, in any order.
    ///
    /// Gaps inside the batch's span, and between the track's recorded range
    /// and the batch, are filled with empty placeholder frames.
    pub fn update_track_frames(&mut self, id: TrackId, mut updates: Vec<(u32, Detection)>) -> Result<()> {
        let track = self.get_mut(id)?;
        if updates.is_empty() {
            return Ok(());
        }
        updates.sort_by_key(|(frame, _)| *frame);

        let batch_first = updates[0].0;
        let batch_last = updates[updates.len() - 1].0;
        let span_first = match track.last_frame() {
            Some(last) if last < batch_first => last + 1,
            _ => batch_first,
        };
        let span_last = match track.first_frame() {
            Some(first) if first > batch_last => first - 1,
            _ => batch_last,
        };
        for frame in span_first..=span_last {
            track.insert_placeholder(frame);
        }
        for (frame, detection) in &updates {
            track.set_frame(*frame, detection);
        }
        Ok(())
    }

    /// Remove one recorded frame from a track.
    pub fn delete_frame(&mut self, id: TrackId, frame: u32) -> Result<()> {
        if self.get_mut(id)?.remove_frame(frame) {
            Ok(())
        } else {
            Err(TrackError::FrameNotFound { track: id, frame })
        }
    }

    /// Delete a track outright. Its id is not reused; lineage links that
    /// point at it are left dangling.
    pub fn delete_track(&mut self, id: TrackId) -> Result<TrackData> {
        Self::slot(id)
            .and_then(|s| self.slots.get_mut(s))
            .and_then(Option::take)
            .ok_or(TrackError::TrackNotFound(id))
    }

    /// Split track `id` at `frame`: frames from `frame` onward move to a new
    /// track whose id is returned. The new track inherits the state and the
    /// daughters; the truncated original is marked [`TrackState::Split`].
    pub fn split_track(&mut self, id: TrackId, frame: u32) -> Result<TrackId> {
        let new_id = self.next_id();
        let track = self.get_mut(id)?;
        if !track.has_frame(frame) {
            return Err(TrackError::FrameNotFound { track: id, frame });
        }
        if track.first_frame() == Some(frame) {
            return Err(TrackError::InvalidSplit {
                track: id,
                frame,
                reason: "split frame is the track's first frame",
            });
        }
        let tail = track
            .split_off(frame, new_id)
            .ok_or(TrackError::FrameNotFound { track: id, frame })?;
        track.set_state(TrackState::Split);

        let daughters = tail.daughter_ids().to_vec();
        self.slots.push(Some(tail));
        self.relink_daughters(&daughters, new_id);
        Ok(new_id)
    }

    /// Append track `tail` onto track `head` and delete `tail`. Every frame
    /// of `tail` must come after `head`'s last frame. `head` takes over
    /// `tail`'s daughters and state.
    pub fn join_tracks(&mut self, head: TrackId, tail: TrackId) -> Result<()> {
        if head == tail {
            return Err(TrackError::InvalidJoin {
                head,
                tail,
                reason: "a track cannot be joined to itself",
            });
        }
        let head_last = self.get(head)?.last_frame();
        let tail_first = self.get(tail)?.first_frame();
        if let (Some(last), Some(first)) = (head_last, tail_first) {
            if first <= last {
                return Err(TrackError::InvalidJoin {
                    head,
                    tail,
                    reason: "tail frames overlap the head",
                });
            }
        }

        let tail_track = self.delete_track(tail)?;
        let daughters = tail_track.daughter_ids().to_vec();
        self.get_mut(head)?.append(tail_track);
        self.relink_daughters(&daughters, head);
        Ok(())
    }

    fn relink_daughters(&mut self, daughters: &[TrackId], mother: TrackId) {
        for &d in daughters {
            if let Ok(daughter) = self.get_mut(d) {
                daughter.set_mother(Some(mother));
            }
        }
    }

    pub(crate) fn set_state(&mut self, id: TrackId, state: TrackState) -> Result<()> {
        self.get_mut(id)?.set_state(state);
        Ok(())
    }

    /// Record a division: `mother` ends and `daughters` descend from it.
    pub(crate) fn set_division(&mut self, mother: TrackId, daughters: [TrackId; 2]) -> Result<()> {
        for d in daughters {
            self.get_mut(d)?.set_mother(Some(mother));
        }
        let m = self.get_mut(mother)?;
        m.set_daughters(daughters.to_vec());
        m.set_state(TrackState::Divided);
        Ok(())
    }

    /// Flattened view of one track.
    pub fn get_track(&self, id: TrackId) -> Result<TrackView> {
        Ok(self.get(id)?.view())
    }

    /// Flattened views of every live track, in id order.
    pub fn snapshot(&self) -> Vec<TrackView> {
        self.iter().map(TrackData::view).collect()
    }

    /// Walk the lineage starting at `root`. Missing mother/daughter links
    /// end the walk along that branch.
    pub fn traverse(&self, root: TrackId, order: Traversal) -> Result<Vec<TrackId>> {
        self.get(root)?;
        let mut visited = HashSet::new();
        let mut out = Vec::new();

        match order {
            Traversal::Preorder => {
                let mut stack = vec![root];
                while let Some(id) = stack.pop() {
                    let Ok(track) = self.get(id) else { continue };
                    if !visited.insert(id) {
                        continue;
                    }
                    out.push(id);
                    stack.extend(track.daughter_ids().iter().rev());
                }
            }
            Traversal::BreadthFirst => {
                let mut queue = VecDeque::from([root]);
                while let Some(id) = queue.pop_front() {
                    let Ok(track) = self.get(id) else { continue };
                    if !visited.insert(id) {
                        continue;
                    }
                    out.push(id);
                    queue.extend(track.daughter_ids());
                }
            }
            Traversal::Backward => {
                let mut current = Some(root);
                while let Some(id) = current {
                    let Ok(track) = self.get(id) else { break };
                    if !visited.insert(id) {
                        break;
                    }
                    out.push(id);
                    current = track.mother_id();
                }
            }
        }

        Ok(out)
    }
}
