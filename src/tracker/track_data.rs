//! Per-track sparse time series.

use std::collections::BTreeMap;

use ndarray::{Array2, ArrayView1};
use serde::Serialize;

use crate::tracker::attribute::{Detection, Value};
use crate::tracker::track_state::TrackState;

/// Unique, never reused track identifier.
pub type TrackId = u64;

/// One track: sorted frame indices plus one positionally aligned column of
/// values per attribute field.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackData {
    id: TrackId,
    mother_id: Option<TrackId>,
    daughter_ids: Vec<TrackId>,
    state: TrackState,
    frames: Vec<u32>,
    data: BTreeMap<String, Vec<Value>>,
}

impl TrackData {
    /// Create a singleton-frame track from a detection.
    pub(crate) fn new(id: TrackId, frame: u32, detection: &Detection) -> Self {
        let mut track = Self::empty(id);
        track.set_frame(frame, detection);
        track
    }

    pub(crate) fn empty(id: TrackId) -> Self {
        Self {
            id,
            mother_id: None,
            daughter_ids: Vec::new(),
            state: TrackState::Active,
            frames: Vec::new(),
            data: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> TrackId {
        self.id
    }

    pub fn mother_id(&self) -> Option<TrackId> {
        self.mother_id
    }

    pub fn daughter_ids(&self) -> &[TrackId] {
        &self.daughter_ids
    }

    pub fn state(&self) -> TrackState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state.is_active()
    }

    pub fn frames(&self) -> &[u32] {
        &self.frames
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn first_frame(&self) -> Option<u32> {
        self.frames.first().copied()
    }

    pub fn last_frame(&self) -> Option<u32> {
        self.frames.last().copied()
    }

    pub fn has_frame(&self, frame: u32) -> bool {
        self.frames.binary_search(&frame).is_ok()
    }

    /// Frames elapsed between the last recorded frame and `frame`.
    pub fn age(&self, frame: u32) -> Option<u32> {
        self.last_frame().map(|last| frame.saturating_sub(last))
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.data.keys().map(String::as_str)
    }

    /// Raw column for `field`, aligned with [`frames`](Self::frames).
    pub fn values(&self, field: &str) -> Option<&[Value]> {
        self.data.get(field).map(Vec::as_slice)
    }

    /// Value of `field` at `frame`, if recorded and non-empty.
    pub fn value(&self, field: &str, frame: u32) -> Option<&Value> {
        let pos = self.frames.binary_search(&frame).ok()?;
        self.non_empty(field, pos)
    }

    /// Value of `field` at the most recent frame, if non-empty.
    pub fn last_value(&self, field: &str) -> Option<&Value> {
        let pos = self.frames.len().checked_sub(1)?;
        self.non_empty(field, pos)
    }

    /// Most recent non-empty value of `field`, however far back.
    pub fn latest_value(&self, field: &str) -> Option<&Value> {
        self.data.get(field)?.iter().rev().find(|v| !v.is_empty())
    }

    /// Value of `field` `offset` recorded frames before `frame`: offset 1 is
    /// the latest recorded frame strictly before `frame`.
    pub fn value_before(&self, field: &str, frame: u32, offset: usize) -> Option<&Value> {
        let before = self.frames.partition_point(|&f| f < frame);
        if offset == 0 || offset > before {
            return None;
        }
        self.non_empty(field, before - offset)
    }

    fn non_empty(&self, field: &str, pos: usize) -> Option<&Value> {
        self.data
            .get(field)
            .and_then(|col| col.get(pos))
            .filter(|v| !v.is_empty())
    }

    pub(crate) fn set_state(&mut self, state: TrackState) {
        self.state = state;
    }

    pub(crate) fn set_mother(&mut self, mother: Option<TrackId>) {
        self.mother_id = mother;
    }

    pub(crate) fn set_daughters(&mut self, daughters: Vec<TrackId>) {
        self.daughter_ids = daughters;
    }

    /// Insert a frame position (all fields empty) and return its index.
    fn insert_position(&mut self, frame: u32) -> usize {
        match self.frames.binary_search(&frame) {
            Ok(pos) => pos,
            Err(pos) => {
                self.frames.insert(pos, frame);
                for col in self.data.values_mut() {
                    col.insert(pos, Value::Empty);
                }
                pos
            }
        }
    }

    /// Write a detection at `frame`, inserting the frame in sorted position
    /// or overwriting the supplied fields if it already exists.
    pub(crate) fn set_frame(&mut self, frame: u32, detection: &Detection) {
        let pos = self.insert_position(frame);
        let len = self.frames.len();
        for (field, value) in detection.iter() {
            let col = self
                .data
                .entry(field.to_string())
                .or_insert_with(|| vec![Value::Empty; len]);
            col[pos] = value.clone();
        }
    }

    /// Add an all-empty entry for `frame`. Returns false if it already exists.
    pub(crate) fn insert_placeholder(&mut self, frame: u32) -> bool {
        if self.has_frame(frame) {
            return false;
        }
        self.insert_position(frame);
        true
    }

    pub(crate) fn remove_frame(&mut self, frame: u32) -> bool {
        match self.frames.binary_search(&frame) {
            Ok(pos) => {
                self.frames.remove(pos);
                for col in self.data.values_mut() {
                    col.remove(pos);
                }
                true
            }
            Err(_) => false,
        }
    }

    /// Move everything from `frame` onward into a new track `new_id`.
    ///
    /// The new track inherits the state and the daughters; the mother link
    /// stays with the prefix. Returns `None` if `frame` is not recorded.
    pub(crate) fn split_off(&mut self, frame: u32, new_id: TrackId) -> Option<TrackData> {
        let pos = self.frames.binary_search(&frame).ok()?;
        let frames = self.frames.split_off(pos);
        let data = self
            .data
            .iter_mut()
            .map(|(field, col)| (field.clone(), col.split_off(pos)))
            .collect();
        Some(TrackData {
            id: new_id,
            mother_id: None,
            daughter_ids: std::mem::take(&mut self.daughter_ids),
            state: self.state,
            frames,
            data,
        })
    }

    /// Append `tail`, whose frames all follow this track's last frame.
    pub(crate) fn append(&mut self, tail: TrackData) {
        let head_len = self.frames.len();
        let tail_len = tail.frames.len();
        self.frames.extend(tail.frames);

        let mut tail_data = tail.data;
        for (field, col) in self.data.iter_mut() {
            match tail_data.remove(field) {
                Some(values) => col.extend(values),
                None => col.resize(head_len + tail_len, Value::Empty),
            }
        }
        for (field, values) in tail_data {
            let mut col = vec![Value::Empty; head_len];
            col.extend(values);
            self.data.insert(field, col);
        }
        self.daughter_ids = tail.daughter_ids;
        self.state = tail.state;
    }

    /// Flattened, read-only view of the track.
    pub fn view(&self) -> TrackView {
        TrackView {
            id: self.id,
            mother_id: self.mother_id,
            daughter_ids: self.daughter_ids.clone(),
            state: self.state,
            frames: self.frames.clone(),
            fields: self
                .data
                .iter()
                .map(|(field, col)| (field.clone(), FieldColumn::flatten(col)))
                .collect(),
        }
    }
}

/// One attribute column of a [`TrackView`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum FieldColumn {
    /// Fixed-width numeric values, one row per frame. Missing frames are
    /// NaN rows.
    Numeric(Array2<f64>),
    /// Values whose shape varies between frames (e.g. pixel index sets).
    Ragged(Vec<Value>),
}

impl FieldColumn {
    fn flatten(values: &[Value]) -> Self {
        let mut width = None;
        for v in values {
            match v {
                Value::Empty => {}
                Value::Scalar(_) | Value::Vector(_) => {
                    let w = v.as_numeric().map_or(0, <[f64]>::len);
                    match width {
                        None => width = Some(w),
                        Some(prev) if prev == w => {}
                        Some(_) => return FieldColumn::Ragged(values.to_vec()),
                    }
                }
                Value::Indices(_) => return FieldColumn::Ragged(values.to_vec()),
            }
        }

        match width {
            Some(w) => {
                let mut m = Array2::from_elem((values.len(), w), f64::NAN);
                for (r, v) in values.iter().enumerate() {
                    if let Some(row) = v.as_numeric() {
                        m.row_mut(r).assign(&ArrayView1::from(row));
                    }
                }
                FieldColumn::Numeric(m)
            }
            None => FieldColumn::Ragged(values.to_vec()),
        }
    }
}

/// Read-only snapshot of one track, suitable for exporters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackView {
    pub id: TrackId,
    pub mother_id: Option<TrackId>,
    pub daughter_ids: Vec<TrackId>,
    pub state: TrackState,
    pub frames: Vec<u32>,
    pub fields: BTreeMap<String, FieldColumn>,
}

impl TrackView {
    pub fn numeric(&self, field: &str) -> Option<&Array2<f64>> {
        match self.fields.get(field)? {
            FieldColumn::Numeric(m) => Some(m),
            FieldColumn::Ragged(_) => None,
        }
    }

    pub fn ragged(&self, field: &str) -> Option<&[Value]> {
        match self.fields.get(field)? {
            FieldColumn::Ragged(values) => Some(values),
            FieldColumn::Numeric(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::attribute::{AREA, CENTROID, PIXEL_INDICES};

    fn centroid(x: f64, y: f64) -> Detection {
        Detection::new().with(CENTROID, [x, y])
    }

    #[test]
    fn test_insert_keeps_frames_sorted_and_columns_aligned() {
        let mut t = TrackData::new(1, 5, &centroid(5.0, 5.0));
        t.set_frame(3, &centroid(3.0, 3.0).with(AREA, 10.0));
        t.set_frame(7, &centroid(7.0, 7.0));

        assert_eq!(t.frames(), &[3, 5, 7]);
        assert_eq!(t.values(CENTROID).unwrap().len(), 3);
        let area = t.values(AREA).unwrap();
        assert_eq!(area, &[Value::Scalar(10.0), Value::Empty, Value::Empty]);
        assert_eq!(t.first_frame(), Some(3));
        assert_eq!(t.age(10), Some(3));
    }

    #[test]
    fn test_overwrite_existing_frame() {
        let mut t = TrackData::new(1, 2, &centroid(1.0, 1.0).with(AREA, 4.0));
        t.set_frame(2, &centroid(9.0, 9.0));
        assert_eq!(t.len(), 1);
        assert_eq!(t.value(CENTROID, 2), Some(&Value::from([9.0, 9.0])));
        assert_eq!(t.value(AREA, 2), Some(&Value::Scalar(4.0)));
    }

    #[test]
    fn test_value_before() {
        let mut t = TrackData::new(1, 1, &centroid(1.0, 1.0));
        t.set_frame(2, &centroid(2.0, 2.0));
        t.set_frame(3, &centroid(3.0, 3.0));
        assert_eq!(t.value_before(CENTROID, 3, 1), Some(&Value::from([2.0, 2.0])));
        assert_eq!(t.value_before(CENTROID, 3, 2), Some(&Value::from([1.0, 1.0])));
        assert_eq!(t.value_before(CENTROID, 3, 3), None);
        assert_eq!(t.value_before(CENTROID, 3, 0), None);
        assert_eq!(t.last_value(CENTROID), Some(&Value::from([3.0, 3.0])));

        t.insert_placeholder(4);
        assert_eq!(t.last_value(CENTROID), None);
        assert_eq!(t.latest_value(CENTROID), Some(&Value::from([3.0, 3.0])));
    }

    #[test]
    fn test_split_off_and_append_roundtrip() {
        let mut t = TrackData::new(1, 1, &centroid(1.0, 1.0));
        t.set_frame(2, &centroid(2.0, 2.0).with(AREA, 2.0));
        t.set_frame(3, &centroid(3.0, 3.0));
        t.set_daughters(vec![8, 9]);
        let original = t.clone();

        let tail = t.split_off(2, 2).unwrap();
        assert_eq!(t.frames(), &[1]);
        assert_eq!(tail.frames(), &[2, 3]);
        assert!(t.daughter_ids().is_empty());
        assert_eq!(tail.daughter_ids(), &[8, 9]);

        t.append(tail);
        assert_eq!(t, original);
    }

    #[test]
    fn test_split_off_missing_frame() {
        let mut t = TrackData::new(1, 1, &centroid(1.0, 1.0));
        assert!(t.split_off(4, 2).is_none());
    }

    #[test]
    fn test_view_flattens_numeric_with_nan_placeholders() {
        let mut t = TrackData::new(1, 1, &centroid(1.0, 2.0));
        t.insert_placeholder(2);
        t.set_frame(3, &centroid(3.0, 4.0).with(PIXEL_INDICES, Value::indices([1, 2])));

        let view = t.view();
        let m = view.numeric(CENTROID).unwrap();
        assert_eq!(m.dim(), (3, 2));
        assert_eq!(m[[0, 1]], 2.0);
        assert!(m[[1, 0]].is_nan());
        assert_eq!(m[[2, 0]], 3.0);

        let px = view.ragged(PIXEL_INDICES).unwrap();
        assert_eq!(px.len(), 3);
        assert!(px[0].is_empty());
    }

    #[test]
    fn test_view_mixed_widths_stay_ragged() {
        let mut t = TrackData::new(1, 1, &Detection::new().with("Feature", [1.0, 2.0]));
        t.set_frame(2, &Detection::new().with("Feature", [1.0, 2.0, 3.0]));
        assert!(t.view().ragged("Feature").is_some());
    }
}
