use crate::plan::TimeRange;

use super::error::{ExecutorError, ExecutorResult};

const EPSILON: f64 = 1e-6;

/// Contiguous slice of the source track, in source seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    pub source_start: f64,
    pub source_end: f64,
}

impl Segment {
    pub fn duration(&self) -> f64 {
        (self.source_end - self.source_start).max(0.0)
    }
}

/// Ordered view over the source track. Cuts and reorders always address
/// the CURRENT timeline, so each applied operation changes the coordinate
/// space the next one sees.
#[derive(Debug, Clone)]
pub struct Timeline {
    segments: Vec<Segment>,
}

impl Timeline {
    pub fn from_duration(duration: f64) -> Self {
        let segments = if duration > EPSILON {
            vec![Segment {
                source_start: 0.0,
                source_end: duration,
            }]
        } else {
            Vec::new()
        };
        Self { segments }
    }

    pub fn duration(&self) -> f64 {
        self.segments.iter().map(Segment::duration).sum()
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Removes the given timeline ranges. Returns the number of seconds
    /// actually removed. Ranges beyond the current duration are a plan
    /// integrity failure, not something to silently clamp.
    pub fn cut(&mut self, ranges: &[TimeRange]) -> ExecutorResult<f64> {
        let total = self.duration();
        for range in ranges {
            if !range.is_well_formed() {
                return Err(ExecutorError::PlanIntegrity(format!(
                    "malformed cut range {:.3}..{:.3}",
                    range.start, range.end
                )));
            }
            if range.end > total + EPSILON {
                return Err(ExecutorError::PlanIntegrity(format!(
                    "cut range {:.3}..{:.3} exceeds timeline duration {total:.3}",
                    range.start, range.end
                )));
            }
        }
        let cuts = normalize(ranges);
        let mut next = Vec::with_capacity(self.segments.len() + cuts.len());
        let mut removed = 0.0;
        let mut offset = 0.0;
        for segment in &self.segments {
            let length = segment.duration();
            let t0 = offset;
            let t1 = offset + length;
            let mut cursor = t0;
            for cut in &cuts {
                if cut.end <= cursor || cut.start >= t1 {
                    continue;
                }
                let cs = cut.start.max(cursor);
                let ce = cut.end.min(t1);
                if cs > cursor + EPSILON {
                    next.push(Segment {
                        source_start: segment.source_start + (cursor - t0),
                        source_end: segment.source_start + (cs - t0),
                    });
                }
                removed += ce - cs;
                cursor = ce;
            }
            if cursor < t1 - EPSILON {
                next.push(Segment {
                    source_start: segment.source_start + (cursor - t0),
                    source_end: segment.source_end,
                });
            }
            offset = t1;
        }
        self.segments = next;
        Ok(removed)
    }

    /// Rearranges segments. `order` must be a permutation of the current
    /// segment indices.
    pub fn reorder(&mut self, order: &[usize]) -> ExecutorResult<()> {
        if order.len() != self.segments.len() {
            return Err(ExecutorError::PlanIntegrity(format!(
                "reorder lists {} segments, timeline has {}",
                order.len(),
                self.segments.len()
            )));
        }
        let mut seen = vec![false; self.segments.len()];
        for index in order {
            match seen.get_mut(*index) {
                Some(slot) if !*slot => *slot = true,
                Some(_) => {
                    return Err(ExecutorError::PlanIntegrity(format!(
                        "reorder repeats segment index {index}"
                    )))
                }
                None => {
                    return Err(ExecutorError::PlanIntegrity(format!(
                        "reorder references missing segment index {index}"
                    )))
                }
            }
        }
        self.segments = order.iter().map(|index| self.segments[*index]).collect();
        Ok(())
    }

    /// Projects source-coordinate ranges onto the current timeline. Parts
    /// that were cut away simply disappear; adjacent survivors merge.
    pub fn map_source_ranges(&self, ranges: &[TimeRange]) -> Vec<TimeRange> {
        let mut mapped = Vec::new();
        for range in ranges {
            let mut offset = 0.0;
            for segment in &self.segments {
                let is = range.start.max(segment.source_start);
                let ie = range.end.min(segment.source_end);
                if ie - is > EPSILON {
                    mapped.push(TimeRange::new(
                        offset + (is - segment.source_start),
                        offset + (ie - segment.source_start),
                    ));
                }
                offset += segment.duration();
            }
        }
        normalize(&mapped)
    }

    /// Source position of a timeline instant, or `None` past the end.
    pub fn source_position(&self, timeline_time: f64) -> Option<f64> {
        if timeline_time < 0.0 {
            return None;
        }
        let mut offset = 0.0;
        for segment in &self.segments {
            let length = segment.duration();
            if timeline_time < offset + length {
                return Some(segment.source_start + (timeline_time - offset));
            }
            offset += length;
        }
        None
    }
}

fn normalize(ranges: &[TimeRange]) -> Vec<TimeRange> {
    let mut sorted: Vec<TimeRange> = ranges
        .iter()
        .copied()
        .filter(TimeRange::is_well_formed)
        .collect();
    sorted.sort_by(|a, b| a.start.partial_cmp(&b.start).unwrap_or(std::cmp::Ordering::Equal));
    let mut merged: Vec<TimeRange> = Vec::with_capacity(sorted.len());
    for range in sorted {
        match merged.last_mut() {
            Some(last) if range.start <= last.end + EPSILON => {
                last.end = last.end.max(range.end);
            }
            _ => merged.push(range),
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cut_removes_middle_and_shifts_coordinates() {
        let mut timeline = Timeline::from_duration(10.0);
        let removed = timeline.cut(&[TimeRange::new(2.0, 4.0)]).unwrap();
        assert!((removed - 2.0).abs() < 1e-9);
        assert!((timeline.duration() - 8.0).abs() < 1e-9);
        assert_eq!(timeline.segments().len(), 2);
        // Timeline second 2.0 now addresses source second 4.0.
        assert!((timeline.source_position(2.0).unwrap() - 4.0).abs() < 1e-9);
    }

    #[test]
    fn sequential_cuts_address_the_updated_timeline() {
        let mut timeline = Timeline::from_duration(10.0);
        timeline.cut(&[TimeRange::new(0.0, 2.0)]).unwrap();
        // After removing the first two seconds, cutting 0..1 removes
        // source seconds 2..3.
        timeline.cut(&[TimeRange::new(0.0, 1.0)]).unwrap();
        assert!((timeline.source_position(0.0).unwrap() - 3.0).abs() < 1e-9);
        assert!((timeline.duration() - 7.0).abs() < 1e-9);
    }

    #[test]
    fn cut_past_duration_is_rejected() {
        let mut timeline = Timeline::from_duration(5.0);
        let err = timeline.cut(&[TimeRange::new(4.0, 6.0)]).unwrap_err();
        assert!(matches!(err, ExecutorError::PlanIntegrity(_)));
        assert!((timeline.duration() - 5.0).abs() < 1e-9);
    }

    #[test]
    fn reorder_validates_permutation() {
        let mut timeline = Timeline::from_duration(10.0);
        timeline.cut(&[TimeRange::new(4.0, 6.0)]).unwrap();
        assert_eq!(timeline.segments().len(), 2);
        assert!(timeline.reorder(&[1, 1]).is_err());
        assert!(timeline.reorder(&[0]).is_err());
        timeline.reorder(&[1, 0]).unwrap();
        assert!((timeline.source_position(0.0).unwrap() - 6.0).abs() < 1e-9);
    }

    #[test]
    fn map_source_ranges_drops_cut_material() {
        let mut timeline = Timeline::from_duration(10.0);
        timeline.cut(&[TimeRange::new(2.0, 4.0)]).unwrap();
        let mapped = timeline.map_source_ranges(&[TimeRange::new(1.0, 5.0)]);
        // Source 1..2 survives at timeline 1..2, source 4..5 at 2..3,
        // and the two survivors are adjacent so they merge.
        assert_eq!(mapped.len(), 1);
        assert!((mapped[0].start - 1.0).abs() < 1e-9);
        assert!((mapped[0].end - 3.0).abs() < 1e-9);
    }

    #[test]
    fn empty_timeline_reports_zero_duration() {
        let timeline = Timeline::from_duration(0.0);
        assert!(timeline.is_empty());
        assert_eq!(timeline.source_position(0.0), None);
    }
}
