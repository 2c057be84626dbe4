//! Single-pass accumulation over sorted markers.

use chrono::Duration;

use crate::marker::{Marker, MarkerKind};

/// Sweep state between two consecutive markers.
#[derive(Debug, Clone, Copy, Default)]
struct SweepState {
    working_depth: u32,
    exclusion_depth: u32,
    measuring: bool,
}

impl SweepState {
    /// Time counts while measuring, inside any working window, and outside
    /// every exclusion. Depth `> 0` (not `== 1`) keeps overlapping windows
    /// from double counting.
    const fn counts(self) -> bool {
        self.measuring && self.working_depth > 0 && self.exclusion_depth == 0
    }

    fn apply(&mut self, kind: MarkerKind) {
        // Every interval reaching the sweep has start <= stop, and the rank
        // tie-break orders a start before its own stop at equal instants.
        match kind {
            MarkerKind::WorkStart => self.working_depth += 1,
            MarkerKind::WorkStop => {
                debug_assert!(self.working_depth > 0, "working window closed before it opened");
                self.working_depth = self.working_depth.saturating_sub(1);
            }
            MarkerKind::ExclusionStart => self.exclusion_depth += 1,
            MarkerKind::ExclusionStop => {
                debug_assert!(self.exclusion_depth > 0, "exclusion ended before it started");
                self.exclusion_depth = self.exclusion_depth.saturating_sub(1);
            }
            MarkerKind::MeasureStart => self.measuring = true,
            MarkerKind::MeasureStop => self.measuring = false,
        }
    }
}

/// Sorts `markers` and returns the working time they describe.
pub fn accumulate(mut markers: Vec<Marker>) -> Duration {
    markers.sort_unstable_by_key(Marker::sort_key);

    let mut state = SweepState::default();
    let mut total = Duration::zero();
    let mut previous: Option<&Marker> = None;

    for marker in &markers {
        if let Some(previous) = previous {
            if state.counts() {
                total += marker.instant - previous.instant;
            }
        }
        state.apply(marker.kind);
        previous = Some(marker);
    }

    tracing::trace!(markers = markers.len(), total_ms = total.num_milliseconds(), "sweep complete");
    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2020, 8, 31, hour, minute, 0).unwrap()
    }

    fn marker(kind: MarkerKind, instant: DateTime<Utc>) -> Marker {
        Marker::new(kind, instant, "")
    }

    fn window(start: DateTime<Utc>, stop: DateTime<Utc>) -> [Marker; 2] {
        [
            marker(MarkerKind::WorkStart, start),
            marker(MarkerKind::WorkStop, stop),
        ]
    }

    fn exclusion(start: DateTime<Utc>, stop: DateTime<Utc>) -> [Marker; 2] {
        [
            marker(MarkerKind::ExclusionStart, start),
            marker(MarkerKind::ExclusionStop, stop),
        ]
    }

    fn measure(start: DateTime<Utc>, stop: DateTime<Utc>) -> [Marker; 2] {
        [
            marker(MarkerKind::MeasureStart, start),
            marker(MarkerKind::MeasureStop, stop),
        ]
    }

    #[test]
    fn empty_list_is_zero() {
        assert_eq!(accumulate(Vec::new()), Duration::zero());
    }

    #[test]
    fn counts_only_inside_measurement() {
        let mut markers = window(at(9, 0), at(17, 0)).to_vec();
        markers.extend(measure(at(8, 0), at(10, 30)));

        assert_eq!(accumulate(markers), Duration::minutes(90));
    }

    #[test]
    fn window_opened_before_measurement_counts_from_measure_start() {
        let mut markers = window(at(9, 0), at(17, 0)).to_vec();
        markers.extend(measure(at(12, 0), at(20, 0)));

        assert_eq!(accumulate(markers), Duration::hours(5));
    }

    #[test]
    fn overlapping_windows_count_once() {
        let mut markers = window(at(9, 0), at(13, 0)).to_vec();
        markers.extend(window(at(11, 0), at(15, 0)));
        markers.extend(measure(at(0, 0), at(23, 0)));

        assert_eq!(accumulate(markers), Duration::hours(6));
    }

    #[test]
    fn any_exclusion_suppresses_all_windows() {
        let mut markers = window(at(9, 0), at(17, 0)).to_vec();
        markers.extend(window(at(9, 0), at(17, 0)));
        markers.extend(exclusion(at(10, 0), at(12, 0)));
        markers.extend(exclusion(at(11, 0), at(13, 0)));
        markers.extend(measure(at(0, 0), at(23, 0)));

        // 9-10 and 13-17.
        assert_eq!(accumulate(markers), Duration::hours(5));
    }

    #[test]
    fn boundary_markers_at_measure_start_take_effect_first() {
        // Window opens and an exclusion closes exactly when measurement starts.
        let mut markers = vec![marker(MarkerKind::MeasureStart, at(9, 0))];
        markers.extend(exclusion(at(8, 0), at(9, 0)));
        markers.extend(window(at(9, 0), at(10, 0)));
        markers.push(marker(MarkerKind::MeasureStop, at(12, 0)));

        assert_eq!(accumulate(markers), Duration::hours(1));
    }

    #[test]
    fn measure_stop_at_window_stop_keeps_final_span() {
        let mut markers = measure(at(9, 0), at(10, 0)).to_vec();
        markers.extend(exclusion(at(10, 0), at(11, 0)));
        markers.extend(window(at(9, 0), at(10, 0)));

        assert_eq!(accumulate(markers), Duration::hours(1));
    }

    #[test]
    fn adjacent_windows_do_not_underflow() {
        // One window stops exactly when the next starts.
        let mut markers = window(at(10, 0), at(11, 0)).to_vec();
        markers.extend(window(at(9, 0), at(10, 0)));
        markers.extend(measure(at(9, 30), at(10, 30)));

        assert_eq!(accumulate(markers), Duration::hours(1));
    }

    #[test]
    fn zero_width_measurement_is_zero() {
        let mut markers = window(at(9, 0), at(17, 0)).to_vec();
        markers.extend(measure(at(12, 0), at(12, 0)));

        assert_eq!(accumulate(markers), Duration::zero());
    }
}
