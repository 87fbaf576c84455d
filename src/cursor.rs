use crate::histogram::Histogram;

#[derive(Debug, Clone, Copy, PartialEq)]
/// One emitted step of a traversal: the value range stepped across, the
/// counts folded in, and the percentile reached.
///
/// A cursor owns a single snapshot and overwrites it in place on each
/// successful advance; read it (or copy it out) before advancing again.
pub struct Snapshot {
    /// The value emitted by the previous step (0 before the first).
    pub value_iterated_from: u64,
    /// The highest value equivalent to the bucket this step landed on.
    pub value_iterated_to: u64,
    /// The count stored in the bucket iterated to.
    pub count_at_value_iterated_to: u64,
    /// The count folded into the cumulative total during this step.
    pub count_added_in_this_step: u64,
    /// Cumulative count through the value iterated to.
    pub total_count_to_this_value: u64,
    /// Cumulative count-weighted value sum through the value iterated to.
    pub total_value_to_this_value: u128,
    /// The percentile actually reached at this value.
    pub percentile: f64,
    /// The percentile level the traversal policy was targeting. Percentile
    /// cursors report the target band here; `percentile` carries the exact
    /// achieved figure.
    pub percentile_level_iterated_to: f64,
    /// Multiplier rendering values in the external unit.
    pub conversion_ratio: f64,
}

#[derive(Debug)]
/// Stepping state shared by every cursor policy, bound to a histogram by
/// read-only borrow. Policies observe it through the accessors below.
pub struct Step<'h> {
    hist: &'h Histogram,
    current_index: usize,
    value_at_index: u64,
    value_at_next_index: u64,
    count_at_this_value: u64,
    total_count_to_current_index: u64,
    total_count_to_prev_index: u64,
    total_value_to_current_index: u128,
    fresh_bucket: bool,
    prev_value_iterated_to: u64,
    // Bind-time snapshots; recording during a traversal is not supported.
    total_count: u64,
    conversion_ratio: f64,
    snapshot: Option<Snapshot>,
}

impl<'h> Step<'h> {
    fn new(hist: &'h Histogram) -> Step<'h> {
        Step {
            hist,
            current_index: 0,
            value_at_index: hist.value_at_index(0),
            value_at_next_index: hist.value_at_index(1),
            count_at_this_value: 0,
            total_count_to_current_index: 0,
            total_count_to_prev_index: 0,
            total_value_to_current_index: 0,
            fresh_bucket: true,
            prev_value_iterated_to: 0,
            total_count: hist.total_count(),
            conversion_ratio: hist.conversion_ratio(),
            snapshot: None,
        }
    }

    /// Index of the bucket under the cursor.
    pub fn current_index(&self) -> usize {
        self.current_index
    }

    /// Number of slots in the bound histogram's count table.
    pub fn counts_len(&self) -> usize {
        self.hist.counts_len()
    }

    /// Representative value of the bucket under the cursor.
    pub fn value_at_current_index(&self) -> u64 {
        self.value_at_index
    }

    /// Representative value of the bucket one past the cursor.
    pub fn value_at_next_index(&self) -> u64 {
        self.value_at_next_index
    }

    /// Count stored in the bucket under the cursor, as of the last step.
    pub fn count_at_this_value(&self) -> u64 {
        self.count_at_this_value
    }

    /// Cumulative count through the bucket under the cursor.
    pub fn total_count_to_current_index(&self) -> u64 {
        self.total_count_to_current_index
    }

    /// Total count of the bound histogram, taken when the cursor was bound.
    pub fn total_count(&self) -> u64 {
        self.total_count
    }

    /// Percentile reached at the bucket under the cursor; 0.0 when the bound
    /// histogram has no recorded values.
    pub fn percentile_at_current_index(&self) -> f64 {
        if self.total_count == 0 {
            return 0.0;
        }
        (100.0 * self.total_count_to_current_index as f64) / self.total_count as f64
    }

    fn value_iterated_to(&self) -> u64 {
        self.hist.highest_equivalent(self.value_at_index)
    }

    /// Reads the bucket under the cursor, folding its count into the running
    /// totals exactly once per index.
    fn load_bucket(&mut self) {
        self.count_at_this_value = self.hist.count_at_index(self.current_index);
        if self.fresh_bucket {
            self.total_count_to_current_index += self.count_at_this_value;
            self.total_value_to_current_index +=
                u128::from(self.count_at_this_value) * u128::from(self.value_iterated_to());
            self.fresh_bucket = false;
        }
    }

    fn emit(&mut self, percentile_target: f64) {
        let value = self.value_iterated_to();
        self.snapshot = Some(Snapshot {
            value_iterated_from: self.prev_value_iterated_to,
            value_iterated_to: value,
            count_at_value_iterated_to: self.count_at_this_value,
            count_added_in_this_step: self.total_count_to_current_index
                - self.total_count_to_prev_index,
            total_count_to_this_value: self.total_count_to_current_index,
            total_value_to_this_value: self.total_value_to_current_index,
            percentile: self.percentile_at_current_index(),
            percentile_level_iterated_to: percentile_target,
            conversion_ratio: self.conversion_ratio,
        });
        self.prev_value_iterated_to = value;
        self.total_count_to_prev_index = self.total_count_to_current_index;
    }

    fn step_index(&mut self) {
        self.current_index += 1;
        self.fresh_bucket = true;
        self.value_at_index = self.hist.value_at_index(self.current_index);
        self.value_at_next_index = self.hist.value_at_index(self.current_index + 1);
    }
}

/// A traversal policy: the hooks that differentiate the cursors. One shared
/// stepping engine does the walking; implementations only decide how far it
/// goes, what it emits, and where the next target lies.
pub trait Traversal {
    /// Continuation test. Must be pure: [Cursor::advance] is the only
    /// operation that moves a cursor.
    fn has_more(&self, step: &Step<'_>) -> bool;

    /// Per-iteration bookkeeping, invoked by the advance loop before the
    /// emission test. The percentile policy uses it to arm its terminal
    /// step once the cumulative count has covered every recorded value.
    fn begin_step(&mut self, step: &Step<'_>) {
        let _ = step;
    }

    /// Emission test: does the bucket under the cursor produce a snapshot?
    fn reached_emission(&self, step: &Step<'_>) -> bool;

    /// The percentile level this policy is targeting, reported in the
    /// snapshot. Bucket-stepping policies report the achieved percentile.
    fn percentile_target(&self, step: &Step<'_>) -> f64 {
        step.percentile_at_current_index()
    }

    /// Moves the policy's internal target past the emission just produced.
    fn advance_target(&mut self, step: &Step<'_>);
}

#[derive(Debug, Default)]
/// Emit once per bucket index, every index, regardless of count.
pub struct AllBuckets {
    visited_index: Option<usize>,
}

impl Traversal for AllBuckets {
    fn has_more(&self, step: &Step<'_>) -> bool {
        step.current_index() < step.counts_len() - 1
    }

    fn reached_emission(&self, step: &Step<'_>) -> bool {
        self.visited_index != Some(step.current_index())
    }

    fn advance_target(&mut self, step: &Step<'_>) {
        self.visited_index = Some(step.current_index());
    }
}

#[derive(Debug, Default)]
/// Emit once per bucket index holding at least one recorded value.
pub struct Recorded {
    visited_index: Option<usize>,
}

impl Traversal for Recorded {
    fn has_more(&self, step: &Step<'_>) -> bool {
        step.current_index() < step.counts_len() - 1
    }

    fn reached_emission(&self, step: &Step<'_>) -> bool {
        step.count_at_this_value() != 0 && self.visited_index != Some(step.current_index())
    }

    fn advance_target(&mut self, step: &Step<'_>) {
        self.visited_index = Some(step.current_index());
    }
}

#[derive(Debug)]
/// Emit when the cumulative percentile crosses a geometrically refining
/// target sequence approaching 100%: targets spaced `ticks_per_half_distance`
/// to the half, halving their spacing each time the remaining gap to 100
/// halves, so resolution concentrates in the tail.
pub struct Percentiles {
    ticks_per_half_distance: f64,
    percentile_to_iterate_to: f64,
    percentile_to_iterate_from: f64,
    reached_last_recorded_value: bool,
}

impl Percentiles {
    /// `ticks_per_half_distance` must be positive; larger values yield more,
    /// finer-grained emissions before 100%.
    pub fn new(ticks_per_half_distance: f64) -> Percentiles {
        Percentiles {
            ticks_per_half_distance,
            percentile_to_iterate_to: 0.0,
            percentile_to_iterate_from: 0.0,
            reached_last_recorded_value: false,
        }
    }

    /// The target band's upper edge: the percentile the next emission aims
    /// for.
    pub fn percentile_to_iterate_to(&self) -> f64 {
        self.percentile_to_iterate_to
    }

    /// The target band's lower edge: the percentile the latest emission
    /// aimed for.
    pub fn percentile_to_iterate_from(&self) -> f64 {
        self.percentile_to_iterate_from
    }
}

impl Default for Percentiles {
    fn default() -> Percentiles {
        Percentiles::new(1.0)
    }
}

impl Traversal for Percentiles {
    fn has_more(&self, step: &Step<'_>) -> bool {
        if step.total_count_to_current_index() < step.total_count() {
            return true;
        }
        // One mandatory terminal step to 100%, provided anything was
        // recorded and the walk has not already run off the count table
        // (reachable only with tick densities below 0.5).
        !self.reached_last_recorded_value
            && step.total_count() > 0
            && step.current_index() < step.counts_len()
    }

    fn begin_step(&mut self, step: &Step<'_>) {
        if step.total_count_to_current_index() >= step.total_count()
            && !self.reached_last_recorded_value
        {
            self.percentile_to_iterate_to = 100.0;
            self.reached_last_recorded_value = true;
        }
    }

    fn reached_emission(&self, step: &Step<'_>) -> bool {
        step.count_at_this_value() != 0
            && step.percentile_at_current_index() >= self.percentile_to_iterate_to
    }

    fn percentile_target(&self, _step: &Step<'_>) -> f64 {
        self.percentile_to_iterate_to
    }

    fn advance_target(&mut self, _step: &Step<'_>) {
        self.percentile_to_iterate_from = self.percentile_to_iterate_to;
        let gap = 100.0 - self.percentile_to_iterate_to;
        if gap == 0.0 {
            // Already at the ceiling.
            return;
        }
        let half_distance = 2f64.powf((100.0 / gap).log2() + 1.0);
        let ticks = self.ticks_per_half_distance * half_distance;
        self.percentile_to_iterate_to += 100.0 / ticks;
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Status {
    NotStarted,
    Active,
    Exhausted,
}

#[derive(Debug)]
/// The stepping engine: walks bucket indices, accumulates running totals,
/// and emits a [Snapshot] when its [Traversal] policy says so.
///
/// A cursor holds a read-only borrow of its histogram and must not observe
/// recording; take cursors over a histogram that is quiescent.
pub struct Cursor<'h, T> {
    step: Step<'h>,
    traversal: T,
    status: Status,
}

/// Cursor over every bucket index, recorded or not.
pub type AllBucketsCursor<'h> = Cursor<'h, AllBuckets>;
/// Cursor over buckets holding at least one recorded value.
pub type RecordedCursor<'h> = Cursor<'h, Recorded>;
/// Cursor over percentile steps refining toward 100%.
pub type PercentileCursor<'h> = Cursor<'h, Percentiles>;

impl<'h, T: Traversal> Cursor<'h, T> {
    /// Binds a cursor with the given traversal policy to `hist`, snapshotting
    /// its total count and conversion ratio.
    pub fn new(hist: &'h Histogram, traversal: T) -> Cursor<'h, T> {
        Cursor {
            step: Step::new(hist),
            traversal,
            status: Status::NotStarted,
        }
    }

    /// This function runs the stepping loop until the policy emits or the
    /// traversal ends, returning the freshly written snapshot, or `None` on
    /// normal end-of-traversal.
    pub fn advance(&mut self) -> Option<&Snapshot> {
        if self.status == Status::Exhausted {
            return None;
        }
        self.status = Status::Active;
        loop {
            if !self.traversal.has_more(&self.step) {
                self.status = Status::Exhausted;
                return None;
            }
            self.traversal.begin_step(&self.step);
            self.step.load_bucket();
            if self.traversal.reached_emission(&self.step) {
                let target = self.traversal.percentile_target(&self.step);
                self.step.emit(target);
                self.traversal.advance_target(&self.step);
                return self.step.snapshot.as_ref();
            }
            self.step.step_index();
        }
    }

    /// Whether the traversal still has buckets to scan. Pure; `true` does
    /// not guarantee a further emission (trailing empty buckets produce
    /// none).
    pub fn has_more(&self) -> bool {
        self.status != Status::Exhausted && self.traversal.has_more(&self.step)
    }

    /// Whether the cursor has reached normal termination.
    pub fn is_exhausted(&self) -> bool {
        self.status == Status::Exhausted || !self.traversal.has_more(&self.step)
    }

    /// The snapshot produced by the most recent emission; `None` before the
    /// first.
    pub fn snapshot(&self) -> Option<&Snapshot> {
        self.step.snapshot.as_ref()
    }

    /// The traversal policy driving this cursor.
    pub fn traversal(&self) -> &T {
        &self.traversal
    }
}

impl<T: Traversal + Default> Cursor<'static, T> {
    /// A past-the-end cursor, backed by a distinguished empty histogram.
    /// Useful as the terminal side of an equality-driven loop.
    pub fn end() -> Cursor<'static, T> {
        Cursor {
            step: Step::new(Histogram::sentinel()),
            traversal: T::default(),
            status: Status::Exhausted,
        }
    }
}

/// Cursors are equal only when both are exhausted: this is sentinel
/// equality for detecting the end of a traversal, not a position compare.
/// Two active cursors are never equal, even at identical positions.
impl<'a, 'b, T: Traversal> PartialEq<Cursor<'b, T>> for Cursor<'a, T> {
    fn eq(&self, other: &Cursor<'b, T>) -> bool {
        self.is_exhausted() && other.is_exhausted()
    }
}

impl<T: Traversal> Iterator for Cursor<'_, T> {
    type Item = Snapshot;

    fn next(&mut self) -> Option<Snapshot> {
        self.advance().copied()
    }
}

impl Histogram {
    /// A cursor stepping every bucket index in order, emitting each exactly
    /// once whether or not anything was recorded there.
    pub fn iter_all(&self) -> AllBucketsCursor<'_> {
        Cursor::new(self, AllBuckets::default())
    }

    /// A cursor stepping bucket indices in order, emitting exactly once per
    /// bucket holding at least one recorded value.
    pub fn iter_recorded(&self) -> RecordedCursor<'_> {
        Cursor::new(self, Recorded::default())
    }

    /// A cursor emitting at percentile targets that refine geometrically
    /// toward 100%, with a mandatory final step at exactly 100% whenever the
    /// histogram holds any values.
    pub fn iter_percentiles(&self, ticks_per_half_distance: f64) -> PercentileCursor<'_> {
        Cursor::new(self, Percentiles::new(ticks_per_half_distance))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::prelude::*;

    #[test]
    fn recorded_steps() {
        let h = hist![1, 1, 2, 2, 2, 5];
        let mut c = h.iter_recorded();
        assert!(c.snapshot().is_none());

        let s = *c.advance().unwrap();
        assert_eq!(s.value_iterated_from, 0);
        assert_eq!(s.value_iterated_to, 1);
        assert_eq!(s.count_at_value_iterated_to, 2);
        assert_eq!(s.count_added_in_this_step, 2);
        assert_eq!(s.total_count_to_this_value, 2);
        assert_relative_eq!(s.percentile, 100.0 * 2.0 / 6.0);

        let s = *c.advance().unwrap();
        assert_eq!(s.value_iterated_from, 1);
        assert_eq!(s.value_iterated_to, 2);
        assert_eq!(s.count_added_in_this_step, 3);
        assert_eq!(s.total_count_to_this_value, 5);

        let s = *c.advance().unwrap();
        assert_eq!(s.value_iterated_to, 5);
        assert_eq!(s.count_added_in_this_step, 1);
        assert_eq!(s.total_count_to_this_value, 6);
        assert_eq!(s.percentile, 100.0);

        assert!(c.advance().is_none());
        assert!(c.is_exhausted());
        assert!(c.advance().is_none());
    }

    #[test]
    fn recorded_weighted_sum() {
        let h = hist![1, 1, 2, 2, 2, 5];
        let last = h.iter_recorded().last().unwrap();
        assert_eq!(last.total_value_to_this_value, 2 * 1 + 3 * 2 + 5);
    }

    #[test]
    fn all_buckets_emits_every_index() {
        let h = hist![];
        assert_eq!(h.iter_all().count(), h.counts_len() - 1);

        let h = hist![1, 1, 2, 2, 2, 5];
        let steps: Vec<Snapshot> = h.iter_all().collect();
        assert_eq!(steps.len(), h.counts_len() - 1);
        assert_eq!(steps.iter().map(|s| s.count_added_in_this_step).sum::<u64>(), 6);
        assert_eq!(steps.iter().filter(|s| s.count_at_value_iterated_to != 0).count(), 3);
    }

    #[test]
    fn percentile_targets_refine_to_100() {
        let h = hist![1, 1, 2, 2, 2, 5];
        let steps: Vec<Snapshot> = h.iter_percentiles(1.0).collect();
        let targets: Vec<f64> = steps.iter().map(|s| s.percentile_level_iterated_to).collect();
        assert_eq!(targets, vec![0.0, 50.0, 75.0, 87.5, 100.0]);
        let values: Vec<u64> = steps.iter().map(|s| s.value_iterated_to).collect();
        assert_eq!(values, vec![1, 2, 2, 5, 5]);
        // The achieved percentile is exact even where the target band is
        // coarse.
        assert_relative_eq!(steps[1].percentile, 100.0 * 5.0 / 6.0);
        assert_eq!(steps.last().unwrap().percentile, 100.0);
    }

    #[test]
    fn percentile_target_band() {
        let h = hist![1, 1, 2, 2, 2, 5];
        let mut c = h.iter_percentiles(1.0);
        assert_eq!(c.traversal().percentile_to_iterate_to(), 0.0);
        c.advance().unwrap();
        assert_eq!(c.traversal().percentile_to_iterate_from(), 0.0);
        assert_eq!(c.traversal().percentile_to_iterate_to(), 50.0);
        c.advance().unwrap();
        assert_eq!(c.traversal().percentile_to_iterate_from(), 50.0);
        assert_eq!(c.traversal().percentile_to_iterate_to(), 75.0);
    }

    #[test]
    fn percentile_targets_strictly_increase() {
        let mut h = hist![];
        for v in 1..=1000u64 {
            h.record(v).unwrap();
        }
        for ticks in [1.0, 5.0, 20.0] {
            let targets: Vec<f64> = h
                .iter_percentiles(ticks)
                .map(|s| s.percentile_level_iterated_to)
                .collect();
            assert!(targets.windows(2).all(|w| w[0] < w[1]), "ticks {}", ticks);
            assert!(targets.iter().all(|t| *t <= 100.0));
            assert_eq!(*targets.last().unwrap(), 100.0);
        }
        // Finer ticks, more emissions.
        assert!(h.iter_percentiles(20.0).count() > h.iter_percentiles(1.0).count());
    }

    #[test]
    fn zero_population() {
        let h = hist![];
        assert!(h.iter_recorded().next().is_none());
        assert!(h.iter_percentiles(1.0).next().is_none());
        assert!(!h.iter_percentiles(1.0).has_more());
        // All-buckets still walks the whole table, NaN-free.
        assert!(h.iter_all().all(|s| s.count_added_in_this_step == 0 && s.percentile == 0.0));
    }

    #[test]
    fn recorded_sum_matches_population() {
        let mut rng = rand::rng();
        let mut h = hist![];
        let mut recorded = 0u64;
        for _ in 0..10_000 {
            h.record(rng.random::<u64>() % 50_000 + 1).unwrap();
            recorded += 1;
        }
        let total: u64 = h.iter_recorded().map(|s| s.count_added_in_this_step).sum();
        assert_eq!(total, recorded);
    }

    #[test]
    fn lockstep_determinism() {
        let mut rng = rand::rng();
        let mut h = hist![];
        for _ in 0..1_000 {
            h.record(rng.random::<u64>() % 10_000 + 1).unwrap();
        }
        let mut a = h.iter_recorded();
        let mut b = h.iter_recorded();
        loop {
            match (a.advance().copied(), b.advance().copied()) {
                (Some(x), Some(y)) => assert_eq!(x, y),
                (None, None) => break,
                _ => panic!("cursors diverged"),
            }
        }
        let p1: Vec<Snapshot> = h.iter_percentiles(5.0).collect();
        let p2: Vec<Snapshot> = h.iter_percentiles(5.0).collect();
        assert_eq!(p1, p2);
    }

    #[test]
    fn iterator_matches_protocol() {
        let h = hist![3, 9, 9, 27, 81, 81, 81];
        let collected: Vec<Snapshot> = h.iter_recorded().collect();
        let mut stepped = Vec::new();
        let mut c = h.iter_recorded();
        while let Some(s) = c.advance() {
            stepped.push(*s);
        }
        assert_eq!(collected, stepped);
    }

    #[test]
    fn sentinel_equality() {
        let h = hist![1, 2, 3];
        let mut c = h.iter_recorded();
        let mut other = h.iter_recorded();
        assert!(c != RecordedCursor::end());
        // Two active cursors are never equal, even at identical positions.
        assert!(c != other);

        while c.advance().is_some() {}
        assert!(c == RecordedCursor::end());
        assert!(c != other);

        while other.advance().is_some() {}
        assert!(c == other);
        assert!(AllBucketsCursor::end() == AllBucketsCursor::end());
    }

    #[test]
    fn queries_do_not_move_the_cursor() {
        let h = hist![1, 2, 3];
        let c = h.iter_percentiles(1.0);
        for _ in 0..10 {
            assert!(c.has_more());
            assert!(!c.is_exhausted());
        }
        assert!(c.snapshot().is_none());
    }

    #[test]
    fn conversion_ratio_flows_into_snapshots() {
        let mut h = hist![];
        h.set_conversion_ratio(1e-9);
        h.record(1_500).unwrap();
        let s = h.iter_recorded().next().unwrap();
        assert_eq!(s.conversion_ratio, 1e-9);
    }
}
