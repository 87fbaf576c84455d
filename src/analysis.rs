use super::Histogram;

impl Histogram {
    /// Calculate the approximate mean of all recorded values, weighting each
    /// bucket at the middle of its equivalence range.
    pub fn mean(&self) -> f64 {
        if self.total_count() == 0 {
            return 0.0;
        }
        self.iter_recorded().fold(0.0, |total, s| {
            total
                + self.median_equivalent(s.value_iterated_to) as f64
                    * s.count_at_value_iterated_to as f64
                    / self.total_count() as f64
        })
    }

    /// Calculate the approximate standard deviation of all recorded values.
    pub fn stdev(&self) -> f64 {
        if self.total_count() == 0 {
            return 0.0;
        }
        let mean = self.mean();
        let geometric_dev_total = self.iter_recorded().fold(0.0, |total, s| {
            let dev = self.median_equivalent(s.value_iterated_to) as f64 - mean;
            total + dev * dev * s.count_added_in_this_step as f64
        });
        (geometric_dev_total / self.total_count() as f64).sqrt()
    }

    /// The value at or below which `percentile` percent of the recorded
    /// values fall (equivalence-range bound), or 0 if nothing was recorded.
    ///
    /// `percentile` above 100.0 is truncated to 100.0; a percentile of 0.0
    /// yields the lowest recorded value bound.
    pub fn value_at_percentile(&self, percentile: f64) -> u64 {
        let percentile = percentile.min(100.0);
        let mut count_at_percentile =
            ((percentile / 100.0) * self.total_count() as f64 + 0.5) as u64;
        // Reach at least the first recorded entry.
        if count_at_percentile < 1 {
            count_at_percentile = 1;
        }
        let mut total = 0u64;
        for index in 0..self.counts_len() {
            total += self.count_at_index(index);
            if total >= count_at_percentile {
                let value = self.value_at_index(index);
                return if percentile == 0.0 {
                    self.lowest_equivalent(value)
                } else {
                    self.highest_equivalent(value)
                };
            }
        }
        0
    }

    /// The percentile of recorded values at or below `value`'s equivalence
    /// range. 100.0 when nothing was recorded.
    pub fn percentile_below(&self, value: u64) -> f64 {
        if self.total_count() == 0 {
            return 100.0;
        }
        let target_index = self.index_for(value).min(self.counts_len() - 1);
        let total: u64 = (0..=target_index).map(|i| self.count_at_index(i)).sum();
        (100.0 * total as f64) / self.total_count() as f64
    }

    /// The highest recorded value bound, or 0 if nothing was recorded.
    pub fn max(&self) -> u64 {
        self.iter_recorded().last().map_or(0, |s| s.value_iterated_to)
    }

    /// The lowest recorded value bound, or 0 if nothing was recorded.
    pub fn min(&self) -> u64 {
        self.iter_recorded()
            .next()
            .map_or(0, |s| self.lowest_equivalent(s.value_iterated_to))
    }
}
