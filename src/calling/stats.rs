use super::pileup::Context;
use crate::realign::RealignStats;

/// Counters collected while calling, merged across windows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallStats {
    /// Methylation calls per context, indexed by [`Context::index`].
    pub context_counts: [usize; 3],
    pub context_meth_sums: [f64; 3],
    pub positions_evaluated: usize,
    pub snps_called: usize,
    pub count_cov_too_low: usize,
    pub count_cov_too_high: usize,
    pub count_score_too_low: usize,
    /// Newton iterations that had to fall back to the grid search.
    pub count_plan_b: usize,
    pub count_no_plan_b: usize,
    pub groups_skipped: usize,
    pub realign: RealignStats,
}

impl CallStats {
    pub fn record_methylation(&mut self, context: Context, level: f64) {
        self.context_counts[context.index()] += 1;
        self.context_meth_sums[context.index()] += level;
    }

    pub fn mean_methylation(&self, context: Context) -> Option<f64> {
        let n = self.context_counts[context.index()];
        (n > 0).then(|| self.context_meth_sums[context.index()] / n as f64)
    }

    pub fn merge(&mut self, other: &CallStats) {
        for i in 0..3 {
            self.context_counts[i] += other.context_counts[i];
            self.context_meth_sums[i] += other.context_meth_sums[i];
        }
        self.positions_evaluated += other.positions_evaluated;
        self.snps_called += other.snps_called;
        self.count_cov_too_low += other.count_cov_too_low;
        self.count_cov_too_high += other.count_cov_too_high;
        self.count_score_too_low += other.count_score_too_low;
        self.count_plan_b += other.count_plan_b;
        self.count_no_plan_b += other.count_no_plan_b;
        self.groups_skipped += other.groups_skipped;
        self.realign.merge(&other.realign);
    }

    pub fn log_summary(&self) {
        for context in [Context::Cg, Context::Chg, Context::Chh] {
            let mean = self
                .mean_methylation(context)
                .map_or_else(|| "NA".to_string(), |m| format!("{:.4}", m));
            log::info!(
                "{}: {} methylation calls, mean level {}",
                context.as_str(),
                self.context_counts[context.index()],
                mean
            );
        }
        log::info!(
            "Evaluated {} positions, called {} SNPs",
            self.positions_evaluated,
            self.snps_called
        );
        log::info!(
            "Skipped: {} one-sided coverage, {} excessive coverage, {} low score",
            self.count_cov_too_low,
            self.count_cov_too_high,
            self.count_score_too_low
        );
        log::info!(
            "Realigned {} groups in {} passes; Newton fallbacks {}/{}",
            self.realign.groups,
            self.realign.passes,
            self.count_plan_b,
            self.count_plan_b + self.count_no_plan_b
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_and_mean() {
        let mut total = CallStats::default();
        total.record_methylation(Context::Cg, 0.8);
        let mut other = CallStats::default();
        other.record_methylation(Context::Cg, 0.4);
        other.record_methylation(Context::Chh, 0.1);
        other.count_plan_b = 2;
        other.realign.groups = 1;
        total.merge(&other);

        assert_eq!(total.context_counts, [2, 0, 1]);
        assert!((total.mean_methylation(Context::Cg).unwrap() - 0.6).abs() < 1e-12);
        assert_eq!(total.mean_methylation(Context::Chg), None);
        assert_eq!(total.count_plan_b, 2);
        assert_eq!(total.realign.groups, 1);
    }
}
