use std::fmt;

use super::trial::{TrialOutcome, TrialStatus};

/// Running totals over the trials of one campaign.
#[derive(Debug, Clone, Default)]
pub struct CampaignStats {
    pub trials: u64,
    counts: [u64; TrialStatus::ALL.len()],
    /// `(trial_id, distance)` of the longest measured throw
    pub best: Option<(u64, f64)>,
    distance_sum: f64,
}

fn slot(status: TrialStatus) -> usize {
    TrialStatus::ALL
        .iter()
        .position(|&s| s == status)
        .unwrap_or_default()
}

impl CampaignStats {
    pub fn record(&mut self, outcome: &TrialOutcome) {
        self.trials += 1;
        self.counts[slot(outcome.status)] += 1;
        if let Some(distance) = outcome.distance {
            self.distance_sum += distance;
            if self.best.is_none_or(|(_, best)| distance > best) {
                self.best = Some((outcome.trial_id, distance));
            }
        }
    }

    pub fn count(&self, status: TrialStatus) -> u64 {
        self.counts[slot(status)]
    }

    pub fn mean_distance(&self) -> Option<f64> {
        let measured = self.count(TrialStatus::Measured);
        (measured > 0).then(|| self.distance_sum / measured as f64)
    }
}

impl fmt::Display for CampaignStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} trials:", self.trials)?;
        for (i, status) in TrialStatus::ALL.iter().enumerate() {
            let sep = if i == 0 { " " } else { ", " };
            write!(f, "{}{} {}", sep, self.counts[i], status)?;
        }
        if let Some((trial, best)) = self.best {
            write!(f, "; best {:.2} m (trial {})", best, trial)?;
        }
        if let Some(mean) = self.mean_distance() {
            write!(f, ", mean {:.2} m", mean)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::TrialParameters;

    fn outcome(id: u64, status: TrialStatus, distance: Option<f64>) -> TrialOutcome {
        let params = TrialParameters::new(None, 500, 30, 55, 55, 0, 400).unwrap();
        TrialOutcome::new(id, params, status, distance, 10, None)
    }

    #[test]
    fn test_counts_and_best() {
        let mut stats = CampaignStats::default();
        stats.record(&outcome(1, TrialStatus::Measured, Some(80.0)));
        stats.record(&outcome(2, TrialStatus::Measured, Some(90.5)));
        stats.record(&outcome(3, TrialStatus::Fault, None));
        stats.record(&outcome(4, TrialStatus::Rejected, None));

        assert_eq!(stats.trials, 4);
        assert_eq!(stats.count(TrialStatus::Measured), 2);
        assert_eq!(stats.count(TrialStatus::TimedOut), 0);
        assert_eq!(stats.best, Some((2, 90.5)));
        assert_eq!(stats.mean_distance(), Some(85.25));
        assert_eq!(
            stats.to_string(),
            "4 trials: 2 measured, 1 fault, 0 unreadable, 0 timed_out, 1 rejected; best 90.50 m (trial 2), mean 85.25 m"
        );
    }

    #[test]
    fn test_empty_summary() {
        let stats = CampaignStats::default();
        assert_eq!(stats.mean_distance(), None);
        assert!(stats.to_string().starts_with("0 trials: 0 measured"));
    }
}
