use std::time::Duration;

/// Summary statistics over a variant's timing samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stats {
    pub min: Duration,
    pub median: Duration,
    pub max: Duration,
}

impl Stats {
    /// `None` when there are no samples.
    pub fn from_samples(samples: &[Duration]) -> Option<Stats> {
        if samples.is_empty() {
            return None;
        }
        let mut sorted = samples.to_vec();
        sorted.sort();

        let mid = sorted.len() / 2;
        let median = if sorted.len() % 2 == 0 {
            (sorted[mid - 1] + sorted[mid]) / 2
        } else {
            sorted[mid]
        };

        Some(Stats {
            min: sorted[0],
            median,
            max: *sorted.last().unwrap(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn empty_samples_have_no_stats() {
        assert_eq!(Stats::from_samples(&[]), None);
    }

    #[test]
    fn odd_count_takes_middle() {
        let stats = Stats::from_samples(&[ms(30), ms(10), ms(20)]).unwrap();
        assert_eq!(stats.min, ms(10));
        assert_eq!(stats.median, ms(20));
        assert_eq!(stats.max, ms(30));
    }

    #[test]
    fn even_count_averages_middle_pair() {
        let stats = Stats::from_samples(&[ms(40), ms(10), ms(30), ms(20)]).unwrap();
        assert_eq!(stats.min, ms(10));
        assert_eq!(stats.median, ms(25));
        assert_eq!(stats.max, ms(40));
    }

    #[test]
    fn single_sample() {
        let stats = Stats::from_samples(&[ms(7)]).unwrap();
        assert_eq!(stats.min, ms(7));
        assert_eq!(stats.median, ms(7));
        assert_eq!(stats.max, ms(7));
    }
}
