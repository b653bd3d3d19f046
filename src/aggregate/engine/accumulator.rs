//! Running aggregates.

use crate::aggregate::config::Aggregator;

/// Folds one measure over every record that reaches a node
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Accumulator {
    records: u64,
    numeric: u64,
    sum: f64,
    min: Option<f64>,
    max: Option<f64>,
}

impl Accumulator {
    /// Adds one record; `value` is `None` when the measure is missing or not numeric
    pub fn push(&mut self, value: Option<f64>) {
        self.records += 1;
        if let Some(v) = value {
            self.numeric += 1;
            self.sum += v;
            self.min = Some(self.min.map_or(v, |m| m.min(v)));
            self.max = Some(self.max.map_or(v, |m| m.max(v)));
        }
    }

    pub fn records(&self) -> u64 {
        self.records
    }

    /// Records whose measure was numeric
    pub fn numeric(&self) -> u64 {
        self.numeric
    }

    /// Missing results read as zero
    pub fn result(&self, aggregator: Aggregator) -> f64 {
        match aggregator {
            Aggregator::Count => self.records as f64,
            Aggregator::Sum => self.sum,
            Aggregator::Avg if self.numeric > 0 => self.sum / self.numeric as f64,
            Aggregator::Avg => 0.0,
            Aggregator::Min => self.min.unwrap_or(0.0),
            Aggregator::Max => self.max.unwrap_or(0.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_results() {
        let mut acc = Accumulator::default();
        for v in [Some(4.0), None, Some(1.0), Some(7.0)] {
            acc.push(v);
        }
        assert_eq!(acc.result(Aggregator::Count), 4.0);
        assert_eq!(acc.result(Aggregator::Sum), 12.0);
        assert_eq!(acc.result(Aggregator::Avg), 4.0);
        assert_eq!(acc.result(Aggregator::Min), 1.0);
        assert_eq!(acc.result(Aggregator::Max), 7.0);

        let empty = Accumulator::default();
        assert_eq!(empty.result(Aggregator::Avg), 0.0);
        assert_eq!(empty.result(Aggregator::Min), 0.0);
    }
}
