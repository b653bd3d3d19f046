//! Single-value KPI folding.

use serde_json::{json, Value};

use super::accumulator::Accumulator;
use super::values::{numeric_value, pick};
use super::EngineError;
use crate::aggregate::config::{Aggregator, KpiConfig};
use crate::record::Record;

/// Decimal places kept in a KPI result
const RESULT_SCALE: f64 = 10_000.0;

#[derive(Debug, Clone)]
pub struct KpiBuilder {
    operation: Aggregator,
    field: Option<String>,
    acc: Accumulator,
}

impl KpiBuilder {
    pub fn new(config: KpiConfig) -> Result<Self, EngineError> {
        let field = config.field().map(str::to_string);
        if field.is_none() && config.operation != Aggregator::Count {
            return Err(EngineError::InvalidParams(
                "field is required for aggregation".to_string(),
            ));
        }
        Ok(Self {
            operation: config.operation,
            field,
            acc: Accumulator::default(),
        })
    }

    pub fn records(&self) -> u64 {
        self.acc.records()
    }

    pub fn push(&mut self, record: &Record) {
        let reading = self
            .field
            .as_deref()
            .and_then(|field| pick(record, field))
            .and_then(numeric_value);
        self.acc.push(reading);
    }

    /// `{result, count, validCount}`; no numeric values reads as zero
    pub fn finish(self) -> Value {
        let valid = self.acc.numeric();
        let result = match self.operation {
            Aggregator::Count => self.acc.records() as f64,
            _ if valid == 0 => 0.0,
            operation => (self.acc.result(operation) * RESULT_SCALE).round() / RESULT_SCALE,
        };
        json!({
            "result": result,
            "count": self.acc.records(),
            "validCount": valid,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder(value: Value) -> KpiBuilder {
        KpiBuilder::new(serde_json::from_value(value).unwrap()).unwrap()
    }

    fn fold(builder: &mut KpiBuilder, values: Vec<Value>) {
        for v in values {
            builder.push(v.as_object().unwrap());
        }
    }

    #[test]
    fn test_operations_skip_non_numeric() {
        let rows = || {
            vec![
                json!({"amount": {"value": 10}}),
                json!({"amount": {"value": "2.5"}}),
                json!({"amount": {"value": "n/a"}}),
                json!({}),
                json!({"amount": {"value": 1}}),
            ]
        };
        for (operation, expected) in [("sum", 13.5), ("avg", 4.5), ("min", 1.0), ("max", 10.0)] {
            let mut kpi = builder(json!({"operation": operation, "field": "amount.value"}));
            fold(&mut kpi, rows());
            let out = kpi.finish();
            assert_eq!(out["result"], json!(expected), "{}", operation);
            assert_eq!(out["count"], 5);
            assert_eq!(out["validCount"], 3);
        }
    }

    #[test]
    fn test_rounds_to_four_places() {
        let mut kpi = builder(json!({"operation": "avg", "field": "n"}));
        fold(&mut kpi, vec![json!({"n": 1}), json!({"n": 1}), json!({"n": 2})]);
        assert_eq!(kpi.finish()["result"], json!(1.3333));
    }

    #[test]
    fn test_nothing_numeric_reads_zero() {
        let mut kpi = builder(json!({"operation": "min", "field": "n"}));
        fold(&mut kpi, vec![json!({"n": "x"})]);
        assert_eq!(kpi.finish(), json!({"result": 0.0, "count": 1, "validCount": 0}));
    }

    #[test]
    fn test_field_required_except_count() {
        let config: KpiConfig = serde_json::from_value(json!({"operation": "sum", "field": " "})).unwrap();
        assert!(matches!(KpiBuilder::new(config), Err(EngineError::InvalidParams(_))));

        let mut kpi = builder(json!({"operation": "count"}));
        fold(&mut kpi, vec![json!({}), json!({})]);
        assert_eq!(kpi.finish()["result"], json!(2.0));
    }
}
