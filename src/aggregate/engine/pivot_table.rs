//! # Pivot Table
//!
//! Records are folded into a row tree one at a time. Every node keeps its
//! own accumulators, so a parent's `totals` and `cells` aggregate all of
//! its descendants' records for every aggregator, and the grand totals
//! aggregate everything. Memory grows with the number of distinct
//! dimension values, never with the number of records.

use std::collections::BTreeMap;

use serde_json::{json, Map, Value};

use super::accumulator::Accumulator;
use super::values::{bucket_label, date_value, display_value, lookup_key_label, numeric_value, pick};
use super::EngineError;
use crate::aggregate::config::{
    LookupDisplay, PivotColumnMeta, PivotEnrichedConfig, PivotValueMeta, SortOrder,
};
use crate::record::{is_native_date, Record};

/// Column key used when the pivot has no column dimensions
pub const DEFAULT_COLUMN: &str = "__default__";

/// Separator between column dimension labels in a cell key
const COLUMN_SEPARATOR: char = '|';

const DEFAULT_BLANK: &str = "(blank)";

#[derive(Debug, Clone)]
struct Measures {
    cells: BTreeMap<String, Vec<Accumulator>>,
    totals: Vec<Accumulator>,
}

impl Measures {
    fn new(width: usize) -> Self {
        Self {
            cells: BTreeMap::new(),
            totals: vec![Accumulator::default(); width],
        }
    }

    fn push(&mut self, column: &str, readings: &[Option<f64>]) {
        let width = readings.len();
        let cell = self
            .cells
            .entry(column.to_string())
            .or_insert_with(|| vec![Accumulator::default(); width]);
        for (i, reading) in readings.iter().enumerate() {
            cell[i].push(*reading);
            self.totals[i].push(*reading);
        }
    }

    fn cells_json(&self, values: &[PivotValueMeta]) -> Value {
        let cells: Map<String, Value> = self
            .cells
            .iter()
            .map(|(column, accs)| (column.clone(), measures_json(accs, values)))
            .collect();
        Value::Object(cells)
    }

    fn totals_json(&self, values: &[PivotValueMeta]) -> Value {
        measures_json(&self.totals, values)
    }
}

fn measures_json(accs: &[Accumulator], values: &[PivotValueMeta]) -> Value {
    let map: Map<String, Value> = values
        .iter()
        .zip(accs)
        .map(|(value, acc)| (value.field.clone(), json!(acc.result(value.aggregator))))
        .collect();
    Value::Object(map)
}

#[derive(Debug, Clone)]
struct RowNode {
    label: String,
    level: usize,
    measures: Measures,
    children: BTreeMap<String, RowNode>,
}

#[derive(Debug, Clone, Default)]
struct HeaderNode {
    label: String,
    children: BTreeMap<String, HeaderNode>,
}

/// Incremental pivot
#[derive(Debug, Clone)]
pub struct PivotBuilder {
    config: PivotEnrichedConfig,
    blank: String,
    rows: BTreeMap<String, RowNode>,
    grand: Measures,
    headers: BTreeMap<String, HeaderNode>,
    records: u64,
}

impl PivotBuilder {
    pub fn new(config: PivotEnrichedConfig) -> Result<Self, EngineError> {
        if config.rows.is_empty() {
            return Err(EngineError::InvalidParams(
                "Rows are required for pivot table".to_string(),
            ));
        }
        if config.values.is_empty() {
            return Err(EngineError::InvalidParams(
                "Values are required for pivot table".to_string(),
            ));
        }
        let blank = config
            .blank_text
            .clone()
            .unwrap_or_else(|| DEFAULT_BLANK.to_string());
        let width = config.values.len();
        Ok(Self {
            config,
            blank,
            rows: BTreeMap::new(),
            grand: Measures::new(width),
            headers: BTreeMap::new(),
            records: 0,
        })
    }

    pub fn records(&self) -> u64 {
        self.records
    }

    /// Top-level rows so far
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn push(&mut self, record: &Record) {
        self.records += 1;
        let readings: Vec<Option<f64>> = self
            .config
            .values
            .iter()
            .map(|v| pick(record, &v.field).and_then(numeric_value))
            .collect();
        let column = self.column_key(record);
        let path: Vec<(String, String)> = self
            .config
            .rows
            .iter()
            .map(|row| dimension(pick(record, &row.field), row.lookup.as_ref(), &self.blank))
            .collect();

        self.grand.push(&column, &readings);

        let width = readings.len();
        let mut level = &mut self.rows;
        for (depth, (key, label)) in path.into_iter().enumerate() {
            let node = level.entry(key).or_insert_with(|| RowNode {
                label,
                level: depth,
                measures: Measures::new(width),
                children: BTreeMap::new(),
            });
            node.measures.push(&column, &readings);
            level = &mut node.children;
        }
    }

    /// Escaped column labels joined by `|`; registers the header path
    fn column_key(&mut self, record: &Record) -> String {
        if self.config.columns.is_empty() {
            return DEFAULT_COLUMN.to_string();
        }
        let segments: Vec<String> = self
            .config
            .columns
            .iter()
            .map(|column| column_segment(column, record, &self.blank))
            .collect();

        let mut level = &mut self.headers;
        for segment in &segments {
            let node = level.entry(segment.clone()).or_insert_with(|| HeaderNode {
                label: segment.clone(),
                children: BTreeMap::new(),
            });
            level = &mut node.children;
        }
        segments
            .iter()
            .map(|segment| escape_segment(segment))
            .collect::<Vec<_>>()
            .join(&*COLUMN_SEPARATOR.to_string())
    }

    pub fn finish(self) -> Value {
        let values = &self.config.values;
        let orders: Vec<SortOrder> = self
            .config
            .rows
            .iter()
            .map(|r| r.order.unwrap_or_default())
            .collect();
        let column_orders: Vec<SortOrder> = self
            .config
            .columns
            .iter()
            .map(|c| c.order.unwrap_or_default())
            .collect();

        json!({
            "data": rows_json(&self.rows, values, &orders),
            "grandTotals": {
                "cells": self.grand.cells_json(values),
                "totals": self.grand.totals_json(values),
            },
            "columnHeaders": headers_json(&self.headers, "", 0, &column_orders),
        })
    }
}

fn dimension(value: Option<&Value>, lookup: Option<&LookupDisplay>, blank: &str) -> (String, String) {
    let Some(value) = value else {
        return (String::new(), blank.to_string());
    };
    let (key, label) = match lookup {
        Some(lookup) if value.is_object() && !is_native_date(value) => lookup_key_label(value, lookup),
        _ => {
            let text = display_value(value);
            (text.clone(), text)
        }
    };
    if label.is_empty() {
        (key, blank.to_string())
    } else {
        (key, label)
    }
}

/// Backslash-escapes `\` and the separator so labels containing `|`
/// never merge two distinct column paths
fn escape_segment(segment: &str) -> String {
    if !segment.contains(|c: char| c == '\\' || c == COLUMN_SEPARATOR) {
        return segment.to_string();
    }
    let mut out = String::with_capacity(segment.len() + 2);
    for c in segment.chars() {
        if c == '\\' || c == COLUMN_SEPARATOR {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn column_segment(column: &PivotColumnMeta, record: &Record, blank: &str) -> String {
    let Some(value) = pick(record, &column.field) else {
        return blank.to_string();
    };
    if let Some(bucket) = column.bucket {
        if let Some(at) = date_value(value) {
            return bucket_label(&at, bucket);
        }
    }
    if let Some(options) = &column.values {
        let raw = display_value(value);
        if let Some(option) = options.iter().find(|o| o.key == raw) {
            return option.label.clone();
        }
    }
    let (_, label) = dimension(Some(value), column.lookup.as_ref(), blank);
    label
}

fn ordered<'a, T>(map: &'a BTreeMap<String, T>, order: SortOrder) -> Box<dyn Iterator<Item = (&'a String, &'a T)> + 'a> {
    match order {
        SortOrder::Asc => Box::new(map.iter()),
        SortOrder::Desc => Box::new(map.iter().rev()),
    }
}

fn rows_json(rows: &BTreeMap<String, RowNode>, values: &[PivotValueMeta], orders: &[SortOrder]) -> Value {
    let order = orders.first().copied().unwrap_or_default();
    let nodes: Vec<Value> = ordered(rows, order)
        .map(|(key, node)| {
            let mut out = Map::new();
            out.insert("key".into(), json!(key));
            out.insert("label".into(), json!(node.label));
            out.insert("level".into(), json!(node.level));
            out.insert("cells".into(), node.measures.cells_json(values));
            out.insert("totals".into(), node.measures.totals_json(values));
            if !node.children.is_empty() {
                out.insert(
                    "children".into(),
                    rows_json(&node.children, values, orders.get(1..).unwrap_or_default()),
                );
            }
            Value::Object(out)
        })
        .collect();
    Value::Array(nodes)
}

fn headers_json(
    headers: &BTreeMap<String, HeaderNode>,
    prefix: &str,
    level: usize,
    orders: &[SortOrder],
) -> Value {
    let order = orders.get(level).copied().unwrap_or_default();
    let nodes: Vec<Value> = ordered(headers, order)
        .map(|(value, node)| {
            let key = if prefix.is_empty() {
                escape_segment(value)
            } else {
                format!("{}{}{}", prefix, COLUMN_SEPARATOR, escape_segment(value))
            };
            let mut out = Map::new();
            out.insert("key".into(), json!(key));
            out.insert("value".into(), json!(value));
            out.insert("label".into(), json!(node.label));
            out.insert("level".into(), json!(level));
            if !node.children.is_empty() {
                out.insert("expanded".into(), json!(true));
                out.insert(
                    "children".into(),
                    headers_json(&node.children, &key, level + 1, orders),
                );
            }
            Value::Object(out)
        })
        .collect();
    Value::Array(nodes)
}
