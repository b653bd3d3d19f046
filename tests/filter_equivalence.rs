//! Filter compilation equivalence tests
//!
//! A filter compiles two ways: to the native query the store evaluates and
//! to an in-memory predicate. Both must agree on every record.

use chrono::{TimeZone, Utc};
use proptest::prelude::*;
use serde_json::{json, Map, Value};

use aeroquery::auth::User;
use aeroquery::filter::{compile_filter_predicate, compile_query, Filter, FilterContext};
use aeroquery::meta::MetaRegistry;
use aeroquery::record::Record;
use aeroquery::store::parse_query;

fn registry() -> MetaRegistry {
    MetaRegistry::from_json_str(
        r#"{
        "metas": {
            "Item": {
                "fields": {
                    "name": {"type": "text"},
                    "status": {"type": "picklist"},
                    "score": {"type": "number"},
                    "active": {"type": "boolean"},
                    "due": {"type": "date"},
                    "_user": {"type": "lookup", "document": "User", "isList": true}
                }
            },
            "User": {"fields": {"name": {"type": "text"}}}
        }
    }"#,
    )
    .unwrap()
}

fn caller() -> User {
    User::new("u1").with_group("g1")
}

fn now() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 15, 10, 0, 0).unwrap()
}

/// Runs both compiled forms against `record`
fn both_forms(filter: &Filter, record: &Record) -> (bool, bool) {
    let registry = registry();
    let user = caller();
    let ctx = FilterContext::new(&registry, &user).at(now());
    let meta = registry.meta("Item").unwrap();

    let query = compile_query(filter, meta, &ctx).unwrap();
    let native = parse_query(query.as_value()).unwrap().matches(record);
    let predicate = compile_filter_predicate(filter, meta, &ctx)
        .unwrap()
        .matches(record);
    (native, predicate)
}

// =============================================================================
// STRATEGIES
// =============================================================================

const NAMES: [&str; 5] = ["alpha", "Beta", "gamma", "Ação", "beta max"];
const STATUSES: [&str; 3] = ["draft", "active", "lost"];
const DATES: [&str; 4] = [
    "2024-01-01T00:00:00.000Z",
    "2024-03-15T00:00:00.000Z",
    "2024-03-20T12:30:00.000Z",
    "2025-06-01T00:00:00.000Z",
];

fn date_value(i: usize) -> Value {
    json!({ "$date": DATES[i] })
}

fn record_strategy() -> impl Strategy<Value = Record> {
    (
        prop::option::of(0..NAMES.len()),
        prop::option::of(0..STATUSES.len()),
        prop::option::of(-5i64..5),
        prop::option::of(any::<bool>()),
        prop::option::of(0..DATES.len()),
        prop::option::of(prop_oneof![Just("u1"), Just("u2")]),
    )
        .prop_map(|(name, status, score, active, due, owner)| {
            let mut record = Map::new();
            record.insert("_id".into(), json!("r"));
            if let Some(i) = name {
                record.insert("name".into(), json!(NAMES[i]));
            }
            if let Some(i) = status {
                record.insert("status".into(), json!(STATUSES[i]));
            }
            if let Some(n) = score {
                record.insert("score".into(), json!(n));
            }
            if let Some(b) = active {
                record.insert("active".into(), json!(b));
            }
            if let Some(i) = due {
                record.insert("due".into(), date_value(i));
            }
            if let Some(id) = owner {
                record.insert("_user".into(), json!([{ "_id": id }]));
            }
            record
        })
}

fn condition_strategy() -> impl Strategy<Value = Value> {
    let text = (
        prop_oneof![
            Just("equals"),
            Just("not_equals"),
            Just("contains"),
            Just("not_contains"),
            Just("starts_with"),
            Just("end_with"),
        ],
        prop_oneof![Just("beta"), Just("a"), Just("acao"), Just("GAMMA"), Just("x")],
    )
        .prop_map(|(op, v)| json!({"term": "name", "operator": op, "value": v}));

    let picklist = (
        prop_oneof![Just("in"), Just("not_in"), Just("equals"), Just("not_equals")],
        prop::sample::subsequence(STATUSES.to_vec(), 1..3),
    )
        .prop_map(|(op, values)| {
            let value = if op.ends_with("in") {
                json!(values)
            } else {
                json!(values[0])
            };
            json!({"term": "status", "operator": op, "value": value})
        });

    let number = (
        prop_oneof![
            Just("equals"),
            Just("not_equals"),
            Just("less_than"),
            Just("greater_than"),
            Just("less_or_equals"),
            Just("greater_or_equals"),
        ],
        -5i64..5,
    )
        .prop_map(|(op, n)| json!({"term": "score", "operator": op, "value": n.to_string()}));

    let between = (-5i64..5, 0i64..5).prop_map(|(low, span)| {
        json!({"term": "score", "operator": "between",
            "value": {"greater_or_equals": low, "less_or_equals": low + span}})
    });

    let date = (
        prop_oneof![Just("less_than"), Just("greater_or_equals"), Just("equals")],
        0..DATES.len(),
    )
        .prop_map(|(op, i)| json!({"term": "due", "operator": op, "value": date_value(i)}));

    let token = prop_oneof![Just("$today"), Just("$startOfMonth"), Just("$daysAgo:30")]
        .prop_map(|t| json!({"term": "due", "operator": "greater_than", "value": t}));

    let boolean = any::<bool>()
        .prop_map(|b| json!({"term": "active", "operator": "equals", "value": b}));

    let exists = (
        prop_oneof![Just("name"), Just("score"), Just("due")],
        any::<bool>(),
    )
        .prop_map(|(term, b)| json!({"term": term, "operator": "exists", "value": b}));

    let caller = prop_oneof![Just("current_user"), Just("not_current_user")]
        .prop_map(|op| json!({"term": "_user._id", "operator": op, "value": null}));

    (
        prop_oneof![text, picklist, number, between, date, token, boolean, exists, caller],
        prop::bool::weighted(0.2),
    )
        .prop_map(|(mut condition, invert)| {
            if invert {
                condition["invert"] = json!(true);
            }
            condition
        })
}

fn filter_strategy() -> impl Strategy<Value = Filter> {
    let leaf = (
        prop_oneof![Just("and"), Just("or")],
        prop::collection::vec(condition_strategy(), 0..4),
    )
        .prop_map(|(mode, conditions)| json!({"match": mode, "conditions": conditions}));

    leaf.prop_recursive(2, 8, 3, |inner| {
        (
            prop_oneof![Just("and"), Just("or")],
            prop::collection::vec(condition_strategy(), 0..3),
            prop::collection::vec(inner, 1..3),
        )
            .prop_map(|(mode, conditions, filters)| {
                json!({"match": mode, "conditions": conditions, "filters": filters})
            })
    })
    .prop_map(|value| serde_json::from_value(value).unwrap())
}

// =============================================================================
// EQUIVALENCE
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn prop_native_query_and_predicate_agree(
        filter in filter_strategy(),
        record in record_strategy(),
    ) {
        let (native, predicate) = both_forms(&filter, &record);
        prop_assert_eq!(native, predicate, "filter {:?}", filter);
    }
}

// =============================================================================
// FIXED CASES
// =============================================================================

fn record(value: Value) -> Record {
    value.as_object().cloned().unwrap()
}

fn filter(value: Value) -> Filter {
    serde_json::from_value(value).unwrap()
}

#[test]
fn test_missing_field_matches_negations_only() {
    let empty = record(json!({"_id": "r"}));
    let ne = filter(json!({"conditions": [
        {"term": "status", "operator": "not_equals", "value": "draft"}
    ]}));
    let eq = filter(json!({"conditions": [
        {"term": "status", "operator": "equals", "value": "draft"}
    ]}));
    assert_eq!(both_forms(&ne, &empty), (true, true));
    assert_eq!(both_forms(&eq, &empty), (false, false));
}

#[test]
fn test_accent_insensitive_contains() {
    let target = record(json!({"_id": "r", "name": "Ação"}));
    let search = filter(json!({"conditions": [
        {"term": "name", "operator": "contains", "value": "acao"}
    ]}));
    assert_eq!(both_forms(&search, &target), (true, true));
}

#[test]
fn test_date_tokens_resolve_to_one_instant() {
    // $today at the fixed clock is 2024-03-15T00:00:00Z
    let on_boundary = record(json!({"_id": "r", "due": {"$date": "2024-03-15T00:00:00.000Z"}}));
    let after = record(json!({"_id": "r", "due": {"$date": "2024-03-15T00:00:00.001Z"}}));
    let today = filter(json!({"conditions": [
        {"term": "due", "operator": "greater_than", "value": "$today"}
    ]}));
    assert_eq!(both_forms(&today, &on_boundary), (false, false));
    assert_eq!(both_forms(&today, &after), (true, true));
}

#[test]
fn test_caller_operator_reads_list_lookup() {
    let mine = record(json!({"_id": "r", "_user": [{"_id": "u2"}, {"_id": "u1"}]}));
    let current = filter(json!({"conditions": [
        {"term": "_user._id", "operator": "current_user", "value": null}
    ]}));
    assert_eq!(both_forms(&current, &mine), (true, true));
}
