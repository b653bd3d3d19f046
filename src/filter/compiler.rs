//! # Filter Compiler
//!
//! One visitor validates and resolves every condition into a
//! [`CompiledCondition`]; the native store query and the in-memory
//! predicate are both emitted from that single resolved form.
//!
//! Invert handling: an inverted `equals` becomes `$ne` directly, every
//! other inverted clause is wrapped in `$not`.

use regex::{Regex, RegexBuilder};
use serde::Serialize;
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};
use tracing::debug;

use super::ast::{Condition, Filter, MatchMode};
use super::errors::{CompileError, CompileResult, ConditionError};
use super::operators::{
    allowed_operators, is_date_type, is_numeric_type, join_operators, Operator,
};
use super::predicate::{FieldTest, Predicate};
use super::text::accent_to_regex;
use super::value::{resolve_token, FilterContext};
use crate::meta::{FieldMeta, MetaObject};
use crate::record::{native_date, parse_date, as_native_date, Record, DATE_KEY};

/// Native store query
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct CompiledQuery(Value);

impl CompiledQuery {
    pub fn match_all() -> Self {
        CompiledQuery(Value::Object(Map::new()))
    }

    /// Wrap an already-native query
    pub fn from_value(value: Value) -> Self {
        CompiledQuery(value)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }

    pub fn is_match_all(&self) -> bool {
        self.0.as_object().map(Map::is_empty).unwrap_or(false)
    }

    /// Adds a full text clause next to the existing ones
    pub fn with_text_search(mut self, search: &str) -> Self {
        if let Value::Object(map) = &mut self.0 {
            map.insert("$text".to_string(), json!({ "$search": search }));
        }
        self
    }
}

/// A test that can run against a fetched record
pub trait RecordCondition: Send + Sync + std::fmt::Debug {
    fn evaluate(&self, record: &Record) -> Result<bool, ConditionError>;
}

/// Predicate form of one condition
#[derive(Debug, Clone)]
pub struct ConditionPredicate {
    term: String,
    predicate: Predicate,
}

impl ConditionPredicate {
    pub fn term(&self) -> &str {
        &self.term
    }

    pub fn matches(&self, record: &Record) -> bool {
        self.predicate.matches(record)
    }
}

impl RecordCondition for ConditionPredicate {
    fn evaluate(&self, record: &Record) -> Result<bool, ConditionError> {
        Ok(self.matches(record))
    }
}

#[derive(Debug, Clone)]
enum Clause {
    Eq(Value),
    Ne(Value),
    Regex {
        pattern: String,
        regex: Regex,
        negated: bool,
    },
    In(Vec<Value>),
    Nin(Vec<Value>),
    Gt(Value),
    Gte(Value),
    Lt(Value),
    Lte(Value),
    Range {
        gte: Option<Value>,
        lte: Option<Value>,
    },
    Exists(bool),
}

impl Clause {
    fn query_expr(&self) -> Value {
        match self {
            Clause::Eq(v) => v.clone(),
            Clause::Ne(v) => json!({ "$ne": v }),
            Clause::Regex {
                pattern, negated, ..
            } => {
                let expr = json!({ "$regex": pattern, "$options": "i" });
                if *negated {
                    json!({ "$not": expr })
                } else {
                    expr
                }
            }
            Clause::In(vs) => json!({ "$in": vs }),
            Clause::Nin(vs) => json!({ "$nin": vs }),
            Clause::Gt(v) => json!({ "$gt": v }),
            Clause::Gte(v) => json!({ "$gte": v }),
            Clause::Lt(v) => json!({ "$lt": v }),
            Clause::Lte(v) => json!({ "$lte": v }),
            Clause::Range { gte, lte } => {
                let mut map = Map::new();
                if let Some(v) = gte {
                    map.insert("$gte".to_string(), v.clone());
                }
                if let Some(v) = lte {
                    map.insert("$lte".to_string(), v.clone());
                }
                Value::Object(map)
            }
            Clause::Exists(b) => json!({ "$exists": b }),
        }
    }

    fn field_test(&self) -> FieldTest {
        match self {
            Clause::Eq(v) => FieldTest::Eq(v.clone()),
            Clause::Ne(v) => FieldTest::Ne(v.clone()),
            Clause::Regex { regex, negated, .. } => {
                let test = FieldTest::Regex(regex.clone());
                if *negated {
                    FieldTest::Not(Box::new(test))
                } else {
                    test
                }
            }
            Clause::In(vs) => FieldTest::In(vs.clone()),
            Clause::Nin(vs) => FieldTest::Nin(vs.clone()),
            Clause::Gt(v) => FieldTest::Gt(v.clone()),
            Clause::Gte(v) => FieldTest::Gte(v.clone()),
            Clause::Lt(v) => FieldTest::Lt(v.clone()),
            Clause::Lte(v) => FieldTest::Lte(v.clone()),
            Clause::Range { gte, lte } => {
                let mut tests = Vec::new();
                if let Some(v) = gte {
                    tests.push(FieldTest::Gte(v.clone()));
                }
                if let Some(v) = lte {
                    tests.push(FieldTest::Lte(v.clone()));
                }
                FieldTest::All(tests)
            }
            Clause::Exists(b) => FieldTest::Exists(*b),
        }
    }
}

/// A validated condition with its resolved value
#[derive(Debug, Clone)]
pub struct CompiledCondition {
    term: String,
    /// `None` when the condition constrains nothing (empty `between`)
    clause: Option<Clause>,
    negate: bool,
}

impl CompiledCondition {
    /// Normalized term
    pub fn term(&self) -> &str {
        &self.term
    }

    pub fn to_query(&self) -> Value {
        let Some(clause) = &self.clause else {
            return Value::Object(Map::new());
        };
        let mut expr = clause.query_expr();
        if self.negate {
            expr = json!({ "$not": expr });
        }
        let mut map = Map::new();
        map.insert(self.term.clone(), expr);
        Value::Object(map)
    }

    pub fn to_predicate(&self) -> Predicate {
        let Some(clause) = &self.clause else {
            return Predicate::True;
        };
        let mut test = clause.field_test();
        if self.negate {
            test = FieldTest::Not(Box::new(test));
        }
        Predicate::field(self.term.clone(), test)
    }
}

/// A compiled filter tree
#[derive(Debug, Clone)]
pub enum CompiledFilter {
    MatchAll,
    Condition(CompiledCondition),
    All(Vec<CompiledFilter>),
    Any(Vec<CompiledFilter>),
}

impl CompiledFilter {
    pub fn to_query(&self) -> Value {
        match self {
            CompiledFilter::MatchAll => Value::Object(Map::new()),
            CompiledFilter::Condition(c) => c.to_query(),
            CompiledFilter::All(items) => {
                json!({ "$and": items.iter().map(Self::to_query).collect::<Vec<_>>() })
            }
            CompiledFilter::Any(items) => {
                json!({ "$or": items.iter().map(Self::to_query).collect::<Vec<_>>() })
            }
        }
    }

    pub fn to_predicate(&self) -> Predicate {
        match self {
            CompiledFilter::MatchAll => Predicate::True,
            CompiledFilter::Condition(c) => c.to_predicate(),
            CompiledFilter::All(items) => Predicate::And(items.iter().map(Self::to_predicate).collect()),
            CompiledFilter::Any(items) => Predicate::Or(items.iter().map(Self::to_predicate).collect()),
        }
    }
}

/// Compile a filter into the native store query
pub fn compile_query(
    filter: &Filter,
    meta: &MetaObject,
    ctx: &FilterContext<'_>,
) -> CompileResult<CompiledQuery> {
    let compiled = parse_filter_object(filter, meta, ctx)?;
    let mut query = CompiledQuery(compiled.to_query());
    if let Some(search) = filter.text_search.as_deref() {
        query = query.with_text_search(search);
    }
    debug!(document = %meta.name, query = %query.as_value(), "filter compiled");
    Ok(query)
}

/// Compile a filter into an in-memory predicate
pub fn compile_filter_predicate(
    filter: &Filter,
    meta: &MetaObject,
    ctx: &FilterContext<'_>,
) -> CompileResult<Predicate> {
    let predicate = parse_filter_object(filter, meta, ctx)?.to_predicate();
    Ok(match filter.text_search.as_deref() {
        Some(search) => Predicate::And(vec![predicate, Predicate::Text(search.to_string())]),
        None => predicate,
    })
}

/// Compile one condition into its predicate form
pub fn compile_predicate(
    condition: &Condition,
    meta: &MetaObject,
    ctx: &FilterContext<'_>,
) -> CompileResult<ConditionPredicate> {
    let compiled = compile_condition(condition, meta, ctx)?;
    Ok(ConditionPredicate {
        term: compiled.term.clone(),
        predicate: compiled.to_predicate(),
    })
}

/// Folds child filters and this node's active conditions.
///
/// Zero clauses match everything, one clause is returned unwrapped and
/// several combine per the node's `match`.
pub fn parse_filter_object(
    filter: &Filter,
    meta: &MetaObject,
    ctx: &FilterContext<'_>,
) -> CompileResult<CompiledFilter> {
    let mut clauses = Vec::new();
    for child in filter.filters.iter().filter(|f| !f.disabled) {
        clauses.push(parse_filter_object(child, meta, ctx)?);
    }
    for condition in filter.conditions.active() {
        clauses.push(CompiledFilter::Condition(compile_condition(
            condition, meta, ctx,
        )?));
    }

    Ok(match clauses.len() {
        0 => CompiledFilter::MatchAll,
        1 => clauses.remove(0),
        _ => match filter.match_mode {
            MatchMode::Or => CompiledFilter::Any(clauses),
            MatchMode::And => CompiledFilter::All(clauses),
        },
    })
}

/// Resolved type information for a term
struct ResolvedTerm {
    /// `type` or `type.subpath`, the key of the operator table
    type_path: String,
    /// Remaining path below the field, with a leading dot
    sub: String,
}

/// Validate and resolve one condition
pub fn compile_condition(
    condition: &Condition,
    meta: &MetaObject,
    ctx: &FilterContext<'_>,
) -> CompileResult<CompiledCondition> {
    let operator = Operator::parse(&condition.operator);
    let (Some(operator), Some(raw), false) = (
        operator,
        condition.value.as_ref(),
        condition.term.is_empty(),
    ) else {
        return Err(CompileError::InvalidCondition);
    };

    let term = normalize_term(&condition.term);
    let resolved = resolve_term(&term, meta, ctx)?;

    let allowed = allowed_operators(&resolved.type_path).ok_or_else(|| {
        CompileError::UnsupportedType {
            field_type: resolved.type_path.clone(),
            field: term.clone(),
        }
    })?;
    if !allowed.contains(&operator) {
        return Err(CompileError::UnsupportedOperator {
            term: term.clone(),
            operator: operator.to_string(),
            allowed: join_operators(allowed),
        });
    }

    let clause = build_clause(operator, raw, &term, &resolved, ctx)?;

    let (clause, negate) = match (clause, condition.invert) {
        (Some(Clause::Eq(v)), true) => (Some(Clause::Ne(v)), false),
        (clause, invert) => (clause, invert),
    };

    Ok(CompiledCondition {
        term,
        clause,
        negate,
    })
}

/// Drops the legacy `.data` segment used by list fields
fn normalize_term(term: &str) -> String {
    let mut parts: Vec<&str> = term.split('.').collect();
    if let Some(pos) = parts.iter().skip(1).position(|p| *p == "data") {
        parts.remove(pos + 1);
    }
    parts.join(".")
}

fn resolve_term(
    term: &str,
    meta: &MetaObject,
    ctx: &FilterContext<'_>,
) -> CompileResult<ResolvedTerm> {
    let (head, rest) = match term.split_once('.') {
        Some((head, rest)) => (head, format!(".{}", rest)),
        None => (term, String::new()),
    };

    if head == "_id" {
        return Ok(ResolvedTerm {
            type_path: format!("ObjectId{}", rest),
            sub: rest,
        });
    }

    let field = meta.field(head).ok_or_else(|| CompileError::UnknownField {
        term: term.to_string(),
        document: meta.name.clone(),
    })?;
    resolve_sub(term, field, rest, ctx)
}

fn resolve_sub(
    term: &str,
    field: &FieldMeta,
    sub: String,
    ctx: &FilterContext<'_>,
) -> CompileResult<ResolvedTerm> {
    if field.is_lookup() && !sub.is_empty() && sub != "._id" {
        let target = field.document.clone().unwrap_or_default();
        let referenced = ctx
            .registry
            .meta(&target)
            .ok_or_else(|| CompileError::UnknownDocument(target.clone()))?;

        let path = &sub[1..];
        let (next, tail) = match path.split_once('.') {
            Some((next, tail)) => (next, format!(".{}", tail)),
            None => (path, String::new()),
        };
        let next_field = referenced
            .field(next)
            .ok_or_else(|| CompileError::UnknownField {
                term: term.to_string(),
                document: target.clone(),
            })?;
        return resolve_sub(term, next_field, tail, ctx);
    }

    Ok(ResolvedTerm {
        type_path: format!("{}{}", field.field_type, sub),
        sub,
    })
}

fn build_clause(
    operator: Operator,
    raw: &Value,
    term: &str,
    resolved: &ResolvedTerm,
    ctx: &FilterContext<'_>,
) -> CompileResult<Option<Clause>> {
    let user = ctx.user;
    let clause = match operator {
        Operator::CurrentUser => Clause::Eq(Value::String(user.id.clone())),
        Operator::NotCurrentUser => Clause::Ne(Value::String(user.id.clone())),
        Operator::CurrentUserGroup => {
            Clause::Eq(user.group.clone().map(Value::String).unwrap_or(Value::Null))
        }
        Operator::NotCurrentUserGroup => {
            Clause::Ne(user.group.clone().map(Value::String).unwrap_or(Value::Null))
        }
        Operator::CurrentUserGroups => Clause::In(
            user.all_group_ids()
                .into_iter()
                .map(Value::String)
                .collect(),
        ),
        Operator::Exists => {
            let value = resolve_value(raw, operator, term, resolved, ctx)?;
            Clause::Exists(value.as_bool().unwrap_or(true))
        }
        Operator::Between => {
            let (gte, lte) = between_bounds(raw, term, resolved, ctx)?;
            if gte.is_none() && lte.is_none() {
                return Ok(None);
            }
            Clause::Range { gte, lte }
        }
        Operator::Contains | Operator::NotContains | Operator::StartsWith | Operator::EndWith => {
            let value = resolve_value(raw, operator, term, resolved, ctx)?;
            let text = match &value {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                _ => return Err(CompileError::invalid_value(term, "expected text")),
            };
            let escaped = accent_to_regex(&text);
            let pattern = match operator {
                Operator::StartsWith => format!("^{}", escaped),
                Operator::EndWith => format!("{}$", escaped),
                _ => escaped,
            };
            let regex = RegexBuilder::new(&pattern)
                .case_insensitive(true)
                .build()
                .map_err(|e| CompileError::invalid_value(term, e.to_string()))?;
            Clause::Regex {
                pattern,
                regex,
                negated: operator == Operator::NotContains,
            }
        }
        _ => {
            let value = resolve_value(raw, operator, term, resolved, ctx)?;
            check_literal(term, &value)?;
            match operator {
                Operator::Equals => Clause::Eq(value),
                Operator::NotEquals => Clause::Ne(value),
                Operator::In => Clause::In(as_list(value)),
                Operator::NotIn => Clause::Nin(as_list(value)),
                Operator::GreaterThan => Clause::Gt(value),
                Operator::GreaterOrEquals => Clause::Gte(value),
                Operator::LessThan => Clause::Lt(value),
                _ => Clause::Lte(value),
            }
        }
    };
    Ok(Some(clause))
}

fn between_bounds(
    raw: &Value,
    term: &str,
    resolved: &ResolvedTerm,
    ctx: &FilterContext<'_>,
) -> CompileResult<(Option<Value>, Option<Value>)> {
    let Value::Object(bounds) = raw else {
        return Ok((None, None));
    };
    let bound = |key: &str| -> CompileResult<Option<Value>> {
        match bounds.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(v) => {
                let value = resolve_value(v, Operator::Between, term, resolved, ctx)?;
                check_literal(term, &value)?;
                Ok(Some(value))
            }
        }
    };
    Ok((bound("greater_or_equals")?, bound("less_or_equals")?))
}

fn as_list(value: Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items,
        other => vec![other],
    }
}

/// Rejects operator documents smuggled in as values
fn check_literal(term: &str, value: &Value) -> CompileResult<()> {
    match value {
        Value::Object(map) if as_native_date(value).is_none() => {
            if map.keys().any(|k| k.starts_with('$')) {
                return Err(CompileError::invalid_value(
                    term,
                    "operator objects are not allowed as values",
                ));
            }
            Ok(())
        }
        Value::Array(items) => items.iter().try_for_each(|v| check_literal(term, v)),
        _ => Ok(()),
    }
}

fn resolve_value(
    raw: &Value,
    operator: Operator,
    term: &str,
    resolved: &ResolvedTerm,
    ctx: &FilterContext<'_>,
) -> CompileResult<Value> {
    if let Value::String(text) = raw {
        if let Some(token) =
            resolve_token(text, ctx).map_err(|reason| CompileError::invalid_value(term, reason))?
        {
            return Ok(token);
        }
        if resolved.sub == "._id" {
            return Ok(raw.clone());
        }
    }

    if resolved.type_path == "encrypted" && operator != Operator::Exists {
        return Ok(match raw {
            Value::Array(items) => Value::Array(items.iter().map(hash_value).collect()),
            other => hash_value(other),
        });
    }

    Ok(match raw {
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|v| coerce(v, &resolved.type_path))
                .collect(),
        ),
        other => coerce(other, &resolved.type_path),
    })
}

fn hash_value(value: &Value) -> Value {
    let text = match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    let digest = Sha256::digest(text.as_bytes());
    Value::String(digest.iter().map(|b| format!("{:02x}", b)).collect())
}

/// Per-type value coercion
fn coerce(value: &Value, type_path: &str) -> Value {
    if is_date_type(type_path) {
        if let Some(at) = as_native_date(value) {
            return native_date(at);
        }
        if let Some(at) = value.as_str().and_then(parse_date) {
            return native_date(at);
        }
        if let Some(text) = value.get(DATE_KEY).and_then(Value::as_str) {
            if let Some(at) = parse_date(text) {
                return native_date(at);
            }
        }
        return value.clone();
    }

    if is_numeric_type(type_path) || type_path == "phone.countryCode" {
        if let Some(n) = value.as_str().and_then(parse_number) {
            return n;
        }
        return value.clone();
    }

    if type_path == "phone.phoneNumber" {
        return match value {
            Value::Number(n) => Value::String(n.to_string()),
            other => other.clone(),
        };
    }

    value.clone()
}

fn parse_number(text: &str) -> Option<Value> {
    let text = text.trim();
    if let Ok(i) = text.parse::<i64>() {
        return Some(Value::from(i));
    }
    text.parse::<f64>()
        .ok()
        .filter(|f| f.is_finite())
        .map(Value::from)
}
