//! # Filter Compiler
//!
//! Declarative filters compiled into the native store query and into
//! record predicates used for field masking.
//!
//! # Modules
//! - `ast`: filter and condition shapes
//! - `operators`: operator whitelist and per-type tables
//! - `value`: special token resolution
//! - `predicate`: in-memory evaluation
//! - `compiler`: validation, resolution and emission

pub mod ast;
pub mod compiler;
pub mod errors;
pub mod operators;
pub mod predicate;
pub mod text;
pub mod value;

pub use ast::{Condition, Conditions, Filter, MatchMode};
pub use compiler::{
    compile_condition, compile_filter_predicate, compile_predicate, compile_query,
    parse_filter_object, CompiledCondition, CompiledFilter, CompiledQuery, ConditionPredicate,
    RecordCondition,
};
pub use errors::{CompileError, CompileResult, ConditionError};
pub use operators::{allowed_operators, Operator};
pub use predicate::{compare_same_kind, values_equal, FieldTest, Predicate};
pub use value::{resolve_token, FilterContext};
