//! Projection building and per-field masking.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use super::profile::field_permissions;
use crate::filter::{compile_predicate, CompileResult, ConditionError, FilterContext, RecordCondition};
use crate::meta::{MetaAccess, MetaObject};
use crate::record::{root_segment, Record};
use crate::store::Projection;

/// Store projection plus the READ conditions to apply per record
#[derive(Clone, Default)]
pub struct AccessProjection {
    pub projection: Projection,
    /// Field name to the condition deciding whether it stays
    pub conditions: BTreeMap<String, Arc<dyn RecordCondition>>,
    /// Fields fetched only so conditions can be evaluated
    pub helper_fields: BTreeSet<String>,
}

impl fmt::Debug for AccessProjection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessProjection")
            .field("projection", &self.projection)
            .field("conditions", &self.conditions.keys().collect::<Vec<_>>())
            .field("helper_fields", &self.helper_fields)
            .finish()
    }
}

impl AccessProjection {
    /// Removes each field whose condition fails on this record.
    ///
    /// Every condition is evaluated against the unmasked record before
    /// any field is removed.
    pub fn mask(&self, record: &mut Record) -> Result<(), ConditionError> {
        let mut denied = Vec::new();
        for (field, condition) in &self.conditions {
            if !record.contains_key(field) {
                continue;
            }
            if !condition.evaluate(record)? {
                denied.push(field.as_str());
            }
        }
        for field in denied {
            record.remove(field);
        }
        Ok(())
    }

    /// Drops fields that were only fetched for condition evaluation
    pub fn strip_helpers(&self, record: &mut Record) {
        for field in &self.helper_fields {
            record.remove(field);
        }
    }
}

/// Collapses paths sharing a top-level key into that key.
///
/// `{group, group._id, _user}` becomes `{group, _user}`; a lone nested
/// path such as `contact.name` is kept as is.
pub fn clear_projection_path_collision(paths: &BTreeSet<String>) -> BTreeSet<String> {
    let mut by_root: BTreeMap<&str, Vec<&String>> = BTreeMap::new();
    for path in paths.iter().filter(|p| !p.is_empty()) {
        by_root.entry(root_segment(path)).or_default().push(path);
    }
    by_root
        .into_iter()
        .map(|(root, group)| match group.as_slice() {
            [single] => (*single).clone(),
            _ => root.to_string(),
        })
        .collect()
}

/// Builds the projection and condition map for one read.
///
/// `requested` is the caller's field list; empty means every field the
/// caller may read.
pub fn build_access_projection(
    access: &MetaAccess,
    meta: &MetaObject,
    requested: &BTreeSet<String>,
    ctx: &FilterContext<'_>,
) -> CompileResult<AccessProjection> {
    let explicit = !requested.is_empty();
    let mut include: BTreeSet<String> = requested.clone();
    let mut exclude: BTreeSet<String> = BTreeSet::new();
    let mut compiled: Vec<(String, Arc<dyn RecordCondition>, String)> = Vec::new();

    for name in meta.fields.keys() {
        let permission = field_permissions(access, name);
        if !permission.is_readable {
            if explicit {
                include.retain(|path| root_segment(path) != name);
            } else {
                exclude.insert(name.clone());
            }
            continue;
        }
        if let Some(condition) = &permission.conditions.read {
            let predicate = compile_predicate(condition, meta, ctx)?;
            let root = root_segment(predicate.term()).to_string();
            compiled.push((name.clone(), Arc::new(predicate), root));
        }
    }

    let mut conditions: BTreeMap<String, Arc<dyn RecordCondition>> = BTreeMap::new();
    let mut helper_fields = BTreeSet::new();

    for (field, condition, root) in compiled {
        let projected = if explicit {
            include.iter().any(|path| root_segment(path) == field)
        } else {
            !exclude.contains(&field)
        };
        if !projected {
            continue;
        }

        if root != "_id" {
            if explicit {
                if !include.iter().any(|path| root_segment(path) == root) {
                    include.insert(root.clone());
                    helper_fields.insert(root);
                }
            } else if exclude.remove(&root) {
                helper_fields.insert(root);
            }
        }
        conditions.insert(field, condition);
    }

    let projection = if explicit {
        Projection::Include(clear_projection_path_collision(&include))
    } else if exclude.is_empty() {
        Projection::All
    } else {
        Projection::Exclude(exclude)
    };

    debug!(
        document = %meta.name,
        projection = ?projection,
        conditions = conditions.len(),
        helpers = helper_fields.len(),
        "access projection built"
    );

    Ok(AccessProjection {
        projection,
        conditions,
        helper_fields,
    })
}
