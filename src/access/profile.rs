//! Access profile lookup.

use crate::auth::{AccessGrant, User};
use crate::filter::Condition;
use crate::meta::{AccessRule, MetaAccess, MetaRegistry};

/// Key of the fallback entry in a user's access map
const DEFAULTS_KEY: &str = "defaults";
const DEFAULT_PROFILE: &str = "Default";

/// Effective permissions on one field
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AccessField {
    pub is_readable: bool,
    pub is_updatable: bool,
    pub is_creatable: bool,
    pub is_deletable: bool,
    pub conditions: FieldConditions,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldConditions {
    pub read: Option<Condition>,
    pub update: Option<Condition>,
    pub create: Option<Condition>,
}

/// Resolves the caller's profile for `document`.
///
/// The user's entry for the document is used, else their `defaults`
/// entry, else `Default`. `false` denies. Each name is tried as
/// `<document>:access:<name>` before `Default:access:<name>`.
pub fn access_for<'a>(
    document: &str,
    user: &User,
    registry: &'a MetaRegistry,
) -> Option<&'a MetaAccess> {
    let default_grant = AccessGrant::Named(DEFAULT_PROFILE.to_string());
    let fallback = user.access.get(DEFAULTS_KEY).unwrap_or(&default_grant);
    let grant = match user.access.get(document).unwrap_or(fallback) {
        AccessGrant::Flag(false) => return None,
        AccessGrant::Flag(true) => fallback,
        grant => grant,
    };

    let names = grant.names();
    names
        .iter()
        .find_map(|name| registry.access(&format!("{}:access:{}", document, name)))
        .or_else(|| {
            names
                .iter()
                .find_map(|name| registry.access(&format!("{}:access:{}", DEFAULT_PROFILE, name)))
        })
}

/// Combines field defaults, per-field rules and the document flags
pub fn field_permissions(access: &MetaAccess, field: &str) -> AccessField {
    let rules = access.fields.get(field);
    let defaults = &access.field_defaults;
    let allow = |rule: Option<&AccessRule>, default: bool| -> bool {
        rule.and_then(|r| r.allow).unwrap_or(default)
    };
    let condition = |rule: Option<&AccessRule>| rule.and_then(|r| r.condition.clone());

    let read = rules.and_then(|r| r.read.as_ref());
    let update = rules.and_then(|r| r.update.as_ref());
    let create = rules.and_then(|r| r.create.as_ref());
    let delete = rules.and_then(|r| r.delete.as_ref());

    AccessField {
        is_readable: access.is_readable && allow(read, defaults.is_readable),
        is_updatable: access.is_updatable && allow(update, defaults.is_updatable),
        is_creatable: access.is_creatable && allow(create, defaults.is_creatable),
        is_deletable: access.is_deletable && allow(delete, defaults.is_deletable),
        conditions: FieldConditions {
            read: condition(read),
            update: condition(update),
            create: condition(create),
        },
    }
}
