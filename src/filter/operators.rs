//! Operator whitelist and the per-type compatibility table.

use std::fmt;

/// Every operator a condition may name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Equals,
    NotEquals,
    StartsWith,
    EndWith,
    Contains,
    NotContains,
    LessThan,
    GreaterThan,
    LessOrEquals,
    GreaterOrEquals,
    Between,
    CurrentUser,
    NotCurrentUser,
    CurrentUserGroup,
    NotCurrentUserGroup,
    CurrentUserGroups,
    In,
    NotIn,
    Exists,
}

use Operator::*;

impl Operator {
    pub const ALL: [Operator; 19] = [
        Equals,
        NotEquals,
        StartsWith,
        EndWith,
        Contains,
        NotContains,
        LessThan,
        GreaterThan,
        LessOrEquals,
        GreaterOrEquals,
        Between,
        CurrentUser,
        NotCurrentUser,
        CurrentUserGroup,
        NotCurrentUserGroup,
        CurrentUserGroups,
        In,
        NotIn,
        Exists,
    ];

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.as_str() == name)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Equals => "equals",
            NotEquals => "not_equals",
            StartsWith => "starts_with",
            EndWith => "end_with",
            Contains => "contains",
            NotContains => "not_contains",
            LessThan => "less_than",
            GreaterThan => "greater_than",
            LessOrEquals => "less_or_equals",
            GreaterOrEquals => "greater_or_equals",
            Between => "between",
            CurrentUser => "current_user",
            NotCurrentUser => "not_current_user",
            CurrentUserGroup => "current_user_group",
            NotCurrentUserGroup => "not_current_user_group",
            CurrentUserGroups => "current_user_groups",
            In => "in",
            NotIn => "not_in",
            Exists => "exists",
        }
    }

    /// Operators that resolve their operand from the caller, ignoring `value`
    pub fn is_caller_relative(&self) -> bool {
        matches!(
            self,
            CurrentUser | NotCurrentUser | CurrentUserGroup | NotCurrentUserGroup | CurrentUserGroups
        )
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const TEXT: &[Operator] = &[
    Exists, Equals, NotEquals, In, NotIn, Contains, NotContains, StartsWith, EndWith,
];
const ORDERED: &[Operator] = &[
    Exists,
    Equals,
    NotEquals,
    In,
    NotIn,
    LessThan,
    GreaterThan,
    LessOrEquals,
    GreaterOrEquals,
    Between,
];
const PERCENTAGE: &[Operator] = &[
    Exists,
    Equals,
    NotEquals,
    LessThan,
    GreaterThan,
    LessOrEquals,
    GreaterOrEquals,
    Between,
];
const EQUALITY: &[Operator] = &[Exists, Equals, NotEquals];
const SET: &[Operator] = &[Exists, Equals, NotEquals, In, NotIn];
const IDENTITY: &[Operator] = &[
    Exists,
    Equals,
    NotEquals,
    In,
    NotIn,
    CurrentUser,
    NotCurrentUser,
    CurrentUserGroup,
    NotCurrentUserGroup,
    CurrentUserGroups,
];
const NAME: &[Operator] = &[
    Exists, Equals, NotEquals, Contains, NotContains, StartsWith, EndWith,
];
const PARTIAL_TEXT: &[Operator] = &[Exists, Equals, NotEquals, Contains];
const PRESENCE: &[Operator] = &[Exists];
const RICH_TEXT: &[Operator] = &[Exists, Contains];

/// Allowed operators for a resolved `type` or `type.subpath`
pub fn allowed_operators(type_path: &str) -> Option<&'static [Operator]> {
    let allowed = match type_path {
        "text" | "url" | "email.address" | "phone.phoneNumber" | "address.city" => TEXT,
        "number" | "autoNumber" | "date" | "dateTime" | "money.currency" | "money.value"
        | "address.geolocation.0" | "address.geolocation.1" => ORDERED,
        "percentage" => PERCENTAGE,
        "boolean" | "encrypted" | "address.country" | "address.number" => EQUALITY,
        "address.state" | "address.district" | "phone.countryCode" | "picklist" => SET,
        "address.place" | "address.postalCode" | "address.complement" => PARTIAL_TEXT,
        "personName.first" | "personName.last" | "personName.full" => NAME,
        "lookup._id" | "ObjectId" => IDENTITY,
        "lookup" | "filter" | "filter.conditions" | "file" => PRESENCE,
        "richText" => RICH_TEXT,
        _ => return None,
    };
    Some(allowed)
}

/// Types whose string values are coerced to numbers
pub fn is_numeric_type(type_path: &str) -> bool {
    matches!(
        type_path,
        "number" | "autoNumber" | "percentage" | "money.value" | "address.geolocation.0"
            | "address.geolocation.1"
    )
}

pub fn is_date_type(type_path: &str) -> bool {
    matches!(type_path, "date" | "dateTime")
}

pub fn join_operators(ops: &[Operator]) -> String {
    ops.iter().map(Operator::as_str).collect::<Vec<_>>().join(", ")
}
