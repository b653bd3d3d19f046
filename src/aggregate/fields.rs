//! Field resolution for aggregation dimensions.
//!
//! Resolves dotted paths against the metadata registry (following lookups
//! into their referenced documents), expands compound types into the
//! subfields the store must return, and describes how lookup values are
//! labelled.

use std::collections::{BTreeMap, BTreeSet};

use crate::aggregate::config::LookupDisplay;
use crate::meta::{FieldMeta, MetaObject, MetaRegistry};
use crate::pipeline::DetailLookup;
use crate::record::root_segment;

/// Subfields fetched for compound field types
pub fn compound_subfields(field_type: &str) -> &'static [&'static str] {
    match field_type {
        "address" => &[
            "city",
            "state",
            "country",
            "district",
            "place",
            "number",
            "postalCode",
            "complement",
            "placeType",
        ],
        "money" => &["value", "currency"],
        "personName" => &["full", "first", "last"],
        "phone" => &["phoneNumber", "countryCode"],
        "email" => &["address"],
        _ => &[],
    }
}

/// Label and type of a dimension path
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedField {
    pub label: String,
    pub field_type: String,
    /// Descriptor of the last metadata field on the path
    pub meta: Option<FieldMeta>,
}

/// Resolves `path` against `meta`, following lookups.
///
/// `contact.status` labels as `"Contact > Status"`; `amount.value` on a
/// money field types as `currency`. Returns `None` when the root field is
/// unknown.
pub fn resolve_field(
    registry: &MetaRegistry,
    meta: &MetaObject,
    path: &str,
    lang: &str,
) -> Option<ResolvedField> {
    let mut segments = path.split('.');
    let root = meta.field(segments.next()?)?;
    let mut labels = vec![root.label_for(lang)];
    let mut current = root.clone();
    let mut field_type = root.field_type.clone();

    for segment in segments {
        if current.is_lookup() {
            let child = current
                .document
                .as_deref()
                .and_then(|doc| registry.meta(doc))
                .and_then(|doc| doc.field(segment));
            match child {
                Some(child) => {
                    labels.push(child.label_for(lang));
                    field_type = child.field_type.clone();
                    current = child.clone();
                }
                None => {
                    labels.push(segment.to_string());
                    field_type = "text".to_string();
                }
            }
        } else {
            field_type = match (current.field_type.as_str(), segment) {
                ("money", "value") => "currency".to_string(),
                ("money", _) => "text".to_string(),
                (_, _) => field_type,
            };
        }
    }

    Some(ResolvedField {
        label: labels.join(" > "),
        field_type,
        meta: Some(current),
    })
}

/// How a lookup field's values are keyed and labelled.
///
/// `descriptionFields` default to `["name"]`. Simple fields feed the
/// pattern `"{a}"` or `"{a} ({b} - {c})"`; nested ones are only fetched.
pub fn lookup_display(field: &FieldMeta) -> Option<LookupDisplay> {
    let document = field.document.clone().filter(|_| field.is_lookup())?;
    let described: Vec<String> = if field.description_fields.is_empty() {
        vec!["name".to_string()]
    } else {
        field.description_fields.clone()
    };
    let (nested_fields, simple_fields): (Vec<String>, Vec<String>) =
        described.into_iter().partition(|f| f.contains('.'));

    let format_pattern = match simple_fields.split_first() {
        None => String::new(),
        Some((first, [])) => format!("{{{}}}", first),
        Some((first, rest)) => format!(
            "{{{}}} ({})",
            first,
            rest.iter()
                .map(|f| format!("{{{}}}", f))
                .collect::<Vec<_>>()
                .join(" - ")
        ),
    };
    let display_field = simple_fields
        .first()
        .cloned()
        .unwrap_or_else(|| "name".to_string());

    Some(LookupDisplay {
        document,
        display_field,
        format_pattern,
        simple_fields,
        nested_fields,
    })
}

/// Store fields and lookup populations one aggregation needs
#[derive(Debug, Clone, Default)]
pub struct ProjectionPlan {
    fields: BTreeSet<String>,
    lookups: BTreeMap<String, (String, BTreeSet<String>)>,
}

impl ProjectionPlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a dimension or measure path
    pub fn add(&mut self, meta: &MetaObject, path: &str) {
        let root = root_segment(path);
        let Some(field) = meta.field(root) else {
            self.fields.insert(path.to_string());
            return;
        };

        if field.is_lookup() {
            self.fields.insert(format!("{}._id", root));
            let Some(document) = field.document.clone() else {
                return;
            };
            let wanted: Vec<String> = if path.len() > root.len() {
                vec![path[root.len() + 1..].to_string()]
            } else {
                lookup_display(field)
                    .map(|d| d.simple_fields.into_iter().chain(d.nested_fields).collect())
                    .unwrap_or_default()
            };
            self.lookups
                .entry(root.to_string())
                .or_insert_with(|| (document, BTreeSet::new()))
                .1
                .extend(wanted);
            return;
        }

        let subfields = compound_subfields(&field.field_type);
        if path == root && !subfields.is_empty() {
            for sub in subfields {
                self.fields.insert(format!("{}.{}", root, sub));
            }
        } else {
            self.fields.insert(path.to_string());
        }
    }

    /// Comma-separated list for the find request
    pub fn fields_param(&self) -> String {
        self.fields.iter().cloned().collect::<Vec<_>>().join(",")
    }

    pub fn fields(&self) -> &BTreeSet<String> {
        &self.fields
    }

    pub fn lookups(&self) -> Vec<DetailLookup> {
        self.lookups
            .iter()
            .map(|(field, (document, wanted))| DetailLookup {
                field: field.clone(),
                document: document.clone(),
                detail_fields: wanted.iter().cloned().collect(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> MetaRegistry {
        MetaRegistry::from_json_str(
            r#"{"metas": {
                "Deal": {"fields": {
                    "amount": {"type": "money", "label": {"en": "Amount", "pt_BR": "Valor"}},
                    "contact": {"type": "lookup", "document": "Contact", "label": {"en": "Contact"},
                        "descriptionFields": ["name", "code", "address.city"]},
                    "owner": {"type": "lookup", "document": "User"},
                    "address": {"type": "address"},
                    "status": {"type": "picklist", "label": {"en": "Status"}}
                }},
                "Contact": {"fields": {"status": {"type": "picklist", "label": {"en": "Contact status"}}}},
                "User": {"fields": {"name": {"type": "text"}}}
            }}"#,
        )
        .unwrap()
    }

    #[test]
    fn test_resolve_labels() {
        let registry = registry();
        let deal = registry.meta("Deal").unwrap();

        let status = resolve_field(&registry, deal, "status", "en").unwrap();
        assert_eq!(status.label, "Status");
        assert_eq!(status.field_type, "picklist");

        let nested = resolve_field(&registry, deal, "contact.status", "en").unwrap();
        assert_eq!(nested.label, "Contact > Contact status");
        assert_eq!(nested.field_type, "picklist");

        let money = resolve_field(&registry, deal, "amount.value", "pt_BR").unwrap();
        assert_eq!(money.label, "Valor");
        assert_eq!(money.field_type, "currency");

        assert!(resolve_field(&registry, deal, "missing", "en").is_none());
    }

    #[test]
    fn test_lookup_display() {
        let registry = registry();
        let deal = registry.meta("Deal").unwrap();

        let contact = lookup_display(deal.field("contact").unwrap()).unwrap();
        assert_eq!(contact.format_pattern, "{name} ({code})");
        assert_eq!(contact.display_field, "name");
        assert_eq!(contact.nested_fields, vec!["address.city".to_string()]);

        let owner = lookup_display(deal.field("owner").unwrap()).unwrap();
        assert_eq!(owner.format_pattern, "{name}");
        assert!(lookup_display(deal.field("status").unwrap()).is_none());
    }

    #[test]
    fn test_projection_plan() {
        let registry = registry();
        let deal = registry.meta("Deal").unwrap();
        let mut plan = ProjectionPlan::new();
        for path in ["contact", "owner.name", "amount", "address", "status", "free"] {
            plan.add(deal, path);
        }
        let fields = plan.fields();
        assert!(fields.contains("contact._id"));
        assert!(fields.contains("amount.value") && fields.contains("amount.currency"));
        assert!(fields.contains("address.postalCode"));
        assert!(fields.contains("status") && fields.contains("free"));

        let lookups = plan.lookups();
        assert_eq!(lookups.len(), 2);
        assert_eq!(lookups[0].field, "contact");
        assert_eq!(lookups[0].detail_fields, vec!["address.city", "code", "name"]);
        assert_eq!(lookups[1].detail_fields, vec!["name"]);
    }
}
