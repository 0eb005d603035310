//! Node reference resolution.
use crate::document::Document;
use crate::types::NodeKey;

/// Resolve a string reference: `id` first, then a `name` match that must be
/// unique. Ambiguous names resolve to nothing.
pub fn resolve_by_id_or_name(doc: &Document, reference: &str) -> Option<NodeKey> {
    if reference.is_empty() {
        return None;
    }
    if let Some(key) = doc.element_by_id(reference) {
        return Some(key);
    }
    let mut named = doc.elements_by_name(reference);
    match (named.next(), named.next()) {
        (Some(only), None) => Some(only),
        _ => None,
    }
}

pub fn ancestor_form(doc: &Document, key: NodeKey) -> Option<NodeKey> {
    if doc.is_element(key, "form") {
        return Some(key);
    }
    doc.ancestors(key).find(|k| doc.is_element(*k, "form"))
}

/// The form an element submits with.
///
/// Order: an explicit `form` owner attribute, then the nearest ancestor
/// `<form>`, then the single document form containing an element with the same
/// `name`.
pub fn resolve_owning_form(doc: &Document, key: NodeKey) -> Option<NodeKey> {
    if let Some(owner) = doc.attr(key, "form")
        && let Some(form) = doc.element_by_id(owner)
        && doc.is_element(form, "form")
    {
        return Some(form);
    }
    if let Some(form) = ancestor_form(doc, key) {
        return Some(form);
    }
    let name = doc.attr(key, "name").filter(|n| !n.is_empty())?;
    unique_form_holding(doc, name)
}

/// Same as [`resolve_owning_form`] for a string reference. A reference that
/// names no element may still identify a form through a uniquely named
/// control inside it.
pub fn resolve_owning_form_ref(doc: &Document, reference: &str) -> Option<NodeKey> {
    match resolve_by_id_or_name(doc, reference) {
        Some(key) => resolve_owning_form(doc, key),
        None => unique_form_holding(doc, reference),
    }
}

fn unique_form_holding(doc: &Document, name: &str) -> Option<NodeKey> {
    let mut found = None;
    for form in doc.forms() {
        let holds = doc
            .descendants(form)
            .any(|k| doc.name(k).is_some() && doc.attr(k, "name") == Some(name));
        if holds {
            if found.is_some() {
                return None;
            }
            found = Some(form);
        }
    }
    found
}

/// `key` itself if it is a form, plus every form below it.
pub fn forms_within(doc: &Document, key: NodeKey) -> Vec<NodeKey> {
    doc.elements_by_tag(key, "form")
}

/// First element below `root` whose `name` attribute equals `name`.
pub fn find_named_descendant(doc: &Document, root: NodeKey, name: &str) -> Option<NodeKey> {
    doc.descendants(root)
        .find(|k| doc.name(*k).is_some() && doc.attr(*k, "name") == Some(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc() -> Document {
        Document::parse(
            "<form id=f1><input name=a id=ia><input name=dup></form>\
             <form id=f2><input name=dup><input name=only2></form>\
             <input id=outside form=f2 name=detached>\
             <input id=loose name=loose>",
        )
    }

    #[test]
    fn id_wins_over_name() {
        let d = doc();
        assert_eq!(resolve_by_id_or_name(&d, "ia"), d.element_by_id("ia"));
        assert_eq!(resolve_by_id_or_name(&d, "a"), d.element_by_id("ia"));
    }

    #[test]
    fn ambiguous_names_resolve_to_nothing() {
        let d = doc();
        assert_eq!(resolve_by_id_or_name(&d, "dup"), None);
        assert_eq!(resolve_by_id_or_name(&d, ""), None);
    }

    #[test]
    fn owning_form_prefers_form_attribute() {
        let d = doc();
        let outside = d.element_by_id("outside").unwrap();
        assert_eq!(resolve_owning_form(&d, outside), d.element_by_id("f2"));
        let inside = d.element_by_id("ia").unwrap();
        assert_eq!(resolve_owning_form(&d, inside), d.element_by_id("f1"));
    }

    #[test]
    fn owning_form_falls_back_to_unique_named_control() {
        let d = doc();
        assert_eq!(resolve_owning_form_ref(&d, "only2"), d.element_by_id("f2"));
        assert_eq!(resolve_owning_form_ref(&d, "dup"), None);
        let loose = d.element_by_id("loose").unwrap();
        assert_eq!(resolve_owning_form(&d, loose), None);
    }
}
