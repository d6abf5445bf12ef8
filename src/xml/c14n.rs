use std::collections::{BTreeMap, BTreeSet};

use crate::xml::{Element, Node, XML_NAMESPACE};

/// Namespace bindings in effect at some point of a document, keyed by
/// prefix. The default namespace uses the empty prefix.
pub type NamespaceScope = BTreeMap<String, String>;

/// Exclusive XML Canonicalization (without comments) of `element`.
///
/// `inherited` holds the bindings declared by the element's ancestors, so a
/// subtree such as `SignedInfo` canonicalizes exactly as it would inside its
/// document. `inclusive` is the `InclusiveNamespaces` prefix list; `#default`
/// stands for the default namespace.
pub fn canonicalize(element: &Element, inherited: &NamespaceScope, inclusive: &[&str]) -> String {
    let mut out = String::new();
    write_element(&mut out, element, inherited, &NamespaceScope::new(), inclusive);
    out
}

/// Bindings in effect inside the last of `ancestors`, outermost first
pub fn in_scope<'a>(ancestors: impl IntoIterator<Item = &'a Element>) -> NamespaceScope {
    let mut scope = NamespaceScope::new();
    for element in ancestors {
        declare(&mut scope, element);
    }
    scope
}

/// Apply the namespace declarations carried by `element` to `scope`
pub fn declare(scope: &mut NamespaceScope, element: &Element) {
    for (key, value) in element.attributes() {
        let prefix = match key.as_str() {
            "xmlns" => "",
            other => match other.strip_prefix("xmlns:") {
                Some(prefix) => prefix,
                None => continue,
            },
        };
        if value.is_empty() {
            scope.remove(prefix);
        } else {
            scope.insert(prefix.to_owned(), value.clone());
        }
    }
}

fn write_element(
    out: &mut String,
    element: &Element,
    parent_declared: &NamespaceScope,
    parent_rendered: &NamespaceScope,
    inclusive: &[&str],
) {
    let mut declared = parent_declared.clone();
    declare(&mut declared, element);

    let attributes: Vec<&(String, String)> = element
        .attributes()
        .iter()
        .filter(|(key, _)| key != "xmlns" && !key.starts_with("xmlns:"))
        .collect();

    // Visibly utilized prefixes
    let mut utilized = BTreeSet::new();
    utilized.insert(element.prefix());
    for (key, _) in &attributes {
        if let Some((prefix, _)) = key.split_once(':') {
            // xml: is implicitly bound and never rendered
            if prefix != "xml" {
                utilized.insert(prefix);
            }
        }
    }
    for prefix in inclusive {
        let prefix = if *prefix == "#default" { "" } else { prefix };
        if declared.contains_key(prefix) {
            utilized.insert(prefix);
        }
    }

    let mut rendered = parent_rendered.clone();
    let mut namespaces = Vec::new();
    for prefix in utilized {
        match declared.get(prefix) {
            Some(uri) => {
                if parent_rendered.get(prefix) != Some(uri) {
                    namespaces.push((prefix, uri.as_str()));
                    rendered.insert(prefix.to_owned(), uri.clone());
                }
            }
            // An unprefixed element outside any default namespace must undo
            // a default rendered by an ancestor
            None if prefix.is_empty() => {
                if parent_rendered.get("").is_some_and(|uri| !uri.is_empty()) {
                    namespaces.push(("", ""));
                    rendered.insert(String::new(), String::new());
                }
            }
            None => {}
        }
    }

    let mut sorted: Vec<(&str, &str, &str, &str)> = attributes
        .iter()
        .map(|(key, value)| {
            let (uri, local) = match key.split_once(':') {
                Some(("xml", local)) => (XML_NAMESPACE, local),
                Some((prefix, local)) => (declared.get(prefix).map_or("", String::as_str), local),
                None => ("", key.as_str()),
            };
            (uri, local, key.as_str(), value.as_str())
        })
        .collect();
    sorted.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));

    out.push('<');
    out.push_str(element.name());
    for (prefix, uri) in &namespaces {
        if prefix.is_empty() {
            out.push_str(" xmlns=\"");
        } else {
            out.push_str(" xmlns:");
            out.push_str(prefix);
            out.push_str("=\"");
        }
        escape_attr_value(out, uri);
        out.push('"');
    }
    for (_, _, key, value) in &sorted {
        out.push(' ');
        out.push_str(key);
        out.push_str("=\"");
        escape_attr_value(out, value);
        out.push('"');
    }
    out.push('>');

    for child in element.children() {
        match child {
            Node::Element(child) => write_element(out, child, &declared, &rendered, inclusive),
            Node::Text(text) => escape_text_value(out, text),
        }
    }

    out.push_str("</");
    out.push_str(element.name());
    out.push('>');
}

pub(crate) fn escape_attr_value(out: &mut String, value: &str) {
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '"' => out.push_str("&quot;"),
            '\t' => out.push_str("&#x9;"),
            '\n' => out.push_str("&#xA;"),
            '\r' => out.push_str("&#xD;"),
            _ => out.push(ch),
        }
    }
}

pub(crate) fn escape_text_value(out: &mut String, value: &str) {
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\r' => out.push_str("&#xD;"),
            _ => out.push(ch),
        }
    }
}
