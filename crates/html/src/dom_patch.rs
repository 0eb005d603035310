//! Markup-driven DOM patch primitives.
//!
//! Every host-specific quirk of applying server markup lives here:
//! table-section context wrapping, fallback parsing, and script execution.
//! Callers address nodes by key and hand over markup strings; they never
//! branch on what the host runtime can or cannot do.
//!
//! Invariants:
//! - Replacement nodes are fully built off-document before the target is
//!   touched; a failure while building leaves the document unchanged.
//! - Scripts in inserted markup run after the nodes are attached, in document
//!   order, exactly once.
use crate::document::{Document, DomError};
use crate::fragment::{HostParser, MarkupParser, parse_fragment};
use crate::scripts::{
    ScriptError, ScriptHost, ScriptRunner, ScriptSpec, collect_scripts, collect_tree_scripts,
};
use crate::types::{Node, NodeKey};
use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PatchError {
    #[error("unknown node: {0}")]
    UnknownNode(String),
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),
    #[error(transparent)]
    Dom(#[from] DomError),
    #[error(transparent)]
    Script(#[from] ScriptError),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Position {
    Before,
    After,
}

/// Attributes whose presence, not value, carries meaning.
const BOOLEAN_ATTRIBUTES: &[&str] = &["checked", "disabled", "selected", "readonly", "multiple"];

/// Synthetic ancestors a table-section element needs before a host parser
/// accepts it, outermost first.
fn table_context(tag: &str) -> &'static [&'static str] {
    match tag {
        "thead" | "tbody" | "tfoot" | "caption" | "colgroup" => &["table"],
        "tr" => &["table", "tbody"],
        "td" | "th" => &["table", "tbody", "tr"],
        "col" => &["table", "colgroup"],
        _ => &[],
    }
}

/// Descend through the synthetic wrapper chain and return what it wrapped.
fn unwrap_context(nodes: Vec<Node>, wrappers: &[&str]) -> Vec<Node> {
    let mut current = nodes;
    for wrapper in wrappers {
        let Some(pos) = current.iter().position(|n| n.is_element(wrapper)) else {
            return current;
        };
        current = current.swap_remove(pos).into_children();
    }
    current
}

fn find_element<'n>(nodes: &'n [Node], tag: &str) -> Option<&'n Node> {
    nodes.iter().find_map(|n| {
        if n.is_element(tag) {
            Some(n)
        } else {
            find_element(n.children(), tag)
        }
    })
}

pub struct DomPatcher {
    parser: Box<dyn MarkupParser>,
    scripts: ScriptRunner,
}

impl DomPatcher {
    pub fn new(bootstrap_script: impl Into<String>) -> Self {
        Self::with_parser(Box::new(HostParser), bootstrap_script)
    }

    pub fn with_parser(
        parser: Box<dyn MarkupParser>,
        bootstrap_script: impl Into<String>,
    ) -> Self {
        Self {
            parser,
            scripts: ScriptRunner::new(bootstrap_script),
        }
    }

    pub fn script_runner(&self) -> &ScriptRunner {
        &self.scripts
    }

    fn parse_or_fallback(&self, markup: &str, context: &str) -> Vec<Node> {
        match self.parser.parse(markup, context) {
            Ok(nodes) => nodes,
            Err(err) => {
                log::warn!(
                    target: "ajax.patch",
                    "host parser rejected markup in <{context}> ({err}); using fallback scanner"
                );
                parse_fragment(markup, context).into_children()
            }
        }
    }

    /// Build the nodes `markup` describes when it takes the place of (or sits
    /// next to) an element named `tag` under a parent named `parent_tag`.
    pub fn parse_markup(&self, markup: &str, tag: &str, parent_tag: &str) -> Vec<Node> {
        let tag = tag.to_ascii_lowercase();
        let wrappers = table_context(&tag);
        if wrappers.is_empty() {
            return self.parse_or_fallback(markup, parent_tag);
        }

        let mut wrapped = String::with_capacity(markup.len() + 48);
        for w in wrappers {
            wrapped.push('<');
            wrapped.push_str(w);
            wrapped.push('>');
        }
        wrapped.push_str(markup);
        for w in wrappers.iter().rev() {
            wrapped.push_str("</");
            wrapped.push_str(w);
            wrapped.push('>');
        }
        log::trace!(target: "ajax.patch", "wrapping <{tag}> markup in {wrappers:?}");
        // The wrapper chain starts at <table>, which any flow parent accepts.
        match self.parser.parse(&wrapped, "div") {
            Ok(nodes) => unwrap_context(nodes, wrappers),
            Err(err) => {
                log::warn!(
                    target: "ajax.patch",
                    "host parser rejected wrapped <{tag}> markup ({err}); using fallback scanner"
                );
                parse_fragment(markup, parent_tag).into_children()
            }
        }
    }

    fn parse_beside(
        &self,
        doc: &Document,
        target: NodeKey,
        markup: &str,
    ) -> Result<(NodeKey, Vec<Node>), PatchError> {
        let parent = doc
            .parent(target)
            .ok_or_else(|| PatchError::UnknownNode(format!("{target:?} is not attached")))?;
        let tag = doc.name(target).unwrap_or("");
        let parent_tag = doc.name(parent).unwrap_or("body");
        Ok((parent, self.parse_markup(markup, tag, parent_tag)))
    }

    fn run_scripts(
        &mut self,
        scripts: &[ScriptSpec],
        host: &mut dyn ScriptHost,
    ) -> Result<(), PatchError> {
        let ran = self.scripts.run(scripts, host)?;
        if ran > 0 {
            log::trace!(target: "ajax.patch", "ran {ran} script(s) from patched markup");
        }
        Ok(())
    }

    /// Swap `target` for the nodes described by `markup`. Returns the new
    /// top-level nodes.
    pub fn replace_subtree(
        &mut self,
        doc: &mut Document,
        target: NodeKey,
        markup: &str,
        host: &mut dyn ScriptHost,
    ) -> Result<Vec<NodeKey>, PatchError> {
        let (parent, nodes) = self.parse_beside(doc, target, markup)?;
        let keys = doc.import(&nodes);
        for key in &keys {
            doc.insert_before(parent, *key, target)?;
        }
        doc.remove(target)?;
        let scripts = collect_scripts(doc, &keys);
        self.run_scripts(&scripts, host)?;
        Ok(keys)
    }

    pub fn insert_adjacent(
        &mut self,
        doc: &mut Document,
        anchor: NodeKey,
        markup: &str,
        position: Position,
        host: &mut dyn ScriptHost,
    ) -> Result<Vec<NodeKey>, PatchError> {
        let (parent, nodes) = self.parse_beside(doc, anchor, markup)?;
        let keys = doc.import(&nodes);
        match position {
            Position::Before => {
                for key in &keys {
                    doc.insert_before(parent, *key, anchor)?;
                }
            }
            Position::After => {
                let mut last = anchor;
                for key in &keys {
                    doc.insert_after(parent, *key, last)?;
                    last = *key;
                }
            }
        }
        let scripts = collect_scripts(doc, &keys);
        self.run_scripts(&scripts, host)?;
        Ok(keys)
    }

    pub fn remove(&mut self, doc: &mut Document, target: NodeKey) -> Result<(), PatchError> {
        if !doc.contains(target) {
            return Err(PatchError::UnknownNode(format!("{target:?}")));
        }
        doc.remove(target)?;
        Ok(())
    }

    /// Apply `name=value` pairs. A boolean attribute set to `false` is removed.
    pub fn set_attributes(
        &mut self,
        doc: &mut Document,
        target: NodeKey,
        pairs: &[(String, String)],
    ) -> Result<(), PatchError> {
        for (name, value) in pairs {
            let is_boolean = BOOLEAN_ATTRIBUTES.iter().any(|b| b.eq_ignore_ascii_case(name));
            if is_boolean && value.trim().eq_ignore_ascii_case("false") {
                doc.remove_attr(target, name)?;
            } else {
                doc.set_attr(target, name, value.as_str())?;
            }
        }
        Ok(())
    }

    /// Replace the body's attributes and content. Markup may be a full
    /// `<body>` element or bare content.
    pub fn replace_body(
        &mut self,
        doc: &mut Document,
        markup: &str,
        host: &mut dyn ScriptHost,
    ) -> Result<NodeKey, PatchError> {
        let nodes = self.parse_or_fallback(markup, "html");
        self.apply_body(doc, &nodes, host)
    }

    fn apply_body(
        &mut self,
        doc: &mut Document,
        nodes: &[Node],
        host: &mut dyn ScriptHost,
    ) -> Result<NodeKey, PatchError> {
        let body = doc
            .body()
            .ok_or_else(|| PatchError::UnknownNode("body".to_string()))?;
        let (attributes, content) = match find_element(nodes, "body") {
            Some(Node::Element {
                attributes,
                children,
                ..
            }) => (Some(attributes.clone()), children.as_slice()),
            _ => (None, nodes),
        };

        let keys = doc.import(content);
        for old in doc.children(body).to_vec() {
            doc.remove(old)?;
        }
        for key in &keys {
            doc.append_child(body, *key)?;
        }
        if let Some(attributes) = attributes {
            doc.replace_attributes(body, attributes)?;
        }
        let scripts = collect_scripts(doc, &keys);
        self.run_scripts(&scripts, host)?;
        Ok(body)
    }

    /// Head content is not replaced; only the scripts it carries run.
    pub fn replace_head(
        &mut self,
        markup: &str,
        host: &mut dyn ScriptHost,
    ) -> Result<(), PatchError> {
        let nodes = self.parse_or_fallback(markup, "html");
        self.apply_head(&nodes, host)
    }

    fn apply_head(&mut self, nodes: &[Node], host: &mut dyn ScriptHost) -> Result<(), PatchError> {
        let scripts = match find_element(nodes, "head") {
            Some(head) => collect_tree_scripts(head.children()),
            None => collect_tree_scripts(nodes),
        };
        self.run_scripts(&scripts, host)
    }

    /// Whole-document replacement: head scripts, then the body.
    pub fn replace_document(
        &mut self,
        doc: &mut Document,
        markup: &str,
        host: &mut dyn ScriptHost,
    ) -> Result<NodeKey, PatchError> {
        let nodes = self.parse_or_fallback(markup, "html");
        if let Some(head) = find_element(&nodes, "head") {
            self.apply_head(std::slice::from_ref(head), host)?;
        }
        match find_element(&nodes, "body") {
            Some(body) => self.apply_body(doc, std::slice::from_ref(body), host),
            None => self.apply_body(doc, &nodes, host),
        }
    }
}

/// Resolve an author id to a live element.
pub fn resolve_id(doc: &Document, id: &str) -> Result<NodeKey, PatchError> {
    doc.element_by_id(id)
        .ok_or_else(|| PatchError::UnknownNode(id.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scripts::{NoScripts, ScriptSource};
    use crate::serialize::{inner_html, outer_html};

    #[derive(Default)]
    struct Evaluated(Vec<String>);

    impl ScriptHost for Evaluated {
        fn eval(&mut self, code: &str) -> Result<(), ScriptError> {
            self.0.push(code.to_string());
            Ok(())
        }

        fn load(&mut self, src: &str) -> Result<(), ScriptError> {
            self.0.push(format!("load:{src}"));
            Ok(())
        }
    }

    struct AutoRuns(Vec<String>);

    impl ScriptHost for AutoRuns {
        fn eval(&mut self, code: &str) -> Result<(), ScriptError> {
            self.0.push(format!("eval:{code}"));
            Ok(())
        }

        fn load(&mut self, src: &str) -> Result<(), ScriptError> {
            self.0.push(format!("load:{src}"));
            Ok(())
        }

        fn script_attached(&mut self, script: ScriptSource<'_>) -> bool {
            if let ScriptSource::Inline(code) = script
                && code != crate::scripts::PROBE_SCRIPT
            {
                self.0.push(format!("auto:{code}"));
            }
            true
        }
    }

    fn page() -> Document {
        Document::parse(
            "<html><head></head><body>\
             <div id=a class=old>old</div>\
             <table><tbody id=tb><tr id=r1><td>1</td></tr><tr id=r2><td>2</td></tr></tbody></table>\
             </body></html>",
        )
    }

    #[test]
    fn replace_swaps_node_in_place() {
        let mut doc = page();
        let mut patcher = DomPatcher::new("jsf.js");
        let a = doc.element_by_id("a").unwrap();
        let keys = patcher
            .replace_subtree(&mut doc, a, "<div id=a class=new>new</div>", &mut NoScripts)
            .unwrap();
        assert_eq!(keys.len(), 1);
        assert!(!doc.contains(a));
        let new_a = doc.element_by_id("a").unwrap();
        assert_eq!(outer_html(&doc, new_a), "<div id=\"a\" class=\"new\">new</div>");
    }

    #[test]
    fn replacing_twice_is_idempotent() {
        let mut doc = page();
        let mut patcher = DomPatcher::new("jsf.js");
        let markup = "<div id=a><span>v</span></div>";
        for _ in 0..2 {
            let a = resolve_id(&doc, "a").unwrap();
            patcher.replace_subtree(&mut doc, a, markup, &mut NoScripts).unwrap();
        }
        let body = doc.body().unwrap();
        let html = inner_html(&doc, body);
        assert_eq!(html.matches("id=\"a\"").count(), 1);
        assert!(html.starts_with("<div id=\"a\"><span>v</span></div>"));
    }

    #[test]
    fn table_rows_are_wrapped_for_the_host_parser() {
        let mut doc = page();
        let mut patcher = DomPatcher::new("jsf.js");
        let r1 = doc.element_by_id("r1").unwrap();
        patcher
            .replace_subtree(&mut doc, r1, "<tr id=r1><td>one</td></tr>", &mut NoScripts)
            .unwrap();
        let tb = doc.element_by_id("tb").unwrap();
        assert_eq!(
            inner_html(&doc, tb),
            "<tr id=\"r1\"><td>one</td></tr><tr id=\"r2\"><td>2</td></tr>"
        );
    }

    #[test]
    fn cells_are_wrapped_too() {
        let mut doc = page();
        let mut patcher = DomPatcher::new("jsf.js");
        let r2 = doc.element_by_id("r2").unwrap();
        let td = doc.element_children(r2).next().unwrap();
        patcher
            .insert_adjacent(&mut doc, td, "<td>3</td>", Position::After, &mut NoScripts)
            .unwrap();
        assert_eq!(inner_html(&doc, r2), "<td>2</td><td>3</td>");
    }

    #[test]
    fn misplaced_rows_fall_back_to_the_scanner() {
        let mut doc = page();
        let mut patcher = DomPatcher::new("jsf.js");
        let a = doc.element_by_id("a").unwrap();
        patcher
            .replace_subtree(&mut doc, a, "<tr id=a><td>x</td></tr>", &mut NoScripts)
            .unwrap();
        let a = doc.element_by_id("a").unwrap();
        assert!(doc.is_element(a, "tr"));
    }

    #[test]
    fn insert_before_and_after_keep_markup_order() {
        let mut doc = page();
        let mut patcher = DomPatcher::new("jsf.js");
        let a = doc.element_by_id("a").unwrap();
        patcher
            .insert_adjacent(&mut doc, a, "<p id=b1></p><p id=b2></p>", Position::Before, &mut NoScripts)
            .unwrap();
        patcher
            .insert_adjacent(&mut doc, a, "<p id=c1></p><p id=c2></p>", Position::After, &mut NoScripts)
            .unwrap();
        let body = doc.body().unwrap();
        let ids: Vec<_> = doc
            .element_children(body)
            .filter_map(|k| doc.attr(k, "id"))
            .collect();
        assert_eq!(ids, vec!["b1", "b2", "a", "c1", "c2"]);
    }

    #[test]
    fn scripts_run_once_with_either_host_behaviour() {
        let markup = "<div id=a><script>hit()</script></div>";

        let mut doc = page();
        let mut patcher = DomPatcher::new("jsf.js");
        let mut host = Evaluated::default();
        let a = doc.element_by_id("a").unwrap();
        patcher.replace_subtree(&mut doc, a, markup, &mut host).unwrap();
        assert_eq!(host.0, vec!["hit()"]);

        let mut doc = page();
        let mut patcher = DomPatcher::new("jsf.js");
        let mut host = AutoRuns(Vec::new());
        let a = doc.element_by_id("a").unwrap();
        patcher.replace_subtree(&mut doc, a, markup, &mut host).unwrap();
        assert_eq!(host.0, vec!["auto:hit()"]);
    }

    #[test]
    fn remove_unknown_node_fails() {
        let mut doc = page();
        let mut patcher = DomPatcher::new("jsf.js");
        let a = doc.element_by_id("a").unwrap();
        patcher.remove(&mut doc, a).unwrap();
        assert!(matches!(patcher.remove(&mut doc, a), Err(PatchError::UnknownNode(_))));
        assert!(matches!(resolve_id(&doc, "a"), Err(PatchError::UnknownNode(_))));
    }

    #[test]
    fn boolean_attributes_false_removes() {
        let mut doc = Document::parse("<input id=i disabled>");
        let mut patcher = DomPatcher::new("jsf.js");
        let i = doc.element_by_id("i").unwrap();
        patcher
            .set_attributes(
                &mut doc,
                i,
                &[
                    ("disabled".to_string(), "false".to_string()),
                    ("value".to_string(), "v".to_string()),
                ],
            )
            .unwrap();
        assert!(!doc.has_attr(i, "disabled"));
        assert_eq!(doc.attr(i, "value"), Some("v"));
    }

    #[test]
    fn body_replacement_takes_attributes_and_content() {
        let mut doc = page();
        let mut patcher = DomPatcher::new("jsf.js");
        let mut host = Evaluated::default();
        let body = patcher
            .replace_body(&mut doc, "<body class=b><p id=n>n</p><script>go()</script></body>", &mut host)
            .unwrap();
        assert_eq!(doc.attr(body, "class"), Some("b"));
        assert!(doc.element_by_id("a").is_none());
        assert!(doc.element_by_id("n").is_some());
        assert_eq!(host.0, vec!["go()"]);
    }

    #[test]
    fn head_replacement_only_runs_scripts() {
        let mut doc = page();
        let mut patcher = DomPatcher::new("jsf.js");
        let mut host = Evaluated::default();
        let before = inner_html(&doc, doc.head().unwrap());
        patcher
            .replace_head("<head><title>x</title><script>h()</script><script src=/jsf.js></script></head>", &mut host)
            .unwrap();
        assert_eq!(inner_html(&doc, doc.head().unwrap()), before);
        assert_eq!(host.0, vec!["h()"]);
    }

    #[test]
    fn document_replacement_runs_head_then_body() {
        let mut doc = page();
        let mut patcher = DomPatcher::new("jsf.js");
        let mut host = Evaluated::default();
        patcher
            .replace_document(
                &mut doc,
                "<html><head><script>first()</script></head><body><div id=z><script>second()</script></div></body></html>",
                &mut host,
            )
            .unwrap();
        assert!(doc.element_by_id("z").is_some());
        assert_eq!(host.0, vec!["first()", "second()"]);
    }
}
