//! Exactly-once execution of scripts carried by patched markup.
//!
//! Some hosts run `<script>` elements as soon as a patch attaches them, others
//! never do. [`ScriptRunner`] probes the host once and then either lets the
//! host run attached scripts or evaluates them itself, never both.
use crate::document::Document;
use crate::types::{Node, NodeKey};
use thiserror::Error;

/// Inline code the runner attaches once to learn how the host behaves.
pub const PROBE_SCRIPT: &str = "/* partial-update script probe */";

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ScriptError {
    #[error("script evaluation failed: {0}")]
    Eval(String),
    #[error("loading script {src} failed: {reason}")]
    Load { src: String, reason: String },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScriptSource<'a> {
    Inline(&'a str),
    External(&'a str),
}

/// Script capabilities of the embedding runtime.
pub trait ScriptHost {
    fn eval(&mut self, code: &str) -> Result<(), ScriptError>;

    fn load(&mut self, src: &str) -> Result<(), ScriptError>;

    /// Notification that a patch attached a script element. Hosts that run
    /// injected scripts on their own do so here and return `true`.
    fn script_attached(&mut self, _script: ScriptSource<'_>) -> bool {
        false
    }
}

/// Host that ignores scripts; for documents without a script engine.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoScripts;

impl ScriptHost for NoScripts {
    fn eval(&mut self, _code: &str) -> Result<(), ScriptError> {
        Ok(())
    }

    fn load(&mut self, _src: &str) -> Result<(), ScriptError> {
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScriptSpec {
    pub src: Option<String>,
    pub code: String,
}

fn is_script_type(ty: Option<&str>) -> bool {
    let Some(ty) = ty.map(str::trim).filter(|t| !t.is_empty()) else {
        return true;
    };
    let ty = ty.to_ascii_lowercase();
    ty.contains("javascript") || ty.contains("ecmascript") || ty == "module"
}

/// Strip the legacy `<!-- ... //-->` wrapper some pages put around code.
fn strip_comment_wrapper(code: &str) -> &str {
    let trimmed = code.trim();
    let Some(inner) = trimmed.strip_prefix("<!--") else {
        return code;
    };
    let inner = inner
        .strip_suffix("//-->")
        .or_else(|| inner.strip_suffix("-->"))
        .unwrap_or(inner);
    inner.trim()
}

fn spec_from_parts(src: Option<&str>, ty: Option<&str>, code: String) -> Option<ScriptSpec> {
    if !is_script_type(ty) {
        return None;
    }
    let src = src.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string);
    let code = strip_comment_wrapper(&code).to_string();
    if src.is_none() && code.trim().is_empty() {
        return None;
    }
    Some(ScriptSpec { src, code })
}

/// Scripts under `roots` in the live document, in document order.
pub fn collect_scripts(doc: &Document, roots: &[NodeKey]) -> Vec<ScriptSpec> {
    roots
        .iter()
        .flat_map(|root| doc.elements_by_tag(*root, "script"))
        .filter_map(|k| {
            spec_from_parts(doc.attr(k, "src"), doc.attr(k, "type"), doc.text_content(k))
        })
        .collect()
}

/// Scripts in a detached markup tree, in document order.
pub fn collect_tree_scripts(nodes: &[Node]) -> Vec<ScriptSpec> {
    fn walk(node: &Node, out: &mut Vec<ScriptSpec>) {
        if node.is_element("script") {
            if let Some(spec) = spec_from_parts(node.attr("src"), node.attr("type"), node.text_content()) {
                out.push(spec);
            }
            return;
        }
        for c in node.children() {
            walk(c, out);
        }
    }
    let mut out = Vec::new();
    for n in nodes {
        walk(n, &mut out);
    }
    out
}

#[derive(Clone, Debug)]
pub struct ScriptRunner {
    bootstrap_script: String,
    host_runs_attached: Option<bool>,
}

impl ScriptRunner {
    /// `bootstrap_script` is the file name of the client script itself; an
    /// external script with that path is never loaded again.
    pub fn new(bootstrap_script: impl Into<String>) -> Self {
        Self {
            bootstrap_script: bootstrap_script.into(),
            host_runs_attached: None,
        }
    }

    /// Result of the one-time probe, if it already ran.
    pub fn host_runs_attached(&self) -> Option<bool> {
        self.host_runs_attached
    }

    fn probe(&mut self, host: &mut dyn ScriptHost) -> bool {
        *self.host_runs_attached.get_or_insert_with(|| {
            let runs = host.script_attached(ScriptSource::Inline(PROBE_SCRIPT));
            log::debug!(target: "ajax.patch", "host runs attached scripts: {runs}");
            runs
        })
    }

    fn is_bootstrap(&self, src: &str) -> bool {
        if self.bootstrap_script.is_empty() {
            return false;
        }
        let path = src.split(['?', '#']).next().unwrap_or(src);
        let file = path.rsplit('/').next().unwrap_or(path);
        file == self.bootstrap_script
    }

    /// Run each script exactly once, in order. Returns how many ran.
    pub fn run(
        &mut self,
        scripts: &[ScriptSpec],
        host: &mut dyn ScriptHost,
    ) -> Result<usize, ScriptError> {
        if scripts.is_empty() {
            return Ok(0);
        }
        let host_runs = self.probe(host);
        let mut ran = 0;
        for script in scripts {
            if let Some(src) = script.src.as_deref()
                && self.is_bootstrap(src)
            {
                log::trace!(target: "ajax.patch", "skipping bootstrap script {src}");
                continue;
            }
            let source = match script.src.as_deref() {
                Some(src) => ScriptSource::External(src),
                None => ScriptSource::Inline(&script.code),
            };
            if host_runs && host.script_attached(source) {
                ran += 1;
                continue;
            }
            match source {
                ScriptSource::External(src) => host.load(src)?,
                ScriptSource::Inline(code) => host.eval(code)?,
            }
            ran += 1;
        }
        Ok(ran)
    }
}
