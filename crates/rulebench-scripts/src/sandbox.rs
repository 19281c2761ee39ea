//! Sandboxed JavaScript evaluation.
//!
//! Each evaluation gets a fresh `boa_engine` context, never pooled or reused.
//! Isolation is enforced at the boundary rather than by trusting the script:
//!
//! - a static deny scan rejects sources that mention capabilities outside
//!   the sandbox before anything runs;
//! - a prelude deletes every global not on the allow-list and freezes the
//!   surviving surface, so the script sees only pure helpers;
//! - input crosses the boundary as serialized JSON and output comes back as
//!   a JSON string, so no live references exist in either direction.
//!
//! The script source is a function body invoked as
//! `(function(msg, metadata, msgType) { <source> })(...)`, the rule-node
//! convention this harness exists to test.

use rulebench_core::Metadata;
use serde_json::{json, Value};

use boa_engine::{Context, Source};

/// Globals a script may touch. Everything else is deleted by the prelude.
const ALLOWED_GLOBALS: &[&str] = &[
    "JSON",
    "Math",
    "Number",
    "String",
    "Boolean",
    "Array",
    "Object",
    "Date",
    "parseInt",
    "parseFloat",
    "isNaN",
    "isFinite",
    "Error",
    "RegExp",
    "NaN",
    "Infinity",
    "undefined",
];

/// Capabilities a script must never reference. Used both by the static scan
/// and to classify runtime reference errors.
const DENIED_CAPABILITIES: &[&str] = &[
    "eval",
    "Function",
    "require",
    "import",
    "fetch",
    "XMLHttpRequest",
    "process",
    "globalThis",
    "__proto__",
];

/// Why an evaluation failed inside the sandbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    /// The script reached for a capability outside the allow-list.
    Violation(String),
    /// The script raised a runtime error.
    Runtime(String),
}

/// Raw script output: the JSON value plus the JavaScript `typeof` of the
/// original result, so `true` and `"true"` stay distinguishable.
#[derive(Debug, Clone)]
pub struct ScriptOutput {
    pub value: Value,
    pub js_type: String,
}

/// Reject sources that mention a denied capability.
pub fn deny_scan(source: &str) -> Result<(), String> {
    for capability in DENIED_CAPABILITIES {
        if contains_identifier(source, capability) {
            return Err(format!("script references denied capability `{}`", capability));
        }
    }
    Ok(())
}

/// Whole-identifier match: `ident` must not be embedded in a longer
/// identifier (so `important` does not trip the `import` rule).
fn contains_identifier(source: &str, ident: &str) -> bool {
    let bytes = source.as_bytes();
    let mut from = 0;
    while let Some(pos) = source[from..].find(ident) {
        let start = from + pos;
        let end = start + ident.len();
        let before_ok = start == 0 || !is_ident_char(bytes[start - 1]);
        let after_ok = end == bytes.len() || !is_ident_char(bytes[end]);
        if before_ok && after_ok {
            return true;
        }
        from = start + 1;
    }
    false
}

fn is_ident_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'$'
}

/// Prelude run before user code: prune globals down to the allow-list,
/// install the `datetime` helper namespace, freeze what remains.
fn prelude() -> String {
    let allowed = ALLOWED_GLOBALS
        .iter()
        .map(|name| format!("\"{}\":1", name))
        .collect::<Vec<_>>()
        .join(",");

    format!(
        r#"
var __allowed = {{{allowed},"__allowed":1,"__global":1,"__input":1,"datetime":1}};
var __global = (typeof globalThis !== 'undefined') ? globalThis : this;
Object.getOwnPropertyNames(__global).forEach(function(key) {{
    if (!__allowed[key]) {{
        try {{ delete __global[key]; }} catch (e) {{ __global[key] = undefined; }}
    }}
}});
var datetime = {{
    now: function() {{ return Date.now(); }},
    format: function(ts) {{
        var d = (ts === undefined) ? new Date() : new Date(ts);
        function pad(n) {{ return (n < 10 ? "0" : "") + n; }}
        return d.getUTCFullYear() + "-" + pad(d.getUTCMonth() + 1) + "-" + pad(d.getUTCDate())
            + " " + pad(d.getUTCHours()) + ":" + pad(d.getUTCMinutes()) + ":" + pad(d.getUTCSeconds());
    }}
}};
Object.freeze(datetime);
Object.freeze(Object.prototype);
Object.freeze(Array.prototype);
"#
    )
}

/// Evaluate a script body against `msg`, `metadata`, `msgType`.
///
/// Synchronous; callers put it on a disposable blocking worker and enforce
/// the timeout by abandoning that worker.
pub fn evaluate(
    source: &str,
    msg: Value,
    metadata: &Metadata,
    msg_type: &str,
) -> Result<ScriptOutput, Fault> {
    let input = json!({
        "msg": msg,
        "metadata": metadata,
        "msgType": msg_type,
    });
    let input_json = serde_json::to_string(&input)
        .map_err(|e| Fault::Runtime(format!("failed to serialize script input: {}", e)))?;
    // Embedding the JSON text as a JS string literal needs one more round of
    // string-escaping; a JSON string literal is a valid JS string literal.
    let input_literal = serde_json::to_string(&input_json)
        .map_err(|e| Fault::Runtime(format!("failed to escape script input: {}", e)))?;

    let full_code = format!(
        r#"{prelude}
var __input = JSON.parse({input_literal});
var __result = (function(msg, metadata, msgType) {{
{source}
}})(__input.msg, __input.metadata, __input.msgType);
JSON.stringify({{ "t": typeof __result, "v": __result === undefined ? null : __result }});
"#,
        prelude = prelude(),
        input_literal = input_literal,
        source = source,
    );

    let mut context = Context::default();
    let completion = context
        .eval(Source::from_bytes(&full_code))
        .map_err(|e| classify_error(e.to_string()))?;

    let wrapper_json = completion
        .as_string()
        .map(|s| s.to_std_string_escaped())
        .ok_or_else(|| Fault::Runtime("script result could not be serialized".to_string()))?;

    let wrapper: Value = serde_json::from_str(&wrapper_json)
        .map_err(|e| Fault::Runtime(format!("malformed script result: {}", e)))?;

    let js_type = wrapper
        .get("t")
        .and_then(Value::as_str)
        .unwrap_or("undefined")
        .to_string();
    let value = wrapper.get("v").cloned().unwrap_or(Value::Null);

    Ok(ScriptOutput { value, js_type })
}

/// A runtime reference to a denied capability is a sandbox violation; every
/// other script error is the script's own bug.
fn classify_error(detail: String) -> Fault {
    for capability in DENIED_CAPABILITIES {
        if contains_identifier(&detail, capability) {
            return Fault::Violation(detail);
        }
    }
    Fault::Runtime(detail)
}
