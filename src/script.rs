//! Optional script phase, run after inlining.
//!
//! Inline `<script>` bodies run against a minimal `document` object. Only
//! `document.title` and `document.body.innerHTML` round-trip back into the
//! [`Document`]; there is no DOM API beyond that. `setTimeout` callbacks are
//! queued and fired on a virtual clock after the scripts ran, as long as
//! they fall inside the settle window.

use crate::dom::{Document, NodeId};
use crate::{Error, ResourceError, ResourceType};
use futures::future::BoxFuture;

/// Everything a runner needs; owned so it can move to a blocking thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptJob {
    pub scripts: Vec<String>,
    pub title: String,
    pub body_html: String,
    /// Settle window in milliseconds.
    pub settle_ms: u64,
}

/// What the scripts left behind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScriptOutcome {
    pub title: Option<String>,
    pub body_html: Option<String>,
    /// Messages of every error thrown, in the order they were thrown.
    pub errors: Vec<String>,
}

pub trait ScriptRunner: Send + Sync {
    fn run(&self, job: ScriptJob) -> BoxFuture<'_, ScriptOutcome>;
}

/// Run the document's inline scripts and write back what they changed.
pub async fn execute_scripts(
    doc: &mut Document,
    runner: &dyn ScriptRunner,
    settle_ms: u64,
) -> Vec<ResourceError> {
    let scripts: Vec<String> = doc
        .elements_by_tag_name("script")
        .into_iter()
        .filter(|&id| is_inline_javascript(doc, id))
        .map(|id| doc.text_content(id))
        .collect();
    if scripts.is_empty() {
        return Vec::new();
    }

    let title_node = doc.elements_by_tag_name("title").into_iter().next();
    let title = title_node.map(|id| doc.text_content(id)).unwrap_or_default();
    let body = doc.body();
    let body_html = body.map(|id| doc.inner_html(id)).unwrap_or_default();

    log::debug!("running {} inline scripts", scripts.len());
    let outcome = runner
        .run(ScriptJob {
            scripts,
            title: title.clone(),
            body_html: body_html.clone(),
            settle_ms,
        })
        .await;

    if let (Some(body), Some(html)) = (body, outcome.body_html.as_ref()) {
        if *html != body_html {
            doc.set_inner_html(body, html);
        }
    }
    if let (Some(node), Some(new_title)) = (title_node, outcome.title.as_ref()) {
        if *new_title != title {
            doc.set_text_content(node, new_title);
        }
    }

    outcome
        .errors
        .into_iter()
        .map(|msg| {
            log::warn!("{}", Error::Script(msg.clone()));
            ResourceError::with_msg(ResourceType::ScriptExecution, msg)
        })
        .collect()
}

fn is_inline_javascript(doc: &Document, id: NodeId) -> bool {
    if doc.attr(id, "src").is_some() {
        return false;
    }
    match doc.attr(id, "type").map(|t| t.trim().to_ascii_lowercase()) {
        None => true,
        Some(t) => t.is_empty() || t == "text/javascript" || t == "application/javascript",
    }
}

#[cfg(feature = "script")]
pub use boa::BoaScriptRunner;

#[cfg(feature = "script")]
mod boa {
    use super::{ScriptJob, ScriptOutcome, ScriptRunner};
    use boa_engine::{Context, Source};
    use futures::future::BoxFuture;
    use futures::FutureExt;
    use std::time::Duration;

    const PRELUDE: &str = r#"
var __rasterhtml_now = 0;
var __rasterhtml_timers = [];
function setTimeout(callback, delay) {
    __rasterhtml_timers.push({
        callback: callback,
        at: __rasterhtml_now + (Number(delay) || 0),
        seq: __rasterhtml_timers.length,
        done: false
    });
    return __rasterhtml_timers.length;
}
function clearTimeout(id) {
    var timer = __rasterhtml_timers[id - 1];
    if (timer) { timer.done = true; }
}
function __rasterhtml_fire(limit) {
    var errors = [];
    for (;;) {
        var next = null;
        for (var i = 0; i < __rasterhtml_timers.length; i++) {
            var t = __rasterhtml_timers[i];
            if (t.done || t.at > limit) { continue; }
            if (next === null || t.at < next.at || (t.at === next.at && t.seq < next.seq)) { next = t; }
        }
        if (next === null) { break; }
        next.done = true;
        __rasterhtml_now = next.at;
        try {
            if (typeof next.callback === "function") { next.callback(); } else { (0, eval)(String(next.callback)); }
        } catch (e) {
            errors.push(String(e));
        }
    }
    return JSON.stringify(errors);
}
var window = this;
var console = { log: function () {}, warn: function () {}, error: function () {} };
"#;

    /// Runs scripts in a fresh `boa_engine` context on a blocking thread.
    #[derive(Debug, Clone)]
    pub struct BoaScriptRunner {
        /// Maximum loop iterations before Boa throws (0 => disabled)
        pub loop_iteration_limit: u64,
        /// Maximum recursion depth before Boa throws (usize::MAX => disabled)
        pub recursion_limit: usize,
    }

    impl Default for BoaScriptRunner {
        fn default() -> Self {
            Self {
                loop_iteration_limit: 1_000_000,
                recursion_limit: 1024,
            }
        }
    }

    impl ScriptRunner for BoaScriptRunner {
        fn run(&self, job: ScriptJob) -> BoxFuture<'_, ScriptOutcome> {
            let runner = self.clone();
            async move {
                match tokio::task::spawn_blocking(move || runner.run_blocking(job)).await {
                    Ok(outcome) => outcome,
                    Err(e) => ScriptOutcome {
                        errors: vec![format!("script worker failed: {}", e)],
                        ..Default::default()
                    },
                }
            }
            .boxed()
        }
    }

    impl BoaScriptRunner {
        fn run_blocking(&self, job: ScriptJob) -> ScriptOutcome {
            let mut ctx: Context = Context::default();
            if self.loop_iteration_limit > 0 {
                ctx.runtime_limits_mut()
                    .set_loop_iteration_limit(self.loop_iteration_limit);
            }
            ctx.runtime_limits_mut().set_recursion_limit(self.recursion_limit);

            let mut outcome = ScriptOutcome::default();
            let document = format!(
                "var document = {{ title: {}, body: {{ innerHTML: {} }} }};",
                json_string(&job.title),
                json_string(&job.body_html)
            );
            for setup in [PRELUDE, document.as_str()] {
                if let Err(e) = ctx.eval(Source::from_bytes(setup.as_bytes())) {
                    outcome.errors.push(e.to_string());
                    return outcome;
                }
            }

            for script in &job.scripts {
                if let Err(e) = ctx.eval(Source::from_bytes(script.as_bytes())) {
                    outcome.errors.push(e.to_string());
                }
            }

            if job.settle_ms > 0 {
                std::thread::sleep(Duration::from_millis(job.settle_ms));
            }
            let fire = format!("__rasterhtml_fire({})", job.settle_ms);
            match ctx.eval(Source::from_bytes(fire.as_bytes())) {
                Ok(value) => {
                    let json = value
                        .as_string()
                        .map(|s| s.to_std_string_escaped())
                        .unwrap_or_default();
                    outcome
                        .errors
                        .extend(serde_json::from_str::<Vec<String>>(&json).unwrap_or_default());
                }
                Err(e) => outcome.errors.push(e.to_string()),
            }

            outcome.title = read_string(&mut ctx, "String(document.title)");
            outcome.body_html = read_string(&mut ctx, "String(document.body.innerHTML)");
            outcome
        }
    }

    fn read_string(ctx: &mut Context, expr: &str) -> Option<String> {
        ctx.eval(Source::from_bytes(expr.as_bytes()))
            .ok()
            .and_then(|v| v.as_string().map(|s| s.to_std_string_escaped()))
    }

    fn json_string(value: &str) -> String {
        serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string())
    }

}
