//! [`DomPort`] over a single Chromium tab.
//!
//! Elements are tracked in a page-side registry (`window.__satdecl`) that hands
//! out numeric handles. Handles are seeded from the navigation's time origin so
//! ids from a previous document never alias elements of the current one.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, info, warn};
use url::Url;

use crate::dom::{DomPort, NodeId, NodeInfo, OptionChoice, QueryKind, Scope, SelectBy};
use crate::error::{AdapterError, AdapterErrorKind};
use crate::transport::{CdpTransport, CommandTarget};

const PRELUDE: &str = r#"
if (!window.__satdecl) {
  const reg = {
    base: (Math.floor(performance.timeOrigin) % 1000000000) * 1000000,
    seq: 0,
    byId: new Map(),
    ids: new WeakMap(),
  };
  reg.handle = (el) => {
    let id = reg.ids.get(el);
    if (id === undefined) {
      reg.seq += 1;
      id = reg.base + reg.seq;
      reg.ids.set(el, id);
      reg.byId.set(id, el);
    }
    return id;
  };
  reg.get = (id) => {
    const el = reg.byId.get(id);
    return el && el.isConnected ? el : null;
  };
  reg.root = (scopeId) => {
    if (scopeId === null || scopeId === undefined) { return document; }
    const el = reg.get(scopeId);
    if (!el) { return null; }
    if (el.tagName === 'IFRAME' || el.tagName === 'FRAME') {
      try { return el.contentDocument || null; } catch (err) { return null; }
    }
    return el;
  };
  reg.text = (el) => ((el.innerText !== undefined ? el.innerText : el.textContent) || '')
    .replace(/\s+/g, ' ').trim();
  reg.visible = (el) => {
    if (!el || !el.isConnected) { return false; }
    const view = el.ownerDocument.defaultView || window;
    const style = view.getComputedStyle(el);
    if (style.display === 'none' || style.visibility === 'hidden') { return false; }
    const rect = el.getBoundingClientRect();
    return rect.width > 0 || rect.height > 0 || el.getClientRects().length > 0;
  };
  reg.matches = (hay, needle, exact) => {
    const h = (hay || '').trim().toLowerCase();
    const n = (needle || '').trim().toLowerCase();
    return exact ? h === n : h.includes(n);
  };
  reg.all = (root) => Array.from(root.querySelectorAll('*'));
  reg.findText = (root, needle, exact) => {
    const hits = reg.all(root).filter((el) => reg.matches(reg.text(el), needle, exact));
    return hits.filter((el) => !hits.some((o) => o !== el && el.contains(o)));
  };
  reg.buttons = (root, needle, exact) => Array.from(root.querySelectorAll(
      "button, a, [role='button'], input[type='submit'], input[type='button']"))
    .filter((el) => reg.matches(reg.text(el) || el.value || '', needle, exact));
  reg.describe = (el) => {
    const attrs = {};
    for (const a of Array.from(el.attributes || [])) { attrs[a.name] = a.value; }
    const value = ('value' in el && typeof el.value === 'string') ? el.value : null;
    return {
      id: reg.handle(el),
      tag: el.tagName.toLowerCase(),
      attrs,
      value,
      text: reg.text(el),
      visible: reg.visible(el),
    };
  };
  reg.fire = (el, name) => el.dispatchEvent(new Event(name, { bubbles: true }));
  window.__satdecl = reg;
}
const R = window.__satdecl;
"#;

/// One attached Chromium tab driven through `Runtime.evaluate`.
pub struct CdpPage {
    transport: Arc<dyn CdpTransport>,
    session: String,
    target_id: String,
    poll_interval: Duration,
}

impl CdpPage {
    /// Opens a fresh tab and attaches a flattened session to it.
    pub async fn open(transport: Arc<dyn CdpTransport>) -> Result<Self, AdapterError> {
        transport.start().await?;
        let created = transport
            .send_command(
                CommandTarget::Browser,
                "Target.createTarget",
                json!({ "url": "about:blank" }),
            )
            .await?;
        let target_id = created
            .get("targetId")
            .and_then(Value::as_str)
            .ok_or_else(|| AdapterError::internal("createTarget missing targetId"))?
            .to_string();

        let attached = transport
            .send_command(
                CommandTarget::Browser,
                "Target.attachToTarget",
                json!({ "targetId": target_id, "flatten": true }),
            )
            .await?;
        let session = attached
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| AdapterError::internal("attachToTarget missing sessionId"))?
            .to_string();

        let page = Self {
            transport,
            session,
            target_id,
            poll_interval: Duration::from_millis(100),
        };
        for domain in ["Page.enable", "Runtime.enable", "DOM.enable"] {
            page.command(domain, json!({})).await?;
        }
        info!(target: "cdp-adapter", target = %page.target_id, "page attached");
        Ok(page)
    }

    async fn command(&self, method: &str, params: Value) -> Result<Value, AdapterError> {
        self.transport
            .send_command(CommandTarget::Session(self.session.clone()), method, params)
            .await
    }

    /// Evaluates `body` with the registry in scope as `R` and JSON `args` as `A`.
    async fn call(&self, body: &str, args: Value) -> Result<Value, AdapterError> {
        let expression = format!(
            "(() => {{\n{PRELUDE}\nconst A = {args};\n{body}\n}})()",
            args = args
        );
        let response = self
            .command(
                "Runtime.evaluate",
                json!({
                    "expression": expression,
                    "awaitPromise": true,
                    "returnByValue": true,
                    "userGesture": true,
                }),
            )
            .await?;

        if let Some(details) = response.get("exceptionDetails") {
            return Err(AdapterError::new(AdapterErrorKind::Script)
                .with_hint("page script raised exception")
                .with_data(details.clone()));
        }

        Ok(response
            .get("result")
            .and_then(|res| res.get("value"))
            .cloned()
            .unwrap_or(Value::Null))
    }

    async fn call_on_node(&self, node: NodeId, body: &str, extra: Value) -> Result<Value, AdapterError> {
        let script = format!(
            "const el = R.get(A.node);\nif (!el) {{ return {{ status: 'stale' }}; }}\n{body}"
        );
        let value = self
            .call(&script, json!({ "node": node.0, "extra": extra }))
            .await?;
        if value.get("status").and_then(Value::as_str) == Some("stale") {
            return Err(AdapterError::not_found(format!("node {} is no longer attached", node.0)));
        }
        Ok(value)
    }

    fn node_list(value: Value) -> Result<Vec<NodeId>, AdapterError> {
        let items = value
            .as_array()
            .ok_or_else(|| AdapterError::internal("expected an array of node handles"))?;
        Ok(items.iter().filter_map(Value::as_u64).map(NodeId).collect())
    }

    fn scope_arg(scope: &Scope) -> Value {
        match scope {
            Scope::Page => Value::Null,
            Scope::Within(node) => json!(node.0),
        }
    }

    async fn wait_ready(&self, deadline: Instant) -> Result<(), AdapterError> {
        loop {
            let state = self
                .call("return document.readyState;", Value::Null)
                .await
                .unwrap_or(Value::Null);
            if matches!(state.as_str(), Some("complete") | Some("interactive")) {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(AdapterError::new(AdapterErrorKind::NavTimeout)
                    .with_hint("document did not become ready before deadline")
                    .retriable(true));
            }
            sleep(self.poll_interval).await;
        }
    }

    async fn object_id(&self, node: NodeId) -> Result<String, AdapterError> {
        let expression = format!(
            "(() => {{\n{PRELUDE}\nreturn R.get({});\n}})()",
            node.0
        );
        let response = self
            .command(
                "Runtime.evaluate",
                json!({ "expression": expression, "returnByValue": false }),
            )
            .await?;
        response
            .get("result")
            .and_then(|res| res.get("objectId"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| AdapterError::not_found(format!("node {} has no remote object", node.0)))
    }

    async fn mouse_click(&self, x: f64, y: f64) -> Result<(), AdapterError> {
        for kind in ["mousePressed", "mouseReleased"] {
            self.command(
                "Input.dispatchMouseEvent",
                json!({
                    "type": kind,
                    "x": x,
                    "y": y,
                    "button": "left",
                    "buttons": 1,
                    "clickCount": 1,
                    "pointerType": "mouse",
                }),
            )
            .await?;
        }
        Ok(())
    }
}

#[async_trait]
impl DomPort for CdpPage {
    async fn navigate(&self, url: &str, deadline: Duration) -> Result<(), AdapterError> {
        let parsed = Url::parse(url)
            .map_err(|err| AdapterError::internal(format!("invalid url {url}: {err}")))?;
        let response = self
            .command("Page.navigate", json!({ "url": parsed.as_str() }))
            .await?;
        if let Some(reason) = response.get("errorText").and_then(Value::as_str) {
            return Err(AdapterError::new(AdapterErrorKind::CdpIo)
                .with_hint(format!("navigation to {url} failed: {reason}"))
                .retriable(true));
        }
        debug!(target: "cdp-adapter", url = %parsed, "navigation committed");
        self.wait_ready(Instant::now() + deadline).await
    }

    async fn current_url(&self) -> Result<String, AdapterError> {
        Ok(self
            .call("return window.location.href;", Value::Null)
            .await?
            .as_str()
            .unwrap_or_default()
            .to_string())
    }

    async fn body_text(&self) -> Result<String, AdapterError> {
        Ok(self
            .call(
                "return document.body ? (document.body.innerText || '') : '';",
                Value::Null,
            )
            .await?
            .as_str()
            .unwrap_or_default()
            .to_string())
    }

    async fn last_status(&self) -> Result<Option<u16>, AdapterError> {
        let value = self
            .call(
                "const nav = performance.getEntriesByType('navigation')[0];\n\
                 return nav && nav.responseStatus ? nav.responseStatus : null;",
                Value::Null,
            )
            .await?;
        Ok(value.as_u64().and_then(|s| u16::try_from(s).ok()))
    }

    async fn query(&self, scope: &Scope, selector: &str) -> Result<Vec<NodeId>, AdapterError> {
        let body = "const root = R.root(A.scope);\n\
             if (!root) { return []; }\n\
             let found;\n\
             if (A.kind === 'text') { found = R.findText(root, A.needle, A.exact); }\n\
             else if (A.kind === 'button') { found = R.buttons(root, A.needle, A.exact); }\n\
             else { try { found = Array.from(root.querySelectorAll(A.css)); } catch (err) { return []; } }\n\
             return found.map(R.handle);";
        let args = match QueryKind::parse(selector) {
            QueryKind::Css(css) => json!({ "scope": Self::scope_arg(scope), "kind": "css", "css": css }),
            QueryKind::Text { needle, exact } => json!({
                "scope": Self::scope_arg(scope), "kind": "text", "needle": needle, "exact": exact
            }),
            QueryKind::Button { needle, exact } => json!({
                "scope": Self::scope_arg(scope), "kind": "button", "needle": needle, "exact": exact
            }),
        };
        Self::node_list(self.call(body, args).await?)
    }

    async fn find_text(
        &self,
        scope: &Scope,
        needle: &str,
        exact: bool,
    ) -> Result<Vec<NodeId>, AdapterError> {
        let value = self
            .call(
                "const root = R.root(A.scope);\n\
                 if (!root) { return []; }\n\
                 return R.findText(root, A.needle, A.exact).map(R.handle);",
                json!({ "scope": Self::scope_arg(scope), "needle": needle, "exact": exact }),
            )
            .await?;
        Self::node_list(value)
    }

    async fn describe(&self, node: NodeId) -> Result<NodeInfo, AdapterError> {
        let value = self
            .call_on_node(node, "return R.describe(el);", Value::Null)
            .await?;
        serde_json::from_value::<NodeInfo>(value)
            .map(|mut info| {
                info.id = Some(node);
                info
            })
            .map_err(|err| AdapterError::internal(format!("malformed node description: {err}")))
    }

    async fn parent(&self, node: NodeId) -> Result<Option<NodeId>, AdapterError> {
        let value = self
            .call_on_node(
                node,
                "const p = el.parentElement;\n\
                 return { status: 'ok', id: p ? R.handle(p) : null };",
                Value::Null,
            )
            .await?;
        Ok(value.get("id").and_then(Value::as_u64).map(NodeId))
    }

    async fn closest(&self, node: NodeId, selector: &str) -> Result<Option<NodeId>, AdapterError> {
        let value = self
            .call_on_node(
                node,
                "let hit = null;\n\
                 try { hit = el.parentElement ? el.parentElement.closest(A.extra) : null; } catch (err) { hit = null; }\n\
                 return { status: 'ok', id: hit ? R.handle(hit) : null };",
                json!(selector),
            )
            .await?;
        Ok(value.get("id").and_then(Value::as_u64).map(NodeId))
    }

    async fn following_siblings(&self, node: NodeId) -> Result<Vec<NodeId>, AdapterError> {
        let value = self
            .call_on_node(
                node,
                "const out = [];\n\
                 for (let s = el.nextElementSibling; s; s = s.nextElementSibling) { out.push(R.handle(s)); }\n\
                 return { status: 'ok', ids: out };",
                Value::Null,
            )
            .await?;
        Self::node_list(value.get("ids").cloned().unwrap_or(Value::Null))
    }

    async fn options(&self, node: NodeId) -> Result<Vec<OptionChoice>, AdapterError> {
        let value = self
            .call_on_node(
                node,
                "const opts = Array.from(el.options || []).map((o) => ({\n\
                   value: o.value, label: (o.text || '').trim(), selected: o.selected }));\n\
                 return { status: 'ok', options: opts };",
                Value::Null,
            )
            .await?;
        serde_json::from_value(value.get("options").cloned().unwrap_or(json!([])))
            .map_err(|err| AdapterError::internal(format!("malformed option list: {err}")))
    }

    async fn select(&self, node: NodeId, by: &SelectBy) -> Result<bool, AdapterError> {
        let (mode, target) = match by {
            SelectBy::Value(v) => ("value", v),
            SelectBy::Label(l) => ("label", l),
            SelectBy::LabelContains(l) => ("contains", l),
        };
        let value = self
            .call_on_node(
                node,
                "const [mode, target] = A.extra;\n\
                 const options = Array.from(el.options || []);\n\
                 const norm = (s) => (s || '').trim().toLowerCase();\n\
                 const option = options.find((o) => mode === 'value' ? o.value === target\n\
                   : mode === 'label' ? (o.text || '').trim() === target.trim()\n\
                   : norm(o.text).includes(norm(target)));\n\
                 if (!option) { return { status: 'option-missing' }; }\n\
                 el.value = option.value;\n\
                 R.fire(el, 'input');\n\
                 R.fire(el, 'change');\n\
                 return { status: 'selected' };",
                json!([mode, target]),
            )
            .await?;
        Ok(value.get("status").and_then(Value::as_str) == Some("selected"))
    }

    async fn click(&self, node: NodeId) -> Result<(), AdapterError> {
        let value = self
            .call_on_node(
                node,
                "if (el.tagName === 'OPTION') {\n\
                   const sel = el.closest('select');\n\
                   if (sel) { sel.value = el.value; R.fire(sel, 'input'); R.fire(sel, 'change'); }\n\
                   return { status: 'picked' };\n\
                 }\n\
                 el.scrollIntoView({ block: 'center', inline: 'center' });\n\
                 const rect = el.getBoundingClientRect();\n\
                 const framed = el.ownerDocument !== document;\n\
                 if (framed || rect.width === 0 || rect.height === 0) { el.click(); return { status: 'clicked' }; }\n\
                 return { status: 'point', x: rect.left + rect.width / 2, y: rect.top + rect.height / 2 };",
                Value::Null,
            )
            .await?;
        match value.get("status").and_then(Value::as_str) {
            Some("point") => {
                let x = value.get("x").and_then(Value::as_f64).unwrap_or_default();
                let y = value.get("y").and_then(Value::as_f64).unwrap_or_default();
                self.mouse_click(x, y).await
            }
            Some(_) => Ok(()),
            None => Err(AdapterError::internal("click returned no status")),
        }
    }

    async fn fill(&self, node: NodeId, text: &str) -> Result<(), AdapterError> {
        self.call_on_node(
            node,
            "if (typeof el.focus === 'function') { el.focus(); }\n\
             if ('value' in el) { el.value = ''; R.fire(el, 'input'); }\n\
             return { status: 'cleared' };",
            Value::Null,
        )
        .await?;
        self.command("Input.insertText", json!({ "text": text }))
            .await?;
        let value = self
            .call_on_node(
                node,
                "if ('value' in el && el.value !== A.extra) { el.value = A.extra; R.fire(el, 'input'); }\n\
                 R.fire(el, 'change');\n\
                 if (typeof el.blur === 'function') { el.blur(); }\n\
                 return { status: 'filled' };",
                json!(text),
            )
            .await?;
        if value.get("status").and_then(Value::as_str) != Some("filled") {
            warn!(target: "cdp-adapter", node = node.0, "fill did not confirm");
        }
        Ok(())
    }

    async fn set_files(&self, node: NodeId, files: &[PathBuf]) -> Result<(), AdapterError> {
        let object_id = self.object_id(node).await?;
        let files: Vec<String> = files
            .iter()
            .map(|path| path.to_string_lossy().into_owned())
            .collect();
        let result = self
            .command(
                "DOM.setFileInputFiles",
                json!({ "files": files, "objectId": object_id }),
            )
            .await;
        let _ = self
            .command("Runtime.releaseObject", json!({ "objectId": object_id }))
            .await;
        result.map(|_| ())
    }

    async fn close(&self) -> Result<(), AdapterError> {
        let closed = self
            .transport
            .send_command(
                CommandTarget::Browser,
                "Target.closeTarget",
                json!({ "targetId": self.target_id }),
            )
            .await;
        if let Err(err) = &closed {
            debug!(target: "cdp-adapter", %err, "closeTarget failed; shutting transport down anyway");
        }
        self.transport.shutdown().await;
        info!(target: "cdp-adapter", "browser session released");
        Ok(())
    }
}
