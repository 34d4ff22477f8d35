use std::collections::HashMap;
use std::fs;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use chromiumoxide::async_process::Child;
use chromiumoxide::browser::BrowserConfig;
use chromiumoxide::cdp::browser_protocol::target::SessionId as CdpSessionId;
use chromiumoxide::cdp::events::CdpEventMessage;
use chromiumoxide::conn::Connection;
use chromiumoxide::error::CdpError;
use chromiumoxide_types::{CallId, Message, MethodId, Response};
use futures::io::{AsyncBufReadExt, BufReader};
use futures::StreamExt;
use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, info, trace, warn};

use crate::config::CdpConfig;
use crate::error::{AdapterError, AdapterErrorKind};

/// Where a protocol command is routed: the browser endpoint or an attached
/// page session.
#[derive(Clone, Debug)]
pub enum CommandTarget {
    Browser,
    Session(String),
}

#[async_trait]
pub trait CdpTransport: Send + Sync {
    async fn start(&self) -> Result<(), AdapterError>;
    async fn send_command(
        &self,
        target: CommandTarget,
        method: &str,
        params: Value,
    ) -> Result<Value, AdapterError>;
    /// Drops the connection and terminates any browser process the transport launched.
    async fn shutdown(&self) {}
}

type Inflight = HashMap<CallId, oneshot::Sender<Result<Value, AdapterError>>>;

/// One Chromium connection per declaration attempt.
///
/// The link is opened on first use and never reopened: a lost browser takes
/// the logged-in portal session with it, so commands fail with `CdpIo` and
/// the caller starts a fresh attempt instead.
pub struct ChromiumTransport {
    cfg: CdpConfig,
    link: Mutex<LinkSlot>,
}

enum LinkSlot {
    Idle,
    Open(Arc<BrowserLink>),
    Closed,
}

impl ChromiumTransport {
    pub fn new(cfg: CdpConfig) -> Self {
        Self {
            cfg,
            link: Mutex::new(LinkSlot::Idle),
        }
    }

    fn deadline(&self) -> Duration {
        Duration::from_millis(self.cfg.default_deadline_ms)
    }

    async fn link(&self) -> Result<Arc<BrowserLink>, AdapterError> {
        let mut slot = self.link.lock().await;
        match &*slot {
            LinkSlot::Open(link) if link.is_alive() => return Ok(link.clone()),
            LinkSlot::Open(_) => {
                return Err(AdapterError::new(AdapterErrorKind::CdpIo)
                    .with_hint("browser connection lost")
                    .retriable(true))
            }
            LinkSlot::Closed => {
                return Err(AdapterError::new(AdapterErrorKind::CdpIo)
                    .with_hint("browser session already closed"))
            }
            LinkSlot::Idle => {}
        }
        let link = Arc::new(BrowserLink::open(&self.cfg).await?);
        *slot = LinkSlot::Open(link.clone());
        Ok(link)
    }

    #[cfg(test)]
    fn with_link(cfg: CdpConfig, link: BrowserLink) -> Self {
        Self {
            cfg,
            link: Mutex::new(LinkSlot::Open(Arc::new(link))),
        }
    }
}

#[async_trait]
impl CdpTransport for ChromiumTransport {
    async fn start(&self) -> Result<(), AdapterError> {
        let version = self
            .link()
            .await?
            .send(CommandTarget::Browser, "Browser.getVersion", json!({}), self.deadline())
            .await?;
        debug!(
            target: "cdp-transport",
            product = version.get("product").and_then(serde_json::Value::as_str).unwrap_or("unknown"),
            "browser ready"
        );
        Ok(())
    }

    async fn send_command(
        &self,
        target: CommandTarget,
        method: &str,
        params: Value,
    ) -> Result<Value, AdapterError> {
        self.link()
            .await?
            .send(target, method, params, self.deadline())
            .await
    }

    async fn shutdown(&self) {
        let previous = std::mem::replace(&mut *self.link.lock().await, LinkSlot::Closed);
        if let LinkSlot::Open(link) = previous {
            link.terminate().await;
        }
    }
}

struct PendingCommand {
    target: CommandTarget,
    method: String,
    params: Value,
    reply: oneshot::Sender<Result<Value, AdapterError>>,
}

/// A live websocket connection plus the browser process behind it, if we
/// launched one.
struct BrowserLink {
    commands: mpsc::Sender<PendingCommand>,
    pump: JoinHandle<()>,
    child: Mutex<Option<Child>>,
    alive: Arc<AtomicBool>,
}

impl BrowserLink {
    async fn open(cfg: &CdpConfig) -> Result<Self, AdapterError> {
        let (child, ws_url) = match cfg.websocket_url.clone() {
            Some(url) => (None, url),
            None => {
                let launch = Duration::from_millis(cfg.launch_timeout_ms);
                let (child, url) = launch_browser(browser_config(cfg)?, launch).await?;
                (Some(child), url)
            }
        };

        let conn = Connection::<CdpEventMessage>::connect(&ws_url)
            .await
            .map_err(|err| AdapterError::new(AdapterErrorKind::CdpIo).with_hint(err.to_string()))?;

        let (commands, queue) = mpsc::channel(64);
        let alive = Arc::new(AtomicBool::new(true));
        let pump_alive = alive.clone();
        let pump = tokio::spawn(async move {
            if let Err(err) = pump_messages(conn, queue).await {
                error!(target: "cdp-transport", ?err, "browser connection failed");
            }
            pump_alive.store(false, Ordering::Relaxed);
        });

        info!(target: "cdp-transport", url = %ws_url, "chromium connection established");
        Ok(Self {
            commands,
            pump,
            child: Mutex::new(child),
            alive,
        })
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Relaxed)
    }

    async fn send(
        &self,
        target: CommandTarget,
        method: &str,
        params: Value,
        deadline: Duration,
    ) -> Result<Value, AdapterError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(PendingCommand {
                target,
                method: method.to_string(),
                params,
                reply,
            })
            .await
            .map_err(|_| {
                AdapterError::new(AdapterErrorKind::CdpIo).with_hint("browser connection closed")
            })?;

        match timeout(deadline, response).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(AdapterError::new(AdapterErrorKind::CdpIo)
                .with_hint(format!("{method}: connection dropped before reply"))),
            Err(_) => Err(AdapterError::new(AdapterErrorKind::NavTimeout)
                .with_hint(format!("{method} timed out"))),
        }
    }

    async fn terminate(&self) {
        self.alive.store(false, Ordering::Relaxed);
        self.pump.abort();
        if let Some(mut child) = self.child.lock().await.take() {
            match child.kill().await {
                Ok(_) => info!(target: "cdp-transport", "chromium process terminated"),
                Err(err) => warn!(target: "cdp-transport", ?err, "failed to kill chromium child"),
            }
        }
    }

    #[cfg(test)]
    fn detached(alive: bool) -> Self {
        let (commands, _queue) = mpsc::channel(1);
        Self {
            commands,
            pump: tokio::spawn(futures::future::pending::<()>()),
            child: Mutex::new(None),
            alive: Arc::new(AtomicBool::new(alive)),
        }
    }
}

impl Drop for BrowserLink {
    fn drop(&mut self) {
        self.pump.abort();
        let Ok(mut guard) = self.child.try_lock() else {
            return;
        };
        let Some(mut child) = guard.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(err) = child.kill().await {
                        warn!(target: "cdp-transport", ?err, "failed to kill chromium child");
                    }
                });
            }
            Err(_) => debug!(target: "cdp-transport", "no runtime left to kill chromium child"),
        }
    }
}

/// Moves commands onto the socket and replies back to their callers until
/// the connection ends.
async fn pump_messages(
    mut conn: Connection<CdpEventMessage>,
    mut queue: mpsc::Receiver<PendingCommand>,
) -> Result<(), AdapterError> {
    let mut inflight = Inflight::new();

    loop {
        tokio::select! {
            Some(cmd) = queue.recv() => submit(&mut conn, cmd, &mut inflight),
            message = conn.next() => match message {
                Some(Ok(Message::Response(resp))) => {
                    if let Some(reply) = inflight.remove(&resp.id) {
                        let _ = reply.send(payload(resp));
                    }
                }
                Some(Ok(Message::Event(_))) => {
                    // Page state is polled; protocol events are not consumed.
                    trace!(target: "cdp-transport", "event discarded");
                }
                Some(Err(err)) => {
                    let err = classify(err);
                    fail_all(&mut inflight, &err);
                    return Err(err);
                }
                None => {
                    let err = AdapterError::new(AdapterErrorKind::CdpIo)
                        .with_hint("cdp connection closed");
                    fail_all(&mut inflight, &err);
                    return Ok(());
                }
            },
        }
    }
}

fn submit(conn: &mut Connection<CdpEventMessage>, cmd: PendingCommand, inflight: &mut Inflight) {
    let session = match cmd.target {
        CommandTarget::Browser => None,
        CommandTarget::Session(id) => Some(CdpSessionId::from(id)),
    };
    let method: MethodId = cmd.method.into();
    match conn.submit_command(method, session, cmd.params) {
        Ok(call_id) => {
            inflight.insert(call_id, cmd.reply);
        }
        Err(err) => {
            let _ = cmd
                .reply
                .send(Err(AdapterError::new(AdapterErrorKind::CdpIo).with_hint(err.to_string())));
        }
    }
}

fn fail_all(inflight: &mut Inflight, err: &AdapterError) {
    for (_, reply) in inflight.drain() {
        let _ = reply.send(Err(err.clone()));
    }
}

fn payload(resp: Response) -> Result<Value, AdapterError> {
    match (resp.result, resp.error) {
        (Some(result), _) => Ok(result),
        (None, Some(error)) => Err(AdapterError::new(AdapterErrorKind::CdpIo)
            .with_hint(format!("cdp error {}: {}", error.code, error.message))
            .retriable(error.code >= 500)),
        (None, None) => Err(AdapterError::internal("empty cdp response")),
    }
}

fn classify(err: CdpError) -> AdapterError {
    let hint = err.to_string();
    match err {
        CdpError::Timeout => AdapterError::new(AdapterErrorKind::NavTimeout)
            .with_hint(hint)
            .retriable(true),
        CdpError::JavascriptException(_) => {
            AdapterError::new(AdapterErrorKind::Script).with_hint(hint)
        }
        CdpError::FrameNotFound(_) | CdpError::Serde(_) => {
            AdapterError::new(AdapterErrorKind::Internal).with_hint(hint)
        }
        _ => AdapterError::new(AdapterErrorKind::CdpIo)
            .with_hint(hint)
            .retriable(true),
    }
}

fn browser_config(cfg: &CdpConfig) -> Result<BrowserConfig, AdapterError> {
    if !cfg.executable.as_os_str().is_empty() && !cfg.executable.exists() {
        return Err(AdapterError::new(AdapterErrorKind::Launch)
            .with_hint(format!(
                "chrome executable not found at {}",
                cfg.executable.display()
            ))
            .with_data(json!({
                "expected": cfg.executable,
                "hint": "Set SAT_CHROME or chrome_path to the full path of chrome/chromium."
            })));
    }

    let profile_dir = if cfg.user_data_dir.is_absolute() {
        cfg.user_data_dir.clone()
    } else {
        std::env::current_dir()
            .map_err(|err| AdapterError::internal(format!("cannot resolve profile dir: {err}")))?
            .join(&cfg.user_data_dir)
    };
    fs::create_dir_all(&profile_dir)
        .map_err(|err| AdapterError::internal(format!("cannot create profile dir: {err}")))?;

    let mut builder = BrowserConfig::builder()
        .request_timeout(Duration::from_millis(cfg.default_deadline_ms))
        .launch_timeout(Duration::from_millis(cfg.launch_timeout_ms));
    if !cfg.headless {
        builder = builder.with_head();
    }
    if std::env::var("SAT_DISABLE_SANDBOX")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
    {
        builder = builder.no_sandbox();
    }

    let mut args = vec![
        "--disable-background-networking",
        "--disable-breakpad",
        "--disable-component-update",
        "--disable-default-apps",
        "--disable-dev-shm-usage",
        "--disable-extensions",
        "--disable-sync",
        "--no-first-run",
        "--no-default-browser-check",
        "--password-store=basic",
        "--remote-allow-origins=*",
    ];
    if cfg.headless {
        args.push("--headless=new");
    }
    builder = builder.args(args);

    if !cfg.executable.as_os_str().is_empty() {
        builder = builder.chrome_executable(cfg.executable.clone());
    }

    builder.user_data_dir(profile_dir).build().map_err(|err| {
        AdapterError::new(AdapterErrorKind::Launch).with_hint(format!("browser config error: {err}"))
    })
}

async fn launch_browser(
    config: BrowserConfig,
    wait: Duration,
) -> Result<(Child, String), AdapterError> {
    let mut child = config.launch().map_err(|err| {
        AdapterError::new(AdapterErrorKind::Launch)
            .with_hint(format!("failed to launch chromium: {err}"))
    })?;

    let ws_url = read_devtools_url(&mut child, wait)
        .await
        .map_err(|err| AdapterError::new(AdapterErrorKind::Launch).with_hint(err.to_string()))?;
    Ok((child, ws_url))
}

/// Reads the DevTools websocket URL Chromium prints on stderr at startup.
async fn read_devtools_url(child: &mut Child, wait: Duration) -> anyhow::Result<String> {
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("chromium process missing stderr handle"))?;
    let mut lines = BufReader::new(stderr).lines();
    let mut captured = Vec::new();

    let reader = async {
        while let Some(line) = lines.next().await {
            let line = line?;
            if let Some(ws) = devtools_url_from_line(&line) {
                return Ok(ws);
            }
            captured.push(line);
        }
        Err(anyhow!(
            "chromium exited before exposing devtools websocket url. stderr preview: {}",
            captured.iter().take(8).cloned().collect::<Vec<_>>().join(" | ")
        ))
    };

    timeout(wait, reader)
        .await
        .map_err(|_| anyhow!("timed out waiting for chromium devtools websocket url"))?
}

fn devtools_url_from_line(line: &str) -> Option<String> {
    let (_, ws) = line.rsplit_once("listening on ")?;
    let ws = ws.trim();
    (ws.starts_with("ws") && ws.contains("devtools/browser")).then(|| ws.to_string())
}
