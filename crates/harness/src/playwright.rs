//! Playwright-backed browser driver
//!
//! Drives the Playwright library through a long-lived `node` subprocess.
//! Requests and replies are newline-delimited JSON over the child's
//! stdin/stdout: `{id, method, params}` one way, `{id, result}` or
//! `{id, error: {message, kind}}` back. A broken pipe or EOF on the channel
//! means the browser side is gone and maps to
//! [`DriverError::ConnectionClosed`].

use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tracing::trace;

use crate::driver::{
    BrowserDriver, BrowserHandle, ContextHandle, DriverError, DriverResult, LaunchOptions,
    PageHandle,
};

/// Driver script executed by `node`. Keeps maps of live contexts and pages
/// and answers one JSON request per stdin line.
const DRIVER_JS: &str = r#"'use strict';
const readline = require('readline');
const { chromium, firefox } = require('playwright');

let browser = null;
const contexts = new Map();
const pages = new Map();
let nextHandle = 1;

function classify(err, fallback) {
  const message = err && err.message ? err.message : String(err);
  if (/Connection closed|Target closed|has been closed/i.test(message)) {
    return { message, kind: 'connection_closed' };
  }
  return { message, kind: fallback };
}

async function dispatch(method, params) {
  switch (method) {
    case 'launch': {
      const engine = params.engine === 'firefox' ? firefox : chromium;
      browser = await engine.launch({ headless: params.headless, args: params.args });
      return {};
    }
    case 'newContext': {
      const context = await browser.newContext();
      const contextId = nextHandle++;
      contexts.set(contextId, context);
      return { contextId };
    }
    case 'newPage': {
      const context = contexts.get(params.contextId);
      if (!context) throw new Error(`unknown context ${params.contextId}`);
      const page = await context.newPage();
      const pageId = nextHandle++;
      pages.set(pageId, page);
      return { pageId };
    }
    case 'goto': {
      const page = pages.get(params.pageId);
      if (!page) throw new Error(`unknown page ${params.pageId}`);
      await page.goto(params.url);
      return {};
    }
    case 'content': {
      const page = pages.get(params.pageId);
      if (!page) throw new Error(`unknown page ${params.pageId}`);
      return { content: await page.content() };
    }
    case 'closePage': {
      const page = pages.get(params.pageId);
      pages.delete(params.pageId);
      if (page) await page.close();
      return {};
    }
    case 'closeContext': {
      const context = contexts.get(params.contextId);
      contexts.delete(params.contextId);
      if (context) await context.close();
      return {};
    }
    case 'closeBrowser': {
      const closing = browser;
      browser = null;
      if (closing) await closing.close();
      return {};
    }
    default:
      throw new Error(`unknown method ${method}`);
  }
}

const rl = readline.createInterface({ input: process.stdin });
rl.on('line', (line) => {
  let request;
  try {
    request = JSON.parse(line);
  } catch (e) {
    return;
  }
  const fallback = ['goto', 'content', 'closePage'].includes(request.method)
    ? 'page'
    : 'protocol';
  dispatch(request.method, request.params || {})
    .then((result) => process.stdout.write(JSON.stringify({ id: request.id, result }) + '\n'))
    .catch((err) =>
      process.stdout.write(JSON.stringify({ id: request.id, error: classify(err, fallback) }) + '\n'));
});
rl.on('close', () => process.exit(0));
"#;

pub struct PlaywrightDriver;

impl PlaywrightDriver {
    pub fn new() -> Self {
        Self
    }

    fn check_playwright_installed() -> DriverResult<()> {
        let status = std::process::Command::new("npx")
            .args(["playwright", "--version"])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
        match status {
            Ok(s) if s.success() => Ok(()),
            _ => Err(DriverError::Spawn(
                "playwright not found; install with: npx playwright install".to_string(),
            )),
        }
    }
}

impl Default for PlaywrightDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BrowserDriver for PlaywrightDriver {
    async fn launch(&self, options: &LaunchOptions) -> DriverResult<Box<dyn BrowserHandle>> {
        Self::check_playwright_installed()?;

        let workdir = tempfile::tempdir()?;
        let script_path = workdir.path().join("driver.js");
        std::fs::write(&script_path, DRIVER_JS)?;

        let mut child = Command::new("node")
            .arg(&script_path)
            .current_dir(workdir.path())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| DriverError::Spawn(format!("failed to spawn node: {e}")))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| DriverError::Spawn("driver stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| DriverError::Spawn("driver stdout unavailable".to_string()))?;

        let mut conn = Connection {
            stdin,
            stdout: BufReader::new(stdout),
            next_id: 0,
            _child: child,
            _workdir: workdir,
        };

        conn.call(
            "launch",
            json!({
                "engine": options.engine.as_str(),
                "headless": options.headless,
                "args": options.args,
            }),
        )
        .await
        .map_err(|e| DriverError::Spawn(e.to_string()))?;

        Ok(Box::new(PlaywrightBrowser {
            conn: Arc::new(Mutex::new(conn)),
        }))
    }
}

struct Connection {
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
    next_id: u64,
    _child: Child,
    _workdir: tempfile::TempDir,
}

#[derive(Deserialize)]
struct Reply {
    id: u64,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<ReplyError>,
}

#[derive(Deserialize)]
struct ReplyError {
    message: String,
    #[serde(default)]
    kind: Option<String>,
}

impl Connection {
    async fn call(&mut self, method: &str, params: Value) -> DriverResult<Value> {
        self.next_id += 1;
        let id = self.next_id;
        let request = json!({ "id": id, "method": method, "params": params });
        let line =
            serde_json::to_string(&request).map_err(|e| DriverError::Protocol(e.to_string()))?;
        trace!("driver request: {}", line);

        self.stdin
            .write_all(line.as_bytes())
            .await
            .map_err(closed_on_pipe)?;
        self.stdin.write_all(b"\n").await.map_err(closed_on_pipe)?;
        self.stdin.flush().await.map_err(closed_on_pipe)?;

        loop {
            let mut line = String::new();
            let n = self
                .stdout
                .read_line(&mut line)
                .await
                .map_err(closed_on_pipe)?;
            if n == 0 {
                return Err(DriverError::ConnectionClosed);
            }
            trace!("driver reply: {}", line.trim());

            let reply: Reply = match serde_json::from_str(&line) {
                Ok(reply) => reply,
                // Not ours; the driver side owns stdout but stray output
                // must not wedge the protocol.
                Err(_) => continue,
            };
            if reply.id != id {
                continue;
            }
            if let Some(error) = reply.error {
                return Err(classify(error));
            }
            return Ok(reply.result.unwrap_or(Value::Null));
        }
    }
}

fn closed_on_pipe(e: std::io::Error) -> DriverError {
    match e.kind() {
        std::io::ErrorKind::BrokenPipe | std::io::ErrorKind::UnexpectedEof => {
            DriverError::ConnectionClosed
        }
        _ => DriverError::Io(e),
    }
}

fn classify(error: ReplyError) -> DriverError {
    match error.kind.as_deref() {
        Some("connection_closed") => DriverError::ConnectionClosed,
        Some("page") => DriverError::Page(error.message),
        _ => DriverError::Protocol(error.message),
    }
}

struct PlaywrightBrowser {
    conn: Arc<Mutex<Connection>>,
}

#[async_trait]
impl BrowserHandle for PlaywrightBrowser {
    async fn new_context(&mut self) -> DriverResult<Box<dyn ContextHandle>> {
        let result = self.conn.lock().await.call("newContext", json!({})).await?;
        let context_id = result
            .get("contextId")
            .and_then(Value::as_u64)
            .ok_or_else(|| DriverError::Protocol("newContext reply missing contextId".into()))?;
        Ok(Box::new(PlaywrightContext {
            conn: self.conn.clone(),
            context_id,
        }))
    }

    async fn close(&mut self) -> DriverResult<()> {
        self.conn
            .lock()
            .await
            .call("closeBrowser", json!({}))
            .await
            .map(|_| ())
    }
}

struct PlaywrightContext {
    conn: Arc<Mutex<Connection>>,
    context_id: u64,
}

#[async_trait]
impl ContextHandle for PlaywrightContext {
    async fn new_page(&mut self) -> DriverResult<Box<dyn PageHandle>> {
        let result = self
            .conn
            .lock()
            .await
            .call("newPage", json!({ "contextId": self.context_id }))
            .await?;
        let page_id = result
            .get("pageId")
            .and_then(Value::as_u64)
            .ok_or_else(|| DriverError::Protocol("newPage reply missing pageId".into()))?;
        Ok(Box::new(PlaywrightPage {
            conn: self.conn.clone(),
            page_id,
        }))
    }

    async fn close(&mut self) -> DriverResult<()> {
        self.conn
            .lock()
            .await
            .call("closeContext", json!({ "contextId": self.context_id }))
            .await
            .map(|_| ())
    }
}

struct PlaywrightPage {
    conn: Arc<Mutex<Connection>>,
    page_id: u64,
}

#[async_trait]
impl PageHandle for PlaywrightPage {
    async fn goto(&mut self, url: &str) -> DriverResult<()> {
        self.conn
            .lock()
            .await
            .call("goto", json!({ "pageId": self.page_id, "url": url }))
            .await
            .map(|_| ())
    }

    async fn content(&mut self) -> DriverResult<String> {
        let result = self
            .conn
            .lock()
            .await
            .call("content", json!({ "pageId": self.page_id }))
            .await?;
        result
            .get("content")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| DriverError::Protocol("content reply missing content".into()))
    }

    async fn close(&mut self) -> DriverResult<()> {
        self.conn
            .lock()
            .await
            .call("closePage", json!({ "pageId": self.page_id }))
            .await
            .map(|_| ())
    }
}
