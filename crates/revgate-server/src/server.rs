//! The stdio serve loop.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use revgate_bridge::{Bridge, SpeechWatcher};
use revgate_core::config::BridgeSettings;
use revgate_core::fail_open::fail_open;
use revgate_core::Result;

use crate::rpc::{self, RpcRequest};
use crate::tools::{registry, ReviewTool, ToolContext};

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(10);

/// Counters reported by the heartbeat.
#[derive(Debug, Default)]
struct ServerStats {
    requests: AtomicU64,
    tool_calls: AtomicU64,
}

/// Serves the tool protocol over stdin/stdout and owns the background
/// speech watcher and heartbeat tasks.
pub struct Server {
    bridge: Bridge,
    settings: BridgeSettings,
    tools: Vec<Box<dyn ReviewTool>>,
    cancel: CancellationToken,
    stats: Arc<ServerStats>,
    started: Instant,
}

impl Server {
    pub fn new(settings: BridgeSettings) -> Self {
        Self {
            bridge: Bridge::new(settings.clone()),
            settings,
            tools: registry(),
            cancel: CancellationToken::new(),
            stats: Arc::new(ServerStats::default()),
            started: Instant::now(),
        }
    }

    /// Cancelling this token stops the serve loop and every background
    /// task.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Runs until stdin closes, the token is cancelled, or a confirmed
    /// shutdown request arrives.
    pub async fn run(self) -> Result<()> {
        info!(
            "server starting (records in {})",
            self.bridge.paths().dir().display()
        );

        let speech_task = tokio::spawn(
            SpeechWatcher::new(&self.settings).run(self.cancel.child_token()),
        );
        let heartbeat_task = tokio::spawn(heartbeat(
            self.cancel.child_token(),
            self.stats.clone(),
            self.started,
        ));

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut stdout = tokio::io::stdout();
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                line = lines.next_line() => {
                    match line {
                        Ok(Some(line)) => {
                            if line.trim().is_empty() {
                                continue;
                            }
                            if let Some(response) = self.handle_line(&line).await {
                                let mut frame = response.to_string();
                                frame.push('\n');
                                stdout.write_all(frame.as_bytes()).await?;
                                stdout.flush().await?;
                            }
                            // A confirmed shutdown cancels mid-dispatch;
                            // its reply frame is already flushed.
                            if self.cancel.is_cancelled() {
                                break;
                            }
                        }
                        Ok(None) => {
                            info!("stdin closed, stopping");
                            break;
                        }
                        Err(e) => {
                            error!("stdin read error: {}", e);
                            break;
                        }
                    }
                }
            }
        }

        self.cancel.cancel();
        self.cleanup_trigger_files().await;
        let _ = heartbeat_task.await;
        let _ = speech_task.await;
        info!(
            "server stopped after {} requests ({} tool calls)",
            self.stats.requests.load(Ordering::Relaxed),
            self.stats.tool_calls.load(Ordering::Relaxed)
        );
        Ok(())
    }

    /// Parses and dispatches one protocol line. `None` means no frame
    /// goes back, which is the case for notifications.
    pub async fn handle_line(&self, line: &str) -> Option<Value> {
        let request: RpcRequest = match serde_json::from_str(line) {
            Ok(request) => request,
            Err(e) => {
                warn!("unparseable request line: {}", e);
                return Some(rpc::error_response(None, rpc::PARSE_ERROR, "Parse error"));
            }
        };
        self.handle_request(request).await
    }

    async fn handle_request(&self, request: RpcRequest) -> Option<Value> {
        self.stats.requests.fetch_add(1, Ordering::Relaxed);
        debug!("request: method={}", request.method);
        match request.method.as_str() {
            "initialize" => Some(rpc::result_response(
                request.id,
                json!({
                    "protocolVersion": rpc::PROTOCOL_VERSION,
                    "capabilities": { "tools": {} },
                    "serverInfo": {
                        "name": rpc::SERVER_NAME,
                        "version": env!("CARGO_PKG_VERSION"),
                    },
                }),
            )),
            "notifications/initialized" => {
                debug!("client completed initialization");
                None
            }
            "tools/list" => {
                let tools: Vec<Value> = self.tools.iter().map(|tool| tool.describe()).collect();
                Some(rpc::result_response(request.id, json!({ "tools": tools })))
            }
            "tools/call" => Some(self.handle_tool_call(request).await),
            other => {
                warn!("unknown method {}", other);
                Some(rpc::error_response(
                    request.id,
                    rpc::METHOD_NOT_FOUND,
                    &format!("Method not found: {}", other),
                ))
            }
        }
    }

    async fn handle_tool_call(&self, request: RpcRequest) -> Value {
        self.stats.tool_calls.fetch_add(1, Ordering::Relaxed);
        let name = request
            .params
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or("");
        let default_args = json!({});
        let args = request.params.get("arguments").unwrap_or(&default_args);

        let Some(tool) = self.tools.iter().find(|tool| tool.name() == name) else {
            warn!("call for unknown tool {:?}", name);
            return rpc::result_response(
                request.id,
                rpc::text_result(&format!("Unknown tool: {}", name), true),
            );
        };

        info!("tool call: {}", name);
        let cx = ToolContext {
            bridge: &self.bridge,
            shutdown: &self.cancel,
        };
        let reply = tool.call(&cx, args).await;
        rpc::result_response(request.id, rpc::text_result(&reply.text, reply.is_error))
    }

    /// Sweeps trigger files left by requests that were in flight when
    /// the server stopped, so the editor does not reopen a popup for a
    /// dead process.
    async fn cleanup_trigger_files(&self) {
        let paths = self.bridge.paths();
        let mut targets = vec![paths.trigger()];
        for index in 0..self.settings.backup_trigger_count {
            targets.push(paths.backup_trigger(index));
        }
        for path in targets {
            if path.exists() {
                fail_open("remove stale trigger", || async {
                    tokio::fs::remove_file(&path).await?;
                    Ok(())
                })
                .await;
            }
        }
    }
}

async fn heartbeat(cancel: CancellationToken, stats: Arc<ServerStats>, started: Instant) {
    let mut ticker = tokio::time::interval(HEARTBEAT_INTERVAL);
    // The first tick fires immediately; skip it so beats land on the
    // interval boundary.
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                info!(
                    "heartbeat: alive {}s, {} requests, {} tool calls",
                    started.elapsed().as_secs(),
                    stats.requests.load(Ordering::Relaxed),
                    stats.tool_calls.load(Ordering::Relaxed)
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::Mutex;

    /// Collects formatted log lines so tests can assert on them.
    #[derive(Clone, Default)]
    struct CaptureWriter(Arc<Mutex<Vec<u8>>>);

    impl CaptureWriter {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    impl io::Write for CaptureWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for CaptureWriter {
        type Writer = CaptureWriter;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    // The serve loop's default filter is `info`, so liveness must be
    // emitted at that level or the log file stays silent.
    #[tokio::test(start_paused = true)]
    async fn heartbeat_is_visible_at_info_level() {
        let output = CaptureWriter::default();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .with_writer(output.clone())
            .with_ansi(false)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let cancel = CancellationToken::new();
        let task = tokio::spawn(heartbeat(
            cancel.clone(),
            Arc::new(ServerStats::default()),
            Instant::now(),
        ));
        tokio::time::sleep(HEARTBEAT_INTERVAL * 2 + Duration::from_millis(100)).await;
        cancel.cancel();
        task.await.unwrap();

        let logged = output.contents();
        assert!(
            logged.contains("heartbeat: alive"),
            "no heartbeat line at info level: {logged:?}"
        );
    }
}
