use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use serde::Deserialize;
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWriteExt},
    process::Command,
};

use crate::core::{
    domain::EvaluationLimits,
    traits::sandbox::{CaseOutcome, Sandbox, SandboxError, SandboxRequest, SandboxResponse},
};

const HARNESS: &str = include_str!("harness.js");
const STDERR_EXCERPT_CHARS: usize = 4096;
const STDERR_KEEP_BYTES: u64 = 64 * 1024;

/// Runs every request in a fresh `node` process. The child starts with an
/// empty environment (bar `PATH`), gets a capped heap and is killed as soon
/// as the future driving it is dropped.
#[derive(Clone, Debug)]
pub struct NodeSandbox {
    node_path: PathBuf,
    work_dir: PathBuf,
}

impl NodeSandbox {
    pub fn new<T>(node_path: T) -> Self
    where
        T: AsRef<Path>,
    {
        NodeSandbox {
            node_path: node_path.as_ref().into(),
            work_dir: std::env::temp_dir(),
        }
    }

    fn command(&self, limits: &EvaluationLimits) -> Command {
        let mut command = Command::new(&self.node_path);
        if let Some(memory_bytes) = limits.memory_bytes {
            let megabytes = (memory_bytes / (1024 * 1024)).max(16);
            command.arg(format!("--max-old-space-size={megabytes}"));
        }
        command.arg("-e").arg(HARNESS);

        command.env_clear();
        if let Some(path) = std::env::var_os("PATH") {
            command.env("PATH", path);
        }

        command
            .current_dir(&self.work_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WorkerMessage {
    Results { data: Vec<CaseOutcome> },
    CompileError { message: String },
    Error { message: String },
}

#[async_trait::async_trait]
impl Sandbox for NodeSandbox {
    #[tracing::instrument(skip(request), fields(cases = request.cases.len()))]
    async fn execute(
        &self,
        request: &SandboxRequest,
        limits: &EvaluationLimits,
    ) -> Result<SandboxResponse, SandboxError> {
        let payload = serde_json::to_vec(request).map_err(|e| SandboxError::Protocol {
            msg: e.to_string(),
        })?;

        let mut child = self
            .command(limits)
            .spawn()
            .map_err(|e| SandboxError::Spawn { msg: e.to_string() })?;
        tracing::debug!("Worker started: pid={:?}", child.id());

        if let Some(mut stdin) = child.stdin.take() {
            // A worker that died early shows up in its exit status below.
            match stdin.write_all(&payload).await {
                Err(e) if e.kind() != ErrorKind::BrokenPipe => {
                    return Err(SandboxError::Spawn { msg: e.to_string() });
                }
                _ => {}
            }
        }

        let (stdout, stderr) = match (child.stdout.take(), child.stderr.take()) {
            (Some(stdout), Some(stderr)) => (stdout, stderr),
            _ => {
                return Err(SandboxError::Spawn {
                    msg: "worker pipes unavailable".to_string(),
                });
            }
        };
        // Bailing out early drops the child, which kills it.
        let (stdout, stderr) = tokio::try_join!(
            read_capped(stdout, limits.output_bytes),
            drain_stderr(stderr)
        )?;
        let status = child
            .wait()
            .await
            .map_err(|e| SandboxError::Spawn { msg: e.to_string() })?;
        tracing::debug!(
            "Worker exited: status={:?}, stdout={}B, stderr={}B",
            status,
            stdout.len(),
            stderr.len()
        );

        if !status.success() {
            return Err(SandboxError::Crashed {
                status: status.code(),
                stderr: excerpt(&stderr),
            });
        }

        parse_worker_output(&stdout)
    }
}

/// Reads at most one byte past `limit`, so a chatty worker never gets
/// buffered in full.
async fn read_capped<R>(reader: R, limit: u64) -> Result<Vec<u8>, SandboxError>
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    reader
        .take(limit.saturating_add(1))
        .read_to_end(&mut buf)
        .await
        .map_err(|e| SandboxError::Spawn { msg: e.to_string() })?;

    if buf.len() as u64 > limit {
        return Err(SandboxError::OutputLimitExceeded { limit_bytes: limit });
    }
    Ok(buf)
}

/// Keeps the head of stderr and discards the rest so the worker never
/// blocks on a full pipe.
async fn drain_stderr<R>(mut reader: R) -> Result<Vec<u8>, SandboxError>
where
    R: AsyncRead + Unpin,
{
    let io_error = |e: std::io::Error| SandboxError::Spawn { msg: e.to_string() };
    let mut kept = Vec::new();
    (&mut reader)
        .take(STDERR_KEEP_BYTES)
        .read_to_end(&mut kept)
        .await
        .map_err(io_error)?;
    tokio::io::copy(&mut reader, &mut tokio::io::sink())
        .await
        .map_err(io_error)?;
    Ok(kept)
}

fn parse_worker_output(stdout: &[u8]) -> Result<SandboxResponse, SandboxError> {
    let stdout = String::from_utf8_lossy(stdout);
    let line = stdout
        .lines()
        .rev()
        .find(|line| !line.trim().is_empty())
        .ok_or_else(|| SandboxError::Protocol {
            msg: "worker produced no output".to_string(),
        })?;

    let message: WorkerMessage =
        serde_json::from_str(line).map_err(|e| SandboxError::Protocol { msg: e.to_string() })?;

    match message {
        WorkerMessage::Results { data } => Ok(SandboxResponse::Results { outcomes: data }),
        WorkerMessage::CompileError { message } => Ok(SandboxResponse::CompileError { message }),
        WorkerMessage::Error { message } => Err(SandboxError::Worker { msg: message }),
    }
}

fn excerpt(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let text = text.trim();
    match text.char_indices().nth(STDERR_EXCERPT_CHARS) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::core::{
        decoder::Argument,
        traits::sandbox::{CaseInvocation, ReturnValue},
    };

    fn node_path() -> String {
        std::env::var("GRADER_NODE_PATH").unwrap_or_else(|_| "node".to_string())
    }

    fn node_available() -> bool {
        std::process::Command::new(node_path())
            .arg("--version")
            .output()
            .is_ok_and(|out| out.status.success())
    }

    fn limits() -> EvaluationLimits {
        EvaluationLimits {
            wall_time: Duration::from_secs(10),
            memory_bytes: Some(128 * 1024 * 1024),
            output_bytes: 1024 * 1024,
        }
    }

    fn request(unit: &str, cases: Vec<Vec<Argument>>) -> SandboxRequest {
        SandboxRequest {
            unit: unit.to_string(),
            cases: cases
                .into_iter()
                .map(|args| CaseInvocation { args })
                .collect(),
        }
    }

    #[test]
    fn test_parse_results_message() {
        let stdout = br#"{"type":"results","data":[{"status":"returned","result":{"kind":"json","value":[0,1]}},{"status":"threw","message":"boom"}]}
"#;

        assert_eq!(
            parse_worker_output(stdout),
            Ok(SandboxResponse::Results {
                outcomes: vec![
                    CaseOutcome::Returned {
                        result: ReturnValue::Json {
                            value: json!([0, 1])
                        },
                        first_arg: None,
                    },
                    CaseOutcome::Threw {
                        message: "boom".to_string()
                    },
                ]
            })
        );
    }

    #[test]
    fn test_parse_compile_error_and_worker_error() {
        assert_eq!(
            parse_worker_output(br#"{"type":"compile_error","message":"Unexpected token ')'"}"#),
            Ok(SandboxResponse::CompileError {
                message: "Unexpected token ')'".to_string()
            })
        );
        assert_eq!(
            parse_worker_output(br#"{"type":"error","message":"Malformed request"}"#),
            Err(SandboxError::Worker {
                msg: "Malformed request".to_string()
            })
        );
    }

    #[test]
    fn test_parse_garbage_is_protocol_error() {
        assert!(matches!(
            parse_worker_output(b""),
            Err(SandboxError::Protocol { .. })
        ));
        assert!(matches!(
            parse_worker_output(b"Segmentation fault\n"),
            Err(SandboxError::Protocol { .. })
        ));
    }

    #[test]
    fn test_stderr_excerpt_is_bounded() {
        let long = "x".repeat(STDERR_EXCERPT_CHARS * 2);
        assert_eq!(excerpt(long.as_bytes()).len(), STDERR_EXCERPT_CHARS + 3);
        assert_eq!(excerpt(b"  short \n"), "short");
    }

    #[tokio::test]
    async fn test_read_capped_stops_past_limit() {
        let within = read_capped(&b"0123456789"[..], 10).await;
        let past = read_capped(&b"0123456789x"[..], 10).await;

        assert_eq!(within, Ok(b"0123456789".to_vec()));
        assert_eq!(
            past,
            Err(SandboxError::OutputLimitExceeded { limit_bytes: 10 })
        );
    }

    #[tokio::test]
    async fn test_drain_stderr_keeps_head_only() {
        let noise = vec![b'e'; STDERR_KEEP_BYTES as usize * 3];

        let kept = drain_stderr(&noise[..]).await.unwrap();

        assert_eq!(kept.len() as u64, STDERR_KEEP_BYTES);
    }

    #[tokio::test]
    async fn test_node_not_found() {
        let sandbox = NodeSandbox::new("/nonexistent/node");
        let result = sandbox
            .execute(&request("(function (x) {})", vec![vec![]]), &limits())
            .await;

        assert!(matches!(result, Err(SandboxError::Spawn { .. })));
    }

    #[tokio::test]
    async fn test_execute_returns_outcomes() {
        if !node_available() {
            eprintln!("node not found, skipping");
            return;
        }
        let sandbox = NodeSandbox::new(node_path());
        let unit = "(function () {\nfunction add(a, b) { return a + b; }\n;\nreturn add;\n})()";

        let response = sandbox
            .execute(
                &request(
                    unit,
                    vec![
                        vec![Argument::Value(json!(1)), Argument::Value(json!(2))],
                        vec![Argument::Value(json!("a")), Argument::Undefined],
                    ],
                ),
                &limits(),
            )
            .await
            .unwrap();

        assert_eq!(
            response,
            SandboxResponse::Results {
                outcomes: vec![
                    CaseOutcome::Returned {
                        result: ReturnValue::Json { value: json!(3) },
                        first_arg: None,
                    },
                    CaseOutcome::Returned {
                        result: ReturnValue::Json {
                            value: json!("aundefined")
                        },
                        first_arg: None,
                    },
                ]
            }
        );
    }

    #[tokio::test]
    async fn test_execute_reports_syntax_error() {
        if !node_available() {
            eprintln!("node not found, skipping");
            return;
        }
        let sandbox = NodeSandbox::new(node_path());

        let response = sandbox
            .execute(&request("(function (x) {", vec![vec![]]), &limits())
            .await
            .unwrap();

        assert!(matches!(response, SandboxResponse::CompileError { .. }));
    }

    #[tokio::test]
    async fn test_candidate_cannot_reach_host_process() {
        if !node_available() {
            eprintln!("node not found, skipping");
            return;
        }
        let sandbox = NodeSandbox::new(node_path());
        let unit = "(function (x) {\nreturn [typeof process, typeof require, x.constructor.constructor('return typeof process')()];\n})";

        let response = sandbox
            .execute(
                &request(unit, vec![vec![Argument::Value(json!([1]))]]),
                &limits(),
            )
            .await
            .unwrap();

        let SandboxResponse::Results { outcomes } = response else {
            panic!("Expected results, got {:?}", response);
        };
        assert_eq!(
            outcomes[0],
            CaseOutcome::Returned {
                result: ReturnValue::Json {
                    value: json!(["undefined", "undefined", "undefined"])
                },
                first_arg: Some(ReturnValue::Json { value: json!([1]) }),
            }
        );
    }

    #[tokio::test]
    async fn test_rejected_promise_does_not_crash_worker() {
        if !node_available() {
            eprintln!("node not found, skipping");
            return;
        }
        let sandbox = NodeSandbox::new(node_path());
        let unit = "(async function (x) { throw new Error('bad'); })";

        let response = sandbox
            .execute(
                &request(unit, vec![vec![Argument::Value(json!(1))]]),
                &limits(),
            )
            .await
            .unwrap();

        assert_eq!(
            response,
            SandboxResponse::Results {
                outcomes: vec![CaseOutcome::Returned {
                    result: ReturnValue::Json { value: json!({}) },
                    first_arg: None,
                }]
            }
        );
    }

    #[tokio::test]
    async fn test_output_limit() {
        if !node_available() {
            eprintln!("node not found, skipping");
            return;
        }
        let sandbox = NodeSandbox::new(node_path());
        let limits = EvaluationLimits {
            output_bytes: 64,
            ..limits()
        };

        let result = sandbox
            .execute(
                &request("(function (x) { return 'y'.repeat(1000); })", vec![vec![]]),
                &limits,
            )
            .await;

        assert_eq!(
            result,
            Err(SandboxError::OutputLimitExceeded { limit_bytes: 64 })
        );
    }
}
