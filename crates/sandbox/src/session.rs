//! Interactive exec session over a raw container byte stream.
//!
//! Docker exec channels expose an unframed duplex stream, so command
//! completion is detected with a sentinel protocol: every command is
//! wrapped so its exit code is echoed afterwards, and the shell's fixed
//! prompt marker acts as the completion sentinel. The session is
//! strictly request/response; at most one command may be in flight.

use std::pin::Pin;
use std::time::Duration;

use bollard::container::LogOutput;
use bollard::exec::{CreateExecOptions, StartExecResults};
use bollard::Docker;
use futures::{Stream, StreamExt};
use tokio::io::{AsyncWrite, AsyncWriteExt};

use isobox_core::{Error, Result};

use crate::container::exec_capture;

/// Prompt marker configured for the session shell; doubles as the
/// command-completion sentinel.
const PROMPT: &str = "$ ";

/// Commands rejected outright before they reach the container, matched
/// as substrings of the lower-cased command.
const DENYLIST: &[&str] = &[
    "rm -rf /",
    "rm -rf /*",
    "mkfs",
    "dd if=/dev/zero",
    ":(){:|:&};:",
    "chmod -r 777 /",
    "chown -r",
];

type OutputStream =
    Pin<Box<dyn Stream<Item = std::result::Result<LogOutput, bollard::errors::Error>> + Send>>;
type InputSink = Pin<Box<dyn AsyncWrite + Send>>;

/// One exec instance bound to a duplex byte stream inside a container.
///
/// State machine: unattached → attached idle → attached busy → closed.
/// A timeout while busy poisons the session; it refuses further commands
/// until re-attached.
pub struct DockerSession {
    docker: Docker,
    exec_id: String,
    output: OutputStream,
    input: InputSink,
    timed_out: bool,
}

impl DockerSession {
    /// Start an exec instance running a minimal non-interactive shell
    /// with a fixed prompt, then drain startup output until the prompt
    /// appears so the first command's output starts from a known
    /// baseline.
    pub async fn attach(
        docker: &Docker,
        container_id: &str,
        working_dir: &str,
        env: &[(String, String)],
    ) -> Result<Self> {
        // --norc/--noprofile keep shell startup files from injecting
        // unpredictable banner output into the stream.
        let startup = format!(
            "cd {} && PROMPT_COMMAND='' PS1='{}' exec bash --norc --noprofile",
            working_dir, PROMPT
        );

        let mut env_vars: Vec<String> =
            env.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
        env_vars.push("TERM=dumb".to_string());
        env_vars.push(format!("PS1={}", PROMPT));
        env_vars.push("PROMPT_COMMAND=".to_string());

        let exec = docker
            .create_exec(
                container_id,
                CreateExecOptions {
                    cmd: Some(vec!["bash".to_string(), "-c".to_string(), startup]),
                    attach_stdin: Some(true),
                    attach_stdout: Some(true),
                    attach_stderr: Some(true),
                    tty: Some(true),
                    privileged: Some(true),
                    user: Some("root".to_string()),
                    env: Some(env_vars),
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| Error::creation(format!("Failed to create exec session: {}", e)))?;

        let (output, input) = match docker
            .start_exec(&exec.id, None)
            .await
            .map_err(|e| Error::creation(format!("Failed to start exec session: {}", e)))?
        {
            StartExecResults::Attached { output, input } => (output, input),
            StartExecResults::Detached => {
                return Err(Error::creation(
                    "Exec session started detached; no stream available",
                ))
            }
        };

        let mut session = Self {
            docker: docker.clone(),
            exec_id: exec.id,
            output,
            input,
            timed_out: false,
        };
        session.handshake().await?;
        Ok(session)
    }

    /// Read and discard shell startup noise until the prompt marker is
    /// observed.
    async fn handshake(&mut self) -> Result<()> {
        let mut buffer: Vec<u8> = Vec::new();
        loop {
            match self.output.next().await {
                Some(Ok(chunk)) => {
                    buffer.extend_from_slice(&chunk.into_bytes());
                    if contains_prompt(&buffer) {
                        tracing::debug!("Session handshake complete");
                        return Ok(());
                    }
                }
                Some(Err(e)) => {
                    return Err(Error::creation(format!(
                        "Exec stream error during handshake: {}",
                        e
                    )))
                }
                None => {
                    return Err(Error::creation(
                        "Exec stream closed before the shell prompt appeared",
                    ))
                }
            }
        }
    }

    /// Run one command and return its output with the protocol framing
    /// stripped.
    ///
    /// The read loop is bounded by `timeout` when supplied; on expiry
    /// the stream is left mid-response, so the session marks itself
    /// poisoned and refuses further commands until re-attached.
    pub async fn execute(&mut self, command: &str, timeout: Option<Duration>) -> Result<String> {
        if self.timed_out {
            return Err(Error::io(
                "Session poisoned by a previous timeout; restart it before reuse",
            ));
        }

        let sanitized = sanitize_command(command)?;
        let full_command = format!("bash -c '{}' && echo $?\n", sanitized);
        self.input
            .write_all(full_command.as_bytes())
            .await
            .map_err(|e| Error::io(format!("Failed to send command: {}", e)))?;
        self.input
            .flush()
            .await
            .map_err(|e| Error::io(format!("Failed to flush command: {}", e)))?;
        tracing::debug!(command = %command, "Command sent to session");

        match timeout {
            Some(limit) => {
                match tokio::time::timeout(limit, read_response(&mut self.output)).await {
                    Ok(result) => result,
                    Err(_) => {
                        self.timed_out = true;
                        tracing::warn!(command = %command, "Command execution timed out");
                        Err(Error::timeout(format!(
                            "Command execution timed out after {} seconds",
                            limit.as_secs()
                        )))
                    }
                }
            }
            None => read_response(&mut self.output).await,
        }
    }

    /// Best-effort teardown: send an exit directive, allow a brief grace
    /// period, shut the write half down, and release the exec handle.
    /// Every sub-step swallows its own error so cleanup always completes.
    pub async fn close(&mut self) {
        if self.input.write_all(b"exit\n").await.is_ok() {
            let _ = self.input.flush().await;
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        if let Err(e) = self.input.shutdown().await {
            tracing::debug!("Exec stream shutdown failed: {}", e);
        }
        match self.docker.inspect_exec(&self.exec_id).await {
            Ok(inspect) if inspect.running.unwrap_or(false) => {
                // Give the shell a moment to exit before the handle is dropped.
                tokio::time::sleep(Duration::from_millis(500)).await;
            }
            Ok(_) => {}
            Err(e) => tracing::debug!("Exec inspect during close failed: {}", e),
        }
    }
}

/// Read stream chunks until the collector reports the completion
/// sentinel. A stream that ends without the trailing prompt is an
/// unexpected disconnection, not completion.
async fn read_response(output: &mut OutputStream) -> Result<String> {
    let mut collector = OutputCollector::new();
    loop {
        match output.next().await {
            Some(Ok(chunk)) => {
                if collector.push(&chunk.into_bytes()) {
                    return Ok(collector.finish());
                }
            }
            Some(Err(e)) => return Err(Error::io(format!("Exec stream error: {}", e))),
            None => {
                if collector.at_prompt() {
                    return Ok(collector.finish());
                }
                return Err(Error::io("Exec stream closed unexpectedly"));
            }
        }
    }
}

/// Reject denylisted commands and escape embedded single quotes so the
/// command survives the single-quoted `bash -c` wrapper.
fn sanitize_command(command: &str) -> Result<String> {
    let lowered = command.to_lowercase();
    for risky in DENYLIST {
        if lowered.contains(risky) {
            return Err(Error::command_rejected(format!(
                "Command contains potentially dangerous operation: {}",
                risky
            )));
        }
    }
    Ok(command.replace('\'', "'\\''"))
}

fn contains_prompt(buffer: &[u8]) -> bool {
    buffer
        .windows(PROMPT.len())
        .any(|window| window == PROMPT.as_bytes())
}

/// Accumulates raw stream chunks, splits them into complete lines, and
/// strips the protocol framing: the echoed command line, the exit
/// status probe, and bare exit-code digits.
struct OutputCollector {
    buffer: Vec<u8>,
    lines: Vec<String>,
    echo_skipped: bool,
}

impl OutputCollector {
    fn new() -> Self {
        Self {
            buffer: Vec::new(),
            lines: Vec::new(),
            echo_skipped: false,
        }
    }

    /// Feed one chunk; returns true once the trailing buffer ends with
    /// the prompt marker, i.e. the command has completed.
    fn push(&mut self, chunk: &[u8]) -> bool {
        self.buffer.extend_from_slice(chunk);
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw);
            self.take_line(line.trim_end_matches(['\n', '\r']));
        }
        self.at_prompt()
    }

    fn take_line(&mut self, line: &str) {
        // The first complete line is the tty echo of the command itself.
        if !self.echo_skipped {
            self.echo_skipped = true;
            return;
        }
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed == "echo $?" {
            return;
        }
        if trimmed.chars().all(|c| c.is_ascii_digit()) {
            return;
        }
        self.lines.push(line.to_string());
    }

    fn at_prompt(&self) -> bool {
        self.buffer.ends_with(PROMPT.as_bytes())
    }

    fn finish(self) -> String {
        self.lines.join("\n").trim().to_string()
    }
}

/// Long-lived terminal bound to one container.
///
/// Ensures the working directory exists, owns the session, applies the
/// default timeout, and can restart the session after a timeout has
/// poisoned it.
pub struct Terminal {
    docker: Docker,
    container_id: String,
    working_dir: String,
    env: Vec<(String, String)>,
    default_timeout: Duration,
    session: Option<DockerSession>,
}

impl Terminal {
    /// Prepare the working directory and attach an interactive session.
    pub async fn attach(
        docker: Docker,
        container_id: impl Into<String>,
        working_dir: impl Into<String>,
        env: Vec<(String, String)>,
        default_timeout: Duration,
    ) -> Result<Self> {
        let container_id = container_id.into();
        let working_dir = working_dir.into();

        // The session shell cds into the working directory, which must
        // exist before the handshake.
        let (exit_code, output) = exec_capture(
            &docker,
            &container_id,
            &format!("mkdir -p {}", working_dir),
        )
        .await?;
        if exit_code != 0 {
            return Err(Error::creation(format!(
                "Failed to create working directory: {}",
                output
            )));
        }

        let session = DockerSession::attach(&docker, &container_id, &working_dir, &env).await?;
        Ok(Self {
            docker,
            container_id,
            working_dir,
            env,
            default_timeout,
            session: Some(session),
        })
    }

    /// Run a command, falling back to the default timeout when none is
    /// supplied.
    pub async fn run_command(&mut self, command: &str, timeout: Option<Duration>) -> Result<String> {
        let session = self.session.as_mut().ok_or(Error::NotInitialized)?;
        session
            .execute(command, Some(timeout.unwrap_or(self.default_timeout)))
            .await
    }

    /// Tear down the current session and attach a fresh one. Required
    /// after a command timeout leaves the stream mid-response.
    pub async fn restart(&mut self) -> Result<()> {
        if let Some(mut session) = self.session.take() {
            session.close().await;
        }
        let session =
            DockerSession::attach(&self.docker, &self.container_id, &self.working_dir, &self.env)
                .await?;
        self.session = Some(session);
        Ok(())
    }

    /// Close the session. Best-effort; never errors.
    pub async fn close(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.close().await;
        }
    }
}
