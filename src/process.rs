use std::{
    ffi::OsStr,
    process::{ExitStatus, Output, Stdio},
    time::{Duration, Instant},
};
use tokio::process::{Child, Command};

use crate::{error_code::ErrorCode, future::WithTimeout};

struct MetricsGuard {
    start: Instant,
    armed: bool,
    command: String,
}

impl MetricsGuard {
    fn guard(command: String) -> Self {
        metrics::counter!(crate::init_metrics::PROCESS_START, "command" => command.clone())
            .increment(1);

        Self {
            start: Instant::now(),
            armed: true,
            command,
        }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for MetricsGuard {
    fn drop(&mut self) {
        metrics::histogram!(
            crate::init_metrics::PROCESS_DURATION,
            "command" => self.command.clone(),
            "completed" => (!self.armed).to_string(),
        )
        .record(self.start.elapsed().as_secs_f64());

        metrics::counter!(
            crate::init_metrics::PROCESS_END,
            "completed" => (!self.armed).to_string(),
            "command" => self.command.clone(),
        )
        .increment(1);
    }
}

pub(crate) struct Process {
    command: String,
    child: Child,
    guard: MetricsGuard,
    timeout: Duration,
}

impl std::fmt::Debug for Process {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Process")
            .field("command", &self.command)
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum ProcessError {
    #[error("Required command {0} not found, make sure it exists in tubely's $PATH")]
    NotFound(String),

    #[error("Cannot run command {0} due to invalid permissions on binary, make sure the tubely user has permission to run it")]
    PermissionDenied(String),

    #[error("Reached process spawn limit")]
    LimitReached,

    #[error("{0} timed out")]
    Timeout(String),

    #[error("{0} Failed with {1}")]
    Status(String, ExitStatus),

    #[error("Unknown process error")]
    Other(#[source] std::io::Error),
}

impl ProcessError {
    pub(crate) const fn error_code(&self) -> ErrorCode {
        match self {
            Self::NotFound(_) => ErrorCode::COMMAND_NOT_FOUND,
            Self::PermissionDenied(_) => ErrorCode::COMMAND_PERMISSION_DENIED,
            Self::LimitReached | Self::Other(_) => ErrorCode::COMMAND_ERROR,
            Self::Timeout(_) => ErrorCode::COMMAND_TIMEOUT,
            Self::Status(_, _) => ErrorCode::COMMAND_FAILURE,
        }
    }

    pub(crate) const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

impl Process {
    pub(crate) fn run<T>(command: &str, args: &[T], timeout: u64) -> Result<Self, ProcessError>
    where
        T: AsRef<OsStr>,
    {
        let res = tracing::trace_span!(parent: None, "Create command", %command)
            .in_scope(|| Self::spawn(command, Command::new(command).args(args), timeout));

        res.map_err(|e| {
            let error = match e.kind() {
                std::io::ErrorKind::NotFound => ProcessError::NotFound(command.to_string()),
                std::io::ErrorKind::PermissionDenied => {
                    ProcessError::PermissionDenied(command.to_string())
                }
                std::io::ErrorKind::WouldBlock => ProcessError::LimitReached,
                _ => ProcessError::Other(e),
            };

            report(error)
        })
    }

    fn spawn(command: &str, cmd: &mut Command, timeout: u64) -> std::io::Result<Self> {
        tracing::trace_span!(parent: None, "Spawn command", %command).in_scope(|| {
            let guard = MetricsGuard::guard(command.into());

            let cmd = cmd
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true);

            cmd.spawn().map(|child| Process {
                child,
                command: String::from(command),
                guard,
                timeout: Duration::from_secs(timeout),
            })
        })
    }

    /// Wait for the process to exit successfully, discarding its output
    #[tracing::instrument(skip(self), fields(command = %self.command))]
    pub(crate) async fn wait(self) -> Result<(), ProcessError> {
        self.output().await.map(|_| ())
    }

    /// Wait for the process to exit successfully and return everything it wrote to stdout
    #[tracing::instrument(skip(self), fields(command = %self.command))]
    pub(crate) async fn output(self) -> Result<Vec<u8>, ProcessError> {
        let Process {
            command,
            child,
            guard,
            timeout,
        } = self;

        // on timeout the child is dropped, which kills it
        let res = child.wait_with_output().with_timeout(timeout).await;

        match res {
            Ok(Ok(Output { status, stdout, .. })) if status.success() => {
                guard.disarm();

                Ok(stdout)
            }
            Ok(Ok(Output { status, stderr, .. })) => {
                tracing::warn!(
                    "{command} exited with {status}: {}",
                    String::from_utf8_lossy(&stderr).trim()
                );

                Err(report(ProcessError::Status(command, status)))
            }
            Ok(Err(e)) => Err(report(ProcessError::Other(e))),
            Err(_) => Err(report(ProcessError::Timeout(command))),
        }
    }
}

fn report(error: ProcessError) -> ProcessError {
    tracing::debug!(code = error.error_code().as_str(), "{error}");
    error
}

#[cfg(test)]
mod tests {
    use super::{Process, ProcessError};

    #[tokio::test]
    async fn missing_command_is_not_found() {
        let res = Process::run("tubely-definitely-not-a-command", &["--help"], 5);

        assert!(matches!(res, Err(ProcessError::NotFound(_))));
        assert_eq!(
            res.map(|_| ()).unwrap_err().error_code(),
            crate::error_code::ErrorCode::COMMAND_NOT_FOUND
        );
    }

    #[tokio::test]
    async fn captures_stdout() {
        let output = Process::run("echo", &["hello"], 5)
            .expect("Spawned")
            .output()
            .await
            .expect("Completed");

        assert_eq!(String::from_utf8_lossy(&output).trim(), "hello");
    }

    #[tokio::test]
    async fn nonzero_exit_is_status_error() {
        let res = Process::run("false", &[] as &[&str], 5)
            .expect("Spawned")
            .wait()
            .await;

        assert!(matches!(res, Err(ProcessError::Status(_, _))));
    }

    #[tokio::test]
    async fn slow_process_times_out() {
        let res = Process::run("sleep", &["5"], 0)
            .expect("Spawned")
            .wait()
            .await;

        assert!(res.as_ref().is_err_and(ProcessError::is_timeout));
    }
}
