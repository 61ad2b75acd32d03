use std::io;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::error::JobError;
use crate::jobs::status::JobOutput;

const READ_CHUNK: usize = 8 * 1024;
const KILL_QUEUE: usize = 8;

type KillRequest = oneshot::Sender<io::Result<()>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Append-only byte buffer shared between an output pump and readers.
#[derive(Debug, Default)]
pub struct OutputBuffer {
    buf: Mutex<Vec<u8>>,
}

impl OutputBuffer {
    pub fn append(&self, data: &[u8]) {
        lock(&self.buf).extend_from_slice(data);
    }

    /// Copy of everything captured so far, decoded lossily as UTF-8.
    pub fn snapshot(&self) -> String {
        String::from_utf8_lossy(&lock(&self.buf)).into_owned()
    }
}

/// State that exists only once the OS process has been created.
struct Spawned {
    child: Child,
    kill_rx: mpsc::Receiver<KillRequest>,
    pumps: Vec<JoinHandle<()>>,
}

/// A program invocation and, once spawned, the OS process running it.
///
/// The `Child` is owned by whoever calls [`ProcessHandle::wait`]; kill
/// requests are forwarded to that owner over a channel so the process is
/// only ever signalled before it has been reaped.
pub struct ProcessHandle {
    program: PathBuf,
    args: Vec<String>,
    stdout: Arc<OutputBuffer>,
    stderr: Arc<OutputBuffer>,
    kill_tx: Mutex<Option<mpsc::Sender<KillRequest>>>,
    spawned: Mutex<Option<Spawned>>,
}

impl ProcessHandle {
    /// Binds a handle to a program and its arguments. Nothing is spawned yet;
    /// a missing program is reported by [`ProcessHandle::spawn`].
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            stdout: Arc::new(OutputBuffer::default()),
            stderr: Arc::new(OutputBuffer::default()),
            kill_tx: Mutex::new(None),
            spawned: Mutex::new(None),
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Creates the OS process with stdout and stderr pumped into the
    /// capture buffers. Returns the process id.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(&self) -> io::Result<u32> {
        let mut kill_slot = lock(&self.kill_tx);
        if kill_slot.is_some() {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                "process already spawned",
            ));
        }

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let pid = child.id().unwrap_or_default();

        let mut pumps = Vec::with_capacity(2);
        if let Some(out) = child.stdout.take() {
            pumps.push(pump(out, self.stdout.clone()));
        }
        if let Some(err) = child.stderr.take() {
            pumps.push(pump(err, self.stderr.clone()));
        }

        let (kill_tx, kill_rx) = mpsc::channel(KILL_QUEUE);
        *lock(&self.spawned) = Some(Spawned {
            child,
            kill_rx,
            pumps,
        });
        *kill_slot = Some(kill_tx);

        Ok(pid)
    }

    /// Blocks until the process exits and returns its raw exit status.
    ///
    /// Kill requests arriving while waiting are applied to the child. Once
    /// the process has exited, the output pumps get up to `drain_timeout` to
    /// reach end-of-file; anything still unread after that is discarded so
    /// the buffers are frozen when this returns.
    pub async fn wait(&self, drain_timeout: Duration) -> io::Result<ExitStatus> {
        let Spawned {
            mut child,
            mut kill_rx,
            pumps,
        } = lock(&self.spawned)
            .take()
            .ok_or_else(|| io::Error::other("process has not been spawned"))?;

        let status = loop {
            tokio::select! {
                status = child.wait() => break status,
                Some(reply) = kill_rx.recv() => {
                    let _ = reply.send(child.start_kill());
                }
            }
        };
        // Dropping the receiver tells later kill requests that the process is gone.
        drop(kill_rx);

        self.drain(pumps, drain_timeout).await;
        status
    }

    async fn drain(&self, pumps: Vec<JoinHandle<()>>, drain_timeout: Duration) {
        let deadline = tokio::time::Instant::now() + drain_timeout;
        for mut pump in pumps {
            if tokio::time::timeout_at(deadline, &mut pump).await.is_err() {
                tracing::warn!(
                    program = %self.program.display(),
                    "Output pipe still open after process exit, discarding remainder"
                );
                pump.abort();
                // An abort only lands at the next await point; wait for it so
                // no chunk is appended after this returns.
                let _ = pump.await;
            }
        }
    }

    /// Sends SIGKILL to the process.
    ///
    /// Fails with [`JobError::ProcessNotStarted`] if the process has not been
    /// spawned yet. A process that has already exited is not an error.
    pub async fn kill(&self) -> Result<(), JobError> {
        let kill_tx = lock(&self.kill_tx)
            .clone()
            .ok_or(JobError::ProcessNotStarted)?;

        let (reply_tx, reply_rx) = oneshot::channel();
        if kill_tx.send(reply_tx).await.is_err() {
            return Ok(());
        }

        match reply_rx.await {
            // Reply dropped: the process exited before the request was served.
            Err(_) => Ok(()),
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) if e.kind() == io::ErrorKind::InvalidInput => Ok(()),
            Ok(Err(e)) => Err(JobError::Kill(e)),
        }
    }

    /// Current contents of both capture buffers. Each stream is internally
    /// consistent; the two are not synchronized with each other.
    pub fn snapshot_output(&self) -> JobOutput {
        JobOutput {
            stdout: self.stdout.snapshot(),
            stderr: self.stderr.snapshot(),
        }
    }
}

fn pump<R>(mut reader: R, sink: Arc<OutputBuffer>) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut chunk = vec![0u8; READ_CHUNK];
        loop {
            match reader.read(&mut chunk).await {
                Ok(0) => break,
                Ok(n) => sink.append(&chunk[..n]),
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to read process output");
                    break;
                }
            }
        }
    })
}
