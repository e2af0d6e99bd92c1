//! Single child-process handle
//!
//! Spawns the server executable with piped stdio, pumps stdout/stderr to a
//! line callback, and reaps the child exactly once. Graceful stop writes the
//! `quit` sentinel to stdin and degrades to a forced kill after the grace
//! period.

use parking_lot::{Mutex, RwLock};
use srcadmin_core::constants::{STOP_GRACE, STOP_POLL_INTERVAL};
use srcadmin_core::{Error, Result};
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{ChildStdin, Command};
use tokio::sync::oneshot;
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

type OutputFn = dyn Fn(&str) + Send + Sync;
type ExitFn = dyn Fn(i32) + Send + Sync;

struct ProcessState {
    running: AtomicBool,
    pid: AtomicU32,
    stdin: Mutex<Option<ChildStdin>>,
    kill_tx: Mutex<Option<oneshot::Sender<()>>>,
    on_output: RwLock<Arc<OutputFn>>,
    on_exit: RwLock<Arc<ExitFn>>,
}

/// Handle for one supervised child process.
pub struct ProcessHandle {
    exe: PathBuf,
    args: Vec<String>,
    state: Arc<ProcessState>,
}

impl ProcessHandle {
    pub fn new(exe: PathBuf, args: Vec<String>) -> Self {
        Self {
            exe,
            args,
            state: Arc::new(ProcessState {
                running: AtomicBool::new(false),
                pid: AtomicU32::new(0),
                stdin: Mutex::new(None),
                kill_tx: Mutex::new(None),
                on_output: RwLock::new(Arc::new(|_| {})),
                on_exit: RwLock::new(Arc::new(|_| {})),
            }),
        }
    }

    /// Callback invoked for each stdout/stderr line (CR/LF stripped, blank
    /// lines dropped). Set before `start`.
    pub fn set_on_output<F: Fn(&str) + Send + Sync + 'static>(&self, f: F) {
        *self.state.on_output.write() = Arc::new(f);
    }

    /// Callback invoked exactly once when the child exits; receives the exit
    /// code, -1 when indeterminate. Set before `start`.
    pub fn set_on_exit<F: Fn(i32) + Send + Sync + 'static>(&self, f: F) {
        *self.state.on_exit.write() = Arc::new(f);
    }

    /// Spawn the child and the reader/reaper tasks.
    pub fn start(&self) -> Result<()> {
        if self.state.running.load(Ordering::SeqCst) {
            return Err(Error::AlreadyRunning(self.exe.display().to_string()));
        }

        let mut cmd = Command::new(&self.exe);
        cmd.args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(false);

        // No console window for the child on Windows desktops
        #[cfg(windows)]
        {
            const CREATE_NO_WINDOW: u32 = 0x0800_0000;
            cmd.creation_flags(CREATE_NO_WINDOW);
        }

        let mut child = cmd.spawn().map_err(|e| Error::Spawn(e.to_string()))?;
        let pid = child
            .id()
            .ok_or_else(|| Error::Spawn("process started but no pid available".to_string()))?;

        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        self.state.pid.store(pid, Ordering::SeqCst);
        self.state.running.store(true, Ordering::SeqCst);
        *self.state.stdin.lock() = stdin;

        let (kill_tx, kill_rx) = oneshot::channel();
        *self.state.kill_tx.lock() = Some(kill_tx);

        if let Some(stdout) = stdout {
            spawn_line_reader(stdout, Arc::clone(&self.state));
        }
        if let Some(stderr) = stderr {
            spawn_line_reader(stderr, Arc::clone(&self.state));
        }

        // Reaper: waits for exit (or the kill signal), clears running state,
        // and fires the exit callback exactly once
        let state = Arc::clone(&self.state);
        tokio::spawn(async move {
            let code = tokio::select! {
                status = child.wait() => {
                    status.ok().and_then(|s| s.code()).unwrap_or(-1)
                }
                _ = kill_rx => {
                    let _ = child.start_kill();
                    child.wait().await.ok().and_then(|s| s.code()).unwrap_or(-1)
                }
            };

            debug!(pid, code, "process exited");
            state.running.store(false, Ordering::SeqCst);
            state.pid.store(0, Ordering::SeqCst);
            state.stdin.lock().take();
            state.kill_tx.lock().take();

            let on_exit = state.on_exit.read().clone();
            on_exit(code);
        });

        Ok(())
    }

    /// Graceful stop: `quit` on stdin, wait up to the grace period, then
    /// force-kill. Always leaves the handle non-running. Idempotent.
    pub async fn stop(&self) -> Result<()> {
        if !self.state.running.load(Ordering::SeqCst) {
            return Ok(());
        }

        let stdin = self.state.stdin.lock().take();
        if let Some(mut stdin) = stdin {
            if let Err(e) = stdin.write_all(b"quit\n").await {
                warn!("failed to write quit to stdin: {}", e);
            }
            let _ = stdin.shutdown().await;
        }

        let deadline = Instant::now() + STOP_GRACE;
        while Instant::now() < deadline {
            if !self.state.running.load(Ordering::SeqCst) {
                return Ok(());
            }
            sleep(STOP_POLL_INTERVAL).await;
        }

        warn!(pid = self.pid(), "process did not quit in time, killing");
        self.kill();

        // Give the reaper a moment to observe the exit
        sleep(std::time::Duration::from_millis(200)).await;
        Ok(())
    }

    /// Immediate force-termination. Idempotent.
    pub fn kill(&self) {
        if let Some(tx) = self.state.kill_tx.lock().take() {
            let _ = tx.send(());
        }
    }

    pub fn is_running(&self) -> bool {
        self.state.running.load(Ordering::SeqCst)
    }

    /// OS pid, 0 when not running.
    pub fn pid(&self) -> u32 {
        self.state.pid.load(Ordering::SeqCst)
    }
}

fn spawn_line_reader<R>(pipe: R, state: Arc<ProcessState>)
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(pipe).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    let line = line.trim_end_matches('\r');
                    if !line.is_empty() {
                        let on_output = state.on_output.read().clone();
                        on_output(line);
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!("output read error: {}", e);
                    break;
                }
            }
        }
    });
}
