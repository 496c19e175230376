use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError};
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::error::{EngineError, EngineResult};
use crate::processor::MessageProcessor;
use crate::uci::EngineCommand;

/// Receives the raw output of an engine process, one line at a time.
pub trait LineSink: Send + Sync {
    fn on_line(&self, line: &str);

    /// The output pipe reached end of file (`None`) or failed.
    fn on_closed(&self, error: Option<io::Error>);
}

impl LineSink for MessageProcessor {
    fn on_line(&self, line: &str) {
        self.ingest(line);
    }

    fn on_closed(&self, error: Option<io::Error>) {
        match error {
            Some(err) => self.mark_unavailable(&EngineError::Read(err).to_string()),
            None => self.mark_unavailable("engine closed its output"),
        }
    }
}

fn read_lines(stdout: ChildStdout, sink: Arc<dyn LineSink>) {
    let mut reader = BufReader::new(stdout);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => {
                debug!("engine output closed");
                sink.on_closed(None);
                return;
            }
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                let line = line.trim_end_matches(['\r', '\n']);
                debug!("<< {}", line);
                sink.on_line(line);
            }
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => {
                error!("failed to read engine output: {}", err);
                sink.on_closed(Some(err));
                return;
            }
        }
    }
}

#[cfg(unix)]
fn own_process_group(command: &mut Command) {
    use std::os::unix::process::CommandExt;
    command.process_group(0);
}

#[cfg(not(unix))]
fn own_process_group(_command: &mut Command) {}

/// Kills the engine and anything it started. The engine leads its own
/// process group, so helpers forked by a wrapper script go with it.
#[cfg(unix)]
fn kill_process_group(child: &mut Child) {
    if let Ok(pgid) = libc::pid_t::try_from(child.id()) {
        // SAFETY: kill(2) takes no pointers; a negative pid names the group
        if unsafe { libc::kill(-pgid, libc::SIGKILL) } != 0 {
            debug!("engine process group {} already gone", pgid);
        }
    }
}

#[cfg(not(unix))]
fn kill_process_group(_child: &mut Child) {}

struct Reader {
    handle: JoinHandle<()>,
    finished: Receiver<()>,
}

/// An engine subprocess with a background thread forwarding its output.
pub struct EngineProcess {
    path: PathBuf,
    child: Mutex<Option<Child>>,
    stdin: Mutex<Option<ChildStdin>>,
    reader: Mutex<Option<Reader>>,
    grace: Duration,
}

impl EngineProcess {
    /// Spawns the engine and starts its reader thread.
    pub fn start(
        path: impl AsRef<Path>,
        args: &[String],
        sink: Arc<dyn LineSink>,
        grace: Duration,
    ) -> EngineResult<Self> {
        let path = path.as_ref().to_path_buf();
        let launch_error = |source: io::Error| EngineError::Launch {
            path: path.clone(),
            source,
        };

        let mut command = Command::new(&path);
        command
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null());
        own_process_group(&mut command);
        let mut child = command.spawn().map_err(launch_error)?;

        let pipes = child.stdin.take().zip(child.stdout.take());
        let Some((stdin, stdout)) = pipes else {
            kill_process_group(&mut child);
            let _ = child.kill();
            let _ = child.wait();
            return Err(launch_error(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "engine pipes were not captured",
            )));
        };

        let (done_tx, finished) = bounded::<()>(1);
        let handle = thread::Builder::new()
            .name("engine-reader".to_string())
            .spawn(move || {
                read_lines(stdout, sink);
                let _ = done_tx.send(());
            });
        let handle = match handle {
            Ok(handle) => handle,
            Err(err) => {
                kill_process_group(&mut child);
                let _ = child.kill();
                let _ = child.wait();
                return Err(launch_error(err));
            }
        };

        info!("started engine {} (pid {})", path.display(), child.id());
        Ok(Self {
            path,
            child: Mutex::new(Some(child)),
            stdin: Mutex::new(Some(stdin)),
            reader: Mutex::new(Some(Reader { handle, finished })),
            grace,
        })
    }

    pub fn send(&self, command: &EngineCommand) -> EngineResult<()> {
        self.send_line(&command.to_string())
    }

    /// Writes one line. Writers are serialized by the stdin lock.
    pub fn send_line(&self, line: &str) -> EngineResult<()> {
        let mut stdin = self.stdin.lock();
        let pipe = stdin.as_mut().ok_or(EngineError::Unavailable)?;
        debug!(">> {}", line);
        writeln!(pipe, "{line}")
            .and_then(|_| pipe.flush())
            .map_err(EngineError::Write)
    }

    /// Asks the engine to quit, then kills its process group if it outlives
    /// the grace period. Returns once the engine is gone and the reader has
    /// finished, or after a second grace period if the output pipe is still
    /// held open, in which case the reader thread is left behind.
    pub fn shutdown(&self) {
        if let Some(mut stdin) = self.stdin.lock().take() {
            let sent = writeln!(stdin, "{}", EngineCommand::Quit).and_then(|_| stdin.flush());
            if let Err(err) = sent {
                debug!("could not send quit: {}", err);
            }
        }

        if let Some(mut child) = self.child.lock().take() {
            let deadline = Instant::now() + self.grace;
            loop {
                match child.try_wait() {
                    Ok(Some(status)) => {
                        info!("engine {} exited with {}", self.path.display(), status);
                        break;
                    }
                    Ok(None) if Instant::now() < deadline => {
                        thread::sleep(Duration::from_millis(10))
                    }
                    Ok(None) => {
                        warn!("engine did not quit within {:?}, killing it", self.grace);
                        kill_process_group(&mut child);
                        let _ = child.kill();
                        let _ = child.wait();
                        break;
                    }
                    Err(err) => {
                        warn!("failed to query engine status: {}", err);
                        kill_process_group(&mut child);
                        let _ = child.kill();
                        let _ = child.wait();
                        break;
                    }
                }
            }
            // Helpers the engine left running still hold its output pipe
            kill_process_group(&mut child);
        }

        if let Some(reader) = self.reader.lock().take() {
            match reader.finished.recv_timeout(self.grace) {
                Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                    if reader.handle.join().is_err() {
                        error!("engine reader thread panicked");
                    }
                }
                Err(RecvTimeoutError::Timeout) => {
                    warn!("engine output still open after shutdown, detaching reader");
                }
            }
        }
    }
}

impl Drop for EngineProcess {
    fn drop(&mut self) {
        self.shutdown();
    }
}
