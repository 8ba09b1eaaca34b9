//! PTY interceptor: runs the client under a pseudo-terminal, pumps bytes in
//! both directions, and injects the secret once when the password prompt
//! shows up on the output stream.

use std::io::{Read, Write};
use std::time::Duration;

use bytes::Bytes;
pub use portable_pty::CommandBuilder;
use portable_pty::{native_pty_system, Child, ExitStatus, MasterPty, PtySize};
use tokio::sync::mpsc::{channel, Receiver, Sender};
use tokio::task::spawn_blocking;
use tracing::debug;

use crate::error::Error;
use crate::prompt::PromptScanner;
use crate::term::{RawGuard, TermControl};

fn pty_size(cols: u16, rows: u16) -> PtySize {
    PtySize {
        rows,
        cols,
        pixel_width: 0,
        pixel_height: 0,
    }
}

/// One client run under a fresh pty. Exclusive holder of the real terminal's
/// raw-mode state for its lifetime; there is never more than one session per
/// controlling terminal, so no locking is involved.
pub struct PtySession {
    master: Box<dyn MasterPty>,
    child: Box<dyn Child + Send + Sync>,
    reader: Box<dyn Read + Send>,
    writer_tx: Sender<Bytes>,
    scanner: PromptScanner,
}

impl PtySession {
    /// Allocate a pty sized like the real terminal (when known) and start
    /// the client on it. The prompt-detection window opens here.
    pub fn spawn(cmd: CommandBuilder, size: Option<(u16, u16)>) -> Result<Self, Error> {
        let (cols, rows) = size.unwrap_or((80, 24));
        let pty_system = native_pty_system();
        let pair = pty_system
            .openpty(pty_size(cols, rows))
            .map_err(|e| Error::ProcessStart(format!("failed to open pty: {e}")))?;

        let child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| Error::ProcessStart(format!("failed to spawn client: {e}")))?;
        drop(pair.slave);

        let reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| Error::ProcessStart(format!("failed to clone pty reader: {e}")))?;
        let mut writer = pair
            .master
            .take_writer()
            .map_err(|e| Error::ProcessStart(format!("failed to take pty writer: {e}")))?;

        // Single writer task; stdin bytes and the one injection arrive over
        // the same channel, so writes never interleave mid-buffer.
        let (writer_tx, mut rx): (Sender<Bytes>, Receiver<Bytes>) = channel(32);
        tokio::spawn(async move {
            while let Some(data) = rx.recv().await {
                if writer.write_all(&data).is_err() {
                    break;
                }
                let _ = writer.flush();
            }
        });

        Ok(Self {
            master: pair.master,
            child,
            reader,
            writer_tx,
            scanner: PromptScanner::new(),
        })
    }

    /// Pump until the child exits and return its wait result unchanged.
    ///
    /// `input` is copied verbatim to the pty; pty output is copied verbatim
    /// to `output` and, only after it has been written there, scanned for a
    /// prompt. EOF or a read error on the pty ends the output path but the
    /// call still waits for child exit. The raw guard covers every return.
    pub async fn run<I, O>(
        self,
        input: I,
        output: O,
        secret: Option<Vec<u8>>,
        mut resize: Option<Receiver<()>>,
        term: &dyn TermControl,
    ) -> Result<ExitStatus, Error>
    where
        I: Read + Send + 'static,
        O: Write + Send + 'static,
    {
        let PtySession {
            master,
            mut child,
            reader,
            writer_tx,
            scanner,
        } = self;

        let _raw = if term.is_interactive() {
            Some(RawGuard::acquire(term)?)
        } else {
            None
        };

        // input -> pty
        {
            let tx = writer_tx.clone();
            spawn_blocking(move || {
                let mut input = input;
                let mut buf = [0u8; 1024];
                loop {
                    match input.read(&mut buf) {
                        Ok(0) | Err(_) => break,
                        Ok(n) => {
                            if tx.blocking_send(Bytes::copy_from_slice(&buf[..n])).is_err() {
                                break;
                            }
                        }
                    }
                }
            });
        }

        // pty -> output, with prompt scanning behind the write
        let out_task = {
            let tx = writer_tx.clone();
            let mut scanner = scanner;
            let mut secret = secret;
            spawn_blocking(move || {
                let mut reader = reader;
                let mut output = output;
                let mut buf = [0u8; 2048];
                loop {
                    let n = match reader.read(&mut buf) {
                        Ok(0) | Err(_) => break,
                        Ok(n) => n,
                    };
                    if output.write_all(&buf[..n]).is_err() {
                        break;
                    }
                    let _ = output.flush();

                    if scanner.push(&buf[..n]) {
                        if let Some(mut value) = secret.take() {
                            // Carriage return, as if typed on the terminal.
                            value.push(b'\r');
                            let _ = tx.blocking_send(Bytes::from(value));
                        }
                    }
                }
            })
        };

        let mut wait = spawn_blocking(move || child.wait());

        let status = loop {
            tokio::select! {
                res = &mut wait => break res,
                event = recv_or_pending(&mut resize) => match event {
                    Some(()) => {
                        if let Some((cols, rows)) = term.size() {
                            if let Err(e) = master.resize(pty_size(cols, rows)) {
                                debug!(error = %e, "pty resize failed");
                            }
                        }
                    }
                    None => resize = None,
                },
            }
        };

        // Unblocks the output pump, then give it a moment to flush what the
        // child wrote on its way out.
        drop(master);
        let _ = tokio::time::timeout(Duration::from_millis(250), out_task).await;

        let status = status
            .map_err(|e| Error::ProcessStart(format!("wait task failed: {e}")))?
            .map_err(Error::Io)?;
        Ok(status)
    }
}

async fn recv_or_pending(rx: &mut Option<Receiver<()>>) -> Option<()> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::term::mock::MockTerm;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct SharedSink(Arc<Mutex<Vec<u8>>>);

    impl SharedSink {
        fn contents(&self) -> Vec<u8> {
            self.0.lock().unwrap().clone()
        }
    }

    impl Write for SharedSink {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn sh(script: &str) -> CommandBuilder {
        let mut cmd = CommandBuilder::new("/bin/sh");
        cmd.arg("-c");
        cmd.arg(script);
        cmd
    }

    #[tokio::test]
    async fn injects_secret_once_on_prompt() {
        let term = MockTerm::new();
        let sink = SharedSink::default();

        let script = r#"stty -echo 2>/dev/null; printf 'Password: '; read line; printf 'got=%s.' "$line""#;
        let session = PtySession::spawn(sh(script), Some((80, 24))).unwrap();
        let status = session
            .run(
                std::io::empty(),
                sink.clone(),
                Some(b"hunter2".to_vec()),
                None,
                &term,
            )
            .await
            .unwrap();

        assert!(status.success());
        let out = String::from_utf8_lossy(&sink.contents()).into_owned();
        assert!(out.contains("got=hunter2."), "output was: {out:?}");
    }

    #[tokio::test]
    async fn no_prompt_means_no_injection_and_verbatim_output() {
        let term = MockTerm::new();
        let sink = SharedSink::default();

        let session = PtySession::spawn(sh("printf 'abcdef'"), Some((80, 24))).unwrap();
        let status = session
            .run(
                std::io::empty(),
                sink.clone(),
                Some(b"hunter2".to_vec()),
                None,
                &term,
            )
            .await
            .unwrap();

        assert!(status.success());
        assert_eq!(sink.contents(), b"abcdef");
    }

    #[tokio::test]
    async fn input_reaches_the_child_verbatim() {
        let term = MockTerm::new();
        let sink = SharedSink::default();

        let script = r#"stty -echo 2>/dev/null; read line; printf 'seen=%s.' "$line""#;
        let session = PtySession::spawn(sh(script), Some((80, 24))).unwrap();
        let status = session
            .run(
                std::io::Cursor::new(b"hello pty\n".to_vec()),
                sink.clone(),
                None,
                None,
                &term,
            )
            .await
            .unwrap();

        assert!(status.success());
        let out = String::from_utf8_lossy(&sink.contents()).into_owned();
        assert!(out.contains("seen=hello pty."), "output was: {out:?}");
    }

    #[tokio::test]
    async fn raw_mode_restored_after_clean_exit() {
        let term = MockTerm::new();
        let session = PtySession::spawn(sh("exit 0"), None).unwrap();
        let status = session
            .run(std::io::empty(), SharedSink::default(), None, None, &term)
            .await
            .unwrap();

        assert!(status.success());
        assert_eq!(term.times_entered(), 1);
        assert!(!term.raw_active());
    }

    #[tokio::test]
    async fn raw_mode_restored_after_child_killed() {
        let term = MockTerm::new();
        let session = PtySession::spawn(sh("kill -KILL $$"), None).unwrap();
        let status = session
            .run(std::io::empty(), SharedSink::default(), None, None, &term)
            .await
            .unwrap();

        assert!(!status.success());
        assert!(!term.raw_active());
    }

    #[tokio::test]
    async fn exit_status_is_propagated_unchanged() {
        let term = MockTerm::new();
        let session = PtySession::spawn(sh("exit 7"), None).unwrap();
        let status = session
            .run(std::io::empty(), SharedSink::default(), None, None, &term)
            .await
            .unwrap();

        assert_eq!(status.exit_code(), 7);
        assert!(!term.raw_active());
    }

    #[test]
    fn spawn_failure_is_a_process_start_error() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let _guard = rt.enter();
        let cmd = CommandBuilder::new("/nonexistent/sshfan-no-such-binary");
        let err = match PtySession::spawn(cmd, None) {
            Err(e) => e,
            Ok(_) => panic!("spawn should fail"),
        };
        assert!(matches!(err, Error::ProcessStart(_)));
    }
}
