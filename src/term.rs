//! Real-terminal control: raw mode lifecycle and resize notifications.

use std::io;

use crossterm::terminal;
use crossterm::tty::IsTty;
use tokio::sync::mpsc;

/// Capability seam over the controlling terminal, so the interceptor can be
/// tested without owning a real tty.
pub trait TermControl: Send + Sync {
    fn is_interactive(&self) -> bool;
    fn enter_raw(&self) -> io::Result<()>;
    fn leave_raw(&self) -> io::Result<()>;
    /// Current size as (cols, rows), if known.
    fn size(&self) -> Option<(u16, u16)>;
}

/// The process's actual controlling terminal, via crossterm.
pub struct CrosstermControl;

impl TermControl for CrosstermControl {
    fn is_interactive(&self) -> bool {
        io::stdin().is_tty() && io::stdout().is_tty()
    }

    fn enter_raw(&self) -> io::Result<()> {
        terminal::enable_raw_mode()
    }

    fn leave_raw(&self) -> io::Result<()> {
        terminal::disable_raw_mode()
    }

    fn size(&self) -> Option<(u16, u16)> {
        terminal::size().ok()
    }
}

/// Holds raw mode for a scope and restores the previous mode on drop, on
/// every exit path including errors.
pub struct RawGuard<'a> {
    term: &'a dyn TermControl,
}

impl<'a> RawGuard<'a> {
    pub fn acquire(term: &'a dyn TermControl) -> io::Result<Self> {
        term.enter_raw()?;
        Ok(Self { term })
    }
}

impl Drop for RawGuard<'_> {
    fn drop(&mut self) {
        let _ = self.term.leave_raw();
    }
}

/// Terminal-resize event source.
///
/// Core logic only consumes the receiver; registering the platform signal
/// lives here. On unix this listens for SIGWINCH. Must be called from within
/// a tokio runtime.
#[cfg(unix)]
pub fn resize_events() -> io::Result<mpsc::Receiver<()>> {
    use tokio::signal::unix::{signal, SignalKind};

    let (tx, rx) = mpsc::channel(4);
    let mut sig = signal(SignalKind::window_change())?;
    tokio::spawn(async move {
        while sig.recv().await.is_some() {
            if tx.send(()).await.is_err() {
                break;
            }
        }
    });
    Ok(rx)
}

/// No resize notifications on this platform; the receiver never yields.
#[cfg(not(unix))]
pub fn resize_events() -> io::Result<mpsc::Receiver<()>> {
    let (tx, rx) = mpsc::channel(1);
    std::mem::forget(tx);
    Ok(rx)
}


#[cfg(test)]
mod tests {
    use super::mock::MockTerm;
    use super::*;
    use crate::error::Error;

    #[test]
    fn raw_guard_restores_on_drop() {
        let term = MockTerm::new();
        {
            let _guard = RawGuard::acquire(&term).unwrap();
            assert!(term.raw_active());
        }
        assert!(!term.raw_active());
        assert_eq!(term.times_entered(), 1);
    }

    #[test]
    fn raw_guard_restores_on_error_path() {
        let term = MockTerm::new();
        let result: Result<(), Error> = (|| {
            let _guard = RawGuard::acquire(&term)?;
            Err(Error::ProcessStart("spawn failed".into()))
        })();
        assert!(result.is_err());
        assert!(!term.raw_active());
    }
}
