//! Fanout orchestrator: replicates one connection across tmux windows or
//! panes. Every replica runs the self-invoke command line and therefore
//! resolves, decides, and intercepts on its own; nothing is shared between
//! panes.

use std::process::Command;

use tracing::{debug, warn};

use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutMode {
    Window,
    VerticalSplit,
    HorizontalSplit,
}

#[derive(Debug, Clone)]
pub struct FanoutPlan {
    pub replicas: u32,
    pub mode: LayoutMode,
    pub layout: Option<String>,
}

impl FanoutPlan {
    /// A single replica is not a fanout: the caller runs the ordinary direct
    /// connection instead, with identical argv and behavior.
    pub fn is_fanout(&self) -> bool {
        self.replicas > 1
    }
}

/// Control surface of the terminal multiplexer. Each call is a side-effecting
/// external command; failures are surfaced, never retried.
pub trait TmuxControl {
    fn new_window(&self, name: &str, command: &str) -> Result<(), Error>;
    fn split_pane(&self, vertical: bool, command: &str) -> Result<(), Error>;
    fn select_layout(&self, layout: &str) -> Result<(), Error>;
}

/// Drives the real tmux binary.
pub struct TmuxCli;

impl TmuxCli {
    fn run(&self, args: &[&str]) -> Result<(), Error> {
        debug!(?args, "tmux");
        let out = Command::new("tmux")
            .args(args)
            .output()
            .map_err(|e| Error::Control(format!("tmux: {e}")))?;
        if !out.status.success() {
            let stderr = String::from_utf8_lossy(&out.stderr);
            return Err(Error::Control(format!(
                "tmux {} failed: {}",
                args.first().unwrap_or(&"?"),
                stderr.trim()
            )));
        }
        Ok(())
    }
}

impl TmuxControl for TmuxCli {
    fn new_window(&self, name: &str, command: &str) -> Result<(), Error> {
        self.run(&["new-window", "-n", name, command])
    }

    fn split_pane(&self, vertical: bool, command: &str) -> Result<(), Error> {
        let dir = if vertical { "-v" } else { "-h" };
        self.run(&["split-window", dir, command])
    }

    fn select_layout(&self, layout: &str) -> Result<(), Error> {
        self.run(&["select-layout", layout])
    }
}

/// Orchestrates one fanout. Whether a multiplexer session is active is a
/// constructor input, not an ad-hoc env read.
pub struct Fanout<'a> {
    control: &'a dyn TmuxControl,
    inside_multiplexer: bool,
}

impl<'a> Fanout<'a> {
    pub fn new(control: &'a dyn TmuxControl, inside_multiplexer: bool) -> Self {
        Self {
            control,
            inside_multiplexer,
        }
    }

    /// Replicate `command` per the plan. Preconditions are rejected before
    /// any side effect: fanout needs an active multiplexer session, and it
    /// cannot be combined with exec-replace since this process must stay
    /// alive to issue the control calls.
    ///
    /// Window mode is best-effort per window; split modes are fail-fast with
    /// no rollback of panes already created, and the layout is applied once,
    /// only after every pane exists.
    pub fn run(
        &self,
        plan: &FanoutPlan,
        window_name: &str,
        command: &str,
        exec_replace: bool,
    ) -> Result<(), Error> {
        if exec_replace {
            return Err(Error::Environment(
                "exec-replace cannot be combined with fanout".into(),
            ));
        }
        if !self.inside_multiplexer {
            return Err(Error::Environment(
                "fanout requires an active tmux session".into(),
            ));
        }

        match plan.mode {
            LayoutMode::Window => {
                for i in 1..=plan.replicas {
                    let name = format!("{window_name}/{i}");
                    if let Err(e) = self.control.new_window(&name, command) {
                        warn!(window = %name, error = %e, "window creation failed, continuing");
                    }
                }
                Ok(())
            }
            mode => {
                self.control.new_window(window_name, command)?;
                let vertical = mode == LayoutMode::VerticalSplit;
                for _ in 1..plan.replicas {
                    self.control.split_pane(vertical, command)?;
                }
                if let Some(layout) = &plan.layout {
                    self.control.select_layout(layout)?;
                }
                Ok(())
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::recording::Recorder;
    use super::*;

    fn plan(replicas: u32, mode: LayoutMode, layout: Option<&str>) -> FanoutPlan {
        FanoutPlan {
            replicas,
            mode,
            layout: layout.map(String::from),
        }
    }

    #[test]
    fn single_replica_is_not_a_fanout() {
        assert!(!plan(1, LayoutMode::Window, None).is_fanout());
        assert!(plan(2, LayoutMode::Window, None).is_fanout());
    }

    #[test]
    fn vertical_split_sequence_and_order() {
        let control = Recorder::default();
        let fanout = Fanout::new(&control, true);
        fanout
            .run(
                &plan(4, LayoutMode::VerticalSplit, Some("even-vertical")),
                "db",
                "sshfan db",
                false,
            )
            .unwrap();

        assert_eq!(
            control.calls(),
            vec![
                "new-window db [sshfan db]",
                "split -v [sshfan db]",
                "split -v [sshfan db]",
                "split -v [sshfan db]",
                "layout even-vertical",
            ]
        );
    }

    #[test]
    fn split_failure_aborts_before_next_call() {
        // Call 3 is the second split; the third split and the layout must
        // never be issued, and nothing is rolled back.
        let control = Recorder::failing_on(3);
        let fanout = Fanout::new(&control, true);
        let err = fanout
            .run(
                &plan(4, LayoutMode::VerticalSplit, Some("tiled")),
                "db",
                "sshfan db",
                false,
            )
            .unwrap_err();

        assert!(matches!(err, Error::Control(_)));
        assert_eq!(control.calls().len(), 3);
    }

    #[test]
    fn no_layout_call_without_layout() {
        let control = Recorder::default();
        Fanout::new(&control, true)
            .run(&plan(2, LayoutMode::HorizontalSplit, None), "db", "c", false)
            .unwrap();
        assert_eq!(control.calls(), vec!["new-window db [c]", "split -h [c]"]);
    }

    #[test]
    fn window_mode_is_best_effort_per_window() {
        let control = Recorder::failing_on(2);
        Fanout::new(&control, true)
            .run(&plan(3, LayoutMode::Window, None), "db", "c", false)
            .unwrap();

        // Window 2 failed; windows 1 and 3 were still attempted.
        assert_eq!(
            control.calls(),
            vec!["new-window db/1 [c]", "new-window db/2 [c]", "new-window db/3 [c]"]
        );
    }

    #[test]
    fn rejected_outside_multiplexer_before_any_side_effect() {
        let control = Recorder::default();
        let err = Fanout::new(&control, false)
            .run(&plan(2, LayoutMode::Window, None), "db", "c", false)
            .unwrap_err();

        assert!(matches!(err, Error::Environment(_)));
        assert!(control.calls().is_empty());
    }

    #[test]
    fn exec_replace_rejected_before_any_side_effect() {
        let control = Recorder::default();
        let err = Fanout::new(&control, true)
            .run(&plan(2, LayoutMode::Window, None), "db", "c", true)
            .unwrap_err();

        assert!(matches!(err, Error::Environment(_)));
        assert!(control.calls().is_empty());
    }
}
