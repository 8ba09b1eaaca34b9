use anyhow::Context;
use tracing::warn;

use crate::command;
use crate::decision::{decide, AuthDecision};
use crate::error::Error;
use crate::fanout::{Fanout, FanoutPlan, TmuxCli, TmuxControl};
use crate::host::{EffectiveHost, Resolver};
use crate::pty::{CommandBuilder, PtySession};
use crate::secret::{CredentialRef, KeyringStore, SecretStore};
use crate::store::{config_path, AuthMode, Db};
use crate::term::{self, CrosstermControl, TermControl};

const OVERRIDES_FILE: &str = "auth";
const SECRET_SERVICE: &str = "sshfan";

/// Environment facts, resolved once in main and threaded in here instead of
/// being read ad hoc by the components that need them.
pub struct AppEnv {
    pub self_exe: String,
    pub inside_multiplexer: bool,
}

pub struct ConnectOptions {
    pub remote_command: Vec<String>,
    pub plan: Option<FanoutPlan>,
    pub no_auto: bool,
    pub exec_replace: bool,
    pub diag: bool,
}

pub struct App {
    resolver: Resolver,
    overrides: Db<String, AuthMode>,
    secrets: Box<dyn SecretStore>,
    control: Box<dyn TmuxControl>,
    env: AppEnv,
}

impl App {
    pub fn load(env: AppEnv) -> anyhow::Result<Self> {
        Ok(Self {
            resolver: Resolver::load()?,
            overrides: Db::open(config_path(OVERRIDES_FILE)?),
            secrets: Box::new(KeyringStore::new(SECRET_SERVICE)),
            control: Box::new(TmuxCli),
            env,
        })
    }

    /// Connect to one alias, fanning out first when the plan asks for more
    /// than one replica. Returns the exit code to report.
    pub fn connect(&self, alias: &str, opts: &ConnectOptions) -> anyhow::Result<i32> {
        let host = self.resolver.resolve(alias);

        if let Some(plan) = fanout_plan(opts) {
            let argv = command::replica_argv(
                &self.env.self_exe,
                alias,
                &opts.remote_command,
                opts.diag,
                opts.no_auto,
            );
            let cmdline = command::shell_join(&argv);
            Fanout::new(self.control.as_ref(), self.env.inside_multiplexer).run(
                plan,
                &host.name,
                &cmdline,
                opts.exec_replace,
            )?;
            return Ok(0);
        }

        let (secret, note) = if opts.no_auto {
            (None, "automation disabled by flag".to_string())
        } else if opts.exec_replace {
            (None, "exec-replace requested".to_string())
        } else {
            self.reveal(decide(&host, &self.overrides, self.secrets.as_ref()))
        };

        let automated = secret.is_some();
        if opts.diag {
            eprintln!(
                "sshfan: automation {} for {}: {note}",
                if automated { "on" } else { "off" },
                host.target()
            );
        }

        let argv = command::ssh_argv(&host, &opts.remote_command, automated);
        self.launch(argv, secret)
    }

    /// Copy files with scp, rewriting `alias:path` endpoints through the
    /// resolver. The first remote endpoint drives port, jump host, and the
    /// automation decision.
    pub fn copy(&self, src: &str, dst: &str, diag: bool, no_auto: bool) -> anyhow::Result<i32> {
        let (src, src_host) = self.rewrite_endpoint(src);
        let (dst, dst_host) = self.rewrite_endpoint(dst);
        let remote = src_host.or(dst_host);

        let (secret, note) = match (&remote, no_auto) {
            (Some(host), false) => {
                self.reveal(decide(host, &self.overrides, self.secrets.as_ref()))
            }
            (Some(_), true) => (None, "automation disabled by flag".to_string()),
            (None, _) => (None, "no remote endpoint".to_string()),
        };

        let automated = secret.is_some();
        if diag {
            eprintln!(
                "sshfan: automation {}: {note}",
                if automated { "on" } else { "off" }
            );
        }

        let (port, jump) = remote
            .map(|h| (h.port, h.jump_host))
            .unwrap_or((None, None));
        let argv = command::scp_argv(port, jump.as_deref(), &src, &dst, automated);
        self.launch(argv, secret)
    }

    pub fn list(&self) {
        for host in self.resolver.list() {
            println!("{}\t{}", host.name, host.target());
        }
    }

    /// Set or clear the per-host automation override, keyed by the resolved
    /// hostname like every other credential lookup.
    pub fn set_auth(&mut self, alias: &str, mode: Option<AuthMode>) -> anyhow::Result<()> {
        let key = self.resolver.resolve(alias).host_key().to_string();
        match mode {
            Some(mode) => {
                self.overrides.insert(key, mode);
            }
            None => {
                self.overrides.remove(&key);
            }
        }
        self.overrides
            .flush()
            .context("failed to write override store")
    }

    /// Turn a positive decision into secret bytes, degrading to interactive
    /// auth when the reveal comes back empty or the store errors. The
    /// returned note explains the final state for `--diag`.
    fn reveal(&self, decision: AuthDecision) -> (Option<Vec<u8>>, String) {
        if !decision.use_automation {
            return (None, decision.reason);
        }
        let cred = CredentialRef::password(&decision.host_key, &decision.user);
        match self.secrets.reveal(&cred) {
            Ok(Some(bytes)) => (Some(bytes), decision.reason),
            Ok(None) => (
                None,
                format!("{}, but credential vanished before reveal", decision.reason),
            ),
            Err(e) => {
                warn!(host = %decision.host_key, error = %e, "secret reveal failed");
                (
                    None,
                    format!("{}, but secret store unavailable", decision.reason),
                )
            }
        }
    }

    /// Run the client. With a secret the client goes under the pty
    /// interceptor; without one this process is replaced by the client so
    /// the wrapper adds nothing to the session.
    fn launch(&self, argv: Vec<String>, secret: Option<Vec<u8>>) -> anyhow::Result<i32> {
        match secret {
            Some(secret) => {
                let term = CrosstermControl;
                let rt = tokio::runtime::Runtime::new()?;
                let status = rt.block_on(async {
                    let mut cmd = CommandBuilder::new(&argv[0]);
                    cmd.args(&argv[1..]);
                    let session = PtySession::spawn(cmd, term.size())?;
                    let resize = term::resize_events().ok();
                    session
                        .run(
                            std::io::stdin(),
                            std::io::stdout(),
                            Some(secret),
                            resize,
                            &term,
                        )
                        .await
                })?;
                Ok(status.exit_code() as i32)
            }
            None => exec_client(&argv),
        }
    }

    fn rewrite_endpoint(&self, endpoint: &str) -> (String, Option<EffectiveHost>) {
        match split_endpoint(endpoint) {
            Some((alias, path)) => {
                let host = self.resolver.resolve(alias);
                let rewritten = format!("{}:{path}", host.target());
                (rewritten, Some(host))
            }
            None => (endpoint.to_string(), None),
        }
    }
}

fn fanout_plan(opts: &ConnectOptions) -> Option<&FanoutPlan> {
    opts.plan.as_ref().filter(|p| p.is_fanout())
}

/// An `alias:path` endpoint, unless the prefix looks like a path itself.
fn split_endpoint(endpoint: &str) -> Option<(&str, &str)> {
    let (alias, path) = endpoint.split_once(':')?;
    if alias.is_empty() || alias.contains('/') {
        return None;
    }
    Some((alias, path))
}

#[cfg(unix)]
fn exec_client(argv: &[String]) -> anyhow::Result<i32> {
    use std::os::unix::process::CommandExt;
    let err = std::process::Command::new(&argv[0]).args(&argv[1..]).exec();
    // exec only returns on failure
    Err(Error::ProcessStart(format!("{}: {err}", argv[0])).into())
}

#[cfg(not(unix))]
fn exec_client(argv: &[String]) -> anyhow::Result<i32> {
    let status = std::process::Command::new(&argv[0])
        .args(&argv[1..])
        .status()
        .map_err(|e| Error::ProcessStart(format!("{}: {e}", argv[0])))?;
    Ok(status.code().unwrap_or(1))
}
