use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use sshfan::{App, AppEnv, AuthMode, ConnectOptions, FanoutPlan, LayoutMode};

#[derive(Parser)]
#[command(name = "sshfan", version, about = "Catalog-driven ssh with credential automation and tmux fanout", args_conflicts_with_subcommands = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Cmd>,

    #[command(flatten)]
    connect: ConnectArgs,
}

#[derive(Args)]
struct ConnectArgs {
    /// Host alias from the catalog or ssh config
    host: Option<String>,

    /// Remote command to run instead of an interactive shell
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    remote_command: Vec<String>,

    /// Replicate the connection across this many tmux panes/windows
    #[arg(long, value_name = "N")]
    replicas: Option<u32>,

    /// Fanout layout mode
    #[arg(long, value_enum, default_value = "window")]
    mode: ModeArg,

    /// tmux layout to apply once all panes exist (split modes only)
    #[arg(long, value_name = "SPEC")]
    layout: Option<String>,

    /// Explain the automation decision on stderr
    #[arg(long)]
    diag: bool,

    /// Force standard interactive authentication for this attempt
    #[arg(long)]
    no_auto: bool,

    /// Replace this process with the client instead of wrapping it
    #[arg(long)]
    exec: bool,
}

#[derive(Subcommand)]
enum Cmd {
    /// Print resolved hosts, one per line
    List,
    /// Copy files with scp; `alias:path` endpoints are resolved
    Copy {
        src: String,
        dst: String,
        #[arg(long)]
        diag: bool,
        #[arg(long)]
        no_auto: bool,
    },
    /// Set or clear the per-host automation override
    Auth {
        host: String,
        #[arg(value_enum)]
        mode: AuthArg,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    Window,
    Vsplit,
    Hsplit,
}

impl From<ModeArg> for LayoutMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Window => LayoutMode::Window,
            ModeArg::Vsplit => LayoutMode::VerticalSplit,
            ModeArg::Hsplit => LayoutMode::HorizontalSplit,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum AuthArg {
    Automate,
    Manual,
    Clear,
}

fn main() {
    // Log to stderr only; stdout belongs to the pty passthrough.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let code = match run(Cli::parse()) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("sshfan: {e:#}");
            1
        }
    };
    std::process::exit(code);
}

fn run(cli: Cli) -> anyhow::Result<i32> {
    let mut app = App::load(app_env())?;

    match cli.command {
        Some(Cmd::List) => {
            app.list();
            Ok(0)
        }
        Some(Cmd::Copy {
            src,
            dst,
            diag,
            no_auto,
        }) => app.copy(&src, &dst, diag, no_auto),
        Some(Cmd::Auth { host, mode }) => {
            let mode = match mode {
                AuthArg::Automate => Some(AuthMode::Automate),
                AuthArg::Manual => Some(AuthMode::Manual),
                AuthArg::Clear => None,
            };
            app.set_auth(&host, mode)?;
            Ok(0)
        }
        None => {
            let args = cli.connect;
            let Some(host) = args.host else {
                anyhow::bail!("no host given; try `sshfan <alias>` or `sshfan list`");
            };
            let opts = ConnectOptions {
                remote_command: args.remote_command,
                plan: args.replicas.map(|replicas| FanoutPlan {
                    replicas: replicas.max(1),
                    mode: args.mode.into(),
                    layout: args.layout,
                }),
                no_auto: args.no_auto,
                exec_replace: args.exec,
                diag: args.diag,
            };
            app.connect(&host, &opts)
        }
    }
}

/// Environment surface, read once: `SSHFAN_BIN` overrides the executable
/// fanout panes re-invoke, `TMUX` tells us a multiplexer session is active.
fn app_env() -> AppEnv {
    let self_exe = std::env::var("SSHFAN_BIN")
        .ok()
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .or_else(|| {
            std::env::current_exe()
                .ok()
                .map(|p| p.to_string_lossy().into_owned())
        })
        .unwrap_or_else(|| "sshfan".to_string());

    AppEnv {
        self_exe,
        inside_multiplexer: std::env::var_os("TMUX").is_some(),
    }
}
