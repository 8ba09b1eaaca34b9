//! Argument-vector construction for the ssh/scp clients and shell-safe
//! formatting for the multiplexer's run-command primitive.

use crate::host::EffectiveHost;

/// Path of the ssh client binary, overridable for odd environments.
pub fn ssh_program() -> String {
    program_from_env("SSHFAN_SSH", "ssh")
}

/// Path of the file-transfer client binary.
pub fn scp_program() -> String {
    program_from_env("SSHFAN_SCP", "scp")
}

fn program_from_env(var: &str, fallback: &str) -> String {
    if let Ok(p) = std::env::var(var) {
        let p = p.trim();
        if !p.is_empty() {
            return p.to_string();
        }
    }
    fallback.to_string()
}

/// ssh argv for a resolved host. With `automated` the client is steered onto
/// the interactive password path: public-key auth is disabled and
/// keyboard-interactive/password are preferred, so the injected secret is
/// actually consumed instead of a key exchange short-circuiting the prompt.
pub fn ssh_argv(host: &EffectiveHost, remote_command: &[String], automated: bool) -> Vec<String> {
    let mut argv = vec![ssh_program()];
    if automated {
        argv.push("-o".into());
        argv.push("PreferredAuthentications=keyboard-interactive,password".into());
        argv.push("-o".into());
        argv.push("PubkeyAuthentication=no".into());
    }
    if let Some(port) = host.port {
        argv.push("-p".into());
        argv.push(port.to_string());
    }
    if let Some(jump) = &host.jump_host {
        argv.push("-J".into());
        argv.push(jump.clone());
    }
    argv.push(host.target());
    argv.extend(remote_command.iter().cloned());
    argv
}

/// scp argv for already-rewritten endpoint strings. `automated` steers the
/// transfer onto the password path the same way `ssh_argv` does.
pub fn scp_argv(
    port: Option<u16>,
    jump_host: Option<&str>,
    src: &str,
    dst: &str,
    automated: bool,
) -> Vec<String> {
    let mut argv = vec![scp_program()];
    if automated {
        argv.push("-o".into());
        argv.push("PreferredAuthentications=keyboard-interactive,password".into());
        argv.push("-o".into());
        argv.push("PubkeyAuthentication=no".into());
    }
    if let Some(port) = port {
        argv.push("-P".into());
        argv.push(port.to_string());
    }
    if let Some(jump) = jump_host {
        argv.push("-J".into());
        argv.push(jump.to_string());
    }
    argv.push(src.to_string());
    argv.push(dst.to_string());
    argv
}

/// Argv re-invoking this program for one fanout replica. Fanout flags are
/// deliberately absent: each pane runs a single plain connection and makes
/// its own decision.
pub fn replica_argv(
    self_exe: &str,
    alias: &str,
    remote_command: &[String],
    diag: bool,
    no_auto: bool,
) -> Vec<String> {
    let mut argv = vec![self_exe.to_string()];
    if diag {
        argv.push("--diag".into());
    }
    if no_auto {
        argv.push("--no-auto".into());
    }
    argv.push(alias.to_string());
    argv.extend(remote_command.iter().cloned());
    argv
}

fn is_safe_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || "_@%+=:,./-".contains(c)
}

/// Quote one argument for a POSIX shell. Anything outside the conservative
/// safe set is wrapped in single quotes; an embedded quote closes the
/// quoting, emits an escaped quote, and reopens.
pub fn shell_quote(arg: &str) -> String {
    if arg.is_empty() {
        return "''".to_string();
    }
    if arg.chars().all(is_safe_char) {
        return arg.to_string();
    }

    let mut out = String::with_capacity(arg.len() + 2);
    out.push('\'');
    for c in arg.chars() {
        if c == '\'' {
            out.push_str("'\\''");
        } else {
            out.push(c);
        }
    }
    out.push('\'');
    out
}

/// Single shell-safe command line from an argv.
pub fn shell_join(argv: &[String]) -> String {
    argv.iter()
        .map(|arg| shell_quote(arg))
        .collect::<Vec<_>>()
        .join(" ")
}
