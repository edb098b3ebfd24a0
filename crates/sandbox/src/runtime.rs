use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::error::Result;
use crate::lease::SandboxLease;
use crate::terminal::AbstractTerminal;
use crate::types::{ExecOutcome, TerminalState};

const CWD_MARKER: &str = "__agentcore_cwd_marker__";
const ENV_MARKER: &str = "__agentcore_env_marker__";

/// Which physical surface a [`PhysicalTerminalRuntime`] executes against.
pub enum RuntimeKind {
    /// Runs a shell process on the host.
    Local,
    /// Delegates to the lease's provider.
    RemoteWrapped,
}

/// Ephemeral execution surface that hydrates state onto a live instance,
/// executes, and writes the resulting state back.
///
/// Not persisted — constructed fresh by `SandboxManager` for each
/// `ChatSession` activation and dropped on close.
pub struct PhysicalTerminalRuntime {
    pub kind: RuntimeKind,
    terminal: AbstractTerminal,
    lease: Arc<SandboxLease>,
    hydrated: bool,
    timeout: Duration,
}

impl PhysicalTerminalRuntime {
    pub fn new(kind: RuntimeKind, terminal: AbstractTerminal, lease: Arc<SandboxLease>, timeout: Duration) -> Self {
        Self { kind, terminal, lease, hydrated: false, timeout }
    }

    /// Run `cmd`, re-hydrating remote sessions on first use, and persist the
    /// resulting (cwd, env) delta back onto the `AbstractTerminal`.
    pub async fn exec(&mut self, cmd: &str) -> Result<ExecOutcome> {
        let state = self.terminal.get_state()?;
        let instance = self.lease.ensure_active_instance().await?;

        let wrapped = match self.kind {
            RuntimeKind::Local => wrap_with_probes(cmd, None),
            RuntimeKind::RemoteWrapped if !self.hydrated => {
                self.hydrated = true;
                wrap_with_probes(cmd, Some(&state))
            }
            RuntimeKind::RemoteWrapped => wrap_with_probes(cmd, None),
        };

        let outcome = self
            .lease
            .provider
            .exec(&instance.instance_id, &wrapped, &state.cwd, &state.env_delta, self.timeout)
            .await?;

        let (stdout, new_state) = extract_probes(&outcome.stdout, &state);
        self.terminal.update_state(new_state).await?;

        Ok(ExecOutcome { exit_code: outcome.exit_code, stdout, stderr: outcome.stderr })
    }
}

/// Wraps `cmd` so the child shell reports its resulting cwd and any newly
/// exported variables after running. When `hydrate_from` is set, the
/// terminal's persisted (cwd, env) is re-applied before the command runs —
/// used on a `RemoteWrapped` runtime's first execution after construction,
/// since the provider session otherwise starts from a clean shell.
fn wrap_with_probes(cmd: &str, hydrate_from: Option<&TerminalState>) -> String {
    let hydrate = hydrate_from
        .map(|state| {
            let exports: String =
                state.env_delta.iter().map(|(k, v)| format!("export {k}={v}; ")).collect();
            format!("cd '{}' 2>/dev/null; {exports}", state.cwd)
        })
        .unwrap_or_default();

    format!(
        "{hydrate}{{ {cmd} \n}}; __agentcore_status=$?; echo \"{CWD_MARKER}$(pwd)\"; echo \"{ENV_MARKER}$(export -p)\"; exit $__agentcore_status"
    )
}

/// Strips the probe lines back out of stdout and returns the clean output
/// plus an updated `TerminalState` derived from them.
fn extract_probes(stdout: &str, previous: &TerminalState) -> (String, TerminalState) {
    let mut cwd = previous.cwd.clone();
    let mut env_delta = previous.env_delta.clone();
    let mut output_lines = Vec::new();

    for line in stdout.lines() {
        if let Some(rest) = line.strip_prefix(CWD_MARKER) {
            cwd = rest.trim().to_string();
        } else if let Some(rest) = line.strip_prefix(ENV_MARKER) {
            for (key, value) in parse_export_line(rest) {
                env_delta.insert(key, value);
            }
        } else {
            output_lines.push(line);
        }
    }

    let clean_output = output_lines.join("\n");
    (clean_output, TerminalState { cwd, env_delta, version: previous.version })
}

/// Parses a (single-line, space-joined) `export -p` dump of the form
/// `declare -x KEY="value" declare -x OTHER="value"` into key/value pairs.
fn parse_export_line(rest: &str) -> Vec<(String, String)> {
    rest.split("declare -x ")
        .filter_map(|entry| {
            let entry = entry.trim();
            if entry.is_empty() {
                return None;
            }
            let (key, value) = entry.split_once('=')?;
            let value = value.trim_matches('"').to_string();
            Some((key.to_string(), value))
        })
        .collect()
}
