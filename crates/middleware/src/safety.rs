//! Pre-execution hook chain for the `Command` middleware: dangerous-command
//! blocker, network blocker, custom hooks. Priority runs 1-10, higher first,
//! and the first deny wins.
//!
//! The check itself is an allowlist short-circuit for plain commands with no
//! shell operators, then a case-insensitive substring scan over a denylist,
//! first match wins.

use std::sync::Arc;

pub trait CommandHook: Send + Sync {
    fn name(&self) -> &str;
    /// Higher runs first. Ties broken by registration order.
    fn priority(&self) -> u8;
    /// `Some(reason)` denies the command.
    fn check(&self, command: &str) -> Option<String>;
}

/// Ordered registry of pre-execution hooks, highest priority first.
pub struct HookChain {
    hooks: Vec<Arc<dyn CommandHook>>,
}

impl HookChain {
    pub fn new() -> Self {
        Self { hooks: Vec::new() }
    }

    pub fn register(&mut self, hook: Arc<dyn CommandHook>) -> &mut Self {
        self.hooks.push(hook);
        self.hooks.sort_by_key(|h| std::cmp::Reverse(h.priority()));
        self
    }

    /// Runs every hook in priority order; returns the first deny reason.
    pub fn check(&self, command: &str) -> Option<String> {
        self.hooks.iter().find_map(|h| h.check(command))
    }
}

impl Default for HookChain {
    fn default() -> Self {
        let mut chain = Self::new();
        chain.register(Arc::new(DangerousCommandHook));
        chain.register(Arc::new(NetworkBlockerHook { allow_network: true }));
        chain
    }
}

/// Blocks destructive/irrecoverable shell commands. Priority 10 (highest) —
/// this must run before any other hook gets a chance to allow the command.
pub struct DangerousCommandHook;

impl CommandHook for DangerousCommandHook {
    fn name(&self) -> &str {
        "dangerous_command"
    }

    fn priority(&self) -> u8 {
        10
    }

    fn check(&self, command: &str) -> Option<String> {
        check_dangerous(command).err()
    }
}

/// Blocks commands that reach out to the network, when the thread's policy
/// disables network access. Priority 5.
pub struct NetworkBlockerHook {
    pub allow_network: bool,
}

impl CommandHook for NetworkBlockerHook {
    fn name(&self) -> &str {
        "network_blocker"
    }

    fn priority(&self) -> u8 {
        5
    }

    fn check(&self, command: &str) -> Option<String> {
        if self.allow_network {
            return None;
        }
        let lower = command.to_lowercase();
        NETWORK_TOOLS
            .iter()
            .find(|tool| lower.contains(*tool))
            .map(|tool| format!("network access is disabled for this thread (matched: `{tool}`)"))
    }
}

const NETWORK_TOOLS: &[&str] = &["curl ", "wget ", "nc ", "ncat ", "ssh ", "scp ", "rsync "];

const ALLOWLIST_PREFIXES: &[&str] = &[
    "ls", "pwd", "echo", "cat", "head", "tail", "wc", "git log", "git status", "git diff", "git branch", "cargo check",
    "cargo test", "cargo clippy", "cargo build", "npm list", "npm info", "node --version", "rustc --version",
    "python --version", "python3 --version", "date", "whoami", "hostname", "uname", "find", "grep", "rg", "fd",
];

const DENYLIST: &[(&str, &str)] = &[
    ("rm -rf /", "Destructive: recursive forced removal from root or home"),
    ("rm -rf /*", "Destructive: recursive forced removal of all root children"),
    (":(){ :|:& };:", "Fork bomb: will exhaust system resources"),
    ("| sh", "Unsafe: piping content directly into sh"),
    ("| bash", "Unsafe: piping content directly into bash"),
    ("|sh", "Unsafe: piping content directly into sh (no space variant)"),
    ("|bash", "Unsafe: piping content directly into bash (no space variant)"),
    ("dd if=", "Destructive: raw disk I/O via dd"),
    ("mkfs", "Destructive: creates a new filesystem, wiping existing data"),
    ("> /dev/sda", "Destructive: writes directly to block device"),
    ("chmod 777 /", "Unsafe: world-writable permissions on root filesystem"),
    ("chown / ", "Unsafe: changing ownership of root filesystem"),
    ("chown -r /", "Unsafe: recursive chown from root"),
    ("shutdown", "Unsafe: shuts down the system"),
    ("reboot", "Unsafe: reboots the system"),
    ("halt", "Unsafe: halts the system"),
    ("poweroff", "Unsafe: powers off the system"),
    ("kill -9 1", "Unsafe: kills PID 1 (init/systemd)"),
    ("kill -9 -1", "Unsafe: sends SIGKILL to every process"),
    ("> /etc/", "Destructive: overwrites a file under /etc"),
    (">> /etc/", "Destructive: appends to a file under /etc"),
    ("import os; os.system", "Unsafe: Python os.system shell escape"),
    ("__import__('os')", "Unsafe: Python dynamic os import (shell escape pattern)"),
    ("sudo", "Blocked: sudo requires elevated permissions (not yet granted)"),
];

fn has_shell_operators(lower: &str) -> bool {
    lower.contains('|') || lower.contains('>') || lower.contains(';') || lower.contains("&&") || lower.contains("||")
        || lower.contains("$(") || lower.contains('`')
}

fn is_allowlisted(lower: &str) -> bool {
    ALLOWLIST_PREFIXES.iter().any(|prefix| lower.starts_with(prefix))
}

fn check_dangerous(command: &str) -> Result<(), String> {
    let trimmed = command.trim();
    let lower = trimmed.to_lowercase();

    if !has_shell_operators(&lower) && is_allowlisted(&lower) {
        return Ok(());
    }

    for (pattern, reason) in DENYLIST {
        if lower.contains(pattern) {
            return Err(format!("{reason} (matched pattern: `{pattern}`)"));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allowlisted_command_passes() {
        let chain = HookChain::default();
        assert!(chain.check("git status --short").is_none());
    }

    #[test]
    fn denylisted_command_is_blocked() {
        let chain = HookChain::default();
        let reason = chain.check("sudo apt-get install vim");
        assert!(reason.is_some());
        assert!(reason.unwrap().contains("sudo"));
    }

    #[test]
    fn shell_operator_defeats_allowlist_shortcut() {
        let chain = HookChain::default();
        assert!(chain.check("echo hi > /etc/cron.d/evil").is_some());
    }

    #[test]
    fn network_blocker_denies_when_disabled() {
        let mut chain = HookChain::new();
        chain.register(Arc::new(DangerousCommandHook));
        chain.register(Arc::new(NetworkBlockerHook { allow_network: false }));
        let reason = chain.check("curl https://example.com");
        assert!(reason.unwrap().contains("network"));
    }

    #[test]
    fn higher_priority_hook_runs_first() {
        // DangerousCommandHook (10) should catch `sudo curl ...` before the
        // NetworkBlockerHook (5) gets a chance, even though both would deny.
        let mut chain = HookChain::new();
        chain.register(Arc::new(NetworkBlockerHook { allow_network: false }));
        chain.register(Arc::new(DangerousCommandHook));
        let reason = chain.check("sudo curl https://example.com").unwrap();
        assert!(reason.contains("sudo"));
    }
}
