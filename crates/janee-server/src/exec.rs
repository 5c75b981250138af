// SPDX-License-Identifier: MIT OR Apache-2.0
//! Exec-mode forwarding: run a whitelisted local binary with injected
//! credentials and scrub those credentials from everything it prints.

use janee_core::{CapabilityConfig, ResolvedSecrets};
use janee_error::JaneeError;
use regex::Regex;
use std::collections::BTreeMap;
use std::path::Path;
use std::process::Stdio;
use std::sync::LazyLock;
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tracing::warn;

/// Default exec timeout when the capability sets none.
pub const DEFAULT_EXEC_TIMEOUT_SECS: u64 = 30;

/// Default working directory for exec capabilities.
pub const DEFAULT_WORK_DIR: &str = "/tmp/janee-exec";

/// Secrets shorter than this are not scrubbed (too likely to collide with
/// ordinary output).
const MIN_SCRUB_LEN: usize = 8;

/// Shell metacharacters rejected in every argv element.
static METACHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[;&|`$(){}\\<>]").expect("metachar class compiles"));

/// Captured result of one exec dispatch.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecOutcome {
    /// Scrubbed stdout.
    pub stdout: String,
    /// Scrubbed stderr.
    pub stderr: String,
    /// Child exit code (127 when the binary could not be spawned, -1 after
    /// a timeout kill).
    pub exit_code: i32,
    /// Wall-clock execution time in milliseconds.
    pub execution_time_ms: u64,
    /// The child was killed for exceeding its timeout.
    pub timed_out: bool,
}

/// Validate a command line against the capability whitelist and the shell
/// metacharacter filter.
pub fn validate_command(command: &[String], allow_commands: &[String]) -> Result<(), JaneeError> {
    let Some(program) = command.first() else {
        return Err(JaneeError::security("empty command"));
    };

    let basename = Path::new(program)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(program);
    if !allow_commands.iter().any(|allowed| allowed == basename) {
        return Err(JaneeError::security(format!(
            "command '{basename}' is not in the capability's allowCommands"
        )));
    }

    for arg in command {
        if METACHARS.is_match(arg) {
            return Err(JaneeError::security(format!(
                "argument contains shell metacharacters: '{arg}'"
            )));
        }
    }
    Ok(())
}

/// Render the capability's environment template against resolved secrets.
///
/// Recognised placeholders: `{{credential}}`, `{{apiKey}}`, `{{apiSecret}}`,
/// `{{passphrase}}`. Unknown placeholders pass through untouched.
pub fn render_env(
    template: &BTreeMap<String, String>,
    secrets: &ResolvedSecrets,
) -> BTreeMap<String, String> {
    let substitutions: [(&str, Option<&String>); 4] = [
        ("{{credential}}", secrets.credential.as_ref()),
        ("{{apiKey}}", secrets.api_key.as_ref()),
        ("{{apiSecret}}", secrets.api_secret.as_ref()),
        ("{{passphrase}}", secrets.passphrase.as_ref()),
    ];

    template
        .iter()
        .map(|(name, value)| {
            let mut rendered = value.clone();
            for (placeholder, secret) in &substitutions {
                if let Some(secret) = secret {
                    rendered = rendered.replace(placeholder, secret);
                }
            }
            (name.clone(), rendered)
        })
        .collect()
}

/// Replace every injected credential of length ≥ 8 with `[REDACTED]`.
pub fn scrub(text: &str, secrets: &ResolvedSecrets) -> String {
    let mut out = text.to_string();
    for secret in secrets.ordered() {
        if secret.len() >= MIN_SCRUB_LEN {
            out = out.replace(secret, "[REDACTED]");
        }
    }
    out
}

/// Spawn the command with the capability's environment and capture its
/// output.
///
/// The parent environment is inherited, the rendered template overlaid, and
/// `HISTFILE`/`LESSHISTFILE` pointed at `/dev/null`. No shell is involved.
/// Scrubbing is applied to whatever was captured, on every path including
/// spawn failure and timeout.
pub async fn run(
    capability: &CapabilityConfig,
    secrets: &ResolvedSecrets,
    command: &[String],
    stdin: Option<&str>,
) -> Result<ExecOutcome, JaneeError> {
    let Some(program) = command.first() else {
        return Err(JaneeError::security("empty command"));
    };

    let work_dir = capability
        .work_dir
        .clone()
        .unwrap_or_else(|| DEFAULT_WORK_DIR.to_string());
    tokio::fs::create_dir_all(&work_dir)
        .await
        .map_err(|err| JaneeError::upstream("failed to create exec work dir").with_source(err))?;

    let timeout = Duration::from_secs(capability.timeout.unwrap_or(DEFAULT_EXEC_TIMEOUT_SECS));
    let started = Instant::now();

    let mut cmd = Command::new(program);
    cmd.args(&command[1..])
        .current_dir(&work_dir)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .env("HISTFILE", "/dev/null")
        .env("LESSHISTFILE", "/dev/null");
    for (name, value) in render_env(&capability.env, secrets) {
        cmd.env(name, value);
    }

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(err) => {
            // Binary not found (or not executable): surfaced inside the
            // response, not as a dispatch failure.
            return Ok(ExecOutcome {
                stdout: String::new(),
                stderr: scrub(&format!("Failed to execute command: {err}"), secrets),
                exit_code: 127,
                execution_time_ms: started.elapsed().as_millis() as u64,
                timed_out: false,
            });
        }
    };

    if let Some(input) = stdin
        && let Some(mut handle) = child.stdin.take()
    {
        let buf = input.as_bytes().to_vec();
        // Close stdin after writing so the child sees EOF.
        tokio::spawn(async move {
            let _ = handle.write_all(&buf).await;
            let _ = handle.shutdown().await;
        });
    } else {
        drop(child.stdin.take());
    }

    let mut stdout_pipe = child.stdout.take();
    let mut stderr_pipe = child.stderr.take();
    let stdout_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        if let Some(pipe) = stdout_pipe.as_mut() {
            let _ = pipe.read_to_end(&mut buf).await;
        }
        buf
    });
    let stderr_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        if let Some(pipe) = stderr_pipe.as_mut() {
            let _ = pipe.read_to_end(&mut buf).await;
        }
        buf
    });

    let (exit_code, timed_out) = match tokio::time::timeout(timeout, child.wait()).await {
        Ok(Ok(status)) => (status.code().unwrap_or(-1), false),
        Ok(Err(err)) => {
            return Err(JaneeError::upstream("failed to wait for child").with_source(err));
        }
        Err(_) => {
            warn!(command = %command.join(" "), "exec timed out, killing child");
            let _ = child.kill().await;
            let _ = child.wait().await;
            (-1, true)
        }
    };

    let stdout_bytes = stdout_task.await.unwrap_or_default();
    let stderr_bytes = stderr_task.await.unwrap_or_default();

    Ok(ExecOutcome {
        stdout: scrub(&String::from_utf8_lossy(&stdout_bytes), secrets),
        stderr: scrub(&String::from_utf8_lossy(&stderr_bytes), secrets),
        exit_code,
        execution_time_ms: started.elapsed().as_millis() as u64,
        timed_out,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use janee_core::CapabilityMode;

    fn exec_capability(allow: &[&str]) -> CapabilityConfig {
        CapabilityConfig {
            service: "svc".into(),
            ttl: "5m".into(),
            auto_approve: false,
            requires_reason: false,
            rules: None,
            mode: CapabilityMode::Exec,
            allow_commands: allow.iter().map(|s| s.to_string()).collect(),
            env: BTreeMap::new(),
            work_dir: None,
            timeout: None,
        }
    }

    fn secrets_with(credential: &str) -> ResolvedSecrets {
        ResolvedSecrets {
            credential: Some(credential.to_string()),
            ..ResolvedSecrets::default()
        }
    }

    fn args(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn whitelist_accepts_by_basename() {
        validate_command(&args(&["gh", "issue", "list"]), &["gh".into()]).unwrap();
        validate_command(&args(&["/usr/bin/gh", "issue", "list"]), &["gh".into()]).unwrap();
    }

    #[test]
    fn whitelist_rejects_unlisted_commands() {
        let err = validate_command(&args(&["rm", "-rf", "/"]), &["gh".into()]).unwrap_err();
        assert_eq!(err.code, janee_error::ErrorCode::Security);
        assert!(err.message.contains("rm"));
    }

    #[test]
    fn metacharacters_are_rejected_in_any_argument() {
        for bad in [
            "$(whoami)",
            "a;b",
            "a|b",
            "a&b",
            "`id`",
            "a>out",
            "a<in",
            "{x}",
            "(y)",
            "back\\slash",
        ] {
            let err =
                validate_command(&args(&["gh", "issue", bad]), &["gh".into()]).unwrap_err();
            assert_eq!(err.code, janee_error::ErrorCode::Security, "{bad}");
        }
    }

    #[test]
    fn empty_command_is_rejected() {
        assert!(validate_command(&[], &["gh".into()]).is_err());
    }

    #[test]
    fn env_template_substitution() {
        let mut template = BTreeMap::new();
        template.insert("GH_TOKEN".to_string(), "{{credential}}".to_string());
        template.insert("COMPOSITE".to_string(), "key={{apiKey}}:sec={{apiSecret}}".to_string());
        template.insert("PLAIN".to_string(), "untouched".to_string());

        let secrets = ResolvedSecrets {
            credential: Some("tok-123".into()),
            api_key: Some("AK".into()),
            api_secret: Some("AS".into()),
            ..ResolvedSecrets::default()
        };
        let rendered = render_env(&template, &secrets);
        assert_eq!(rendered["GH_TOKEN"], "tok-123");
        assert_eq!(rendered["COMPOSITE"], "key=AK:sec=AS");
        assert_eq!(rendered["PLAIN"], "untouched");
    }

    #[test]
    fn unknown_placeholders_pass_through() {
        let mut template = BTreeMap::new();
        template.insert("X".to_string(), "{{mystery}}".to_string());
        let rendered = render_env(&template, &ResolvedSecrets::default());
        assert_eq!(rendered["X"], "{{mystery}}");
    }

    #[test]
    fn scrub_redacts_long_secrets_only() {
        let secrets = ResolvedSecrets {
            credential: Some("super-secret-token".into()),
            api_key: Some("short".into()), // < 8 chars, left alone
            ..ResolvedSecrets::default()
        };
        let scrubbed = scrub("token=super-secret-token key=short", &secrets);
        assert_eq!(scrubbed, "token=[REDACTED] key=short");
    }

    #[test]
    fn scrub_handles_repeats() {
        let secrets = secrets_with("aaaaaaaaaa");
        let scrubbed = scrub("aaaaaaaaaa and aaaaaaaaaa", &secrets);
        assert_eq!(scrubbed, "[REDACTED] and [REDACTED]");
    }

    #[tokio::test]
    async fn runs_whitelisted_command_and_scrubs_env_leak() {
        let mut capability = exec_capability(&["env"]);
        capability
            .env
            .insert("INJECTED_TOKEN".to_string(), "{{credential}}".to_string());
        let secrets = secrets_with("leak-me-please-1234");

        let outcome = run(&capability, &secrets, &args(&["env"]), None)
            .await
            .unwrap();
        assert_eq!(outcome.exit_code, 0);
        assert!(outcome.stdout.contains("INJECTED_TOKEN=[REDACTED]"));
        assert!(!outcome.stdout.contains("leak-me-please-1234"));
        assert!(outcome.stdout.contains("HISTFILE=/dev/null"));
    }

    #[tokio::test]
    async fn captures_stdin() {
        let capability = exec_capability(&["cat"]);
        let outcome = run(
            &capability,
            &ResolvedSecrets::default(),
            &args(&["cat"]),
            Some("piped input"),
        )
        .await
        .unwrap();
        assert_eq!(outcome.exit_code, 0);
        assert_eq!(outcome.stdout, "piped input");
    }

    #[tokio::test]
    async fn missing_binary_yields_127() {
        let capability = exec_capability(&["definitely-not-a-binary"]);
        let outcome = run(
            &capability,
            &ResolvedSecrets::default(),
            &args(&["definitely-not-a-binary"]),
            None,
        )
        .await
        .unwrap();
        assert_eq!(outcome.exit_code, 127);
        assert!(outcome.stderr.starts_with("Failed to execute command:"));
    }

    #[tokio::test]
    async fn timeout_kills_the_child() {
        let mut capability = exec_capability(&["sleep"]);
        capability.timeout = Some(1);
        let started = Instant::now();
        let outcome = run(
            &capability,
            &ResolvedSecrets::default(),
            &args(&["sleep", "30"]),
            None,
        )
        .await
        .unwrap();
        assert!(outcome.timed_out);
        assert_ne!(outcome.exit_code, 0, "timeout path reports non-zero");
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn nonzero_exit_codes_propagate() {
        let capability = exec_capability(&["false"]);
        let outcome = run(
            &capability,
            &ResolvedSecrets::default(),
            &args(&["false"]),
            None,
        )
        .await
        .unwrap();
        assert_eq!(outcome.exit_code, 1);
    }

    #[tokio::test]
    async fn work_dir_is_respected() {
        let tmp = tempfile::tempdir().unwrap();
        let mut capability = exec_capability(&["pwd"]);
        capability.work_dir = Some(tmp.path().to_string_lossy().into_owned());
        let outcome = run(
            &capability,
            &ResolvedSecrets::default(),
            &args(&["pwd"]),
            None,
        )
        .await
        .unwrap();
        assert_eq!(outcome.stdout.trim(), tmp.path().to_string_lossy());
    }
}
