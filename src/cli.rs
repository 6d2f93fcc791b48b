// ── Command-line front end ────────────────────────────────────────────────────
//
// Presentation only: parse flags, collect credentials, call the session and
// print what it reports.

use crate::config::{ConfigOverrides, InboxConfig};
use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use inbox_core::{preview, resolve_target_name, XmlValidator};
use inbox_sftp::sftp::{
    inbox_session_stats, inbox_test_connection, inbox_upload, ConflictPolicy, HostKeyPolicy,
    InboxError, TransferCredentials, UploadSession, UploadSessionState,
};
use secrecy::SecretString;
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

pub const ENV_USERNAME: &str = "XML_INBOX_USERNAME";
pub const ENV_PASSWORD: &str = "XML_INBOX_PASSWORD";

/// Characters of a validated document shown by `validate --preview`.
pub const PREVIEW_CHARS: usize = 1000;

#[derive(Parser, Debug)]
#[command(name = "xml-inbox")]
#[command(version, about = "Validate an XML document and drop it into the remote SFTP inbox")]
pub struct Cli {
    /// Config file (defaults to <config dir>/xml-inbox/config.json)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log filter, e.g. "info" or "inbox_sftp=debug" (falls back to RUST_LOG)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[arg(long, global = true)]
    pub host: Option<String>,

    #[arg(long, global = true)]
    pub port: Option<u16>,

    /// Remote inbox directory
    #[arg(long, global = true)]
    pub remote_dir: Option<String>,

    /// Connect-phase timeout in seconds
    #[arg(long, global = true)]
    pub timeout: Option<u64>,

    #[arg(long, global = true, value_enum)]
    pub host_key_policy: Option<HostKeyArg>,

    /// known_hosts file used with --host-key-policy known-hosts
    #[arg(long, global = true)]
    pub known_hosts: Option<PathBuf>,

    #[arg(long, global = true, value_enum)]
    pub on_conflict: Option<ConflictArg>,

    #[arg(long, short = 'u', global = true, env = ENV_USERNAME)]
    pub username: Option<String>,

    /// Read the password from the first line of stdin instead of XML_INBOX_PASSWORD
    #[arg(long, global = true)]
    pub password_stdin: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Open and close a connection to check host and credentials
    TestConnection,
    /// Check a file for XML well-formedness without connecting
    Validate {
        file: PathBuf,
        /// Also print the beginning of the document
        #[arg(long)]
        preview: bool,
    },
    /// Validate a file and place it in the remote inbox
    Upload {
        file: PathBuf,
        /// Remote file name (defaults to the local file name)
        #[arg(long)]
        name: Option<String>,
        /// Test the connection first and stop if it fails
        #[arg(long)]
        require_verified: bool,
    },
    /// Print the effective configuration as JSON
    ShowConfig,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum HostKeyArg {
    AcceptUnverified,
    KnownHosts,
}

impl From<HostKeyArg> for HostKeyPolicy {
    fn from(arg: HostKeyArg) -> Self {
        match arg {
            HostKeyArg::AcceptUnverified => HostKeyPolicy::AcceptUnverified,
            HostKeyArg::KnownHosts => HostKeyPolicy::KnownHosts,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ConflictArg {
    Overwrite,
    Reject,
}

impl From<ConflictArg> for ConflictPolicy {
    fn from(arg: ConflictArg) -> Self {
        match arg {
            ConflictArg::Overwrite => ConflictPolicy::Overwrite,
            ConflictArg::Reject => ConflictPolicy::Reject,
        }
    }
}

impl Cli {
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            host: self.host.clone(),
            port: self.port,
            remote_directory: self.remote_dir.clone(),
            connect_timeout_secs: self.timeout,
            host_key_policy: self.host_key_policy.map(Into::into),
            known_hosts_file: self.known_hosts.clone(),
            on_conflict: self.on_conflict.map(Into::into),
        }
    }

    fn credentials(&self, config: &InboxConfig) -> anyhow::Result<TransferCredentials> {
        let username = self
            .username
            .clone()
            .filter(|u| !u.trim().is_empty())
            .with_context(|| format!("a username is required (--username or {})", ENV_USERNAME))?;
        let secret = read_secret(self.password_stdin, std::io::stdin().lock())?;
        Ok(config.credentials(&username, secret))
    }
}

/// Password from stdin when asked, otherwise from `XML_INBOX_PASSWORD`.
pub fn read_secret(from_stdin: bool, mut input: impl BufRead) -> anyhow::Result<SecretString> {
    if from_stdin {
        let mut line = String::new();
        input.read_line(&mut line).context("cannot read password from stdin")?;
        let trimmed_len = line.trim_end_matches(['\r', '\n']).len();
        line.truncate(trimmed_len);
        if line.is_empty() {
            bail!("empty password on stdin");
        }
        return Ok(SecretString::new(line));
    }
    match std::env::var(ENV_PASSWORD) {
        Ok(pw) if !pw.is_empty() => Ok(SecretString::new(pw)),
        _ => bail!(
            "a password is required ({} or --password-stdin)",
            ENV_PASSWORD
        ),
    }
}

fn read_document(path: &Path) -> anyhow::Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("cannot read '{}'", path.display()))
}

fn kib(bytes: u64) -> f64 {
    bytes as f64 / 1024.0
}

fn exit_code(ok: bool) -> ExitCode {
    if ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

// ── Subcommands ──────────────────────────────────────────────────────────────

pub async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let config = InboxConfig::load(cli.config.as_deref(), &cli.overrides())?;
    tracing::debug!(?config, "Effective configuration");

    match &cli.command {
        Command::ShowConfig => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(ExitCode::SUCCESS)
        }
        Command::Validate { file, preview: show_preview } => {
            let content = read_document(file)?;
            let validation = XmlValidator::validate(&content);
            println!("{}", validation.detail);
            if validation.ok && *show_preview {
                println!("Size: {:.2} KiB", kib(content.len() as u64));
                println!("{}", preview(&content, PREVIEW_CHARS));
            }
            Ok(exit_code(validation.ok))
        }
        Command::TestConnection => {
            let creds = cli.credentials(&config)?;
            let state = session_state(&config);
            let response = inbox_test_connection(&state, creds).await.map_err(anyhow::Error::msg)?;
            println!("{}", response.message);
            Ok(exit_code(response.verified))
        }
        Command::Upload {
            file,
            name,
            require_verified,
        } => {
            let original = file
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            let target = match resolve_target_name(name.as_deref(), &original) {
                Ok(target) => target,
                Err(e) => {
                    println!("{}", InboxError::validation(e.to_string()).user_message());
                    return Ok(ExitCode::FAILURE);
                }
            };

            // Read once; these exact bytes are validated and sent.
            let content = read_document(file)?;
            let creds = cli.credentials(&config)?;
            let state = session_state(&config);

            if *require_verified {
                let test = inbox_test_connection(&state, creds.clone())
                    .await
                    .map_err(anyhow::Error::msg)?;
                if !test.verified {
                    println!("{}", test.message);
                    return Ok(ExitCode::FAILURE);
                }
            }

            let size = content.len() as u64;
            let response = inbox_upload(&state, creds, content, target)
                .await
                .map_err(anyhow::Error::msg)?;
            println!("{}", response.message);
            if response.success {
                let summary = inbox_session_stats(&state).await.map_err(anyhow::Error::msg)?;
                println!("Size: {:.2} KiB", kib(size));
                println!("Uploads this session: {}", summary.successful_uploads);
            }
            Ok(exit_code(response.success))
        }
    }
}

fn session_state(config: &InboxConfig) -> UploadSessionState {
    UploadSession::ssh(config.connect_options())
        .with_conflict_policy(config.on_conflict)
        .into_state()
}
