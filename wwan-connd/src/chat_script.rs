//! Renders the `chat` dial script and the privileged `pppd` wrapper.

use crate::config::{DialConfig, DnsPolicy, IpVersion, OperatorSelector};
use std::{
    fmt::Write as _,
    io::{self, ErrorKind},
    os::unix::fs::PermissionsExt as _,
    path::{Path, PathBuf},
};
use tokio::{fs, io::AsyncWriteExt as _};
use tracing::{debug, warn};

pub const CHAT_BIN: &str = "/usr/sbin/chat";
pub const PPPD_BIN: &str = "/usr/sbin/pppd";
pub const CHAT_SCRIPT_NAME: &str = "chat-connect-wwan";
pub const WRAPPER_NAME: &str = "run-pppd.sh";

const SCRIPT_MODE: u32 = 0o755;

/// Where the rendered scripts live on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptPaths {
    pub chat: PathBuf,
    pub wrapper: PathBuf,
}

impl ScriptPaths {
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            chat: dir.join(CHAT_SCRIPT_NAME),
            wrapper: dir.join(WRAPPER_NAME),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialScripts {
    pub chat_script: String,
    /// Arguments to `pppd`, unquoted.
    pub dialer_args: Vec<String>,
    pub wrapper: String,
}

pub fn build(cfg: &DialConfig, paths: &ScriptPaths) -> DialScripts {
    let chat_script = chat_script(cfg);
    let dialer_args = dialer_args(cfg, paths);
    let wrapper = wrapper(&dialer_args);

    DialScripts {
        chat_script,
        dialer_args,
        wrapper,
    }
}

fn chat_script(cfg: &DialConfig) -> String {
    let mut lines = vec![
        r#"ABORT "BUSY""#.to_owned(),
        r#"ABORT "NO CARRIER""#.to_owned(),
        r#"ABORT "ERROR""#.to_owned(),
        "'' ATZ".to_owned(),
    ];

    if !cfg.pin.is_empty() {
        lines.push(format!(r#"OK AT+CPIN="{}""#, cfg.pin));
    }

    lines.push(match &cfg.operator {
        OperatorSelector::Auto => "OK AT+COPS=0".to_owned(),
        OperatorSelector::Numeric(id) => format!(r#"OK AT+COPS=1,2,"{id}""#),
    });

    lines.push(format!(
        r#"OK AT+CGDCONT=1,"{}","{}""#,
        cfg.ip_version.pdp_type(),
        cfg.apn
    ));
    lines.push("OK ATD*99#".to_owned());
    lines.push("CONNECT ''".to_owned());

    let mut script = lines.join("\n");
    script.push('\n');

    script
}

fn dialer_args(cfg: &DialConfig, paths: &ScriptPaths) -> Vec<String> {
    let mut args = vec![
        cfg.ppp_port.display().to_string(),
        cfg.baud.to_string(),
        "debug".to_owned(),
        "nodetach".to_owned(),
    ];

    match cfg.dns {
        DnsPolicy::Peer => args.push("usepeerdns".to_owned()),
        DnsPolicy::Explicit { primary, secondary } => {
            args.extend([
                "ms-dns".to_owned(),
                primary.to_string(),
                "ms-dns".to_owned(),
                secondary.to_string(),
            ]);
        }
    }

    if cfg.ip_version.wants_ipv6() {
        args.extend(["+ipv6".to_owned(), "ipv6cp-use-ipaddr".to_owned()]);
    }

    if cfg.ip_version == IpVersion::IPv6 {
        args.push("noip".to_owned());
    }

    args.push("connect".to_owned());
    args.push(format!("{CHAT_BIN} -v -f {}", paths.chat.display()));

    args
}

/// The credential is fed to `sudo -S` over stdin, it never appears in here.
fn wrapper(dialer_args: &[String]) -> String {
    let mut script = String::from("#!/bin/bash\n");
    let _ = write!(script, "exec sudo -S -p '' {PPPD_BIN}");

    for arg in dialer_args {
        script.push(' ');
        script.push_str(&shell_quote(arg));
    }
    script.push('\n');

    script
}

/// Single-quotes `arg` for bash unless it is made of characters bash leaves alone.
fn shell_quote(arg: &str) -> String {
    let plain = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "+-./:=@_,%".contains(c));

    if plain {
        arg.to_owned()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}

pub async fn write(scripts: &DialScripts, paths: &ScriptPaths) -> io::Result<()> {
    write_executable(&paths.chat, &scripts.chat_script).await?;
    write_executable(&paths.wrapper, &scripts.wrapper).await?;
    debug!(
        "wrote {} and {}",
        paths.chat.display(),
        paths.wrapper.display()
    );

    Ok(())
}

/// Removes both scripts. Missing files are fine.
pub async fn remove(paths: &ScriptPaths) {
    for path in [&paths.chat, &paths.wrapper] {
        if let Err(e) = remove_if_exists(path).await {
            warn!(error = ?e, "failed to remove {}", path.display());
        }
    }
}

async fn remove_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path).await {
        Err(e) if e.kind() != ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

// Stale files (or symlinks planted in a shared tmp dir) are replaced, never written
// through.
async fn write_executable(path: &Path, contents: &str) -> io::Result<()> {
    remove_if_exists(path).await?;

    let mut file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(SCRIPT_MODE)
        .open(path)
        .await?;
    file.write_all(contents.as_bytes()).await?;
    file.flush().await?;

    // umask may have stripped bits
    fs::set_permissions(path, std::fs::Permissions::from_mode(SCRIPT_MODE)).await
}
