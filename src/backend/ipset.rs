use super::{Backend, BackendError};
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{info, warn};

const CHAIN_NAME: &str = "gerberos";
const SET4_NAME: &str = "gerberos4";
const SET6_NAME: &str = "gerberos6";

/// Runs `name args...`, returning its exit code and combined stdout text.
async fn run(name: &str, args: &[&str]) -> Result<(i32, String), BackendError> {
    let output = Command::new(name)
        .args(args)
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                BackendError::CommandNotFound(name.to_string())
            } else {
                BackendError::Io(e)
            }
        })?;

    let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
    combined.push_str(&String::from_utf8_lossy(&output.stderr));
    Ok((output.status.code().unwrap_or(-1), combined))
}

/// Bans IPs by adding them to a pair of ipsets (`gerberos4`/`gerberos6`) with
/// a per-element timeout, fronted by an `iptables`/`ip6tables` chain that
/// drops traffic from set members.
pub struct IpsetBackend {
    save_file_path: Option<PathBuf>,
}

impl IpsetBackend {
    pub fn new(save_file_path: Option<PathBuf>) -> Self {
        IpsetBackend { save_file_path }
    }

    async fn check_privileges(&self) -> Result<(), BackendError> {
        for (name, args) in [("ipset", vec!["list"]), ("iptables", vec!["-L"]), ("ip6tables", vec!["-L"])] {
            match run(name, &args).await {
                Ok((0, _)) => {}
                Ok(_) => return Err(BackendError::InsufficientPrivileges(name.to_string())),
                Err(BackendError::CommandNotFound(n)) => return Err(BackendError::CommandNotFound(n)),
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    async fn delete_ipsets_and_iptables_entries(&self) -> Result<(), BackendError> {
        let teardown: &[(&str, &[&str])] = &[
            (
                "iptables",
                &["-D", CHAIN_NAME, "-j", "DROP", "-m", "set", "--match-set", SET4_NAME, "src"],
            ),
            ("iptables", &["-D", "INPUT", "-j", CHAIN_NAME]),
            ("iptables", &["-X", CHAIN_NAME]),
            (
                "ip6tables",
                &["-D", CHAIN_NAME, "-j", "DROP", "-m", "set", "--match-set", SET6_NAME, "src"],
            ),
            ("ip6tables", &["-D", "INPUT", "-j", CHAIN_NAME]),
            ("ip6tables", &["-X", CHAIN_NAME]),
        ];
        for (name, args) in teardown {
            let (code, out) = run(name, args).await?;
            if code > 2 {
                return Err(BackendError::Command {
                    action: format!("tear down {name} {args:?}"),
                    detail: out,
                });
            }
        }

        for set in [SET4_NAME, SET6_NAME] {
            let (code, out) = run("ipset", &["destroy", set]).await?;
            if code > 1 {
                return Err(BackendError::Command {
                    action: format!("destroy ipset {set}"),
                    detail: out,
                });
            }
        }

        Ok(())
    }

    async fn create_ipsets(&self) -> Result<(), BackendError> {
        let (code, out) = run("ipset", &["create", SET4_NAME, "hash:ip", "timeout", "0"]).await?;
        if code != 0 {
            return Err(BackendError::Command {
                action: format!("create ipset {SET4_NAME}"),
                detail: out,
            });
        }

        let (code, out) = run(
            "ipset",
            &["create", SET6_NAME, "hash:ip", "family", "inet6", "timeout", "0"],
        )
        .await?;
        if code != 0 {
            return Err(BackendError::Command {
                action: format!("create ipset {SET6_NAME}"),
                detail: out,
            });
        }

        Ok(())
    }

    async fn create_iptables_entries(&self) -> Result<(), BackendError> {
        let setup: &[(&str, &[&str])] = &[
            ("iptables", &["-N", CHAIN_NAME]),
            (
                "iptables",
                &["-I", CHAIN_NAME, "-j", "DROP", "-m", "set", "--match-set", SET4_NAME, "src"],
            ),
            ("iptables", &["-I", "INPUT", "-j", CHAIN_NAME]),
            ("ip6tables", &["-N", CHAIN_NAME]),
            (
                "ip6tables",
                &["-I", CHAIN_NAME, "-j", "DROP", "-m", "set", "--match-set", SET6_NAME, "src"],
            ),
            ("ip6tables", &["-I", "INPUT", "-j", CHAIN_NAME]),
        ];
        for (name, args) in setup {
            let (code, out) = run(name, args).await?;
            if code != 0 {
                return Err(BackendError::Command {
                    action: format!("create {name} {args:?}"),
                    detail: out,
                });
            }
        }
        Ok(())
    }

    async fn restore_ipsets(&self, path: &PathBuf) -> Result<(), BackendError> {
        let contents = fs::read(path).await?;
        let mut child = Command::new("ipset")
            .arg("restore")
            .stdin(Stdio::piped())
            .spawn()?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(&contents).await?;
        }
        let status = child.wait().await?;
        fs::remove_file(path).await.ok();
        if !status.success() {
            return Err(BackendError::Command {
                action: "ipset restore".to_string(),
                detail: format!("exit status {status}"),
            });
        }
        Ok(())
    }

    async fn save_ipsets(&self, path: &PathBuf) -> Result<(), BackendError> {
        let output = Command::new("ipset").arg("save").output().await?;
        fs::write(path, &output.stdout).await?;
        Ok(())
    }
}

#[async_trait]
impl Backend for IpsetBackend {
    async fn initialize(&self) -> Result<(), BackendError> {
        self.check_privileges().await?;
        self.delete_ipsets_and_iptables_entries().await?;

        match &self.save_file_path {
            Some(path) => match self.restore_ipsets(path).await {
                Ok(()) => info!(path = %path.display(), "restored ipsets from save file"),
                Err(_) => self.create_ipsets().await?,
            },
            None => {
                warn!("not persisting ipsets: no save_file_path configured");
                self.create_ipsets().await?;
            }
        }

        self.create_iptables_entries().await
    }

    async fn ban(&self, rule_name: &str, ip: &str, ipv6: bool, duration: Duration) -> Result<(), BackendError> {
        let set = if ipv6 { SET6_NAME } else { SET4_NAME };
        let (code, _) = run("ipset", &["test", set, ip]).await?;
        if code == 0 {
            return Ok(());
        }

        let timeout = duration.as_secs().to_string();
        let (code, out) = run("ipset", &["add", set, ip, "timeout", &timeout]).await?;
        if code != 0 {
            warn!(rule = %rule_name, ip = %ip, set = %set, error = %out, "failed to add ip to ipset");
        } else {
            info!(rule = %rule_name, ip = %ip, set = %set, timeout_seconds = duration.as_secs(), "added ip to ipset");
        }
        Ok(())
    }

    async fn finalize(&self) -> Result<(), BackendError> {
        if let Some(path) = &self.save_file_path {
            self.save_ipsets(path).await?;
        }
        self.delete_ipsets_and_iptables_entries().await
    }
}
