use super::{Backend, BackendError};
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{info, warn};

const TABLE4_NAME: &str = "gerberos4";
const TABLE6_NAME: &str = "gerberos6";
const SET4_NAME: &str = "set4";
const SET6_NAME: &str = "set6";

async fn run(args: &[&str]) -> Result<(i32, String), BackendError> {
    let output = Command::new("nft").args(args).output().await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            BackendError::CommandNotFound("nft".to_string())
        } else {
            BackendError::Io(e)
        }
    })?;

    let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
    combined.push_str(&String::from_utf8_lossy(&output.stderr));
    Ok((output.status.code().unwrap_or(-1), combined))
}

/// Bans IPs by adding them (with a per-element timeout) to a `nft` set
/// bound to an `input` hook that drops matching traffic. Mirrors the ipset
/// backend's table/set naming and persistence convention.
pub struct NftBackend {
    save_file_path: Option<PathBuf>,
}

impl NftBackend {
    pub fn new(save_file_path: Option<PathBuf>) -> Self {
        NftBackend { save_file_path }
    }

    async fn delete_tables(&self) -> Result<(), BackendError> {
        for table in [format!("ip {TABLE4_NAME}"), format!("ip6 {TABLE6_NAME}")] {
            let args: Vec<&str> = ["delete", "table"].iter().copied().chain(table.split(' ')).collect();
            let (code, out) = run(&args).await?;
            if code != 0 && !out.contains("No such file or directory") {
                return Err(BackendError::Command {
                    action: format!("delete table {table}"),
                    detail: out,
                });
            }
        }
        Ok(())
    }

    async fn create_tables(&self) -> Result<(), BackendError> {
        let script = format!(
            "table ip {t4} {{ \
               set {s4} {{ type ipv4_addr; flags timeout; }} \
               chain input {{ type filter hook input priority 0; ip saddr @{s4} drop; }} \
             }} \
             table ip6 {t6} {{ \
               set {s6} {{ type ipv6_addr; flags timeout; }} \
               chain input {{ type filter hook input priority 0; ip6 saddr @{s6} drop; }} \
             }}",
            t4 = TABLE4_NAME,
            s4 = SET4_NAME,
            t6 = TABLE6_NAME,
            s6 = SET6_NAME,
        );

        let mut child = Command::new("nft")
            .arg("-f")
            .arg("-")
            .stdin(Stdio::piped())
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    BackendError::CommandNotFound("nft".to_string())
                } else {
                    BackendError::Io(e)
                }
            })?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(script.as_bytes()).await?;
        }
        let status = child.wait().await?;
        if !status.success() {
            return Err(BackendError::Command {
                action: "create nft tables".to_string(),
                detail: format!("exit status {status}"),
            });
        }
        Ok(())
    }

    async fn restore(&self, path: &PathBuf) -> Result<(), BackendError> {
        let contents = fs::read_to_string(path).await?;
        let mut child = Command::new("nft")
            .arg("-f")
            .arg("-")
            .stdin(Stdio::piped())
            .spawn()?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(contents.as_bytes()).await?;
        }
        let status = child.wait().await?;
        fs::remove_file(path).await.ok();
        if !status.success() {
            return Err(BackendError::Command {
                action: "restore nft ruleset".to_string(),
                detail: format!("exit status {status}"),
            });
        }
        Ok(())
    }

    async fn save(&self, path: &PathBuf) -> Result<(), BackendError> {
        let (_, out) = run(&["list", "table", "ip", TABLE4_NAME]).await?;
        let (_, out6) = run(&["list", "table", "ip6", TABLE6_NAME]).await?;
        fs::write(path, format!("{out}\n{out6}")).await?;
        Ok(())
    }
}

#[async_trait]
impl Backend for NftBackend {
    async fn initialize(&self) -> Result<(), BackendError> {
        let (code, out) = run(&["list", "tables"]).await?;
        if code != 0 {
            return Err(BackendError::InsufficientPrivileges(format!("nft: {out}")));
        }

        self.delete_tables().await?;

        match &self.save_file_path {
            Some(path) => match self.restore(path).await {
                Ok(()) => info!(path = %path.display(), "restored nft ruleset from save file"),
                Err(_) => self.create_tables().await?,
            },
            None => {
                warn!("not persisting nft ruleset: no save_file_path configured");
                self.create_tables().await?;
            }
        }

        Ok(())
    }

    async fn ban(&self, rule_name: &str, ip: &str, ipv6: bool, duration: Duration) -> Result<(), BackendError> {
        let (table, set) = if ipv6 {
            (format!("ip6 {TABLE6_NAME}"), SET6_NAME)
        } else {
            (format!("ip {TABLE4_NAME}"), SET4_NAME)
        };

        let element = format!("{ip} timeout {}s", duration.as_secs());
        let table_parts: Vec<&str> = table.split(' ').collect();
        let mut args = vec!["add", "element"];
        args.extend(table_parts);
        args.push(set);
        let element_arg = format!("{{ {element} }}");
        args.push(&element_arg);

        let (code, out) = run(&args).await?;
        if code != 0 {
            warn!(rule = %rule_name, ip = %ip, set = %set, error = %out, "failed to add ip to nft set");
        } else {
            info!(rule = %rule_name, ip = %ip, set = %set, timeout_seconds = duration.as_secs(), "added ip to nft set");
        }
        Ok(())
    }

    async fn finalize(&self) -> Result<(), BackendError> {
        if let Some(path) = &self.save_file_path {
            self.save(path).await?;
        }
        self.delete_tables().await
    }
}
