use crate::models::account::Account;
use anyhow::{bail, Context, Result};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// WAL operation types
#[derive(Debug, Clone, PartialEq)]
pub enum WalOperation {
    /// Full account record; a later line for the same id supersedes earlier ones
    PutAccount(Account),
}

fn hex_text(value: &str) -> String {
    hex::encode(value.as_bytes())
}

fn unhex_text(value: &str, field: &str) -> Result<String> {
    let bytes = hex::decode(value).context(format!("Invalid {} hex", field))?;
    String::from_utf8(bytes).context(format!("{} is not valid UTF-8", field))
}

fn flag(value: bool) -> &'static str {
    if value {
        "1"
    } else {
        "0"
    }
}

impl WalOperation {
    fn to_line(&self) -> String {
        match self {
            WalOperation::PutAccount(account) => {
                let last_login = account
                    .last_login
                    .map(|t| t.to_string())
                    .unwrap_or_else(|| "-".to_string());
                let last_read_critical = account
                    .last_read_critical
                    .map(|t| t.to_string())
                    .unwrap_or_else(|| "-".to_string());

                format!(
                    "PUT_ACCOUNT|{}|{}|{}|{}|{}|{}|{}|{}|{}|{}|{}",
                    account.user_id,
                    hex_text(&account.first_name),
                    hex_text(&account.last_name),
                    account.password_hash,
                    account.password_salt,
                    account.user_level,
                    hex_text(&account.user_title),
                    flag(account.agreed_to_tos),
                    flag(account.read_critical),
                    last_login,
                    last_read_critical,
                )
            }
        }
    }

    fn from_line(line: &str) -> Result<Self> {
        let parts: Vec<&str> = line.split('|').collect();

        match parts.first() {
            Some(&"PUT_ACCOUNT") => {
                // Lines written before the acknowledgment timestamp existed carry 11 fields
                if parts.len() != 11 && parts.len() != 12 {
                    bail!("Invalid PUT_ACCOUNT format");
                }
                let user_id = Uuid::parse_str(parts[1]).context("Invalid user ID")?;
                let first_name = unhex_text(parts[2], "first name")?;
                let last_name = unhex_text(parts[3], "last name")?;
                let password_hash = parts[4].to_string();
                let password_salt = parts[5].to_string();
                let user_level = parts[6].parse::<i32>().context("Invalid user level")?;
                let user_title = unhex_text(parts[7], "user title")?;
                let agreed_to_tos = parts[8] == "1";
                let read_critical = parts[9] == "1";
                let last_login = match parts[10] {
                    "-" => None,
                    raw => Some(raw.parse::<i64>().context("Invalid last login")?),
                };
                let last_read_critical = match parts.get(11) {
                    None | Some(&"-") => None,
                    Some(raw) => Some(
                        raw.parse::<i64>()
                            .context("Invalid critical notice timestamp")?,
                    ),
                };

                Ok(WalOperation::PutAccount(Account {
                    user_id,
                    first_name,
                    last_name,
                    password_hash,
                    password_salt,
                    user_level,
                    user_title,
                    agreed_to_tos,
                    read_critical,
                    last_read_critical,
                    last_login,
                }))
            }
            _ => bail!("Unknown operation type"),
        }
    }
}

/// Append-only account journal
pub struct Wal {
    file: Arc<Mutex<File>>,
    path: PathBuf,
}

impl Wal {
    pub fn new(path: PathBuf) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).context("Failed to create WAL directory")?;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .context("Failed to open WAL file")?;

        Ok(Wal {
            file: Arc::new(Mutex::new(file)),
            path,
        })
    }

    pub fn log_operation(&self, op: &WalOperation) -> Result<()> {
        let line = op.to_line();
        let mut file = self.file.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        writeln!(file, "{}", line).context("Failed to write to WAL")?;
        file.flush().context("Failed to flush WAL")?;
        Ok(())
    }

    pub fn replay(&self) -> Result<Vec<WalOperation>> {
        let file = File::open(&self.path).context("Failed to open WAL for replay")?;
        let reader = BufReader::new(file);
        let mut operations = Vec::new();

        for (line_num, line_result) in reader.lines().enumerate() {
            let line = line_result.context("Failed to read line from WAL")?;
            let line = line.trim();

            if line.is_empty() {
                continue;
            }

            match WalOperation::from_line(line) {
                Ok(op) => operations.push(op),
                Err(e) => {
                    tracing::warn!(
                        line_num = line_num + 1,
                        error = %e,
                        "Failed to parse WAL line, skipping"
                    );
                }
            }
        }

        Ok(operations)
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}
