use std::{
    collections::HashSet,
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{domain::BotIdentity, errors::Error, Result};

/// Process-level settings. The bots themselves live in the bots file.
#[derive(Clone, Debug)]
pub struct Config {
    pub bots_file: PathBuf,
    pub storage_dir: PathBuf,
    /// Upper bound for stopping every worker.
    pub shutdown_timeout: Duration,
    /// Long-poll timeout for `getUpdates`.
    pub poll_timeout_secs: u32,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));
        Self::from_env()
    }

    fn from_env() -> Result<Self> {
        let bots_file = env_path("BOTS_FILE").unwrap_or_else(|| PathBuf::from("bots.json"));
        let storage_dir = env_path("STORAGE_DIR").unwrap_or_else(|| PathBuf::from("./storage"));

        let shutdown_timeout = Duration::from_secs(env_u64("SHUTDOWN_TIMEOUT_SECS").unwrap_or(75));
        if shutdown_timeout.is_zero() {
            return Err(Error::Config(
                "SHUTDOWN_TIMEOUT_SECS must be greater than zero".to_string(),
            ));
        }

        let poll_timeout_secs = env_u32("POLL_TIMEOUT_SECS").unwrap_or(30).min(50);

        Ok(Self {
            bots_file,
            storage_dir,
            shutdown_timeout,
            poll_timeout_secs,
        })
    }
}

/// Read and validate the bots file (a JSON array of identities).
pub fn load_bots(path: &Path) -> Result<Vec<BotIdentity>> {
    let raw = fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;
    parse_bots(&raw).map_err(|e| match e {
        Error::Config(msg) => Error::Config(format!("{}: {msg}", path.display())),
        other => other,
    })
}

fn parse_bots(raw: &str) -> Result<Vec<BotIdentity>> {
    let bots: Vec<BotIdentity> =
        serde_json::from_str(raw).map_err(|e| Error::Config(format!("invalid bots file: {e}")))?;

    let mut seen = HashSet::new();
    for bot in &bots {
        if bot.id.0.trim().is_empty() {
            return Err(Error::Config("bot with empty id".to_string()));
        }
        if !seen.insert(bot.id.clone()) {
            return Err(Error::Config(format!("duplicate bot id {}", bot.id)));
        }
        if bot.token.trim().is_empty() {
            return Err(Error::Config(format!("bot {} has an empty token", bot.id)));
        }
    }
    Ok(bots)
}

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }
        if env::var_os(key).is_some() {
            continue; // do not override existing env
        }

        env::set_var(key, unquote(v.trim()));
    }
}

fn unquote(val: &str) -> &str {
    if val.len() >= 2
        && ((val.starts_with('"') && val.ends_with('"'))
            || (val.starts_with('\'') && val.ends_with('\'')))
    {
        &val[1..val.len() - 1]
    } else {
        val
    }
}

fn env_u64(key: &str) -> Option<u64> {
    env_str(key).and_then(|s| s.trim().parse::<u64>().ok())
}

fn env_u32(key: &str) -> Option<u32> {
    env_str(key).and_then(|s| s.trim().parse::<u32>().ok())
}

fn env_path(key: &str) -> Option<PathBuf> {
    env_str(key)
        .filter(|s| !s.trim().is_empty())
        .map(PathBuf::from)
}
