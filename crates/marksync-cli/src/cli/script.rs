use anyhow::{Context, Result};
use serde::Deserialize;

fn default_device() -> String {
    "default".to_string()
}

fn default_user() -> String {
    "u1".to_string()
}

/// Picks a bookmark either by id or by position in a tab's visible list.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Target {
    #[serde(default)]
    pub id: Option<String>,
    /// Tab whose list `index` refers to (defaults to the step's own tab)
    #[serde(default)]
    pub from_tab: Option<String>,
    #[serde(default)]
    pub index: Option<usize>,
}

/// One line of a simulation script.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Step {
    /// Open a tab on a device, signed in as `user`
    Open {
        tab: String,
        #[serde(default = "default_device")]
        device: String,
        #[serde(default = "default_user")]
        user: String,
    },
    Add {
        tab: String,
        url: String,
        title: String,
    },
    Remove {
        tab: String,
        #[serde(flatten)]
        target: Target,
    },
    /// Write from a session the script doesn't model (another device)
    RemoteAdd {
        #[serde(default = "default_user")]
        user: String,
        url: String,
        title: String,
    },
    RemoteUpdate {
        #[serde(flatten)]
        target: Target,
        #[serde(default)]
        url: Option<String>,
        #[serde(default)]
        title: Option<String>,
    },
    RemoteDelete {
        #[serde(default = "default_user")]
        user: String,
        #[serde(flatten)]
        target: Target,
    },
    /// Feeds opened on this device from now on fail to subscribe
    FailFeed {
        #[serde(default = "default_device")]
        device: String,
        #[serde(default)]
        message: Option<String>,
    },
    /// Fail the next write against the backing store
    FailWrite { message: String },
    /// One event-loop turn in every open tab
    Sync,
    Close { tab: String },
}

/// Parse a JSON-lines script. Blank lines and `#` comments are skipped.
pub fn parse_script(text: &str) -> Result<Vec<(usize, Step)>> {
    let mut steps = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        let line_no = idx + 1;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let step: Step = serde_json::from_str(trimmed)
            .with_context(|| format!("Invalid step on line {}", line_no))?;
        steps.push((line_no, step));
    }
    Ok(steps)
}
