//! Scripted multi-tab, multi-device runs against an in-memory backing store.
//!
//! Tabs on the same device share a relay hub; every tab shares the one
//! backing store, so writes reach other devices through the change feed.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use marksync_core::backend::{BookmarkBackend, MemoryBackend};
use marksync_core::change_feed::FeedState;
use marksync_core::relay::RelayHub;
use marksync_core::stats::StatsSummary;
use marksync_core::{Bookmark, NewBookmark, SyncConfig, SyncSession};
use serde::Serialize;
use tracing::{debug, info};

use super::script::{Step, Target};

const DEFAULT_FEED_FAILURE: &str = "table is not part of the realtime publication";

#[derive(Default)]
struct Device {
    hub: RelayHub,
    feed_failure: Option<String>,
}

struct Tab {
    device: String,
    session: SyncSession,
}

pub struct Simulation {
    config: SyncConfig,
    backend: MemoryBackend,
    devices: HashMap<String, Device>,
    tabs: BTreeMap<String, Tab>,
    steps_run: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TabReport {
    pub tab: String,
    pub device: String,
    pub bookmarks: Vec<Bookmark>,
    pub last_error: String,
    pub feed_state: String,
    pub diagnostics: Vec<String>,
    pub stats: StatsSummary,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationReport {
    pub steps: usize,
    pub stored_rows: usize,
    pub tabs: Vec<TabReport>,
}

fn feed_state_label(state: Option<&FeedState>) -> String {
    match state {
        Some(FeedState::Connecting) => "connecting".to_string(),
        Some(FeedState::Subscribed) => "subscribed".to_string(),
        Some(FeedState::Errored(message)) => format!("error: {}", message),
        Some(FeedState::Closed) | None => "closed".to_string(),
    }
}

impl Simulation {
    pub fn new(config: SyncConfig) -> Self {
        Self {
            config,
            backend: MemoryBackend::new(),
            devices: HashMap::new(),
            tabs: BTreeMap::new(),
            steps_run: 0,
        }
    }

    /// Run every step in order. Failed user mutations are not fatal; they
    /// end up in the tab's error slot. Script mistakes are.
    pub async fn run(&mut self, steps: &[(usize, Step)]) -> Result<()> {
        for (line, step) in steps {
            self.step(step)
                .await
                .with_context(|| format!("Step on line {} failed", line))?;
            self.steps_run += 1;
        }
        Ok(())
    }

    pub async fn step(&mut self, step: &Step) -> Result<()> {
        debug!(?step, "running step");
        match step {
            Step::Open { tab, device, user } => {
                if self.tabs.contains_key(tab) {
                    bail!("tab {} is already open", tab);
                }
                let dev = self.devices.entry(device.clone()).or_default();
                let mut client = self.backend.client(user);
                if let Some(message) = &dev.feed_failure {
                    client = client.with_feed_failure(message);
                }
                let session = SyncSession::activate(self.config.clone(), Arc::new(client), &dev.hub).await;
                info!(tab = %tab, device = %device, "tab opened");
                self.tabs.insert(
                    tab.clone(),
                    Tab {
                        device: device.clone(),
                        session,
                    },
                );
            }
            Step::Add { tab, url, title } => {
                // A rejected add is reported through the tab's error slot
                let _ = self.tab_mut(tab)?.session.add_bookmark(url, title).await;
            }
            Step::Remove { tab, target } => {
                let id = self.resolve(target, Some(tab))?;
                let _ = self.tab_mut(tab)?.session.remove_bookmark(&id).await;
            }
            Step::RemoteAdd { user, url, title } => {
                self.backend
                    .client(user)
                    .insert(NewBookmark {
                        user_id: user.clone(),
                        url: url.clone(),
                        title: title.clone(),
                    })
                    .await?;
            }
            Step::RemoteUpdate { target, url, title } => {
                let id = self.resolve(target, None)?;
                self.backend
                    .update_row(&id, url.as_deref(), title.as_deref())?;
            }
            Step::RemoteDelete { user, target } => {
                let id = self.resolve(target, None)?;
                self.backend.client(user).delete(user, &id).await?;
            }
            Step::FailFeed { device, message } => {
                self.devices.entry(device.clone()).or_default().feed_failure =
                    Some(message.clone().unwrap_or_else(|| DEFAULT_FEED_FAILURE.to_string()));
            }
            Step::FailWrite { message } => {
                self.backend.fail_next_write(message);
            }
            Step::Sync => {
                for (name, tab) in self.tabs.iter_mut() {
                    let applied = tab.session.process_pending();
                    debug!(tab = %name, applied, "event loop turn");
                }
            }
            Step::Close { tab } => {
                let mut closed = self
                    .tabs
                    .remove(tab)
                    .ok_or_else(|| anyhow!("no open tab named {}", tab))?;
                closed.session.deactivate();
                info!(tab = %tab, "tab closed");
            }
        }
        Ok(())
    }

    fn tab_mut(&mut self, name: &str) -> Result<&mut Tab> {
        self.tabs
            .get_mut(name)
            .ok_or_else(|| anyhow!("no open tab named {}", name))
    }

    fn resolve(&self, target: &Target, own_tab: Option<&String>) -> Result<String> {
        if let Some(id) = &target.id {
            return Ok(id.clone());
        }
        let index = target
            .index
            .ok_or_else(|| anyhow!("step needs either an id or an index"))?;
        let tab_name = target
            .from_tab
            .as_ref()
            .or(own_tab)
            .ok_or_else(|| anyhow!("index given without a tab to read it from"))?;
        let tab = self
            .tabs
            .get(tab_name)
            .ok_or_else(|| anyhow!("no open tab named {}", tab_name))?;
        tab.session
            .snapshot()
            .get(index)
            .map(|b| b.id.clone())
            .ok_or_else(|| anyhow!("tab {} has no bookmark at index {}", tab_name, index))
    }

    pub fn report(&self) -> SimulationReport {
        let tabs = self
            .tabs
            .iter()
            .map(|(name, tab)| TabReport {
                tab: name.clone(),
                device: tab.device.clone(),
                bookmarks: tab.session.snapshot().to_vec(),
                last_error: tab.session.last_error().to_string(),
                feed_state: feed_state_label(tab.session.feed_state()),
                diagnostics: tab
                    .session
                    .diagnostics()
                    .iter()
                    .map(|e| e.to_string())
                    .collect(),
                stats: tab.session.stats().snapshot().summary(),
            })
            .collect();

        SimulationReport {
            steps: self.steps_run,
            stored_rows: self.backend.row_count(),
            tabs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::script::parse_script;

    async fn run_script(text: &str) -> SimulationReport {
        let steps = parse_script(text).unwrap();
        let mut sim = Simulation::new(SyncConfig::default());
        sim.run(&steps).await.unwrap();
        sim.report()
    }

    fn titles(tab: &TabReport) -> Vec<&str> {
        tab.bookmarks.iter().map(|b| b.title.as_str()).collect()
    }

    #[tokio::test]
    async fn test_tabs_on_one_device_converge() {
        let report = run_script(
            r#"
{"op":"open","tab":"a","device":"laptop"}
{"op":"open","tab":"b","device":"laptop"}
{"op":"add","tab":"a","url":"https://two","title":"Two"}
{"op":"add","tab":"b","url":"https://three","title":"Three"}
{"op":"sync"}
"#,
        )
        .await;

        assert_eq!(report.stored_rows, 2);
        for tab in &report.tabs {
            assert_eq!(tab.bookmarks.len(), 2);
            assert_eq!(tab.feed_state, "subscribed");
        }
        assert_eq!(titles(&report.tabs[0]), vec!["Three", "Two"]);
    }

    #[tokio::test]
    async fn test_remote_device_changes() {
        let report = run_script(
            r#"
{"op":"open","tab":"a","device":"laptop"}
{"op":"remote_add","url":"https://p","title":"Phone"}
{"op":"sync"}
{"op":"remote_update","from_tab":"a","index":0,"title":"Renamed"}
{"op":"sync"}
"#,
        )
        .await;

        assert_eq!(titles(&report.tabs[0]), vec!["Renamed"]);
    }

    #[tokio::test]
    async fn test_failures_are_reported_not_fatal() {
        let report = run_script(
            r#"
{"op":"fail_feed","device":"laptop"}
{"op":"open","tab":"a","device":"laptop"}
{"op":"add","tab":"a","url":"","title":"Empty"}
{"op":"sync"}
"#,
        )
        .await;

        let tab = &report.tabs[0];
        assert_eq!(tab.last_error, "URL and title required");
        assert!(tab.feed_state.starts_with("error:"));
        assert_eq!(tab.diagnostics.len(), 1);
        assert_eq!(tab.stats.channel_errors, 1);
    }

    #[tokio::test]
    async fn test_close_drops_tab() {
        let report = run_script(
            r#"
{"op":"open","tab":"a"}
{"op":"close","tab":"a"}
"#,
        )
        .await;
        assert!(report.tabs.is_empty());
        assert_eq!(report.steps, 2);
    }

    #[tokio::test]
    async fn test_unknown_tab_is_a_script_error() {
        let steps = parse_script(r#"{"op":"add","tab":"zz","url":"https://a","title":"A"}"#).unwrap();
        let mut sim = Simulation::new(SyncConfig::default());
        let err = sim.run(&steps).await.unwrap_err();
        assert!(format!("{:#}", err).contains("no open tab named zz"));
    }
}
