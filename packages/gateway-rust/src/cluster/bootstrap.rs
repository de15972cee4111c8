//! Gateway bootstrap: decide primary vs secondary, collect registrations,
//! discover cluster-wide metadata, and resolve remaining conflicts.
//!
//! Background:
//! - every gateway caches a local copy of the cluster map;
//! - map versioning is monotonic, and only the primary distributes updates;
//! - the startup sequence below resolves the usual conflicts that arise
//!   when nodes come up against stale disk state, racing primary
//!   candidates, or a cluster that kept running without them.
//!
//! A primary candidate may "change its mind" twice: once when the
//! registration-window probe finds the cluster already running elsewhere,
//! and once when discovery surfaces a higher-version map naming a
//! different primary. Both transitions re-enter the secondary track; the
//! secondary track itself never changes its mind.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{sleep, Instant};
use tracing::{info, warn};

use reefstore_core::messages::{ACT_EARLY_START, ACT_PRIMARY_STARTED, PATH_DAEMON, WHAT_SMAP_VOTE};
use reefstore_core::{BucketMeta, ClusterMap};

use super::broadcast::{BcastArgs, BcastScope};
use super::errors::{BootstrapError, ClusterIntegrityError, OwnerError};
use super::gateway::Gateway;
use super::reduce::{reduce_max_ver, ReduceState};
use super::resolve::{resolve_bmeta_uuid, resolve_cmap_uuid};
use super::traits::{Broadcast, Joiner, MetaSyncer};

// ---------------------------------------------------------------------------
// EnvHint
// ---------------------------------------------------------------------------

/// Primary-role hints sourced from the environment.
#[derive(Debug, Clone, Default)]
pub struct EnvHint {
    /// Node id of the gateway to treat as primary (`AIS_PRIMARY_ID`).
    pub primary_id: Option<String>,
    /// Assertion that this node is the primary (`AIS_IS_PRIMARY`).
    pub is_primary: bool,
}

impl EnvHint {
    pub const ENV_PRIMARY_ID: &'static str = "AIS_PRIMARY_ID";
    pub const ENV_IS_PRIMARY: &'static str = "AIS_IS_PRIMARY";

    /// Reads both hint variables from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        let primary_id = std::env::var(Self::ENV_PRIMARY_ID)
            .ok()
            .filter(|v| !v.is_empty());
        let is_primary = std::env::var(Self::ENV_IS_PRIMARY)
            .map(|v| parse_bool(&v))
            .unwrap_or(false);
        Self {
            primary_id,
            is_primary,
        }
    }
}

fn parse_bool(value: &str) -> bool {
    matches!(
        value.to_ascii_lowercase().as_str(),
        "1" | "t" | "true" | "y" | "yes" | "on"
    )
}

// ---------------------------------------------------------------------------
// Bootstrapper
// ---------------------------------------------------------------------------

/// Drives one gateway from process start to a consistent view of cluster
/// membership and identity.
pub struct Bootstrapper {
    gw: Arc<Gateway>,
    broadcaster: Arc<dyn Broadcast>,
    joiner: Arc<dyn Joiner>,
    syncer: Arc<dyn MetaSyncer>,
}

impl Bootstrapper {
    pub fn new(
        gw: Arc<Gateway>,
        broadcaster: Arc<dyn Broadcast>,
        joiner: Arc<dyn Joiner>,
        syncer: Arc<dyn MetaSyncer>,
    ) -> Self {
        Self {
            gw,
            broadcaster,
            joiner,
            syncer,
        }
    }

    fn self_id(&self) -> &str {
        &self.gw.self_node().id
    }

    /// Runs the full bootstrap sequence.
    ///
    /// Errors are terminal: the caller logs the diagnostic and exits the
    /// process.
    pub async fn run(&self, hint: EnvHint) -> Result<(), BootstrapError> {
        // 1: load the local copy and try to utilize it for discovery
        let loaded = self.load_local_cmap();
        if let Some(cmap) = &loaded {
            info!(cmap = %cmap, "loaded local cluster map");
        }

        // 2: the preliminary primary decision
        let (smap, secondary) = self.determine_role(loaded, &hint)?;

        // 3.1: start as primary
        if !secondary {
            info!(self_id = self.self_id(), "assuming the primary role for now, starting up");
            return self.primary_startup(smap).await;
        }

        // 3.2: otherwise join as secondary
        info!(self_id = self.self_id(), "starting up as non-primary");
        if let Err(first_err) = self.secondary_startup(smap.clone()).await {
            let mut recovered = false;
            if let Some(loaded_map) = smap {
                // one discovery pass: the loaded map may know where the
                // cluster went
                let (max_cmap, _) = self.uncover(Arc::new(loaded_map)).await?;
                if let Some(max) = max_cmap {
                    if max.primary().is_some() {
                        info!(cmap = %max, "second attempt: joining via discovered map");
                        recovered = self.secondary_startup(Some(max)).await.is_ok();
                    }
                }
            }
            if !recovered {
                return Err(BootstrapError::JoinFailed {
                    attempts: self.gw.config().timeouts.join_retries,
                    last_error: first_err.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Reads the persisted map, discarding it when this node's recorded
    /// control URL no longer matches the advertised one.
    fn load_local_cmap(&self) -> Option<ClusterMap> {
        match self.gw.cmap().load() {
            Ok(cmap) => {
                if let Some(record) = cmap.get_node(self.self_id()) {
                    if record.ctrl_url != self.gw.self_node().ctrl_url {
                        warn!(
                            disk = %record.ctrl_url,
                            runtime = %self.gw.self_node().ctrl_url,
                            "control URL changed since last run, discarding persisted map"
                        );
                        return None;
                    }
                }
                Some(cmap)
            }
            Err(OwnerError::NotPersisted) => None,
            Err(e) => {
                warn!(error = %e, "failed to load persisted cluster map");
                None
            }
        }
    }

    /// Makes the preliminary primary/secondary decision from the loaded
    /// map and the environment hints.
    fn determine_role(
        &self,
        loaded: Option<ClusterMap>,
        hint: &EnvHint,
    ) -> Result<(Option<ClusterMap>, bool), BootstrapError> {
        let mut smap = loaded;
        if let Some(cmap) = &mut smap {
            cmap.set_node(self.gw.self_node().clone());
        }

        if hint.is_primary {
            if let Some(pid) = &hint.primary_id {
                if pid != self.self_id() {
                    return Err(BootstrapError::Misconfig {
                        primary_id: pid.clone(),
                    });
                }
            }
        }
        info!(
            self_id = self.self_id(),
            env_primary_id = hint.primary_id.as_deref().unwrap_or(""),
            env_is_primary = hint.is_primary,
            "primary environment hints"
        );

        let mut pid = hint.primary_id.clone();
        if let Some(cmap) = &mut smap {
            if let Some(p) = pid.clone() {
                if cmap.get_gateway(&p).is_none() {
                    warn!(primary_id = %p, "ignoring {}: not found in the loaded map", EnvHint::ENV_PRIMARY_ID);
                    pid = None;
                } else if !cmap.is_primary(&p) {
                    warn!(new = %p, previous = %cmap.primary_id, "overriding loaded primary from environment");
                    // informational until discovery: no version bump
                    cmap.primary_id = p;
                }
            }
        }

        let secondary = match (&pid, &smap) {
            (Some(p), _) => p != self.self_id(),
            (None, Some(cmap)) => !cmap.is_primary(self.self_id()),
            (None, None) => !hint.is_primary,
        };
        Ok((smap, secondary))
    }

    // -----------------------------------------------------------------------
    // Secondary track
    // -----------------------------------------------------------------------

    /// Installs the given map (or a fresh one) and joins through its
    /// primary, retrying with exponential backoff.
    ///
    /// No change of mind on this track.
    async fn secondary_startup(&self, smap: Option<ClusterMap>) -> anyhow::Result<()> {
        let smap = smap.unwrap_or_default();
        {
            let _guard = self.gw.cmap().lock();
            self.gw.cmap().put(smap.clone());
        }

        let primary = match smap.primary() {
            Some(primary) => primary.clone(),
            None => match &self.gw.config().primary_url {
                Some(url) => reefstore_core::Node::gateway("", url.clone()),
                None => anyhow::bail!("no known primary to join"),
            },
        };

        let timeouts = &self.gw.config().timeouts;
        let retries = timeouts.join_retries.max(1);
        let mut backoff = timeouts.join_backoff;
        let mut last_err = String::new();
        for attempt in 1..=retries {
            match self.joiner.join(&primary, self.gw.self_node()).await {
                Ok(resp) if resp.accepted => {
                    if let Some(cmap) = resp.cmap {
                        let _guard = self.gw.cmap().lock();
                        if cmap.version >= self.gw.cmap().get().version {
                            self.gw.cmap().put(cmap);
                        }
                    }
                    info!(primary = %primary, cmap = %self.gw.cmap().get(), "joined as non-primary");
                    self.spawn_started_watcher();
                    return Ok(());
                }
                Ok(resp) => {
                    last_err = resp
                        .reject_reason
                        .unwrap_or_else(|| "join rejected".to_string());
                }
                Err(e) => last_err = e.to_string(),
            }
            if attempt < retries {
                warn!(attempt, error = %last_err, "join attempt failed, backing off");
                sleep(backoff).await;
                backoff *= 2;
            }
        }
        anyhow::bail!("{last_err}")
    }

    /// Flips the started flag once the installed map shows a settled
    /// cluster identity.
    fn spawn_started_watcher(&self) {
        let gw = Arc::clone(&self.gw);
        let interval = self.gw.config().timeouts.cplane_operation;
        tokio::spawn(async move {
            loop {
                let cmap = gw.cmap().get();
                if cmap.version > 0 && !cmap.uuid.is_empty() {
                    gw.mark_started();
                    return;
                }
                sleep(interval).await;
            }
        });
    }

    // -----------------------------------------------------------------------
    // Primary track
    // -----------------------------------------------------------------------

    async fn primary_startup(&self, loaded: Option<ClusterMap>) -> Result<(), BootstrapError> {
        // 1: minimal map with only this node, marked primary, to accept
        // registrations
        {
            let _guard = self.gw.cmap().lock();
            let mut smap = ClusterMap::new();
            smap.set_node(self.gw.self_node().clone());
            smap.primary_id = self.self_id().to_string();
            self.gw.cmap().put(smap);
        }

        // 2: registration window
        if !self.gw.config().skip_startup {
            if let Some(mut max) = self.accept_registrations(&loaded).await {
                max.set_node(self.gw.self_node().clone());
                {
                    let _guard = self.gw.cmap().lock();
                    self.gw.cmap().put(max.clone());
                }
                info!(primary = %max.primary_id, "change of mind #1: registering with the live cluster");
                return self
                    .secondary_startup(Some(max))
                    .await
                    .map_err(|e| BootstrapError::JoinFailed {
                        attempts: self.gw.config().timeouts.join_retries,
                        last_error: e.to_string(),
                    });
            }
        }

        // 3: merge the loaded map into the collected registrations
        let smap = self.gw.cmap().get();
        let have_registrations = smap.count_targets() > 0 || smap.count_gateways() > 1;
        if have_registrations {
            let mut added = 0;
            if let Some(loaded) = &loaded {
                let _guard = self.gw.cmap().lock();
                let live = self.gw.cmap().get();
                let mut merged = loaded.clone();
                added = live.merge_override(&mut merged);
                if added > 0 {
                    merged.version += added as i64 + 1;
                }
                self.gw.cmap().put(merged);
            }
            info!(added, cmap = %self.gw.cmap().get(), "have registrations, publishing early map");
            self.syncer
                .sync(self.gw.cmap().get(), self.gw.bmeta().get(), ACT_EARLY_START)
                .wait()
                .await;
        } else {
            info!("no registrations yet");
            if let Some(loaded) = &loaded {
                info!(cmap = %loaded, "keep going with the local map");
                let _guard = self.gw.cmap().lock();
                self.gw.cmap().put(loaded.clone());
            }
        }

        // 4: discover cluster-wide metadata and resolve remaining conflicts
        self.discover_meta().await?;

        // 5: still primary?
        let smap = self.gw.cmap().get();
        if !smap.is_primary(self.self_id()) {
            info!(primary = %smap.primary_id, "change of mind #2: registering with the discovered primary");
            return self
                .secondary_startup(Some((*smap).clone()))
                .await
                .map_err(|e| BootstrapError::JoinFailed {
                    attempts: self.gw.config().timeouts.join_retries,
                    last_error: e.to_string(),
                });
        }

        // 6: persist and finalize with sync + bucket metadata
        let final_map = {
            let _guard = self.gw.cmap().lock();
            let mut smap = (*self.gw.cmap().get()).clone();
            if smap.uuid.is_empty() {
                smap.assign_cluster_id();
                smap.version += 1;
                self.gw.cmap().put(smap.clone());
                info!(uuid = %smap.uuid, "assigned new cluster uuid");
            }
            // persist before releasing the lock: nothing may observe a
            // publishable map that is not durable
            self.gw
                .cmap()
                .persist(&smap)
                .map_err(BootstrapError::Persist)?;
            smap
        };

        {
            let _guard = self.gw.bmeta().lock();
            let bmeta = self.gw.bmeta().get();
            if bmeta.version == 0 {
                let mut next = (*bmeta).clone();
                next.version = 1;
                next.uuid = final_map.uuid.clone();
                self.gw.bmeta().put(next);
            }
        }

        let _ = self.syncer.sync(
            Arc::new(final_map.clone()),
            self.gw.bmeta().get(),
            ACT_PRIMARY_STARTED,
        );
        self.gw.mark_started();
        info!(cmap = %final_map, "primary/cluster startup complete");
        Ok(())
    }

    /// Waits for targets and peer gateways to register, while staying
    /// willing to defer to an already-healthy cluster.
    ///
    /// Returns a superseding map when the one-shot probe finds the loaded
    /// map's cluster alive under a different primary; `None` means "carry
    /// on as primary".
    async fn accept_registrations(&self, loaded: &Option<ClusterMap>) -> Option<ClusterMap> {
        let timeouts = self.gw.config().timeouts.clone();
        let ntargets = self.gw.config().target_count;
        let deadline = timeouts.startup;
        let mut wtime = deadline / 2;
        let started_at = Instant::now();
        let mut checked = loaded.is_none();

        while started_at.elapsed() < wtime {
            sleep(Duration::from_secs(1)).await;
            let smap = self.gw.cmap().get();
            if !smap.is_primary(self.self_id()) {
                break;
            }
            let nt = smap.count_targets();
            if ntargets > 0 && nt >= ntargets {
                info!(ntargets, current = nt, "reached the specified target count");
                return None;
            }
            if nt > 0 {
                // live registrations buy the full configured window
                wtime = deadline;
            }
            // ask once whether the cluster has moved on without us
            if !checked {
                if let Some(loaded) = loaded {
                    if loaded.count_targets() > 0
                        && started_at.elapsed() > 2 * timeouts.max_keepalive
                    {
                        checked = true;
                        let state = self
                            .bcast_max_ver(Arc::new(loaded.clone()), false)
                            .await;
                        if !state.slow_path {
                            if let Some(max) = state.max_cmap {
                                if max.uuid == loaded.uuid
                                    && max.version > loaded.version
                                    && max.primary().is_some()
                                    && !max.is_primary(self.self_id())
                                {
                                    info!(loaded = %loaded, max = %max, "cluster is already running elsewhere");
                                    return Some(max);
                                }
                            }
                        }
                    }
                }
            }
        }

        let nt = self.gw.cmap().get().count_targets();
        if nt > 0 {
            warn!(ntargets, current = nt, "timed out waiting for targets");
        }
        None
    }

    /// Discovers cluster-wide metadata and resolves remaining conflicts.
    async fn discover_meta(&self) -> Result<(), BootstrapError> {
        let bcast_map = self.gw.cmap().get();
        let (max_cmap, max_bmeta) = self.uncover(bcast_map).await?;

        if let Some(max) = max_bmeta {
            let _guard = self.gw.bmeta().lock();
            if self.gw.bmeta().get().version < max.version {
                self.gw.bmeta().put(max);
            }
        }

        let Some(max) = max_cmap else {
            info!("no max-version cluster map discovered");
            return Ok(());
        };
        if max.version == 0 {
            return Ok(());
        }
        let local = self.gw.cmap().get();
        info!(local = %local, max = %max, "discovered max-version cluster map");

        let (same_uuid, same_version, eq) = local.compare(&max);
        if !same_uuid {
            return Err(ClusterIntegrityError::SplitBrainUuid {
                local: local.to_string(),
                remote: max.to_string(),
                peer: max.primary_id.clone(),
            }
            .into());
        }
        if eq && same_version {
            return Ok(());
        }

        let names_other_primary = max
            .primary()
            .is_some_and(|p| p.id != self.self_id());
        if names_other_primary {
            if max.version > local.version {
                info!(primary = %max.primary_id, "discovered a newer map with a different primary");
                let mut adopted = max.clone();
                adopted.set_node(self.gw.self_node().clone());
                let _guard = self.gw.cmap().lock();
                self.gw.cmap().put(adopted);
                return Ok(());
            }
            return Err(ClusterIntegrityError::StalePrimaryClaim {
                local: local.to_string(),
                remote: max.to_string(),
            }
            .into());
        }

        // still our cluster: union the discovered membership, strictly
        {
            let _guard = self.gw.cmap().lock();
            let mut next = (*self.gw.cmap().get()).clone();
            if !eq {
                match max.merge_strict(&mut next) {
                    Ok(added) => info!(added, "merged discovered membership"),
                    Err(e) => {
                        return Err(ClusterIntegrityError::MergeConflict(e).into());
                    }
                }
            }
            next.version = next.version.max(max.version) + 1;
            self.gw.cmap().put(next);
        }
        Ok(())
    }

    /// Broadcast + reduce against the given map's node set, repeating
    /// until a clean round or the startup deadline, then settling the
    /// slow path if it latched.
    async fn uncover(
        &self,
        bcast_map: Arc<ClusterMap>,
    ) -> Result<(Option<ClusterMap>, Option<BucketMeta>), ClusterIntegrityError> {
        let deadline = Instant::now() + self.gw.config().timeouts.startup;
        let interval = self.gw.config().timeouts.cplane_operation;
        let mut state;
        loop {
            state = self.bcast_max_ver(Arc::clone(&bcast_map), true).await;
            if state.done || Instant::now() >= deadline {
                break;
            }
            sleep(interval).await;
        }

        if state.slow_path {
            state.max_bmeta = resolve_bmeta_uuid(&state.per_node_bmeta)?;
            if let Some(resolved) = resolve_cmap_uuid(&state.per_node_cmap)? {
                state.max_cmap = Some(resolved);
            }
        }
        Ok((state.max_cmap, state.max_bmeta))
    }

    async fn bcast_max_ver(&self, cmap: Arc<ClusterMap>, retain_per_node: bool) -> ReduceState {
        let args = BcastArgs {
            path: PATH_DAEMON.to_string(),
            what: WHAT_SMAP_VOTE.to_string(),
            scope: BcastScope::AllNodes,
            cmap,
            exclude: Some(self.self_id().to_string()),
        };
        let mut rx = self.broadcaster.bcast_to(args).await;
        reduce_max_ver(&mut rx, retain_per_node).await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
