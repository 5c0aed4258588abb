use crate::machine::Event;
use crate::notify::{ChangeNotifier, NullNotifier};
use crate::service::ContainerService;
use crate::CoreError;
use plastron_remote::{ControlAction, ControlBackend, ControlError, ControlOutcome, ControlRequest};
use plastron_schema::{
    validate_container_id, ContainerContext, ContainerKind, ContainerState, NextAction,
};
use plastron_store::{SnapshotStore, StateStore};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Reconciliation period between status sweeps.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;

/// Owner of the tracked container registry.
///
/// All registry mutations and snapshot persistence flow through this one
/// component; callers only ever receive cloned context snapshots. The
/// reconciliation tick polls every container concurrently but applies the
/// completions sequentially, so a removal can never race a persist.
pub struct Orchestrator {
    control: Arc<dyn ControlBackend>,
    snapshots: SnapshotStore,
    notifier: Arc<dyn ChangeNotifier>,
    poll_interval: Duration,
    services: Mutex<BTreeMap<String, Arc<ContainerService>>>,
}

impl Orchestrator {
    pub fn new(control: Arc<dyn ControlBackend>, store: Arc<dyn StateStore>) -> Self {
        Self::with_notifier(control, store, Arc::new(NullNotifier))
    }

    pub fn with_notifier(
        control: Arc<dyn ControlBackend>,
        store: Arc<dyn StateStore>,
        notifier: Arc<dyn ChangeNotifier>,
    ) -> Self {
        Self {
            control,
            snapshots: SnapshotStore::new(store),
            notifier,
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            services: Mutex::new(BTreeMap::new()),
        }
    }

    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Re-attach every container from the persisted snapshot with its
    /// last-known state, without re-sending `Start`. The restored set is
    /// inert until the next tick observes real remote status.
    pub async fn restore(&self) -> Result<usize, CoreError> {
        let snapshot = self.snapshots.load()?;
        let mut services = self.services.lock().await;
        let mut restored = 0;
        for ctx in snapshot {
            if ctx.state == ContainerState::Destroyed {
                warn!("snapshot contains destroyed container {}; skipping", ctx.id);
                continue;
            }
            if services.contains_key(&ctx.id) {
                continue;
            }
            let id = ctx.id.clone();
            let svc = Arc::new(ContainerService::attach(ctx, Arc::clone(&self.control)));
            services.insert(id, svc);
            restored += 1;
        }
        info!("restored {restored} container(s) from snapshot");
        Ok(restored)
    }

    /// Start tracking a session. Idempotent: an already-tracked id returns
    /// its current context unchanged.
    pub async fn start_session(&self, id: &str, user: &str) -> Result<ContainerContext, CoreError> {
        validate_container_id(id)?;
        let svc = {
            let mut services = self.services.lock().await;
            if let Some(existing) = services.get(id) {
                return Ok(existing.context().await);
            }
            let name = Self::next_session_name(&services, user).await;
            info!("tracking session {id} (name {name}) for {user}");
            let svc = Arc::new(ContainerService::attach(
                ContainerContext::session(id, &name, user),
                Arc::clone(&self.control),
            ));
            services.insert(id.to_owned(), Arc::clone(&svc));
            svc
        };
        let changed = svc.send(Event::Start).await;
        self.after_change(changed).await?;
        Ok(svc.context().await)
    }

    /// Start tracking an app under an existing session. The session lookup
    /// is explicit: a missing session is reported, never dereferenced.
    pub async fn start_app(
        &self,
        session_id: &str,
        app_id: &str,
        app_name: &str,
        password: &str,
    ) -> Result<ContainerContext, CoreError> {
        validate_container_id(app_id)?;
        let svc = {
            let mut services = self.services.lock().await;
            let Some(session) = services.get(session_id) else {
                return Err(CoreError::SessionNotReady(session_id.to_owned()));
            };
            let user = session.context().await.user;
            if let Some(existing) = services.get(app_id) {
                return Ok(existing.context().await);
            }
            info!("tracking app {app_id} ({app_name}) under session {session_id}");
            let svc = Arc::new(ContainerService::attach(
                ContainerContext::app(app_id, app_name, &user, session_id, Some(password)),
                Arc::clone(&self.control),
            ));
            services.insert(app_id.to_owned(), Arc::clone(&svc));
            svc
        };
        let changed = svc.send(Event::Start).await;
        self.after_change(changed).await?;
        Ok(svc.context().await)
    }

    pub async fn stop_container(&self, id: &str) -> Result<ContainerContext, CoreError> {
        let svc = self
            .get(id)
            .await
            .ok_or_else(|| CoreError::NotFound(id.to_owned()))?;
        let changed = svc.send(Event::Stop).await;
        self.after_change(changed).await?;
        Ok(svc.context().await)
    }

    pub async fn restart_container(&self, id: &str) -> Result<ContainerContext, CoreError> {
        let svc = self
            .get(id)
            .await
            .ok_or_else(|| CoreError::NotFound(id.to_owned()))?;
        let changed = svc.send(Event::Restart).await;
        self.after_change(changed).await?;
        Ok(svc.context().await)
    }

    /// Tear a container down, cascading through its children first.
    ///
    /// Children still winding down get `Stop` with a queued `Destroy`; the
    /// parent queues `Stop` and does not progress until the children are
    /// gone; later ticks complete the cascade.
    pub async fn destroy_container(&self, id: &str) -> Result<(), CoreError> {
        let svc = self
            .get(id)
            .await
            .ok_or_else(|| CoreError::NotFound(id.to_owned()))?;
        let children = self.children_of(id).await;

        if children.is_empty() {
            if svc.state().await == ContainerState::Exited {
                let changed = svc.send(Event::Destroy).await;
                self.after_change(changed).await?;
            } else {
                let queued = svc.queue_action(Some(NextAction::Destroy)).await;
                let changed = svc.send(Event::Stop).await;
                self.after_change(changed.or(queued)).await?;
            }
            return Ok(());
        }

        for child in &children {
            if child.state().await == ContainerState::Exited {
                let changed = child.send(Event::Destroy).await;
                self.after_change(changed).await?;
            } else {
                let queued = child.queue_action(Some(NextAction::Destroy)).await;
                let changed = child.send(Event::Stop).await;
                self.after_change(changed.or(queued)).await?;
            }
        }
        let queued = svc.queue_action(Some(NextAction::Stop)).await;
        self.after_change(queued).await?;
        Ok(())
    }

    /// Snapshots of every tracked container owned by `user`.
    pub async fn list_containers(&self, user: &str) -> Vec<ContainerContext> {
        let services = self.services.lock().await;
        let mut out = Vec::new();
        for svc in services.values() {
            let ctx = svc.context().await;
            if ctx.user == user {
                out.push(ctx);
            }
        }
        out
    }

    /// One reconciliation pass: poll every tracked container concurrently,
    /// then fold each completion back into its machine. Level-triggered:
    /// the next step is always recomputed from authoritative remote status.
    pub async fn tick(&self) {
        let tracked: Vec<(String, Arc<ContainerService>)> = {
            let services = self.services.lock().await;
            services
                .iter()
                .map(|(id, svc)| (id.clone(), Arc::clone(svc)))
                .collect()
        };

        let mut checks: JoinSet<(String, Result<ControlOutcome, ControlError>)> = JoinSet::new();
        for (id, svc) in tracked {
            let control = Arc::clone(&self.control);
            let request = ControlRequest::for_container(&svc.context().await);
            checks.spawn(async move {
                let result = control.invoke(&request, ControlAction::Status).await;
                (id, result)
            });
        }

        // Completions are applied one at a time: the single mutation path
        // for removals and persists within a tick.
        while let Some(joined) = checks.join_next().await {
            let Ok((id, result)) = joined else { continue };
            if let Err(e) = self.reconcile(&id, result).await {
                warn!("reconcile {id}: {e}");
            }
        }
    }

    /// Run the periodic reconciliation loop until `shutdown` fires, then
    /// close every machine and persist the final snapshot.
    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) {
        let mut interval = tokio::time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!(
            "reconciliation loop started (every {}s)",
            self.poll_interval.as_secs()
        );
        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    debug!("shutdown signal received");
                    break;
                }
                _ = interval.tick() => {
                    self.tick().await;
                }
            }
        }
        self.shutdown().await;
    }

    /// Stop all machines and persist the current snapshot.
    pub async fn shutdown(&self) {
        let tracked: Vec<Arc<ContainerService>> = {
            let services = self.services.lock().await;
            services.values().map(Arc::clone).collect()
        };
        for svc in tracked {
            svc.close().await;
        }
        if let Err(e) = self.persist().await {
            warn!("final snapshot persist failed: {e}");
        }
        info!("orchestrator shutdown complete");
    }

    async fn get(&self, id: &str) -> Option<Arc<ContainerService>> {
        self.services.lock().await.get(id).map(Arc::clone)
    }

    async fn children_of(&self, id: &str) -> Vec<Arc<ContainerService>> {
        let services = self.services.lock().await;
        let mut children = Vec::new();
        for svc in services.values() {
            if svc.context().await.parent_id.as_deref() == Some(id) {
                children.push(Arc::clone(svc));
            }
        }
        children
    }

    async fn next_session_name(
        services: &BTreeMap<String, Arc<ContainerService>>,
        user: &str,
    ) -> String {
        let mut highest = 0u32;
        for svc in services.values() {
            let ctx = svc.context().await;
            if ctx.kind == ContainerKind::Session && ctx.user == user {
                if let Ok(n) = ctx.name.parse::<u32>() {
                    highest = highest.max(n);
                }
            }
        }
        (highest + 1).to_string()
    }

    /// Fold one status completion back into the machine.
    async fn reconcile(
        &self,
        id: &str,
        result: Result<ControlOutcome, ControlError>,
    ) -> Result<(), CoreError> {
        // The container may have been cascade-removed earlier in this tick.
        let Some(svc) = self.get(id).await else {
            return Ok(());
        };

        match result {
            Err(e) => {
                let changed = svc
                    .send(Event::RemoteStopped {
                        error: Some(e.to_container_error()),
                    })
                    .await;
                self.after_change(changed).await
            }
            Ok(outcome) => {
                let ctx = svc.context().await;
                if let Some(action) = ctx.next_action {
                    if self.dispatch_queued(&svc, &ctx, action).await? {
                        return Ok(());
                    }
                }
                match Self::sync_event(&outcome) {
                    Some(event) => {
                        let changed = svc.send(event).await;
                        self.after_change(changed).await
                    }
                    None => Ok(()),
                }
            }
        }
    }

    /// Try to advance a queued cascade step. Returns `false` when the step
    /// does not apply yet; the caller then falls back to the plain sync
    /// event and the step stays queued for a later tick.
    async fn dispatch_queued(
        &self,
        svc: &Arc<ContainerService>,
        ctx: &ContainerContext,
        action: NextAction,
    ) -> Result<bool, CoreError> {
        let children = self.children_of(&ctx.id).await;
        if !children.is_empty() {
            debug!(
                "{}: holding queued {action:?}, {} child(ren) still tracked",
                ctx.id,
                children.len()
            );
            return Ok(false);
        }

        match action {
            NextAction::Destroy => {
                if let Some(changed) = svc.send(Event::Destroy).await {
                    self.after_change(Some(changed)).await?;
                    return Ok(true);
                }
                // Not destroyable yet; a Stop may drive it to Exited first.
                if let Some(changed) = svc.send(Event::Stop).await {
                    self.after_change(Some(changed)).await?;
                    return Ok(true);
                }
                Ok(false)
            }
            NextAction::Stop => {
                // Queued Stop always means stop-then-destroy: once the stop
                // is dispatched (or found already satisfied) the queue
                // advances to Destroy.
                if ctx.state == ContainerState::Exited {
                    let queued = svc.queue_action(Some(NextAction::Destroy)).await;
                    let changed = svc.send(Event::Destroy).await;
                    self.after_change(changed.or(queued)).await?;
                    return Ok(true);
                }
                if let Some(changed) = svc.send(Event::Stop).await {
                    let queued = svc.queue_action(Some(NextAction::Destroy)).await;
                    self.after_change(queued.or(Some(changed))).await?;
                    return Ok(true);
                }
                Ok(false)
            }
        }
    }

    /// Translate a classified remote state into a synchronization event.
    /// Transient remote states produce none: the machine waits them out.
    fn sync_event(outcome: &ControlOutcome) -> Option<Event> {
        match outcome.state {
            ContainerState::Running => Some(Event::RemoteStarted {
                url: outcome.url.clone(),
            }),
            ContainerState::Created => Some(Event::RemoteCreated),
            ContainerState::Exited | ContainerState::Uninitialized => Some(Event::RemoteStopped {
                error: outcome.error.clone(),
            }),
            _ => None,
        }
    }

    /// Single change-handling path: notify, remove terminal containers
    /// (cascading to orphaned children), persist.
    async fn after_change(&self, changed: Option<ContainerContext>) -> Result<(), CoreError> {
        let Some(ctx) = changed else {
            return Ok(());
        };
        self.notifier.container_changed(&ctx);
        if ctx.state == ContainerState::Destroyed {
            self.remove_destroyed(&ctx.id).await;
        }
        self.persist().await
    }

    async fn remove_destroyed(&self, id: &str) {
        let mut services = self.services.lock().await;
        if let Some(svc) = services.remove(id) {
            svc.close().await;
            info!("container {id} destroyed and removed");
        }

        let mut orphan_ids = Vec::new();
        for (cid, svc) in services.iter() {
            if svc.context().await.parent_id.as_deref() == Some(id) {
                orphan_ids.push(cid.clone());
            }
        }
        for cid in orphan_ids {
            if let Some(svc) = services.remove(&cid) {
                svc.close().await;
                warn!("removed orphaned app {cid} of destroyed session {id}");
            }
        }
    }

    async fn persist(&self) -> Result<(), CoreError> {
        let contexts = {
            let services = self.services.lock().await;
            let mut out = Vec::with_capacity(services.len());
            for svc in services.values() {
                out.push(svc.context().await);
            }
            out
        };
        self.snapshots.save(&contexts)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plastron_remote::{codes, MockControlBackend};
    use plastron_store::MemoryStore;

    fn setup() -> (Arc<MockControlBackend>, Arc<MemoryStore>, Orchestrator) {
        let mock = Arc::new(MockControlBackend::new());
        let store = Arc::new(MemoryStore::new());
        let orchestrator = Orchestrator::new(mock.clone(), store.clone());
        (mock, store, orchestrator)
    }

    fn loading_outcome() -> ControlOutcome {
        ControlOutcome::with_state(ContainerState::Loading)
    }

    fn exited_outcome() -> ControlOutcome {
        ControlOutcome::with_state(ContainerState::Exited)
    }

    /// Drive a session to Running: create it, then let one tick observe a
    /// healthy remote.
    async fn running_session(
        mock: &Arc<MockControlBackend>,
        orchestrator: &Orchestrator,
        id: &str,
        user: &str,
    ) {
        mock.push(id, Ok(loading_outcome()));
        orchestrator.start_session(id, user).await.unwrap();
        mock.set_default(id, Ok(ControlOutcome::running(&format!("https://r/{id}"))));
        orchestrator.tick().await;
        let ctx = orchestrator
            .list_containers(user)
            .await
            .into_iter()
            .find(|c| c.id == id)
            .unwrap();
        assert_eq!(ctx.state, ContainerState::Running);
    }

    #[tokio::test]
    async fn scenario_a_fresh_session_reaches_loading() {
        let (mock, _store, orchestrator) = setup();
        mock.push("s1", Ok(loading_outcome()));

        let ctx = orchestrator.start_session("s1", "u1").await.unwrap();
        assert_eq!(ctx.id, "s1");
        assert_eq!(ctx.name, "1");
        assert_eq!(ctx.user, "u1");
        assert_eq!(ctx.kind, ContainerKind::Session);
        assert_eq!(ctx.state, ContainerState::Loading);
        assert_eq!(mock.calls_for("s1", ControlAction::Start), 1);
    }

    #[tokio::test]
    async fn session_names_increment_per_user() {
        let (mock, _store, orchestrator) = setup();
        for id in ["s1", "s2"] {
            mock.push(id, Ok(loading_outcome()));
        }
        mock.push("t1", Ok(loading_outcome()));

        assert_eq!(orchestrator.start_session("s1", "u1").await.unwrap().name, "1");
        assert_eq!(orchestrator.start_session("s2", "u1").await.unwrap().name, "2");
        // A different user starts counting from 1 again.
        assert_eq!(orchestrator.start_session("t1", "u2").await.unwrap().name, "1");
    }

    #[tokio::test]
    async fn start_session_is_idempotent_on_id() {
        let (mock, _store, orchestrator) = setup();
        mock.push("s1", Ok(loading_outcome()));

        let first = orchestrator.start_session("s1", "u1").await.unwrap();
        let second = orchestrator.start_session("s1", "u1").await.unwrap();
        assert_eq!(first.name, second.name);
        assert_eq!(second.state, ContainerState::Loading);
        assert_eq!(mock.calls_for("s1", ControlAction::Start), 1);
    }

    #[tokio::test]
    async fn invalid_session_id_is_rejected() {
        let (_mock, _store, orchestrator) = setup();
        assert!(matches!(
            orchestrator.start_session("bad id", "u1").await,
            Err(CoreError::Schema(_))
        ));
    }

    #[tokio::test]
    async fn scenario_b_tick_drives_loading_to_running() {
        let (mock, _store, orchestrator) = setup();
        mock.push("s1", Ok(loading_outcome()));
        orchestrator.start_session("s1", "u1").await.unwrap();

        mock.set_default("s1", Ok(ControlOutcome::running("https://r/s1")));
        orchestrator.tick().await;

        let ctx = &orchestrator.list_containers("u1").await[0];
        assert_eq!(ctx.state, ContainerState::Running);
        assert_eq!(ctx.url.as_deref(), Some("https://r/s1"));
    }

    #[tokio::test]
    async fn scenario_c_app_progresses_under_its_session() {
        let (mock, _store, orchestrator) = setup();
        running_session(&mock, &orchestrator, "s1", "u1").await;

        mock.push("a1", Ok(loading_outcome()));
        let ctx = orchestrator
            .start_app("s1", "a1", "jupyter", "pw")
            .await
            .unwrap();
        assert_eq!(ctx.kind, ContainerKind::App);
        assert_eq!(ctx.parent_id.as_deref(), Some("s1"));
        assert_eq!(ctx.user, "u1");
        assert_eq!(ctx.name, "jupyter");
        assert_eq!(ctx.state, ContainerState::Loading);

        mock.set_default("a1", Ok(ControlOutcome::running("https://r/a1")));
        orchestrator.tick().await;
        let apps: Vec<_> = orchestrator
            .list_containers("u1")
            .await
            .into_iter()
            .filter(|c| c.kind == ContainerKind::App)
            .collect();
        assert_eq!(apps.len(), 1);
        assert_eq!(apps[0].state, ContainerState::Running);
    }

    #[tokio::test]
    async fn app_against_missing_session_is_session_not_ready() {
        let (mock, _store, orchestrator) = setup();
        let err = orchestrator
            .start_app("ghost", "a1", "jupyter", "pw")
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::SessionNotReady(id) if id == "ghost"));
        assert!(mock.invocations().is_empty());
        assert!(orchestrator.list_containers("u1").await.is_empty());
    }

    #[tokio::test]
    async fn start_app_is_idempotent_on_id() {
        let (mock, _store, orchestrator) = setup();
        running_session(&mock, &orchestrator, "s1", "u1").await;

        mock.push("a1", Ok(loading_outcome()));
        orchestrator
            .start_app("s1", "a1", "jupyter", "pw")
            .await
            .unwrap();
        orchestrator
            .start_app("s1", "a1", "jupyter", "pw")
            .await
            .unwrap();
        assert_eq!(mock.calls_for("a1", ControlAction::Start), 1);
    }

    #[tokio::test]
    async fn scenario_d_cascade_destroy_children_first() {
        let (mock, _store, orchestrator) = setup();
        running_session(&mock, &orchestrator, "s1", "u1").await;
        mock.push("a1", Ok(loading_outcome()));
        orchestrator
            .start_app("s1", "a1", "jupyter", "pw")
            .await
            .unwrap();
        mock.set_default("a1", Ok(ControlOutcome::running("https://r/a1")));
        orchestrator.tick().await;

        // a1 stops synchronously (queued Destroy), s1 queues Stop.
        mock.push("a1", Ok(exited_outcome()));
        orchestrator.destroy_container("s1").await.unwrap();

        let all = orchestrator.list_containers("u1").await;
        let a1 = all.iter().find(|c| c.id == "a1").unwrap();
        assert_eq!(a1.state, ContainerState::Exited);
        assert_eq!(a1.next_action, Some(NextAction::Destroy));
        let s1 = all.iter().find(|c| c.id == "s1").unwrap();
        assert_eq!(s1.next_action, Some(NextAction::Stop));

        // Remote now reports both as exited; ticks complete the cascade.
        mock.set_default("a1", Ok(exited_outcome()));
        mock.set_default("s1", Ok(exited_outcome()));
        for _ in 0..4 {
            let tracked = orchestrator.list_containers("u1").await;
            // The parent is never destroyed while the child is tracked.
            if tracked.iter().any(|c| c.id == "a1") {
                assert!(tracked.iter().any(|c| c.id == "s1"));
            }
            if tracked.is_empty() {
                break;
            }
            orchestrator.tick().await;
        }
        assert!(orchestrator.list_containers("u1").await.is_empty());

        // Teardown ordering on the wire: a1 destroyed strictly before s1.
        let invocations = mock.invocations();
        let destroy_a1 = invocations
            .iter()
            .position(|(id, a)| id == "a1" && *a == ControlAction::Destroy)
            .unwrap();
        let destroy_s1 = invocations
            .iter()
            .position(|(id, a)| id == "s1" && *a == ControlAction::Destroy)
            .unwrap();
        assert!(destroy_a1 < destroy_s1);
    }

    #[tokio::test]
    async fn scenario_e_unreachable_remote_marks_exited_but_keeps_tracking() {
        let (mock, _store, orchestrator) = setup();
        running_session(&mock, &orchestrator, "x", "u1").await;

        mock.set_default("x", Err(ControlError::Unreachable("boom".to_owned())));
        orchestrator.tick().await;

        let ctx = &orchestrator.list_containers("u1").await[0];
        assert_eq!(ctx.state, ContainerState::Exited);
        assert_eq!(
            ctx.error.as_ref().map(|e| e.code.as_str()),
            Some(codes::REMOTE_UNREACHABLE)
        );

        // Still tracked on the next tick; recovery re-runs it.
        mock.set_default("x", Ok(ControlOutcome::running("https://r/x")));
        orchestrator.tick().await;
        let ctx = &orchestrator.list_containers("u1").await[0];
        assert_eq!(ctx.state, ContainerState::Running);
        assert!(ctx.error.is_none());
    }

    #[tokio::test]
    async fn tick_failure_of_one_container_does_not_abort_the_others() {
        let (mock, _store, orchestrator) = setup();
        running_session(&mock, &orchestrator, "s1", "u1").await;
        running_session(&mock, &orchestrator, "s2", "u1").await;

        mock.set_default("s1", Err(ControlError::Unreachable("down".to_owned())));
        mock.set_default("s2", Ok(ControlOutcome::running("https://r/s2")));
        orchestrator.tick().await;

        let all = orchestrator.list_containers("u1").await;
        let s1 = all.iter().find(|c| c.id == "s1").unwrap();
        let s2 = all.iter().find(|c| c.id == "s2").unwrap();
        assert_eq!(s1.state, ContainerState::Exited);
        assert_eq!(s2.state, ContainerState::Running);
    }

    #[tokio::test]
    async fn destroy_exited_container_removes_it_immediately() {
        let (mock, store, orchestrator) = setup();
        running_session(&mock, &orchestrator, "s1", "u1").await;
        mock.set_default("s1", Ok(exited_outcome()));
        orchestrator.tick().await;

        orchestrator.destroy_container("s1").await.unwrap();
        assert!(orchestrator.list_containers("u1").await.is_empty());
        assert_eq!(mock.calls_for("s1", ControlAction::Destroy), 1);

        // The persisted snapshot reflects the removal.
        let snapshot = SnapshotStore::new(store).load().unwrap();
        assert!(snapshot.is_empty());
    }

    #[tokio::test]
    async fn destroy_running_container_stops_then_destroys() {
        let (mock, _store, orchestrator) = setup();
        running_session(&mock, &orchestrator, "s1", "u1").await;

        mock.push("s1", Ok(exited_outcome()));
        orchestrator.destroy_container("s1").await.unwrap();
        let ctx = &orchestrator.list_containers("u1").await[0];
        assert_eq!(ctx.state, ContainerState::Exited);
        assert_eq!(ctx.next_action, Some(NextAction::Destroy));

        mock.set_default("s1", Ok(exited_outcome()));
        orchestrator.tick().await;
        assert!(orchestrator.list_containers("u1").await.is_empty());
    }

    #[tokio::test]
    async fn destroy_requested_while_loading_converges() {
        let (mock, _store, orchestrator) = setup();
        mock.push("s1", Ok(loading_outcome()));
        orchestrator.start_session("s1", "u1").await.unwrap();

        // Stop does not apply in Loading; the Destroy stays queued.
        orchestrator.destroy_container("s1").await.unwrap();
        let ctx = &orchestrator.list_containers("u1").await[0];
        assert_eq!(ctx.state, ContainerState::Loading);
        assert_eq!(ctx.next_action, Some(NextAction::Destroy));

        // The remote comes up, the queued destroy stops it, then removes it.
        mock.set_default("s1", Ok(ControlOutcome::running("https://r/s1")));
        orchestrator.tick().await;
        orchestrator.tick().await;
        mock.set_default("s1", Ok(exited_outcome()));
        orchestrator.tick().await;
        assert!(orchestrator.list_containers("u1").await.is_empty());
    }

    #[tokio::test]
    async fn unknown_ids_are_structured_errors() {
        let (_mock, _store, orchestrator) = setup();
        assert!(matches!(
            orchestrator.stop_container("ghost").await,
            Err(CoreError::NotFound(_))
        ));
        assert!(matches!(
            orchestrator.restart_container("ghost").await,
            Err(CoreError::NotFound(_))
        ));
        assert!(matches!(
            orchestrator.destroy_container("ghost").await,
            Err(CoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn restart_reenters_created_and_reinvokes_start() {
        let (mock, _store, orchestrator) = setup();
        running_session(&mock, &orchestrator, "s1", "u1").await;

        mock.push("s1", Ok(loading_outcome()));
        let ctx = orchestrator.restart_container("s1").await.unwrap();
        assert_eq!(ctx.state, ContainerState::Loading);
        assert_eq!(mock.calls_for("s1", ControlAction::Start), 2);
    }

    #[tokio::test]
    async fn failed_start_effect_lands_in_exited_until_next_tick() {
        let (mock, _store, orchestrator) = setup();
        mock.push("s1", Err(ControlError::Unreachable("refused".to_owned())));

        let ctx = orchestrator.start_session("s1", "u1").await.unwrap();
        assert_eq!(ctx.state, ContainerState::Exited);
        assert!(ctx.error.is_some());

        // The poll interval is the sole retry mechanism.
        mock.set_default("s1", Ok(ControlOutcome::running("https://r/s1")));
        orchestrator.tick().await;
        assert_eq!(
            orchestrator.list_containers("u1").await[0].state,
            ContainerState::Running
        );
    }

    #[tokio::test]
    async fn list_filters_by_owner() {
        let (mock, _store, orchestrator) = setup();
        mock.push("s1", Ok(loading_outcome()));
        mock.push("t1", Ok(loading_outcome()));
        orchestrator.start_session("s1", "u1").await.unwrap();
        orchestrator.start_session("t1", "u2").await.unwrap();

        let u1 = orchestrator.list_containers("u1").await;
        assert_eq!(u1.len(), 1);
        assert_eq!(u1[0].id, "s1");
        assert!(orchestrator.list_containers("nobody").await.is_empty());
    }

    #[tokio::test]
    async fn snapshot_restore_reattaches_without_restarting() {
        let (mock, store, orchestrator) = setup();
        running_session(&mock, &orchestrator, "s1", "u1").await;
        mock.push("a1", Ok(loading_outcome()));
        orchestrator
            .start_app("s1", "a1", "jupyter", "pw")
            .await
            .unwrap();

        // A second instance over the same store picks the set back up.
        let mock2 = Arc::new(MockControlBackend::new());
        let restored = Orchestrator::new(mock2.clone(), store);
        assert_eq!(restored.restore().await.unwrap(), 2);

        let all = restored.list_containers("u1").await;
        assert_eq!(all.len(), 2);
        let s1 = all.iter().find(|c| c.id == "s1").unwrap();
        let a1 = all.iter().find(|c| c.id == "a1").unwrap();
        assert_eq!(s1.state, ContainerState::Running);
        assert_eq!(a1.kind, ContainerKind::App);
        assert_eq!(a1.parent_id.as_deref(), Some("s1"));
        assert_eq!(a1.state, ContainerState::Loading);

        // Inert until the next tick: no Start was re-sent.
        assert!(mock2.invocations().is_empty());
        restored.tick().await;
        assert_eq!(mock2.calls_for("s1", ControlAction::Status), 1);
        assert_eq!(mock2.calls_for("a1", ControlAction::Status), 1);
    }

    #[tokio::test]
    async fn restore_resumes_a_pending_cascade() {
        let (mock, store, orchestrator) = setup();
        running_session(&mock, &orchestrator, "s1", "u1").await;
        mock.push("s1", Ok(exited_outcome()));
        orchestrator.destroy_container("s1").await.unwrap();
        // Stopped but not yet destroyed: the queue survives the restart.
        assert_eq!(
            orchestrator.list_containers("u1").await[0].next_action,
            Some(NextAction::Destroy)
        );

        let mock2 = Arc::new(MockControlBackend::new());
        mock2.set_default("s1", Ok(exited_outcome()));
        let restored = Orchestrator::new(mock2.clone(), store);
        restored.restore().await.unwrap();
        restored.tick().await;
        assert!(restored.list_containers("u1").await.is_empty());
        assert_eq!(mock2.calls_for("s1", ControlAction::Destroy), 1);
    }

    #[tokio::test]
    async fn shutdown_persists_and_suppresses_transitions() {
        let (mock, store, orchestrator) = setup();
        running_session(&mock, &orchestrator, "s1", "u1").await;

        orchestrator.shutdown().await;

        // Machines are closed: callers get their snapshot back unchanged.
        let ctx = orchestrator.stop_container("s1").await.unwrap();
        assert_eq!(ctx.state, ContainerState::Running);

        let snapshot = SnapshotStore::new(store).load().unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].state, ContainerState::Running);
    }

    #[tokio::test]
    async fn every_change_persists_the_full_snapshot() {
        let (mock, store, orchestrator) = setup();
        mock.push("s1", Ok(loading_outcome()));
        orchestrator.start_session("s1", "u1").await.unwrap();

        let snapshot = SnapshotStore::new(store).load().unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].id, "s1");
        assert_eq!(snapshot[0].state, ContainerState::Loading);
    }
}
