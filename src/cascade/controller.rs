//! The cascade actor.
//!
//! One task owns the [`CascadeState`]. Selections arrive as commands, lookups
//! run as separate tasks and re-enter the actor as completions, and every
//! mutation is published as a [`Snapshot`] on a watch channel.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};

use super::state::{CascadeState, FetchCompletion, FetchRequest, Outcome, SelectionError, Snapshot};
use crate::location::{Level, LocationService};

const COMMAND_QUEUE: usize = 64;

enum Command {
    Select {
        level: Level,
        value: String,
        reply: oneshot::Sender<Result<Snapshot, SelectionError>>,
    },
    Retry {
        level: Level,
        reply: oneshot::Sender<Snapshot>,
    },
    Shutdown,
}

pub struct CascadeController {
    state: CascadeState,
    service: Arc<dyn LocationService>,
    completions: mpsc::UnboundedSender<FetchCompletion>,
    snapshots: watch::Sender<Snapshot>,
}

impl CascadeController {
    /// Start the actor and kick off the country lookup.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(service: Arc<dyn LocationService>) -> CascadeHandle {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_QUEUE);
        let (completion_tx, completion_rx) = mpsc::unbounded_channel();

        let mut state = CascadeState::new();
        let initial = state.initialize();
        let (snapshot_tx, snapshot_rx) = watch::channel(state.snapshot());

        let controller = Self {
            state,
            service,
            completions: completion_tx,
            snapshots: snapshot_tx,
        };
        controller.dispatch(initial);
        tokio::spawn(controller.run(command_rx, completion_rx));

        CascadeHandle {
            commands: command_tx,
            snapshots: snapshot_rx,
        }
    }

    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut completions: mpsc::UnboundedReceiver<FetchCompletion>,
    ) {
        loop {
            tokio::select! {
                biased;
                Some(done) = completions.recv() => {
                    if self.state.apply(done) == Outcome::Applied {
                        self.publish();
                    }
                }
                command = commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.handle(command),
                },
            }
        }
        tracing::debug!("cascade controller stopped");
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Select { level, value, reply } => {
                let result = match level {
                    Level::Country => Ok(self.state.select_country(&value)),
                    Level::State => self.state.select_state(&value),
                    Level::City => self.state.select_city(&value).map(|()| None),
                };
                let result = match result {
                    Ok(request) => {
                        if let Some(request) = request {
                            self.dispatch(request);
                        }
                        Ok(self.publish())
                    }
                    Err(e) => {
                        tracing::debug!(error = %e, "selection rejected");
                        Err(e)
                    }
                };
                let _ = reply.send(result);
            }
            Command::Retry { level, reply } => {
                if let Some(request) = self.state.retry(level) {
                    self.dispatch(request);
                }
                let _ = reply.send(self.publish());
            }
            Command::Shutdown => {}
        }
    }

    fn dispatch(&self, request: FetchRequest) {
        let service = Arc::clone(&self.service);
        let done = self.completions.clone();
        tokio::spawn(async move {
            let result = service.lookup(&request.scope).await;
            // The actor may already be gone; nothing left to update then.
            let _ = done.send(request.complete(result));
        });
    }

    fn publish(&self) -> Snapshot {
        let snapshot = self.state.snapshot();
        self.snapshots.send_replace(snapshot.clone());
        snapshot
    }
}

/// Cloneable front door to a running [`CascadeController`].
#[derive(Clone)]
pub struct CascadeHandle {
    commands: mpsc::Sender<Command>,
    snapshots: watch::Receiver<Snapshot>,
}

impl CascadeHandle {
    pub async fn select_country(&self, value: impl Into<String>) -> Result<Snapshot, SelectionError> {
        self.select(Level::Country, value.into()).await
    }

    pub async fn select_state(&self, value: impl Into<String>) -> Result<Snapshot, SelectionError> {
        self.select(Level::State, value.into()).await
    }

    pub async fn select_city(&self, value: impl Into<String>) -> Result<Snapshot, SelectionError> {
        self.select(Level::City, value.into()).await
    }

    /// Apply a selection. The returned snapshot reflects the synchronous part
    /// of the transition (resets and loading flags), not the lookup result.
    pub async fn select(&self, level: Level, value: String) -> Result<Snapshot, SelectionError> {
        let (reply, response) = oneshot::channel();
        self.send(Command::Select { level, value, reply }).await?;
        response.await.map_err(|_| SelectionError::ControllerClosed)?
    }

    pub async fn retry(&self, level: Level) -> Result<Snapshot, SelectionError> {
        let (reply, response) = oneshot::channel();
        self.send(Command::Retry { level, reply }).await?;
        response.await.map_err(|_| SelectionError::ControllerClosed)
    }

    /// Latest published state.
    pub fn snapshot(&self) -> Snapshot {
        self.snapshots.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.snapshots.clone()
    }

    /// Resolve once no list is loading.
    pub async fn wait_idle(&self) -> Result<Snapshot, SelectionError> {
        let mut rx = self.snapshots.clone();
        let snapshot = rx
            .wait_for(Snapshot::is_idle)
            .await
            .map_err(|_| SelectionError::ControllerClosed)?;
        Ok(snapshot.clone())
    }

    pub async fn shutdown(&self) {
        let _ = self.commands.send(Command::Shutdown).await;
    }

    async fn send(&self, command: Command) -> Result<(), SelectionError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| SelectionError::ControllerClosed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cascade::LoadStatus;
    use crate::location::LocationError;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::sync::Notify;

    type Canned = Result<Vec<String>, u16>;

    /// In-process service with canned answers and optional gates that hold a
    /// states lookup until released.
    #[derive(Default)]
    struct FakeService {
        countries: Option<Canned>,
        states: HashMap<String, Canned>,
        cities: HashMap<(String, String), Canned>,
        gates: HashMap<String, Arc<Notify>>,
        calls: Mutex<Vec<String>>,
    }

    fn names(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn answer(canned: Option<&Canned>) -> Result<Vec<String>, LocationError> {
        match canned {
            Some(Ok(list)) => Ok(list.clone()),
            Some(Err(code)) => Err(LocationError::Status(*code)),
            None => Err(LocationError::Status(404)),
        }
    }

    impl FakeService {
        fn new(countries: &[&str]) -> Self {
            Self {
                countries: Some(Ok(names(countries))),
                ..Self::default()
            }
        }

        fn with_states(mut self, country: &str, states: &[&str]) -> Self {
            self.states.insert(country.into(), Ok(names(states)));
            self
        }

        fn with_failing_states(mut self, country: &str) -> Self {
            self.states.insert(country.into(), Err(500));
            self
        }

        fn with_cities(mut self, country: &str, state: &str, cities: &[&str]) -> Self {
            self.cities
                .insert((country.into(), state.into()), Ok(names(cities)));
            self
        }

        fn gated(mut self, country: &str) -> (Self, Arc<Notify>) {
            let gate = Arc::new(Notify::new());
            self.gates.insert(country.into(), Arc::clone(&gate));
            (self, gate)
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl LocationService for FakeService {
        async fn countries(&self) -> Result<Vec<String>, LocationError> {
            self.calls.lock().unwrap().push("countries".into());
            answer(self.countries.as_ref())
        }

        async fn states(&self, country: &str) -> Result<Vec<String>, LocationError> {
            self.calls.lock().unwrap().push(format!("states:{}", country));
            if let Some(gate) = self.gates.get(country) {
                gate.notified().await;
            }
            answer(self.states.get(country))
        }

        async fn cities(&self, country: &str, state: &str) -> Result<Vec<String>, LocationError> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("cities:{}/{}", country, state));
            answer(self.cities.get(&(country.to_string(), state.to_string())))
        }
    }

    fn spawn(service: FakeService) -> (CascadeHandle, Arc<FakeService>) {
        let service = Arc::new(service);
        let handle = CascadeController::spawn(service.clone());
        (handle, service)
    }

    /// Let every runnable task settle (time is paused in these tests).
    async fn settle() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    #[tokio::test]
    async fn test_countries_loaded_on_spawn() {
        let (handle, _) = spawn(FakeService::new(&["A", "B"]));
        let snapshot = handle.wait_idle().await.unwrap();

        assert_eq!(snapshot.countries.options, names(&["A", "B"]));
        assert!(!snapshot.countries.loading);
        assert!(snapshot.error.is_none());
    }

    #[tokio::test]
    async fn test_countries_failure_sets_error() {
        let service = FakeService {
            countries: Some(Err(503)),
            ..FakeService::default()
        };
        let (handle, _) = spawn(service);
        let snapshot = handle.wait_idle().await.unwrap();

        assert!(snapshot.countries.options.is_empty());
        assert_eq!(snapshot.countries.status, LoadStatus::Failed);
        assert_eq!(
            snapshot.error.as_deref(),
            Some("Failed to load countries. Please try again later.")
        );
    }

    #[tokio::test]
    async fn test_full_walk_to_summary() {
        let service = FakeService::new(&["A", "B"])
            .with_states("A", &["S1"])
            .with_cities("A", "S1", &["C1", "C2"]);
        let (handle, service) = spawn(service);
        handle.wait_idle().await.unwrap();

        let after_select = handle.select_country("A").await.unwrap();
        assert!(after_select.states.loading);
        assert!(!after_select.states.enabled);

        let snapshot = handle.wait_idle().await.unwrap();
        assert_eq!(snapshot.selection.country, "A");
        assert!(snapshot.selection.state.is_empty());
        assert_eq!(snapshot.states.options, names(&["S1"]));

        handle.select_state("S1").await.unwrap();
        let snapshot = handle.wait_idle().await.unwrap();
        assert_eq!(snapshot.cities.options, names(&["C1", "C2"]));
        assert!(snapshot.selection.city.is_empty());

        let snapshot = handle.select_city("C1").await.unwrap();
        assert_eq!(snapshot.summary.as_deref(), Some("You selected C1, S1, A"));
        assert_eq!(
            service.calls(),
            vec!["countries", "states:A", "cities:A/S1"]
        );
    }

    #[tokio::test]
    async fn test_states_failure_is_recovered() {
        let service = FakeService::new(&["A"]).with_failing_states("A");
        let (handle, _) = spawn(service);
        handle.wait_idle().await.unwrap();

        let snapshot = handle.select_country("A").await.unwrap();
        assert!(snapshot.error.is_none());

        let snapshot = handle.wait_idle().await.unwrap();
        assert!(snapshot.states.options.is_empty());
        assert!(!snapshot.states.loading);
        assert_eq!(
            snapshot.error.as_deref(),
            Some("Failed to load states for A. Please try again later.")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_states_never_populate_new_scope() {
        let (service, gate_a) = FakeService::new(&["A", "B"])
            .with_states("A", &["A1", "A2"])
            .with_states("B", &["B1"])
            .gated("A");
        let (service, gate_b) = service.gated("B");
        let (handle, _) = spawn(service);
        handle.wait_idle().await.unwrap();

        handle.select_country("A").await.unwrap();
        handle.select_country("B").await.unwrap();

        gate_a.notify_one();
        settle().await;
        let snapshot = handle.snapshot();
        assert!(snapshot.states.options.is_empty());
        assert!(snapshot.states.loading);
        assert_eq!(snapshot.selection.country, "B");

        gate_b.notify_one();
        let snapshot = handle.wait_idle().await.unwrap();
        assert_eq!(snapshot.states.options, names(&["B1"]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_states_after_newer_landed() {
        let (service, gate_a) = FakeService::new(&["A", "B"])
            .with_states("A", &["A1"])
            .with_states("B", &["B1"])
            .gated("A");
        let (handle, _) = spawn(service);
        handle.wait_idle().await.unwrap();

        handle.select_country("A").await.unwrap();
        handle.select_country("B").await.unwrap();
        let snapshot = handle.wait_idle().await.unwrap();
        assert_eq!(snapshot.states.options, names(&["B1"]));

        gate_a.notify_one();
        settle().await;
        assert_eq!(handle.snapshot().states.options, names(&["B1"]));
    }

    #[tokio::test]
    async fn test_state_before_country_rejected() {
        let (handle, _) = spawn(FakeService::new(&["A"]));
        handle.wait_idle().await.unwrap();

        let err = handle.select_state("S1").await.unwrap_err();
        assert_eq!(
            err,
            SelectionError::MissingParent {
                level: Level::State,
                parent: Level::Country,
            }
        );
        assert!(handle.snapshot().selection.state.is_empty());
    }

    #[tokio::test]
    async fn test_retry_after_failure() {
        let service = FakeService::new(&["A"]).with_failing_states("A");
        let (handle, service) = spawn(service);
        handle.wait_idle().await.unwrap();
        handle.select_country("A").await.unwrap();
        handle.wait_idle().await.unwrap();

        let snapshot = handle.retry(Level::State).await.unwrap();
        assert!(snapshot.error.is_none());
        assert!(snapshot.states.loading);
        handle.wait_idle().await.unwrap();
        assert_eq!(service.calls(), vec!["countries", "states:A", "states:A"]);
    }

    #[tokio::test]
    async fn test_shutdown_closes_handle() {
        let (handle, _) = spawn(FakeService::new(&["A"]));
        handle.wait_idle().await.unwrap();
        handle.shutdown().await;

        let err = handle.select_country("A").await.unwrap_err();
        assert_eq!(err, SelectionError::ControllerClosed);
    }
}
