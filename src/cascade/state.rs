//! The synchronous cascade state machine.
//!
//! Every selection operation mutates the chain immediately and returns the
//! lookup that has to be dispatched, if any. Lookups carry a ticket; a
//! completion is applied only while its ticket is still the live one for its
//! level, so responses for a superseded scope are dropped.

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::location::{Level, LocationError, Scope};

/// Request id issued with every lookup.
pub type Ticket = u64;

/// The current country → state → city chain. Empty string means "no selection".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Selection {
    pub country: String,
    pub state: String,
    pub city: String,
}

impl Selection {
    pub fn get(&self, level: Level) -> &str {
        match level {
            Level::Country => &self.country,
            Level::State => &self.state,
            Level::City => &self.city,
        }
    }

    /// "You selected {city}, {state}, {country}" once all three levels are set.
    pub fn summary(&self) -> Option<String> {
        if self.country.is_empty() || self.state.is_empty() || self.city.is_empty() {
            return None;
        }
        Some(format!("You selected {}, {}, {}", self.city, self.state, self.country))
    }
}

/// Load status of one option list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadStatus {
    #[default]
    Idle,
    Loading,
    Loaded,
    Failed,
}

#[derive(Debug, Clone, Default)]
struct OptionList {
    options: Vec<String>,
    status: LoadStatus,
    loaded_at: Option<DateTime<Utc>>,
    pending: Option<Ticket>,
}

impl OptionList {
    fn reset(&mut self) {
        *self = Self::default();
    }
}

/// A lookup the controller must dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub ticket: Ticket,
    pub scope: Scope,
}

/// The result of a dispatched lookup, fed back into [`CascadeState::apply`].
#[derive(Debug)]
pub struct FetchCompletion {
    pub ticket: Ticket,
    pub scope: Scope,
    pub result: Result<Vec<String>, LocationError>,
}

impl FetchRequest {
    pub fn complete(self, result: Result<Vec<String>, LocationError>) -> FetchCompletion {
        FetchCompletion {
            ticket: self.ticket,
            scope: self.scope,
            result,
        }
    }
}

/// What happened to a completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Applied,
    /// The scope moved on (or a newer request was issued) before it arrived.
    Stale,
}

/// A selection that would break the chain invariant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectionError {
    #[error("Cannot select a {level} before a {parent} is selected")]
    MissingParent { level: Level, parent: Level },
    #[error("Cascade controller is no longer running")]
    ControllerClosed,
}

/// Presentation view of one level.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LevelView {
    pub options: Vec<String>,
    pub status: LoadStatus,
    pub loading: bool,
    /// Whether the control for this level should accept input.
    pub enabled: bool,
    pub loaded_at: Option<DateTime<Utc>>,
}

/// Immutable copy of the whole cascade, handed to presentation adapters.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Snapshot {
    pub selection: Selection,
    pub countries: LevelView,
    pub states: LevelView,
    pub cities: LevelView,
    pub error: Option<String>,
    pub summary: Option<String>,
}

impl Snapshot {
    pub fn level(&self, level: Level) -> &LevelView {
        match level {
            Level::Country => &self.countries,
            Level::State => &self.states,
            Level::City => &self.cities,
        }
    }

    /// True when no list is waiting on a lookup.
    pub fn is_idle(&self) -> bool {
        Level::ALL.iter().all(|l| !self.level(*l).loading)
    }
}

/// Selection chain, option lists, load statuses and the shared error slot.
#[derive(Debug, Default)]
pub struct CascadeState {
    selection: Selection,
    lists: [OptionList; 3],
    error: Option<String>,
    last_ticket: Ticket,
}

impl CascadeState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start loading the country list.
    pub fn initialize(&mut self) -> FetchRequest {
        self.begin(Scope::Countries)
    }

    pub fn select_country(&mut self, value: &str) -> Option<FetchRequest> {
        tracing::debug!(country = value, "select country");
        self.selection.country = value.to_string();
        self.selection.state.clear();
        self.selection.city.clear();
        self.list_mut(Level::State).reset();
        self.list_mut(Level::City).reset();

        if value.is_empty() {
            return None;
        }
        Some(self.begin(Scope::States {
            country: value.to_string(),
        }))
    }

    pub fn select_state(&mut self, value: &str) -> Result<Option<FetchRequest>, SelectionError> {
        self.require_parent(Level::State, value)?;
        tracing::debug!(state = value, "select state");
        self.selection.state = value.to_string();
        self.selection.city.clear();
        self.list_mut(Level::City).reset();

        if value.is_empty() {
            return Ok(None);
        }
        Ok(Some(self.begin(Scope::Cities {
            country: self.selection.country.clone(),
            state: value.to_string(),
        })))
    }

    pub fn select_city(&mut self, value: &str) -> Result<(), SelectionError> {
        self.require_parent(Level::City, value)?;
        tracing::debug!(city = value, "select city");
        self.selection.city = value.to_string();
        Ok(())
    }

    /// Re-issue the lookup for `level` under the current chain.
    ///
    /// States and cities are retried by re-selecting their governing value,
    /// which resets everything below it. Returns `None` when the governing
    /// selection is empty.
    pub fn retry(&mut self, level: Level) -> Option<FetchRequest> {
        match level {
            Level::Country => Some(self.begin(Scope::Countries)),
            Level::State => {
                let country = self.selection.country.clone();
                if country.is_empty() {
                    return None;
                }
                self.select_country(&country)
            }
            Level::City => {
                let state = self.selection.state.clone();
                if state.is_empty() {
                    return None;
                }
                self.select_state(&state).ok().flatten()
            }
        }
    }

    /// Fold a lookup result into the state, unless it is stale.
    pub fn apply(&mut self, completion: FetchCompletion) -> Outcome {
        let FetchCompletion { ticket, scope, result } = completion;
        let list = self.list_mut(scope.level());

        if list.pending != Some(ticket) {
            tracing::debug!(ticket, %scope, "discarding stale lookup result");
            return Outcome::Stale;
        }
        list.pending = None;

        match result {
            Ok(options) => {
                tracing::info!(ticket, %scope, count = options.len(), "loaded");
                list.options = options;
                list.status = LoadStatus::Loaded;
                list.loaded_at = Some(Utc::now());
            }
            Err(e) => {
                tracing::warn!(ticket, %scope, error = %e, "lookup failed");
                list.status = LoadStatus::Failed;
                self.error = Some(scope.failure_message());
            }
        }
        Outcome::Applied
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn options(&self, level: Level) -> &[String] {
        &self.list(level).options
    }

    pub fn status(&self, level: Level) -> LoadStatus {
        self.list(level).status
    }

    pub fn is_loading(&self, level: Level) -> bool {
        self.status(level) == LoadStatus::Loading
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn summary(&self) -> Option<String> {
        self.selection.summary()
    }

    /// A control is usable when its governing selection is set and its own
    /// list is not loading.
    pub fn is_enabled(&self, level: Level) -> bool {
        let parent_set = level
            .parent()
            .map_or(true, |p| !self.selection.get(p).is_empty());
        parent_set && !self.is_loading(level)
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            selection: self.selection.clone(),
            countries: self.view(Level::Country),
            states: self.view(Level::State),
            cities: self.view(Level::City),
            error: self.error.clone(),
            summary: self.summary(),
        }
    }

    fn view(&self, level: Level) -> LevelView {
        let list = self.list(level);
        LevelView {
            options: list.options.clone(),
            status: list.status,
            loading: list.status == LoadStatus::Loading,
            enabled: self.is_enabled(level),
            loaded_at: list.loaded_at,
        }
    }

    fn begin(&mut self, scope: Scope) -> FetchRequest {
        self.last_ticket += 1;
        let ticket = self.last_ticket;
        self.error = None;

        let list = self.list_mut(scope.level());
        list.status = LoadStatus::Loading;
        list.pending = Some(ticket);

        tracing::debug!(ticket, %scope, "lookup issued");
        FetchRequest { ticket, scope }
    }

    fn require_parent(&self, level: Level, value: &str) -> Result<(), SelectionError> {
        let Some(parent) = level.parent() else {
            return Ok(());
        };
        if !value.is_empty() && self.selection.get(parent).is_empty() {
            return Err(SelectionError::MissingParent { level, parent });
        }
        Ok(())
    }

    fn list(&self, level: Level) -> &OptionList {
        &self.lists[level.index()]
    }

    fn list_mut(&mut self, level: Level) -> &mut OptionList {
        &mut self.lists[level.index()]
    }
}
