// List view resynchronization after transitions
//
// No optimistic patching: rows change only when a refetched page arrives. A page
// fetched for an outdated query or a closed view is never applied, and neither is a
// page issued before the one already shown.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info, warn};

use crate::api::errors::ApiError;
use crate::api::traits::ModerationApi;
use crate::api::types::{ListPage, ListQuery};
use crate::moderation::types::{EntityKey, EntityKind, ModerableEntity};

/// View state captured when an action starts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewTicket {
    revision: u64,
    query: ListQuery,
}

impl ViewTicket {
    pub fn query(&self) -> &ListQuery {
        &self.query
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RefetchOutcome {
    /// The action-time page was refetched and applied. `present` says whether the
    /// transitioned entity is still on it (it may have left the active filter).
    Refreshed { total: u64, present: bool },
    /// The operator navigated since the action started; the entity is marked stale instead
    Superseded,
    /// The view was closed before the response arrived
    Discarded,
    /// No list view is open for this kind
    NoActiveView,
    /// The refetch failed; the entity is marked stale
    Failed { error: ApiError },
}

#[derive(Debug)]
struct ViewState {
    query: ListQuery,
    revision: u64,
    page: Option<ListPage<ModerableEntity>>,
    stale: HashSet<EntityKey>,
    torn_down: bool,
    /// Sequence number handed to the next page request
    next_fetch: u64,
    /// Sequence number of the page currently shown
    shown_fetch: u64,
}

impl ViewState {
    fn issue_fetch(&mut self) -> u64 {
        self.next_fetch += 1;
        self.next_fetch
    }
}

/// One open list view (novels or categories)
pub struct ListConsistencyCoordinator {
    kind: EntityKind,
    api: Arc<dyn ModerationApi>,
    state: Mutex<ViewState>,
}

impl std::fmt::Debug for ListConsistencyCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListConsistencyCoordinator")
            .field("kind", &self.kind)
            .field("state", &self.state)
            .finish()
    }
}

impl ListConsistencyCoordinator {
    pub fn new(kind: EntityKind, api: Arc<dyn ModerationApi>, query: ListQuery) -> Self {
        Self {
            kind,
            api,
            state: Mutex::new(ViewState {
                query,
                revision: 0,
                page: None,
                stale: HashSet::new(),
                torn_down: false,
                next_fetch: 0,
                shown_fetch: 0,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, ViewState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    pub fn query(&self) -> ListQuery {
        self.state().query.clone()
    }

    /// Capture the query in effect now, for a refetch after the action settles
    pub fn ticket(&self) -> ViewTicket {
        let state = self.state();
        ViewTicket {
            revision: state.revision,
            query: state.query.clone(),
        }
    }

    /// Fetch the current query's page and show it
    pub async fn load(&self) -> Result<ListPage<ModerableEntity>, ApiError> {
        let (ticket, fetch) = {
            let mut state = self.state();
            let fetch = state.issue_fetch();
            let ticket = ViewTicket {
                revision: state.revision,
                query: state.query.clone(),
            };
            (ticket, fetch)
        };
        let page = self.api.fetch_page(self.kind, &ticket.query).await?;
        self.apply_if_current(&ticket, fetch, &page);
        Ok(page)
    }

    /// Switch to a new page / sort / filter and load it
    pub async fn navigate(&self, query: ListQuery) -> Result<ListPage<ModerableEntity>, ApiError> {
        {
            let mut state = self.state();
            state.query = query;
            state.revision += 1;
            debug!(kind = %self.kind, revision = state.revision, "List view navigated");
        }
        self.load().await
    }

    /// Resynchronize after a successful transition on `entity`
    pub async fn refetch(&self, ticket: &ViewTicket, entity: EntityKey) -> RefetchOutcome {
        if let Some(outcome) = self.check_ticket(ticket, entity) {
            return outcome;
        }
        let fetch = self.state().issue_fetch();

        let fetched = self.api.fetch_page(self.kind, &ticket.query).await;

        // The view may have moved on while the request was in flight
        if let Some(outcome) = self.check_ticket(ticket, entity) {
            return outcome;
        }

        match fetched {
            Ok(page) => {
                let (total, present) = if self.apply_if_current(ticket, fetch, &page) {
                    (page.total, page.data.iter().any(|row| row.key() == entity))
                } else {
                    // A page requested later is already shown and reflects this transition
                    self.shown_presence(entity)
                };
                info!(
                    entity = %entity,
                    page = ticket.query.page,
                    total,
                    present,
                    "List refetched after transition"
                );
                RefetchOutcome::Refreshed { total, present }
            }
            Err(error) => {
                warn!(
                    entity = %entity,
                    error = %error,
                    "Refetch after transition failed, marking row stale"
                );
                self.mark_stale(entity);
                RefetchOutcome::Failed { error }
            }
        }
    }

    fn check_ticket(&self, ticket: &ViewTicket, entity: EntityKey) -> Option<RefetchOutcome> {
        let mut state = self.state();
        if state.torn_down {
            debug!(entity = %entity, "View closed, discarding refetch");
            return Some(RefetchOutcome::Discarded);
        }
        if state.revision != ticket.revision {
            state.stale.insert(entity);
            debug!(entity = %entity, "View navigated since action start, marking row stale");
            return Some(RefetchOutcome::Superseded);
        }
        None
    }

    /// Show `page` unless the view moved on or a later-issued page is already shown
    fn apply_if_current(
        &self,
        ticket: &ViewTicket,
        fetch: u64,
        page: &ListPage<ModerableEntity>,
    ) -> bool {
        let mut state = self.state();
        if state.torn_down || state.revision != ticket.revision {
            debug!(kind = %self.kind, "Dropping page fetched for an outdated view");
            return false;
        }
        if fetch < state.shown_fetch {
            debug!(
                kind = %self.kind,
                fetch,
                shown = state.shown_fetch,
                "Dropping page that arrived after a newer one"
            );
            return false;
        }
        state.page = Some(page.clone());
        state.shown_fetch = fetch;
        state.stale.clear();
        true
    }

    fn shown_presence(&self, entity: EntityKey) -> (u64, bool) {
        let state = self.state();
        state.page.as_ref().map_or((0, false), |page| {
            (page.total, page.data.iter().any(|row| row.key() == entity))
        })
    }

    /// Rows currently shown
    pub fn page(&self) -> Option<ListPage<ModerableEntity>> {
        self.state().page.clone()
    }

    pub fn row(&self, entity: EntityKey) -> Option<ModerableEntity> {
        self.state()
            .page
            .as_ref()
            .and_then(|page| page.data.iter().find(|row| row.key() == entity).cloned())
    }

    pub fn mark_stale(&self, entity: EntityKey) {
        self.state().stale.insert(entity);
    }

    /// Shown data for `entity` may predate a transition
    pub fn is_stale(&self, entity: EntityKey) -> bool {
        self.state().stale.contains(&entity)
    }

    /// Close the view; responses arriving afterwards are discarded
    pub fn tear_down(&self) {
        let mut state = self.state();
        state.torn_down = true;
        state.page = None;
        state.stale.clear();
        debug!(kind = %self.kind, "List view torn down");
    }

    pub fn is_torn_down(&self) -> bool {
        self.state().torn_down
    }
}
