//! In-memory session state backed by the [`SessionStore`].
//!
//! Every update is persisted before it becomes visible: the record is applied
//! to a copy of the session, the copy is written, and only then does it
//! replace the in-memory entry. A failed write leaves memory untouched, so the
//! tailer can retry the same line on the next pass without double counting.

use crate::models::{Session, Summary, TokenTotals, UsageRecord};
use crate::pricing;
use crate::store::SessionStore;
use crate::tailer::RecordSink;
use anyhow::Result;
use chrono::Utc;
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use tracing::{debug, info};

pub struct SessionAggregator {
    store: SessionStore,
    sessions: BTreeMap<String, Session>,
}

impl SessionAggregator {
    /// Aggregator with no prior state.
    pub fn new(store: SessionStore) -> Self {
        Self {
            store,
            sessions: BTreeMap::new(),
        }
    }

    /// Aggregator seeded with every session already in the store.
    pub fn open(store: SessionStore) -> Result<Self> {
        let sessions: BTreeMap<String, Session> = store
            .load_all()?
            .into_iter()
            .map(|session| (session.session_id.clone(), session))
            .collect();

        if !sessions.is_empty() {
            info!(count = sessions.len(), dir = %store.dir().display(), "Loaded existing sessions");
        }

        Ok(Self { store, sessions })
    }

    /// Fold one record into its session and persist the result.
    pub fn update(&mut self, record: UsageRecord) -> Result<&Session> {
        let now = Utc::now();
        let session_id = record.session_id.clone();

        let mut session = match self.sessions.get(&session_id) {
            Some(existing) => existing.clone(),
            None => {
                debug!(session_id = %session_id, model = %record.model, "New session");
                Session::new(session_id.clone(), record.model.clone(), now)
            }
        };
        session.apply(record, now);

        self.store.save(&session)?;

        let committed = match self.sessions.entry(session_id) {
            Entry::Occupied(mut slot) => {
                slot.insert(session);
                slot.into_mut()
            }
            Entry::Vacant(slot) => slot.insert(session),
        };
        Ok(committed)
    }

    pub fn get(&self, session_id: &str) -> Option<&Session> {
        self.sessions.get(session_id)
    }

    pub fn sessions(&self) -> impl Iterator<Item = &Session> {
        self.sessions.values()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Aggregate over all sessions, recomputed on every call.
    pub fn summary(&self) -> Summary {
        let mut totals = TokenTotals::default();
        let mut total_cost_usd = 0.0;

        for session in self.sessions.values() {
            totals.add(&session.totals());
            total_cost_usd += pricing::session_cost(session);
        }

        Summary {
            session_count: self.sessions.len(),
            totals,
            total_tokens: totals.total(),
            total_cost_usd,
            session_ids: self.sessions.keys().cloned().collect(),
        }
    }
}

impl RecordSink for SessionAggregator {
    fn update(&mut self, record: UsageRecord) -> Result<()> {
        SessionAggregator::update(self, record).map(|_| ())
    }
}
