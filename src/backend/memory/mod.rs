//! In-memory backend used as the isolated test double.
//!
//! Besides storing rows it records how many requests it received, can be
//! scripted to report a session only after a number of polls, and can inject
//! failures (including row-level security rejections) into matching requests.

mod eval;
pub mod pattern;
mod table;

pub use table::{TableData, TableSchema};

use super::Backend;
use crate::client::Session;
use crate::core::{RepoError, Result, Row};
use crate::query::{Projection, QueryRequest, RequestKind};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;

/// Request counters, for call-count assertions in tests.
#[derive(Debug, Default)]
pub struct BackendStats {
    requests: AtomicUsize,
    selects: AtomicUsize,
    mutations: AtomicUsize,
    session_polls: AtomicUsize,
}

impl BackendStats {
    fn record(&self, request: &QueryRequest) {
        self.requests.fetch_add(1, Ordering::SeqCst);
        if request.is_mutation() {
            self.mutations.fetch_add(1, Ordering::SeqCst);
        } else {
            self.selects.fetch_add(1, Ordering::SeqCst);
        }
    }

    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    pub fn selects(&self) -> usize {
        self.selects.load(Ordering::SeqCst)
    }

    pub fn mutations(&self) -> usize {
        self.mutations.load(Ordering::SeqCst)
    }

    pub fn session_polls(&self) -> usize {
        self.session_polls.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.requests.store(0, Ordering::SeqCst);
        self.selects.store(0, Ordering::SeqCst);
        self.mutations.store(0, Ordering::SeqCst);
        self.session_polls.store(0, Ordering::SeqCst);
    }
}

#[derive(Debug, Default)]
struct SessionScript {
    session: Option<Session>,
    /// Polls that still report "no session" before `session` is visible.
    pending_polls: usize,
}

/// Failure injected into requests that match its table / kind filters.
#[derive(Debug, Clone)]
pub struct Fault {
    error: RepoError,
    table: Option<String>,
    kind: Option<RequestKind>,
    mutations_only: bool,
    skip: usize,
    times: usize,
}

impl Fault {
    pub fn new(error: RepoError) -> Self {
        Self {
            error,
            table: None,
            kind: None,
            mutations_only: false,
            skip: 0,
            times: 1,
        }
    }

    /// Row-level security rejection, as the backend reports it.
    pub fn policy_violation(table: &str) -> Self {
        Self::new(RepoError::from_backend(
            crate::core::error::POLICY_VIOLATION_CODE,
            format!("new row violates row-level security policy for table \"{table}\""),
            None,
        ))
        .on_table(table)
        .mutations_only()
    }

    pub fn on_table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    pub fn on_kind(mut self, kind: RequestKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn mutations_only(mut self) -> Self {
        self.mutations_only = true;
        self
    }

    /// Let the first `count` matching requests through before failing.
    pub fn after(mut self, count: usize) -> Self {
        self.skip = count;
        self
    }

    /// Fail this many matching requests.
    pub fn times(mut self, count: usize) -> Self {
        self.times = count;
        self
    }

    fn applies_to(&self, request: &QueryRequest) -> bool {
        self.table.as_deref().is_none_or(|table| table == request.table())
            && self.kind.is_none_or(|kind| kind == request.kind())
            && (!self.mutations_only || request.is_mutation())
    }
}

/// Serializable copy of the backend's tables and session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BackendSnapshot {
    #[serde(default)]
    pub tables: BTreeMap<String, TableData>,
    #[serde(default)]
    pub session: Option<Session>,
}

pub struct InMemoryBackend {
    name: String,
    tables: RwLock<HashMap<String, TableData>>,
    stats: BackendStats,
    session: Mutex<SessionScript>,
    faults: Mutex<VecDeque<Fault>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::with_tables(Vec::new())
    }

    /// Backend pre-populated with empty tables.
    pub fn with_tables(schemas: impl IntoIterator<Item = TableSchema>) -> Self {
        let tables = schemas
            .into_iter()
            .map(|schema| (schema.name.clone(), TableData::new(schema)))
            .collect();
        Self::build(tables, None)
    }

    pub fn from_snapshot(snapshot: BackendSnapshot) -> Self {
        Self::build(snapshot.tables.into_iter().collect(), snapshot.session)
    }

    fn build(tables: HashMap<String, TableData>, session: Option<Session>) -> Self {
        Self {
            name: "in-memory".to_string(),
            tables: RwLock::new(tables),
            stats: BackendStats::default(),
            session: Mutex::new(SessionScript {
                session,
                pending_polls: 0,
            }),
            faults: Mutex::new(VecDeque::new()),
        }
    }

    /// Attaches a ready session (builder form).
    pub fn with_session(self, session: Session) -> Self {
        if let Ok(mut script) = self.session.lock() {
            script.session = Some(session);
            script.pending_polls = 0;
        }
        self
    }

    pub fn stats(&self) -> &BackendStats {
        &self.stats
    }

    pub fn request_count(&self) -> usize {
        self.stats.requests()
    }

    pub fn mutation_count(&self) -> usize {
        self.stats.mutations()
    }

    pub fn session_poll_count(&self) -> usize {
        self.stats.session_polls()
    }

    pub async fn create_table(&self, schema: TableSchema) -> Result<()> {
        let mut tables = self.tables.write().await;
        if tables.contains_key(&schema.name) {
            return Err(RepoError::from_backend(
                "42P07",
                format!("relation \"{}\" already exists", schema.name),
                None,
            ));
        }
        tables.insert(schema.name.clone(), TableData::new(schema));
        Ok(())
    }

    /// Writes rows directly, bypassing faults, counters and read-only checks.
    pub async fn seed(&self, table: &str, rows: Vec<Row>) -> Result<Vec<Row>> {
        let mut tables = self.tables.write().await;
        let data = tables
            .get_mut(table)
            .ok_or_else(|| RepoError::TableNotFound(table.to_string()))?;
        data.insert(&rows, None)
    }

    /// Raw stored rows, including soft-deleted ones.
    pub async fn rows(&self, table: &str) -> Result<Vec<Row>> {
        let tables = self.tables.read().await;
        tables
            .get(table)
            .map(|data| data.rows.clone())
            .ok_or_else(|| RepoError::TableNotFound(table.to_string()))
    }

    pub async fn snapshot(&self) -> Result<BackendSnapshot> {
        let tables = self.tables.read().await;
        let session = self.session.lock()?.session.clone();
        Ok(BackendSnapshot {
            tables: tables
                .iter()
                .map(|(name, data)| (name.clone(), data.clone()))
                .collect(),
            session,
        })
    }

    pub fn set_session(&self, session: Option<Session>) -> Result<()> {
        let mut script = self.session.lock()?;
        script.session = session;
        script.pending_polls = 0;
        Ok(())
    }

    /// Reports no session for the next `polls` polls, then `session`.
    pub fn session_ready_after(&self, polls: usize, session: Session) -> Result<()> {
        let mut script = self.session.lock()?;
        script.session = Some(session);
        script.pending_polls = polls;
        Ok(())
    }

    pub fn inject_fault(&self, fault: Fault) -> Result<()> {
        self.faults.lock()?.push_back(fault);
        Ok(())
    }

    pub fn clear_faults(&self) -> Result<()> {
        self.faults.lock()?.clear();
        Ok(())
    }

    fn take_fault(&self, request: &QueryRequest) -> Result<Option<RepoError>> {
        let mut faults = self.faults.lock()?;
        let mut triggered = None;

        for fault in faults.iter_mut().filter(|fault| fault.applies_to(request)) {
            if fault.skip > 0 {
                fault.skip -= 1;
                continue;
            }
            if fault.times > 0 {
                fault.times -= 1;
                triggered = Some(fault.error.clone());
                break;
            }
        }

        faults.retain(|fault| fault.times > 0);
        Ok(triggered)
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn project_returning(rows: Vec<Row>, returning: Option<&Projection>) -> Vec<Row> {
    match returning {
        Some(projection) => rows.iter().map(|row| projection.apply(row)).collect(),
        None => vec![Row::new(); rows.len()],
    }
}

#[async_trait]
impl Backend for InMemoryBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, request: &QueryRequest) -> Result<Vec<Row>> {
        self.stats.record(request);
        if let Some(error) = self.take_fault(request)? {
            return Err(error);
        }

        match request {
            QueryRequest::Select(select) => {
                let tables = self.tables.read().await;
                let data = tables
                    .get(&select.table)
                    .ok_or_else(|| RepoError::TableNotFound(select.table.clone()))?;
                data.select(select)
            }
            QueryRequest::Insert(insert) => {
                let mut tables = self.tables.write().await;
                let data = tables
                    .get_mut(&insert.table)
                    .ok_or_else(|| RepoError::TableNotFound(insert.table.clone()))?;
                data.ensure_writable()?;
                let written = data.insert(&insert.rows, insert.on_conflict.as_ref())?;
                Ok(project_returning(written, insert.returning.as_ref()))
            }
            QueryRequest::Update(update) => {
                let mut tables = self.tables.write().await;
                let data = tables
                    .get_mut(&update.table)
                    .ok_or_else(|| RepoError::TableNotFound(update.table.clone()))?;
                data.ensure_writable()?;
                let touched = data.update(&update.patch, &update.filters)?;
                Ok(project_returning(touched, update.returning.as_ref()))
            }
            QueryRequest::Delete(delete) => {
                let mut tables = self.tables.write().await;
                let data = tables
                    .get_mut(&delete.table)
                    .ok_or_else(|| RepoError::TableNotFound(delete.table.clone()))?;
                data.ensure_writable()?;
                let removed = data.delete(&delete.filters)?;
                Ok(project_returning(removed, delete.returning.as_ref()))
            }
        }
    }

    async fn current_session(&self) -> Result<Option<Session>> {
        self.stats.session_polls.fetch_add(1, Ordering::SeqCst);
        let mut script = self.session.lock()?;
        if script.pending_polls > 0 {
            script.pending_polls -= 1;
            return Ok(None);
        }
        Ok(script.session.clone())
    }
}
