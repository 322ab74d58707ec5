//! Relational store handle shared by every engine component
//!
//! A `Store` is a bounded pool of SQLite connections to one database file.
//! Several processes may open the same file; correctness never depends on
//! in-process locking, only on SQLite's own transaction locks:
//! - write transactions begin IMMEDIATE and queue on the database lock
//! - single-statement counter updates are atomic by themselves
//!
//! Each operation runs on a blocking worker under a [`Deadline`]. Waiting
//! for another writer's lock stops at the deadline, a running statement is
//! interrupted when it passes, and scoped transactions re-check the deadline
//! right before COMMIT. A caller that stops waiting cancels the operation
//! the same way, so an abandoned or expired operation never commits.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use rusqlite::{Connection, InterruptHandle, OpenFlags, Transaction, TransactionBehavior};
use tokio::sync::Semaphore;

use crate::core::config::StoreConfig;
use crate::core::error::{EngineError, ErrorKind, Result};

/// Schema SQL embedded at compile time.
const SCHEMA_SQL: &str = include_str!("schema.sql");

/// Lock waits may run this far past the deadline so that a wait given up
/// on is always reported as an expired deadline.
const BUSY_GRACE: Duration = Duration::from_millis(25);

/// Point in time after which an operation must not commit
///
/// Clones share one cancellation flag: cancelling any of them stops every
/// transaction guarded by the others.
#[derive(Debug, Clone)]
pub struct Deadline {
    at: Instant,
    budget: Duration,
    cancelled: Arc<AtomicBool>,
}

impl Deadline {
    pub fn after(budget: Duration) -> Self {
        Self {
            at: Instant::now() + budget,
            budget,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn remaining(&self) -> Duration {
        self.at.saturating_duration_since(Instant::now())
    }

    pub fn expired(&self) -> bool {
        Instant::now() >= self.at
    }

    /// Withdraw permission to commit before the deadline passes
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn check(&self) -> Result<()> {
        if self.expired() {
            Err(self.exceeded())
        } else if self.is_cancelled() {
            Err(EngineError::Cancelled)
        } else {
            Ok(())
        }
    }

    pub fn exceeded(&self) -> EngineError {
        EngineError::DeadlineExceeded {
            budget: self.budget,
        }
    }
}

/// Run `body` inside an IMMEDIATE transaction that commits only on success
///
/// Any error from `body`, an expired deadline or a cancelled one drops the
/// transaction, which rolls back every write made through it.
pub fn scoped_transaction<T>(
    conn: &mut Connection,
    deadline: Deadline,
    body: impl FnOnce(&Transaction<'_>) -> Result<T>,
) -> Result<T> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let value = body(&tx)?;
    deadline.check()?;
    tx.commit()?;
    Ok(value)
}

/// Interrupt handle for the connection an operation currently holds
///
/// The worker detaches the handle before the connection goes back to the
/// pool, so a late interrupt never reaches another operation.
#[derive(Default)]
struct InterruptSlot(Mutex<Option<InterruptHandle>>);

impl InterruptSlot {
    fn attach(&self, conn: &Connection) {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner) = Some(conn.get_interrupt_handle());
    }

    fn detach(&self) {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).take();
    }

    /// Returns false when no connection is attached
    fn interrupt(&self) -> bool {
        match self.0.lock().unwrap_or_else(PoisonError::into_inner).as_ref() {
            Some(handle) => {
                handle.interrupt();
                true
            }
            None => false,
        }
    }
}

/// Cancels the operation if the caller stops polling `Store::run`
struct AbandonGuard {
    deadline: Deadline,
    slot: Arc<InterruptSlot>,
    settled: bool,
}

impl Drop for AbandonGuard {
    fn drop(&mut self) {
        if !self.settled {
            tracing::debug!("Caller abandoned store operation; cancelling");
            self.deadline.cancel();
            self.slot.interrupt();
        }
    }
}

struct Pool {
    path: PathBuf,
    busy_timeout: Duration,
    default_budget: Duration,
    max_idle: usize,
    idle: Mutex<Vec<Connection>>,
    slots: Arc<Semaphore>,
}

impl Pool {
    fn checkout(&self) -> Result<Connection> {
        let reused = self.idle.lock().unwrap_or_else(PoisonError::into_inner).pop();
        match reused {
            Some(conn) => Ok(conn),
            None => open_connection(&self.path, self.busy_timeout),
        }
    }

    fn checkin(&self, conn: Connection) {
        let mut idle = self.idle.lock().unwrap_or_else(PoisonError::into_inner);
        if idle.len() < self.max_idle {
            idle.push(conn);
        }
    }

    /// Check out a connection and run `op` on it, blocking the thread
    fn execute<T, F>(&self, slot: &InterruptSlot, deadline: Deadline, op: F) -> Result<T>
    where
        F: FnOnce(&mut Connection, Deadline) -> Result<T>,
    {
        deadline.check()?;
        let mut conn = self.checkout()?;
        slot.attach(&conn);

        let result = conn
            .busy_timeout(self.busy_timeout.min(deadline.remaining() + BUSY_GRACE))
            .map_err(EngineError::from)
            .and_then(|()| op(&mut conn, deadline.clone()));

        slot.detach();
        match result {
            Ok(value) => {
                self.checkin(conn);
                Ok(value)
            }
            Err(err) if err.kind() == ErrorKind::Storage && deadline.expired() => {
                if !err.is_interrupt() {
                    tracing::debug!("Store operation failed after its deadline: {}", err);
                }
                Err(deadline.exceeded())
            }
            Err(err) => Err(err),
        }
    }
}

fn open_connection(path: &Path, busy_timeout: Duration) -> Result<Connection> {
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;
    conn.busy_timeout(busy_timeout)?;
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    Ok(conn)
}

/// Pooled handle to the survivor database
#[derive(Clone)]
pub struct Store {
    inner: Arc<Pool>,
}

impl Store {
    /// Open (creating if needed) the database described by `config`
    ///
    /// Switches the file to WAL so readers never block the writer, and
    /// applies the schema.
    pub fn open(config: &StoreConfig) -> Result<Self> {
        let path = config.database_path.clone();
        let conn = open_connection(&path, config.busy_timeout())?;
        let mode: String = conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
        conn.execute_batch(SCHEMA_SQL)?;
        tracing::debug!("Opened store at {} (journal_mode={})", path.display(), mode);

        let max = config.max_connections.max(1);
        let pool = Pool {
            path,
            busy_timeout: config.busy_timeout(),
            default_budget: config.operation_timeout(),
            max_idle: max,
            idle: Mutex::new(vec![conn]),
            slots: Arc::new(Semaphore::new(max)),
        };
        Ok(Self {
            inner: Arc::new(pool),
        })
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// Budget applied when a caller does not supply its own deadline
    pub fn default_budget(&self) -> Duration {
        self.inner.default_budget
    }

    /// Connections currently parked in the pool
    pub fn idle_connections(&self) -> usize {
        self.inner.idle.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Run `op` against a pooled connection within `budget`
    ///
    /// The budget covers the wait for a free connection, the wait for the
    /// database lock and the store work. On expiry the running statement is
    /// interrupted and the call returns `DeadlineExceeded`, unless the
    /// worker had already finished successfully, in which case its result is
    /// returned. Dropping the returned future cancels the operation: it is
    /// interrupted and its transaction cannot commit. A connection whose
    /// operation failed is discarded rather than reused.
    pub async fn run<T, F>(&self, budget: Duration, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection, Deadline) -> Result<T> + Send + 'static,
    {
        let deadline = Deadline::after(budget);

        let permit = tokio::time::timeout(budget, Arc::clone(&self.inner.slots).acquire_owned())
            .await
            .map_err(|_| deadline.exceeded())?
            .map_err(|e| EngineError::Worker(e.to_string()))?;

        let slot = Arc::new(InterruptSlot::default());
        let mut guard = AbandonGuard {
            deadline: deadline.clone(),
            slot: Arc::clone(&slot),
            settled: false,
        };

        let pool = Arc::clone(&self.inner);
        let worker_slot = Arc::clone(&slot);
        let worker_deadline = deadline.clone();
        let mut task = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            pool.execute(&worker_slot, worker_deadline, op)
        });

        let outcome = match tokio::time::timeout(deadline.remaining(), &mut task).await {
            Ok(joined) => joined,
            Err(_) => {
                tracing::warn!(
                    "Store operation exceeded {:?} deadline; interrupting",
                    budget
                );
                slot.interrupt();
                task.await
            }
        };
        guard.settled = true;
        outcome.map_err(|e| EngineError::Worker(e.to_string()))?
    }
}
