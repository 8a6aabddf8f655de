use std::{
    panic::{self, AssertUnwindSafe},
    path::{Path, PathBuf},
    sync::{mpsc, Arc, Mutex, MutexGuard},
    thread::{self, JoinHandle},
    time::Duration,
};

use anyhow::{anyhow, bail, Context, Result};
use log::{error, info, warn};
use rusqlite::{Connection, Transaction, TransactionBehavior};
use tokio::sync::oneshot;

use super::migrations;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

type Job = Box<dyn FnOnce(&mut Connection) + Send + 'static>;

/// Handle to the attendance ledger.
///
/// The connection lives on one thread that runs queued jobs in order, so writes
/// never interleave and readers only ever see committed rows. Clones share the
/// thread; it drains its queue and closes the file when the last clone drops.
#[derive(Clone)]
pub struct Database {
    shared: Arc<Shared>,
}

struct Shared {
    path: PathBuf,
    jobs: Mutex<Option<mpsc::Sender<Job>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Database {
    /// Opens (or creates) the ledger at `path`, brings its schema up to date and
    /// verifies the file before any punch can be written to it.
    pub fn open(path: PathBuf) -> Result<Self> {
        let conn = open_ledger(&path)?;

        let (jobs, inbox) = mpsc::channel::<Job>();
        let worker = thread::Builder::new()
            .name("timeclock-ledger".into())
            .spawn(move || serve(conn, inbox))
            .context("failed to spawn ledger thread")?;

        info!("ledger open at {}", path.display());
        Ok(Self {
            shared: Arc::new(Shared {
                path,
                jobs: Mutex::new(Some(jobs)),
                worker: Mutex::new(Some(worker)),
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.shared.path
    }

    /// False once the ledger thread has exited.
    pub fn is_running(&self) -> bool {
        lock(&self.shared.worker)
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    pub async fn execute<F, T>(&self, task: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let (reply, answer) = oneshot::channel();
        self.submit(Box::new(move |conn| {
            // The caller may have given up waiting; the work is done either way.
            let _ = reply.send(task(conn));
        }))?;

        answer
            .await
            .map_err(|_| anyhow!("ledger job for {} did not complete", self.path().display()))?
    }

    /// Runs `task` inside an immediate transaction. Nothing it wrote survives
    /// unless it returns `Ok`.
    pub async fn write<F, T>(&self, task: F) -> Result<T>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        self.execute(move |conn| {
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .context("failed to begin ledger transaction")?;
            let value = task(&tx)?;
            tx.commit().context("failed to commit ledger transaction")?;
            Ok(value)
        })
        .await
    }

    fn submit(&self, job: Job) -> Result<()> {
        let jobs = lock(&self.shared.jobs);
        let sender = jobs
            .as_ref()
            .ok_or_else(|| anyhow!("ledger is closed"))?;
        sender
            .send(job)
            .map_err(|_| anyhow!("ledger thread has stopped"))
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        // Closing the queue lets the thread finish what is queued and exit.
        self.jobs
            .get_mut()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();

        let worker = self
            .worker
            .get_mut()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(handle) = worker {
            if handle.join().is_err() {
                error!("ledger thread for {} panicked", self.path.display());
            }
        }
    }
}

fn open_ledger(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create ledger directory {}", parent.display()))?;
    }

    let mut conn = Connection::open(path)
        .with_context(|| format!("failed to open ledger {}", path.display()))?;

    let mode: String = conn
        .pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))
        .with_context(|| format!("{} is not a usable SQLite ledger", path.display()))?;
    if !mode.eq_ignore_ascii_case("wal") {
        warn!("ledger journal mode is {mode}; concurrent readers will block on writes");
    }
    // A punch is reported as recorded only after its commit reached the disk.
    conn.pragma_update(None, "synchronous", "FULL")
        .context("failed to set synchronous=FULL")?;
    conn.busy_timeout(BUSY_TIMEOUT)
        .context("failed to set busy timeout")?;

    migrations::migrate(&mut conn)?;

    let check: String = conn
        .query_row("PRAGMA quick_check", [], |row| row.get(0))
        .context("failed to run integrity check")?;
    if check != "ok" {
        bail!("ledger {} failed its integrity check: {check}", path.display());
    }

    Ok(conn)
}

fn serve(mut conn: Connection, inbox: mpsc::Receiver<Job>) {
    for job in inbox {
        // A panicking job loses its own reply but must not take the ledger down.
        if panic::catch_unwind(AssertUnwindSafe(|| job(&mut conn))).is_err() {
            error!("ledger job panicked; continuing with the next one");
        }
    }

    if let Err((_, err)) = conn.close() {
        error!("ledger did not close cleanly: {err}");
    }
    info!("ledger thread stopped");
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
