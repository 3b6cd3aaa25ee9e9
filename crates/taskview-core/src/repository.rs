use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::datetime::Clock;
use crate::error::{Error, Result};
use crate::task::{Category, CategoryDraft, CategoryPatch, Task, TaskDraft, TaskPatch};

#[async_trait]
pub trait TaskRepository: Send + Sync {
    async fn list_all(&self) -> Result<Vec<Task>>;
    async fn get_by_id(&self, id: u64) -> Result<Task>;
    async fn create(&self, draft: TaskDraft) -> Result<Task>;
    async fn update(&self, id: u64, patch: TaskPatch) -> Result<Task>;
    async fn delete(&self, id: u64) -> Result<Task>;
}

#[async_trait]
pub trait CategoryRepository: Send + Sync {
    async fn list_all(&self) -> Result<Vec<Category>>;
    async fn get_by_id(&self, id: &str) -> Result<Category>;
    async fn create(&self, draft: CategoryDraft) -> Result<Category>;
    async fn update(&self, id: &str, patch: CategoryPatch) -> Result<Category>;
    async fn delete(&self, id: &str) -> Result<Category>;
}

pub fn next_task_id(tasks: &[Task]) -> u64 {
    tasks.iter().map(|t| t.id).max().unwrap_or(0) + 1
}

pub fn new_category_id() -> String {
    format!("category_{}", Uuid::new_v4().simple())
}

/// Applies a patch to the task with `id` inside `tasks`. The slice is only
/// touched when the patch validates.
pub(crate) fn patch_in_place(
    tasks: &mut [Task],
    id: u64,
    patch: TaskPatch,
    now: chrono::DateTime<chrono::Utc>,
) -> Result<Task> {
    let task = tasks
        .iter_mut()
        .find(|task| task.id == id)
        .ok_or_else(|| Error::task_not_found(id))?;
    task.apply_patch(patch, now)?;
    Ok(task.clone())
}

/// Knobs for exercising failure and latency paths against the in-memory
/// repositories.
#[derive(Debug, Default)]
pub struct FaultPlan {
    failing: AtomicBool,
    latencies: Mutex<VecDeque<Duration>>,
}

impl FaultPlan {
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Queues a delay for the next call; calls consume delays in FIFO order.
    pub fn push_latency(&self, latency: Duration) {
        self.latencies.lock().push_back(latency);
    }

    async fn before_call(&self, op: &'static str) -> Result<()> {
        let latency = self.latencies.lock().pop_front();
        if let Some(latency) = latency {
            debug!(op, ?latency, "simulating repository latency");
            tokio::time::sleep(latency).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::repository(format!("{op}: simulated backend failure")));
        }
        Ok(())
    }
}

pub struct InMemoryTaskRepository {
    tasks: Mutex<Vec<Task>>,
    clock: Arc<dyn Clock>,
    faults: FaultPlan,
}

impl InMemoryTaskRepository {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_tasks(clock, Vec::new())
    }

    pub fn with_tasks(clock: Arc<dyn Clock>, tasks: Vec<Task>) -> Self {
        Self {
            tasks: Mutex::new(tasks),
            clock,
            faults: FaultPlan::default(),
        }
    }

    pub fn faults(&self) -> &FaultPlan {
        &self.faults
    }

    pub fn snapshot(&self) -> Vec<Task> {
        self.tasks.lock().clone()
    }
}

#[async_trait]
impl TaskRepository for InMemoryTaskRepository {
    #[instrument(skip(self))]
    async fn list_all(&self) -> Result<Vec<Task>> {
        self.faults.before_call("list_all").await?;
        Ok(self.tasks.lock().clone())
    }

    #[instrument(skip(self))]
    async fn get_by_id(&self, id: u64) -> Result<Task> {
        self.faults.before_call("get_by_id").await?;
        self.tasks
            .lock()
            .iter()
            .find(|task| task.id == id)
            .cloned()
            .ok_or_else(|| Error::task_not_found(id))
    }

    #[instrument(skip(self, draft), fields(title_len = draft.title.len()))]
    async fn create(&self, draft: TaskDraft) -> Result<Task> {
        self.faults.before_call("create").await?;
        let now = self.clock.now();
        let mut tasks = self.tasks.lock();
        let task = Task::from_draft(next_task_id(&tasks), draft, now)?;
        // Newest first, matching how the backing list is presented.
        tasks.insert(0, task.clone());
        debug!(id = task.id, "created task");
        Ok(task)
    }

    #[instrument(skip(self, patch))]
    async fn update(&self, id: u64, patch: TaskPatch) -> Result<Task> {
        self.faults.before_call("update").await?;
        let now = self.clock.now();
        patch_in_place(&mut self.tasks.lock(), id, patch, now)
    }

    #[instrument(skip(self))]
    async fn delete(&self, id: u64) -> Result<Task> {
        self.faults.before_call("delete").await?;
        let mut tasks = self.tasks.lock();
        let idx = tasks
            .iter()
            .position(|task| task.id == id)
            .ok_or_else(|| Error::task_not_found(id))?;
        Ok(tasks.remove(idx))
    }
}

pub struct InMemoryCategoryRepository {
    categories: Mutex<Vec<Category>>,
    clock: Arc<dyn Clock>,
    faults: FaultPlan,
}

impl InMemoryCategoryRepository {
    pub fn with_categories(clock: Arc<dyn Clock>, categories: Vec<Category>) -> Self {
        Self {
            categories: Mutex::new(categories),
            clock,
            faults: FaultPlan::default(),
        }
    }

    pub fn faults(&self) -> &FaultPlan {
        &self.faults
    }
}

#[async_trait]
impl CategoryRepository for InMemoryCategoryRepository {
    #[instrument(skip(self))]
    async fn list_all(&self) -> Result<Vec<Category>> {
        self.faults.before_call("list_categories").await?;
        Ok(self.categories.lock().clone())
    }

    #[instrument(skip(self))]
    async fn get_by_id(&self, id: &str) -> Result<Category> {
        self.faults.before_call("get_category").await?;
        self.categories
            .lock()
            .iter()
            .find(|category| category.id == id)
            .cloned()
            .ok_or_else(|| Error::category_not_found(id))
    }

    #[instrument(skip(self, draft))]
    async fn create(&self, draft: CategoryDraft) -> Result<Category> {
        self.faults.before_call("create_category").await?;
        let category = Category::from_draft(new_category_id(), draft, self.clock.now())?;
        self.categories.lock().push(category.clone());
        Ok(category)
    }

    #[instrument(skip(self, patch))]
    async fn update(&self, id: &str, patch: CategoryPatch) -> Result<Category> {
        self.faults.before_call("update_category").await?;
        let mut categories = self.categories.lock();
        let category = categories
            .iter_mut()
            .find(|category| category.id == id)
            .ok_or_else(|| Error::category_not_found(id))?;
        category.apply_patch(patch)?;
        Ok(category.clone())
    }

    #[instrument(skip(self))]
    async fn delete(&self, id: &str) -> Result<Category> {
        self.faults.before_call("delete_category").await?;
        let mut categories = self.categories.lock();
        let idx = categories
            .iter()
            .position(|category| category.id == id)
            .ok_or_else(|| Error::category_not_found(id))?;
        Ok(categories.remove(idx))
    }
}
