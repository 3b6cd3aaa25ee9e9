use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, error, info, instrument, warn};

use crate::datetime::Clock;
use crate::engine::{ViewChange, ViewEngine};
use crate::error::{Error, Result};
use crate::filter::TaskFilter;
use crate::repository::{CategoryRepository, TaskRepository};
use crate::sort::SortStrategy;
use crate::summary::{CategorySummary, ViewCounts, category_summaries, count_views};
use crate::task::{Category, CategoryDraft, CategoryPatch, Task, TaskDraft, TaskPatch};
use crate::view::ViewName;

#[derive(Debug, Clone, Default)]
pub struct ServiceSettings {
    pub default_category: Option<String>,
    pub fetch_limit: Option<usize>,
    pub default_sorts: HashMap<ViewName, SortStrategy>,
}

/// A confirmed mutation and what it did to each open view.
#[derive(Debug, Clone)]
pub struct MutationOutcome {
    pub task: Task,
    pub changes: Vec<ViewChange>,
}

/// Couples the repositories to the view engine. The engine only sees a
/// mutation after the repository call returned `Ok`; the engine lock is never
/// held across an await, so concurrent mutations land in completion order.
pub struct TaskService {
    tasks: Arc<dyn TaskRepository>,
    categories: Arc<dyn CategoryRepository>,
    clock: Arc<dyn Clock>,
    engine: Mutex<ViewEngine>,
    settings: ServiceSettings,
}

impl TaskService {
    pub fn new(
        tasks: Arc<dyn TaskRepository>,
        categories: Arc<dyn CategoryRepository>,
        clock: Arc<dyn Clock>,
        engine: ViewEngine,
        settings: ServiceSettings,
    ) -> Self {
        Self {
            tasks,
            categories,
            clock,
            engine: Mutex::new(engine),
            settings,
        }
    }

    /// Loads a fresh snapshot and (re)opens `view` over it.
    #[instrument(skip(self, view), fields(view = %view))]
    pub async fn open_view(&self, view: &ViewName) -> Result<Vec<Task>> {
        let snapshot = self.fetch_tasks().await?;
        let now = self.clock.now();

        let mut engine = self.engine.lock();
        let was_open = engine.is_open(view);
        engine.open(view.clone(), &snapshot, now)?;
        if !was_open && let Some(strategy) = self.settings.default_sorts.get(view) {
            engine.apply_sort(view, *strategy)?;
        }
        engine.displayed(view)
    }

    pub async fn refresh(&self, view: &ViewName) -> Result<Vec<Task>> {
        self.open_view(view).await
    }

    pub fn close_view(&self, view: &ViewName) -> bool {
        self.engine.lock().close(view)
    }

    pub fn displayed(&self, view: &ViewName) -> Result<Vec<Task>> {
        self.engine.lock().displayed(view)
    }

    pub fn member_count(&self, view: &ViewName) -> Result<usize> {
        self.engine.lock().member_count(view)
    }

    pub fn apply_filter(&self, view: &ViewName, filter: TaskFilter) -> Result<Vec<Task>> {
        let mut engine = self.engine.lock();
        engine.apply_filter(view, filter)?;
        engine.displayed(view)
    }

    pub fn apply_sort(&self, view: &ViewName, strategy: SortStrategy) -> Result<Vec<Task>> {
        let mut engine = self.engine.lock();
        engine.apply_sort(view, strategy)?;
        engine.displayed(view)
    }

    /// Creates a task. `from_view` applies that view's quick-add defaults.
    #[instrument(skip(self, draft))]
    pub async fn create_task(
        &self,
        draft: TaskDraft,
        from_view: Option<&ViewName>,
    ) -> Result<MutationOutcome> {
        let mut draft = draft.validated()?;
        if let Some(view) = from_view {
            let bounds = self.engine.lock().bounds(self.clock.now());
            draft = view.quick_add_defaults(draft, &bounds);
        }
        if draft.category_id.is_none() {
            draft.category_id = self.settings.default_category.clone();
        }

        let task = self.tasks.create(draft).await.inspect_err(|err| {
            error!(error = %err, "create failed; views left unchanged");
        })?;

        let changes = self.engine.lock().on_created(&task, self.clock.now())?;
        info!(id = task.id, "task created");
        Ok(MutationOutcome { task, changes })
    }

    #[instrument(skip(self, patch))]
    pub async fn update_task(&self, id: u64, patch: TaskPatch) -> Result<MutationOutcome> {
        if let Some(title) = patch.title.as_deref()
            && title.trim().is_empty()
        {
            return Err(Error::validation("title is required"));
        }
        if patch.is_empty() {
            debug!(id, "empty patch; only updated_at will change");
        }

        let task = self.tasks.update(id, patch).await.inspect_err(|err| {
            error!(id, error = %err, "update failed; views left unchanged");
        })?;

        let changes = self.engine.lock().on_updated(&task, self.clock.now())?;
        Ok(MutationOutcome { task, changes })
    }

    /// Flips completion, setting or clearing `completed_at` with it.
    #[instrument(skip(self))]
    pub async fn toggle_complete(&self, id: u64) -> Result<MutationOutcome> {
        let current = self.tasks.get_by_id(id).await?;
        let patch = TaskPatch::completion(!current.completed);

        let task = self.tasks.update(id, patch).await.inspect_err(|err| {
            error!(id, error = %err, "toggle failed; views left unchanged");
        })?;

        let changes = self.engine.lock().on_toggled(&task, self.clock.now())?;
        info!(id, completed = task.completed, "task toggled");
        Ok(MutationOutcome { task, changes })
    }

    #[instrument(skip(self))]
    pub async fn delete_task(&self, id: u64) -> Result<MutationOutcome> {
        let task = self.tasks.delete(id).await.inspect_err(|err| {
            error!(id, error = %err, "delete failed; views left unchanged");
        })?;

        let changes = self.engine.lock().on_deleted(id);
        info!(id, "task deleted");
        Ok(MutationOutcome { task, changes })
    }

    /// Deletes every completed task. Each confirmed delete is applied to the
    /// views; the first failure is returned once all deletes were attempted.
    #[instrument(skip(self))]
    pub async fn clear_completed(&self) -> Result<usize> {
        let completed: Vec<u64> = self
            .tasks
            .list_all()
            .await?
            .into_iter()
            .filter(|task| task.completed)
            .map(|task| task.id)
            .collect();

        let mut cleared = 0;
        let mut first_error = None;
        for id in completed {
            match self.tasks.delete(id).await {
                Ok(_) => {
                    self.engine.lock().on_deleted(id);
                    cleared += 1;
                }
                Err(err) => {
                    warn!(id, error = %err, "failed to clear completed task");
                    first_error.get_or_insert(err);
                }
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => {
                info!(cleared, "cleared completed tasks");
                Ok(cleared)
            }
        }
    }

    pub async fn view_counts(&self) -> Result<ViewCounts> {
        let tasks = self.tasks.list_all().await?;
        let bounds = self.engine.lock().bounds(self.clock.now());
        Ok(count_views(&tasks, &bounds))
    }

    pub async fn category_summaries(&self) -> Result<Vec<CategorySummary>> {
        let categories = self.categories.list_all().await?;
        let tasks = self.tasks.list_all().await?;
        Ok(category_summaries(&categories, &tasks))
    }

    pub async fn category(&self, id: &str) -> Result<Category> {
        self.categories.get_by_id(id).await
    }

    pub async fn create_category(&self, draft: CategoryDraft) -> Result<Category> {
        self.categories.create(draft).await
    }

    pub async fn update_category(&self, id: &str, patch: CategoryPatch) -> Result<Category> {
        self.categories.update(id, patch).await
    }

    pub async fn delete_category(&self, id: &str) -> Result<Category> {
        self.categories.delete(id).await
    }

    async fn fetch_tasks(&self) -> Result<Vec<Task>> {
        let mut tasks = self.tasks.list_all().await?;
        if let Some(limit) = self.settings.fetch_limit
            && tasks.len() > limit
        {
            debug!(limit, total = tasks.len(), "truncating fetched tasks");
            tasks.truncate(limit);
        }
        Ok(tasks)
    }
}
