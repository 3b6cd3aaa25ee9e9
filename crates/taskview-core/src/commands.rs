use std::io::Write;
use std::sync::Arc;

use anyhow::{Context as _, anyhow};
use chrono_tz::Tz;
use tracing::{debug, info, instrument};

use crate::cli::{AddArgs, CategoryAddArgs, Command, EditArgs, ListArgs};
use crate::datetime::{Clock, parse_due_date};
use crate::engine::Transition;
use crate::filter::TaskFilter;
use crate::render::Renderer;
use crate::service::TaskService;
use crate::task::{CategoryDraft, TaskDraft, TaskPatch};
use crate::view::ViewName;

/// Everything a command needs, built once per invocation.
pub struct Context {
    pub service: TaskService,
    pub renderer: Renderer,
    pub clock: Arc<dyn Clock>,
    pub tz: Tz,
    pub default_view: ViewName,
}

#[instrument(skip(ctx, command, out))]
pub async fn dispatch<W: Write>(
    ctx: &Context,
    command: Option<Command>,
    out: &mut W,
) -> anyhow::Result<()> {
    let command = command.unwrap_or_else(|| {
        debug!(view = %ctx.default_view, "no command given, listing default view");
        Command::List(ListArgs::default())
    });

    match command {
        Command::List(args) => cmd_list(ctx, args, out).await,
        Command::Add(args) => cmd_add(ctx, args, out).await,
        Command::Edit(args) => cmd_edit(ctx, args, out).await,
        Command::Toggle { id } => cmd_toggle(ctx, id, out).await,
        Command::Delete { id } => cmd_delete(ctx, id, out).await,
        Command::ClearCompleted => cmd_clear_completed(ctx, out).await,
        Command::Counts { json } => cmd_counts(ctx, json, out).await,
        Command::Categories => cmd_categories(ctx, out).await,
        Command::CategoryAdd(args) => cmd_category_add(ctx, args, out).await,
        Command::CategoryDelete { id } => cmd_category_delete(ctx, &id, out).await,
    }
}

#[instrument(skip(ctx, args, out))]
async fn cmd_list<W: Write>(ctx: &Context, args: ListArgs, out: &mut W) -> anyhow::Result<()> {
    let view = args.view.unwrap_or_else(|| ctx.default_view.clone());
    info!(view = %view, "command list");

    ctx.service
        .open_view(&view)
        .await
        .with_context(|| format!("failed to load {view}"))?;

    if args.search.is_some() || args.priority.is_some() {
        let filter = TaskFilter::new(args.search.as_deref(), args.priority.unwrap_or_default());
        ctx.service.apply_filter(&view, filter)?;
    }
    if let Some(strategy) = args.sort {
        ctx.service.apply_sort(&view, strategy)?;
    }

    let tasks = ctx.service.displayed(&view)?;
    if args.json {
        serde_json::to_writer_pretty(&mut *out, &tasks)?;
        writeln!(out)?;
        return Ok(());
    }

    ctx.renderer
        .write_task_table(out, &view, &tasks, ctx.clock.now())
}

#[instrument(skip(ctx, args, out))]
async fn cmd_add<W: Write>(ctx: &Context, args: AddArgs, out: &mut W) -> anyhow::Result<()> {
    info!("command add");

    let mut draft = TaskDraft::new(args.title.join(" "));
    draft.description = args.description;
    draft.category_id = args.category;
    draft.priority = args.priority;
    if let Some(raw) = args.due.as_deref() {
        draft.due_date = Some(parse_due_date(raw, ctx.clock.now(), ctx.tz)?);
    }

    if let Some(view) = args.view.as_ref() {
        ctx.service.open_view(view).await?;
    }

    let outcome = ctx
        .service
        .create_task(draft, args.view.as_ref())
        .await
        .context("failed to add task")?;

    writeln!(out, "Created task {} '{}'.", outcome.task.id, outcome.task.title)?;
    for change in &outcome.changes {
        if change.transition == Transition::Inserted {
            writeln!(out, "Now showing in {}.", change.view)?;
        }
    }
    Ok(())
}

#[instrument(skip(ctx, args, out), fields(id = args.id))]
async fn cmd_edit<W: Write>(ctx: &Context, args: EditArgs, out: &mut W) -> anyhow::Result<()> {
    info!("command edit");

    let due_date = if args.no_due {
        Some(None)
    } else {
        args.due
            .as_deref()
            .map(|raw| parse_due_date(raw, ctx.clock.now(), ctx.tz))
            .transpose()?
            .map(Some)
    };

    let patch = TaskPatch {
        title: args.title,
        description: args.description,
        category_id: args.category,
        priority: args.priority,
        due_date,
        completed: None,
    };
    if patch.is_empty() {
        return Err(anyhow!("nothing to change for task {}", args.id));
    }

    let outcome = ctx
        .service
        .update_task(args.id, patch)
        .await
        .with_context(|| format!("failed to modify task {}", args.id))?;

    writeln!(out, "Modified task {}.", outcome.task.id)?;
    ctx.renderer.write_task_info(out, &outcome.task)
}

#[instrument(skip(ctx, out))]
async fn cmd_toggle<W: Write>(ctx: &Context, id: u64, out: &mut W) -> anyhow::Result<()> {
    info!("command toggle");

    let outcome = ctx
        .service
        .toggle_complete(id)
        .await
        .with_context(|| format!("failed to toggle task {id}"))?;

    let verb = if outcome.task.completed {
        "Completed"
    } else {
        "Reopened"
    };
    writeln!(out, "{verb} task {id} '{}'.", outcome.task.title)?;
    Ok(())
}

#[instrument(skip(ctx, out))]
async fn cmd_delete<W: Write>(ctx: &Context, id: u64, out: &mut W) -> anyhow::Result<()> {
    info!("command delete");

    let outcome = ctx
        .service
        .delete_task(id)
        .await
        .with_context(|| format!("failed to delete task {id}"))?;

    writeln!(out, "Deleted task {id} '{}'.", outcome.task.title)?;
    Ok(())
}

#[instrument(skip(ctx, out))]
async fn cmd_clear_completed<W: Write>(ctx: &Context, out: &mut W) -> anyhow::Result<()> {
    info!("command clear-completed");

    let cleared = ctx
        .service
        .clear_completed()
        .await
        .context("failed to clear completed tasks")?;
    let noun = if cleared == 1 { "task" } else { "tasks" };
    writeln!(out, "Cleared {cleared} completed {noun}.")?;
    Ok(())
}

async fn cmd_counts<W: Write>(ctx: &Context, json: bool, out: &mut W) -> anyhow::Result<()> {
    let counts = ctx.service.view_counts().await?;
    if json {
        serde_json::to_writer(&mut *out, &counts)?;
        writeln!(out)?;
        return Ok(());
    }
    ctx.renderer.write_counts(out, &counts)
}

async fn cmd_categories<W: Write>(ctx: &Context, out: &mut W) -> anyhow::Result<()> {
    let summaries = ctx.service.category_summaries().await?;
    ctx.renderer.write_categories(out, &summaries)
}

#[instrument(skip(ctx, args, out))]
async fn cmd_category_add<W: Write>(
    ctx: &Context,
    args: CategoryAddArgs,
    out: &mut W,
) -> anyhow::Result<()> {
    info!("command category-add");

    let category = ctx
        .service
        .create_category(CategoryDraft {
            name: args.name.join(" "),
            color: args.color,
            icon: args.icon,
        })
        .await
        .context("failed to add category")?;

    writeln!(out, "Created category {} '{}'.", category.id, category.name)?;
    Ok(())
}

#[instrument(skip(ctx, out))]
async fn cmd_category_delete<W: Write>(
    ctx: &Context,
    id: &str,
    out: &mut W,
) -> anyhow::Result<()> {
    info!("command category-delete");

    let category = ctx
        .service
        .delete_category(id)
        .await
        .with_context(|| format!("failed to delete category {id}"))?;

    writeln!(out, "Deleted category {} '{}'.", category.id, category.name)?;
    Ok(())
}
