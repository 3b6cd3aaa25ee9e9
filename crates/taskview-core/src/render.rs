use std::io::{self, IsTerminal, Write};

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use unicode_width::UnicodeWidthStr;

use crate::config::Config;
use crate::datetime::{DayBounds, format_local_date};
use crate::summary::{CategorySummary, ViewCounts};
use crate::task::{Priority, Task};
use crate::view::ViewName;

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
    tz: Tz,
}

impl Renderer {
    pub fn new(cfg: &Config, tz: Tz) -> Self {
        let color = cfg.get_bool("color").unwrap_or(true);
        Self {
            color: color && io::stdout().is_terminal(),
            tz,
        }
    }

    pub fn plain(tz: Tz) -> Self {
        Self { color: false, tz }
    }

    #[tracing::instrument(skip(self, out, tasks, now), fields(view = %view, rows = tasks.len()))]
    pub fn write_task_table<W: Write>(
        &self,
        out: &mut W,
        view: &ViewName,
        tasks: &[Task],
        now: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        if tasks.is_empty() {
            writeln!(out, "No tasks in {view}.")?;
            return Ok(());
        }

        let bounds = DayBounds::at(now, self.tz);
        let headers = vec![
            "ID".to_string(),
            "Due".to_string(),
            "Category".to_string(),
            "Pri".to_string(),
            "Title".to_string(),
        ];

        let mut rows = Vec::with_capacity(tasks.len());
        for task in tasks {
            let due = task
                .due_date
                .map(|date| format_local_date(date, self.tz))
                .unwrap_or_default();
            let overdue = !task.completed
                && task
                    .due_date
                    .is_some_and(|date| bounds.day_of(date) < bounds.today);
            let due = if overdue { self.paint(&due, "31") } else { due };

            let title = if task.completed {
                format!("[x] {}", task.title)
            } else {
                task.title.clone()
            };

            rows.push(vec![
                self.paint(&task.id.to_string(), "33"),
                due,
                task.category_id.clone(),
                self.paint_priority(task.priority),
                title,
            ]);
        }

        write_table(&mut *out, headers, rows)?;
        writeln!(out)?;
        writeln!(out, "{} task{} in {view}", tasks.len(), plural(tasks.len()))?;
        Ok(())
    }

    #[tracing::instrument(skip(self, out, task))]
    pub fn write_task_info<W: Write>(&self, out: &mut W, task: &Task) -> anyhow::Result<()> {
        writeln!(out, "id          {}", task.id)?;
        writeln!(out, "title       {}", task.title)?;
        if !task.description.is_empty() {
            writeln!(out, "description {}", task.description)?;
        }
        writeln!(out, "category    {}", task.category_id)?;
        writeln!(out, "priority    {}", task.priority)?;
        if let Some(due) = task.due_date {
            writeln!(out, "due         {}", format_local_date(due, self.tz))?;
        }
        writeln!(out, "completed   {}", if task.completed { "yes" } else { "no" })?;
        if let Some(done) = task.completed_at {
            writeln!(out, "finished    {}", done.to_rfc3339())?;
        }
        writeln!(out, "created     {}", task.created_at.to_rfc3339())?;
        writeln!(out, "updated     {}", task.updated_at.to_rfc3339())?;
        Ok(())
    }

    pub fn write_counts<W: Write>(&self, out: &mut W, counts: &ViewCounts) -> anyhow::Result<()> {
        let rows = vec![
            vec![ViewName::AllActive.to_string(), counts.total.to_string()],
            vec![ViewName::Today.to_string(), counts.today.to_string()],
            vec![ViewName::Upcoming.to_string(), counts.upcoming.to_string()],
            vec![ViewName::Completed.to_string(), counts.completed.to_string()],
        ];
        write_table(out, vec!["View".to_string(), "Tasks".to_string()], rows)
    }

    pub fn write_categories<W: Write>(
        &self,
        out: &mut W,
        summaries: &[CategorySummary],
    ) -> anyhow::Result<()> {
        if summaries.is_empty() {
            writeln!(out, "No categories.")?;
            return Ok(());
        }

        let rows = summaries
            .iter()
            .map(|summary| {
                vec![
                    summary.category.id.clone(),
                    summary.category.name.clone(),
                    summary.category.color.clone(),
                    summary.active_tasks.to_string(),
                ]
            })
            .collect();
        write_table(
            out,
            vec![
                "ID".to_string(),
                "Name".to_string(),
                "Color".to_string(),
                "Active".to_string(),
            ],
            rows,
        )
    }

    fn paint_priority(&self, priority: Priority) -> String {
        let label = match priority {
            Priority::High => "H",
            Priority::Medium => "M",
            Priority::Low => "L",
        };
        match priority {
            Priority::High => self.paint(label, "31"),
            Priority::Medium => self.paint(label, "33"),
            Priority::Low => label.to_string(),
        }
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

fn plural(n: usize) -> &'static str {
    if n == 1 { "" } else { "s" }
}

fn write_table<W: Write>(
    mut writer: W,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let column_count = headers.len();
    let mut widths = vec![0usize; column_count];

    for (idx, header) in headers.iter().enumerate() {
        widths[idx] = widths[idx].max(UnicodeWidthStr::width(header.as_str()));
    }

    for row in &rows {
        for (idx, cell) in row.iter().enumerate() {
            widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    for (header, width) in headers.iter().zip(&widths) {
        write!(writer, "{header:width$} ")?;
    }
    writeln!(writer)?;

    for width in &widths {
        write!(writer, "{:-<width$} ", "")?;
    }
    writeln!(writer)?;

    for row in rows {
        for (cell, width) in row.iter().zip(&widths) {
            let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
            let padding = width.saturating_sub(visible_width);
            write!(writer, "{}{} ", cell, " ".repeat(padding))?;
        }
        writeln!(writer)?;
    }

    Ok(())
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            if ch == 'm' {
                escaped = false;
            }
            continue;
        }

        if ch == '\x1b' {
            escaped = true;
            continue;
        }

        out.push(ch);
    }

    out
}
