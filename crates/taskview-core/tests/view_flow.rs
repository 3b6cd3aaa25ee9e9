use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use taskview_core::cli::{AddArgs, Command, ListArgs};
use taskview_core::commands::{Context, dispatch};
use taskview_core::datastore::DataStore;
use taskview_core::datetime::{Clock, FixedClock, parse_due_date};
use taskview_core::engine::{Transition, ViewEngine};
use taskview_core::render::Renderer;
use taskview_core::repository::{CategoryRepository, TaskRepository};
use taskview_core::service::{ServiceSettings, TaskService};
use taskview_core::task::TaskDraft;
use taskview_core::view::ViewName;
use tempfile::tempdir;

fn service_over(store: Arc<DataStore>, clock: Arc<FixedClock>) -> TaskService {
    TaskService::new(
        store.clone() as Arc<dyn TaskRepository>,
        store as Arc<dyn CategoryRepository>,
        clock as Arc<dyn Clock>,
        ViewEngine::new(chrono_tz::America::New_York),
        ServiceSettings::default(),
    )
}

#[tokio::test]
async fn views_follow_mutations_against_the_datastore() {
    let temp = tempdir().expect("tempdir");
    // 23:30 in New York on Feb 16, already Feb 17 in UTC.
    let now = Utc.with_ymd_and_hms(2026, 2, 17, 4, 30, 0).unwrap();
    let clock = Arc::new(FixedClock::new(now));
    let tz = chrono_tz::America::New_York;
    let store = Arc::new(DataStore::open(temp.path(), clock.clone()).expect("open datastore"));
    let service = service_over(store.clone(), clock.clone());

    service.open_view(&ViewName::Today).await.unwrap();
    service.open_view(&ViewName::Upcoming).await.unwrap();
    service.open_view(&ViewName::Completed).await.unwrap();

    let mut milk = TaskDraft::new("Buy milk");
    milk.due_date = Some(parse_due_date("today", now, tz).unwrap());
    let milk = service.create_task(milk, None).await.unwrap().task;
    assert_eq!(
        milk.due_date,
        Some(Utc.with_ymd_and_hms(2026, 2, 16, 5, 0, 0).unwrap())
    );

    let mut report = TaskDraft::new("Write report");
    report.due_date = Some(parse_due_date("tomorrow", now, tz).unwrap());
    let report = service.create_task(report, None).await.unwrap();
    let upcoming = report
        .changes
        .iter()
        .find(|change| change.view == ViewName::Upcoming)
        .unwrap();
    assert_eq!(upcoming.transition, Transition::Inserted);

    let today: Vec<u64> = service
        .displayed(&ViewName::Today)
        .unwrap()
        .iter()
        .map(|t| t.id)
        .collect();
    assert_eq!(today, vec![milk.id]);

    service.toggle_complete(milk.id).await.unwrap();
    assert!(service.displayed(&ViewName::Today).unwrap().is_empty());
    assert_eq!(service.displayed(&ViewName::Completed).unwrap().len(), 1);

    // A fresh process sees the same data, and the next local day shifts
    // the report from upcoming into today.
    clock.advance(Duration::days(1));
    let reopened = Arc::new(DataStore::open(temp.path(), clock.clone()).expect("reopen"));
    let service = service_over(reopened, clock.clone());
    let today = service.open_view(&ViewName::Today).await.unwrap();
    assert_eq!(today.len(), 1);
    assert_eq!(today[0].title, "Write report");
    assert!(service.open_view(&ViewName::Upcoming).await.unwrap().is_empty());
}

#[tokio::test]
async fn dispatch_adds_and_lists_through_the_cli_surface() {
    let temp = tempdir().expect("tempdir");
    let now = Utc.with_ymd_and_hms(2026, 2, 16, 15, 0, 0).unwrap();
    let clock = Arc::new(FixedClock::new(now));
    let store = Arc::new(DataStore::open(temp.path(), clock.clone()).expect("open datastore"));
    let ctx = Context {
        service: service_over(store, clock.clone()),
        renderer: Renderer::plain(chrono_tz::America::New_York),
        clock: clock.clone() as Arc<dyn Clock>,
        tz: chrono_tz::America::New_York,
        default_view: ViewName::AllActive,
    };

    let mut out = Vec::new();
    dispatch(
        &ctx,
        Some(Command::Add(AddArgs {
            title: vec!["Call".to_string(), "mom".to_string()],
            description: None,
            category: None,
            priority: None,
            due: None,
            view: Some(ViewName::Today),
        })),
        &mut out,
    )
    .await
    .unwrap();
    let text = String::from_utf8(out).unwrap();
    assert!(text.contains("Created task 1 'Call mom'."));
    assert!(text.contains("Now showing in today."));

    let mut out = Vec::new();
    dispatch(
        &ctx,
        Some(Command::List(ListArgs {
            view: Some(ViewName::Today),
            ..ListArgs::default()
        })),
        &mut out,
    )
    .await
    .unwrap();
    let text = String::from_utf8(out).unwrap();
    assert!(text.contains("Call mom"));
    assert!(text.contains("2026-02-16"));
    assert!(text.ends_with("1 task in today\n"));

    let mut out = Vec::new();
    dispatch(&ctx, Some(Command::Toggle { id: 1 }), &mut out)
        .await
        .unwrap();
    assert_eq!(String::from_utf8(out).unwrap(), "Completed task 1 'Call mom'.\n");

    let mut out = Vec::new();
    dispatch(&ctx, Some(Command::Counts { json: true }), &mut out)
        .await
        .unwrap();
    assert_eq!(
        String::from_utf8(out).unwrap(),
        "{\"total\":0,\"today\":0,\"upcoming\":0,\"completed\":1}\n"
    );
}
