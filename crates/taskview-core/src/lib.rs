pub mod cli;
pub mod commands;
pub mod config;
pub mod datastore;
pub mod datetime;
pub mod engine;
pub mod error;
pub mod filter;
pub mod render;
pub mod repository;
pub mod service;
pub mod sort;
pub mod summary;
pub mod task;
pub mod view;

use std::collections::HashMap;
use std::ffi::OsString;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{
  debug,
  info
};

use crate::datetime::{
  Clock,
  SystemClock
};
use crate::engine::ViewEngine;
use crate::repository::{
  CategoryRepository,
  TaskRepository
};
use crate::service::{
  ServiceSettings,
  TaskService
};
use crate::view::ViewName;

#[tracing::instrument(skip_all)]
pub fn run(
  raw_args: Vec<OsString>
) -> anyhow::Result<()> {
  let pre =
    cli::preprocess_args(&raw_args)?;
  let cli = cli::GlobalCli::parse_from(
    pre.cleaned_args
  );

  cli::init_tracing(
    cli.verbose,
    cli.quiet
  )?;

  info!(
    verbose = cli.verbose,
    quiet = cli.quiet,
    "starting taskview CLI"
  );
  debug!(?pre.rc_overrides, "preprocessed rc overrides");

  let mut cfg = config::Config::load(
    cli.config.as_deref()
  )?;
  cfg.apply_overrides(
    pre.rc_overrides.into_iter().chain(
      cli
        .rc_overrides
        .into_iter()
        .map(|kv| (kv.key, kv.value))
    )
  );

  let tz = cfg.timezone()?;
  let data_dir =
    config::resolve_data_dir(
      &cfg,
      cli.data.as_deref()
    )
    .context(
      "failed to resolve data \
       directory"
    )?;

  let clock: Arc<dyn Clock> =
    Arc::new(SystemClock);
  let store = Arc::new(
    datastore::DataStore::open(
      &data_dir,
      clock.clone()
    )
    .with_context(|| {
      format!(
        "failed to open datastore at \
         {}",
        data_dir.display()
      )
    })?
  );

  let settings = service_settings(&cfg)?;
  let service = TaskService::new(
    store.clone()
      as Arc<dyn TaskRepository>,
    store as Arc<dyn CategoryRepository>,
    clock.clone(),
    ViewEngine::new(tz),
    settings
  );

  let ctx = commands::Context {
    service,
    renderer: render::Renderer::new(
      &cfg, tz
    ),
    clock,
    tz,
    default_view: cfg.default_view()?
  };

  let runtime =
    tokio::runtime::Builder::new_current_thread()
      .enable_time()
      .build()
      .context(
        "failed to start async runtime"
      )?;

  let mut out = std::io::stdout().lock();
  runtime.block_on(commands::dispatch(
    &ctx,
    cli.command,
    &mut out
  ))?;

  info!("done");
  Ok(())
}

fn service_settings(
  cfg: &config::Config
) -> anyhow::Result<ServiceSettings> {
  let mut default_sorts =
    HashMap::new();
  let views = cfg
    .iter()
    .filter_map(|(key, _)| {
      key.strip_prefix("default.sort.")
    })
    .map(|raw| {
      raw.parse::<ViewName>().with_context(
        || {
          format!(
            "invalid view in \
             default.sort.{raw}"
          )
        }
      )
    })
    .collect::<anyhow::Result<Vec<_>>>()?;
  for view in views {
    if let Some(strategy) =
      cfg.default_sort_for(&view)?
    {
      debug!(view = %view, sort = %strategy, "configured default sort");
      default_sorts
        .insert(view, strategy);
    }
  }

  Ok(ServiceSettings {
    default_category: Some(
      cfg.default_category()
    ),
    fetch_limit: cfg.fetch_limit(),
    default_sorts
  })
}
