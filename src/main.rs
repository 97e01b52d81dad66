#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

use std::io::{self, stdout};
use std::path::Path;
use std::rc::Rc;
use std::sync::Mutex;

use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use formflow::config::Config;
use formflow::engine::presets::reference_bindings;
use formflow::engine::{CascadeEngine, FormSession, NotificationSink, SubtableController};
use formflow::model::ParentId;
use formflow::model::names::{END_DATE, START_DATE};
use formflow::storage::{JsonlItemStore, LineItemStore};
use formflow::tui::screens::contract_rules;
use formflow::tui::{App, AppError, StatusSink};

const LOG_FILE: &str = "formflow.log";

/// Usage: `formflow [CONTRACT_ID | --example-config]`. With a contract id,
/// pest items are loaded from and saved to the data directory as they are
/// edited.
#[cfg_attr(coverage_nightly, coverage(off))]
#[mutants::skip]
fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = Config::default_path()?;
    if std::env::args().nth(1).as_deref() == Some("--example-config") {
        print!("{}", Config::example_config(&config_path));
        return Ok(());
    }
    let config = Config::load(&config_path)?;
    let data_dir = config.data_dir()?;
    std::fs::create_dir_all(&data_dir)?;
    init_logging(&config, &data_dir)?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()?;

    let sink = Rc::new(StatusSink::new());
    let session = build_session(&config, &data_dir, &sink)?;
    let mut app = App::new(session, sink);

    let original_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let _ = restore_terminal();
        original_hook(info);
    }));

    enable_raw_mode()?;
    execute!(stdout(), EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;

    let result = runtime.block_on(app.run(&mut terminal));

    let restore_result = restore_terminal();
    match result {
        Err(e) => Err(e.into()),
        Ok(()) => restore_result.map_err(Into::into),
    }
}

/// Logs go to a file; the terminal belongs to the UI.
#[cfg_attr(coverage_nightly, coverage(off))]
#[mutants::skip]
fn init_logging(config: &Config, data_dir: &Path) -> Result<(), AppError> {
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(data_dir.join(LOG_FILE))?;
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.log_filter()));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(Mutex::new(file))
                .with_ansi(false),
        )
        .init();
    Ok(())
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[mutants::skip]
fn build_session(
    config: &Config,
    data_dir: &Path,
    sink: &Rc<StatusSink>,
) -> Result<FormSession, AppError> {
    let items = match std::env::args().nth(1) {
        Some(contract) => {
            let store = JsonlItemStore::with_dir(data_dir)?;
            info!(contract = %contract, path = %store.path().display(), "attached to item store");
            SubtableController::attached(ParentId(contract), Rc::new(store) as Rc<dyn LineItemStore>)
        }
        None => SubtableController::local(),
    };

    let engine = CascadeEngine::new().with_timeout(config.lookup_timeout());
    let session = FormSession::new(Rc::clone(sink) as Rc<dyn NotificationSink>)
        .with_engine(engine)
        .with_subtable(items.with_date_range(START_DATE, END_DATE));
    let mut session = contract_rules(session);
    for binding in reference_bindings(config.simulated_latency()) {
        session.register_binding(binding)?;
    }
    info!(
        timeout = ?config.lookup_timeout(),
        latency = ?config.simulated_latency(),
        "form session ready"
    );
    Ok(session)
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[mutants::skip]
fn restore_terminal() -> Result<(), io::Error> {
    let raw_result = disable_raw_mode();
    let screen_result = execute!(stdout(), LeaveAlternateScreen);
    raw_result.and(screen_result)
}
