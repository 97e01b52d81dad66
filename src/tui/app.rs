use std::rc::Rc;
use std::time::Duration;

use crossterm::event::{self, Event, KeyEvent, KeyEventKind};
use ratatui::{Frame, Terminal};
use tracing::info;

use crate::engine::{Completion, FormSession, Level, NotificationSink, Settlement};
use crate::model::format_amount;

use super::action::Action;
use super::error::AppError;
use super::screens::{ContractEntryState, HelpState, draw_contract_entry, draw_help};
use super::widgets::StatusSink;

/// How long the loop waits for a lookup before polling the keyboard again.
const TICK: Duration = Duration::from_millis(50);

/// All screens the app can navigate between.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Screen {
    /// The contract form and its pest-item table.
    ContractEntry,
    /// Show keybinding help.
    Help,
}

/// Top-level application state.
pub struct App {
    screen: Screen,
    session: FormSession,
    sink: Rc<StatusSink>,
    entry: ContractEntryState,
    help: HelpState,
    should_quit: bool,
}

impl App {
    /// Creates a new `App` on the [`Screen::ContractEntry`] screen.
    ///
    /// `session` must have been built with `sink` so its notifications reach
    /// the status bar.
    pub fn new(mut session: FormSession, sink: Rc<StatusSink>) -> Self {
        let entry = ContractEntryState::new(&mut session);
        Self {
            screen: Screen::ContractEntry,
            session,
            sink,
            entry,
            help: HelpState::opened_from(Screen::ContractEntry, false),
            should_quit: false,
        }
    }

    /// Loads persisted line items when the table is attached to a store.
    pub async fn load(&mut self) {
        if !self.session.items().is_attached() {
            return;
        }
        if let Ok(n) = self.session.load_items().await {
            info!(rows = n, "line items loaded");
            self.entry.rows_changed(&self.session);
        }
    }

    /// Main event loop: draw, wait briefly for a lookup, drain key events.
    #[cfg_attr(coverage_nightly, coverage(off))]
    #[mutants::skip]
    pub async fn run<B: ratatui::backend::Backend>(
        &mut self,
        terminal: &mut Terminal<B>,
    ) -> Result<(), AppError> {
        self.load().await;
        while !self.should_quit {
            terminal.draw(|frame| self.draw(frame))?;
            tokio::select! {
                Some(completion) = self.session.next_completion() => {
                    self.on_completion(completion);
                }
                () = tokio::time::sleep(TICK) => {}
            }
            while event::poll(Duration::ZERO)? {
                if let Event::Key(key) = event::read()? {
                    self.handle_key(key).await;
                }
            }
        }
        Ok(())
    }

    /// Renders the current screen.
    #[cfg_attr(coverage_nightly, coverage(off))]
    #[mutants::skip]
    fn draw(&self, frame: &mut Frame) {
        let area = frame.area();
        match self.screen {
            Screen::ContractEntry => {
                draw_contract_entry(&self.entry, &self.session, &self.sink, frame, area);
            }
            Screen::Help => draw_help(&self.help, frame, area),
        }
    }

    /// Applies a finished lookup and re-syncs which controls are mounted.
    pub fn on_completion(&mut self, completion: Completion) -> Settlement {
        let settlement = self.session.apply(completion);
        self.entry.sync_mounts(&self.session);
        settlement
    }

    /// Handles a key event for the current screen.
    pub async fn handle_key(&mut self, key: KeyEvent) {
        if key.kind != KeyEventKind::Press {
            return;
        }
        self.sink.dismiss();
        let action = match self.screen {
            Screen::ContractEntry => self.entry.handle_key(&mut self.session, key),
            Screen::Help => self.help.handle_key(key),
        };
        self.apply(action).await;
    }

    /// Runs an [`Action`], awaiting the store or pending lookups as needed.
    pub async fn apply(&mut self, action: Action) {
        match action {
            Action::None => {}
            Action::Navigate(Screen::Help) => {
                let editing = self.session.items().buffer().is_some();
                self.help = HelpState::opened_from(self.screen, editing);
                self.screen = Screen::Help;
            }
            Action::Navigate(screen) => self.screen = screen,
            Action::CommitItem => {
                if let Ok(id) = self.session.commit_item().await {
                    self.sink.notify(Level::Info, &format!("Item {id} saved"));
                    self.entry.item_closed(&mut self.session);
                }
            }
            Action::DeleteItem(id) => {
                if self.session.delete_item(id).await.is_ok() {
                    self.sink.notify(Level::Info, &format!("Item {id} deleted"));
                    self.entry.rows_changed(&self.session);
                }
            }
            Action::Submit => self.submit().await,
            Action::Quit => self.should_quit = true,
        }
    }

    async fn submit(&mut self) {
        let settled = self.session.settle().await;
        self.entry.sync_mounts(&self.session);
        match self.session.submit() {
            Ok(snapshot) => {
                self.entry.mark_invalid(None);
                let rows = snapshot.line_items().len();
                info!(settled, rows, "contract submitted");
                self.sink.notify(
                    Level::Info,
                    &format!(
                        "Contract ready: {rows} item(s), value {}",
                        format_amount(self.session.contract_value())
                    ),
                );
            }
            Err(e) => self.entry.mark_invalid(e.field()),
        }
    }

    /// Returns the current screen.
    pub fn screen(&self) -> Screen {
        self.screen
    }

    /// Returns `true` if the app should quit.
    pub fn should_quit(&self) -> bool {
        self.should_quit
    }

    pub fn session(&self) -> &FormSession {
        &self.session
    }

    pub fn entry(&self) -> &ContractEntryState {
        &self.entry
    }
}

#[cfg(test)]
mod tests {
    use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyEventState, KeyModifiers};

    use super::*;
    use crate::engine::SubtableController;
    use crate::engine::presets::reference_bindings;
    use crate::lookups::Period;
    use crate::model::names::{
        BILLING_FREQUENCY, CONTRACT_TYPE, CONTRACT_VALUE, END_DATE, INVOICE_REMARKS, START_DATE,
    };
    use crate::model::line_item::{FREQUENCY, SUBJECT};
    use crate::model::{FieldHandle, FieldId, LineItem, LocalId, ParentId, Value};
    use crate::storage::{LineItemStore, MemoryStore};
    use crate::tui::screens::contract_rules;

    fn make_app_with(items: SubtableController) -> App {
        let sink = Rc::new(StatusSink::new());
        let session = FormSession::new(Rc::clone(&sink) as Rc<dyn NotificationSink>)
            .with_subtable(items.with_date_range(START_DATE, END_DATE));
        let mut session = contract_rules(session);
        for binding in reference_bindings(Duration::ZERO) {
            session.register_binding(binding).unwrap();
        }
        App::new(session, sink)
    }

    fn make_app() -> App {
        make_app_with(SubtableController::local())
    }

    fn key(code: KeyCode, modifiers: KeyModifiers, kind: KeyEventKind) -> KeyEvent {
        KeyEvent {
            code,
            modifiers,
            kind,
            state: KeyEventState::NONE,
        }
    }

    fn press(code: KeyCode) -> KeyEvent {
        key(code, KeyModifiers::NONE, KeyEventKind::Press)
    }

    fn release(code: KeyCode) -> KeyEvent {
        key(code, KeyModifiers::NONE, KeyEventKind::Release)
    }

    fn ctrl(ch: char) -> KeyEvent {
        key(KeyCode::Char(ch), KeyModifiers::CONTROL, KeyEventKind::Press)
    }

    fn fill_contract(app: &mut App) {
        app.session
            .set_field(CONTRACT_TYPE, Period::Yearly.value())
            .unwrap();
        app.session
            .set_field(BILLING_FREQUENCY, Period::Quarterly.value())
            .unwrap();
        app.session
            .set_field(START_DATE, Value::scalar("2024-03-01"))
            .unwrap();
    }

    fn latest(app: &App) -> (Level, String) {
        let n = app.sink.latest().unwrap();
        (n.level, n.message)
    }

    #[test]
    fn new_starts_on_contract_entry() {
        let app = make_app();
        assert_eq!(app.screen(), Screen::ContractEntry);
        assert!(!app.should_quit());
        assert_eq!(
            app.session().focus().focused(),
            Some(&FieldId::new(CONTRACT_TYPE))
        );
    }

    #[tokio::test]
    async fn f1_opens_help_and_esc_returns() {
        let mut app = make_app();
        app.handle_key(press(KeyCode::F(1))).await;
        assert_eq!(app.screen(), Screen::Help);
        assert_eq!(app.help.origin(), Screen::ContractEntry);
        assert!(!app.help.editing());

        app.handle_key(press(KeyCode::Esc)).await;
        assert_eq!(app.screen(), Screen::ContractEntry);
        assert!(!app.should_quit());
    }

    #[tokio::test]
    async fn help_over_open_item_marks_editor_keys() {
        let mut app = make_app();
        app.handle_key(ctrl('n')).await;
        app.handle_key(press(KeyCode::F(1))).await;
        assert!(app.help.editing());

        app.handle_key(press(KeyCode::F(1))).await;
        assert_eq!(app.screen(), Screen::ContractEntry);
        assert!(app.session().items().buffer().is_some(), "item still open");
    }

    #[tokio::test]
    async fn esc_on_contract_entry_quits() {
        let mut app = make_app();
        app.handle_key(press(KeyCode::Esc)).await;
        assert!(!app.should_quit(), "first Esc closes the type popup");
        app.handle_key(press(KeyCode::Esc)).await;
        assert!(app.should_quit());
    }

    #[tokio::test]
    async fn ctrl_q_quits() {
        let mut app = make_app();
        app.handle_key(ctrl('q')).await;
        assert!(app.should_quit());
    }

    #[tokio::test]
    async fn release_events_are_ignored() {
        let mut app = make_app();
        app.handle_key(release(KeyCode::F(1))).await;
        assert_eq!(app.screen(), Screen::ContractEntry);
    }

    #[tokio::test]
    async fn keypress_dismisses_notification() {
        let mut app = make_app();
        app.sink.notify(Level::Warning, "lookup failed");
        app.handle_key(press(KeyCode::Tab)).await;
        assert!(app.sink.latest().is_none());
    }

    #[tokio::test]
    async fn submit_empty_form_marks_first_missing_field() {
        let mut app = make_app();
        app.apply(Action::Submit).await;
        let (level, message) = latest(&app);
        assert_eq!(level, Level::Error);
        assert_eq!(message, "contract_type is required");
        assert_eq!(app.entry().invalid(), Some(&FieldId::new(CONTRACT_TYPE)));
    }

    #[tokio::test]
    async fn submit_settles_lookups_first() {
        let mut app = make_app();
        fill_contract(&mut app);
        assert!(app.session().engine().in_flight() > 0);

        app.apply(Action::Submit).await;

        assert_eq!(app.session().engine().in_flight(), 0);
        assert_eq!(
            app.session().value(END_DATE),
            Some(Value::scalar("2025-03-01"))
        );
        let (level, message) = latest(&app);
        assert_eq!(level, Level::Info);
        assert_eq!(message, "Contract ready: 0 item(s), value 0");
        assert!(app.entry().invalid().is_none());
    }

    #[tokio::test]
    async fn on_completion_mounts_billing_frequency() {
        let mut app = make_app();
        app.session
            .set_field(CONTRACT_TYPE, Period::Monthly.value())
            .unwrap();
        while let Some(completion) = app.session.next_completion().await {
            app.on_completion(completion);
        }
        let billing = app.entry().control(BILLING_FREQUENCY).unwrap();
        assert!(billing.is_present());
    }

    #[tokio::test]
    async fn commit_and_delete_item_through_keys() {
        let mut app = make_app();
        fill_contract(&mut app);
        app.session.settle().await;

        app.handle_key(ctrl('n')).await;
        app.handle_key(press(KeyCode::Down)).await;
        app.handle_key(press(KeyCode::Tab)).await;
        for _ in 0..4 {
            app.handle_key(press(KeyCode::Down)).await;
        }
        app.session.settle().await;
        assert_eq!(
            app.session().value("item.unit_count"),
            Some(Value::scalar("4")),
            "quarterly visits over a year"
        );
        app.session
            .set_field("item.unit_value", Value::scalar("30"))
            .unwrap();

        app.handle_key(ctrl('s')).await;
        assert_eq!(app.session().items().rows().len(), 1);
        assert_eq!(latest(&app), (Level::Info, "Item #1 saved".to_string()));
        assert_eq!(
            app.session().focus().focused(),
            Some(&FieldId::new(INVOICE_REMARKS))
        );

        app.session.settle().await;
        assert_eq!(
            app.session().value(CONTRACT_VALUE),
            Some(Value::scalar("120"))
        );

        app.handle_key(press(KeyCode::PageDown)).await;
        app.handle_key(ctrl('d')).await;
        assert!(app.session().items().rows().is_empty());
        assert_eq!(app.entry().selected(), None);
    }

    #[tokio::test]
    async fn commit_failure_keeps_editor_open() {
        let mut app = make_app();
        app.handle_key(ctrl('n')).await;
        app.handle_key(ctrl('s')).await;
        assert!(app.session().items().buffer().is_some());
        let (level, _) = latest(&app);
        assert_eq!(level, Level::Error);
    }

    #[tokio::test]
    async fn load_fills_table_from_attached_store() {
        let store = Rc::new(MemoryStore::new());
        let parent = ParentId("contract-1".into());
        let mut item = LineItem::blank(LocalId(1));
        item.set_field(SUBJECT, Value::reference("ants", "Ants")).unwrap();
        item.set_field(FREQUENCY, Value::reference("monthly", "Monthly"))
            .unwrap();
        store.create(&parent, &item).await.unwrap();

        let mut app = make_app_with(SubtableController::attached(
            parent,
            Rc::clone(&store) as Rc<dyn LineItemStore>,
        ));
        app.load().await;
        assert_eq!(app.session().items().rows().len(), 1);
    }
}
