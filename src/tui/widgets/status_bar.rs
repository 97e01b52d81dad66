//! Status bar widget: latest notification plus the form's running totals.

use std::cell::RefCell;

use ratatui::Frame;
use ratatui::layout::{Constraint, Layout, Rect};
use ratatui::style::{Color, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::Paragraph;

use crate::engine::{Level, Notification, NotificationSink, TracingSink};

/// Notification sink feeding the status bar. Everything is also logged.
#[derive(Debug, Default)]
pub struct StatusSink {
    latest: RefCell<Option<Notification>>,
}

impl StatusSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn latest(&self) -> Option<Notification> {
        self.latest.borrow().clone()
    }

    /// Clears the message, typically on the next keypress.
    pub fn dismiss(&self) {
        self.latest.borrow_mut().take();
    }
}

impl NotificationSink for StatusSink {
    fn notify(&self, level: Level, message: &str) {
        TracingSink.notify(level, message);
        *self.latest.borrow_mut() = Some(Notification {
            level,
            message: message.to_string(),
        });
    }
}

/// Data passed to the status bar widget.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StatusBarContext {
    pub notification: Option<Notification>,
    /// Formatted aggregate of the committed rows.
    pub contract_value: String,
    pub row_count: usize,
    /// Lookups still running.
    pub pending: usize,
}

fn level_style(level: Level) -> Style {
    match level {
        Level::Info => Style::default().fg(Color::Cyan),
        Level::Warning => Style::default().fg(Color::Yellow),
        Level::Error => Style::default().fg(Color::Red),
    }
}

/// Renders a one-line status bar.
///
/// Left: the latest notification, colored by level. Right:
/// `3 item(s)  value 450  [2 pending]`, the pending part only while lookups
/// are running.
#[mutants::skip]
pub fn draw_status_bar(ctx: &StatusBarContext, frame: &mut Frame, area: Rect) {
    let cyan = Style::default().fg(Color::Cyan);

    let mut right = vec![Span::styled(
        format!("{} item(s)  value {}", ctx.row_count, ctx.contract_value),
        cyan,
    )];
    if ctx.pending > 0 {
        right.push(Span::styled(
            format!("  [{} pending]", ctx.pending),
            Style::default().fg(Color::Yellow),
        ));
    }
    let right_width: u16 = right.iter().map(|s| s.width() as u16).sum();

    let [left_area, right_area] =
        Layout::horizontal([Constraint::Min(0), Constraint::Length(right_width)]).areas(area);

    if let Some(n) = &ctx.notification {
        let line = Line::from(Span::styled(n.message.clone(), level_style(n.level)));
        frame.render_widget(Paragraph::new(line), left_area);
    }
    frame.render_widget(Paragraph::new(Line::from(right)), right_area);
}
