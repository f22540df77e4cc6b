use std::collections::VecDeque;

use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::*;

use crate::events::LogEntry;
use crate::theme::THEME;
use crate::utils;

const MAX_ENTRIES: usize = 1000;

/// Log panel fed by every `LogSink` message.
pub struct TerminalPanel {
    entries: VecDeque<LogEntry>,
    /// Lines scrolled up from the bottom.
    scroll_back: usize,
}

impl TerminalPanel {
    pub fn new() -> Self {
        Self {
            entries: VecDeque::new(),
            scroll_back: 0,
        }
    }

    pub fn push(&mut self, entry: LogEntry) {
        if self.entries.len() == MAX_ENTRIES {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    #[cfg(test)]
    pub fn entries(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.scroll_back = 0;
    }

    /// Returns true if it consumed the event
    pub fn handle_key(&mut self, key: KeyEvent) -> bool {
        match key.code {
            KeyCode::PageUp => {
                self.scroll_back = (self.scroll_back + 5).min(self.entries.len().saturating_sub(1));
                true
            }
            KeyCode::PageDown => {
                self.scroll_back = self.scroll_back.saturating_sub(5);
                true
            }
            KeyCode::End => {
                self.scroll_back = 0;
                true
            }
            _ => false,
        }
    }

    pub fn render(&self, frame: &mut Frame, area: Rect) {
        let title = if self.scroll_back > 0 {
            format!(" Terminal (-{}) ", self.scroll_back)
        } else {
            " Terminal ".to_string()
        };
        let block = Block::default()
            .title(title)
            .borders(Borders::ALL)
            .border_style(THEME.border_style());
        let inner = block.inner(area);
        frame.render_widget(block, area);

        let lines: Vec<Line> = self
            .entries
            .iter()
            .flat_map(|entry| {
                let time = utils::format_clock(entry.time);
                entry.message.lines().enumerate().map(move |(i, text)| {
                    let stamp = if i == 0 { format!("[{time}] ") } else { " ".repeat(11) };
                    let style = if text.contains("errored") || text.starts_with("VM error") {
                        THEME.error_style()
                    } else {
                        Style::default().fg(THEME.text)
                    };
                    Line::from(vec![
                        Span::styled(stamp, THEME.muted_style()),
                        Span::styled(text.to_string(), style),
                    ])
                })
            })
            .collect();

        let visible = usize::from(inner.height);
        let bottom = lines.len().saturating_sub(self.scroll_back);
        let top = bottom.saturating_sub(visible);
        let shown: Vec<Line> = lines.into_iter().skip(top).take(bottom - top).collect();

        frame.render_widget(Paragraph::new(shown), inner);
    }
}
