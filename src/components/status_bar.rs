use ratatui::prelude::*;
use ratatui::widgets::*;

use crate::theme::THEME;

pub struct StatusBar {
    pub error_message: Option<String>,
    pub notice: Option<String>,
    /// Invocations started and not yet finished.
    pub pending: usize,
    pub rpc_url: String,
}

impl StatusBar {
    pub fn new(rpc_url: String) -> Self {
        Self {
            error_message: None,
            notice: None,
            pending: 0,
            rpc_url,
        }
    }

    pub fn clear_messages(&mut self) {
        self.error_message = None;
        self.notice = None;
    }

    pub fn render(&self, frame: &mut Frame, area: Rect) {
        // Background
        let bg = Block::default().style(THEME.header_style());
        frame.render_widget(bg, area);

        let chunks = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Min(0), Constraint::Length(40)])
            .split(area);

        let left_content = if let Some(ref err) = self.error_message {
            Line::from(vec![
                Span::styled(
                    " ! ",
                    Style::default()
                        .fg(THEME.error)
                        .add_modifier(Modifier::BOLD),
                ),
                Span::styled(err.as_str(), Style::default().fg(THEME.warning)),
            ])
        } else if let Some(ref notice) = self.notice {
            Line::from(Span::styled(format!(" {notice}"), THEME.success_style()))
        } else {
            Line::from(vec![
                Span::styled(" Tab", Style::default().fg(THEME.text_accent)),
                Span::styled(":Instance  ", Style::default().fg(THEME.text_muted)),
                Span::styled("\u{2191}\u{2193}", Style::default().fg(THEME.text_accent)),
                Span::styled(":Function  ", Style::default().fg(THEME.text_muted)),
                Span::styled("Enter", Style::default().fg(THEME.text_accent)),
                Span::styled(":Call  ", Style::default().fg(THEME.text_muted)),
                Span::styled("?", Style::default().fg(THEME.text_accent)),
                Span::styled(":Help  ", Style::default().fg(THEME.text_muted)),
                Span::styled("q", Style::default().fg(THEME.text_accent)),
                Span::styled(":Quit", Style::default().fg(THEME.text_muted)),
            ])
        };

        let left = Paragraph::new(left_content).style(THEME.header_style());
        frame.render_widget(left, chunks[0]);

        let mut right = Vec::new();
        if self.pending > 0 {
            right.push(Span::styled(
                format!("{} pending", self.pending),
                Style::default().fg(THEME.warning),
            ));
            right.push(Span::styled(" | ", THEME.muted_style()));
        }
        right.push(Span::styled("\u{25cf} ", Style::default().fg(THEME.success)));
        right.push(Span::styled(format!("{} ", self.rpc_url), THEME.muted_style()));

        let right = Paragraph::new(Line::from(right))
            .alignment(Alignment::Right)
            .style(THEME.header_style());
        frame.render_widget(right, chunks[1]);
    }
}
