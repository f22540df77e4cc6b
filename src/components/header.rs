use ratatui::prelude::*;
use ratatui::widgets::*;

use crate::data::types::{ExecutionContext, Network};
use crate::theme::THEME;
use crate::utils;

pub struct Header {
    pub network: Network,
    pub from: String,
    pub context_label: &'static str,
    pub instances: usize,
}

impl Header {
    pub fn new(context: &ExecutionContext) -> Self {
        Self {
            network: Network::from_chain_id(context.chain_id),
            from: utils::shorten_address(&context.from),
            context_label: context.label(),
            instances: 0,
        }
    }

    pub fn render(&self, frame: &mut Frame, area: Rect) {
        // Background for the entire header bar
        let header_block = Block::default().style(THEME.header_style());
        frame.render_widget(header_block, area);

        let chunks = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([
                Constraint::Length(12),
                Constraint::Min(0),
                Constraint::Length(44),
            ])
            .split(area);

        let title = Paragraph::new(Span::styled(
            " dapp-tui",
            Style::default()
                .fg(THEME.text_accent)
                .add_modifier(Modifier::BOLD),
        ))
        .style(THEME.header_style());
        frame.render_widget(title, chunks[0]);

        let count = Paragraph::new(Span::styled(
            format!("Deployed contracts [{}]", self.instances),
            THEME.muted_style(),
        ))
        .style(THEME.header_style());
        frame.render_widget(count, chunks[1]);

        // Production network is highlighted: transactions there need confirmation
        let network_style = if self.network.is_production() {
            Style::default().fg(THEME.warning).add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(THEME.text)
        };
        let network_info = Line::from(vec![
            Span::styled(self.network.name.clone(), network_style),
            Span::styled(format!(" ({})", self.context_label), THEME.muted_style()),
            Span::styled(" | ", THEME.muted_style()),
            Span::styled(self.from.clone(), THEME.address_style()),
            Span::raw(" "),
        ]);
        let network_paragraph = Paragraph::new(network_info)
            .alignment(Alignment::Right)
            .style(THEME.header_style());
        frame.render_widget(network_paragraph, chunks[2]);
    }
}
