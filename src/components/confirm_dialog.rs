use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::*;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::events::AppEvent;
use crate::invocation::{ConfirmationRequest, Confirmer, Decision};
use crate::theme::THEME;
use crate::utils;

pub const CANCELED_BY_USER: &str = "Transaction canceled by user.";
pub const INVALID_GAS_PRICE: &str = "Given gas price is not correct";
const FIX_PRICE: &str = "Please fix this issue before sending any transaction.";

/// A confirmation waiting for the user, with the channel its invocation awaits.
#[derive(Debug)]
pub struct PendingConfirmation {
    pub request: ConfirmationRequest,
    pub responder: oneshot::Sender<Decision>,
    /// Session-wide "do not show again" flag.
    pub skip: Arc<AtomicBool>,
}

/// `Confirmer` that asks the UI task through the event channel.
pub struct DialogConfirmer {
    event_tx: mpsc::UnboundedSender<AppEvent>,
    skip: Arc<AtomicBool>,
}

impl DialogConfirmer {
    pub fn new(event_tx: mpsc::UnboundedSender<AppEvent>) -> Self {
        Self {
            event_tx,
            skip: Arc::new(AtomicBool::new(false)),
        }
    }
}

#[async_trait]
impl Confirmer for DialogConfirmer {
    async fn confirm(&self, request: ConfirmationRequest) -> Decision {
        if self.skip.load(Ordering::Acquire) {
            if let Ok(price) = &request.gas_price {
                debug!(gas_price = %price, "confirmation skipped for this session");
                return Decision::Confirmed { gas_price: *price };
            }
        }

        let (responder, rx) = oneshot::channel();
        let pending = PendingConfirmation {
            request,
            responder,
            skip: Arc::clone(&self.skip),
        };
        if self.event_tx.send(AppEvent::ConfirmationRequested(pending)).is_err() {
            return Decision::Cancelled(CANCELED_BY_USER.to_string());
        }
        // A dropped responder means the app is shutting down
        rx.await
            .unwrap_or_else(|_| Decision::Cancelled(CANCELED_BY_USER.to_string()))
    }
}

struct DialogState {
    pending: PendingConfirmation,
    /// Gas price as typed, in gwei.
    gas_price: String,
    dont_show_again: bool,
}

impl DialogState {
    fn new(pending: PendingConfirmation) -> Self {
        let gas_price = match &pending.request.gas_price {
            Ok(price) => utils::wei_to_gwei(*price),
            Err(_) => String::new(),
        };
        Self {
            pending,
            gas_price,
            dont_show_again: false,
        }
    }

    /// Fee text, or the warning that blocks confirmation.
    fn fee(&self) -> Result<String, String> {
        if let Err(warning) = &self.pending.request.gas_price {
            if self.gas_price.trim().is_empty() {
                return Err(warning.clone());
            }
        }
        utils::compute_fee(self.pending.request.gas_limit, &self.gas_price)
            .map_err(|e| format!("{FIX_PRICE} {e}"))
    }

    fn decision(&self) -> Decision {
        match (self.fee(), utils::gwei_to_wei(&self.gas_price)) {
            (Ok(_), Ok(gas_price)) => Decision::Confirmed { gas_price },
            _ => Decision::Cancelled(INVALID_GAS_PRICE.to_string()),
        }
    }
}

/// Modal "Confirm transaction" overlay. Requests arriving while one is shown
/// wait in a queue.
pub struct ConfirmDialog {
    current: Option<DialogState>,
    queue: VecDeque<PendingConfirmation>,
}

impl ConfirmDialog {
    pub fn new() -> Self {
        Self {
            current: None,
            queue: VecDeque::new(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.current.is_some()
    }

    pub fn push(&mut self, pending: PendingConfirmation) {
        if self.current.is_none() {
            self.current = Some(DialogState::new(pending));
        } else {
            self.queue.push_back(pending);
        }
    }

    fn resolve(&mut self, decision: Decision) {
        if let Some(state) = self.current.take() {
            if state.dont_show_again && matches!(decision, Decision::Confirmed { .. }) {
                state.pending.skip.store(true, Ordering::Release);
            }
            debug!(?decision, "confirmation resolved");
            // The invocation may already be gone
            let _ = state.pending.responder.send(decision);
        }
        self.current = self.queue.pop_front().map(DialogState::new);
    }

    /// Returns true if it consumed the event
    pub fn handle_key(&mut self, key: KeyEvent) -> bool {
        let Some(state) = self.current.as_mut() else {
            return false;
        };

        match key.code {
            KeyCode::Enter => {
                let decision = state.decision();
                self.resolve(decision);
            }
            KeyCode::Esc => self.resolve(Decision::Cancelled(CANCELED_BY_USER.to_string())),
            KeyCode::Tab => state.dont_show_again = !state.dont_show_again,
            KeyCode::Backspace => {
                state.gas_price.pop();
            }
            KeyCode::Char(c) if c.is_ascii_digit() || c == '.' => state.gas_price.push(c),
            _ => {}
        }
        true
    }

    pub fn render(&self, frame: &mut Frame, area: Rect) {
        let Some(state) = &self.current else {
            return;
        };
        let request = &state.pending.request;

        let popup_width = (area.width * 70 / 100).max(50).min(area.width);
        let popup_height = 14.min(area.height);
        let x = area.x + (area.width - popup_width) / 2;
        let y = area.y + (area.height - popup_height) / 2;
        let popup_area = Rect::new(x, y, popup_width, popup_height);

        frame.render_widget(Clear, popup_area);

        let title = if self.queue.is_empty() {
            " Confirm transaction ".to_string()
        } else {
            format!(" Confirm transaction (+{} queued) ", self.queue.len())
        };
        let block = Block::default()
            .title(title)
            .borders(Borders::ALL)
            .border_style(Style::default().fg(THEME.warning))
            .style(Style::default().bg(THEME.surface));

        let label = |text: &'static str| Span::styled(format!("  {text:<22}"), THEME.muted_style());
        let to = match request.tx.to {
            Some(to) => Span::styled(utils::format_address(&to), THEME.address_style()),
            None => Span::styled("(contract creation)", THEME.muted_style()),
        };

        let mut lines = vec![
            Line::from(vec![
                label("Network:"),
                Span::styled(
                    format!("{} ({})", request.network.name, request.network.chain_id),
                    Style::default().fg(THEME.text),
                ),
            ]),
            Line::from(vec![
                label("From:"),
                Span::styled(utils::format_address(&request.from), THEME.address_style()),
            ]),
            Line::from(vec![label("To:"), to]),
            Line::from(vec![
                label("Amount:"),
                Span::styled(
                    format!("{} Ether", utils::format_ether(request.tx.value)),
                    THEME.eth_style(),
                ),
            ]),
            Line::from(vec![
                label("Gas limit:"),
                Span::styled(utils::format_number(request.gas_limit), Style::default().fg(THEME.text)),
            ]),
            Line::from(vec![
                label("Gas price:"),
                Span::styled(
                    format!("{}_", state.gas_price),
                    Style::default().fg(THEME.text).add_modifier(Modifier::BOLD),
                ),
                Span::styled(" Gwei", THEME.muted_style()),
            ]),
        ];

        match state.fee() {
            Ok(fee) => lines.push(Line::from(vec![
                label("Max transaction fee:"),
                Span::styled(fee, THEME.eth_style()),
            ])),
            Err(warning) => lines.push(Line::from(vec![
                label("Max transaction fee:"),
                Span::styled(warning, THEME.error_style()),
            ])),
        }

        let check = if state.dont_show_again { "[x]" } else { "[ ]" };
        lines.push(Line::from(""));
        lines.push(Line::from(vec![
            Span::styled(format!("  {check} "), THEME.accent_style()),
            Span::styled(
                "Do not show this warning again for this session (Tab)",
                Style::default().fg(THEME.text),
            ),
        ]));
        lines.push(Line::from(""));
        lines.push(Line::from(vec![
            Span::styled("  Enter", THEME.accent_style()),
            Span::styled(":Confirm  ", THEME.muted_style()),
            Span::styled("Esc", THEME.accent_style()),
            Span::styled(":Cancel", THEME.muted_style()),
        ]));

        let paragraph = Paragraph::new(lines)
            .block(block)
            .wrap(Wrap { trim: false });
        frame.render_widget(paragraph, popup_area);
    }
}

#[cfg(test)]
mod tests {
    use alloy::primitives::{Address, Bytes, U256};
    use crossterm::event::KeyModifiers;
    use ratatui::Terminal;
    use ratatui::backend::TestBackend;

    use super::*;
    use crate::data::types::{Network, TxData};

    fn request(gas_price: Result<U256, String>) -> ConfirmationRequest {
        ConfirmationRequest {
            network: Network::from_chain_id(1),
            from: Address::repeat_byte(0x01),
            tx: TxData {
                to: Some(Address::repeat_byte(0x02)),
                data: Bytes::new(),
                value: U256::ZERO,
                contract_name: "Store".to_string(),
                signature: "set(uint256)".to_string(),
            },
            gas_limit: 21_000,
            gas_price,
        }
    }

    fn pending(gas_price: Result<U256, String>) -> (PendingConfirmation, oneshot::Receiver<Decision>) {
        let (responder, rx) = oneshot::channel();
        let pending = PendingConfirmation {
            request: request(gas_price),
            responder,
            skip: Arc::new(AtomicBool::new(false)),
        };
        (pending, rx)
    }

    fn press(dialog: &mut ConfirmDialog, code: KeyCode) {
        assert!(dialog.handle_key(KeyEvent::new(code, KeyModifiers::NONE)));
    }

    fn twenty_gwei() -> U256 {
        U256::from(20_000_000_000u64)
    }

    #[test]
    fn test_enter_confirms_with_network_price() {
        let mut dialog = ConfirmDialog::new();
        let (pending, mut rx) = pending(Ok(twenty_gwei()));
        dialog.push(pending);

        press(&mut dialog, KeyCode::Enter);

        assert_eq!(
            rx.try_recv().unwrap(),
            Decision::Confirmed {
                gas_price: twenty_gwei()
            }
        );
        assert!(!dialog.is_active());
    }

    #[test]
    fn test_edited_price_is_used() {
        let mut dialog = ConfirmDialog::new();
        let (pending, mut rx) = pending(Ok(twenty_gwei()));
        dialog.push(pending);

        press(&mut dialog, KeyCode::Backspace);
        press(&mut dialog, KeyCode::Backspace);
        press(&mut dialog, KeyCode::Char('5'));
        press(&mut dialog, KeyCode::Enter);

        assert_eq!(
            rx.try_recv().unwrap(),
            Decision::Confirmed {
                gas_price: U256::from(5_000_000_000u64)
            }
        );
    }

    #[test]
    fn test_escape_cancels() {
        let mut dialog = ConfirmDialog::new();
        let (pending, mut rx) = pending(Ok(twenty_gwei()));
        dialog.push(pending);

        press(&mut dialog, KeyCode::Esc);

        assert_eq!(
            rx.try_recv().unwrap(),
            Decision::Cancelled(CANCELED_BY_USER.to_string())
        );
    }

    #[test]
    fn test_unavailable_price_blocks_confirmation() {
        let mut dialog = ConfirmDialog::new();
        let (pending, mut rx) = pending(Err("Unable to retrieve the current network gas price.".to_string()));
        dialog.push(pending);

        press(&mut dialog, KeyCode::Enter);

        assert_eq!(
            rx.try_recv().unwrap(),
            Decision::Cancelled(INVALID_GAS_PRICE.to_string())
        );
    }

    #[test]
    fn test_invalid_price_cancels() {
        let mut dialog = ConfirmDialog::new();
        let (pending, mut rx) = pending(Ok(twenty_gwei()));
        dialog.push(pending);

        press(&mut dialog, KeyCode::Char('.'));
        press(&mut dialog, KeyCode::Char('.'));
        press(&mut dialog, KeyCode::Enter);

        assert_eq!(
            rx.try_recv().unwrap(),
            Decision::Cancelled(INVALID_GAS_PRICE.to_string())
        );
    }

    #[test]
    fn test_queued_requests_are_shown_in_order() {
        let mut dialog = ConfirmDialog::new();
        let (first, mut first_rx) = pending(Ok(twenty_gwei()));
        let (second, mut second_rx) = pending(Ok(twenty_gwei()));
        dialog.push(first);
        dialog.push(second);

        press(&mut dialog, KeyCode::Esc);
        assert!(first_rx.try_recv().is_ok());
        assert!(second_rx.try_recv().is_err());
        assert!(dialog.is_active());

        press(&mut dialog, KeyCode::Enter);
        assert!(second_rx.try_recv().is_ok());
        assert!(!dialog.is_active());
    }

    #[test]
    fn test_inactive_dialog_ignores_keys() {
        let mut dialog = ConfirmDialog::new();
        assert!(!dialog.handle_key(KeyEvent::new(KeyCode::Enter, KeyModifiers::NONE)));
    }

    #[test]
    fn test_render_shows_fee() {
        let mut dialog = ConfirmDialog::new();
        let (pending, _rx) = pending(Ok(twenty_gwei()));
        dialog.push(pending);

        let mut terminal = Terminal::new(TestBackend::new(100, 20)).unwrap();
        terminal.draw(|frame| dialog.render(frame, frame.area())).unwrap();
        let screen: String = terminal
            .backend()
            .buffer()
            .content()
            .iter()
            .map(|cell| cell.symbol())
            .collect();

        assert!(screen.contains("Confirm transaction"));
        assert!(screen.contains("0.00042 Ether"));
        assert!(screen.contains("Main (1)"));
    }

    #[tokio::test]
    async fn test_dialog_confirmer_round_trip_and_skip() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let confirmer = Arc::new(DialogConfirmer::new(tx));
        let mut dialog = ConfirmDialog::new();

        let task = {
            let confirmer = Arc::clone(&confirmer);
            tokio::spawn(async move { confirmer.confirm(request(Ok(twenty_gwei()))).await })
        };
        let Some(AppEvent::ConfirmationRequested(pending)) = rx.recv().await else {
            panic!("expected a confirmation request");
        };
        dialog.push(pending);
        press(&mut dialog, KeyCode::Tab);
        press(&mut dialog, KeyCode::Enter);
        assert_eq!(
            task.await.unwrap(),
            Decision::Confirmed {
                gas_price: twenty_gwei()
            }
        );

        // "do not show again" now accepts without asking
        let decision = confirmer.confirm(request(Ok(twenty_gwei()))).await;
        assert_eq!(
            decision,
            Decision::Confirmed {
                gas_price: twenty_gwei()
            }
        );
        assert!(rx.try_recv().is_err());
    }
}
