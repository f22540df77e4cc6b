use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use alloy::primitives::Address;
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::*;

use crate::components::Component;
use crate::components::call_control::CallControl;
use crate::data::abi::ContractAbi;
use crate::events::{AppEvent, InstanceId};
use crate::invocation::{CallTarget, InvocationError, InvocationOutcome, InvocationState};
use crate::theme::THEME;
use crate::utils;

/// A deployed or attached contract shown in the panel.
#[derive(Debug, Clone)]
pub struct InstanceHandle {
    pub id: InstanceId,
    pub name: String,
    pub address: Address,
    pub abi: Arc<ContractAbi>,
    pub detached: Arc<AtomicBool>,
}

impl InstanceHandle {
    pub fn new(id: InstanceId, name: String, address: Address, abi: Arc<ContractAbi>) -> Self {
        Self {
            id,
            name,
            address,
            abi,
            detached: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Stop in-flight invocations of this instance from reaching the backend.
    pub fn detach(&self) {
        self.detached.store(true, Ordering::Release);
    }
}

pub struct InstanceView {
    pub handle: InstanceHandle,
    pub focused: bool,
    controls: Vec<CallControl>,
    collapsed: bool,
    selected: usize,
    context_label: &'static str,
}

impl InstanceView {
    /// One control per function, the fallback first.
    pub fn new(handle: InstanceHandle, context_label: &'static str) -> Self {
        let controls = handle.abi.callables().into_iter().map(CallControl::new).collect();
        Self {
            handle,
            focused: false,
            controls,
            collapsed: false,
            selected: 0,
            context_label,
        }
    }

    pub fn title(&self) -> String {
        format!(
            "{} at {} ({})",
            self.handle.name,
            utils::shorten_address(&self.handle.address),
            self.context_label
        )
    }

    #[cfg(test)]
    pub fn controls(&self) -> &[CallControl] {
        &self.controls
    }

    #[cfg(test)]
    pub fn is_collapsed(&self) -> bool {
        self.collapsed
    }

    pub fn is_editing(&self) -> bool {
        self.controls.get(self.selected).is_some_and(|c| c.is_editing())
    }

    pub fn target(&self, function: usize) -> Option<CallTarget> {
        let control = self.controls.get(function)?;
        Some(CallTarget {
            contract_name: self.handle.name.clone(),
            address: self.handle.address,
            function: control.function.clone(),
            detached: Arc::clone(&self.handle.detached),
        })
    }

    pub fn set_progress(&mut self, function: usize, state: InvocationState) {
        if let Some(control) = self.controls.get_mut(function) {
            control.set_state(state);
        }
    }

    pub fn finish(&mut self, function: usize, outcome: &Result<InvocationOutcome, InvocationError>) {
        if let Some(control) = self.controls.get_mut(function) {
            control.finish(outcome);
        }
    }

    /// Rows needed to show the instance in full, borders included.
    pub fn height(&self) -> u16 {
        if self.collapsed {
            return 2;
        }
        let body: usize = if self.controls.is_empty() {
            1
        } else {
            self.controls
                .iter()
                .enumerate()
                .map(|(i, c)| c.lines(i == self.selected).len())
                .sum()
        };
        u16::try_from(body + 2).unwrap_or(u16::MAX)
    }

    fn submit(&self, function: usize, args: Vec<String>) -> AppEvent {
        AppEvent::Invoke {
            instance: self.handle.id,
            function,
            args,
        }
    }

    fn copy_address(&self) -> AppEvent {
        let address = utils::format_address(&self.handle.address);
        match arboard::Clipboard::new().and_then(|mut clipboard| clipboard.set_text(address.clone())) {
            Ok(()) => AppEvent::Notice(format!("Copied {address}")),
            Err(e) => AppEvent::Error(format!("Clipboard unavailable: {e}")),
        }
    }

    fn select(&mut self, index: usize) {
        if !self.controls.is_empty() {
            self.selected = index.min(self.controls.len() - 1);
        }
    }
}

impl Component for InstanceView {
    fn handle_key(&mut self, key: KeyEvent) -> Option<AppEvent> {
        if self.is_editing() {
            let args = self.controls.get_mut(self.selected)?.handle_key(key)?;
            return Some(self.submit(self.selected, args));
        }

        match key.code {
            KeyCode::Char(' ') => {
                self.collapsed = !self.collapsed;
                None
            }
            KeyCode::Char('x') => {
                self.handle.detach();
                Some(AppEvent::RemoveInstance(self.handle.id))
            }
            KeyCode::Char('y') => Some(self.copy_address()),
            _ if self.collapsed => None,
            KeyCode::Char('j') | KeyCode::Down => {
                self.select(self.selected + 1);
                None
            }
            KeyCode::Char('k') | KeyCode::Up => {
                self.select(self.selected.saturating_sub(1));
                None
            }
            KeyCode::Char('e') => {
                if let Some(control) = self.controls.get_mut(self.selected) {
                    control.toggle_expanded();
                }
                None
            }
            KeyCode::Enter => {
                let args = self.controls.get_mut(self.selected)?.activate()?;
                Some(self.submit(self.selected, args))
            }
            _ => None,
        }
    }

    fn render(&mut self, frame: &mut Frame, area: Rect) {
        let border_style = if self.focused {
            THEME.border_focused_style()
        } else {
            THEME.border_style()
        };
        let toggle = if self.collapsed { "\u{25b8}" } else { "\u{25be}" };
        let title = Line::from(vec![
            Span::styled(format!(" {toggle} "), THEME.muted_style()),
            Span::styled(
                self.handle.name.clone(),
                Style::default().fg(THEME.text).add_modifier(Modifier::BOLD),
            ),
            Span::styled(" at ", THEME.muted_style()),
            Span::styled(utils::shorten_address(&self.handle.address), THEME.address_style()),
            Span::styled(format!(" ({}) ", self.context_label), THEME.muted_style()),
        ]);
        let block = Block::default()
            .title(title)
            .title(Line::from(Span::styled(" y:copy  x:close ", THEME.muted_style())).right_aligned())
            .borders(Borders::ALL)
            .border_style(border_style);

        if self.collapsed {
            frame.render_widget(block, area);
            return;
        }

        let inner = block.inner(area);
        frame.render_widget(block, area);

        if self.controls.is_empty() {
            frame.render_widget(
                Paragraph::new("   No functions in ABI").style(THEME.muted_style()),
                inner,
            );
            return;
        }

        let mut lines = Vec::new();
        let mut selected_span = (0, 0);
        for (i, control) in self.controls.iter().enumerate() {
            let selected = self.focused && i == self.selected;
            let control_lines = control.lines(selected);
            if i == self.selected {
                selected_span = (lines.len(), lines.len() + control_lines.len());
            }
            lines.extend(control_lines);
        }

        // Keep the selected control visible when the block is cut short
        let visible = usize::from(inner.height);
        let offset = selected_span.1.saturating_sub(visible).min(selected_span.0);
        let paragraph = Paragraph::new(lines).scroll((u16::try_from(offset).unwrap_or(0), 0));
        frame.render_widget(paragraph, inner);
    }
}

#[cfg(test)]
mod tests {
    use crossterm::event::KeyModifiers;
    use ratatui::Terminal;
    use ratatui::backend::TestBackend;

    use super::*;

    const ABI: &str = r#"[
        {"type":"function","name":"get","inputs":[],"outputs":[{"name":"","type":"uint256"}],"stateMutability":"view"},
        {"type":"function","name":"set","inputs":[{"name":"x","type":"uint256"}],"outputs":[],"stateMutability":"nonpayable"},
        {"type":"fallback","stateMutability":"payable"}
    ]"#;

    fn view() -> InstanceView {
        let abi = Arc::new(ContractAbi::from_json_str(ABI).unwrap());
        let address: Address = "0xd8dA6BF26964aF9D7eEd9e03E53415D37aA96045".parse().unwrap();
        InstanceView::new(InstanceHandle::new(7, "Store".to_string(), address, abi), "vm")
    }

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    #[test]
    fn test_title_uses_short_lowercase_address() {
        assert_eq!(view().title(), "Store at 0xd8da...6045 (vm)");
    }

    #[test]
    fn test_fallback_listed_first() {
        let view = view();
        let names: Vec<_> = view.controls().iter().map(|c| c.function.display_name()).collect();
        assert_eq!(names, vec!["(fallback)", "get", "set"]);
    }

    #[test]
    fn test_empty_abi_has_no_controls() {
        let view = InstanceView::new(
            InstanceHandle::new(1, "Empty".to_string(), Address::ZERO, Arc::new(ContractAbi::default())),
            "web3",
        );
        assert!(view.controls().is_empty());
        assert_eq!(view.height(), 3);
    }

    #[test]
    fn test_enter_on_constant_function_invokes() {
        let mut view = view();
        view.handle_key(key(KeyCode::Down));
        match view.handle_key(key(KeyCode::Enter)) {
            Some(AppEvent::Invoke { instance, function, args }) => {
                assert_eq!(instance, 7);
                assert_eq!(function, 1);
                assert!(args.is_empty());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_typed_arguments_are_submitted() {
        let mut view = view();
        view.handle_key(key(KeyCode::Down));
        view.handle_key(key(KeyCode::Down));
        assert!(view.handle_key(key(KeyCode::Enter)).is_none());
        assert!(view.is_editing());
        view.handle_key(key(KeyCode::Char('4')));
        view.handle_key(key(KeyCode::Char('2')));
        match view.handle_key(key(KeyCode::Enter)) {
            Some(AppEvent::Invoke { function, args, .. }) => {
                assert_eq!(function, 2);
                assert_eq!(args, vec!["42"]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_close_detaches() {
        let mut view = view();
        let detached = Arc::clone(&view.handle.detached);
        assert!(matches!(
            view.handle_key(key(KeyCode::Char('x'))),
            Some(AppEvent::RemoveInstance(7))
        ));
        assert!(detached.load(Ordering::Acquire));
        assert!(view.target(1).unwrap().detached.load(Ordering::Acquire));
    }

    #[test]
    fn test_space_collapses() {
        let mut view = view();
        view.handle_key(key(KeyCode::Char(' ')));
        assert!(view.is_collapsed());
        assert_eq!(view.height(), 2);
        // Navigation is ignored while collapsed
        assert!(view.handle_key(key(KeyCode::Enter)).is_none());
        view.handle_key(key(KeyCode::Char(' ')));
        assert!(!view.is_collapsed());
    }

    #[test]
    fn test_render_lists_functions() {
        let mut view = view();
        view.focused = true;
        let mut terminal = Terminal::new(TestBackend::new(80, 8)).unwrap();
        terminal.draw(|frame| view.render(frame, frame.area())).unwrap();
        let screen: String = terminal
            .backend()
            .buffer()
            .content()
            .iter()
            .map(|cell| cell.symbol())
            .collect();
        assert!(screen.contains("0xd8da...6045"));
        assert!(screen.contains("[call] get"));
        assert!(screen.contains("[transact (payable)] (fallback)"));
    }
}
