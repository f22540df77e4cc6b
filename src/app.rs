use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::Address;
use crossterm::event::{Event, EventStream, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use futures::StreamExt;
use ratatui::prelude::*;
use ratatui::widgets::*;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::components::Component;
use crate::components::confirm_dialog::ConfirmDialog;
use crate::components::header::Header;
use crate::components::help::HelpOverlay;
use crate::components::instance::{InstanceHandle, InstanceView};
use crate::components::status_bar::StatusBar;
use crate::components::terminal::TerminalPanel;
use crate::data::DappService;
use crate::data::abi::ContractAbi;
use crate::events::{AppEvent, InstanceId};
use crate::invocation::InvocationError;
use crate::theme::THEME;

pub struct App {
    // Components
    header: Header,
    instances: Vec<InstanceView>,
    focused: usize,
    terminal: TerminalPanel,
    confirm: ConfirmDialog,
    status_bar: StatusBar,
    help: HelpOverlay,

    // Data
    service: Arc<DappService>,
    event_rx: mpsc::UnboundedReceiver<AppEvent>,

    // State
    next_id: InstanceId,
    should_quit: bool,
    tick_rate: Duration,
}

impl App {
    pub fn new(
        service: Arc<DappService>,
        event_rx: mpsc::UnboundedReceiver<AppEvent>,
        tick_rate_ms: u64,
    ) -> Self {
        let context = service.context();
        Self {
            header: Header::new(context),
            instances: Vec::new(),
            focused: 0,
            terminal: TerminalPanel::new(),
            confirm: ConfirmDialog::new(),
            status_bar: StatusBar::new(context.rpc_url.clone()),
            help: HelpOverlay::new(),
            service,
            event_rx,
            next_id: 1,
            should_quit: false,
            tick_rate: Duration::from_millis(tick_rate_ms),
        }
    }

    pub async fn run(&mut self, mut terminal: ratatui::DefaultTerminal) -> color_eyre::Result<()> {
        let mut interval = tokio::time::interval(self.tick_rate);
        let mut events = EventStream::new();

        while !self.should_quit {
            tokio::select! {
                _ = interval.tick() => {
                    terminal.draw(|frame| self.render(frame))?;
                }
                Some(Ok(event)) = events.next() => {
                    self.handle_terminal_event(event);
                }
                Some(app_event) = self.event_rx.recv() => {
                    self.handle_app_event(app_event);
                }
            }
        }

        Ok(())
    }

    fn render(&mut self, frame: &mut Frame) {
        let area = frame.area();

        // Fill background
        frame.render_widget(
            Block::default().style(Style::default().bg(THEME.bg)),
            area,
        );

        // Layout: header (1) | instances (fill) | terminal | status bar (1)
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(1),
                Constraint::Min(6),
                Constraint::Percentage(30),
                Constraint::Length(1),
            ])
            .split(area);

        self.header.instances = self.instances.len();
        self.header.render(frame, chunks[0]);
        self.render_instances(frame, chunks[1]);
        self.terminal.render(frame, chunks[2]);
        self.status_bar.render(frame, chunks[3]);

        // Overlays (rendered on top)
        self.confirm.render(frame, area);
        self.help.render(frame, area);
    }

    /// Stack the instances, scrolled so the focused one is fully visible.
    fn render_instances(&mut self, frame: &mut Frame, area: Rect) {
        if self.instances.is_empty() {
            let text = Paragraph::new("No contract instances. Start with --deploy NAME or --at [NAME@]ADDRESS.")
                .style(THEME.muted_style())
                .alignment(Alignment::Center)
                .block(Block::default().borders(Borders::ALL).border_style(THEME.border_style()));
            frame.render_widget(text, area);
            return;
        }

        let heights: Vec<u16> = self.instances.iter().map(InstanceView::height).collect();
        let mut first = self.focused;
        let mut used = heights[self.focused];
        while first > 0 && used + heights[first - 1] <= area.height {
            first -= 1;
            used += heights[first];
        }

        let mut y = area.y;
        let bottom = area.y + area.height;
        for (i, view) in self.instances.iter_mut().enumerate().skip(first) {
            let remaining = bottom.saturating_sub(y);
            if remaining < 2 {
                break;
            }
            let height = heights[i].min(remaining);
            view.focused = i == self.focused;
            view.render(frame, Rect::new(area.x, y, area.width, height));
            y += height;
        }
    }

    fn handle_terminal_event(&mut self, event: Event) {
        if let Event::Key(key) = event {
            // Only handle key press events (not release/repeat) for cross-platform compat
            if key.kind != KeyEventKind::Press {
                return;
            }
            self.handle_key(key);
        }
    }

    fn handle_key(&mut self, key: KeyEvent) {
        if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
            self.should_quit = true;
            return;
        }

        // The confirmation dialog is modal
        if self.confirm.is_active() {
            self.confirm.handle_key(key);
            return;
        }

        // Help overlay consumes all keys when visible
        if self.help.handle_key(key) {
            return;
        }

        // Argument input gets every key
        let editing = self
            .instances
            .get(self.focused)
            .is_some_and(InstanceView::is_editing);
        if !editing {
            if self.terminal.handle_key(key) {
                return;
            }
            match key.code {
                KeyCode::Char('q') => {
                    self.should_quit = true;
                    return;
                }
                KeyCode::Char('?') => {
                    self.help.toggle();
                    return;
                }
                KeyCode::Char('C') => {
                    self.terminal.clear();
                    return;
                }
                KeyCode::Tab => {
                    self.focus_next(1);
                    return;
                }
                KeyCode::BackTab => {
                    self.focus_next(-1);
                    return;
                }
                _ => {}
            }
            self.status_bar.clear_messages();
        }

        let app_event = self
            .instances
            .get_mut(self.focused)
            .and_then(|view| view.handle_key(key));
        if let Some(event) = app_event {
            self.handle_app_event(event);
        }
    }

    fn handle_app_event(&mut self, event: AppEvent) {
        match event {
            AppEvent::Log(entry) => self.terminal.push(entry),
            AppEvent::Invoke {
                instance,
                function,
                args,
            } => {
                let Some(target) = self.instance(instance).and_then(|view| view.target(function)) else {
                    return;
                };
                self.status_bar.pending += 1;
                self.service.invoke(instance, function, target, args);
            }
            AppEvent::InvocationProgress {
                instance,
                function,
                state,
            } => {
                // Events of removed instances are dropped
                if let Some(view) = self.instance_mut(instance) {
                    view.set_progress(function, state);
                }
            }
            AppEvent::InvocationFinished {
                instance,
                function,
                outcome,
            } => {
                self.status_bar.pending = self.status_bar.pending.saturating_sub(1);
                if let Err(InvocationError::Detached) = &outcome {
                    debug!(instance, function, "invocation of removed instance dropped");
                }
                if let Some(view) = self.instance_mut(instance) {
                    view.finish(function, &outcome);
                }
            }
            AppEvent::ConfirmationRequested(pending) => self.confirm.push(pending),
            AppEvent::InstanceReady { name, address, abi } => self.add_instance(name, address, abi),
            AppEvent::RemoveInstance(id) => self.remove_instance(id),
            AppEvent::Notice(msg) => {
                self.status_bar.error_message = None;
                self.status_bar.notice = Some(msg);
            }
            AppEvent::Error(msg) => {
                warn!("{msg}");
                self.status_bar.error_message = Some(msg);
            }
        }
    }

    fn add_instance(&mut self, name: String, address: Address, abi: Arc<ContractAbi>) {
        let id = self.next_id;
        self.next_id += 1;
        let handle = InstanceHandle::new(id, name, address, abi);
        let view = InstanceView::new(handle, self.service.context().label());
        info!(id, instance = %view.title(), "instance added");
        self.instances.push(view);
        self.focused = self.instances.len() - 1;
    }

    fn remove_instance(&mut self, id: InstanceId) {
        if let Some(index) = self.instances.iter().position(|v| v.handle.id == id) {
            let view = self.instances.remove(index);
            view.handle.detach();
            info!(id, instance = %view.title(), "instance removed");
            if self.focused >= self.instances.len() {
                self.focused = self.instances.len().saturating_sub(1);
            }
        }
    }

    fn focus_next(&mut self, step: isize) {
        if self.instances.is_empty() {
            return;
        }
        let len = self.instances.len() as isize;
        self.focused = (self.focused as isize + step).rem_euclid(len) as usize;
    }

    fn instance(&self, id: InstanceId) -> Option<&InstanceView> {
        self.instances.iter().find(|v| v.handle.id == id)
    }

    fn instance_mut(&mut self, id: InstanceId) -> Option<&mut InstanceView> {
        self.instances.iter_mut().find(|v| v.handle.id == id)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use alloy::dyn_abi::DynSolValue;
    use alloy::primitives::{Bytes, U256};

    use super::*;
    use crate::components::call_control::ControlOutput;
    use crate::data::artifacts::ContractRegistry;
    use crate::invocation::mock::{Journal, MockBackend};

    const ABI: &str = r#"[
        {"type":"function","name":"get","inputs":[],"outputs":[{"name":"","type":"uint256"}],"stateMutability":"view"},
        {"type":"function","name":"set","inputs":[{"name":"x","type":"uint256"}],"outputs":[],"stateMutability":"nonpayable"}
    ]"#;

    fn app(backend: MockBackend) -> App {
        let (tx, rx) = mpsc::unbounded_channel();
        let service = DappService::new(Arc::new(backend), ContractRegistry::default(), None, tx);
        App::new(Arc::new(service), rx, 100)
    }

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn ready(app: &mut App, name: &str) {
        app.handle_app_event(AppEvent::InstanceReady {
            name: name.to_string(),
            address: Address::repeat_byte(0x42),
            abi: Arc::new(ContractAbi::from_json_str(ABI).unwrap()),
        });
    }

    #[tokio::test]
    async fn test_new_instance_takes_focus() {
        let mut app = app(MockBackend::new(31337, Journal::default()));
        ready(&mut app, "First");
        ready(&mut app, "Second");
        assert_eq!(app.instances.len(), 2);
        assert_eq!(app.focused, 1);

        app.handle_key(key(KeyCode::Tab));
        assert_eq!(app.focused, 0);
        app.handle_key(key(KeyCode::BackTab));
        assert_eq!(app.focused, 1);
    }

    #[tokio::test]
    async fn test_remove_instance_detaches_and_ignores_late_events() {
        let mut app = app(MockBackend::new(31337, Journal::default()));
        ready(&mut app, "Store");
        let id = app.instances[0].handle.id;
        let detached = Arc::clone(&app.instances[0].handle.detached);

        app.handle_key(key(KeyCode::Char('x')));
        assert!(app.instances.is_empty());
        assert!(detached.load(Ordering::Acquire));

        app.status_bar.pending = 1;
        app.handle_app_event(AppEvent::InvocationFinished {
            instance: id,
            function: 0,
            outcome: Err(InvocationError::Detached),
        });
        assert_eq!(app.status_bar.pending, 0);
    }

    #[tokio::test]
    async fn test_confirmation_dialog_is_modal() {
        use crate::components::confirm_dialog::{CANCELED_BY_USER, PendingConfirmation};
        use crate::data::types::{Network, TxData};
        use crate::invocation::{ConfirmationRequest, Decision};
        use std::sync::atomic::AtomicBool;
        use tokio::sync::oneshot;

        let mut app = app(MockBackend::new(1, Journal::default()));
        ready(&mut app, "Store");
        let (responder, mut rx) = oneshot::channel();
        app.handle_app_event(AppEvent::ConfirmationRequested(PendingConfirmation {
            request: ConfirmationRequest {
                network: Network::from_chain_id(1),
                from: Address::ZERO,
                tx: TxData {
                    to: Some(Address::repeat_byte(0x42)),
                    data: Bytes::new(),
                    value: U256::ZERO,
                    contract_name: "Store".to_string(),
                    signature: "set(uint256)".to_string(),
                },
                gas_limit: 21_000,
                gas_price: Ok(U256::from(1_000_000_000u64)),
            },
            responder,
            skip: Arc::new(AtomicBool::new(false)),
        }));

        assert!(app.confirm.is_active());

        // 'x' would close the instance without the dialog
        app.handle_key(key(KeyCode::Char('x')));
        assert_eq!(app.instances.len(), 1);

        app.handle_key(key(KeyCode::Esc));
        assert_eq!(
            rx.try_recv().unwrap(),
            Decision::Cancelled(CANCELED_BY_USER.to_string())
        );
        assert!(!app.confirm.is_active());

        // Keys reach the instance again once the dialog is gone
        app.handle_key(key(KeyCode::Char('x')));
        assert!(app.instances.is_empty());
    }

    #[tokio::test]
    async fn test_call_round_trip_renders_result() {
        let data = DynSolValue::Uint(U256::from(42u64), 256).abi_encode();
        let backend = MockBackend {
            return_data: Bytes::from(data),
            ..MockBackend::new(31337, Journal::default())
        };
        let mut app = app(backend);
        ready(&mut app, "Store");

        app.handle_key(key(KeyCode::Enter));
        assert_eq!(app.status_bar.pending, 1);

        while let Some(event) = app.event_rx.recv().await {
            let finished = matches!(event, AppEvent::InvocationFinished { .. });
            app.handle_app_event(event);
            if finished {
                break;
            }
        }

        assert_eq!(app.status_bar.pending, 0);
        let control = &app.instances[0].controls()[0];
        let Some(ControlOutput::Tree(tree)) = &control.output else {
            panic!("expected decoded output");
        };
        assert_eq!(tree.leaves()[0].value.as_deref(), Some("42"));
        let logs: Vec<_> = app.terminal.entries().map(|e| e.message.clone()).collect();
        assert_eq!(logs, vec!["call to Store.get"]);
    }
}
