use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;

use crate::components::result_tree;
use crate::data::abi::{CallKind, FunctionDescriptor};
use crate::data::tx_format::parse_arg_list;
use crate::data::types::DisplayNode;
use crate::invocation::{InvocationError, InvocationOutcome, InvocationState};
use crate::theme::THEME;
use crate::utils;

/// What a control shows under its button after an invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlOutput {
    Tree(DisplayNode),
    Status(String),
}

/// Button and argument input of one function.
///
/// Arguments are typed either as one comma separated line or, once expanded,
/// one field per parameter.
pub struct CallControl {
    pub function: FunctionDescriptor,
    pub state: InvocationState,
    pub output: Option<ControlOutput>,
    line: String,
    fields: Vec<String>,
    expanded: bool,
    editing: bool,
    current_field: usize,
}

impl CallControl {
    pub fn new(function: FunctionDescriptor) -> Self {
        let fields = vec![String::new(); function.inputs.len()];
        Self {
            function,
            state: InvocationState::Idle,
            output: None,
            line: String::new(),
            fields,
            expanded: false,
            editing: false,
            current_field: 0,
        }
    }

    pub fn is_editing(&self) -> bool {
        self.editing
    }

    pub fn button_label(&self) -> &'static str {
        match self.function.kind() {
            CallKind::ReadCall => "call",
            _ if self.function.payable => "transact (payable)",
            _ => "transact",
        }
    }

    fn takes_input(&self) -> bool {
        self.function.kind() == CallKind::Fallback || !self.function.inputs.is_empty()
    }

    /// Arguments as the encoding layer expects them.
    pub fn args(&self) -> Vec<String> {
        if self.function.kind() == CallKind::Fallback {
            let raw = self.line.trim();
            return if raw.is_empty() { Vec::new() } else { vec![raw.to_string()] };
        }
        if self.expanded {
            self.fields.iter().map(|f| f.trim().to_string()).collect()
        } else {
            parse_arg_list(&self.line)
        }
    }

    /// Switch between the single line and one field per parameter,
    /// carrying the typed values over.
    pub fn toggle_expanded(&mut self) {
        if self.function.inputs.len() < 2 {
            return;
        }
        if self.expanded {
            self.line = self.fields.join(", ");
        } else {
            let mut values = parse_arg_list(&self.line);
            values.resize(self.function.inputs.len(), String::new());
            self.fields = values;
            self.current_field = 0;
        }
        self.expanded = !self.expanded;
    }

    /// Press the button: functions without input are submitted right away,
    /// the others open their input first.
    pub fn activate(&mut self) -> Option<Vec<String>> {
        if self.takes_input() {
            self.editing = true;
            None
        } else {
            Some(self.args())
        }
    }

    /// Handle a key while editing. Returns the arguments on submit.
    pub fn handle_key(&mut self, key: KeyEvent) -> Option<Vec<String>> {
        match key.code {
            KeyCode::Esc => {
                self.editing = false;
                None
            }
            KeyCode::Enter => {
                self.editing = false;
                Some(self.args())
            }
            KeyCode::Tab if self.expanded => {
                self.current_field = (self.current_field + 1) % self.fields.len();
                None
            }
            KeyCode::BackTab if self.expanded => {
                self.current_field = self
                    .current_field
                    .checked_sub(1)
                    .unwrap_or(self.fields.len() - 1);
                None
            }
            KeyCode::Char(c) => {
                self.input_mut().push(c);
                None
            }
            KeyCode::Backspace => {
                self.input_mut().pop();
                None
            }
            _ => None,
        }
    }

    fn input_mut(&mut self) -> &mut String {
        if self.expanded {
            if let Some(field) = self.fields.get_mut(self.current_field) {
                return field;
            }
        }
        &mut self.line
    }

    pub fn set_state(&mut self, state: InvocationState) {
        if state == InvocationState::Encoding {
            self.output = None;
        }
        self.state = state;
    }

    pub fn finish(&mut self, outcome: &Result<InvocationOutcome, InvocationError>) {
        match outcome {
            Ok(InvocationOutcome::Decoded(tree)) => self.output = Some(ControlOutput::Tree(tree.clone())),
            Ok(InvocationOutcome::Transacted { status, .. }) => {
                self.output = Some(ControlOutput::Status(status.clone()))
            }
            Ok(InvocationOutcome::Deployed { address }) => {
                self.output = Some(ControlOutput::Status(format!(
                    "deployed at {}",
                    utils::format_address(address)
                )))
            }
            // Errors are reported on the terminal
            Err(_) => self.output = None,
        }
    }

    pub fn lines(&self, selected: bool) -> Vec<Line<'static>> {
        let marker = if selected { " > " } else { "   " };
        let button_style = match self.function.kind() {
            CallKind::ReadCall => Style::default().fg(THEME.info),
            _ if self.function.payable => Style::default().fg(THEME.error),
            _ => Style::default().fg(THEME.warning),
        };
        let name_style = if selected {
            THEME.selected_style()
        } else {
            Style::default().fg(THEME.text)
        };

        let mut header = vec![
            Span::styled(marker, THEME.accent_style()),
            Span::styled(format!("[{}] ", self.button_label()), button_style),
            Span::styled(self.function.display_name().to_string(), name_style),
            Span::raw("  "),
        ];

        if !self.expanded {
            let placeholder = if self.function.kind() == CallKind::Fallback {
                "hex call data".to_string()
            } else {
                self.function.inputs_signature()
            };
            if self.editing {
                header.push(Span::styled(
                    format!("{}_", self.line),
                    Style::default().fg(THEME.text).add_modifier(Modifier::BOLD),
                ));
            } else if self.line.is_empty() {
                header.push(Span::styled(placeholder, THEME.muted_style()));
            } else {
                header.push(Span::styled(self.line.clone(), Style::default().fg(THEME.text)));
            }
        }

        if self.state != InvocationState::Idle {
            let style = match self.state {
                InvocationState::Succeeded => THEME.success_style(),
                InvocationState::Failed | InvocationState::EncodingFailed => THEME.error_style(),
                state if !state.is_terminal() => Style::default().fg(THEME.warning),
                _ => THEME.muted_style(),
            };
            header.push(Span::styled(format!("  ({})", self.state.label()), style));
        }

        let mut lines = vec![Line::from(header)];

        if self.expanded {
            for (i, ((name, ty), value)) in self.function.inputs.iter().zip(&self.fields).enumerate() {
                let label = if name.is_empty() {
                    format!("       {ty}: ")
                } else {
                    format!("       {name} ({ty}): ")
                };
                let active = self.editing && i == self.current_field;
                let cursor = if active { "_" } else { "" };
                let style = if active {
                    Style::default().fg(THEME.text).add_modifier(Modifier::BOLD)
                } else {
                    Style::default().fg(THEME.text)
                };
                lines.push(Line::from(vec![
                    Span::styled(label, THEME.muted_style()),
                    Span::styled(format!("{value}{cursor}"), style),
                ]));
            }
        }

        match &self.output {
            Some(ControlOutput::Tree(tree)) => lines.extend(result_tree::tree_lines(tree, 3)),
            Some(ControlOutput::Status(status)) => lines.push(Line::from(Span::styled(
                format!("      {status}"),
                THEME.muted_style(),
            ))),
            None => {}
        }

        lines
    }
}

#[cfg(test)]
mod tests {
    use crossterm::event::KeyModifiers;

    use super::*;
    use crate::data::abi::ContractAbi;

    const ABI: &str = r#"[
        {"type":"function","name":"transfer","inputs":[{"name":"to","type":"address"},{"name":"amount","type":"uint256"}],"outputs":[{"name":"","type":"bool"}],"stateMutability":"nonpayable"},
        {"type":"function","name":"total","inputs":[],"outputs":[{"name":"","type":"uint256"}],"stateMutability":"view"},
        {"type":"function","name":"deposit","inputs":[],"outputs":[],"stateMutability":"payable"},
        {"type":"fallback","stateMutability":"nonpayable"}
    ]"#;

    fn control(name: &str) -> CallControl {
        let abi = ContractAbi::from_json_str(ABI).unwrap();
        let func = abi
            .callables()
            .into_iter()
            .find(|f| f.display_name() == name)
            .unwrap();
        CallControl::new(func)
    }

    fn type_text(control: &mut CallControl, text: &str) {
        for c in text.chars() {
            control.handle_key(KeyEvent::new(KeyCode::Char(c), KeyModifiers::NONE));
        }
    }

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    #[test]
    fn test_button_labels() {
        assert_eq!(control("transfer").button_label(), "transact");
        assert_eq!(control("total").button_label(), "call");
        assert_eq!(control("deposit").button_label(), "transact (payable)");
    }

    #[test]
    fn test_no_input_submits_immediately() {
        let mut total = control("total");
        assert_eq!(total.activate(), Some(Vec::new()));
        assert!(!total.is_editing());
    }

    #[test]
    fn test_single_line_arguments() {
        let mut transfer = control("transfer");
        assert_eq!(transfer.activate(), None);
        assert!(transfer.is_editing());
        type_text(&mut transfer, "0x0000000000000000000000000000000000000001, 5");
        let args = transfer.handle_key(key(KeyCode::Enter)).unwrap();
        assert_eq!(args, vec!["0x0000000000000000000000000000000000000001", "5"]);
        assert!(!transfer.is_editing());
    }

    #[test]
    fn test_expand_carries_values_over() {
        let mut transfer = control("transfer");
        transfer.activate();
        type_text(&mut transfer, "0xabc, 7");
        transfer.toggle_expanded();
        transfer.handle_key(key(KeyCode::Tab));
        transfer.handle_key(key(KeyCode::Backspace));
        type_text(&mut transfer, "8");
        assert_eq!(transfer.args(), vec!["0xabc", "8"]);

        transfer.toggle_expanded();
        assert_eq!(transfer.args(), vec!["0xabc", "8"]);
    }

    #[test]
    fn test_fallback_takes_raw_hex() {
        let mut fallback = control("(fallback)");
        assert_eq!(fallback.activate(), None);
        type_text(&mut fallback, "0x1234");
        assert_eq!(fallback.handle_key(key(KeyCode::Enter)), Some(vec!["0x1234".to_string()]));
    }

    #[test]
    fn test_escape_leaves_input() {
        let mut transfer = control("transfer");
        transfer.activate();
        assert_eq!(transfer.handle_key(key(KeyCode::Esc)), None);
        assert!(!transfer.is_editing());
    }

    #[test]
    fn test_finish_shows_decoded_tree() {
        let mut total = control("total");
        let tree = DisplayNode::branch("", vec![DisplayNode::leaf("0: uint256", "42")]);
        total.set_state(InvocationState::Succeeded);
        total.finish(&Ok(InvocationOutcome::Decoded(tree.clone())));
        assert_eq!(total.output, Some(ControlOutput::Tree(tree)));
        assert_eq!(total.lines(false).len(), 2);

        total.set_state(InvocationState::Encoding);
        assert!(total.output.is_none());
    }

    #[test]
    fn test_errors_clear_output() {
        let mut transfer = control("transfer");
        transfer.output = Some(ControlOutput::Status("old".to_string()));
        transfer.finish(&Err(InvocationError::UserCancelled("Transaction canceled by user.".to_string())));
        assert!(transfer.output.is_none());
    }
}
