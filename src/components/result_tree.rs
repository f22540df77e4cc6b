use ratatui::prelude::*;

use crate::data::types::DisplayNode;
use crate::theme::THEME;

/// Flatten a decoded value into indented lines, one per node.
/// The unnamed root is skipped so outputs start at `indent`.
pub fn tree_lines(root: &DisplayNode, indent: usize) -> Vec<Line<'static>> {
    let mut lines = Vec::new();
    if root.key.is_empty() && root.value.is_none() {
        for child in &root.children {
            push_node(child, indent, &mut lines);
        }
    } else {
        push_node(root, indent, &mut lines);
    }
    lines
}

fn push_node(node: &DisplayNode, depth: usize, lines: &mut Vec<Line<'static>>) {
    let pad = " ".repeat(depth * 2);
    match &node.value {
        Some(value) => lines.push(Line::from(vec![
            Span::raw(pad),
            Span::styled(format!("{}: ", node.key), THEME.muted_style()),
            Span::styled(value.clone(), Style::default().fg(THEME.success)),
        ])),
        None => {
            let marker = if node.is_leaf() { "\u{25b8} " } else { "\u{25be} " };
            lines.push(Line::from(vec![
                Span::raw(pad),
                Span::styled(marker, THEME.muted_style()),
                Span::styled(node.key.clone(), THEME.accent_style()),
            ]));
            for child in &node.children {
                push_node(child, depth + 1, lines);
            }
        }
    }
}
