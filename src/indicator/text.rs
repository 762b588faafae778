//! Line-oriented indicator for status bars and terminals.
//!
//! Prints the layer name while visible and an empty line while hidden.
//! Nothing is written unless the printed line actually changes.

use crate::traits::Indicator;
use log::warn;
use std::io::Write;

pub struct TextIndicator<W: Write> {
    out: W,
    text: String,
    visible: bool,
    last_line: String,
}

impl<W: Write> TextIndicator<W> {
    /// Start hidden with `initial_text` as the label.
    pub fn new(out: W, initial_text: &str) -> Self {
        Self {
            out,
            text: initial_text.to_string(),
            visible: false,
            last_line: String::new(),
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn emit(&mut self) {
        let line = if self.visible { self.text.as_str() } else { "" };
        if line == self.last_line {
            return;
        }
        self.last_line = line.to_string();
        if let Err(e) = writeln!(self.out, "{}", self.last_line).and_then(|_| self.out.flush()) {
            warn!("failed to write indicator line: {}", e);
        }
    }
}

impl<W: Write> Indicator for TextIndicator<W> {
    fn set_layer(&mut self, text: &str) {
        self.text = text.to_string();
        self.emit();
    }

    fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
        self.emit();
    }

    fn destroy(&mut self) {
        self.visible = false;
        self.emit();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kanata::watcher::{show_disconnected, show_layer};

    fn output(ind: TextIndicator<Vec<u8>>) -> String {
        String::from_utf8(ind.into_inner()).unwrap()
    }

    #[test]
    fn prints_nothing_until_first_layer() {
        let ind = TextIndicator::new(Vec::new(), "init...");
        assert_eq!(output(ind), "");
    }

    #[test]
    fn prints_each_layer_once() {
        let mut ind = TextIndicator::new(Vec::new(), "init...");
        show_layer(&mut ind, "base");
        show_layer(&mut ind, "base");
        show_layer(&mut ind, "nav");
        assert_eq!(output(ind), "base\nnav\n");
    }

    #[test]
    fn disconnect_prints_empty_line_without_stale_name() {
        let mut ind = TextIndicator::new(Vec::new(), "init...");
        show_layer(&mut ind, "base");
        show_disconnected(&mut ind);
        show_layer(&mut ind, "nav");
        assert_eq!(output(ind), "base\n\nnav\n");
    }

    #[test]
    fn destroy_clears_line() {
        let mut ind = TextIndicator::new(Vec::new(), "init...");
        show_layer(&mut ind, "base");
        ind.destroy();
        assert_eq!(output(ind), "base\n\n");
    }
}
