use crate::config::{DoubleRule, KeyCode};
use crate::event::{timeval_diff_ms, KeyEvent};
use std::collections::HashSet;
use evdev_rs::TimeVal;

#[derive(Debug, Clone, Copy)]
struct Pending {
    code: KeyCode,
    press_time: TimeVal,
}

/// Stateful 2→N chord detector: combines two keys pressed within a window
/// into a replacement sequence (spec §4.2).
///
/// At most one key is ever "held awaiting a partner" (`pending`); the window
/// is evaluated at the moment the second event arrives, never by a timer.
#[derive(Debug, Clone)]
pub struct DoubleMapper {
    rules: Vec<DoubleRule>,
    pending: Option<Pending>,
    /// Codes whose press was consumed as half of a completed chord; their
    /// next release (or autorepeat) must be suppressed rather than forwarded.
    consumed: HashSet<KeyCode>,
}

impl DoubleMapper {
    pub fn new(rules: Vec<DoubleRule>) -> Self {
        Self { rules, pending: None, consumed: HashSet::new() }
    }

    fn is_trigger_participant(&self, code: KeyCode) -> bool {
        self.rules.iter().any(|r| r.has_trigger(code))
    }

    fn find_rule(&self, a: KeyCode, b: KeyCode) -> Option<&DoubleRule> {
        self.rules.iter().find(|r| r.matches(a, b))
    }

    fn flush_pending_as_press(&mut self, out: &mut Vec<KeyEvent>, time: &TimeVal) {
        if let Some(p) = self.pending.take() {
            out.push(KeyEvent::press(p.code, *time));
        }
    }

    pub fn apply(&mut self, event: KeyEvent) -> Vec<KeyEvent> {
        let mut out = Vec::new();
        match event.value {
            v if v == crate::event::PRESS => self.on_press(event, &mut out),
            v if v == crate::event::RELEASE => self.on_release(event, &mut out),
            _ => self.on_repeat(event, &mut out),
        }
        out
    }

    fn on_press(&mut self, event: KeyEvent, out: &mut Vec<KeyEvent>) {
        let code = event.code;

        if !self.is_trigger_participant(code) {
            // `code` can never complete a rule with `pending.code`, regardless of
            // timing, so any pending key is flushed unconditionally.
            self.flush_pending_as_press(out, &event.time);
            out.push(event);
            return;
        }

        match self.pending {
            None => {
                self.pending = Some(Pending { code, press_time: event.time });
            },
            Some(pending) => {
                let matched_rule = self.find_rule(pending.code, code).cloned().filter(|rule| {
                    timeval_diff_ms(&event.time, &pending.press_time) <= rule.window_ms
                });
                match matched_rule {
                    Some(rule) => {
                        self.pending = None;
                        self.consumed.insert(pending.code);
                        self.consumed.insert(code);
                        for &k in &rule.emit {
                            out.push(KeyEvent::press(k, event.time));
                        }
                        for &k in rule.emit.iter().rev() {
                            out.push(KeyEvent::release(k, event.time));
                        }
                    },
                    None => {
                        self.flush_pending_as_press(out, &event.time);
                        out.push(event);
                    },
                }
            },
        }
    }

    fn on_release(&mut self, event: KeyEvent, out: &mut Vec<KeyEvent>) {
        let code = event.code;

        if let Some(pending) = self.pending {
            if pending.code == code {
                self.pending = None;
                out.push(KeyEvent::press(code, event.time));
                out.push(KeyEvent::release(code, event.time));
                return;
            }
        }

        if self.consumed.remove(&code) {
            return;
        }

        out.push(event);
    }

    fn on_repeat(&mut self, event: KeyEvent, out: &mut Vec<KeyEvent>) {
        let code = event.code;
        let is_pending = self.pending.map(|p| p.code == code).unwrap_or(false);
        if is_pending || self.consumed.contains(&code) {
            return;
        }
        out.push(event);
    }
}
