use crate::config::{KeyCode, MetaConfig};
use crate::event::KeyEvent;
use std::collections::{HashMap, HashSet};

/// Stateful 1→N macro expander (spec §4.3): while `meta_key` is held, keys
/// named in `table` are rewritten into a `modifier`-framed sequence.
#[derive(Debug, Clone)]
pub struct MetaMapper {
    meta_key: KeyCode,
    modifier: KeyCode,
    table: HashMap<KeyCode, Vec<KeyCode>>,
    meta_down: bool,
    emitted_macro: bool,
    /// Keys whose press triggered an expansion, until their own physical
    /// release is observed; that release must be suppressed since the
    /// expansion already released its own synthesized keys. Entries survive
    /// the meta key's own release so a key released after the meta key (a
    /// physically realistic ordering) is still suppressed correctly.
    active_expansions: HashSet<KeyCode>,
}

impl MetaMapper {
    pub fn new(config: Option<MetaConfig>) -> Self {
        match config {
            Some(c) => Self {
                meta_key: c.meta_key,
                modifier: c.modifier,
                table: c.table,
                meta_down: false,
                emitted_macro: false,
                active_expansions: HashSet::new(),
            },
            // A meta key that can never appear in real input disables the stage,
            // making it the identity transform when no `[meta]` section is configured.
            None => Self {
                meta_key: KeyCode::KEY_RESERVED,
                modifier: KeyCode::KEY_RESERVED,
                table: HashMap::new(),
                meta_down: false,
                emitted_macro: false,
                active_expansions: HashSet::new(),
            },
        }
    }

    fn expand(&self, expansion: &[KeyCode], event: &KeyEvent, out: &mut Vec<KeyEvent>) {
        out.push(KeyEvent::press(self.modifier, event.time));
        for &k in expansion {
            out.push(KeyEvent::press(k, event.time));
            out.push(KeyEvent::release(k, event.time));
        }
        out.push(KeyEvent::release(self.modifier, event.time));
    }

    pub fn apply(&mut self, event: KeyEvent) -> Vec<KeyEvent> {
        let mut out = Vec::new();

        if event.code == self.meta_key {
            match event.value {
                v if v == crate::event::PRESS => {
                    self.meta_down = true;
                    self.emitted_macro = false;
                },
                v if v == crate::event::RELEASE => {
                    self.meta_down = false;
                    if !self.emitted_macro {
                        out.push(KeyEvent::press(self.meta_key, event.time));
                        out.push(KeyEvent::release(self.meta_key, event.time));
                    }
                },
                _ => {
                    // Autorepeat of the meta key itself is suppressed.
                },
            }
            return out;
        }

        // A key whose press already fired an expansion must have its release
        // suppressed no matter when it arrives relative to the meta key's own
        // release: the synthetic device never saw a press of `event.code`
        // itself, only the expansion's presses/releases.
        if event.is_release() && self.active_expansions.remove(&event.code) {
            return out;
        }

        if !self.meta_down {
            out.push(event);
            return out;
        }

        match event.value {
            v if v == crate::event::PRESS => match self.table.get(&event.code).cloned() {
                Some(expansion) => {
                    self.active_expansions.insert(event.code);
                    self.emitted_macro = true;
                    self.expand(&expansion, &event, &mut out);
                },
                None => out.push(event),
            },
            v if v == crate::event::RELEASE => out.push(event),
            _ => match self.table.get(&event.code).cloned() {
                Some(expansion) => self.expand(&expansion, &event, &mut out),
                None => out.push(event),
            },
        }

        out
    }
}
