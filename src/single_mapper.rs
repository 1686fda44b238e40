use crate::config::KeyCode;
use crate::event::KeyEvent;
use std::collections::HashMap;

/// Stateless 1→1 rewrite of individual key codes (spec §4.1).
///
/// A pure function of the shared config and the input event; holds no
/// per-worker state, so a single `SingleMapper` could in principle be shared
/// across workers, but each worker is given its own clone for symmetry with
/// the stateful stages that follow it.
#[derive(Debug, Clone, Default)]
pub struct SingleMapper {
    table: HashMap<KeyCode, KeyCode>,
}

impl SingleMapper {
    pub fn new(table: HashMap<KeyCode, KeyCode>) -> Self {
        Self { table }
    }

    pub fn apply(&self, event: KeyEvent) -> KeyEvent {
        match self.table.get(&event.code) {
            Some(&mapped) => KeyEvent::new(mapped, event.value, event.time),
            None => event,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{PRESS, RELEASE};
    use evdev_rs::TimeVal;

    fn tv() -> TimeVal {
        TimeVal { tv_sec: 0, tv_usec: 0 }
    }

    #[test]
    fn rewrites_mapped_key() {
        let mut table = HashMap::new();
        table.insert(KeyCode::KEY_CAPSLOCK, KeyCode::KEY_ESC);
        let mapper = SingleMapper::new(table);

        let press = mapper.apply(KeyEvent::new(KeyCode::KEY_CAPSLOCK, PRESS, tv()));
        assert_eq!(press.code, KeyCode::KEY_ESC);
        assert_eq!(press.value, PRESS);

        let release = mapper.apply(KeyEvent::new(KeyCode::KEY_CAPSLOCK, RELEASE, tv()));
        assert_eq!(release.code, KeyCode::KEY_ESC);
        assert_eq!(release.value, RELEASE);
    }

    #[test]
    fn passes_through_unmapped_key() {
        let mapper = SingleMapper::new(HashMap::new());
        let event = mapper.apply(KeyEvent::new(KeyCode::KEY_A, PRESS, tv()));
        assert_eq!(event.code, KeyCode::KEY_A);
    }
}
