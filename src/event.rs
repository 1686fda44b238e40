use crate::config::KeyCode;
use evdev_rs::TimeVal;

/// Press/release/autorepeat encoding used throughout the pipeline, mirroring the
/// kernel input protocol (`input_event.value`).
pub const RELEASE: i32 = 0;
pub const PRESS: i32 = 1;
pub const REPEAT: i32 = 2;

/// A single `EV_KEY` event flowing through the three mapping stages.
///
/// Non-key traffic (`EV_SYN`, `EV_MSC`, ...) never reaches this type; the
/// `DeviceWorker` forwards it verbatim before the pipeline is invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    pub code: KeyCode,
    pub value: i32,
    pub time: TimeVal,
}

impl KeyEvent {
    pub fn new(code: KeyCode, value: i32, time: TimeVal) -> Self {
        Self { code, value, time }
    }

    pub fn press(code: KeyCode, time: TimeVal) -> Self {
        Self::new(code, PRESS, time)
    }

    pub fn release(code: KeyCode, time: TimeVal) -> Self {
        Self::new(code, RELEASE, time)
    }

    pub fn is_press(&self) -> bool {
        self.value == PRESS
    }

    pub fn is_release(&self) -> bool {
        self.value == RELEASE
    }

    pub fn is_repeat(&self) -> bool {
        self.value == REPEAT
    }
}

/// Elapsed wall-clock time between two kernel timestamps, saturating to zero
/// for out-of-order clocks rather than panicking on underflow.
pub fn timeval_diff_ms(newer: &TimeVal, older: &TimeVal) -> u64 {
    const MICROS_PER_SECOND: i64 = 1_000_000;
    let secs = newer.tv_sec - older.tv_sec;
    let usecs = newer.tv_usec - older.tv_usec;
    let (secs, usecs) =
        if usecs < 0 { (secs - 1, usecs + MICROS_PER_SECOND) } else { (secs, usecs) };
    let micros = secs * MICROS_PER_SECOND + usecs;
    (micros.max(0) / 1000) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tv(sec: i64, usec: i64) -> TimeVal {
        TimeVal { tv_sec: sec, tv_usec: usec }
    }

    #[test]
    fn diff_handles_usec_borrow() {
        let older = tv(0, 900_000);
        let newer = tv(1, 100_000);
        assert_eq!(timeval_diff_ms(&newer, &older), 200);
    }

    #[test]
    fn diff_same_time_is_zero() {
        let t = tv(5, 0);
        assert_eq!(timeval_diff_ms(&t, &t), 0);
    }
}
