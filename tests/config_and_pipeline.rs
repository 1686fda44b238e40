use evremap::config::MappingConfig;
use evremap::event::KeyEvent;
use evremap::pipeline::Pipeline;

fn tv(ms: i64) -> evdev_rs::TimeVal {
    evdev_rs::TimeVal { tv_sec: ms / 1000, tv_usec: (ms % 1000) * 1000 }
}

const CONFIG: &str = r#"
    device_name = "Example Keyboard"

    [[single]]
    from = "KEY_CAPSLOCK"
    to = "KEY_ESC"

    [[double]]
    trigger = ["KEY_J", "KEY_K"]
    emit = ["KEY_ESC"]
    window_ms = 200

    [meta]
    meta_key = "KEY_SPACE"
    modifier = "KEY_LEFTCTRL"

    [meta.table]
    KEY_H = ["KEY_LEFT"]
    KEY_L = ["KEY_RIGHT"]
"#;

#[test]
fn config_loads_and_drives_all_three_stages() {
    let config = MappingConfig::from_str(CONFIG).expect("config parses");
    assert_eq!(config.device_name.as_deref(), Some("Example Keyboard"));

    let mut pipeline = Pipeline::new(&config);

    // single: CapsLock becomes Esc.
    let out = pipeline.apply(KeyEvent::press(evdev_rs::enums::EV_KEY::KEY_CAPSLOCK, tv(0)));
    assert_eq!(out, vec![KeyEvent::press(evdev_rs::enums::EV_KEY::KEY_ESC, tv(0))]);
    pipeline.apply(KeyEvent::release(evdev_rs::enums::EV_KEY::KEY_CAPSLOCK, tv(5)));

    // double: J+K within the window becomes a tap of Esc.
    assert!(pipeline.apply(KeyEvent::press(evdev_rs::enums::EV_KEY::KEY_J, tv(100))).is_empty());
    let out = pipeline.apply(KeyEvent::press(evdev_rs::enums::EV_KEY::KEY_K, tv(140)));
    assert_eq!(
        out,
        vec![
            KeyEvent::press(evdev_rs::enums::EV_KEY::KEY_ESC, tv(140)),
            KeyEvent::release(evdev_rs::enums::EV_KEY::KEY_ESC, tv(140)),
        ]
    );
    pipeline.apply(KeyEvent::release(evdev_rs::enums::EV_KEY::KEY_J, tv(150)));
    pipeline.apply(KeyEvent::release(evdev_rs::enums::EV_KEY::KEY_K, tv(160)));

    // meta: holding Space and tapping H/L expands under LeftCtrl.
    assert!(pipeline.apply(KeyEvent::press(evdev_rs::enums::EV_KEY::KEY_SPACE, tv(200))).is_empty());
    let out = pipeline.apply(KeyEvent::press(evdev_rs::enums::EV_KEY::KEY_H, tv(210)));
    assert_eq!(
        out,
        vec![
            KeyEvent::press(evdev_rs::enums::EV_KEY::KEY_LEFTCTRL, tv(210)),
            KeyEvent::press(evdev_rs::enums::EV_KEY::KEY_LEFT, tv(210)),
            KeyEvent::release(evdev_rs::enums::EV_KEY::KEY_LEFT, tv(210)),
            KeyEvent::release(evdev_rs::enums::EV_KEY::KEY_LEFTCTRL, tv(210)),
        ]
    );
    pipeline.apply(KeyEvent::release(evdev_rs::enums::EV_KEY::KEY_H, tv(220)));
    let out = pipeline.apply(KeyEvent::press(evdev_rs::enums::EV_KEY::KEY_L, tv(230)));
    assert_eq!(out[1].code, evdev_rs::enums::EV_KEY::KEY_RIGHT);
    pipeline.apply(KeyEvent::release(evdev_rs::enums::EV_KEY::KEY_L, tv(240)));
    assert!(pipeline.apply(KeyEvent::release(evdev_rs::enums::EV_KEY::KEY_SPACE, tv(250))).is_empty());
}

#[test]
fn double_chord_outside_window_falls_back_to_plain_keys() {
    let config = MappingConfig::from_str(CONFIG).expect("config parses");
    let mut pipeline = Pipeline::new(&config);

    assert!(pipeline.apply(KeyEvent::press(evdev_rs::enums::EV_KEY::KEY_J, tv(0))).is_empty());
    let out = pipeline.apply(KeyEvent::press(evdev_rs::enums::EV_KEY::KEY_K, tv(400)));
    assert_eq!(
        out,
        vec![
            KeyEvent::press(evdev_rs::enums::EV_KEY::KEY_J, tv(400)),
            KeyEvent::press(evdev_rs::enums::EV_KEY::KEY_K, tv(400)),
        ]
    );
}

#[test]
fn rejects_config_with_malformed_double_trigger() {
    let bad = r#"
        [[double]]
        trigger = ["KEY_J"]
        emit = ["KEY_ESC"]
    "#;
    let err = MappingConfig::from_str(bad).unwrap_err();
    assert!(err.to_string().contains("exactly 2"));
}
