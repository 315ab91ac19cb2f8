use sensorlink_core::demo::{DemoBoard, ReplayChannel};
use sensorlink_core::protocol::line::{classify, parse_line, Line};
use sensorlink_core::protocol::{
    ConnectError, ConnectionState, LinkConfig, ParseError, SerialLink,
};
use sensorlink_core::sample::Sample;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

fn fast_config() -> LinkConfig {
    LinkConfig {
        settle_delay: Duration::ZERO,
        poll_interval: Duration::from_millis(5),
        ..LinkConfig::default()
    }
}

#[test]
fn test_parse_reference_line() {
    assert_eq!(
        parse_line("23.5,60.2,45.0,512"),
        Ok(Sample::new(23.5, 60.2, 45.0, 512))
    );
}

#[test]
fn test_parse_errors_are_values() {
    assert_eq!(parse_line("23.5,60.2,45.0"), Err(ParseError::FieldCount(3)));
    assert!(matches!(
        parse_line("abc,60.2,45.0,512"),
        Err(ParseError::InvalidNumber { index: 0, .. })
    ));
}

#[test]
fn test_error_marker_wins_over_parse() {
    assert!(matches!(classify(b"Error: sensor fault"), Line::Diagnostic(_)));
    assert!(matches!(classify(b"Error,1,2,3"), Line::Diagnostic(_)));
}

#[test]
fn test_connect_error_display() {
    let err = ConnectError::AlreadyConnected("/dev/ttyUSB0".into());
    assert!(err.to_string().contains("/dev/ttyUSB0"));
}

#[test]
fn test_settle_delay_holds_connecting_state() {
    let link = Arc::new(SerialLink::new(LinkConfig {
        settle_delay: Duration::from_millis(200),
        ..fast_config()
    }));

    let l = Arc::clone(&link);
    let connecting = thread::spawn(move || {
        l.connect_channel("replay", Box::new(ReplayChannel::new()))
    });

    thread::sleep(Duration::from_millis(50));
    assert_eq!(link.state(), ConnectionState::Connecting);
    assert!(!link.is_connected());
    assert!(matches!(
        link.connect_channel("other", Box::new(ReplayChannel::new())),
        Err(ConnectError::AlreadyConnected(_))
    ));

    connecting.join().unwrap().unwrap();
    assert_eq!(link.state(), ConnectionState::Connected);
    link.disconnect();
}

#[test]
fn test_disconnect_is_prompt() {
    let link = SerialLink::new(LinkConfig {
        poll_interval: Duration::from_millis(50),
        ..fast_config()
    });
    link.connect_channel("replay", Box::new(ReplayChannel::new()))
        .unwrap();

    let started = Instant::now();
    link.disconnect();
    assert!(started.elapsed() < Duration::from_millis(500));
    assert_eq!(link.state(), ConnectionState::Disconnected);
}

#[test]
fn test_demo_board_streams_samples() {
    let link = SerialLink::new(fast_config());
    let count = Arc::new(AtomicUsize::new(0));
    let c = Arc::clone(&count);
    link.on_data_received(move |_| {
        c.fetch_add(1, Ordering::SeqCst);
    });

    link.connect_channel("demo", Box::new(DemoBoard::new(Duration::from_millis(10))))
        .unwrap();

    let deadline = Instant::now() + Duration::from_secs(3);
    while count.load(Ordering::SeqCst) < 5 && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(10));
    }
    link.disconnect();
    assert!(count.load(Ordering::SeqCst) >= 5);

    // Nothing more arrives once disconnected
    let after = count.load(Ordering::SeqCst);
    thread::sleep(Duration::from_millis(50));
    assert_eq!(count.load(Ordering::SeqCst), after);
}

fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(3);
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    cond()
}

#[test]
fn test_connect_rejected_while_previous_session_tears_down() {
    let link = Arc::new(SerialLink::new(fast_config()));
    let events = Arc::new(Mutex::new(Vec::new()));

    let in_handler = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&in_handler);
    link.on_data_received(move |_| {
        flag.store(true, Ordering::SeqCst);
        thread::sleep(Duration::from_millis(400));
    });
    let e = Arc::clone(&events);
    link.on_connect_success(move |port| e.lock().unwrap().push(format!("up {port}")));
    let e = Arc::clone(&events);
    link.on_disconnected(move || e.lock().unwrap().push("down".to_string()));

    let channel = ReplayChannel::new();
    let board = channel.handle();
    link.connect_channel("first", Box::new(channel)).unwrap();
    board.push(b"1,2,3,4\n");
    assert!(wait_until(|| in_handler.load(Ordering::SeqCst)));

    // Teardown waits for the slow handler to return
    let l = Arc::clone(&link);
    let closing = thread::spawn(move || l.disconnect());
    thread::sleep(Duration::from_millis(50));

    assert!(!link.is_connected());
    assert!(matches!(
        link.connect_channel("second", Box::new(ReplayChannel::new())),
        Err(ConnectError::AlreadyConnected(ref port)) if port == "first"
    ));

    closing.join().unwrap();
    assert_eq!(link.state(), ConnectionState::Disconnected);
    assert_eq!(link.port_name(), None);

    link.connect_channel("second", Box::new(ReplayChannel::new()))
        .unwrap();
    assert!(link.is_connected());
    assert_eq!(
        *events.lock().unwrap(),
        vec!["up first".to_string(), "down".to_string(), "up second".to_string()]
    );
    link.disconnect();
}

#[test]
fn test_full_queue_drops_samples_without_blocking_reader() {
    let link = SerialLink::new(LinkConfig {
        queue_capacity: 1,
        ..fast_config()
    });

    let released = Arc::new(AtomicBool::new(false));
    let delivered = Arc::new(AtomicUsize::new(0));
    let (r, d) = (Arc::clone(&released), Arc::clone(&delivered));
    link.on_data_received(move |_| {
        while !r.load(Ordering::SeqCst) {
            thread::sleep(Duration::from_millis(1));
        }
        d.fetch_add(1, Ordering::SeqCst);
    });

    let channel = ReplayChannel::new();
    let board = channel.handle();
    link.connect_channel("replay", Box::new(channel)).unwrap();

    let lines: String = (0..10).map(|n| format!("20.0,50.0,30.0,{n}\n")).collect();
    board.push(lines.as_bytes());

    // The reader parses everything while the handler is still blocked
    assert!(wait_until(|| link.stats().samples_parsed == 10));
    assert_eq!(delivered.load(Ordering::SeqCst), 0);
    let stats = link.stats();
    assert!(stats.samples_dropped > 0, "{stats:?}");
    assert!(link.is_connected());

    released.store(true, Ordering::SeqCst);
    assert!(wait_until(|| {
        let stats = link.stats();
        delivered.load(Ordering::SeqCst) as u64 + stats.samples_dropped == stats.samples_parsed
    }));

    let started = Instant::now();
    link.disconnect();
    assert!(started.elapsed() < Duration::from_millis(500));
}
