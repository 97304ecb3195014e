// End-to-end pipeline: candump replay -> listener thread -> callback consumer
use can_live_decoder::{
    CandumpReplay, DecodedResponse, FrameId, IndicatorId, Listener, ListenerConfig,
    ListenerState, ResultChannel, ResultCode,
};
use std::io::Cursor;
use std::sync::mpsc;

const DRIVE_LOG: &str = "\
# recorded on vcan0
(1697040000.000000) vcan0 101#6400
(1697040000.010000) vcan0 102#B80B
(1697040000.020000) vcan0 7DF#02010D
(1697040000.030000) vcan0 103#3200
(1697040000.040000) vcan0 104#FFFF
(1697040000.050000) vcan0 105#0500FF6400000000
(1697040000.060000) vcan0 101#6
(1697040000.070000) vcan0 101#05
vcan0  105   [8]  00 00 00 80 10 00 00 00
";

fn replay() -> CandumpReplay<Cursor<Vec<u8>>> {
    CandumpReplay::new(Cursor::new(DRIVE_LOG.as_bytes().to_vec()))
}

#[test]
fn replay_through_callback_consumer() {
    let _ = env_logger::builder().is_test(true).try_init();

    let channel = ResultChannel::new();
    let (tx, rx) = mpsc::channel::<(ResultCode, DecodedResponse)>();
    let consumer = channel
        .register(move |code: ResultCode, response: DecodedResponse| {
            tx.send((code, response)).unwrap();
        })
        .unwrap();

    let mut listener = Listener::new(replay(), channel.clone())
        .with_config(ListenerConfig::new().with_error_backoff_ms(0));
    listener.start().unwrap();
    let stats = listener.wait();
    assert_eq!(listener.state(), ListenerState::Stopped);

    channel.unregister();
    assert!(consumer.join());

    let results: Vec<_> = rx.try_iter().collect();

    // 7DF is dropped; the odd-length line is a transport error; 101#05 is malformed
    assert_eq!(results.len(), 8);

    let ok: Vec<_> = results
        .iter()
        .filter(|(code, _)| *code == ResultCode::Success)
        .map(|(_, r)| (r.frame_id().unwrap(), r.value().unwrap()))
        .collect();
    assert_eq!(
        ok,
        vec![
            (FrameId::CarSpeed, 100),
            (FrameId::EngineSpeed, 3000),
            (FrameId::FuelLevel, 50),
            (FrameId::EngineTemperature, -1),
            (FrameId::Other, 0x64FF),
            (FrameId::Other, 0x1080),
        ]
    );

    let other = &results[4].1;
    assert_eq!(other.indicator(IndicatorId::Gate), Some(true));
    assert_eq!(other.indicator(IndicatorId::Plates), Some(false));
    assert_eq!(other.indicator(IndicatorId::ParkingBrake), Some(true));

    let last = &results[7].1;
    assert!(last.indicators().unwrap().values().all(|set| !set));

    let errors: Vec<_> = results
        .iter()
        .filter(|(code, _)| *code == ResultCode::Error)
        .map(|(_, r)| r)
        .collect();
    assert_eq!(errors.len(), 2);
    assert_eq!(errors[0].frame_id(), None);
    assert!(errors[0].error().unwrap().contains("line 8"));
    assert_eq!(errors[1].frame_id(), Some(FrameId::CarSpeed));
    assert!(errors[1].value().is_none());

    assert_eq!(stats.frames_received, 8);
    assert_eq!(stats.frames_unsupported, 1);
    assert_eq!(stats.transport_errors, 1);
    assert_eq!(stats.frames_malformed, 1);
    assert_eq!(stats.results_delivered, 8);
}

#[test]
fn unknown_identifiers_never_reach_consumer() {
    let log = "can0 7DF#0201\ncan0 18DAF110#0322F190\ncan0 000#00\n";
    let channel = ResultChannel::new();
    let receiver = channel.subscribe();

    let mut listener = Listener::new(
        CandumpReplay::new(Cursor::new(log.as_bytes().to_vec())),
        channel,
    );
    listener.start().unwrap();
    let stats = listener.wait();

    assert!(receiver.drain().is_empty());
    assert_eq!(stats.frames_received, 3);
    assert_eq!(stats.frames_unsupported, 3);
}

#[test]
fn replacement_consumer_gets_subsequent_results() {
    let channel = ResultChannel::new();
    let first = channel.subscribe();
    channel.dispatch(
        ResultCode::Error,
        DecodedResponse::failure(None, "before replacement"),
    );

    let second = channel.subscribe();
    let mut listener = Listener::new(replay(), channel)
        .with_config(ListenerConfig::new().with_error_backoff_ms(0));
    listener.start().unwrap();
    listener.wait();

    assert_eq!(first.drain().len(), 1);
    assert_eq!(second.drain().len(), 8);
}

#[test]
fn responses_serialize_to_json() {
    let channel = ResultChannel::new();
    let receiver = channel.subscribe();
    let mut listener = Listener::new(
        CandumpReplay::new(Cursor::new(b"can0 105#0100000000000000\n".to_vec())),
        channel,
    );
    listener.start().unwrap();
    listener.wait();

    let delivery = receiver.recv().unwrap();
    let json = serde_json::to_value(&delivery.response).unwrap();
    assert_eq!(json["frame_id"], "OTHER");
    assert_eq!(json["value"], 0);
    assert_eq!(json["indicators"]["GATE"], true);
    assert!(json.get("error").is_none());
}

#[test]
fn undecodable_log_line_does_not_stop_replay() {
    let channel = ResultChannel::new();
    let receiver = channel.subscribe();
    let transport = CandumpReplay::new(Cursor::new(
        "can0 101#0\u{e9}0\n(99999999999999.0) can0 101#6400\ncan0 101#6400\n"
            .as_bytes()
            .to_vec(),
    ));
    let mut listener = Listener::new(transport, channel)
        .with_config(ListenerConfig::new().with_error_backoff_ms(0));

    listener.start().unwrap();
    let stats = listener.wait();

    let results: Vec<(ResultCode, Option<i64>)> = receiver
        .drain()
        .into_iter()
        .map(|d| (d.code, d.response.value()))
        .collect();
    assert_eq!(
        results,
        vec![
            (ResultCode::Error, None),
            (ResultCode::Error, None),
            (ResultCode::Success, Some(100)),
        ]
    );
    assert_eq!(stats.transport_errors, 2);
    assert_eq!(stats.frames_received, 1);
    assert!(listener.transport().is_some());
    assert_eq!(listener.state(), ListenerState::Stopped);
}
