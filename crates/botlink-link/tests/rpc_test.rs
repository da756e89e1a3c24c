//! Script protocol tests against an emulated device.
//!
//! The device runs on its own thread at the far end of a loopback pair. It
//! assembles incoming frames, parses script requests and answers them
//! according to a reply function.

use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use botlink_frame::{ChannelConfig, ConfigError, Dialect, FrameAssembler, FrameEncoder};
use botlink_link::{
    loopback_pair, CancelToken, Channel, LoopbackTransport, Port, ResultType, RpcTiming, ScriptClient,
    ScriptError, ScriptReply, ScriptRequest, ScriptValue, Transport,
};

/// What the emulated device does with a request.
enum Answer {
    Reply(ScriptReply),
    /// Several replies written in one chunk.
    Burst(Vec<ScriptReply>),
    Silent,
}

/// Spawn a device answering every request through `answer`.
///
/// Returns the join handle, which yields every request received.
fn spawn_device<F>(device: LoopbackTransport, stop: CancelToken, mut answer: F) -> JoinHandle<Vec<ScriptRequest>>
where
    F: FnMut(&ScriptRequest) -> Answer + Send + 'static,
{
    thread::spawn(move || {
        let encoder = FrameEncoder::default();
        let mut assembler = FrameAssembler::new(ChannelConfig::default());
        let mut seen = Vec::new();

        while !stop.is_cancelled() {
            let chunk = device.recv().unwrap_or_default();
            let Some(frame) = assembler.feed(&chunk) else {
                if chunk.is_empty() {
                    thread::sleep(Duration::from_micros(200));
                }
                continue;
            };
            let Some(request) = ScriptRequest::parse(frame.payload()) else {
                continue;
            };

            if request.response_required {
                match answer(&request) {
                    Answer::Reply(reply) => device.send(&reply.encode(&encoder)).unwrap(),
                    Answer::Burst(replies) => {
                        let wire: Vec<u8> = replies.iter().flat_map(|r| r.encode(&encoder)).collect();
                        device.send(&wire).unwrap();
                    }
                    Answer::Silent => {}
                }
            }
            seen.push(request);
        }
        seen
    })
}

fn client_pair() -> (ScriptClient<LoopbackTransport>, LoopbackTransport) {
    let (host, device) = loopback_pair(16, 16);
    let channel = Channel::open(host, &Port::Auto, ChannelConfig::default()).unwrap();
    (ScriptClient::new(channel), device)
}

// ============================================================================
// Request/response
// ============================================================================

#[test]
fn test_request_response_typed_results() {
    let (mut client, device) = client_pair();
    let stop = CancelToken::new();
    let handle = spawn_device(device, stop.clone(), |request| {
        let result: &[u8] = match request.script.as_str() {
            "motor.ready()" => b"True",
            "sensor.distance()" => b"128",
            "sensor.voltage()" => b"3.3",
            "robot.name()" => b"rover",
            _ => b"None",
        };
        Answer::Reply(ScriptReply::new(request.serial, result))
    });

    assert_eq!(
        client.request_response(1, "motor.ready()", ResultType::Bool).unwrap(),
        ScriptValue::Bool(true)
    );
    assert_eq!(
        client.request_response(2, "sensor.distance()", ResultType::Int).unwrap(),
        ScriptValue::Int(128)
    );
    assert_eq!(
        client.request_response(3, "sensor.voltage()", ResultType::Float).unwrap(),
        ScriptValue::Float(3.3)
    );
    assert_eq!(
        client.request_response(4, "robot.name()", ResultType::Str).unwrap(),
        ScriptValue::Str(b"rover".to_vec())
    );
    assert!(client.request_response(5, "led.on()", ResultType::Int).unwrap().is_none());

    stop.cancel();
    let seen = handle.join().unwrap();
    assert_eq!(seen.iter().map(|r| r.serial).collect::<Vec<_>>(), vec![1, 2, 3, 4, 5]);
}

#[test]
fn test_stale_replies_are_skipped() {
    let (mut client, device) = client_pair();
    let stop = CancelToken::new();
    let handle = spawn_device(device, stop.clone(), |request| {
        Answer::Burst(vec![
            ScriptReply::new(request.serial.wrapping_sub(1), "old"),
            ScriptReply::new(request.serial, "fresh"),
        ])
    });

    let value = client.request_response(42, "x", ResultType::Str).unwrap();
    assert_eq!(value.as_bytes(), Some(&b"fresh"[..]));

    stop.cancel();
    assert_eq!(handle.join().unwrap().len(), 1);
}

#[test]
fn test_retransmits_until_answered() {
    let (mut client, device) = client_pair();
    let stop = CancelToken::new();
    let mut calls = 0;
    let handle = spawn_device(device, stop.clone(), move |request| {
        calls += 1;
        if calls < 3 {
            Answer::Silent
        } else {
            Answer::Reply(ScriptReply::new(request.serial, "7"))
        }
    });

    let value = client.request_response(9, "count()", ResultType::Int).unwrap();
    assert_eq!(value, ScriptValue::Int(7));

    stop.cancel();
    let seen = handle.join().unwrap();
    assert_eq!(seen.len(), 3);
    assert!(seen.iter().all(|r| r.serial == 9 && r.script == "count()"));
}

#[test]
fn test_no_reply_exhausts_three_attempts() {
    let (mut client, device) = client_pair();
    let stop = CancelToken::new();
    let handle = spawn_device(device, stop.clone(), |_| Answer::Silent);

    let started = Instant::now();
    let result = client.request_response(1, "never()", ResultType::Bool);
    let elapsed = started.elapsed();

    assert!(matches!(result, Err(ScriptError::NoReply { attempts: 3 })));
    assert!(elapsed >= Duration::from_millis(600), "elapsed {:?}", elapsed);
    assert!(elapsed < Duration::from_secs(5), "elapsed {:?}", elapsed);

    stop.cancel();
    assert_eq!(handle.join().unwrap().len(), 3);
}

#[test]
fn test_custom_timing() {
    let (client, device) = client_pair();
    let mut client = client.with_timing(RpcTiming {
        attempts: 2,
        polls: 10,
        poll_interval_ms: 1,
    });
    let stop = CancelToken::new();
    let handle = spawn_device(device, stop.clone(), |_| Answer::Silent);

    let result = client.request_response(1, "never()", ResultType::None);
    assert!(matches!(result, Err(ScriptError::NoReply { attempts: 2 })));

    stop.cancel();
    assert_eq!(handle.join().unwrap().len(), 2);
}

#[test]
fn test_busy_channel_does_not_shorten_attempts() {
    let (client, device) = client_pair();
    let mut client = client.with_timing(RpcTiming {
        attempts: 2,
        polls: 50,
        poll_interval_ms: 1,
    });
    let stop = CancelToken::new();
    let flooder = {
        let device = device.clone();
        let stop = stop.clone();
        thread::spawn(move || {
            let noise = FrameEncoder::default().encode_length_prefixed(b"telemetry");
            while !stop.is_cancelled() {
                device.send(&noise).unwrap();
                thread::sleep(Duration::from_micros(20));
            }
        })
    };
    let handle = spawn_device(device, stop.clone(), |_| Answer::Silent);

    let started = Instant::now();
    let result = client.request_response(1, "never()", ResultType::None);
    let elapsed = started.elapsed();

    assert!(matches!(result, Err(ScriptError::NoReply { attempts: 2 })));
    assert!(elapsed >= Duration::from_millis(100), "elapsed {:?}", elapsed);

    stop.cancel();
    flooder.join().unwrap();
    assert_eq!(handle.join().unwrap().len(), 2);
}

#[test]
fn test_input_before_request_is_discarded() {
    let (mut client, device) = client_pair();
    // A reply with the right serial that arrived before the request was sent.
    device.send(&ScriptReply::new(4, "early").encode(&FrameEncoder::default())).unwrap();

    let stop = CancelToken::new();
    let handle = spawn_device(device, stop.clone(), |request| {
        Answer::Reply(ScriptReply::new(request.serial, "late"))
    });

    let value = client.request_response(4, "x", ResultType::Str).unwrap();
    assert_eq!(value.as_bytes(), Some(&b"late"[..]));

    stop.cancel();
    handle.join().unwrap();
}

#[test]
fn test_open_validates_configuration() {
    let (host, _device) = loopback_pair(4, 4);
    let config = ChannelConfig::new(Dialect::VersionRequest | Dialect::VersionResponse);
    let result = ScriptClient::open(host, &Port::Auto, config);
    assert!(matches!(
        result,
        Err(ScriptError::Config(ConfigError::ConflictingVersionDialects))
    ));

    let (host, device) = loopback_pair(4, 4);
    let mut client = ScriptClient::open(host, &Port::Auto, ChannelConfig::default()).unwrap();
    client.fire_and_forget(1, "go()").unwrap();
    assert!(device.recv().is_some());
}

#[test]
fn test_undecodable_reply_is_not_retried() {
    let (mut client, device) = client_pair();
    let stop = CancelToken::new();
    let handle = spawn_device(device, stop.clone(), |request| {
        Answer::Reply(ScriptReply::new(request.serial, "maybe"))
    });

    let result = client.request_response(3, "flag()", ResultType::Bool);
    assert!(matches!(result, Err(ScriptError::Decode { expected: "bool", .. })));

    stop.cancel();
    assert_eq!(handle.join().unwrap().len(), 1);
}

// ============================================================================
// Fire-and-forget, serials, cancellation
// ============================================================================

#[test]
fn test_fire_and_forget_sends_once() {
    let (mut client, device) = client_pair();
    client.fire_and_forget(5, "hi").unwrap();

    assert_eq!(
        device.recv(),
        Some(vec![0xF3, 0xF9, 0x06, 0x00, 0x28, 0x00, 0x05, 0x00, 0x68, 0x69, 0xFE, 0xF4])
    );
    assert_eq!(device.recv(), None);
}

#[test]
fn test_literal_checksum_08_vector_is_not_a_reply() {
    // Same bytes with the body checksum printed as 08: not a valid frame.
    let (mut client, device) = client_pair();
    device
        .send(&[0xF3, 0xF9, 0x06, 0x00, 0x28, 0x00, 0x05, 0x00, 0x68, 0x69, 0x08, 0xF4])
        .unwrap();

    assert!(client.channel_mut().get_frame().is_none());
    assert_eq!(client.channel().assembler().stats().body_checksum_failures, 1);
}

#[test]
fn test_execute_dispatches_on_flag() {
    let (mut client, device) = client_pair();
    let stop = CancelToken::new();
    let handle = spawn_device(device, stop.clone(), |request| {
        Answer::Reply(ScriptReply::new(request.serial, "1"))
    });

    let value = client.execute(&ScriptRequest::notify(10, "beep()")).unwrap();
    assert!(value.is_none());
    let value = client.execute(&ScriptRequest::request(11, "one()", ResultType::Int)).unwrap();
    assert_eq!(value.as_int(), Some(1));

    stop.cancel();
    let seen = handle.join().unwrap();
    assert_eq!(seen.len(), 2);
    assert!(!seen[0].response_required);
    assert!(seen[1].response_required);
}

#[test]
fn test_call_allocates_serials() {
    let (mut client, device) = client_pair();
    let stop = CancelToken::new();
    let handle = spawn_device(device, stop.clone(), |request| {
        Answer::Reply(ScriptReply::new(request.serial, request.serial.to_string()))
    });

    assert_eq!(client.call("a()", ResultType::Int).unwrap(), ScriptValue::Int(0));
    assert_eq!(client.call("b()", ResultType::Int).unwrap(), ScriptValue::Int(1));
    assert_eq!(client.next_serial(), 2);

    stop.cancel();
    handle.join().unwrap();
}

#[test]
fn test_serial_wraps() {
    let (mut client, _device) = client_pair();
    for _ in 0..u16::MAX {
        client.next_serial();
    }
    assert_eq!(client.next_serial(), u16::MAX);
    assert_eq!(client.next_serial(), 0);
}

#[test]
fn test_cancel_aborts_reply_wait() {
    let (host, _device) = loopback_pair(16, 16);
    let cancel = CancelToken::new();
    let channel = Channel::open(host, &Port::Auto, ChannelConfig::default())
        .unwrap()
        .with_cancel_token(cancel.clone());
    let mut client = ScriptClient::new(channel).with_timing(RpcTiming {
        attempts: 3,
        polls: 100_000,
        poll_interval_ms: 1,
    });

    let canceller = thread::spawn(move || {
        thread::sleep(Duration::from_millis(30));
        cancel.cancel();
    });

    let started = Instant::now();
    let result = client.request_response(1, "slow()", ResultType::None);
    assert!(matches!(result, Err(ScriptError::Cancelled)));
    assert!(started.elapsed() < Duration::from_secs(5));
    canceller.join().unwrap();
}
