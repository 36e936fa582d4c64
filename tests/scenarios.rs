use std::sync::atomic::AtomicBool;
use std::time::{Duration, Instant};

use rstest::rstest;

use gse_link::mock::{MockChannel, MockClock, MockError};
use gse_link::{
    AckResult, Cancel, CommandEntry, CommandTable, Dispatcher, Error, Options, SampleOptions,
    Sampler, SystemClock,
};

fn table() -> CommandTable {
    CommandTable::new(vec![CommandEntry::new(1, "Enable fuel line", "ATL").unwrap()], 13).unwrap()
}

fn dispatcher(clock: &MockClock, port: MockChannel) -> Dispatcher<MockChannel, MockClock, MockError> {
    Dispatcher::new(port, clock.clone(), Options::default())
}

#[test]
fn echo_after_one_second_is_acknowledged_after_full_timeout() {
    let clock = MockClock::new();
    let mut port = MockChannel::new(&clock);
    port.reply_after(1000, b"ATL\n");

    let t = table();
    let mut d = dispatcher(&clock, port);
    let a = d.dispatch(t.get(1).unwrap()).unwrap();

    assert_eq!(a.result, AckResult::Acknowledged);
    assert_eq!(a.elapsed, Duration::from_secs(5));
    assert_eq!(clock.now(), 5000);
}

#[test]
fn silent_channel_times_out_after_full_timeout() {
    let clock = MockClock::new();
    let port = MockChannel::new(&clock);

    let t = table();
    let mut d = dispatcher(&clock, port);
    let a = d.dispatch(t.get(1).unwrap()).unwrap();

    assert_eq!(a.result, AckResult::TimedOut);
    assert_eq!(a.elapsed, Duration::from_secs(5));
    assert_eq!(clock.now(), 5000);
}

#[rstest]
#[case(0, b"ATL\n", AckResult::Acknowledged)]
#[case(4900, b"ATL\n", AckResult::Acknowledged)]
#[case(5100, b"ATL\n", AckResult::TimedOut)]
#[case(100, b"DTL\n", AckResult::TimedOut)]
#[case(100, b"ATLX\n", AckResult::TimedOut)]
#[case(100, b"AT\n", AckResult::TimedOut)]
#[case(100, b"  ATL \r\n", AckResult::Acknowledged)]
#[case(100, b"DTL\nATL\n", AckResult::Acknowledged)]
fn latency_is_constant(#[case] delay_ms: u64, #[case] reply: &[u8], #[case] expected: AckResult) {
    let clock = MockClock::new();
    let mut port = MockChannel::new(&clock);
    port.reply_after(delay_ms, reply);

    let t = table();
    let mut d = dispatcher(&clock, port);
    let a = d.dispatch(t.get(1).unwrap()).unwrap();

    assert_eq!(a.result, expected);
    assert_eq!(clock.now() - a.sent_at_ms, 5000);
}

#[test]
fn undecodable_bytes_are_ignored() {
    let clock = MockClock::new();
    let mut port = MockChannel::new(&clock);
    port.reply_after(300, &[0xff, 0xfe, 0x80, b'\n']);
    port.reply_after(600, b"\xc3\xa9ATL\n");
    port.reply_after(900, b"ATL\n");

    let t = table();
    let mut d = dispatcher(&clock, port);
    let a = d.dispatch(t.get(1).unwrap()).unwrap();

    assert_eq!(a.result, AckResult::Acknowledged);
    assert_eq!(clock.now(), 5000);
}

#[test]
fn write_failure_aborts_without_waiting() {
    let clock = MockClock::new();
    let mut port = MockChannel::new(&clock);
    port.fail_writes();

    let t = table();
    let mut d = dispatcher(&clock, port);

    assert_eq!(d.dispatch(t.get(1).unwrap()), Err(Error::Transmit(MockError::WriteFailed)));
    assert_eq!(clock.now(), 0);
    assert!(d.is_open());
}

#[test]
fn interrupt_during_wait_closes_channel_once() {
    static FLAG: AtomicBool = AtomicBool::new(false);

    let clock = MockClock::new();
    clock.interrupt_at(1200, &FLAG);
    let port = MockChannel::new(&clock);
    let h = port.handle();

    let t = table();
    let mut d = dispatcher(&clock, port).with_cancel(Cancel::on(&FLAG));

    assert_eq!(d.dispatch(t.get(1).unwrap()), Err(Error::Interrupted));
    assert!(clock.now() < 5000);

    assert!(d.close());
    assert!(!d.close());
    drop(d);

    assert_eq!(h.closes(), 1);
}

#[test]
fn interrupt_during_settle_is_honoured() {
    static FLAG: AtomicBool = AtomicBool::new(false);

    let clock = MockClock::new();
    clock.interrupt_at(3000, &FLAG);
    let mut port = MockChannel::new(&clock);
    port.reply_after(500, b"ATL\n");
    let h = port.handle();

    let t = table();
    let mut d = dispatcher(&clock, port).with_cancel(Cancel::on(&FLAG));

    assert_eq!(d.dispatch(t.get(1).unwrap()), Err(Error::Interrupted));
    assert_eq!(clock.now(), 3000);

    drop(d);
    assert_eq!(h.closes(), 1);
}

#[test]
fn dispatch_blocks_for_timeout_on_wall_clock() {
    let clock = MockClock::new();
    let mut port = MockChannel::new(&clock);
    // Never advanced, so the echo is available immediately
    port.reply_after(0, b"ATL\n");

    let options = Options { ack_timeout_ms: 300, poll_interval_ms: 20, ..Options::default() };
    let mut d = Dispatcher::new(port, SystemClock::new(), options);

    let t = table();
    let start = Instant::now();
    let a = d.dispatch(t.get(1).unwrap()).unwrap();
    let elapsed = start.elapsed();

    assert_eq!(a.result, AckResult::Acknowledged);
    assert!(elapsed >= Duration::from_millis(290), "{:?}", elapsed);
    assert!(elapsed < Duration::from_millis(350), "{:?}", elapsed);
}

#[test]
fn thousand_bytes_over_ten_seconds_is_800_bps() {
    let clock = MockClock::new();
    let mut port = MockChannel::new(&clock);
    for i in 0..100 {
        port.deliver_at(i * 100 + 50, &[0x55; 10]);
    }

    let mut s = Sampler::new(port, clock.clone(), SampleOptions::default());
    let r = s.sample(Duration::from_secs(10)).unwrap();

    assert_eq!(r.bytes, 1000);
    assert!((r.bit_rate() - 800.0).abs() < 1e-9);
    assert_eq!(clock.now(), 10_000);
}

#[test]
fn samples_are_an_unbounded_sequence() {
    let clock = MockClock::new();
    let mut port = MockChannel::new(&clock);
    for i in 0..6 {
        port.deliver_at(i * 1000 + 10, &[0u8; 125]);
    }

    let options = SampleOptions { poll_interval_ms: 10, ..SampleOptions::default() };
    let mut s = Sampler::new(port, clock, options);

    let rates: Vec<f64> = s
        .samples(Duration::from_secs(1))
        .take(8)
        .map(|r| r.unwrap().bit_rate())
        .collect();

    assert_eq!(rates, vec![1000.0, 1000.0, 1000.0, 1000.0, 1000.0, 1000.0, 0.0, 0.0]);
}

#[test]
fn interrupt_stops_sampling() {
    static FLAG: AtomicBool = AtomicBool::new(false);

    let clock = MockClock::new();
    clock.interrupt_at(2500, &FLAG);
    let port = MockChannel::new(&clock);
    let h = port.handle();

    let mut s = Sampler::new(port, clock, SampleOptions::default()).with_cancel(Cancel::on(&FLAG));
    let results: Vec<_> = s.samples(Duration::from_secs(1)).collect();

    assert_eq!(results.len(), 3);
    assert_eq!(results[2], Err(Error::Interrupted));

    assert!(s.close());
    assert_eq!(h.closes(), 1);
}
