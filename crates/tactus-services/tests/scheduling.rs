use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use tactus_core::{
    Curve, Envelope, EnvelopeConfig, Event, EventKind, MemoryParam, NestedSequence, ParamSegment,
    TimerConfig,
};
use tactus_services::{
    HeadId, LookaheadTimer, ManualClock, ScheduledEvent, StreamHandle, TempoClock, TickDriver,
};

const EPS: f64 = 1e-9;

#[derive(Debug, Clone)]
struct Seen {
    head: HeadId,
    time: f64,
    offset: f64,
    local_beat: f64,
    address: Option<String>,
}

fn recording_clock(events: Vec<Event>) -> (TempoClock<ManualClock>, Rc<RefCell<Vec<Seen>>>) {
    let timer = LookaheadTimer::new(ManualClock::new(0.0), TimerConfig::default()).unwrap();
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = seen.clone();
    let clock = TempoClock::new(timer, events, move |event: &ScheduledEvent, stream: &StreamHandle<'_>| {
        if matches!(event.event.kind, EventKind::Meter { .. }) {
            return;
        }
        sink.borrow_mut().push(Seen {
            head: stream.id(),
            time: event.time,
            offset: event.event.offset,
            local_beat: stream.beat_at_time(event.time),
            address: stream.address().map(str::to_owned),
        });
    });
    (clock, seen)
}

fn render(clock: &mut TempoClock<ManualClock>, until: f64) {
    let driver = TickDriver::new(clock.timer().config());
    driver.render(clock, until);
}

#[test]
fn constant_tempo_round_trip() {
    let (mut clock, _) = recording_clock(Vec::new());
    clock.start(Some(0.0));
    assert!((clock.time_at_beat(4.0) - 4.0).abs() < EPS);
    assert!((clock.beat_at_time(4.0) - 4.0).abs() < EPS);

    for i in 0..40 {
        let beat = i as f64 * 0.37;
        assert!((clock.beat_at_time(clock.time_at_beat(beat)) - beat).abs() < EPS);
    }
}

#[test]
fn beat_at_time_is_monotonic_across_changes() {
    let (mut clock, _) = recording_clock(vec![
        Event::rate(0.0, 1.0),
        Event::rate(2.0, 3.0),
        Event::rate(5.0, 0.25),
        Event::rate(6.0, 2.0),
    ]);
    clock.start(Some(0.0));

    let mut last = f64::NEG_INFINITY;
    for i in 0..200 {
        let beat = clock.beat_at_time(i as f64 * 0.1);
        assert!(beat >= last);
        last = beat;
    }
}

#[test]
fn live_push_keeps_emitted_events_and_retimes_the_rest() {
    let events = (0..16).map(|i| Event::note(i as f64, 60, 1.0, 0.5)).collect();
    let (mut clock, seen) = recording_clock(events);
    clock.start(Some(0.0));

    render(&mut clock, 9.95);
    clock.set_rate(0.5, Some(10.0)).unwrap();
    render(&mut clock, 20.0);

    assert!((clock.time_at_beat(12.0) - 14.0).abs() < EPS);
    assert_eq!(clock.start_time(), Some(0.0));

    let times: Vec<f64> = seen.borrow().iter().map(|s| s.time).collect();
    assert_eq!(times.len(), 16);
    assert!(times.windows(2).all(|w| w[0] <= w[1]));
    assert!((times[9] - 9.0).abs() < EPS);
    assert!((times[11] - 12.0).abs() < EPS);
    assert!((times[12] - 14.0).abs() < EPS);
}

#[test]
fn nested_heads_compose_rates() {
    let grandchild = NestedSequence::new(vec![
        Event::rate(0.0, 0.5),
        Event::note(0.0, 72, 1.0, 0.25),
        Event::note(1.0, 74, 1.0, 0.25),
    ])
    .with_address("bass");
    let child = NestedSequence::new(vec![
        Event::note(0.0, 60, 1.0, 0.5),
        Event::note(1.0, 62, 1.0, 0.5),
        Event::sequence(2.0, grandchild),
    ])
    .with_rate(2.0)
    .with_address("lead");
    let (mut clock, seen) = recording_clock(vec![
        Event::rate(0.0, 1.0),
        Event::rate(1.0, 4.0),
        Event::sequence(0.5, child),
    ]);
    clock.start(Some(0.0));
    render(&mut clock, 4.0);

    let seen = seen.borrow();
    let mut by_address: HashMap<Option<String>, Vec<Seen>> = HashMap::new();
    for s in seen.iter() {
        by_address.entry(s.address.clone()).or_default().push(s.clone());
    }

    // Child beat b sits at root beat 0.5 + b / 2; root beats past 1 run at 4 per second
    let lead = &by_address[&Some("lead".to_string())];
    let lead_times: Vec<f64> = lead.iter().map(|s| s.time).collect();
    assert_eq!(lead_times.len(), 2);
    assert!((lead_times[0] - 0.5).abs() < EPS);
    assert!((lead_times[1] - 1.0).abs() < EPS);

    // Grandchild starts at child beat 2 (root beat 1.5, t = 1.125) at half a
    // beat per child beat: its beat 1 is child beat 4, root beat 2.5
    let bass = &by_address[&Some("bass".to_string())];
    assert_eq!(bass.len(), 2);
    assert!((bass[0].time - 1.125).abs() < EPS);
    assert!((bass[1].time - 1.375).abs() < EPS);

    for s in seen.iter() {
        assert!((s.local_beat - s.offset).abs() < EPS, "{:?}", s);
    }
    assert_ne!(lead[0].head, bass[0].head);
}

#[test]
fn windows_tile_and_frames_stay_ordered() {
    let events = vec![
        Event::note(3.0, 63, 1.0, 0.5),
        Event::note(0.25, 61, 1.0, 0.5),
        Event::param(0.0, "gain", 0.0, Curve::Step),
        Event::param(2.0, "gain", 1.0, Curve::Linear),
        Event::note(0.25, 60, 1.0, 0.5),
        Event::note(1.75, 62, 1.0, 0.5),
    ];
    let (mut clock, seen) = recording_clock(events);
    clock.start(Some(0.0));

    let driver = TickDriver::new(clock.timer().config());
    let windows = driver.render(&mut clock, 5.0);
    for pair in windows.windows(2) {
        assert_eq!(pair[0].t2, pair[1].t1);
    }

    let seen = seen.borrow();
    assert_eq!(seen.len(), 6);
    let offsets: Vec<f64> = seen.iter().map(|s| s.offset).collect();
    // The ramp to beat 2 goes out with the first frame, ahead of its notes
    assert_eq!(offsets, vec![0.0, 2.0, 0.25, 0.25, 1.75, 3.0]);
}

#[test]
fn spawn_inside_handed_out_window_catches_up() {
    let (mut clock, seen) = recording_clock(Vec::new());
    let source = clock.timer().source().clone();
    clock.start(Some(0.0));
    for _ in 0..5 {
        clock.tick();
        source.advance(0.1);
    }
    let last = clock.timer().last_cue_time().unwrap();
    assert!(last > 0.45);

    let seq = NestedSequence::new(vec![
        Event::note(0.0, 60, 1.0, 0.5),
        Event::note(10.0, 62, 1.0, 0.5),
    ]);
    let id = clock.spawn(seq, Some(0.45)).unwrap();

    // Delivered by the spawn itself, before the next tick
    let times: Vec<f64> = seen.borrow().iter().filter(|s| s.head == id).map(|s| s.time).collect();
    assert_eq!(times.len(), 1);
    assert!((times[0] - 0.45).abs() < EPS);

    clock.tick();
    assert_eq!(seen.borrow().iter().filter(|s| s.head == id).count(), 1);
}

#[test]
fn stopping_the_clock_silences_every_head() {
    let child = NestedSequence::new((0..8).map(|i| Event::note(i as f64, 60, 1.0, 0.5)).collect());
    let (mut clock, seen) = recording_clock(vec![Event::sequence(0.0, child)]);
    clock.start(Some(0.0));
    render(&mut clock, 2.0);
    let before = seen.borrow().len();

    clock.stop(Some(2.1));
    render(&mut clock, 8.0);
    assert_eq!(seen.borrow().len(), before);
    assert!(clock.heads().is_empty());
    assert_eq!(clock.beat_at_time(3.0), 0.0);
}

#[test]
fn unterminated_release_never_stops() {
    let mut param = MemoryParam::new(0.0);
    let mut envelope = Envelope::new(&EnvelopeConfig::default())
        .with_release(vec![ParamSegment::new(0.0, Curve::Linear, 0.5)]);
    envelope.start(&mut param, 1.0).unwrap();
    let stop = envelope.stop(&mut param, 2.0).unwrap();
    assert_eq!(stop, f64::INFINITY);
    assert!(envelope.is_unterminated());
}
