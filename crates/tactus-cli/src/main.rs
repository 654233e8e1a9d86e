//! tactus: plays a demo sequence against the wall clock and logs what it schedules

mod config;

use std::thread;
use std::time::Duration;

use crossbeam_channel::bounded;
use tactus_core::{Curve, Envelope, Event, EventKind, MemoryParam, NestedSequence};
use tactus_services::{
    LookaheadTimer, ScheduledEvent, StreamHandle, SystemClock, TempoClock, TickDriver,
};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn demo_sequence() -> Vec<Event> {
    let mut events: Vec<Event> = [60, 64, 67, 72, 67, 64, 60, 55]
        .iter()
        .enumerate()
        .map(|(i, &note)| Event::note(i as f64, note, 0.8, 0.5))
        .collect();

    events.push(Event::param(0.0, "cutoff", 200.0, Curve::Step));
    events.push(Event::param(4.0, "cutoff", 2000.0, Curve::Exponential));
    events.push(Event::param(8.0, "cutoff", 400.0, Curve::Linear));

    let arp = NestedSequence::new(
        [72, 76, 79, 84]
            .iter()
            .enumerate()
            .map(|(i, &note)| Event::note(i as f64, note, 0.6, 0.25))
            .collect(),
    )
    .with_rate(2.0)
    .with_duration(8.0)
    .with_address("arp");
    events.push(Event::sequence(2.0, arp));

    events
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env()
            .add_directive("tactus=debug".parse()?))
        .init();

    let config = config::load_config();
    info!(path = %config::config_path().display(), "Starting tactus");
    config.demo.validate()?;

    let timer = LookaheadTimer::new(SystemClock::new(), config.timer)?;

    let envelope_config = config.envelope;
    let mut gain = MemoryParam::new(0.0);
    let target = move |scheduled: &ScheduledEvent, stream: &StreamHandle<'_>| {
        let event = &scheduled.event;
        let address = stream.address().unwrap_or("main");
        match &event.kind {
            EventKind::Note { number, velocity, duration } => {
                let mut envelope = Envelope::new(&envelope_config);
                let end = stream.time_at_beat(event.offset + duration);
                let result = envelope
                    .start(&mut gain, scheduled.time)
                    .and_then(|()| envelope.stop(&mut gain, end));
                match result {
                    Ok(stop) => info!(
                        address,
                        time = scheduled.time,
                        beat = event.offset,
                        number,
                        velocity,
                        stop,
                        "Note"
                    ),
                    Err(e) => warn!(address, "Note envelope rejected: {}", e),
                }
            }
            EventKind::Param(change) => info!(
                address,
                time = scheduled.time,
                name = %change.name,
                value = change.value,
                curve = ?change.curve,
                "Param"
            ),
            other => info!(address, time = scheduled.time, kind = ?other, "Event"),
        }
    };

    let mut clock = TempoClock::new(timer, demo_sequence(), target).with_config(config.clock);
    clock.start(None);

    let (stop_tx, stop_rx) = bounded::<()>(1);
    let run_for = Duration::from_secs_f64(config.demo.run_seconds);
    thread::spawn(move || {
        thread::sleep(run_for);
        let _ = stop_tx.send(());
    });

    let demo = config.demo;
    let mut tempo_changed = false;
    let driver = TickDriver::new(&config.timer);
    let ticks = driver.run(&mut clock, &stop_rx, |clock, _window| {
        let Some(start) = clock.start_time() else {
            return;
        };
        if tempo_changed || clock.now() - start < demo.tempo_change_at {
            return;
        }
        tempo_changed = true;
        match clock.set_tempo(demo.tempo_change_bpm, None) {
            Ok(()) => info!(bpm = demo.tempo_change_bpm, "Tempo changed"),
            Err(e) => warn!("Tempo change rejected: {}", e),
        }
    });

    clock.stop(None);
    info!(ticks, "Done");
    Ok(())
}
