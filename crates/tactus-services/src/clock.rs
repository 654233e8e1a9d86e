//! Tempo clock: the root time base of a running sequence

use tactus_core::{
    AutomationParam, ClockConfig, Curve, Event, EventKind, MemoryParam, NestedSequence, Result,
    TactusError,
};
use tracing::{debug, trace};

use crate::head::{HeadArena, HeadId, ScheduledEvent, StreamHandle};
use crate::time_source::TimeSource;
use crate::timer::{CueWindow, LookaheadTimer};

/// Consumer of drained events
pub type Target = Box<dyn FnMut(&ScheduledEvent, &StreamHandle<'_>)>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClockState {
    #[default]
    Stopped,
    Running,
}

/// Owns the timer, the head tree and the consumer of a sequence.
///
/// Beat 0 of the root head sits at the start time; every conversion on the
/// clock is the root head's conversion.
pub struct TempoClock<S> {
    timer: LookaheadTimer<HeadId, S>,
    config: ClockConfig,
    events: Vec<Event>,
    /// Rate used at beat 0 when the sequence has no rate event there
    seed_rate: f64,
    rate: f64,
    rate_param: Box<dyn AutomationParam>,
    heads: HeadArena,
    root: Option<HeadId>,
    state: ClockState,
    start_time: Option<f64>,
    stop_time: Option<f64>,
    target: Target,
}

impl<S: TimeSource> TempoClock<S> {
    pub fn new(
        timer: LookaheadTimer<HeadId, S>,
        events: Vec<Event>,
        target: impl FnMut(&ScheduledEvent, &StreamHandle<'_>) + 'static,
    ) -> Self {
        let config = ClockConfig::default();
        Self {
            timer,
            config,
            events,
            seed_rate: config.default_rate,
            rate: config.default_rate,
            rate_param: Box::new(MemoryParam::new(config.default_rate)),
            heads: HeadArena::new(),
            root: None,
            state: ClockState::Stopped,
            start_time: None,
            stop_time: None,
            target: Box::new(target),
        }
    }

    pub fn with_config(mut self, config: ClockConfig) -> Self {
        self.config = config;
        self.seed_rate = config.default_rate;
        self.rate = config.default_rate;
        self.rate_param = Box::new(MemoryParam::new(config.default_rate));
        self
    }

    /// Record rate changes on a backend parameter instead of in memory
    pub fn with_rate_param(mut self, param: impl AutomationParam + 'static) -> Self {
        self.rate_param = Box::new(param);
        self
    }

    /// Copy of the caller's events with rate and meter seeded at offset 0
    fn seeded_events(&self) -> Vec<Event> {
        let mut events = Vec::with_capacity(self.events.len() + 2);
        if !self.events.iter().any(|e| e.is_rate() && e.offset == 0.0) {
            events.push(Event::rate(0.0, self.seed_rate));
        }
        if !self.events.iter().any(|e| e.is_meter() && e.offset == 0.0) {
            events.push(Event::meter(
                0.0,
                self.config.meter_numerator,
                self.config.meter_denominator,
            ));
        }
        events.extend(self.events.iter().cloned());
        events
    }

    /// Start the time base at `time` (default: now). A running clock is
    /// stopped at that time first.
    pub fn start(&mut self, time: Option<f64>) -> &mut Self {
        let time = time.unwrap_or_else(|| self.timer.now());
        if self.is_running() {
            self.stop(Some(time));
        }

        let sequence = NestedSequence::new(self.seeded_events()).with_rate(self.seed_rate);
        let mut ready = Vec::new();
        self.state = ClockState::Running;
        self.rate = opening_rate(&sequence.events).unwrap_or(self.seed_rate);
        self.start_time = Some(time);
        self.stop_time = None;
        self.root = self.heads.spawn(&mut self.timer, None, sequence, time, &mut ready);

        debug!(time, rate = self.seed_rate, "Clock started");
        self.dispatch(&mut ready);
        self
    }

    /// Freeze the time base and stop every head
    pub fn stop(&mut self, time: Option<f64>) -> &mut Self {
        let time = time.unwrap_or_else(|| self.timer.now());
        if let Some(root) = self.root.take() {
            self.heads.stop(&mut self.timer, root, time);
        }
        if self.is_running() {
            self.state = ClockState::Stopped;
            self.stop_time = Some(time);
            debug!(time, "Clock stopped");
        }
        self
    }

    /// Run one timer tick: cue every due head and hand their frames to the target
    pub fn tick(&mut self) -> CueWindow {
        let window = self.timer.begin_tick();
        let mut ready = Vec::new();
        while let Some(id) = self.timer.next_due() {
            self.heads.cue(&mut self.timer, id, window.t2, &mut ready);
            self.dispatch(&mut ready);
        }
        window
    }

    fn dispatch(&mut self, ready: &mut Vec<HeadId>) {
        for id in ready.drain(..) {
            let Some(frame) = self.heads.drain(id) else {
                continue;
            };
            let stream = StreamHandle::new(&self.heads, id);
            for event in &frame {
                (self.target)(event, &stream);
            }
        }
    }

    pub fn now(&self) -> f64 {
        self.timer.now()
    }

    /// Beat at `time`, 0 while stopped
    pub fn beat_at_time(&self, time: f64) -> f64 {
        match self.running_root().and_then(|root| self.heads.time_to_beat(root, time)) {
            Some(beat) => beat,
            None => {
                trace!(time, "Beat query on a stopped clock");
                0.0
            }
        }
    }

    /// Time of `beat`, 0 while stopped
    pub fn time_at_beat(&self, beat: f64) -> f64 {
        match self.running_root().and_then(|root| self.heads.beat_to_time(root, beat)) {
            Some(time) => time,
            None => {
                trace!(beat, "Time query on a stopped clock");
                0.0
            }
        }
    }

    fn running_root(&self) -> Option<HeadId> {
        self.root.filter(|_| self.is_running())
    }

    /// Most recently requested rate. A restart goes back to the rate at beat 0.
    pub fn rate(&self) -> f64 {
        self.rate
    }

    pub fn tempo(&self) -> f64 {
        self.rate * 60.0
    }

    pub fn set_rate(&mut self, rate: f64, time: Option<f64>) -> Result<()> {
        let time = time.unwrap_or_else(|| self.timer.now());
        self.automate_rate(time, Curve::Step, rate)
    }

    pub fn set_tempo(&mut self, bpm: f64, time: Option<f64>) -> Result<()> {
        self.set_rate(bpm / 60.0, time)
    }

    /// Change the rate at `time`. Only step changes are accepted.
    ///
    /// While running, the change lands at the root beat reached at `time`
    /// under the current timeline. While stopped it replaces the rate the
    /// next start seeds.
    pub fn automate_rate(&mut self, time: f64, curve: Curve, rate: f64) -> Result<()> {
        if curve != Curve::Step {
            return Err(TactusError::InvalidAutomationShape { context: "Clock rate", curve });
        }
        if !rate.is_finite() || rate <= 0.0 {
            return Err(TactusError::InvalidRate(rate));
        }

        match self.running_root() {
            Some(root) => {
                let beat = self.beat_at_time(time);
                self.heads.push_rate(root, beat, rate)?;
                debug!(time, beat, rate, "Rate pushed");
            }
            None => {
                self.seed_rate = rate;
                debug!(rate, "Seed rate set");
            }
        }

        self.rate = rate;
        self.rate_param.schedule_segment(time, Curve::Step, rate, None);
        Ok(())
    }

    /// Recorded rate at `time`
    pub fn rate_at(&self, time: f64) -> f64 {
        self.rate_param.value_at(time)
    }

    /// Start an extra head under the root at `time` (default: now)
    pub fn spawn(&mut self, sequence: NestedSequence, time: Option<f64>) -> Option<HeadId> {
        let root = self.running_root()?;
        let time = time.unwrap_or_else(|| self.timer.now());
        let mut ready = Vec::new();
        let id = self.heads.spawn(&mut self.timer, Some(root), sequence, time, &mut ready);
        self.dispatch(&mut ready);
        id
    }

    /// Stop one head and its subtree. Stopping the root stops the clock.
    pub fn stop_head(&mut self, id: HeadId, time: Option<f64>) -> bool {
        if self.root == Some(id) {
            let running = self.is_running();
            self.stop(time);
            return running;
        }
        let time = time.unwrap_or_else(|| self.timer.now());
        self.heads.stop(&mut self.timer, id, time)
    }

    pub fn head(&self, id: HeadId) -> Option<StreamHandle<'_>> {
        self.heads.contains(id).then(|| StreamHandle::new(&self.heads, id))
    }

    /// Local beat of a head right now
    pub fn head_now(&self, id: HeadId) -> Option<f64> {
        self.heads.time_to_beat(id, self.timer.now())
    }

    pub fn root(&self) -> Option<HeadId> {
        self.root
    }

    pub fn heads(&self) -> &HeadArena {
        &self.heads
    }

    pub fn timer(&self) -> &LookaheadTimer<HeadId, S> {
        &self.timer
    }

    pub fn config(&self) -> &ClockConfig {
        &self.config
    }

    pub fn state(&self) -> ClockState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == ClockState::Running
    }

    pub fn start_time(&self) -> Option<f64> {
        self.start_time
    }

    pub fn stop_time(&self) -> Option<f64> {
        self.stop_time
    }
}

/// Last valid rate event at beat 0
fn opening_rate(events: &[Event]) -> Option<f64> {
    events
        .iter()
        .filter(|e| e.offset == 0.0)
        .filter_map(|e| match e.kind {
            EventKind::Rate { rate } if rate.is_finite() && rate > 0.0 => Some(rate),
            _ => None,
        })
        .last()
}
