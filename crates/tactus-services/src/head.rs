//! Playback heads: cursors that walk a sequence against a time base
//!
//! Heads live in a [`HeadArena`] and refer to each other by [`HeadId`]. Each
//! head owns the ids of the heads spawned by its nested sequences; stopping a
//! head stops that whole subtree.

use tactus_core::{Event, EventKind, NestedSequence, RateTimeline, Result};
use tracing::{debug, warn};

use crate::time_source::TimeSource;
use crate::timer::LookaheadTimer;

/// Generational index of a head in its arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HeadId {
    index: u32,
    generation: u32,
}

/// An event translated to absolute time
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledEvent {
    pub time: f64,
    /// The source event, offset still in the emitting head's beats
    pub event: Event,
    pub head: HeadId,
}

/// Param events of one name, sorted by offset
#[derive(Debug)]
struct ParamLane {
    name: String,
    segments: Vec<Event>,
    next: usize,
    /// The pending segment went out ahead of its window
    primed: bool,
}

#[derive(Debug)]
struct Head {
    parent: Option<HeadId>,
    /// Parent beat (or wall time, for a root) where this head's beat 0 sits
    origin: f64,
    rates: RateTimeline,
    events: Vec<Event>,
    cursor: usize,
    lanes: Vec<ParamLane>,
    /// End of the last window this head scanned
    frontier: f64,
    end_beat: Option<f64>,
    address: Option<String>,
    children: Vec<HeadId>,
    event_buffer: Vec<ScheduledEvent>,
    param_buffer: Vec<ScheduledEvent>,
}

impl Head {
    fn new(parent: Option<HeadId>, sequence: NestedSequence) -> Self {
        let NestedSequence {
            events,
            rate,
            start_beat,
            duration,
            address,
        } = sequence;

        let rates = RateTimeline::from_events(rate, &events);
        let end_beat = duration.map(|d| start_beat + d);

        let mut discrete = Vec::new();
        let mut lanes: Vec<ParamLane> = Vec::new();

        for event in events {
            if !event.offset.is_finite() {
                warn!(offset = event.offset, "Dropping event with non-finite offset");
                continue;
            }
            if let Err(e) = event.validate() {
                warn!(offset = event.offset, "Dropping event: {}", e);
                continue;
            }
            if event.offset < start_beat || end_beat.is_some_and(|end| event.offset >= end) {
                continue;
            }
            match &event.kind {
                EventKind::Rate { .. } => {}
                EventKind::Param(change) => {
                    match lanes.iter_mut().find(|lane| lane.name == change.name) {
                        Some(lane) => lane.segments.push(event),
                        None => lanes.push(ParamLane {
                            name: change.name.clone(),
                            segments: vec![event],
                            next: 0,
                            primed: false,
                        }),
                    }
                }
                _ => discrete.push(event),
            }
        }

        discrete.sort_by(|a, b| a.offset.total_cmp(&b.offset));
        for lane in &mut lanes {
            lane.segments.sort_by(|a, b| a.offset.total_cmp(&b.offset));
        }

        let origin = -rates.time_at(start_beat);

        Self {
            parent,
            origin,
            rates,
            events: discrete,
            cursor: 0,
            lanes,
            frontier: 0.0,
            end_beat,
            address,
            children: Vec::new(),
            event_buffer: Vec::new(),
            param_buffer: Vec::new(),
        }
    }

    fn to_parent(&self, beat: f64) -> f64 {
        self.origin + self.rates.time_at(beat)
    }

    fn from_parent(&self, parent_beat: f64) -> f64 {
        self.rates.beat_at(parent_beat - self.origin)
    }

    fn is_exhausted(&self) -> bool {
        self.cursor >= self.events.len() && self.lanes.iter().all(|l| l.next >= l.segments.len())
    }
}

#[derive(Debug, Default)]
struct Slot {
    generation: u32,
    head: Option<Head>,
}

/// Owner of every running head of a clock
#[derive(Debug, Default)]
pub struct HeadArena {
    slots: Vec<Slot>,
    free: Vec<u32>,
    live: usize,
}

impl HeadArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of running heads
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    pub fn contains(&self, id: HeadId) -> bool {
        self.get(id).is_some()
    }

    fn get(&self, id: HeadId) -> Option<&Head> {
        let slot = self.slots.get(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.head.as_ref()
    }

    fn get_mut(&mut self, id: HeadId) -> Option<&mut Head> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.head.as_mut()
    }

    fn insert(&mut self, head: Head) -> HeadId {
        self.live += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.head = Some(head);
            return HeadId { index, generation: slot.generation };
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot { generation: 0, head: Some(head) });
        HeadId { index, generation: 0 }
    }

    fn remove(&mut self, id: HeadId) -> Option<Head> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        let head = slot.head.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        self.live -= 1;
        Some(head)
    }

    /// Wall time of a beat in the head's own beat-space
    pub fn beat_to_time(&self, id: HeadId, beat: f64) -> Option<f64> {
        let head = self.get(id)?;
        self.parent_beat_to_time(head.parent, head.to_parent(beat))
    }

    /// Beat in the head's own beat-space at a wall time
    pub fn time_to_beat(&self, id: HeadId, time: f64) -> Option<f64> {
        let head = self.get(id)?;
        let parent_beat = self.parent_time_to_beat(head.parent, time)?;
        Some(head.from_parent(parent_beat))
    }

    fn parent_beat_to_time(&self, parent: Option<HeadId>, beat: f64) -> Option<f64> {
        match parent {
            Some(p) => self.beat_to_time(p, beat),
            None => Some(beat),
        }
    }

    fn parent_time_to_beat(&self, parent: Option<HeadId>, time: f64) -> Option<f64> {
        match parent {
            Some(p) => self.time_to_beat(p, time),
            None => Some(time),
        }
    }

    pub fn parent(&self, id: HeadId) -> Option<HeadId> {
        self.get(id)?.parent
    }

    pub fn children(&self, id: HeadId) -> &[HeadId] {
        self.get(id).map(|h| h.children.as_slice()).unwrap_or_default()
    }

    pub fn address(&self, id: HeadId) -> Option<&str> {
        self.get(id)?.address.as_deref()
    }

    /// Append a live rate change to a head's own timeline
    pub fn push_rate(&mut self, id: HeadId, beat: f64, rate: f64) -> Result<()> {
        match self.get_mut(id) {
            Some(head) => head.rates.push(beat, rate),
            None => Ok(()),
        }
    }

    /// Build and start a head for `sequence` at `time`.
    ///
    /// The head's first pass covers `[time, last cue time)` so it catches up
    /// with a window already handed out. Heads with frames ready are
    /// appended to `ready`.
    pub fn spawn<S: TimeSource>(
        &mut self,
        timer: &mut LookaheadTimer<HeadId, S>,
        parent: Option<HeadId>,
        sequence: NestedSequence,
        time: f64,
        ready: &mut Vec<HeadId>,
    ) -> Option<HeadId> {
        let until = timer.last_cue_time().unwrap_or(time);
        self.start(timer, parent, sequence, time, until, ready)
    }

    fn start<S: TimeSource>(
        &mut self,
        timer: &mut LookaheadTimer<HeadId, S>,
        parent: Option<HeadId>,
        sequence: NestedSequence,
        time: f64,
        until: f64,
        ready: &mut Vec<HeadId>,
    ) -> Option<HeadId> {
        let parent_beat = self.parent_time_to_beat(parent, time)?;

        let mut head = Head::new(parent, sequence);
        head.origin += parent_beat;
        head.frontier = time;

        let id = self.insert(head);
        if let Some(p) = parent {
            if let Some(parent_head) = self.get_mut(p) {
                parent_head.children.push(id);
            }
        }
        debug!(?id, ?parent, time, "Head started");

        // An empty or fully filtered nested sequence releases itself here
        self.cue(timer, id, until, ready);
        self.contains(id).then_some(id)
    }

    /// Scan the head's streams up to `until` and re-request its cue.
    pub fn cue<S: TimeSource>(
        &mut self,
        timer: &mut LookaheadTimer<HeadId, S>,
        id: HeadId,
        until: f64,
        ready: &mut Vec<HeadId>,
    ) {
        if self.is_finished(id) {
            self.stop(timer, id, until);
            return;
        }

        let spawns = match self.fill(id, until) {
            Some(spawns) => spawns,
            None => return,
        };

        if self.get(id).is_some_and(|h| !h.event_buffer.is_empty() || !h.param_buffer.is_empty()) {
            ready.push(id);
        }
        timer.request_cue(id);

        for (sequence, time) in spawns {
            self.start(timer, Some(id), sequence, time, until, ready);
        }
    }

    /// Move due events into the head's buffers, returning nested sequences to spawn
    fn fill(&mut self, id: HeadId, until: f64) -> Option<Vec<(NestedSequence, f64)>> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        let mut head = slot.head.take()?;

        let t1 = head.frontier;
        let t2 = until.max(t1);
        head.frontier = t2;

        let parent = head.parent;
        let to_time = |arena: &Self, head: &Head, beat: f64| {
            arena.parent_beat_to_time(parent, head.to_parent(beat))
        };

        for i in 0..head.lanes.len() {
            loop {
                let lane = &head.lanes[i];
                let Some(segment) = lane.segments.get(lane.next) else {
                    break;
                };
                let Some(time) = to_time(self, &head, segment.offset) else {
                    break;
                };
                if time >= t2 {
                    break;
                }
                let event = segment.clone();
                let lane = &mut head.lanes[i];
                if !lane.primed {
                    head.param_buffer.push(ScheduledEvent { time, event, head: id });
                }
                lane.next += 1;
                lane.primed = false;
            }

            // Ramps go out one window early so the backend knows where they start
            let lane = &head.lanes[i];
            let Some(segment) = lane.segments.get(lane.next) else {
                continue;
            };
            let is_transition = matches!(&segment.kind, EventKind::Param(c) if c.curve.is_transition());
            if lane.primed || !is_transition {
                continue;
            }
            let Some(time) = to_time(self, &head, segment.offset) else {
                continue;
            };
            let event = segment.clone();
            head.param_buffer.push(ScheduledEvent { time, event, head: id });
            head.lanes[i].primed = true;
        }

        let mut spawns = Vec::new();
        while let Some(event) = head.events.get(head.cursor) {
            let Some(time) = to_time(self, &head, event.offset) else {
                break;
            };
            if time >= t2 {
                break;
            }
            let event = event.clone();
            head.cursor += 1;
            match event.kind {
                EventKind::Sequence(sequence) => spawns.push((sequence, time)),
                _ => head.event_buffer.push(ScheduledEvent { time, event, head: id }),
            }
        }

        if let Some(slot) = self.slots.get_mut(id.index as usize) {
            slot.head = Some(head);
        }
        Some(spawns)
    }

    /// Past its end beat, or a drained nested head with no running children
    fn is_finished(&self, id: HeadId) -> bool {
        let Some(head) = self.get(id) else {
            return false;
        };
        if let Some(end) = head.end_beat.and_then(|b| self.beat_to_time(id, b)) {
            if head.frontier >= end {
                return true;
            }
        }
        head.parent.is_some() && head.is_exhausted() && head.children.is_empty()
    }

    /// One-shot drain of a head's frame: discrete events, then params
    pub fn drain(&mut self, id: HeadId) -> Option<Vec<ScheduledEvent>> {
        let head = self.get_mut(id)?;
        if head.event_buffer.is_empty() && head.param_buffer.is_empty() {
            return None;
        }
        let mut frame = std::mem::take(&mut head.event_buffer);
        frame.append(&mut head.param_buffer);
        Some(frame)
    }

    /// Stop a head and every head below it. Returns false if it was not running.
    pub fn stop<S: TimeSource>(
        &mut self,
        timer: &mut LookaheadTimer<HeadId, S>,
        id: HeadId,
        time: f64,
    ) -> bool {
        let Some(head) = self.remove(id) else {
            return false;
        };
        timer.cancel_cue(id);

        for child in &head.children {
            self.stop(timer, *child, time);
        }
        if let Some(parent_head) = head.parent.and_then(|p| self.get_mut(p)) {
            parent_head.children.retain(|c| *c != id);
        }

        debug!(?id, time, "Head stopped");
        true
    }
}

/// Read-only view of a running head, handed to consumers with each event
pub struct StreamHandle<'a> {
    heads: &'a HeadArena,
    id: HeadId,
}

impl<'a> StreamHandle<'a> {
    pub(crate) fn new(heads: &'a HeadArena, id: HeadId) -> Self {
        Self { heads, id }
    }

    pub fn id(&self) -> HeadId {
        self.id
    }

    pub fn is_running(&self) -> bool {
        self.heads.contains(self.id)
    }

    /// Beat at `time`, 0 once the head has stopped
    pub fn beat_at_time(&self, time: f64) -> f64 {
        self.heads.time_to_beat(self.id, time).unwrap_or(0.0)
    }

    /// Time of `beat`, 0 once the head has stopped
    pub fn time_at_beat(&self, beat: f64) -> f64 {
        self.heads.beat_to_time(self.id, beat).unwrap_or(0.0)
    }

    pub fn address(&self) -> Option<&'a str> {
        self.heads.address(self.id)
    }

    pub fn parent(&self) -> Option<HeadId> {
        self.heads.parent(self.id)
    }

    pub fn children(&self) -> &'a [HeadId] {
        self.heads.children(self.id)
    }
}
