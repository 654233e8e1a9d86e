//! tactus-services: Tempo clock, lookahead timer, and playback heads

pub mod clock;
pub mod driver;
pub mod head;
pub mod time_source;
pub mod timer;

pub use clock::{ClockState, TempoClock, Target};
pub use driver::TickDriver;
pub use head::{HeadArena, HeadId, ScheduledEvent, StreamHandle};
pub use time_source::{ManualClock, SystemClock, TimeSource};
pub use timer::{CueWindow, LookaheadTimer};
