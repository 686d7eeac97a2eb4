//! Collaborators the simulated host hands work to: notifications and
//! artifact persistence.

mod notify;
mod persist;

pub use notify::{ConsoleNotifier, Notifier, RecordingNotifier, TracingNotifier};
pub use persist::{ArtifactSink, DirectorySink, MemorySink};
