// Domain objects touched by flows: landing zones and the audit timeline

pub mod tasks;
pub mod timeline;
pub mod zones;

pub use tasks::{RevertDomainStatusTask, SetDomainStatusTask};
pub use timeline::{MemoryTimeline, Timeline, TimelineEntry, TimelineStatus};
pub use zones::{LandingZone, MemoryZoneRepository, ZoneRepository, ZoneStatus, ZoneStatusTarget};
