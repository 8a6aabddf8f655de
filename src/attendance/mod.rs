mod resolver;
mod worked_hours;

pub use resolver::{RecordTypeResolver, DEFAULT_MIN_WORK_HOURS};
pub use worked_hours::{worked_duration, worked_hours};
