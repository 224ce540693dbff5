pub mod enums;
pub mod event;
pub mod grace;
pub mod preferences;
pub mod run;
pub mod schedule;
pub mod summary;

pub use enums::*;
pub use event::DoseEvent;
pub use grace::GracePeriodConfig;
pub use preferences::{BucketChoice, FrequencyMapping, PatientTimePreferences, TimeBucket};
pub use run::TaskRun;
pub use schedule::MedicationSchedule;
pub use summary::DailySummary;
