use crate::db::DatabaseError;
use serde::{Deserialize, Serialize};

/// Macro to generate enum with as_str + std::str::FromStr pattern
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = DatabaseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(DatabaseError::InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }
    };
}

str_enum!(DoseStatus {
    Scheduled => "scheduled",
    Taken => "taken",
    Late => "late",
    Missed => "missed",
    Skipped => "skipped",
});

impl DoseStatus {
    /// Terminal statuses never transition again through normal flows.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, DoseStatus::Scheduled)
    }
}

impl Default for DoseStatus {
    fn default() -> Self {
        DoseStatus::Scheduled
    }
}

str_enum!(Frequency {
    Daily => "daily",
    TwiceDaily => "twice_daily",
    ThreeTimesDaily => "three_times_daily",
    FourTimesDaily => "four_times_daily",
    Weekly => "weekly",
    Monthly => "monthly",
    AsNeeded => "as_needed",
});

impl Frequency {
    /// Number of dose times per scheduled day. PRN medications are never scheduled.
    pub fn doses_per_day(&self) -> usize {
        match self {
            Frequency::Daily | Frequency::Weekly | Frequency::Monthly => 1,
            Frequency::TwiceDaily => 2,
            Frequency::ThreeTimesDaily => 3,
            Frequency::FourTimesDaily => 4,
            Frequency::AsNeeded => 0,
        }
    }

    pub fn is_prn(&self) -> bool {
        matches!(self, Frequency::AsNeeded)
    }
}

str_enum!(TaskKind {
    EventGeneration => "event_generation",
    MissedSweep => "missed_sweep",
    DailyReset => "daily_reset",
});
