//! Raw usage events as produced by the OS usage-access collector.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::PackageName;

/// Foreground transition of an application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AppEventKind {
    Open,
    Close,
}

impl AppEventKind {
    /// String representation for database storage.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Close => "close",
        }
    }
}

impl fmt::Display for AppEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AppEventKind {
    type Err = UnknownEventKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" | "foreground" => Ok(Self::Open),
            "close" | "background" => Ok(Self::Close),
            _ => Err(UnknownEventKind(s.to_string())),
        }
    }
}

impl Serialize for AppEventKind {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for AppEventKind {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Error type for unknown event kind strings.
#[derive(Debug, Clone)]
pub struct UnknownEventKind(String);

impl fmt::Display for UnknownEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown event kind: {}", self.0)
    }
}

impl std::error::Error for UnknownEventKind {}

/// An app foreground/background transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageEvent {
    pub package_name: PackageName,
    pub kind: AppEventKind,
    pub timestamp: DateTime<Utc>,
}

impl UsageEvent {
    pub const fn new(package_name: PackageName, kind: AppEventKind, timestamp: DateTime<Utc>) -> Self {
        Self {
            package_name,
            kind,
            timestamp,
        }
    }
}

/// One line of the raw event stream.
///
/// The set of event kinds is closed: app transitions and screen unlocks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RawEvent {
    App {
        package_name: PackageName,
        kind: AppEventKind,
        timestamp: DateTime<Utc>,
    },
    Unlock {
        timestamp: DateTime<Utc>,
    },
}

impl RawEvent {
    #[must_use]
    pub const fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::App { timestamp, .. } | Self::Unlock { timestamp } => *timestamp,
        }
    }
}

impl From<UsageEvent> for RawEvent {
    fn from(event: UsageEvent) -> Self {
        Self::App {
            package_name: event.package_name,
            kind: event.kind,
            timestamp: event.timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn kind_roundtrip_and_aliases() {
        for kind in [AppEventKind::Open, AppEventKind::Close] {
            let parsed: AppEventKind = kind.to_string().parse().expect("should parse");
            assert_eq!(parsed, kind);
        }
        assert_eq!("foreground".parse::<AppEventKind>().unwrap(), AppEventKind::Open);
        assert_eq!("background".parse::<AppEventKind>().unwrap(), AppEventKind::Close);
    }

    #[test]
    fn unknown_kind_errors() {
        let err = "resume".parse::<AppEventKind>().unwrap_err();
        assert_eq!(err.to_string(), "unknown event kind: resume");
    }

    #[test]
    fn raw_event_parses_tagged_json() {
        let app: RawEvent = serde_json::from_str(
            r#"{"type":"app","package_name":"com.example.mail","kind":"open","timestamp":"2024-01-01T08:00:00Z"}"#,
        )
        .unwrap();
        let expected_ts = Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).unwrap();
        assert_eq!(
            app,
            RawEvent::App {
                package_name: PackageName::new("com.example.mail").unwrap(),
                kind: AppEventKind::Open,
                timestamp: expected_ts,
            }
        );

        let unlock: RawEvent =
            serde_json::from_str(r#"{"type":"unlock","timestamp":"2024-01-01T08:00:00Z"}"#).unwrap();
        assert_eq!(unlock.timestamp(), expected_ts);
    }

    #[test]
    fn raw_event_rejects_unknown_type() {
        let result: Result<RawEvent, _> =
            serde_json::from_str(r#"{"type":"shutdown","timestamp":"2024-01-01T08:00:00Z"}"#);
        assert!(result.is_err());
    }
}
