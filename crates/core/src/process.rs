//! The closed set of generation processes the service can run.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// A generation process. Used as the lookup key for templates, parameter
/// schemas and slot mappings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ProcessKind {
    #[serde(rename = "portrait")]
    Portrait,
    #[serde(rename = "portrait_dt")]
    PortraitDetail,
    #[serde(rename = "pose")]
    Pose,
    #[serde(rename = "pose_dt")]
    PoseDetail,
    #[serde(rename = "portrait_to_pose")]
    PortraitToPose,
}

impl ProcessKind {
    /// Every process kind, in declaration order.
    pub const ALL: [ProcessKind; 5] = [
        ProcessKind::Portrait,
        ProcessKind::PortraitDetail,
        ProcessKind::Pose,
        ProcessKind::PoseDetail,
        ProcessKind::PortraitToPose,
    ];

    /// Stable wire name (also stored in the run log).
    pub fn as_str(self) -> &'static str {
        match self {
            ProcessKind::Portrait => "portrait",
            ProcessKind::PortraitDetail => "portrait_dt",
            ProcessKind::Pose => "pose",
            ProcessKind::PoseDetail => "pose_dt",
            ProcessKind::PortraitToPose => "portrait_to_pose",
        }
    }

    /// Whether this kind produces a portrait (as opposed to a pose).
    pub fn is_portrait(self) -> bool {
        matches!(self, ProcessKind::Portrait | ProcessKind::PortraitDetail)
    }
}

impl fmt::Display for ProcessKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProcessKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ProcessKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| CoreError::Validation(format!("Unknown process type '{s}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_names_round_trip_through_from_str() {
        for kind in ProcessKind::ALL {
            assert_eq!(kind.as_str().parse::<ProcessKind>().unwrap(), kind);
        }
    }

    #[test]
    fn serde_uses_wire_names() {
        let json = serde_json::to_string(&ProcessKind::PortraitToPose).unwrap();
        assert_eq!(json, "\"portrait_to_pose\"");
    }

    #[test]
    fn unknown_name_is_rejected() {
        assert!("landscape".parse::<ProcessKind>().is_err());
    }
}
