//! Helpers around the common-dialect payloads the engines exchange.
//!
//! The payload structs themselves (`HEARTBEAT_DATA`, `COMMAND_LONG_DATA`, ...)
//! are generated by the `mavlink` crate and re-exported here.

use std::fmt;

use mavlink::common::{MavAutopilot, MavModeFlag, MavSeverity, MavState, MavType};

use crate::error::{FrameError, Result};

pub use mavlink::common::{
    AUTOPILOT_VERSION_DATA, COMMAND_ACK_DATA, COMMAND_LONG_DATA, EXTENDED_SYS_STATE_DATA,
    HEARTBEAT_DATA, PARAM_REQUEST_LIST_DATA, PARAM_REQUEST_READ_DATA, PARAM_SET_DATA,
    PARAM_VALUE_DATA, STATUSTEXT_DATA,
};
pub use mavlink::MessageData;

/// Fixed width of the parameter name field.
pub const PARAM_ID_LEN: usize = 16;

/// Width of the STATUSTEXT text field.
pub const STATUSTEXT_LEN: usize = 50;

/// Wire revision advertised in our own heartbeats.
pub const MAVLINK_VERSION: u8 = 3;

/// Parameter name as carried on the wire.
///
/// Shorter names are NUL padded; a name of exactly 16 bytes has no terminator.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ParamId([u8; PARAM_ID_LEN]);

impl ParamId {
    pub fn from_name(name: &str) -> Result<Self> {
        let bytes = name.as_bytes();
        if bytes.len() > PARAM_ID_LEN {
            return Err(FrameError::NameTooLong {
                len: bytes.len(),
                max: PARAM_ID_LEN,
            });
        }
        let mut raw = [0u8; PARAM_ID_LEN];
        raw[..bytes.len()].copy_from_slice(bytes);
        Ok(Self(raw))
    }

    pub fn from_bytes(raw: [u8; PARAM_ID_LEN]) -> Self {
        Self(raw)
    }

    pub fn as_bytes(&self) -> &[u8; PARAM_ID_LEN] {
        &self.0
    }

    pub fn into_bytes(self) -> [u8; PARAM_ID_LEN] {
        self.0
    }

    /// Name up to the first NUL byte.
    pub fn name(&self) -> String {
        nul_terminated(&self.0)
    }

    /// Compare against a name the way the protocol does (bounded, NUL aware).
    pub fn matches(&self, name: &str) -> bool {
        match Self::from_name(name) {
            Ok(other) => other.0 == self.0,
            Err(_) => false,
        }
    }
}

impl fmt::Debug for ParamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ParamId({:?})", self.name())
    }
}

/// Heartbeat a ground station emits about itself.
pub fn ground_station_heartbeat() -> HEARTBEAT_DATA {
    HEARTBEAT_DATA {
        custom_mode: 0,
        mavtype: MavType::MAV_TYPE_GCS,
        autopilot: MavAutopilot::MAV_AUTOPILOT_INVALID,
        base_mode: MavModeFlag::empty(),
        system_status: MavState::MAV_STATE_ACTIVE,
        mavlink_version: MAVLINK_VERSION,
    }
}

pub fn is_armed(heartbeat: &HEARTBEAT_DATA) -> bool {
    heartbeat
        .base_mode
        .contains(MavModeFlag::MAV_MODE_FLAG_SAFETY_ARMED)
}

/// STATUSTEXT carrying `text`, cut to the field width.
pub fn status_text(severity: MavSeverity, text: &str) -> STATUSTEXT_DATA {
    let mut raw = [0u8; STATUSTEXT_LEN];
    let bytes = text.as_bytes();
    let n = bytes.len().min(STATUSTEXT_LEN);
    raw[..n].copy_from_slice(&bytes[..n]);
    STATUSTEXT_DATA {
        severity,
        text: raw,
        ..STATUSTEXT_DATA::default()
    }
}

/// Text up to the first NUL; the field is not terminated at full length.
pub fn status_text_string(status: &STATUSTEXT_DATA) -> String {
    nul_terminated(&status.text)
}

fn nul_terminated(raw: &[u8]) -> String {
    let end = raw.iter().position(|b| *b == 0).unwrap_or(raw.len());
    String::from_utf8_lossy(&raw[..end]).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use mavlink::MavlinkVersion;

    #[test]
    fn param_id_full_width_has_no_terminator() {
        let id = ParamId::from_name("ABCDEFGHIJKLMNOP").unwrap();
        assert_eq!(id.name(), "ABCDEFGHIJKLMNOP");
        assert!(id.matches("ABCDEFGHIJKLMNOP"));
        assert!(!id.matches("ABCDEFGHIJKLMNO"));
    }

    #[test]
    fn param_id_rejects_long_names() {
        let err = ParamId::from_name("THIS_NAME_IS_TOO_LONG").unwrap_err();
        assert!(matches!(err, FrameError::NameTooLong { len: 21, max: 16 }));
    }

    #[test]
    fn heartbeat_armed_flag() {
        let hb = HEARTBEAT_DATA {
            base_mode: MavModeFlag::MAV_MODE_FLAG_SAFETY_ARMED
                | MavModeFlag::MAV_MODE_FLAG_CUSTOM_MODE_ENABLED,
            ..HEARTBEAT_DATA::default()
        };
        assert!(is_armed(&hb));
        assert!(!is_armed(&ground_station_heartbeat()));
    }

    #[test]
    fn status_text_is_cut_to_field_width() {
        let long = "x".repeat(80);
        let status = status_text(MavSeverity::MAV_SEVERITY_INFO, &long);
        assert_eq!(status_text_string(&status).len(), STATUSTEXT_LEN);
    }

    #[test]
    fn truncated_payload_is_zero_extended() {
        // A v2 sender drops the trailing zero fields of COMMAND_ACK.
        let ack = COMMAND_ACK_DATA::deser(MavlinkVersion::V2, &[0x90, 0x01, 5]).unwrap();
        assert_eq!(ack.command as u16, 400);
        assert_eq!(ack.result as u8, 5);
        assert_eq!(ack.progress, 0);
        assert_eq!(ack.target_system, 0);
    }

    #[test]
    fn status_text_reads_back_through_the_dialect() {
        let mut buf = [0u8; 255];
        let status = status_text(MavSeverity::MAV_SEVERITY_WARNING, "battery low");
        let len = status.ser(MavlinkVersion::V2, &mut buf);
        let parsed = STATUSTEXT_DATA::deser(MavlinkVersion::V2, &buf[..len]).unwrap();
        assert_eq!(parsed.severity, MavSeverity::MAV_SEVERITY_WARNING);
        assert_eq!(status_text_string(&parsed), "battery low");
    }
}
