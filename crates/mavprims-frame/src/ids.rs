//! Numeric identifiers used by the core, taken from the common dialect.
//!
//! The engines keep raw numbers (a COMMAND_ACK may carry a result code the
//! dialect does not name), so the enum values are flattened here once.

use mavlink::common::{
    MavCmd, MavLandedState, MavParamType, MavResult, AUTOPILOT_VERSION_DATA, COMMAND_ACK_DATA,
    COMMAND_LONG_DATA, EXTENDED_SYS_STATE_DATA, HEARTBEAT_DATA, PARAM_REQUEST_LIST_DATA,
    PARAM_REQUEST_READ_DATA, PARAM_SET_DATA, PARAM_VALUE_DATA, STATUSTEXT_DATA,
};
use mavlink::MessageData;

// Message ids.
pub const MSG_HEARTBEAT: u32 = <HEARTBEAT_DATA as MessageData>::ID;
pub const MSG_PARAM_REQUEST_READ: u32 = <PARAM_REQUEST_READ_DATA as MessageData>::ID;
pub const MSG_PARAM_REQUEST_LIST: u32 = <PARAM_REQUEST_LIST_DATA as MessageData>::ID;
pub const MSG_PARAM_VALUE: u32 = <PARAM_VALUE_DATA as MessageData>::ID;
pub const MSG_PARAM_SET: u32 = <PARAM_SET_DATA as MessageData>::ID;
pub const MSG_COMMAND_LONG: u32 = <COMMAND_LONG_DATA as MessageData>::ID;
pub const MSG_COMMAND_ACK: u32 = <COMMAND_ACK_DATA as MessageData>::ID;
pub const MSG_AUTOPILOT_VERSION: u32 = <AUTOPILOT_VERSION_DATA as MessageData>::ID;
pub const MSG_EXTENDED_SYS_STATE: u32 = <EXTENDED_SYS_STATE_DATA as MessageData>::ID;
pub const MSG_STATUSTEXT: u32 = <STATUSTEXT_DATA as MessageData>::ID;

// Component ids.
pub const COMP_ID_ALL: u8 = 0;
pub const COMP_ID_AUTOPILOT1: u8 = 1;
pub const COMP_ID_CAMERA: u8 = 100;
pub const COMP_ID_GIMBAL: u8 = 154;
pub const COMP_ID_MISSIONPLANNER: u8 = 190;

// Command ids.
pub const CMD_COMPONENT_ARM_DISARM: u16 = MavCmd::MAV_CMD_COMPONENT_ARM_DISARM as u16;
pub const CMD_SET_MESSAGE_INTERVAL: u16 = MavCmd::MAV_CMD_SET_MESSAGE_INTERVAL as u16;
pub const CMD_REQUEST_AUTOPILOT_CAPABILITIES: u16 =
    MavCmd::MAV_CMD_REQUEST_AUTOPILOT_CAPABILITIES as u16;

// COMMAND_ACK result codes.
pub const RESULT_ACCEPTED: u8 = MavResult::MAV_RESULT_ACCEPTED as u8;
pub const RESULT_TEMPORARILY_REJECTED: u8 = MavResult::MAV_RESULT_TEMPORARILY_REJECTED as u8;
pub const RESULT_DENIED: u8 = MavResult::MAV_RESULT_DENIED as u8;
pub const RESULT_UNSUPPORTED: u8 = MavResult::MAV_RESULT_UNSUPPORTED as u8;
pub const RESULT_FAILED: u8 = MavResult::MAV_RESULT_FAILED as u8;
pub const RESULT_IN_PROGRESS: u8 = MavResult::MAV_RESULT_IN_PROGRESS as u8;
pub const RESULT_CANCELLED: u8 = MavResult::MAV_RESULT_CANCELLED as u8;

// Parameter value types.
pub const PARAM_TYPE_UINT8: u8 = MavParamType::MAV_PARAM_TYPE_UINT8 as u8;
pub const PARAM_TYPE_INT8: u8 = MavParamType::MAV_PARAM_TYPE_INT8 as u8;
pub const PARAM_TYPE_UINT16: u8 = MavParamType::MAV_PARAM_TYPE_UINT16 as u8;
pub const PARAM_TYPE_INT16: u8 = MavParamType::MAV_PARAM_TYPE_INT16 as u8;
pub const PARAM_TYPE_UINT32: u8 = MavParamType::MAV_PARAM_TYPE_UINT32 as u8;
pub const PARAM_TYPE_INT32: u8 = MavParamType::MAV_PARAM_TYPE_INT32 as u8;
pub const PARAM_TYPE_REAL32: u8 = MavParamType::MAV_PARAM_TYPE_REAL32 as u8;

// EXTENDED_SYS_STATE landed states.
pub const LANDED_STATE_UNDEFINED: u8 = MavLandedState::MAV_LANDED_STATE_UNDEFINED as u8;
pub const LANDED_STATE_ON_GROUND: u8 = MavLandedState::MAV_LANDED_STATE_ON_GROUND as u8;
pub const LANDED_STATE_IN_AIR: u8 = MavLandedState::MAV_LANDED_STATE_IN_AIR as u8;
pub const LANDED_STATE_TAKEOFF: u8 = MavLandedState::MAV_LANDED_STATE_TAKEOFF as u8;
pub const LANDED_STATE_LANDING: u8 = MavLandedState::MAV_LANDED_STATE_LANDING as u8;

/// Returns a human-readable name for a message id.
pub fn message_name(id: u32) -> &'static str {
    match id {
        MSG_HEARTBEAT => "HEARTBEAT",
        MSG_PARAM_REQUEST_READ => "PARAM_REQUEST_READ",
        MSG_PARAM_REQUEST_LIST => "PARAM_REQUEST_LIST",
        MSG_PARAM_VALUE => "PARAM_VALUE",
        MSG_PARAM_SET => "PARAM_SET",
        MSG_COMMAND_LONG => "COMMAND_LONG",
        MSG_COMMAND_ACK => "COMMAND_ACK",
        MSG_AUTOPILOT_VERSION => "AUTOPILOT_VERSION",
        MSG_EXTENDED_SYS_STATE => "EXTENDED_SYS_STATE",
        MSG_STATUSTEXT => "STATUSTEXT",
        _ => "UNKNOWN",
    }
}

/// Returns a human-readable name for a component id.
pub fn component_name(id: u8) -> &'static str {
    match id {
        COMP_ID_AUTOPILOT1 => "autopilot",
        COMP_ID_CAMERA..=105 => "camera",
        COMP_ID_GIMBAL => "gimbal",
        COMP_ID_MISSIONPLANNER => "ground-station",
        _ => "other",
    }
}

/// Returns true if the component id belongs to an autopilot.
pub fn is_autopilot(component_id: u8) -> bool {
    component_id == COMP_ID_AUTOPILOT1
}
