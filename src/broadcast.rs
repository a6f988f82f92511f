//! Outbound broadcast commands
//!
//! The simulator listens for a registered window message posted to every
//! top-level window. Each message carries a command id and one 16-bit
//! parameter in `wparam`, and a 32-bit parameter in `lparam` that is either
//! an integer, two 16-bit values, or a float scaled by 65536. Delivery is
//! fire-and-forget; nothing is acknowledged.
//!
//! ```rust
//! use ira_telemetry::broadcast::{BroadcastMessage, PitCommand};
//!
//! let message = BroadcastMessage::pit(PitCommand::Fuel, 20);
//! assert_eq!(message.wparam(), 9 | (2 << 16));
//! assert_eq!(message.lparam(), 20);
//! ```

use crate::{Result, TelemetryError};
use serde::Serialize;

/// Command ids understood by the simulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[repr(i32)]
pub enum BroadcastMsg {
    CamSwitchPos = 0,
    CamSwitchNum = 1,
    CamSetState = 2,
    ReplaySetPlaySpeed = 3,
    ReplaySetPlayPosition = 4,
    ReplaySearch = 5,
    ReplaySetState = 6,
    ReloadTextures = 7,
    ChatCommand = 8,
    PitCommand = 9,
    TelemCommand = 10,
    FfbCommand = 11,
    ReplaySearchSessionTime = 12,
    VideoCapture = 13,
}

impl BroadcastMsg {
    pub const ALL: [BroadcastMsg; 14] = [
        BroadcastMsg::CamSwitchPos,
        BroadcastMsg::CamSwitchNum,
        BroadcastMsg::CamSetState,
        BroadcastMsg::ReplaySetPlaySpeed,
        BroadcastMsg::ReplaySetPlayPosition,
        BroadcastMsg::ReplaySearch,
        BroadcastMsg::ReplaySetState,
        BroadcastMsg::ReloadTextures,
        BroadcastMsg::ChatCommand,
        BroadcastMsg::PitCommand,
        BroadcastMsg::TelemCommand,
        BroadcastMsg::FfbCommand,
        BroadcastMsg::ReplaySearchSessionTime,
        BroadcastMsg::VideoCapture,
    ];

    pub const fn raw(self) -> i32 {
        self as i32
    }
}

impl TryFrom<i32> for BroadcastMsg {
    type Error = TelemetryError;

    fn try_from(raw: i32) -> Result<Self> {
        usize::try_from(raw)
            .ok()
            .and_then(|index| Self::ALL.get(index).copied())
            .ok_or_else(|| TelemetryError::Broadcast { reason: format!("unknown message id {raw}") })
    }
}

/// Pit service requests. Parameters are litres for fuel and kPa for tyres; 0 keeps the current value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[repr(i32)]
pub enum PitCommand {
    /// Clear all pit checkboxes
    Clear = 0,
    /// Windshield tear-off
    Ws = 1,
    Fuel = 2,
    Lf = 3,
    Rf = 4,
    Lr = 5,
    Rr = 6,
    ClearTires = 7,
    /// Fast repair
    Fr = 8,
    ClearWs = 9,
    ClearFr = 10,
    ClearFuel = 11,
    /// Tyre compound change
    Tc = 12,
}

/// Disk telemetry recording control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[repr(i32)]
pub enum TelemetryCommand {
    Stop = 0,
    Start = 1,
    /// Write the current file and start a new one
    Restart = 2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[repr(i32)]
pub enum ChatCommand {
    /// Run chat macro 1-15 (parameter is the macro number minus one)
    Macro = 0,
    BeginChat = 1,
    /// Reply to the last private chat
    Reply = 2,
    Cancel = 3,
}

/// Special camera targets accepted in place of a car number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[repr(i32)]
pub enum CameraFocus {
    Incident = -3,
    Leader = -2,
    Exiting = -1,
}

/// Low 16 bits of `low` and `high` packed into one 32-bit word.
pub const fn make_long(low: i32, high: i32) -> i32 {
    ((low as u32 & 0xFFFF) | ((high as u32 & 0xFFFF) << 16)) as i32
}

/// Encode a car number with leading zeros the way the camera commands expect.
///
/// `pad_car_num(1, 2)` selects car "001"; with `zeros == 0` the number is
/// returned unchanged.
pub fn pad_car_num(num: i32, zeros: i32) -> i32 {
    let mut num_place = if num > 99 {
        3
    } else if num > 9 {
        2
    } else {
        1
    };

    if zeros == 0 {
        return num;
    }
    num_place += zeros;
    num + 1000 * num_place
}

/// One encoded broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BroadcastMessage {
    pub msg: BroadcastMsg,
    /// Only the low 16 bits are transmitted
    pub var1: i32,
    pub var2: i32,
}

impl BroadcastMessage {
    pub fn new(msg: BroadcastMsg, var1: i32, var2: i32) -> Self {
        Self { msg, var1, var2 }
    }

    /// Message whose second and third parameters are 16-bit values.
    pub fn with_three(msg: BroadcastMsg, var1: i32, var2: i32, var3: i32) -> Self {
        Self::new(msg, var1, make_long(var2, var3))
    }

    /// Message whose second parameter is a float in 16.16 fixed point.
    pub fn with_float(msg: BroadcastMsg, var1: i32, value: f32) -> Self {
        Self::new(msg, var1, (value * 65536.0) as i32)
    }

    pub fn camera_switch_position(position: i32, group: i32, camera: i32) -> Self {
        Self::with_three(BroadcastMsg::CamSwitchPos, position, group, camera)
    }

    /// `car_number` is usually the result of [`pad_car_num`].
    pub fn camera_switch_number(car_number: i32, group: i32, camera: i32) -> Self {
        Self::with_three(BroadcastMsg::CamSwitchNum, car_number, group, camera)
    }

    pub fn camera_focus(focus: CameraFocus, group: i32, camera: i32) -> Self {
        Self::with_three(BroadcastMsg::CamSwitchNum, focus as i32, group, camera)
    }

    pub fn camera_set_state(state: i32) -> Self {
        Self::new(BroadcastMsg::CamSetState, state, 0)
    }

    pub fn replay_set_play_speed(speed: i32, slow_motion: bool) -> Self {
        Self::with_three(BroadcastMsg::ReplaySetPlaySpeed, speed, i32::from(slow_motion), 0)
    }

    pub fn replay_set_play_position(mode: i32, frame: i32) -> Self {
        Self::new(BroadcastMsg::ReplaySetPlayPosition, mode, frame)
    }

    pub fn replay_search(mode: i32) -> Self {
        Self::new(BroadcastMsg::ReplaySearch, mode, 0)
    }

    pub fn replay_set_state(state: i32) -> Self {
        Self::new(BroadcastMsg::ReplaySetState, state, 0)
    }

    pub fn replay_search_session_time(session_num: i32, session_time_ms: i32) -> Self {
        Self::new(BroadcastMsg::ReplaySearchSessionTime, session_num, session_time_ms)
    }

    /// Reload every car's textures, or one car's when `car_idx` is given.
    pub fn reload_textures(car_idx: Option<i32>) -> Self {
        match car_idx {
            Some(idx) => Self::new(BroadcastMsg::ReloadTextures, 1, idx),
            None => Self::new(BroadcastMsg::ReloadTextures, 0, 0),
        }
    }

    pub fn chat(command: ChatCommand, macro_num: i32) -> Self {
        Self::new(BroadcastMsg::ChatCommand, command as i32, macro_num)
    }

    pub fn pit(command: PitCommand, parameter: i32) -> Self {
        Self::new(BroadcastMsg::PitCommand, command as i32, parameter)
    }

    pub fn telemetry(command: TelemetryCommand) -> Self {
        Self::new(BroadcastMsg::TelemCommand, command as i32, 0)
    }

    /// Set the force feedback maximum force in Nm.
    pub fn ffb_max_force(newton_metres: f32) -> Self {
        Self::with_float(BroadcastMsg::FfbCommand, 0, newton_metres)
    }

    pub fn video_capture(mode: i32) -> Self {
        Self::new(BroadcastMsg::VideoCapture, mode, 0)
    }

    /// Command id in the low word, first parameter in the high word.
    pub fn wparam(&self) -> usize {
        make_long(self.msg.raw(), self.var1) as u32 as usize
    }

    pub fn lparam(&self) -> isize {
        self.var2 as isize
    }
}

/// Somewhere broadcasts can be sent.
pub trait BroadcastSink {
    fn send(&self, message: &BroadcastMessage) -> Result<()>;
}

impl<S: BroadcastSink + ?Sized> BroadcastSink for &S {
    fn send(&self, message: &BroadcastMessage) -> Result<()> {
        (**self).send(message)
    }
}
