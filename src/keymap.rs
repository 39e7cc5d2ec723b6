//! Canonical remote-key names and their Android keycodes.
//!
//! Only this small set is representable on the ADB transport. The network
//! API accepts the full JointSpace key-name vocabulary, so keys outside the
//! map are still usable there.

pub const KEYCODE_HOME: u32 = 3;
pub const KEYCODE_BACK: u32 = 4;
pub const KEYCODE_VOLUME_UP: u32 = 24;
pub const KEYCODE_VOLUME_DOWN: u32 = 25;
pub const KEYCODE_POWER: u32 = 26;
pub const KEYCODE_MENU: u32 = 82;
pub const KEYCODE_VOLUME_MUTE: u32 = 164;

/// Android keycode for a canonical JointSpace key name, if the key is
/// representable on the ADB transport.
pub fn keycode_for(key: &str) -> Option<u32> {
    match key {
        "VolumeUp" => Some(KEYCODE_VOLUME_UP),
        "VolumeDown" => Some(KEYCODE_VOLUME_DOWN),
        "Mute" => Some(KEYCODE_VOLUME_MUTE),
        "Standby" | "Power" => Some(KEYCODE_POWER),
        "Back" => Some(KEYCODE_BACK),
        "Home" => Some(KEYCODE_HOME),
        "Menu" => Some(KEYCODE_MENU),
        _ => None,
    }
}
