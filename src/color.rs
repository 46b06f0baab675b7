/*!
 # Color channel normalization

 Maps the public 0-255 RGB range to and from each firmware family's native
 channel range.
*/

/// Highest native channel value on Zerproc firmware
pub const ZERPROC_NATIVE_MAX: u8 = 31;

/// Native value Zerproc firmware treats as "full brightness"
pub const ZERPROC_FULL_BRIGHTNESS: u8 = 255;

/// Value of the redundant fifth byte in a KulerSky payload.
///
/// It is 255 exactly when the color is pure white and 0 otherwise.
pub fn kulersky_redundant_channel(red: u8, green: u8, blue: u8) -> u8 {
    if (red, green, blue) == (255, 255, 255) {
        255
    } else {
        0
    }
}

/// Maps a 0-255 channel to the Zerproc native range.
///
/// `ceil(value * 31 / 255)`, except 255 which is sent as the
/// full-brightness sentinel.
pub fn zerproc_encode_channel(value: u8) -> u8 {
    if value == 255 {
        return ZERPROC_FULL_BRIGHTNESS;
    }
    let native = (u16::from(value) * u16::from(ZERPROC_NATIVE_MAX)).div_ceil(255);
    native as u8
}

/// Maps a Zerproc native channel back to 0-255: `floor(min(native * 255 / 31, 255))`
pub fn zerproc_decode_channel(native: u8) -> u8 {
    let expanded = u16::from(native) * 255 / u16::from(ZERPROC_NATIVE_MAX);
    expanded.min(255) as u8
}

/// Applies [`zerproc_encode_channel`] to a whole color
pub fn zerproc_encode(red: u8, green: u8, blue: u8) -> (u8, u8, u8) {
    (
        zerproc_encode_channel(red),
        zerproc_encode_channel(green),
        zerproc_encode_channel(blue),
    )
}

/// Applies [`zerproc_decode_channel`] to a whole color
pub fn zerproc_decode(red: u8, green: u8, blue: u8) -> (u8, u8, u8) {
    (
        zerproc_decode_channel(red),
        zerproc_decode_channel(green),
        zerproc_decode_channel(blue),
    )
}
