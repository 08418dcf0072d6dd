//! Type system enforcement tests for audio domain newtypes.
//! These newtypes keep out-of-range volume values away from the SCI_VOL register.
#![allow(clippy::unwrap_used)]

// ── VolumePercent ────────────────────────────────────────────────────────────

#[test]
fn volume_percent_new_clamps_over_100() {
    use platform::audio_types::VolumePercent;
    let v = VolumePercent::new(150);
    assert_eq!(v.get(), 100, "VolumePercent::new(150) should clamp to 100");
}

#[test]
fn volume_percent_new_allows_bounds() {
    use platform::audio_types::VolumePercent;
    assert_eq!(VolumePercent::new(0).get(), 0);
    assert_eq!(VolumePercent::new(100).get(), 100);
    assert_eq!(VolumePercent::MUTE.get(), 0);
    assert_eq!(VolumePercent::MAX.get(), 100);
}

#[test]
fn volume_percent_try_new_rejects_over_100() {
    use platform::audio_types::VolumePercent;
    let err = VolumePercent::try_new(101).unwrap_err();
    assert_eq!((err.value, err.min, err.max), (101, 0, 100));
    assert!(VolumePercent::try_new(255).is_err());
}

#[test]
fn volume_percent_try_new_accepts_valid_range() {
    use platform::audio_types::VolumePercent;
    assert!(VolumePercent::try_new(0).is_ok());
    assert!(VolumePercent::try_new(50).is_ok());
    assert!(VolumePercent::try_new(100).is_ok());
}

#[test]
fn volume_percent_is_one_byte() {
    use platform::audio_types::VolumePercent;
    assert_eq!(core::mem::size_of::<VolumePercent>(), 1);
}

// ── VolumeRegister ───────────────────────────────────────────────────────────

#[test]
fn volume_register_full_volume_is_zero_attenuation() {
    use platform::audio_types::{VolumePercent, VolumeRegister};
    assert_eq!(VolumeRegister::from_volume(VolumePercent::MAX).get(), 0x0000);
}

#[test]
fn volume_register_mute_stops_short_of_power_down() {
    use platform::audio_types::{VolumePercent, VolumeRegister};
    // 0xFF in either byte powers the analog driver down; the encoding tops out at 0xFE.
    assert_eq!(VolumeRegister::from_volume(VolumePercent::MUTE).get(), 0xFEFE);
}

#[test]
fn volume_register_75_percent() {
    use platform::audio_types::{VolumePercent, VolumeRegister};
    // (100 - 75) * 254 / 100 = 63.5 → 63 = 0x3F per channel
    let reg = VolumeRegister::from_volume(VolumePercent::new(75));
    assert_eq!(reg.get(), 0x3F3F);
    assert_eq!(reg.left(), 0x3F);
    assert_eq!(reg.right(), 0x3F);
}

#[test]
fn volume_register_from_impl_matches_constructor() {
    use platform::audio_types::{VolumePercent, VolumeRegister};
    let v = VolumePercent::new(40);
    assert_eq!(VolumeRegister::from(v), VolumeRegister::from_volume(v));
}

#[test]
fn volume_register_is_two_bytes() {
    use platform::audio_types::VolumeRegister;
    assert_eq!(core::mem::size_of::<VolumeRegister>(), 2);
}

#[test]
fn out_of_range_error_display() {
    use platform::audio_types::VolumePercent;
    let err = VolumePercent::try_new(200).unwrap_err();
    assert_eq!(err.to_string(), "value 200 outside 0..=100");
}
