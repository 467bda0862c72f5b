mod common;

use common::Access;
use flatbed_drivers::asic;
use flatbed_drivers::registers;

#[test]
fn upload_configuration_applies_baseline_and_defaults() -> Result<(), asic::Error> {
    let stub = common::Stub::new();
    let asic = asic::Asic::new(stub.clone())?;
    let writes = common::register_writes(&stub.log());
    assert_eq!(&writes[..registers::BASELINE.len()], &registers::BASELINE[..]);
    assert_eq!(
        writes[registers::BASELINE.len()],
        (registers::slot::CLOCK as u8, registers::CLOCK_VALUE)
    );
    assert_eq!(
        &writes[registers::BASELINE.len() + 1..registers::BASELINE.len() + 4],
        &registers::ANALOG_PATH_DEFAULT[..]
    );
    assert_eq!(
        &writes[registers::BASELINE.len() + 4..],
        &[(0x31, 0x80), (0x0C, 0x00)]
    );
    assert_eq!(asic.adc_bit_depth(), asic::AdcBitDepth::TenBits);
    assert_eq!(asic.registers().layout(), registers::Layout::Direct);
    assert_eq!(asic.exposure_level(), 10000);
    Ok(())
}

#[test]
fn feature_presets_follow_the_hardware_byte() -> Result<(), asic::Error> {
    let stub = common::Stub::new().with(|inner| inner.features = 0x18 | 0x04);
    let asic = asic::Asic::new(stub.clone())?;
    let writes = common::register_writes(&stub.log());
    let presets = &writes[registers::BASELINE.len() + 1..];
    assert_eq!(&presets[..4], &registers::FRONT_END_WM8142[..]);
    assert_eq!(&presets[4..7], &registers::ANALOG_PATH_WM8142[..]);
    assert_eq!(asic.adc_bit_depth(), asic::AdcBitDepth::TwelveBits);
    assert_eq!(asic.features(), 0x1C);
    Ok(())
}

/// Register writes after the baseline and the clock value.
fn presets(features: u8) -> Result<Vec<(u8, u8)>, asic::Error> {
    let stub = common::Stub::new().with(|inner| inner.features = features);
    asic::Asic::new(stub.clone())?;
    Ok(common::register_writes(&stub.log())[registers::BASELINE.len() + 1..].to_vec())
}

#[test]
fn analog_path_field_selects_its_preset() -> Result<(), asic::Error> {
    let tail = [(0x31, 0x80), (0x0C, 0x00)];
    assert_eq!(presets(0x01)?, tail.to_vec());
    assert_eq!(presets(0x03)?, tail.to_vec());
    assert_eq!(
        presets(0x02)?,
        [&registers::ANALOG_PATH_WM8142[..], &tail[..]].concat()
    );
    Ok(())
}

#[test]
fn front_end_bit_alone_selects_the_wm8144_preset() -> Result<(), asic::Error> {
    assert_eq!(
        presets(0x08)?,
        [
            &registers::FRONT_END_WM8144[..],
            &registers::ANALOG_PATH_DEFAULT[..],
            &[(0x31, 0x80), (0x0C, 0x00)][..],
        ]
        .concat()
    );
    Ok(())
}

#[test]
fn unsupported_revision_is_rejected() {
    let stub = common::Stub::new().with(|inner| inner.revision = 0xA1);
    match asic::Asic::new(stub.clone()) {
        Err(asic::Error::Revision(revision)) => assert_eq!(revision, registers::Revision::LEGACY),
        Err(error) => panic!("unexpected error {error}"),
        Ok(_) => panic!("the legacy revision must be rejected"),
    }
    assert!(common::register_writes(&stub.log()).is_empty());
}

#[test]
fn write_register_sends_address_then_value() -> Result<(), asic::Error> {
    let stub = common::Stub::new();
    let mut asic = common::asic(&stub);
    stub.clear_log();
    asic.write_register(0x20, 0x5A)?;
    assert_eq!(
        stub.log(),
        vec![
            Access::Write(common::write_address(asic::channel::ADDRESS), 0x20),
            Access::Write(common::write_address(asic::channel::VALUE), 0x5A),
        ]
    );
    assert_eq!(asic.registers().value(0x20), 0x5A);

    // unmapped addresses still reach the bus
    stub.clear_log();
    asic.write_register(0x80, 0x01)?;
    assert_eq!(stub.log_len(), 2);
    assert_eq!(asic.registers().slot_of(0x80), None);
    Ok(())
}

#[test]
fn striped_layout_interleaves_four_bases() {
    let map = registers::RegisterMap::new(registers::Layout::Striped);
    assert_eq!(map.slot_of(0x10), Some(0));
    assert_eq!(map.slot_of(0x20), Some(1));
    assert_eq!(map.slot_of(0x40), Some(2));
    assert_eq!(map.slot_of(0x80), Some(3));
    assert_eq!(map.slot_of(0x11), Some(4));
    assert_eq!(map.slot_of(0x8F), Some(63));
    assert_eq!(map.slot_of(0x00), None);
    for (slot, register) in map.iter().enumerate() {
        assert_eq!(map.slot_of(register.address), Some(slot));
    }
}

#[test]
fn apply_register_set_is_idempotent() -> Result<(), asic::Error> {
    let stub = common::Stub::new();
    let mut asic = common::asic(&stub);
    asic.apply_register_set(&registers::BASELINE)?;
    let once: Vec<registers::Register> = asic.registers().iter().copied().collect();
    asic.apply_register_set(&registers::BASELINE)?;
    let twice: Vec<registers::Register> = asic.registers().iter().copied().collect();
    assert_eq!(once, twice);
    Ok(())
}

#[test]
fn pulses_write_twice() -> Result<(), asic::Error> {
    let stub = common::Stub::new();
    let mut asic = common::asic(&stub);

    stub.clear_log();
    asic.send_serial_clock()?;
    assert_eq!(common::register_writes(&stub.log()), vec![(0x31, 0xC0), (0x31, 0x80)]);

    stub.clear_log();
    asic.send_serial_clock()?;
    assert_eq!(stub.log_len(), 4);

    stub.clear_log();
    asic.reset_fifo()?;
    assert_eq!(common::register_writes(&stub.log()), vec![(0x01, 0xA8), (0x01, 0x28)]);
    Ok(())
}

#[test]
fn multi_byte_setters_keep_their_field_order() -> Result<(), asic::Error> {
    let stub = common::Stub::new();
    let mut asic = common::asic(&stub);

    stub.clear_log();
    asic.set_speed_counter(0x1234)?;
    assert_eq!(common::register_writes(&stub.log()), vec![(25, 0x12), (24, 0x34)]);

    stub.clear_log();
    asic.set_byte_count(5300)?;
    assert_eq!(common::register_writes(&stub.log()), vec![(22, 0xB4), (23, 0x14)]);

    stub.clear_log();
    asic.set_lower_memory_limit(0x030201)?;
    assert_eq!(common::register_writes(&stub.log()), vec![(59, 1), (60, 2), (61, 3)]);

    stub.clear_log();
    asic.set_black_level(0x0102, 0x0304, 5)?;
    assert_eq!(
        common::register_writes(&stub.log()),
        vec![(51, 1), (50, 2), (53, 3), (52, 4), (63, 5)]
    );

    stub.clear_log();
    asic.set_exposure_level(0x0A0B)?;
    assert_eq!(
        common::register_writes(&stub.log()),
        vec![(6, 0x0B), (7, 0x0A), (8, 0x0B), (9, 0x0A), (10, 0x0B), (11, 0x0A)]
    );
    assert_eq!(asic.exposure_level(), 0x0A0B);
    Ok(())
}

#[test]
fn control_flags_share_one_register() -> Result<(), asic::Error> {
    let stub = common::Stub::new();
    let mut asic = common::asic(&stub);
    asic.set_ccd_mode(true)?;
    asic.set_dma(true)?;
    asic.set_lamp(false)?;
    assert_eq!(asic.registers().value(registers::slot::CONTROL), 0x1A);
    asic.set_text_mode(true)?;
    asic.set_text_mode(false)?;
    asic.set_lamp(true)?;
    asic.set_ccd_mode(false)?;
    assert_eq!(asic.registers().value(registers::slot::CONTROL), 0x08);
    Ok(())
}

#[test]
fn channel_masks_are_distinct() -> Result<(), asic::Error> {
    let stub = common::Stub::new();
    let mut asic = common::asic(&stub);

    asic.enable_channel(asic::Channel::Green)?;
    assert_eq!(asic.registers().value(registers::slot::CHANNEL_ENABLE), 0b101);
    asic.enable_channel(asic::Channel::All)?;
    assert_eq!(asic.registers().value(registers::slot::CHANNEL_ENABLE), 0b000);

    stub.clear_log();
    asic.send_channel_data(asic::Channel::Green)?;
    asic.send_channel_data(asic::Channel::All)?;
    asic.set_move(true)?;
    assert_eq!(
        common::writes_to(&stub.log(), asic::channel::MOTOR),
        vec![0x04, 0x0E, 0x01]
    );

    asic.set_digital_offset(asic::Channel::Blue, 12)?;
    assert_eq!(asic.registers().value(registers::slot::DIGITAL_OFFSET[2]), 12);
    assert!(matches!(
        asic.set_digital_offset(asic::Channel::All, 12),
        Err(asic::Error::Channel { .. })
    ));
    Ok(())
}

#[test]
fn home_sensor_and_acquisition_read_their_channels() -> Result<(), asic::Error> {
    let stub = common::Stub::new().with(|inner| {
        inner.home_readings.extend([false, true]);
    });
    let mut asic = common::asic(&stub);
    assert!(!asic.is_at_home_position()?);
    assert!(asic.is_at_home_position()?);
    let mut line = vec![0u8; 16];
    asic.acquire_line(&mut line)?;
    assert_eq!(line[5], common::pixel(0, 5));
    assert_eq!(
        stub.log().last(),
        Some(&Access::ReadBlock(common::read_address(asic::channel::ACQUISITION), 16))
    );
    Ok(())
}
