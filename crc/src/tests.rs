use super::*;

#[test]
fn crc16_x25_self_test_passes() {
    crc16_x25().self_test().unwrap();
}

#[test]
fn crc32_castagnoli_self_test_passes() {
    crc32_castagnoli().self_test().unwrap();
}

#[test]
fn crc16_matches_check_value_directly() {
    let p = crc16_x25();
    assert_eq!(p.crc_get(b"123456789") as u64, p.descriptor().check_value);
}

#[test]
fn crc32_matches_check_value_directly() {
    let p = crc32_castagnoli();
    assert_eq!(p.crc_get(b"123456789") as u64, p.descriptor().check_value);
}

#[test]
fn single_bit_flip_changes_crc() {
    let p = crc32_castagnoli();
    let a = p.crc_get(b"hello world");
    let b = p.crc_get(b"hello worle");
    assert_ne!(a, b);
}

#[test]
fn empty_input_is_just_init_xor_final() {
    let p = crc16_x25();
    // With reflect_input == reflect_output, an empty fold leaves the
    // register at its initial value before the final XOR.
    let expected = (p.descriptor().initial_value ^ p.descriptor().final_xor) as u32;
    assert_eq!(p.crc_get(b""), expected);
}

#[test]
fn non_reflected_table_path_matches_ccitt_false() {
    // CRC-16/CCITT-FALSE exercises the non-reflected (MSB-first) table path,
    // which neither built-in descriptor above reaches.
    let p = CrcParams::new(Descriptor {
        name: "CRC-16/CCITT-FALSE",
        width: Width::Crc16,
        generator_polynomial: 0x1021,
        initial_value: 0xFFFF,
        final_xor: 0x0000,
        reflect_input: false,
        reflect_output: false,
        check_value: 0x29B1,
    })
    .unwrap();
    p.self_test().unwrap();
}
