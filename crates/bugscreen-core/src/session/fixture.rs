//! Synthetic kernel laid out the way the built-in profile expects.

use std::collections::BTreeMap;

use crate::descriptor::encode_utf16le;
use crate::descriptor::fixture::descriptor_bytes;
use crate::memory::{Address, Protection, RegionSpace};

/// Sad-face descriptor and text, below the code so the masked reference is negative
pub const FACE: u64 = 0x1_4000_0000;
pub const TEXT: u64 = 0x1_4000_1000;
pub const RDATA: u64 = 0x1_4000_3000;
pub const DATA: u64 = 0x1_4000_6000;

pub const KE_BUG_CHECK_EX: u64 = TEXT;
pub const KE_BUG_CHECK_2: u64 = TEXT + 0x100;
pub const KI_DISPLAY_BLUE_SCREEN: u64 = TEXT + 0x200;
pub const BGP_FW_DISPLAY: u64 = TEXT + 0x300;

pub const FACE_DESCRIPTOR: u64 = FACE + 0x800;
/// Whatever follows the `:(` text
pub const FACE_NEIGHBOUR: u64 = FACE + 0x906;
pub const NEIGHBOUR_MARKER: [u8; 4] = [0xAB; 4];
pub const MESSAGES: u64 = RDATA;
pub const LAST_BRANCH: u64 = DATA;
pub const FIRST_LEVEL_OFFSET: u8 = 0x20;
pub const SECOND_LEVEL_OFFSET: u8 = 0x28;
pub const COLOUR: u64 = DATA + 0x200 + SECOND_LEVEL_OFFSET as u64;
pub const ORIGINAL_COLOUR: u32 = 0xFF00_78D7;

pub const MESSAGE_TEXTS: [&str; 16] = [
    "Your device ran into a problem and needs to restart.",
    "If you call a support person, give them this info:",
    "We're just collecting some error info, and then we'll restart for you.",
    "We're just collecting some error info, and then you can restart.",
    "We'll restart for you.",
    "You can restart.",
    "",
    "% complete",
    "",
    "% complete",
    "What failed:",
    "Stop code:",
    "For more information about this issue and possible fixes, visit",
    "https://www.windows.com/stopcode",
    "Your Windows Insider Build ran into a problem and needs to restart.",
    "Please release the power button.",
];

const STRINGS: usize = 0x200;
const STRING_SLOT: usize = 0x100;

pub struct SyntheticKernel {
    pub space: RegionSpace,
    pub anchors: BTreeMap<String, Address>,
}

/// Put `prefix` at `at` followed by a rel32 reaching `target`
fn emit_relative(code: &mut [u8], at: usize, prefix: &[u8], target: u64) {
    let field = at + prefix.len();
    code[at..field].copy_from_slice(prefix);
    let end = TEXT as i64 + field as i64 + 4;
    let displacement = (target as i64 - end) as i32;
    code[field..field + 4].copy_from_slice(&displacement.to_le_bytes());
}

fn emit(code: &mut [u8], at: usize, bytes: &[u8]) {
    code[at..at + bytes.len()].copy_from_slice(bytes);
}

fn text_section() -> Vec<u8> {
    let mut code = vec![0xCCu8; 0x1000];

    // KeBugCheckEx -> KeBugCheck2
    emit_relative(
        &mut code,
        0x10,
        &[0x45, 0x33, 0xC9, 0x45, 0x33, 0xC0, 0x33, 0xD2, 0xE8],
        KE_BUG_CHECK_2,
    );
    emit(&mut code, 0x30, &[0x90, 0xC3, 0xCC, 0xCC, 0xCC, 0xCC]);

    // KeBugCheck2 -> KiDisplayBlueScreen
    emit_relative(
        &mut code,
        0x120,
        &[0x0F, 0x45, 0xC1, 0x8B, 0xC8, 0x83, 0xC9, 0x01, 0x45, 0x84, 0xF6, 0x0F, 0x45, 0xC8, 0xE8],
        KI_DISPLAY_BLUE_SCREEN,
    );
    emit(&mut code, 0x160, &[0x5F, 0x5E, 0x5D, 0xC3]);

    // KiDisplayBlueScreen -> BgpFwDisplayBugCheckScreen (1909 layout)
    emit_relative(
        &mut code,
        0x208,
        &[0x4C, 0x8B, 0xC3, 0x49, 0x8B, 0xD7, 0x41, 0x8B, 0xCE, 0xE8],
        BGP_FW_DISPLAY,
    );
    emit(&mut code, 0x240, &[0x41, 0x5D, 0x41, 0x5C, 0x5D, 0xC3]);

    // BgpFwDisplayBugCheckScreen body
    emit_relative(&mut code, 0x310, &[0x4C, 0x8D, 0x15], MESSAGES);

    emit_relative(&mut code, 0x330, &[0x48, 0x8D, 0x0D], LAST_BRANCH);
    emit(&mut code, 0x337, &[0xBF, 0xC8, 0x01, 0x00, 0x00]);
    emit(&mut code, 0x33C, &[0x48, 0x8B, 0x04, 0xC8, 0x48, 0x8B]);
    code[0x342] = FIRST_LEVEL_OFFSET;

    emit(&mut code, 0x360, &[0xEB, 0x03, 0x8B, 0x48, SECOND_LEVEL_OFFSET]);

    // mov edx, [r15+rsi*8+0Ch]; mov r9d, ebx; lea rcx, [rip+disp] (2004 layout)
    emit_relative(
        &mut code,
        0x380,
        &[0x41, 0x8B, 0x54, 0xF7, 0x0C, 0x44, 0x8B, 0xCB, 0x48, 0x8D, 0x0D],
        FACE_DESCRIPTOR,
    );

    emit(&mut code, 0x3C0, &[0x41, 0x5F, 0x41, 0x5E, 0x41, 0x5D, 0x41, 0x5C]);
    code
}

fn face_section() -> Vec<u8> {
    let mut data = vec![0u8; 0x1000];
    let text = encode_utf16le(":(");
    let buffer = FACE + 0x900;
    emit(
        &mut data,
        0x800,
        &descriptor_bytes(text.len() as u16, text.len() as u16 + 2, buffer),
    );
    emit(&mut data, 0x900, &text);
    emit(&mut data, (FACE_NEIGHBOUR - FACE) as usize, &NEIGHBOUR_MARKER);
    data
}

fn rdata_section() -> Vec<u8> {
    let mut data = vec![0u8; 0x2000];
    for (slot, message) in MESSAGE_TEXTS.iter().enumerate() {
        let text = encode_utf16le(message);
        let offset = STRINGS + slot * STRING_SLOT;
        emit(
            &mut data,
            slot * 16,
            &descriptor_bytes(text.len() as u16, text.len() as u16 + 2, RDATA + offset as u64),
        );
        emit(&mut data, offset, &text);
    }
    data
}

fn data_section() -> Vec<u8> {
    let mut data = vec![0u8; 0x1000];
    let object = DATA + 0x100;
    let colours = DATA + 0x200;
    emit(&mut data, 0, &object.to_le_bytes());
    emit(&mut data, 0x100 + FIRST_LEVEL_OFFSET as usize, &colours.to_le_bytes());
    emit(
        &mut data,
        0x200 + SECOND_LEVEL_OFFSET as usize,
        &ORIGINAL_COLOUR.to_le_bytes(),
    );
    data
}

/// Build the kernel, letting the caller tamper with the code first
pub fn synthetic_kernel_with(tamper: impl FnOnce(&mut Vec<u8>)) -> SyntheticKernel {
    let mut code = text_section();
    tamper(&mut code);

    let space = RegionSpace::builder()
        .bytes(FACE, face_section(), Protection::ReadOnly)
        .bytes(TEXT, code, Protection::ExecuteRead)
        .bytes(RDATA, rdata_section(), Protection::ReadOnly)
        .bytes(DATA, data_section(), Protection::ReadWrite)
        .build()
        .expect("fixture regions do not overlap");

    let anchors = [("KeBugCheckEx".to_string(), Address::new(KE_BUG_CHECK_EX))]
        .into_iter()
        .collect();

    SyntheticKernel { space, anchors }
}

pub fn synthetic_kernel() -> SyntheticKernel {
    synthetic_kernel_with(|_| {})
}
