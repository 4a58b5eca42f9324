//! Multi-target scan of one function body.
//!
//! A single forward pass tests every [`LocationRule`] at each cursor position
//! and remembers the hit each rule keeps. Once the pass ends, the kept hits'
//! extractions turn them into record fields. Extractions run in order and may
//! read fields filled in by earlier ones, which is how the message descriptors
//! are found relative to the first one.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::descriptor::{CountedString, DESCRIPTOR_SIZE, contains_utf16};
use crate::error::{Error, Result};
use crate::memory::{Address, ReadMemory};
use crate::record::{RecordField, ResolutionRecord};
use crate::resolve::ScanBuffer;
use crate::resolve::displacement::{DISPLACEMENT_WIDTH, masked_target, relative_target};
use crate::signature::{Signature, match_signatures, max_window_len};

/// Turns a rule match into one or more record fields
///
/// Offsets are relative to the scan cursor, not the probe position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Extraction {
    /// Decode a rel32 field; at the end of the match when `dispOffset` is absent
    #[serde(rename_all = "camelCase")]
    Relative {
        field: RecordField,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        disp_offset: Option<usize>,
    },
    /// Same as `Relative` but decoded with [`masked_target`]
    #[serde(rename_all = "camelCase")]
    MaskedRelative {
        field: RecordField,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        disp_offset: Option<usize>,
    },
    /// A single byte of the instruction stream
    Byte { field: RecordField, offset: usize },
    /// Walk descriptor slots after an already resolved base for the first
    /// one whose text contains `needle`
    #[serde(rename_all = "camelCase")]
    DescriptorSearch {
        base_field: RecordField,
        field: RecordField,
        slots: usize,
        #[serde(default = "default_slot_size")]
        slot_size: usize,
        needle: String,
    },
}

fn default_slot_size() -> usize {
    DESCRIPTOR_SIZE
}

impl Extraction {
    /// Bytes past the cursor this extraction reads from the instruction stream
    fn reach(&self, match_end: usize) -> usize {
        let width = DISPLACEMENT_WIDTH as usize;
        match self {
            Self::Relative { disp_offset, .. } | Self::MaskedRelative { disp_offset, .. } => {
                disp_offset.unwrap_or(match_end) + width
            }
            Self::Byte { offset, .. } => offset + 1,
            Self::DescriptorSearch { .. } => 0,
        }
    }
}

/// One alternative encoding of a rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleCandidate {
    pub signature: Signature,
    pub extractions: Vec<Extraction>,
}

/// Which hit of a rule is kept when its signatures match more than once
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MatchPolicy {
    /// Stop testing the rule once it has matched
    First,
    /// Keep testing up to the sentinel; a later hit replaces an earlier one
    #[default]
    Last,
}

/// Named target of a location scan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationRule {
    pub name: String,
    /// Candidates are matched this many bytes after the cursor
    #[serde(default)]
    pub probe_offset: usize,
    #[serde(default)]
    pub policy: MatchPolicy,
    pub candidates: Vec<RuleCandidate>,
}

impl LocationRule {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            probe_offset: 0,
            policy: MatchPolicy::default(),
            candidates: Vec::new(),
        }
    }

    pub fn probe_offset(mut self, offset: usize) -> Self {
        self.probe_offset = offset;
        self
    }

    /// Keep the first hit instead of the last
    pub fn first_match(mut self) -> Self {
        self.policy = MatchPolicy::First;
        self
    }

    pub fn candidate(mut self, signature: Signature, extractions: Vec<Extraction>) -> Self {
        self.candidates.push(RuleCandidate {
            signature,
            extractions,
        });
        self
    }

    fn lookahead(&self) -> usize {
        self.candidates
            .iter()
            .map(|candidate| {
                let match_end = self.probe_offset + candidate.signature.window_len();
                candidate
                    .extractions
                    .iter()
                    .map(|extraction| extraction.reach(match_end))
                    .fold(match_end, usize::max)
            })
            .max()
            .unwrap_or(0)
    }

    fn signatures(&self) -> Vec<Signature> {
        self.candidates
            .iter()
            .map(|candidate| candidate.signature.clone())
            .collect()
    }
}

/// Where a rule matched
#[derive(Debug, Clone, Copy)]
struct Hit {
    offset: usize,
    candidate: usize,
    len: usize,
}

/// Scan from `start` to `sentinel` and extract every rule's kept hit
///
/// At most one rule matches per cursor position, tested in registration order.
/// Extractions run after the scan, rule by rule in registration order, so a
/// hit that is later replaced never reads memory. The scan ends early only when
/// every rule is [`MatchPolicy::First`] and has matched. Reaching the sentinel
/// with a rule still unmatched is `SignatureNotFound` for that rule.
pub fn scan_for_locations<R: ReadMemory + ?Sized>(
    reader: &R,
    start: Address,
    max_scan: usize,
    rules: &[LocationRule],
    sentinel: &Signature,
) -> Result<ResolutionRecord> {
    let rule_signatures: Vec<Vec<Signature>> = rules.iter().map(LocationRule::signatures).collect();
    let mut hits: Vec<Option<Hit>> = vec![None; rules.len()];
    let settled = |hits: &[Option<Hit>]| {
        rules
            .iter()
            .zip(hits)
            .all(|(rule, hit)| rule.policy == MatchPolicy::First && hit.is_some())
    };

    let lookahead = rules
        .iter()
        .map(LocationRule::lookahead)
        .max()
        .unwrap_or(0)
        .max(max_window_len([sentinel]));
    let buffer = ScanBuffer::read(reader, start, max_scan.saturating_add(lookahead))?;

    for offset in 0..max_scan {
        if settled(&hits) {
            debug!("  All {} rules matched by +0x{:X}", rules.len(), offset);
            return extract_hits(reader, &buffer, rules, &hits);
        }
        if offset >= buffer.len() {
            return Err(buffer.past_end(offset));
        }

        let hit = rules.iter().enumerate().find_map(|(index, rule)| {
            if rule.policy == MatchPolicy::First && hits[index].is_some() {
                return None;
            }
            let window = buffer.window(offset + rule.probe_offset);
            match_signatures(window, &rule_signatures[index]).map(|found| (index, found))
        });

        if let Some((index, found)) = hit {
            let rule = &rules[index];
            debug!(
                "  Rule '{}' matched '{}' at {}",
                rule.name,
                rule.candidates[found.index].signature.name(),
                buffer.address(offset)
            );
            if let Some(previous) = hits[index] {
                debug!("    replacing the hit at {}", buffer.address(previous.offset));
            }
            hits[index] = Some(Hit {
                offset,
                candidate: found.index,
                len: found.len,
            });
            continue;
        }

        if sentinel.match_window(buffer.window(offset)).is_some() {
            debug!("  Reached '{}' at {}", sentinel.name(), buffer.address(offset));
            if let Some(index) = hits.iter().position(Option::is_none) {
                return Err(Error::SignatureNotFound {
                    name: rules[index].name.clone(),
                    scanned: offset,
                });
            }
            return extract_hits(reader, &buffer, rules, &hits);
        }
    }

    if settled(&hits) {
        return extract_hits(reader, &buffer, rules, &hits);
    }
    Err(Error::ScanBoundsExceeded {
        name: sentinel.name().to_string(),
        max_scan,
    })
}

fn extract_hits<R: ReadMemory + ?Sized>(
    reader: &R,
    buffer: &ScanBuffer,
    rules: &[LocationRule],
    hits: &[Option<Hit>],
) -> Result<ResolutionRecord> {
    let mut record = ResolutionRecord::new();
    for (rule, hit) in rules.iter().zip(hits) {
        let Some(hit) = hit else {
            continue;
        };
        let match_end = rule.probe_offset + hit.len;
        for extraction in &rule.candidates[hit.candidate].extractions {
            extract(reader, buffer, hit.offset, match_end, extraction, &mut record)?;
        }
    }
    Ok(record)
}

fn extract<R: ReadMemory + ?Sized>(
    reader: &R,
    buffer: &ScanBuffer,
    cursor: usize,
    match_end: usize,
    extraction: &Extraction,
    record: &mut ResolutionRecord,
) -> Result<()> {
    match extraction {
        Extraction::Relative { field, disp_offset } => {
            let at = cursor + disp_offset.unwrap_or(match_end);
            let target = relative_target(buffer.address(at), buffer.i32_at(at)?);
            debug!("    {} = {}", field, target);
            record.set_address(*field, target);
        }
        Extraction::MaskedRelative { field, disp_offset } => {
            let at = cursor + disp_offset.unwrap_or(match_end);
            let target = masked_target(buffer.address(at), buffer.i32_at(at)?);
            debug!("    {} = {} (masked)", field, target);
            record.set_address(*field, target);
        }
        Extraction::Byte { field, offset } => {
            let value = buffer.u8_at(cursor + offset)?;
            debug!("    {} = 0x{:X}", field, value);
            record.set_scalar(*field, value as u64);
        }
        Extraction::DescriptorSearch {
            base_field,
            field,
            slots,
            slot_size,
            needle,
        } => {
            let base = record.address(*base_field)?;
            let found = search_descriptors(reader, base, *slots, *slot_size, needle)?;
            debug!("    {} = {}", field, found);
            record.set_address(*field, found);
        }
    }
    Ok(())
}

/// First of `slots` descriptors at `base` whose text contains `needle`
///
/// Slots with an unreadable buffer are skipped.
pub fn search_descriptors<R: ReadMemory + ?Sized>(
    reader: &R,
    base: Address,
    slots: usize,
    slot_size: usize,
    needle: &str,
) -> Result<Address> {
    let mut matches = (0..slots)
        .map(|slot| base.add((slot * slot_size) as u64))
        .filter(|address| match CountedString::read(reader, *address) {
            Ok(descriptor) => match descriptor.text_bytes(reader) {
                Ok(text) => contains_utf16(&text, needle),
                Err(e) => {
                    debug!("    Skipping descriptor at {}: {}", address, e);
                    false
                }
            },
            Err(e) => {
                debug!("    Skipping descriptor at {}: {}", address, e);
                false
            }
        });

    let first = matches.next().ok_or_else(|| Error::SignatureNotFound {
        name: format!("descriptor containing '{}'", needle),
        scanned: slots * slot_size,
    })?;
    if let Some(other) = matches.next() {
        warn!(
            "Descriptors at {} and {} both contain '{}'; using the first",
            first, other, needle
        );
    }
    Ok(first)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::encode_utf16le;
    use crate::descriptor::fixture::descriptor_bytes;
    use crate::memory::{Protection, RegionSpace};

    const CODE: u64 = 0x1_4000_1000;
    const DATA: u64 = 0x1_4010_0000;
    const STRINGS: u64 = 0x1_4020_0000;

    const SENTINEL: [u8; 8] = [0x41, 0x5F, 0x41, 0x5E, 0x41, 0x5D, 0x41, 0x5C];

    fn sentinel() -> Signature {
        Signature::bytes("popRegs", "41 5F 41 5E 41 5D 41 5C").unwrap()
    }

    /// Eight descriptors at DATA, each pointing at its own text in STRINGS
    fn descriptor_space(texts: &[&str], code: Vec<u8>) -> RegionSpace {
        let mut data = Vec::new();
        let mut strings = Vec::new();
        for text in texts {
            let encoded = encode_utf16le(text);
            let buffer = STRINGS + strings.len() as u64;
            data.extend_from_slice(&descriptor_bytes(
                encoded.len() as u16,
                encoded.len() as u16 + 2,
                buffer,
            ));
            strings.extend_from_slice(&encoded);
            strings.extend_from_slice(&[0, 0]);
        }
        RegionSpace::builder()
            .bytes(CODE, code, Protection::ExecuteRead)
            .bytes(DATA, data, Protection::ReadOnly)
            .bytes(STRINGS, strings, Protection::ReadOnly)
            .build()
            .unwrap()
    }

    fn slot_texts() -> Vec<&'static str> {
        vec![
            "Your device ran into a problem.",
            "If you call a support person, give them this info:",
            "We're just collecting some error info, and then we'll restart for you.",
            "We're just collecting some error info, and then you can restart.",
            "You can restart.",
            "% complete",
            "What failed:",
            "Stop code:",
        ]
    }

    #[test]
    fn test_descriptor_search_over_eight_slots() {
        let space = descriptor_space(&slot_texts(), vec![0xCC; 0x40]);
        let found =
            search_descriptors(&space, Address::new(DATA), 8, 16, "and then we'll restart for you")
                .unwrap();
        assert_eq!(found, Address::new(DATA + 2 * 16));
    }

    #[test]
    fn test_descriptor_search_without_hit() {
        let space = descriptor_space(&slot_texts(), vec![0xCC; 0x40]);
        let err = search_descriptors(&space, Address::new(DATA), 8, 16, "please release the power")
            .unwrap_err();
        assert!(matches!(err, Error::SignatureNotFound { .. }));
    }

    #[test]
    fn test_string_rule_fills_field_from_earlier_extraction() {
        // lea r10, [rip + disp] pointing at the descriptor array
        let mut code = vec![0x90u8; 0x40];
        let lea_field = CODE + 0x10 + 3;
        let disp = (DATA as i64 - (lea_field as i64 + 4)) as i32;
        code[0x10..0x13].copy_from_slice(&[0x4C, 0x8D, 0x15]);
        code[0x13..0x17].copy_from_slice(&disp.to_le_bytes());
        code[0x20..0x28].copy_from_slice(&SENTINEL);
        let space = descriptor_space(&slot_texts(), code);

        let rule = LocationRule::new("messages").candidate(
            Signature::bytes("leaR10", "4C 8D 15").unwrap(),
            vec![
                Extraction::Relative {
                    field: RecordField::MessageSlotOne,
                    disp_offset: None,
                },
                Extraction::DescriptorSearch {
                    base_field: RecordField::MessageSlotOne,
                    field: RecordField::MessageSlotTwo,
                    slots: 8,
                    slot_size: 16,
                    needle: "and then we'll restart for you".to_string(),
                },
            ],
        );

        let record =
            scan_for_locations(&space, Address::new(CODE), 0x100, &[rule], &sentinel()).unwrap();
        assert_eq!(record.address(RecordField::MessageSlotOne).unwrap(), Address::new(DATA));
        assert_eq!(
            record.address(RecordField::MessageSlotTwo).unwrap(),
            Address::new(DATA + 32)
        );
    }

    #[test]
    fn test_probe_offset_and_byte_extraction() {
        // lea rcx, [rip + 0x100]; ...; mov edi, 1C8h at cursor+7; offset byte at cursor+0x12
        let mut code = vec![0x90u8; 0x60];
        code[0x08..0x0F].copy_from_slice(&[0x48, 0x8D, 0x0D, 0x00, 0x01, 0x00, 0x00]);
        code[0x0F..0x14].copy_from_slice(&[0xBF, 0xC8, 0x01, 0x00, 0x00]);
        code[0x1A] = 0x20;
        code[0x30..0x35].copy_from_slice(&[0xEB, 0x03, 0x8B, 0x48, 0x28]);
        code[0x50..0x58].copy_from_slice(&SENTINEL);

        let rules = [
            LocationRule::new("lastBranch").probe_offset(7).candidate(
                Signature::bytes("movEdi1C8", "BF C8 01 00 00").unwrap(),
                vec![
                    Extraction::Relative {
                        field: RecordField::LastBranchRecordBase,
                        disp_offset: Some(3),
                    },
                    Extraction::Byte {
                        field: RecordField::FirstLevelOffset,
                        offset: 0x12,
                    },
                ],
            ),
            LocationRule::new("colourOffset").candidate(
                Signature::bytes("movEcxRax28", "EB 03 8B 48 28").unwrap(),
                vec![Extraction::Byte {
                    field: RecordField::SecondLevelOffset,
                    offset: 4,
                }],
            ),
        ];

        let space = RegionSpace::builder()
            .bytes(CODE, code, Protection::ExecuteRead)
            .build()
            .unwrap();
        let record =
            scan_for_locations(&space, Address::new(CODE), 0x58, &rules, &sentinel()).unwrap();

        assert_eq!(
            record.address(RecordField::LastBranchRecordBase).unwrap(),
            Address::new(CODE + 0x0F + 0x100)
        );
        assert_eq!(record.scalar(RecordField::FirstLevelOffset).unwrap(), 0x20);
        assert_eq!(record.scalar(RecordField::SecondLevelOffset).unwrap(), 0x28);
    }

    #[test]
    fn test_masked_variant_decodes_with_mask() {
        let mut code = vec![0x90u8; 0x40];
        code[0x04..0x0E]
            .copy_from_slice(&[0x41, 0x8B, 0x54, 0xF7, 0x0C, 0x44, 0x8B, 0xCB, 0x48, 0x8D]);
        code[0x0E] = 0x0D;
        code[0x0F..0x13].copy_from_slice(&0x40i32.to_le_bytes());
        code[0x20..0x28].copy_from_slice(&SENTINEL);

        let rule = LocationRule::new("sadFace")
            .candidate(
                Signature::bytes("sadFace2004", "41 8B 54 F7 0C 44 8B CB 48 8D").unwrap(),
                vec![Extraction::MaskedRelative {
                    field: RecordField::ConfigHandlerTable,
                    disp_offset: Some(11),
                }],
            )
            .candidate(
                Signature::bytes("sadFace1909", "41 8B 54 F4 0C 44 8B CB 48 8D").unwrap(),
                vec![Extraction::Relative {
                    field: RecordField::ConfigHandlerTable,
                    disp_offset: Some(11),
                }],
            );

        let space = RegionSpace::builder()
            .bytes(CODE, code, Protection::ExecuteRead)
            .build()
            .unwrap();
        let record =
            scan_for_locations(&space, Address::new(CODE), 0x30, &[rule], &sentinel()).unwrap();

        let field = Address::new(CODE + 0x0F);
        assert_eq!(
            record.address(RecordField::ConfigHandlerTable).unwrap(),
            masked_target(field, 0x40)
        );
    }

    #[test]
    fn test_unfired_rule_at_sentinel_is_not_found() {
        let mut code = vec![0x90u8; 0x40];
        code[0x20..0x28].copy_from_slice(&SENTINEL);
        let rule = LocationRule::new("colourOffset").candidate(
            Signature::bytes("movEcxRax28", "EB 03 8B 48 28").unwrap(),
            vec![Extraction::Byte {
                field: RecordField::SecondLevelOffset,
                offset: 4,
            }],
        );
        let space = RegionSpace::builder()
            .bytes(CODE, code, Protection::ExecuteRead)
            .build()
            .unwrap();

        let err = scan_for_locations(&space, Address::new(CODE), 0x38, &[rule], &sentinel())
            .unwrap_err();
        match err {
            Error::SignatureNotFound { name, scanned } => {
                assert_eq!(name, "colourOffset");
                assert_eq!(scanned, 0x20);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    /// `lea r10, [rip + disp]` at `at` reaching `target`
    fn emit_lea_r10(code: &mut [u8], at: usize, target: u64) {
        let field = CODE + at as u64 + 3;
        let disp = (target as i64 - (field as i64 + 4)) as i32;
        code[at..at + 3].copy_from_slice(&[0x4C, 0x8D, 0x15]);
        code[at + 3..at + 7].copy_from_slice(&disp.to_le_bytes());
    }

    fn messages_rule() -> LocationRule {
        LocationRule::new("messages").candidate(
            Signature::bytes("leaR10", "4C 8D 15").unwrap(),
            vec![
                Extraction::Relative {
                    field: RecordField::MessageSlotOne,
                    disp_offset: None,
                },
                Extraction::DescriptorSearch {
                    base_field: RecordField::MessageSlotOne,
                    field: RecordField::MessageSlotTwo,
                    slots: 8,
                    slot_size: 16,
                    needle: "and then we'll restart for you".to_string(),
                },
            ],
        )
    }

    #[test]
    fn test_later_hit_replaces_earlier_one() {
        let mut code = vec![0x90u8; 0x40];
        emit_lea_r10(&mut code, 0x08, DATA + 16);
        emit_lea_r10(&mut code, 0x10, DATA);
        code[0x20..0x28].copy_from_slice(&SENTINEL);
        let space = descriptor_space(&slot_texts(), code);

        let rules = [messages_rule()];
        let record =
            scan_for_locations(&space, Address::new(CODE), 0x100, &rules, &sentinel()).unwrap();
        assert_eq!(record.address(RecordField::MessageSlotOne).unwrap(), Address::new(DATA));
        assert_eq!(
            record.address(RecordField::MessageSlotTwo).unwrap(),
            Address::new(DATA + 32)
        );
    }

    #[test]
    fn test_first_match_policy_keeps_earlier_hit() {
        let mut code = vec![0x90u8; 0x40];
        emit_lea_r10(&mut code, 0x08, DATA + 16);
        emit_lea_r10(&mut code, 0x10, DATA);
        let space = descriptor_space(&slot_texts(), code);

        // Every rule keeps its first hit, so the scan ends without a sentinel
        let rule = messages_rule().first_match();
        let record =
            scan_for_locations(&space, Address::new(CODE), 0x30, &[rule], &sentinel()).unwrap();
        assert_eq!(
            record.address(RecordField::MessageSlotOne).unwrap(),
            Address::new(DATA + 16)
        );
    }

    #[test]
    fn test_replaced_hit_is_never_extracted() {
        // The first hit points at unmapped memory; only the kept one is searched
        let mut code = vec![0x90u8; 0x40];
        emit_lea_r10(&mut code, 0x08, CODE + 0x1000_0000);
        emit_lea_r10(&mut code, 0x10, DATA);
        code[0x20..0x28].copy_from_slice(&SENTINEL);
        let space = descriptor_space(&slot_texts(), code);

        let rules = [messages_rule()];
        let record =
            scan_for_locations(&space, Address::new(CODE), 0x100, &rules, &sentinel()).unwrap();
        assert_eq!(
            record.address(RecordField::MessageSlotTwo).unwrap(),
            Address::new(DATA + 32)
        );
    }

    #[test]
    fn test_scan_bound_without_sentinel() {
        let space = RegionSpace::builder()
            .bytes(CODE, vec![0x90u8; 0x100], Protection::ExecuteRead)
            .build()
            .unwrap();

        let rules = [messages_rule()];
        let err =
            scan_for_locations(&space, Address::new(CODE), 0x40, &rules, &sentinel()).unwrap_err();
        match err {
            Error::ScanBoundsExceeded { name, max_scan } => {
                assert_eq!(name, "popRegs");
                assert_eq!(max_scan, 0x40);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_matched_last_policy_rule_still_needs_sentinel() {
        let mut code = vec![0x90u8; 0x100];
        emit_lea_r10(&mut code, 0x08, DATA);
        let space = descriptor_space(&slot_texts(), code);

        let rules = [messages_rule()];
        let err =
            scan_for_locations(&space, Address::new(CODE), 0x40, &rules, &sentinel()).unwrap_err();
        assert!(matches!(err, Error::ScanBoundsExceeded { max_scan: 0x40, .. }));
    }

    #[test]
    fn test_rule_json_shape() {
        let json = r#"{
            "name": "sadFace",
            "candidates": [{
                "signature": {"name": "sadFace2004", "pattern": "41 8B 54 F7 0C 44 8B CB 48 8D"},
                "extractions": [{"kind": "maskedRelative", "field": "configHandlerTable", "dispOffset": 11}]
            }]
        }"#;
        let rule: LocationRule = serde_json::from_str(json).unwrap();
        assert_eq!(rule.probe_offset, 0);
        assert_eq!(rule.policy, MatchPolicy::Last);
        assert_eq!(
            rule.candidates[0].extractions[0],
            Extraction::MaskedRelative {
                field: RecordField::ConfigHandlerTable,
                disp_offset: Some(11),
            }
        );
    }
}
