use cassette::sans::{
    base::{Architecture, BaseType},
    check::{Checksum, compute_crc},
    data::Field,
    header::{RecordHeader, RecordKind},
    timestamp::{MissingReference, RollingTimestamp},
    value::{DecodingStrategy, Number, Resolution, is_invalid},
};
use proptest::prelude::*;

const ARCHITECTURES: [Architecture; 2] = [Architecture::Little, Architecture::Big];

#[test]
fn crc_check_values() {
    assert_eq!(compute_crc(0, b"123456789"), 0xBB3D);
    assert_eq!(compute_crc(0, &[0; 100]), 0);
    assert_eq!(compute_crc(0, b".FIT"), 0x92DE);

    let all: Vec<u8> = (0..=255).collect();
    assert_eq!(compute_crc(0, &all), 0xBAD3);
}

#[test]
fn sentinels_are_invalid() {
    for base_type in BaseType::ALL {
        for a in ARCHITECTURES {
            let field = Field::invalid(0, base_type, a, 1);

            assert_eq!(field.number(a), None, "{base_type:?}");
            assert!(
                field.resolve(a, Resolution::IDENTITY, DecodingStrategy::DropInvalid).is_none(),
                "{base_type:?}"
            );

            let kept = field
                .resolve(a, Resolution::IDENTITY, DecodingStrategy::KeepSentinel)
                .unwrap();
            assert!(!kept.valid, "{base_type:?}");
        }
    }
}

/// The low `width` bytes of `bits`, in the byte order of an architecture.
fn element(bits: u64, width: usize, a: Architecture) -> Vec<u8> {
    match a {
        Architecture::Little => bits.to_le_bytes()[..width].to_vec(),
        Architecture::Big => bits.to_be_bytes()[8 - width..].to_vec(),
    }
}

#[test]
fn narrow_sentinels_are_exclusive() {
    for base_type in BaseType::ALL.into_iter().filter(|b| b.width() <= 2) {
        let width = base_type.width();
        for a in ARCHITECTURES {
            let invalid: Vec<u64> = (0..1u64 << (8 * width))
                .filter(|bits| is_invalid(&element(*bits, width, a), base_type, a))
                .collect();

            assert_eq!(invalid, vec![base_type.invalid_bits()], "{base_type:?}");
        }
    }
}

#[test]
fn timestamp_rollover() {
    let mut timestamp = RollingTimestamp::new();
    assert_eq!(timestamp.expand(3), Err(MissingReference));

    timestamp.observe(100);
    assert_eq!(timestamp.expand(3), Ok(131));
    assert_eq!(timestamp.expand(4), Ok(132));
    assert_eq!(timestamp.reference(), Some(132));
}

prop_compose! {
    fn arb_resolution()(
        scale in prop::sample::select(vec![1.0, 2.0, 5.0, 10.0, 100.0, 1000.0]),
        offset in prop::sample::select(vec![0.0, 273.0, 500.0]),
    ) -> Resolution {
        Resolution::new(scale, offset)
    }
}

prop_compose! {
    fn arb_record_kind()(
        developer in any::<bool>(),
        offset in 0..32u8,
        shape in 0..3u8,
    ) -> RecordKind {
        match shape {
            0 => RecordKind::Definition { developer },
            1 => RecordKind::Data,
            _ => RecordKind::CompressedTimestamp { offset },
        }
    }
}

proptest! {
    #[test]
    fn crc_detects_single_bit_errors(
        data in prop::collection::vec(any::<u8>(), 1..256),
        bit in any::<prop::sample::Index>(),
    ) {
        let bit = bit.index(data.len() * 8);
        let mut corrupt = data.clone();
        corrupt[bit / 8] ^= 1 << (bit % 8);

        prop_assert_ne!(compute_crc(0, &data), compute_crc(0, &corrupt));
    }

    #[test]
    fn wide_sentinels_are_exclusive(
        bits in any::<u64>(),
        base_type in prop::sample::select(
            BaseType::ALL.into_iter().filter(|b| b.width() > 2).collect::<Vec<_>>()
        ),
        big in any::<bool>(),
    ) {
        let a = if big { Architecture::Big } else { Architecture::Little };
        let width = base_type.width();
        let bits = bits & (u64::MAX >> (64 - 8 * width as u32));

        let r = element(bits, width, a);
        prop_assert_eq!(is_invalid(&r, base_type, a), bits == base_type.invalid_bits());
        prop_assert!(is_invalid(&element(base_type.invalid_bits(), width, a), base_type, a));
    }

    #[test]
    fn crc_is_incremental(
        data in prop::collection::vec(any::<u8>(), 0..256),
        split in any::<prop::sample::Index>(),
    ) {
        let (head, tail) = data.split_at(split.index(data.len() + 1));

        let mut checksum = Checksum::new();
        checksum.update(head);
        checksum.update(tail);
        prop_assert_eq!(checksum.value(), compute_crc(0, &data));

        // A document followed by its check value checks to zero.
        let mut trailed = data.clone();
        trailed.extend_from_slice(&checksum.finalize());
        prop_assert_eq!(compute_crc(0, &trailed), 0);
    }

    #[test]
    fn scaling_recovers_stored_values(
        raw in 0..0xFFFEu16,
        resolution in arb_resolution(),
        big in any::<bool>(),
    ) {
        let a = if big { Architecture::Big } else { Architecture::Little };

        let physical = resolution.apply(raw as f64);
        let scaled = Field::scaled(2, BaseType::Uint16, a, physical, resolution);

        prop_assert_eq!(scaled.number(a), Some(Number::Unsigned(raw as u64)));
        prop_assert_eq!(scaled, Field::from_value(2, BaseType::Uint16, a, raw as f64));
    }

    #[test]
    fn signed_values_saturate(x in any::<i32>()) {
        let a = Architecture::Little;
        let field = Field::from_value(0, BaseType::Sint16, a, x as f64);

        let expected = x.clamp(i16::MIN as i32, i16::MAX as i32) as i64;
        let found = match field.elements(a).next() {
            Some((Number::Signed(found), _)) => found,
            other => panic!("unexpected element {other:?}"),
        };
        prop_assert_eq!(found, expected);
    }

    #[test]
    fn compressed_timestamps_expand(reference in 0..u32::MAX - 31, delta in 0..32u32) {
        let mut timestamp = RollingTimestamp::new();
        timestamp.observe(reference);

        let offset = timestamp.compress(reference + delta);
        prop_assert_eq!(offset, Some(((reference + delta) & 0x1F) as u8));

        let offset = offset.unwrap();
        prop_assert_eq!(timestamp.expand(offset), Ok(reference + delta));
    }

    #[test]
    fn record_headers_address_local_messages(kind in arb_record_kind(), local in 0..16u8) {
        let local = match kind {
            RecordKind::CompressedTimestamp { .. } => local % 4,
            _ => local,
        };

        let header = kind.encode(local);
        let (found, successor) = record_header().advance([header]);
        prop_assert_eq!(found, local);

        match (kind, successor) {
            (RecordKind::Definition { developer }, either::Left(state)) => {
                prop_assert_eq!(state.has_developer_fields(), developer);
            }
            (RecordKind::Data, either::Right(state)) => {
                prop_assert_eq!(state.time_offset(), None);
            }
            (RecordKind::CompressedTimestamp { offset }, either::Right(state)) => {
                prop_assert_eq!(state.time_offset(), Some(offset));
            }
            (kind, _) => prop_assert!(false, "{kind:?} decoded as another shape"),
        }
    }
}

/// A record header state, reached by decoding a minimal document header.
fn record_header() -> RecordHeader {
    let mut header = [0; 12];
    header[0] = 12;
    header[1] = 0x20;
    header[8..].copy_from_slice(b".FIT");

    match cassette::sans::Decoder::advance(header) {
        Ok((_, either::Right(state))) => state,
        _ => unreachable!("12-byte headers lead to a record header"),
    }
}
