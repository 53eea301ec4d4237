mod common;

use common::{Blob, Mixed};
use dmxp_net::Net::Cursor::{
    DirectExporter, DirectImporter, Exporter, ImportProgress, Importer, SizeCounter,
    UnderflowImporter, WrapExporter,
};
use dmxp_net::Net::Message::Message;
use dmxp_net::{ImportError, Overflow};

fn payload_bytes(message: &dyn Message) -> Vec<u8> {
    let mut bytes = vec![0u8; message.payload_length()];
    let mut exporter = DirectExporter::new(&mut bytes);
    message.write_payload(&mut exporter).unwrap();
    assert_eq!(exporter.written(), bytes.len());
    bytes
}

/// Decode `bytes` fed in pieces cut at `cuts`, resuming after every cut.
fn decode_in_pieces<T: Message + Default>(bytes: &[u8], cuts: &[usize]) -> T {
    let mut message = T::default();
    let mut progress = ImportProgress::default();
    let mut copied = 0;
    let mut bounds: Vec<usize> = cuts.to_vec();
    bounds.push(bytes.len());

    for end in bounds {
        let piece = &bytes[copied..end];
        let (result, consumed) = if copied == 0 {
            let mut importer = DirectImporter::new(piece, &mut progress);
            (message.read_payload(&mut importer), importer.consumed())
        } else {
            let mut importer = UnderflowImporter::new(piece, copied, &mut progress);
            (message.read_payload(&mut importer), importer.consumed())
        };
        assert_eq!(consumed, piece.len(), "importer left bytes of the piece unread");
        copied += consumed;
        match result {
            Ok(()) => {
                assert_eq!(copied, bytes.len(), "finished before the last piece");
                return message;
            }
            Err(ImportError::Underflow) => assert!(copied < bytes.len()),
            Err(err) => panic!("unexpected import error {err:?}"),
        }
    }
    panic!("payload never completed");
}

#[test]
fn every_single_split_point_resumes_to_the_same_value() {
    let original = Mixed::sample(17);
    let bytes = payload_bytes(&original);
    for cut in 0..=bytes.len() {
        let decoded: Mixed = decode_in_pieces(&bytes, &[cut]);
        assert_eq!(decoded, original, "split at byte {cut}");
    }
}

#[test]
fn byte_by_byte_delivery_resumes_every_value_kind() {
    let original = Mixed::sample(4);
    let bytes = payload_bytes(&original);
    let cuts: Vec<usize> = (1..bytes.len()).collect();
    let decoded: Mixed = decode_in_pieces(&bytes, &cuts);
    assert_eq!(decoded, original);
}

#[test]
fn random_multi_split_resumes() {
    let mut rng = fastrand::Rng::with_seed(0x5eed);
    for round in 0..200 {
        let original = Mixed::sample(round);
        let bytes = payload_bytes(&original);
        let mut cuts: Vec<usize> = (0..rng.usize(1..6))
            .map(|_| rng.usize(0..=bytes.len()))
            .collect();
        cuts.sort_unstable();
        let decoded: Mixed = decode_in_pieces(&bytes, &cuts);
        assert_eq!(decoded, original, "round {round}, cuts {cuts:?}");
    }
}

#[test]
fn split_inside_multi_byte_integer_keeps_partial_bits() {
    let original = Blob::new(0xA1B2_C3D4, 0x0102_0304, 3);
    let bytes = payload_bytes(&original);

    let mut message = Blob::default();
    let mut progress = ImportProgress::default();
    {
        let mut importer = DirectImporter::new(&bytes[..6], &mut progress);
        assert_eq!(message.read_payload(&mut importer), Err(ImportError::Underflow));
    }
    // producer done, seq interrupted after two of its four bytes
    assert_eq!(message.producer, 0xA1B2_C3D4);
    assert_eq!(progress.index(), 4);
    assert!(!progress.has_partial_array());

    let mut importer = UnderflowImporter::new(&bytes[6..], 6, &mut progress);
    message.read_payload(&mut importer).unwrap();
    assert_eq!(message, original);
}

#[test]
fn split_inside_compact_length_prefix() {
    // 200 elements need a two-byte prefix
    let original = Blob::new(1, 2, 200);
    let bytes = payload_bytes(&original);
    assert_eq!(bytes[8] & 0x80, 0x80);

    let decoded: Blob = decode_in_pieces(&bytes, &[9]);
    assert_eq!(decoded, original);
}

#[test]
fn split_inside_array_bytes_keeps_partial_array() {
    let original = Blob::new(1, 2, 300);
    let bytes = payload_bytes(&original);

    let mut message = Blob::default();
    let mut progress = ImportProgress::default();
    {
        let mut importer = DirectImporter::new(&bytes[..100], &mut progress);
        assert_eq!(message.read_payload(&mut importer), Err(ImportError::Underflow));
    }
    assert_eq!(progress.index(), 8);
    assert!(progress.has_partial_array());
    assert!(message.data.is_empty(), "array assigned before it was complete");

    let decoded: Blob = decode_in_pieces(&bytes, &[100, 150, 151, 280]);
    assert_eq!(decoded, original);
}

#[test]
fn wrap_exporter_matches_direct_exporter() {
    let original = Mixed::sample(9);
    let expected = payload_bytes(&original);

    for split in [0, 1, 5, 11, expected.len() / 2, expected.len()] {
        let mut tail = vec![0u8; split];
        let mut head = vec![0u8; expected.len() - split];
        let mut exporter = WrapExporter::new(&mut tail, &mut head);
        original.write_payload(&mut exporter).unwrap();
        assert_eq!(exporter.written(), expected.len());
        let joined: Vec<u8> = tail.iter().chain(head.iter()).copied().collect();
        assert_eq!(joined, expected, "split at {split}");
    }
}

#[test]
fn wrap_exporter_skip_emits_only_the_remainder() {
    let original = Blob::new(5, 6, 50);
    let expected = payload_bytes(&original);

    let mut first = vec![0u8; 20];
    let mut second = vec![0u8; 0];
    let mut exporter = WrapExporter::with_skip(&mut first, &mut second, 30);
    assert_eq!(original.write_payload(&mut exporter), Err(Overflow));
    assert_eq!(exporter.stored(), 20);
    assert_eq!(exporter.written(), 50);
    assert_eq!(first, expected[30..50]);
}

#[test]
fn direct_exporter_overflows_at_the_end() {
    let mut region = [0u8; 6];
    let mut exporter = DirectExporter::new(&mut region);
    exporter.write_u32(7).unwrap();
    assert_eq!(exporter.write_u32(8), Err(Overflow));
    assert_eq!(exporter.written(), 6);
    assert_eq!(exporter.remaining(), 0);
}

#[test]
fn size_counter_agrees_with_payload_length() {
    for seed in 0..20 {
        let message = Mixed::sample(seed);
        let mut counter = SizeCounter::new();
        message.write_payload(&mut counter).unwrap();
        assert_eq!(counter.written(), message.payload_length());
    }
}

#[test]
fn malformed_values_are_rejected() {
    let mut progress = ImportProgress::default();
    let bytes = [0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x01];
    let mut importer = DirectImporter::new(&bytes, &mut progress);
    assert!(matches!(importer.read_compact_number(0), Err(ImportError::Malformed(_))));

    let mut progress = ImportProgress::default();
    let bytes = [0x02, 0xC3, 0x28];
    let mut importer = DirectImporter::new(&bytes, &mut progress);
    let mut text = String::new();
    assert!(matches!(importer.read_string(&mut text), Err(ImportError::Malformed(_))));
}
