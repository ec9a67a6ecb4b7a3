use lzpack::block::RecordHeader;
use lzpack::checksum::checksum;
use lzpack::codec::{BlockCodec, Lzo1xCodec};
use lzpack::header::{Header, FLAG_CHECKSUM, HEADER_SIZE, MAGIC, MAX_BLOCK_SIZE, METHOD_LZO1X};
use lzpack::io_stream::{decode, encode, inspect, verify, ContainerReader};
use lzpack::{ContainerError, ErrorKind, Level, DEFAULT_BLOCK_SIZE};
use std::fs::File;
use std::io::{BufReader, BufWriter, Cursor, Seek, SeekFrom, Write};
use tempfile::NamedTempFile;

/// Deterministic xorshift bytes; LZO cannot shrink these.
fn noise(len: usize, mut seed: u64) -> Vec<u8> {
    let mut out = Vec::with_capacity(len);
    while out.len() < len {
        seed ^= seed << 13;
        seed ^= seed >> 7;
        seed ^= seed << 17;
        out.extend_from_slice(&seed.to_le_bytes());
    }
    out.truncate(len);
    out
}

/// Text-like data with enough variety that a flipped bit changes the output.
fn log_lines(len: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(len + 64);
    let mut i = 0u64;
    while out.len() < len {
        let line = format!(
            "{:06} level={} shard={} latency_us={} msg=request handled\n",
            i,
            ["info", "warn", "debug"][(i % 3) as usize],
            (i * 7919) % 97,
            (i * 104_729) % 10_007
        );
        out.extend_from_slice(line.as_bytes());
        i += 1;
    }
    out.truncate(len);
    out
}

fn pack(data: &[u8], level: Level, block_size: u32) -> Vec<u8> {
    let mut out = Vec::new();
    encode(data, &mut out, level, block_size).unwrap();
    out
}

fn unpack(packed: &[u8]) -> Result<Vec<u8>, ContainerError> {
    let mut out = Vec::new();
    decode(packed, &mut out)?;
    Ok(out)
}

fn be32(bytes: &[u8], at: usize) -> u32 {
    u32::from_be_bytes(bytes[at..at + 4].try_into().unwrap())
}

/// (uncompressed_len, stored_len, payload offset) for every record.
fn records(packed: &[u8]) -> Vec<(u32, u32, usize)> {
    let mut out = Vec::new();
    let mut pos = HEADER_SIZE;
    loop {
        let uncompressed = be32(packed, pos);
        if uncompressed == 0 {
            break;
        }
        let stored = be32(packed, pos + 4);
        out.push((uncompressed, stored, pos + 8));
        pos += 8 + stored as usize;
    }
    out
}

#[test]
fn test_roundtrip_sizes() {
    for len in [0usize, 1, 2, 1023, 1024, 1025, 100_000] {
        let data = log_lines(len);
        for level in [Level::Fastest, Level::Best] {
            let packed = pack(&data, level, 4096);
            assert_eq!(unpack(&packed).unwrap(), data, "len {len} level {level:?}");
        }
    }
}

#[test]
fn test_roundtrip_multi_megabyte() {
    let mut data = log_lines(3 * 1024 * 1024);
    data.extend(noise(512 * 1024, 7));
    let packed = pack(&data, Level::Best, DEFAULT_BLOCK_SIZE);
    assert!(packed.len() < data.len());
    assert_eq!(unpack(&packed).unwrap(), data);
}

#[test]
fn test_three_hundred_thousand_a() {
    let data = vec![b'A'; 300_000];
    let packed = pack(&data, Level::Best, 256 * 1024);

    assert_eq!(&packed[..7], &MAGIC);
    assert_eq!(be32(&packed, 7), 1);
    assert_eq!(packed[11], 1);
    assert_eq!(packed[12], 9);
    assert_eq!(be32(&packed, 13), 262_144);

    let recs = records(&packed);
    assert_eq!(recs.len(), 2);
    assert_eq!(recs[0].0, 262_144);
    assert!(recs[0].1 < 262_144 / 10);
    assert_eq!(recs[1].0, 37_856);
    assert!(recs[1].1 < 37_856);

    let (_, stored, payload) = recs[1];
    let end = payload + stored as usize;
    assert_eq!(&packed[end..end + 8], &[0u8; 8]);
    assert_eq!(be32(&packed, end + 8), checksum(&data));
    assert_eq!(packed.len(), end + 12);

    assert_eq!(unpack(&packed).unwrap(), data);
}

#[test]
fn test_empty_input() {
    let packed = pack(&[], Level::Fastest, DEFAULT_BLOCK_SIZE);
    assert_eq!(packed.len(), HEADER_SIZE + 8 + 4);
    assert_eq!(&packed[HEADER_SIZE..HEADER_SIZE + 8], &[0u8; 8]);
    // Adler-32 of nothing is 1.
    assert_eq!(&packed[HEADER_SIZE + 8..], &[0, 0, 0, 1]);
    assert!(unpack(&packed).unwrap().is_empty());
}

#[test]
fn test_incompressible_blocks_are_stored() {
    let data = noise(200_000, 0x9E37_79B9_7F4A_7C15);
    let packed = pack(&data, Level::Best, 64 * 1024);
    let recs = records(&packed);
    assert_eq!(recs.len(), 4);
    let mut offset = 0;
    for &(uncompressed, stored, payload) in &recs {
        assert_eq!(uncompressed, stored);
        let n = stored as usize;
        assert_eq!(&packed[payload..payload + n], &data[offset..offset + n]);
        offset += n;
    }
    // Raw size plus fixed framing only.
    assert_eq!(packed.len(), HEADER_SIZE + data.len() + 8 * (recs.len() + 1) + 4);
    assert_eq!(unpack(&packed).unwrap(), data);
}

#[test]
fn test_checksum_independent_of_block_size() {
    let data = log_lines(150_000);
    let mut sums = Vec::new();
    let mut containers = Vec::new();
    for block_size in [1024u32, 4096, 65_536, 256 * 1024] {
        let packed = pack(&data, Level::Fastest, block_size);
        sums.push(be32(&packed, packed.len() - 4));
        containers.push(packed);
    }
    assert!(sums.iter().all(|s| *s == checksum(&data)));
    assert_ne!(containers[0], containers[1]);
}

#[test]
fn test_flipped_payload_bit_is_detected() {
    let data = log_lines(16 * 1024);
    let packed = pack(&data, Level::Best, 16 * 1024);
    let recs = records(&packed);
    assert_eq!(recs.len(), 1);
    let (_, stored, payload) = recs[0];
    assert!((stored as usize) < data.len());

    // A flip may land on bits the LZO decoder ignores, or redirect a match to
    // an identical earlier copy. Either way the output must never be wrong.
    let mut detected = 0;
    for offset in (0..stored as usize).step_by(stored as usize / 24 + 1) {
        for bit in [0x01u8, 0x80] {
            let mut corrupt = packed.clone();
            corrupt[payload + offset] ^= bit;
            match unpack(&corrupt) {
                Ok(out) => assert_eq!(out, data, "offset {offset} bit {bit:#x} decoded wrong bytes"),
                Err(err) => {
                    assert!(
                        matches!(err.kind(), ErrorKind::CorruptData | ErrorKind::Checksum),
                        "offset {offset} bit {bit:#x}: {err}"
                    );
                    detected += 1;
                }
            }
        }
    }
    assert!(detected > 0);
}

#[test]
fn test_flipped_stored_block_fails_checksum() {
    let data = noise(4096, 3);
    let mut packed = pack(&data, Level::Best, 4096);
    let (_, _, payload) = records(&packed)[0];
    packed[payload + 100] ^= 0x10;
    assert_eq!(unpack(&packed).unwrap_err().kind(), ErrorKind::Checksum);
}

#[test]
fn test_tampered_magic_rejected_before_output() {
    let mut packed = pack(b"some data", Level::Best, 4096);
    packed[1] = 0x00;
    let mut out = Vec::new();
    let err = decode(&packed[..], &mut out).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Format);
    assert!(out.is_empty());
}

#[test]
fn test_header_block_size_out_of_range() {
    for bad in [512u32, 16 * 1024 * 1024] {
        let mut packed = pack(b"abc", Level::Best, 4096);
        packed[13..17].copy_from_slice(&bad.to_be_bytes());
        assert_eq!(unpack(&packed).unwrap_err().kind(), ErrorKind::Format);
    }
}

#[test]
fn test_truncated_container() {
    let data = log_lines(50_000);
    let packed = pack(&data, Level::Best, 8192);
    let (_, stored, payload) = records(&packed)[2];
    let cut = &packed[..payload + stored as usize / 2];
    assert_eq!(unpack(cut).unwrap_err().kind(), ErrorKind::Truncated);
}

#[test]
fn test_decode_is_level_agnostic() {
    let data = log_lines(40_000);
    let fast = pack(&data, Level::Fastest, 8192);
    let best = pack(&data, Level::Best, 8192);
    assert_eq!(fast[12], 1);
    assert_eq!(best[12], 9);
    assert_eq!(unpack(&fast).unwrap(), data);
    assert_eq!(unpack(&best).unwrap(), data);
}

#[test]
fn test_best_level_compresses_smaller() {
    let data = log_lines(256 * 1024);
    let fast = pack(&data, Level::Fastest, 64 * 1024);
    let best = pack(&data, Level::Best, 64 * 1024);
    assert!(best.len() < fast.len(), "best {} vs fastest {}", best.len(), fast.len());
    assert_eq!(unpack(&best).unwrap(), data);
}

/// Container holding one real LZO1X record of 8192 `x` bytes whose header
/// claims `claimed` bytes.
fn overclaiming_container(flags: u32, claimed: u32) -> Vec<u8> {
    let data = vec![b'x'; 8192];
    let payload = Lzo1xCodec::new().compress(&data, Level::Fastest).unwrap();
    let mut out = Vec::new();
    Header { flags, method: METHOD_LZO1X, level: 1, block_size: 16 * 1024 }
        .write(&mut out)
        .unwrap();
    RecordHeader { uncompressed_len: claimed, stored_len: payload.len() as u32 }
        .write(&mut out)
        .unwrap();
    out.extend_from_slice(&payload);
    RecordHeader::END.write(&mut out).unwrap();
    out.extend_from_slice(&checksum(&data).to_be_bytes());
    out
}

#[test]
fn test_short_lzo_block_is_corrupt_with_or_without_checksum() {
    assert_eq!(unpack(&overclaiming_container(FLAG_CHECKSUM, 8192)).unwrap(), vec![b'x'; 8192]);

    for flags in [FLAG_CHECKSUM, 0] {
        let mut out = Vec::new();
        let err = decode(&overclaiming_container(flags, 9000)[..], &mut out).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CorruptData, "flags {flags}: {err}");
        assert!(out.is_empty());
    }
    let err = unpack(&overclaiming_container(0, 4000)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::CorruptData);
}

#[test]
fn test_roundtrip_on_default_thread_stack() {
    let handle = std::thread::Builder::new()
        .stack_size(2 << 20)
        .spawn(|| {
            let data = log_lines(1024 * 1024);
            for level in [Level::Fastest, Level::Best] {
                let packed = pack(&data, level, MAX_BLOCK_SIZE);
                assert_eq!(unpack(&packed).unwrap(), data);
            }
        })
        .unwrap();
    handle.join().unwrap();
}

#[test]
fn test_streaming_reader_yields_blocks_in_order() {
    let data = log_lines(10_000);
    let packed = pack(&data, Level::Best, 4096);
    let mut reader = ContainerReader::new(Cursor::new(packed)).unwrap();
    let mut sizes = Vec::new();
    let mut joined = Vec::new();
    while let Some(block) = reader.next_block().unwrap() {
        sizes.push(block.len());
        joined.extend_from_slice(block);
    }
    let (_, stats) = reader.finish().unwrap();
    assert_eq!(sizes, [4096, 4096, 1808]);
    assert_eq!(joined, data);
    assert_eq!(stats.checksum, Some(checksum(&data)));
}

#[test]
fn test_file_roundtrip_and_inspect() {
    let data = log_lines(700_000);
    let packed_file = NamedTempFile::new().unwrap();

    {
        let out = BufWriter::new(File::create(packed_file.path()).unwrap());
        let stats = encode(&data[..], out, Level::Fastest, 128 * 1024).unwrap();
        assert_eq!(stats.blocks, 6);
        assert_eq!(stats.original_bytes, data.len() as u64);
    }

    let info = inspect(BufReader::new(File::open(packed_file.path()).unwrap())).unwrap();
    assert_eq!(info.block_size, 128 * 1024);
    assert_eq!(info.level_name, Some("fastest"));
    assert!(info.has_checksum);
    assert_eq!(info.stats.blocks, 6);
    assert_eq!(info.container_bytes, std::fs::metadata(packed_file.path()).unwrap().len());

    let mut restored = NamedTempFile::new().unwrap();
    {
        let input = BufReader::new(File::open(packed_file.path()).unwrap());
        decode(input, restored.as_file_mut()).unwrap();
    }
    restored.as_file_mut().flush().unwrap();
    restored.as_file_mut().seek(SeekFrom::Start(0)).unwrap();
    assert_eq!(std::fs::read(restored.path()).unwrap(), data);

    let stats = verify(File::open(packed_file.path()).unwrap()).unwrap();
    assert_eq!(stats.checksum, Some(checksum(&data)));
}

#[test]
fn test_info_serializes_to_json() {
    let packed = pack(&log_lines(5000), Level::Best, 1024);
    let info = inspect(&packed[..]).unwrap();
    let json: serde_json::Value = serde_json::to_value(&info).unwrap();
    assert_eq!(json["block_size"], 1024);
    assert_eq!(json["level_name"], "best");
    assert_eq!(json["stats"]["blocks"], 5);
}
