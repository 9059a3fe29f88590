//! BIG archives (`RBF1.23`).
//!
//! Layout: the magic, a file count and flags, then one 32-byte entry per file.
//! Each entry points at its file name, XOR-chained with a running mask, which
//! is followed by a NUL and the stored data. Stored data is either raw or
//! LZSS-compressed.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Cursor, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use binrw::{binrw, BinRead};

use super::AssetSource;
use crate::error::{ImportError, Result};
use crate::format::normalize_path;

const NAME_MASK_SEED: u8 = 213;

#[binrw]
#[brw(little, magic = b"RBF1.23")]
#[derive(Debug, Clone)]
struct Toc {
    #[br(temp)]
    #[bw(calc = file_entries.len() as i32)]
    num_files: i32,
    flags: i32,
    #[br(count = num_files)]
    file_entries: Vec<TocEntry>,
}

#[binrw]
#[derive(Debug, Clone)]
struct TocEntry {
    name_crc: u64,
    #[brw(pad_size_to = 4)]
    name_length: u16,
    stored_length: u32,
    real_length: u32,
    /// Offset of the encrypted name; data follows the name and its NUL.
    offset: u32,
    timestamp: u32,
    #[brw(pad_size_to = 4)]
    compression_type: u8,
}

/// One file of an archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BigEntry {
    /// Offset of the stored data.
    pub offset: u64,
    pub stored_length: u32,
    pub real_length: u32,
    pub compressed: bool,
}

#[derive(Debug, Clone)]
enum Backing {
    File(PathBuf),
    Memory(Vec<u8>),
}

impl Backing {
    fn read_at(&self, offset: u64, len: usize) -> Result<Vec<u8>> {
        let mut data = vec![0u8; len];
        match self {
            Backing::File(path) => {
                let mut file = File::open(path)?;
                file.seek(SeekFrom::Start(offset))?;
                file.read_exact(&mut data)?;
            }
            Backing::Memory(bytes) => {
                let start = usize::try_from(offset).unwrap_or(usize::MAX);
                let chunk = start
                    .checked_add(len)
                    .and_then(|end| bytes.get(start..end))
                    .ok_or_else(|| {
                        ImportError::InvalidArchive(format!(
                            "entry at {} with length {} is out of bounds",
                            offset, len
                        ))
                    })?;
                data.copy_from_slice(chunk);
            }
        }
        Ok(data)
    }
}

/// A BIG archive with its table of contents in memory.
///
/// File data stays in the archive and is read on demand.
#[derive(Debug, Clone)]
pub struct BigArchive {
    backing: Backing,
    entries: HashMap<String, BigEntry>,
}

impl BigArchive {
    /// Open an archive file and read its table of contents.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut file = BufReader::new(File::open(path)?);
        let entries = read_toc(&mut file)?;
        tracing::info!(
            target: "classic_importer::source",
            "{}: {} files",
            path.display(),
            entries.len()
        );
        Ok(Self {
            backing: Backing::File(path.to_path_buf()),
            entries,
        })
    }

    /// Archive held in memory.
    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        let entries = read_toc(&mut Cursor::new(&data))?;
        Ok(Self {
            backing: Backing::Memory(data),
            entries,
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Normalized names of all files, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn entry(&self, path: &str) -> Option<&BigEntry> {
        self.entries.get(&normalize_path(path))
    }

    fn extract(&self, entry: &BigEntry) -> Result<Vec<u8>> {
        let stored = self
            .backing
            .read_at(entry.offset, entry.stored_length as usize)?;
        if entry.compressed {
            lzss_decompress(&stored, entry.real_length as usize)
        } else {
            Ok(stored)
        }
    }
}

impl AssetSource for BigArchive {
    fn read(&self, path: &str) -> Result<Option<Vec<u8>>> {
        match self.entry(path) {
            Some(entry) => self.extract(entry).map(Some),
            None => Ok(None),
        }
    }

    fn contains(&self, path: &str) -> bool {
        self.entry(path).is_some()
    }
}

fn read_toc<R: Read + Seek>(read: &mut R) -> Result<HashMap<String, BigEntry>> {
    let toc = Toc::read(read)?;

    let mut entries = HashMap::with_capacity(toc.file_entries.len());
    for f in toc.file_entries {
        read.seek(SeekFrom::Start(f.offset.into()))?;
        let mut name = vec![0u8; f.name_length.into()];
        read.read_exact(&mut name)?;
        decrypt_name(&mut name);
        let name = String::from_utf8_lossy(&name);

        let compressed = match f.compression_type {
            0 => false,
            1 => true,
            other => {
                return Err(ImportError::InvalidArchive(format!(
                    "{}: unknown compression type {}",
                    name, other
                )))
            }
        };
        if !compressed && f.real_length != f.stored_length {
            tracing::warn!(
                target: "classic_importer::source",
                "{}: uncompressed entry stores {} bytes but expands to {}",
                name,
                f.stored_length,
                f.real_length
            );
        }

        entries.insert(
            normalize_path(&name),
            BigEntry {
                offset: u64::from(f.offset) + u64::from(f.name_length) + 1,
                stored_length: f.stored_length,
                real_length: f.real_length,
                compressed,
            },
        );
    }
    Ok(entries)
}

/// Undo the name cipher: each byte is XORed with the previous plain byte.
fn decrypt_name(name: &mut [u8]) {
    let mut mask = NAME_MASK_SEED;
    for letter in name.iter_mut() {
        *letter ^= mask;
        mask = *letter;
    }
}

/// A list of archives searched in order.
#[derive(Debug, Clone, Default)]
pub struct ArchiveChain {
    archives: Vec<BigArchive>,
}

impl ArchiveChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open every archive in `paths`.
    pub fn open_all<P: AsRef<Path>>(paths: &[P]) -> Result<Self> {
        let archives = paths
            .iter()
            .map(BigArchive::open)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { archives })
    }

    pub fn push(&mut self, archive: BigArchive) {
        self.archives.push(archive);
    }

    pub fn archives(&self) -> &[BigArchive] {
        &self.archives
    }
}

impl AssetSource for ArchiveChain {
    fn read(&self, path: &str) -> Result<Option<Vec<u8>>> {
        match self.archives.iter().find(|a| a.contains(path)) {
            Some(archive) => archive.read(path),
            None => Ok(None),
        }
    }

    fn contains(&self, path: &str) -> bool {
        self.archives.iter().any(|a| a.contains(path))
    }
}

const INDEX_BITS: u8 = 12;
const LENGTH_BITS: u8 = 4;
const BREAK_EVEN: usize = (1 + INDEX_BITS as usize + LENGTH_BITS as usize) / 9;
const WINDOW_SIZE: usize = 1 << INDEX_BITS;

/// Expand an LZSS stream.
///
/// A set flag bit is followed by a literal byte. A clear one is followed by a
/// window position (0 ends the stream) and a length; `length + BREAK_EVEN + 1`
/// bytes are copied from the window. The window starts writing at position 1.
pub fn lzss_decompress(input: &[u8], expected_len: usize) -> Result<Vec<u8>> {
    let mut reader = BitReader::new(input);
    let mut window = [0u8; WINDOW_SIZE];
    let mut current = 1usize;
    let mut out = Vec::with_capacity(expected_len);

    let truncated = || ImportError::InvalidArchive("truncated LZSS stream".to_string());

    loop {
        if reader.read_bits(1).ok_or_else(truncated)? == 1 {
            let c = reader.read_bits(8).ok_or_else(truncated)? as u8;
            out.push(c);
            window[current] = c;
            current = (current + 1) & (WINDOW_SIZE - 1);
        } else {
            let position = usize::from(reader.read_bits(INDEX_BITS).ok_or_else(truncated)?);
            if position == 0 {
                break;
            }
            let length = usize::from(reader.read_bits(LENGTH_BITS).ok_or_else(truncated)?) + BREAK_EVEN;
            for i in 0..=length {
                let c = window[(position + i) & (WINDOW_SIZE - 1)];
                out.push(c);
                window[current] = c;
                current = (current + 1) & (WINDOW_SIZE - 1);
            }
        }
    }

    if out.len() != expected_len {
        tracing::warn!(
            target: "classic_importer::source",
            "LZSS stream expanded to {} bytes, expected {}",
            out.len(),
            expected_len
        );
    }
    Ok(out)
}

/// MSB-first bit reader.
struct BitReader<'a> {
    input: &'a [u8],
    stage: u32,
    remaining: u8,
}

impl<'a> BitReader<'a> {
    fn new(input: &'a [u8]) -> Self {
        Self {
            input,
            stage: 0,
            remaining: 0,
        }
    }

    /// Read `n` bits (1..=16), or `None` once the input is exhausted.
    fn read_bits(&mut self, n: u8) -> Option<u16> {
        debug_assert!(n > 0 && n <= 16);
        while n > self.remaining {
            let (&next, rest) = self.input.split_first()?;
            self.input = rest;
            self.stage |= u32::from(next) << (24 - self.remaining);
            self.remaining += 8;
        }
        let value = self.stage >> (32 - n);
        self.stage <<= n;
        self.remaining -= n;
        Some(value as u16)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use binrw::BinWrite;

    /// MSB-first bit writer for building LZSS streams.
    #[derive(Default)]
    struct BitWriter {
        bytes: Vec<u8>,
        bits: usize,
    }

    impl BitWriter {
        fn write(&mut self, value: u16, n: u8) {
            for bit in (0..n).rev() {
                if self.bits % 8 == 0 {
                    self.bytes.push(0);
                }
                if (value >> bit) & 1 == 1 {
                    let last = self.bytes.len() - 1;
                    self.bytes[last] |= 0x80 >> (self.bits % 8);
                }
                self.bits += 1;
            }
        }

        fn literal(&mut self, byte: u8) {
            self.write(1, 1);
            self.write(byte.into(), 8);
        }

        fn reference(&mut self, position: u16, length: u16) {
            self.write(0, 1);
            self.write(position, INDEX_BITS);
            self.write(length, LENGTH_BITS);
        }

        fn finish(mut self) -> Vec<u8> {
            self.write(0, 1);
            self.write(0, INDEX_BITS);
            self.bytes
        }
    }

    fn literals(data: &[u8]) -> Vec<u8> {
        let mut writer = BitWriter::default();
        for &b in data {
            writer.literal(b);
        }
        writer.finish()
    }

    fn encrypt_name(name: &str) -> Vec<u8> {
        let mut mask = NAME_MASK_SEED;
        name.bytes()
            .map(|b| {
                let encrypted = b ^ mask;
                mask = b;
                encrypted
            })
            .collect()
    }

    /// Build an archive from `(name, stored data, real length, compressed)`.
    fn archive(files: &[(&str, Vec<u8>, usize, bool)]) -> Vec<u8> {
        let header_len = 7 + 4 + 4 + files.len() * 32;
        let mut body = Vec::new();
        let mut file_entries = Vec::new();
        for (name, stored, real_length, compressed) in files {
            file_entries.push(TocEntry {
                name_crc: 0,
                name_length: name.len() as u16,
                stored_length: stored.len() as u32,
                real_length: *real_length as u32,
                offset: (header_len + body.len()) as u32,
                timestamp: 0,
                compression_type: u8::from(*compressed),
            });
            body.extend(encrypt_name(name));
            body.push(0);
            body.extend_from_slice(stored);
        }

        let mut cursor = Cursor::new(Vec::new());
        Toc {
            flags: 0,
            file_entries,
        }
        .write(&mut cursor)
        .unwrap();
        let mut out = cursor.into_inner();
        assert_eq!(out.len(), header_len);
        out.extend(body);
        out
    }

    #[test]
    fn test_name_cipher_round_trip() {
        let mut name = encrypt_name("R1\\Scout\\Scout.peo");
        decrypt_name(&mut name);
        assert_eq!(name, b"R1\\Scout\\Scout.peo");
    }

    #[test]
    fn test_lzss_literals() {
        let stream = literals(b"hello");
        assert_eq!(lzss_decompress(&stream, 5).unwrap(), b"hello");
    }

    #[test]
    fn test_lzss_back_reference_overlaps_output() {
        let mut writer = BitWriter::default();
        writer.literal(b'a');
        writer.literal(b'b');
        // Copies 2 + BREAK_EVEN + 1 bytes starting at window position 1.
        writer.reference(1, 2);
        let stream = writer.finish();

        assert_eq!(lzss_decompress(&stream, 6).unwrap(), b"ababab");
    }

    #[test]
    fn test_lzss_truncated_stream_errors() {
        let mut stream = literals(b"abc");
        stream.truncate(2);
        assert!(matches!(
            lzss_decompress(&stream, 3),
            Err(ImportError::InvalidArchive(_))
        ));
    }

    #[test]
    fn test_archive_reads_raw_and_compressed_entries() {
        let bytes = archive(&[
            ("R1\\Scout\\Scout.peo", b"raw data".to_vec(), 8, false),
            ("R1\\Scout\\glass.lif", literals(b"packed"), 6, true),
        ]);
        let archive = BigArchive::from_bytes(bytes).unwrap();

        assert_eq!(archive.len(), 2);
        assert_eq!(
            archive.names(),
            vec!["r1/scout/glass.lif", "r1/scout/scout.peo"]
        );
        assert_eq!(
            archive.read("r1/scout/scout.peo").unwrap(),
            Some(b"raw data".to_vec())
        );
        assert_eq!(
            archive.read("R1/Scout/Glass.lif").unwrap(),
            Some(b"packed".to_vec())
        );
        assert_eq!(archive.read("r1/scout/missing.lif").unwrap(), None);
    }

    #[test]
    fn test_bad_magic_is_rejected() {
        let mut bytes = archive(&[("a", vec![1], 1, false)]);
        bytes[0] = b'X';
        assert!(BigArchive::from_bytes(bytes).is_err());
    }

    #[test]
    fn test_chain_first_archive_wins() {
        let first = BigArchive::from_bytes(archive(&[("a", vec![1], 1, false)])).unwrap();
        let second = BigArchive::from_bytes(archive(&[
            ("a", vec![2], 1, false),
            ("b", vec![3], 1, false),
        ]))
        .unwrap();

        let mut chain = ArchiveChain::new();
        chain.push(first);
        chain.push(second);

        assert_eq!(chain.read("a").unwrap(), Some(vec![1]));
        assert_eq!(chain.read("b").unwrap(), Some(vec![3]));
        assert!(!chain.contains("c"));
    }

    #[test]
    fn test_archive_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Homeworld.big");
        std::fs::write(&path, archive(&[("a.txt", b"abc".to_vec(), 3, false)])).unwrap();

        let chain = ArchiveChain::open_all(&[&path]).unwrap();
        assert_eq!(chain.archives().len(), 1);
        assert_eq!(chain.read("A.TXT").unwrap(), Some(b"abc".to_vec()));
    }
}
