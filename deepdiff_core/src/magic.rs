//! Magic-byte file identification.
//!
//! A fixed signature table replaces an external magic database; it is
//! static data, initialized once, never computed lazily at call sites.

/// Tar archives carry their magic at offset 257, so identification reads
/// one full header block.
pub const HEADER_LEN: usize = 512;

const TAR_MAGIC_OFFSET: usize = 257;

struct Signature {
    offset: usize,
    bytes: &'static [u8],
    label: &'static str,
}

static SIGNATURES: &[Signature] = &[
    Signature {
        offset: 0,
        bytes: &[0x1f, 0x8b],
        label: "gzip compressed data",
    },
    Signature {
        offset: 0,
        bytes: &[0xfd, b'7', b'z', b'X', b'Z', 0x00],
        label: "XZ compressed data",
    },
    Signature {
        offset: 0,
        bytes: b"BZh",
        label: "bzip2 compressed data",
    },
    Signature {
        offset: 0,
        bytes: &[b'P', b'K', 0x03, 0x04],
        label: "Zip archive data",
    },
    Signature {
        offset: TAR_MAGIC_OFFSET,
        bytes: b"ustar",
        label: "POSIX tar archive",
    },
    Signature {
        offset: 0,
        bytes: &[0x7f, b'E', b'L', b'F'],
        label: "ELF",
    },
    Signature {
        offset: 0,
        bytes: &[0x89, b'P', b'N', b'G'],
        label: "PNG image data",
    },
    Signature {
        offset: 0,
        bytes: b"%PDF-",
        label: "PDF document",
    },
];

/// Best-effort file type label from the leading header bytes.
pub fn guess_file_type(header: &[u8]) -> &'static str {
    for sig in SIGNATURES {
        let end = sig.offset + sig.bytes.len();
        if header.len() >= end && &header[sig.offset..end] == sig.bytes {
            return sig.label;
        }
    }
    if header.is_empty() {
        "empty"
    } else if looks_text(header) {
        "ASCII text"
    } else {
        "data"
    }
}

pub fn is_gzip(header: &[u8]) -> bool {
    header.starts_with(&[0x1f, 0x8b])
}

pub fn is_xz(header: &[u8]) -> bool {
    header.starts_with(&[0xfd, b'7', b'z', b'X', b'Z', 0x00])
}

pub fn is_zip(header: &[u8]) -> bool {
    header.starts_with(&[b'P', b'K', 0x03, 0x04])
}

pub fn is_tar(header: &[u8]) -> bool {
    header.len() > TAR_MAGIC_OFFSET + 5 && &header[TAR_MAGIC_OFFSET..TAR_MAGIC_OFFSET + 5] == b"ustar"
}

pub fn is_elf(header: &[u8]) -> bool {
    header.starts_with(&[0x7f, b'E', b'L', b'F'])
}

/// Heuristic: no NUL bytes and overwhelmingly printable-or-whitespace
/// content in the sampled header.
pub fn looks_text(buf: &[u8]) -> bool {
    if buf.is_empty() || buf.contains(&0) {
        return false;
    }
    let printable = buf
        .iter()
        .filter(|&&b| b == b'\n' || b == b'\r' || b == b'\t' || (0x20..0x7f).contains(&b) || b >= 0x80)
        .count();
    printable * 100 >= buf.len() * 95
}
