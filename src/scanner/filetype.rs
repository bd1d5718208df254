//! File type detection using magic bytes.
//!
//! Detection walks an ordered probe table over the first [`SNIFF_SIZE`] bytes;
//! the first probe that fires wins. Nothing is inferred from file names.

use crate::core::types::TypeClassification;
use std::collections::HashSet;
use std::sync::LazyLock;

/// Maximum bytes inspected for type detection.
pub const SNIFF_SIZE: usize = 8 * 1024;

/// MIME type for content no probe recognises.
pub const DEFAULT_MIME: &str = "application/octet-stream";

/// Detected file type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileType {
    /// Windows executable (PE/DOS format)
    Executable,
    /// ELF binary (Linux)
    Elf,
    /// Mach-O binary (macOS)
    MachO,
    /// Java archive
    Jar,
    /// Microsoft Office document (modern XML)
    OfficeXml,
    /// ZIP archive
    Zip,
    /// RAR archive
    Rar,
    /// 7-Zip archive
    SevenZip,
    /// Microsoft Office document (legacy OLE)
    OfficeOle,
    /// GZIP compressed
    Gzip,
    /// BZIP2 compressed
    Bzip2,
    /// XZ compressed
    Xz,
    /// PDF document
    Pdf,
    Png,
    Jpeg,
    Gif,
    Bmp,
    /// PHP source
    Php,
    /// Python script
    Python,
    /// Node.js script
    JavaScript,
    /// Perl script
    Perl,
    /// Ruby script
    Ruby,
    /// POSIX shell script
    ShellScript,
    /// Unknown type
    Unknown,
}

impl FileType {
    /// Get MIME type string.
    pub fn mime_type(&self) -> &'static str {
        match self {
            FileType::Executable => "application/x-msdownload",
            FileType::Elf => "application/x-executable",
            FileType::MachO => "application/x-mach-binary",
            FileType::Jar => "application/java-archive",
            FileType::OfficeXml => "application/vnd.openxmlformats-officedocument",
            FileType::Zip => "application/zip",
            FileType::Rar => "application/x-rar",
            FileType::SevenZip => "application/x-7z-compressed",
            FileType::OfficeOle => "application/vnd.ms-office",
            FileType::Gzip => "application/gzip",
            FileType::Bzip2 => "application/x-bzip2",
            FileType::Xz => "application/x-xz",
            FileType::Pdf => "application/pdf",
            FileType::Png => "image/png",
            FileType::Jpeg => "image/jpeg",
            FileType::Gif => "image/gif",
            FileType::Bmp => "image/bmp",
            FileType::Php => "application/x-php",
            FileType::Python => "application/x-python",
            FileType::JavaScript => "application/x-javascript",
            FileType::Perl => "application/x-perl",
            FileType::Ruby => "application/x-ruby",
            FileType::ShellScript => "application/x-shellscript",
            FileType::Unknown => DEFAULT_MIME,
        }
    }
}

/// One row of the detection table.
enum Probe {
    /// Fixed bytes at a fixed offset
    Magic {
        offset: usize,
        magic: &'static [u8],
        file_type: FileType,
    },
    /// Structural check that may pick between several types
    Custom(fn(&[u8]) -> Option<FileType>),
}

impl Probe {
    fn detect(&self, bytes: &[u8]) -> Option<FileType> {
        match self {
            Probe::Magic {
                offset,
                magic,
                file_type,
            } => bytes
                .get(*offset..)
                .filter(|tail| tail.starts_with(magic))
                .map(|_| *file_type),
            Probe::Custom(probe) => probe(bytes),
        }
    }
}

const fn magic(magic: &'static [u8], file_type: FileType) -> Probe {
    Probe::Magic {
        offset: 0,
        magic,
        file_type,
    }
}

/// Ordered detection table. Containers are refined before the generic ZIP row.
static PROBES: &[Probe] = &[
    Probe::Custom(zip_container),
    magic(b"PK\x03\x04", FileType::Zip),
    magic(b"PK\x05\x06", FileType::Zip),
    magic(b"MZ", FileType::Executable),
    magic(b"\x7fELF", FileType::Elf),
    magic(b"\xfe\xed\xfa\xce", FileType::MachO),
    magic(b"\xfe\xed\xfa\xcf", FileType::MachO),
    magic(b"\xce\xfa\xed\xfe", FileType::MachO),
    magic(b"\xcf\xfa\xed\xfe", FileType::MachO),
    magic(b"\xca\xfe\xba\xbe", FileType::MachO),
    magic(b"\xbe\xba\xfe\xca", FileType::MachO),
    magic(b"Rar!\x1a\x07", FileType::Rar),
    magic(b"7z\xbc\xaf\x27\x1c", FileType::SevenZip),
    magic(b"\xd0\xcf\x11\xe0\xa1\xb1\x1a\xe1", FileType::OfficeOle),
    magic(b"\x1f\x8b", FileType::Gzip),
    magic(b"BZh", FileType::Bzip2),
    magic(b"\xfd7zXZ\x00", FileType::Xz),
    magic(b"%PDF", FileType::Pdf),
    magic(b"\x89PNG\r\n\x1a\n", FileType::Png),
    magic(b"\xff\xd8\xff", FileType::Jpeg),
    magic(b"GIF87a", FileType::Gif),
    magic(b"GIF89a", FileType::Gif),
    magic(b"BM", FileType::Bmp),
    magic(b"<?php", FileType::Php),
    Probe::Custom(shebang),
];

/// MIME types that are always reported as a threat.
static HIGH_RISK_TYPES: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        // Native executables
        "application/x-executable",
        "application/x-dosexec",
        "application/x-sharedlib",
        "application/x-msdownload",
        "application/x-mach-binary",
        "application/vnd.microsoft.portable-executable",
        // Interpreted scripts
        "application/x-python",
        "application/x-javascript",
        "application/x-php",
        "text/x-php",
        "application/x-perl",
        "application/x-ruby",
        // Macro-capable documents
        "application/vnd.ms-office",
        "application/vnd.openxmlformats-officedocument",
        // Archives
        "application/x-rar",
        "application/zip",
        "application/x-7z-compressed",
        "application/java-archive",
        // Other
        "application/x-shellscript",
        "application/x-bat",
        "application/x-com",
    ]
    .into_iter()
    .collect()
});

/// File type detector using magic bytes.
pub struct FileTypeDetector;

impl FileTypeDetector {
    /// Detect file type from the leading bytes of the content.
    pub fn detect_from_bytes(bytes: &[u8]) -> FileType {
        let prefix = &bytes[..bytes.len().min(SNIFF_SIZE)];
        PROBES
            .iter()
            .find_map(|probe| probe.detect(prefix))
            .unwrap_or(FileType::Unknown)
    }

    /// Classify content into a MIME type and its risk flag.
    pub fn classify(bytes: &[u8]) -> TypeClassification {
        let mime_type = Self::detect_from_bytes(bytes).mime_type();
        TypeClassification {
            mime_type: mime_type.to_string(),
            is_high_risk: Self::is_high_risk(mime_type),
        }
    }

    /// Whether a MIME type is on the high-risk denylist.
    pub fn is_high_risk(mime_type: &str) -> bool {
        HIGH_RISK_TYPES.contains(mime_type)
    }
}

/// Refine a ZIP by the name of its first local entry.
fn zip_container(bytes: &[u8]) -> Option<FileType> {
    if !bytes.starts_with(b"PK\x03\x04") || bytes.len() < 30 {
        return None;
    }
    let name_len = u16::from_le_bytes([bytes[26], bytes[27]]) as usize;
    let name = bytes.get(30..30 + name_len)?;

    if name.starts_with(b"META-INF/") {
        Some(FileType::Jar)
    } else if name == b"[Content_Types].xml" {
        Some(FileType::OfficeXml)
    } else {
        None
    }
}

/// Map a `#!` interpreter line to a script type.
fn shebang(bytes: &[u8]) -> Option<FileType> {
    let rest = bytes.strip_prefix(b"#!")?;
    let line_end = rest.iter().position(|&b| b == b'\n').unwrap_or(rest.len());
    let line = std::str::from_utf8(&rest[..line_end]).ok()?;

    let mut tokens = line.split_whitespace();
    let mut program = basename(tokens.next()?);
    if program == "env" {
        program = tokens.find(|t| !t.starts_with('-')).map(basename)?;
    }

    let file_type = if program.starts_with("python") {
        FileType::Python
    } else if program == "node" || program == "nodejs" {
        FileType::JavaScript
    } else if program.starts_with("php") {
        FileType::Php
    } else if program.starts_with("perl") {
        FileType::Perl
    } else if program.starts_with("ruby") {
        FileType::Ruby
    } else if matches!(program, "sh" | "bash" | "zsh" | "dash" | "ksh") {
        FileType::ShellScript
    } else {
        return None;
    };
    Some(file_type)
}

fn basename(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zip_with_first_entry(name: &str) -> Vec<u8> {
        let mut data = b"PK\x03\x04".to_vec();
        data.extend_from_slice(&[0u8; 22]);
        data.extend_from_slice(&(name.len() as u16).to_le_bytes());
        data.extend_from_slice(&[0u8; 2]);
        data.extend_from_slice(name.as_bytes());
        data.extend_from_slice(b"payload");
        data
    }

    #[test]
    fn test_pe_detection() {
        let pe_header = b"MZ\x90\x00\x03\x00\x00\x00\x04\x00\x00\x00";
        let classification = FileTypeDetector::classify(pe_header);
        assert_eq!(classification.mime_type, "application/x-msdownload");
        assert!(classification.is_high_risk);
    }

    #[test]
    fn test_zip_detection() {
        let zip_header = b"PK\x03\x04\x14\x00\x00\x00";
        assert_eq!(FileTypeDetector::detect_from_bytes(zip_header), FileType::Zip);
        assert_eq!(
            FileTypeDetector::detect_from_bytes(&zip_with_first_entry("readme.txt")),
            FileType::Zip
        );
    }

    #[test]
    fn test_zip_container_refinement() {
        assert_eq!(
            FileTypeDetector::detect_from_bytes(&zip_with_first_entry("META-INF/MANIFEST.MF")),
            FileType::Jar
        );
        let docx = FileTypeDetector::classify(&zip_with_first_entry("[Content_Types].xml"));
        assert_eq!(docx.mime_type, "application/vnd.openxmlformats-officedocument");
        assert!(docx.is_high_risk);
    }

    #[test]
    fn test_magic_table() {
        let cases: &[(&[u8], FileType)] = &[
            (b"\x7fELF\x02\x01\x01\x00", FileType::Elf),
            (b"\xcf\xfa\xed\xfe\x07\x00", FileType::MachO),
            (b"Rar!\x1a\x07\x00", FileType::Rar),
            (b"7z\xbc\xaf\x27\x1c\x00\x04", FileType::SevenZip),
            (b"\xd0\xcf\x11\xe0\xa1\xb1\x1a\xe1\x00", FileType::OfficeOle),
            (b"\x1f\x8b\x08\x00", FileType::Gzip),
            (b"%PDF-1.4\n%\xe2\xe3\xcf\xd3", FileType::Pdf),
            (b"\x89PNG\r\n\x1a\n\x00\x00", FileType::Png),
            (b"\xff\xd8\xff\xe0", FileType::Jpeg),
            (b"GIF89a\x01\x00", FileType::Gif),
            (b"<?php echo 1; ?>", FileType::Php),
        ];
        for (bytes, expected) in cases {
            assert_eq!(FileTypeDetector::detect_from_bytes(bytes), *expected);
        }
    }

    #[test]
    fn test_shebang_interpreters() {
        let cases: &[(&[u8], FileType)] = &[
            (b"#!/usr/bin/python3\nprint(1)", FileType::Python),
            (b"#!/usr/bin/env python\nprint(1)", FileType::Python),
            (b"#!/usr/bin/env -S node --harmony\n", FileType::JavaScript),
            (b"#!/usr/bin/perl -w\n", FileType::Perl),
            (b"#!/usr/bin/env ruby\n", FileType::Ruby),
            (b"#!/bin/bash\necho hi", FileType::ShellScript),
            (b"#!/bin/sh", FileType::ShellScript),
        ];
        for (bytes, expected) in cases {
            assert_eq!(FileTypeDetector::detect_from_bytes(bytes), *expected);
        }

        assert_eq!(
            FileTypeDetector::detect_from_bytes(b"#!/usr/bin/awk -f\n"),
            FileType::Unknown
        );
    }

    #[test]
    fn test_unknown_defaults_to_octet_stream() {
        let samples: [&[u8]; 3] = [b"", b"x", b"plain text notes"];
        for bytes in samples {
            let classification = FileTypeDetector::classify(bytes);
            assert_eq!(classification.mime_type, DEFAULT_MIME);
            assert!(!classification.is_high_risk);
        }
    }

    #[test]
    fn test_only_prefix_is_inspected() {
        let mut data = vec![b'a'; SNIFF_SIZE];
        data.extend_from_slice(b"MZ");
        assert_eq!(FileTypeDetector::detect_from_bytes(&data), FileType::Unknown);
    }

    #[test]
    fn test_high_risk_set() {
        assert!(FileTypeDetector::is_high_risk("application/x-dosexec"));
        assert!(FileTypeDetector::is_high_risk("text/x-php"));
        assert!(FileTypeDetector::is_high_risk("application/x-com"));
        assert!(!FileTypeDetector::is_high_risk("application/pdf"));
        assert!(!FileTypeDetector::is_high_risk("image/png"));
        assert!(!FileTypeDetector::is_high_risk("APPLICATION/ZIP"));
    }
}
