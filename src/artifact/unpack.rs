//! Post-fetch transformations that turn a download into the real payload.

use flate2::read::GzDecoder;
use std::fs::{self, File};
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{Error, Result};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// How to get from the fetched file to the payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Unpack {
    /// The fetched file is the payload.
    #[default]
    None,
    /// The fetched file is gzip-compressed payload (e.g. `Image.gz`).
    Gzip,
    /// The payload is one member of a tarball, optionally gzip-compressed.
    TarMember(String),
}

impl FromStr for Unpack {
    type Err = Error;

    /// Parses `none`, `gzip` or `tar:<member>`.
    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "" | "none" => Ok(Unpack::None),
            "gzip" | "gz" => Ok(Unpack::Gzip),
            other => match other.strip_prefix("tar:") {
                Some(member) if !member.is_empty() => Ok(Unpack::TarMember(member.to_string())),
                _ => Err(Error::Config(format!(
                    "invalid unpack mode '{}' (expected none, gzip or tar:<member>)",
                    other
                ))),
            },
        }
    }
}

impl Unpack {
    /// Produce the payload for `fetched`, writing into `out` when a transformation
    /// is needed. Returns the path holding the payload.
    pub(crate) fn apply(&self, name: &str, fetched: &Path, out: &Path) -> Result<PathBuf> {
        match self {
            Unpack::None => Ok(fetched.to_path_buf()),
            Unpack::Gzip => {
                let input = File::open(fetched).map_err(|e| Error::integrity(name, fetched, e))?;
                let mut decoder = GzDecoder::new(BufReader::new(input));
                write_payload(name, fetched, &mut decoder, out)?;
                Ok(out.to_path_buf())
            }
            Unpack::TarMember(member) => {
                extract_member(name, fetched, member, out)?;
                Ok(out.to_path_buf())
            }
        }
    }
}

fn write_payload(name: &str, source: &Path, reader: &mut dyn Read, out: &Path) -> Result<()> {
    let mut file = File::create(out).map_err(|e| Error::integrity(name, out, e))?;
    io::copy(reader, &mut file).map_err(|e| {
        let _ = fs::remove_file(out);
        Error::integrity(name, source, format!("could not decode payload: {}", e))
    })?;
    Ok(())
}

fn is_gzip(file: &mut File) -> io::Result<bool> {
    let mut magic = [0u8; 2];
    let n = file.read(&mut magic)?;
    file.seek(SeekFrom::Start(0))?;
    Ok(n == 2 && magic == GZIP_MAGIC)
}

/// Member names match on the full path (without a leading `./`) or on the
/// final component, so `busybox` finds `busybox-1.36/busybox`.
fn member_matches(entry_path: &Path, member: &str) -> bool {
    let wanted = member.trim_start_matches("./");
    let full = entry_path.to_string_lossy();
    full.trim_start_matches("./") == wanted
        || (!wanted.contains('/')
            && entry_path
                .file_name()
                .is_some_and(|n| n.to_string_lossy() == wanted))
}

fn extract_member(name: &str, tarball: &Path, member: &str, out: &Path) -> Result<()> {
    let mut file = File::open(tarball).map_err(|e| Error::integrity(name, tarball, e))?;
    let gz = is_gzip(&mut file).map_err(|e| Error::integrity(name, tarball, e))?;
    let reader: Box<dyn Read> = if gz {
        Box::new(GzDecoder::new(BufReader::new(file)))
    } else {
        Box::new(BufReader::new(file))
    };

    let mut archive = tar::Archive::new(reader);
    let entries = archive
        .entries()
        .map_err(|e| Error::integrity(name, tarball, format!("not a tar archive: {}", e)))?;

    for entry in entries {
        let mut entry =
            entry.map_err(|e| Error::integrity(name, tarball, format!("corrupt tar: {}", e)))?;
        if !entry.header().entry_type().is_file() {
            continue;
        }
        let path = entry
            .path()
            .map_err(|e| Error::integrity(name, tarball, e))?
            .into_owned();
        if member_matches(&path, member) {
            return write_payload(name, tarball, &mut entry, out);
        }
    }

    Err(Error::integrity(
        name,
        tarball,
        format!("member '{}' not found in archive", member),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_tarball(path: &Path, files: &[(&str, &[u8])], gzip: bool) {
        let file = File::create(path).unwrap();
        let writer: Box<dyn Write> = if gzip {
            Box::new(GzEncoder::new(file, Compression::fast()))
        } else {
            Box::new(file)
        };
        let mut builder = tar::Builder::new(writer);
        for (name, data) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o755);
            header.set_cksum();
            builder.append_data(&mut header, name, *data).unwrap();
        }
        builder.into_inner().unwrap().flush().unwrap();
    }

    #[test]
    fn test_parse_modes() {
        assert_eq!("none".parse::<Unpack>().unwrap(), Unpack::None);
        assert_eq!("gzip".parse::<Unpack>().unwrap(), Unpack::Gzip);
        assert_eq!(
            "tar:bin/busybox".parse::<Unpack>().unwrap(),
            Unpack::TarMember("bin/busybox".into())
        );
        assert!("tar:".parse::<Unpack>().is_err());
        assert!("zip".parse::<Unpack>().is_err());
    }

    #[test]
    fn test_extract_member_from_gzipped_tar() {
        let temp = TempDir::new().unwrap();
        let tarball = temp.path().join("busybox.tar.gz");
        write_tarball(
            &tarball,
            &[("busybox-1.36/README", b"docs"), ("busybox-1.36/busybox", b"payload")],
            true,
        );

        let out = temp.path().join("busybox");
        let got = Unpack::TarMember("busybox".into())
            .apply("busybox", &tarball, &out)
            .unwrap();
        assert_eq!(got, out);
        assert_eq!(fs::read(&out).unwrap(), b"payload");
    }

    #[test]
    fn test_extract_member_from_plain_tar_by_full_path() {
        let temp = TempDir::new().unwrap();
        let tarball = temp.path().join("kernel.tar");
        write_tarball(&tarball, &[("boot/Image", b"kernel")], false);

        let out = temp.path().join("Image");
        Unpack::TarMember("boot/Image".into())
            .apply("kernel", &tarball, &out)
            .unwrap();
        assert_eq!(fs::read(&out).unwrap(), b"kernel");
    }

    #[test]
    fn test_missing_member_is_integrity_error() {
        let temp = TempDir::new().unwrap();
        let tarball = temp.path().join("busybox.tar.gz");
        write_tarball(&tarball, &[("README", b"docs")], true);

        let err = Unpack::TarMember("busybox".into())
            .apply("busybox", &tarball, &temp.path().join("out"))
            .unwrap_err();
        assert!(matches!(err, Error::Integrity { .. }));
    }

    #[test]
    fn test_gzip_payload() {
        let temp = TempDir::new().unwrap();
        let gz = temp.path().join("Image.gz");
        let mut enc = GzEncoder::new(File::create(&gz).unwrap(), Compression::fast());
        enc.write_all(b"uncompressed kernel").unwrap();
        enc.finish().unwrap();

        let out = temp.path().join("Image");
        Unpack::Gzip.apply("kernel", &gz, &out).unwrap();
        assert_eq!(fs::read(&out).unwrap(), b"uncompressed kernel");
    }

    #[test]
    fn test_gzip_of_garbage_is_integrity_error() {
        let temp = TempDir::new().unwrap();
        let bogus = temp.path().join("Image.gz");
        fs::write(&bogus, b"this is not gzip").unwrap();

        let out = temp.path().join("Image");
        let err = Unpack::Gzip.apply("kernel", &bogus, &out).unwrap_err();
        assert!(matches!(err, Error::Integrity { .. }));
        assert!(!out.exists());
    }
}
