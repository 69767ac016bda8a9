//! SVR4 "newc" cpio format, the one the kernel's initramfs unpacker reads.
//!
//! Each entry is a 110-byte ASCII header (`070701` + 13 eight-digit hex
//! fields), the NUL-terminated name, padding to 4 bytes, the data, and padding
//! to 4 bytes again. The archive ends with an entry named `TRAILER!!!`.

use std::io::{self, Write};

pub const MAGIC: &[u8; 6] = b"070701";
pub const TRAILER: &str = "TRAILER!!!";
const HEADER_LEN: usize = 110;

pub const S_IFMT: u32 = 0o170000;
pub const S_IFDIR: u32 = 0o040000;
pub const S_IFREG: u32 = 0o100000;
pub const S_IFLNK: u32 = 0o120000;
pub const S_IFCHR: u32 = 0o020000;
pub const S_IFBLK: u32 = 0o060000;

/// Header fields the writer lets callers choose. Owner, group, mtime and
/// check are always zero.
#[derive(Debug, Clone, Copy, Default)]
pub struct Header {
    pub mode: u32,
    pub nlink: u32,
    pub rdev_major: u32,
    pub rdev_minor: u32,
}

fn pad_len(len: usize) -> usize {
    (4 - len % 4) % 4
}

/// Streaming newc writer. Inode numbers are handed out sequentially from 1.
pub struct NewcWriter<W: Write> {
    inner: W,
    next_ino: u32,
    written: u64,
}

impl<W: Write> NewcWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            next_ino: 1,
            written: 0,
        }
    }

    /// Uncompressed bytes written so far.
    pub fn bytes_written(&self) -> u64 {
        self.written
    }

    fn put(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.inner.write_all(bytes)?;
        self.written += bytes.len() as u64;
        Ok(())
    }

    fn write_raw(&mut self, ino: u32, name: &str, header: Header, data: &[u8]) -> io::Result<()> {
        let filesize = u32::try_from(data.len()).map_err(|_| {
            io::Error::new(io::ErrorKind::InvalidInput, format!("'{}' is too large for cpio", name))
        })?;
        let namesize = name.len() + 1;

        let fields = [
            ino,
            header.mode,
            0, // uid
            0, // gid
            header.nlink,
            0, // mtime
            filesize,
            0, // devmajor
            0, // devminor
            header.rdev_major,
            header.rdev_minor,
            namesize as u32,
            0, // check
        ];
        let mut head = String::with_capacity(HEADER_LEN);
        head.push_str("070701");
        for field in fields {
            head.push_str(&format!("{:08x}", field));
        }

        self.put(head.as_bytes())?;
        self.put(name.as_bytes())?;
        self.put(&[0])?;
        self.put(&[0; 3][..pad_len(HEADER_LEN + namesize)])?;
        self.put(data)?;
        self.put(&[0; 3][..pad_len(data.len())])?;
        Ok(())
    }

    /// Append one entry. `name` must not start with `/`.
    pub fn write_entry(&mut self, name: &str, header: Header, data: &[u8]) -> io::Result<()> {
        let ino = self.next_ino;
        self.next_ino += 1;
        self.write_raw(ino, name, header, data)
    }

    /// Write the trailer and hand back the underlying writer.
    pub fn finish(mut self) -> io::Result<W> {
        let header = Header {
            nlink: 1,
            ..Header::default()
        };
        self.write_raw(0, TRAILER, header, &[])?;
        self.inner.flush()?;
        Ok(self.inner)
    }
}

/// One entry read back from an archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub name: String,
    pub ino: u32,
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub nlink: u32,
    pub mtime: u32,
    pub rdev_major: u32,
    pub rdev_minor: u32,
    pub data: Vec<u8>,
}

impl ArchiveEntry {
    pub fn file_type(&self) -> u32 {
        self.mode & S_IFMT
    }

    pub fn permissions(&self) -> u32 {
        self.mode & 0o7777
    }

    pub fn is_dir(&self) -> bool {
        self.file_type() == S_IFDIR
    }

    pub fn is_file(&self) -> bool {
        self.file_type() == S_IFREG
    }

    pub fn is_symlink(&self) -> bool {
        self.file_type() == S_IFLNK
    }

    pub fn is_char_device(&self) -> bool {
        self.file_type() == S_IFCHR
    }

    pub fn symlink_target(&self) -> Option<&str> {
        if self.is_symlink() {
            std::str::from_utf8(&self.data).ok()
        } else {
            None
        }
    }

    /// Single-letter type used in listings, as `ls -l` shows it.
    pub fn type_char(&self) -> char {
        match self.file_type() {
            S_IFDIR => 'd',
            S_IFLNK => 'l',
            S_IFCHR => 'c',
            S_IFBLK => 'b',
            _ => '-',
        }
    }
}

fn hex_field(header: &[u8], index: usize) -> Result<u32, String> {
    let start = 6 + index * 8;
    let text = std::str::from_utf8(&header[start..start + 8])
        .map_err(|_| format!("non-ASCII header field at offset {}", start))?;
    u32::from_str_radix(text, 16).map_err(|_| format!("bad hex field '{}'", text))
}

/// Parse an uncompressed newc archive, stopping at the trailer.
pub fn parse(bytes: &[u8]) -> Result<Vec<ArchiveEntry>, String> {
    let mut entries = Vec::new();
    let mut pos = 0;

    loop {
        let header = bytes
            .get(pos..pos + HEADER_LEN)
            .ok_or_else(|| format!("truncated header at offset {}", pos))?;
        if &header[..6] != MAGIC {
            return Err(format!("bad magic at offset {}", pos));
        }

        let field = |i| hex_field(header, i);
        let ino = field(0)?;
        let mode = field(1)?;
        let uid = field(2)?;
        let gid = field(3)?;
        let nlink = field(4)?;
        let mtime = field(5)?;
        let filesize = field(6)? as usize;
        let rdev_major = field(9)?;
        let rdev_minor = field(10)?;
        let namesize = field(11)? as usize;

        let name_start = pos + HEADER_LEN;
        let name_bytes = bytes
            .get(name_start..name_start + namesize)
            .ok_or_else(|| format!("truncated name at offset {}", name_start))?;
        let name = std::str::from_utf8(name_bytes.strip_suffix(&[0]).unwrap_or(name_bytes))
            .map_err(|_| format!("entry name at offset {} is not UTF-8", name_start))?
            .to_string();

        let data_start = name_start + namesize + pad_len(HEADER_LEN + namesize);
        let data = bytes
            .get(data_start..data_start + filesize)
            .ok_or_else(|| format!("truncated data for '{}'", name))?
            .to_vec();
        pos = data_start + filesize + pad_len(filesize);

        if name == TRAILER {
            return Ok(entries);
        }
        entries.push(ArchiveEntry {
            name,
            ino,
            mode,
            uid,
            gid,
            nlink,
            mtime,
            rdev_major,
            rdev_minor,
            data,
        });
    }
}
