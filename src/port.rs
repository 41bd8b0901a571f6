//! Register access boundary.
//!
//! The measurement engine only ever touches hardware through
//! [`RegisterPort`]: byte reads and writes at offsets within one unit's I/O
//! window. Whether the window is port-mapped, memory-mapped or simulated is
//! the implementor's business.

use std::io;
#[cfg(unix)]
use std::{
    fs::{File, OpenOptions},
    path::Path,
};

#[cfg(unix)]
use tracing::{debug, trace};

#[cfg(unix)]
use crate::regs;

/// Byte-wide access to one unit's register window.
///
/// Both operations are synchronous and may be slow.
pub trait RegisterPort: Send {
    /// Read the register at `offset`.
    fn read_byte(&mut self, offset: u16) -> io::Result<u8>;

    /// Write `value` to the register at `offset`.
    fn write_byte(&mut self, offset: u16, value: u8) -> io::Result<()>;

    /// Whether the unit behind this window is still physically present.
    fn is_present(&self) -> bool {
        true
    }
}

impl<P: RegisterPort + ?Sized> RegisterPort for Box<P> {
    fn read_byte(&mut self, offset: u16) -> io::Result<u8> {
        (**self).read_byte(offset)
    }

    fn write_byte(&mut self, offset: u16, value: u8) -> io::Result<()> {
        (**self).write_byte(offset, value)
    }

    fn is_present(&self) -> bool {
        (**self).is_present()
    }
}

/// I/O-port window accessed through a port device node such as `/dev/port`.
///
/// The node is addressed by absolute port number, so every access is issued
/// at `base + offset`. Requires the privileges the node demands.
#[cfg(unix)]
#[derive(Debug)]
pub struct IoPortWindow {
    file: File,
    base: u64,
}

#[cfg(unix)]
impl IoPortWindow {
    /// Open the port device node with the window starting at `base`.
    pub fn open(path: impl AsRef<Path>, base: u64) -> io::Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        debug!(path = %path.display(), base = format_args!("{:#x}", base), "Opened I/O port window");
        Ok(Self { file, base })
    }

    fn address(&self, offset: u16) -> io::Result<u64> {
        if offset >= regs::WINDOW_SIZE {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("offset {:#x} outside register window", offset),
            ));
        }
        Ok(self.base + u64::from(offset))
    }
}

#[cfg(unix)]
impl RegisterPort for IoPortWindow {
    fn read_byte(&mut self, offset: u16) -> io::Result<u8> {
        use std::os::unix::fs::FileExt;

        let mut buf = [0u8; 1];
        self.file.read_exact_at(&mut buf, self.address(offset)?)?;
        trace!(offset, value = buf[0], "inb");
        Ok(buf[0])
    }

    fn write_byte(&mut self, offset: u16, value: u8) -> io::Result<()> {
        use std::os::unix::fs::FileExt;

        trace!(offset, value, "outb");
        self.file.write_all_at(&[value], self.address(offset)?)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::io::{Read, Seek, SeekFrom};

    #[test]
    fn test_window_reads_and_writes_at_base_offset() {
        let mut backing = tempfile::tempfile().unwrap();
        backing.set_len(0x120).unwrap();
        let mut window = IoPortWindow {
            file: backing.try_clone().unwrap(),
            base: 0x100,
        };

        window.write_byte(regs::CONFIG_REG, 0x5A).unwrap();
        assert_eq!(window.read_byte(regs::CONFIG_REG).unwrap(), 0x5A);

        let mut raw = [0u8; 1];
        backing.seek(SeekFrom::Start(0x103)).unwrap();
        backing.read_exact(&mut raw).unwrap();
        assert_eq!(raw[0], 0x5A);
    }

    #[test]
    fn test_window_rejects_out_of_range_offset() {
        let backing = tempfile::tempfile().unwrap();
        let mut window = IoPortWindow {
            file: backing,
            base: 0,
        };
        let err = window.read_byte(regs::WINDOW_SIZE).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }
}
