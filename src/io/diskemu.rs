use std::fs::File;
use std::io::prelude::*;
use std::io::{BufWriter, Error, ErrorKind, SeekFrom};

use crate::fs::{BLOCK_SIZE, INODE_SIZE};
use crate::io::block::{BlockNumber, BlockStorage, InodeIndex};
use crate::node::{Inode, RawInode, INODE_RECORD_SIZE};

/// Rounds a byte length up to whole device blocks.
fn blocks_for(bytes: usize) -> usize {
    (bytes + BLOCK_SIZE - 1) / BLOCK_SIZE
}

/// Emulates block disk/flash storage in userspace using a file as block
/// storage. This is only meant to be used for file system development and
/// testing.
///
/// # Layout
/// =========================================
/// | Free map | Inode table | Data blocks |
/// =========================================
///
/// Each region starts on a block boundary; the free map and inode table
/// occupy as many whole blocks as their byte lengths require.
pub struct FileBlockEmulator {
    /// The file must be a fixed-size file some exact multiple of the size of
    /// a block.
    fd: File,
    /// The total number of data blocks available in the file store.
    block_count: usize,
    /// The total number of inode slots available in the file store.
    inode_count: usize,
}

impl FileBlockEmulator {
    /// Returns ownership of the underlying file descriptor to the caller.
    pub fn into_file(self) -> File {
        self.fd
    }

    fn free_map_len(&self) -> usize {
        (self.block_count + 7) / 8
    }

    fn inode_region_offset(&self) -> u64 {
        (blocks_for(self.free_map_len()) * BLOCK_SIZE) as u64
    }

    fn data_region_offset(&self) -> u64 {
        self.inode_region_offset()
            + (blocks_for(self.inode_count * INODE_SIZE) * BLOCK_SIZE) as u64
    }

    fn total_blocks(&self) -> usize {
        blocks_for(self.free_map_len())
            + blocks_for(self.inode_count * INODE_SIZE)
            + self.block_count
    }
}

impl BlockStorage for FileBlockEmulator {
    fn num_blocks(&self) -> usize {
        self.block_count
    }

    fn num_inodes(&self) -> usize {
        self.inode_count
    }

    fn format(&mut self) -> std::io::Result<()> {
        self.fd.seek(SeekFrom::Start(0))?;
        let total = self.total_blocks();
        let mut bfd = BufWriter::new(&self.fd);
        // Zero out the "disk" blocks, buffering each write to prevent
        // excessive syscalls.
        for _ in 0..total {
            bfd.write_all(vec![0x00; BLOCK_SIZE].as_slice())?;
        }
        bfd.flush()?;
        Ok(())
    }

    fn read_inode(&mut self, index: InodeIndex) -> std::io::Result<Inode> {
        if index > (self.inode_count - 1) {
            return Err(Error::new(ErrorKind::InvalidInput, "inode slot out of range"));
        }
        self.fd.seek(SeekFrom::Start(
            self.inode_region_offset() + (index * INODE_SIZE) as u64,
        ))?;

        let mut record = [0u8; INODE_RECORD_SIZE];
        self.fd.read_exact(&mut record)?;
        Ok(Inode::from(&RawInode::parse(&record)))
    }

    fn write_inode(&mut self, inode: &Inode, index: InodeIndex) -> std::io::Result<()> {
        if index > (self.inode_count - 1) {
            return Err(Error::new(ErrorKind::InvalidInput, "inode slot out of range"));
        }
        self.fd.seek(SeekFrom::Start(
            self.inode_region_offset() + (index * INODE_SIZE) as u64,
        ))?;

        let raw = RawInode::from(inode);
        self.fd.write_all(raw.serialize())?;
        Ok(())
    }

    fn read_block(&mut self, blocknr: BlockNumber, buf: &mut [u8]) -> std::io::Result<()> {
        if blocknr > (self.block_count - 1) {
            return Err(Error::new(ErrorKind::InvalidInput, "block out of range"));
        }
        if buf.len() < BLOCK_SIZE {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                "buffer does not contain enough space to read block",
            ));
        }
        self.fd.seek(SeekFrom::Start(
            self.data_region_offset() + (blocknr * BLOCK_SIZE) as u64,
        ))?;
        self.fd.read_exact(&mut buf[..BLOCK_SIZE])?;
        Ok(())
    }

    /// Short writes zero-pad the block tail; writes that exceed the block
    /// size are truncated.
    fn write_block(&mut self, blocknr: BlockNumber, buf: &[u8]) -> std::io::Result<()> {
        if blocknr > (self.block_count - 1) {
            return Err(Error::new(ErrorKind::InvalidInput, "block out of range"));
        }
        self.fd.seek(SeekFrom::Start(
            self.data_region_offset() + (blocknr * BLOCK_SIZE) as u64,
        ))?;

        let max = if BLOCK_SIZE < buf.len() {
            BLOCK_SIZE
        } else {
            buf.len()
        };
        let mut block = [0u8; BLOCK_SIZE];
        block[..max].copy_from_slice(&buf[..max]);
        self.fd.write_all(&block)?;
        Ok(())
    }

    fn read_free_map(&mut self) -> std::io::Result<Vec<u8>> {
        self.fd.seek(SeekFrom::Start(0))?;
        let mut map = vec![0u8; self.free_map_len()];
        self.fd.read_exact(&mut map)?;
        Ok(map)
    }

    fn write_free_map(&mut self, map: &[u8]) -> std::io::Result<()> {
        if map.len() < self.free_map_len() {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                "free map shorter than device region",
            ));
        }
        self.fd.seek(SeekFrom::Start(0))?;
        self.fd.write_all(&map[..self.free_map_len()])?;
        Ok(())
    }

    fn sync_disk(&mut self) -> std::io::Result<()> {
        self.fd.sync_all()?;
        Ok(())
    }
}

pub struct FileBlockEmulatorBuilder {
    fd: File,
    block_count: usize,
    inode_count: usize,
}

impl From<File> for FileBlockEmulatorBuilder {
    fn from(fd: File) -> Self {
        FileBlockEmulatorBuilder {
            fd,
            block_count: 0,
            inode_count: super::memdisk::DEFAULT_INODE_COUNT,
        }
    }
}

impl FileBlockEmulatorBuilder {
    /// Sets the number of data blocks in the block store device.
    pub fn with_data_blocks(mut self, blocks: usize) -> Self {
        self.block_count = blocks;
        self
    }

    /// Sets the number of inode slots in the block store device.
    pub fn with_inode_slots(mut self, inodes: usize) -> Self {
        self.inode_count = inodes;
        self
    }

    /// This builder assumes ownership of the file descriptor used and does
    /// destructive things to prepare the file for use. Additionally,
    /// ownership of the file is transferred to the emulator meaning this
    /// builder can only be used to create one emulator.
    pub fn build(self) -> std::io::Result<FileBlockEmulator> {
        debug_assert!(self.block_count > 0);
        debug_assert!(self.inode_count > 0);
        let mut emu = FileBlockEmulator {
            fd: self.fd,
            block_count: self.block_count,
            inode_count: self.inode_count,
        };
        emu.format()?;
        Ok(emu)
    }
}
