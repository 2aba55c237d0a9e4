use std::io::{Error, ErrorKind};

use crate::fs::{BLOCK_SIZE, INODE_SIZE};
use crate::io::block::{BlockNumber, BlockStorage, InodeIndex};
use crate::node::{Inode, RawInode, INODE_RECORD_SIZE};

pub const DEFAULT_BLOCK_COUNT: usize = 256;
pub const DEFAULT_INODE_COUNT: usize = 16;

/// Emulates block storage entirely in memory. This is the simulated medium
/// the file system runs against: three byte regions for the free map, the
/// inode table, and the data blocks, with no persistence beyond the process.
pub struct MemBlockEmulator {
    free_map: Vec<u8>,
    inode_table: Vec<u8>,
    data: Vec<u8>,
    block_count: usize,
    inode_count: usize,
}

impl BlockStorage for MemBlockEmulator {
    fn num_blocks(&self) -> usize {
        self.block_count
    }

    fn num_inodes(&self) -> usize {
        self.inode_count
    }

    fn format(&mut self) -> std::io::Result<()> {
        for byte in self.free_map.iter_mut() {
            *byte = 0;
        }
        for byte in self.inode_table.iter_mut() {
            *byte = 0;
        }
        for byte in self.data.iter_mut() {
            *byte = 0;
        }
        Ok(())
    }

    fn read_inode(&mut self, index: InodeIndex) -> std::io::Result<Inode> {
        if index > (self.inode_count - 1) {
            return Err(Error::new(ErrorKind::InvalidInput, "inode slot out of range"));
        }
        let offset = index * INODE_SIZE;
        let raw = RawInode::parse(&self.inode_table[offset..offset + INODE_RECORD_SIZE]);
        Ok(Inode::from(&raw))
    }

    fn write_inode(&mut self, inode: &Inode, index: InodeIndex) -> std::io::Result<()> {
        if index > (self.inode_count - 1) {
            return Err(Error::new(ErrorKind::InvalidInput, "inode slot out of range"));
        }
        let offset = index * INODE_SIZE;
        let raw = RawInode::from(inode);
        self.inode_table[offset..offset + INODE_RECORD_SIZE].copy_from_slice(raw.serialize());
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
        let start = blocknr * BLOCK_SIZE;
        buf[..BLOCK_SIZE].copy_from_slice(&self.data[start..start + BLOCK_SIZE]);
        Ok(())
    }

    /// Short writes zero-pad the block tail; writes that exceed the block
    /// size are truncated.
    fn write_block(&mut self, blocknr: BlockNumber, buf: &[u8]) -> std::io::Result<()> {
        if blocknr > (self.block_count - 1) {
            return Err(Error::new(ErrorKind::InvalidInput, "block out of range"));
        }
        let max = if BLOCK_SIZE < buf.len() {
            BLOCK_SIZE
        } else {
            buf.len()
        };
        let start = blocknr * BLOCK_SIZE;
        let block = &mut self.data[start..start + BLOCK_SIZE];
        block[..max].copy_from_slice(&buf[..max]);
        for byte in block[max..].iter_mut() {
            *byte = 0;
        }
        Ok(())
    }

    fn read_free_map(&mut self) -> std::io::Result<Vec<u8>> {
        Ok(self.free_map.clone())
    }

    fn write_free_map(&mut self, map: &[u8]) -> std::io::Result<()> {
        if map.len() < self.free_map.len() {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                "free map shorter than device region",
            ));
        }
        let len = self.free_map.len();
        self.free_map.copy_from_slice(&map[..len]);
        Ok(())
    }

    fn sync_disk(&mut self) -> std::io::Result<()> {
        // Nothing buffered; every write lands in the backing vectors directly.
        Ok(())
    }
}

pub struct MemBlockEmulatorBuilder {
    block_count: usize,
    inode_count: usize,
}

impl Default for MemBlockEmulatorBuilder {
    fn default() -> Self {
        Self {
            block_count: DEFAULT_BLOCK_COUNT,
            inode_count: DEFAULT_INODE_COUNT,
        }
    }
}

impl MemBlockEmulatorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the number of data blocks in the emulated device.
    pub fn with_block_count(mut self, blocks: usize) -> Self {
        self.block_count = blocks;
        self
    }

    /// Sets the number of inode slots in the emulated device.
    pub fn with_inode_count(mut self, inodes: usize) -> Self {
        self.inode_count = inodes;
        self
    }

    pub fn build(self) -> std::io::Result<MemBlockEmulator> {
        debug_assert!(self.block_count > 0);
        debug_assert!(self.inode_count > 0);
        Ok(MemBlockEmulator {
            free_map: vec![0; (self.block_count + 7) / 8],
            inode_table: vec![0; self.inode_count * INODE_SIZE],
            data: vec![0; self.block_count * BLOCK_SIZE],
            block_count: self.block_count,
            inode_count: self.inode_count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn emulator(blocks: usize, inodes: usize) -> MemBlockEmulator {
        MemBlockEmulatorBuilder::new()
            .with_block_count(blocks)
            .with_inode_count(inodes)
            .build()
            .expect("could not build memory emulator")
    }

    #[test]
    fn can_read_and_write_blocks() {
        let mut disk = emulator(4, 4);

        let block = vec![0x55; BLOCK_SIZE];
        disk.write_block(2, &block).unwrap();

        let mut read_block = vec![0x00; BLOCK_SIZE];
        disk.read_block(3, &mut read_block).unwrap();
        assert_eq!(read_block, vec![0x00; BLOCK_SIZE]);

        disk.read_block(2, &mut read_block).unwrap();
        assert_eq!(read_block, vec![0x55; BLOCK_SIZE]);
    }

    #[test]
    fn short_write_zero_pads_block_tail() {
        let mut disk = emulator(2, 4);

        disk.write_block(0, &vec![0xAA; BLOCK_SIZE]).unwrap();
        disk.write_block(0, b"abc").unwrap();

        let mut read_block = vec![0x00; BLOCK_SIZE];
        disk.read_block(0, &mut read_block).unwrap();
        assert_eq!(&read_block[..3], b"abc");
        assert_eq!(&read_block[3..], &vec![0x00; BLOCK_SIZE - 3][..]);
    }

    #[test]
    fn read_block_beyond_range_is_an_error() {
        let mut disk = emulator(1, 4);

        let mut buf = vec![0x00; BLOCK_SIZE];
        assert!(disk.read_block(1, &mut buf).is_err());
        assert!(disk.write_block(1, &buf).is_err());
    }

    #[test]
    fn inode_slots_round_trip() {
        let mut disk = emulator(4, 4);

        let mut node = Inode::named("slot.bin");
        node.set_size(12);
        node.set_block_pointer(0, 1);
        disk.write_inode(&node, 3).unwrap();

        assert_eq!(disk.read_inode(3).unwrap(), node);
        assert!(disk.read_inode(0).unwrap().is_unused());
        assert!(disk.read_inode(4).is_err());
    }

    #[test]
    fn format_clears_every_region() {
        let mut disk = emulator(2, 2);

        disk.write_block(0, b"data").unwrap();
        disk.write_inode(&Inode::named("a"), 0).unwrap();
        disk.write_free_map(&[0xFF]).unwrap();

        disk.format().unwrap();

        assert!(disk.read_inode(0).unwrap().is_unused());
        assert_eq!(disk.read_free_map().unwrap(), vec![0x00]);
        let mut buf = vec![0xFF; BLOCK_SIZE];
        disk.read_block(0, &mut buf).unwrap();
        assert_eq!(buf, vec![0x00; BLOCK_SIZE]);
    }
}
