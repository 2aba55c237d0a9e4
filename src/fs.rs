use log::{debug, info};
use thiserror::Error;

use crate::alloc::Bitmap;
use crate::io::{BlockNumber, BlockStorage};
use crate::node::Inode;

/// Size in bytes of one device block.
pub const BLOCK_SIZE: usize = 512;

/// Direct block pointers per inode. There is no indirect pointer support, so
/// this bounds the largest file the system can hold.
pub const NUM_BLOCK_POINTERS: usize = 4;

/// Longest file name storable in an inode record, in bytes.
pub const MAX_NAME_LEN: usize = 32;

/// Bytes reserved per inode slot on the device. The serialized record is
/// padded up to this size.
pub const INODE_SIZE: usize = 64;

/// Upper bound on file content length.
pub const MAX_FILE_SIZE: usize = NUM_BLOCK_POINTERS * BLOCK_SIZE;

/// Handle for the currently open file. Equals the file's inode index.
pub type Fd = usize;

#[derive(Error, Debug)]
pub enum FsError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("file \"{0}\" already exists")]
    AlreadyExists(String),
    #[error("no free inode slot for \"{0}\"")]
    NoFreeInode(String),
    #[error("file \"{0}\" not found")]
    NotFound(String),
    #[error("descriptor {0} does not match descriptor of open file")]
    DescriptorMismatch(Fd),
    #[error("another file is already open")]
    SessionBusy,
    #[error("payload of {0} bytes does not fit the file's block pointers")]
    FileTooLarge(usize),
    #[error("not enough free blocks for {0} bytes")]
    OutOfSpace(usize),
    #[error("invalid file system block layout")]
    Device(#[from] std::io::Error),
}

/// The one open-file session: the descriptor handed to the caller and the
/// cached copy of its inode. The cache is authoritative until `close`
/// flushes it back to the device.
struct OpenFile {
    fd: Fd,
    inode: Inode,
}

/// A fixed-capacity, single-open-file file system over a block device. Names
/// bind to inode slots, inodes point at data blocks, and a bitmap tracks
/// which blocks are taken; the device persists all three.
///
/// At most one file is open at a time. `create`/`open` bind the session,
/// `close` flushes and releases it, and a second `create`/`open` while a
/// session is active fails with [`FsError::SessionBusy`] rather than
/// dropping unflushed state.
pub struct FileSystem<T: BlockStorage> {
    dev: T,
    open_file: Option<OpenFile>,
}

impl<T: BlockStorage> FileSystem<T> {
    /// Formats the device and mounts an empty file system over it.
    pub fn new(mut dev: T) -> Result<Self, FsError> {
        dev.format()?;
        Ok(Self {
            dev,
            open_file: None,
        })
    }

    /// Binds `name` to the first unused inode slot and makes it the open
    /// file. The new inode is not persisted until the first `write` or
    /// `close`; callers must not assume durability before then.
    ///
    /// The whole table is scanned before a slot is picked so a duplicate
    /// name fails with [`FsError::AlreadyExists`] no matter where it sits
    /// relative to free slots.
    pub fn create(&mut self, name: &str) -> Result<Fd, FsError> {
        if self.open_file.is_some() {
            return Err(FsError::SessionBusy);
        }
        let name = valid_name(name)?;

        let mut free_slot = None;
        for i in 0..self.dev.num_inodes() {
            let inode = self.dev.read_inode(i)?;
            match inode.name() {
                Some(existing) if existing.trim() == name => {
                    return Err(FsError::AlreadyExists(name.to_string()));
                }
                Some(_) => {}
                None => {
                    if free_slot.is_none() {
                        free_slot = Some(i);
                    }
                }
            }
        }

        let fd = free_slot.ok_or_else(|| FsError::NoFreeInode(name.to_string()))?;
        self.open_file = Some(OpenFile {
            fd,
            inode: Inode::named(name),
        });
        info!("created \"{}\" at inode {}", name, fd);
        Ok(fd)
    }

    /// Makes an existing file the open file and returns its descriptor.
    pub fn open(&mut self, name: &str) -> Result<Fd, FsError> {
        if self.open_file.is_some() {
            return Err(FsError::SessionBusy);
        }
        let name = name.trim();

        for i in 0..self.dev.num_inodes() {
            let inode = self.dev.read_inode(i)?;
            let found = match inode.name() {
                Some(existing) => existing.trim() == name,
                None => false,
            };
            if found {
                debug!("opened \"{}\" as descriptor {}", name, i);
                self.open_file = Some(OpenFile { fd: i, inode });
                return Ok(i);
            }
        }

        Err(FsError::NotFound(name.to_string()))
    }

    /// Flushes the open file's cached inode to its slot and releases the
    /// session.
    pub fn close(&mut self, fd: Fd) -> Result<(), FsError> {
        let open = self
            .open_file
            .as_ref()
            .filter(|open| open.fd == fd)
            .ok_or(FsError::DescriptorMismatch(fd))?;

        self.dev.write_inode(&open.inode, open.fd)?;
        self.dev.sync_disk()?;
        self.open_file = None;
        Ok(())
    }

    /// Writes `data` as the open file's entire content and returns the
    /// number of bytes written.
    ///
    /// Blocks are allocated on the first write only; later writes reuse the
    /// same pointers and rewrite their contents. A later write needing more
    /// blocks than were allocated fails with [`FsError::FileTooLarge`]; the
    /// file is never reallocated.
    pub fn write(&mut self, fd: Fd, data: &[u8]) -> Result<usize, FsError> {
        let open = self
            .open_file
            .as_mut()
            .filter(|open| open.fd == fd)
            .ok_or(FsError::DescriptorMismatch(fd))?;

        if data.len() > MAX_FILE_SIZE {
            return Err(FsError::FileTooLarge(data.len()));
        }

        if !open.inode.has_blocks() {
            let needed = (data.len() + BLOCK_SIZE - 1) / BLOCK_SIZE;
            let map_bytes = self.dev.read_free_map()?;
            let mut map = Bitmap::parse(&map_bytes, self.dev.num_blocks());
            let blocks = map
                .allocate(needed)
                .ok_or(FsError::OutOfSpace(data.len()))?;
            self.dev.write_free_map(map.serialize())?;
            for (slot, &blocknr) in blocks.iter().enumerate() {
                open.inode.set_block_pointer(slot, blocknr);
            }
            self.dev.write_inode(&open.inode, fd)?;
            debug!("allocated blocks {:?} for descriptor {}", blocks, fd);
        } else if data.len() > open.inode.block_count() * BLOCK_SIZE {
            return Err(FsError::FileTooLarge(data.len()));
        }

        let pointers: Vec<BlockNumber> = open.inode.block_pointers().collect();
        for (chunk, &blocknr) in data.chunks(BLOCK_SIZE).zip(pointers.iter()) {
            self.dev.write_block(blocknr, chunk)?;
        }

        open.inode.set_size(data.len() as u32);
        self.dev.write_inode(&open.inode, fd)?;
        Ok(data.len())
    }

    /// Reads back the open file's entire content. A file that was never
    /// written reads back empty.
    pub fn read(&mut self, fd: Fd) -> Result<Vec<u8>, FsError> {
        let open = self
            .open_file
            .as_ref()
            .filter(|open| open.fd == fd)
            .ok_or(FsError::DescriptorMismatch(fd))?;

        let size = match open.inode.size() {
            Some(size) => size as usize,
            None => return Ok(Vec::new()),
        };

        let mut content = Vec::with_capacity(open.inode.block_count() * BLOCK_SIZE);
        let mut buf = [0u8; BLOCK_SIZE];
        for blocknr in open.inode.block_pointers() {
            self.dev.read_block(blocknr, &mut buf)?;
            content.extend_from_slice(&buf);
        }
        // The final block is zero-padded on the device; the recorded size
        // says where the content actually ends.
        content.truncate(size);
        Ok(content)
    }

    /// Removes `name`: returns its blocks to the free map, clears its inode
    /// slot, and releases the session when it was the open file. Works
    /// whether or not the file is open.
    pub fn delete(&mut self, name: &str) -> Result<(), FsError> {
        let name = name.trim();

        let mut target = None;
        for i in 0..self.dev.num_inodes() {
            let inode = self.dev.read_inode(i)?;
            if inode.name().map_or(false, |existing| existing.trim() == name) {
                target = Some((i, inode));
                break;
            }
        }
        let (index, inode) = target.ok_or_else(|| FsError::NotFound(name.to_string()))?;

        let map_bytes = self.dev.read_free_map()?;
        let mut map = Bitmap::parse(&map_bytes, self.dev.num_blocks());
        for blocknr in inode.block_pointers() {
            map.set_free(blocknr);
        }
        self.dev.write_free_map(map.serialize())?;
        self.dev.write_inode(&Inode::empty(), index)?;

        if self.open_file.as_ref().map_or(false, |open| open.fd == index) {
            self.open_file = None;
        }
        info!("deleted \"{}\" from inode {}", name, index);
        Ok(())
    }

    /// The descriptor of the open file, if any.
    pub fn descriptor(&self) -> Option<Fd> {
        self.open_file.as_ref().map(|open| open.fd)
    }

    /// How many data blocks the free map currently reports free.
    pub fn free_blocks(&mut self) -> Result<usize, FsError> {
        let map_bytes = self.dev.read_free_map()?;
        Ok(Bitmap::parse(&map_bytes, self.dev.num_blocks()).free_count())
    }
}

fn valid_name(name: &str) -> Result<&str, FsError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(FsError::InvalidArgument(
            "file name must not be empty".to_string(),
        ));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(FsError::InvalidArgument(format!(
            "file name \"{}\" exceeds {} bytes",
            name, MAX_NAME_LEN
        )));
    }
    Ok(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::{MemBlockEmulator, MemBlockEmulatorBuilder};

    fn create_test_fs(blocks: usize, inodes: usize) -> FileSystem<MemBlockEmulator> {
        let dev = MemBlockEmulatorBuilder::new()
            .with_block_count(blocks)
            .with_inode_count(inodes)
            .build()
            .expect("could not initialize disk emulator");
        FileSystem::new(dev).expect("could not format file system")
    }

    #[test]
    fn create_binds_the_session() {
        let mut fs = create_test_fs(8, 4);

        let fd = fs.create("notes.txt").unwrap();
        assert_eq!(fd, 0);
        assert_eq!(fs.descriptor(), Some(fd));
    }

    #[test]
    fn close_releases_the_session() {
        let mut fs = create_test_fs(8, 4);

        let fd = fs.create("notes.txt").unwrap();
        fs.close(fd).unwrap();
        assert_eq!(fs.descriptor(), None);
    }

    #[test]
    fn second_create_while_open_is_rejected() {
        let mut fs = create_test_fs(8, 4);

        fs.create("a.txt").unwrap();
        match fs.create("b.txt").unwrap_err() {
            FsError::SessionBusy => (),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn open_while_open_is_rejected() {
        let mut fs = create_test_fs(8, 4);

        let fd = fs.create("a.txt").unwrap();
        fs.close(fd).unwrap();
        fs.open("a.txt").unwrap();
        match fs.open("a.txt").unwrap_err() {
            FsError::SessionBusy => (),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn empty_names_are_rejected() {
        let mut fs = create_test_fs(8, 4);

        match fs.create("   ").unwrap_err() {
            FsError::InvalidArgument(_) => (),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn close_with_wrong_descriptor_is_rejected() {
        let mut fs = create_test_fs(8, 4);

        let fd = fs.create("a.txt").unwrap();
        assert!(matches!(
            fs.close(fd + 1),
            Err(FsError::DescriptorMismatch(_))
        ));
        // The session survives a mismatched close.
        assert_eq!(fs.descriptor(), Some(fd));
    }

    #[test]
    fn names_are_compared_trimmed() {
        let mut fs = create_test_fs(8, 4);

        let fd = fs.create("  padded.txt  ").unwrap();
        fs.close(fd).unwrap();
        assert_eq!(fs.open("padded.txt").unwrap(), fd);
    }
}
