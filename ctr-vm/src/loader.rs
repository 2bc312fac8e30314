//! Program loaders.
//!
//! A loader is picked by inspecting the file contents. Only plain ARM ELF
//! images are loaded here; the container formats are recognised so callers
//! get a precise message, but have no loader.

use crate::error::LoaderError;
use crate::kernel::Process;
use goblin::elf::header::EM_ARM;
use goblin::elf::{Elf, program_header::PT_LOAD};
use std::fmt;
use std::path::{Path, PathBuf};

/// System mode reported when the image does not carry one (production layout).
pub const DEFAULT_SYSTEM_MODE: u32 = 2;

/// New 3DS mode reported when the image does not carry one (legacy).
pub const DEFAULT_N3DS_MODE: u8 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    Cci,
    Cxi,
    Cia,
    Elf,
    ThreeDsx,
    Unknown,
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FileType::Cci => "CCI",
            FileType::Cxi => "CXI",
            FileType::Cia => "CIA",
            FileType::Elf => "ELF",
            FileType::ThreeDsx => "3DSX",
            FileType::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Guess the file type from magic numbers.
pub fn identify(data: &[u8]) -> FileType {
    if data.starts_with(b"\x7fELF") {
        return FileType::Elf;
    }
    if data.starts_with(b"3DSX") {
        return FileType::ThreeDsx;
    }
    match data.get(0x100..0x104) {
        Some(b"NCSD") => return FileType::Cci,
        Some(b"NCCH") => return FileType::Cxi,
        _ => {}
    }
    // CIA images open with a fixed 0x2020-byte archive header size.
    if data.len() >= 4 && u32::from_le_bytes([data[0], data[1], data[2], data[3]]) == 0x2020 {
        return FileType::Cia;
    }
    FileType::Unknown
}

/// Loader for one program image.
pub trait Loader: Send {
    fn file_type(&self) -> FileType;

    fn load_kernel_system_mode(&mut self) -> Result<u32, LoaderError> {
        Ok(DEFAULT_SYSTEM_MODE)
    }

    fn load_kernel_n3ds_mode(&mut self) -> Result<u8, LoaderError> {
        Ok(DEFAULT_N3DS_MODE)
    }

    /// Load the program and describe the resulting process.
    fn load(&mut self) -> Result<Process, LoaderError>;

    fn read_program_id(&mut self) -> Result<u64, LoaderError> {
        Err(LoaderError::NotImplemented)
    }

    /// Raw image bytes, when the loader keeps them.
    fn image(&self) -> Option<&[u8]> {
        None
    }
}

/// Find a loader for `path`, or `None` when the file can't be read or no
/// loader understands it.
pub fn get_loader(path: &Path) -> Option<Box<dyn Loader>> {
    let data = match std::fs::read(path) {
        Ok(data) => data,
        Err(e) => {
            log::error!("Failed to load file {}: {}", path.display(), e);
            return None;
        }
    };

    match identify(&data) {
        FileType::Elf => {
            log::debug!("Loading {} as ELF", path.display());
            Some(Box::new(ElfLoader::new(path, data)))
        }
        FileType::Unknown => {
            log::error!("Unrecognised file format for {}", path.display());
            None
        }
        other => {
            log::error!("No loader for {} image {}", other, path.display());
            None
        }
    }
}

/// Loader for 32-bit ARM ELF executables.
pub struct ElfLoader {
    path: PathBuf,
    data: Vec<u8>,
    loaded: bool,
}

impl ElfLoader {
    pub fn new(path: &Path, data: Vec<u8>) -> Self {
        Self {
            path: path.to_path_buf(),
            data,
            loaded: false,
        }
    }

    fn process_name(&self) -> String {
        self.path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "process".to_string())
    }
}

impl Loader for ElfLoader {
    fn file_type(&self) -> FileType {
        FileType::Elf
    }

    fn load(&mut self) -> Result<Process, LoaderError> {
        if self.loaded {
            return Err(LoaderError::AlreadyLoaded);
        }

        let elf = Elf::parse(&self.data).map_err(|e| {
            log::debug!("ELF parse error: {}", e);
            LoaderError::InvalidFormat
        })?;
        if elf.is_64 || elf.header.e_machine != EM_ARM {
            return Err(LoaderError::InvalidFormat);
        }

        let mut segments = 0;
        for ph in &elf.program_headers {
            if ph.p_type != PT_LOAD || ph.p_memsz == 0 {
                continue;
            }
            let end = ph
                .p_offset
                .checked_add(ph.p_filesz)
                .ok_or_else(|| LoaderError::Malformed("segment end overflow".to_string()))?;
            if end > self.data.len() as u64 {
                return Err(LoaderError::Malformed(format!(
                    "segment at offset 0x{:x} exceeds file bounds",
                    ph.p_offset
                )));
            }
            if ph.p_filesz > ph.p_memsz {
                return Err(LoaderError::Malformed(format!(
                    "segment 0x{:x} file size exceeds memory size",
                    ph.p_vaddr
                )));
            }
            segments += 1;
        }
        if segments == 0 {
            return Err(LoaderError::Malformed("no loadable segments".to_string()));
        }

        log::debug!("ELF loaded: entry=0x{:x}, segments={}", elf.entry, segments);
        self.loaded = true;
        Ok(Process {
            name: self.process_name(),
            entry_point: elf.entry,
            segments,
        })
    }

    fn image(&self) -> Option<&[u8]> {
        Some(&self.data)
    }
}


#[cfg(test)]
mod tests {
    use super::test_images::*;
    use super::*;
    use std::io::Write;

    fn write_temp(bytes: &[u8]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(bytes).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_identify() {
        assert_eq!(identify(&arm_elf()), FileType::Elf);
        assert_eq!(identify(b"3DSX\0\0\0\0"), FileType::ThreeDsx);

        let mut ncch = vec![0u8; 0x200];
        ncch[0x100..0x104].copy_from_slice(b"NCCH");
        assert_eq!(identify(&ncch), FileType::Cxi);
        ncch[0x100..0x104].copy_from_slice(b"NCSD");
        assert_eq!(identify(&ncch), FileType::Cci);

        assert_eq!(identify(&0x2020u32.to_le_bytes()), FileType::Cia);
        assert_eq!(identify(b"not a program"), FileType::Unknown);
        assert_eq!(identify(&[]), FileType::Unknown);
    }

    #[test]
    fn test_load_arm_elf() {
        let file = write_temp(&arm_elf());
        let mut loader = get_loader(file.path()).expect("ELF loader");
        assert_eq!(loader.file_type(), FileType::Elf);
        assert_eq!(loader.load_kernel_system_mode().unwrap(), DEFAULT_SYSTEM_MODE);
        assert_eq!(loader.load_kernel_n3ds_mode().unwrap(), DEFAULT_N3DS_MODE);

        let process = loader.load().unwrap();
        assert_eq!(process.entry_point, ENTRY as u64);
        assert_eq!(process.segments, 1);
        assert!(matches!(loader.read_program_id(), Err(LoaderError::NotImplemented)));
        assert_eq!(loader.image().map(|i| i.len()), Some(arm_elf().len()));

        assert!(matches!(loader.load(), Err(LoaderError::AlreadyLoaded)));
    }

    #[test]
    fn test_wrong_machine_is_invalid_format() {
        let mut loader = ElfLoader::new(Path::new("riscv.elf"), elf32(0xF3, 8));
        assert!(matches!(loader.load(), Err(LoaderError::InvalidFormat)));
    }

    #[test]
    fn test_truncated_segment_is_rejected() {
        let mut loader = ElfLoader::new(Path::new("short.elf"), elf32(40, 64));
        assert!(loader.load().is_err());
    }

    #[test]
    fn test_no_loader_for_unknown_or_missing_file() {
        let file = write_temp(b"garbage garbage garbage");
        assert!(get_loader(file.path()).is_none());
        assert!(get_loader(Path::new("/nonexistent/bad.file")).is_none());
    }

    #[test]
    fn test_process_name_from_path() {
        let mut loader = ElfLoader::new(Path::new("/games/demo.elf"), arm_elf());
        assert_eq!(loader.load().unwrap().name, "demo");
    }
}
