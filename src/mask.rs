//! Payload masking and mask-key providers.
//!
//! Every client-originated frame is masked with a fresh 32-bit key. Keys come
//! from a [`MaskKeySource`] so tests can substitute a deterministic source for
//! the system entropy default.

use std::{
    fmt,
    fs::File,
    io::{self, Read},
    path::{Path, PathBuf},
};

use rand::{RngCore, rngs::OsRng};

/// Default entropy device used by [`DeviceMaskSource`].
pub const DEFAULT_ENTROPY_PATH: &str = "/dev/urandom";

/// XOR `buf` in place with `key`, starting at payload offset `offset`.
///
/// Masking is its own inverse, and because the key index is derived from the
/// absolute payload offset, a payload may be (un)masked in arbitrary chunks.
///
/// # Examples
///
/// ```
/// use wsframe::mask::apply_mask;
///
/// let key = [0x37, 0xfa, 0x21, 0x3d];
/// let mut data = *b"Hello";
/// apply_mask(&mut data, key, 0);
/// assert_eq!(data, [0x7f, 0x9f, 0x4d, 0x51, 0x58]);
/// apply_mask(&mut data, key, 0);
/// assert_eq!(&data, b"Hello");
/// ```
pub fn apply_mask(buf: &mut [u8], key: [u8; 4], offset: u64) {
    #[expect(
        clippy::cast_possible_truncation,
        reason = "offset is reduced modulo 4 before narrowing"
    )]
    let start = (offset % 4) as usize;
    for (i, byte) in buf.iter_mut().enumerate() {
        *byte ^= key[(start + i) & 3];
    }
}

/// Source of masking keys.
pub trait MaskKeySource: Send {
    /// Produce the key for the next outbound frame.
    ///
    /// # Errors
    ///
    /// Returns an I/O error when the underlying entropy source fails.
    fn next_key(&mut self) -> io::Result<[u8; 4]>;
}

impl fmt::Debug for dyn MaskKeySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str("MaskKeySource") }
}

/// Keys drawn from the operating system's CSPRNG.
#[derive(Clone, Copy, Debug, Default)]
pub struct OsMaskSource;

impl MaskKeySource for OsMaskSource {
    fn next_key(&mut self) -> io::Result<[u8; 4]> {
        let mut key = [0_u8; 4];
        OsRng.try_fill_bytes(&mut key).map_err(io::Error::other)?;
        Ok(key)
    }
}

/// Keys read from an entropy device such as `/dev/urandom`.
#[derive(Debug)]
pub struct DeviceMaskSource {
    path: PathBuf,
    file: File,
}

impl DeviceMaskSource {
    /// Open the entropy device at `path`.
    ///
    /// # Errors
    ///
    /// Returns the error from opening the device.
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        Ok(Self { path, file })
    }

    /// Path the keys are read from.
    #[must_use]
    pub fn path(&self) -> &Path { &self.path }
}

impl MaskKeySource for DeviceMaskSource {
    fn next_key(&mut self) -> io::Result<[u8; 4]> {
        let mut key = [0_u8; 4];
        self.file.read_exact(&mut key)?;
        Ok(key)
    }
}

/// Always yields the same key. Intended for tests and fuzzing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FixedMaskSource(pub [u8; 4]);

impl MaskKeySource for FixedMaskSource {
    fn next_key(&mut self) -> io::Result<[u8; 4]> { Ok(self.0) }
}
