//! Optional integrity check of archive ELFs against shipped digests.
//!
//! The digest algorithm is fixed at build time. Whatever is selected, the
//! blob is fed through the streaming interface in page-sized chunks and the
//! result is compared byte for byte against the file of the given name in
//! the archive. Both digests are logged so a failed boot leaves evidence.

#[cfg(all(feature = "hash-md5", feature = "hash-sha256"))]
compile_error!("features \"hash-md5\" and \"hash-sha256\" are mutually exclusive");

use crate::archive::Archive;
use crate::errors::LoaderError;

#[cfg(feature = "hash-md5")]
pub const DIGEST_LEN: usize = 16;
#[cfg(feature = "hash-sha256")]
pub const DIGEST_LEN: usize = 32;

#[cfg(any(feature = "hash-md5", feature = "hash-sha256"))]
mod enabled {
	use core::fmt;

	#[cfg(feature = "hash-md5")]
	use md5::{Digest, Md5 as ImageHasher};
	#[cfg(feature = "hash-sha256")]
	use sha2::{Digest, Sha256 as ImageHasher};

	use super::DIGEST_LEN;
	use crate::archive::Archive;
	use crate::errors::LoaderError;

	struct HexDigest<'a>(&'a [u8]);

	impl fmt::Display for HexDigest<'_> {
		fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
			for byte in self.0 {
				write!(f, "{byte:02x}")?;
			}
			Ok(())
		}
	}

	pub fn check_hash(
		archive: &Archive<'_>,
		blob: &[u8],
		digest_name: &'static str,
	) -> Result<(), LoaderError> {
		let Some(file) = archive.find(digest_name) else {
			error!("hash file '{digest_name}' doesn't exist");
			return Err(LoaderError::HashMissing(digest_name));
		};
		if file.data.len() < DIGEST_LEN {
			error!(
				"hash file '{digest_name}' only holds {} byte, expected at least {DIGEST_LEN}",
				file.data.len()
			);
			return Err(LoaderError::HashMissing(digest_name));
		}
		let expected = &file.data[..DIGEST_LEN];
		info!("Hash from ELF File: {}", HexDigest(expected));

		let mut hasher = ImageHasher::new();
		for chunk in blob.chunks(4096) {
			hasher.update(chunk);
		}
		let calculated = hasher.finalize();
		info!("Hash for ELF Input: {}", HexDigest(&calculated));

		if calculated.as_slice() != expected {
			error!("Hashes are different");
			return Err(LoaderError::HashMismatch(digest_name));
		}
		Ok(())
	}
}

#[cfg(any(feature = "hash-md5", feature = "hash-sha256"))]
pub use enabled::check_hash;

/// Hash checking is compiled out; every image passes.
#[cfg(not(any(feature = "hash-md5", feature = "hash-sha256")))]
pub fn check_hash(
	_archive: &Archive<'_>,
	_blob: &[u8],
	_digest_name: &'static str,
) -> Result<(), LoaderError> {
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::check_hash;
	use crate::archive::Archive;
	use crate::archive::tests::build_archive;

	#[cfg(not(any(feature = "hash-md5", feature = "hash-sha256")))]
	#[test]
	fn disabled_verifier_accepts_anything() {
		let bytes = build_archive(&[("kernel.elf", b"payload")]);
		let archive = Archive::new(&bytes);
		assert!(check_hash(&archive, b"payload", "kernel.bin").is_ok());
	}

	#[cfg(feature = "hash-sha256")]
	mod sha256 {
		use sha2::{Digest, Sha256};

		use super::*;
		use crate::errors::LoaderError;

		#[test]
		fn accepts_matching_digest() {
			let blob = b"kernel contents";
			let digest = Sha256::digest(blob);
			let bytes = build_archive(&[("kernel.elf", blob), ("kernel.bin", digest.as_slice())]);
			let archive = Archive::new(&bytes);

			assert!(check_hash(&archive, blob, "kernel.bin").is_ok());
		}

		#[test]
		fn rejects_single_flipped_byte() {
			let blob = b"kernel contents";
			let mut digest = Sha256::digest(blob);
			digest[0] ^= 1;
			let bytes = build_archive(&[("kernel.elf", blob), ("kernel.bin", digest.as_slice())]);
			let archive = Archive::new(&bytes);

			assert_eq!(
				check_hash(&archive, blob, "kernel.bin").unwrap_err(),
				LoaderError::HashMismatch("kernel.bin")
			);
		}

		#[test]
		fn missing_digest_file_is_fatal() {
			let bytes = build_archive(&[("kernel.elf", b"payload")]);
			let archive = Archive::new(&bytes);

			assert_eq!(
				check_hash(&archive, b"payload", "kernel.bin").unwrap_err(),
				LoaderError::HashMissing("kernel.bin")
			);
		}

		#[test]
		fn digest_is_deterministic() {
			let blob = b"same bytes";
			let first = Sha256::digest(blob);
			let second = Sha256::digest(blob);
			assert_eq!(first, second);
		}
	}
}
