use thiserror::Error;

/// Everything that can go wrong between entry and the jump into the kernel.
///
/// There is no recovery from any of these: the arch entry logs the error and
/// calls [`abort`](crate::abort). The messages carry the context a person
/// debugging a bricked board needs.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoaderError {
	#[error("no kernel image present in archive, or kernel.elf is not its first entry")]
	NoKernel,

	#[error("not a valid ELF image")]
	BadElf,

	#[error("ELF uses virtual addresses beyond the pointer width of this loader")]
	ElfTooBig,

	#[error("physical or virtual region start violates the required alignment")]
	Misaligned,

	#[error("image load address overlaps with the ELF-loader")]
	Overlap,

	#[error("invalid device tree blob supplied")]
	BadDtb,

	#[error("hash file '{0}' doesn't exist in the archive")]
	HashMissing(&'static str),

	#[error("hash mismatch against '{0}'")]
	HashMismatch(&'static str),

	#[error("more cores reported in than the configured maximum")]
	TooManyCores,

	#[error("SBI HART_START failed for hart {0}")]
	HsmStartFailed(usize),

	#[error("boot page pool exhausted")]
	PageTablesExhausted,

	#[error("a mapping already exists for this virtual range")]
	MapConflict,

	#[error("control flow returned from the kernel entry point")]
	KernelReturned,
}
