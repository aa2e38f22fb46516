// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Error types for the sysfs overlay engine

use libc::{c_int, EBADF, EINVAL, EISDIR, ENOENT, ENOMEM, ENOSYS};

/// Core filesystem error type
#[derive(thiserror::Error, Debug)]
pub enum FsError {
    /// Neither a virtual entry nor present in the backing directory
    #[error("not found")]
    NotFound,
    /// The virtual entry lacks the callback the operation needs
    #[error("unsupported")]
    Unsupported,
    #[error("out of memory")]
    NoMemory,
    #[error("invalid argument")]
    InvalidArgument,
    #[error("bad file descriptor")]
    BadFileDescriptor,
    #[error("is a directory")]
    IsADirectory,
    #[error("system error: {0}")]
    Sys(#[from] nix::errno::Errno),
}

impl FsError {
    /// errno reported to the kernel for this error.
    ///
    /// Failures coming from the backing directory keep their original code.
    pub fn errno(&self) -> c_int {
        match self {
            FsError::NotFound => ENOENT,
            FsError::Unsupported => ENOSYS,
            FsError::NoMemory => ENOMEM,
            FsError::InvalidArgument => EINVAL,
            FsError::BadFileDescriptor => EBADF,
            FsError::IsADirectory => EISDIR,
            FsError::Sys(errno) => *errno as c_int,
        }
    }
}

impl From<std::collections::TryReserveError> for FsError {
    fn from(_: std::collections::TryReserveError) -> Self {
        FsError::NoMemory
    }
}

pub type FsResult<T> = Result<T, FsError>;

#[cfg(test)]
mod tests {
    use super::*;
    use nix::errno::Errno;

    #[test]
    fn backing_errors_keep_their_code() {
        assert_eq!(FsError::Sys(Errno::EACCES).errno(), libc::EACCES);
        assert_eq!(FsError::Sys(Errno::EINTR).errno(), libc::EINTR);
        assert_eq!(FsError::from(Errno::ELOOP).errno(), libc::ELOOP);
    }

    #[test]
    fn engine_errors_map_to_protocol_codes() {
        assert_eq!(FsError::NotFound.errno(), ENOENT);
        assert_eq!(FsError::Unsupported.errno(), ENOSYS);
        assert_eq!(FsError::NoMemory.errno(), ENOMEM);
        assert_eq!(FsError::InvalidArgument.errno(), EINVAL);
        assert_eq!(FsError::BadFileDescriptor.errno(), EBADF);
        assert_eq!(FsError::IsADirectory.errno(), EISDIR);
    }
}
