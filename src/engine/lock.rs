//! Advisory claims on shared files.
//!
//! A target locks its referenced files while its children run, so that the
//! children leave them out of their own dependency closures. Locking is
//! cooperative: only code that consults [`Asset::is_locked`] is affected.
//!
//! [`Asset::is_locked`]: crate::asset::Asset::is_locked

use crate::asset::FileRef;

pub fn lock(files: &[FileRef]) {
    for file in files {
        file.set_locked(true);
    }
}

pub fn unlock(files: &[FileRef]) {
    for file in files {
        file.set_locked(false);
    }
}
