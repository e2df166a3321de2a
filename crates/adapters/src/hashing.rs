//! sha256 over bytes, and the manifest digest (sha256 over canonical JSON).

use sha2::{Digest, Sha256};

/// Hex-encoded sha256 digest of `bytes`.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// sha256 of a file's contents, read in full. Components are small
/// configuration/hook files, not package blobs, so streaming is unneeded.
pub fn sha256_file(path: &std::path::Path) -> std::io::Result<String> {
    let bytes = fs_err::read(path)?;
    Ok(sha256_hex(&bytes))
}

/// The manifest digest: sha256 over the canonical JSON serialization of a
/// resolved component definition (file list, modes, dependencies,
/// post_install). Callers pass anything `Serialize` — the resolver builds
/// one dedicated struct for this purpose so field order is stable.
pub fn manifest_digest<T: serde::Serialize>(value: &T) -> Result<String, serde_json::Error> {
    let canonical = serde_json::to_vec(value)?;
    Ok(sha256_hex(&canonical))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn sha256_hex_is_stable() {
        assert_eq!(
            sha256_hex(b"hello"),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn manifest_digest_is_deterministic() {
        #[derive(serde::Serialize)]
        struct Def {
            name: &'static str,
            files: Vec<&'static str>,
        }

        let a = manifest_digest(&Def {
            name: "core",
            files: vec!["a", "b"],
        })
        .unwrap();
        let b = manifest_digest(&Def {
            name: "core",
            files: vec!["a", "b"],
        })
        .unwrap();

        assert_eq!(a, b);
    }
}
