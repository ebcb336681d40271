//! Validation of decoded entry names.
//!
//! A peer-supplied name becomes a path under the transfer root, so it must
//! never be able to address anything outside that root: absolute names,
//! `..` components and embedded NUL bytes are all rejected before an entry
//! is admitted into the list. The sandbox layer enforces the same property
//! again at open time; this check catches bad lists early with a precise
//! error.

use crate::FlistError;

/// Checks that `name` is a safe relative path.
///
/// The `.` sentinel for the transfer root is accepted as a whole name but
/// not as a component of a longer one being combined with `..` tricks.
///
/// # Errors
///
/// Returns the specific [`FlistError`] variant describing the violation.
pub fn validate_name(name: &[u8]) -> Result<(), FlistError> {
    let lossy = || String::from_utf8_lossy(name).into_owned();

    if name.is_empty() {
        return Err(FlistError::EmptyName);
    }
    if name.contains(&0) {
        return Err(FlistError::NulInName(lossy()));
    }
    if name[0] == b'/' {
        return Err(FlistError::AbsoluteName(lossy()));
    }
    for component in name.split(|&b| b == b'/') {
        if component == b".." {
            return Err(FlistError::EscapingName(lossy()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_names_pass() {
        for name in [&b"."[..], b"hello", b"a/b/c", b".hidden", b"tricky..name"] {
            assert!(validate_name(name).is_ok(), "{name:?}");
        }
    }

    #[test]
    fn empty_name_is_rejected() {
        assert!(matches!(validate_name(b""), Err(FlistError::EmptyName)));
    }

    #[test]
    fn absolute_name_is_rejected() {
        assert!(matches!(
            validate_name(b"/etc/passwd"),
            Err(FlistError::AbsoluteName(_))
        ));
    }

    #[test]
    fn parent_escapes_are_rejected() {
        for name in [&b".."[..], b"../x", b"a/../../b", b"a/.."] {
            assert!(
                matches!(validate_name(name), Err(FlistError::EscapingName(_))),
                "{name:?}"
            );
        }
    }

    #[test]
    fn nul_bytes_are_rejected() {
        assert!(matches!(
            validate_name(b"a\0b"),
            Err(FlistError::NulInName(_))
        ));
    }
}
