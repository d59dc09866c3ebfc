//! Caller-contract checks run before any network activity
//!
//! Display names become archive entry paths or file paths under a sink
//! directory, so they are normalized the way archive extractors expect:
//! relative, no parent traversal, no empty components.

use std::collections::HashSet;
use std::path::{Component, Path};

use super::{Result, RetrievableObject, RetrievalError};

/// Reject an input list that would make the invocation ill-defined
///
/// Checks, in order: non-empty list, usable display names, unique
/// identifiers, unique display names.
pub fn validate_objects(objects: &[RetrievableObject]) -> Result<()> {
    if objects.is_empty() {
        return Err(RetrievalError::EmptyInput);
    }

    let mut identifiers = HashSet::with_capacity(objects.len());
    let mut names = HashSet::with_capacity(objects.len());

    for object in objects {
        check_display_name(&object.display_name)?;

        if !identifiers.insert(object.identifier.as_str()) {
            return Err(RetrievalError::DuplicateIdentifier {
                identifier: object.identifier.clone(),
            });
        }
        // Aliases such as `a.jpg` and `./a.jpg` land on the same path
        if !names.insert(normalize_display_name(&object.display_name)?) {
            return Err(RetrievalError::DuplicateDisplayName {
                name: object.display_name.clone(),
            });
        }
    }

    Ok(())
}

/// Ensure a display name is a safe relative path
pub fn check_display_name(name: &str) -> Result<()> {
    let invalid = |reason: &str| RetrievalError::InvalidDisplayName {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    if name.trim().is_empty() {
        return Err(invalid("name is empty"));
    }
    if name.contains('\0') {
        return Err(invalid("name contains a NUL byte"));
    }
    if name.ends_with('/') || name.ends_with('\\') {
        return Err(invalid("name denotes a directory"));
    }

    // Backslashes are separators on Windows hosts, treat them the same everywhere
    let normalized = name.replace('\\', "/");
    if normalized.starts_with('/') {
        return Err(invalid("absolute paths are not allowed"));
    }

    let mut has_file_component = false;
    for component in Path::new(&normalized).components() {
        match component {
            Component::Normal(_) => has_file_component = true,
            Component::CurDir => {}
            Component::ParentDir => return Err(invalid("parent directory components are not allowed")),
            Component::RootDir | Component::Prefix(_) => {
                return Err(invalid("absolute paths are not allowed"));
            }
        }
    }
    if !has_file_component {
        return Err(invalid("name has no file component"));
    }

    Ok(())
}

/// Canonical relative path of a display name
///
/// Backslashes become `/`, and `.` and empty components are dropped. Two
/// names with the same canonical form resolve to the same archive entry or
/// file, so uniqueness is checked on this form.
pub fn normalize_display_name(name: &str) -> Result<String> {
    check_display_name(name)?;
    let components: Vec<&str> = name
        .split(['/', '\\'])
        .filter(|c| !c.is_empty() && *c != ".")
        .collect();
    Ok(components.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn object(id: &str, name: &str) -> RetrievableObject {
        RetrievableObject::new(id, name, 0)
    }

    #[test]
    fn accepts_directory_qualified_names() {
        let objects = vec![object("1", "2024/beach.jpg"), object("2", "2023/beach.jpg")];
        assert!(validate_objects(&objects).is_ok());
    }

    #[test]
    fn rejects_empty_input() {
        assert!(matches!(validate_objects(&[]), Err(RetrievalError::EmptyInput)));
    }

    #[test]
    fn rejects_duplicate_display_names() {
        let objects = vec![object("1", "beach.jpg"), object("2", "beach.jpg")];
        match validate_objects(&objects) {
            Err(RetrievalError::DuplicateDisplayName { name }) => assert_eq!(name, "beach.jpg"),
            other => panic!("Expected DuplicateDisplayName, got {other:?}"),
        }
    }

    #[test]
    fn rejects_duplicate_identifiers() {
        let objects = vec![object("7", "a.jpg"), object("7", "b.jpg")];
        assert!(matches!(
            validate_objects(&objects),
            Err(RetrievalError::DuplicateIdentifier { .. })
        ));
    }

    #[test]
    fn rejects_names_that_alias_after_normalization() {
        let aliases = [
            ("a.jpg", "./a.jpg"),
            ("x/b.jpg", "x\\b.jpg"),
            ("a/b", "a//b"),
            ("2024/c.png", "2024/./c.png"),
        ];
        for (first, second) in aliases {
            let objects = vec![object("1", first), object("2", second)];
            match validate_objects(&objects) {
                Err(RetrievalError::DuplicateDisplayName { name }) => assert_eq!(name, second),
                other => panic!("{first:?} and {second:?} should collide, got {other:?}"),
            }
        }
    }

    #[test]
    fn normalizes_to_slash_separated_components() {
        assert_eq!(normalize_display_name("./2024\\summer//beach.jpg").unwrap(), "2024/summer/beach.jpg");
        assert_eq!(normalize_display_name("beach.jpg").unwrap(), "beach.jpg");
    }

    #[test]
    fn rejects_unsafe_names() {
        for name in [
            "",
            "  ",
            ".",
            "./.",
            "/etc/passwd",
            "../escape.jpg",
            "a/../../b.jpg",
            "dir/",
            "C:\\x\\..\\..\\y",
        ] {
            assert!(check_display_name(name).is_err(), "{name:?} should be rejected");
        }
    }
}
