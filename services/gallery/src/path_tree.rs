use thiserror::Error;

/// Path separator used by object keys and folder paths
pub const SEPARATOR: char = '/';

/// Sentinel parent of top-level items. Never stored as an item itself.
pub const ROOT: &str = "/";

/// Errors produced when decomposing an object key
#[derive(Debug, Error, PartialEq)]
pub enum PathError {
    /// The key was empty (or contained only separators) after normalization
    #[error("object key is empty after normalization")]
    EmptyKey,
}

/// The leaf entry of a decomposed object key
#[derive(Debug, Clone, PartialEq)]
pub struct LeafKey {
    /// Raw object key, normalized
    pub path: String,
    /// Immediate containing folder, ending with the separator (or the root)
    pub parent: String,
}

/// One ancestor folder of a leaf, paired with its own parent
#[derive(Debug, Clone, PartialEq)]
pub struct Ancestor {
    /// Folder path, always ending with the separator
    pub path: String,
    /// Containing folder of this ancestor (its grandparent in leaf terms)
    pub parent: String,
}

/// A fully decomposed object key: the leaf plus its ancestor chain
#[derive(Debug, Clone, PartialEq)]
pub struct DecomposedKey {
    pub leaf: LeafKey,
    /// Ancestor folders ordered innermost first (closest to the leaf)
    pub ancestors: Vec<Ancestor>,
}

/// Normalize a raw object key: strip leading separators, collapse runs of
/// separators, and drop any trailing separator.
pub fn normalize_key(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut prev_sep = true; // swallows leading separators
    for c in raw.chars() {
        if c == SEPARATOR {
            if !prev_sep {
                out.push(c);
            }
            prev_sep = true;
        } else {
            out.push(c);
            prev_sep = false;
        }
    }
    if out.ends_with(SEPARATOR) {
        out.pop();
    }
    out
}

/// Decompose an object key into its leaf descriptor and ancestor chain.
///
/// The chain is ordered innermost first and bounded at `max_depth` entries;
/// deeper ancestors of pathological keys are silently skipped rather than
/// treated as an error.
pub fn decompose(raw_key: &str, max_depth: usize) -> Result<DecomposedKey, PathError> {
    let key = normalize_key(raw_key);
    if key.is_empty() {
        return Err(PathError::EmptyKey);
    }

    let segments: Vec<&str> = key.split(SEPARATOR).collect();
    let dirs = &segments[..segments.len() - 1];

    let leaf_parent = folder_path(dirs);
    let mut ancestors = Vec::with_capacity(dirs.len().min(max_depth));
    for depth in (1..=dirs.len()).rev().take(max_depth) {
        ancestors.push(Ancestor {
            path: folder_path(&dirs[..depth]),
            parent: folder_path(&dirs[..depth - 1]),
        });
    }

    Ok(DecomposedKey {
        leaf: LeafKey {
            path: key,
            parent: leaf_parent,
        },
        ancestors,
    })
}

/// Decompose only the leaf descriptor of a key, skipping the ancestor walk.
/// Retraction needs just the `(parent, path)` pair, under the same
/// normalization as materialization.
pub fn leaf_of(raw_key: &str) -> Result<LeafKey, PathError> {
    decompose(raw_key, 0).map(|d| d.leaf)
}

/// Join directory segments into a folder path ending with the separator.
/// No segments means the root sentinel.
fn folder_path(segments: &[&str]) -> String {
    if segments.is_empty() {
        ROOT.to_string()
    } else {
        let mut p = segments.join("/");
        p.push(SEPARATOR);
        p
    }
}

/// Display name of an item: the last path segment, trailing-slash aware.
pub fn basename(path: &str) -> &str {
    let trimmed = path.trim_end_matches(SEPARATOR);
    trimmed.rsplit(SEPARATOR).next().unwrap_or(trimmed)
}

/// Normalize a listing query path into folder form: empty input is the root,
/// anything else ends with the separator.
pub fn normalize_query_path(raw: &str) -> String {
    let key = normalize_key(raw);
    if key.is_empty() {
        ROOT.to_string()
    } else {
        let mut p = key;
        p.push(SEPARATOR);
        p
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_key() {
        assert_eq!(normalize_key("a/b/c.jpg"), "a/b/c.jpg");
        assert_eq!(normalize_key("/a/b/c.jpg"), "a/b/c.jpg");
        assert_eq!(normalize_key("a//b///c.jpg"), "a/b/c.jpg");
        assert_eq!(normalize_key("a/b/"), "a/b");
        assert_eq!(normalize_key("///"), "");
        assert_eq!(normalize_key(""), "");
    }

    #[test]
    fn test_decompose_nested_key() {
        let d = decompose("vacation/2023/beach.jpg", 6).unwrap();
        assert_eq!(d.leaf.path, "vacation/2023/beach.jpg");
        assert_eq!(d.leaf.parent, "vacation/2023/");
        assert_eq!(
            d.ancestors,
            vec![
                Ancestor {
                    path: "vacation/2023/".to_string(),
                    parent: "vacation/".to_string(),
                },
                Ancestor {
                    path: "vacation/".to_string(),
                    parent: "/".to_string(),
                },
            ]
        );
    }

    #[test]
    fn test_decompose_root_level_key() {
        let d = decompose("photo.jpg", 6).unwrap();
        assert_eq!(d.leaf.path, "photo.jpg");
        assert_eq!(d.leaf.parent, "/");
        assert!(d.ancestors.is_empty());
    }

    #[test]
    fn test_decompose_normalizes_input() {
        let d = decompose("//vacation//2023/beach.jpg", 6).unwrap();
        assert_eq!(d.leaf.path, "vacation/2023/beach.jpg");
        assert_eq!(d.leaf.parent, "vacation/2023/");
    }

    #[test]
    fn test_decompose_empty_key_rejected() {
        assert_eq!(decompose("", 6), Err(PathError::EmptyKey));
        assert_eq!(decompose("///", 6), Err(PathError::EmptyKey));
    }

    #[test]
    fn test_depth_bound_truncates_chain() {
        // 8 directory levels but only 6 ancestors may be walked
        let key = "a/b/c/d/e/f/g/h/leaf.jpg";
        let d = decompose(key, 6).unwrap();
        assert_eq!(d.ancestors.len(), 6);
        // Innermost first: the walk stops before reaching the top
        assert_eq!(d.ancestors[0].path, "a/b/c/d/e/f/g/h/");
        assert_eq!(d.ancestors[5].path, "a/b/c/");
        assert_eq!(d.ancestors[5].parent, "a/b/");
        // Leaf itself is unaffected by the bound
        assert_eq!(d.leaf.parent, "a/b/c/d/e/f/g/h/");
    }

    #[test]
    fn test_depth_bound_larger_than_chain() {
        let d = decompose("a/leaf.jpg", 6).unwrap();
        assert_eq!(d.ancestors.len(), 1);
        assert_eq!(d.ancestors[0].path, "a/");
        assert_eq!(d.ancestors[0].parent, "/");
    }

    #[test]
    fn test_leaf_of() {
        let leaf = leaf_of("vacation/2023/beach.jpg").unwrap();
        assert_eq!(leaf.path, "vacation/2023/beach.jpg");
        assert_eq!(leaf.parent, "vacation/2023/");

        let root_leaf = leaf_of("photo.jpg").unwrap();
        assert_eq!(root_leaf.parent, "/");
    }

    #[test]
    fn test_basename() {
        assert_eq!(basename("vacation/2023/beach.jpg"), "beach.jpg");
        assert_eq!(basename("vacation/2023/"), "2023");
        assert_eq!(basename("vacation/"), "vacation");
        assert_eq!(basename("photo.jpg"), "photo.jpg");
    }

    #[test]
    fn test_normalize_query_path() {
        assert_eq!(normalize_query_path(""), "/");
        assert_eq!(normalize_query_path("/"), "/");
        assert_eq!(normalize_query_path("vacation"), "vacation/");
        assert_eq!(normalize_query_path("vacation/2023/"), "vacation/2023/");
        assert_eq!(normalize_query_path("//vacation//2023"), "vacation/2023/");
    }
}
