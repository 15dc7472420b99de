use std::path::Path;

/// True for strings that look like a Linux filesystem path: absolute, or
/// explicitly relative to the current or parent directory.
pub fn is_path_shaped(value: &str) -> bool {
    value.starts_with('/') || value.starts_with("./") || value.starts_with("../")
}

/// Resolve `.` and `..` segments of a Linux path lexically.
///
/// An empty result (e.g. from `"a/.."`) becomes `"."`, and `..` above the
/// root stays at the root.
pub fn clean_native_path(path: &str) -> String {
    path_clean::clean(Path::new(path))
        .to_string_lossy()
        .into_owned()
}

/// Swap Linux separators for Windows ones.
pub(crate) fn to_backslashes(path: &str) -> String {
    path.replace('/', "\\")
}

/// Swap Windows separators for Linux ones.
pub(crate) fn to_forward_slashes(path: &str) -> String {
    path.replace('\\', "/")
}
