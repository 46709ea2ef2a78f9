//! Filename and path sanitization for downloaded artifacts.

/// Cleans a target filename: path separators become dashes, shell-hostile
/// punctuation is dropped.
pub fn clean_filename(name: &str) -> String {
    let replaced: String = name
        .chars()
        .filter_map(|c| match c {
            '/' => Some('-'),
            '!' | '?' | ',' => None,
            other => Some(other),
        })
        .collect();
    clean_path(&replaced)
}

/// Cleans a destination path. Colons are stripped except for a leading
/// Windows drive letter (`C:\…`).
pub fn clean_path(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    for (i, c) in path.chars().enumerate() {
        match c {
            '?' | ',' => {}
            ':' if i != 1 => {}
            _ => out.push(c),
        }
    }
    out.trim().to_string()
}
