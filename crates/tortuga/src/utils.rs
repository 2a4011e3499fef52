//! Utility functions

/// transform bytes into a human readable format.
pub fn to_human_readable(n: u64) -> String {
    let units = ["B", "KB", "MB", "GB", "TB", "PB", "EB"];
    let delimiter = 1000_f64;

    if n < 1000 {
        return format!("{n} B");
    }

    let mut n = n as f64;
    let mut u = 0;

    while (n * 10.0).round() / 10.0 >= delimiter && u < units.len() - 1 {
        n /= delimiter;
        u += 1;
    }

    format!("{:.2} {}", n, units[u])
}

/// A file name that is safe to create in the current directory, taken from
/// the name of a torrent.
pub fn sanitize_file_name(name: &str) -> String {
    let name: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '\0' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    let name = name.trim_start_matches('.').trim();

    if name.is_empty() {
        "download".to_owned()
    } else {
        name.to_owned()
    }
}
