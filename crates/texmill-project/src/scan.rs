use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Reads at most `max_bytes` from the start of `path`, lossily decoded.
pub(crate) fn read_prefix(path: &Path, max_bytes: u64) -> Option<String> {
    let file = File::open(path).ok()?;
    let mut buf = Vec::new();
    if let Err(e) = file.take(max_bytes).read_to_end(&mut buf) {
        log::debug!("could not read {}: {}", path.display(), e);
        return None;
    }
    Some(String::from_utf8_lossy(&buf).into_owned())
}

/// Drops TeX comments: everything from an unescaped `%` to the end of the line.
pub(crate) fn strip_comments(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for line in text.lines() {
        out.push_str(code_part(line));
        out.push('\n');
    }
    out
}

fn code_part(line: &str) -> &str {
    let mut backslashes = 0usize;
    for (i, b) in line.bytes().enumerate() {
        if b == b'%' && backslashes % 2 == 0 {
            return &line[..i];
        }
        if b == b'\\' {
            backslashes += 1;
        } else {
            backslashes = 0;
        }
    }
    line
}
