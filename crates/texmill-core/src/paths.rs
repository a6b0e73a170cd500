use std::path::{Component, Path, PathBuf};

/// Makes `path` absolute against the current directory and removes `.` and
/// `..` components lexically. Symlinks are not resolved and the path does not
/// need to exist.
pub fn normalize(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        match std::env::current_dir() {
            Ok(cwd) => cwd.join(path),
            Err(_) => path.to_path_buf(),
        }
    };
    lexical_clean(&absolute)
}

/// Joins `target` onto `base` unless it is already absolute, then normalizes.
pub fn resolve_from(base: &Path, target: &Path) -> PathBuf {
    if target.is_absolute() {
        lexical_clean(target)
    } else {
        normalize(&base.join(target))
    }
}

fn lexical_clean(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                // Popping past the root is a no-op, matching how the OS treats `/..`.
                if !matches!(
                    out.components().next_back(),
                    None | Some(Component::RootDir) | Some(Component::Prefix(_))
                ) {
                    out.pop();
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// The directory containing `path`, or `.` for bare file names.
pub fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Base name used for generated artifacts: the job name when given, the
/// document's file stem otherwise.
pub fn job_base(root: &Path, jobname: Option<&str>) -> String {
    match jobname {
        Some(job) if !job.is_empty() => job.to_string(),
        _ => root
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default(),
    }
}

/// Location of a generated artifact such as `main.pdf` or `main.aux`.
///
/// Artifacts land in `out_dir` when given, next to the document otherwise, and
/// are named after [`job_base`]. The file is not required to exist.
pub fn artifact_path(
    root: &Path,
    out_dir: Option<&Path>,
    jobname: Option<&str>,
    ext: &str,
) -> PathBuf {
    let root = normalize(root);
    let dir = match out_dir {
        Some(out) => normalize(out),
        None => parent_dir(&root),
    };
    dir.join(format!("{}.{}", job_base(&root, jobname), ext))
}
