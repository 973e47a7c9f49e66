use std::borrow::Cow;
use std::env;
use std::fs::read_dir;
use std::io::ErrorKind;
use std::os::unix::fs::PermissionsExt;

use log::error;

pub fn basename(path: &str) -> Cow<'_, str> {
    let mut pieces = path.rsplit('/');
    match pieces.next() {
        Some(p) => p.into(),
        None => path.into(),
    }
}

/// Scan `$PATH` for `filename`, optionally requiring the execute bit.
/// Returns an empty string when nothing matches.
pub fn find_file_in_path(filename: &str, exec: bool) -> String {
    let env_path = match env::var("PATH") {
        Ok(x) => x,
        Err(e) => {
            error!("minish: error with env PATH: {:?}", e);
            return String::new();
        }
    };
    let vec_path: Vec<&str> = env_path.split(':').collect();
    for p in &vec_path {
        match read_dir(p) {
            Ok(list) => {
                for entry in list.flatten() {
                    if let Ok(name) = entry.file_name().into_string() {
                        if name != filename {
                            continue;
                        }

                        if exec {
                            let metadata = match entry.metadata() {
                                Ok(x) => x,
                                Err(e) => {
                                    error!("minish: metadata error: {:?}", e);
                                    continue;
                                }
                            };
                            let mode = metadata.permissions().mode();
                            if mode & 0o111 == 0 {
                                // not executable
                                continue;
                            }
                        }

                        return entry.path().to_string_lossy().to_string();
                    }
                }
            }
            Err(e) => {
                if e.kind() == ErrorKind::NotFound {
                    continue;
                }
                error!("minish: fs read_dir error: {}: {}", p, e);
            }
        }
    }
    String::new()
}

pub fn current_dir() -> String {
    let dir = match env::current_dir() {
        Ok(x) => x,
        Err(e) => {
            error!("minish: env current_dir error: {}", e);
            return String::new();
        }
    };
    match dir.to_str() {
        Some(x) => x.to_string(),
        None => {
            error!("minish: current_dir is not valid utf-8");
            String::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basename() {
        assert_eq!(basename("/usr/bin/env"), "env");
        assert_eq!(basename("env"), "env");
    }

    #[test]
    fn test_find_sh_in_path() {
        let found = find_file_in_path("sh", true);
        assert!(found.ends_with("/sh"), "unexpected path: {}", found);
    }

    #[test]
    fn test_find_missing_is_empty() {
        assert_eq!(find_file_in_path("minish-no-such-command", true), "");
    }
}
