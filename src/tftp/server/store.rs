//! Request validation against the served directories

use std::io;
use std::path::{Component, Path, PathBuf};

use super::config::Config;
use crate::tftp::core::{FileSink, FileSource, FileStore, Sink, Source};

/// Serves files from the configured send/receive directories.
///
/// Request names are always relative to those directories: a leading `/`
/// is dropped and `..` components are refused.
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    send_directory: PathBuf,
    receive_directory: PathBuf,
    read_only: bool,
    overwrite: bool,
}

impl DirectoryStore {
    pub fn new(config: &Config) -> Self {
        Self {
            send_directory: config.send_directory.clone(),
            receive_directory: config.receive_directory.clone(),
            read_only: config.read_only,
            overwrite: config.overwrite,
        }
    }

    fn resolve(root: &Path, filename: &str) -> io::Result<PathBuf> {
        let relative = filename.trim_start_matches(['/', '\\']);
        let mut path = root.to_path_buf();
        let mut depth = 0;

        for component in Path::new(relative).components() {
            match component {
                Component::Normal(part) => {
                    path.push(part);
                    depth += 1;
                }
                Component::CurDir => {}
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                    return Err(denied(format!("illegal path '{filename}'")));
                }
            }
        }

        if depth == 0 {
            return Err(denied("empty filename".to_string()));
        }
        Ok(path)
    }
}

fn denied(msg: String) -> io::Error {
    io::Error::new(io::ErrorKind::PermissionDenied, msg)
}

impl FileStore for DirectoryStore {
    fn open_read(&self, filename: &str) -> io::Result<Box<dyn FileSource>> {
        let path = Self::resolve(&self.send_directory, filename)?;
        if !path.is_file() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("file '{filename}' not found"),
            ));
        }
        log::debug!("reading {}", path.display());
        Ok(Box::new(Source::open(&path)?))
    }

    fn open_write(&self, filename: &str) -> io::Result<Box<dyn FileSink>> {
        if self.read_only {
            return Err(denied("server is read-only".to_string()));
        }
        let path = Self::resolve(&self.receive_directory, filename)?;
        if !self.overwrite && path.exists() {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("file '{filename}' already exists"),
            ));
        }
        log::debug!("writing {}", path.display());
        Ok(Box::new(Sink::create(&path)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_under_root() {
        let root = Path::new("/srv/tftp");
        assert_eq!(
            DirectoryStore::resolve(root, "/boot/pxelinux.0").unwrap(),
            PathBuf::from("/srv/tftp/boot/pxelinux.0")
        );
        assert_eq!(
            DirectoryStore::resolve(root, "./a.txt").unwrap(),
            PathBuf::from("/srv/tftp/a.txt")
        );
    }

    #[test]
    fn refuses_escapes() {
        let root = Path::new("/srv/tftp");
        for name in ["../etc/passwd", "a/../../b", "", "/", "."] {
            let err = DirectoryStore::resolve(root, name).unwrap_err();
            assert_eq!(err.kind(), io::ErrorKind::PermissionDenied, "{name}");
        }
    }

    #[test]
    fn read_only_refuses_writes() {
        let config = Config::new("127.0.0.1".parse().unwrap(), 69, std::env::temp_dir(), true);
        let store = DirectoryStore::new(&config);
        let err = store.open_write("x.bin").err().unwrap();
        assert_eq!(err.kind(), io::ErrorKind::PermissionDenied);
    }
}
