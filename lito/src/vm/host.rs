use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, Read, Write};

use parking_lot::{Condvar, Mutex};

#[derive(Debug)]
enum Handle {
    Disk(File),
    Stdin,
    Stdout,
    Stderr,
}

/// Open file or one of the standard streams.
#[derive(Debug)]
pub struct FileObject {
    name: String,
    handle: Mutex<Option<Handle>>,
}

/// `r`, `r+`, `w` and `w+`; the write modes create the file.
pub fn open_options(mode: &str) -> Option<OpenOptions> {
    let mut options = OpenOptions::new();
    match mode {
        "r" => options.read(true),
        "r+" => options.read(true).write(true).create(true),
        "w" => options.write(true).create(true).truncate(true),
        "w+" => options.read(true).write(true).create(true).truncate(true),
        _ => return None,
    };
    Some(options)
}

impl FileObject {
    pub fn open(path: &str, options: &OpenOptions) -> io::Result<Self> {
        let file = options.open(path)?;
        Ok(Self {
            name: path.to_string(),
            handle: Mutex::new(Some(Handle::Disk(file))),
        })
    }

    fn stream(name: &str, handle: Handle) -> Self {
        Self {
            name: name.to_string(),
            handle: Mutex::new(Some(handle)),
        }
    }

    pub fn stdin() -> Self {
        Self::stream("/dev/stdin", Handle::Stdin)
    }

    pub fn stdout() -> Self {
        Self::stream("/dev/stdout", Handle::Stdout)
    }

    pub fn stderr() -> Self {
        Self::stream("/dev/stderr", Handle::Stderr)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whole file for disk files, one line for stdin.
    pub fn read(&self) -> io::Result<String> {
        let mut handle = self.handle.lock();
        let mut out = String::new();
        match handle.as_mut() {
            Some(Handle::Stdin) => {
                io::stdin().lock().read_line(&mut out)?;
            }
            Some(Handle::Disk(_)) => {
                // reads through a fresh handle so write-only files can be read back
                File::open(&self.name)?.read_to_string(&mut out)?;
            }
            Some(Handle::Stdout | Handle::Stderr) => {}
            None => return Err(closed()),
        }
        Ok(out)
    }

    pub fn write(&self, data: &str) -> io::Result<usize> {
        let mut handle = self.handle.lock();
        match handle.as_mut() {
            Some(Handle::Disk(file)) => file.write_all(data.as_bytes())?,
            Some(Handle::Stdout) => {
                let mut stdout = io::stdout().lock();
                stdout.write_all(data.as_bytes())?;
                stdout.flush()?;
            }
            Some(Handle::Stderr) => io::stderr().lock().write_all(data.as_bytes())?,
            Some(Handle::Stdin) => {
                return Err(io::Error::new(
                    io::ErrorKind::Unsupported,
                    "stdin is not writable",
                ));
            }
            None => return Err(closed()),
        }
        Ok(data.len())
    }

    pub fn size(&self) -> io::Result<u64> {
        Ok(std::fs::metadata(&self.name)?.len())
    }

    pub fn close(&self) {
        self.handle.lock().take();
    }

    pub fn is_closed(&self) -> bool {
        self.handle.lock().is_none()
    }
}

fn closed() -> io::Error {
    io::Error::other("file already closed")
}

/// Mutual exclusion usable across Lito threads; released explicitly.
#[derive(Debug, Default)]
pub struct LockObject {
    locked: Mutex<bool>,
    released: Condvar,
}

impl LockObject {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lock(&self) {
        let mut locked = self.locked.lock();
        while *locked {
            self.released.wait(&mut locked);
        }
        *locked = true;
    }

    /// False when the lock was not held.
    pub fn unlock(&self) -> bool {
        let mut locked = self.locked.lock();
        if !*locked {
            return false;
        }
        *locked = false;
        self.released.notify_one();
        true
    }

    pub fn is_locked(&self) -> bool {
        *self.locked.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_modes_are_rejected() {
        assert!(open_options("r").is_some());
        assert!(open_options("w+").is_some());
        assert!(open_options("a").is_none());
    }

    #[test]
    fn files_round_trip_through_disk() {
        let path = std::env::temp_dir().join(format!("lito-host-{}.txt", std::process::id()));
        let path = path.to_string_lossy().to_string();
        let options = open_options("w").expect("write mode");
        let file = FileObject::open(&path, &options).expect("open for write");
        assert_eq!(file.write("hello").expect("write"), 5);
        assert_eq!(file.read().expect("read back"), "hello");
        assert_eq!(file.size().expect("size"), 5);
        file.close();
        assert!(file.write("x").is_err());
        std::fs::remove_file(&path).expect("cleanup");
    }

    #[test]
    fn unlocking_an_unlocked_lock_fails() {
        let lock = LockObject::new();
        assert!(!lock.unlock());
        lock.lock();
        assert!(lock.is_locked());
        assert!(lock.unlock());
    }
}
