//! Lifecycle backed by a local archive or directory

use crate::error::{KilnError, KilnResult};
use crate::lifecycle::descriptor::LifecycleDescriptor;
use crate::lifecycle::{required_binaries, Lifecycle, BINARY_DIR, DESCRIPTOR_FILE};
use crate::build::phase::Phase;
use flate2::read::GzDecoder;
use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{Cursor, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tracing::debug;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Lifecycle stored as a `.tgz` or `.tar` file
#[derive(Debug)]
pub struct ArchiveLifecycle {
    path: PathBuf,
    gzip: bool,
    descriptor: LifecycleDescriptor,
    has_creator: bool,
    source_name: String,
}

impl ArchiveLifecycle {
    /// Read and validate the archive at `path`. Blocking.
    pub fn load(path: &Path, source_name: impl Into<String>) -> KilnResult<Self> {
        let source_name = source_name.into();
        let gzip = is_gzip(path)?;

        let mut descriptor = None;
        let mut binaries = HashSet::new();

        let mut archive = tar::Archive::new(decode(open_file(path)?, gzip));
        let entries = archive
            .entries()
            .map_err(|e| KilnError::lifecycle_invalid(&source_name, e.to_string()))?;

        for entry in entries {
            let mut entry =
                entry.map_err(|e| KilnError::lifecycle_invalid(&source_name, e.to_string()))?;
            let entry_path = entry
                .path()
                .map_err(|e| KilnError::lifecycle_invalid(&source_name, e.to_string()))?
                .to_string_lossy()
                .trim_start_matches("./")
                .to_string();

            if entry_path == DESCRIPTOR_FILE {
                let mut content = String::new();
                entry
                    .read_to_string(&mut content)
                    .map_err(|e| KilnError::lifecycle_invalid(&source_name, e.to_string()))?;
                descriptor = Some(LifecycleDescriptor::parse(&content, &source_name)?);
            } else if let Some(name) = entry_path
                .strip_prefix(BINARY_DIR)
                .and_then(|rest| rest.strip_prefix('/'))
            {
                if !name.is_empty() && entry.header().entry_type().is_file() {
                    binaries.insert(name.to_string());
                }
            }
        }

        let descriptor = descriptor.ok_or_else(|| {
            KilnError::lifecycle_invalid(&source_name, format!("{} not found", DESCRIPTOR_FILE))
        })?;
        check_binaries(&binaries, &source_name)?;
        let has_creator = binaries.contains(Phase::Create.binary());

        debug!(
            "Loaded lifecycle {} from {} (creator: {})",
            descriptor.info.version,
            path.display(),
            has_creator
        );

        Ok(Self {
            path: path.to_path_buf(),
            gzip,
            descriptor,
            has_creator,
            source_name,
        })
    }
}

impl Lifecycle for ArchiveLifecycle {
    fn descriptor(&self) -> &LifecycleDescriptor {
        &self.descriptor
    }

    fn open(&self) -> KilnResult<Box<dyn Read + Send>> {
        Ok(decode(open_file(&self.path)?, self.gzip))
    }

    fn has_creator_binary(&self) -> bool {
        self.has_creator
    }

    fn source_name(&self) -> &str {
        &self.source_name
    }
}

/// Lifecycle laid out as a directory with `lifecycle.toml` and `lifecycle/<binary>`
#[derive(Debug)]
pub struct DirectoryLifecycle {
    root: PathBuf,
    descriptor: LifecycleDescriptor,
    binaries: Vec<String>,
    source_name: String,
}

impl DirectoryLifecycle {
    /// Read and validate the directory at `root`. Blocking.
    pub fn load(root: &Path) -> KilnResult<Self> {
        let source_name = root.display().to_string();
        let descriptor_path = root.join(DESCRIPTOR_FILE);
        let content = fs::read_to_string(&descriptor_path).map_err(|e| {
            KilnError::lifecycle_invalid(&source_name, format!("reading {}: {}", DESCRIPTOR_FILE, e))
        })?;
        let descriptor = LifecycleDescriptor::parse(&content, &source_name)?;

        let bin_dir = root.join(BINARY_DIR);
        let mut binaries = Vec::new();
        if bin_dir.is_dir() {
            let entries = fs::read_dir(&bin_dir)
                .map_err(|e| KilnError::io(format!("reading {}", bin_dir.display()), e))?;
            for entry in entries {
                let entry =
                    entry.map_err(|e| KilnError::io(format!("reading {}", bin_dir.display()), e))?;
                if entry.path().is_file() {
                    binaries.push(entry.file_name().to_string_lossy().to_string());
                }
            }
        }
        binaries.sort();

        let present: HashSet<String> = binaries.iter().cloned().collect();
        check_binaries(&present, &source_name)?;

        Ok(Self {
            root: root.to_path_buf(),
            descriptor,
            binaries,
            source_name,
        })
    }

    fn build_tar(&self) -> std::io::Result<Vec<u8>> {
        let mut builder = tar::Builder::new(Vec::new());
        builder.append_path_with_name(self.root.join(DESCRIPTOR_FILE), DESCRIPTOR_FILE)?;

        let mut dir = tar::Header::new_gnu();
        dir.set_entry_type(tar::EntryType::Directory);
        dir.set_mode(0o755);
        dir.set_size(0);
        builder.append_data(&mut dir, BINARY_DIR, std::io::empty())?;

        for name in &self.binaries {
            let mut file = File::open(self.root.join(BINARY_DIR).join(name))?;
            let size = file.metadata()?.len();
            let mut header = tar::Header::new_gnu();
            header.set_size(size);
            header.set_mode(0o755);
            header.set_entry_type(tar::EntryType::Regular);
            builder.append_data(&mut header, format!("{}/{}", BINARY_DIR, name), &mut file)?;
        }

        builder.into_inner()
    }
}

impl Lifecycle for DirectoryLifecycle {
    fn descriptor(&self) -> &LifecycleDescriptor {
        &self.descriptor
    }

    fn open(&self) -> KilnResult<Box<dyn Read + Send>> {
        let data = self
            .build_tar()
            .map_err(|e| KilnError::io(format!("packing lifecycle {}", self.root.display()), e))?;
        Ok(Box::new(Cursor::new(data)))
    }

    fn has_creator_binary(&self) -> bool {
        self.binaries.iter().any(|b| b == Phase::Create.binary())
    }

    fn source_name(&self) -> &str {
        &self.source_name
    }
}

fn check_binaries(present: &HashSet<String>, source_name: &str) -> KilnResult<()> {
    let missing: Vec<&str> = required_binaries()
        .filter(|b| !present.contains(*b))
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(KilnError::lifecycle_invalid(
            source_name,
            format!("missing binaries: {}", missing.join(", ")),
        ))
    }
}

fn open_file(path: &Path) -> KilnResult<File> {
    File::open(path).map_err(|e| KilnError::io(format!("opening {}", path.display()), e))
}

fn is_gzip(path: &Path) -> KilnResult<bool> {
    let mut file = open_file(path)?;
    let mut magic = [0u8; 2];
    let read = file
        .read(&mut magic)
        .map_err(|e| KilnError::io(format!("reading {}", path.display()), e))?;
    file.seek(SeekFrom::Start(0))
        .map_err(|e| KilnError::io(format!("reading {}", path.display()), e))?;
    Ok(read == 2 && magic == GZIP_MAGIC)
}

fn decode(file: File, gzip: bool) -> Box<dyn Read + Send> {
    if gzip {
        Box::new(GzDecoder::new(file))
    } else {
        Box::new(file)
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::fs;
    use std::path::Path;

    pub const DESCRIPTOR: &str = r#"
[apis]
[apis.buildpack]
  supported = ["0.4", "0.5"]
[apis.platform]
  supported = ["0.4", "0.5", "0.6"]

[lifecycle]
  version = "0.11.1"
"#;

    /// Write a lifecycle directory containing `binaries`
    pub fn write_dir(root: &Path, binaries: &[&str]) {
        fs::create_dir_all(root.join("lifecycle")).unwrap();
        fs::write(root.join("lifecycle.toml"), DESCRIPTOR).unwrap();
        for bin in binaries {
            fs::write(root.join("lifecycle").join(bin), format!("#!/bin/sh\necho {}\n", bin))
                .unwrap();
        }
    }

    /// Write a lifecycle archive containing `binaries`
    pub fn write_archive(path: &Path, binaries: &[&str], gzip: bool) {
        let mut builder = tar::Builder::new(Vec::new());
        let mut header = tar::Header::new_gnu();
        header.set_size(DESCRIPTOR.len() as u64);
        header.set_mode(0o644);
        builder
            .append_data(&mut header, "lifecycle.toml", DESCRIPTOR.as_bytes())
            .unwrap();
        for bin in binaries {
            let body = format!("binary {}", bin);
            let mut header = tar::Header::new_gnu();
            header.set_size(body.len() as u64);
            header.set_mode(0o755);
            builder
                .append_data(&mut header, format!("./lifecycle/{}", bin), body.as_bytes())
                .unwrap();
        }
        let tar = builder.into_inner().unwrap();

        if gzip {
            use std::io::Write;
            let mut encoder = GzEncoder::new(Vec::new(), Compression::fast());
            encoder.write_all(&tar).unwrap();
            fs::write(path, encoder.finish().unwrap()).unwrap();
        } else {
            fs::write(path, tar).unwrap();
        }
    }

    pub const ALL: &[&str] = &["detector", "analyzer", "restorer", "builder", "exporter", "creator"];
    pub const NO_CREATOR: &[&str] = &["detector", "analyzer", "restorer", "builder", "exporter"];
}
