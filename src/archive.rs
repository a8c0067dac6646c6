//! 디렉터리 압축 (전송 전 준비)
//!
//! 디렉터리를 zip 하나로 묶어 단일 파일 전송으로 보낼 수 있게 한다.
//! 엔트리 이름은 디렉터리 이름을 포함한 상대 경로 (`docs/sub/a.txt`).

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::{Error, Result};

/// 출력 경로를 주지 않았을 때의 이름: `<디렉터리 이름>.zip` (현재 디렉터리)
pub fn default_archive_path(dir: &Path) -> Result<PathBuf> {
    let dir = dir.canonicalize()?;
    let name = dir
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| Error::InvalidSource(format!("no usable directory name: {}", dir.display())))?;
    Ok(PathBuf::from(format!("{name}.zip")))
}

/// `dir` 아래 모든 파일을 deflate로 압축해 `output`(없으면 기본 이름)에 쓴다
///
/// 만들어진 zip 경로를 돌려준다. 출력 파일이 `dir` 안에 있으면 자기 자신은 넣지 않는다.
pub fn compress_directory(dir: &Path, output: Option<&Path>) -> Result<PathBuf> {
    if !dir.is_dir() {
        return Err(Error::InvalidSource(format!(
            "{} is not a directory",
            dir.display()
        )));
    }
    let dir = dir.canonicalize()?;
    let output = match output {
        Some(path) => path.to_path_buf(),
        None => default_archive_path(&dir)?,
    };

    let file = File::create(&output).map_err(|source| Error::StorageFault {
        path: output.clone(),
        source,
    })?;
    let skip = output.canonicalize()?;
    let base = dir.parent().unwrap_or(&dir).to_path_buf();

    let mut archive = Archive {
        writer: ZipWriter::new(file),
        options: FileOptions::default().compression_method(CompressionMethod::Deflated),
        base,
        skip,
        files: 0,
    };
    archive.add_dir(&dir)?;
    let files = archive.files;
    archive.writer.finish()?;

    info!("Directory {} compressed to {} ({} files)", dir.display(), output.display(), files);
    Ok(output)
}

struct Archive {
    writer: ZipWriter<File>,
    options: FileOptions,
    base: PathBuf,
    skip: PathBuf,
    files: usize,
}

impl Archive {
    fn add_dir(&mut self, dir: &Path) -> Result<()> {
        let mut entries = std::fs::read_dir(dir)?
            .map(|entry| entry.map(|e| e.path()))
            .collect::<io::Result<Vec<_>>>()?;
        entries.sort();

        for path in entries {
            if path == self.skip {
                continue;
            }
            let name = self.entry_name(&path)?;
            if path.is_dir() {
                self.writer.add_directory(name, self.options)?;
                self.add_dir(&path)?;
            } else {
                debug!(entry = %name, "adding file");
                self.writer.start_file(name, self.options)?;
                let mut source = File::open(&path)?;
                io::copy(&mut source, &mut self.writer)?;
                self.files += 1;
            }
        }
        Ok(())
    }

    /// 플랫폼과 무관하게 `/`로 이은 상대 경로
    fn entry_name(&self, path: &Path) -> Result<String> {
        let relative = path
            .strip_prefix(&self.base)
            .map_err(|_| Error::InvalidSource(format!("{} escapes {}", path.display(), self.base.display())))?;
        Ok(relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/"))
    }
}
