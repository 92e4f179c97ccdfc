//! 从本地目录加载一次检查的全部文件.

use acr_berry::dicom::InputFile;
use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// 返回 `$HOME/dataset/<it...>`.
pub fn home_dataset_dir_with<P: AsRef<Path>, I: IntoIterator<Item = P>>(it: I) -> Option<PathBuf> {
    let mut ans = dirs::home_dir()?;
    ans.push("dataset");
    ans.extend(it);
    Some(ans)
}

/// 获取检查数据所在的目录.
///
/// 1. 若环境变量 `$ACR_QA_DIR` 非空, 则返回其值;
/// 2. 否则, 返回 `$HOME/dataset/acr`.
pub fn dataset_dir_from_env_or_home() -> Option<PathBuf> {
    match env::var("ACR_QA_DIR") {
        Ok(d) if !d.is_empty() => Some(PathBuf::from(d)),
        _ => home_dataset_dir_with(["acr"]),
    }
}

fn walk(dir: &Path, out: &mut Vec<PathBuf>) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            walk(&path, out)?;
        } else if path.is_file() {
            out.push(path);
        }
    }
    Ok(())
}

/// 递归读取 `root` 下的所有普通文件.
///
/// 文件名为相对 `root` 的路径, 以 `/` 分隔. 结果按文件名排序.
pub fn load_dir<P: AsRef<Path>>(root: P) -> io::Result<Vec<InputFile>> {
    let root = root.as_ref();
    let mut paths = Vec::new();
    walk(root, &mut paths)?;
    paths.sort();

    let mut files = Vec::with_capacity(paths.len());
    for path in paths {
        let name = path
            .strip_prefix(root)
            .unwrap_or(&path)
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        let bytes = fs::read(&path)?;
        log::debug!("read {name} ({} bytes)", bytes.len());
        files.push(InputFile::new(name, bytes));
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_dir_recursive_and_sorted() {
        let root = env::temp_dir().join(format!("acr-qa-loader-{}", std::process::id()));
        fs::create_dir_all(root.join("t1")).unwrap();
        fs::write(root.join("t1").join("002.dcm"), b"b").unwrap();
        fs::write(root.join("t1").join("001.dcm"), b"a").unwrap();
        fs::write(root.join("README"), b"c").unwrap();

        let files = load_dir(&root).unwrap();
        let names: Vec<_> = files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["README", "t1/001.dcm", "t1/002.dcm"]);
        assert_eq!(files[1].bytes, b"a");

        fs::remove_dir_all(&root).unwrap();
    }
}
